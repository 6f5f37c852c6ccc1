use crypto_utils::der::decode_seq;
use crypto_utils::ecdsa::{ecdsa_sign, ecdsa_verify};
use crypto_utils::hash::sha256;
use crypto_utils::multisig::MultisigVerifier;
use crypto_utils::secret::PrivateKey;
use proptest::prelude::*;

fn key(seed: u64) -> PrivateKey {
    PrivateKey::from_bytes(sha256(&seed.to_le_bytes())).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn signatures_verify_only_for_their_digest(seed in any::<u64>(), message in any::<Vec<u8>>()) {
        let private_key = key(seed);
        let public_key = private_key.public_key(true).unwrap();
        let digest = sha256(&message);
        let signature = ecdsa_sign(&private_key, &digest).unwrap();

        let (items, end) = decode_seq(&signature, 0).unwrap();
        prop_assert_eq!(end, signature.len());
        prop_assert_eq!(items.len(), 2);
        prop_assert!(ecdsa_verify(&public_key, &signature, &digest).unwrap());

        let mut other = digest;
        other[0] ^= 1;
        prop_assert!(!ecdsa_verify(&public_key, &signature, &other).unwrap());
    }

    #[test]
    fn multisig_accepts_exactly_the_ordered_subsets(mask in 1u8..16, message in any::<Vec<u8>>()) {
        let digest = sha256(&message);
        let keys: Vec<PrivateKey> = (0..4).map(key).collect();
        let pubkeys: Vec<Vec<u8>> = keys.iter().map(|k| k.public_key(true).unwrap()).collect();
        let sigs: Vec<Vec<u8>> = keys.iter().map(|k| ecdsa_sign(k, &digest).unwrap()).collect();

        let chosen: Vec<(&[u8], u8)> = (0..4)
            .filter(|&i| mask & (1 << i) != 0)
            .map(|i| (sigs[i].as_slice(), 1))
            .collect();
        let threshold = chosen.len();

        let mut reversed = chosen.clone();
        reversed.reverse();

        prop_assert!(MultisigVerifier::new(&pubkeys, chosen, threshold).verify(&digest).is_ok());
        if threshold > 1 {
            let verifier = MultisigVerifier::new(&pubkeys, reversed, threshold);
            prop_assert!(verifier.verify(&digest).is_err());
        }
    }
}
