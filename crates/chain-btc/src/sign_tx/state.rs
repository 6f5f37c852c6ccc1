use crate::error::BtcError;

/// Progress of one signing session. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Init,
    Phase1Inputs,
    Phase1Outputs,
    Phase1Done,
    Phase2Inputs,
    Phase2Outputs,
    Phase2Witnesses,
    Done,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }

    /// Move to `next`. Skipping ahead is allowed, going back is not.
    pub fn advance(&mut self, next: SessionState) -> Result<(), BtcError> {
        if self.is_terminal() || next == SessionState::Failed || next <= *self {
            return Err(BtcError::InvariantViolation(format!(
                "illegal transition {self:?} -> {next:?}"
            )));
        }
        *self = next;
        Ok(())
    }

    /// Any non-terminal state may fail.
    pub fn fail(&mut self) {
        if !self.is_terminal() {
            *self = SessionState::Failed;
        }
    }
}
