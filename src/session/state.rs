//! Session state machine.

/// Lifecycle state of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Session is registered and may receive frames.
    #[default]
    Open,
    /// A close has been initiated; no further frames are sent.
    Closing,
    /// The connection is closed. Terminal.
    Closed,
}

impl SessionState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Open -> Closing
    /// - Open -> Closed (peer went away first)
    /// - Closing -> Closed
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, target),
            (Open, Closing) | (Open, Closed) | (Closing, Closed)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: SessionState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::PriceStreamError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if frames may be written in this state.
    pub fn can_send(&self) -> bool {
        matches!(self, SessionState::Open)
    }
}
