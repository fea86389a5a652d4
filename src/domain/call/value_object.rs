//! Call value objects

use serde::{Deserialize, Serialize};

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    /// Inbound call from external
    Inbound,
    /// Outbound call to external
    Outbound,
    /// Internal call between endpoints
    Internal,
}

/// Call state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    /// Call is being initiated
    Initiating,
    /// Callee is being alerted (ringing)
    Ringing,
    /// Call has been answered and media is flowing
    Answered,
    /// Call is on hold
    OnHold,
    /// Call is being transferred
    Transferring,
    /// Call has ended
    Ended(EndReason),
}

impl CallState {
    /// Check if state transition is valid
    pub fn can_transition_to(&self, new_state: &CallState) -> bool {
        use CallState::*;

        match (self, new_state) {
            // From Initiating
            (Initiating, Ringing) => true,
            (Initiating, Ended(_)) => true,

            // From Ringing
            (Ringing, Answered) => true,
            (Ringing, Ended(_)) => true,

            // From Answered
            (Answered, OnHold) => true,
            (Answered, Transferring) => true,
            (Answered, Ended(_)) => true,

            // From OnHold
            (OnHold, Answered) => true,
            (OnHold, Ended(_)) => true,

            // From Transferring
            (Transferring, Answered) => true,
            (Transferring, Ended(_)) => true,

            // Can't transition from Ended
            (Ended(_), _) => false,

            // All other transitions are invalid
            _ => false,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, CallState::Ended(_))
    }
}

/// Reason for call ending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// Normal call completion
    NormalClearing,
    /// Caller hung up
    CallerHangup,
    /// Callee hung up
    CalleeHangup,
    /// Call was rejected
    Rejected,
    /// No answer
    NoAnswer,
    /// Busy
    Busy,
    /// Call failed
    Failed(String),
    /// Call was canceled
    Canceled,
}
