//! Policy guards: allow/blocklist validators consulted before any
//! privileged request leaves an adapter.
//!
//! These are security boundaries, not tunable business config. Both guards
//! fail closed: anything that does not match an explicit allow rule is
//! rejected, and a rejection is never retryable.

pub mod docker;
pub mod ssh;

use crate::error::{codes, AdapterError};

/// A request or command rejected by a policy guard. Raised before any
/// network traffic; never retryable.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Policy violation: {reason}")]
pub struct PolicyViolation {
    pub reason: String,
}

impl PolicyViolation {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<PolicyViolation> for AdapterError {
    fn from(violation: PolicyViolation) -> Self {
        AdapterError::new(codes::POLICY_VIOLATION, violation.reason, false)
    }
}
