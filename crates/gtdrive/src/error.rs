// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy for decoding, stepping and strategy execution.
//!
//! Nothing in here crosses the C boundary as-is: the shim converts every
//! [`StepError`] into an FMI status with [`StepError::status`] and publishes
//! [`StepError::code`] through the `LastErrorCode` output variable.
//!
//! # Error Code Categories
//!
//! - **0**: No error
//! - **10-19**: Lifecycle errors
//! - **20-29**: Payload errors
//! - **30-39**: Strategy / watchdog errors

use crate::engine::LifecycleState;
use crate::fmi2::Fmi2Status;
use thiserror::Error;

/// Failure to turn a byte buffer into a `SensorView`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Buffer is not a well-formed protobuf message.
    #[error("malformed SensorView buffer ({len} bytes): {reason}")]
    Malformed { len: usize, reason: String },
    /// Required `version` field missing, or an unsupported OSI major version.
    #[error("SensorView version mismatch: found {found:?}, supported major {supported}")]
    VersionMismatch { found: Option<u32>, supported: u32 },
}

/// Failure reported by a control strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("strategy `{strategy}` failed: {reason}")]
pub struct StrategyError {
    pub strategy: String,
    pub reason: String,
}

impl StrategyError {
    pub fn new(strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            reason: reason.into(),
        }
    }
}

/// Errors returned by [`StepEngine`](crate::StepEngine) operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    /// Operation not allowed in the current lifecycle state; state unchanged.
    #[error("operation `{operation}` not allowed in state {state:?}")]
    NotReady {
        operation: &'static str,
        state: LifecycleState,
    },
    /// Input buffer could not be decoded; the engine moved to `Error`.
    #[error("invalid input buffer: {0}")]
    InvalidBuffer(#[source] DecodeError),
    /// Handle unknown to the instance registry (never created or already freed).
    #[error("invalid instance handle")]
    InvalidHandle,
    /// Engine is in `Error`; only terminate/free are accepted.
    #[error("fatal: {0}")]
    Fatal(String),
    /// Strategy exceeded the watchdog bound too many times.
    #[error("strategy timed out after {timeout_ms} ms ({faults} consecutive faults)")]
    Timeout { timeout_ms: u64, faults: u32 },
    /// Argument rejected before touching engine state.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl StepError {
    /// FMI status reported to the host for this error.
    pub fn status(&self) -> Fmi2Status {
        match self {
            StepError::NotReady { .. }
            | StepError::InvalidBuffer(_)
            | StepError::InvalidHandle
            | StepError::InvalidArgument(_) => Fmi2Status::Error,
            StepError::Fatal(_) | StepError::Timeout { .. } => Fmi2Status::Fatal,
        }
    }

    /// Stable integer code published through `LastErrorCode`.
    pub fn code(&self) -> i32 {
        match self {
            StepError::NotReady { .. } => 10,
            StepError::InvalidHandle => 11,
            StepError::InvalidArgument(_) => 12,
            StepError::InvalidBuffer(DecodeError::Malformed { .. }) => 20,
            StepError::InvalidBuffer(DecodeError::VersionMismatch { .. }) => 21,
            StepError::Fatal(_) => 30,
            StepError::Timeout { .. } => 31,
        }
    }
}

/// Convenient alias for engine results.
pub type Result<T> = core::result::Result<T, StepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_ready = StepError::NotReady {
            operation: "do_step",
            state: LifecycleState::Instantiated,
        };
        assert_eq!(not_ready.status(), Fmi2Status::Error);
        assert_eq!(StepError::Fatal("x".into()).status(), Fmi2Status::Fatal);
        assert_eq!(
            StepError::Timeout {
                timeout_ms: 10,
                faults: 3
            }
            .status(),
            Fmi2Status::Fatal
        );
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            StepError::NotReady {
                operation: "x",
                state: LifecycleState::Error,
            },
            StepError::InvalidHandle,
            StepError::InvalidArgument(String::new()),
            StepError::InvalidBuffer(DecodeError::Malformed {
                len: 0,
                reason: String::new(),
            }),
            StepError::InvalidBuffer(DecodeError::VersionMismatch {
                found: None,
                supported: 3,
            }),
            StepError::Fatal(String::new()),
            StepError::Timeout {
                timeout_ms: 0,
                faults: 0,
            },
        ];
        let mut codes: Vec<i32> = errors.iter().map(StepError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&0));
    }
}
