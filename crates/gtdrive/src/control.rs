// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Actuation outputs and their self-describing record encoding.

use prost::bytes::Bytes;

use crate::error::StrategyError;

/// Gear selection requested by the strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DriveMode {
    Reverse = -1,
    #[default]
    Neutral = 0,
    Forward = 1,
}

impl DriveMode {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            -1 => Some(DriveMode::Reverse),
            0 => Some(DriveMode::Neutral),
            1 => Some(DriveMode::Forward),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Outputs of one communication step.
///
/// `Default` is the safe-stop output: no throttle, no brake, wheels straight,
/// neutral gear, empty trace.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControlOutput {
    /// Accelerator pedal, `[0, 1]`.
    pub throttle: f64,
    /// Brake pedal, `[0, 1]`.
    pub brake: f64,
    /// Steering request, `[-1, 1]` (positive is left).
    pub steering: f64,
    pub drive_mode: DriveMode,
    /// Opaque diagnostic/passthrough bytes, shared with the step input.
    pub trace: Bytes,
}

impl ControlOutput {
    pub fn safe_stop() -> Self {
        Self::default()
    }

    /// Reject non-finite fields, clamp finite ones into their ranges.
    pub fn sanitized(mut self, strategy: &str) -> Result<Self, StrategyError> {
        for (field, value) in [
            ("throttle", self.throttle),
            ("brake", self.brake),
            ("steering", self.steering),
        ] {
            if !value.is_finite() {
                return Err(StrategyError::new(
                    strategy,
                    format!("non-finite {field}: {value}"),
                ));
            }
        }
        self.throttle = self.throttle.clamp(0.0, 1.0);
        self.brake = self.brake.clamp(0.0, 1.0);
        self.steering = self.steering.clamp(-1.0, 1.0);
        Ok(self)
    }

    pub fn is_in_range(&self) -> bool {
        (0.0..=1.0).contains(&self.throttle)
            && (0.0..=1.0).contains(&self.brake)
            && (-1.0..=1.0).contains(&self.steering)
    }
}

/// Schema version written by [`ControlRecord::from_output`].
///
/// - 1: throttle, brake, steering
/// - 2: + drive_mode, trace, simulation_time
pub const RECORD_SCHEMA_VERSION: u32 = 2;

/// Protobuf form of a [`ControlOutput`], published through `OSMPControlOut`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControlRecord {
    #[prost(uint32, tag = "1")]
    pub schema_version: u32,
    #[prost(double, tag = "2")]
    pub throttle: f64,
    #[prost(double, tag = "3")]
    pub brake: f64,
    #[prost(double, tag = "4")]
    pub steering: f64,
    #[prost(sint32, optional, tag = "5")]
    pub drive_mode: Option<i32>,
    #[prost(bytes = "bytes", tag = "6")]
    pub trace: Bytes,
    #[prost(double, optional, tag = "7")]
    pub simulation_time: Option<f64>,
}

impl ControlRecord {
    pub fn from_output(output: &ControlOutput, simulation_time: Option<f64>) -> Self {
        Self {
            schema_version: RECORD_SCHEMA_VERSION,
            throttle: output.throttle,
            brake: output.brake,
            steering: output.steering,
            drive_mode: Some(output.drive_mode.as_raw()),
            trace: output.trace.clone(),
            simulation_time,
        }
    }

    /// Records written before `drive_mode` existed always drove forward.
    pub fn into_output(self) -> ControlOutput {
        let drive_mode = self
            .drive_mode
            .and_then(DriveMode::from_raw)
            .unwrap_or(DriveMode::Forward);
        ControlOutput {
            throttle: self.throttle,
            brake: self.brake,
            steering: self.steering,
            drive_mode,
            trace: self.trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_stop_is_default() {
        let out = ControlOutput::safe_stop();
        assert_eq!(out.throttle, 0.0);
        assert_eq!(out.brake, 0.0);
        assert_eq!(out.steering, 0.0);
        assert_eq!(out.drive_mode, DriveMode::Neutral);
        assert!(out.trace.is_empty());
    }

    #[test]
    fn test_sanitized_clamps() {
        let out = ControlOutput {
            throttle: 1.7,
            brake: -0.2,
            steering: -3.0,
            ..ControlOutput::default()
        }
        .sanitized("test")
        .expect("finite values");
        assert_eq!(out.throttle, 1.0);
        assert_eq!(out.brake, 0.0);
        assert_eq!(out.steering, -1.0);
        assert!(out.is_in_range());
    }

    #[test]
    fn test_sanitized_rejects_nan() {
        let err = ControlOutput {
            steering: f64::NAN,
            ..ControlOutput::default()
        }
        .sanitized("test")
        .unwrap_err();
        assert!(err.reason.contains("steering"));

        let err = ControlOutput {
            throttle: f64::INFINITY,
            ..ControlOutput::default()
        }
        .sanitized("test")
        .unwrap_err();
        assert!(err.reason.contains("throttle"));
    }

    #[test]
    fn test_legacy_record_defaults_forward() {
        let legacy = ControlRecord {
            schema_version: 1,
            throttle: 0.3,
            brake: 0.0,
            steering: 0.1,
            drive_mode: None,
            trace: Bytes::new(),
            simulation_time: None,
        };
        let out = legacy.into_output();
        assert_eq!(out.drive_mode, DriveMode::Forward);
        assert!(out.trace.is_empty());
    }

    #[test]
    fn test_record_shares_trace() {
        let out = ControlOutput {
            trace: Bytes::from(vec![1u8; 64]),
            ..ControlOutput::default()
        };
        let record = ControlRecord::from_output(&out, Some(0.5));
        assert_eq!(record.trace.as_ptr(), out.trace.as_ptr());
    }

    #[test]
    fn test_drive_mode_raw() {
        for mode in [DriveMode::Reverse, DriveMode::Neutral, DriveMode::Forward] {
            assert_eq!(DriveMode::from_raw(mode.as_raw()), Some(mode));
        }
        assert_eq!(DriveMode::from_raw(2), None);
    }
}
