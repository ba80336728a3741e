// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SensorView decoding and ControlRecord encoding.
//!
//! Pure functions over byte slices. [`decode`] reads directly from the buffer
//! the host owns; nothing is copied before the protobuf decoder sees it.

use std::sync::OnceLock;

use prost::Message;

use crate::control::{ControlOutput, ControlRecord};
use crate::error::DecodeError;
use crate::osi::{SensorView, SUPPORTED_MAJOR};

/// Environment variable selecting the codec capability (`osi` or `opaque`).
pub const CODEC_ENV: &str = "GTDRIVE_CODEC";

/// Whether SensorView decoding is available to the engines of this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecCapability {
    /// Frames are decoded and validated before reaching the strategy.
    Osi,
    /// Frames are handed to the strategy as opaque bytes.
    CodecUnavailable,
}

impl CodecCapability {
    /// Process-wide capability, resolved on first use and never changed.
    pub fn process() -> Self {
        static CAPABILITY: OnceLock<CodecCapability> = OnceLock::new();
        *CAPABILITY.get_or_init(|| {
            let capability = Self::from_setting(std::env::var(CODEC_ENV).ok().as_deref());
            log::debug!("[gtdrive] codec capability: {:?}", capability);
            capability
        })
    }

    fn from_setting(setting: Option<&str>) -> Self {
        match setting.map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("opaque") => {
                CodecCapability::CodecUnavailable
            }
            Some(value) if !value.is_empty() && !value.eq_ignore_ascii_case("osi") => {
                log::warn!(
                    "[gtdrive] unknown {}={:?}, keeping OSI decoding",
                    CODEC_ENV,
                    value
                );
                CodecCapability::Osi
            }
            _ => CodecCapability::Osi,
        }
    }
}

/// Decode and version-check a SensorView.
pub fn decode(buf: &[u8]) -> Result<SensorView, DecodeError> {
    let view = SensorView::decode(buf).map_err(|err| DecodeError::Malformed {
        len: buf.len(),
        reason: err.to_string(),
    })?;

    let major = view.version.as_ref().and_then(|v| v.version_major);
    match major {
        Some(SUPPORTED_MAJOR) => Ok(view),
        found => Err(DecodeError::VersionMismatch {
            found,
            supported: SUPPORTED_MAJOR,
        }),
    }
}

/// Encode an output as a [`ControlRecord`].
pub fn encode(output: &ControlOutput, simulation_time: Option<f64>) -> Vec<u8> {
    ControlRecord::from_output(output, simulation_time).encode_to_vec()
}

/// Inverse of [`encode`], for diagnostic replay only.
pub fn decode_control(buf: &[u8]) -> Result<ControlOutput, DecodeError> {
    ControlRecord::decode(buf)
        .map(ControlRecord::into_output)
        .map_err(|err| DecodeError::Malformed {
            len: buf.len(),
            reason: err.to_string(),
        })
}

/// Serialize a SensorView (test harnesses, the doctor tool).
pub fn encode_sensor_view(view: &SensorView) -> Vec<u8> {
    view.encode_to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::DriveMode;
    use crate::osi::InterfaceVersion;
    use prost::bytes::Bytes;

    #[test]
    fn test_decode_empty_valid_view() {
        let buf = encode_sensor_view(&SensorView::empty());
        let view = decode(&buf).expect("valid frame");
        assert_eq!(view.version.and_then(|v| v.version_major), Some(3));
    }

    #[test]
    fn test_decode_missing_version() {
        let err = decode(&[]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::VersionMismatch {
                found: None,
                supported: SUPPORTED_MAJOR
            }
        );
    }

    #[test]
    fn test_decode_rejects_other_major() {
        let view = SensorView {
            version: Some(InterfaceVersion::new(4, 0, 0)),
            ..SensorView::default()
        };
        let err = decode(&encode_sensor_view(&view)).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::VersionMismatch { found: Some(4), .. }
        ));
    }

    #[test]
    fn test_decode_garbage_is_malformed() {
        let err = decode(&[0xFF, 0xFF, 0xFF]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { len: 3, .. }));
    }

    #[test]
    fn test_control_record_replay() {
        let out = ControlOutput {
            throttle: 0.5,
            brake: 0.0,
            steering: 0.01,
            drive_mode: DriveMode::Forward,
            trace: Bytes::from_static(&[0, 1, 0, 2]),
        };
        let replay = decode_control(&encode(&out, Some(1.0))).expect("replay");
        assert_eq!(replay, out);
    }

    #[test]
    fn test_capability_setting() {
        assert_eq!(CodecCapability::from_setting(None), CodecCapability::Osi);
        assert_eq!(
            CodecCapability::from_setting(Some("OPAQUE")),
            CodecCapability::CodecUnavailable
        );
        assert_eq!(
            CodecCapability::from_setting(Some("bogus")),
            CodecCapability::Osi
        );
    }
}
