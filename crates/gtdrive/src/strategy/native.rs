// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Strategy implemented in a separate shared library.
//!
//! The library exports one C function:
//!
//! ```c
//! typedef struct {
//!     double throttle;
//!     double brake;
//!     double steering;
//!     int32_t drive_mode; /* -1 reverse, 0 neutral, 1 forward */
//! } gtdrive_control_t;
//!
//! /* Returns 0 on success. `sensor_view` holds a serialized OSI SensorView. */
//! int32_t gtdrive_strategy_compute(const uint8_t *sensor_view, size_t len,
//!                                  gtdrive_control_t *out);
//! ```

use std::path::{Path, PathBuf};

use libloading::Library;

use super::{ControlStrategy, SensorInput};
use crate::control::{ControlOutput, DriveMode};
use crate::error::StrategyError;
use crate::resolver::{self, LoadError};

/// Output struct filled by the native entry point.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeControl {
    pub throttle: f64,
    pub brake: f64,
    pub steering: f64,
    pub drive_mode: i32,
}

/// Signature of the native entry point.
pub type NativeComputeFn =
    unsafe extern "C" fn(sensor_view: *const u8, len: usize, out: *mut NativeControl) -> i32;

pub struct NativeStrategy {
    name: String,
    path: PathBuf,
    compute: NativeComputeFn,
    // Keeps `compute` mapped; must be dropped after it is last used.
    _library: Library,
}

impl NativeStrategy {
    /// Load `path` and resolve `symbol`.
    pub fn load(path: &Path, symbol: &str) -> Result<Self, LoadError> {
        let library = resolver::load_library(path)?;
        resolver::require_symbols(&library, path, &[symbol])?;
        // SAFETY:
        // - the symbol exists (checked above)
        // - the library contract fixes its signature to NativeComputeFn
        // - the fn pointer is copied out and stays valid while `_library` lives
        let compute = unsafe {
            *library
                .get::<NativeComputeFn>(symbol.as_bytes())
                .map_err(|_| LoadError::SymbolMissing {
                    library: path.to_path_buf(),
                    symbols: vec![symbol.to_string()],
                })?
        };
        Ok(Self {
            name: format!("native:{symbol}"),
            path: path.to_path_buf(),
            compute,
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for NativeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeStrategy")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ControlStrategy for NativeStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, input: &SensorInput) -> Result<ControlOutput, StrategyError> {
        let mut raw = NativeControl::default();
        // SAFETY:
        // - payload pointer and length describe a live buffer for the whole call
        // - raw is a valid, exclusively borrowed NativeControl
        let rc = unsafe { (self.compute)(input.payload.as_ptr(), input.payload.len(), &mut raw) };
        if rc != 0 {
            return Err(StrategyError::new(&self.name, format!("returned {rc}")));
        }
        let drive_mode = DriveMode::from_raw(raw.drive_mode).ok_or_else(|| {
            StrategyError::new(&self.name, format!("invalid drive_mode {}", raw.drive_mode))
        })?;
        Ok(ControlOutput {
            throttle: raw.throttle,
            brake: raw.brake,
            steering: raw.steering,
            drive_mode,
            trace: Default::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_control_layout() {
        assert_eq!(std::mem::size_of::<NativeControl>(), 32);
        assert_eq!(std::mem::align_of::<NativeControl>(), 8);
    }

    #[test]
    fn test_load_rejects_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = NativeStrategy::load(&dir.path().join("nope.so"), "gtdrive_strategy_compute")
            .unwrap_err();
        assert!(matches!(err, LoadError::InvalidImage { .. }));
    }

    #[test]
    fn test_load_reports_missing_symbol() {
        // The test binary is a valid image for this host but exports no strategy.
        let exe = std::env::current_exe().expect("current exe");
        match NativeStrategy::load(&exe, "gtdrive_strategy_compute_absent") {
            Err(LoadError::SymbolMissing { symbols, .. }) => {
                assert_eq!(symbols, vec!["gtdrive_strategy_compute_absent".to_string()]);
            }
            // Some platforms refuse to dlopen an executable; that is a load failure.
            Err(LoadError::MissingDependency { .. }) => {}
            other => panic!("unexpected result: {:?}", other.map(|s| s.name().to_string())),
        }
    }
}
