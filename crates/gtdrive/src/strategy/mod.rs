// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Control strategies.
//!
//! A strategy turns one step's sensor input into a [`ControlOutput`]. The
//! engine never trusts it: errors, panics, hangs and non-finite values are
//! all caught by the [`Watchdog`](crate::watchdog::Watchdog) and replaced by
//! the safe-stop output.

pub mod native;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use prost::bytes::Bytes;

use crate::config::{StrategyConfig, StrategyKind};
use crate::control::{ControlOutput, DriveMode};
use crate::error::StrategyError;
use crate::osi::SensorView;
use crate::resolver::{self, LoadError};

pub use native::NativeStrategy;

/// What a strategy sees of one communication step.
#[derive(Debug, Clone, Default)]
pub struct SensorInput {
    /// Decoded frame; `None` when the codec is unavailable.
    pub view: Option<SensorView>,
    /// Raw SensorView bytes as received from the host.
    pub payload: Bytes,
    /// Engine clock at the start of the step.
    pub simulation_time: f64,
}

/// Driving policy invoked once per computed step.
pub trait ControlStrategy: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    fn compute(&self, input: &SensorInput) -> Result<ControlOutput, StrategyError>;
}

impl<F> ControlStrategy for F
where
    F: Fn(&SensorInput) -> Result<ControlOutput, StrategyError> + Send + Sync,
{
    fn name(&self) -> &str {
        "closure"
    }

    fn compute(&self, input: &SensorInput) -> Result<ControlOutput, StrategyError> {
        self(input)
    }
}

/// Fixed outputs with the input payload echoed into `trace`.
///
/// Stand-in for a real policy; hosts can check the plumbing end to end.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceStrategy;

impl ReferenceStrategy {
    pub const THROTTLE: f64 = 0.5;
    pub const BRAKE: f64 = 0.0;
    pub const STEERING: f64 = 0.01;
}

impl ControlStrategy for ReferenceStrategy {
    fn name(&self) -> &str {
        "reference"
    }

    fn compute(&self, input: &SensorInput) -> Result<ControlOutput, StrategyError> {
        Ok(ControlOutput {
            throttle: Self::THROTTLE,
            brake: Self::BRAKE,
            steering: Self::STEERING,
            drive_mode: DriveMode::Forward,
            trace: input.payload.clone(),
        })
    }
}

/// Always returns the safe-stop output.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafeStopStrategy;

impl ControlStrategy for SafeStopStrategy {
    fn name(&self) -> &str {
        "safe_stop"
    }

    fn compute(&self, _input: &SensorInput) -> Result<ControlOutput, StrategyError> {
        Ok(ControlOutput::safe_stop())
    }
}

/// Build the strategy selected by `config`.
///
/// Native libraries are resolved against `resources` first, then against the
/// registered search directories.
pub fn from_config(
    config: &StrategyConfig,
    resources: Option<&Path>,
) -> Result<Arc<dyn ControlStrategy>, LoadError> {
    match config.kind {
        StrategyKind::Reference => Ok(Arc::new(ReferenceStrategy)),
        StrategyKind::SafeStop => Ok(Arc::new(SafeStopStrategy)),
        StrategyKind::Native => {
            let name = config.library.as_deref().ok_or_else(|| LoadError::InvalidImage {
                path: PathBuf::new(),
                reason: "strategy.library is not set".to_string(),
            })?;
            let path = resolve_library(name, resources);
            let strategy = NativeStrategy::load(&path, config.symbol())?;
            log::info!(
                "[gtdrive] native strategy {} from {}",
                config.symbol(),
                path.display()
            );
            Ok(Arc::new(strategy))
        }
    }
}

fn resolve_library(name: &Path, resources: Option<&Path>) -> PathBuf {
    if let Some(path) = resources
        .map(|dir| dir.join(name))
        .filter(|path| path.is_file())
    {
        return path;
    }
    resolver::register_install_dir();
    // Unresolved names go to the loader as-is, so the error names them.
    resolver::locate(name).unwrap_or_else(|| name.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_outputs() {
        let input = SensorInput {
            payload: Bytes::from_static(&[8, 1, 2, 3]),
            ..SensorInput::default()
        };
        let out = ReferenceStrategy.compute(&input).expect("reference");
        assert_eq!(out.throttle, 0.5);
        assert_eq!(out.brake, 0.0);
        assert_eq!(out.steering, 0.01);
        assert_eq!(out.drive_mode, DriveMode::Forward);
        assert_eq!(out.trace, input.payload);
        assert_eq!(out.trace.as_ptr(), input.payload.as_ptr());
    }

    #[test]
    fn test_safe_stop_outputs() {
        let out = SafeStopStrategy
            .compute(&SensorInput::default())
            .expect("safe stop");
        assert_eq!(out, ControlOutput::safe_stop());
    }

    #[test]
    fn test_closure_strategy() {
        let strategy = |input: &SensorInput| -> Result<ControlOutput, StrategyError> {
            Ok(ControlOutput {
                brake: if input.view.is_some() { 1.0 } else { 0.0 },
                ..ControlOutput::default()
            })
        };
        assert_eq!(strategy.name(), "closure");
        let out = strategy.compute(&SensorInput::default()).expect("closure");
        assert_eq!(out.brake, 0.0);
    }

    #[test]
    fn test_from_config_builtin() {
        let config = StrategyConfig {
            kind: StrategyKind::SafeStop,
            ..StrategyConfig::default()
        };
        let strategy = from_config(&config, None).expect("builtin");
        assert_eq!(strategy.name(), "safe_stop");
    }

    #[test]
    fn test_from_config_native_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = StrategyConfig {
            kind: StrategyKind::Native,
            library: Some(PathBuf::from("definitely_missing_policy")),
            symbol: None,
        };
        let err = from_config(&config, Some(dir.path())).err().expect("load error");
        assert!(matches!(err, LoadError::InvalidImage { .. }));
    }
}
