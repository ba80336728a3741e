// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Instance configuration.
//!
//! Loaded from `gtdrive.yaml` inside the FMU resources directory handed over by
//! the host at instantiation, then overridden by `GTDRIVE_*` environment
//! variables. A missing file means defaults; a broken file is an error.
//!
//! # Example YAML
//!
//! ```yaml
//! # resources/gtdrive.yaml
//! watchdog_ms: 2000
//! fault_threshold: 5
//! time_tolerance: 1.0e-6
//! strategy:
//!   kind: native
//!   library: libmy_policy.so
//!   symbol: gtdrive_strategy_compute
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// File name looked up in the resources directory.
pub const CONFIG_FILE: &str = "gtdrive.yaml";

pub const ENV_WATCHDOG_MS: &str = "GTDRIVE_WATCHDOG_MS";
pub const ENV_FAULT_THRESHOLD: &str = "GTDRIVE_FAULT_THRESHOLD";
pub const ENV_STRATEGY: &str = "GTDRIVE_STRATEGY";

/// Default native entry point.
pub const DEFAULT_NATIVE_SYMBOL: &str = "gtdrive_strategy_compute";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which control strategy an instance runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Fixed compatibility outputs with payload passthrough.
    #[default]
    Reference,
    /// Always the safe-stop output.
    SafeStop,
    /// Policy loaded from a shared library.
    Native,
}

impl std::str::FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "reference" => Ok(StrategyKind::Reference),
            "safe_stop" => Ok(StrategyKind::SafeStop),
            "native" => Ok(StrategyKind::Native),
            other => Err(ConfigError::Invalid(format!("unknown strategy `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrategyConfig {
    pub kind: StrategyKind,
    /// Library file, relative to the resources directory (native only).
    pub library: Option<PathBuf>,
    /// Exported entry point (native only).
    pub symbol: Option<String>,
}

impl StrategyConfig {
    pub fn symbol(&self) -> &str {
        self.symbol.as_deref().unwrap_or(DEFAULT_NATIVE_SYMBOL)
    }
}

/// Per-instance settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriveConfig {
    /// Upper bound on one strategy call; 0 runs the strategy inline.
    pub watchdog_ms: u64,
    /// Consecutive strategy faults tolerated before entering `Error`.
    pub fault_threshold: u32,
    /// Allowed drift between host communication point and engine clock.
    pub time_tolerance: f64,
    pub strategy: StrategyConfig,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            watchdog_ms: 5_000,
            fault_threshold: 3,
            time_tolerance: 1e-9,
            strategy: StrategyConfig::default(),
        }
    }
}

impl DriveConfig {
    /// Load `gtdrive.yaml` from `resources` (if any) and apply environment overrides.
    pub fn load(resources: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match resources.map(|dir| dir.join(CONFIG_FILE)) {
            Some(path) if path.is_file() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("[gtdrive] loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Apply `GTDRIVE_*` overrides using `lookup` as the environment.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_WATCHDOG_MS) {
            self.watchdog_ms = value.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{ENV_WATCHDOG_MS}={value:?} is not an integer"))
            })?;
            log::info!("[gtdrive] watchdog_ms={} from {}", self.watchdog_ms, ENV_WATCHDOG_MS);
        }
        if let Some(value) = lookup(ENV_FAULT_THRESHOLD) {
            self.fault_threshold = value.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!(
                    "{ENV_FAULT_THRESHOLD}={value:?} is not an integer"
                ))
            })?;
        }
        if let Some(value) = lookup(ENV_STRATEGY) {
            self.strategy.kind = value.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fault_threshold == 0 {
            return Err(ConfigError::Invalid("fault_threshold must be at least 1".into()));
        }
        if !self.time_tolerance.is_finite() || self.time_tolerance < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "time_tolerance must be a non-negative number, got {}",
                self.time_tolerance
            )));
        }
        if self.strategy.kind == StrategyKind::Native && self.strategy.library.is_none() {
            return Err(ConfigError::Invalid(
                "strategy.kind = native requires strategy.library".into(),
            ));
        }
        Ok(())
    }

    /// `None` when the watchdog is disabled.
    pub fn watchdog(&self) -> Option<Duration> {
        (self.watchdog_ms > 0).then(|| Duration::from_millis(self.watchdog_ms))
    }
}
