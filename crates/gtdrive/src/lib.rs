// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # GT-DriveController core
//!
//! Engine behind the `gtdrive-fmi` co-simulation plugin. A simulation master hands
//! the plugin one serialized OSI `SensorView` per communication step; this crate
//! decodes it, runs a pluggable control strategy and keeps the resulting actuation
//! outputs until the host reads them back.
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                  gtdrive-fmi (FMI 2.0 C ABI shim)                   |
//! |   handle registry | value references | host logger forwarding     |
//! +---------------------------------------------------------------------+
//! |                          StepEngine                                 |
//! |   lifecycle FSM | simulation clock | fault accounting | outputs    |
//! +---------------------------------------------------------------------+
//! |        codec (OSI SensorView / ControlRecord)  |  Watchdog          |
//! |                                                |  ControlStrategy   |
//! +---------------------------------------------------------------------+
//! |     resolver (install dir registration, library loading)           |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`StepEngine`] | Per-instance lifecycle state machine |
//! | [`ControlStrategy`] | Injected driving policy |
//! | [`ControlOutput`] | Actuation outputs of one step |
//! | [`osi::SensorView`] | Decoded sensor input |
//! | [`DriveConfig`] | Instance configuration (`resources/gtdrive.yaml`) |
//!
//! ## Quick Start
//!
//! ```rust
//! use gtdrive::{codec, osi, Experiment, StepEngine};
//!
//! let mut engine = StepEngine::builder("ego").build();
//! engine.setup_experiment(Experiment::new(0.0)).unwrap();
//!
//! let frame = codec::encode_sensor_view(&osi::SensorView::empty());
//! engine.do_step(0.0, 0.01, &frame).unwrap();
//! assert_eq!(engine.output().unwrap().throttle, 0.5);
//! ```

pub mod codec;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod fmi2;
pub mod osi;
pub mod osmp;
pub mod resolver;
pub mod strategy;
pub mod variables;
pub mod watchdog;

pub use codec::CodecCapability;
pub use config::{ConfigError, DriveConfig, StrategyKind};
pub use control::{ControlOutput, DriveMode};
pub use engine::{EngineBuilder, EngineStats, Experiment, LifecycleState, StepEngine, StepOutcome};
pub use error::{DecodeError, StepError, StrategyError};
pub use resolver::LoadError;
pub use strategy::{ControlStrategy, NativeStrategy, ReferenceStrategy, SafeStopStrategy, SensorInput};
pub use watchdog::{StrategyFault, Watchdog};

pub use prost::bytes::Bytes;
