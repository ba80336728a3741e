// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Step engine: the per-instance lifecycle state machine.
//!
//! ```text
//!   Instantiated --setup_experiment--> Initialized --do_step--> Stepping --+
//!        ^                                  |                      ^       | do_step
//!        |                                  |                      +-------+
//!        +------------- reset --------------+----------------------+
//!                                           |                      |
//!                                           +----- terminate ----> Terminated
//!
//!   any state --decode failure / fault threshold--> Error --terminate--> Terminated
//! ```
//!
//! The engine owns the latest [`ControlOutput`] and its encoded
//! [`ControlRecord`](crate::control::ControlRecord); both are replaced on every
//! computed step and read back by the host through the getters.

use std::path::PathBuf;
use std::sync::Arc;

use prost::bytes::Bytes;

use crate::codec::{self, CodecCapability};
use crate::config::{DriveConfig, StrategyKind};
use crate::control::ControlOutput;
use crate::error::{Result, StepError};
use crate::fmi2::Fmi2Status;
use crate::resolver::LoadError;
use crate::strategy::{self, ControlStrategy, ReferenceStrategy, SafeStopStrategy, SensorInput};
use crate::watchdog::{StrategyFault, Watchdog};

/// Floor of the time comparison epsilon, relative to the magnitude of the
/// compared instants. Covers rounding from hosts that accumulate `t += h`.
const RELATIVE_TIME_EPSILON: f64 = 1e-12;

/// Lifecycle state of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Instantiated,
    Initialized,
    Stepping,
    Terminated,
    Error,
}

/// Parameters of `fmi2SetupExperiment`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Experiment {
    pub start_time: f64,
    /// Relative solver tolerance from the host. Recorded only: time
    /// comparisons use [`DriveConfig::time_tolerance`].
    pub tolerance: Option<f64>,
    pub stop_time: Option<f64>,
}

impl Experiment {
    pub fn new(start_time: f64) -> Self {
        Self {
            start_time,
            tolerance: None,
            stop_time: None,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn with_stop_time(mut self, stop_time: f64) -> Self {
        self.stop_time = Some(stop_time);
        self
    }

    fn validate(&self) -> Result<()> {
        if !self.start_time.is_finite() {
            return Err(StepError::InvalidArgument(format!(
                "start time {} is not finite",
                self.start_time
            )));
        }
        if let Some(tolerance) = self.tolerance {
            if !tolerance.is_finite() || tolerance < 0.0 {
                return Err(StepError::InvalidArgument(format!(
                    "tolerance {tolerance} must be a non-negative number"
                )));
            }
        }
        if let Some(stop) = self.stop_time {
            if !stop.is_finite() || stop < self.start_time {
                return Err(StepError::InvalidArgument(format!(
                    "stop time {stop} precedes start time {}",
                    self.start_time
                )));
            }
        }
        Ok(())
    }
}

/// Result of a successful `do_step`.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Strategy ran and its output is current.
    Computed,
    /// Empty input: time advanced, outputs unchanged.
    Idle,
    /// Strategy faulted; safe-stop outputs substituted.
    Degraded(StrategyFault),
}

impl StepOutcome {
    pub fn status(&self) -> Fmi2Status {
        match self {
            StepOutcome::Computed | StepOutcome::Idle => Fmi2Status::Ok,
            StepOutcome::Degraded(_) => Fmi2Status::Warning,
        }
    }
}

/// Counters since instantiation or the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Steps that ran the strategy (including degraded ones).
    pub computed_steps: u64,
    pub idle_steps: u64,
    pub faults: u64,
    pub timeouts: u64,
    pub consecutive_faults: u32,
}

/// Configures a [`StepEngine`].
pub struct EngineBuilder {
    name: String,
    config: DriveConfig,
    strategy: Option<Arc<dyn ControlStrategy>>,
    capability: Option<CodecCapability>,
    resources: Option<PathBuf>,
}

impl EngineBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            config: DriveConfig::default(),
            strategy: None,
            capability: None,
            resources: None,
        }
    }

    pub fn config(mut self, config: DriveConfig) -> Self {
        self.config = config;
        self
    }

    /// Inject a strategy, bypassing `strategy.kind` from the configuration.
    pub fn strategy(mut self, strategy: Arc<dyn ControlStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Override the process codec capability (tests, diagnostics).
    pub fn capability(mut self, capability: CodecCapability) -> Self {
        self.capability = Some(capability);
        self
    }

    /// Resources directory used to resolve native strategy libraries.
    pub fn resources(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resources = Some(dir.into());
        self
    }

    /// Build with the injected strategy, or a built-in one.
    ///
    /// A configured `native` strategy is not loaded here; it falls back to
    /// [`ReferenceStrategy`]. Use [`try_build`](Self::try_build) to load it.
    pub fn build(mut self) -> StepEngine {
        let strategy: Arc<dyn ControlStrategy> = match self.strategy.take() {
            Some(strategy) => strategy,
            None => match self.config.strategy.kind {
                StrategyKind::SafeStop => Arc::new(SafeStopStrategy),
                StrategyKind::Reference | StrategyKind::Native => Arc::new(ReferenceStrategy),
            },
        };
        self.finish(strategy)
    }

    /// Build, loading the configured strategy (including native libraries).
    pub fn try_build(mut self) -> std::result::Result<StepEngine, LoadError> {
        let strategy = match self.strategy.take() {
            Some(strategy) => strategy,
            None => strategy::from_config(&self.config.strategy, self.resources.as_deref())?,
        };
        Ok(self.finish(strategy))
    }

    fn finish(self, strategy: Arc<dyn ControlStrategy>) -> StepEngine {
        let capability = self.capability.unwrap_or_else(CodecCapability::process);
        log::debug!(
            "[gtdrive] instance `{}`: strategy={} watchdog={}ms codec={:?}",
            self.name,
            strategy.name(),
            self.config.watchdog_ms,
            capability
        );
        let output = ControlOutput::safe_stop();
        StepEngine {
            watchdog: Watchdog::new(strategy, self.config.watchdog()),
            encoded: codec::encode(&output, None),
            output,
            name: self.name,
            config: self.config,
            capability,
            state: LifecycleState::Instantiated,
            experiment: None,
            time: 0.0,
            valid: false,
            last_error: None,
            stats: EngineStats::default(),
        }
    }
}

/// One co-simulation participant.
pub struct StepEngine {
    name: String,
    config: DriveConfig,
    capability: CodecCapability,
    watchdog: Watchdog,
    state: LifecycleState,
    experiment: Option<Experiment>,
    time: f64,
    output: ControlOutput,
    encoded: Vec<u8>,
    valid: bool,
    last_error: Option<StepError>,
    stats: EngineStats,
}

impl StepEngine {
    pub fn builder(name: &str) -> EngineBuilder {
        EngineBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Simulation clock: start time plus the sum of completed step sizes.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    pub fn capability(&self) -> CodecCapability {
        self.capability
    }

    pub fn strategy_name(&self) -> &str {
        self.watchdog.strategy_name()
    }

    pub fn experiment(&self) -> Option<&Experiment> {
        self.experiment.as_ref()
    }

    /// Most recent error, kept until the next successful operation.
    pub fn last_error(&self) -> Option<&StepError> {
        self.last_error.as_ref()
    }

    /// `LastErrorCode` value: 0 when the last operation succeeded.
    pub fn last_error_code(&self) -> i32 {
        self.last_error.as_ref().map_or(0, StepError::code)
    }

    /// Record an error raised by the caller on the engine's behalf (e.g. a
    /// bad input pointer), so `last_error_code` reflects it.
    pub fn record_error(&mut self, err: StepError) -> StepError {
        self.record(err)
    }

    pub fn setup_experiment(&mut self, experiment: Experiment) -> Result<()> {
        self.guard("setup_experiment", &[LifecycleState::Instantiated])?;
        experiment.validate().map_err(|err| self.record(err))?;
        self.time = experiment.start_time;
        self.experiment = Some(experiment);
        self.transition(LifecycleState::Initialized);
        self.last_error = None;
        Ok(())
    }

    pub fn enter_initialization_mode(&mut self) -> Result<()> {
        self.guard("enter_initialization_mode", &[LifecycleState::Initialized])?;
        self.last_error = None;
        Ok(())
    }

    pub fn exit_initialization_mode(&mut self) -> Result<()> {
        self.guard("exit_initialization_mode", &[LifecycleState::Initialized])?;
        self.last_error = None;
        Ok(())
    }

    /// Advance one communication step with `payload` as the SensorView input.
    pub fn do_step(
        &mut self,
        current_time: f64,
        step_size: f64,
        payload: &[u8],
    ) -> Result<StepOutcome> {
        self.guard(
            "do_step",
            &[LifecycleState::Initialized, LifecycleState::Stepping],
        )?;
        if !current_time.is_finite() || !step_size.is_finite() || step_size <= 0.0 {
            return Err(self.record(StepError::InvalidArgument(format!(
                "communication point {current_time}, step size {step_size}"
            ))));
        }
        self.sync_clock(current_time);
        if let Some(stop) = self.experiment.as_ref().and_then(|e| e.stop_time) {
            if self.time + step_size > stop + self.time_epsilon(stop) {
                return Err(self.record(StepError::InvalidArgument(format!(
                    "step to {} passes stop time {stop}",
                    self.time + step_size
                ))));
            }
        }

        if payload.is_empty() {
            log::trace!("[gtdrive] `{}` idle step at t={}", self.name, self.time);
            self.stats.idle_steps += 1;
            self.finish_step(step_size);
            return Ok(StepOutcome::Idle);
        }

        let view = match self.capability {
            CodecCapability::Osi => match codec::decode(payload) {
                Ok(view) => Some(view),
                Err(err) => {
                    log::error!("[gtdrive] `{}` rejected input frame: {}", self.name, err);
                    self.substitute_safe_stop();
                    self.transition(LifecycleState::Error);
                    return Err(self.record(StepError::InvalidBuffer(err)));
                }
            },
            CodecCapability::CodecUnavailable => None,
        };
        let input = SensorInput {
            view,
            // The only copy of the payload; trace and record share it.
            payload: Bytes::copy_from_slice(payload),
            simulation_time: self.time,
        };

        self.stats.computed_steps += 1;
        let outcome = match self.watchdog.run(input) {
            Ok(output) => {
                self.stats.consecutive_faults = 0;
                self.output = output;
                self.valid = true;
                StepOutcome::Computed
            }
            Err(fault) => {
                self.stats.faults += 1;
                self.stats.consecutive_faults += 1;
                if fault.is_timeout() {
                    self.stats.timeouts += 1;
                }
                log::warn!(
                    "[gtdrive] `{}` fault {}/{} at t={}: {}",
                    self.name,
                    self.stats.consecutive_faults,
                    self.config.fault_threshold,
                    self.time,
                    fault
                );
                self.substitute_safe_stop();
                // Abandoned workers are never reclaimed, so their count is
                // bounded over the watchdog's lifetime, successes or not.
                let abandoned = self.watchdog.abandoned_workers();
                let threshold = self.config.fault_threshold;
                if self.stats.consecutive_faults >= threshold
                    || (fault.is_timeout() && abandoned >= threshold)
                {
                    self.transition(LifecycleState::Error);
                    let err = if fault.is_timeout() {
                        StepError::Timeout {
                            timeout_ms: self.config.watchdog_ms,
                            faults: self.stats.consecutive_faults.max(abandoned),
                        }
                    } else {
                        StepError::Fatal(format!(
                            "{} consecutive strategy faults, last: {fault}",
                            self.stats.consecutive_faults
                        ))
                    };
                    return Err(self.record(err));
                }
                StepOutcome::Degraded(fault)
            }
        };

        self.finish_step(step_size);
        self.encoded = codec::encode(&self.output, Some(self.time));
        Ok(outcome)
    }

    /// Latest outputs; safe-stop before the first computed step.
    pub fn output(&self) -> Result<&ControlOutput> {
        self.readable("output")?;
        Ok(&self.output)
    }

    /// Latest outputs as an encoded `ControlRecord` (the `OSMPControlOut` buffer).
    pub fn encoded_output(&self) -> Result<&[u8]> {
        self.readable("encoded_output")?;
        Ok(&self.encoded)
    }

    /// `true` when the current outputs came from the strategy.
    pub fn valid(&self) -> Result<bool> {
        self.readable("valid")?;
        Ok(self.valid)
    }

    pub fn terminate(&mut self) -> Result<()> {
        match self.state {
            LifecycleState::Terminated => Ok(()),
            LifecycleState::Initialized | LifecycleState::Stepping | LifecycleState::Error => {
                self.transition(LifecycleState::Terminated);
                Ok(())
            }
            LifecycleState::Instantiated => Err(self.not_ready("terminate")),
        }
    }

    /// Back to `Instantiated` with default outputs and cleared counters.
    pub fn reset(&mut self) -> Result<()> {
        if self.state == LifecycleState::Error {
            return Err(self.fatal("reset"));
        }
        self.output = ControlOutput::safe_stop();
        self.encoded = codec::encode(&self.output, None);
        self.valid = false;
        self.experiment = None;
        self.time = 0.0;
        self.stats = EngineStats::default();
        self.last_error = None;
        self.transition(LifecycleState::Instantiated);
        Ok(())
    }

    fn time_epsilon(&self, reference: f64) -> f64 {
        self.config
            .time_tolerance
            .max(reference.abs() * RELATIVE_TIME_EPSILON)
    }

    fn sync_clock(&mut self, current_time: f64) {
        let drift = (current_time - self.time).abs();
        if drift > self.time_epsilon(current_time) {
            log::warn!(
                "[gtdrive] `{}` communication point {} differs from clock {} by {}, resynchronising",
                self.name,
                current_time,
                self.time,
                drift
            );
            self.time = current_time;
        }
    }

    fn finish_step(&mut self, step_size: f64) {
        self.time += step_size;
        self.last_error = None;
        if self.state == LifecycleState::Initialized {
            self.transition(LifecycleState::Stepping);
        }
    }

    fn substitute_safe_stop(&mut self) {
        self.output = ControlOutput::safe_stop();
        self.valid = false;
        self.encoded = codec::encode(&self.output, Some(self.time));
    }

    fn transition(&mut self, next: LifecycleState) {
        if self.state != next {
            log::debug!("[gtdrive] `{}` {:?} -> {:?}", self.name, self.state, next);
            self.state = next;
        }
    }

    fn guard(&mut self, operation: &'static str, allowed: &[LifecycleState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else if self.state == LifecycleState::Error {
            Err(self.fatal(operation))
        } else {
            Err(self.not_ready(operation))
        }
    }

    fn readable(&self, operation: &'static str) -> Result<()> {
        if self.state == LifecycleState::Error {
            Err(self.fatal(operation))
        } else {
            Ok(())
        }
    }

    fn not_ready(&mut self, operation: &'static str) -> StepError {
        self.record(StepError::NotReady {
            operation,
            state: self.state,
        })
    }

    /// Error-state rejections keep the original cause as `last_error`.
    fn fatal(&self, operation: &str) -> StepError {
        let cause = self
            .last_error
            .as_ref()
            .map_or_else(|| "unknown cause".to_string(), ToString::to_string);
        StepError::Fatal(format!("{operation} rejected, instance in Error ({cause})"))
    }

    fn record(&mut self, err: StepError) -> StepError {
        self.last_error = Some(err.clone());
        err
    }
}

impl std::fmt::Debug for StepEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepEngine")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("time", &self.time)
            .field("strategy", &self.watchdog.strategy_name())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StrategyError;
    use crate::osi::SensorView;

    fn frame() -> Vec<u8> {
        codec::encode_sensor_view(&SensorView::empty())
    }

    fn engine() -> StepEngine {
        StepEngine::builder("test")
            .capability(CodecCapability::Osi)
            .build()
    }

    #[test]
    fn test_initial_outputs_are_safe_stop() {
        let engine = engine();
        assert_eq!(engine.state(), LifecycleState::Instantiated);
        assert_eq!(engine.output().expect("readable"), &ControlOutput::safe_stop());
        assert!(!engine.valid().expect("readable"));
        assert_eq!(engine.last_error_code(), 0);
    }

    #[test]
    fn test_setup_only_once() {
        let mut engine = engine();
        engine.setup_experiment(Experiment::new(1.5)).expect("setup");
        assert_eq!(engine.state(), LifecycleState::Initialized);
        assert_eq!(engine.time(), 1.5);
        let err = engine.setup_experiment(Experiment::new(0.0)).unwrap_err();
        assert!(matches!(err, StepError::NotReady { .. }));
        assert_eq!(engine.state(), LifecycleState::Initialized);
    }

    #[test]
    fn test_setup_rejects_stop_before_start() {
        let mut engine = engine();
        let err = engine
            .setup_experiment(Experiment::new(2.0).with_stop_time(1.0))
            .unwrap_err();
        assert!(matches!(err, StepError::InvalidArgument(_)));
        assert_eq!(engine.state(), LifecycleState::Instantiated);
    }

    #[test]
    fn test_init_mode_calls() {
        let mut engine = engine();
        assert!(engine.enter_initialization_mode().is_err());
        engine.setup_experiment(Experiment::new(0.0)).expect("setup");
        engine.enter_initialization_mode().expect("enter");
        engine.exit_initialization_mode().expect("exit");
        assert_eq!(engine.state(), LifecycleState::Initialized);
    }

    #[test]
    fn test_computed_step_advances_clock() {
        let mut engine = engine();
        engine.setup_experiment(Experiment::new(0.0)).expect("setup");
        let outcome = engine.do_step(0.0, 0.01, &frame()).expect("step");
        assert_eq!(outcome, StepOutcome::Computed);
        assert_eq!(engine.state(), LifecycleState::Stepping);
        assert!((engine.time() - 0.01).abs() < 1e-12);
        assert!(engine.valid().expect("readable"));

        let record = codec::decode_control(engine.encoded_output().expect("readable"))
            .expect("record");
        assert_eq!(record.throttle, 0.5);
        assert_eq!(record.trace, frame());
    }

    #[test]
    fn test_idle_step_keeps_outputs() {
        let mut engine = engine();
        engine.setup_experiment(Experiment::new(0.0)).expect("setup");
        engine.do_step(0.0, 0.01, &frame()).expect("step");
        let before = engine.output().expect("readable").clone();
        assert_eq!(engine.do_step(0.01, 0.01, &[]).expect("idle"), StepOutcome::Idle);
        assert_eq!(engine.output().expect("readable"), &before);
        assert!((engine.time() - 0.02).abs() < 1e-12);
        assert_eq!(engine.stats().idle_steps, 1);
    }

    #[test]
    fn test_invalid_step_size() {
        let mut engine = engine();
        engine.setup_experiment(Experiment::new(0.0)).expect("setup");
        for step in [0.0, -0.1, f64::NAN, f64::INFINITY] {
            let err = engine.do_step(0.0, step, &frame()).unwrap_err();
            assert!(matches!(err, StepError::InvalidArgument(_)));
        }
        assert_eq!(engine.state(), LifecycleState::Initialized);
        assert_eq!(engine.last_error_code(), 12);
    }

    #[test]
    fn test_clock_resync() {
        let mut engine = engine();
        engine.setup_experiment(Experiment::new(0.0)).expect("setup");
        engine.do_step(5.0, 0.5, &[]).expect("idle");
        assert!((engine.time() - 5.5).abs() < 1e-12);
    }

    #[test]
    fn test_stop_time_enforced() {
        let mut engine = engine();
        engine
            .setup_experiment(Experiment::new(0.0).with_stop_time(0.02))
            .expect("setup");
        engine.do_step(0.0, 0.01, &[]).expect("first");
        engine.do_step(0.01, 0.01, &[]).expect("second");
        let err = engine.do_step(0.02, 0.01, &[]).unwrap_err();
        assert!(matches!(err, StepError::InvalidArgument(_)));
    }

    #[test]
    fn test_bad_frame_enters_error() {
        let mut engine = engine();
        engine.setup_experiment(Experiment::new(0.0)).expect("setup");
        let err = engine.do_step(0.0, 0.01, &[0xFF, 0xFF, 0xFF]).unwrap_err();
        assert!(matches!(err, StepError::InvalidBuffer(_)));
        assert_eq!(engine.state(), LifecycleState::Error);
        assert_eq!(engine.last_error_code(), 20);

        let err = engine.do_step(0.0, 0.01, &frame()).unwrap_err();
        assert!(matches!(err, StepError::Fatal(_)));
        assert!(matches!(engine.output(), Err(StepError::Fatal(_))));
        assert!(matches!(engine.reset(), Err(StepError::Fatal(_))));
        // Root cause survives the rejections.
        assert_eq!(engine.last_error_code(), 20);

        engine.terminate().expect("terminate from Error");
        assert_eq!(engine.state(), LifecycleState::Terminated);
    }

    #[test]
    fn test_opaque_codec_skips_decoding() {
        let seen = |input: &SensorInput| -> std::result::Result<ControlOutput, StrategyError> {
            assert!(input.view.is_none());
            Ok(ControlOutput {
                trace: input.payload.clone(),
                ..ControlOutput::default()
            })
        };
        let mut engine = StepEngine::builder("opaque")
            .capability(CodecCapability::CodecUnavailable)
            .strategy(Arc::new(seen))
            .build();
        engine.setup_experiment(Experiment::new(0.0)).expect("setup");
        engine.do_step(0.0, 0.01, &[0xFF, 0xFF, 0xFF]).expect("opaque");
        assert_eq!(engine.output().expect("readable").trace, vec![0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_fault_threshold() {
        let failing = |_: &SensorInput| -> std::result::Result<ControlOutput, StrategyError> {
            Err(StrategyError::new("failing", "no plan"))
        };
        let mut config = DriveConfig::default();
        config.fault_threshold = 2;
        config.watchdog_ms = 0;
        let mut engine = StepEngine::builder("faulty")
            .capability(CodecCapability::Osi)
            .config(config)
            .strategy(Arc::new(failing))
            .build();
        engine.setup_experiment(Experiment::new(0.0)).expect("setup");

        let outcome = engine.do_step(0.0, 0.01, &frame()).expect("degraded");
        assert_eq!(outcome.status(), Fmi2Status::Warning);
        assert_eq!(engine.output().expect("readable"), &ControlOutput::safe_stop());
        assert!(!engine.valid().expect("readable"));

        let err = engine.do_step(0.01, 0.01, &frame()).unwrap_err();
        assert!(matches!(err, StepError::Fatal(_)));
        assert_eq!(engine.state(), LifecycleState::Error);
        assert_eq!(engine.stats().faults, 2);
    }

    #[test]
    fn test_reset_and_terminate() {
        let mut engine = engine();
        assert!(matches!(
            engine.terminate(),
            Err(StepError::NotReady { .. })
        ));
        engine.setup_experiment(Experiment::new(0.0)).expect("setup");
        engine.do_step(0.0, 0.01, &frame()).expect("step");
        engine.reset().expect("reset");
        assert_eq!(engine.state(), LifecycleState::Instantiated);
        assert_eq!(engine.output().expect("readable"), &ControlOutput::safe_stop());
        assert_eq!(engine.stats(), EngineStats::default());

        engine.setup_experiment(Experiment::new(0.0)).expect("setup again");
        engine.terminate().expect("terminate");
        engine.terminate().expect("idempotent");
        assert!(matches!(
            engine.do_step(0.0, 0.01, &frame()),
            Err(StepError::NotReady { .. })
        ));
    }
}
