// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-handle state: the engine plus what the FMI layer adds around it.

use gtdrive::fmi2::{
    Fmi2Boolean, Fmi2Integer, Fmi2Real, Fmi2Status, Fmi2ValueReference, FMI2_FALSE, FMI2_TRUE,
};
use gtdrive::osmp::{self, BinaryVariable};
use gtdrive::variables::{self as vars, Causality, VariableType};
use gtdrive::{LifecycleState, StepEngine, StepError, StepOutcome};

use crate::logging::HostLogger;

/// Why a value-reference access was refused.
#[derive(Debug)]
pub(crate) enum AccessError {
    Step(StepError),
    UnknownReference(Fmi2ValueReference),
    WrongType(Fmi2ValueReference, VariableType),
    ReadOnly(Fmi2ValueReference),
}

impl AccessError {
    pub(crate) fn status(&self) -> Fmi2Status {
        match self {
            AccessError::Step(err) => err.status(),
            _ => Fmi2Status::Error,
        }
    }
}

impl std::fmt::Display for AccessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessError::Step(err) => write!(f, "{err}"),
            AccessError::UnknownReference(vr) => write!(f, "unknown value reference {vr}"),
            AccessError::WrongType(vr, expected) => {
                write!(f, "value reference {vr} is not of type {expected:?}")
            }
            AccessError::ReadOnly(vr) => write!(f, "value reference {vr} is not an input"),
        }
    }
}

impl From<StepError> for AccessError {
    fn from(err: StepError) -> Self {
        AccessError::Step(err)
    }
}

pub(crate) struct Instance {
    pub(crate) name: String,
    pub(crate) engine: StepEngine,
    pub(crate) logger: HostLogger,
    /// OSMPSensorViewIn triple as last set by the host.
    input: BinaryVariable,
    /// Status of the last `fmi2DoStep`, for `fmi2GetStatus`.
    pub(crate) last_step_status: Fmi2Status,
}

impl Instance {
    pub(crate) fn new(name: &str, engine: StepEngine, logger: HostLogger) -> Self {
        Self {
            name: name.to_string(),
            engine,
            logger,
            input: BinaryVariable::default(),
            last_step_status: Fmi2Status::Ok,
        }
    }

    /// Log a failed call and turn it into its status.
    pub(crate) fn report(
        &self,
        operation: &str,
        err: &dyn std::fmt::Display,
        status: Fmi2Status,
    ) -> Fmi2Status {
        self.logger
            .emit(status, &format!("{}: {operation} failed: {err}", self.name));
        status
    }

    pub(crate) fn step_result(&mut self, result: Result<StepOutcome, StepError>) -> Fmi2Status {
        let status = match result {
            Ok(StepOutcome::Degraded(fault)) => {
                self.logger.emit(
                    Fmi2Status::Warning,
                    &format!(
                        "{}: safe-stop outputs at t={}: {fault}",
                        self.name,
                        self.engine.time()
                    ),
                );
                Fmi2Status::Warning
            }
            Ok(outcome) => outcome.status(),
            Err(err) => self.report("fmi2DoStep", &err, err.status()),
        };
        self.last_step_status = status;
        status
    }

    /// SensorView bytes described by the OSMP input triple.
    ///
    /// # Safety
    /// The host guarantees the buffer stays valid until `fmi2DoStep` returns.
    pub(crate) unsafe fn input_payload<'a>(&self) -> Result<&'a [u8], StepError> {
        self.input.as_slice().ok_or_else(|| {
            StepError::InvalidArgument(format!(
                "OSMPSensorViewIn: null pointer or negative size ({} bytes)",
                self.input.size
            ))
        })
    }

    pub(crate) fn get_real(&self, vr: Fmi2ValueReference) -> Result<Fmi2Real, AccessError> {
        check_type(vr, VariableType::Real)?;
        let output = self.engine.output()?;
        Ok(match vr {
            vars::VR_THROTTLE => output.throttle,
            vars::VR_BRAKE => output.brake,
            vars::VR_STEERING => output.steering,
            other => return Err(AccessError::UnknownReference(other)),
        })
    }

    pub(crate) fn get_integer(&self, vr: Fmi2ValueReference) -> Result<Fmi2Integer, AccessError> {
        check_type(vr, VariableType::Integer)?;
        // Readable in every state, including Error, so hosts can see why.
        if vr == vars::VR_LAST_ERROR_CODE {
            return Ok(self.engine.last_error_code());
        }
        match vr {
            vars::VR_SENSOR_VIEW_IN_BASE_LO => Ok(self.input.lo),
            vars::VR_SENSOR_VIEW_IN_BASE_HI => Ok(self.input.hi),
            vars::VR_SENSOR_VIEW_IN_SIZE => Ok(self.input.size),
            vars::VR_DRIVE_MODE => Ok(self.engine.output()?.drive_mode.as_raw()),
            vars::VR_CONTROL_OUT_BASE_LO
            | vars::VR_CONTROL_OUT_BASE_HI
            | vars::VR_CONTROL_OUT_SIZE => {
                let buffer = BinaryVariable::describe(self.engine.encoded_output()?);
                Ok(match vr {
                    vars::VR_CONTROL_OUT_BASE_LO => buffer.lo,
                    vars::VR_CONTROL_OUT_BASE_HI => buffer.hi,
                    _ => buffer.size,
                })
            }
            other => Err(AccessError::UnknownReference(other)),
        }
    }

    pub(crate) fn get_boolean(&self, vr: Fmi2ValueReference) -> Result<Fmi2Boolean, AccessError> {
        check_type(vr, VariableType::Boolean)?;
        match vr {
            vars::VR_VALID => Ok(if self.engine.valid()? { FMI2_TRUE } else { FMI2_FALSE }),
            other => Err(AccessError::UnknownReference(other)),
        }
    }

    pub(crate) fn set_integer(
        &mut self,
        vr: Fmi2ValueReference,
        value: Fmi2Integer,
    ) -> Result<(), AccessError> {
        let variable = check_type(vr, VariableType::Integer)?;
        if variable.causality != Causality::Input {
            return Err(AccessError::ReadOnly(vr));
        }
        if self.engine.state() == LifecycleState::Error {
            return Err(AccessError::Step(StepError::Fatal(
                "inputs rejected, instance in Error".to_string(),
            )));
        }
        match vr {
            vars::VR_SENSOR_VIEW_IN_BASE_LO => self.input.lo = value,
            vars::VR_SENSOR_VIEW_IN_BASE_HI => self.input.hi = value,
            vars::VR_SENSOR_VIEW_IN_SIZE => self.input.size = value,
            other => return Err(AccessError::UnknownReference(other)),
        }
        Ok(())
    }

    /// Forget the input triple (reset, terminate).
    pub(crate) fn clear_input(&mut self) {
        self.input = BinaryVariable::default();
    }

    /// Address of the current input buffer, for trace logging only.
    pub(crate) fn input_address(&self) -> usize {
        osmp::join_pointer(self.input.lo, self.input.hi) as usize
    }
}

fn check_type(
    vr: Fmi2ValueReference,
    expected: VariableType,
) -> Result<&'static vars::Variable, AccessError> {
    let variable = vars::lookup(vr).ok_or(AccessError::UnknownReference(vr))?;
    if variable.kind == expected {
        Ok(variable)
    } else {
        Err(AccessError::WrongType(vr, expected))
    }
}
