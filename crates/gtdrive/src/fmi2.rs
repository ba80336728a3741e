// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! FMI 2.0 platform types (`fmi2TypesPlatform.h`, `fmi2FunctionTypes.h`).
//!
//! Shared by the exporting shim and the diagnostic harness that imports the
//! same symbols through `libloading`. Enumerations received *from* the host are
//! taken as `c_int` at the call site; only [`Fmi2Status`] is passed as a Rust
//! enum because the library produces it.

use std::ffi::{c_char, c_int, c_uint, c_void, CStr};

pub type Fmi2Component = *mut c_void;
pub type Fmi2ComponentEnvironment = *mut c_void;
pub type Fmi2FmuState = *mut c_void;
pub type Fmi2ValueReference = c_uint;
pub type Fmi2Real = f64;
pub type Fmi2Integer = c_int;
pub type Fmi2Boolean = c_int;
pub type Fmi2Char = c_char;
pub type Fmi2String = *const Fmi2Char;
pub type Fmi2Byte = c_char;

pub const FMI2_TRUE: Fmi2Boolean = 1;
pub const FMI2_FALSE: Fmi2Boolean = 0;

/// Value returned by `fmi2GetVersion`.
pub const FMI2_VERSION: &CStr = c"2.0";
/// Value returned by `fmi2GetTypesPlatform`.
pub const FMI2_TYPES_PLATFORM: &CStr = c"default";

/// `fmi2Status`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fmi2Status {
    Ok = 0,
    Warning = 1,
    Discard = 2,
    Error = 3,
    Fatal = 4,
    Pending = 5,
}

impl Fmi2Status {
    pub fn from_raw(raw: c_int) -> Option<Self> {
        match raw {
            0 => Some(Fmi2Status::Ok),
            1 => Some(Fmi2Status::Warning),
            2 => Some(Fmi2Status::Discard),
            3 => Some(Fmi2Status::Error),
            4 => Some(Fmi2Status::Fatal),
            5 => Some(Fmi2Status::Pending),
            _ => None,
        }
    }

    /// Log category name recommended by the standard for this status.
    pub fn category(self) -> &'static CStr {
        match self {
            Fmi2Status::Ok | Fmi2Status::Pending => c"logAll",
            Fmi2Status::Warning => c"logStatusWarning",
            Fmi2Status::Discard => c"logStatusDiscard",
            Fmi2Status::Error => c"logStatusError",
            Fmi2Status::Fatal => c"logStatusFatal",
        }
    }
}

/// `fmi2Type` raw values
pub const FMI2_MODEL_EXCHANGE: c_int = 0;
pub const FMI2_CO_SIMULATION: c_int = 1;

/// `fmi2StatusKind` raw values
pub const FMI2_DO_STEP_STATUS: c_int = 0;
pub const FMI2_PENDING_STATUS: c_int = 1;
pub const FMI2_LAST_SUCCESSFUL_TIME: c_int = 2;
pub const FMI2_TERMINATED: c_int = 3;

pub type Fmi2CallbackLogger = Option<
    unsafe extern "C" fn(
        Fmi2ComponentEnvironment,
        Fmi2String,
        Fmi2Status,
        Fmi2String,
        Fmi2String,
        ...
    ),
>;
pub type Fmi2CallbackAllocateMemory = Option<unsafe extern "C" fn(usize, usize) -> *mut c_void>;
pub type Fmi2CallbackFreeMemory = Option<unsafe extern "C" fn(*mut c_void)>;
pub type Fmi2StepFinished = Option<unsafe extern "C" fn(Fmi2ComponentEnvironment, Fmi2Status)>;

/// `fmi2CallbackFunctions`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Fmi2CallbackFunctions {
    pub logger: Fmi2CallbackLogger,
    pub allocate_memory: Fmi2CallbackAllocateMemory,
    pub free_memory: Fmi2CallbackFreeMemory,
    pub step_finished: Fmi2StepFinished,
    pub component_environment: Fmi2ComponentEnvironment,
}

impl Default for Fmi2CallbackFunctions {
    fn default() -> Self {
        Self {
            logger: None,
            allocate_memory: None,
            free_memory: None,
            step_finished: None,
            component_environment: std::ptr::null_mut(),
        }
    }
}

// =============================================================================
// Function signatures (importer side)
// =============================================================================

pub type Fmi2GetVersionFn = unsafe extern "C" fn() -> Fmi2String;
pub type Fmi2GetTypesPlatformFn = unsafe extern "C" fn() -> Fmi2String;
pub type Fmi2InstantiateFn = unsafe extern "C" fn(
    Fmi2String,
    c_int,
    Fmi2String,
    Fmi2String,
    *const Fmi2CallbackFunctions,
    Fmi2Boolean,
    Fmi2Boolean,
) -> Fmi2Component;
pub type Fmi2FreeInstanceFn = unsafe extern "C" fn(Fmi2Component);
pub type Fmi2SetupExperimentFn = unsafe extern "C" fn(
    Fmi2Component,
    Fmi2Boolean,
    Fmi2Real,
    Fmi2Real,
    Fmi2Boolean,
    Fmi2Real,
) -> Fmi2Status;
pub type Fmi2ComponentFn = unsafe extern "C" fn(Fmi2Component) -> Fmi2Status;
pub type Fmi2DoStepFn =
    unsafe extern "C" fn(Fmi2Component, Fmi2Real, Fmi2Real, Fmi2Boolean) -> Fmi2Status;
pub type Fmi2GetRealFn = unsafe extern "C" fn(
    Fmi2Component,
    *const Fmi2ValueReference,
    usize,
    *mut Fmi2Real,
) -> Fmi2Status;
pub type Fmi2GetIntegerFn = unsafe extern "C" fn(
    Fmi2Component,
    *const Fmi2ValueReference,
    usize,
    *mut Fmi2Integer,
) -> Fmi2Status;
pub type Fmi2SetIntegerFn = unsafe extern "C" fn(
    Fmi2Component,
    *const Fmi2ValueReference,
    usize,
    *const Fmi2Integer,
) -> Fmi2Status;

/// Every symbol a Co-Simulation FMU must export.
pub const COSIMULATION_SYMBOLS: &[&str] = &[
    "fmi2GetTypesPlatform",
    "fmi2GetVersion",
    "fmi2SetDebugLogging",
    "fmi2Instantiate",
    "fmi2FreeInstance",
    "fmi2SetupExperiment",
    "fmi2EnterInitializationMode",
    "fmi2ExitInitializationMode",
    "fmi2Terminate",
    "fmi2Reset",
    "fmi2GetReal",
    "fmi2GetInteger",
    "fmi2GetBoolean",
    "fmi2GetString",
    "fmi2SetReal",
    "fmi2SetInteger",
    "fmi2SetBoolean",
    "fmi2SetString",
    "fmi2GetFMUstate",
    "fmi2SetFMUstate",
    "fmi2FreeFMUstate",
    "fmi2SerializedFMUstateSize",
    "fmi2SerializeFMUstate",
    "fmi2DeSerializeFMUstate",
    "fmi2GetDirectionalDerivative",
    "fmi2SetRealInputDerivatives",
    "fmi2GetRealOutputDerivatives",
    "fmi2DoStep",
    "fmi2CancelStep",
    "fmi2GetStatus",
    "fmi2GetRealStatus",
    "fmi2GetIntegerStatus",
    "fmi2GetBooleanStatus",
    "fmi2GetStringStatus",
];
