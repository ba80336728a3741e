// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # GT-DriveController FMI 2.0 Co-Simulation shim
//!
//! Exports the `fmi2*` symbol table and maps each call onto a
//! [`gtdrive::StepEngine`]. Built as `gtdrive_fmi.{dll,so,dylib}`, which is
//! the `modelIdentifier` declared in `modelDescription.xml`.
//!
//! # Safety
//!
//! All exported functions are `unsafe`: the host must pass pointers that obey
//! the FMI 2.0 standard (NUL-terminated strings, arrays of the announced
//! length, an OSMP input buffer that stays valid until `fmi2DoStep` returns).
//!
//! Inside those rules nothing the host does can crash the process through this
//! library: handles are registry keys, every entry point checks them, and
//! panics are caught before they reach the C boundary.

#![allow(non_snake_case)] // FMI symbol names

mod instance;
mod logging;
mod registry;
mod uri;

pub use logging::LOG_ENV;
pub use uri::file_uri_to_path;

use std::ffi::{c_char, c_int, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use gtdrive::fmi2::{
    Fmi2Boolean, Fmi2Byte, Fmi2CallbackFunctions, Fmi2Component, Fmi2FmuState, Fmi2Integer,
    Fmi2Real, Fmi2Status, Fmi2String, Fmi2ValueReference, FMI2_CO_SIMULATION,
    FMI2_DO_STEP_STATUS, FMI2_FALSE, FMI2_LAST_SUCCESSFUL_TIME, FMI2_TERMINATED, FMI2_TRUE,
    FMI2_TYPES_PLATFORM, FMI2_VERSION,
};
use gtdrive::variables::{self as vars, VariableType, MODEL_GUID};
use gtdrive::{resolver, DriveConfig, Experiment, LifecycleState, StepEngine, StepError};

use instance::{AccessError, Instance};
use logging::HostLogger;

/// Run `body`, turning a panic into `fmi2Fatal`.
fn guarded(operation: &str, body: impl FnOnce() -> Fmi2Status) -> Fmi2Status {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(status) => status,
        Err(_) => {
            log::error!("[gtdrive-fmi] panic caught in {}", operation);
            Fmi2Status::Fatal
        }
    }
}

/// Resolve `c` and run `body` with the instance locked.
fn with_instance(
    c: Fmi2Component,
    operation: &str,
    body: impl FnOnce(&mut Instance) -> Fmi2Status,
) -> Fmi2Status {
    guarded(operation, || {
        let Some(shared) = registry::get(c) else {
            log::error!(
                "[gtdrive-fmi] {}: {} ({:p})",
                operation,
                StepError::InvalidHandle,
                c
            );
            return StepError::InvalidHandle.status();
        };
        let mut instance = shared.lock();
        body(&mut instance)
    })
}

/// Borrow a host array; `None` for NULL with a non-zero length.
unsafe fn host_slice<'a, T>(data: *const T, len: usize) -> Option<&'a [T]> {
    if len == 0 {
        Some(&[])
    } else if data.is_null() {
        None
    } else {
        Some(std::slice::from_raw_parts(data, len))
    }
}

unsafe fn host_slice_mut<'a, T>(data: *mut T, len: usize) -> Option<&'a mut [T]> {
    if len == 0 {
        Some(&mut [])
    } else if data.is_null() {
        None
    } else {
        Some(std::slice::from_raw_parts_mut(data, len))
    }
}

unsafe fn host_str(text: Fmi2String) -> Option<String> {
    if text.is_null() {
        None
    } else {
        Some(CStr::from_ptr(text).to_string_lossy().into_owned())
    }
}

/// Shared body of the typed getters.
unsafe fn get_values<T>(
    c: Fmi2Component,
    operation: &str,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    value: *mut T,
    read: fn(&Instance, Fmi2ValueReference) -> Result<T, AccessError>,
) -> Fmi2Status {
    with_instance(c, operation, |instance| {
        let (Some(vrs), Some(values)) = (host_slice(vr, nvr), host_slice_mut(value, nvr)) else {
            return instance.report(operation, &"NULL array", Fmi2Status::Error);
        };
        for (vr, slot) in vrs.iter().zip(values.iter_mut()) {
            match read(instance, *vr) {
                Ok(v) => *slot = v,
                Err(err) => return instance.report(operation, &err, err.status()),
            }
        }
        Fmi2Status::Ok
    })
}

/// Body of the accessors that can never succeed: setters of output-only types
/// and the string accessors (`kind` = `None`, the model has no strings).
unsafe fn reject_values(
    c: Fmi2Component,
    operation: &str,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    kind: Option<VariableType>,
) -> Fmi2Status {
    with_instance(c, operation, |instance| {
        let Some(vrs) = host_slice(vr, nvr) else {
            return instance.report(operation, &"NULL array", Fmi2Status::Error);
        };
        let Some(&vr) = vrs.first() else {
            return Fmi2Status::Ok;
        };
        let err = match (vars::lookup(vr), kind) {
            (Some(v), Some(kind)) if v.kind == kind => AccessError::ReadOnly(vr),
            (Some(_), Some(kind)) => AccessError::WrongType(vr, kind),
            _ => AccessError::UnknownReference(vr),
        };
        instance.report(operation, &err, err.status())
    })
}

unsafe fn unsupported(c: Fmi2Component, operation: &str) -> Fmi2Status {
    with_instance(c, operation, |instance| {
        instance.report(operation, &"capability not provided", Fmi2Status::Error)
    })
}

// =============================================================================
// Inquire version numbers and set debug logging
// =============================================================================

#[no_mangle]
pub unsafe extern "C" fn fmi2GetTypesPlatform() -> *const c_char {
    FMI2_TYPES_PLATFORM.as_ptr()
}

#[no_mangle]
pub unsafe extern "C" fn fmi2GetVersion() -> *const c_char {
    FMI2_VERSION.as_ptr()
}

/// Crate version of the shim (static storage, not part of FMI).
#[no_mangle]
pub unsafe extern "C" fn gtdrive_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr().cast()
}

#[no_mangle]
pub unsafe extern "C" fn fmi2SetDebugLogging(
    c: Fmi2Component,
    logging_on: Fmi2Boolean,
    n_categories: usize,
    categories: *const Fmi2String,
) -> Fmi2Status {
    with_instance(c, "fmi2SetDebugLogging", |instance| {
        instance.logger.set_enabled(logging_on != FMI2_FALSE);
        if let Some(categories) = host_slice(categories, n_categories) {
            for category in categories.iter().filter_map(|c| host_str(*c)) {
                log::debug!("[gtdrive-fmi] {}: log category {}", instance.name, category);
            }
        }
        Fmi2Status::Ok
    })
}

// =============================================================================
// Creation and destruction
// =============================================================================

#[no_mangle]
pub unsafe extern "C" fn fmi2Instantiate(
    instance_name: Fmi2String,
    fmu_type: c_int,
    fmu_guid: Fmi2String,
    fmu_resource_location: Fmi2String,
    functions: *const Fmi2CallbackFunctions,
    _visible: Fmi2Boolean,
    logging_on: Fmi2Boolean,
) -> Fmi2Component {
    logging::init();
    resolver::register_install_dir();

    let created = panic::catch_unwind(AssertUnwindSafe(|| {
        instantiate(
            instance_name,
            fmu_type,
            fmu_guid,
            fmu_resource_location,
            functions,
            logging_on,
        )
    }));
    match created {
        Ok(Some(instance)) => registry::insert(instance),
        Ok(None) => ptr::null_mut(),
        Err(_) => {
            log::error!("[gtdrive-fmi] panic caught in fmi2Instantiate");
            ptr::null_mut()
        }
    }
}

unsafe fn instantiate(
    instance_name: Fmi2String,
    fmu_type: c_int,
    fmu_guid: Fmi2String,
    fmu_resource_location: Fmi2String,
    functions: *const Fmi2CallbackFunctions,
    logging_on: Fmi2Boolean,
) -> Option<Instance> {
    let name = host_str(instance_name)?;
    let callbacks = functions.as_ref().copied().unwrap_or_default();
    let logger = HostLogger::new(
        callbacks.logger,
        callbacks.component_environment,
        &name,
        logging_on != FMI2_FALSE,
    );
    let fail = |message: String| -> Option<Instance> {
        logger.emit(Fmi2Status::Error, &format!("{name}: fmi2Instantiate: {message}"));
        None
    };

    if fmu_type != FMI2_CO_SIMULATION {
        return fail(format!("fmuType {fmu_type} not supported, only fmi2CoSimulation"));
    }
    match host_str(fmu_guid) {
        Some(guid) if guid == MODEL_GUID => {}
        other => return fail(format!("GUID {other:?} does not match {MODEL_GUID}")),
    }

    let resources = host_str(fmu_resource_location).and_then(|location| {
        let path = file_uri_to_path(&location);
        if path.is_none() {
            logger.emit(
                Fmi2Status::Warning,
                &format!("{name}: ignoring unusable resource location {location:?}"),
            );
        }
        path
    });

    let config = match DriveConfig::load(resources.as_deref()) {
        Ok(config) => config,
        Err(err) => return fail(err.to_string()),
    };
    let mut builder = StepEngine::builder(&name).config(config);
    if let Some(dir) = &resources {
        builder = builder.resources(dir.clone());
    }
    let engine = match builder.try_build() {
        Ok(engine) => engine,
        Err(err) => return fail(err.to_string()),
    };
    logger.emit(
        Fmi2Status::Ok,
        &format!(
            "{name}: instantiated (strategy {}, resources {:?})",
            engine.strategy_name(),
            resources
        ),
    );
    Some(Instance::new(&name, engine, logger))
}

#[no_mangle]
pub unsafe extern "C" fn fmi2FreeInstance(c: Fmi2Component) {
    guarded("fmi2FreeInstance", || {
        match registry::remove(c) {
            Some(instance) => {
                let instance = instance.lock();
                instance
                    .logger
                    .emit(Fmi2Status::Ok, &format!("{}: freed", instance.name));
            }
            None => log::warn!("[gtdrive-fmi] fmi2FreeInstance: unknown handle {:p}", c),
        }
        Fmi2Status::Ok
    });
}

// =============================================================================
// Initialization, termination, reset
// =============================================================================

#[no_mangle]
pub unsafe extern "C" fn fmi2SetupExperiment(
    c: Fmi2Component,
    tolerance_defined: Fmi2Boolean,
    tolerance: Fmi2Real,
    start_time: Fmi2Real,
    stop_time_defined: Fmi2Boolean,
    stop_time: Fmi2Real,
) -> Fmi2Status {
    with_instance(c, "fmi2SetupExperiment", |instance| {
        let mut experiment = Experiment::new(start_time);
        if tolerance_defined != FMI2_FALSE {
            experiment = experiment.with_tolerance(tolerance);
        }
        if stop_time_defined != FMI2_FALSE {
            experiment = experiment.with_stop_time(stop_time);
        }
        match instance.engine.setup_experiment(experiment) {
            Ok(()) => Fmi2Status::Ok,
            Err(err) => instance.report("fmi2SetupExperiment", &err, err.status()),
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn fmi2EnterInitializationMode(c: Fmi2Component) -> Fmi2Status {
    with_instance(c, "fmi2EnterInitializationMode", |instance| {
        match instance.engine.enter_initialization_mode() {
            Ok(()) => Fmi2Status::Ok,
            Err(err) => instance.report("fmi2EnterInitializationMode", &err, err.status()),
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn fmi2ExitInitializationMode(c: Fmi2Component) -> Fmi2Status {
    with_instance(c, "fmi2ExitInitializationMode", |instance| {
        match instance.engine.exit_initialization_mode() {
            Ok(()) => Fmi2Status::Ok,
            Err(err) => instance.report("fmi2ExitInitializationMode", &err, err.status()),
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn fmi2Terminate(c: Fmi2Component) -> Fmi2Status {
    with_instance(c, "fmi2Terminate", |instance| {
        match instance.engine.terminate() {
            Ok(()) => {
                instance.clear_input();
                Fmi2Status::Ok
            }
            Err(err) => instance.report("fmi2Terminate", &err, err.status()),
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn fmi2Reset(c: Fmi2Component) -> Fmi2Status {
    with_instance(c, "fmi2Reset", |instance| match instance.engine.reset() {
        Ok(()) => {
            instance.clear_input();
            instance.last_step_status = Fmi2Status::Ok;
            Fmi2Status::Ok
        }
        Err(err) => instance.report("fmi2Reset", &err, err.status()),
    })
}

// =============================================================================
// Getting and setting variable values
// =============================================================================

#[no_mangle]
pub unsafe extern "C" fn fmi2GetReal(
    c: Fmi2Component,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    value: *mut Fmi2Real,
) -> Fmi2Status {
    get_values(c, "fmi2GetReal", vr, nvr, value, Instance::get_real)
}

#[no_mangle]
pub unsafe extern "C" fn fmi2GetInteger(
    c: Fmi2Component,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    value: *mut Fmi2Integer,
) -> Fmi2Status {
    get_values(c, "fmi2GetInteger", vr, nvr, value, Instance::get_integer)
}

#[no_mangle]
pub unsafe extern "C" fn fmi2GetBoolean(
    c: Fmi2Component,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    value: *mut Fmi2Boolean,
) -> Fmi2Status {
    get_values(c, "fmi2GetBoolean", vr, nvr, value, Instance::get_boolean)
}

#[no_mangle]
pub unsafe extern "C" fn fmi2GetString(
    c: Fmi2Component,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    _value: *mut Fmi2String,
) -> Fmi2Status {
    reject_values(c, "fmi2GetString", vr, nvr, None)
}

#[no_mangle]
pub unsafe extern "C" fn fmi2SetReal(
    c: Fmi2Component,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    _value: *const Fmi2Real,
) -> Fmi2Status {
    reject_values(c, "fmi2SetReal", vr, nvr, Some(VariableType::Real))
}

#[no_mangle]
pub unsafe extern "C" fn fmi2SetInteger(
    c: Fmi2Component,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    value: *const Fmi2Integer,
) -> Fmi2Status {
    with_instance(c, "fmi2SetInteger", |instance| {
        let (Some(vrs), Some(values)) = (host_slice(vr, nvr), host_slice(value, nvr)) else {
            return instance.report("fmi2SetInteger", &"NULL array", Fmi2Status::Error);
        };
        for (vr, value) in vrs.iter().zip(values) {
            if let Err(err) = instance.set_integer(*vr, *value) {
                return instance.report("fmi2SetInteger", &err, err.status());
            }
        }
        Fmi2Status::Ok
    })
}

#[no_mangle]
pub unsafe extern "C" fn fmi2SetBoolean(
    c: Fmi2Component,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    _value: *const Fmi2Boolean,
) -> Fmi2Status {
    reject_values(c, "fmi2SetBoolean", vr, nvr, Some(VariableType::Boolean))
}

#[no_mangle]
pub unsafe extern "C" fn fmi2SetString(
    c: Fmi2Component,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    _value: *const Fmi2String,
) -> Fmi2Status {
    reject_values(c, "fmi2SetString", vr, nvr, None)
}

// =============================================================================
// FMU state, derivatives (canGetAndSetFMUstate / canSerializeFMUstate = false)
// =============================================================================

#[no_mangle]
pub unsafe extern "C" fn fmi2GetFMUstate(
    c: Fmi2Component,
    _state: *mut Fmi2FmuState,
) -> Fmi2Status {
    unsupported(c, "fmi2GetFMUstate")
}

#[no_mangle]
pub unsafe extern "C" fn fmi2SetFMUstate(c: Fmi2Component, _state: Fmi2FmuState) -> Fmi2Status {
    unsupported(c, "fmi2SetFMUstate")
}

#[no_mangle]
pub unsafe extern "C" fn fmi2FreeFMUstate(
    c: Fmi2Component,
    _state: *mut Fmi2FmuState,
) -> Fmi2Status {
    unsupported(c, "fmi2FreeFMUstate")
}

#[no_mangle]
pub unsafe extern "C" fn fmi2SerializedFMUstateSize(
    c: Fmi2Component,
    _state: Fmi2FmuState,
    _size: *mut usize,
) -> Fmi2Status {
    unsupported(c, "fmi2SerializedFMUstateSize")
}

#[no_mangle]
pub unsafe extern "C" fn fmi2SerializeFMUstate(
    c: Fmi2Component,
    _state: Fmi2FmuState,
    _bytes: *mut Fmi2Byte,
    _size: usize,
) -> Fmi2Status {
    unsupported(c, "fmi2SerializeFMUstate")
}

#[no_mangle]
pub unsafe extern "C" fn fmi2DeSerializeFMUstate(
    c: Fmi2Component,
    _bytes: *const Fmi2Byte,
    _size: usize,
    _state: *mut Fmi2FmuState,
) -> Fmi2Status {
    unsupported(c, "fmi2DeSerializeFMUstate")
}

#[no_mangle]
pub unsafe extern "C" fn fmi2GetDirectionalDerivative(
    c: Fmi2Component,
    _v_unknown_ref: *const Fmi2ValueReference,
    _n_unknown: usize,
    _v_known_ref: *const Fmi2ValueReference,
    _n_known: usize,
    _dv_known: *const Fmi2Real,
    _dv_unknown: *mut Fmi2Real,
) -> Fmi2Status {
    unsupported(c, "fmi2GetDirectionalDerivative")
}

#[no_mangle]
pub unsafe extern "C" fn fmi2SetRealInputDerivatives(
    c: Fmi2Component,
    _vr: *const Fmi2ValueReference,
    _nvr: usize,
    _order: *const Fmi2Integer,
    _value: *const Fmi2Real,
) -> Fmi2Status {
    unsupported(c, "fmi2SetRealInputDerivatives")
}

#[no_mangle]
pub unsafe extern "C" fn fmi2GetRealOutputDerivatives(
    c: Fmi2Component,
    _vr: *const Fmi2ValueReference,
    _nvr: usize,
    _order: *const Fmi2Integer,
    _value: *mut Fmi2Real,
) -> Fmi2Status {
    unsupported(c, "fmi2GetRealOutputDerivatives")
}

// =============================================================================
// Co-simulation stepping
// =============================================================================

#[no_mangle]
pub unsafe extern "C" fn fmi2DoStep(
    c: Fmi2Component,
    current_communication_point: Fmi2Real,
    communication_step_size: Fmi2Real,
    _no_set_fmu_state_prior: Fmi2Boolean,
) -> Fmi2Status {
    with_instance(c, "fmi2DoStep", |instance| {
        log::trace!(
            "[gtdrive-fmi] {}: doStep t={} h={} input=0x{:x}",
            instance.name,
            current_communication_point,
            communication_step_size,
            instance.input_address()
        );
        let result = match instance.input_payload() {
            Ok(payload) => instance.engine.do_step(
                current_communication_point,
                communication_step_size,
                payload,
            ),
            Err(err) => match instance.engine.state() {
                LifecycleState::Initialized | LifecycleState::Stepping => {
                    Err(instance.engine.record_error(err))
                }
                // Let the engine answer NotReady / Fatal for the current state.
                _ => instance.engine.do_step(
                    current_communication_point,
                    communication_step_size,
                    &[],
                ),
            },
        };
        instance.step_result(result)
    })
}

#[no_mangle]
pub unsafe extern "C" fn fmi2CancelStep(c: Fmi2Component) -> Fmi2Status {
    // doStep never returns fmi2Pending, so there is nothing to cancel.
    unsupported(c, "fmi2CancelStep")
}

#[no_mangle]
pub unsafe extern "C" fn fmi2GetStatus(
    c: Fmi2Component,
    kind: c_int,
    value: *mut Fmi2Status,
) -> Fmi2Status {
    with_instance(c, "fmi2GetStatus", |instance| {
        if value.is_null() {
            return instance.report("fmi2GetStatus", &"NULL value", Fmi2Status::Error);
        }
        match kind {
            FMI2_DO_STEP_STATUS => {
                *value = instance.last_step_status;
                Fmi2Status::Ok
            }
            _ => Fmi2Status::Discard,
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn fmi2GetRealStatus(
    c: Fmi2Component,
    kind: c_int,
    value: *mut Fmi2Real,
) -> Fmi2Status {
    with_instance(c, "fmi2GetRealStatus", |instance| {
        if value.is_null() {
            return instance.report("fmi2GetRealStatus", &"NULL value", Fmi2Status::Error);
        }
        match kind {
            FMI2_LAST_SUCCESSFUL_TIME => {
                *value = instance.engine.time();
                Fmi2Status::Ok
            }
            _ => Fmi2Status::Discard,
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn fmi2GetIntegerStatus(
    c: Fmi2Component,
    _kind: c_int,
    _value: *mut Fmi2Integer,
) -> Fmi2Status {
    with_instance(c, "fmi2GetIntegerStatus", |_| Fmi2Status::Discard)
}

#[no_mangle]
pub unsafe extern "C" fn fmi2GetBooleanStatus(
    c: Fmi2Component,
    kind: c_int,
    value: *mut Fmi2Boolean,
) -> Fmi2Status {
    with_instance(c, "fmi2GetBooleanStatus", |instance| {
        if value.is_null() {
            return instance.report("fmi2GetBooleanStatus", &"NULL value", Fmi2Status::Error);
        }
        match kind {
            FMI2_TERMINATED => {
                *value = if instance.engine.state() == LifecycleState::Error {
                    FMI2_TRUE
                } else {
                    FMI2_FALSE
                };
                Fmi2Status::Ok
            }
            _ => Fmi2Status::Discard,
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn fmi2GetStringStatus(
    c: Fmi2Component,
    _kind: c_int,
    _value: *mut Fmi2String,
) -> Fmi2Status {
    with_instance(c, "fmi2GetStringStatus", |_| Fmi2Status::Discard)
}

/// Number of live instances in this process.
pub fn live_instances() -> usize {
    registry::len()
}
