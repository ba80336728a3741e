// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `run`: drive one instance through a complete FMI lifecycle.
//!
//! instantiate -> setupExperiment -> enter/exit initialization -> N x doStep
//! (empty versioned SensorView frames) -> getters -> terminate -> free.

use std::ffi::{CStr, CString};
use std::path::Path;

use gtdrive::fmi2::{
    Fmi2CallbackFunctions, Fmi2Component, Fmi2ComponentFn, Fmi2DoStepFn, Fmi2FreeInstanceFn,
    Fmi2GetIntegerFn, Fmi2GetRealFn, Fmi2GetVersionFn, Fmi2InstantiateFn, Fmi2SetIntegerFn,
    Fmi2SetupExperimentFn, Fmi2Status, Fmi2ValueReference, COSIMULATION_SYMBOLS,
    FMI2_CO_SIMULATION, FMI2_FALSE, FMI2_TRUE,
};
use gtdrive::osi::{GroundTruth, SensorView};
use gtdrive::osmp::BinaryVariable;
use gtdrive::{codec, resolver, LoadError};
use libloading::Library;
use thiserror::Error;
use tracing::{debug, warn};

use crate::bundle::Bundle;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("fmi2Instantiate returned NULL")]
    InstantiateFailed,
    #[error("{call} returned {status:?}")]
    Status {
        call: &'static str,
        status: Fmi2Status,
    },
    #[error("modelDescription.xml has no variable {0}")]
    MissingVariable(String),
    #[error("invalid string argument: {0}")]
    Argument(String),
}

impl CycleError {
    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::Load(err) => err.kind(),
            CycleError::InstantiateFailed => "InstantiateFailed",
            CycleError::Status { .. } => "StepFailed",
            CycleError::MissingVariable(_) => "MissingVariable",
            CycleError::Argument(_) => "InvalidArgument",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CycleOptions {
    pub steps: u32,
    pub step_size: f64,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            steps: 10,
            step_size: 0.01,
        }
    }
}

/// What the cycle observed.
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    pub fmi_version: String,
    pub steps: u32,
    /// Steps answered with `fmi2Warning` (degraded, safe-stop outputs).
    pub degraded_steps: u32,
    /// Final value of every Real output present in the model description.
    pub reals: Vec<(String, f64)>,
    /// Final value of every Integer output outside the OSMP pointer triples.
    pub integers: Vec<(String, i32)>,
}

/// The FMI entry points used by the cycle.
struct Api {
    get_version: Fmi2GetVersionFn,
    instantiate: Fmi2InstantiateFn,
    free_instance: Fmi2FreeInstanceFn,
    setup_experiment: Fmi2SetupExperimentFn,
    enter_initialization: Fmi2ComponentFn,
    exit_initialization: Fmi2ComponentFn,
    terminate: Fmi2ComponentFn,
    do_step: Fmi2DoStepFn,
    get_real: Fmi2GetRealFn,
    get_integer: Fmi2GetIntegerFn,
    set_integer: Fmi2SetIntegerFn,
    // Declared last: the function pointers above are only valid while it lives.
    _library: Library,
}

impl Api {
    fn load(path: &Path) -> Result<Self, LoadError> {
        let library = resolver::load_library(path)?;
        resolver::require_symbols(&library, path, COSIMULATION_SYMBOLS)?;
        Ok(Self {
            get_version: symbol(&library, path, "fmi2GetVersion")?,
            instantiate: symbol(&library, path, "fmi2Instantiate")?,
            free_instance: symbol(&library, path, "fmi2FreeInstance")?,
            setup_experiment: symbol(&library, path, "fmi2SetupExperiment")?,
            enter_initialization: symbol(&library, path, "fmi2EnterInitializationMode")?,
            exit_initialization: symbol(&library, path, "fmi2ExitInitializationMode")?,
            terminate: symbol(&library, path, "fmi2Terminate")?,
            do_step: symbol(&library, path, "fmi2DoStep")?,
            get_real: symbol(&library, path, "fmi2GetReal")?,
            get_integer: symbol(&library, path, "fmi2GetInteger")?,
            set_integer: symbol(&library, path, "fmi2SetInteger")?,
            _library: library,
        })
    }
}

fn symbol<T: Copy>(library: &Library, path: &Path, name: &str) -> Result<T, LoadError> {
    // SAFETY:
    // - `T` is the FMI 2.0 prototype of `name`
    // - the copied pointer is stored next to the `Library` that keeps it mapped
    unsafe { library.get::<T>(name.as_bytes()) }
        .map(|sym| *sym)
        .map_err(|_| LoadError::SymbolMissing {
            library: path.to_path_buf(),
            symbols: vec![name.to_string()],
        })
}

/// Frees the instance on every exit path.
struct Instance<'a> {
    api: &'a Api,
    handle: Fmi2Component,
}

impl Instance<'_> {
    fn check(&self, call: &'static str, status: Fmi2Status) -> Result<Fmi2Status, CycleError> {
        debug!("{} -> {:?}", call, status);
        match status {
            Fmi2Status::Ok | Fmi2Status::Warning => Ok(status),
            status => Err(CycleError::Status { call, status }),
        }
    }
}

impl Drop for Instance<'_> {
    fn drop(&mut self) {
        // SAFETY: `handle` came from this library's fmi2Instantiate and is
        // freed exactly once.
        unsafe { (self.api.free_instance)(self.handle) };
    }
}

/// Variables the cycle reads and writes, resolved by name.
struct References {
    input: [Fmi2ValueReference; 3],
    reals: Vec<(String, Fmi2ValueReference)>,
    integers: Vec<(String, Fmi2ValueReference)>,
}

impl References {
    fn resolve(bundle: &Bundle) -> Result<Self, CycleError> {
        let description = bundle.description();
        let input_vr = |name: &str| {
            description
                .variable(name)
                .map(|v| v.value_reference)
                .ok_or_else(|| CycleError::MissingVariable(name.to_string()))
        };
        let input = [
            input_vr("OSMPSensorViewIn.base.lo")?,
            input_vr("OSMPSensorViewIn.base.hi")?,
            input_vr("OSMPSensorViewIn.size")?,
        ];
        let outputs = || {
            description
                .variables
                .iter()
                .filter(|v| v.causality == "output")
                .filter(|v| !v.name.starts_with("OSMP"))
        };
        Ok(Self {
            input,
            reals: outputs()
                .filter(|v| v.kind == "Real")
                .map(|v| (v.name.clone(), v.value_reference))
                .collect(),
            integers: outputs()
                .filter(|v| v.kind == "Integer")
                .map(|v| (v.name.clone(), v.value_reference))
                .collect(),
        })
    }
}

/// Run the lifecycle against the bundle's shared library.
pub fn run(bundle: &Bundle, options: CycleOptions) -> Result<CycleOutcome, CycleError> {
    let references = References::resolve(bundle)?;
    let api = Api::load(&bundle.library_path())?;
    let description = bundle.description();

    let name = c_string("gtdrive-doctor")?;
    let guid = c_string(&description.guid)?;
    let resources = c_string(&bundle.resource_uri())?;
    // No host logger: a variadic callback cannot be defined in stable Rust.
    // The shim still writes its own log to stderr (filter in GTDRIVE_LOG).
    let callbacks = Fmi2CallbackFunctions::default();

    let mut outcome = CycleOutcome::default();
    // SAFETY: static string returned by the library.
    outcome.fmi_version = unsafe { CStr::from_ptr((api.get_version)()) }
        .to_string_lossy()
        .into_owned();

    // SAFETY: all strings are NUL-terminated and outlive the call.
    let handle = unsafe {
        (api.instantiate)(
            name.as_ptr(),
            FMI2_CO_SIMULATION,
            guid.as_ptr(),
            resources.as_ptr(),
            &callbacks,
            FMI2_FALSE,
            FMI2_FALSE,
        )
    };
    if handle.is_null() {
        return Err(CycleError::InstantiateFailed);
    }
    let instance = Instance { api: &api, handle };

    // SAFETY (block): `handle` is live until `instance` drops; every array
    // passed below matches the announced length.
    unsafe {
        instance.check(
            "fmi2SetupExperiment",
            (api.setup_experiment)(handle, FMI2_FALSE, 0.0, 0.0, FMI2_FALSE, 0.0),
        )?;
        instance.check(
            "fmi2EnterInitializationMode",
            (api.enter_initialization)(handle),
        )?;
        instance.check("fmi2ExitInitializationMode", (api.exit_initialization)(handle))?;

        for step in 0..options.steps {
            let time = f64::from(step) * options.step_size;
            let frame = codec::encode_sensor_view(&SensorView::at(time, GroundTruth::default()));
            let triple = BinaryVariable::describe(&frame);
            let values = [triple.lo, triple.hi, triple.size];
            instance.check(
                "fmi2SetInteger",
                (api.set_integer)(handle, references.input.as_ptr(), 3, values.as_ptr()),
            )?;
            let status = instance.check(
                "fmi2DoStep",
                (api.do_step)(handle, time, options.step_size, FMI2_TRUE),
            )?;
            if status == Fmi2Status::Warning {
                warn!("step {} at t={} degraded", step, time);
                outcome.degraded_steps += 1;
            }
            outcome.steps += 1;
        }

        for (label, vr) in &references.reals {
            let mut value = f64::NAN;
            instance.check("fmi2GetReal", (api.get_real)(handle, vr, 1, &mut value))?;
            outcome.reals.push((label.clone(), value));
        }
        for (label, vr) in &references.integers {
            let mut value = 0;
            instance.check("fmi2GetInteger", (api.get_integer)(handle, vr, 1, &mut value))?;
            outcome.integers.push((label.clone(), value));
        }
        instance.check("fmi2Terminate", (api.terminate)(handle))?;
    }
    drop(instance);
    Ok(outcome)
}

fn c_string(text: &str) -> Result<CString, CycleError> {
    CString::new(text).map_err(|_| CycleError::Argument(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTION: &str = r#"<fmiModelDescription fmiVersion="2.0" modelName="m" guid="g">
  <CoSimulation modelIdentifier="missing_fmi"/>
  <ModelVariables>
    <ScalarVariable name="OSMPSensorViewIn.base.lo" valueReference="0" causality="input"><Integer/></ScalarVariable>
    <ScalarVariable name="OSMPSensorViewIn.base.hi" valueReference="1" causality="input"><Integer/></ScalarVariable>
    <ScalarVariable name="OSMPSensorViewIn.size" valueReference="2" causality="input"><Integer/></ScalarVariable>
    <ScalarVariable name="Throttle" valueReference="3" causality="output"><Real/></ScalarVariable>
    <ScalarVariable name="OSMPControlOut.size" valueReference="10" causality="output"><Integer/></ScalarVariable>
    <ScalarVariable name="LastErrorCode" valueReference="11" causality="output"><Integer/></ScalarVariable>
  </ModelVariables>
</fmiModelDescription>"#;

    fn bundle(description: &str) -> (tempfile::TempDir, Bundle) {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("modelDescription.xml"), description).expect("write");
        let bundle = Bundle::open(dir.path()).expect("bundle");
        (dir, bundle)
    }

    #[test]
    fn test_references_skip_osmp_outputs() {
        let (_dir, bundle) = bundle(DESCRIPTION);
        let refs = References::resolve(&bundle).expect("resolve");
        assert_eq!(refs.input, [0, 1, 2]);
        assert_eq!(refs.reals, vec![("Throttle".to_string(), 3)]);
        assert_eq!(refs.integers, vec![("LastErrorCode".to_string(), 11)]);
    }

    #[test]
    fn test_missing_library_is_invalid_image() {
        let (_dir, bundle) = bundle(DESCRIPTION);
        let err = run(&bundle, CycleOptions::default()).expect_err("no binary");
        assert_eq!(err.kind(), "InvalidImage");
    }

    #[test]
    fn test_missing_input_variable() {
        let text = DESCRIPTION.replace("OSMPSensorViewIn.size", "Size");
        let (_dir, bundle) = bundle(&text);
        let err = run(&bundle, CycleOptions::default()).expect_err("no input triple");
        assert!(matches!(err, CycleError::MissingVariable(ref name) if name == "OSMPSensorViewIn.size"));
    }
}
