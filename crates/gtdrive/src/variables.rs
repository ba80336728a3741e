// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Model interface: value references and identity.
//!
//! Must stay in sync with `crates/gtdrive-fmi/modelDescription.xml`.

use crate::fmi2::Fmi2ValueReference;

/// GUID written into `modelDescription.xml`.
pub const MODEL_GUID: &str = "{6c1f5b3e-2a4d-4f0b-9a8e-3d7c2e91b4a5}";
/// `modelName` attribute.
pub const MODEL_NAME: &str = "GT-DriveController";
/// Co-simulation `modelIdentifier` (shared library stem).
pub const MODEL_IDENTIFIER: &str = "gtdrive_fmi";

pub const VR_SENSOR_VIEW_IN_BASE_LO: Fmi2ValueReference = 0;
pub const VR_SENSOR_VIEW_IN_BASE_HI: Fmi2ValueReference = 1;
pub const VR_SENSOR_VIEW_IN_SIZE: Fmi2ValueReference = 2;
pub const VR_THROTTLE: Fmi2ValueReference = 3;
pub const VR_BRAKE: Fmi2ValueReference = 4;
pub const VR_STEERING: Fmi2ValueReference = 5;
pub const VR_VALID: Fmi2ValueReference = 6;
pub const VR_DRIVE_MODE: Fmi2ValueReference = 7;
pub const VR_CONTROL_OUT_BASE_LO: Fmi2ValueReference = 8;
pub const VR_CONTROL_OUT_BASE_HI: Fmi2ValueReference = 9;
pub const VR_CONTROL_OUT_SIZE: Fmi2ValueReference = 10;
pub const VR_LAST_ERROR_CODE: Fmi2ValueReference = 11;

/// FMI base type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableType {
    Real,
    Integer,
    Boolean,
}

/// FMI causality of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Causality {
    Input,
    Output,
}

/// One row of the model variable table.
#[derive(Debug, Clone, Copy)]
pub struct Variable {
    pub name: &'static str,
    pub value_reference: Fmi2ValueReference,
    pub kind: VariableType,
    pub causality: Causality,
}

const fn var(
    name: &'static str,
    value_reference: Fmi2ValueReference,
    kind: VariableType,
    causality: Causality,
) -> Variable {
    Variable {
        name,
        value_reference,
        kind,
        causality,
    }
}

pub const VARIABLES: &[Variable] = &[
    var(
        "OSMPSensorViewIn.base.lo",
        VR_SENSOR_VIEW_IN_BASE_LO,
        VariableType::Integer,
        Causality::Input,
    ),
    var(
        "OSMPSensorViewIn.base.hi",
        VR_SENSOR_VIEW_IN_BASE_HI,
        VariableType::Integer,
        Causality::Input,
    ),
    var(
        "OSMPSensorViewIn.size",
        VR_SENSOR_VIEW_IN_SIZE,
        VariableType::Integer,
        Causality::Input,
    ),
    var("Throttle", VR_THROTTLE, VariableType::Real, Causality::Output),
    var("Brake", VR_BRAKE, VariableType::Real, Causality::Output),
    var("Steering", VR_STEERING, VariableType::Real, Causality::Output),
    var("Valid", VR_VALID, VariableType::Boolean, Causality::Output),
    var(
        "DriveMode",
        VR_DRIVE_MODE,
        VariableType::Integer,
        Causality::Output,
    ),
    var(
        "OSMPControlOut.base.lo",
        VR_CONTROL_OUT_BASE_LO,
        VariableType::Integer,
        Causality::Output,
    ),
    var(
        "OSMPControlOut.base.hi",
        VR_CONTROL_OUT_BASE_HI,
        VariableType::Integer,
        Causality::Output,
    ),
    var(
        "OSMPControlOut.size",
        VR_CONTROL_OUT_SIZE,
        VariableType::Integer,
        Causality::Output,
    ),
    var(
        "LastErrorCode",
        VR_LAST_ERROR_CODE,
        VariableType::Integer,
        Causality::Output,
    ),
];

pub fn lookup(value_reference: Fmi2ValueReference) -> Option<&'static Variable> {
    VARIABLES
        .iter()
        .find(|v| v.value_reference == value_reference)
}

pub fn by_name(name: &str) -> Option<&'static Variable> {
    VARIABLES.iter().find(|v| v.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_references_unique_and_dense() {
        for (index, variable) in VARIABLES.iter().enumerate() {
            assert_eq!(variable.value_reference as usize, index);
            assert_eq!(lookup(variable.value_reference).map(|v| v.name), Some(variable.name));
            assert_eq!(
                by_name(variable.name).map(|v| v.value_reference),
                Some(variable.value_reference)
            );
        }
        assert!(lookup(99).is_none());
    }
}
