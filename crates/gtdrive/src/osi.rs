// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire-compatible subset of the OSI 3.x message schema.
//!
//! Field numbers follow `osi_sensorview.proto`, `osi_groundtruth.proto`,
//! `osi_object.proto` and `osi_common.proto`. Only the fields a drive policy
//! needs are declared; everything else a producer writes is skipped by the
//! protobuf decoder as unknown fields, so full OSI SensorViews decode fine.
//!
//! All OSI fields are proto2 `optional`, hence `Option<_>` everywhere.

/// Major OSI version this crate understands.
pub const SUPPORTED_MAJOR: u32 = 3;
/// Version stamped into frames built by this crate.
pub const CURRENT_VERSION: (u32, u32, u32) = (3, 5, 0);

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InterfaceVersion {
    #[prost(uint32, optional, tag = "1")]
    pub version_major: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub version_minor: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub version_patch: Option<u32>,
}

impl InterfaceVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            version_major: Some(major),
            version_minor: Some(minor),
            version_patch: Some(patch),
        }
    }

    pub fn current() -> Self {
        let (major, minor, patch) = CURRENT_VERSION;
        Self::new(major, minor, patch)
    }
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Timestamp {
    #[prost(int64, optional, tag = "1")]
    pub seconds: Option<i64>,
    #[prost(uint32, optional, tag = "2")]
    pub nanos: Option<u32>,
}

impl Timestamp {
    pub fn from_secs_f64(time: f64) -> Self {
        let seconds = time.floor();
        let nanos = ((time - seconds) * 1e9).round().clamp(0.0, 999_999_999.0);
        Self {
            seconds: Some(seconds as i64),
            nanos: Some(nanos as u32),
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.seconds.unwrap_or(0) as f64 + f64::from(self.nanos.unwrap_or(0)) * 1e-9
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, ::prost::Message)]
pub struct Identifier {
    #[prost(uint64, optional, tag = "1")]
    pub value: Option<u64>,
}

impl Identifier {
    pub fn new(value: u64) -> Self {
        Self { value: Some(value) }
    }
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Vector3d {
    #[prost(double, optional, tag = "1")]
    pub x: Option<f64>,
    #[prost(double, optional, tag = "2")]
    pub y: Option<f64>,
    #[prost(double, optional, tag = "3")]
    pub z: Option<f64>,
}

impl Vector3d {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
        }
    }

    /// Euclidean norm, missing components read as zero.
    pub fn norm(&self) -> f64 {
        let (x, y, z) = (
            self.x.unwrap_or(0.0),
            self.y.unwrap_or(0.0),
            self.z.unwrap_or(0.0),
        );
        (x * x + y * y + z * z).sqrt()
    }
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Dimension3d {
    #[prost(double, optional, tag = "1")]
    pub length: Option<f64>,
    #[prost(double, optional, tag = "2")]
    pub width: Option<f64>,
    #[prost(double, optional, tag = "3")]
    pub height: Option<f64>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Orientation3d {
    #[prost(double, optional, tag = "1")]
    pub roll: Option<f64>,
    #[prost(double, optional, tag = "2")]
    pub pitch: Option<f64>,
    #[prost(double, optional, tag = "3")]
    pub yaw: Option<f64>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct MountingPosition {
    #[prost(message, optional, tag = "1")]
    pub position: Option<Vector3d>,
    #[prost(message, optional, tag = "2")]
    pub orientation: Option<Orientation3d>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct BaseStationary {
    #[prost(message, optional, tag = "1")]
    pub dimension: Option<Dimension3d>,
    #[prost(message, optional, tag = "2")]
    pub position: Option<Vector3d>,
    #[prost(message, optional, tag = "3")]
    pub orientation: Option<Orientation3d>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct BaseMoving {
    #[prost(message, optional, tag = "1")]
    pub dimension: Option<Dimension3d>,
    #[prost(message, optional, tag = "2")]
    pub position: Option<Vector3d>,
    #[prost(message, optional, tag = "3")]
    pub orientation: Option<Orientation3d>,
    #[prost(message, optional, tag = "4")]
    pub velocity: Option<Vector3d>,
    #[prost(message, optional, tag = "5")]
    pub acceleration: Option<Vector3d>,
    #[prost(message, optional, tag = "6")]
    pub orientation_rate: Option<Orientation3d>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StationaryObject {
    #[prost(message, optional, tag = "1")]
    pub id: Option<Identifier>,
    #[prost(message, optional, tag = "2")]
    pub base: Option<BaseStationary>,
}

/// `MovingObject.Type` raw values.
pub mod moving_object_type {
    pub const UNKNOWN: i32 = 0;
    pub const OTHER: i32 = 1;
    pub const VEHICLE: i32 = 2;
    pub const PEDESTRIAN: i32 = 3;
    pub const ANIMAL: i32 = 4;
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MovingObject {
    #[prost(message, optional, tag = "1")]
    pub id: Option<Identifier>,
    #[prost(message, optional, tag = "2")]
    pub base: Option<BaseMoving>,
    #[prost(int32, optional, tag = "3")]
    pub r#type: Option<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GroundTruth {
    #[prost(message, optional, tag = "1")]
    pub version: Option<InterfaceVersion>,
    #[prost(message, optional, tag = "2")]
    pub timestamp: Option<Timestamp>,
    #[prost(message, optional, tag = "3")]
    pub host_vehicle_id: Option<Identifier>,
    #[prost(message, repeated, tag = "4")]
    pub stationary_object: Vec<StationaryObject>,
    #[prost(message, repeated, tag = "5")]
    pub moving_object: Vec<MovingObject>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct HostVehicleData {
    #[prost(message, optional, tag = "1")]
    pub location: Option<BaseMoving>,
}

/// Top-level OSI `SensorView`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SensorView {
    #[prost(message, optional, tag = "1")]
    pub version: Option<InterfaceVersion>,
    #[prost(message, optional, tag = "2")]
    pub timestamp: Option<Timestamp>,
    #[prost(message, optional, tag = "3")]
    pub sensor_id: Option<Identifier>,
    #[prost(message, optional, tag = "4")]
    pub mounting_position: Option<MountingPosition>,
    #[prost(message, optional, tag = "6")]
    pub host_vehicle_data: Option<HostVehicleData>,
    #[prost(message, optional, tag = "7")]
    pub global_ground_truth: Option<GroundTruth>,
    #[prost(message, optional, tag = "8")]
    pub host_vehicle_id: Option<Identifier>,
}

impl SensorView {
    /// Smallest valid frame: version stamped, nothing observed.
    pub fn empty() -> Self {
        Self {
            version: Some(InterfaceVersion::current()),
            ..Self::default()
        }
    }

    /// Frame at `time` carrying the given ground truth.
    pub fn at(time: f64, ground_truth: GroundTruth) -> Self {
        Self {
            version: Some(InterfaceVersion::current()),
            timestamp: Some(Timestamp::from_secs_f64(time)),
            host_vehicle_id: ground_truth.host_vehicle_id,
            global_ground_truth: Some(ground_truth),
            ..Self::default()
        }
    }

    pub fn moving_objects(&self) -> &[MovingObject] {
        match &self.global_ground_truth {
            Some(gt) => &gt.moving_object,
            None => &[],
        }
    }

    /// The ego vehicle entry in the ground truth, if the frame names one.
    pub fn host_vehicle(&self) -> Option<&MovingObject> {
        let host_id = self
            .host_vehicle_id
            .or_else(|| self.global_ground_truth.as_ref()?.host_vehicle_id)?;
        self.moving_objects().iter().find(|obj| obj.id == Some(host_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle(id: u64, x: f64) -> MovingObject {
        MovingObject {
            id: Some(Identifier::new(id)),
            base: Some(BaseMoving {
                position: Some(Vector3d::new(x, 0.0, 0.0)),
                ..BaseMoving::default()
            }),
            r#type: Some(moving_object_type::VEHICLE),
        }
    }

    #[test]
    fn test_host_vehicle_lookup() {
        let gt = GroundTruth {
            host_vehicle_id: Some(Identifier::new(7)),
            moving_object: vec![vehicle(1, 10.0), vehicle(7, 0.0)],
            ..GroundTruth::default()
        };
        let view = SensorView::at(1.5, gt);
        let host = view.host_vehicle().expect("host present");
        assert_eq!(host.id, Some(Identifier::new(7)));
        assert_eq!(view.moving_objects().len(), 2);
    }

    #[test]
    fn test_host_vehicle_absent() {
        assert!(SensorView::empty().host_vehicle().is_none());
        assert!(SensorView::empty().moving_objects().is_empty());
    }

    #[test]
    fn test_timestamp_conversion() {
        let ts = Timestamp::from_secs_f64(12.25);
        assert_eq!(ts.seconds, Some(12));
        assert_eq!(ts.nanos, Some(250_000_000));
        assert!((ts.as_secs_f64() - 12.25).abs() < 1e-9);
    }
}
