// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::cast_precision_loss)] // Random test data
#![allow(clippy::cast_possible_truncation)] // Test parameters

//! Codec properties over generated SensorView frames
//!
//! Seeded random generation: failures reproduce with the printed seed.

use gtdrive::osi::{
    moving_object_type, BaseMoving, BaseStationary, Dimension3d, GroundTruth, Identifier,
    MovingObject, Orientation3d, SensorView, StationaryObject, Vector3d,
};
use gtdrive::{codec, Bytes, ControlStrategy, DecodeError, ReferenceStrategy, SensorInput};

fn random_vector(rng: &mut fastrand::Rng, span: f64) -> Vector3d {
    Vector3d::new(
        (rng.f64() - 0.5) * span,
        (rng.f64() - 0.5) * span,
        (rng.f64() - 0.5) * span,
    )
}

fn random_view(rng: &mut fastrand::Rng) -> SensorView {
    let moving = (0..rng.usize(0..12))
        .map(|i| MovingObject {
            id: Some(Identifier::new(i as u64 + 1)),
            base: Some(BaseMoving {
                dimension: Some(Dimension3d {
                    length: Some(4.5),
                    width: Some(1.8),
                    height: Some(1.5),
                }),
                position: Some(random_vector(rng, 400.0)),
                orientation: Some(Orientation3d {
                    roll: Some(0.0),
                    pitch: Some(0.0),
                    yaw: Some((rng.f64() - 0.5) * std::f64::consts::TAU),
                }),
                velocity: Some(random_vector(rng, 60.0)),
                ..BaseMoving::default()
            }),
            r#type: Some(if rng.bool() {
                moving_object_type::VEHICLE
            } else {
                moving_object_type::PEDESTRIAN
            }),
        })
        .collect::<Vec<_>>();
    let stationary = (0..rng.usize(0..6))
        .map(|i| StationaryObject {
            id: Some(Identifier::new(1000 + i as u64)),
            base: Some(BaseStationary {
                position: Some(random_vector(rng, 400.0)),
                ..BaseStationary::default()
            }),
        })
        .collect();
    let ground_truth = GroundTruth {
        host_vehicle_id: (!moving.is_empty()).then(|| Identifier::new(1)),
        moving_object: moving,
        stationary_object: stationary,
        ..GroundTruth::default()
    };
    SensorView::at(rng.f64() * 1000.0, ground_truth)
}

#[test]
fn test_valid_frames_yield_in_range_outputs() {
    let seed = 0x5eed_0001;
    let mut rng = fastrand::Rng::with_seed(seed);
    for round in 0..200 {
        let view = random_view(&mut rng);
        let bytes = codec::encode_sensor_view(&view);
        let decoded = codec::decode(&bytes)
            .unwrap_or_else(|err| panic!("seed {seed:#x} round {round}: {err}"));
        assert_eq!(decoded, view);

        let input = SensorInput {
            view: Some(decoded),
            payload: Bytes::from(bytes.clone()),
            simulation_time: 0.0,
        };
        let out = ReferenceStrategy
            .compute(&input)
            .expect("reference never fails");
        assert!(out.is_in_range());

        let replay = codec::decode_control(&codec::encode(&out, Some(0.0))).expect("replay");
        assert_eq!(replay.trace, bytes);
    }
}

#[test]
fn test_truncated_frames_never_decode_partially() {
    let seed = 0x5eed_0002;
    let mut rng = fastrand::Rng::with_seed(seed);
    for _ in 0..50 {
        let bytes = codec::encode_sensor_view(&random_view(&mut rng));
        for cut in 0..bytes.len() {
            let prefix = &bytes[..cut];
            match codec::decode(prefix) {
                // A prefix ending on a top-level field boundary is itself a
                // complete message; it must re-encode to exactly those bytes.
                Ok(view) => assert_eq!(
                    codec::encode_sensor_view(&view),
                    prefix,
                    "seed {seed:#x}: cut at {cut} decoded to a different message"
                ),
                Err(DecodeError::Malformed { len, .. }) => assert_eq!(len, cut),
                Err(DecodeError::VersionMismatch { found, .. }) => assert_eq!(found, None),
            }
        }
    }
}

#[test]
fn test_random_bytes_never_panic() {
    let seed = 0x5eed_0003;
    let mut rng = fastrand::Rng::with_seed(seed);
    for _ in 0..2_000 {
        let len = rng.usize(0..256);
        let bytes: Vec<u8> = std::iter::repeat_with(|| rng.u8(..)).take(len).collect();
        if let Ok(view) = codec::decode(&bytes) {
            assert_eq!(view.version.and_then(|v| v.version_major), Some(3));
        }
    }
}
