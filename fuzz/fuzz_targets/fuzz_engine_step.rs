// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use gtdrive::{DriveConfig, Experiment, LifecycleState, StepEngine};

fuzz_target!(|data: &[u8]| {
    let config = DriveConfig {
        watchdog_ms: 0,
        ..DriveConfig::default()
    };
    let mut engine = StepEngine::builder("fuzz").config(config).build();
    if engine.setup_experiment(Experiment::new(0.0)).is_err() {
        return;
    }

    // Whatever the payload, the outputs stay in range or the engine is in Error
    let _ = engine.do_step(0.0, 0.01, data);
    match engine.output() {
        Ok(out) => {
            assert!((0.0..=1.0).contains(&out.throttle));
            assert!((0.0..=1.0).contains(&out.brake));
            assert!((-1.0..=1.0).contains(&out.steering));
        }
        Err(_) => assert_eq!(engine.state(), LifecycleState::Error),
    }
});
