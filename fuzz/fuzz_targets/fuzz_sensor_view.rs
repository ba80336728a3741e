// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use gtdrive::codec;

fuzz_target!(|data: &[u8]| {
    // SensorView decoder: accepted frames re-encode to accepted frames
    if let Ok(view) = codec::decode(data) {
        let bytes = codec::encode_sensor_view(&view);
        assert!(codec::decode(&bytes).is_ok());
    }

    // ControlRecord decoder (OSMPControlOut readers)
    let _ = codec::decode_control(data);
});
