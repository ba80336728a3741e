// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use gtdrive::resolver::arch;

fuzz_target!(|data: &[u8]| {
    // PE/ELF/Mach-O header detection
    let _ = arch::detect(data);

    // PE import table walk
    let _ = arch::pe_imports(data);
});
