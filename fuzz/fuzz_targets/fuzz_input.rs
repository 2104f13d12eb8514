// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use libfuzzer_sys::fuzz_target;

// Model replies are attacker-ish input: fence-strip + parse + validate
// must never panic, whatever the service sends back.
fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = studysnap::generator::parse_material(text);
    }
});
