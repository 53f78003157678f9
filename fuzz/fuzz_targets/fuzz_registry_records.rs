#![no_main]

use libfuzzer_sys::fuzz_target;
use tpm::registry::parse_records;

fuzz_target!(|data: &[u8]| {
    if let Ok(body) = std::str::from_utf8(data) {
        for (_, record) in parse_records(body) {
            assert!(!record.package.is_empty());
            assert!(!record.installed);
        }
    }
});
