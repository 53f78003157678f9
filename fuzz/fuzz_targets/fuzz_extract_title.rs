#![no_main]

use libfuzzer_sys::fuzz_target;
use tpm::validator::{extract_title, has_plugin_keywords, title_description};

fuzz_target!(|data: &[u8]| {
    if let Ok(document) = std::str::from_utf8(data) {
        if let Some(title) = extract_title(document) {
            assert!(!title.contains("</title>"));
            let _ = has_plugin_keywords(&title);
            let description = title_description(&title);
            assert!(description.len() <= title.len());
        }
    }
});
