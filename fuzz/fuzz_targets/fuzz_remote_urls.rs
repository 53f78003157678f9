#![no_main]

use libfuzzer_sys::fuzz_target;
use tpm::plugins::{is_plugin_name, normalize_remote, split_repository_url};
use tpm::vcs::parse_remote_urls;

fuzz_target!(|data: &[u8]| {
    if let Ok(output) = std::str::from_utf8(data) {
        let lines: Vec<&str> = output.lines().collect();
        for remote in parse_remote_urls(&lines) {
            if let Ok(url) = url::Url::parse(&normalize_remote(&remote)) {
                if let Some((_, name)) = split_repository_url(&url) {
                    // Names must never escape the plugin root
                    assert!(is_plugin_name(&name));
                }
            }
        }
    }
});
