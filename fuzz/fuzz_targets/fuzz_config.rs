//! Fuzz target: `EngineConfig::from_yaml_str` / `from_json_str`
//!
//! Feeds arbitrary text to both config parsers and asserts that anything
//! they accept also passes validation and carries a usable LUT.
//!
//! cargo fuzz run fuzz_config

#![no_main]

use cuffbp::config::EngineConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };

    let parsed = [EngineConfig::from_yaml_str(text), EngineConfig::from_json_str(text)];
    for cfg in parsed.into_iter().flatten() {
        assert!(cfg.validate().is_ok(), "accepted config must validate");
        let lut = &cfg.control.deflate_lut;
        assert!(!lut.is_empty());
        assert!(lut.lookup(cfg.control.inflate_target_mmhg) <= 100);
    }
});
