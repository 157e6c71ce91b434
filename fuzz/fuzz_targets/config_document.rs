#![no_main]

use ferrous_singleton::config::ContainerConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Whatever parses must also validate.
    if let Ok(config) = ContainerConfig::from_json_str(text) {
        assert!(config.validate().is_ok());
        assert!(config.pool.min_threads >= 1);
    }
    if let Ok(config) = ContainerConfig::from_yaml_str(text) {
        assert!(config.pool.max_threads >= config.pool.min_threads);
    }
});
