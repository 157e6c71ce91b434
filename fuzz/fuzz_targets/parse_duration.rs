#![no_main]

use ferrous_singleton::config::{parse_duration, TimeUnit};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let millis = parse_duration(text, TimeUnit::Millis);
    let seconds = parse_duration(text, TimeUnit::Seconds);

    // Only bare numbers depend on the default unit.
    if text.trim().parse::<u64>().is_err() {
        assert_eq!(millis.is_ok(), seconds.is_ok());
        if let (Ok(a), Ok(b)) = (millis, seconds) {
            assert_eq!(a, b);
        }
    }
});
