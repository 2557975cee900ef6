#![no_main]
use libfuzzer_sys::fuzz_target;

use gl_capture::Recording;

fuzz_target!(|data: &[u8]| {
    // Whatever parses must write back out to something that parses the same.
    if let Ok(recording) = Recording::read(data) {
        let bytes = recording.to_bytes();
        let again = Recording::read(&bytes).expect("rewritten capture failed to parse");
        assert_eq!(again.to_bytes(), bytes);
    }
});
