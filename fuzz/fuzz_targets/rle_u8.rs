#![no_main]
use libfuzzer_sys::fuzz_target;

use gl_capture::rle;

fuzz_target!(|data: &[u8]| {
    let buf = rle::encode_u8(data);
    match rle::decode_u8(&buf, data.len()) {
        Ok(vec) => assert_eq!(vec, data),
        Err(e) => panic!("Error: {}", e),
    }

    // Arbitrary input must decode or fail, never overrun the limit.
    if let Ok(vec) = rle::decode_u8(data, 4096) {
        assert!(vec.len() <= 4096);
    }
});
