#![no_main]
use libfuzzer_sys::fuzz_target;

use gl_capture::rle;

fuzz_target!(|data: &[u8]| {
    let data = &data[..data.len() & !3];

    let buf = rle::encode_u32(data);
    match rle::decode_u32(&buf, data.len()) {
        Ok(vec) => assert_eq!(vec, data),
        Err(e) => panic!("Error: {}", e),
    }

    if let Ok(vec) = rle::decode_u32(data, 4096) {
        assert!(vec.len() <= 4096);
        assert_eq!(vec.len() % 4, 0);
    }
});
