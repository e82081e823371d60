#![no_main]

use libfuzzer_sys::fuzz_target;
use classweave::classfile::ClassFile;
use classweave::sites::ClassSite;

fuzz_target!(|data: &[u8]| {
    if let Ok(class) = ClassFile::from_mem(data.to_vec()) {
        let _ = class.to_bytes();
    }
    let _ = ClassSite::from_bytes(data);
});
