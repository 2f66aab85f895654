#![no_main]

use attdis_disasm::{Disassembler, X86_64Disassembler};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let disasm = X86_64Disassembler::new();

    // Errors are fine; panics and out-of-range sizes are not.
    match disasm.decode_instruction(data, 0x1000) {
        Ok(decoded) => {
            assert!(decoded.size >= 1 && decoded.size <= 15);
            assert!(decoded.size <= data.len());
            let _ = decoded.instruction.to_string();
        }
        Err(err) => {
            if let Some(len) = err.skip_len() {
                assert!(len >= 1 && len <= data.len());
            }
        }
    }
});
