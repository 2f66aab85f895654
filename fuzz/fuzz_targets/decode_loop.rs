#![no_main]

use attdis_disasm::{DecodeLoop, DecodeOptions, LineFormat, LoopEnd};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let listing = DecodeLoop::new(DecodeOptions::default()).run(data, 0x1000, 0, None);

    let covered = listing.covered();
    match &listing.end {
        LoopEnd::Exhausted => assert_eq!(covered, data.len()),
        LoopEnd::Failed { offset, .. } => assert_eq!(covered, *offset),
        LoopEnd::Cancelled { .. } => unreachable!("no cancellation flag was given"),
    }

    let format = LineFormat {
        address: true,
        bytes: true,
    };
    for line in listing.lines(format) {
        assert!(!line.contains('\n'));
    }
});
