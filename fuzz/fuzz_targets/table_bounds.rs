#![no_main]

use libfuzzer_sys::fuzz_target;
use x07_extptr::{
    ExternalPointerError, ExternalPointerIndex, ExternalPointerTable, TableConfig,
};

// Input: one byte of allocations to make, then little-endian u32 words that
// stand in for corrupted field contents.
fuzz_target!(|data: &[u8]| {
    let Some((&allocs, rest)) = data.split_first() else {
        return;
    };

    let table = ExternalPointerTable::new(TableConfig {
        entries_per_segment: 16,
        max_entries: 1024,
    });
    for n in 0..allocs {
        let idx = table.allocate();
        table.set(idx, n as usize);
    }
    let capacity = table.capacity();

    for chunk in rest.chunks_exact(4) {
        let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let idx = ExternalPointerIndex::from_raw(raw);
        match table.try_get(idx) {
            Ok(_) => assert!(raw < capacity),
            Err(ExternalPointerError::OutOfRange { index, capacity: c }) => {
                assert_eq!(index, raw);
                assert_eq!(c, capacity);
                assert!(raw >= capacity);
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
});
