#![no_main]

use libfuzzer_sys::fuzz_target;
use opmem::input::ProfileDocument;
use opmem::profile::MemoryProfiler;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(document) = ProfileDocument::from_json_str(input) else {
        return;
    };
    let Ok(trees) = document.call_trees() else {
        return;
    };

    // Unsorted events and malformed trees must not panic
    let calls = document.call_counts();
    let _ = MemoryProfiler::default().analyze(trees, document.memory_events, &calls);
});
