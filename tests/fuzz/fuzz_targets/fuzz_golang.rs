#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Extraction and ignore resolution must not panic on any source text.
    if let Ok(src) = std::str::from_utf8(data) {
        let _ = gocovrs::parsers::golang::extract_functions("fuzz.go", src);
        let _ = gocovrs::annotation::resolve("fuzz.go", src, &[]);
    }
});
