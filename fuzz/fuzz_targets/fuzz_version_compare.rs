//! Fuzz target: firmware version ordering
//!
//! Splits the input into two strings and checks that `compare` never panics,
//! is antisymmetric, and is reflexive.
//!
//! cargo fuzz run fuzz_version_compare

#![no_main]

use co2ampel::version::compare;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let (a, b) = text.split_once('\n').unwrap_or((&text, ""));

    assert_eq!(compare(a, b), compare(b, a).reverse());
    assert_eq!(compare(a, a), core::cmp::Ordering::Equal);
});
