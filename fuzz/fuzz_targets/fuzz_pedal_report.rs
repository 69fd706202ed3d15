//! Fuzzes report parsing and edge decoding for the foot pedal.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_pedal_report
#![no_main]
use footpedal_protocol::{KeyBindingMap, PedalState, decode, release_all};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Split the input into two consecutive reports; neither step may panic.
    let (first, second) = data.split_at(data.len() / 2);
    let bindings = KeyBindingMap::default();

    let previous = PedalState::from_report(first).unwrap_or(PedalState::RELEASED);
    let Ok(current) = PedalState::from_report(second) else {
        return;
    };

    let edges = decode(previous, current, &bindings);
    assert!(edges.len() <= bindings.len());
    assert!(edges.windows(2).all(|w| w[0].pedal < w[1].pedal));

    let lifted = release_all(current, &bindings);
    assert_eq!(lifted.len() as u32, current.masked(bindings.configured_mask()).pressed_count());
});
