//! Edge decoding between consecutive pedal states

use super::{EdgeEvent, KeyBindingMap, PedalState};

/// Computes the press/release edges between two reports.
///
/// Only bits of bound pedals are compared; anything else in either state is
/// masked out first. Edges come back in ascending pedal-bit order, so several
/// pedals changing in one report always produce the same sequence.
///
/// The first report of a session is diffed against [`PedalState::RELEASED`],
/// which means a pedal held down at startup shows up as a fresh press.
pub fn decode(
    previous: PedalState,
    current: PedalState,
    bindings: &KeyBindingMap,
) -> Vec<EdgeEvent> {
    let changed = (previous.bits() ^ current.bits()) & bindings.configured_mask();
    if changed == 0 {
        return Vec::new();
    }

    bindings
        .iter()
        .filter(|(pedal, _)| changed & pedal.mask() != 0)
        .map(|(pedal, key)| EdgeEvent {
            pedal,
            key,
            pressed: current.is_pressed(pedal),
        })
        .collect()
}

/// Key-up edges for every bound pedal still down in `held`.
pub fn release_all(held: PedalState, bindings: &KeyBindingMap) -> Vec<EdgeEvent> {
    decode(held, PedalState::RELEASED, bindings)
}
