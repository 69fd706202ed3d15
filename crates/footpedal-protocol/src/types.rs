//! Type definitions for the foot-pedal protocol

use super::{
    KEY_LEFTALT, KEY_LEFTCTRL, KEY_LEFTSHIFT, KeyCode, MAX_PEDALS, MIN_REPORT_SIZE, ProtocolError,
    ProtocolResult, STATE_BYTES,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One physical switch, identified by its single-bit mask in the state report.
///
/// Ordering follows bit position, so a sorted collection of pedals is always
/// in ascending-bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Pedal(u32);

impl Pedal {
    pub const LEFT: Pedal = Pedal(0b001);
    pub const MIDDLE: Pedal = Pedal(0b010);
    pub const RIGHT: Pedal = Pedal(0b100);

    pub fn from_mask(mask: u32) -> ProtocolResult<Self> {
        if mask.count_ones() != 1 {
            return Err(ProtocolError::InvalidPedalMask(mask));
        }
        Ok(Self(mask))
    }

    pub fn from_bit(bit: u32) -> ProtocolResult<Self> {
        if bit >= MAX_PEDALS {
            return Err(ProtocolError::InvalidPedalBit(bit));
        }
        Ok(Self(1 << bit))
    }

    pub const fn mask(self) -> u32 {
        self.0
    }

    /// Position of the pedal's bit, counted from the least significant bit.
    pub const fn bit(self) -> u32 {
        self.0.trailing_zeros()
    }

    pub fn is_pressed(self, state: PedalState) -> bool {
        state.bits() & self.0 != 0
    }
}

impl TryFrom<u32> for Pedal {
    type Error = ProtocolError;

    fn try_from(mask: u32) -> ProtocolResult<Self> {
        Self::from_mask(mask)
    }
}

impl From<Pedal> for u32 {
    fn from(pedal: Pedal) -> Self {
        pedal.0
    }
}

impl fmt::Display for Pedal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Pedal::LEFT => f.write_str("left"),
            Pedal::MIDDLE => f.write_str("middle"),
            Pedal::RIGHT => f.write_str("right"),
            other => write!(f, "pedal{}", other.bit()),
        }
    }
}

/// Bitmask of depressed pedals taken from one report (1 = down).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PedalState(u32);

impl PedalState {
    pub const RELEASED: PedalState = PedalState(0);

    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Builds the state from a raw report.
    ///
    /// Byte 0 carries the first eight pedals; up to [`STATE_BYTES`] bytes are
    /// folded in little-endian order so devices with more pedals decode the
    /// same way. Trailing bytes are ignored.
    pub fn from_report(data: &[u8]) -> ProtocolResult<Self> {
        if data.len() < MIN_REPORT_SIZE {
            return Err(ProtocolError::InvalidReportSize {
                expected: MIN_REPORT_SIZE,
                actual: data.len(),
            });
        }

        let mut bytes = [0u8; STATE_BYTES];
        for (dst, src) in bytes.iter_mut().zip(data) {
            *dst = *src;
        }
        Ok(Self(u32::from_le_bytes(bytes)))
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn masked(self, mask: u32) -> Self {
        Self(self.0 & mask)
    }

    pub fn is_pressed(self, pedal: Pedal) -> bool {
        pedal.is_pressed(self)
    }

    pub fn pressed_count(self) -> u32 {
        self.0.count_ones()
    }
}

impl fmt::Debug for PedalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PedalState({:#b})", self.0)
    }
}

/// A press or release of one pedal between two consecutive reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeEvent {
    pub pedal: Pedal,
    pub key: KeyCode,
    pub pressed: bool,
}

impl EdgeEvent {
    /// Value of the matching `EV_KEY` event: 1 for key-down, 0 for key-up.
    pub fn level(&self) -> i32 {
        i32::from(self.pressed)
    }
}

impl fmt::Display for EdgeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = if self.pressed { "pressed" } else { "released" };
        write!(f, "{} {} (key {})", self.pedal, action, self.key)
    }
}

/// Fixed pedal-to-key table. Iterates in ascending pedal-bit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindingMap {
    bindings: BTreeMap<Pedal, KeyCode>,
}

impl KeyBindingMap {
    pub fn new() -> Self {
        Self {
            bindings: BTreeMap::new(),
        }
    }

    /// Builds a map, rejecting a pedal that appears twice.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Pedal, KeyCode)>) -> ProtocolResult<Self> {
        let mut map = Self::new();
        for (pedal, key) in pairs {
            map.bind(pedal, key)?;
        }
        Ok(map)
    }

    pub fn bind(&mut self, pedal: Pedal, key: KeyCode) -> ProtocolResult<()> {
        if self.bindings.contains_key(&pedal) {
            return Err(ProtocolError::DuplicatePedal(pedal));
        }
        self.bindings.insert(pedal, key);
        Ok(())
    }

    pub fn key_for(&self, pedal: Pedal) -> Option<KeyCode> {
        self.bindings.get(&pedal).copied()
    }

    /// Union of every bound pedal mask.
    pub fn configured_mask(&self) -> u32 {
        self.bindings.keys().fold(0, |acc, pedal| acc | pedal.mask())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Pedal, KeyCode)> + '_ {
        self.bindings.iter().map(|(pedal, key)| (*pedal, *key))
    }

    pub fn pedals(&self) -> impl Iterator<Item = Pedal> + '_ {
        self.bindings.keys().copied()
    }

    /// Distinct key codes, for advertising on the virtual device.
    pub fn key_codes(&self) -> Vec<KeyCode> {
        let mut keys: Vec<KeyCode> = self.bindings.values().copied().collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Default for KeyBindingMap {
    /// Three-pedal layout: left → Alt, middle → Ctrl, right → Shift.
    fn default() -> Self {
        let bindings = [
            (Pedal::LEFT, KEY_LEFTALT),
            (Pedal::MIDDLE, KEY_LEFTCTRL),
            (Pedal::RIGHT, KEY_LEFTSHIFT),
        ];
        Self {
            bindings: bindings.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pedal_from_mask_accepts_single_bit() -> Result<(), ProtocolError> {
        let pedal = Pedal::from_mask(0b100)?;
        assert_eq!(pedal, Pedal::RIGHT);
        assert_eq!(pedal.bit(), 2);
        Ok(())
    }

    #[test]
    fn test_pedal_from_mask_rejects_zero_and_multi_bit() {
        assert_eq!(Pedal::from_mask(0), Err(ProtocolError::InvalidPedalMask(0)));
        assert_eq!(
            Pedal::from_mask(0b011),
            Err(ProtocolError::InvalidPedalMask(0b011))
        );
    }

    #[test]
    fn test_pedal_from_bit_bounds() {
        assert_eq!(Pedal::from_bit(31).map(Pedal::mask), Ok(1 << 31));
        assert_eq!(Pedal::from_bit(32), Err(ProtocolError::InvalidPedalBit(32)));
    }

    #[test]
    fn test_pedal_display() -> Result<(), ProtocolError> {
        assert_eq!(Pedal::LEFT.to_string(), "left");
        assert_eq!(Pedal::MIDDLE.to_string(), "middle");
        assert_eq!(Pedal::RIGHT.to_string(), "right");
        assert_eq!(Pedal::from_bit(5)?.to_string(), "pedal5");
        Ok(())
    }

    #[test]
    fn test_state_from_single_byte_report() -> Result<(), ProtocolError> {
        let state = PedalState::from_report(&[0b101])?;
        assert!(state.is_pressed(Pedal::LEFT));
        assert!(!state.is_pressed(Pedal::MIDDLE));
        assert!(state.is_pressed(Pedal::RIGHT));
        assert_eq!(state.pressed_count(), 2);
        Ok(())
    }

    #[test]
    fn test_state_from_vec_report_keeps_status_in_low_byte() -> Result<(), ProtocolError> {
        // The VEC pedal sends two bytes: status, then an unused byte.
        let state = PedalState::from_report(&[0x02, 0xAA])?;
        assert_eq!(state.masked(0xFF).bits(), 0x02);
        assert_eq!(state.bits(), 0xAA02);
        Ok(())
    }

    #[test]
    fn test_state_from_long_report_ignores_tail() -> Result<(), ProtocolError> {
        let state = PedalState::from_report(&[1, 2, 3, 4, 5, 6, 7, 8])?;
        assert_eq!(state.bits(), 0x0403_0201);
        Ok(())
    }

    #[test]
    fn test_state_from_empty_report_fails() {
        assert_eq!(
            PedalState::from_report(&[]),
            Err(ProtocolError::InvalidReportSize {
                expected: 1,
                actual: 0
            })
        );
    }

    #[test]
    fn test_state_debug_is_binary() {
        assert_eq!(format!("{:?}", PedalState::new(0b101)), "PedalState(0b101)");
    }

    #[test]
    fn test_edge_level() {
        let down = EdgeEvent {
            pedal: Pedal::LEFT,
            key: KEY_LEFTALT,
            pressed: true,
        };
        let up = EdgeEvent {
            pressed: false,
            ..down
        };
        assert_eq!(down.level(), 1);
        assert_eq!(up.level(), 0);
        assert_eq!(down.to_string(), "left pressed (key 56)");
    }

    #[test]
    fn test_default_bindings() {
        let map = KeyBindingMap::default();
        assert_eq!(map.len(), 3);
        assert_eq!(map.key_for(Pedal::LEFT), Some(KEY_LEFTALT));
        assert_eq!(map.key_for(Pedal::MIDDLE), Some(KEY_LEFTCTRL));
        assert_eq!(map.key_for(Pedal::RIGHT), Some(KEY_LEFTSHIFT));
        assert_eq!(map.configured_mask(), 0b111);
    }

    #[test]
    fn test_bindings_iterate_in_bit_order() -> Result<(), ProtocolError> {
        let map = KeyBindingMap::from_pairs([
            (Pedal::RIGHT, 3),
            (Pedal::LEFT, 1),
            (Pedal::from_bit(7)?, 4),
            (Pedal::MIDDLE, 2),
        ])?;
        let keys: Vec<KeyCode> = map.iter().map(|(_, key)| key).collect();
        assert_eq!(keys, vec![1, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn test_duplicate_pedal_rejected() {
        let result = KeyBindingMap::from_pairs([(Pedal::LEFT, 1), (Pedal::LEFT, 2)]);
        assert_eq!(result, Err(ProtocolError::DuplicatePedal(Pedal::LEFT)));
    }

    #[test]
    fn test_key_codes_are_distinct() -> Result<(), ProtocolError> {
        let map = KeyBindingMap::from_pairs([(Pedal::LEFT, 30), (Pedal::RIGHT, 30)])?;
        assert_eq!(map.key_codes(), vec![30]);
        Ok(())
    }

    #[test]
    fn test_pedal_serde_rejects_multi_bit_mask() {
        let ok: Result<Pedal, _> = serde_json::from_str("2");
        assert!(matches!(ok, Ok(Pedal::MIDDLE)));
        let bad: Result<Pedal, _> = serde_json::from_str("3");
        assert!(matches!(bad, Err(_)));
    }
}
