//! Report and edge-decoding protocol for USB foot pedals
//!
//! This crate turns raw state reports from a multi-pedal USB HID device into
//! ordered key press/release edges. It performs no I/O: the device side and the
//! virtual keyboard side live in `footpedal-bridge`.
//!
//! ## Features
//! - Single-bit pedal masks, generic over up to 32 pedals
//! - Static pedal-to-key binding table with deterministic iteration order
//! - Pure XOR-diff decoder that ignores unconfigured bits
//!
//! # Example
//!
//! ```
//! use footpedal_protocol::{KeyBindingMap, Pedal, PedalState, decode};
//!
//! let bindings = KeyBindingMap::default();
//! let edges = decode(PedalState::RELEASED, PedalState::new(0b001), &bindings);
//! assert_eq!(edges.len(), 1);
//! assert_eq!(edges[0].pedal, Pedal::LEFT);
//! assert!(edges[0].pressed);
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]

pub mod decode;
pub mod types;

pub use decode::*;
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid report size: expected at least {expected}, got {actual}")]
    InvalidReportSize { expected: usize, actual: usize },

    #[error("Invalid pedal mask {0:#x}: exactly one bit must be set")]
    InvalidPedalMask(u32),

    #[error("Invalid pedal bit position: {0}")]
    InvalidPedalBit(u32),

    #[error("Pedal {0} is bound more than once")]
    DuplicatePedal(Pedal),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Linux input key code (`KEY_*` in `input-event-codes.h`).
pub type KeyCode = u16;

/// Smallest report the device can send: one status byte.
pub const MIN_REPORT_SIZE: usize = 1;
/// Number of report bytes folded into a [`PedalState`].
pub const STATE_BYTES: usize = 4;
pub const MAX_PEDALS: u32 = u32::BITS;

pub const VENDOR_ID_VEC: u16 = 0x05f3;
pub const PRODUCT_ID_FOOTPEDAL: u16 = 0x00ff;

pub const KEY_LEFTCTRL: KeyCode = 29;
pub const KEY_LEFTSHIFT: KeyCode = 42;
pub const KEY_LEFTALT: KeyCode = 56;
/// Number of key codes the kernel input layer defines (`KEY_CNT`). Valid
/// codes are strictly below it.
pub const KEY_CODE_LIMIT: KeyCode = 0x300;
