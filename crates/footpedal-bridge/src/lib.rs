//! USB foot pedal to virtual keyboard bridge
//!
//! Claims a USB HID foot pedal through libusb, polls its state reports and
//! replays pedal presses as key events on a uinput keyboard.
//!
//! The pieces, leaves first:
//! - [`device`]: finds, claims, reads and releases the pedal (`rusb`)
//! - [`emitter`]: the uinput keyboard (`evdev`)
//! - [`poll_loop`]: read → decode → emit, with shutdown and cleanup
//! - [`bridge`]: builds a session from a [`BridgeConfig`] and runs it
//!
//! The loop only sees the hardware through [`ReportSource`] and [`KeySink`],
//! so it runs unchanged against the in-memory doubles in [`ports::mock`].

#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used)]

pub mod bridge;
pub mod config;
pub mod device;
pub mod emitter;
pub mod error;
pub mod poll_loop;
pub mod ports;
pub mod shutdown;

pub use config::{BindingConfig, BridgeConfig, ConfigOverrides};
pub use error::{BridgeError, BridgeResult};
pub use poll_loop::{LoopState, PollLoop, PollStep, RunSummary};
pub use ports::{ClaimableSource, KeySink, ReadOutcome, ReportSource};
pub use shutdown::ShutdownSignal;
