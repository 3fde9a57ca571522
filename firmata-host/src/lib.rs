//! <h1 align="center">FIRMATA-HOST</h1>
//! <div style="text-align:center;font-style:italic;">The host side of the Firmata protocol - written in Rust.</div>
//!
//! # Features
//!
//! **Firmata-Host** talks to a microcontroller running a [Firmata](https://github.com/firmata/protocol)
//! firmware (StandardFirmataPlus, ConfigurableFirmata, etc.) over any byte stream.
//!
//! - An incremental protocol engine ([`Firmata`](io::Firmata)): framing of the MIDI-like and sysex
//!   messages from arbitrary chunks, connection handshake and pin/port state.
//! - Pin operations: modes, digital/analog/PWM/servo writes, reporting and reads.
//! - Sub-protocols: I2C, OneWire, serial passthrough, stepper and AccelStepper.
//! - A [`Board`](hardware::Board) owning the transport lifecycle ([`Serial`](io::Serial) by default)
//!   and emitting [`BoardEvent`](hardware::BoardEvent)s.
//!
//! # Prerequisites
//!
//! [StandardFirmataPlus.ino](https://github.com/firmata/arduino/blob/main/examples/StandardFirmataPlus/StandardFirmataPlus.ino)
//! (or a compatible sketch) **MUST** be installed on the board.
//!
//! # Getting Started
//!
//! Blink the embedded led on pin 13:
//! ```no_run
//! use firmata_host::hardware::{Board, BoardEvent};
//! use firmata_host::io::PinModeId;
//!
//! #[firmata_host::runtime]
//! async fn main() {
//!     let board = Board::run();
//!
//!     let handle = board.clone();
//!     board.on(BoardEvent::OnReady, move |_: ()| {
//!         handle.pin_mode(13, PinModeId::OUTPUT).unwrap();
//!         handle.digital_write(13, true).unwrap();
//!     });
//! }
//! ```
//!
//! # Feature flags
//!
//! - **libudev** -- (enabled by default) Activates `serialport` crate _libudev_ feature under-the-hood (required on Linux only for port listing).
//! - **serde** -- Enables serialize/deserialize capabilities for the board state and the transports.
//! - **mocks** -- Provides a mocked transport and test boards (useful for tests mostly).

#[cfg(test)]
extern crate self as firmata_host;

pub mod errors;
pub mod hardware;
pub mod io;
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
pub mod utils;

pub use firmata_macros::runtime;
