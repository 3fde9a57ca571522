//! Defines the Firmata protocol engine: framing, decoding, handshake and the outgoing commands.

pub mod constants;
mod data;
mod dispatch;
pub mod encoding;
pub mod firmata;
mod handshake;
mod parser;
mod transports;

pub use data::*;
pub use dispatch::*;
pub use firmata::*;
pub use handshake::*;
pub use parser::*;
pub use transports::*;
