//! Defines the board facade: the transport lifecycle around a [`Firmata`](crate::io::Firmata) engine.

mod board;

pub use board::Board;
pub use board::BoardEvent;
