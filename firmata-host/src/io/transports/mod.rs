use std::fmt::{Debug, Display};
use std::time::Duration;

use dyn_clone::DynClone;

use crate::errors::Error;

pub mod serial;

pub use serial::Serial;

dyn_clone::clone_trait_object!(IoTransport);

/// The byte-stream boundary of the protocol engine.
///
/// A transport only moves bytes: it never interprets them and never assumes chunk boundaries
/// match message boundaries. Clones share the same underlying connection, so the methods take
/// `&self` and the implementations synchronise internally.
#[cfg_attr(feature = "serde", typetag::serde(tag = "type"))]
pub trait IoTransport: Debug + Display + DynClone + Send + Sync {
    /// Opens communication (in a blocking way) using the transport layer.
    ///
    /// # Notes
    ///  The method is sync and may block until the connection is established.
    fn open(&self) -> Result<(), Error>;

    /// Gracefully shuts down the transport layer.
    fn close(&self) -> Result<(), Error>;

    /// Sets the read timeout of the transport layer.
    ///
    /// # Notes
    /// This function is optional and may not be supported by all transport layers.
    fn set_timeout(&self, duration: Duration) -> Result<(), Error>;

    /// Write all bytes to the internal connection. For more details see [`std::io::Write::write_all`].
    ///
    /// # Notes
    /// This function blocks until the write operation is complete.
    fn write(&self, buf: &[u8]) -> Result<(), Error>;

    /// Reads whatever is available (at most `buf.len()` bytes). For more details see [`std::io::Read::read`].
    ///
    /// # Returns
    /// The number of bytes read: `0` means nothing arrived before the timeout.
    fn read(&self, buf: &mut [u8]) -> Result<usize, Error>;
}
