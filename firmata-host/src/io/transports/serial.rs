use std::fmt::{Display, Formatter};
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use log::trace;
use parking_lot::Mutex;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::errors::Error;
use crate::errors::ProtocolError::NotInitialized;
use crate::io::constants::SERIAL_DEFAULT_BAUD;
use crate::io::IoTransport;

type SharedPort = Arc<Mutex<Option<Box<dyn SerialPort>>>>;

/// Serial (USB / UART) transport: 8 data bits, no parity, one stop bit, no flow control.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug)]
pub struct Serial {
    /// The connection port.
    port: String,
    /// The connection speed.
    baud: u32,
    /// Write side of the connection.
    #[cfg_attr(feature = "serde", serde(skip))]
    io: SharedPort,
    /// Read side of the connection (a clone of the same port, so reads never block writes).
    #[cfg_attr(feature = "serde", serde(skip))]
    reader: SharedPort,
}

impl Serial {
    /// Constructs a new `Serial` transport layer instance for communication through the specified port.
    ///
    /// # Example
    /// ```no_run
    /// use firmata_host::hardware::Board;
    /// use firmata_host::io::Serial;
    ///
    /// #[firmata_host::runtime]
    /// async fn main() {
    ///     let board = Board::from(firmata_host::io::Firmata::from(Serial::new("/dev/ttyACM0"))).open();
    /// }
    /// ```
    pub fn new<P: Into<String>>(port: P) -> Self {
        Self {
            port: port.into(),
            baud: SERIAL_DEFAULT_BAUD,
            io: Arc::new(Mutex::new(None)),
            reader: Arc::new(Mutex::new(None)),
        }
    }

    /// Overrides the connection speed (57600 by default, as StandardFirmata expects).
    pub fn with_baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }

    /// Retrieves the configured port.
    pub fn get_port(&self) -> String {
        self.port.clone()
    }

    /// Retrieves the configured speed.
    pub fn get_baud(&self) -> u32 {
        self.baud
    }
}

impl Default for Serial {
    /// Creates a new serial transport connection with the first available port or an empty string if no ports are available.
    ///
    /// # Notes
    /// The first available port will be used, None otherwise, which will probably lead to an error
    /// during the open phase.
    #[cfg(not(tarpaulin_include))]
    fn default() -> Self {
        let ports = serialport::available_ports().unwrap_or_else(|_| vec![]);
        match ports.first() {
            Some(port) => Self::new(&port.port_name),
            None => Self::new(""),
        }
    }
}

impl Display for Serial {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Serial({})", self.port)
    }
}

#[cfg_attr(feature = "serde", typetag::serde)]
impl IoTransport for Serial {
    fn open(&self) -> Result<(), Error> {
        let connexion = serialport::new(self.port.clone(), self.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()?;
        trace!("Serial port is now opened: {:?}", connexion.name());

        *self.reader.lock() = Some(connexion.try_clone()?);
        *self.io.lock() = Some(connexion);
        Ok(())
    }

    fn close(&self) -> Result<(), Error> {
        *self.io.lock() = None;
        *self.reader.lock() = None;
        Ok(())
    }

    fn set_timeout(&self, duration: Duration) -> Result<(), Error> {
        let mut lock = self.reader.lock();
        lock.as_mut().ok_or(NotInitialized)?.set_timeout(duration)?;
        Ok(())
    }

    fn write(&self, buf: &[u8]) -> Result<(), Error> {
        let mut lock = self.io.lock();
        lock.as_mut().ok_or(NotInitialized)?.write_all(buf)?;
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut lock = self.reader.lock();
        match lock.as_mut().ok_or(NotInitialized)?.read(buf) {
            Ok(count) => Ok(count),
            Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }
}

impl From<serialport::Error> for Error {
    fn from(value: serialport::Error) -> Self {
        std::io::Error::from(value).into()
    }
}
