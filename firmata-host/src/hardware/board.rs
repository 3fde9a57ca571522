use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::time::Instant;

use log::{debug, error, trace};

use crate::errors::ProtocolError::NotInitialized;
use crate::errors::{Error, Unknown};
use crate::io::{BoardOptions, Firmata, IoTransport, Serial, SerialPortId};
use crate::utils::events::EventHandler;
use crate::utils::task;
use crate::{pause, pause_sync};

/// Size of the buffer handed to each transport read.
const READ_CHUNK_SIZE: usize = 1024;

/// Lists all events a Board can emit/listen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoardEvent {
    /// The transport is opened (emitted along `OnOpen`).
    OnConnect,
    OnOpen,
    /// The handshake is complete: the pin table is known.
    OnReady,
    /// The transport is closed.
    OnClose,
    /// A transport failure. Payload: [`Error`].
    OnError,
    /// A STRING_DATA message. Payload: `String`.
    OnString,
    /// Payload: [`Version`](crate::io::Version).
    OnReportVersion,
    /// Payload: [`Firmware`](crate::io::Firmware).
    OnQueryFirmware,
    OnCapabilityQuery,
    OnAnalogMappingQuery,
    /// Value of an analog channel. Payload: `u16`.
    OnAnalogRead(u8),
    /// Level of a digital input pin. Payload: `bool`.
    OnDigitalRead(u16),
    /// Payload: [`Pin`](crate::io::Pin).
    OnPinState(u16),
    /// Any I2C reply of a device. Payload: [`I2CReply`](crate::io::I2CReply).
    OnI2cReply(u16),
    /// Payload: `Vec<u8>`.
    OnSerialData(SerialPortId),
    /// Pulse duration in microseconds. Payload: `u32`.
    OnPingRead(u16),
    /// Payload: `bool` (legacy steppers) or the final position as `i32` (AccelStepper).
    OnStepperDone(u8),
    /// Payload: `i32`.
    OnStepperPosition(u8),
    OnMultiStepperDone(u8),
}

/// Convert events to string to facilitate usage with [`EventManager`](crate::utils::events::EventManager).
impl From<BoardEvent> for String {
    fn from(value: BoardEvent) -> Self {
        match value {
            BoardEvent::OnConnect => "connect".into(),
            BoardEvent::OnOpen => "open".into(),
            BoardEvent::OnReady => "ready".into(),
            BoardEvent::OnClose => "close".into(),
            BoardEvent::OnError => "error".into(),
            BoardEvent::OnString => "string".into(),
            BoardEvent::OnReportVersion => "reportversion".into(),
            BoardEvent::OnQueryFirmware => "queryfirmware".into(),
            BoardEvent::OnCapabilityQuery => "capability-query".into(),
            BoardEvent::OnAnalogMappingQuery => "analog-mapping-query".into(),
            BoardEvent::OnAnalogRead(channel) => format!("analog-read-{}", channel),
            BoardEvent::OnDigitalRead(pin) => format!("digital-read-{}", pin),
            BoardEvent::OnPinState(pin) => format!("pin-state-{}", pin),
            BoardEvent::OnI2cReply(address) => format!("I2C-reply-{}", address),
            BoardEvent::OnSerialData(port) => format!("serial-data-{}", u8::from(port)),
            BoardEvent::OnPingRead(pin) => format!("ping-read-{}", pin),
            BoardEvent::OnStepperDone(device) => format!("stepper-done-{}", device),
            BoardEvent::OnStepperPosition(device) => format!("stepper-position-{}", device),
            BoardEvent::OnMultiStepperDone(group) => format!("multi-stepper-done-{}", group),
        }
    }
}

/// A board reached through a [`Firmata`] engine: owns the transport lifecycle.
///
/// [`Board::open`] opens the transport and keeps reading it in the background, feeding every
/// chunk to the engine. Every [`Firmata`] operation is available on the board through `Deref`.
#[derive(Clone, Debug)]
pub struct Board {
    firmata: Firmata,
}

impl Default for Board {
    /// A board using a [`Serial`] transport on the first available port.
    ///
    /// **_/!\ The board will NOT be connected until the [`Board::open`] method is called._**
    fn default() -> Self {
        Self::new(Firmata::from(Serial::default()))
    }
}

impl From<Firmata> for Board {
    fn from(firmata: Firmata) -> Self {
        Self::new(firmata)
    }
}

impl Board {
    /// Creates and opens a default board.
    ///
    /// # Example
    /// ```no_run
    /// use firmata_host::hardware::{Board, BoardEvent};
    ///
    /// #[firmata_host::runtime]
    /// async fn main() {
    ///     let board = Board::run();
    ///     board.on(BoardEvent::OnReady, |_: ()| {
    ///         // The board can be used from here.
    ///     });
    /// }
    /// ```
    pub fn run() -> Self {
        Self::default().open()
    }

    pub fn new(firmata: Firmata) -> Self {
        Self { firmata }
    }

    /// Creates a board over any transport, with the given options.
    pub fn with_transport<T: IoTransport + 'static>(transport: T, options: BoardOptions) -> Self {
        Self::new(Firmata::new(transport, options))
    }

    /// Opens the board in the background: the transport is opened, then read continuously until
    /// it is closed or fails. Listen to [`BoardEvent::OnReady`] to know when the board can be used.
    pub fn open(self) -> Self {
        let board = self.clone();
        let result = task::run(async move {
            board.firmata.open()?;
            board.poll().await
        });
        if let Err(err) = result {
            error!("Board cannot be opened: {}", err);
        }
        self
    }

    /// Blocking version of [`Self::open()`]: returns once the handshake is complete.
    ///
    /// When called from the runtime, the transport is then read in the background as with
    /// [`Self::open()`].
    ///
    /// Waits for the handshake as long as it takes, unless
    /// [`BoardOptions::max_handshake_attempts`] is set.
    ///
    /// # Errors
    /// * `NotInitialized`: the handshake did not complete within `max_handshake_attempts`
    ///   periods (the transport is then closed).
    /// * any error of the transport.
    pub fn blocking_open(self) -> Result<Self, Error> {
        self.firmata.open()?;
        if let Err(err) = self.pump_until_ready() {
            if let Err(close_err) = self.firmata.close() {
                debug!("Transport cannot be closed: {}", close_err);
            }
            return Err(err);
        }
        trace!("Board is ready: {:#?}", self.get_io().read());

        if let Err(err) = task::run(self.clone().poll()) {
            debug!("Board will not be read in the background: {}", err);
        }
        Ok(self)
    }

    /// Closes the board in the background: [`BoardEvent::OnClose`] is emitted once done.
    pub fn close(self) -> Self {
        let board = self.clone();
        if let Err(err) = task::run(async move { board.blocking_close().map(|_| ()) }) {
            error!("Board cannot be closed: {}", err);
        }
        self
    }

    /// Blocking version of [`Self::close()`].
    pub fn blocking_close(self) -> Result<Self, Error> {
        self.firmata.close()?;
        trace!("Board is closed");
        Ok(self)
    }

    /// Registers a callback to be executed on a given event.
    ///
    /// Available events are listed by [`BoardEvent`] with the payload their callback receives.
    /// Plain strings work too (custom sysex handlers may emit their own events).
    ///
    /// # Example
    /// ```
    /// use firmata_host::hardware::{Board, BoardEvent};
    /// use firmata_host::io::Serial;
    ///
    /// let board = Board::from(firmata_host::io::Firmata::from(Serial::new("/dev/ttyACM0")));
    /// board.on(BoardEvent::OnAnalogRead(0), |value: u16| {
    ///     println!("A0: {}", value);
    /// });
    /// ```
    pub fn on<S, F, T>(&self, event: S, callback: F) -> EventHandler
    where
        S: Into<String>,
        T: 'static + Send + Sync + Clone,
        F: FnMut(T) + Send + 'static,
    {
        self.firmata.on(event, callback)
    }

    /// Reads the transport synchronously until the handshake completes, asking for the version
    /// again after each silent `report_version_timeout`.
    fn pump_until_ready(&self) -> Result<(), Error> {
        let timeout = self.get_options().report_version_timeout;
        let max_attempts = self.get_options().max_handshake_attempts;
        let transport = self.get_transport();
        let mut buf = [0u8; READ_CHUNK_SIZE];
        let mut attempts = 1;
        let mut deadline = Instant::now() + timeout;

        while !self.is_ready() {
            let count = transport.read(&mut buf)?;
            if count > 0 {
                self.receive(&buf[..count]);
                continue;
            }
            if Instant::now() < deadline {
                pause_sync!(1);
                continue;
            }
            if max_attempts.is_some_and(|max| attempts >= max) {
                return Err(NotInitialized.into());
            }
            if !self.is_versioned() {
                debug!("No version reported after {:?}: asking again", timeout);
                self.firmata.request_version()?;
            }
            attempts += 1;
            deadline = Instant::now() + timeout;
        }
        Ok(())
    }

    /// Feeds the engine with whatever the transport receives, until the board is disconnected.
    /// A read failure is forwarded to [`BoardEvent::OnError`] and stops the polling.
    async fn poll(self) -> Result<(), Error> {
        let transport = self.get_transport();
        while self.is_connected() {
            let reader = transport.clone();
            let read = tokio::task::spawn_blocking(move || {
                let mut buf = [0u8; READ_CHUNK_SIZE];
                reader.read(&mut buf).map(|count| buf[..count].to_vec())
            })
            .await
            .map_err(|err| Unknown {
                info: err.to_string(),
            })?;

            match read {
                Ok(chunk) if chunk.is_empty() => pause!(1),
                Ok(chunk) => self.receive(&chunk),
                Err(err) => {
                    if self.is_connected() {
                        self.transport_error(err);
                    }
                    break;
                }
            }
        }
        Ok(())
    }
}

impl Deref for Board {
    type Target = Firmata;

    fn deref(&self) -> &Self::Target {
        &self.firmata
    }
}

impl Display for Board {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Board ({})", self.firmata)
    }
}
