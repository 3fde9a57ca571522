use std::fmt::{Display, Formatter};

use crate::errors::ConfigurationError::{InvalidSerialPort, SoftwareSerialPins};
use crate::errors::Error;
use crate::io::constants::*;
use crate::io::encoding::encode_pairs;
use crate::io::firmata::handlers::ensure_length;
use crate::io::Firmata;
use crate::utils::events::EventHandler;

/// Identifies a serial port of the board: hardware UARTs or software serial ports.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SerialPortId {
    HW0 = 0x00,
    HW1 = 0x01,
    HW2 = 0x02,
    HW3 = 0x03,
    SW0 = 0x08,
    SW1 = 0x09,
    SW2 = 0x0A,
    SW3 = 0x0B,
}

impl SerialPortId {
    /// Software ports need RX/TX pins and only one of them may listen at a time.
    pub fn is_software(&self) -> bool {
        (*self as u8) >= SerialPortId::SW0 as u8
    }
}

impl TryFrom<u8> for SerialPortId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(SerialPortId::HW0),
            0x01 => Ok(SerialPortId::HW1),
            0x02 => Ok(SerialPortId::HW2),
            0x03 => Ok(SerialPortId::HW3),
            0x08 => Ok(SerialPortId::SW0),
            0x09 => Ok(SerialPortId::SW1),
            0x0A => Ok(SerialPortId::SW2),
            0x0B => Ok(SerialPortId::SW3),
            port => Err(InvalidSerialPort { port }.into()),
        }
    }
}

impl From<SerialPortId> for u8 {
    fn from(port: SerialPortId) -> u8 {
        port as u8
    }
}

impl Display for SerialPortId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Parameters of [`Firmata::serial_config`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct SerialConfig {
    pub port: SerialPortId,
    /// Defaults to 57600.
    pub baud: Option<u32>,
    /// Receive pin (software ports only).
    pub rx_pin: Option<u8>,
    /// Transmit pin (software ports only).
    pub tx_pin: Option<u8>,
}

impl From<SerialPortId> for SerialConfig {
    fn from(port: SerialPortId) -> Self {
        Self {
            port,
            baud: None,
            rx_pin: None,
            tx_pin: None,
        }
    }
}

impl Firmata {
    /// Configures a serial port of the board.
    ///
    /// # Errors
    /// * `SoftwareSerialPins`: a software port is given only one of its RX/TX pins.
    pub fn serial_config<C: Into<SerialConfig>>(&self, config: C) -> Result<(), Error> {
        let config = config.into();
        let port = u8::from(config.port);
        let baud = config.baud.unwrap_or(SERIAL_DEFAULT_BAUD);

        let mut payload = vec![
            START_SYSEX,
            SERIAL_MESSAGE,
            SERIAL_CONFIG | port,
            baud as u8 & SYSEX_REALTIME,
            (baud >> 7) as u8 & SYSEX_REALTIME,
            (baud >> 14) as u8 & SYSEX_REALTIME,
        ];
        match (config.rx_pin, config.tx_pin) {
            (Some(rx), Some(tx)) => payload.extend([rx, tx]),
            (None, None) if !config.port.is_software() => {}
            _ if config.port.is_software() => return Err(SoftwareSerialPins { port }.into()),
            _ => {}
        }
        payload.push(END_SYSEX);
        self.write(&payload)
    }

    /// Writes bytes to a serial port of the board.
    pub fn serial_write(&self, port: SerialPortId, data: &[u8]) -> Result<(), Error> {
        if data.is_empty() {
            return Ok(());
        }
        let mut payload = vec![START_SYSEX, SERIAL_MESSAGE, SERIAL_WRITE | u8::from(port)];
        payload.extend(encode_pairs(data));
        payload.push(END_SYSEX);
        self.write(&payload)
    }

    /// Starts reading a serial port continuously: `callback` receives each chunk until
    /// [`Firmata::serial_stop`].
    pub fn serial_read<F>(
        &self,
        port: SerialPortId,
        max_bytes: Option<u16>,
        callback: F,
    ) -> Result<EventHandler, Error>
    where
        F: FnMut(Vec<u8>) + Send + 'static,
    {
        let mut payload = vec![
            START_SYSEX,
            SERIAL_MESSAGE,
            SERIAL_READ | u8::from(port),
            SERIAL_MODE_CONTINUOUS_READ,
        ];
        if let Some(max) = max_bytes {
            payload.extend([max as u8 & SYSEX_REALTIME, (max >> 7) as u8 & SYSEX_REALTIME]);
        }
        payload.push(END_SYSEX);

        let handler = self.on(format!("serial-data-{}", u8::from(port)), callback);
        self.write(&payload)?;
        Ok(handler)
    }

    /// Stops reading a serial port and drops its callbacks.
    pub fn serial_stop(&self, port: SerialPortId) -> Result<(), Error> {
        self.events
            .unregister_all(format!("serial-data-{}", u8::from(port)));
        self.write(&[
            START_SYSEX,
            SERIAL_MESSAGE,
            SERIAL_READ | u8::from(port),
            SERIAL_MODE_STOP_READING,
            END_SYSEX,
        ])
    }

    pub fn serial_close(&self, port: SerialPortId) -> Result<(), Error> {
        self.write(&[
            START_SYSEX,
            SERIAL_MESSAGE,
            SERIAL_CLOSE | u8::from(port),
            END_SYSEX,
        ])
    }

    pub fn serial_flush(&self, port: SerialPortId) -> Result<(), Error> {
        self.write(&[
            START_SYSEX,
            SERIAL_MESSAGE,
            SERIAL_FLUSH | u8::from(port),
            END_SYSEX,
        ])
    }

    /// Makes a software serial port the listening one. Hardware ports always listen: nothing is
    /// sent for them.
    pub fn serial_listen(&self, port: SerialPortId) -> Result<(), Error> {
        if !port.is_software() {
            return Ok(());
        }
        self.data.write().serial_listening = Some(port);
        self.write(&[
            START_SYSEX,
            SERIAL_MESSAGE,
            SERIAL_LISTEN | u8::from(port),
            END_SYSEX,
        ])
    }

    /// Handle a SERIAL_MESSAGE reply: `[0xF0, 0x60, 0x40 | port, data as pairs..., 0xF7]`.
    pub(crate) fn handle_serial_reply(&self, buf: &[u8]) -> Result<(), Error> {
        ensure_length("handle_serial_reply", buf, 4)?;
        if buf[2] & 0xF0 != SERIAL_REPLY {
            return Ok(());
        }
        let port = buf[2] & SERIAL_PORT_ID_MASK;
        let data: Vec<u8> = buf[3..buf.len() - 1]
            .chunks(2)
            .map(|pair| {
                let msb = pair.get(1).copied().unwrap_or(0);
                (pair[0] & SYSEX_REALTIME) | (msb << 7)
            })
            .collect();
        self.emit(format!("serial-data-{}", port), data);
        Ok(())
    }
}
