use std::str::Utf8Error;

use log::error;
use snafu::Snafu;

pub use crate::errors::Error::*;
use crate::errors::ProtocolError::IoException;
use crate::io::PinModeId;

#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Runtime error: Are you sure your code runs inside #[firmata_host::runtime]?
    RuntimeError,
    /// Configuration error: {source}.
    ConfigurationError { source: ConfigurationError },
    /// Protocol error: {source}.
    ProtocolError { source: ProtocolError },
    /// Hardware error: {source}.
    HardwareError { source: HardwareError },
    /// Unknown error: {info}.
    Unknown { info: String },
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        error!("std::io error {:?}", error);
        let info = match error.kind() {
            std::io::ErrorKind::NotFound => String::from("Board not found or already in use"),
            std::io::ErrorKind::PermissionDenied => String::from("Board connection lost"),
            _ => error.to_string(),
        };
        Self::ProtocolError {
            source: IoException { info },
        }
    }
}

impl From<ConfigurationError> for Error {
    fn from(value: ConfigurationError) -> Self {
        Self::ConfigurationError { source: value }
    }
}

impl From<ProtocolError> for Error {
    fn from(value: ProtocolError) -> Self {
        Self::ProtocolError { source: value }
    }
}

impl From<HardwareError> for Error {
    fn from(value: HardwareError) -> Self {
        Self::HardwareError { source: value }
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Self::Unknown {
            info: value.to_string(),
        }
    }
}

/// Errors raised synchronously, before anything is written, when a call is misused.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigurationError {
    /// I2C is not enabled for this board: call i2c_config() first
    I2cNotConfigured,
    /// Both RX and TX pins must be defined when using software serial port {port:#04X}
    SoftwareSerialPins { port: u8 },
    /// Invalid serial port id {port:#04X}
    InvalidSerialPort { port: u8 },
    /// Invalid stepper group number {group} (expected 0 to 5)
    InvalidStepperGroup { group: u8 },
    /// A sysex handler is already registered for command {command:#04X}
    SysexHandlerRegistered { command: u8 },
    /// Sysex command payload cannot be empty
    EmptySysexCommand,
    /// Missing parameter '{name}'
    MissingParameter { name: &'static str },
}

#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum ProtocolError {
    /// {info}
    IoException { info: String },
    /// Connection has not been initialized
    NotInitialized,
    /// Not enough bytes received - '{operation}' expected {expected} bytes, {received} received
    MessageTooShort {
        operation: &'static str,
        expected: usize,
        received: usize,
    },
    /// Unexpected data received
    UnexpectedData,
}

#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum HardwareError {
    /// Pin ({pin}) not compatible with mode ({mode}) - {context}
    IncompatibleMode {
        pin: u16,
        mode: PinModeId,
        context: &'static str,
    },
    /// Unknown pin {pin}
    UnknownPin { pin: u16 },
}
