use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use crate::errors::HardwareError::UnknownPin;
use crate::errors::*;
use crate::io::constants::{NO_ANALOG_CHANNEL, PORT_COUNT};
use crate::io::firmata::SerialPortId;

/// Represents the internal data that a [`Firmata`](crate::io::Firmata) engine handles.
///
/// This struct is hidden behind an `Arc<RwLock<IoData>>` to allow safe concurrent access
/// and modification. It holds the pin table, the digital port shadow registers and everything
/// learnt from the board during the handshake.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IoData {
    /// All `Pin` instances, indexed by pin id.
    pub pins: Vec<Pin>,
    /// Shadow register of each digital port: bit `i` of `ports[p]` is the level of pin `8 * p + i`.
    pub ports: [u8; PORT_COUNT],
    /// Ports waiting for [`Firmata::flush_digital_ports`](crate::io::Firmata::flush_digital_ports).
    #[cfg_attr(feature = "serde", serde(skip))]
    pub queued_ports: u16,
    /// Analog channel to pin id mapping: `analog_pins[channel] = pin`.
    pub analog_pins: Vec<u16>,
    /// Board wide resolutions learnt from the capability response.
    pub resolution: Resolution,
    /// The protocol version announced by the board (REPORT_VERSION).
    pub protocol_version: Option<Version>,
    /// Firmware name and version (QUERY_FIRMWARE reply).
    pub firmware: Option<Firmware>,
    /// Last sampling interval sent to the board (in ms).
    pub sampling_interval: Option<u16>,
    /// I2C settings: `None` until I2C has been configured.
    pub i2c: Option<I2cSettings>,
    /// The software serial port currently listening.
    pub serial_listening: Option<SerialPortId>,
    /// A boolean indicating whether the transport is connected.
    pub connected: bool,
}

impl IoData {
    /// Builds an `IoData` with `count` zeroed pins.
    pub fn with_pin_count(count: u16) -> Self {
        Self {
            pins: (0..count).map(Pin::new).collect(),
            ..Default::default()
        }
    }

    /// # Errors
    /// * `UnknownPin` - No pin has the given id.
    pub fn get_pin(&self, pin: u16) -> Result<&Pin, Error> {
        self.pins
            .get(pin as usize)
            .ok_or(Error::from(UnknownPin { pin }))
    }

    /// # Errors
    /// * `UnknownPin` - No pin has the given id.
    pub fn get_pin_mut(&mut self, pin: u16) -> Result<&mut Pin, Error> {
        self.pins
            .get_mut(pin as usize)
            .ok_or(Error::from(UnknownPin { pin }))
    }

    /// Returns the pin id behind an analog channel, if the board mapped it.
    pub fn analog_pin(&self, channel: u8) -> Option<u16> {
        self.analog_pins.get(channel as usize).copied()
    }

    /// Sets or clears the bit of `pin` in its port shadow register and returns the port number.
    pub(crate) fn update_port_bit(&mut self, pin: u16, level: bool) -> u8 {
        let port = (pin >> 3) as u8;
        let bit = 1 << (pin & 0x07);
        if let Some(value) = self.ports.get_mut(port as usize) {
            match level {
                true => *value |= bit,
                false => *value &= !bit,
            }
        }
        port
    }
}

/// Firmata protocol version (as announced by REPORT_VERSION or QUERY_FIRMWARE).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Firmware information, known once the board answered QUERY_FIRMWARE.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Firmware {
    pub name: String,
    pub version: Version,
}

impl Display for Firmware {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.version)
    }
}

/// Board wide resolutions, as max values (`2^bits - 1`), taken from the first pin announcing them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Resolution {
    /// Resolution of the analog inputs.
    pub adc: Option<u32>,
    /// Resolution of the PWM outputs.
    pub pwm: Option<u32>,
}

/// I2C state of a board.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct I2cSettings {
    /// Delay (µs) between a register write and the following read.
    pub delay: u16,
    /// Per device settings, keyed by address.
    pub devices: HashMap<u16, I2cDeviceSettings>,
}

impl I2cSettings {
    /// Returns the settings of the device at `address`, creating the default record if missing.
    pub fn device_mut(&mut self, address: u16) -> &mut I2cDeviceSettings {
        self.devices.entry(address).or_default()
    }
}

/// Settings of a single I2C peripheral.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct I2cDeviceSettings {
    /// Send a stop bit at the end of each read (cleared means auto-restart).
    pub stop_tx: bool,
    /// Arbitrary caller supplied settings.
    pub extra: HashMap<String, String>,
}

impl Default for I2cDeviceSettings {
    fn default() -> Self {
        Self {
            stop_tx: true,
            extra: HashMap::new(),
        }
    }
}

/// Defines an I2C reply.
#[derive(Default, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct I2CReply {
    pub address: u16,
    pub register: u16,
    pub data: Vec<u16>,
}

/// Represents the current state and configuration of a pin.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pin {
    /// The pin ID, which also corresponds to the index of the [`IoData::pins`] vector.
    pub id: u16,
    /// The pin name: 'D13' or 'A0' for instance.
    pub name: String,
    /// Currently configured mode.
    pub mode: PinModeId,
    /// All pin supported modes.
    pub supported_modes: Vec<PinMode>,
    /// For analog pin, this is the channel number ie "A0"=>0, "A1"=>1, etc...
    pub channel: Option<u8>,
    /// Whether the pin value is reported by the board.
    pub report: bool,
    /// Last known value.
    pub value: u32,
}

impl Pin {
    /// Creates a zeroed pin.
    pub fn new(id: u16) -> Self {
        Self {
            id,
            name: format!("D{}", id),
            mode: PinModeId::default(),
            supported_modes: vec![],
            channel: None,
            report: true,
            value: 0,
        }
    }

    /// Verifies if a pin supports the given mode and returns it if it does.
    pub fn supports_mode(&self, mode: PinModeId) -> Option<PinMode> {
        self.supported_modes.iter().find(|m| m.id == mode).copied()
    }

    /// Sets the analog channel from its wire value (127 meaning "not analog").
    pub fn set_channel(&mut self, channel: u8) {
        match channel {
            NO_ANALOG_CHANNEL => {
                self.channel = None;
                self.name = format!("D{}", self.id);
            }
            channel => {
                self.channel = Some(channel);
                self.name = format!("A{}", channel);
            }
        }
    }

    /// Number of bits used by the given mode (if supported).
    pub fn resolution(&self, mode: PinModeId) -> Option<u8> {
        self.supports_mode(mode).map(|m| m.resolution)
    }

    pub fn analog_resolution(&self) -> Option<u8> {
        self.resolution(PinModeId::ANALOG)
    }

    pub fn pwm_resolution(&self) -> Option<u8> {
        self.resolution(PinModeId::PWM)
    }

    pub fn servo_resolution(&self) -> Option<u8> {
        self.resolution(PinModeId::SERVO)
    }

    /// Get the max value this pin can reach in its current mode.
    pub fn get_max_possible_value(&self) -> Option<u32> {
        self.supports_mode(self.mode)
            .map(|mode| mode.get_max_possible_value())
    }
}

// ########################################

/// Represents a mode supported by a pin, with the number of bits it uses.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, Copy, PartialEq, Eq)]
pub struct PinMode {
    pub id: PinModeId,
    pub resolution: u8,
}

impl PinMode {
    /// Get the max value this mode can reach according to its resolution.
    pub fn get_max_possible_value(&self) -> u32 {
        match self.resolution {
            0 => 1,
            bits => (1u32 << bits.min(31)) - 1,
        }
    }
}

impl Display for PinMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

// ########################################

/// Enumerates the possible modes for a pin.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
#[repr(u8)]
pub enum PinModeId {
    /// Same as INPUT defined in Arduino.
    INPUT = 0,
    /// Same as OUTPUT defined in Arduino.h
    OUTPUT = 1,
    /// Analog pin in analogInput mode
    ANALOG = 2,
    /// Digital pin in PWM output mode
    PWM = 3,
    /// Digital pin in Servo output mode
    SERVO = 4,
    /// shiftIn/shiftOut mode
    SHIFT = 5,
    /// Pin included in I2C setup
    I2C = 6,
    /// Pin configured for 1-wire
    ONEWIRE = 7,
    /// Pin configured for stepper motor
    STEPPER = 8,
    /// Pin configured for rotary encoders
    ENCODER = 9,
    /// Pin configured for serial communication
    SERIAL = 0x0A,
    /// Enable internal pull-up resistor for pin
    PULLUP = 0x0B,
    /// Pin configured for SPI
    SPI = 0x0C,
    /// Pin configured for proximity sensors
    SONAR = 0x0D,
    /// Pin configured for piezzo buzzer tone generation
    TONE = 0x0E,
    /// Pin configured for DHT humidity and temperature sensors
    DHT = 0x0F,
    /// Mode not learnt yet
    #[default]
    UNKNOWN = 0x10,
    /// Pin configured for ultrasonic ping reads (PingFirmata)
    PING_READ = 0x75,
    /// Pin configured to be ignored by digitalWrite and capabilityResponse
    IGNORE = 0x7F,
}

impl PinModeId {
    /// Converts a `u8` byte value into a `PinModeId`.
    ///
    /// # Errors
    /// * `Unknown`: The value does not match any known pin mode.
    pub fn from_u8(value: u8) -> Result<PinModeId, Error> {
        match value {
            0 => Ok(PinModeId::INPUT),
            1 => Ok(PinModeId::OUTPUT),
            2 => Ok(PinModeId::ANALOG),
            3 => Ok(PinModeId::PWM),
            4 => Ok(PinModeId::SERVO),
            5 => Ok(PinModeId::SHIFT),
            6 => Ok(PinModeId::I2C),
            7 => Ok(PinModeId::ONEWIRE),
            8 => Ok(PinModeId::STEPPER),
            9 => Ok(PinModeId::ENCODER),
            0x0A => Ok(PinModeId::SERIAL),
            0x0B => Ok(PinModeId::PULLUP),
            0x0C => Ok(PinModeId::SPI),
            0x0D => Ok(PinModeId::SONAR),
            0x0E => Ok(PinModeId::TONE),
            0x0F => Ok(PinModeId::DHT),
            0x10 => Ok(PinModeId::UNKNOWN),
            0x75 => Ok(PinModeId::PING_READ),
            0x7F => Ok(PinModeId::IGNORE),
            x => Err(Unknown {
                info: format!("PinMode not found with value: {}", x),
            }),
        }
    }
}

impl From<PinModeId> for u8 {
    fn from(mode: PinModeId) -> u8 {
        mode as u8
    }
}

impl Display for PinModeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
