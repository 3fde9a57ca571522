//! Firmata protocol constants

// ########################################
// Protocol related functions

/// For non-compatible changes
pub const PROTOCOL_MAJOR_VERSION: u8 = 2;
/// For backwards-compatible changes
pub const PROTOCOL_MINOR_VERSION: u8 = 5;

// ########################################
// Message command bytes (128-255/0x80-0xFF)

/// Send data for a digital port (collection of 8 pins)
pub const DIGITAL_MESSAGE: u8 = 0x90;
/// Send data for an analog pin (or PWM)
pub const ANALOG_MESSAGE: u8 = 0xE0;
/// Enable analog input by pin #
pub const REPORT_ANALOG: u8 = 0xC0;
/// Enable digital input by port pair
pub const REPORT_DIGITAL: u8 = 0xD0;
/// Digital message input range upper byte bound
pub const DIGITAL_MESSAGE_BOUND: u8 = 0x9F;
/// Analog message input range upper byte bound
pub const ANALOG_MESSAGE_BOUND: u8 = 0xEF;
//
/// Set a pin to INPUT/OUTPUT/PWM/etc
pub const SET_PIN_MODE: u8 = 0xF4;
/// Set value of an individual digital pin
pub const SET_DIGITAL_PIN_VALUE: u8 = 0xF5;
//
/// Report protocol version
pub const REPORT_VERSION: u8 = 0xF9;
/// Reset from MIDI
pub const SYSTEM_RESET: u8 = 0xFF;
//
/// Start a MIDI Sysex message
pub const START_SYSEX: u8 = 0xF0;
/// End a MIDI Sysex message
pub const END_SYSEX: u8 = 0xF7;

// ########################################
// Extended command set using sysex (0-127/0x00-0x7F)

/// Communicate with serial devices
pub const SERIAL_MESSAGE: u8 = 0x60;
/// Control a stepper motor through the AccelStepper firmware
pub const ACCELSTEPPER: u8 = 0x62;
/// Ask for mapping of analog to pin numbers
pub const ANALOG_MAPPING_QUERY: u8 = 0x69;
/// Reply with mapping info
pub const ANALOG_MAPPING_RESPONSE: u8 = 0x6A;
/// Ask for supported modes and resolution of all pins
pub const CAPABILITY_QUERY: u8 = 0x6B;
/// Reply with supported modes and resolution
pub const CAPABILITY_RESPONSE: u8 = 0x6C;
/// Ask for a pin's current mode and value
pub const PIN_STATE_QUERY: u8 = 0x6D;
/// Reply with pin's current mode and value
pub const PIN_STATE_RESPONSE: u8 = 0x6E;
/// Analog write (PWM, Servo, etc) to any pin
pub const EXTENDED_ANALOG: u8 = 0x6F;
/// Set max angle, minPulse, maxPulse, freq
pub const SERVO_CONFIG: u8 = 0x70;
/// String message with 14-bits per char
pub const STRING_DATA: u8 = 0x71;
/// Control a stepper motor (legacy stepper firmware)
pub const STEPPER: u8 = 0x72;
/// Send an OneWire read/write/reset/select/skip/search request
pub const ONEWIRE_DATA: u8 = 0x73;
/// Pulse a pin (shares its command byte with ONEWIRE_DATA)
pub const PULSE_OUT: u8 = 0x73;
/// Ultrasonic ping read (PingFirmata)
pub const PING_READ: u8 = 0x75;
/// Send an I2C read/write request
pub const I2C_REQUEST: u8 = 0x76;
/// Reply to an I2C read request
pub const I2C_REPLY: u8 = 0x77;
/// Config I2C settings such as delay times and power pins
pub const I2C_CONFIG: u8 = 0x78;
/// Report name and version of the firmware
pub const QUERY_FIRMWARE: u8 = 0x79;
/// Set the poll rate of the main loop
pub const SAMPLING_INTERVAL: u8 = 0x7A;
/// MIDI Reserved for realtime messages (also used as the 7-bit mask)
pub const SYSEX_REALTIME: u8 = 0x7F;

// ########################################
// I2C

pub const I2C_MODE_WRITE: u8 = 0x00;
pub const I2C_MODE_READ: u8 = 0x01;
pub const I2C_MODE_CONTINUOUS_READ: u8 = 0x02;
pub const I2C_MODE_STOP_READING: u8 = 0x03;
/// Auto-restart flag (set when the device should not receive a stop bit)
pub const I2C_AUTO_RESTART_MASK: u8 = 0x40;
pub const I2C_10BIT_ADDRESS_MODE_MASK: u8 = 0x20;

// ########################################
// OneWire

pub const ONEWIRE_SEARCH_REQUEST: u8 = 0x40;
pub const ONEWIRE_CONFIG_REQUEST: u8 = 0x41;
pub const ONEWIRE_SEARCH_REPLY: u8 = 0x42;
pub const ONEWIRE_READ_REPLY: u8 = 0x43;
pub const ONEWIRE_SEARCH_ALARMS_REQUEST: u8 = 0x44;
pub const ONEWIRE_SEARCH_ALARMS_REPLY: u8 = 0x45;
pub const ONEWIRE_RESET_REQUEST_BIT: u8 = 0x01;
pub const ONEWIRE_SKIP_REQUEST_BIT: u8 = 0x02;
pub const ONEWIRE_SELECT_REQUEST_BIT: u8 = 0x04;
pub const ONEWIRE_READ_REQUEST_BIT: u8 = 0x08;
pub const ONEWIRE_DELAY_REQUEST_BIT: u8 = 0x10;
pub const ONEWIRE_WRITE_REQUEST_BIT: u8 = 0x20;
pub const ONEWIRE_WITHDATA_REQUEST_BITS: u8 = 0x3C;

// ########################################
// Serial (UART passthrough)

pub const SERIAL_CONFIG: u8 = 0x10;
pub const SERIAL_WRITE: u8 = 0x20;
pub const SERIAL_READ: u8 = 0x30;
pub const SERIAL_REPLY: u8 = 0x40;
pub const SERIAL_CLOSE: u8 = 0x50;
pub const SERIAL_FLUSH: u8 = 0x60;
pub const SERIAL_LISTEN: u8 = 0x70;
pub const SERIAL_PORT_ID_MASK: u8 = 0x0F;
pub const SERIAL_MODE_CONTINUOUS_READ: u8 = 0x00;
pub const SERIAL_MODE_STOP_READING: u8 = 0x01;
pub const SERIAL_DEFAULT_BAUD: u32 = 57_600;

// ########################################
// Stepper (legacy)

pub const STEPPER_CONFIG: u8 = 0x00;
pub const STEPPER_STEP: u8 = 0x01;

// ########################################
// AccelStepper

pub const ACCELSTEPPER_CONFIG: u8 = 0x00;
pub const ACCELSTEPPER_ZERO: u8 = 0x01;
pub const ACCELSTEPPER_STEP: u8 = 0x02;
pub const ACCELSTEPPER_TO: u8 = 0x03;
pub const ACCELSTEPPER_ENABLE: u8 = 0x04;
pub const ACCELSTEPPER_STOP: u8 = 0x05;
pub const ACCELSTEPPER_REPORT_POSITION: u8 = 0x06;
pub const ACCELSTEPPER_SET_ACCELERATION: u8 = 0x08;
pub const ACCELSTEPPER_SET_SPEED: u8 = 0x09;
pub const ACCELSTEPPER_MOVE_COMPLETE: u8 = 0x0A;
pub const MULTISTEPPER_CONFIG: u8 = 0x20;
pub const MULTISTEPPER_TO: u8 = 0x21;
pub const MULTISTEPPER_STOP: u8 = 0x23;
pub const MULTISTEPPER_MOVE_COMPLETE: u8 = 0x24;
/// Highest stepper group number supported by the firmware.
pub const MULTISTEPPER_MAX_GROUP: u8 = 5;

// ########################################
// Other values

/// Channel value telling a pin has no analog channel.
pub const NO_ANALOG_CHANNEL: u8 = 0x7F;
/// Number of digital ports the host keeps a shadow byte for.
pub const PORT_COUNT: usize = 16;
/// Number of pins created before the capability response tells the real count.
pub const DEFAULT_PIN_COUNT: u16 = 20;
/// Longest sysex frame kept while waiting for its END_SYSEX.
pub const MAX_SYSEX_SIZE: usize = 4096;
/// Default delay before the REPORT_VERSION request is sent again (milliseconds).
pub const DEFAULT_REPORT_VERSION_TIMEOUT: u64 = 5000;
pub const MIN_SAMPLING_INTERVAL: u16 = 10;
pub const MAX_SAMPLING_INTERVAL: u16 = 65535;
