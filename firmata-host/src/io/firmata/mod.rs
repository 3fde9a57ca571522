//! Official Firmata documentation: https://github.com/firmata/protocol
//! Helper unofficial documentation: https://github.com/martin-eden/firmata_protocol/blob/main/protocol.md

mod handlers;
mod i2c;
mod onewire;
mod stepper;
mod uart;

use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::AtomicU16;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, trace, warn};
use parking_lot::{Mutex, RwLock};

pub use crate::io::firmata::i2c::*;
pub use crate::io::firmata::onewire::*;
pub use crate::io::firmata::stepper::*;
pub use crate::io::firmata::uart::*;

use crate::errors::ConfigurationError::EmptySysexCommand;
use crate::errors::Error;
use crate::errors::HardwareError::{IncompatibleMode, UnknownPin};
use crate::io::constants::*;
use crate::io::encoding::encode_pairs;
use crate::io::{
    Dispatcher, FrameParser, Handshake, HandshakeState, HandshakeStep, IoData, IoTransport, Pin,
    PinModeId, Version,
};
use crate::io::{Firmware, SysexHandler};
use crate::utils::events::{EventHandler, EventManager};
use crate::utils::helpers::format_as_hex;
use crate::utils::task;
use crate::utils::task::TaskHandler;

type PendingRead = Box<dyn FnOnce(Vec<u8>) + Send>;

/// Options of a [`Firmata`] engine.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug)]
pub struct BoardOptions {
    /// Delay before REPORT_VERSION and QUERY_FIRMWARE are sent again when the board stays silent.
    pub report_version_timeout: Duration,
    /// Sampling interval (ms) sent right after the firmware reply.
    pub sampling_interval: Option<u16>,
    /// Skips capability, analog mapping and pin state discovery: `ready` follows the firmware reply.
    pub skip_capabilities: bool,
    /// Pin table to start with (mostly useful along `skip_capabilities`).
    pub pins: Option<Vec<Pin>>,
    /// Analog channel to pin mapping to start with.
    pub analog_pins: Option<Vec<u16>>,
    /// Number of silent `report_version_timeout` periods after which a blocking open gives up.
    /// Unbounded when `None`.
    pub max_handshake_attempts: Option<u32>,
}

impl Default for BoardOptions {
    fn default() -> Self {
        Self {
            report_version_timeout: Duration::from_millis(DEFAULT_REPORT_VERSION_TIMEOUT),
            sampling_interval: None,
            skip_capabilities: false,
            pins: None,
            analog_pins: None,
            max_handshake_attempts: None,
        }
    }
}

/// Implements the host side of the [Firmata protocol](https://github.com/firmata/protocol).
///
/// The engine is fed with raw chunks through [`Firmata::receive`] and writes its requests to its
/// [`IoTransport`]. Replies are turned into events (see [`Firmata::on`]) and into updates of the
/// shared [`IoData`]. Clones share everything: transport, state, events and handlers.
#[derive(Clone)]
pub struct Firmata {
    /// Transport layer used to communicate with the device.
    transport: Box<dyn IoTransport>,
    options: BoardOptions,

    // ########################################
    // # Volatile utility data.
    data: Arc<RwLock<IoData>>,
    events: EventManager,
    parser: Arc<Mutex<FrameParser>>,
    handshake: Arc<Mutex<Handshake>>,
    dispatcher: Dispatcher,
    /// Next OneWire correlation id.
    onewire_next_id: Arc<AtomicU16>,
    /// OneWire reads waiting for their reply, by correlation id.
    onewire_pending: Arc<Mutex<HashMap<u16, PendingRead>>>,
    /// Continuous I2C read subscriptions, by device address.
    i2c_subscriptions: Arc<Mutex<HashMap<u16, Vec<EventHandler>>>>,
    /// Inner handler to the REPORT_VERSION resend task.
    version_timer: Arc<Mutex<Option<TaskHandler>>>,
}

impl Firmata {
    /// Creates an engine talking through the given transport (not opened yet).
    pub fn new<T: IoTransport + 'static>(transport: T, options: BoardOptions) -> Self {
        let mut data = match &options.pins {
            Some(pins) => IoData {
                pins: pins.clone(),
                ..Default::default()
            },
            None => IoData::with_pin_count(DEFAULT_PIN_COUNT),
        };
        if let Some(analog_pins) = &options.analog_pins {
            data.analog_pins = analog_pins.clone();
        }

        Self {
            transport: Box::new(transport),
            handshake: Arc::new(Mutex::new(Handshake::new(options.skip_capabilities))),
            options,
            data: Arc::new(RwLock::new(data)),
            events: EventManager::default(),
            parser: Arc::new(Mutex::new(FrameParser::new())),
            dispatcher: Dispatcher::with_builtin(),
            onewire_next_id: Arc::new(AtomicU16::new(1)),
            onewire_pending: Arc::new(Mutex::new(HashMap::new())),
            i2c_subscriptions: Arc::new(Mutex::new(HashMap::new())),
            version_timer: Arc::new(Mutex::new(None)),
        }
    }

    pub fn get_io(&self) -> &Arc<RwLock<IoData>> {
        &self.data
    }

    pub fn get_options(&self) -> &BoardOptions {
        &self.options
    }

    /// A handle on the transport (clones share the same connection).
    pub fn get_transport(&self) -> Box<dyn IoTransport> {
        self.transport.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.data.read().connected
    }

    /// Whether a REPORT_VERSION message has been received: nothing else is decoded before.
    pub fn is_versioned(&self) -> bool {
        self.parser.lock().is_versioned()
    }

    pub fn is_ready(&self) -> bool {
        self.handshake.lock().is_ready()
    }

    pub fn handshake_state(&self) -> HandshakeState {
        self.handshake.lock().state()
    }

    // ########################################
    // Events

    /// Registers a callback on an event, until unregistered.
    ///
    /// # Example
    /// ```
    /// use firmata_host::io::{Firmata, Serial};
    ///
    /// let firmata = Firmata::from(Serial::new("/dev/ttyACM0"));
    /// firmata.on("string", |text: String| println!("Board says: {}", text));
    /// ```
    pub fn on<S, F, T>(&self, event: S, callback: F) -> EventHandler
    where
        S: Into<String>,
        T: 'static + Send + Sync + Clone,
        F: FnMut(T) + Send + 'static,
    {
        self.events.on(event, callback)
    }

    /// Registers a callback called on the next emission of an event only.
    pub fn once<S, F, T>(&self, event: S, callback: F) -> EventHandler
    where
        S: Into<String>,
        T: 'static + Send + Sync + Clone,
        F: FnOnce(T) + Send + 'static,
    {
        self.events.once(event, callback)
    }

    pub fn unregister(&self, handler: EventHandler) {
        self.events.unregister(handler)
    }

    pub(crate) fn emit<S: Into<String>, T: 'static + Send + Sync>(&self, event: S, payload: T) {
        self.events.emit(event, payload)
    }

    // ########################################
    // Custom sysex handlers

    /// Handles a sysex sub-command the engine does not know.
    ///
    /// # Errors
    /// * `SysexHandlerRegistered`: the command already has a handler.
    pub fn register_sysex_handler<F>(&self, command: u8, handler: F) -> Result<(), Error>
    where
        F: Fn(&Firmata, &[u8]) -> Result<(), Error> + Send + Sync + 'static,
    {
        let handler: SysexHandler = Arc::new(handler);
        self.dispatcher.register(command, handler)
    }

    pub fn clear_sysex_handler(&self, command: u8) {
        self.dispatcher.clear(command)
    }

    // ########################################
    // Transport lifecycle

    /// Opens the transport (blocking) and starts the handshake.
    pub fn open(&self) -> Result<(), Error> {
        self.transport.open()?;
        self.transport_opened()
    }

    /// Closes the transport.
    pub fn close(&self) -> Result<(), Error> {
        let result = self.transport.close();
        self.transport_closed();
        result
    }

    /// The transport is now opened: asks for the version and firmware, then emits `open` and
    /// `connect`. Both requests are sent again every `report_version_timeout` until a version is
    /// reported (only when running inside a Tokio runtime).
    pub fn transport_opened(&self) -> Result<(), Error> {
        self.data.write().connected = true;
        self.handshake.lock().start();
        self.request_version()?;
        self.emit("open", ());
        self.emit("connect", ());
        self.arm_version_timer();
        Ok(())
    }

    /// The transport has been closed: the handshake must start over.
    pub fn transport_closed(&self) {
        self.data.write().connected = false;
        self.handshake.lock().reset();
        self.abort_version_timer();
        self.parser.lock().reset();
        self.emit("close", ());
    }

    /// Forwards a transport failure to the `error` event.
    pub fn transport_error(&self, error: Error) {
        error!("Transport error: {}", error);
        self.emit("error", error);
    }

    /// Feeds a chunk of received bytes (of any size) to the engine.
    pub fn receive(&self, chunk: &[u8]) {
        for &byte in chunk {
            let message = self.parser.lock().push(byte);
            if let Some(message) = message {
                trace!("Received: [{}]", format_as_hex(&message));
                self.dispatcher.dispatch(self, &message);
            }
        }
    }

    pub(crate) fn write(&self, payload: &[u8]) -> Result<(), Error> {
        trace!("Write: [{}]", format_as_hex(payload));
        self.transport.write(payload)
    }

    pub(crate) fn request_version(&self) -> Result<(), Error> {
        self.write(&[REPORT_VERSION])?;
        self.write(&[START_SYSEX, QUERY_FIRMWARE, END_SYSEX])
    }

    fn arm_version_timer(&self) {
        let firmata = self.clone();
        let timeout = self.options.report_version_timeout;
        let timer = task::spawn(async move {
            loop {
                tokio::time::sleep(timeout).await;
                if firmata.is_versioned() || !firmata.is_connected() {
                    break;
                }
                debug!("No version reported after {:?}: asking again", timeout);
                firmata.request_version()?;
            }
            Ok::<(), Error>(())
        });
        match timer {
            Ok(handler) => {
                if let Some(previous) = self.version_timer.lock().replace(handler) {
                    previous.abort();
                }
            }
            Err(err) => warn!("Version request will not be repeated: {}", err),
        }
    }

    pub(crate) fn abort_version_timer(&self) {
        if let Some(handler) = self.version_timer.lock().take() {
            handler.abort();
        }
    }

    /// Performs what the handshake asks for after a transition.
    pub(crate) fn process_step(&self, step: HandshakeStep) -> Result<(), Error> {
        match step {
            HandshakeStep::None => Ok(()),
            HandshakeStep::QueryCapabilities => {
                self.write(&[START_SYSEX, CAPABILITY_QUERY, END_SYSEX])
            }
            HandshakeStep::QueryAnalogMapping => {
                self.write(&[START_SYSEX, ANALOG_MAPPING_QUERY, END_SYSEX])
            }
            HandshakeStep::QueryPinState(pin) => {
                let id = u8::try_from(pin)
                    .ok()
                    .filter(|&id| id <= SYSEX_REALTIME)
                    .ok_or(UnknownPin { pin })?;
                self.write(&[START_SYSEX, PIN_STATE_QUERY, id, END_SYSEX])
            }
            HandshakeStep::Ready => {
                self.emit("ready", ());
                Ok(())
            }
        }
    }

    // ########################################
    // Pins

    /// Sets the mode of a pin.
    ///
    /// `ANALOG` expects an analog channel (A0 => 0): the matching pin is only marked as reported
    /// and nothing is sent, analog reporting being driven by [`Firmata::report_analog_pin`].
    ///
    /// # Errors
    /// * `UnknownPin`: no such pin (or channel).
    /// * `IncompatibleMode`: the pin capabilities are known and do not include the mode.
    pub fn pin_mode(&self, pin: u16, mode: PinModeId) -> Result<(), Error> {
        {
            let mut lock = self.data.write();
            if mode == PinModeId::ANALOG {
                let id = lock.analog_pin(pin as u8).ok_or(UnknownPin { pin })?;
                let pin_instance = lock.get_pin_mut(id)?;
                pin_instance.mode = PinModeId::ANALOG;
                pin_instance.report = true;
                return Ok(());
            }

            let pin_instance = lock.get_pin_mut(pin)?;
            let known_modes = !pin_instance.supported_modes.is_empty();
            if known_modes && pin_instance.supports_mode(mode).is_none() {
                return Err(IncompatibleMode {
                    pin,
                    mode,
                    context: "pin_mode",
                }
                .into());
            }
            pin_instance.mode = mode;
        }
        self.write(&[SET_PIN_MODE, pin as u8, mode.into()])
    }

    /// Sets a digital pin level and sends its whole port.
    ///
    /// Only the pin bit of the port shadow register changes, so levels previously written to the
    /// other pins of the port are kept.
    pub fn digital_write(&self, pin: u16, level: bool) -> Result<(), Error> {
        let (port, value) = self.update_digital_pin(pin, level)?;
        self.write_port(port, value)
    }

    /// Same as [`Firmata::digital_write`] but the port is only sent by
    /// [`Firmata::flush_digital_ports`].
    pub fn digital_write_queued(&self, pin: u16, level: bool) -> Result<(), Error> {
        let (port, _) = self.update_digital_pin(pin, level)?;
        self.data.write().queued_ports |= 1 << port;
        Ok(())
    }

    /// Sends every port touched by [`Firmata::digital_write_queued`].
    pub fn flush_digital_ports(&self) -> Result<(), Error> {
        let (queued, ports) = {
            let mut lock = self.data.write();
            let queued = std::mem::take(&mut lock.queued_ports);
            (queued, lock.ports)
        };
        for (port, &value) in ports.iter().enumerate() {
            if queued & (1 << port) != 0 {
                self.write_port(port as u8, value)?;
            }
        }
        Ok(())
    }

    fn update_digital_pin(&self, pin: u16, level: bool) -> Result<(u8, u8), Error> {
        let mut lock = self.data.write();
        if (pin >> 3) as usize >= PORT_COUNT {
            return Err(UnknownPin { pin }.into());
        }
        lock.get_pin_mut(pin)?.value = u32::from(level);
        let port = lock.update_port_bit(pin, level);
        Ok((port, lock.ports[port as usize]))
    }

    fn write_port(&self, port: u8, value: u8) -> Result<(), Error> {
        self.write(&[
            DIGITAL_MESSAGE | port,
            value & SYSEX_REALTIME,
            (value >> 7) & SYSEX_REALTIME,
        ])
    }

    /// Writes an analog (PWM, servo...) value.
    ///
    /// Pins up to 15 use ANALOG_MESSAGE, the others EXTENDED_ANALOG with as many 7-bit groups as
    /// the value needs.
    pub fn analog_write(&self, pin: u16, value: u32) -> Result<(), Error> {
        self.data.write().get_pin_mut(pin)?.value = value;

        let payload = match pin {
            0..=15 => vec![
                ANALOG_MESSAGE | pin as u8,
                value as u8 & SYSEX_REALTIME,
                (value >> 7) as u8 & SYSEX_REALTIME,
            ],
            _ => {
                let mut payload = vec![
                    START_SYSEX,
                    EXTENDED_ANALOG,
                    pin as u8,
                    value as u8 & SYSEX_REALTIME,
                    (value >> 7) as u8 & SYSEX_REALTIME,
                ];
                if value > 0x0000_4000 {
                    payload.push((value >> 14) as u8 & SYSEX_REALTIME);
                }
                if value > 0x0020_0000 {
                    payload.push((value >> 21) as u8 & SYSEX_REALTIME);
                }
                if value > 0x1000_0000 {
                    payload.push((value >> 28) as u8 & SYSEX_REALTIME);
                }
                payload.push(END_SYSEX);
                payload
            }
        };
        self.write(&payload)
    }

    /// Alias of [`Firmata::analog_write`].
    pub fn pwm_write(&self, pin: u16, value: u32) -> Result<(), Error> {
        self.analog_write(pin, value)
    }

    /// Alias of [`Firmata::analog_write`]: the value is an angle or a pulse width.
    pub fn servo_write(&self, pin: u16, value: u32) -> Result<(), Error> {
        self.analog_write(pin, value)
    }

    /// Sets the pulse range of a servo and switches the pin to SERVO mode.
    pub fn servo_config(&self, pin: u16, min: u16, max: u16) -> Result<(), Error> {
        self.data.write().get_pin_mut(pin)?.mode = PinModeId::SERVO;
        self.write(&[
            START_SYSEX,
            SERVO_CONFIG,
            pin as u8,
            min as u8 & SYSEX_REALTIME,
            (min >> 7) as u8 & SYSEX_REALTIME,
            max as u8 & SYSEX_REALTIME,
            (max >> 7) as u8 & SYSEX_REALTIME,
            END_SYSEX,
        ])
    }

    /// Enables or disables the reporting of an analog channel.
    pub fn report_analog_pin(&self, channel: u8, state: bool) -> Result<(), Error> {
        if channel > 15 {
            return Err(UnknownPin {
                pin: channel as u16,
            }
            .into());
        }
        {
            let mut lock = self.data.write();
            if let Some(pin) = lock.analog_pin(channel) {
                lock.get_pin_mut(pin)?.report = state;
            }
        }
        self.write(&[REPORT_ANALOG | channel, u8::from(state)])
    }

    /// Enables or disables the reporting of the port a digital pin belongs to.
    pub fn report_digital_pin(&self, pin: u16, state: bool) -> Result<(), Error> {
        let port = pin >> 3;
        if port as usize >= PORT_COUNT {
            return Err(UnknownPin { pin }.into());
        }
        if let Ok(pin) = self.data.write().get_pin_mut(pin) {
            pin.report = state;
        }
        self.write(&[REPORT_DIGITAL | port as u8, u8::from(state)])
    }

    /// Enables the reporting of an analog channel and calls `callback` with each reported value.
    pub fn analog_read<F>(&self, channel: u8, callback: F) -> Result<EventHandler, Error>
    where
        F: FnMut(u16) + Send + 'static,
    {
        let handler = self.on(format!("analog-read-{}", channel), callback);
        self.report_analog_pin(channel, true)?;
        Ok(handler)
    }

    /// Enables the reporting of a digital pin and calls `callback` with each reported level.
    pub fn digital_read<F>(&self, pin: u16, callback: F) -> Result<EventHandler, Error>
    where
        F: FnMut(bool) + Send + 'static,
    {
        let handler = self.on(format!("digital-read-{}", pin), callback);
        self.report_digital_pin(pin, true)?;
        Ok(handler)
    }

    /// Sets the board sampling interval, clamped to 10..=65535 ms.
    pub fn set_sampling_interval(&self, interval: u32) -> Result<(), Error> {
        let interval = interval.clamp(MIN_SAMPLING_INTERVAL as u32, MAX_SAMPLING_INTERVAL as u32);
        self.data.write().sampling_interval = Some(interval as u16);
        self.write(&[
            START_SYSEX,
            SAMPLING_INTERVAL,
            interval as u8 & SYSEX_REALTIME,
            (interval >> 7) as u8 & SYSEX_REALTIME,
            END_SYSEX,
        ])
    }

    /// Sends a software reset request.
    pub fn reset(&self) -> Result<(), Error> {
        self.write(&[SYSTEM_RESET])
    }

    /// Sends a text to the board (NUL terminated STRING_DATA).
    pub fn send_string(&self, text: &str) -> Result<(), Error> {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        let mut payload = vec![START_SYSEX, STRING_DATA];
        payload.extend(encode_pairs(&bytes));
        payload.push(END_SYSEX);
        self.write(&payload)
    }

    /// Sends a custom sysex message: the payload goes between START_SYSEX and END_SYSEX as is.
    ///
    /// # Errors
    /// * `EmptySysexCommand`: the payload is empty.
    pub fn sysex_command(&self, payload: &[u8]) -> Result<(), Error> {
        if payload.is_empty() {
            return Err(EmptySysexCommand.into());
        }
        let mut message = Vec::with_capacity(payload.len() + 2);
        message.push(START_SYSEX);
        message.extend_from_slice(payload);
        message.push(END_SYSEX);
        self.write(&message)
    }

    // ########################################
    // Queries

    /// Asks for the protocol version.
    pub fn report_version<F>(&self, callback: F) -> Result<(), Error>
    where
        F: FnOnce(Version) + Send + 'static,
    {
        self.once("reportversion", callback);
        self.write(&[REPORT_VERSION])
    }

    /// Asks for the firmware name and version.
    pub fn query_firmware<F>(&self, callback: F) -> Result<(), Error>
    where
        F: FnOnce(Firmware) + Send + 'static,
    {
        self.once("queryfirmware", callback);
        self.write(&[START_SYSEX, QUERY_FIRMWARE, END_SYSEX])
    }

    /// Asks for the modes and resolutions of every pin: the pin table is rebuilt on reply.
    pub fn query_capabilities<F>(&self, callback: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        self.once("capability-query", move |_: ()| callback());
        self.write(&[START_SYSEX, CAPABILITY_QUERY, END_SYSEX])
    }

    /// Asks which pins are analog, and on which channel.
    pub fn query_analog_mapping<F>(&self, callback: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        self.once("analog-mapping-query", move |_: ()| callback());
        self.write(&[START_SYSEX, ANALOG_MAPPING_QUERY, END_SYSEX])
    }

    /// Asks for the current mode and value of a pin.
    ///
    /// # Errors
    /// * `UnknownPin`: the pin does not fit the 7-bit query byte.
    pub fn query_pin_state<F>(&self, pin: u16, callback: F) -> Result<(), Error>
    where
        F: FnOnce(Pin) + Send + 'static,
    {
        let id = u8::try_from(pin)
            .ok()
            .filter(|&id| id <= SYSEX_REALTIME)
            .ok_or(UnknownPin { pin })?;
        self.once(format!("pin-state-{}", pin), callback);
        self.write(&[START_SYSEX, PIN_STATE_QUERY, id, END_SYSEX])
    }

    // ########################################
    // Ping (PingFirmata)

    /// Sends a pulse and measures the echo duration (µs) of an ultrasonic sensor.
    ///
    /// # Errors
    /// * `IncompatibleMode`: the pin does not support PING_READ.
    pub fn ping_read<F>(
        &self,
        pin: u16,
        value: u8,
        pulse_out: u32,
        timeout: u32,
        callback: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(u32) + Send + 'static,
    {
        let supported = self.data.read().get_pin(pin)?.supports_mode(PinModeId::PING_READ);
        if supported.is_none() {
            return Err(IncompatibleMode {
                pin,
                mode: PinModeId::PING_READ,
                context: "ping_read",
            }
            .into());
        }
        self.pin_mode(pin, PinModeId::PING_READ)?;

        let mut payload = vec![START_SYSEX, PING_READ, pin as u8, value];
        payload.extend(encode_pairs(&pulse_out.to_be_bytes()));
        payload.extend(encode_pairs(&timeout.to_be_bytes()));
        payload.push(END_SYSEX);

        self.once(format!("ping-read-{}", pin), callback);
        self.write(&payload)
    }
}

impl<T: IoTransport + 'static> From<T> for Firmata {
    fn from(transport: T) -> Self {
        Self::new(transport, BoardOptions::default())
    }
}

impl Debug for Firmata {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Firmata")
            .field("transport", &self.transport)
            .field("options", &self.options)
            .field("data", &self.data)
            .field("handshake", &self.handshake_state())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl Display for Firmata {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let data = self.data.read();
        write!(
            f,
            "Firmata [firmware={}, version={}, transport={}]",
            data.firmware
                .as_ref()
                .map_or(String::from("unknown"), |firmware| firmware.to_string()),
            data.protocol_version
                .map_or(String::from("unknown"), |version| version.to_string()),
            self.transport
        )
    }
}
