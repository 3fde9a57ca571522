use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::RwLock;

use crate::errors::ConfigurationError::SysexHandlerRegistered;
use crate::errors::Error;
use crate::io::constants::*;
use crate::io::Firmata;

/// A handler for a sysex sub-command: receives the engine and the complete frame
/// (START_SYSEX and END_SYSEX included).
pub type SysexHandler = Arc<dyn Fn(&Firmata, &[u8]) -> Result<(), Error> + Send + Sync>;

type MidiHandler = fn(&Firmata, &[u8]) -> Result<(), Error>;

/// Routes complete messages to their handler.
///
/// MIDI-style messages use a fixed table (by status byte). Sysex messages use a per-engine
/// registry keyed by sub-command byte, pre-filled with the built-in handlers and open to custom
/// ones through [`Dispatcher::register`]. Clones share the same registry.
#[derive(Clone)]
pub struct Dispatcher {
    sysex: Arc<RwLock<HashMap<u8, SysexHandler>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl Debug for Dispatcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut commands: Vec<u8> = self.sysex.read().keys().copied().collect();
        commands.sort_unstable();
        f.debug_struct("Dispatcher")
            .field("sysex", &format!("{:02X?}", commands))
            .finish()
    }
}

impl Dispatcher {
    /// A dispatcher without any sysex handler.
    pub fn empty() -> Self {
        Self {
            sysex: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// A dispatcher knowing every reply the engine understands.
    pub fn with_builtin() -> Self {
        let builtin: [(u8, SysexHandler); 13] = [
            (QUERY_FIRMWARE, Arc::new(|f: &Firmata, b: &[u8]| f.handle_firmware(b))),
            (CAPABILITY_RESPONSE, Arc::new(|f: &Firmata, b: &[u8]| f.handle_capability(b))),
            (ANALOG_MAPPING_RESPONSE, Arc::new(|f: &Firmata, b: &[u8]| f.handle_analog_mapping(b))),
            (PIN_STATE_RESPONSE, Arc::new(|f: &Firmata, b: &[u8]| f.handle_pin_state(b))),
            (STRING_DATA, Arc::new(|f: &Firmata, b: &[u8]| f.handle_string(b))),
            (PING_READ, Arc::new(|f: &Firmata, b: &[u8]| f.handle_ping_read(b))),
            (I2C_REPLY, Arc::new(|f: &Firmata, b: &[u8]| f.handle_i2c_reply(b))),
            (ONEWIRE_DATA, Arc::new(|f: &Firmata, b: &[u8]| f.handle_onewire_reply(b))),
            (SERIAL_MESSAGE, Arc::new(|f: &Firmata, b: &[u8]| f.handle_serial_reply(b))),
            (STEPPER, Arc::new(|f: &Firmata, b: &[u8]| f.handle_stepper_reply(b))),
            (ACCELSTEPPER, Arc::new(|f: &Firmata, b: &[u8]| f.handle_accel_stepper_reply(b))),
            // Queries echoed back by some firmwares carry nothing to learn.
            (CAPABILITY_QUERY, Arc::new(Self::ignore)),
            (ANALOG_MAPPING_QUERY, Arc::new(Self::ignore)),
        ];
        Self {
            sysex: Arc::new(RwLock::new(builtin.into_iter().collect())),
        }
    }

    /// Installs a handler for a sysex sub-command.
    ///
    /// # Errors
    /// * `SysexHandlerRegistered`: a handler (built-in or custom) already owns this command.
    pub fn register(&self, command: u8, handler: SysexHandler) -> Result<(), Error> {
        let mut sysex = self.sysex.write();
        if sysex.contains_key(&command) {
            return Err(SysexHandlerRegistered { command }.into());
        }
        sysex.insert(command, handler);
        Ok(())
    }

    /// Removes the handler of a sysex sub-command (no-op if none).
    pub fn clear(&self, command: u8) {
        self.sysex.write().remove(&command);
    }

    pub fn has_handler(&self, command: u8) -> bool {
        self.sysex.read().contains_key(&command)
    }

    /// Runs the handler matching a complete message.
    ///
    /// Unknown commands are ignored and handler errors are logged: inbound data never fails the
    /// caller.
    pub fn dispatch(&self, firmata: &Firmata, message: &[u8]) {
        let result = match message.first() {
            Some(&START_SYSEX) => self.dispatch_sysex(firmata, message),
            Some(&status) => match Self::midi_handler(status) {
                Some(handler) => handler(firmata, message),
                None => Ok(()),
            },
            None => Ok(()),
        };
        if let Err(err) = result {
            warn!("Message {:02X?} dropped: {}", message, err);
        }
    }

    fn ignore(_: &Firmata, _: &[u8]) -> Result<(), Error> {
        Ok(())
    }

    fn midi_handler(status: u8) -> Option<MidiHandler> {
        match status {
            REPORT_VERSION => Some(Firmata::handle_version),
            ANALOG_MESSAGE..=ANALOG_MESSAGE_BOUND => Some(Firmata::handle_analog_message),
            DIGITAL_MESSAGE..=DIGITAL_MESSAGE_BOUND => Some(Firmata::handle_digital_message),
            _ => None,
        }
    }

    fn dispatch_sysex(&self, firmata: &Firmata, message: &[u8]) -> Result<(), Error> {
        let command = match message.get(1) {
            Some(&command) if command != END_SYSEX => command,
            _ => return Ok(()),
        };
        // The handler is cloned out so it may itself (un)register handlers.
        let handler = self.sysex.read().get(&command).cloned();
        match handler {
            Some(handler) => handler(firmata, message),
            None => {
                debug!("No handler for sysex command {:#04X}", command);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::errors::Error;
    use crate::io::constants::{I2C_REPLY, STRING_DATA};
    use crate::io::{Dispatcher, Firmata, SysexHandler};
    use crate::mocks::create_test_firmata;

    #[test]
    fn test_builtin_handlers() {
        let dispatcher = Dispatcher::with_builtin();
        assert!(dispatcher.has_handler(STRING_DATA));
        assert!(dispatcher.has_handler(I2C_REPLY));
        assert!(!dispatcher.has_handler(0x01));
        assert!(!Dispatcher::empty().has_handler(STRING_DATA));
    }

    #[test]
    fn test_register_custom_handler() {
        let (firmata, _) = create_test_firmata();
        let counter = Arc::new(AtomicUsize::new(0));
        let clone = counter.clone();
        let dispatcher = Dispatcher::empty();
        dispatcher
            .register(
                0x01,
                Arc::new(move |_: &Firmata, buf: &[u8]| -> Result<(), Error> {
                    assert_eq!(buf, &[0xF0, 0x01, 0x05, 0xF7]);
                    clone.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();

        dispatcher.dispatch(&firmata, &[0xF0, 0x01, 0x05, 0xF7]);
        dispatcher.dispatch(&firmata, &[0xF0, 0x02, 0x05, 0xF7]);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        dispatcher.clear(0x01);
        dispatcher.dispatch(&firmata, &[0xF0, 0x01, 0x05, 0xF7]);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_register_taken_command() {
        let dispatcher = Dispatcher::with_builtin();
        let noop = || -> SysexHandler { Arc::new(|_: &Firmata, _: &[u8]| Ok::<(), Error>(())) };
        let result = dispatcher.register(STRING_DATA, noop());
        assert_eq!(
            result.err().unwrap().to_string(),
            "Configuration error: A sysex handler is already registered for command 0x71."
        );

        dispatcher.clear(STRING_DATA);
        assert!(dispatcher.register(STRING_DATA, noop()).is_ok());
    }

    #[test]
    fn test_unknown_and_malformed_messages_are_ignored() {
        let (firmata, transport) = create_test_firmata();
        let dispatcher = Dispatcher::with_builtin();
        dispatcher.dispatch(&firmata, &[]);
        dispatcher.dispatch(&firmata, &[0xF0, 0xF7]);
        dispatcher.dispatch(&firmata, &[0xF0, 0x42, 0xF7]);
        dispatcher.dispatch(&firmata, &[0xC0, 0x01, 0x00]);
        // A too short pin state reply fails in its handler: the error is only logged.
        dispatcher.dispatch(&firmata, &[0xF0, 0x6E, 0xF7]);
        assert!(transport.written().is_empty());
    }
}
