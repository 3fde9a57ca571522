//! Handlers of the core replies: version, firmware, capabilities, analog mapping, pin state,
//! analog and digital reports, strings and ping reads.

use log::debug;

use crate::errors::Error;
use crate::errors::HardwareError::UnknownPin;
use crate::errors::ProtocolError::MessageTooShort;
use crate::io::constants::*;
use crate::io::encoding::decode_pairs;
use crate::io::{Firmata, Firmware, HandshakeStep, Pin, PinMode, PinModeId, Resolution, Version};

/// Fails with `MessageTooShort` when `buf` holds less than `expected` bytes.
pub(crate) fn ensure_length(
    operation: &'static str,
    buf: &[u8],
    expected: usize,
) -> Result<(), Error> {
    match buf.len() < expected {
        true => Err(MessageTooShort {
            operation,
            expected,
            received: buf.len(),
        }
        .into()),
        false => Ok(()),
    }
}

/// Rebuilds a text sent as `[lsb, msb]` pairs, without its NUL bytes.
pub(crate) fn decode_text(data: &[u8]) -> String {
    let bytes: Vec<u8> = decode_pairs(data)
        .into_iter()
        .map(|char| char as u8)
        .filter(|&byte| byte != 0)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

impl Firmata {
    /// Handle a REPORT_VERSION message (0xF9 - return the protocol version).
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#message-types>
    pub(crate) fn handle_version(&self, buf: &[u8]) -> Result<(), Error> {
        ensure_length("handle_version", buf, 3)?;
        let version = Version {
            major: buf[1],
            minor: buf[2],
        };
        self.data.write().protocol_version = Some(version);
        self.abort_version_timer();
        self.emit("reportversion", version);

        let step = self.handshake.lock().version_received();
        self.process_step(step)
    }

    /// Handle an ANALOG_MESSAGE message (0xE0 - report state of an analog channel)
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#data-message-expansion>
    pub(crate) fn handle_analog_message(&self, buf: &[u8]) -> Result<(), Error> {
        ensure_length("handle_analog_message", buf, 3)?;
        let channel = buf[0] & 0x0F;
        let value = (buf[1] as u16) | ((buf[2] as u16) << 7);
        {
            let mut lock = self.data.write();
            if let Some(pin) = lock.analog_pin(channel) {
                lock.get_pin_mut(pin)?.value = value as u32;
            }
        }
        self.emit(format!("analog-read-{}", channel), value);
        Ok(())
    }

    /// Handle a DIGITAL_MESSAGE message (0x90 - report state of a digital port)
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#data-message-expansion>
    ///
    /// Only the pins in INPUT or PULLUP mode take the reported level.
    pub(crate) fn handle_digital_message(&self, buf: &[u8]) -> Result<(), Error> {
        ensure_length("handle_digital_message", buf, 3)?;
        let port = (buf[0] & 0x0F) as u16;
        let value = (buf[1] as u16) | ((buf[2] as u16) << 7);

        let mut reports = vec![];
        {
            let mut lock = self.data.write();
            for i in 0..8 {
                let id = 8 * port + i;
                let level = (value >> i) & 0x01 == 1;
                match lock.pins.get_mut(id as usize) {
                    Some(pin) if matches!(pin.mode, PinModeId::INPUT | PinModeId::PULLUP) => {
                        pin.value = u32::from(level);
                    }
                    _ => continue,
                }
                lock.update_port_bit(id, level);
                reports.push((id, level));
            }
        }

        for (pin, level) in reports {
            self.emit(format!("digital-read-{}", pin), level);
        }
        Ok(())
    }

    /// Handle a QUERY_FIRMWARE reply: `[0xF0, 0x79, major, minor, name as pairs..., 0xF7]`.
    pub(crate) fn handle_firmware(&self, buf: &[u8]) -> Result<(), Error> {
        ensure_length("handle_firmware", buf, 5)?;
        let firmware = Firmware {
            name: decode_text(&buf[4..buf.len() - 1]),
            version: Version {
                major: buf[2],
                minor: buf[3],
            },
        };
        self.data.write().firmware = Some(firmware.clone());
        self.emit("queryfirmware", firmware);

        let step = self.handshake.lock().firmware_received();
        if step != HandshakeStep::None {
            if let Some(interval) = self.options.sampling_interval {
                self.set_sampling_interval(interval as u32)?;
            }
        }
        self.process_step(step)
    }

    /// Handle a CAPABILITY_RESPONSE: for each pin, `(mode, resolution)` pairs closed by 0x7F.
    ///
    /// The pin table is rebuilt in place: a repeated response leaves the same table.
    pub(crate) fn handle_capability(&self, buf: &[u8]) -> Result<(), Error> {
        ensure_length("handle_capability", buf, 3)?;
        let payload = &buf[2..buf.len() - 1];

        let mut table: Vec<Vec<PinMode>> = vec![];
        let mut modes: Vec<PinMode> = vec![];
        let mut i = 0;
        while i < payload.len() {
            if payload[i] == SYSEX_REALTIME {
                table.push(std::mem::take(&mut modes));
                i += 1;
                continue;
            }
            if i + 1 >= payload.len() {
                debug!("Truncated capability entry dropped: {:02X?}", &payload[i..]);
                break;
            }
            match PinModeId::from_u8(payload[i]) {
                Ok(id) if !modes.iter().any(|mode| mode.id == id) => modes.push(PinMode {
                    id,
                    resolution: payload[i + 1],
                }),
                Ok(_) => {}
                Err(_) => debug!("Unknown pin mode {:#04X} ignored", payload[i]),
            }
            i += 2;
        }

        {
            let mut lock = self.data.write();
            lock.pins.truncate(table.len());
            while lock.pins.len() < table.len() {
                let id = lock.pins.len() as u16;
                lock.pins.push(Pin::new(id));
            }

            let mut resolution = Resolution::default();
            for (pin, modes) in lock.pins.iter_mut().zip(table) {
                for mode in &modes {
                    match mode.id {
                        PinModeId::ANALOG if resolution.adc.is_none() => {
                            resolution.adc = Some(mode.get_max_possible_value())
                        }
                        PinModeId::PWM if resolution.pwm.is_none() => {
                            resolution.pwm = Some(mode.get_max_possible_value())
                        }
                        _ => {}
                    }
                }
                pin.supported_modes = modes;
            }
            lock.resolution = resolution;
        }
        self.emit("capability-query", ());

        let step = self.handshake.lock().capabilities_received();
        self.process_step(step)
    }

    /// Handle an ANALOG_MAPPING_RESPONSE: one byte per pin, its analog channel or 0x7F.
    pub(crate) fn handle_analog_mapping(&self, buf: &[u8]) -> Result<(), Error> {
        ensure_length("handle_analog_mapping", buf, 3)?;
        let mapping = &buf[2..buf.len() - 1];

        let pin_count = {
            let mut lock = self.data.write();
            let mut analog: Vec<(u8, u16)> = vec![];
            for pin in lock.pins.iter_mut() {
                let channel = mapping
                    .get(pin.id as usize)
                    .copied()
                    .unwrap_or(NO_ANALOG_CHANNEL);
                pin.set_channel(channel);
                if let Some(channel) = pin.channel {
                    analog.push((channel, pin.id));
                }
            }
            analog.sort_unstable();
            lock.analog_pins = analog.into_iter().map(|(_, pin)| pin).collect();
            lock.pins.len() as u16
        };
        self.emit("analog-mapping-query", ());

        let step = self.handshake.lock().analog_mapping_received(pin_count);
        self.process_step(step)
    }

    /// Handle a PIN_STATE_RESPONSE: `[0xF0, 0x6E, pin, mode, value (LSB first)..., 0xF7]`.
    pub(crate) fn handle_pin_state(&self, buf: &[u8]) -> Result<(), Error> {
        ensure_length("handle_pin_state", buf, 6)?;
        let id = buf[2] as u16;
        let mode = PinModeId::from_u8(buf[3]).unwrap_or_default();
        let value = buf[4..buf.len() - 1]
            .iter()
            .take(5)
            .enumerate()
            .fold(0u32, |value, (i, &byte)| {
                value | ((byte & SYSEX_REALTIME) as u32) << (7 * i)
            });

        let (pin, pin_count) = {
            let mut lock = self.data.write();
            let pin_count = lock.pins.len() as u16;
            let pin = lock
                .pins
                .get_mut(id as usize)
                .ok_or(UnknownPin { pin: id })?;
            pin.mode = mode;
            pin.value = value;
            (pin.clone(), pin_count)
        };
        self.emit(format!("pin-state-{}", id), pin);

        let step = self.handshake.lock().pin_state_received(id, pin_count);
        self.process_step(step)
    }

    /// Handle a STRING_DATA message sent by the board.
    pub(crate) fn handle_string(&self, buf: &[u8]) -> Result<(), Error> {
        ensure_length("handle_string", buf, 3)?;
        self.emit("string", decode_text(&buf[2..buf.len() - 1]));
        Ok(())
    }

    /// Handle a PING_READ reply: pin then a 32-bit duration, both as `[lsb, msb]` pairs.
    pub(crate) fn handle_ping_read(&self, buf: &[u8]) -> Result<(), Error> {
        ensure_length("handle_ping_read", buf, 13)?;
        let pin = decode_pairs(&buf[2..4])[0];
        let duration = decode_pairs(&buf[4..12])
            .into_iter()
            .fold(0u32, |duration, byte| (duration << 8) | (byte as u32 & 0xFF));
        self.emit(format!("ping-read-{}", pin), duration);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::io::firmata::handlers::{decode_text, ensure_length};
    use crate::io::{Firmware, Pin, PinModeId};
    use crate::mocks::create_test_firmata;

    const CAPABILITIES: [u8; 16] = [
        0xF0, 0x6C, // header
        0x00, 0x01, 0x01, 0x01, 0x7F, // pin 0: INPUT, OUTPUT
        0x03, 0x08, 0x04, 0x0E, 0x03, 0x08, 0x7F, // pin 1: PWM, SERVO (duplicated PWM)
        0x7F, // pin 2: nothing
        0xF7,
    ];

    #[test]
    fn test_ensure_length() {
        assert!(ensure_length("test", &[0; 3], 3).is_ok());
        assert_eq!(
            ensure_length("test", &[0; 2], 3).err().unwrap().to_string(),
            "Protocol error: Not enough bytes received - 'test' expected 3 bytes, 2 received."
        );
        assert_eq!(decode_text(&[0x41, 0x00, 0x00, 0x00, 0x62, 0x00]), "Ab");
    }

    #[test]
    fn test_firmware_split_byte_by_byte() {
        let (firmata, _) = create_test_firmata();
        let received = Arc::new(Mutex::new(vec![]));
        let clone = received.clone();
        firmata.on("queryfirmware", move |firmware: Firmware| {
            clone.lock().push(firmware)
        });

        let reply = [
            0xF0, 0x79, 0x02, 0x05, 0x53, 0x00, 0x74, 0x00, 0x64, 0x00, 0xF7,
        ];
        for byte in reply {
            firmata.receive(&[byte]);
        }
        firmata.receive(&reply);

        let received = received.lock();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0], received[1]);
        assert_eq!(received[0].to_string(), "Std (2.5)");
        assert_eq!(
            firmata.get_io().read().firmware.as_ref().unwrap().name,
            "Std"
        );
    }

    #[test]
    fn test_capability_response_is_idempotent() {
        let (firmata, _) = create_test_firmata();
        firmata.receive(&CAPABILITIES);
        let first: Vec<Pin> = firmata.get_io().read().pins.clone();
        firmata.receive(&CAPABILITIES);
        let second: Vec<Pin> = firmata.get_io().read().pins.clone();

        assert_eq!(first, second);
        assert_eq!(second.len(), 3);
        assert_eq!(second[0].supported_modes.len(), 2);
        assert_eq!(second[1].supported_modes.len(), 2, "No duplicated mode");
        assert_eq!(second[1].servo_resolution(), Some(14));
        assert!(second[2].supported_modes.is_empty());

        let resolution = firmata.get_io().read().resolution;
        assert_eq!(resolution.pwm, Some(255));
        assert_eq!(resolution.adc, None);
    }

    #[test]
    fn test_capability_keeps_current_mode() {
        let (firmata, _) = create_test_firmata();
        firmata.get_io().write().pins[1].mode = PinModeId::PWM;
        firmata.receive(&CAPABILITIES);
        assert_eq!(firmata.get_io().read().pins[1].mode, PinModeId::PWM);
    }

    #[test]
    fn test_malformed_capability_entry() {
        let (firmata, _) = create_test_firmata();
        // Unknown mode 0x42 is skipped, the dangling byte is dropped.
        firmata.receive(&[0xF0, 0x6C, 0x42, 0x01, 0x01, 0x01, 0x7F, 0x02, 0xF7]);
        let data = firmata.get_io().read();
        assert_eq!(data.pins.len(), 1);
        assert_eq!(data.pins[0].supported_modes.len(), 1);
    }

    #[test]
    fn test_analog_mapping() {
        let (firmata, _) = create_test_firmata();
        let mut mapping = vec![0xF0, 0x6A];
        mapping.extend([0x7F; 14]);
        mapping.extend([0x01, 0x00, 0x7F, 0x7F, 0x7F, 0x7F]);
        mapping.push(0xF7);
        firmata.receive(&mapping);

        let data = firmata.get_io().read();
        assert_eq!(data.analog_pins, vec![15, 14]);
        assert_eq!(data.pins[14].name, "A1");
        assert_eq!(data.pins[15].name, "A0");
        assert_eq!(data.pins[16].channel, None);
        assert_eq!(data.pins[16].name, "D16");
    }

    #[test]
    fn test_pin_state() {
        let (firmata, _) = create_test_firmata();
        let received = Arc::new(Mutex::new(None));
        let clone = received.clone();
        firmata.on("pin-state-9", move |pin: Pin| *clone.lock() = Some(pin));

        firmata.receive(&[0xF0, 0x6E, 0x09, 0x04, 0x5A, 0xF7]);
        let pin = received.lock().clone().unwrap();
        assert_eq!(pin.mode, PinModeId::SERVO);
        assert_eq!(pin.value, 90);

        // Too short or unknown pins are dropped.
        firmata.receive(&[0xF0, 0x6E, 0x09, 0x01, 0xF7]);
        firmata.receive(&[0xF0, 0x6E, 0x50, 0x01, 0x01, 0xF7]);
        assert_eq!(firmata.get_io().read().pins[9].mode, PinModeId::SERVO);
    }

    #[test]
    fn test_digital_message_updates_inputs_only() {
        let (firmata, _) = create_test_firmata();
        {
            let mut lock = firmata.get_io().write();
            lock.pins[8].mode = PinModeId::INPUT;
            lock.pins[9].mode = PinModeId::PULLUP;
            lock.pins[10].mode = PinModeId::OUTPUT;
        }
        let count = Arc::new(AtomicUsize::new(0));
        for pin in 8..=10 {
            let clone = count.clone();
            firmata.on(format!("digital-read-{}", pin), move |_: bool| {
                clone.fetch_add(1, Ordering::SeqCst);
            });
        }

        firmata.receive(&[0x91, 0b111, 0x00]);
        let data = firmata.get_io().read();
        assert_eq!(data.pins[8].value, 1);
        assert_eq!(data.pins[9].value, 1);
        assert_eq!(data.pins[10].value, 0);
        assert_eq!(data.ports[1], 0b011);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_messages_before_version_are_ignored() {
        let (firmata, _) = create_test_firmata();
        firmata.close().unwrap();
        firmata.receive(&[0xE0, 0x10, 0x00]);
        assert_eq!(firmata.get_io().read().pins[14].value, 0);
        firmata.receive(&[0xF9, 0x02, 0x05, 0xE0, 0x10, 0x00]);
        assert_eq!(firmata.get_io().read().pins[14].value, 16);
    }
}
