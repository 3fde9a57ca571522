use std::collections::HashMap;

use crate::errors::ConfigurationError::I2cNotConfigured;
use crate::errors::Error;
use crate::io::constants::*;
use crate::io::encoding::{decode_pairs, encode_pairs};
use crate::io::firmata::handlers::ensure_length;
use crate::io::{Firmata, I2CReply, I2cDeviceSettings, I2cSettings};
use crate::utils::events::EventHandler;

/// Parameters of [`Firmata::i2c_config`].
///
/// A bare `u16` converts into a configuration only setting the delay.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct I2cConfig {
    /// Device the settings below apply to (none: only the delay is updated).
    pub address: Option<u16>,
    /// Board wide delay (µs) between writing a register and reading it.
    pub delay: u16,
    /// Stop bit after each read of this device (defaults to true).
    pub stop_tx: Option<bool>,
    /// Extra settings kept along the device record.
    pub settings: HashMap<String, String>,
}

impl From<u16> for I2cConfig {
    fn from(delay: u16) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }
}

/// Replies are emitted per address, and per address and register.
fn reply_event(address: u16, register: Option<u16>) -> String {
    match register {
        Some(register) => format!("I2C-reply-{}-{}", address, register),
        None => format!("I2C-reply-{}", address),
    }
}

fn encode_u14(value: u16) -> [u8; 2] {
    [value as u8 & SYSEX_REALTIME, (value >> 7) as u8 & SYSEX_REALTIME]
}

impl Firmata {
    /// Enables I2C and updates its settings: required before any other I2C operation.
    ///
    /// When the configuration names a device, its settings record is replaced.
    ///
    /// # Example
    /// ```
    /// use firmata_host::io::{Firmata, I2cConfig, Serial};
    ///
    /// let firmata = Firmata::from(Serial::new("/dev/ttyACM0"));
    /// let config = I2cConfig {
    ///     address: Some(0x53),
    ///     stop_tx: Some(false),
    ///     ..Default::default()
    /// };
    /// // The settings are kept even though the port is not opened (the write fails).
    /// assert!(firmata.i2c_config(config).is_err());
    /// assert!(firmata.get_io().read().i2c.is_some());
    /// ```
    pub fn i2c_config<C: Into<I2cConfig>>(&self, config: C) -> Result<(), Error> {
        let config = config.into();
        {
            let mut lock = self.data.write();
            let settings = lock.i2c.get_or_insert_with(I2cSettings::default);
            settings.delay = config.delay;
            if let Some(address) = config.address {
                settings.devices.insert(
                    address,
                    I2cDeviceSettings {
                        stop_tx: config.stop_tx.unwrap_or(true),
                        extra: config.settings,
                    },
                );
            }
        }

        let delay = encode_u14(config.delay);
        self.write(&[START_SYSEX, I2C_CONFIG, delay[0], delay[1], END_SYSEX])
    }

    /// Writes bytes to a device, optionally starting at a register.
    pub fn i2c_write(&self, address: u16, register: Option<u16>, data: &[u8]) -> Result<(), Error> {
        let mut payload = self.i2c_request_header(address, I2C_MODE_WRITE)?;
        if let Some(register) = register {
            payload.extend(encode_u14(register));
        }
        payload.extend(encode_pairs(data));
        payload.push(END_SYSEX);
        self.write(&payload)
    }

    /// Writes a single byte to a device register.
    pub fn i2c_write_reg(&self, address: u16, register: u16, byte: u8) -> Result<(), Error> {
        self.i2c_write(address, Some(register), &[byte])
    }

    /// Starts reading `size` bytes continuously: `callback` receives every matching reply until
    /// [`Firmata::i2c_stop`].
    pub fn i2c_read<F>(
        &self,
        address: u16,
        register: Option<u16>,
        size: u16,
        callback: F,
    ) -> Result<EventHandler, Error>
    where
        F: FnMut(I2CReply) + Send + 'static,
    {
        let payload = self.i2c_read_request(address, register, size, I2C_MODE_CONTINUOUS_READ)?;
        let handler = self.on(reply_event(address, register), callback);
        self.i2c_subscriptions
            .lock()
            .entry(address)
            .or_default()
            .push(handler);
        if let Err(err) = self.write(&payload) {
            let mut subscriptions = self.i2c_subscriptions.lock();
            if let Some(handlers) = subscriptions.get_mut(&address) {
                handlers.retain(|&registered| registered != handler);
                if handlers.is_empty() {
                    subscriptions.remove(&address);
                }
            }
            self.unregister(handler);
            return Err(err);
        }
        Ok(handler)
    }

    /// Reads `size` bytes once.
    pub fn i2c_read_once<F>(
        &self,
        address: u16,
        register: Option<u16>,
        size: u16,
        callback: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(I2CReply) + Send + 'static,
    {
        let payload = self.i2c_read_request(address, register, size, I2C_MODE_READ)?;
        let handler = self.once(reply_event(address, register), callback);
        self.write(&payload).inspect_err(|_| self.unregister(handler))
    }

    /// Stops the continuous reads of a device and drops their callbacks.
    pub fn i2c_stop(&self, address: u16) -> Result<(), Error> {
        let mut payload = self.i2c_request_header(address, I2C_MODE_STOP_READING)?;
        payload.push(END_SYSEX);

        let handlers = self
            .i2c_subscriptions
            .lock()
            .remove(&address)
            .unwrap_or_default();
        for handler in handlers {
            self.unregister(handler);
        }
        self.write(&payload)
    }

    fn i2c_read_request(
        &self,
        address: u16,
        register: Option<u16>,
        size: u16,
        mode: u8,
    ) -> Result<Vec<u8>, Error> {
        let mut payload = self.i2c_request_header(address, mode)?;
        if let Some(register) = register {
            payload.extend(encode_u14(register));
        }
        payload.extend(encode_u14(size));
        payload.push(END_SYSEX);
        Ok(payload)
    }

    /// `[START_SYSEX, I2C_REQUEST, address, mode]`, creating the device settings if needed.
    ///
    /// The mode byte carries the read/write mode (bits 3-4), the auto-restart flag for devices
    /// configured without stop bit and, for 10-bit addresses, the 3 high address bits.
    fn i2c_request_header(&self, address: u16, mode: u8) -> Result<Vec<u8>, Error> {
        let stop_tx = {
            let mut lock = self.data.write();
            let settings = lock.i2c.as_mut().ok_or(I2cNotConfigured)?;
            settings.device_mut(address).stop_tx
        };

        let mut mode_byte = mode << 3;
        if matches!(mode, I2C_MODE_READ | I2C_MODE_CONTINUOUS_READ) && !stop_tx {
            mode_byte |= I2C_AUTO_RESTART_MASK;
        }
        if address > 0x7F {
            mode_byte |= I2C_10BIT_ADDRESS_MODE_MASK | ((address >> 7) as u8 & 0x07);
        }
        Ok(vec![
            START_SYSEX,
            I2C_REQUEST,
            address as u8 & SYSEX_REALTIME,
            mode_byte,
        ])
    }

    /// Handle an I2C_REPLY: `[0xF0, 0x77, address (2), register (2), data as pairs..., 0xF7]`.
    pub(crate) fn handle_i2c_reply(&self, buf: &[u8]) -> Result<(), Error> {
        ensure_length("handle_i2c_reply", buf, 7)?;
        let reply = I2CReply {
            address: decode_pairs(&buf[2..4])[0],
            register: decode_pairs(&buf[4..6])[0],
            data: decode_pairs(&buf[6..buf.len() - 1]),
        };
        self.emit(reply_event(reply.address, Some(reply.register)), reply.clone());
        self.emit(reply_event(reply.address, None), reply);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::io::{I2CReply, I2cConfig};
    use crate::mocks::create_test_firmata;

    fn reply(address: u8, register: u8, data: &[u8]) -> Vec<u8> {
        let mut reply = vec![0xF0, 0x77, address, 0x00, register, 0x00];
        for &byte in data {
            reply.extend([byte & 0x7F, byte >> 7]);
        }
        reply.push(0xF7);
        reply
    }

    #[test]
    fn test_i2c_requires_config() {
        let (firmata, transport) = create_test_firmata();
        let result = firmata.i2c_write(0x53, None, &[0x01]);
        assert_eq!(
            result.err().unwrap().to_string(),
            "Configuration error: I2C is not enabled for this board: call i2c_config() first."
        );
        assert!(firmata.i2c_read(0x53, None, 6, |_| {}).is_err());
        assert!(firmata.i2c_stop(0x53).is_err());
        assert!(transport.written().is_empty());
        assert_eq!(firmata.get_io().read().i2c, None);
    }

    #[test]
    fn test_i2c_config() {
        let (firmata, transport) = create_test_firmata();
        firmata.i2c_config(200u16).unwrap();
        assert_eq!(transport.written(), vec![0xF0, 0x78, 0x48, 0x01, 0xF7]);

        firmata
            .i2c_config(I2cConfig {
                address: Some(0x53),
                stop_tx: Some(false),
                settings: [(String::from("bus"), String::from("1"))].into(),
                ..Default::default()
            })
            .unwrap();
        {
            let data = firmata.get_io().read();
            let settings = data.i2c.as_ref().unwrap();
            assert_eq!(settings.delay, 0);
            assert!(!settings.devices[&0x53].stop_tx);
            assert_eq!(settings.devices[&0x53].extra["bus"], "1");
        }

        // Last configuration wins.
        firmata
            .i2c_config(I2cConfig {
                address: Some(0x53),
                ..Default::default()
            })
            .unwrap();
        let data = firmata.get_io().read();
        let device = &data.i2c.as_ref().unwrap().devices[&0x53];
        assert!(device.stop_tx);
        assert!(device.extra.is_empty());
    }

    #[test]
    fn test_i2c_write() {
        let (firmata, transport) = create_test_firmata();
        firmata.i2c_config(0u16).unwrap();
        transport.clear();

        firmata.i2c_write(0x40, Some(0x06), &[0xFF, 0x01]).unwrap();
        firmata.i2c_write_reg(0x40, 0x00, 0x20).unwrap();
        assert_eq!(
            transport.writes(),
            vec![
                vec![0xF0, 0x76, 0x40, 0x00, 0x06, 0x00, 0x7F, 0x01, 0x01, 0x00, 0xF7],
                vec![0xF0, 0x76, 0x40, 0x00, 0x00, 0x00, 0x20, 0x00, 0xF7],
            ]
        );
        assert!(
            firmata.get_io().read().i2c.as_ref().unwrap().devices[&0x40].stop_tx,
            "Device settings are created on first use"
        );
    }

    #[test]
    fn test_i2c_read_modes() {
        let (firmata, transport) = create_test_firmata();
        firmata
            .i2c_config(I2cConfig {
                address: Some(0x68),
                stop_tx: Some(false),
                ..Default::default()
            })
            .unwrap();
        transport.clear();

        firmata.i2c_read_once(0x68, Some(0x3B), 14, |_| {}).unwrap();
        firmata.i2c_read(0x53, None, 6, |_| {}).unwrap();
        firmata.i2c_write(0x1A5, None, &[]).unwrap();
        firmata.i2c_stop(0x53).unwrap();
        assert_eq!(
            transport.writes(),
            vec![
                vec![0xF0, 0x76, 0x68, 0x48, 0x3B, 0x00, 0x0E, 0x00, 0xF7],
                vec![0xF0, 0x76, 0x53, 0x10, 0x06, 0x00, 0xF7],
                vec![0xF0, 0x76, 0x25, 0x23, 0xF7],
                vec![0xF0, 0x76, 0x53, 0x18, 0xF7],
            ]
        );
    }

    #[test]
    fn test_i2c_read_failure_leaves_no_subscription() {
        let (firmata, transport) = create_test_firmata();
        firmata.i2c_config(0u16).unwrap();
        transport.set_failing(true);

        assert!(firmata.i2c_read(0x53, None, 6, |_| {}).is_err());
        assert!(firmata.i2c_read_once(0x53, Some(0x01), 1, |_| {}).is_err());
        assert!(firmata.i2c_subscriptions.lock().is_empty());
        assert_eq!(firmata.events.listener_count("I2C-reply-83"), 0);
        assert_eq!(firmata.events.listener_count("I2C-reply-83-1"), 0);
    }

    #[test]
    fn test_i2c_reply_correlation() {
        let (firmata, _) = create_test_firmata();
        firmata.i2c_config(0u16).unwrap();

        let count_53 = Arc::new(AtomicUsize::new(0));
        let count_54 = Arc::new(AtomicUsize::new(0));
        let clone = count_53.clone();
        firmata
            .i2c_read(0x53, None, 2, move |reply: I2CReply| {
                assert_eq!(reply.data, vec![0x10, 0xFF]);
                clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let clone = count_54.clone();
        firmata
            .i2c_read(0x54, None, 2, move |_| {
                clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        for _ in 0..5 {
            firmata.receive(&reply(0x53, 0x00, &[0x10, 0xFF]));
        }
        assert_eq!(count_53.load(Ordering::SeqCst), 5);
        assert_eq!(count_54.load(Ordering::SeqCst), 0);

        firmata.i2c_stop(0x53).unwrap();
        firmata.receive(&reply(0x53, 0x00, &[0x10, 0xFF]));
        assert_eq!(count_53.load(Ordering::SeqCst), 5, "Stopped reads are dropped");
    }

    #[test]
    fn test_i2c_read_once_matches_register() {
        let (firmata, _) = create_test_firmata();
        firmata.i2c_config(0u16).unwrap();

        let received = Arc::new(Mutex::new(vec![]));
        let clone = received.clone();
        firmata
            .i2c_read_once(0x68, Some(0x3B), 1, move |reply| clone.lock().push(reply))
            .unwrap();
        let all = Arc::new(AtomicUsize::new(0));
        let clone = all.clone();
        firmata.on(format!("I2C-reply-{}", 0x68), move |_: I2CReply| {
            clone.fetch_add(1, Ordering::SeqCst);
        });

        firmata.receive(&reply(0x68, 0x41, &[0x01]));
        firmata.receive(&reply(0x68, 0x3B, &[0x02]));
        firmata.receive(&reply(0x68, 0x3B, &[0x03]));

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].register, 0x3B);
        assert_eq!(received[0].data, vec![0x02]);
        assert_eq!(all.load(Ordering::SeqCst), 3);
    }
}
