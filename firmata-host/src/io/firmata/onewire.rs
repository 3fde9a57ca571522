use std::sync::atomic::Ordering;

use log::{debug, warn};

use crate::errors::Error;
use crate::errors::ProtocolError::UnexpectedData;
use crate::io::constants::*;
use crate::io::encoding::{crc8, from_7bit, to_7bit};
use crate::io::firmata::handlers::ensure_length;
use crate::io::{Firmata, PinModeId};

/// A OneWire device ROM code: family, 48-bit serial number and CRC-8.
pub type OneWireDevice = [u8; 8];

/// Optional parts of a OneWire request.
#[derive(Default)]
struct OneWireRequest<'a> {
    device: Option<OneWireDevice>,
    read_count: u16,
    correlation_id: u16,
    delay: u32,
    data: &'a [u8],
}

impl OneWireRequest<'_> {
    fn has_data(&self) -> bool {
        self.device.is_some()
            || self.read_count > 0
            || self.correlation_id > 0
            || self.delay > 0
            || !self.data.is_empty()
    }

    /// The 16-byte header (device, read count, correlation id, delay) followed by the data.
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; 16];
        if let Some(device) = self.device {
            bytes[0..8].copy_from_slice(&device);
        }
        bytes[8..10].copy_from_slice(&self.read_count.to_le_bytes());
        bytes[10..12].copy_from_slice(&self.correlation_id.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.delay.to_le_bytes());
        bytes.extend_from_slice(self.data);
        bytes
    }
}

impl Firmata {
    /// Configures a pin as a OneWire bus.
    pub fn onewire_config(&self, pin: u16, parasitic_power: bool) -> Result<(), Error> {
        self.data.write().get_pin_mut(pin)?.mode = PinModeId::ONEWIRE;
        self.write(&[
            START_SYSEX,
            ONEWIRE_DATA,
            ONEWIRE_CONFIG_REQUEST,
            pin as u8,
            u8::from(parasitic_power),
            END_SYSEX,
        ])
    }

    /// Lists the devices found on the bus.
    ///
    /// Every device is reported, a device whose CRC-8 does not match being logged as a warning.
    pub fn onewire_search<F>(&self, pin: u16, callback: F) -> Result<(), Error>
    where
        F: FnOnce(Vec<OneWireDevice>) + Send + 'static,
    {
        self.once(format!("1-wire-search-reply-{}", pin), callback);
        self.write(&[
            START_SYSEX,
            ONEWIRE_DATA,
            ONEWIRE_SEARCH_REQUEST,
            pin as u8,
            END_SYSEX,
        ])
    }

    /// Lists the devices of the bus in an alarm state.
    pub fn onewire_search_alarms<F>(&self, pin: u16, callback: F) -> Result<(), Error>
    where
        F: FnOnce(Vec<OneWireDevice>) + Send + 'static,
    {
        self.once(format!("1-wire-search-alarms-reply-{}", pin), callback);
        self.write(&[
            START_SYSEX,
            ONEWIRE_DATA,
            ONEWIRE_SEARCH_ALARMS_REQUEST,
            pin as u8,
            END_SYSEX,
        ])
    }

    /// Resets the bus.
    pub fn onewire_reset(&self, pin: u16) -> Result<(), Error> {
        self.onewire_request(pin, ONEWIRE_RESET_REQUEST_BIT, OneWireRequest::default())
    }

    /// Makes the board wait before the next OneWire request on this bus.
    pub fn onewire_delay(&self, pin: u16, micros: u32) -> Result<(), Error> {
        let request = OneWireRequest {
            delay: micros,
            ..Default::default()
        };
        self.onewire_request(pin, ONEWIRE_DELAY_REQUEST_BIT, request)
    }

    /// Writes bytes to a device (or to every device when none is selected).
    pub fn onewire_write(
        &self,
        pin: u16,
        device: Option<OneWireDevice>,
        data: &[u8],
    ) -> Result<(), Error> {
        let request = OneWireRequest {
            device,
            data,
            ..Default::default()
        };
        self.onewire_request(pin, ONEWIRE_WRITE_REQUEST_BIT, request)
    }

    /// Reads `count` bytes from a device.
    pub fn onewire_read<F>(
        &self,
        pin: u16,
        device: Option<OneWireDevice>,
        count: u16,
        callback: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(Vec<u8>) + Send + 'static,
    {
        self.onewire_read_request(pin, ONEWIRE_READ_REQUEST_BIT, device, &[], count, callback)
    }

    /// Writes bytes to a device then reads `count` bytes from it.
    ///
    /// The request carries a fresh correlation id: `callback` is called with the reply holding
    /// the same id.
    pub fn onewire_write_and_read<F>(
        &self,
        pin: u16,
        device: Option<OneWireDevice>,
        data: &[u8],
        count: u16,
        callback: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(Vec<u8>) + Send + 'static,
    {
        self.onewire_read_request(
            pin,
            ONEWIRE_WRITE_REQUEST_BIT | ONEWIRE_READ_REQUEST_BIT,
            device,
            data,
            count,
            callback,
        )
    }

    fn onewire_read_request<F>(
        &self,
        pin: u16,
        subcommand: u8,
        device: Option<OneWireDevice>,
        data: &[u8],
        count: u16,
        callback: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(Vec<u8>) + Send + 'static,
    {
        let correlation_id = self.next_correlation_id();
        self.onewire_pending
            .lock()
            .insert(correlation_id, Box::new(callback));

        let request = OneWireRequest {
            device,
            read_count: count,
            correlation_id,
            data,
            ..Default::default()
        };
        let result = self.onewire_request(pin, subcommand, request);
        if result.is_err() {
            self.onewire_pending.lock().remove(&correlation_id);
        }
        result
    }

    /// A non-zero id, unique among the pending requests as long as less than 65535 are waiting.
    fn next_correlation_id(&self) -> u16 {
        loop {
            let id = self.onewire_next_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    /// `[START_SYSEX, ONEWIRE_DATA, subcommand, pin, 7-bit encoded request..., END_SYSEX]`.
    ///
    /// The request part is only present when there is something to send, the subcommand then
    /// carrying the "with data" bits.
    fn onewire_request(
        &self,
        pin: u16,
        subcommand: u8,
        request: OneWireRequest,
    ) -> Result<(), Error> {
        let mut payload = vec![START_SYSEX, ONEWIRE_DATA, subcommand, pin as u8];
        if request.has_data() {
            payload[2] |= ONEWIRE_WITHDATA_REQUEST_BITS;
            payload.extend(to_7bit(&request.to_bytes()));
        }
        payload.push(END_SYSEX);
        self.write(&payload)
    }

    /// Handle the ONEWIRE_DATA replies (search, search alarms and read).
    pub(crate) fn handle_onewire_reply(&self, buf: &[u8]) -> Result<(), Error> {
        ensure_length("handle_onewire_reply", buf, 5)?;
        let pin = buf[3];
        let decoded = from_7bit(&buf[4..buf.len() - 1]);

        match buf[2] {
            ONEWIRE_SEARCH_REPLY => {
                let devices = self.decode_onewire_devices(&decoded);
                self.emit(format!("1-wire-search-reply-{}", pin), devices);
            }
            ONEWIRE_SEARCH_ALARMS_REPLY => {
                let devices = self.decode_onewire_devices(&decoded);
                self.emit(format!("1-wire-search-alarms-reply-{}", pin), devices);
            }
            ONEWIRE_READ_REPLY => {
                if decoded.len() < 2 {
                    return Err(UnexpectedData.into());
                }
                let correlation_id = u16::from_le_bytes([decoded[0], decoded[1]]);
                let pending = self.onewire_pending.lock().remove(&correlation_id);
                match pending {
                    Some(callback) => callback(decoded[2..].to_vec()),
                    None => debug!("OneWire reply without request: id {}", correlation_id),
                }
            }
            subcommand => debug!("Unknown OneWire reply {:#04X}", subcommand),
        }
        Ok(())
    }

    fn decode_onewire_devices(&self, decoded: &[u8]) -> Vec<OneWireDevice> {
        decoded
            .chunks_exact(8)
            .map(|chunk| {
                let mut device = [0u8; 8];
                device.copy_from_slice(chunk);
                if crc8(&device[..7]) != device[7] {
                    warn!("OneWire device {:02X?} has an invalid CRC", device);
                }
                device
            })
            .collect()
    }
}
