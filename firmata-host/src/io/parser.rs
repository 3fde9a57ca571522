use log::{debug, warn};

use crate::io::constants::*;

/// Incremental frame parser: turns an arbitrarily chunked inbound byte stream into complete
/// Firmata messages.
///
/// Bytes are pushed one at a time; a complete message is handed back as soon as its last byte
/// has been pushed. Framing is decided by the first byte only:
/// - MIDI-style commands (REPORT_VERSION, ANALOG_MESSAGE, DIGITAL_MESSAGE) are exactly 3 bytes,
/// - a sysex frame starts with START_SYSEX and accumulates everything up to END_SYSEX.
///
/// Until a REPORT_VERSION message has been seen, every other message is dropped: this absorbs
/// the noise a board produces while it resets.
#[derive(Clone, Debug, Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
    versioned: bool,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once a REPORT_VERSION message went through the parser.
    pub fn is_versioned(&self) -> bool {
        self.versioned
    }

    /// Number of bytes waiting for the end of their message.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Forgets any partial message and the versioned status (used when the transport closes).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.versioned = false;
    }

    /// Pushes a single byte, returning the completed message if this byte ended one.
    pub fn push(&mut self, byte: u8) -> Option<Vec<u8>> {
        // Leading zeros are padding some boards emit after a reset.
        if self.buffer.is_empty() && byte == 0 {
            return None;
        }

        // Inside a sysex frame: accumulate up to END_SYSEX, whatever the byte values are.
        if self.buffer.first() == Some(&START_SYSEX) {
            self.buffer.push(byte);
            return match byte {
                END_SYSEX => self.complete(),
                _ if self.buffer.len() >= MAX_SYSEX_SIZE => {
                    warn!("Unterminated sysex frame dropped after {} bytes", MAX_SYSEX_SIZE);
                    self.buffer.clear();
                    None
                }
                _ => None,
            };
        }

        // A status byte in the middle of a MIDI message means we lost sync: restart from it.
        if !self.buffer.is_empty() && byte >= 0x80 {
            debug!("Incomplete message dropped: {:02X?}", self.buffer);
            self.buffer.clear();
        }

        if self.buffer.is_empty() && !Self::is_message_start(byte) {
            return None;
        }

        self.buffer.push(byte);
        match self.buffer.len() {
            3 => self.complete(),
            _ => None,
        }
    }

    /// Pushes a whole chunk and collects every message it completes, in order.
    pub fn push_all(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        chunk.iter().filter_map(|&byte| self.push(byte)).collect()
    }

    fn is_message_start(byte: u8) -> bool {
        matches!(
            byte,
            REPORT_VERSION
                | START_SYSEX
                | ANALOG_MESSAGE..=ANALOG_MESSAGE_BOUND
                | DIGITAL_MESSAGE..=DIGITAL_MESSAGE_BOUND
        )
    }

    fn complete(&mut self) -> Option<Vec<u8>> {
        let message = std::mem::take(&mut self.buffer);
        if message[0] == REPORT_VERSION {
            self.versioned = true;
        }
        match self.versioned {
            true => Some(message),
            false => {
                debug!("Message absorbed before version report: {:02X?}", message);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::io::constants::MAX_SYSEX_SIZE;
    use crate::io::FrameParser;

    fn versioned_parser() -> FrameParser {
        let mut parser = FrameParser::new();
        assert_eq!(parser.push_all(&[0xF9, 0x02, 0x05]).len(), 1);
        parser
    }

    #[test]
    fn test_midi_message() {
        let mut parser = versioned_parser();
        assert!(parser.push(0xE0).is_none());
        assert!(parser.push(0x7F).is_none());
        assert_eq!(parser.push(0x07), Some(vec![0xE0, 0x7F, 0x07]));
        assert_eq!(parser.pending(), 0);
    }

    #[test]
    fn test_sysex_message_byte_by_byte() {
        let mut parser = versioned_parser();
        let frame = [0xF0, 0x79, 0x02, 0x05, 0x41, 0x00, 0x42, 0x00, 0xF7];
        let mut messages = vec![];
        for byte in frame {
            if let Some(message) = parser.push(byte) {
                messages.push(message);
            }
        }
        assert_eq!(messages, vec![frame.to_vec()]);
    }

    #[test]
    fn test_sysex_payload_is_not_reinterpreted() {
        let mut parser = versioned_parser();
        // A status-like byte inside a sysex frame does not start a new message.
        let messages = parser.push_all(&[0xF0, 0x71, 0xF9, 0x90, 0xF7]);
        assert_eq!(messages, vec![vec![0xF0, 0x71, 0xF9, 0x90, 0xF7]]);
    }

    #[test]
    fn test_multiple_messages_in_one_chunk() {
        let mut parser = versioned_parser();
        let messages = parser.push_all(&[0x90, 0x01, 0x00, 0xE1, 0x10, 0x00, 0xF0, 0x71]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], vec![0x90, 0x01, 0x00]);
        assert_eq!(messages[1], vec![0xE1, 0x10, 0x00]);
        assert_eq!(parser.pending(), 2, "Partial sysex frame is kept");
        let messages = parser.push_all(&[0x41, 0x00, 0xF7]);
        assert_eq!(messages, vec![vec![0xF0, 0x71, 0x41, 0x00, 0xF7]]);
    }

    #[test]
    fn test_noise_absorbed_before_version() {
        let mut parser = FrameParser::new();
        let messages = parser.push_all(&[0x12, 0x90, 0x01, 0x00, 0xF0, 0x79, 0xF7, 0x55]);
        assert!(messages.is_empty());
        assert!(!parser.is_versioned());

        let messages = parser.push_all(&[0xF9, 0x02, 0x05, 0x90, 0x01, 0x00]);
        assert_eq!(messages.len(), 2);
        assert!(parser.is_versioned());
    }

    #[test]
    fn test_invalid_leading_bytes_are_dropped() {
        let mut parser = versioned_parser();
        let messages = parser.push_all(&[0x00, 0x12, 0x34, 0x90, 0x01, 0x00]);
        assert_eq!(messages, vec![vec![0x90, 0x01, 0x00]]);
    }

    #[test]
    fn test_resync_on_status_byte() {
        let mut parser = versioned_parser();
        let messages = parser.push_all(&[0xE0, 0x01, 0x90, 0x02, 0x00]);
        assert_eq!(messages, vec![vec![0x90, 0x02, 0x00]]);
    }

    #[test]
    fn test_reset() {
        let mut parser = versioned_parser();
        parser.push_all(&[0xF0, 0x79]);
        parser.reset();
        assert_eq!(parser.pending(), 0);
        assert!(!parser.is_versioned());
    }

    #[test]
    fn test_unterminated_sysex_is_bounded() {
        let mut parser = versioned_parser();
        parser.push(0xF0);
        for _ in 0..10_000 {
            assert!(parser.push(0x42).is_none());
            assert!(parser.pending() < MAX_SYSEX_SIZE);
        }

        // Once dropped, the stream is framed again from the next message start.
        parser.push_all(&[0xF7]);
        assert_eq!(parser.pending(), 0);
        assert_eq!(parser.push_all(&[0xE0, 0x01, 0x02]), vec![vec![0xE0, 0x01, 0x02]]);
        assert!(parser.is_versioned());
    }
}
