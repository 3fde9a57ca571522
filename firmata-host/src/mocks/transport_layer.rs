use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::errors::Error;
use crate::errors::ProtocolError::{IoException, NotInitialized};
use crate::io::IoTransport;

#[derive(Debug, Default)]
struct MockState {
    opened: bool,
    writes: Vec<Vec<u8>>,
    incoming: VecDeque<Vec<u8>>,
    failing: bool,
}

/// In-memory transport: records every write and serves scripted chunks to `read()`.
///
/// Clones share their state, so a test keeps a clone to inspect what the engine wrote.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default)]
pub struct MockTransportLayer {
    #[cfg_attr(feature = "serde", serde(skip))]
    state: Arc<Mutex<MockState>>,
}

impl MockTransportLayer {
    /// All the bytes written since the last [`MockTransportLayer::clear`].
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().writes.concat()
    }

    /// Every `write()` call since the last [`MockTransportLayer::clear`].
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().writes.clone()
    }

    /// Forgets the recorded writes.
    pub fn clear(&self) {
        self.state.lock().writes.clear();
    }

    /// Queues a chunk to be returned by a future `read()`.
    pub fn push_incoming(&self, chunk: &[u8]) {
        self.state.lock().incoming.push_back(chunk.to_vec());
    }

    /// Makes every following `read()` and `write()` fail.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    pub fn is_opened(&self) -> bool {
        self.state.lock().opened
    }
}

impl Display for MockTransportLayer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockTransportLayer")
    }
}

#[cfg_attr(feature = "serde", typetag::serde)]
impl IoTransport for MockTransportLayer {
    fn open(&self) -> Result<(), Error> {
        self.state.lock().opened = true;
        Ok(())
    }

    fn close(&self) -> Result<(), Error> {
        self.state.lock().opened = false;
        Ok(())
    }

    fn set_timeout(&self, _: Duration) -> Result<(), Error> {
        Ok(())
    }

    fn write(&self, buf: &[u8]) -> Result<(), Error> {
        let mut state = self.state.lock();
        if state.failing {
            return Err(IoException {
                info: String::from("Mock write failure"),
            }
            .into());
        }
        state.writes.push(buf.to_vec());
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut state = self.state.lock();
        if state.failing {
            return Err(IoException {
                info: String::from("Mock read failure"),
            }
            .into());
        }
        if !state.opened {
            return Err(NotInitialized.into());
        }
        let chunk = match state.incoming.pop_front() {
            None => return Ok(0),
            Some(chunk) => chunk,
        };
        let count = chunk.len().min(buf.len());
        buf[..count].copy_from_slice(&chunk[..count]);
        if count < chunk.len() {
            state.incoming.push_front(chunk[count..].to_vec());
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_writes() {
        let transport = MockTransportLayer::default();
        let clone = transport.clone();
        transport.write(&[0xF9]).unwrap();
        transport.write(&[0xF0, 0x79, 0xF7]).unwrap();
        assert_eq!(clone.written(), vec![0xF9, 0xF0, 0x79, 0xF7]);
        assert_eq!(clone.writes().len(), 2);
        clone.clear();
        assert!(transport.written().is_empty());
    }

    #[test]
    fn test_mock_serves_incoming_chunks() {
        let transport = MockTransportLayer::default();
        let mut buf = [0u8; 2];
        assert!(transport.read(&mut buf).is_err(), "Not opened yet");

        transport.open().unwrap();
        assert_eq!(transport.read(&mut buf).unwrap(), 0);
        transport.push_incoming(&[1, 2, 3]);
        assert_eq!(transport.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(transport.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 3);
    }

    #[test]
    fn test_mock_failure() {
        let transport = MockTransportLayer::default();
        transport.open().unwrap();
        transport.set_failing(true);
        assert!(transport.write(&[0xFF]).is_err());
        assert!(transport.read(&mut [0; 4]).is_err());
        assert_eq!(transport.to_string(), "MockTransportLayer");
    }
}
