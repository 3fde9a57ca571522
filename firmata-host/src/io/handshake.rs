use std::fmt::{Display, Formatter};

use log::debug;

/// The startup sequence a board goes through before it is ready to be used.
///
/// `Idle → AwaitingVersion → AwaitingFirmware → [AwaitingCapabilities → AwaitingAnalogMapping →
/// AwaitingPinStates(0..N)] → Ready`, the bracketed part being skipped when capability
/// discovery is disabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HandshakeState {
    #[default]
    Idle,
    AwaitingVersion,
    AwaitingFirmware,
    AwaitingCapabilities,
    AwaitingAnalogMapping,
    /// Waiting for the pin state of the given pin.
    AwaitingPinStates(u16),
    Ready,
}

impl Display for HandshakeState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            HandshakeState::AwaitingPinStates(pin) => write!(f, "AwaitingPinStates({})", pin),
            state => write!(f, "{:?}", state),
        }
    }
}

/// What the engine must do after a handshake transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Nothing to send: the reply did not advance the handshake.
    None,
    QueryCapabilities,
    QueryAnalogMapping,
    QueryPinState(u16),
    /// The handshake just completed: `ready` must be emitted.
    Ready,
}

/// PIN_STATE_QUERY carries the pin on a single 7-bit byte: pins above are never queried.
const QUERYABLE_PIN_COUNT: u16 = 128;

/// Handshake state machine: pure transitions, the engine performs the writes and emissions.
#[derive(Clone, Debug, Default)]
pub struct Handshake {
    state: HandshakeState,
    skip_capabilities: bool,
}

impl Handshake {
    pub fn new(skip_capabilities: bool) -> Self {
        Self {
            state: HandshakeState::Idle,
            skip_capabilities,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == HandshakeState::Ready
    }

    /// Transport opened: version and firmware queries have been sent.
    pub fn start(&mut self) {
        self.transition(HandshakeState::AwaitingVersion);
    }

    /// Transport closed: a new handshake is required.
    pub fn reset(&mut self) {
        self.transition(HandshakeState::Idle);
    }

    pub fn version_received(&mut self) -> HandshakeStep {
        if matches!(
            self.state,
            HandshakeState::Idle | HandshakeState::AwaitingVersion
        ) {
            self.transition(HandshakeState::AwaitingFirmware);
        }
        HandshakeStep::None
    }

    /// Any step other than [`HandshakeStep::None`] means this is the handshake firmware reply.
    pub fn firmware_received(&mut self) -> HandshakeStep {
        match self.state {
            HandshakeState::AwaitingVersion | HandshakeState::AwaitingFirmware => {
                match self.skip_capabilities {
                    true => self.ready(),
                    false => {
                        self.transition(HandshakeState::AwaitingCapabilities);
                        HandshakeStep::QueryCapabilities
                    }
                }
            }
            _ => HandshakeStep::None,
        }
    }

    pub fn capabilities_received(&mut self) -> HandshakeStep {
        match self.state {
            HandshakeState::AwaitingCapabilities => {
                self.transition(HandshakeState::AwaitingAnalogMapping);
                HandshakeStep::QueryAnalogMapping
            }
            _ => HandshakeStep::None,
        }
    }

    pub fn analog_mapping_received(&mut self, pin_count: u16) -> HandshakeStep {
        match self.state {
            HandshakeState::AwaitingAnalogMapping => match pin_count.min(QUERYABLE_PIN_COUNT) {
                0 => self.ready(),
                _ => {
                    self.transition(HandshakeState::AwaitingPinStates(0));
                    HandshakeStep::QueryPinState(0)
                }
            },
            _ => HandshakeStep::None,
        }
    }

    /// Pin states are queried one after the other: only the expected pin advances the handshake.
    pub fn pin_state_received(&mut self, pin: u16, pin_count: u16) -> HandshakeStep {
        match self.state {
            HandshakeState::AwaitingPinStates(expected) if expected == pin => {
                let next = pin + 1;
                match next >= pin_count.min(QUERYABLE_PIN_COUNT) {
                    true => self.ready(),
                    false => {
                        self.transition(HandshakeState::AwaitingPinStates(next));
                        HandshakeStep::QueryPinState(next)
                    }
                }
            }
            _ => HandshakeStep::None,
        }
    }

    fn ready(&mut self) -> HandshakeStep {
        self.transition(HandshakeState::Ready);
        HandshakeStep::Ready
    }

    fn transition(&mut self, state: HandshakeState) {
        debug!("Handshake: {} -> {}", self.state, state);
        self.state = state;
    }
}
