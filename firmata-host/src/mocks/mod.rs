//! Test doubles: an in-memory transport, a fake serial port, and ready-made boards.

use crate::io::{BoardOptions, Firmata, IoData, Pin, PinMode, PinModeId, Resolution};
use crate::mocks::transport_layer::MockTransportLayer;

pub mod serial_port;
pub mod transport_layer;

const PWM_PINS: [u16; 6] = [3, 5, 6, 9, 10, 11];

fn mode(id: PinModeId, resolution: u8) -> PinMode {
    PinMode { id, resolution }
}

/// An UNO-like pin table: D0 to D13 digital (PWM/servo capable on 3, 5, 6, 9, 10, 11) then
/// A0 to A5 on pins 14 to 19.
pub fn create_test_pins() -> Vec<Pin> {
    let digital = (0..14u16).map(|id| {
        let mut supported_modes = vec![
            mode(PinModeId::INPUT, 1),
            mode(PinModeId::OUTPUT, 1),
            mode(PinModeId::PULLUP, 1),
        ];
        if PWM_PINS.contains(&id) {
            supported_modes.push(mode(PinModeId::PWM, 8));
            supported_modes.push(mode(PinModeId::SERVO, 14));
        }
        Pin {
            mode: PinModeId::OUTPUT,
            supported_modes,
            ..Pin::new(id)
        }
    });

    let analog = (14..20u16).map(|id| {
        let mut pin = Pin {
            mode: PinModeId::ANALOG,
            supported_modes: vec![mode(PinModeId::ANALOG, 10)],
            ..Pin::new(id)
        };
        pin.set_channel((id - 14) as u8);
        pin
    });

    digital.chain(analog).collect()
}

pub fn create_test_io_data() -> IoData {
    IoData {
        pins: create_test_pins(),
        analog_pins: (14..20).collect(),
        resolution: Resolution {
            adc: Some(1023),
            pwm: Some(255),
        },
        ..Default::default()
    }
}

/// A versioned engine over a [`MockTransportLayer`], with the test pin table already known.
///
/// The returned transport shares its state with the engine's and starts with no recorded write.
pub fn create_test_firmata() -> (Firmata, MockTransportLayer) {
    let transport = MockTransportLayer::default();
    let data = create_test_io_data();
    let firmata = Firmata::new(
        transport.clone(),
        BoardOptions {
            skip_capabilities: true,
            pins: Some(data.pins),
            analog_pins: Some(data.analog_pins),
            ..Default::default()
        },
    );
    // REPORT_VERSION 2.5
    firmata.receive(&[0xF9, 0x02, 0x05]);
    transport.clear();
    (firmata, transport)
}
