use crate::errors::ConfigurationError::{InvalidStepperGroup, MissingParameter};
use crate::errors::Error;
use crate::io::constants::*;
use crate::io::encoding::{decode_i32, encode_custom_float, encode_i32};
use crate::io::firmata::handlers::ensure_length;
use crate::io::{Firmata, PinModeId};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum StepperType {
    /// Step + direction driver board.
    #[default]
    Driver = 1,
    TwoWire = 2,
    ThreeWire = 3,
    FourWire = 4,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum StepperDirection {
    CCW = 0,
    #[default]
    CW = 1,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum StepSize {
    #[default]
    Whole = 0,
    Half = 1,
}

/// How the motor is wired to the board: the variant fixes both the interface type and the pins.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepperWiring {
    Driver { step: u8, direction: u8 },
    TwoWire { pins: [u8; 2] },
    ThreeWire { pins: [u8; 3] },
    FourWire { pins: [u8; 4] },
}

impl StepperWiring {
    pub fn stepper_type(&self) -> StepperType {
        match self {
            StepperWiring::Driver { .. } => StepperType::Driver,
            StepperWiring::TwoWire { .. } => StepperType::TwoWire,
            StepperWiring::ThreeWire { .. } => StepperType::ThreeWire,
            StepperWiring::FourWire { .. } => StepperType::FourWire,
        }
    }

    /// The motor pins, in the order the firmware expects them.
    pub fn pins(&self) -> Vec<u8> {
        match self {
            StepperWiring::Driver { step, direction } => vec![*step, *direction],
            StepperWiring::TwoWire { pins } => pins.to_vec(),
            StepperWiring::ThreeWire { pins } => pins.to_vec(),
            StepperWiring::FourWire { pins } => pins.to_vec(),
        }
    }
}

/// Parameters of [`Firmata::accel_stepper_config`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct AccelStepperConfig {
    pub device: u8,
    pub wiring: StepperWiring,
    pub step_size: StepSize,
    pub enable_pin: Option<u8>,
    /// Pins whose logic is inverted: any motor pin or the enable pin.
    pub invert_pins: Vec<u8>,
}

impl AccelStepperConfig {
    /// Interface byte: `0b0TTT_SSSE` (type, step size, has enable pin).
    fn interface(&self) -> u8 {
        ((self.wiring.stepper_type() as u8 & 0x07) << 4)
            | ((self.step_size as u8 & 0x07) << 1)
            | u8::from(self.enable_pin.is_some())
    }

    /// Bit `i` is set when the pin in slot `i` is inverted. Slots are the motor pins followed by
    /// the enable pin (always slot 4).
    fn invert_mask(&self) -> u8 {
        let mut slots: Vec<Option<u8>> = self.wiring.pins().into_iter().map(Some).collect();
        slots.resize(4, None);
        slots.push(self.enable_pin);
        slots
            .iter()
            .enumerate()
            .filter(|(_, pin)| matches!(pin, Some(pin) if self.invert_pins.contains(pin)))
            .fold(0u8, |mask, (slot, _)| mask | (1 << slot))
    }
}

impl Firmata {
    // ########################################
    // Legacy stepper

    /// Configures a stepper with the legacy stepper protocol.
    pub fn stepper_config(
        &self,
        device: u8,
        wiring: StepperWiring,
        steps_per_revolution: u16,
    ) -> Result<(), Error> {
        self.set_stepper_pins(&wiring)?;
        let mut payload = vec![
            START_SYSEX,
            STEPPER,
            STEPPER_CONFIG,
            device,
            wiring.stepper_type() as u8,
            steps_per_revolution as u8 & SYSEX_REALTIME,
            (steps_per_revolution >> 7) as u8 & SYSEX_REALTIME,
        ];
        payload.extend(wiring.pins());
        payload.push(END_SYSEX);
        self.write(&payload)
    }

    /// Runs a legacy stepper: `callback` is called once the move completes.
    ///
    /// `speed` is in 0.01 rad/s. Acceleration and deceleration are only sent when one of them is
    /// set.
    #[allow(clippy::too_many_arguments)]
    pub fn stepper_step<F>(
        &self,
        device: u8,
        direction: StepperDirection,
        steps: u32,
        speed: u16,
        acceleration: u16,
        deceleration: u16,
        callback: F,
    ) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut payload = vec![
            START_SYSEX,
            STEPPER,
            STEPPER_STEP,
            device,
            direction as u8,
            steps as u8 & SYSEX_REALTIME,
            (steps >> 7) as u8 & SYSEX_REALTIME,
            (steps >> 14) as u8 & SYSEX_REALTIME,
            speed as u8 & SYSEX_REALTIME,
            (speed >> 7) as u8 & SYSEX_REALTIME,
        ];
        if acceleration > 0 || deceleration > 0 {
            payload.extend([
                acceleration as u8 & SYSEX_REALTIME,
                (acceleration >> 7) as u8 & SYSEX_REALTIME,
                deceleration as u8 & SYSEX_REALTIME,
                (deceleration >> 7) as u8 & SYSEX_REALTIME,
            ]);
        }
        payload.push(END_SYSEX);

        self.once(format!("stepper-done-{}", device), move |_: bool| callback());
        self.write(&payload)
    }

    /// Handle a legacy STEPPER reply: `[0xF0, 0x72, device, 0xF7]`.
    pub(crate) fn handle_stepper_reply(&self, buf: &[u8]) -> Result<(), Error> {
        ensure_length("handle_stepper_reply", buf, 4)?;
        self.emit(format!("stepper-done-{}", buf[2]), true);
        Ok(())
    }

    // ########################################
    // AccelStepper

    /// Configures a stepper with the AccelStepper protocol.
    pub fn accel_stepper_config(&self, config: &AccelStepperConfig) -> Result<(), Error> {
        self.set_stepper_pins(&config.wiring)?;
        let mut payload = vec![
            START_SYSEX,
            ACCELSTEPPER,
            ACCELSTEPPER_CONFIG,
            config.device,
            config.interface(),
        ];
        payload.extend(config.wiring.pins());
        if let Some(enable) = config.enable_pin {
            payload.push(enable);
        }
        payload.push(config.invert_mask());
        payload.push(END_SYSEX);
        self.write(&payload)
    }

    /// Sets the current position of the stepper as its zero.
    pub fn accel_stepper_zero(&self, device: u8) -> Result<(), Error> {
        self.write(&[START_SYSEX, ACCELSTEPPER, ACCELSTEPPER_ZERO, device, END_SYSEX])
    }

    /// Moves the stepper by a relative number of steps. `callback` receives the final position.
    pub fn accel_stepper_step<F>(
        &self,
        device: u8,
        steps: i32,
        callback: Option<F>,
    ) -> Result<(), Error>
    where
        F: FnOnce(i32) + Send + 'static,
    {
        self.accel_stepper_move(ACCELSTEPPER_STEP, device, steps, callback)
    }

    /// Moves the stepper to an absolute position. `callback` receives the final position.
    pub fn accel_stepper_to<F>(
        &self,
        device: u8,
        position: i32,
        callback: Option<F>,
    ) -> Result<(), Error>
    where
        F: FnOnce(i32) + Send + 'static,
    {
        self.accel_stepper_move(ACCELSTEPPER_TO, device, position, callback)
    }

    fn accel_stepper_move<F>(
        &self,
        command: u8,
        device: u8,
        value: i32,
        callback: Option<F>,
    ) -> Result<(), Error>
    where
        F: FnOnce(i32) + Send + 'static,
    {
        let mut payload = vec![START_SYSEX, ACCELSTEPPER, command, device];
        payload.extend(encode_i32(value));
        payload.push(END_SYSEX);

        if let Some(callback) = callback {
            self.once(format!("stepper-done-{}", device), callback);
        }
        self.write(&payload)
    }

    pub fn accel_stepper_enable(&self, device: u8, enabled: bool) -> Result<(), Error> {
        self.write(&[
            START_SYSEX,
            ACCELSTEPPER,
            ACCELSTEPPER_ENABLE,
            device,
            u8::from(enabled),
            END_SYSEX,
        ])
    }

    /// Stops the stepper: the firmware answers with the position where it stopped.
    pub fn accel_stepper_stop(&self, device: u8) -> Result<(), Error> {
        self.write(&[START_SYSEX, ACCELSTEPPER, ACCELSTEPPER_STOP, device, END_SYSEX])
    }

    pub fn accel_stepper_report_position<F>(&self, device: u8, callback: F) -> Result<(), Error>
    where
        F: FnOnce(i32) + Send + 'static,
    {
        self.once(format!("stepper-position-{}", device), callback);
        self.write(&[
            START_SYSEX,
            ACCELSTEPPER,
            ACCELSTEPPER_REPORT_POSITION,
            device,
            END_SYSEX,
        ])
    }

    /// Sets the acceleration in steps/s². Two decimals are kept.
    pub fn accel_stepper_acceleration(&self, device: u8, acceleration: f64) -> Result<(), Error> {
        self.accel_stepper_float(ACCELSTEPPER_SET_ACCELERATION, device, acceleration)
    }

    /// Sets the maximum speed in steps/s. Two decimals are kept.
    pub fn accel_stepper_speed(&self, device: u8, speed: f64) -> Result<(), Error> {
        self.accel_stepper_float(ACCELSTEPPER_SET_SPEED, device, speed)
    }

    fn accel_stepper_float(&self, command: u8, device: u8, value: f64) -> Result<(), Error> {
        let mut payload = vec![START_SYSEX, ACCELSTEPPER, command, device];
        payload.extend(encode_custom_float(value));
        payload.push(END_SYSEX);
        self.write(&payload)
    }

    // ########################################
    // Multi-stepper groups

    /// Groups steppers so they can be moved together.
    ///
    /// # Errors
    /// * `MissingParameter`: `devices` is empty.
    /// * `InvalidStepperGroup`: the group number is above 5.
    pub fn multi_stepper_config(&self, group: u8, devices: &[u8]) -> Result<(), Error> {
        Self::check_stepper_group(group)?;
        if devices.is_empty() {
            return Err(MissingParameter { name: "devices" }.into());
        }
        let mut payload = vec![START_SYSEX, ACCELSTEPPER, MULTISTEPPER_CONFIG, group];
        payload.extend_from_slice(devices);
        payload.push(END_SYSEX);
        self.write(&payload)
    }

    /// Moves every stepper of the group to its position (one per device, in device order).
    pub fn multi_stepper_to<F>(
        &self,
        group: u8,
        positions: &[i32],
        callback: Option<F>,
    ) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        Self::check_stepper_group(group)?;
        let mut payload = vec![START_SYSEX, ACCELSTEPPER, MULTISTEPPER_TO, group];
        for position in positions {
            payload.extend(encode_i32(*position));
        }
        payload.push(END_SYSEX);

        if let Some(callback) = callback {
            self.once(format!("multi-stepper-done-{}", group), move |_: ()| callback());
        }
        self.write(&payload)
    }

    pub fn multi_stepper_stop(&self, group: u8) -> Result<(), Error> {
        Self::check_stepper_group(group)?;
        self.write(&[START_SYSEX, ACCELSTEPPER, MULTISTEPPER_STOP, group, END_SYSEX])
    }

    fn check_stepper_group(group: u8) -> Result<(), Error> {
        match group > MULTISTEPPER_MAX_GROUP {
            true => Err(InvalidStepperGroup { group }.into()),
            false => Ok(()),
        }
    }

    fn set_stepper_pins(&self, wiring: &StepperWiring) -> Result<(), Error> {
        let mut data = self.data.write();
        for pin in wiring.pins() {
            data.get_pin_mut(pin as u16)?.mode = PinModeId::STEPPER;
        }
        Ok(())
    }

    /// Handle an ACCELSTEPPER reply: position report, move complete, or group move complete.
    pub(crate) fn handle_accel_stepper_reply(&self, buf: &[u8]) -> Result<(), Error> {
        ensure_length("handle_accel_stepper_reply", buf, 4)?;
        match buf[2] {
            ACCELSTEPPER_REPORT_POSITION => {
                ensure_length("handle_accel_stepper_reply", buf, 10)?;
                let position = decode_i32(&buf[4..9]);
                self.emit(format!("stepper-position-{}", buf[3]), position);
            }
            ACCELSTEPPER_MOVE_COMPLETE => {
                ensure_length("handle_accel_stepper_reply", buf, 10)?;
                let position = decode_i32(&buf[4..9]);
                self.emit(format!("stepper-done-{}", buf[3]), position);
            }
            MULTISTEPPER_MOVE_COMPLETE => {
                self.emit(format!("multi-stepper-done-{}", buf[3]), ());
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::io::{AccelStepperConfig, PinModeId, StepSize, StepperDirection, StepperWiring};
    use crate::mocks::create_test_firmata;

    #[test]
    fn test_stepper_config() {
        let (firmata, transport) = create_test_firmata();
        firmata
            .stepper_config(
                1,
                StepperWiring::FourWire {
                    pins: [2, 3, 4, 5],
                },
                200,
            )
            .unwrap();
        assert_eq!(
            transport.written(),
            vec![0xF0, 0x72, 0x00, 0x01, 0x04, 0x48, 0x01, 0x02, 0x03, 0x04, 0x05, 0xF7]
        );
        assert_eq!(
            firmata.get_io().read().get_pin(4).unwrap().mode,
            PinModeId::STEPPER
        );
    }

    #[test]
    fn test_stepper_step() {
        let (firmata, transport) = create_test_firmata();
        let done = Arc::new(Mutex::new(0));
        let clone = done.clone();
        firmata
            .stepper_step(2, StepperDirection::CCW, 1000, 300, 0, 0, move || {
                *clone.lock() += 1
            })
            .unwrap();
        assert_eq!(
            transport.written(),
            vec![0xF0, 0x72, 0x01, 0x02, 0x00, 0x68, 0x07, 0x00, 0x2C, 0x02, 0xF7]
        );

        transport.clear();
        firmata
            .stepper_step(2, StepperDirection::CW, 10, 100, 20, 30, || {})
            .unwrap();
        assert_eq!(
            transport.written(),
            vec![
                0xF0, 0x72, 0x01, 0x02, 0x01, 0x0A, 0x00, 0x00, 0x64, 0x00, 0x14, 0x00, 0x1E, 0x00,
                0xF7,
            ]
        );

        firmata.receive(&[0xF0, 0x72, 0x02, 0xF7]);
        firmata.receive(&[0xF0, 0x72, 0x02, 0xF7]);
        assert_eq!(*done.lock(), 1);
    }

    #[test]
    fn test_accel_stepper_config() {
        let (firmata, transport) = create_test_firmata();
        firmata
            .accel_stepper_config(&AccelStepperConfig {
                device: 0,
                wiring: StepperWiring::Driver {
                    step: 2,
                    direction: 3,
                },
                step_size: StepSize::Whole,
                enable_pin: None,
                invert_pins: vec![],
            })
            .unwrap();
        firmata
            .accel_stepper_config(&AccelStepperConfig {
                device: 1,
                wiring: StepperWiring::FourWire {
                    pins: [4, 5, 6, 7],
                },
                step_size: StepSize::Half,
                enable_pin: Some(8),
                invert_pins: vec![5, 8],
            })
            .unwrap();
        assert_eq!(
            transport.writes(),
            vec![
                vec![0xF0, 0x62, 0x00, 0x00, 0x10, 0x02, 0x03, 0x00, 0xF7],
                vec![0xF0, 0x62, 0x00, 0x01, 0x43, 0x04, 0x05, 0x06, 0x07, 0x08, 0x12, 0xF7],
            ]
        );
    }

    #[test]
    fn test_accel_stepper_moves() {
        let (firmata, transport) = create_test_firmata();
        let position = Arc::new(Mutex::new(None));
        let clone = position.clone();
        firmata
            .accel_stepper_step(0, -5786, Some(move |p: i32| *clone.lock() = Some(p)))
            .unwrap();
        firmata.accel_stepper_to(0, 5786, None::<fn(i32)>).unwrap();
        assert_eq!(
            transport.writes(),
            vec![
                vec![0xF0, 0x62, 0x02, 0x00, 26, 45, 0, 0, 8, 0xF7],
                vec![0xF0, 0x62, 0x03, 0x00, 26, 45, 0, 0, 0, 0xF7],
            ]
        );

        firmata.receive(&[0xF0, 0x62, 0x0A, 0x00, 26, 45, 0, 0, 8, 0xF7]);
        assert_eq!(*position.lock(), Some(-5786));
    }

    #[test]
    fn test_accel_stepper_simple_commands() {
        let (firmata, transport) = create_test_firmata();
        firmata.accel_stepper_zero(3).unwrap();
        firmata.accel_stepper_enable(3, true).unwrap();
        firmata.accel_stepper_stop(3).unwrap();
        firmata.accel_stepper_speed(3, 100.0).unwrap();
        firmata.accel_stepper_acceleration(3, 0.0).unwrap();
        assert_eq!(
            transport.writes(),
            vec![
                vec![0xF0, 0x62, 0x01, 0x03, 0xF7],
                vec![0xF0, 0x62, 0x04, 0x03, 0x01, 0xF7],
                vec![0xF0, 0x62, 0x05, 0x03, 0xF7],
                vec![0xF0, 0x62, 0x09, 0x03, 1, 0, 0, 52, 0xF7],
                vec![0xF0, 0x62, 0x08, 0x03, 0, 0, 0, 0, 0xF7],
            ]
        );
    }

    #[test]
    fn test_accel_stepper_report_position() {
        let (firmata, transport) = create_test_firmata();
        let position = Arc::new(Mutex::new(None));
        let clone = position.clone();
        firmata
            .accel_stepper_report_position(1, move |p: i32| *clone.lock() = Some(p))
            .unwrap();
        assert_eq!(transport.written(), vec![0xF0, 0x62, 0x06, 0x01, 0xF7]);

        firmata.receive(&[0xF0, 0x62, 0x06, 0x02, 26, 45, 0, 0, 0, 0xF7]);
        assert_eq!(*position.lock(), None);
        firmata.receive(&[0xF0, 0x62, 0x06, 0x01, 26, 45, 0, 0, 0, 0xF7]);
        assert_eq!(*position.lock(), Some(5786));
    }

    #[test]
    fn test_multi_stepper() {
        let (firmata, transport) = create_test_firmata();
        let done = Arc::new(Mutex::new(false));
        let clone = done.clone();
        firmata.multi_stepper_config(2, &[0, 1]).unwrap();
        firmata
            .multi_stepper_to(2, &[5786, -5786], Some(move || *clone.lock() = true))
            .unwrap();
        firmata.multi_stepper_stop(2).unwrap();
        assert_eq!(
            transport.writes(),
            vec![
                vec![0xF0, 0x62, 0x20, 0x02, 0x00, 0x01, 0xF7],
                vec![0xF0, 0x62, 0x21, 0x02, 26, 45, 0, 0, 0, 26, 45, 0, 0, 8, 0xF7],
                vec![0xF0, 0x62, 0x23, 0x02, 0xF7],
            ]
        );

        firmata.receive(&[0xF0, 0x62, 0x24, 0x02, 0xF7]);
        assert!(*done.lock());
    }

    #[test]
    fn test_multi_stepper_invalid_group() {
        let (firmata, transport) = create_test_firmata();
        let result = firmata.multi_stepper_config(6, &[0]);
        assert_eq!(
            result.err().unwrap().to_string(),
            "Configuration error: Invalid stepper group number 6 (expected 0 to 5)."
        );
        assert!(firmata.multi_stepper_to(6, &[0], None::<fn()>).is_err());
        assert!(firmata.multi_stepper_stop(6).is_err());
        assert_eq!(
            firmata.multi_stepper_config(0, &[]).err().unwrap().to_string(),
            "Configuration error: Missing parameter 'devices'."
        );
        assert!(transport.written().is_empty());
    }
}
