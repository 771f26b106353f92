use embassy_time::{Duration, Ticker};
use embedded_hal::digital::InputPin;
use multipad_core::{Buttons, CanonicalInputEvent, DeviceId, DeviceKind, Transport};

use crate::input::traits::{InputError, InputSource};

/// Sampling interval for the pad pins.
pub const POLL_PERIOD: Duration = Duration::from_millis(2);

/// Button wired to each pad pin, in pin order.
///
/// # Pins
///
/// GPIO 2-13, each pulled up and shorted to ground by its switch:
/// up, down, left, right, B1-B4, L1, R1, select, start.
pub const PAD_PINS: [Buttons; 12] = [
    Buttons::DPAD_UP,
    Buttons::DPAD_DOWN,
    Buttons::DPAD_LEFT,
    Buttons::DPAD_RIGHT,
    Buttons::B1,
    Buttons::B2,
    Buttons::B3,
    Buttons::B4,
    Buttons::L1,
    Buttons::R1,
    Buttons::S1,
    Buttons::S2,
];

/// Directly wired pad (one switch per pin, active low).
///
/// Pins are sampled on a fixed tick; a state is reported once it reads the
/// same on two consecutive samples and differs from the last report.
pub struct GpioPadInput<P, const N: usize> {
    pins: [P; N],
    map: [Buttons; N],
    device_id: DeviceId,
    ticker: Ticker,
    candidate: Buttons,
    reported: Option<Buttons>,
}

impl<P: InputPin, const N: usize> GpioPadInput<P, N> {
    /// Create a pad input; `map[i]` is the button wired to `pins[i]`.
    pub fn new(pins: [P; N], map: [Buttons; N], device_id: DeviceId) -> Self {
        Self {
            pins,
            map,
            device_id,
            ticker: Ticker::every(POLL_PERIOD),
            candidate: Buttons::NONE,
            reported: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    /// Read every pin into a canonical mask.
    fn sample(&mut self) -> Result<Buttons, InputError> {
        // Native convention: a set bit is a released switch.
        let mut raw = u32::MAX;
        for (pin, button) in self.pins.iter_mut().zip(self.map.iter()) {
            if pin.is_low().map_err(|_| InputError::Io)? {
                raw &= !button.raw();
            }
        }
        Ok(Buttons::from_active_low(raw))
    }
}

impl<P: InputPin, const N: usize> InputSource for GpioPadInput<P, N> {
    async fn receive(&mut self) -> Result<CanonicalInputEvent, InputError> {
        loop {
            self.ticker.next().await;
            let sample = self.sample()?;

            if sample != self.candidate {
                self.candidate = sample;
                continue;
            }
            if self.reported == Some(sample) {
                continue;
            }

            self.reported = Some(sample);
            return Ok(
                CanonicalInputEvent::neutral(self.device_id, Transport::Gpio, DeviceKind::Gamepad)
                    .with_buttons(sample),
            );
        }
    }

    fn is_connected(&self) -> bool {
        // Wired pads cannot be unplugged.
        true
    }
}
