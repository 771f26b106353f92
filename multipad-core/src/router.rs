//! Single ingestion point for decoded device reports.
//!
//! The router is a last-value store: it keeps exactly one event per device
//! and computes, on demand, what an output target should see. It never
//! queues; a new report replaces the previous one.

use embassy_time::{Duration, Instant};
use fixed::types::I16F16;
use fixed_macro::fixed;
use heapless::Vec;

use crate::event::{
    Analog, AnalogAxis, Buttons, CanonicalInputEvent, DeviceId, DeviceKind, ANALOG_CENTER,
    ANALOG_CHANNELS,
};
use crate::players::{AllocationPolicy, InstanceSelector, PlayerManager, PlayerError, MAX_PLAYERS};
use crate::target::{OutputTarget, RoutingMode};

/// Upper bound on devices with a stored event.
pub const MAX_DEVICES: usize = 16;

/// Interval between mouse accumulator decay steps.
pub const MOUSE_DECAY_PERIOD: Duration = Duration::from_millis(10);

/// Fraction of the accumulated deflection kept per decay step.
pub const MOUSE_DECAY: I16F16 = fixed!(0.75: I16F16);

/// Stick steps per pointer count.
pub const MOUSE_GAIN: I16F16 = fixed!(0.5: I16F16);

const STICK_LIMIT: I16F16 = fixed!(127: I16F16);

/// Relative pointer motion integrated into a stick position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct PointerStick {
    x: I16F16,
    y: I16F16,
}

impl PointerStick {
    fn accumulate(&mut self, dx: i16, dy: i16) {
        self.x = Self::step(self.x, dx);
        self.y = Self::step(self.y, dy);
    }

    fn step(current: I16F16, delta: i16) -> I16F16 {
        let delta = I16F16::from_num(delta).saturating_mul(MOUSE_GAIN);
        current
            .saturating_add(delta)
            .clamp(-STICK_LIMIT, STICK_LIMIT)
    }

    /// Pull both axes toward center; snaps to zero below one step.
    fn decay(&mut self) {
        for value in [&mut self.x, &mut self.y] {
            let next = value.saturating_mul(MOUSE_DECAY);
            *value = if next.abs() < I16F16::ONE {
                I16F16::ZERO
            } else {
                next
            };
        }
    }

    fn is_centered(&self) -> bool {
        self.x == I16F16::ZERO && self.y == I16F16::ZERO
    }

    fn to_axis(value: I16F16) -> u8 {
        let offset = value.round().to_num::<i32>();
        (i32::from(ANALOG_CENTER) + offset).clamp(0, i32::from(u8::MAX)) as u8
    }
}

#[derive(Clone, Copy, Debug)]
struct DeviceEntry {
    event: CanonicalInputEvent,
    stick: PointerStick,
}

/// Last-value store plus the player table.
#[derive(Debug, Clone)]
pub struct Router {
    players: PlayerManager,
    devices: Vec<DeviceEntry, MAX_DEVICES>,
    /// Device that most recently moved each axis off rest (merge mode).
    axis_owner: [Option<DeviceId>; ANALOG_CHANNELS],
    last_decay: Option<Instant>,
}

impl Router {
    #[must_use]
    pub const fn new(policy: AllocationPolicy) -> Self {
        Self {
            players: PlayerManager::new(policy),
            devices: Vec::new(),
            axis_owner: [None; ANALOG_CHANNELS],
            last_decay: None,
        }
    }

    /// Router configured for `target`'s allocation policy.
    #[must_use]
    pub const fn for_target(target: OutputTarget) -> Self {
        Self::new(target.config().policy)
    }

    #[inline]
    #[must_use]
    pub fn players(&self) -> &PlayerManager {
        &self.players
    }

    #[inline]
    pub fn players_mut(&mut self) -> &mut PlayerManager {
        &mut self.players
    }

    /// Switch allocation policy. Existing slots are dropped when it changes;
    /// devices claim new slots on their next non-idle report.
    ///
    /// Returns `true` if the player table was reset.
    pub fn set_policy(&mut self, policy: AllocationPolicy) -> bool {
        if self.players.policy() == policy {
            return false;
        }
        info!("allocation policy now {:?}, players reset", policy);
        self.players = PlayerManager::new(policy);
        true
    }

    /// Store `event` as the device's current state.
    ///
    /// A device without a slot gets one on its first non-idle report. The
    /// secondary interface of a composite device feeds its owner's alternate
    /// buttons instead. Returns the index of a newly allocated slot.
    pub fn submit_input(&mut self, event: &CanonicalInputEvent) -> Option<usize> {
        let id = event.device_id;

        if id.is_extra() {
            if self.players.set_alternate(id.address, event.buttons).is_none() {
                trace!("composite interface {} has no player yet", id.address);
            }
            return None;
        }

        let entry = match self.devices.iter().position(|d| d.event.device_id == id) {
            Some(pos) => {
                self.devices[pos].event = *event;
                &mut self.devices[pos]
            }
            None => {
                let entry = DeviceEntry {
                    event: *event,
                    stick: PointerStick::default(),
                };
                if self.devices.push(entry).is_err() {
                    warn!("device table full, dropping {}:{}", id.address, id.instance);
                    return None;
                }
                let last = self.devices.len() - 1;
                &mut self.devices[last]
            }
        };

        if let Some(pointer) = event.pointer {
            entry.stick.accumulate(pointer.dx, pointer.dy);
        }
        let view = Self::pointer_view(entry);

        // Any pointer motion steers the stick, however small.
        let pointer_moved = event.kind == DeviceKind::Mouse
            && event.pointer.is_some_and(|p| p.dx != 0 || p.dy != 0);
        for axis in AnalogAxis::ALL {
            let steered = pointer_moved && matches!(axis, AnalogAxis::LeftX | AnalogAxis::LeftY);
            if steered || axis.is_active(view.analog[axis]) {
                self.axis_owner[axis.index()] = Some(id);
            }
        }

        if let Some(index) = self.players.find(id) {
            self.players.update(index, event);
            return None;
        }

        if view.is_idle() {
            return None;
        }

        match self.players.add(event, 0) {
            Ok(index) => Some(index),
            Err(PlayerError::Full) => {
                warn!("player table full, {}:{} not assigned", id.address, id.instance);
                None
            }
            Err(PlayerError::Duplicate) => None,
        }
    }

    /// Forget devices at `address` matching `selector`.
    ///
    /// Returns the slot indices that were released, as they were numbered
    /// before removal.
    pub fn device_removed(
        &mut self,
        address: u8,
        selector: InstanceSelector,
    ) -> Vec<usize, MAX_PLAYERS> {
        self.devices
            .retain(|d| !selector.matches(address, d.event.device_id));
        for owner in self.axis_owner.iter_mut() {
            if owner.is_some_and(|id| selector.matches(address, id)) {
                *owner = None;
            }
        }
        self.players.remove(address, selector)
    }

    /// View `target` should present on `player_index`.
    ///
    /// Merge targets ignore `player_index` and fold every assigned device into
    /// one controller; connected devices that never left rest fold to a
    /// released controller. Per-player targets return `None` for an empty
    /// slot, merge targets only when no device is connected.
    #[must_use]
    pub fn get_output(&self, target: OutputTarget, player_index: usize) -> Option<CanonicalInputEvent> {
        let config = target.config();
        match config.mode {
            RoutingMode::Merge => self.merged(config.transforms.mouse_to_analog),
            RoutingMode::PerPlayer => {
                let slot = self.players.get(player_index)?;
                let mut view = slot.event();
                if config.transforms.mouse_to_analog {
                    if let Some(entry) = self.entry(slot.device_id()) {
                        view.analog = Self::pointer_view(entry).analog;
                    }
                }
                Some(view)
            }
        }
    }

    fn merged(&self, mouse_to_analog: bool) -> Option<CanonicalInputEvent> {
        let mut merged = match self.players.iter().next() {
            Some(first) => first.event(),
            None => self.devices.first()?.event,
        };
        merged.buttons = self
            .players
            .iter()
            .fold(Buttons::NONE, |acc, slot| acc | slot.buttons());
        merged.analog = Analog::NEUTRAL;
        merged.pointer = None;

        for axis in AnalogAxis::ALL {
            let Some(owner) = self.axis_owner[axis.index()] else {
                continue;
            };
            if self.players.find(owner).is_none() {
                continue;
            }
            if let Some(entry) = self.entry(owner) {
                let analog = if mouse_to_analog {
                    Self::pointer_view(entry).analog
                } else {
                    entry.event.analog
                };
                merged.analog[axis] = analog[axis];
            }
        }

        Some(merged)
    }

    fn entry(&self, id: DeviceId) -> Option<&DeviceEntry> {
        self.devices.iter().find(|d| d.event.device_id == id)
    }

    /// The device's event with mouse motion mapped onto the left stick.
    fn pointer_view(entry: &DeviceEntry) -> CanonicalInputEvent {
        let mut view = entry.event;
        if view.kind == DeviceKind::Mouse {
            view.analog[AnalogAxis::LeftX] = PointerStick::to_axis(entry.stick.x);
            view.analog[AnalogAxis::LeftY] = PointerStick::to_axis(entry.stick.y);
        }
        view
    }

    /// Periodic work: decays mouse accumulators back toward center.
    pub fn task(&mut self, now: Instant) {
        let last = *self.last_decay.get_or_insert(now);
        if now.saturating_duration_since(last) < MOUSE_DECAY_PERIOD {
            return;
        }
        self.last_decay = Some(now);

        for entry in self.devices.iter_mut() {
            if !entry.stick.is_centered() {
                entry.stick.decay();
            }
        }
    }

    /// Close the current frame for edge detection.
    pub fn end_frame(&mut self) {
        self.players.end_frame();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{PointerDelta, Transport};

    fn pad(address: u8, buttons: Buttons) -> CanonicalInputEvent {
        CanonicalInputEvent::neutral(DeviceId::new(address, 0), Transport::Usb, DeviceKind::Gamepad)
            .with_buttons(buttons)
    }

    fn mouse(address: u8, dx: i16, dy: i16) -> CanonicalInputEvent {
        let mut event =
            CanonicalInputEvent::neutral(DeviceId::new(address, 0), Transport::Usb, DeviceKind::Mouse)
                .with_buttons(Buttons::B1);
        event.pointer = Some(PointerDelta { dx, dy, wheel: 0 });
        event
    }

    #[test]
    fn test_no_devices_yields_none() {
        let router = Router::for_target(OutputTarget::GameCube);
        assert_eq!(router.get_output(OutputTarget::GameCube, 0), None);
        assert_eq!(router.get_output(OutputTarget::UsbDevice, 0), None);
    }

    #[test]
    fn test_idle_report_does_not_allocate() {
        let mut router = Router::for_target(OutputTarget::UsbDevice);
        assert_eq!(router.submit_input(&pad(1, Buttons::NONE)), None);
        assert_eq!(router.players().count(), 0);
        assert_eq!(router.submit_input(&pad(1, Buttons::S2)), Some(0));
        assert_eq!(router.players().count(), 1);
    }

    #[test]
    fn test_merge_of_idle_devices_is_released() {
        let mut router = Router::for_target(OutputTarget::Nuon);
        for address in 1..=4 {
            router.submit_input(&pad(address, Buttons::B1));
        }
        for address in 1..=4 {
            router.submit_input(&pad(address, Buttons::NONE));
        }

        let merged = router.get_output(OutputTarget::Nuon, 0).unwrap();
        assert!(merged.buttons.is_empty());
        assert_eq!(merged.analog, Analog::NEUTRAL);
    }

    #[test]
    fn test_merge_of_never_pressed_devices_is_released() {
        let mut router = Router::for_target(OutputTarget::GameCube);
        for address in 1..=3 {
            router.submit_input(&pad(address, Buttons::NONE));
        }
        assert_eq!(router.players().count(), 0);

        let merged = router.get_output(OutputTarget::GameCube, 0).unwrap();
        assert!(merged.buttons.is_empty());
        assert_eq!(merged.analog, Analog::NEUTRAL);

        for address in 1..=3 {
            router.device_removed(address, InstanceSelector::All);
        }
        assert_eq!(router.get_output(OutputTarget::GameCube, 0), None);
    }

    #[test]
    fn test_merge_presses_if_any_device_presses() {
        let mut router = Router::for_target(OutputTarget::GameCube);
        router.submit_input(&pad(1, Buttons::B1));
        router.submit_input(&pad(2, Buttons::S2));
        let merged = router.get_output(OutputTarget::GameCube, 3).unwrap();
        assert_eq!(merged.buttons, Buttons::B1 | Buttons::S2);
    }

    #[test]
    fn test_merge_analog_follows_latest_mover() {
        let mut router = Router::for_target(OutputTarget::GameCube);
        router.submit_input(&pad(1, Buttons::NONE).with_axis(AnalogAxis::LeftX, 10));
        router.submit_input(&pad(2, Buttons::NONE).with_axis(AnalogAxis::LeftX, 250));
        let merged = router.get_output(OutputTarget::GameCube, 0).unwrap();
        assert_eq!(merged.analog[AnalogAxis::LeftX], 250);

        // Device 1 moves again and takes the axis back.
        router.submit_input(&pad(1, Buttons::NONE).with_axis(AnalogAxis::LeftX, 5));
        let merged = router.get_output(OutputTarget::GameCube, 0).unwrap();
        assert_eq!(merged.analog[AnalogAxis::LeftX], 5);

        // Owner unplugged: axis returns to rest.
        router.device_removed(1, InstanceSelector::All);
        let merged = router.get_output(OutputTarget::GameCube, 0).unwrap();
        assert_eq!(merged.analog[AnalogAxis::LeftX], ANALOG_CENTER);
    }

    #[test]
    fn test_per_player_returns_slot_or_none() {
        let mut router = Router::for_target(OutputTarget::PcEngine);
        router.submit_input(&pad(1, Buttons::B1));
        router.submit_input(&pad(2, Buttons::B2));

        let p2 = router.get_output(OutputTarget::PcEngine, 1).unwrap();
        assert_eq!(p2.device_id, DeviceId::new(2, 0));
        assert_eq!(p2.buttons, Buttons::B2);
        assert_eq!(router.get_output(OutputTarget::PcEngine, 2), None);
    }

    #[test]
    fn test_last_value_replaces_previous() {
        let mut router = Router::for_target(OutputTarget::PcEngine);
        router.submit_input(&pad(1, Buttons::B1));
        router.submit_input(&pad(1, Buttons::B3));
        let view = router.get_output(OutputTarget::PcEngine, 0).unwrap();
        assert_eq!(view.buttons, Buttons::B3);
    }

    #[test]
    fn test_full_table_stores_but_does_not_route() {
        let mut router = Router::for_target(OutputTarget::ThreeDo);
        for address in 0..MAX_PLAYERS as u8 {
            assert!(router.submit_input(&pad(address, Buttons::B1)).is_some());
        }
        assert_eq!(router.submit_input(&pad(0x30, Buttons::B1)), None);

        // A slot frees up; the next report from the waiting pad claims it.
        router.device_removed(0, InstanceSelector::All);
        assert_eq!(router.submit_input(&pad(0x30, Buttons::B1)), Some(MAX_PLAYERS - 1));
    }

    #[test]
    fn test_composite_interface_joins_owner() {
        let mut router = Router::for_target(OutputTarget::UsbDevice);
        router.submit_input(&pad(4, Buttons::B1));
        let mut extra = pad(4, Buttons::GUIDE);
        extra.device_id = DeviceId::extra(4);
        assert_eq!(router.submit_input(&extra), None);

        assert_eq!(router.players().count(), 1);
        let view = router.get_output(OutputTarget::UsbDevice, 0).unwrap();
        assert_eq!(view.buttons, Buttons::B1 | Buttons::GUIDE);
    }

    #[test]
    fn test_early_composite_report_does_not_stick_on_player_one() {
        let mut router = Router::for_target(OutputTarget::PcEngine);
        router.submit_input(&pad(1, Buttons::B1));

        let mut extra = pad(2, Buttons::L1);
        extra.device_id = DeviceId::extra(2);
        router.submit_input(&extra);
        assert_eq!(router.submit_input(&pad(2, Buttons::B2)), Some(1));

        extra.buttons = Buttons::NONE;
        router.submit_input(&extra);
        router.submit_input(&pad(2, Buttons::NONE));
        router.submit_input(&pad(1, Buttons::NONE));

        let p1 = router.get_output(OutputTarget::PcEngine, 0).unwrap();
        assert!(p1.buttons.is_empty());
        let p2 = router.get_output(OutputTarget::PcEngine, 1).unwrap();
        assert!(p2.buttons.is_empty());
    }

    #[test]
    fn test_mouse_motion_drives_left_stick_and_decays() {
        let mut router = Router::for_target(OutputTarget::GameCube);
        router.submit_input(&mouse(3, 40, -40));

        let merged = router.get_output(OutputTarget::GameCube, 0).unwrap();
        assert_eq!(merged.analog[AnalogAxis::LeftX], ANALOG_CENTER + 20);
        assert_eq!(merged.analog[AnalogAxis::LeftY], ANALOG_CENTER - 20);

        let mut now = 0;
        router.task(Instant::from_millis(now));
        for _ in 0..20 {
            now += 10;
            router.task(Instant::from_millis(now));
        }
        let merged = router.get_output(OutputTarget::GameCube, 0).unwrap();
        assert_eq!(merged.analog[AnalogAxis::LeftX], ANALOG_CENTER);
        assert_eq!(merged.analog[AnalogAxis::LeftY], ANALOG_CENTER);
    }

    #[test]
    fn test_mouse_untouched_without_transform() {
        let mut router = Router::for_target(OutputTarget::PcEngine);
        router.submit_input(&mouse(3, 40, 40));
        let view = router.get_output(OutputTarget::PcEngine, 0).unwrap();
        assert_eq!(view.analog, Analog::NEUTRAL);
    }

    #[test]
    fn test_policy_change_resets_players() {
        let mut router = Router::new(AllocationPolicy::Shift);
        router.submit_input(&pad(1, Buttons::B1));
        assert!(!router.set_policy(AllocationPolicy::Shift));
        assert!(router.set_policy(AllocationPolicy::Fixed));
        assert_eq!(router.players().count(), 0);
    }
}
