//! Poll-loop context: owns the router, profiles, hotkeys and feedback, and
//! produces one [`OutputFrame`] per cycle for the real-time consumer.

use embassy_time::{Duration, Instant};
use heapless::Vec;

use crate::event::{Buttons, CanonicalInputEvent};
use crate::feedback::{FeedbackIndicator, FeedbackState};
use crate::hotkey::{HotkeyAction, HotkeyDefinition, HotkeyFired, HotkeyService, Trigger};
use crate::players::{AllocationPolicy, InstanceSelector, MAX_PLAYERS};
use crate::profile::{ProfileCatalog, ProfileSystem};
use crate::router::Router;
use crate::settings::{Settings, SettingsStore};
use crate::target::{OutputTarget, RoutingMode};

/// Hold time for the built-in profile hotkeys.
pub const PROFILE_HOTKEY_HOLD: Duration = Duration::from_secs(2);

/// Hotkey firings reported back from one [`InputContext::task`] call.
pub const MAX_FIRED_PER_CYCLE: usize = 16;

/// Everything a console encoder needs for one cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputFrame {
    pub target: OutputTarget,
    /// Processed (routed + profiled) view per console port.
    pub ports: [Option<CanonicalInputEvent>; MAX_PLAYERS],
    /// Feedback to drive per player, indicator overrides applied.
    pub feedback: [FeedbackState; MAX_PLAYERS],
    /// Incremented once per poll-loop cycle.
    pub sequence: u32,
}

impl OutputFrame {
    pub const EMPTY: Self = Self {
        target: OutputTarget::UsbDevice,
        ports: [None; MAX_PLAYERS],
        feedback: [FeedbackState::OFF; MAX_PLAYERS],
        sequence: 0,
    };
}

impl Default for OutputFrame {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// The state owned by the poll loop.
#[derive(Debug, Clone)]
pub struct InputContext {
    target: OutputTarget,
    router: Router,
    profiles: ProfileSystem,
    hotkeys: HotkeyService,
    indicator: FeedbackIndicator,
    /// Feedback requested by the console/host per player.
    feedback: [FeedbackState; MAX_PLAYERS],
    sequence: u32,
}

impl InputContext {
    /// Build from persisted settings (use `Settings::default()` if none).
    #[must_use]
    pub fn new(catalog: &'static ProfileCatalog, settings: Settings) -> Self {
        let target = OutputTarget::from_index(settings.output_mode).unwrap_or(OutputTarget::UsbDevice);
        info!("output target {:?}", target);
        Self {
            target,
            router: Router::for_target(target),
            profiles: ProfileSystem::new(catalog, settings),
            hotkeys: HotkeyService::new(),
            indicator: FeedbackIndicator::new(),
            feedback: [FeedbackState::OFF; MAX_PLAYERS],
            sequence: 0,
        }
    }

    /// Install Select+Start+Right / Select+Start+Left (held) to cycle
    /// profiles.
    #[must_use]
    pub fn with_default_hotkeys(mut self) -> Self {
        let combo = Buttons::S1 | Buttons::S2;
        for (direction, action) in [
            (Buttons::DPAD_RIGHT, HotkeyAction::NextProfile),
            (Buttons::DPAD_LEFT, HotkeyAction::PreviousProfile),
        ] {
            let def = HotkeyDefinition::new(combo | direction, PROFILE_HOTKEY_HOLD, Trigger::OnHold, action);
            if let Err(e) = self.hotkeys.register(def) {
                warn!("default hotkey not installed: {:?}", e);
            }
        }
        self
    }

    #[inline]
    #[must_use]
    pub fn target(&self) -> OutputTarget {
        self.target
    }

    #[inline]
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    #[inline]
    #[must_use]
    pub fn profiles(&self) -> &ProfileSystem {
        &self.profiles
    }

    #[inline]
    pub fn hotkeys_mut(&mut self) -> &mut HotkeyService {
        &mut self.hotkeys
    }

    #[inline]
    #[must_use]
    pub fn indicator(&self) -> &FeedbackIndicator {
        &self.indicator
    }

    /// Feed one decoded report.
    pub fn submit_input(&mut self, event: &CanonicalInputEvent) {
        let Some(index) = self.router.submit_input(event) else {
            return;
        };
        let active = self.profiles.get_active(self.target);
        if let Some(slot) = self.router.players_mut().get_mut(index) {
            slot.profile_cursor = active;
        }
        self.hotkeys.reset_player(index);
    }

    /// A device (or one of its interfaces) went away.
    pub fn device_removed(&mut self, address: u8, selector: InstanceSelector) {
        let removed = self.router.device_removed(address, selector);
        if removed.is_empty() {
            return;
        }
        // Shift renumbers survivors; their timers follow them.
        let compact = self.router.players().policy() == AllocationPolicy::Shift;
        self.hotkeys.remove_players(&removed, compact);
    }

    /// Feedback the console or host asked for on `player_index`.
    pub fn set_feedback(&mut self, player_index: usize, state: FeedbackState) {
        if let Some(slot) = self.feedback.get_mut(player_index) {
            *slot = state;
        }
    }

    /// Switch the console being driven; persisted with the usual debounce.
    pub fn set_output_target(&mut self, target: OutputTarget, now: Instant) {
        if target == self.target {
            return;
        }
        self.target = target;
        if self.router.set_policy(target.config().policy) {
            self.hotkeys.reset_all_players();
        }
        self.profiles.set_output_mode(target, now);

        let active = self.profiles.get_active(target);
        for slot in self.router.players_mut().iter_mut() {
            slot.profile_cursor = active;
        }
        info!("output target {:?}", target);
    }

    /// One poll-loop cycle: decay transforms, evaluate hotkeys, advance the
    /// indicator and persist settings when due.
    ///
    /// Returns the `Custom` hotkeys that fired; profile actions are handled
    /// here.
    pub fn task<S: SettingsStore>(
        &mut self,
        now: Instant,
        store: &mut S,
    ) -> Vec<HotkeyFired, MAX_FIRED_PER_CYCLE> {
        self.router.task(now);

        let mut fired: Vec<HotkeyFired, MAX_FIRED_PER_CYCLE> = Vec::new();
        let mut push = |f: HotkeyFired| {
            if fired.push(f).is_err() {
                warn!("hotkey firing dropped");
            }
        };

        let held: Vec<(u8, Buttons), MAX_PLAYERS> = self
            .router
            .players()
            .iter()
            .map(|slot| (slot.slot_index(), slot.buttons()))
            .collect();
        for &(player, buttons) in &held {
            self.hotkeys.check(buttons, player, now, &mut push);
        }
        self.hotkeys.check_global(now, &mut push);

        let mut custom = Vec::new();
        for f in fired {
            match f.action {
                HotkeyAction::NextProfile => self.switch_profile(f.player, true, now),
                HotkeyAction::PreviousProfile => self.switch_profile(f.player, false, now),
                HotkeyAction::Custom(_) => {
                    // Same capacity as `fired`.
                    let _ = custom.push(f);
                }
            }
        }

        self.indicator.task(now);
        self.profiles.task(now, store);
        self.router.end_frame();
        self.sequence = self.sequence.wrapping_add(1);
        custom
    }

    fn switch_profile(&mut self, player: Option<u8>, forward: bool, now: Instant) {
        let target = self.target;
        let current = player
            .and_then(|p| self.router.players().get(usize::from(p)))
            .map_or(self.profiles.get_active(target), |slot| slot.profile_cursor);
        self.profiles.set_active(target, current, now);

        let count = self.router.players().count() as u8;
        let next = if forward {
            self.profiles.switch_next(target, now, &mut self.indicator, player, count)
        } else {
            self.profiles.switch_prev(target, now, &mut self.indicator, player, count)
        };

        for slot in self.router.players_mut().iter_mut() {
            if player.map_or(true, |p| p == slot.slot_index()) {
                slot.profile_cursor = next;
            }
        }
    }

    /// Current output for every port of the active target.
    #[must_use]
    pub fn frame(&self) -> OutputFrame {
        let target = self.target;
        let config = target.config();
        let mut frame = OutputFrame {
            target,
            sequence: self.sequence,
            ..OutputFrame::EMPTY
        };

        let ports = usize::from(config.ports).min(MAX_PLAYERS);
        for (port, out) in frame.ports.iter_mut().enumerate().take(ports) {
            let Some(view) = self.router.get_output(target, port) else {
                continue;
            };
            let profile = match config.mode {
                RoutingMode::Merge => self.profiles.get_active(target),
                RoutingMode::PerPlayer => self
                    .router
                    .players()
                    .get(port)
                    .map_or(self.profiles.get_active(target), |slot| slot.profile_cursor),
            };
            *out = Some(self.profiles.apply(target, profile, &view));
        }

        for (player, out) in frame.feedback.iter_mut().enumerate() {
            *out = self.indicator.resolve(player as u8, self.feedback[player]);
        }
        frame
    }

    /// Write any pending settings now.
    pub fn shutdown<S: SettingsStore>(&mut self, store: &mut S) {
        self.profiles.flush(store);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DeviceId, DeviceKind, Transport};
    use crate::feedback::INDICATOR_RUMBLE;
    use crate::profile::DEFAULT_CATALOG;
    use crate::settings::MemoryStore;
    use crate::snapshot::SnapshotCell;

    fn pad(address: u8, buttons: Buttons) -> CanonicalInputEvent {
        CanonicalInputEvent::neutral(DeviceId::new(address, 0), Transport::Usb, DeviceKind::Gamepad)
            .with_buttons(buttons)
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    fn context() -> InputContext {
        InputContext::new(&DEFAULT_CATALOG, Settings::default()).with_default_hotkeys()
    }

    #[test]
    fn test_frame_reflects_input() {
        let mut ctx = context();
        let mut store = MemoryStore::new();
        assert_eq!(ctx.frame().ports, [None; MAX_PLAYERS]);

        ctx.submit_input(&pad(1, Buttons::B1));
        ctx.task(at(0), &mut store);
        let frame = ctx.frame();
        assert_eq!(frame.target, OutputTarget::UsbDevice);
        assert_eq!(frame.ports[0].map(|e| e.buttons), Some(Buttons::B1));
        assert_eq!(frame.ports[1], None);
        assert_eq!(frame.sequence, 1);
    }

    #[test]
    fn test_hold_combo_switches_profile_and_blinks() {
        let mut ctx = context();
        let mut store = MemoryStore::new();
        let normal = FeedbackState {
            led: FeedbackState::player_led(0),
            ..FeedbackState::OFF
        };
        ctx.set_feedback(0, normal);

        let combo = Buttons::S1 | Buttons::S2 | Buttons::DPAD_RIGHT;
        ctx.submit_input(&pad(1, combo));
        for ms in (0..2_000).step_by(100) {
            ctx.task(at(ms), &mut store);
        }
        assert_eq!(ctx.profiles().get_active(OutputTarget::UsbDevice), 0);

        ctx.task(at(2_000), &mut store);
        assert_eq!(ctx.profiles().get_active(OutputTarget::UsbDevice), 1);
        assert!(ctx.indicator().is_active());
        assert_eq!(ctx.frame().feedback[0], FeedbackState::OFF);

        ctx.task(at(2_200), &mut store);
        assert_eq!(ctx.frame().feedback[0].rumble_left, INDICATOR_RUMBLE);

        // Swap-face profile now applies to this player.
        ctx.submit_input(&pad(1, Buttons::B1));
        ctx.task(at(2_300), &mut store);
        assert_eq!(ctx.frame().ports[0].map(|e| e.buttons), Some(Buttons::B2));

        assert_eq!(store.writes(), 0);
        ctx.task(at(7_000), &mut store);
        assert_eq!(store.writes(), 1);
        assert_eq!(store.load().unwrap().active_profile[OutputTarget::UsbDevice.index()], 1);

        // Indicator done: normal feedback is back.
        ctx.task(at(7_200), &mut store);
        assert_eq!(ctx.frame().feedback[0], normal);
    }

    #[test]
    fn test_custom_hotkeys_are_returned() {
        let mut ctx = context();
        let mut store = MemoryStore::new();
        ctx.hotkeys_mut()
            .register(HotkeyDefinition::new(
                Buttons::GUIDE,
                Duration::from_millis(500),
                Trigger::OnTap,
                HotkeyAction::Custom(3),
            ))
            .unwrap();

        ctx.submit_input(&pad(1, Buttons::GUIDE));
        assert!(ctx.task(at(0), &mut store).is_empty());
        ctx.submit_input(&pad(1, Buttons::NONE));
        let fired = ctx.task(at(100), &mut store);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].action, HotkeyAction::Custom(3));
        assert_eq!(fired[0].player, Some(0));
    }

    #[test]
    fn test_output_target_change_is_persisted_on_shutdown() {
        let mut ctx = context();
        let mut store = MemoryStore::new();
        ctx.submit_input(&pad(1, Buttons::B1));

        ctx.set_output_target(OutputTarget::PcEngine, at(0));
        // Fixed -> Shift: the table was rebuilt.
        assert_eq!(ctx.router().players().count(), 0);
        ctx.shutdown(&mut store);
        assert_eq!(store.writes(), 1);

        let restored = InputContext::new(&DEFAULT_CATALOG, store.load().unwrap());
        assert_eq!(restored.target(), OutputTarget::PcEngine);
    }

    #[test]
    fn test_merge_target_uses_single_port() {
        let mut ctx = InputContext::new(
            &DEFAULT_CATALOG,
            Settings {
                output_mode: OutputTarget::GameCube.index() as u8,
                ..Settings::default()
            },
        );
        let mut store = MemoryStore::new();
        ctx.submit_input(&pad(1, Buttons::B1));
        ctx.submit_input(&pad(2, Buttons::B2));
        ctx.task(at(0), &mut store);

        let frame = ctx.frame();
        assert_eq!(frame.ports[0].map(|e| e.buttons), Some(Buttons::B1 | Buttons::B2));
        assert_eq!(frame.ports[1], None);
    }

    #[test]
    fn test_removed_player_leaves_port_empty() {
        let mut ctx = context();
        let mut store = MemoryStore::new();
        ctx.submit_input(&pad(1, Buttons::B1));
        ctx.submit_input(&pad(2, Buttons::B2));
        ctx.device_removed(1, InstanceSelector::All);
        ctx.task(at(0), &mut store);

        // UsbDevice keeps indices stable.
        let frame = ctx.frame();
        assert_eq!(frame.ports[0], None);
        assert_eq!(frame.ports[1].map(|e| e.buttons), Some(Buttons::B2));
    }

    #[test]
    fn test_hold_survives_other_player_leaving() {
        let settings = Settings {
            output_mode: OutputTarget::PcEngine.index() as u8,
            ..Settings::default()
        };
        let mut ctx = InputContext::new(&DEFAULT_CATALOG, settings).with_default_hotkeys();
        let mut store = MemoryStore::new();

        ctx.submit_input(&pad(1, Buttons::B1));
        ctx.submit_input(&pad(2, Buttons::S1 | Buttons::S2 | Buttons::DPAD_RIGHT));
        for ms in (0..1_000).step_by(100) {
            ctx.task(at(ms), &mut store);
        }

        // Player 1 leaves; player 2 moves to the first port mid-hold.
        ctx.device_removed(1, InstanceSelector::All);
        for ms in (1_000..=2_000).step_by(100) {
            ctx.task(at(ms), &mut store);
        }
        assert_eq!(ctx.profiles().get_active(OutputTarget::PcEngine), 1);
        assert_eq!(ctx.router().players().get(0).unwrap().profile_cursor, 1);
    }

    #[test]
    fn test_frames_flow_through_snapshot_cell() {
        let cell = SnapshotCell::new(OutputFrame::EMPTY);
        let (mut publisher, mut reader) = cell.split().unwrap();
        let mut ctx = context();
        let mut store = MemoryStore::new();

        ctx.submit_input(&pad(1, Buttons::S2));
        ctx.task(at(0), &mut store);
        publisher.publish(ctx.frame());

        let frame = reader.latest();
        assert_eq!(frame.sequence, 1);
        assert_eq!(frame.ports[0].map(|e| e.buttons), Some(Buttons::S2));
    }
}
