//! Button/axis remapping profiles.
//!
//! A [`Profile`] is an ordered table of [`MapRule`]s. Applying it to a
//! canonical event is a pure function: the same event and table always give
//! the same output. The only state the [`ProfileSystem`] keeps is which
//! profile is active per output target, and that state is persisted with a
//! debounce so rapid cycling costs one flash write.

use embassy_time::Instant;
use fixed::types::I16F16;
use fixed_macro::fixed;

use crate::event::{AnalogAxis, Buttons, CanonicalInputEvent, ANALOG_CENTER};
use crate::feedback::FeedbackIndicator;
use crate::settings::{Debounce, Settings, SettingsStore};
use crate::target::OutputTarget;

/// Upper bound on rules evaluated per profile.
pub const MAX_RULES: usize = 32;

/// Where a rule sends its source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Destination {
    /// Press one output button, or fan out to several.
    Press(Buttons),
    /// Drop the source button.
    Disabled,
    /// Force an axis to `value` while the source is held.
    Axis { axis: AnalogAxis, value: u8 },
    /// Force an axis and press buttons together (e.g. a full-scale trigger
    /// plus its digital click).
    AxisWithButtons {
        axis: AnalogAxis,
        value: u8,
        buttons: Buttons,
    },
    /// Copy an input axis onto an output axis.
    AxisFrom {
        from: AnalogAxis,
        to: AnalogAxis,
        invert: bool,
    },
}

/// One mapping rule. `source: None` makes the rule unconditional (axis-only).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MapRule {
    pub source: Option<Buttons>,
    pub dest: Destination,
}

impl MapRule {
    #[must_use]
    pub const fn remap(source: Buttons, to: Buttons) -> Self {
        Self {
            source: Some(source),
            dest: Destination::Press(to),
        }
    }

    #[must_use]
    pub const fn disable(source: Buttons) -> Self {
        Self {
            source: Some(source),
            dest: Destination::Disabled,
        }
    }

    #[must_use]
    pub const fn axis(source: Buttons, axis: AnalogAxis, value: u8) -> Self {
        Self {
            source: Some(source),
            dest: Destination::Axis { axis, value },
        }
    }

    #[must_use]
    pub const fn axis_with_buttons(
        source: Buttons,
        axis: AnalogAxis,
        value: u8,
        buttons: Buttons,
    ) -> Self {
        Self {
            source: Some(source),
            dest: Destination::AxisWithButtons {
                axis,
                value,
                buttons,
            },
        }
    }

    #[must_use]
    pub const fn axis_from(from: AnalogAxis, to: AnalogAxis, invert: bool) -> Self {
        Self {
            source: None,
            dest: Destination::AxisFrom { from, to, invert },
        }
    }
}

/// Named remapping table for one output target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Profile {
    pub name: &'static str,
    pub rules: &'static [MapRule],
    /// Analog trigger level at which L2/R2 also read pressed.
    pub trigger_threshold: Option<u8>,
    /// Stick deflection multiplier around center.
    pub stick_scale: I16F16,
}

impl Profile {
    /// A profile that changes nothing.
    pub const PASSTHROUGH: Profile = Profile {
        name: "default",
        rules: &[],
        trigger_threshold: None,
        stick_scale: fixed!(1: I16F16),
    };

    /// Apply this profile to an event; see [`apply`].
    #[must_use]
    pub fn apply(&self, input: &CanonicalInputEvent) -> CanonicalInputEvent {
        apply(self, input)
    }
}

/// Map `input` through `profile`.
///
/// Source buttons named by any rule are removed from the passthrough set;
/// unmapped buttons pass unchanged. Rules run in table order and later rules
/// overwrite earlier axis values. Runs over at most [`MAX_RULES`] rules.
#[must_use]
pub fn apply(profile: &Profile, input: &CanonicalInputEvent) -> CanonicalInputEvent {
    let rules = &profile.rules[..profile.rules.len().min(MAX_RULES)];

    let mut pressed = input.buttons;
    if let Some(threshold) = profile.trigger_threshold {
        pressed.set(Buttons::L2, pressed.contains(Buttons::L2) || input.analog[AnalogAxis::LeftTrigger] >= threshold);
        pressed.set(Buttons::R2, pressed.contains(Buttons::R2) || input.analog[AnalogAxis::RightTrigger] >= threshold);
    }

    let consumed = rules
        .iter()
        .filter_map(|rule| rule.source)
        .fold(Buttons::NONE, |acc, source| acc | source);

    let mut output = *input;
    output.buttons = pressed & !consumed;
    for axis in [AnalogAxis::LeftX, AnalogAxis::LeftY, AnalogAxis::RightX, AnalogAxis::RightY] {
        output.analog[axis] = scale_stick(input.analog[axis], profile.stick_scale);
    }

    for rule in rules {
        if let Some(source) = rule.source {
            if !pressed.contains(source) {
                continue;
            }
        }

        match rule.dest {
            Destination::Press(buttons) => output.buttons |= buttons,
            Destination::Disabled => {}
            Destination::Axis { axis, value } => output.analog[axis] = value,
            Destination::AxisWithButtons {
                axis,
                value,
                buttons,
            } => {
                output.analog[axis] = value;
                output.buttons |= buttons;
            }
            Destination::AxisFrom { from, to, invert } => {
                let value = input.analog[from];
                output.analog[to] = if invert { u8::MAX - value } else { value };
            }
        }
    }

    output
}

fn scale_stick(value: u8, scale: I16F16) -> u8 {
    let offset = I16F16::from_num(i16::from(value) - i16::from(ANALOG_CENTER));
    let scaled = offset.saturating_mul(scale).round().to_num::<i32>();
    (scaled + i32::from(ANALOG_CENTER)).clamp(0, i32::from(u8::MAX)) as u8
}

const SWAP_FACE_RULES: [MapRule; 4] = [
    MapRule::remap(Buttons::B1, Buttons::B2),
    MapRule::remap(Buttons::B2, Buttons::B1),
    MapRule::remap(Buttons::B3, Buttons::B4),
    MapRule::remap(Buttons::B4, Buttons::B3),
];

/// Nintendo-style face layout on a Sony/Xbox-style pad.
pub const SWAP_FACE: Profile = Profile {
    name: "swap-face",
    rules: &SWAP_FACE_RULES,
    trigger_threshold: None,
    stick_scale: fixed!(1: I16F16),
};

const GC_SHOULDERS_RULES: [MapRule; 2] = [
    MapRule::axis_with_buttons(Buttons::L1, AnalogAxis::LeftTrigger, 255, Buttons::L2),
    MapRule::axis_with_buttons(Buttons::R1, AnalogAxis::RightTrigger, 255, Buttons::R2),
];

/// Bumpers act as fully pressed analog triggers (digital click included).
pub const GC_SHOULDER_TRIGGERS: Profile = Profile {
    name: "shoulder-triggers",
    rules: &GC_SHOULDERS_RULES,
    trigger_threshold: Some(200),
    stick_scale: fixed!(1: I16F16),
};

const DPAD_STICK_RULES: [MapRule; 4] = [
    MapRule::axis(Buttons::DPAD_LEFT, AnalogAxis::LeftX, 0),
    MapRule::axis(Buttons::DPAD_RIGHT, AnalogAxis::LeftX, 255),
    MapRule::axis(Buttons::DPAD_UP, AnalogAxis::LeftY, 0),
    MapRule::axis(Buttons::DPAD_DOWN, AnalogAxis::LeftY, 255),
];

/// D-pad drives the left stick (for games that ignore the d-pad).
pub const DPAD_AS_STICK: Profile = Profile {
    name: "dpad-stick",
    rules: &DPAD_STICK_RULES,
    trigger_threshold: None,
    stick_scale: fixed!(1: I16F16),
};

const PCE_RULES: [MapRule; 3] = [
    MapRule::remap(Buttons::B3, Buttons::B1),
    MapRule::remap(Buttons::B4, Buttons::B2),
    MapRule::remap(Buttons::GUIDE, Buttons::S1.union(Buttons::S2)),
];

/// Two-button consoles: left/top face duplicate I/II, guide resets (Select+Run).
pub const PCE_TWO_BUTTON: Profile = Profile {
    name: "two-button",
    rules: &PCE_RULES,
    trigger_threshold: None,
    stick_scale: fixed!(1: I16F16),
};

const COMMON_PROFILES: [Profile; 2] = [Profile::PASSTHROUGH, SWAP_FACE];
const PCE_PROFILES: [Profile; 3] = [Profile::PASSTHROUGH, PCE_TWO_BUTTON, SWAP_FACE];
const GAMECUBE_PROFILES: [Profile; 3] = [Profile::PASSTHROUGH, GC_SHOULDER_TRIGGERS, DPAD_AS_STICK];
const NUON_PROFILES: [Profile; 2] = [Profile::PASSTHROUGH, DPAD_AS_STICK];

/// Profiles available per output target.
#[derive(Debug, Clone, Copy)]
pub struct ProfileCatalog {
    sets: [&'static [Profile]; OutputTarget::COUNT],
}

impl ProfileCatalog {
    /// Build a catalog; `sets` is indexed by [`OutputTarget::index`].
    #[must_use]
    pub const fn new(sets: [&'static [Profile]; OutputTarget::COUNT]) -> Self {
        Self { sets }
    }

    /// Profiles for `target`; never empty.
    #[must_use]
    pub fn profiles(&self, target: OutputTarget) -> &'static [Profile] {
        match self.sets[target.index()] {
            [] => core::slice::from_ref(&Profile::PASSTHROUGH),
            profiles => profiles,
        }
    }

    /// Number of profiles for `target` (at least one).
    #[must_use]
    pub fn len(&self, target: OutputTarget) -> u8 {
        self.profiles(target).len().min(usize::from(u8::MAX)) as u8
    }

    /// Profile at `index`, falling back to the first one.
    #[must_use]
    pub fn get(&self, target: OutputTarget, index: u8) -> &'static Profile {
        let profiles = self.profiles(target);
        profiles.get(usize::from(index)).unwrap_or(&profiles[0])
    }
}

/// Built-in profiles shipped with the firmware.
pub static DEFAULT_CATALOG: ProfileCatalog = ProfileCatalog::new([
    &COMMON_PROFILES,   // UsbDevice
    &PCE_PROFILES,      // PcEngine
    &GAMECUBE_PROFILES, // GameCube
    &COMMON_PROFILES,   // ThreeDo
    &NUON_PROFILES,     // Nuon
    &COMMON_PROFILES,   // Loopy
]);

/// Tracks the active profile per target and persists it.
#[derive(Debug, Clone)]
pub struct ProfileSystem {
    catalog: &'static ProfileCatalog,
    settings: Settings,
    persist: Debounce,
}

impl ProfileSystem {
    /// Start from loaded settings; out-of-range indices fall back to 0.
    #[must_use]
    pub fn new(catalog: &'static ProfileCatalog, settings: Settings) -> Self {
        let mut settings = settings;
        for target in OutputTarget::ALL {
            let slot = &mut settings.active_profile[target.index()];
            if *slot >= catalog.len(target) {
                *slot = 0;
            }
        }
        Self {
            catalog,
            settings,
            persist: Debounce::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &'static ProfileCatalog {
        self.catalog
    }

    /// Settings as they will next be persisted.
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Active profile index for `target` (0 if never set).
    #[must_use]
    pub fn get_active(&self, target: OutputTarget) -> u8 {
        self.settings.active_profile[target.index()]
    }

    #[must_use]
    pub fn active_profile(&self, target: OutputTarget) -> &'static Profile {
        self.catalog.get(target, self.get_active(target))
    }

    #[must_use]
    pub fn profile(&self, target: OutputTarget, index: u8) -> &'static Profile {
        self.catalog.get(target, index)
    }

    /// Apply the profile at `index` for `target`.
    #[must_use]
    pub fn apply(
        &self,
        target: OutputTarget,
        index: u8,
        input: &CanonicalInputEvent,
    ) -> CanonicalInputEvent {
        apply(self.profile(target, index), input)
    }

    /// Advance to the next profile (wrapping), announce it and schedule a
    /// debounced write. Returns the new index.
    pub fn switch_next(
        &mut self,
        target: OutputTarget,
        now: Instant,
        indicator: &mut FeedbackIndicator,
        player_index: Option<u8>,
        player_count: u8,
    ) -> u8 {
        let len = self.catalog.len(target);
        let next = (self.get_active(target) + 1) % len;
        self.switch_to(target, next, now, indicator, player_index, player_count)
    }

    /// Step back to the previous profile (wrapping).
    pub fn switch_prev(
        &mut self,
        target: OutputTarget,
        now: Instant,
        indicator: &mut FeedbackIndicator,
        player_index: Option<u8>,
        player_count: u8,
    ) -> u8 {
        let len = self.catalog.len(target);
        let prev = (self.get_active(target) + len - 1) % len;
        self.switch_to(target, prev, now, indicator, player_index, player_count)
    }

    fn switch_to(
        &mut self,
        target: OutputTarget,
        index: u8,
        now: Instant,
        indicator: &mut FeedbackIndicator,
        player_index: Option<u8>,
        player_count: u8,
    ) -> u8 {
        self.set_active(target, index, now);
        indicator.trigger(player_index, index, player_count, now);
        info!(
            "{:?} profile {} ({})",
            target,
            index,
            self.catalog.get(target, index).name
        );
        index
    }

    /// Select a profile without announcing it. Returns `false` if `index`
    /// is out of range.
    pub fn set_active(&mut self, target: OutputTarget, index: u8, now: Instant) -> bool {
        if index >= self.catalog.len(target) {
            return false;
        }
        if self.settings.active_profile[target.index()] != index {
            self.settings.active_profile[target.index()] = index;
            self.persist.schedule(now);
        }
        true
    }

    /// Record the selected output target for the next boot.
    pub fn set_output_mode(&mut self, target: OutputTarget, now: Instant) {
        let mode = target.index() as u8;
        if self.settings.output_mode != mode {
            self.settings.output_mode = mode;
            self.persist.schedule(now);
        }
    }

    #[inline]
    #[must_use]
    pub fn write_pending(&self) -> bool {
        self.persist.is_pending()
    }

    /// Write settings once the quiet period has passed.
    pub fn task<S: SettingsStore>(&mut self, now: Instant, store: &mut S) {
        if self.persist.take_due(now) {
            self.commit(store);
        }
    }

    /// Write any pending change immediately (shutdown and critical paths).
    pub fn flush<S: SettingsStore>(&mut self, store: &mut S) {
        if self.persist.take() {
            self.commit(store);
        }
    }

    fn commit<S: SettingsStore>(&mut self, store: &mut S) {
        match store.save(&self.settings) {
            Ok(()) => debug!("settings saved"),
            // Best effort: the next change schedules a fresh write.
            Err(e) => warn!("settings save failed: {:?}", e),
        }
    }
}
