//! Button-combination triggers with hold, release and tap semantics.
//!
//! Timers are wall-clock based: thresholds compare [`Instant`]s, so they do
//! not depend on how often the poll loop runs.
//!
//! Global hotkeys watch the AND of every checked player's buttons within one
//! evaluation cycle. A global combo therefore needs all connected players to
//! hold it at the same time, not one after another.

use embassy_time::{Duration, Instant};

use crate::event::Buttons;
use crate::players::MAX_PLAYERS;

/// Upper bound on registered hotkeys.
pub const MAX_HOTKEYS: usize = 8;

/// When a matched combo fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Trigger {
    /// Once, as soon as the combo has been held for the threshold.
    OnHold,
    /// On release, if it was held at least the threshold.
    OnRelease,
    /// On release, if it was held less than the threshold.
    OnTap,
}

/// What a hotkey asks the poll loop to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HotkeyAction {
    NextProfile,
    PreviousProfile,
    /// Application-defined action code.
    Custom(u8),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HotkeyDefinition {
    /// Every bit must read pressed for the combo to match.
    pub buttons: Buttons,
    pub threshold: Duration,
    pub trigger: Trigger,
    pub action: HotkeyAction,
    /// Watch the all-players fold instead of each player.
    pub global: bool,
}

impl HotkeyDefinition {
    #[must_use]
    pub const fn new(buttons: Buttons, threshold: Duration, trigger: Trigger, action: HotkeyAction) -> Self {
        Self {
            buttons,
            threshold,
            trigger,
            action,
            global: false,
        }
    }

    /// Same definition, evaluated against the all-players fold.
    #[must_use]
    pub const fn global(mut self) -> Self {
        self.global = true;
        self
    }
}

/// Handle returned by [`HotkeyService::register`].
///
/// Carries the registry index and the generation it was issued in, so a
/// handle outliving its hotkey never matches a later one on the same index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HotkeyId {
    index: u8,
    generation: u8,
}

/// A hotkey that fired during evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HotkeyFired {
    pub id: HotkeyId,
    pub action: HotkeyAction,
    /// `None` for global hotkeys.
    pub player: Option<u8>,
    /// How long the combo had been held when it fired.
    pub held: Duration,
}

/// Error type for hotkey registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HotkeyError {
    /// All `MAX_HOTKEYS` entries are in use.
    Full,
    /// A combo with no buttons would always match.
    EmptyCombo,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct HoldState {
    since: Option<Instant>,
    fired: bool,
}

impl HoldState {
    const IDLE: Self = Self {
        since: None,
        fired: false,
    };

    /// Advance the hold state; returns the held time if the hotkey fires.
    fn step(&mut self, def: &HotkeyDefinition, matched: bool, now: Instant) -> Option<Duration> {
        if matched {
            if self.since.is_none() {
                self.fired = false;
            }
            let since = *self.since.get_or_insert(now);
            let held = now.saturating_duration_since(since);
            if def.trigger == Trigger::OnHold && !self.fired && held >= def.threshold {
                self.fired = true;
                return Some(held);
            }
            return None;
        }

        let since = self.since.take()?;
        self.fired = false;
        let held = now.saturating_duration_since(since);
        let fire = match def.trigger {
            Trigger::OnHold => false,
            Trigger::OnRelease => held >= def.threshold,
            Trigger::OnTap => held < def.threshold,
        };
        fire.then_some(held)
    }
}

#[derive(Clone, Copy, Debug)]
struct Registration {
    def: HotkeyDefinition,
    id: HotkeyId,
    players: [HoldState; MAX_PLAYERS],
    global: HoldState,
}

/// Registry and evaluator for hotkeys.
#[derive(Debug, Clone)]
pub struct HotkeyService {
    entries: [Option<Registration>; MAX_HOTKEYS],
    generations: [u8; MAX_HOTKEYS],
    /// AND of every player checked this cycle.
    fold: Buttons,
    folded: bool,
}

impl HotkeyService {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [None; MAX_HOTKEYS],
            generations: [0; MAX_HOTKEYS],
            fold: Buttons::ALL,
            folded: false,
        }
    }

    pub fn register(&mut self, def: HotkeyDefinition) -> Result<HotkeyId, HotkeyError> {
        if def.buttons.is_empty() {
            return Err(HotkeyError::EmptyCombo);
        }
        let Some(index) = self.entries.iter().position(Option::is_none) else {
            warn!("hotkey registry full");
            return Err(HotkeyError::Full);
        };

        let generation = self.generations[index].wrapping_add(1);
        self.generations[index] = generation;
        let id = HotkeyId {
            index: index as u8,
            generation,
        };
        self.entries[index] = Some(Registration {
            def,
            id,
            players: [HoldState::IDLE; MAX_PLAYERS],
            global: HoldState::IDLE,
        });
        debug!("hotkey {} registered", index);
        Ok(id)
    }

    /// Remove a hotkey. Returns `false` if `id` is not currently registered.
    pub fn unregister(&mut self, id: HotkeyId) -> bool {
        let Some(entry) = self.entries.get_mut(usize::from(id.index)) else {
            return false;
        };
        if entry.is_some_and(|e| e.id == id) {
            *entry = None;
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.entries = [None; MAX_HOTKEYS];
        self.fold = Buttons::ALL;
        self.folded = false;
    }

    /// Number of registered hotkeys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evaluate per-player hotkeys against one player's buttons and fold the
    /// buttons into the global mask. Call once per player per cycle.
    pub fn check(
        &mut self,
        buttons: Buttons,
        player_index: u8,
        now: Instant,
        mut on_fire: impl FnMut(HotkeyFired),
    ) {
        self.fold &= buttons;
        self.folded = true;

        let player = usize::from(player_index);
        if player >= MAX_PLAYERS {
            return;
        }

        for (index, entry) in self.entries.iter_mut().enumerate() {
            let Some(entry) = entry.as_mut().filter(|e| !e.def.global) else {
                continue;
            };
            let matched = buttons.contains(entry.def.buttons);
            if let Some(held) = entry.players[player].step(&entry.def, matched, now) {
                debug!("hotkey {} fired for player {}", index, player + 1);
                on_fire(HotkeyFired {
                    id: entry.id,
                    action: entry.def.action,
                    player: Some(player_index),
                    held,
                });
            }
        }
    }

    /// Evaluate global hotkeys against the fold of this cycle's players, then
    /// reset the fold. Call once per cycle, after every [`check`](Self::check).
    pub fn check_global(&mut self, now: Instant, mut on_fire: impl FnMut(HotkeyFired)) {
        let buttons = if self.folded { self.fold } else { Buttons::NONE };
        self.fold = Buttons::ALL;
        self.folded = false;

        for (index, entry) in self.entries.iter_mut().enumerate() {
            let Some(entry) = entry.as_mut().filter(|e| e.def.global) else {
                continue;
            };
            let matched = buttons.contains(entry.def.buttons);
            if let Some(held) = entry.global.step(&entry.def, matched, now) {
                debug!("global hotkey {} fired", index);
                on_fire(HotkeyFired {
                    id: entry.id,
                    action: entry.def.action,
                    player: None,
                    held,
                });
            }
        }
    }

    /// Forget hold timers for a player slot (on disconnect).
    pub fn reset_player(&mut self, player_index: usize) {
        if player_index >= MAX_PLAYERS {
            return;
        }
        for entry in self.entries.iter_mut().flatten() {
            entry.players[player_index] = HoldState::IDLE;
        }
    }

    /// Drop the timers of removed players. With `compact`, survivors'
    /// timers move down to match the renumbered table.
    pub fn remove_players(&mut self, removed: &[usize], compact: bool) {
        for entry in self.entries.iter_mut().flatten() {
            let mut players = [HoldState::IDLE; MAX_PLAYERS];
            let mut write = 0;
            for (index, state) in entry.players.iter().enumerate() {
                if removed.contains(&index) {
                    continue;
                }
                let target = if compact { write } else { index };
                players[target] = *state;
                write += 1;
            }
            entry.players = players;
        }
    }

    /// Forget every player's hold timers (player table rebuilt).
    pub fn reset_all_players(&mut self) {
        for entry in self.entries.iter_mut().flatten() {
            entry.players = [HoldState::IDLE; MAX_PLAYERS];
        }
    }
}

impl Default for HotkeyService {
    fn default() -> Self {
        Self::new()
    }
}
