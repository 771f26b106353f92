//! Player feedback (rumble + LEDs) and the profile-switch indicator.
//!
//! The indicator borrows a player's feedback channel for a short blink
//! sequence: one dark gap per profile step, `profile_index + 1` gaps in
//! total. The dark phase is the counted one, so it is the longer of the two.

use embassy_time::{Duration, Instant};

use crate::players::MAX_PLAYERS;

/// Length of the counted (dark) phase.
pub const INDICATOR_OFF: Duration = Duration::from_millis(200);

/// Length of the flash between dark phases.
pub const INDICATOR_ON: Duration = Duration::from_millis(100);

/// Rumble intensity used during the flash.
pub const INDICATOR_RUMBLE: u8 = 192;

/// LED patterns for a four-LED player indicator.
const PLAYER_LEDS: [u8; MAX_PLAYERS] = [0b0001, 0b0010, 0b0100, 0b1000, 0b1001, 0b1010, 0b1100, 0b1110];

/// What a console or host wants a player's pad to show.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FeedbackState {
    pub rumble_left: u8,
    pub rumble_right: u8,
    /// LED bitmask, one bit per LED.
    pub led: u8,
}

impl FeedbackState {
    /// Motors stopped, LEDs dark.
    pub const OFF: Self = Self {
        rumble_left: 0,
        rumble_right: 0,
        led: 0,
    };

    /// Standard player-number LED pattern.
    #[must_use]
    pub const fn player_led(player_index: u8) -> u8 {
        if (player_index as usize) < MAX_PLAYERS {
            PLAYER_LEDS[player_index as usize]
        } else {
            0
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IndicatorPhase {
    Idle,
    BlinkOff,
    BlinkOn,
}

/// Blink-count state machine announcing a profile switch.
#[derive(Debug, Clone)]
pub struct FeedbackIndicator {
    phase: IndicatorPhase,
    /// `None` addresses every connected player.
    target: Option<u8>,
    player_count: u8,
    /// Dark phases still to show, including the current one.
    remaining: u16,
    phase_started: Instant,
}

impl FeedbackIndicator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: IndicatorPhase::Idle,
            target: None,
            player_count: 0,
            remaining: 0,
            phase_started: Instant::from_ticks(0),
        }
    }

    #[inline]
    #[must_use]
    pub fn phase(&self) -> IndicatorPhase {
        self.phase
    }

    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase != IndicatorPhase::Idle
    }

    /// Start announcing `profile_index`.
    ///
    /// `player_index` of `None` drives all `player_count` players. Ignored
    /// while an announcement is already running; returns whether it started.
    pub fn trigger(
        &mut self,
        player_index: Option<u8>,
        profile_index: u8,
        player_count: u8,
        now: Instant,
    ) -> bool {
        if self.is_active() {
            debug!("indicator busy, profile {} not announced", profile_index);
            return false;
        }

        self.phase = IndicatorPhase::BlinkOff;
        self.target = player_index;
        self.player_count = player_count;
        self.remaining = u16::from(profile_index) + 1;
        self.phase_started = now;
        debug!("indicator started: {} blinks", self.remaining);
        true
    }

    /// Advance the state machine; call once per poll-loop cycle.
    pub fn task(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.phase_started);

        match self.phase {
            IndicatorPhase::Idle => {}
            IndicatorPhase::BlinkOff => {
                if elapsed >= INDICATOR_OFF {
                    self.remaining = self.remaining.saturating_sub(1);
                    self.phase = IndicatorPhase::BlinkOn;
                    self.phase_started = now;
                }
            }
            IndicatorPhase::BlinkOn => {
                if elapsed >= INDICATOR_ON {
                    if self.remaining == 0 {
                        self.phase = IndicatorPhase::Idle;
                        debug!("indicator finished");
                    } else {
                        self.phase = IndicatorPhase::BlinkOff;
                    }
                    self.phase_started = now;
                }
            }
        }
    }

    fn drives(&self, player_index: u8) -> bool {
        match self.target {
            Some(target) => target == player_index,
            None => player_index < self.player_count,
        }
    }

    /// Feedback the indicator imposes on `player_index`, if any.
    #[must_use]
    pub fn override_for(&self, player_index: u8) -> Option<FeedbackState> {
        if !self.drives(player_index) {
            return None;
        }
        match self.phase {
            IndicatorPhase::Idle => None,
            IndicatorPhase::BlinkOff => Some(FeedbackState::OFF),
            IndicatorPhase::BlinkOn => Some(FeedbackState {
                rumble_left: INDICATOR_RUMBLE,
                rumble_right: INDICATOR_RUMBLE,
                led: FeedbackState::player_led(player_index),
            }),
        }
    }

    /// Feedback to actually output for `player_index`.
    #[must_use]
    pub fn resolve(&self, player_index: u8, normal: FeedbackState) -> FeedbackState {
        self.override_for(player_index).unwrap_or(normal)
    }
}

impl Default for FeedbackIndicator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run the indicator at 10 ms steps, counting entries into the dark phase.
    fn count_off_phases(indicator: &mut FeedbackIndicator, start_ms: u64) -> (u32, u64) {
        let mut off_phases = 0;
        let mut last = IndicatorPhase::Idle;
        let mut now_ms = start_ms;
        while indicator.is_active() {
            let phase = indicator.phase();
            if phase == IndicatorPhase::BlinkOff && last != IndicatorPhase::BlinkOff {
                off_phases += 1;
            }
            last = phase;
            now_ms += 10;
            indicator.task(Instant::from_millis(now_ms));
            assert!(now_ms < start_ms + 100_000, "indicator never finished");
        }
        (off_phases, now_ms)
    }

    #[test]
    fn test_blink_count_matches_profile_index() {
        let mut indicator = FeedbackIndicator::new();
        assert!(indicator.trigger(Some(0), 2, 1, Instant::from_millis(0)));

        let (off_phases, end_ms) = count_off_phases(&mut indicator, 0);
        assert_eq!(off_phases, 3);
        // Three dark gaps and three flashes.
        assert_eq!(end_ms, 3 * 200 + 3 * 100);
        assert_eq!(indicator.phase(), IndicatorPhase::Idle);
    }

    #[test]
    fn test_last_profile_index_is_not_capped() {
        let mut indicator = FeedbackIndicator::new();
        indicator.trigger(None, u8::MAX, 1, Instant::from_millis(0));
        let (off_phases, _) = count_off_phases(&mut indicator, 0);
        assert_eq!(off_phases, 256);
    }

    #[test]
    fn test_single_blink_for_first_profile() {
        let mut indicator = FeedbackIndicator::new();
        indicator.trigger(Some(1), 0, 2, Instant::from_millis(50));
        let (off_phases, _) = count_off_phases(&mut indicator, 50);
        assert_eq!(off_phases, 1);
    }

    #[test]
    fn test_trigger_ignored_while_active() {
        let mut indicator = FeedbackIndicator::new();
        assert!(indicator.trigger(Some(0), 1, 1, Instant::from_millis(0)));
        assert!(!indicator.trigger(Some(0), 5, 1, Instant::from_millis(10)));

        let (off_phases, _) = count_off_phases(&mut indicator, 10);
        // The first request's count, not the second.
        assert_eq!(off_phases, 2);
    }

    #[test]
    fn test_override_only_for_target_player() {
        let normal = FeedbackState {
            rumble_left: 0,
            rumble_right: 0,
            led: FeedbackState::player_led(1),
        };
        let mut indicator = FeedbackIndicator::new();
        indicator.trigger(Some(0), 0, 2, Instant::from_millis(0));

        assert_eq!(indicator.resolve(0, normal), FeedbackState::OFF);
        assert_eq!(indicator.resolve(1, normal), normal);

        indicator.task(Instant::from_millis(200));
        let flash = indicator.resolve(0, normal);
        assert_eq!(flash.rumble_left, INDICATOR_RUMBLE);
        assert_eq!(flash.led, FeedbackState::player_led(0));
    }

    #[test]
    fn test_broadcast_drives_every_connected_player() {
        let mut indicator = FeedbackIndicator::new();
        indicator.trigger(None, 0, 3, Instant::from_millis(0));
        assert!(indicator.override_for(0).is_some());
        assert!(indicator.override_for(2).is_some());
        assert!(indicator.override_for(3).is_none());
    }

    #[test]
    fn test_control_returns_after_sequence() {
        let normal = FeedbackState {
            rumble_left: 40,
            rumble_right: 40,
            led: 0b0001,
        };
        let mut indicator = FeedbackIndicator::new();
        indicator.trigger(Some(0), 0, 1, Instant::from_millis(0));
        indicator.task(Instant::from_millis(200));
        indicator.task(Instant::from_millis(300));
        assert!(!indicator.is_active());
        assert_eq!(indicator.resolve(0, normal), normal);
    }
}
