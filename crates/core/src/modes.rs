//! Mode rules - which player counts a game mode accepts

use std::ops::RangeInclusive;

/// Capability rules for game modes.
pub trait ModeRules: Send + Sync {
    /// Accepted player counts for `mode`; None if the mode is unknown.
    fn player_range(&self, mode: i32) -> Option<RangeInclusive<i32>>;

    fn supports_players(&self, mode: i32, players: i32) -> bool {
        self.player_range(mode)
            .map(|r| r.contains(&players))
            .unwrap_or(false)
    }

    fn min_players(&self, mode: i32) -> Option<i32> {
        self.player_range(mode).map(|r| *r.start())
    }
}

pub const MODE_ENDURANCE: i32 = 0;
pub const MODE_PROGRESSION: i32 = 1;
pub const MODE_VERSUS: i32 = 2;
pub const MODE_COOP: i32 = 3;

/// The four built-in modes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardModes;

impl ModeRules for StandardModes {
    fn player_range(&self, mode: i32) -> Option<RangeInclusive<i32>> {
        match mode {
            MODE_ENDURANCE | MODE_PROGRESSION => Some(1..=1),
            MODE_VERSUS => Some(2..=6),
            MODE_COOP => Some(2..=2),
            _ => None,
        }
    }
}
