//! Game settings - mode, player count, and optional tuning values
//!
//! Settings start mutable. `set_immutable` validates the mode/player pairing
//! against a [`ModeRules`] and seals them; from then on every setter fails
//! with [`SettingsError::Sealed`] and leaves the values untouched.
//!
//! Each optional value follows the same quadruple: `has_x`, `x` (value or
//! default), `set_x`, `unset_x`.

use std::io::{Read, Write};

use thiserror::Error;

use crate::modes::ModeRules;
use crate::stream::{StreamError, StreamReader, StreamResult, StreamWriter};

pub const SETTINGS_VERSION: i32 = 1;

/// Mode value of settings that have not been given one.
pub const MODE_UNSET: i32 = i32::MIN;

pub const DIFFICULTY_EASY: i32 = 0;
pub const DIFFICULTY_NORMAL: i32 = 1;
pub const DIFFICULTY_HARD: i32 = 2;
pub const DIFFICULTY_INSANE: i32 = 3;

pub const DEFAULT_LEVEL: i32 = 0;
pub const DEFAULT_CLEARS_PER_LEVEL: i32 = 10;
pub const DEFAULT_GARBAGE: i32 = 0;
pub const DEFAULT_GARBAGE_PER_LEVEL: i32 = 0;
pub const DEFAULT_LEVEL_LOCK: bool = false;
pub const DEFAULT_DIFFICULTY: i32 = DIFFICULTY_NORMAL;
pub const DEFAULT_DISPLACEMENT_FIXED_RATE: f64 = 0.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("settings are sealed")]
    Sealed,
    #[error("settings are in an invalid state: {0}")]
    InvalidState(&'static str),
    #[error("mode {mode} does not support {players} players")]
    InvalidArgument { mode: i32, players: i32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameSettings {
    mutable: bool,
    mode: i32,
    players: i32,
    level: Option<i32>,
    clears_per_level: Option<i32>,
    garbage: Option<i32>,
    garbage_per_level: Option<i32>,
    level_lock: Option<bool>,
    difficulty: Option<i32>,
    displacement_fixed_rate: Option<f64>,
}

macro_rules! optional_setting {
    ($field:ident, $has:ident, $set:ident, $unset:ident, $ty:ty, $default:expr) => {
        pub fn $has(&self) -> bool {
            self.$field.is_some()
        }

        pub fn $field(&self) -> $ty {
            self.$field.unwrap_or($default)
        }

        pub fn $set(&mut self, value: $ty) -> Result<(), SettingsError> {
            self.check_mutable()?;
            self.$field = Some(value);
            Ok(())
        }

        pub fn $unset(&mut self) -> Result<(), SettingsError> {
            self.check_mutable()?;
            self.$field = None;
            Ok(())
        }
    };
}

impl Default for GameSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl GameSettings {
    pub fn new() -> Self {
        Self {
            mutable: true,
            mode: MODE_UNSET,
            players: 1,
            level: None,
            clears_per_level: None,
            garbage: None,
            garbage_per_level: None,
            level_lock: None,
            difficulty: None,
            displacement_fixed_rate: None,
        }
    }

    /// Builder shortcut for a fresh, mutable settings object.
    pub fn with_mode(mode: i32, players: i32) -> Self {
        Self {
            mode,
            players,
            ..Self::new()
        }
    }

    fn check_mutable(&self) -> Result<(), SettingsError> {
        if self.mutable {
            Ok(())
        } else {
            Err(SettingsError::Sealed)
        }
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub fn mode(&self) -> i32 {
        self.mode
    }

    pub fn players(&self) -> i32 {
        self.players
    }

    pub fn set_mode(&mut self, mode: i32, players: i32) -> Result<(), SettingsError> {
        self.check_mutable()?;
        self.mode = mode;
        self.players = players;
        Ok(())
    }

    optional_setting!(level, has_level, set_level, unset_level, i32, DEFAULT_LEVEL);
    optional_setting!(
        clears_per_level,
        has_clears_per_level,
        set_clears_per_level,
        unset_clears_per_level,
        i32,
        DEFAULT_CLEARS_PER_LEVEL
    );
    optional_setting!(garbage, has_garbage, set_garbage, unset_garbage, i32, DEFAULT_GARBAGE);
    optional_setting!(
        garbage_per_level,
        has_garbage_per_level,
        set_garbage_per_level,
        unset_garbage_per_level,
        i32,
        DEFAULT_GARBAGE_PER_LEVEL
    );
    optional_setting!(
        level_lock,
        has_level_lock,
        set_level_lock,
        unset_level_lock,
        bool,
        DEFAULT_LEVEL_LOCK
    );
    optional_setting!(
        difficulty,
        has_difficulty,
        set_difficulty,
        unset_difficulty,
        i32,
        DEFAULT_DIFFICULTY
    );
    optional_setting!(
        displacement_fixed_rate,
        has_displacement_fixed_rate,
        set_displacement_fixed_rate,
        unset_displacement_fixed_rate,
        f64,
        DEFAULT_DISPLACEMENT_FIXED_RATE
    );

    /// Validate the mode/player pairing and seal.
    pub fn set_immutable(&mut self, rules: &dyn ModeRules) -> Result<(), SettingsError> {
        self.check_mutable()?;
        if self.mode == MODE_UNSET {
            return Err(SettingsError::InvalidState("mode unset"));
        }
        if !rules.supports_players(self.mode, self.players) {
            return Err(SettingsError::InvalidArgument {
                mode: self.mode,
                players: self.players,
            });
        }
        self.mutable = false;
        Ok(())
    }

    /// Every optional value other than difficulty is unset.
    pub fn has_defaults_ignoring_difficulty(&self) -> bool {
        self.level.is_none()
            && self.clears_per_level.is_none()
            && self.garbage.is_none()
            && self.garbage_per_level.is_none()
            && self.level_lock.is_none()
            && self.displacement_fixed_rate.is_none()
    }

    pub fn write_to<W: Write>(&self, w: &mut StreamWriter<W>) -> StreamResult<()> {
        w.write_i32(SETTINGS_VERSION)?;
        w.write_bool(self.mutable)?;
        w.write_i32(self.mode)?;
        w.write_i32(self.players)?;
        for v in [
            self.level,
            self.clears_per_level,
            self.garbage,
            self.garbage_per_level,
        ] {
            w.write_bool(v.is_some())?;
            w.write_i32(v.unwrap_or(0))?;
        }
        w.write_bool(self.level_lock.is_some())?;
        w.write_bool(self.level_lock.unwrap_or(false))?;
        w.write_bool(self.difficulty.is_some())?;
        w.write_i32(self.difficulty.unwrap_or(0))?;
        w.write_bool(self.displacement_fixed_rate.is_some())?;
        w.write_f64(self.displacement_fixed_rate.unwrap_or(0.0))?;
        w.write_sentinel()
    }

    pub fn read_from<R: Read>(r: &mut StreamReader<R>) -> StreamResult<Self> {
        let version = r.read_i32("settings version")?;
        if !(0..=SETTINGS_VERSION).contains(&version) {
            return Err(StreamError::Mismatch(format!(
                "settings version {} not readable",
                version
            )));
        }

        fn opt_i32<R: Read>(r: &mut StreamReader<R>, field: &'static str) -> StreamResult<Option<i32>> {
            let has = r.read_bool(field)?;
            let v = r.read_i32(field)?;
            Ok(has.then_some(v))
        }

        let mutable = r.read_bool("settings mutable")?;
        let mode = r.read_i32("settings mode")?;
        let players = r.read_i32("settings players")?;
        let level = opt_i32(r, "level")?;
        let clears_per_level = opt_i32(r, "clears per level")?;
        let garbage = opt_i32(r, "garbage")?;
        let garbage_per_level = opt_i32(r, "garbage per level")?;
        let has_lock = r.read_bool("level lock")?;
        let lock = r.read_bool("level lock")?;
        let difficulty = opt_i32(r, "difficulty")?;
        let displacement_fixed_rate = if version >= 1 {
            let has = r.read_bool("displacement fixed rate")?;
            let v = r.read_f64("displacement fixed rate")?;
            has.then_some(v)
        } else {
            None
        };
        r.read_sentinel()?;

        Ok(Self {
            mutable,
            mode,
            players,
            level,
            clears_per_level,
            garbage,
            garbage_per_level,
            level_lock: has_lock.then_some(lock),
            difficulty,
            displacement_fixed_rate,
        })
    }
}
