//! Game events - what happened during a tick

use std::io::{Read, Write};

use bitflags::bitflags;

use crate::stream::{StreamError, StreamReader, StreamResult, StreamWriter};

pub const EVENTS_VERSION: i32 = 0;

bitflags! {
    /// Set of event kinds. A tick records into a fresh set; the game also keeps
    /// a running union until the caller drains it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GameEvents: u32 {
        const INITIALIZED = 1 << 0;
        const SPAWNED = 1 << 1;
        const MOVED = 1 << 2;
        const ROTATED = 1 << 3;
        const FELL = 1 << 4;
        const LOCKED = 1 << 5;
        const ACTIVATED = 1 << 6;
        const DEACTIVATED = 1 << 7;
        const RESERVE_USED = 1 << 8;
        const RESERVE_QUEUED = 1 << 9;
        const COMPONENTS_UNLOCKED = 1 << 10;
        const COMPONENTS_FELL = 1 << 11;
        const CLEARED = 1 << 12;
        const CHUNKS_FELL = 1 << 13;
        const GARBAGE_ADDED = 1 << 14;
        const ROWS_PUSHED_DOWN = 1 << 15;
        const DISPLACED = 1 << 16;
        const ATTACK_UNLEASHED = 1 << 17;
        const LEVEL_UP = 1 << 18;
        const CYCLE_ENDED = 1 << 19;
        const GAME_OVER = 1 << 20;
    }
}

impl Default for GameEvents {
    fn default() -> Self {
        Self::empty()
    }
}

impl GameEvents {
    pub fn record(&mut self, event: GameEvents) {
        self.insert(event);
    }

    pub fn merge(&mut self, other: GameEvents) {
        self.insert(other);
    }

    pub fn reset(&mut self) {
        *self = Self::empty();
    }

    pub fn write_to<W: Write>(&self, w: &mut StreamWriter<W>) -> StreamResult<()> {
        w.write_i32(EVENTS_VERSION)?;
        w.write_i64(self.bits() as i64)?;
        w.write_sentinel()
    }

    /// Unknown bits from newer writers are dropped.
    pub fn read_from<R: Read>(r: &mut StreamReader<R>) -> StreamResult<Self> {
        let version = r.read_i32("events version")?;
        if version < 0 {
            return Err(StreamError::Mismatch(format!(
                "events version {}",
                version
            )));
        }
        let bits = r.read_i64("events bits")?;
        r.read_sentinel()?;
        Ok(Self::from_bits_truncate(bits as u32))
    }
}
