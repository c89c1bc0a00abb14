//! Game information - running statistics of one game

use std::io::{Read, Write};

use serde::Serialize;

use crate::scoring::{calculate_score, level_for, RowClear, ScoreResult};
use crate::settings::GameSettings;
use crate::stream::{StreamError, StreamReader, StreamResult, StreamWriter};

pub const INFO_VERSION: i32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct GameInformation {
    pub level: i32,
    /// Plane-rows cleared, counted per plane.
    pub clears: i64,
    pub s0_clears: i64,
    pub s1_clears: i64,
    pub monochromatic_clears: i64,
    pub max_cascade: i32,
    pub pieces_locked: i64,
    pub garbage_rows_received: i64,
    pub displaced_rows: i64,
    pub attacks_unleashed: i64,
    pub score: u64,
    /// Tick timestamps; -1 before the first tick.
    pub first_tick_ms: i64,
    pub last_tick_ms: i64,
}

impl GameInformation {
    pub fn new(settings: &GameSettings) -> Self {
        Self {
            level: settings.level(),
            first_tick_ms: -1,
            last_tick_ms: -1,
            ..Self::default()
        }
    }

    pub fn record_tick(&mut self, time_ms: i64) {
        if self.first_tick_ms < 0 {
            self.first_tick_ms = time_ms;
        }
        self.last_tick_ms = time_ms;
    }

    /// Fold one clear step in. Returns the score awarded and whether the
    /// level changed.
    ///
    /// `chromatic[r]` holds planes cleared in row r, `plane_hits` how many of
    /// those were plane 0 and plane 1.
    pub fn apply_clear(
        &mut self,
        settings: &GameSettings,
        chromatic: &[i32],
        monochromatic: &[bool],
        plane_hits: [i64; 2],
        cascade: i32,
    ) -> (ScoreResult, bool) {
        let rows: Vec<RowClear> = chromatic
            .iter()
            .zip(monochromatic)
            .filter(|&(&c, _)| c > 0)
            .map(|(&c, &m)| RowClear {
                planes: c as u32,
                monochromatic: m,
            })
            .collect();

        let score = calculate_score(&rows, self.level.max(0) as u32, cascade);
        self.score = self.score.saturating_add(score.total);
        self.s0_clears += plane_hits[0];
        self.s1_clears += plane_hits[1];
        self.clears += plane_hits[0] + plane_hits[1];
        self.monochromatic_clears += rows.iter().filter(|r| r.monochromatic).count() as i64;
        self.max_cascade = self.max_cascade.max(cascade);

        let level = level_for(
            settings.level(),
            self.clears,
            settings.clears_per_level(),
            settings.level_lock(),
        );
        let leveled = level != self.level;
        self.level = level;
        (score, leveled)
    }

    pub fn write_to<W: Write>(&self, w: &mut StreamWriter<W>) -> StreamResult<()> {
        w.write_i32(INFO_VERSION)?;
        w.write_i32(self.level)?;
        w.write_i64(self.clears)?;
        w.write_i64(self.s0_clears)?;
        w.write_i64(self.s1_clears)?;
        w.write_i64(self.monochromatic_clears)?;
        w.write_i32(self.max_cascade)?;
        w.write_i64(self.pieces_locked)?;
        w.write_i64(self.garbage_rows_received)?;
        w.write_i64(self.displaced_rows)?;
        w.write_i64(self.attacks_unleashed)?;
        w.write_i64(self.score as i64)?;
        w.write_i64(self.first_tick_ms)?;
        w.write_i64(self.last_tick_ms)?;
        w.write_sentinel()
    }

    pub fn read_from<R: Read>(r: &mut StreamReader<R>) -> StreamResult<Self> {
        let version = r.read_i32("info version")?;
        if !(0..=INFO_VERSION).contains(&version) {
            return Err(StreamError::Mismatch(format!("info version {}", version)));
        }
        let info = Self {
            level: r.read_i32("level")?,
            clears: r.read_i64("clears")?,
            s0_clears: r.read_i64("s0 clears")?,
            s1_clears: r.read_i64("s1 clears")?,
            monochromatic_clears: r.read_i64("monochromatic clears")?,
            max_cascade: r.read_i32("max cascade")?,
            pieces_locked: r.read_i64("pieces locked")?,
            garbage_rows_received: r.read_i64("garbage rows received")?,
            displaced_rows: r.read_i64("displaced rows")?,
            attacks_unleashed: r.read_i64("attacks unleashed")?,
            score: r.read_i64("score")? as u64,
            first_tick_ms: r.read_i64("first tick")?,
            last_tick_ms: r.read_i64("last tick")?,
        };
        r.read_sentinel()?;
        Ok(info)
    }
}
