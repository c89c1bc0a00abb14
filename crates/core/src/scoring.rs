//! Scoring module - Quantro clear scoring and level progression
//!
//! - A row scores `ROW_SCORE * (level + 1)` for every plane it clears.
//! - A monochromatic row (both planes, one uniform value) doubles that.
//! - Every cascade step after the first adds `CASCADE_BASE * cascade`.

use crate::settings::{DIFFICULTY_EASY, DIFFICULTY_HARD, DIFFICULTY_INSANE};
use crate::types::{DROP_INTERVALS, DROP_INTERVAL_FLOOR_MS, DROP_INTERVAL_MIN_MS};

/// Base points per cleared plane-row.
pub const ROW_SCORE: u64 = 40;

/// Bonus per cascade index.
pub const CASCADE_BASE: u64 = 50;

/// Get drop interval for a level and difficulty (in milliseconds)
///
/// Levels past the table use the floor; difficulty scales the result, which
/// never goes below `DROP_INTERVAL_MIN_MS`.
pub fn get_drop_interval_ms(level: i32, difficulty: i32) -> u32 {
    let base = match usize::try_from(level) {
        Ok(l) if l < DROP_INTERVALS.len() => DROP_INTERVALS[l],
        Ok(_) => DROP_INTERVAL_FLOOR_MS,
        Err(_) => DROP_INTERVALS[0],
    };
    let scaled = match difficulty {
        DIFFICULTY_EASY => base * 3 / 2,
        DIFFICULTY_HARD => base * 3 / 4,
        DIFFICULTY_INSANE => base / 2,
        _ => base,
    };
    scaled.max(DROP_INTERVAL_MIN_MS)
}

/// One row of a clear step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowClear {
    /// Planes cleared in this row (1 or 2).
    pub planes: u32,
    pub monochromatic: bool,
}

/// Score calculation result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoreResult {
    pub row_score: u64,
    pub cascade_bonus: u64,
    pub total: u64,
}

/// Points for a single row
pub fn calculate_row_score(row: RowClear, level: u32) -> u64 {
    let base = ROW_SCORE * (level as u64 + 1) * row.planes as u64;
    if row.monochromatic {
        base * 2
    } else {
        base
    }
}

/// `cascade` is the clear cascade number: 0 for the first clear of a lock.
pub fn calculate_cascade_bonus(cascade: i32) -> u64 {
    if cascade <= 0 {
        return 0;
    }
    CASCADE_BASE * cascade as u64
}

pub fn calculate_score(rows: &[RowClear], level: u32, cascade: i32) -> ScoreResult {
    if rows.is_empty() {
        return ScoreResult::default();
    }
    let row_score = rows
        .iter()
        .map(|&r| calculate_row_score(r, level))
        .fold(0u64, u64::saturating_add);
    let cascade_bonus = calculate_cascade_bonus(cascade);
    ScoreResult {
        row_score,
        cascade_bonus,
        total: row_score.saturating_add(cascade_bonus),
    }
}

/// Level reached after `clears` plane-row clears.
///
/// `clears_per_level <= 0` never levels up.
pub fn level_for(start_level: i32, clears: i64, clears_per_level: i32, level_lock: bool) -> i32 {
    if level_lock || clears_per_level <= 0 {
        return start_level;
    }
    let gained = clears / clears_per_level as i64;
    start_level.saturating_add(gained.min(i32::MAX as i64) as i32)
}
