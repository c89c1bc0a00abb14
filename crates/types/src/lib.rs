//! Core types module - shared value types and constants
//!
//! This crate defines the fundamental values the simulation core passes around.
//! Everything here is plain data with no external dependencies, so the same
//! types are usable by the core, by persistence, and by any external renderer.
//!
//! # Blockfield layout
//!
//! A Quantro blockfield stores two overlaid colour planes. Every cell is a
//! single byte:
//!
//! | Constant | Value | Meaning |
//! |----------|-------|---------|
//! | `EMPTY` | 0 | no block |
//! | `S0` | 1 | block in plane 0 |
//! | `S1` | 2 | block in plane 1 |
//! | `SL` | 3 | linked block (present in both planes) |
//! | `GARBAGE` | 4 | inert garbage block |
//!
//! Rows are counted from the bottom (row 0). A field with `R` rows shows `R / 2`
//! of them; the upper half is the hidden spawn region.
//!
//! # Examples
//!
//! ```
//! use quantro_types::{Piece, PieceBlock, Offset, S0};
//!
//! let piece = Piece::new(103, 0, vec![PieceBlock::new(0, 0, 0, S0)]);
//! let encoded = piece.to_string();
//! assert_eq!(Piece::parse(&encoded), Some(piece));
//!
//! let o = Offset::new(3, 4).translated(1, -1);
//! assert_eq!(o, Offset::new(4, 3));
//! ```

use std::fmt;

/// Number of colour planes in a blockfield.
pub const PLANES: usize = 2;

/// Length of the `next` and `reserve` lookahead queues.
pub const LOOKAHEAD_LEN: usize = 5;

/// Empty cell.
pub const EMPTY: u8 = 0;
/// Block living in plane 0.
pub const S0: u8 = 1;
/// Block living in plane 1.
pub const S1: u8 = 2;
/// Linked block; occupies the same cell in both planes.
pub const SL: u8 = 3;
/// Inert garbage block.
pub const GARBAGE: u8 = 4;

/// Type id carried by pieces that describe a falling chunk.
pub const CHUNK_TYPE: i32 = -2;
/// Type id carried by pieces that describe a locked component.
pub const COMPONENT_TYPE: i32 = -3;

/// Drop intervals by level (milliseconds per row)
///
/// Index 0 = Level 0, Index 8 = Level 8+
pub const DROP_INTERVALS: [u32; 9] = [1000, 800, 650, 500, 400, 320, 250, 200, 160];

/// Minimum drop interval floor (120ms)
pub const DROP_INTERVAL_FLOOR_MS: u32 = 120;

/// Absolute minimum drop interval (100ms)
pub const DROP_INTERVAL_MIN_MS: u32 = 100;

/// True for block values that bind the two planes of a cell together.
pub fn is_linking(value: u8) -> bool {
    value == SL || value == GARBAGE
}

/// Column/row position. Row 0 is the bottom of the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Offset {
    pub x: i32,
    pub y: i32,
}

impl Offset {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn translated(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// One cell of a piece, relative to the piece offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PieceBlock {
    pub x: i32,
    pub y: i32,
    pub plane: u8,
    pub value: u8,
}

impl PieceBlock {
    pub const fn new(x: i32, y: i32, plane: u8, value: u8) -> Self {
        Self { x, y, plane, value }
    }
}

/// A piece value: a catalog type id, its rotation, and the cells it covers.
///
/// Pieces are plain values; `Clone` is a full deep copy. The `Display` form is
/// the canonical wire encoding:
///
/// ```text
/// {type}:{rotation}:{x},{y},{plane},{value};{x},{y},{plane},{value};...
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Piece {
    pub type_id: i32,
    pub rotation: i32,
    pub blocks: Vec<PieceBlock>,
}

impl Piece {
    pub fn new(type_id: i32, rotation: i32, blocks: Vec<PieceBlock>) -> Self {
        Self {
            type_id,
            rotation,
            blocks,
        }
    }

    /// Chunk and component pieces never refer to catalog combinations.
    pub fn is_fragment(&self) -> bool {
        self.type_id == CHUNK_TYPE || self.type_id == COMPONENT_TYPE
    }

    /// Bitmask of the planes this piece has blocks in (bit 0 = plane 0).
    pub fn plane_mask(&self) -> u8 {
        self.blocks.iter().fold(0u8, |m, b| m | (1 << b.plane))
    }

    /// Parse the canonical encoding produced by `Display`.
    ///
    /// # Examples
    ///
    /// ```
    /// use quantro_types::Piece;
    ///
    /// let p = Piece::parse("100:1:0,0,0,1;0,1,0,1").unwrap();
    /// assert_eq!(p.type_id, 100);
    /// assert_eq!(p.rotation, 1);
    /// assert_eq!(p.blocks.len(), 2);
    /// assert!(Piece::parse("garbage").is_none());
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, ':');
        let type_id = parts.next()?.trim().parse().ok()?;
        let rotation = parts.next()?.trim().parse().ok()?;
        let body = parts.next()?;

        let mut blocks = Vec::new();
        for cell in body.split(';').filter(|c| !c.is_empty()) {
            let mut it = cell.split(',');
            let x = it.next()?.parse().ok()?;
            let y = it.next()?.parse().ok()?;
            let plane: u8 = it.next()?.parse().ok()?;
            let value = it.next()?.parse().ok()?;
            if it.next().is_some() || plane as usize >= PLANES {
                return None;
            }
            blocks.push(PieceBlock::new(x, y, plane, value));
        }

        Some(Self {
            type_id,
            rotation,
            blocks,
        })
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:", self.type_id, self.rotation)?;
        for (i, b) in self.blocks.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{},{},{},{}", b.x, b.y, b.plane, b.value)?;
        }
        Ok(())
    }
}

/// Macro period of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GamePeriod {
    Prestart,
    Ongoing,
    Over,
}

impl GamePeriod {
    pub fn code(self) -> i32 {
        match self {
            GamePeriod::Prestart => 0,
            GamePeriod::Ongoing => 1,
            GamePeriod::Over => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(GamePeriod::Prestart),
            1 => Some(GamePeriod::Ongoing),
            2 => Some(GamePeriod::Over),
            _ => None,
        }
    }
}

/// Outer state of the per-piece action cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleState {
    Initializing,
    Preparing,
    Falling,
    Progression,
    EndingCycle,
}

impl CycleState {
    pub fn code(self) -> i32 {
        match self {
            CycleState::Initializing => 0,
            CycleState::Preparing => 1,
            CycleState::Falling => 2,
            CycleState::Progression => 3,
            CycleState::EndingCycle => 4,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(CycleState::Initializing),
            1 => Some(CycleState::Preparing),
            2 => Some(CycleState::Falling),
            3 => Some(CycleState::Progression),
            4 => Some(CycleState::EndingCycle),
            _ => None,
        }
    }
}

/// Sub-phase stepped through while `CycleState::Progression` is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressionState {
    ComponentsUnlock,
    ComponentsFall,
    Clear,
    ChunksFall,
    Garbage,
    Displacement,
}

impl ProgressionState {
    /// Wire code used when no progression is running.
    pub const NONE_CODE: i32 = -1;

    pub fn code(self) -> i32 {
        match self {
            ProgressionState::ComponentsUnlock => 0,
            ProgressionState::ComponentsFall => 1,
            ProgressionState::Clear => 2,
            ProgressionState::ChunksFall => 3,
            ProgressionState::Garbage => 4,
            ProgressionState::Displacement => 5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ProgressionState::ComponentsUnlock),
            1 => Some(ProgressionState::ComponentsFall),
            2 => Some(ProgressionState::Clear),
            3 => Some(ProgressionState::ChunksFall),
            4 => Some(ProgressionState::Garbage),
            5 => Some(ProgressionState::Displacement),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn piece_encoding_roundtrips_through_parse() {
        let piece = Piece::new(
            105,
            3,
            vec![
                PieceBlock::new(0, 0, 0, SL),
                PieceBlock::new(0, 0, 1, SL),
                PieceBlock::new(-1, 2, 1, S1),
            ],
        );
        let encoded = piece.to_string();
        assert_eq!(encoded, "105:3:0,0,0,3;0,0,1,3;-1,2,1,2");
        assert_eq!(Piece::parse(&encoded), Some(piece));
    }

    #[test]
    fn empty_piece_parses() {
        let p = Piece::parse("-2:0:").unwrap();
        assert!(p.blocks.is_empty());
        assert!(p.is_fragment());
    }

    #[test]
    fn parse_rejects_bad_planes_and_fields() {
        assert!(Piece::parse("1:0:0,0,2,1").is_none());
        assert!(Piece::parse("1:0:0,0,0").is_none());
        assert!(Piece::parse("1:0:0,0,0,1,9").is_none());
        assert!(Piece::parse("x:0:").is_none());
        assert!(Piece::parse("null").is_none());
    }

    #[test]
    fn plane_mask_covers_linked_piece() {
        let piece = Piece::new(
            102,
            0,
            vec![
                PieceBlock::new(0, 0, 0, SL),
                PieceBlock::new(0, 0, 1, SL),
                PieceBlock::new(1, 0, 0, S0),
            ],
        );
        assert_eq!(piece.plane_mask(), 0b11);
        let single = Piece::new(101, 0, vec![PieceBlock::new(0, 0, 1, S1)]);
        assert_eq!(single.plane_mask(), 0b10);
    }

    #[test]
    fn phase_codes_are_stable() {
        for code in 0..3 {
            assert_eq!(GamePeriod::from_code(code).unwrap().code(), code);
        }
        for code in 0..5 {
            assert_eq!(CycleState::from_code(code).unwrap().code(), code);
        }
        for code in 0..6 {
            assert_eq!(ProgressionState::from_code(code).unwrap().code(), code);
        }
        assert!(ProgressionState::from_code(ProgressionState::NONE_CODE).is_none());
        assert!(CycleState::from_code(9).is_none());
    }

    #[test]
    fn drop_interval_table_is_monotonic() {
        assert!(DROP_INTERVALS.windows(2).all(|w| w[0] > w[1]));
        assert!(DROP_INTERVALS[8] > DROP_INTERVAL_FLOOR_MS);
        assert!(DROP_INTERVAL_FLOOR_MS > DROP_INTERVAL_MIN_MS);
    }
}
