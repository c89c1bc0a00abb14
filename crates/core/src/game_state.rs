//! Game state - the complete, persistable state of one Quantro game
//!
//! `GameState` is plain data. The phase machine in [`crate::game`] mutates it
//! one step per tick, and [`crate::state_codec`] reads and writes it.
//!
//! Row 0 is the bottom. A field of `R` rows shows the lower `R / 2`; the upper
//! half is the hidden spawn region, and its lower edge (`R / 2`) is the unlock
//! boundary.

use std::fmt;

use crate::blockfield::Blockfield;
use crate::error::{GameError, GameResult};
use crate::events::GameEvents;
use crate::pieces::PieceCatalog;
use crate::types::{
    CycleState, GamePeriod, Offset, Piece, ProgressionState, LOOKAHEAD_LEN,
};

/// A growable list with an authoritative logical length.
///
/// `reset` keeps the backing storage. Entries past `len` are dead: they are
/// never iterated, compared, cloned, or written.
pub struct ActiveList<T> {
    items: Vec<T>,
    len: usize,
}

impl<T> ActiveList<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Backing storage size, live and dead entries together.
    pub fn capacity(&self) -> usize {
        self.items.len()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items[..self.len]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    pub fn get(&self, i: usize) -> Option<&T> {
        self.as_slice().get(i)
    }

    /// Append, reusing a dead slot when one exists.
    pub fn push(&mut self, item: T) {
        if self.len < self.items.len() {
            self.items[self.len] = item;
        } else {
            self.items.push(item);
        }
        self.len += 1;
    }

    pub fn reset(&mut self) {
        self.len = 0;
    }
}

impl<T> Default for ActiveList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for ActiveList<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.as_slice().to_vec(),
            len: self.len,
        }
    }
}

impl<T: PartialEq> PartialEq for ActiveList<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq> Eq for ActiveList<T> {}

impl<T: fmt::Debug> fmt::Debug for ActiveList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl<T> FromIterator<T> for ActiveList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let items: Vec<T> = iter.into_iter().collect();
        let len = items.len();
        Self { items, len }
    }
}

/// A piece fragment produced by a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub piece: Piece,
    pub original: Offset,
    pub fell_to: Offset,
}

/// A fragment of the field that moved during a cascade or was dropped in as garbage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub piece: Piece,
    pub original: Offset,
    pub fell_to: Offset,
    pub is_new: bool,
}

/// Last-known values of the one-shot cycle signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Intents {
    pub lock_piece: bool,
    pub lock_then_activate: bool,
    pub lock_then_deactivate: bool,
    pub activate_then_end_cycle: bool,
    pub deactivate_then_end_cycle: bool,
    pub used_reserve: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnlockBookkeeping {
    pub columns_above: i32,
    pub columns_above_already_unlocked: i32,
    /// Column entries waiting to unlock, as (column, highest row).
    pub pending: Vec<Offset>,
}

impl UnlockBookkeeping {
    pub fn reset(&mut self) {
        self.columns_above = 0;
        self.columns_above_already_unlocked = 0;
        self.pending.clear();
    }

    pub fn is_done(&self) -> bool {
        self.columns_above_already_unlocked >= self.columns_above
    }
}

/// Shape counters staged by an external analysis, each dropping one garbage block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GarbageShapes {
    pub valley: i32,
    pub junction: i32,
    pub peak: i32,
    pub corner: i32,
    pub troll: i32,
}

impl GarbageShapes {
    pub fn total(&self) -> i32 {
        [self.valley, self.junction, self.peak, self.corner, self.troll]
            .iter()
            .map(|&n| n.max(0))
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttackCounters {
    pub rows_pushed_up: i32,
    pub rows_pushed_down: i32,
    pub rows_pushed_up_that_are_garbage: i32,
    pub displaced_rows_to_transfer: i32,
    pub displaced_rows_transferred: i32,
}

/// Largest playfield accepted from callers or persisted streams.
pub const MAX_ROWS: i32 = 1024;
pub const MAX_COLS: i32 = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    rows: usize,
    cols: usize,

    pub piece: Option<Piece>,
    pub next_pieces: [Option<Piece>; LOOKAHEAD_LEN],
    pub reserve_pieces: [Option<Piece>; LOOKAHEAD_LEN],
    pub offset: Offset,

    pub intents: Intents,
    pub reserve_queued_for_next_cycle: bool,
    pub unleash_attack_this_cycle: bool,

    pub period: GamePeriod,
    pub state: CycleState,
    pub progression: Option<ProgressionState>,
    pub state_after_progression: CycleState,

    pub events_last_tick: GameEvents,

    pub block_field: Blockfield,
    pub block_field_before: Blockfield,
    pub block_field_displacement_rows: Blockfield,
    pub block_field_inverse_clear: Blockfield,

    /// -1 when no cascade is running.
    pub clear_cascade_number: i32,
    pub cleared_rows_chromatic: Vec<i32>,
    pub cleared_rows_monochromatic: Vec<bool>,

    pub unlock: UnlockBookkeeping,
    pub garbage_shapes: GarbageShapes,

    pub components: ActiveList<Component>,
    pub chunks: ActiveList<Chunk>,

    pub attack: AttackCounters,

    pub num_action_cycles: i64,
}

impl GameState {
    pub fn new(rows: i32, cols: i32) -> GameResult<Self> {
        if !(4..=MAX_ROWS).contains(&rows) || rows % 2 != 0 || !(4..=MAX_COLS).contains(&cols) {
            return Err(GameError::InvalidDimensions { rows, cols });
        }
        let (r, c) = (rows as usize, cols as usize);
        Ok(Self {
            rows: r,
            cols: c,
            piece: None,
            next_pieces: Default::default(),
            reserve_pieces: Default::default(),
            offset: Offset::default(),
            intents: Intents::default(),
            reserve_queued_for_next_cycle: false,
            unleash_attack_this_cycle: false,
            period: GamePeriod::Prestart,
            state: CycleState::Initializing,
            progression: None,
            state_after_progression: CycleState::EndingCycle,
            events_last_tick: GameEvents::empty(),
            block_field: Blockfield::new(r, c),
            block_field_before: Blockfield::new(r, c),
            block_field_displacement_rows: Blockfield::new(r, c),
            block_field_inverse_clear: Blockfield::new(r, c),
            clear_cascade_number: -1,
            cleared_rows_chromatic: vec![0; r],
            cleared_rows_monochromatic: vec![false; r],
            unlock: UnlockBookkeeping::default(),
            garbage_shapes: GarbageShapes::default(),
            components: ActiveList::new(),
            chunks: ActiveList::new(),
            attack: AttackCounters::default(),
            num_action_cycles: 0,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// First hidden row; blocks at or above it end the game.
    pub fn boundary(&self) -> usize {
        self.rows / 2
    }

    /// Where new pieces appear.
    pub fn spawn_offset(&self) -> Offset {
        Offset::new((self.cols as i32 - 4) / 2, self.boundary() as i32)
    }

    /// Deep copy with piece types passed through the catalog's upconversion.
    /// Components and chunks are fragments and stay as they are.
    pub fn upconverted(&self, catalog: &dyn PieceCatalog) -> Self {
        let mut out = self.clone();
        let up = |p: &mut Option<Piece>| {
            if let Some(p) = p.as_mut() {
                if !p.is_fragment() {
                    p.type_id = catalog.upconvert(p.type_id);
                }
            }
        };
        up(&mut out.piece);
        out.next_pieces.iter_mut().for_each(up);
        out.reserve_pieces.iter_mut().for_each(up);
        out
    }

    pub fn reset_clear_tracking(&mut self) {
        self.cleared_rows_chromatic.fill(0);
        self.cleared_rows_monochromatic.fill(false);
    }
}
