//! GameState persistence
//!
//! Layout of the current version, in stream order:
//!
//! ```text
//! magic, version, R, C
//! piece, next (count + pieces), reserve (count + pieces), offset
//! lock_piece, lock_then_activate, lock_then_deactivate,
//!     activate_then_end_cycle, deactivate_then_end_cycle, used_reserve
//! period, state, progression, state_after_progression
//! events blob
//! block_field, block_field_before, displacement rows
//! cascade number, chromatic rows, monochromatic rows, inverse clear
//! unlock counters + entries
//! valley, junction, peak, corner, troll
//! components, chunks
//! unleash, pushed up, pushed down, pushed up garbage, to transfer, transferred
//! reserve queued, action cycles, sentinel
//! ```
//!
//! Streams that do not start with [`STATE_MAGIC`] are legacy payloads: they
//! begin directly with `R, C`, read as version -1, and carry no sentinel.

use std::io::{Read, Write};

use tracing::debug;

use crate::blockfield::Blockfield;
use crate::events::GameEvents;
use crate::game_state::{ActiveList, Chunk, Component, GameState};
use crate::stream::{StreamError, StreamReader, StreamResult, StreamWriter};
use crate::types::{CycleState, GamePeriod, Piece, ProgressionState, LOOKAHEAD_LEN};

/// Leading tag of every versioned state stream.
pub const STATE_MAGIC: i32 = 0x5154_5354;

pub const STATE_VERSION: i32 = 5;

/// Version assigned to payloads without the magic prefix.
pub const LEGACY_VERSION: i32 = -1;

/// Facts from outside the state stream that old versions depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyContext {
    /// Minimum player count of the game's mode; sizes the pre-v2 reserve queue.
    pub min_players: i32,
}

impl LegacyContext {
    pub fn new(min_players: i32) -> Self {
        Self { min_players }
    }

    fn reserve_len(&self) -> usize {
        self.min_players.clamp(1, LOOKAHEAD_LEN as i32) as usize
    }
}

impl Default for LegacyContext {
    fn default() -> Self {
        Self { min_players: 1 }
    }
}

fn write_grid<W: Write>(w: &mut StreamWriter<W>, grid: &Blockfield) -> StreamResult<()> {
    w.write_str(&grid.encode())
}

fn read_grid<R: Read>(
    r: &mut StreamReader<R>,
    field: &'static str,
    rows: usize,
    cols: usize,
) -> StreamResult<Blockfield> {
    let s = r.read_string(field)?;
    Blockfield::decode_sized(&s, rows, cols)
}

fn write_queue<W: Write>(
    w: &mut StreamWriter<W>,
    queue: &[Option<Piece>; LOOKAHEAD_LEN],
) -> StreamResult<()> {
    w.write_len(queue.len())?;
    for p in queue {
        w.write_piece(p.as_ref())?;
    }
    Ok(())
}

fn read_queue<R: Read>(
    r: &mut StreamReader<R>,
    field: &'static str,
    count: usize,
) -> StreamResult<[Option<Piece>; LOOKAHEAD_LEN]> {
    if count > LOOKAHEAD_LEN {
        return Err(StreamError::Mismatch(format!(
            "{}: {} entries, at most {}",
            field, count, LOOKAHEAD_LEN
        )));
    }
    let mut queue: [Option<Piece>; LOOKAHEAD_LEN] = Default::default();
    for slot in queue.iter_mut().take(count) {
        *slot = r.read_piece(field)?;
    }
    Ok(queue)
}

fn read_cycle_state<R: Read>(r: &mut StreamReader<R>, field: &'static str) -> StreamResult<CycleState> {
    let code = r.read_i32(field)?;
    CycleState::from_code(code)
        .ok_or_else(|| StreamError::Mismatch(format!("{}: unknown code {}", field, code)))
}

impl GameState {
    pub fn write_to<W: Write>(&self, w: &mut StreamWriter<W>) -> StreamResult<()> {
        w.write_i32(STATE_MAGIC)?;
        w.write_i32(STATE_VERSION)?;
        w.write_i32(self.rows() as i32)?;
        w.write_i32(self.cols() as i32)?;

        w.write_piece(self.piece.as_ref())?;
        write_queue(w, &self.next_pieces)?;
        write_queue(w, &self.reserve_pieces)?;
        w.write_offset(self.offset)?;

        let i = &self.intents;
        w.write_flag_i32(i.lock_piece)?;
        w.write_bool(i.lock_then_activate)?;
        w.write_bool(i.lock_then_deactivate)?;
        w.write_bool(i.activate_then_end_cycle)?;
        w.write_bool(i.deactivate_then_end_cycle)?;
        w.write_flag_i32(i.used_reserve)?;

        w.write_i32(self.period.code())?;
        w.write_i32(self.state.code())?;
        w.write_i32(
            self.progression
                .map(ProgressionState::code)
                .unwrap_or(ProgressionState::NONE_CODE),
        )?;
        w.write_i32(self.state_after_progression.code())?;

        self.events_last_tick.write_to(w)?;

        write_grid(w, &self.block_field)?;
        write_grid(w, &self.block_field_before)?;
        write_grid(w, &self.block_field_displacement_rows)?;

        w.write_i32(self.clear_cascade_number)?;
        w.write_i32_slice(&self.cleared_rows_chromatic)?;
        w.write_bool_slice(&self.cleared_rows_monochromatic)?;
        write_grid(w, &self.block_field_inverse_clear)?;

        w.write_i32(self.unlock.columns_above)?;
        w.write_i32(self.unlock.columns_above_already_unlocked)?;
        w.write_len(self.unlock.pending.len())?;
        for &o in &self.unlock.pending {
            w.write_offset(o)?;
        }

        let g = &self.garbage_shapes;
        w.write_i32(g.valley)?;
        w.write_i32(g.junction)?;
        w.write_i32(g.peak)?;
        w.write_i32(g.corner)?;
        w.write_i32(g.troll)?;

        w.write_len(self.components.len())?;
        for c in self.components.iter() {
            w.write_piece(Some(&c.piece))?;
            w.write_offset(c.original)?;
            w.write_offset(c.fell_to)?;
        }
        w.write_len(self.chunks.len())?;
        for c in self.chunks.iter() {
            w.write_piece(Some(&c.piece))?;
            w.write_offset(c.original)?;
            w.write_offset(c.fell_to)?;
            w.write_bool(c.is_new)?;
        }

        let a = &self.attack;
        w.write_bool(self.unleash_attack_this_cycle)?;
        w.write_i32(a.rows_pushed_up)?;
        w.write_i32(a.rows_pushed_down)?;
        w.write_i32(a.rows_pushed_up_that_are_garbage)?;
        w.write_i32(a.displaced_rows_to_transfer)?;
        w.write_i32(a.displaced_rows_transferred)?;

        w.write_bool(self.reserve_queued_for_next_cycle)?;
        w.write_i64(self.num_action_cycles)?;
        w.write_sentinel()
    }

    /// Read any version from legacy up to [`STATE_VERSION`].
    pub fn read_from<R: Read>(r: &mut StreamReader<R>, legacy: LegacyContext) -> StreamResult<Self> {
        let first = r.read_i32("state magic")?;
        let (version, rows, cols) = if first == STATE_MAGIC {
            let version = r.read_i32("state version")?;
            if !(0..=STATE_VERSION).contains(&version) {
                return Err(StreamError::Mismatch(format!(
                    "state version {} not readable (max {})",
                    version, STATE_VERSION
                )));
            }
            (version, r.read_i32("rows")?, r.read_i32("cols")?)
        } else {
            (LEGACY_VERSION, first, r.read_i32("cols")?)
        };
        debug!(target: "quantro::persist", version, rows, cols, "reading game state");

        let mut s = GameState::new(rows, cols).map_err(|_| {
            StreamError::Mismatch(format!("state dimensions {}x{} invalid", rows, cols))
        })?;
        let (nr, nc) = (s.rows(), s.cols());

        s.piece = r.read_piece("piece")?;
        if version >= 2 {
            let n = r.read_len("next count")?;
            s.next_pieces = read_queue(r, "next pieces", n)?;
            let n = r.read_len("reserve count")?;
            s.reserve_pieces = read_queue(r, "reserve pieces", n)?;
        } else {
            s.next_pieces = read_queue(r, "next pieces", LOOKAHEAD_LEN)?;
            s.reserve_pieces = read_queue(r, "reserve pieces", legacy.reserve_len())?;
        }
        s.offset = r.read_offset("offset")?;

        s.intents.lock_piece = r.read_flag_i32("lock piece")?;
        if version >= 1 {
            s.intents.lock_then_activate = r.read_bool("lock then activate")?;
            s.intents.lock_then_deactivate = r.read_bool("lock then deactivate")?;
            s.intents.activate_then_end_cycle = r.read_bool("activate then end cycle")?;
            s.intents.deactivate_then_end_cycle = r.read_bool("deactivate then end cycle")?;
        }
        s.intents.used_reserve = r.read_flag_i32("used reserve")?;

        let period = r.read_i32("period")?;
        s.period = GamePeriod::from_code(period)
            .ok_or_else(|| StreamError::Mismatch(format!("period: unknown code {}", period)))?;
        s.state = read_cycle_state(r, "state")?;
        let progression = r.read_i32("progression")?;
        s.progression = if progression == ProgressionState::NONE_CODE {
            None
        } else {
            Some(ProgressionState::from_code(progression).ok_or_else(|| {
                StreamError::Mismatch(format!("progression: unknown code {}", progression))
            })?)
        };
        s.state_after_progression = read_cycle_state(r, "state after progression")?;

        if version >= 0 {
            s.events_last_tick = GameEvents::read_from(r)?;
        }

        s.block_field = read_grid(r, "block field", nr, nc)?;
        s.block_field_before = read_grid(r, "block field before", nr, nc)?;
        if version >= 3 {
            s.block_field_displacement_rows = read_grid(r, "displacement rows", nr, nc)?;
        }

        s.clear_cascade_number = r.read_i32("clear cascade number")?;
        s.cleared_rows_chromatic = r.read_i32_vec("cleared rows chromatic")?;
        s.cleared_rows_monochromatic = r.read_bool_vec("cleared rows monochromatic")?;
        if s.cleared_rows_chromatic.len() != nr || s.cleared_rows_monochromatic.len() != nr {
            return Err(StreamError::Mismatch(format!(
                "cleared row arrays have {} and {} entries, expected {}",
                s.cleared_rows_chromatic.len(),
                s.cleared_rows_monochromatic.len(),
                nr
            )));
        }
        s.block_field_inverse_clear = read_grid(r, "inverse clear", nr, nc)?;

        s.unlock.columns_above = r.read_i32("columns above")?;
        s.unlock.columns_above_already_unlocked = r.read_i32("columns unlocked")?;
        let n = r.read_len("unlock entries")?;
        s.unlock.pending = (0..n)
            .map(|_| r.read_offset("unlock entry"))
            .collect::<StreamResult<_>>()?;

        s.garbage_shapes.valley = r.read_i32("valley")?;
        s.garbage_shapes.junction = r.read_i32("junction")?;
        s.garbage_shapes.peak = r.read_i32("peak")?;
        s.garbage_shapes.corner = r.read_i32("corner")?;
        if version >= 0 {
            s.garbage_shapes.troll = r.read_i32("troll")?;
        }

        let n = r.read_len("components")?;
        let mut components = ActiveList::new();
        for _ in 0..n {
            components.push(Component {
                piece: read_fragment(r, "component")?,
                original: r.read_offset("component original")?,
                fell_to: r.read_offset("component fell to")?,
            });
        }
        s.components = components;

        let n = r.read_len("chunks")?;
        let mut chunks = ActiveList::new();
        for _ in 0..n {
            chunks.push(Chunk {
                piece: read_fragment(r, "chunk")?,
                original: r.read_offset("chunk original")?,
                fell_to: r.read_offset("chunk fell to")?,
                is_new: r.read_bool("chunk is new")?,
            });
        }
        s.chunks = chunks;

        s.unleash_attack_this_cycle = r.read_bool("unleash attack")?;
        s.attack.rows_pushed_up = r.read_i32("rows pushed up")?;
        s.attack.rows_pushed_down = if version >= 1 {
            r.read_i32("rows pushed down")?
        } else {
            -1
        };
        if version >= 4 {
            s.attack.rows_pushed_up_that_are_garbage = r.read_i32("rows pushed up garbage")?;
        }
        if version >= 3 {
            s.attack.displaced_rows_to_transfer = r.read_i32("displaced to transfer")?;
            s.attack.displaced_rows_transferred = r.read_i32("displaced transferred")?;
        }

        if version >= 0 {
            s.reserve_queued_for_next_cycle = r.read_bool("reserve queued")?;
        }
        if version >= 5 {
            s.num_action_cycles = r.read_i64("action cycles")?;
        }
        if version >= 0 {
            r.read_sentinel()?;
        }

        Ok(s)
    }
}

fn read_fragment<R: Read>(r: &mut StreamReader<R>, field: &'static str) -> StreamResult<Piece> {
    r.read_piece(field)?
        .ok_or_else(|| StreamError::Mismatch(format!("{}: null piece", field)))
}
