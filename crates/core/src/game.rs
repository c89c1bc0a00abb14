//! Game orchestrator - the tick-driven phase machine
//!
//! A [`Game`] owns sealed settings, the [`GameState`], running statistics, and
//! the systems that feed it randomness. Each call to [`Game::tick`] performs
//! exactly one step of a two-level machine:
//!
//! ```text
//! Initializing -> Preparing -> Falling -> Progression -> EndingCycle -> Preparing ...
//!                                            |
//!     ComponentsUnlock -> ComponentsFall -> Clear <-> ChunksFall
//!                                            |
//!                                 Garbage -> Displacement
//! ```
//!
//! Player input that must not interleave with a step (locks, reserve swaps,
//! attack release) is posted to a [`PendingTransitions`] mailbox and consumed
//! by the next step. Movement and rotation apply immediately.

use std::cmp::Reverse;
use std::sync::Arc;

use arrayvec::ArrayVec;
use tracing::{debug, info};

use crate::blockfield::Blockfield;
use crate::error::GameResult;
use crate::events::GameEvents;
use crate::game_state::{Chunk, Component, GameState, GarbageShapes, Intents};
use crate::info::GameInformation;
use crate::pieces::{split_components, PieceCatalog};
use crate::rng::PieceGenerator;
use crate::scoring::get_drop_interval_ms;
use crate::settings::{GameSettings, SettingsError};
use crate::systems::{DisplacementSystem, SystemBlob, DISPLACEMENT_SALT};
use crate::types::{
    CycleState, GamePeriod, Offset, Piece, PieceBlock, ProgressionState, CHUNK_TYPE, GARBAGE,
    LOOKAHEAD_LEN, PLANES, S0, S1,
};

/// Column offsets tried, in order, when a rotation collides.
pub const ROTATION_KICKS: [i32; 5] = [0, -1, 1, -2, 2];

/// How the current piece leaves the Falling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Lock,
    /// Lock, then flash-clear every row the piece lands in.
    LockThenActivate,
    /// Lock as inert garbage.
    LockThenDeactivate,
    /// Erase the cells the piece would land on; nothing locks.
    ActivateThenEndCycle,
    /// Discard the piece.
    DeactivateThenEndCycle,
}

impl Transition {
    fn record_intent(self, intents: &mut Intents) {
        match self {
            Transition::Lock => intents.lock_piece = true,
            Transition::LockThenActivate => intents.lock_then_activate = true,
            Transition::LockThenDeactivate => intents.lock_then_deactivate = true,
            Transition::ActivateThenEndCycle => intents.activate_then_end_cycle = true,
            Transition::DeactivateThenEndCycle => intents.deactivate_then_end_cycle = true,
        }
    }
}

/// One-shot requests waiting for the next step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingTransitions {
    transition: Option<Transition>,
    use_reserve: bool,
    unleash_attack: bool,
}

impl PendingTransitions {
    /// A later request replaces an earlier one that was not consumed yet.
    pub fn request(&mut self, transition: Transition) {
        self.transition = Some(transition);
    }

    pub fn request_reserve(&mut self) {
        self.use_reserve = true;
    }

    pub fn request_unleash(&mut self) {
        self.unleash_attack = true;
    }

    pub fn peek_transition(&self) -> Option<Transition> {
        self.transition
    }

    pub fn take_transition(&mut self) -> Option<Transition> {
        self.transition.take()
    }

    pub fn take_reserve(&mut self) -> bool {
        std::mem::take(&mut self.use_reserve)
    }

    pub fn take_unleash(&mut self) -> bool {
        std::mem::take(&mut self.unleash_attack)
    }

    pub fn is_empty(&self) -> bool {
        self.transition.is_none() && !self.use_reserve && !self.unleash_attack
    }
}

/// Read access shared by live games and their checkpoints.
pub trait Simulation {
    fn settings(&self) -> &GameSettings;
    fn state(&self) -> &GameState;
    fn info(&self) -> &GameInformation;
    /// Events accumulated since they were last drained.
    fn events(&self) -> GameEvents;
    fn system_blobs(&self) -> Vec<SystemBlob>;
    fn is_configured(&self) -> bool;
    /// Advance one step; returns whether anything changed.
    fn tick(&mut self, time_ms: i64) -> bool;
}

enum ColumnChoice {
    Lowest,
    Highest,
    Random,
}

pub struct Game {
    settings: Arc<GameSettings>,
    s: GameState,
    ginfo: GameInformation,
    gevents: GameEvents,
    generator: PieceGenerator,
    displacement: DisplacementSystem,
    catalog: Arc<dyn PieceCatalog>,
    pending: PendingTransitions,
    configured: bool,
    last_fall_ms: Option<i64>,
}

impl Game {
    /// Build an unconfigured game. The settings must already be sealed.
    pub fn new(
        settings: GameSettings,
        rows: i32,
        cols: i32,
        seed: u32,
        catalog: Arc<dyn PieceCatalog>,
    ) -> GameResult<Self> {
        if settings.is_mutable() {
            return Err(SettingsError::InvalidState("settings must be sealed").into());
        }
        let s = GameState::new(rows, cols)?;
        let generator = PieceGenerator::new(seed, catalog.piece_types());
        let displacement =
            DisplacementSystem::new(settings.displacement_fixed_rate(), seed ^ DISPLACEMENT_SALT);
        Ok(Self {
            ginfo: GameInformation::new(&settings),
            settings: Arc::new(settings),
            s,
            gevents: GameEvents::empty(),
            generator,
            displacement,
            catalog,
            pending: PendingTransitions::default(),
            configured: false,
            last_fall_ms: None,
        })
    }

    /// Assemble a game from restored parts; the result is configured.
    pub(crate) fn from_parts(
        settings: Arc<GameSettings>,
        s: GameState,
        ginfo: GameInformation,
        gevents: GameEvents,
        generator: PieceGenerator,
        displacement: DisplacementSystem,
        catalog: Arc<dyn PieceCatalog>,
    ) -> Self {
        Self {
            settings,
            s,
            ginfo,
            gevents,
            generator,
            displacement,
            catalog,
            pending: PendingTransitions::default(),
            configured: true,
            last_fall_ms: None,
        }
    }

    /// Mark the game ready to tick.
    pub fn configure(&mut self) {
        self.configured = true;
        info!(
            target: "quantro::game",
            rows = self.s.rows(),
            cols = self.s.cols(),
            mode = self.settings.mode(),
            players = self.settings.players(),
            seed = self.generator.seed(),
            "game configured"
        );
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn shared_settings(&self) -> Arc<GameSettings> {
        Arc::clone(&self.settings)
    }

    pub fn state(&self) -> &GameState {
        &self.s
    }

    pub fn info(&self) -> &GameInformation {
        &self.ginfo
    }

    pub fn events(&self) -> GameEvents {
        self.gevents
    }

    /// Return and clear the accumulated events.
    pub fn take_events(&mut self) -> GameEvents {
        std::mem::replace(&mut self.gevents, GameEvents::empty())
    }

    pub fn pending(&self) -> &PendingTransitions {
        &self.pending
    }

    pub fn catalog(&self) -> &Arc<dyn PieceCatalog> {
        &self.catalog
    }

    pub fn seed(&self) -> u32 {
        self.generator.seed()
    }

    /// Reseed the advancement and reserve streams.
    pub fn set_seed(&mut self, seed: u32) {
        self.generator.set_seed(seed);
        debug!(target: "quantro::game", seed, "generator reseeded");
    }

    pub fn clone_system_blobs(&self) -> Vec<SystemBlob> {
        vec![
            SystemBlob::new(PieceGenerator::BLOB_NAME, self.generator.to_bytes()),
            SystemBlob::new(DisplacementSystem::BLOB_NAME, self.displacement.to_bytes()),
        ]
    }

    /// The upcoming pieces, soonest first.
    pub fn next_preview(&self) -> ArrayVec<&Piece, LOOKAHEAD_LEN> {
        self.s.next_pieces.iter().flatten().collect()
    }

    pub fn reserve_preview(&self) -> ArrayVec<&Piece, LOOKAHEAD_LEN> {
        self.s.reserve_pieces.iter().flatten().collect()
    }

    pub fn is_over(&self) -> bool {
        self.s.period == GamePeriod::Over
    }

    // ---- mailbox requests ----

    pub fn request(&mut self, transition: Transition) {
        self.pending.request(transition);
    }

    pub fn use_reserve(&mut self) {
        self.pending.request_reserve();
    }

    pub fn unleash_attack(&mut self) {
        self.pending.request_unleash();
    }

    /// Move the piece to its landing row and request a lock.
    pub fn hard_drop(&mut self) -> bool {
        if !self.is_falling() {
            return false;
        }
        if let Some(piece) = self.s.piece.as_ref() {
            let d = self.s.block_field.drop_distance(piece, self.s.offset);
            self.s.offset = self.s.offset.translated(0, -d);
            self.pending.request(Transition::Lock);
            return true;
        }
        false
    }

    // ---- immediate controls ----

    fn is_falling(&self) -> bool {
        self.s.period == GamePeriod::Ongoing && self.s.state == CycleState::Falling
    }

    pub fn move_piece(&mut self, dx: i32) -> bool {
        if !self.is_falling() || dx == 0 {
            return false;
        }
        let Some(piece) = self.s.piece.as_ref() else {
            return false;
        };
        let target = self.s.offset.translated(dx, 0);
        if !self.s.block_field.can_place(piece, target) {
            return false;
        }
        self.s.offset = target;
        self.gevents.record(GameEvents::MOVED);
        true
    }

    pub fn rotate(&mut self, clockwise: bool) -> bool {
        if !self.is_falling() {
            return false;
        }
        let Some(rotated) = self
            .s
            .piece
            .as_ref()
            .and_then(|p| self.catalog.rotate(p, clockwise))
        else {
            return false;
        };
        for dx in ROTATION_KICKS {
            let target = self.s.offset.translated(dx, 0);
            if self.s.block_field.can_place(&rotated, target) {
                self.s.piece = Some(rotated);
                self.s.offset = target;
                self.gevents.record(GameEvents::ROTATED);
                return true;
            }
        }
        false
    }

    /// Drop one row now and restart the gravity timer.
    pub fn soft_drop(&mut self) -> bool {
        if !self.is_falling() {
            return false;
        }
        let Some(piece) = self.s.piece.as_ref() else {
            return false;
        };
        let target = self.s.offset.translated(0, -1);
        if !self.s.block_field.can_place(piece, target) {
            return false;
        }
        self.s.offset = target;
        self.last_fall_ms = Some(self.ginfo.last_tick_ms);
        self.gevents.record(GameEvents::FELL);
        true
    }

    // ---- multiplayer inputs ----

    /// Queue rows to push up at the next garbage step. The first
    /// `garbage_rows` of them are inert garbage.
    pub fn queue_attack(&mut self, rows: i32, garbage_rows: i32) {
        let rows = rows.max(0);
        let a = &mut self.s.attack;
        a.rows_pushed_up = a.rows_pushed_up.saturating_add(rows);
        a.rows_pushed_up_that_are_garbage = a
            .rows_pushed_up_that_are_garbage
            .saturating_add(garbage_rows.clamp(0, rows));
    }

    pub fn queue_push_down(&mut self, rows: i32) {
        let a = &mut self.s.attack;
        a.rows_pushed_down = a.rows_pushed_down.max(0).saturating_add(rows.max(0));
    }

    pub fn stage_garbage_shapes(&mut self, shapes: GarbageShapes) {
        let g = &mut self.s.garbage_shapes;
        g.valley = g.valley.saturating_add(shapes.valley.max(0));
        g.junction = g.junction.saturating_add(shapes.junction.max(0));
        g.peak = g.peak.saturating_add(shapes.peak.max(0));
        g.corner = g.corner.saturating_add(shapes.corner.max(0));
        g.troll = g.troll.saturating_add(shapes.troll.max(0));
    }

    /// Append the occupied bottom rows of `rows` to the displacement queue.
    /// Returns how many rows were accepted.
    pub fn receive_displacement_rows(&mut self, rows: &Blockfield) -> usize {
        if rows.cols() != self.s.cols() {
            return 0;
        }
        let incoming = rows.occupied_bottom_rows();
        let mut accepted = 0;
        for src in 0..incoming {
            let Some(dst) = self.next_displacement_slot() else {
                break;
            };
            self.s
                .block_field_displacement_rows
                .copy_row_from(rows, src, dst);
            accepted += 1;
        }
        self.s.attack.displaced_rows_to_transfer += accepted as i32;
        accepted
    }

    fn next_displacement_slot(&self) -> Option<usize> {
        let grid = &self.s.block_field_displacement_rows;
        let next = grid.occupied_bottom_rows();
        (next < grid.rows()).then_some(next)
    }

    // ---- stepping ----

    /// Perform one step of the phase machine.
    ///
    /// # Panics
    ///
    /// Panics if [`Game::configure`] has not been called.
    pub fn tick(&mut self, time_ms: i64) -> bool {
        assert!(
            self.configured,
            "tick called on a game that has not been configured"
        );
        self.ginfo.record_tick(time_ms);

        let mut ev = GameEvents::empty();
        let changed = if self.s.period == GamePeriod::Over {
            false
        } else {
            let mut pending = std::mem::take(&mut self.pending);
            let mut changed = self.run_displacement(time_ms);
            changed |= self.step(time_ms, &mut pending, &mut ev);
            self.pending = pending;
            changed
        };

        self.s.events_last_tick = ev;
        self.gevents.merge(ev);
        changed
    }

    fn step(&mut self, time_ms: i64, pending: &mut PendingTransitions, ev: &mut GameEvents) -> bool {
        match self.s.state {
            CycleState::Initializing => self.initialize(ev),
            CycleState::Preparing => self.prepare(time_ms, pending, ev),
            CycleState::Falling => self.fall(time_ms, pending, ev),
            CycleState::Progression => self.progress(ev),
            CycleState::EndingCycle => self.end_cycle(ev),
        }
    }

    fn draw_next(&mut self) -> Option<Piece> {
        let t = self.generator.next_type()?;
        self.catalog.piece(t, 0)
    }

    fn draw_reserve(&mut self) -> Option<Piece> {
        let t = self.generator.next_reserve_type()?;
        self.catalog.piece(t, 0)
    }

    fn initialize(&mut self, ev: &mut GameEvents) -> bool {
        for i in 0..LOOKAHEAD_LEN {
            self.s.next_pieces[i] = self.draw_next();
            self.s.reserve_pieces[i] = self.draw_reserve();
        }
        let garbage = self.settings.garbage();
        if garbage > 0 {
            self.push_up_rows(garbage as usize, garbage as usize);
        }
        self.s.period = GamePeriod::Ongoing;
        self.s.state = CycleState::Preparing;
        ev.record(GameEvents::INITIALIZED);
        info!(target: "quantro::game", garbage, "game started");
        true
    }

    fn prepare(&mut self, time_ms: i64, pending: &mut PendingTransitions, ev: &mut GameEvents) -> bool {
        if pending.take_reserve() && !self.s.intents.used_reserve {
            self.s.reserve_queued_for_next_cycle = true;
            ev.record(GameEvents::RESERVE_QUEUED);
        }

        let mut piece = if self.s.reserve_queued_for_next_cycle {
            self.s.reserve_queued_for_next_cycle = false;
            self.s.intents.used_reserve = true;
            let refill = self.draw_reserve();
            shift_queue(&mut self.s.reserve_pieces, refill)
        } else {
            let refill = self.draw_next();
            shift_queue(&mut self.s.next_pieces, refill)
        };
        if piece.is_none() {
            piece = self.draw_next();
        }

        let spawn = self.s.spawn_offset();
        self.s.offset = spawn;
        match piece {
            Some(p) if self.s.block_field.can_place(&p, spawn) => {
                self.s.piece = Some(p);
                self.s.state = CycleState::Falling;
                self.last_fall_ms = Some(time_ms);
                ev.record(GameEvents::SPAWNED);
            }
            other => {
                self.s.piece = other;
                self.game_over(ev, "spawn blocked");
            }
        }
        true
    }

    fn fall(&mut self, time_ms: i64, pending: &mut PendingTransitions, ev: &mut GameEvents) -> bool {
        let mut changed = false;

        if pending.take_unleash() {
            self.s.unleash_attack_this_cycle = true;
            changed = true;
        }

        if pending.take_reserve() && !self.s.intents.used_reserve {
            self.swap_reserve(ev);
            changed = true;
        }

        let Some(piece) = self.s.piece.take() else {
            self.s.state = CycleState::EndingCycle;
            return true;
        };

        if let Some(t) = pending.take_transition() {
            self.apply_transition(t, piece, ev);
            return true;
        }

        let last = *self.last_fall_ms.get_or_insert(time_ms);
        let interval = get_drop_interval_ms(self.ginfo.level, self.settings.difficulty()) as i64;
        if time_ms - last >= interval {
            self.last_fall_ms = Some(time_ms);
            let below = self.s.offset.translated(0, -1);
            if self.s.block_field.can_place(&piece, below) {
                self.s.offset = below;
                self.s.piece = Some(piece);
                ev.record(GameEvents::FELL);
            } else {
                self.apply_transition(Transition::Lock, piece, ev);
            }
            return true;
        }

        self.s.piece = Some(piece);
        changed
    }

    fn swap_reserve(&mut self, ev: &mut GameEvents) {
        if self.s.reserve_pieces[0].is_none() {
            self.s.reserve_pieces[0] = self.draw_reserve();
        }
        let Some(incoming) = self.s.reserve_pieces[0].take() else {
            return;
        };
        self.s.reserve_pieces[0] = self.s.piece.take();
        self.s.piece = Some(incoming);
        self.s.offset = self.s.spawn_offset();
        self.s.intents.used_reserve = true;
        self.last_fall_ms = Some(self.ginfo.last_tick_ms);
        ev.record(GameEvents::RESERVE_USED);
    }

    fn apply_transition(&mut self, t: Transition, piece: Piece, ev: &mut GameEvents) {
        t.record_intent(&mut self.s.intents);
        match t {
            Transition::Lock | Transition::LockThenActivate | Transition::LockThenDeactivate => {
                self.lock(piece);
                ev.record(GameEvents::LOCKED);
                match t {
                    Transition::LockThenActivate => ev.record(GameEvents::ACTIVATED),
                    Transition::LockThenDeactivate => ev.record(GameEvents::DEACTIVATED),
                    _ => {}
                }
            }
            Transition::ActivateThenEndCycle => {
                let field = &mut self.s.block_field;
                let landing = self.s.offset.translated(0, -field.drop_distance(&piece, self.s.offset));
                // the cells directly under the landed piece
                let under = Piece::new(
                    piece.type_id,
                    piece.rotation,
                    piece
                        .blocks
                        .iter()
                        .map(|b| PieceBlock::new(b.x, b.y - 1, b.plane, b.value))
                        .collect(),
                );
                let erased = field.erase_piece(&under, landing);
                debug!(target: "quantro::game", erased, "piece activated");
                self.s.state = CycleState::EndingCycle;
                ev.record(GameEvents::ACTIVATED);
            }
            Transition::DeactivateThenEndCycle => {
                self.s.state = CycleState::EndingCycle;
                ev.record(GameEvents::DEACTIVATED);
            }
        }
    }

    /// Split the piece into components, find where each lands, and record
    /// the columns that still reach into the spawn region.
    fn lock(&mut self, piece: Piece) {
        let boundary = self.s.boundary() as i32;
        let offset = self.s.offset;

        let mut parts = split_components(&piece);
        parts.sort_by_key(|c| c.blocks.iter().map(|b| b.y).min().unwrap_or(0));

        let mut scratch = self.s.block_field.clone();
        self.s.components.reset();
        self.s.chunks.reset();
        for part in parts {
            let d = scratch.drop_distance(&part, offset);
            let fell_to = offset.translated(0, -d);
            scratch.write_piece(&part, fell_to, None);
            self.s.components.push(Component {
                piece: part,
                original: offset,
                fell_to,
            });
        }

        self.s.unlock.reset();
        let mut columns: Vec<Offset> = Vec::new();
        for b in &piece.blocks {
            let (x, y) = (offset.x + b.x, offset.y + b.y);
            if y < boundary {
                continue;
            }
            match columns.iter_mut().find(|o| o.x == x) {
                Some(o) => o.y = o.y.max(y),
                None => columns.push(Offset::new(x, y)),
            }
        }
        columns.sort_by_key(|o| o.x);
        self.s.unlock.columns_above = columns.len() as i32;
        self.s.unlock.pending = columns;

        self.s.clear_cascade_number = -1;
        self.s.reset_clear_tracking();
        self.s.state = CycleState::Progression;
        self.s.progression = Some(ProgressionState::ComponentsUnlock);
        self.s.state_after_progression = CycleState::EndingCycle;
    }

    fn progress(&mut self, ev: &mut GameEvents) -> bool {
        match self.s.progression {
            None => {
                self.s.state = self.s.state_after_progression;
                true
            }
            Some(ProgressionState::ComponentsUnlock) => {
                if self.s.unlock.is_done() {
                    self.s.progression = Some(ProgressionState::ComponentsFall);
                } else {
                    self.s.unlock.columns_above_already_unlocked += 1;
                    ev.record(GameEvents::COMPONENTS_UNLOCKED);
                }
                true
            }
            Some(ProgressionState::ComponentsFall) => {
                self.components_fall(ev);
                true
            }
            Some(ProgressionState::Clear) => self.clear(ev),
            Some(ProgressionState::ChunksFall) => {
                self.chunks_fall(ev);
                true
            }
            Some(ProgressionState::Garbage) => {
                self.garbage(ev);
                true
            }
            Some(ProgressionState::Displacement) => {
                self.displace(ev);
                true
            }
        }
    }

    fn components_fall(&mut self, ev: &mut GameEvents) {
        self.s.block_field_before.clone_from(&self.s.block_field);
        let value = self.s.intents.lock_then_deactivate.then_some(GARBAGE);
        for c in self.s.components.iter() {
            self.s.block_field.write_piece(&c.piece, c.fell_to, value);
        }
        self.ginfo.pieces_locked += 1;
        ev.record(GameEvents::COMPONENTS_FELL);
        self.s.progression = Some(ProgressionState::Clear);
    }

    fn clear(&mut self, ev: &mut GameEvents) -> bool {
        let rows = self.s.rows();
        let flash = self.s.clear_cascade_number < 0 && self.s.intents.lock_then_activate;
        let flash_rows: Vec<(usize, usize)> = if flash {
            self.s
                .components
                .iter()
                .flat_map(|c| {
                    c.piece
                        .blocks
                        .iter()
                        .map(move |b| (b.plane as usize, c.fell_to.y + b.y))
                })
                .filter(|&(_, r)| r >= 0 && (r as usize) < rows)
                .map(|(p, r)| (p, r as usize))
                .collect()
        } else {
            Vec::new()
        };

        let mut cleared: Vec<(usize, usize)> = Vec::new();
        for row in 0..rows {
            let planes: ArrayVec<usize, PLANES> = (0..PLANES)
                .filter(|&p| {
                    self.s.block_field.is_plane_row_full(p, row) || flash_rows.contains(&(p, row))
                })
                .collect();
            cleared.extend(planes.into_iter().map(|p| (p, row)));
        }

        if cleared.is_empty() {
            self.s.clear_cascade_number = -1;
            self.s.progression = Some(ProgressionState::Garbage);
            return true;
        }

        self.s.clear_cascade_number += 1;
        self.s.reset_clear_tracking();
        let mut plane_hits = [0i64; PLANES];
        for &(plane, row) in &cleared {
            self.s.cleared_rows_chromatic[row] += 1;
            plane_hits[plane] += 1;
        }
        for row in 0..rows {
            if self.s.cleared_rows_chromatic[row] == PLANES as i32 {
                self.s.cleared_rows_monochromatic[row] = self.s.block_field.is_row_uniform(row);
            }
        }

        self.s.block_field_before.clone_from(&self.s.block_field);
        self.s.block_field_inverse_clear = self.s.block_field.clear_plane_rows(&cleared);

        let cascade = self.s.clear_cascade_number;
        let (score, leveled) = self.ginfo.apply_clear(
            &self.settings,
            &self.s.cleared_rows_chromatic,
            &self.s.cleared_rows_monochromatic,
            plane_hits,
            cascade,
        );
        debug!(
            target: "quantro::game",
            cascade,
            plane_rows = cleared.len(),
            points = score.total,
            "rows cleared"
        );

        if leveled {
            let extra = self.settings.garbage_per_level().max(0);
            if extra > 0 {
                self.queue_attack(extra, extra);
            }
            ev.record(GameEvents::LEVEL_UP);
            info!(target: "quantro::game", level = self.ginfo.level, "level up");
        }

        ev.record(GameEvents::CLEARED);
        self.s.progression = Some(ProgressionState::ChunksFall);
        true
    }

    fn chunks_fall(&mut self, ev: &mut GameEvents) {
        self.s.chunks.reset();
        let moved = self.s.block_field.settle_chunks();
        if !moved.is_empty() {
            ev.record(GameEvents::CHUNKS_FELL);
        }
        for m in moved {
            self.s.chunks.push(Chunk {
                piece: m.piece,
                original: m.original,
                fell_to: m.fell_to,
                is_new: false,
            });
        }
        self.s.progression = Some(ProgressionState::Clear);
    }

    fn garbage(&mut self, ev: &mut GameEvents) {
        let mut added = false;

        let down = self.s.attack.rows_pushed_down;
        if down > 0 {
            self.s.block_field.remove_bottom_rows(down as usize);
            ev.record(GameEvents::ROWS_PUSHED_DOWN);
        }

        let up = self.s.attack.rows_pushed_up;
        if up > 0 {
            let garbage = self.s.attack.rows_pushed_up_that_are_garbage.clamp(0, up);
            self.push_up_rows(up as usize, garbage as usize);
            self.ginfo.garbage_rows_received += up as i64;
            added = true;
        }

        let shapes = std::mem::take(&mut self.s.garbage_shapes);
        let plan = [
            (shapes.valley, ColumnChoice::Lowest),
            (shapes.junction, ColumnChoice::Random),
            (shapes.peak, ColumnChoice::Highest),
            (shapes.corner, ColumnChoice::Random),
            (shapes.troll, ColumnChoice::Random),
        ];
        'shapes: for (count, choice) in plan {
            for _ in 0..count.max(0) {
                // a failed drop means every column is full
                if !self.drop_garbage_block(&choice) {
                    break 'shapes;
                }
                added = true;
            }
        }

        self.s.attack.rows_pushed_up = 0;
        self.s.attack.rows_pushed_down = 0;
        self.s.attack.rows_pushed_up_that_are_garbage = 0;
        if added {
            ev.record(GameEvents::GARBAGE_ADDED);
        }
        self.s.progression = Some(ProgressionState::Displacement);
    }

    /// Shift the field up by `n`; the bottom `garbage` rows are inert garbage
    /// with one shared hole, the rest attack rows with a hole per plane.
    fn push_up_rows(&mut self, n: usize, garbage: usize) {
        let n = n.min(self.s.rows());
        let cols = self.s.cols();
        self.s.block_field.insert_bottom_rows(n);
        for row in 0..n {
            let (hole0, hole1) = if row < garbage {
                let h = self.generator.garbage_range(cols as u32) as usize;
                (h, h)
            } else {
                (
                    self.generator.garbage_range(cols as u32) as usize,
                    self.generator.garbage_range(cols as u32) as usize,
                )
            };
            for col in 0..cols {
                let (v0, v1) = if row < garbage {
                    (GARBAGE, GARBAGE)
                } else {
                    (S0, S1)
                };
                let f = &mut self.s.block_field;
                if col != hole0 {
                    f.set(0, row as i32, col as i32, v0);
                }
                if col != hole1 {
                    f.set(1, row as i32, col as i32, v1);
                }
            }
        }
    }

    fn drop_garbage_block(&mut self, choice: &ColumnChoice) -> bool {
        let field = &self.s.block_field;
        let rows = field.rows();
        let open: Vec<(usize, usize)> = (0..field.cols())
            .map(|c| (c, field.column_height(c)))
            .filter(|&(_, h)| h < rows)
            .collect();
        let col = match choice {
            ColumnChoice::Lowest => open.iter().min_by_key(|&&(c, h)| (h, c)).map(|&(c, _)| c),
            ColumnChoice::Highest => open
                .iter()
                .max_by_key(|&&(c, h)| (h, Reverse(c)))
                .map(|&(c, _)| c),
            ColumnChoice::Random if !open.is_empty() => {
                let i = self.generator.garbage_range(open.len() as u32) as usize;
                Some(open[i].0)
            }
            ColumnChoice::Random => None,
        };
        let Some(col) = col else {
            return false;
        };

        let block = Piece::new(
            CHUNK_TYPE,
            0,
            vec![
                PieceBlock::new(0, 0, 0, GARBAGE),
                PieceBlock::new(0, 0, 1, GARBAGE),
            ],
        );
        let original = Offset::new(col as i32, rows as i32 - 1);
        let field = &mut self.s.block_field;
        let fell_to = original.translated(0, -field.drop_distance(&block, original));
        field.write_piece(&block, fell_to, None);
        self.s.chunks.push(Chunk {
            piece: block,
            original,
            fell_to,
            is_new: true,
        });
        true
    }

    fn displace(&mut self, ev: &mut GameEvents) {
        let grid = &mut self.s.block_field_displacement_rows;
        let available = grid.occupied_bottom_rows();
        let n = (self.s.attack.displaced_rows_to_transfer.max(0) as usize).min(available);
        if n > 0 {
            self.s.block_field.insert_bottom_rows(n);
            for row in 0..n {
                self.s.block_field.copy_row_from(grid, row, row);
            }
            grid.remove_bottom_rows(n);
            self.s.attack.displaced_rows_to_transfer -= n as i32;
            self.s.attack.displaced_rows_transferred += n as i32;
            self.ginfo.displaced_rows += n as i64;
            ev.record(GameEvents::DISPLACED);
        }
        self.s.progression = None;
        self.s.state = self.s.state_after_progression;
    }

    /// Generate fixed-rate displacement rows that came due.
    fn run_displacement(&mut self, time_ms: i64) -> bool {
        let due = self.displacement.tick(time_ms);
        if self.s.period != GamePeriod::Ongoing {
            return false;
        }
        let cols = self.s.cols();
        let mut generated = 0;
        for _ in 0..due {
            let Some(row) = self.next_displacement_slot() else {
                break;
            };
            let hole = self.displacement.hole_column(cols);
            let grid = &mut self.s.block_field_displacement_rows;
            for col in (0..cols).filter(|&c| c != hole) {
                grid.set(0, row as i32, col as i32, S0);
                grid.set(1, row as i32, col as i32, S1);
            }
            generated += 1;
        }
        self.s.attack.displaced_rows_to_transfer += generated;
        generated > 0
    }

    fn end_cycle(&mut self, ev: &mut GameEvents) -> bool {
        if self.s.unleash_attack_this_cycle {
            self.ginfo.attacks_unleashed += 1;
            ev.record(GameEvents::ATTACK_UNLEASHED);
        }

        if self
            .s
            .block_field
            .any_block_at_or_above(self.s.boundary())
        {
            self.game_over(ev, "blocks above boundary");
            return true;
        }

        self.s.num_action_cycles += 1;
        self.s.intents = Intents::default();
        self.s.unleash_attack_this_cycle = false;
        self.s.components.reset();
        self.s.unlock.reset();
        self.s.piece = None;
        self.s.state = CycleState::Preparing;
        ev.record(GameEvents::CYCLE_ENDED);
        true
    }

    fn game_over(&mut self, ev: &mut GameEvents, reason: &'static str) {
        self.s.period = GamePeriod::Over;
        ev.record(GameEvents::GAME_OVER);
        info!(
            target: "quantro::game",
            reason,
            cycles = self.s.num_action_cycles,
            score = self.ginfo.score,
            "game over"
        );
    }
}

impl Simulation for Game {
    fn settings(&self) -> &GameSettings {
        Game::settings(self)
    }

    fn state(&self) -> &GameState {
        Game::state(self)
    }

    fn info(&self) -> &GameInformation {
        Game::info(self)
    }

    fn events(&self) -> GameEvents {
        Game::events(self)
    }

    fn system_blobs(&self) -> Vec<SystemBlob> {
        self.clone_system_blobs()
    }

    fn is_configured(&self) -> bool {
        Game::is_configured(self)
    }

    fn tick(&mut self, time_ms: i64) -> bool {
        Game::tick(self, time_ms)
    }
}

/// Pop the head of a lookahead queue and refill its tail.
fn shift_queue(
    queue: &mut [Option<Piece>; LOOKAHEAD_LEN],
    refill: Option<Piece>,
) -> Option<Piece> {
    let head = queue[0].take();
    queue.rotate_left(1);
    queue[LOOKAHEAD_LEN - 1] = refill;
    head
}
