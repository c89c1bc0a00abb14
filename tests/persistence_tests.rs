//! Reading older state streams and save files

use std::sync::Arc;

use quantro::core::state_codec::{LegacyContext, STATE_MAGIC};
use quantro::core::{
    Blockfield, GameEvents, GameState, PieceCatalog, StreamError, StreamReader, StreamWriter,
    TetrominoCatalog,
};
use quantro::types::{CycleState, GamePeriod, Offset, Piece, PieceBlock, ProgressionState, S0, S1};

const ROWS: usize = 8;
const COLS: usize = 4;

/// Everything from the piece queues through the attack counters that all
/// versions share, with the per-version pieces supplied by the caller.
struct OldPayload {
    version: Option<i32>,
    reserve_count: usize,
}

impl OldPayload {
    fn build(&self, field: &Blockfield) -> Vec<u8> {
        let mut w = StreamWriter::new(Vec::new());
        match self.version {
            Some(v) => {
                w.write_i32(STATE_MAGIC).unwrap();
                w.write_i32(v).unwrap();
                w.write_i32(ROWS as i32).unwrap();
                w.write_i32(COLS as i32).unwrap();
            }
            None => {
                w.write_i32(ROWS as i32).unwrap();
                w.write_i32(COLS as i32).unwrap();
            }
        }
        let legacy_id = Piece::new(2, 0, vec![PieceBlock::new(1, 1, 0, S0)]);

        w.write_piece(Some(&legacy_id)).unwrap();
        for _ in 0..5 {
            w.write_piece(Some(&legacy_id)).unwrap();
        }
        for _ in 0..self.reserve_count {
            w.write_piece(None).unwrap();
        }
        w.write_offset(Offset::new(0, 4)).unwrap();

        w.write_flag_i32(true).unwrap();
        w.write_flag_i32(false).unwrap();

        w.write_i32(GamePeriod::Ongoing.code()).unwrap();
        w.write_i32(CycleState::Falling.code()).unwrap();
        w.write_i32(ProgressionState::NONE_CODE).unwrap();
        w.write_i32(CycleState::EndingCycle.code()).unwrap();

        if self.version.is_some() {
            (GameEvents::SPAWNED | GameEvents::FELL).write_to(&mut w).unwrap();
        }

        w.write_str(&field.encode()).unwrap();
        w.write_str(&Blockfield::new(ROWS, COLS).encode()).unwrap();

        w.write_i32(-1).unwrap();
        w.write_i32_slice(&[0; ROWS]).unwrap();
        w.write_bool_slice(&[false; ROWS]).unwrap();
        w.write_str(&Blockfield::new(ROWS, COLS).encode()).unwrap();

        w.write_i32(0).unwrap();
        w.write_i32(0).unwrap();
        w.write_len(0).unwrap();

        for v in [1, 2, 3, 4] {
            w.write_i32(v).unwrap();
        }
        if self.version.is_some() {
            w.write_i32(5).unwrap();
        }

        w.write_len(0).unwrap();
        w.write_len(0).unwrap();

        w.write_bool(true).unwrap();
        w.write_i32(3).unwrap();

        if self.version.is_some() {
            w.write_bool(true).unwrap();
            w.write_sentinel().unwrap();
        }
        w.into_inner()
    }
}

fn sample_field() -> Blockfield {
    let mut f = Blockfield::new(ROWS, COLS);
    f.set(0, 0, 0, S0);
    f.set(1, 0, 3, S1);
    f
}

#[test]
fn test_version_zero_payload_defaults() {
    let bytes = OldPayload {
        version: Some(0),
        reserve_count: 1,
    }
    .build(&sample_field());
    let s = GameState::read_from(&mut StreamReader::new(bytes.as_slice()), LegacyContext::default())
        .unwrap();

    assert!(s.intents.lock_piece);
    assert!(!s.intents.lock_then_activate);
    assert!(!s.intents.lock_then_deactivate);
    assert!(!s.intents.activate_then_end_cycle);
    assert!(!s.intents.deactivate_then_end_cycle);
    assert_eq!(s.attack.rows_pushed_down, -1);
    assert_eq!(s.attack.rows_pushed_up, 3);
    assert_eq!(s.attack.rows_pushed_up_that_are_garbage, 0);
    assert_eq!(s.attack.displaced_rows_to_transfer, 0);
    assert_eq!(s.attack.displaced_rows_transferred, 0);
    assert!(s.block_field_displacement_rows.is_empty());
    assert!(s.reserve_queued_for_next_cycle);
    assert!(s.unleash_attack_this_cycle);
    assert_eq!(s.garbage_shapes.troll, 5);
    assert_eq!(s.events_last_tick, GameEvents::SPAWNED | GameEvents::FELL);
    assert_eq!(s.block_field, sample_field());
    assert_eq!(s.num_action_cycles, 0);
}

#[test]
fn test_legacy_payload_without_magic() {
    let bytes = OldPayload {
        version: None,
        reserve_count: 2,
    }
    .build(&sample_field());
    let s = GameState::read_from(&mut StreamReader::new(bytes.as_slice()), LegacyContext::new(2))
        .unwrap();

    assert_eq!((s.rows(), s.cols()), (ROWS, COLS));
    assert_eq!(s.state, CycleState::Falling);
    assert_eq!(s.garbage_shapes.corner, 4);
    assert_eq!(s.garbage_shapes.troll, 0);
    assert!(!s.reserve_queued_for_next_cycle);
    assert!(s.events_last_tick.is_empty());
    assert_eq!(s.attack.rows_pushed_down, -1);
    assert!(s.reserve_pieces.iter().all(Option::is_none));
    assert_eq!(s.block_field, sample_field());
}

#[test]
fn test_legacy_reserve_length_follows_mode() {
    // written for a two-player mode, read assuming one: the stream misaligns
    let bytes = OldPayload {
        version: None,
        reserve_count: 2,
    }
    .build(&sample_field());
    let err = GameState::read_from(
        &mut StreamReader::new(bytes.as_slice()),
        LegacyContext::new(1),
    )
    .unwrap_err();
    assert!(err.is_malformed(), "{:?}", err);
}

#[test]
fn test_upconversion_of_old_ids_is_idempotent() {
    let catalog = TetrominoCatalog::new();
    let bytes = OldPayload {
        version: Some(0),
        reserve_count: 1,
    }
    .build(&sample_field());
    let s = GameState::read_from(&mut StreamReader::new(bytes.as_slice()), LegacyContext::default())
        .unwrap();
    assert_eq!(s.piece.as_ref().map(|p| p.type_id), Some(2));

    let once = s.upconverted(&catalog);
    let twice = once.upconverted(&catalog);
    assert_eq!(once, twice);
    assert_eq!(
        once.piece.as_ref().map(|p| p.type_id),
        Some(TetrominoCatalog::type_id(2, 0))
    );
    assert!(once
        .next_pieces
        .iter()
        .flatten()
        .all(|p| catalog.upconvert(p.type_id) == p.type_id));
}

#[test]
fn test_bad_magic_structure_is_mismatch() {
    let mut w = StreamWriter::new(Vec::new());
    w.write_i32(STATE_MAGIC).unwrap();
    w.write_i32(-7).unwrap();
    let bytes = w.into_inner();
    let err = GameState::read_from(&mut StreamReader::new(bytes.as_slice()), LegacyContext::default())
        .unwrap_err();
    assert!(matches!(err, StreamError::Mismatch(_)));
}

#[test]
fn test_current_version_roundtrip_through_save() {
    use quantro::core::modes::MODE_ENDURANCE;
    use quantro::core::{Game, GameCheckpoint, GameSettings, StandardModes};

    let mut settings = GameSettings::with_mode(MODE_ENDURANCE, 1);
    settings.set_garbage(2).unwrap();
    settings.set_immutable(&StandardModes).unwrap();
    let mut game = Game::new(settings, 16, 6, 3, Arc::new(TetrominoCatalog::new())).unwrap();
    game.configure();
    for t in 0..120 {
        if t % 9 == 0 {
            game.hard_drop();
        }
        game.tick(t * 20);
    }

    let bytes = GameCheckpoint::from_game(&game).to_bytes().unwrap();
    let restored = Game::restore(
        &mut StreamReader::new(bytes.as_slice()),
        Arc::new(TetrominoCatalog::new()),
        &StandardModes,
    )
    .unwrap();
    assert_eq!(restored.state(), game.state());
    assert_eq!(restored.settings(), game.settings());
    assert_eq!(restored.info(), game.info());
}
