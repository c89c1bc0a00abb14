//! Whole-game runs through the public API

use std::sync::Arc;
use std::thread;

use quantro::core::modes::{MODE_ENDURANCE, MODE_VERSUS};
use quantro::core::{
    Game, GameCheckpoint, GameEvents, GameSettings, GarbageShapes, LiveGame, Simulation,
    StandardModes, TetrominoCatalog, Transition,
};
use quantro::types::{CycleState, GamePeriod};

fn sealed(mode: i32, players: i32) -> GameSettings {
    let mut s = GameSettings::with_mode(mode, players);
    s.set_immutable(&StandardModes).unwrap();
    s
}

fn new_game(rows: i32, cols: i32, seed: u32) -> Game {
    let mut g = Game::new(
        sealed(MODE_ENDURANCE, 1),
        rows,
        cols,
        seed,
        Arc::new(TetrominoCatalog::new()),
    )
    .unwrap();
    g.configure();
    g
}

/// Mixed inputs keyed off the tick index, identical for every game.
fn scripted_input(game: &mut Game, t: i64) {
    match t % 23 {
        0 => {
            game.move_piece(-1);
        }
        3 => {
            game.rotate(true);
        }
        5 => {
            game.move_piece(2);
        }
        8 => game.use_reserve(),
        11 => {
            game.hard_drop();
        }
        13 => game.request(Transition::LockThenActivate),
        17 => game.request(Transition::LockThenDeactivate),
        19 => game.request(Transition::ActivateThenEndCycle),
        21 => {
            game.soft_drop();
        }
        _ => {}
    }
    if t % 97 == 0 {
        game.queue_attack(1, 1);
        game.unleash_attack();
    }
    if t % 151 == 0 {
        game.stage_garbage_shapes(GarbageShapes {
            valley: 1,
            peak: 1,
            troll: 1,
            ..Default::default()
        });
    }
}

#[test]
fn test_unlock_invariant_over_long_runs() {
    for seed in [1u32, 2, 3, 99, 12345] {
        let mut game = new_game(20, 6, seed);
        let mut cycles = 0;
        for t in 0..6_000i64 {
            scripted_input(&mut game, t);
            game.tick(t * 25);
            let s = game.state();
            assert!(
                s.unlock.columns_above_already_unlocked <= s.unlock.columns_above,
                "seed {} tick {}",
                seed,
                t
            );
            assert!(s.num_action_cycles >= cycles);
            cycles = s.num_action_cycles;
            if game.is_over() {
                break;
            }
        }
        assert!(cycles > 0, "seed {} never finished a cycle", seed);
    }
}

#[test]
fn test_same_seed_same_game() {
    let mut a = new_game(24, 8, 4242);
    let mut b = new_game(24, 8, 4242);
    for t in 0..1_500i64 {
        scripted_input(&mut a, t);
        scripted_input(&mut b, t);
        assert_eq!(a.tick(t * 30), b.tick(t * 30));
    }
    assert_eq!(a.state(), b.state());
    assert_eq!(a.info(), b.info());
    assert_eq!(a.events(), b.events());
}

#[test]
fn test_set_seed_restarts_streams() {
    let mut a = new_game(24, 8, 1);
    let mut b = new_game(24, 8, 2);
    a.set_seed(7);
    b.set_seed(7);
    a.tick(0);
    b.tick(0);
    assert_eq!(a.state().next_pieces, b.state().next_pieces);
    assert_eq!(a.state().reserve_pieces, b.state().reserve_pieces);
    assert_eq!(a.seed(), 7);
}

#[test]
fn test_checkpoint_is_independent_of_live_game() {
    let mut game = new_game(24, 8, 10);
    for t in 0..300i64 {
        scripted_input(&mut game, t);
        game.tick(t * 25);
    }
    let cp = GameCheckpoint::from_game(&game);
    let frozen = cp.state().clone();
    let frozen_info = cp.info().clone();
    for t in 300..900i64 {
        scripted_input(&mut game, t);
        game.tick(t * 25);
    }
    assert_eq!(cp.state(), &frozen);
    assert_eq!(cp.info(), &frozen_info);
    assert!(cp.is_configured());
    assert_eq!(cp.system_blobs().len(), 2);
}

#[test]
#[should_panic]
fn test_checkpoint_tick_always_panics() {
    let game = new_game(8, 4, 1);
    let mut cp = GameCheckpoint::from_game(&game);
    cp.tick(0);
}

#[test]
fn test_game_over_is_terminal() {
    let mut game = new_game(8, 4, 5);
    let mut t = 0i64;
    while !game.is_over() && t < 10_000 {
        game.hard_drop();
        game.tick(t);
        t += 1;
    }
    assert!(game.is_over());
    assert!(game.events().contains(GameEvents::GAME_OVER));
    let frozen = game.state().clone();
    assert!(!game.tick(t + 1_000));
    assert_eq!(game.state().period, GamePeriod::Over);
    assert_eq!(game.state().block_field, frozen.block_field);
}

#[test]
fn test_multiplayer_settings_and_push_down() {
    let mut game = Game::new(
        sealed(MODE_VERSUS, 2),
        20,
        6,
        8,
        Arc::new(TetrominoCatalog::new()),
    )
    .unwrap();
    game.configure();
    let mut t = 0i64;
    while game.state().state != CycleState::Falling {
        game.tick(t);
        t += 1;
    }
    game.queue_attack(3, 0);
    game.hard_drop();
    while !game.events().contains(GameEvents::CYCLE_ENDED) && !game.is_over() {
        game.tick(t);
        t += 1;
    }
    let pushed_rows = game.state().block_field.occupied_bottom_rows();
    assert!(pushed_rows >= 3);

    game.queue_push_down(2);
    while game.state().state != CycleState::Falling && !game.is_over() {
        game.tick(t);
        t += 1;
    }
    game.take_events();
    game.hard_drop();
    while !game.events().contains(GameEvents::CYCLE_ENDED) && !game.is_over() {
        game.tick(t);
        t += 1;
    }
    assert!(game.events().contains(GameEvents::ROWS_PUSHED_DOWN));
}

#[test]
fn test_live_game_checkpoints_from_other_threads() {
    let live = LiveGame::new(new_game(24, 8, 77));
    let ticker = {
        let live = live.clone();
        thread::spawn(move || {
            for t in 0..3_000i64 {
                live.with_game_mut(|g| scripted_input(g, t));
                live.tick(t * 20);
            }
        })
    };
    let writers: Vec<_> = (0..3)
        .map(|_| {
            let live = live.clone();
            thread::spawn(move || {
                let mut sizes = Vec::new();
                for _ in 0..20 {
                    let cp = live.checkpoint();
                    let s = cp.state();
                    assert!(s.unlock.columns_above_already_unlocked <= s.unlock.columns_above);
                    sizes.push(cp.to_bytes().unwrap().len());
                }
                sizes
            })
        })
        .collect();

    ticker.join().unwrap();
    for w in writers {
        assert!(w.join().unwrap().iter().all(|&n| n > 0));
    }
    assert!(live.with_game(|g| g.info().last_tick_ms) > 0);
}
