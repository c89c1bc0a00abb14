//! Shared handle to a running game.
//!
//! The ticking thread and any number of readers (checkpoint writers, info
//! displays) share one [`LiveGame`]. Every operation holds the lock only for
//! its own duration; a checkpoint is built under the lock and serialized
//! after it is released.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::game::Game;
use crate::snapshot::GameCheckpoint;

#[derive(Clone)]
pub struct LiveGame {
    inner: Arc<Mutex<Game>>,
}

impl LiveGame {
    pub fn new(game: Game) -> Self {
        Self {
            inner: Arc::new(Mutex::new(game)),
        }
    }

    // A panicking tick leaves the game between steps, which is still a
    // consistent state.
    fn lock(&self) -> MutexGuard<'_, Game> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn tick(&self, time_ms: i64) -> bool {
        self.lock().tick(time_ms)
    }

    pub fn checkpoint(&self) -> GameCheckpoint {
        let cp = GameCheckpoint::from_game(&self.lock());
        debug!(target: "quantro::persist", "checkpoint taken");
        cp
    }

    pub fn seed(&self) -> u32 {
        self.lock().seed()
    }

    pub fn set_seed(&self, seed: u32) {
        self.lock().set_seed(seed);
    }

    /// Read-only access to the game.
    pub fn with_game<T>(&self, f: impl FnOnce(&Game) -> T) -> T {
        f(&self.lock())
    }

    /// Exclusive access, for input handling between ticks.
    pub fn with_game_mut<T>(&self, f: impl FnOnce(&mut Game) -> T) -> T {
        f(&mut self.lock())
    }
}
