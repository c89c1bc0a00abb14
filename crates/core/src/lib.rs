//! Quantro simulation core - deterministic, tick-driven, and persistable
//!
//! Quantro is a two-plane falling-block game. Every cell of the field exists
//! once per plane; a piece may occupy one plane or link both, and a row clears
//! per plane. This crate holds the whole simulation and nothing that draws or
//! reads input:
//!
//! - **Deterministic**: a seed and a sequence of `tick`/control calls fully
//!   determine the game
//! - **Persistable**: state, settings and statistics write to a versioned
//!   big-endian stream that still reads every older version
//! - **Shareable**: [`LiveGame`] ticks on one thread while others take
//!   [`GameCheckpoint`]s
//!
//! # Module Structure
//!
//! - [`stream`]: typed, versioned binary stream
//! - [`blockfield`]: the two-plane grid, chunk detection and settling
//! - [`pieces`]: piece catalog interface and the tetromino catalog
//! - [`modes`]: mode and player-count rules
//! - [`rng`]: seeded piece and garbage streams
//! - [`settings`]: sealable game settings
//! - [`game_state`]: everything that persists between ticks
//! - [`state_codec`]: reading and writing `GameState`
//! - [`info`], [`events`], [`scoring`]: statistics, event flags, score rules
//! - [`systems`]: side systems persisted as opaque blobs
//! - [`game`]: the phase machine
//! - [`snapshot`], [`live`]: checkpoints and the shared live handle
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use quantro_core::{Game, GameSettings, StandardModes, TetrominoCatalog};
//! use quantro_core::modes::MODE_ENDURANCE;
//!
//! let mut settings = GameSettings::with_mode(MODE_ENDURANCE, 1);
//! settings.set_immutable(&StandardModes).unwrap();
//!
//! let mut game = Game::new(settings, 40, 10, 12345, Arc::new(TetrominoCatalog::new())).unwrap();
//! game.configure();
//!
//! game.tick(0); // initializing
//! game.tick(16); // first piece spawns
//! game.move_piece(-1);
//! game.hard_drop();
//! for t in 2..20 {
//!     game.tick(t * 16);
//! }
//! assert_eq!(game.state().num_action_cycles, 1);
//! ```

pub mod blockfield;
pub mod error;
pub mod events;
pub mod game;
pub mod game_state;
pub mod info;
pub mod live;
pub mod modes;
pub mod pieces;
pub mod rng;
pub mod scoring;
pub mod settings;
pub mod snapshot;
pub mod state_codec;
pub mod stream;
pub mod systems;

pub use quantro_types as types;

// Re-export commonly used types for convenience
pub use blockfield::Blockfield;
pub use error::{GameError, GameResult};
pub use events::GameEvents;
pub use game::{Game, PendingTransitions, Simulation, Transition};
pub use game_state::{ActiveList, GameState, GarbageShapes};
pub use info::GameInformation;
pub use live::LiveGame;
pub use modes::{ModeRules, StandardModes};
pub use pieces::{PieceCatalog, TetrominoCatalog};
pub use rng::{PieceGenerator, SimpleRng};
pub use settings::{GameSettings, SettingsError};
pub use snapshot::GameCheckpoint;
pub use stream::{StreamError, StreamReader, StreamWriter};
pub use systems::SystemBlob;
