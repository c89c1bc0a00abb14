//! Checkpoints - detached copies of a game for saving off the tick path
//!
//! A [`GameCheckpoint`] shares the sealed settings with its game and deep
//! copies everything else, so it can be serialized on another thread while the
//! game keeps ticking. The save file written by [`GameCheckpoint::write_to`] is
//! read back by [`Game::restore`].

use std::io::{Read, Write};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::GameResult;
use crate::events::GameEvents;
use crate::game::{Game, Simulation};
use crate::game_state::GameState;
use crate::info::GameInformation;
use crate::modes::ModeRules;
use crate::pieces::PieceCatalog;
use crate::rng::PieceGenerator;
use crate::settings::GameSettings;
use crate::stream::{StreamError, StreamReader, StreamResult, StreamWriter};
use crate::state_codec::LegacyContext;
use crate::systems::{find_blob, DisplacementSystem, SystemBlob, DISPLACEMENT_SALT};

pub const SAVE_VERSION: i32 = 0;

/// Frozen copy of a game at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct GameCheckpoint {
    settings: Arc<GameSettings>,
    state: GameState,
    info: GameInformation,
    events: GameEvents,
    blobs: Vec<SystemBlob>,
    configured: bool,
}

impl GameCheckpoint {
    pub fn from_game(game: &Game) -> Self {
        Self {
            settings: game.shared_settings(),
            state: game.state().clone(),
            info: game.info().clone(),
            events: game.events(),
            blobs: game.clone_system_blobs(),
            configured: true,
        }
    }

    /// Write the checkpoint as a save file.
    pub fn write_to<W: Write>(&self, w: &mut StreamWriter<W>) -> StreamResult<()> {
        w.write_i32(SAVE_VERSION)?;
        self.settings.write_to(w)?;
        self.state.write_to(w)?;
        self.info.write_to(w)?;
        self.events.write_to(w)?;
        w.write_len(self.blobs.len())?;
        for blob in &self.blobs {
            w.write_str(&blob.name)?;
            w.write_str(&hex::encode(&blob.bytes))?;
        }
        w.write_sentinel()?;
        w.flush()?;
        debug!(
            target: "quantro::persist",
            cycles = self.state.num_action_cycles,
            blobs = self.blobs.len(),
            "checkpoint written"
        );
        Ok(())
    }

    /// Save file bytes.
    pub fn to_bytes(&self) -> StreamResult<Vec<u8>> {
        let mut w = StreamWriter::new(Vec::new());
        self.write_to(&mut w)?;
        Ok(w.into_inner())
    }
}

impl Simulation for GameCheckpoint {
    fn settings(&self) -> &GameSettings {
        &self.settings
    }

    fn state(&self) -> &GameState {
        &self.state
    }

    fn info(&self) -> &GameInformation {
        &self.info
    }

    fn events(&self) -> GameEvents {
        self.events
    }

    fn system_blobs(&self) -> Vec<SystemBlob> {
        self.blobs.clone()
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn tick(&mut self, _time_ms: i64) -> bool {
        panic!("tick called on a checkpoint; checkpoints never advance")
    }
}

fn read_blobs<R: Read>(r: &mut StreamReader<R>) -> StreamResult<Vec<SystemBlob>> {
    let count = r.read_len("blob count")?;
    let mut blobs = Vec::with_capacity(count.min(16));
    for _ in 0..count {
        let name = r.read_string("blob name")?;
        let digits = r.read_string("blob bytes")?;
        let bytes = hex::decode(&digits)
            .map_err(|e| StreamError::Mismatch(format!("blob {} is not hex: {}", name, e)))?;
        blobs.push(SystemBlob::new(name, bytes));
    }
    Ok(blobs)
}

impl Game {
    /// Read a save file into a live, configured game.
    ///
    /// Settings stored unsealed are sealed against `rules`. Systems whose blob
    /// is missing start fresh.
    pub fn restore<R: Read>(
        r: &mut StreamReader<R>,
        catalog: Arc<dyn PieceCatalog>,
        rules: &dyn ModeRules,
    ) -> GameResult<Self> {
        let version = r.read_i32("save version")?;
        if version != SAVE_VERSION {
            return Err(StreamError::Mismatch(format!("save version {}", version)).into());
        }

        let mut settings = GameSettings::read_from(r)?;
        if settings.is_mutable() {
            settings.set_immutable(rules)?;
        }
        let legacy = LegacyContext::new(rules.min_players(settings.mode()).unwrap_or(1));
        let state = GameState::read_from(r, legacy)?.upconverted(catalog.as_ref());
        let info = GameInformation::read_from(r)?;
        let events = GameEvents::read_from(r)?;
        let blobs = read_blobs(r)?;
        r.read_sentinel()?;

        let fallback_seed =
            (state.num_action_cycles as u32) ^ (state.block_field.count_blocks() as u32);
        let generator = match find_blob(&blobs, PieceGenerator::BLOB_NAME) {
            Some(b) => PieceGenerator::from_bytes(&b.bytes)?,
            None => PieceGenerator::new(fallback_seed, catalog.piece_types()),
        };
        let displacement = match find_blob(&blobs, DisplacementSystem::BLOB_NAME) {
            Some(b) => DisplacementSystem::from_bytes(&b.bytes)?,
            None => DisplacementSystem::new(
                settings.displacement_fixed_rate(),
                fallback_seed ^ DISPLACEMENT_SALT,
            ),
        };

        info!(
            target: "quantro::persist",
            rows = state.rows(),
            cols = state.cols(),
            cycles = state.num_action_cycles,
            blobs = blobs.len(),
            "game restored"
        );
        Ok(Game::from_parts(
            Arc::new(settings),
            state,
            info,
            events,
            generator,
            displacement,
            catalog,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GameError;
    use crate::modes::{StandardModes, MODE_ENDURANCE};
    use crate::pieces::TetrominoCatalog;

    fn running_game() -> Game {
        let mut settings = GameSettings::with_mode(MODE_ENDURANCE, 1);
        settings.set_immutable(&StandardModes).unwrap();
        let mut g = Game::new(settings, 16, 6, 99, Arc::new(TetrominoCatalog::new())).unwrap();
        g.configure();
        for t in 0..40 {
            if t % 7 == 0 {
                g.hard_drop();
            }
            g.tick(t * 10);
        }
        g
    }

    #[test]
    fn checkpoint_is_detached() {
        let mut g = running_game();
        let cp = GameCheckpoint::from_game(&g);
        let cycles = cp.state().num_action_cycles;
        assert!(cp.is_configured());
        for t in 400..600 {
            g.hard_drop();
            g.tick(t * 10);
        }
        assert!(g.state().num_action_cycles > cycles || g.is_over());
        assert_eq!(cp.state().num_action_cycles, cycles);
        assert!(Arc::ptr_eq(&cp.settings, &g.shared_settings()));
    }

    #[test]
    #[should_panic(expected = "checkpoint")]
    fn checkpoint_tick_panics() {
        let g = running_game();
        let mut cp = GameCheckpoint::from_game(&g);
        cp.tick(0);
    }

    #[test]
    fn save_file_restores() {
        let g = running_game();
        let cp = GameCheckpoint::from_game(&g);
        let bytes = cp.to_bytes().unwrap();

        let mut r = StreamReader::new(bytes.as_slice());
        let back = Game::restore(&mut r, Arc::new(TetrominoCatalog::new()), &StandardModes).unwrap();
        assert!(back.is_configured());
        assert!(back.pending().is_empty());
        assert_eq!(back.state(), g.state());
        assert_eq!(back.info(), g.info());
        assert_eq!(back.events(), g.events());
        assert_eq!(back.settings(), g.settings());
        assert_eq!(back.clone_system_blobs(), g.clone_system_blobs());
    }

    #[test]
    fn restored_game_continues_identically() {
        let mut g = running_game();
        let bytes = GameCheckpoint::from_game(&g).to_bytes().unwrap();
        let mut r = StreamReader::new(bytes.as_slice());
        let mut back =
            Game::restore(&mut r, Arc::new(TetrominoCatalog::new()), &StandardModes).unwrap();
        for t in 40..200 {
            if t % 5 == 0 {
                g.hard_drop();
                back.hard_drop();
            }
            g.tick(t * 10);
            back.tick(t * 10);
        }
        assert_eq!(back.state(), g.state());
    }

    #[test]
    fn missing_blobs_fall_back_to_fresh_systems() {
        let g = running_game();
        let mut cp = GameCheckpoint::from_game(&g);
        cp.blobs.clear();
        let bytes = cp.to_bytes().unwrap();
        let mut r = StreamReader::new(bytes.as_slice());
        let back = Game::restore(&mut r, Arc::new(TetrominoCatalog::new()), &StandardModes).unwrap();
        assert_eq!(back.state(), g.state());
        assert_eq!(back.clone_system_blobs().len(), 2);
    }

    #[test]
    fn truncated_save_is_no_data() {
        let bytes = GameCheckpoint::from_game(&running_game()).to_bytes().unwrap();
        let cut = &bytes[..bytes.len() / 2];
        let mut r = StreamReader::new(cut);
        let err = Game::restore(&mut r, Arc::new(TetrominoCatalog::new()), &StandardModes)
            .err()
            .unwrap();
        assert!(matches!(err, GameError::Stream(StreamError::NoData(_))));
    }

    #[test]
    fn unknown_save_version_is_mismatch() {
        let mut w = StreamWriter::new(Vec::new());
        w.write_i32(SAVE_VERSION + 1).unwrap();
        let bytes = w.into_inner();
        let mut r = StreamReader::new(bytes.as_slice());
        let err = Game::restore(&mut r, Arc::new(TetrominoCatalog::new()), &StandardModes)
            .err()
            .unwrap();
        assert!(matches!(err, GameError::Stream(StreamError::Mismatch(_))));
    }

    #[test]
    fn non_hex_blob_is_mismatch() {
        let cp = GameCheckpoint::from_game(&running_game());
        let mut bytes = cp.to_bytes().unwrap();
        let digits = hex::encode(&cp.blobs[0].bytes);
        let at = bytes
            .windows(digits.len())
            .position(|w| w == digits.as_bytes())
            .unwrap();
        bytes[at..at + 2].copy_from_slice(b"zz");
        let mut r = StreamReader::new(bytes.as_slice());
        let err = Game::restore(&mut r, Arc::new(TetrominoCatalog::new()), &StandardModes)
            .err()
            .unwrap();
        assert!(matches!(err, GameError::Stream(StreamError::Mismatch(_))));
    }
}
