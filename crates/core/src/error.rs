use thiserror::Error;

use crate::settings::SettingsError;
use crate::stream::StreamError;

#[derive(Debug, Error)]
pub enum GameError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    /// Rows must be even and within 4..=MAX_ROWS, columns within 4..=MAX_COLS.
    #[error("invalid field dimensions {rows}x{cols}")]
    InvalidDimensions { rows: i32, cols: i32 },
}

pub type GameResult<T> = Result<T, GameError>;
