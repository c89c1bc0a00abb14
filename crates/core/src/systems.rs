//! Game systems - stateful helpers that run alongside the phase machine
//!
//! Systems carry their own state outside `GameState`. For checkpoints they are
//! exported as opaque [`SystemBlob`]s and rebuilt from them on restore.

use crate::rng::SimpleRng;
use crate::stream::{StreamError, StreamReader, StreamResult, StreamWriter};

/// Opaque serialized system state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemBlob {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SystemBlob {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Find a blob by name.
pub fn find_blob<'a>(blobs: &'a [SystemBlob], name: &str) -> Option<&'a SystemBlob> {
    blobs.iter().find(|b| b.name == name)
}

const DISPLACEMENT_BLOB_VERSION: i32 = 1;

/// Mixed into the game seed for the displacement hole stream.
pub const DISPLACEMENT_SALT: u32 = 0xc2b2_ae35;

/// Generates displacement rows at a fixed rate (rows per second).
#[derive(Debug, Clone, PartialEq)]
pub struct DisplacementSystem {
    rate: f64,
    accumulated: f64,
    last_tick_ms: Option<i64>,
    rng: SimpleRng,
}

impl DisplacementSystem {
    pub const BLOB_NAME: &'static str = "displacement";

    pub fn new(rate: f64, seed: u32) -> Self {
        Self {
            rate: if rate.is_finite() { rate.max(0.0) } else { 0.0 },
            accumulated: 0.0,
            last_tick_ms: None,
            rng: SimpleRng::new(seed),
        }
    }

    pub fn is_active(&self) -> bool {
        self.rate > 0.0
    }

    /// Advance the clock; returns how many whole rows are due.
    pub fn tick(&mut self, time_ms: i64) -> u32 {
        let elapsed = match self.last_tick_ms.replace(time_ms) {
            Some(prev) if time_ms > prev => (time_ms - prev) as f64 / 1000.0,
            _ => 0.0,
        };
        if !self.is_active() {
            return 0;
        }
        self.accumulated += self.rate * elapsed;
        let whole = self.accumulated.floor();
        self.accumulated -= whole;
        whole as u32
    }

    /// Column of the hole in the next generated row.
    pub fn hole_column(&mut self, cols: usize) -> usize {
        self.rng.next_range(cols as u32) as usize
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = StreamWriter::new(Vec::new());
        // writes into a Vec cannot fail
        let _ = self.write_stream(&mut w);
        w.into_inner()
    }

    fn write_stream(&self, w: &mut StreamWriter<Vec<u8>>) -> StreamResult<()> {
        w.write_i32(DISPLACEMENT_BLOB_VERSION)?;
        w.write_f64(self.rate)?;
        w.write_f64(self.accumulated)?;
        w.write_bool(self.last_tick_ms.is_some())?;
        w.write_i64(self.last_tick_ms.unwrap_or(0))?;
        w.write_i32(self.rng.state() as i32)?;
        w.write_sentinel()
    }

    pub fn from_bytes(bytes: &[u8]) -> StreamResult<Self> {
        let mut r = StreamReader::new(bytes);
        let version = r.read_i32("displacement version")?;
        if !(0..=DISPLACEMENT_BLOB_VERSION).contains(&version) {
            return Err(StreamError::Mismatch(format!(
                "displacement blob version {}",
                version
            )));
        }
        let rate = r.read_f64("displacement rate")?;
        let accumulated = r.read_f64("displacement accumulated")?;
        // version 0 stored a missing clock as -1
        let last_tick_ms = if version >= 1 {
            let has_last = r.read_bool("displacement has last tick")?;
            let last = r.read_i64("displacement last tick")?;
            has_last.then_some(last)
        } else {
            let last = r.read_i64("displacement last tick")?;
            (last >= 0).then_some(last)
        };
        let state = r.read_i32("displacement rng")? as u32;
        r.read_sentinel()?;
        Ok(Self {
            rate,
            accumulated,
            last_tick_ms,
            rng: SimpleRng::from_state(state),
        })
    }
}
