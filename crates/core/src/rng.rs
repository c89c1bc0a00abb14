//! RNG module - bag-based piece generation
//!
//! Every catalog type goes into a bag, the bag is shuffled, and pieces are drawn
//! until it is empty before a new bag is generated. The generator runs three
//! independent streams from one seed:
//!
//! - **advancement**: feeds the `next` queue
//! - **reserve**: feeds the `reserve` queue (seeded with `seed ^ RESERVE_SALT`)
//! - **garbage**: hole and column choices for garbage rows (`seed ^ GARBAGE_SALT`)
//!
//! A simple LCG keeps the whole thing deterministic and serializable.

use crate::stream::{StreamError, StreamReader, StreamResult, StreamWriter};

/// XOR-ed into the seed for the reserve stream.
pub const RESERVE_SALT: u32 = 0x9e37_79b9;

/// XOR-ed into the seed for garbage placement.
pub const GARBAGE_SALT: u32 = 0x85eb_ca6b;

const BLOB_VERSION: i32 = 0;

/// Simple LCG (Linear Congruential Generator) RNG
/// Uses constants from Numerical Recipes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleRng {
    state: u32,
}

impl SimpleRng {
    /// Create a new RNG with the given seed
    pub fn new(seed: u32) -> Self {
        // Avoid 0 seed which would produce all zeros
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Generate next random u32
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(1664525).wrapping_add(1013904223);
        self.state
    }

    /// Generate random value in range [0, max)
    pub fn next_range(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        // high bits of an LCG are the better-distributed ones
        (self.next_u32() >> 8) % max
    }

    /// Shuffle a slice using Fisher-Yates
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        for i in (1..slice.len()).rev() {
            let j = self.next_range((i + 1) as u32) as usize;
            slice.swap(i, j);
        }
    }

    pub fn state(&self) -> u32 {
        self.state
    }

    /// Resume from a saved `state()`.
    pub fn from_state(state: u32) -> Self {
        Self { state }
    }
}

/// One shuffled-bag stream over a fixed set of type ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeBag {
    bag: Vec<i32>,
    bag_index: usize,
    rng: SimpleRng,
}

impl TypeBag {
    pub fn new(seed: u32, types: &[i32]) -> Self {
        let mut bag = Self {
            bag: types.to_vec(),
            bag_index: 0,
            rng: SimpleRng::new(seed),
        };
        bag.refill();
        bag
    }

    fn refill(&mut self) {
        self.bag.sort_unstable();
        self.rng.shuffle(&mut self.bag);
        self.bag_index = 0;
    }

    /// Draw the next type id; None only for an empty type set.
    pub fn draw(&mut self) -> Option<i32> {
        if self.bag.is_empty() {
            return None;
        }
        if self.bag_index >= self.bag.len() {
            self.refill();
        }
        let t = self.bag[self.bag_index];
        self.bag_index += 1;
        Some(t)
    }

    fn write_to<W: std::io::Write>(&self, w: &mut StreamWriter<W>) -> StreamResult<()> {
        w.write_i32(self.rng.state as i32)?;
        w.write_len(self.bag_index)?;
        w.write_i32_slice(&self.bag)
    }

    fn read_from<R: std::io::Read>(r: &mut StreamReader<R>) -> StreamResult<Self> {
        let state = r.read_i32("bag rng state")? as u32;
        let bag_index = r.read_len("bag index")?;
        let bag = r.read_i32_vec("bag contents")?;
        if bag_index > bag.len() {
            return Err(StreamError::Mismatch(format!(
                "bag index {} past bag of {}",
                bag_index,
                bag.len()
            )));
        }
        Ok(Self {
            bag,
            bag_index,
            rng: SimpleRng { state },
        })
    }
}

/// Seeded piece and garbage randomness for one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceGenerator {
    seed: u32,
    types: Vec<i32>,
    advancement: TypeBag,
    reserve: TypeBag,
    garbage: SimpleRng,
}

impl PieceGenerator {
    pub const BLOB_NAME: &'static str = "piece_generator";

    pub fn new(seed: u32, types: &[i32]) -> Self {
        Self {
            seed,
            types: types.to_vec(),
            advancement: TypeBag::new(seed, types),
            reserve: TypeBag::new(seed ^ RESERVE_SALT, types),
            garbage: SimpleRng::new(seed ^ GARBAGE_SALT),
        }
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Reseed every stream as if freshly constructed.
    pub fn set_seed(&mut self, seed: u32) {
        let types = std::mem::take(&mut self.types);
        *self = Self::new(seed, &types);
    }

    pub fn next_type(&mut self) -> Option<i32> {
        self.advancement.draw()
    }

    pub fn next_reserve_type(&mut self) -> Option<i32> {
        self.reserve.draw()
    }

    /// Random value in `[0, max)` from the garbage stream.
    pub fn garbage_range(&mut self, max: u32) -> u32 {
        self.garbage.next_range(max)
    }

    /// Serialize to an opaque system blob payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = StreamWriter::new(Vec::new());
        // writes into a Vec cannot fail
        let _ = self.write_stream(&mut w);
        w.into_inner()
    }

    fn write_stream(&self, w: &mut StreamWriter<Vec<u8>>) -> StreamResult<()> {
        w.write_i32(BLOB_VERSION)?;
        w.write_i32(self.seed as i32)?;
        w.write_i32_slice(&self.types)?;
        self.advancement.write_to(w)?;
        self.reserve.write_to(w)?;
        w.write_i32(self.garbage.state as i32)?;
        w.write_sentinel()
    }

    pub fn from_bytes(bytes: &[u8]) -> StreamResult<Self> {
        let mut r = StreamReader::new(bytes);
        let version = r.read_i32("generator version")?;
        if version != BLOB_VERSION {
            return Err(StreamError::Mismatch(format!(
                "generator blob version {}",
                version
            )));
        }
        let seed = r.read_i32("generator seed")? as u32;
        let types = r.read_i32_vec("generator types")?;
        let advancement = TypeBag::read_from(&mut r)?;
        let reserve = TypeBag::read_from(&mut r)?;
        let garbage = SimpleRng {
            state: r.read_i32("garbage rng state")? as u32,
        };
        r.read_sentinel()?;
        Ok(Self {
            seed,
            types,
            advancement,
            reserve,
            garbage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TYPES: [i32; 7] = [0, 1, 2, 3, 4, 5, 6];

    #[test]
    fn test_rng_deterministic() {
        let mut rng1 = SimpleRng::new(12345);
        let mut rng2 = SimpleRng::new(12345);

        for _ in 0..100 {
            assert_eq!(rng1.next_u32(), rng2.next_u32());
        }
    }

    #[test]
    fn test_rng_zero_seed_is_usable() {
        let mut rng = SimpleRng::new(0);
        assert_ne!(rng.next_u32(), 0);
        assert_eq!(rng.next_range(0), 0);
    }

    #[test]
    fn test_bag_draws_every_type_once() {
        let mut bag = TypeBag::new(1, &TYPES);
        let mut drawn: Vec<i32> = (0..7).filter_map(|_| bag.draw()).collect();
        drawn.sort();
        assert_eq!(drawn, TYPES.to_vec());
    }

    #[test]
    fn test_empty_bag_draws_nothing() {
        let mut bag = TypeBag::new(1, &[]);
        assert_eq!(bag.draw(), None);
    }

    #[test]
    fn test_reserve_stream_differs_from_advancement() {
        let mut g = PieceGenerator::new(42, &TYPES);
        let next: Vec<_> = (0..14).map(|_| g.next_type()).collect();
        let reserve: Vec<_> = (0..14).map(|_| g.next_reserve_type()).collect();
        assert_ne!(next, reserve);
    }

    #[test]
    fn test_set_seed_reproduces_fresh_generator() {
        let mut a = PieceGenerator::new(1, &TYPES);
        a.next_type();
        a.garbage_range(10);
        a.set_seed(77);
        assert_eq!(a, PieceGenerator::new(77, &TYPES));
        assert_eq!(a.seed(), 77);
    }

    #[test]
    fn test_blob_restores_mid_bag() {
        let mut g = PieceGenerator::new(5, &TYPES);
        for _ in 0..3 {
            g.next_type();
            g.next_reserve_type();
        }
        let bytes = g.to_bytes();
        let mut restored = PieceGenerator::from_bytes(&bytes).unwrap();
        assert_eq!(restored, g);
        for _ in 0..20 {
            assert_eq!(restored.next_type(), g.next_type());
        }
        assert!(PieceGenerator::from_bytes(&bytes[..bytes.len() - 2]).is_err());
    }
}
