//! Pieces module - catalog interface and the tetromino reference catalog
//!
//! The engine never hard-codes shapes. It asks a [`PieceCatalog`] for the cells
//! of a `(type, rotation)` pair, for rotations, and for the upconversion of
//! type ids persisted by older versions.
//!
//! [`TetrominoCatalog`] ships the seven standard tetrominoes in three Quantro
//! variants each: plane 0 only (`S0`), plane 1 only (`S1`), and linked in both
//! planes (`SL`). Type ids are `100 + kind * 3 + variant`.

use crate::types::{is_linking, Piece, PieceBlock, COMPONENT_TYPE, S0, S1, SL};

/// Shape and rotation provider.
pub trait PieceCatalog: Send + Sync {
    /// Cells of `type_id` at `rotation`; None for unknown types.
    fn piece(&self, type_id: i32, rotation: i32) -> Option<Piece>;

    /// The piece turned one step; None if it cannot rotate.
    fn rotate(&self, piece: &Piece, clockwise: bool) -> Option<Piece>;

    /// Type ids the generator draws from.
    fn piece_types(&self) -> &[i32];

    /// Maps an old persisted type id to its current equivalent.
    /// Must be idempotent.
    fn upconvert(&self, type_id: i32) -> i32;
}

/// Number of tetromino kinds (I, O, T, S, Z, J, L).
pub const KIND_COUNT: i32 = 7;

/// First current catalog id.
pub const TYPE_BASE: i32 = 100;

/// Variant index: plane 0 only.
pub const VARIANT_S0: i32 = 0;
/// Variant index: plane 1 only.
pub const VARIANT_S1: i32 = 1;
/// Variant index: linked in both planes.
pub const VARIANT_SL: i32 = 2;

/// Tetromino shapes indexed by `[kind][rotation]`, as (x, y) with y pointing down
/// inside a 4x4 box. Rotation order is N, E, S, W.
const SHAPES: [[[(i8, i8); 4]; 4]; 7] = [
    // I
    [
        [(0, 1), (1, 1), (2, 1), (3, 1)],
        [(2, 0), (2, 1), (2, 2), (2, 3)],
        [(0, 2), (1, 2), (2, 2), (3, 2)],
        [(1, 0), (1, 1), (1, 2), (1, 3)],
    ],
    // O
    [
        [(1, 0), (2, 0), (1, 1), (2, 1)],
        [(1, 0), (2, 0), (1, 1), (2, 1)],
        [(1, 0), (2, 0), (1, 1), (2, 1)],
        [(1, 0), (2, 0), (1, 1), (2, 1)],
    ],
    // T
    [
        [(1, 0), (0, 1), (1, 1), (2, 1)],
        [(1, 0), (1, 1), (2, 1), (1, 2)],
        [(0, 1), (1, 1), (2, 1), (1, 2)],
        [(1, 0), (0, 1), (1, 1), (1, 2)],
    ],
    // S
    [
        [(1, 0), (2, 0), (0, 1), (1, 1)],
        [(1, 0), (1, 1), (2, 1), (2, 2)],
        [(1, 1), (2, 1), (0, 2), (1, 2)],
        [(0, 0), (0, 1), (1, 1), (1, 2)],
    ],
    // Z
    [
        [(0, 0), (1, 0), (1, 1), (2, 1)],
        [(2, 0), (1, 1), (2, 1), (1, 2)],
        [(0, 1), (1, 1), (1, 2), (2, 2)],
        [(1, 0), (0, 1), (1, 1), (0, 2)],
    ],
    // J
    [
        [(0, 0), (0, 1), (1, 1), (2, 1)],
        [(1, 0), (2, 0), (1, 1), (1, 2)],
        [(0, 1), (1, 1), (2, 1), (2, 2)],
        [(1, 0), (1, 1), (0, 2), (1, 2)],
    ],
    // L
    [
        [(2, 0), (0, 1), (1, 1), (2, 1)],
        [(1, 0), (1, 1), (1, 2), (2, 2)],
        [(0, 1), (1, 1), (2, 1), (0, 2)],
        [(0, 0), (1, 0), (1, 1), (1, 2)],
    ],
];

/// Seven tetrominoes times three Quantro variants.
#[derive(Debug, Clone)]
pub struct TetrominoCatalog {
    types: Vec<i32>,
}

impl TetrominoCatalog {
    pub fn new() -> Self {
        let types = (0..KIND_COUNT * 3).map(|i| TYPE_BASE + i).collect();
        Self { types }
    }

    /// Current type id for a kind and variant.
    pub fn type_id(kind: i32, variant: i32) -> i32 {
        TYPE_BASE + kind * 3 + variant
    }

    fn decompose(type_id: i32) -> Option<(usize, i32)> {
        let idx = type_id - TYPE_BASE;
        if !(0..KIND_COUNT * 3).contains(&idx) {
            return None;
        }
        Some(((idx / 3) as usize, idx % 3))
    }
}

impl Default for TetrominoCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl PieceCatalog for TetrominoCatalog {
    fn piece(&self, type_id: i32, rotation: i32) -> Option<Piece> {
        let (kind, variant) = Self::decompose(type_id)?;
        let rotation = rotation.rem_euclid(4);
        let shape = SHAPES[kind][rotation as usize];

        let mut blocks = Vec::with_capacity(8);
        for &(x, y) in &shape {
            // flip into the field's y-up frame
            let (x, y) = (x as i32, 3 - y as i32);
            match variant {
                VARIANT_S0 => blocks.push(PieceBlock::new(x, y, 0, S0)),
                VARIANT_S1 => blocks.push(PieceBlock::new(x, y, 1, S1)),
                _ => {
                    blocks.push(PieceBlock::new(x, y, 0, SL));
                    blocks.push(PieceBlock::new(x, y, 1, SL));
                }
            }
        }
        Some(Piece::new(type_id, rotation, blocks))
    }

    fn rotate(&self, piece: &Piece, clockwise: bool) -> Option<Piece> {
        if piece.is_fragment() {
            return None;
        }
        let step = if clockwise { 1 } else { 3 };
        self.piece(piece.type_id, (piece.rotation + step) % 4)
    }

    fn piece_types(&self) -> &[i32] {
        &self.types
    }

    fn upconvert(&self, type_id: i32) -> i32 {
        // pre-Quantro single-plane ids
        if (0..KIND_COUNT).contains(&type_id) {
            Self::type_id(type_id, VARIANT_S0)
        } else {
            type_id
        }
    }
}

/// Split a piece into its connected components.
///
/// Blocks connect to same-plane orthogonal neighbours, and across planes where
/// both halves of a cell hold a linking value. Each component keeps block
/// coordinates relative to the piece's own frame.
pub fn split_components(piece: &Piece) -> Vec<Piece> {
    let n = piece.blocks.len();
    let mut group = vec![usize::MAX; n];
    let mut out = Vec::new();

    for start in 0..n {
        if group[start] != usize::MAX {
            continue;
        }
        let id = out.len();
        group[start] = id;
        let mut stack = vec![start];
        let mut members = Vec::new();
        while let Some(i) = stack.pop() {
            members.push(piece.blocks[i]);
            let a = piece.blocks[i];
            for (j, b) in piece.blocks.iter().enumerate() {
                if group[j] != usize::MAX {
                    continue;
                }
                let same_plane =
                    a.plane == b.plane && (a.x - b.x).abs() + (a.y - b.y).abs() == 1;
                let linked = a.plane != b.plane
                    && a.x == b.x
                    && a.y == b.y
                    && is_linking(a.value)
                    && is_linking(b.value);
                if same_plane || linked {
                    group[j] = id;
                    stack.push(j);
                }
            }
        }
        out.push(Piece::new(COMPONENT_TYPE, 0, members));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_type_has_four_rotations() {
        let catalog = TetrominoCatalog::new();
        assert_eq!(catalog.piece_types().len(), 21);
        for &t in catalog.piece_types() {
            for r in 0..4 {
                let p = catalog.piece(t, r).unwrap();
                let cells = if (t - TYPE_BASE) % 3 == VARIANT_SL { 8 } else { 4 };
                assert_eq!(p.blocks.len(), cells, "type {} rot {}", t, r);
                assert!(p.blocks.iter().all(|b| (0..4).contains(&b.x) && (0..4).contains(&b.y)));
            }
        }
        assert!(catalog.piece(99, 0).is_none());
    }

    #[test]
    fn variants_pick_planes() {
        let catalog = TetrominoCatalog::new();
        let t = TetrominoCatalog::type_id(2, VARIANT_S1);
        let p = catalog.piece(t, 0).unwrap();
        assert_eq!(p.plane_mask(), 0b10);
        assert!(p.blocks.iter().all(|b| b.value == S1));
        let l = catalog.piece(TetrominoCatalog::type_id(2, VARIANT_SL), 0).unwrap();
        assert_eq!(l.plane_mask(), 0b11);
    }

    #[test]
    fn rotation_cycles() {
        let catalog = TetrominoCatalog::new();
        let t = catalog.piece(TetrominoCatalog::type_id(2, VARIANT_S0), 0).unwrap();
        let mut p = t.clone();
        for _ in 0..4 {
            p = catalog.rotate(&p, true).unwrap();
        }
        assert_eq!(p, t);
        let ccw = catalog.rotate(&t, false).unwrap();
        assert_eq!(ccw.rotation, 3);
    }

    #[test]
    fn fragments_do_not_rotate() {
        let catalog = TetrominoCatalog::new();
        let frag = Piece::new(COMPONENT_TYPE, 0, vec![PieceBlock::new(0, 0, 0, S0)]);
        assert!(catalog.rotate(&frag, true).is_none());
    }

    #[test]
    fn upconvert_is_idempotent() {
        let catalog = TetrominoCatalog::new();
        for t in [-3, -2, 0, 3, 6, 7, 50, 100, 120, 999] {
            let once = catalog.upconvert(t);
            assert_eq!(catalog.upconvert(once), once);
        }
        assert_eq!(catalog.upconvert(2), TetrominoCatalog::type_id(2, VARIANT_S0));
        assert_eq!(catalog.upconvert(-2), -2);
    }

    #[test]
    fn split_keeps_linked_piece_whole() {
        let catalog = TetrominoCatalog::new();
        let sl = catalog.piece(TetrominoCatalog::type_id(0, VARIANT_SL), 0).unwrap();
        assert_eq!(split_components(&sl).len(), 1);
        let s0 = catalog.piece(TetrominoCatalog::type_id(0, VARIANT_S0), 0).unwrap();
        assert_eq!(split_components(&s0).len(), 1);
    }

    #[test]
    fn split_separates_disjoint_planes() {
        let piece = Piece::new(
            500,
            0,
            vec![
                PieceBlock::new(0, 0, 0, S0),
                PieceBlock::new(1, 0, 0, S0),
                PieceBlock::new(0, 0, 1, S1),
            ],
        );
        let parts = split_components(&piece);
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.type_id == COMPONENT_TYPE));
    }
}
