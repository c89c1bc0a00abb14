//! Blockfield module - the two-plane Quantro grid
//!
//! A blockfield is a `[2][R][C]` byte grid stored as one flat array
//! (plane-major, then row, then column) for cache locality.
//! Row 0 is the bottom row. Coordinates outside the grid are simply "not valid".
//!
//! The grid also owns the settling algorithm that drops detached chunks after
//! a clear, since it is pure grid work.

use arrayvec::ArrayVec;

use crate::stream::{StreamError, StreamResult};
use crate::types::{is_linking, Offset, Piece, PieceBlock, CHUNK_TYPE, EMPTY, PLANES, S0, S1, SL};

/// A single addressed cell: (plane, row, col).
pub type CellRef = (usize, usize, usize);

/// A chunk that moved while settling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledChunk {
    pub piece: Piece,
    pub original: Offset,
    pub fell_to: Offset,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Blockfield {
    rows: usize,
    cols: usize,
    cells: Vec<u8>,
}

impl Blockfield {
    /// Create a new empty field
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![EMPTY; PLANES * rows * cols],
        }
    }

    #[inline(always)]
    fn index(&self, plane: usize, row: i32, col: i32) -> Option<usize> {
        if plane >= PLANES
            || row < 0
            || col < 0
            || row as usize >= self.rows
            || col as usize >= self.cols
        {
            return None;
        }
        Some((plane * self.rows + row as usize) * self.cols + col as usize)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Get cell value; None if out of bounds
    pub fn get(&self, plane: usize, row: i32, col: i32) -> Option<u8> {
        self.index(plane, row, col).map(|i| self.cells[i])
    }

    /// Set cell value; false if out of bounds
    pub fn set(&mut self, plane: usize, row: i32, col: i32, value: u8) -> bool {
        match self.index(plane, row, col) {
            Some(i) => {
                self.cells[i] = value;
                true
            }
            None => false,
        }
    }

    /// In bounds and empty
    pub fn is_valid(&self, plane: usize, row: i32, col: i32) -> bool {
        matches!(self.get(plane, row, col), Some(EMPTY))
    }

    pub fn is_occupied(&self, plane: usize, row: i32, col: i32) -> bool {
        matches!(self.get(plane, row, col), Some(v) if v != EMPTY)
    }

    pub fn clear(&mut self) {
        self.cells.fill(EMPTY);
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|&c| c == EMPTY)
    }

    pub fn count_blocks(&self) -> usize {
        self.cells.iter().filter(|&&c| c != EMPTY).count()
    }

    fn row_slice(&self, plane: usize, row: usize) -> &[u8] {
        let start = (plane * self.rows + row) * self.cols;
        &self.cells[start..start + self.cols]
    }

    fn row_slice_mut(&mut self, plane: usize, row: usize) -> &mut [u8] {
        let start = (plane * self.rows + row) * self.cols;
        &mut self.cells[start..start + self.cols]
    }

    /// Every cell of this plane-row is filled.
    pub fn is_plane_row_full(&self, plane: usize, row: usize) -> bool {
        row < self.rows && self.row_slice(plane, row).iter().all(|&c| c != EMPTY)
    }

    /// Both planes are full and every one of the `2 * C` cells holds one value.
    pub fn is_row_uniform(&self, row: usize) -> bool {
        if !(0..PLANES).all(|p| self.is_plane_row_full(p, row)) {
            return false;
        }
        let first = self.row_slice(0, row)[0];
        (0..PLANES).all(|p| self.row_slice(p, row).iter().all(|&c| c == first))
    }

    pub fn is_row_empty(&self, row: usize) -> bool {
        (0..PLANES).all(|p| self.row_slice(p, row).iter().all(|&c| c == EMPTY))
    }

    /// Any block at or above `row` in either plane.
    pub fn any_block_at_or_above(&self, row: usize) -> bool {
        (row..self.rows).any(|r| !self.is_row_empty(r))
    }

    /// Height of a column: one above its highest block, 0 when empty.
    pub fn column_height(&self, col: usize) -> usize {
        (0..self.rows)
            .rev()
            .find(|&r| (0..PLANES).any(|p| self.row_slice(p, r)[col] != EMPTY))
            .map(|r| r + 1)
            .unwrap_or(0)
    }

    /// Copy one full plane-row pair (both planes) from another field.
    pub fn copy_row_from(&mut self, src: &Blockfield, src_row: usize, dst_row: usize) {
        debug_assert_eq!(self.cols, src.cols);
        for p in 0..PLANES {
            let row = src.row_slice(p, src_row).to_vec();
            self.row_slice_mut(p, dst_row).copy_from_slice(&row);
        }
    }

    /// Shift everything up by `n` rows (top rows fall off) and empty the bottom `n`.
    pub fn insert_bottom_rows(&mut self, n: usize) {
        let n = n.min(self.rows);
        if n == 0 {
            return;
        }
        let width = self.cols;
        for p in 0..PLANES {
            let base = p * self.rows * width;
            self.cells
                .copy_within(base..base + (self.rows - n) * width, base + n * width);
            self.cells[base..base + n * width].fill(EMPTY);
        }
    }

    /// Remove the bottom `n` rows, shifting everything down; the top `n` become empty.
    pub fn remove_bottom_rows(&mut self, n: usize) {
        let n = n.min(self.rows);
        if n == 0 {
            return;
        }
        let width = self.cols;
        for p in 0..PLANES {
            let base = p * self.rows * width;
            self.cells
                .copy_within(base + n * width..base + self.rows * width, base);
            let top = base + (self.rows - n) * width;
            self.cells[top..base + self.rows * width].fill(EMPTY);
        }
    }

    /// Rows from the bottom that hold at least one block, counted contiguously.
    pub fn occupied_bottom_rows(&self) -> usize {
        (0..self.rows).take_while(|&r| !self.is_row_empty(r)).count()
    }

    /// True if every block of `piece` placed at `offset` lands on an empty cell.
    pub fn can_place(&self, piece: &Piece, offset: Offset) -> bool {
        piece.blocks.iter().all(|b| {
            self.is_valid(b.plane as usize, offset.y + b.y, offset.x + b.x)
        })
    }

    /// How far `piece` can fall from `offset` before touching something.
    pub fn drop_distance(&self, piece: &Piece, offset: Offset) -> i32 {
        let mut d = 0;
        while self.can_place(piece, offset.translated(0, -(d + 1))) {
            d += 1;
        }
        d
    }

    /// Write `piece` into the grid. `value` overrides the block values when set.
    /// Cells outside the grid are skipped; returns false if any were.
    pub fn write_piece(&mut self, piece: &Piece, offset: Offset, value: Option<u8>) -> bool {
        let mut all_in = true;
        for b in &piece.blocks {
            let v = value.unwrap_or(b.value);
            all_in &= self.set(b.plane as usize, offset.y + b.y, offset.x + b.x, v);
        }
        all_in
    }

    /// Empty every cell covered by `piece`; returns the number of blocks erased.
    pub fn erase_piece(&mut self, piece: &Piece, offset: Offset) -> usize {
        let mut erased = 0;
        for b in &piece.blocks {
            let (p, r, c) = (b.plane as usize, offset.y + b.y, offset.x + b.x);
            if self.is_occupied(p, r, c) {
                self.set(p, r, c, EMPTY);
                self.unlink_partner(p, r, c);
                erased += 1;
            }
        }
        erased
    }

    /// After one half of a linked SL cell vanished, demote the other half.
    fn unlink_partner(&mut self, plane: usize, row: i32, col: i32) {
        let other = 1 - plane;
        if self.get(other, row, col) == Some(SL) {
            self.set(other, row, col, if other == 0 { S0 } else { S1 });
        }
    }

    /// Empty the given plane-rows, demoting orphaned SL halves.
    /// Returns the removed cells as a grid of the same shape.
    pub fn clear_plane_rows(&mut self, cleared: &[(usize, usize)]) -> Blockfield {
        let mut removed = Blockfield::new(self.rows, self.cols);
        for &(plane, row) in cleared {
            let values = self.row_slice(plane, row).to_vec();
            removed.row_slice_mut(plane, row).copy_from_slice(&values);
            self.row_slice_mut(plane, row).fill(EMPTY);
        }
        for &(plane, row) in cleared {
            for col in 0..self.cols {
                self.unlink_partner(plane, row as i32, col as i32);
            }
        }
        removed
    }

    fn neighbours(&self, (p, r, c): CellRef) -> ArrayVec<CellRef, 5> {
        let mut out = ArrayVec::new();
        if r > 0 {
            out.push((p, r - 1, c));
        }
        if r + 1 < self.rows {
            out.push((p, r + 1, c));
        }
        if c > 0 {
            out.push((p, r, c - 1));
        }
        if c + 1 < self.cols {
            out.push((p, r, c + 1));
        }
        let other = 1 - p;
        let here = self.row_slice(p, r)[c];
        let there = self.row_slice(other, r)[c];
        if is_linking(here) && is_linking(there) {
            out.push((other, r, c));
        }
        out
    }

    /// Connected groups of blocks. Same-plane orthogonal neighbours connect;
    /// a cell whose two plane halves are both linking values connects across planes.
    pub fn connected_chunks(&self) -> Vec<Vec<CellRef>> {
        let mut seen = vec![false; self.cells.len()];
        let mut chunks = Vec::new();

        for p in 0..PLANES {
            for r in 0..self.rows {
                for c in 0..self.cols {
                    let start = (p * self.rows + r) * self.cols + c;
                    if seen[start] || self.cells[start] == EMPTY {
                        continue;
                    }
                    seen[start] = true;
                    let mut chunk = Vec::new();
                    let mut stack = vec![(p, r, c)];
                    while let Some(cell) = stack.pop() {
                        chunk.push(cell);
                        for n in self.neighbours(cell) {
                            let i = (n.0 * self.rows + n.1) * self.cols + n.2;
                            if !seen[i] && self.cells[i] != EMPTY {
                                seen[i] = true;
                                stack.push(n);
                            }
                        }
                    }
                    chunks.push(chunk);
                }
            }
        }

        chunks
    }

    /// Drop every detached chunk as far as it falls, lowest first, until
    /// nothing moves. Returns the chunks that moved.
    pub fn settle_chunks(&mut self) -> Vec<SettledChunk> {
        let mut chunks: Vec<(Piece, Offset, i32)> = self
            .connected_chunks()
            .into_iter()
            .map(|cells| {
                let min_row = cells.iter().map(|c| c.1).min().unwrap_or(0) as i32;
                let min_col = cells.iter().map(|c| c.2).min().unwrap_or(0) as i32;
                let blocks = cells
                    .iter()
                    .map(|&(p, r, c)| {
                        PieceBlock::new(
                            c as i32 - min_col,
                            r as i32 - min_row,
                            p as u8,
                            self.row_slice(p, r)[c],
                        )
                    })
                    .collect();
                (
                    Piece::new(CHUNK_TYPE, 0, blocks),
                    Offset::new(min_col, min_row),
                    0,
                )
            })
            .collect();
        chunks.sort_by_key(|(_, o, _)| (o.y, o.x));

        loop {
            let mut moved = false;
            for (piece, original, fallen) in chunks.iter_mut() {
                let at = original.translated(0, -*fallen);
                self.erase_raw(piece, at);
                let d = self.drop_distance(piece, at);
                self.write_piece(piece, at.translated(0, -d), None);
                if d > 0 {
                    *fallen += d;
                    moved = true;
                }
            }
            if !moved {
                break;
            }
        }

        chunks
            .into_iter()
            .filter(|(_, _, fallen)| *fallen > 0)
            .map(|(piece, original, fallen)| SettledChunk {
                piece,
                original,
                fell_to: original.translated(0, -fallen),
            })
            .collect()
    }

    fn erase_raw(&mut self, piece: &Piece, offset: Offset) {
        for b in &piece.blocks {
            self.set(b.plane as usize, offset.y + b.y, offset.x + b.x, EMPTY);
        }
    }

    /// Reversible text form: `"{planes}x{rows}x{cols}:"` followed by hex bytes.
    pub fn encode(&self) -> String {
        format!(
            "{}x{}x{}:{}",
            PLANES,
            self.rows,
            self.cols,
            hex::encode(&self.cells)
        )
    }

    /// Inverse of [`Blockfield::encode`].
    pub fn decode(s: &str) -> StreamResult<Self> {
        let bad = || StreamError::Mismatch(format!("bad blockfield encoding ({} chars)", s.len()));
        let (dims, body) = s.split_once(':').ok_or_else(bad)?;
        let mut it = dims.split('x').map(|d| d.parse::<usize>());
        let planes = it.next().and_then(|r| r.ok()).ok_or_else(bad)?;
        let rows = it.next().and_then(|r| r.ok()).ok_or_else(bad)?;
        let cols = it.next().and_then(|r| r.ok()).ok_or_else(bad)?;
        if it.next().is_some() || planes != PLANES {
            return Err(bad());
        }
        let size = PLANES
            .checked_mul(rows)
            .and_then(|n| n.checked_mul(cols))
            .ok_or_else(bad)?;
        if body.len() % 2 != 0 || body.len() / 2 != size {
            return Err(bad());
        }
        let cells = hex::decode(body).map_err(|_| bad())?;
        if cells.len() != size {
            return Err(bad());
        }
        Ok(Self { rows, cols, cells })
    }

    /// Decode and require the given dimensions.
    pub fn decode_sized(s: &str, rows: usize, cols: usize) -> StreamResult<Self> {
        let field = Self::decode(s)?;
        if field.rows != rows || field.cols != cols {
            return Err(StreamError::Mismatch(format!(
                "blockfield is {}x{}, expected {}x{}",
                field.rows, field.cols, rows, cols
            )));
        }
        Ok(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GARBAGE;

    fn fill_plane_row(f: &mut Blockfield, plane: usize, row: i32, value: u8) {
        for c in 0..f.cols() as i32 {
            f.set(plane, row, c, value);
        }
    }

    #[test]
    fn index_bounds() {
        let f = Blockfield::new(8, 4);
        assert_eq!(f.index(0, 0, 0), Some(0));
        assert_eq!(f.index(1, 0, 0), Some(32));
        assert_eq!(f.index(0, 7, 3), Some(31));
        assert_eq!(f.index(2, 0, 0), None);
        assert_eq!(f.index(0, 8, 0), None);
        assert_eq!(f.index(0, 0, -1), None);
    }

    #[test]
    fn encode_is_bit_exact() {
        let mut f = Blockfield::new(6, 5);
        f.set(0, 0, 0, S0);
        f.set(1, 5, 4, 0xff);
        f.set(1, 2, 3, GARBAGE);
        let s = f.encode();
        assert!(s.starts_with("2x6x5:"));
        assert_eq!(Blockfield::decode(&s).unwrap(), f);
        assert!(Blockfield::decode_sized(&s, 6, 4).is_err());
        assert!(Blockfield::decode("3x1x1:000000").is_err());
        assert!(Blockfield::decode("2x1x1:00").is_err());
        assert!(Blockfield::decode("2x1x1:zzzz").is_err());
        assert!(Blockfield::decode("2x9223372036854775807x3:00").is_err());
        assert!(Blockfield::decode(&format!("2x{}x{}:00", usize::MAX, usize::MAX)).is_err());
    }

    #[test]
    fn full_and_uniform_rows() {
        let mut f = Blockfield::new(4, 3);
        fill_plane_row(&mut f, 0, 0, S0);
        assert!(f.is_plane_row_full(0, 0));
        assert!(!f.is_row_uniform(0));
        fill_plane_row(&mut f, 1, 0, S1);
        assert!(!f.is_row_uniform(0));
        fill_plane_row(&mut f, 0, 1, SL);
        fill_plane_row(&mut f, 1, 1, SL);
        assert!(f.is_row_uniform(1));
    }

    #[test]
    fn clearing_one_plane_demotes_sl_partner() {
        let mut f = Blockfield::new(4, 2);
        fill_plane_row(&mut f, 0, 0, SL);
        fill_plane_row(&mut f, 1, 0, SL);
        let removed = f.clear_plane_rows(&[(0, 0)]);
        assert_eq!(f.get(0, 0, 0), Some(EMPTY));
        assert_eq!(f.get(1, 0, 0), Some(S1));
        assert_eq!(removed.get(0, 0, 1), Some(SL));
        assert_eq!(removed.get(1, 0, 1), Some(EMPTY));
    }

    #[test]
    fn insert_and_remove_bottom_rows() {
        let mut f = Blockfield::new(4, 2);
        f.set(0, 0, 0, S0);
        f.set(1, 3, 1, S1);
        f.insert_bottom_rows(1);
        assert_eq!(f.get(0, 1, 0), Some(S0));
        assert!(f.is_row_empty(0));
        // top row fell off
        assert_eq!(f.count_blocks(), 1);
        f.remove_bottom_rows(1);
        assert_eq!(f.get(0, 0, 0), Some(S0));
        assert!(f.is_row_empty(3));
    }

    #[test]
    fn column_height_counts_both_planes() {
        let mut f = Blockfield::new(6, 3);
        assert_eq!(f.column_height(1), 0);
        f.set(1, 3, 1, S1);
        assert_eq!(f.column_height(1), 4);
    }

    #[test]
    fn floating_block_settles_to_floor() {
        let mut f = Blockfield::new(6, 3);
        f.set(0, 4, 1, S0);
        f.set(0, 0, 0, S0);
        let moved = f.settle_chunks();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].original, Offset::new(1, 4));
        assert_eq!(moved[0].fell_to, Offset::new(1, 0));
        assert_eq!(f.get(0, 0, 1), Some(S0));
        assert_eq!(f.get(0, 4, 1), Some(EMPTY));
    }

    #[test]
    fn planes_settle_independently_unless_linked() {
        let mut f = Blockfield::new(6, 2);
        // plane 1 has support at row 0; plane 0 does not
        f.set(1, 0, 0, S1);
        f.set(0, 2, 0, S0);
        f.set(1, 2, 0, S1);
        f.settle_chunks();
        assert_eq!(f.get(0, 0, 0), Some(S0));
        assert_eq!(f.get(1, 1, 0), Some(S1));

        let mut g = Blockfield::new(6, 2);
        g.set(1, 0, 0, S1);
        g.set(0, 2, 0, SL);
        g.set(1, 2, 0, SL);
        g.settle_chunks();
        // linked cell stops on plane-1 support
        assert_eq!(g.get(0, 1, 0), Some(SL));
        assert_eq!(g.get(1, 1, 0), Some(SL));
    }

    #[test]
    fn stacked_chunks_all_settle() {
        let mut f = Blockfield::new(8, 1);
        f.set(0, 3, 0, S0);
        f.set(0, 6, 0, S0);
        // separated by an empty cell so they are distinct chunks
        let moved = f.settle_chunks();
        assert_eq!(moved.len(), 2);
        assert_eq!(f.get(0, 0, 0), Some(S0));
        assert_eq!(f.get(0, 1, 0), Some(S0));
    }

    #[test]
    fn drop_distance_and_place() {
        let mut f = Blockfield::new(6, 3);
        f.set(0, 0, 1, S0);
        let piece = Piece::new(100, 0, vec![PieceBlock::new(0, 0, 0, S0)]);
        assert_eq!(f.drop_distance(&piece, Offset::new(1, 4)), 3);
        assert_eq!(f.drop_distance(&piece, Offset::new(0, 4)), 4);
        assert!(!f.can_place(&piece, Offset::new(1, 0)));
        assert!(!f.can_place(&piece, Offset::new(3, 0)));
    }
}
