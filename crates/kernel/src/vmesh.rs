//! Sparse velocity mesh: fixed-size blocks kept only around content.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::species::VelocityGrid;

/// Velocity cells per block edge.
pub const WID: usize = 4;
/// Velocity cells per block face.
pub const WID2: usize = WID * WID;
/// Velocity cells per block.
pub const WID3: usize = WID * WID * WID;

/// Global block index on a [`VelocityGrid`].
pub type BlockId = u32;

/// Phase-space density averages of one block, x fastest.
pub type Block = [f64; WID3];

/// Index of cell `[i, j, k]` inside a block.
#[inline]
pub fn cell_index(cell: [usize; 3]) -> usize {
    cell[0] + cell[1] * WID + cell[2] * WID2
}

/// Sparse collection of velocity blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VelocityMesh {
    blocks: FxHashMap<BlockId, Box<Block>>,
}

impl VelocityMesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// True if the mesh holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// True if block `id` exists.
    pub fn contains(&self, id: BlockId) -> bool {
        self.blocks.contains_key(&id)
    }

    /// Block data, if present.
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id).map(|b| &**b)
    }

    /// Mutable block data, if present.
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.get_mut(&id).map(|b| &mut **b)
    }

    /// Block data, creating a zeroed block if missing.
    pub fn block_or_insert(&mut self, id: BlockId) -> &mut Block {
        self.blocks.entry(id).or_insert_with(|| Box::new([0.0; WID3]))
    }

    /// Replace (or create) block `id`.
    pub fn insert(&mut self, id: BlockId, data: Block) {
        self.blocks.insert(id, Box::new(data));
    }

    /// Remove block `id`, returning its data.
    pub fn remove(&mut self, id: BlockId) -> Option<Block> {
        self.blocks.remove(&id).map(|b| *b)
    }

    /// Remove every block.
    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    /// Block IDs in ascending order.
    ///
    /// Reductions iterate in this order so that the result does not depend
    /// on the hash map's insertion history.
    pub fn block_ids(&self) -> Vec<BlockId> {
        let mut ids: Vec<BlockId> = self.blocks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Iterate `(id, block)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks.iter().map(|(&id, b)| (id, &**b))
    }

    /// Value of the velocity cell containing `v` (zero if absent or off-grid).
    pub fn get_value(&self, grid: &VelocityGrid, v: [f64; 3]) -> f64 {
        match grid.locate(v) {
            Some((id, cell)) => self.block(id).map_or(0.0, |b| b[cell_index(cell)]),
            None => 0.0,
        }
    }

    /// Set the velocity cell containing `v`, creating its block. Off-grid
    /// velocities are ignored.
    pub fn set_value(&mut self, grid: &VelocityGrid, v: [f64; 3], value: f64) {
        if let Some((id, cell)) = grid.locate(v) {
            self.block_or_insert(id)[cell_index(cell)] = value;
        }
    }

    /// True if any cell of block `id` reaches `cutoff`.
    pub fn has_content(&self, id: BlockId, cutoff: f64) -> bool {
        self.block(id)
            .map_or(false, |b| b.iter().any(|&f| f >= cutoff))
    }

    /// IDs of blocks with content, ascending.
    pub fn content_blocks(&self, cutoff: f64) -> Vec<BlockId> {
        let mut ids: Vec<BlockId> = self
            .blocks
            .iter()
            .filter(|(_, b)| b.iter().any(|&f| f >= cutoff))
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Sum of all cell values (phase-space density times cell count).
    pub fn total(&self) -> f64 {
        self.block_ids()
            .iter()
            .filter_map(|id| self.block(*id))
            .map(|b| b.iter().sum::<f64>())
            .sum()
    }

    /// Add and remove blocks so that exactly the required set exists.
    ///
    /// The required set is every block with content, its velocity-space
    /// face neighbors, and every block in `spatial_content` (content lists
    /// of the spatial face neighbors). Returns `(added, removed)`.
    pub fn adjust(
        &mut self,
        grid: &VelocityGrid,
        cutoff: f64,
        spatial_content: &FxHashSet<BlockId>,
    ) -> (usize, usize) {
        let mut required: FxHashSet<BlockId> = spatial_content.clone();
        for id in self.content_blocks(cutoff) {
            required.insert(id);
            let idx = grid.block_indices(id);
            for a in 0..3 {
                for d in [-1_i64, 1] {
                    let mut n = idx;
                    n[a] += d;
                    if let Some(nid) = grid.block_id(n) {
                        required.insert(nid);
                    }
                }
            }
        }

        let before = self.blocks.len();
        self.blocks.retain(|id, _| required.contains(id));
        let removed = before - self.blocks.len();

        let mut added = 0;
        for id in required {
            if !self.blocks.contains_key(&id) {
                self.blocks.insert(id, Box::new([0.0; WID3]));
                added += 1;
            }
        }
        (added, removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> VelocityGrid {
        VelocityGrid {
            min: [-8.0, -8.0, -8.0],
            max: [8.0, 8.0, 8.0],
            blocks: [4, 4, 4],
        }
    }

    #[test]
    fn test_set_get_value() {
        let g = grid();
        let mut mesh = VelocityMesh::new();
        mesh.set_value(&g, [0.5, 0.5, 0.5], 3.0);
        assert_eq!(mesh.len(), 1);
        assert_eq!(mesh.get_value(&g, [0.7, 0.2, 0.9]), 3.0);
        assert_eq!(mesh.get_value(&g, [-0.5, 0.5, 0.5]), 0.0);
        mesh.set_value(&g, [100.0, 0.0, 0.0], 1.0);
        assert_eq!(mesh.len(), 1, "off-grid writes are ignored");
    }

    #[test]
    fn test_adjust_keeps_content_and_neighbors() {
        let g = grid();
        let mut mesh = VelocityMesh::new();
        mesh.set_value(&g, [0.5, 0.5, 0.5], 1.0);
        let center = g.locate([0.5, 0.5, 0.5]).unwrap().0;

        // A far-away block with sub-cutoff residue
        mesh.set_value(&g, [-7.5, -7.5, -7.5], 1e-20);
        let far = g.locate([-7.5, -7.5, -7.5]).unwrap().0;

        let (added, removed) = mesh.adjust(&g, 1e-15, &FxHashSet::default());
        assert_eq!(removed, 1);
        assert_eq!(added, 6);
        assert!(mesh.contains(center));
        assert!(!mesh.contains(far));
        assert_eq!(mesh.len(), 7);
    }

    #[test]
    fn test_adjust_includes_spatial_neighbor_content() {
        let g = grid();
        let mut mesh = VelocityMesh::new();
        let mut incoming = FxHashSet::default();
        incoming.insert(5);
        let (added, removed) = mesh.adjust(&g, 1e-15, &incoming);
        assert_eq!((added, removed), (1, 0));
        assert!(mesh.contains(5));
        assert!(!mesh.has_content(5, 1e-15));
    }

    #[test]
    fn test_content_blocks_sorted() {
        let g = grid();
        let mut mesh = VelocityMesh::new();
        mesh.set_value(&g, [7.5, 7.5, 7.5], 1.0);
        mesh.set_value(&g, [-7.5, -7.5, -7.5], 1.0);
        mesh.set_value(&g, [0.5, -7.5, -7.5], 1e-30);
        let ids = mesh.content_blocks(1e-15);
        assert_eq!(ids.len(), 2);
        assert!(ids[0] < ids[1]);
    }
}
