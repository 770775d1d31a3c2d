//! Directional working sets for the translation sweeps
//!
//! Sweeps run z, x, y, so the z set needs the widest ghost extension and
//! the y set the narrowest. Sets are built y first, then x from y, then z
//! from x. Construction is sequential with append-only insertion order.

use kernel::{Axis, CellId, VLASOV_STENCIL_WIDTH};
use rustc_hash::FxHashSet;

use crate::grid::RankGrid;

/// Ordered cell list with duplicate suppression
#[derive(Debug, Clone, Default)]
struct OrderedSet {
    ids: Vec<CellId>,
    members: FxHashSet<CellId>,
}

impl OrderedSet {
    fn push(&mut self, id: CellId) {
        if self.members.insert(id) {
            self.ids.push(id);
        }
    }
}

/// Per-axis working sets for one timestep
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellSets {
    /// Cells swept along y
    pub y: Vec<CellId>,
    /// Cells swept along x
    pub x: Vec<CellId>,
    /// Cells swept along z
    pub z: Vec<CellId>,
    /// Zero-initialized pencil weight counters (one per z-set cell plus a
    /// trailing total); empty unless rebalancing under refinement
    pub pencil_weights: Vec<u32>,
}

impl CellSets {
    /// Working set of the sweep along `axis`.
    pub fn for_axis(&self, axis: Axis) -> &[CellId] {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }
}

/// True if `id` is held by the grid and its boundary type allows translation.
fn is_translatable(grid: &RankGrid, id: CellId) -> bool {
    grid.cell(id).map_or(false, |c| c.sysboundary.is_propagated())
}

/// Ghost face neighbors of `id` along `axis` that may join a set.
fn ghost_neighbors(grid: &RankGrid, id: CellId, axis: Axis) -> Vec<CellId> {
    grid.face_neighbors(id)
        .into_iter()
        .filter(|&(_, dir)| dir.axis() == axis)
        .filter_map(|(n, _)| n)
        .filter(|&n| !grid.is_local(n) && is_translatable(grid, n))
        .collect()
}

/// Append one layer of `axis` ghost neighbors of the cells present when
/// the layer starts.
fn extend_layer(grid: &RankGrid, set: &mut OrderedSet, axis: Axis) {
    let layer_end = set.ids.len();
    for c in 0..layer_end {
        for n in ghost_neighbors(grid, set.ids[c], axis) {
            set.push(n);
        }
    }
}

/// Build the y, x, and z working sets of `grid`.
///
/// With `allocate_pencil_weights` a zeroed weight counter is allocated per
/// z-set cell plus one trailing aggregate slot.
pub fn build_cell_sets(grid: &RankGrid, allocate_pencil_weights: bool) -> CellSets {
    let mut y = OrderedSet::default();
    for &id in grid.local_cells() {
        if is_translatable(grid, id) {
            y.push(id);
        }
        for n in ghost_neighbors(grid, id, Axis::Y) {
            y.push(n);
        }
    }

    let mut x = y.clone();
    for _ in 0..VLASOV_STENCIL_WIDTH {
        extend_layer(grid, &mut x, Axis::Y);
    }
    extend_layer(grid, &mut x, Axis::X);

    let mut z = x.clone();
    for _ in 0..VLASOV_STENCIL_WIDTH {
        extend_layer(grid, &mut z, Axis::X);
    }
    extend_layer(grid, &mut z, Axis::Z);

    let pencil_weights = if allocate_pencil_weights {
        vec![0; z.ids.len() + 1]
    } else {
        Vec::new()
    };

    tracing::debug!(
        "Rank {} cell sets: y={}, x={}, z={}",
        grid.rank(),
        y.ids.len(),
        x.ids.len(),
        z.ids.len()
    );

    CellSets {
        y: y.ids,
        x: x.ids,
        z: z.ids,
        pencil_weights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::tests::test_config;
    use crate::mesh::MeshTopology;
    use crate::sysboundary::classify_sysboundaries;

    fn grid(cells: [usize; 3], ranks: usize, rank: usize) -> RankGrid {
        let topo = Arc::new(MeshTopology::new(&test_config(cells, ranks)));
        let mut grid = RankGrid::new(topo, rank, 1);
        classify_sysboundaries(&mut grid);
        grid
    }

    fn has_duplicates(ids: &[CellId]) -> bool {
        let set: FxHashSet<CellId> = ids.iter().copied().collect();
        set.len() != ids.len()
    }

    #[test]
    fn test_single_rank_sets_equal_local_cells() {
        let g = grid([3, 1, 1], 1, 0);
        let sets = build_cell_sets(&g, false);
        assert_eq!(sets.y, vec![1, 2, 3]);
        assert_eq!(sets.x, sets.y);
        assert_eq!(sets.z, sets.y);
        assert!(sets.pencil_weights.is_empty());
    }

    #[test]
    fn test_ghost_extension_along_split_axis() {
        // Split along y: ghosts appear only in y layers
        let g = grid([2, 16, 1], 2, 0);
        let sets = build_cell_sets(&g, false);
        let local = g.local_cells().len();
        // One y layer each side (2 cells per layer) in the y set
        assert_eq!(sets.y.len(), local + 4);
        // Plus two more y layers each side in the x set
        assert_eq!(sets.x.len(), local + 12);
        // No x or z ghosts exist, so z equals x
        assert_eq!(sets.z, sets.x);
        let y: FxHashSet<CellId> = sets.y.iter().copied().collect();
        assert!(g.local_cells().iter().all(|id| y.contains(id)));
        assert_eq!(sets.y[0], 1);
        for ids in [&sets.y, &sets.x, &sets.z] {
            assert!(!has_duplicates(ids));
        }
    }

    #[test]
    fn test_nested_sets() {
        let g = grid([6, 6, 6], 2, 1);
        let sets = build_cell_sets(&g, true);
        let x: FxHashSet<CellId> = sets.x.iter().copied().collect();
        let z: FxHashSet<CellId> = sets.z.iter().copied().collect();
        assert!(sets.y.iter().all(|id| x.contains(id)));
        assert!(sets.x.iter().all(|id| z.contains(id)));
        assert_eq!(sets.pencil_weights.len(), sets.z.len() + 1);
        assert!(sets.pencil_weights.iter().all(|&w| w == 0));
    }
}
