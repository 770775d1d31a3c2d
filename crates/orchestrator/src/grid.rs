//! One rank's view of the mesh: owned cells plus ghost copies

use std::sync::Arc;

use kernel::{CellId, FaceDirection, SpatialCell};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::mesh::MeshTopology;

/// Cells held by one rank
#[derive(Debug)]
pub struct RankGrid {
    rank: usize,
    topology: Arc<MeshTopology>,
    cells: FxHashMap<CellId, SpatialCell>,
    local: Vec<CellId>,
    ghost_owners: Vec<(CellId, usize)>,
    exports: Vec<CellId>,
}

impl RankGrid {
    /// Allocate the local and ghost cells of `rank` with `n_species`
    /// empty populations each.
    pub fn new(topology: Arc<MeshTopology>, rank: usize, n_species: usize) -> Self {
        let local = topology.local_cells(rank);
        let ghost_owners: Vec<(CellId, usize)> = topology
            .halo_cells(rank)
            .into_iter()
            .map(|id| (id, topology.owner(id)))
            .collect();

        // Local cells that appear in some other rank's halo
        let mut exported: FxHashSet<CellId> = FxHashSet::default();
        for other in (0..topology.ranks()).filter(|&r| r != rank) {
            exported.extend(
                topology
                    .halo_cells(other)
                    .into_iter()
                    .filter(|&id| topology.owner(id) == rank),
            );
        }
        let mut exports: Vec<CellId> = exported.into_iter().collect();
        exports.sort_unstable();

        let mut cells = FxHashMap::default();
        for &id in local.iter().chain(ghost_owners.iter().map(|(id, _)| id)) {
            let mut cell = SpatialCell::new(id, topology.cell_params(id), n_species);
            cell.refinement_level = topology.refinement_level(id);
            cells.insert(id, cell);
        }

        tracing::debug!(
            "Rank {}: {} local cells, {} ghosts, {} exported",
            rank,
            local.len(),
            ghost_owners.len(),
            exports.len()
        );

        Self {
            rank,
            topology,
            cells,
            local,
            ghost_owners,
            exports,
        }
    }

    /// Owning rank of this view
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Global topology
    pub fn topology(&self) -> &MeshTopology {
        &self.topology
    }

    /// Owned cells, ascending
    pub fn local_cells(&self) -> &[CellId] {
        &self.local
    }

    /// Ghost cells with their owners, ascending by cell
    pub fn ghost_owners(&self) -> &[(CellId, usize)] {
        &self.ghost_owners
    }

    /// Owned cells that other ranks hold ghost copies of
    pub fn exports(&self) -> &[CellId] {
        &self.exports
    }

    /// True if this rank owns `id`.
    pub fn is_local(&self, id: CellId) -> bool {
        self.topology.owner(id) == self.rank
    }

    /// Cell data, local or ghost.
    pub fn cell(&self, id: CellId) -> Option<&SpatialCell> {
        self.cells.get(&id)
    }

    /// Mutable cell data, local or ghost.
    pub fn cell_mut(&mut self, id: CellId) -> Option<&mut SpatialCell> {
        self.cells.get_mut(&id)
    }

    /// Face neighbor of `id` across `dir`, if this rank holds it.
    pub fn neighbor(&self, id: CellId, dir: FaceDirection) -> Option<CellId> {
        self.topology
            .neighbor(id, dir)
            .filter(|n| self.cells.contains_key(n))
    }

    /// Cell `steps` cells from `id` across `dir`, if this rank holds it.
    pub fn neighbor_at(&self, id: CellId, dir: FaceDirection, steps: i64) -> Option<CellId> {
        self.topology
            .neighbor_at(id, dir, steps)
            .filter(|n| self.cells.contains_key(n))
    }

    /// `(neighbor, direction)` pairs of `id`; neighbors this rank does not
    /// hold are `None`.
    pub fn face_neighbors(&self, id: CellId) -> Vec<(Option<CellId>, FaceDirection)> {
        self.topology
            .face_neighbors(id)
            .into_iter()
            .map(|(n, dir)| (n.filter(|n| self.cells.contains_key(n)), dir))
            .collect()
    }

    /// Mutable references to the held cells in `ids`, in unspecified order.
    pub fn cells_mut(&mut self, ids: &[CellId]) -> Vec<&mut SpatialCell> {
        let wanted: FxHashSet<CellId> = ids.iter().copied().collect();
        self.cells
            .iter_mut()
            .filter(|(id, _)| wanted.contains(*id))
            .map(|(_, cell)| cell)
            .collect()
    }

    /// Mutable references to every owned cell, in unspecified order.
    pub fn local_cells_mut(&mut self) -> Vec<&mut SpatialCell> {
        let rank = self.rank;
        let topology = &self.topology;
        self.cells
            .iter_mut()
            .filter(|(id, _)| topology.owner(**id) == rank)
            .map(|(_, cell)| cell)
            .collect()
    }

    /// Owned cells in ascending ID order.
    pub fn iter_local(&self) -> impl Iterator<Item = &SpatialCell> {
        self.local.iter().filter_map(|id| self.cells.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;

    #[test]
    fn test_single_rank_has_no_ghosts() {
        let topo = Arc::new(MeshTopology::new(&test_config([3, 1, 1], 1)));
        let grid = RankGrid::new(topo, 0, 1);
        assert_eq!(grid.local_cells(), &[1, 2, 3]);
        assert!(grid.ghost_owners().is_empty());
        assert!(grid.exports().is_empty());
        assert!(grid.is_local(2));
    }

    #[test]
    fn test_two_ranks_mirror_exports() {
        let topo = Arc::new(MeshTopology::new(&test_config([8, 1, 1], 2)));
        let g0 = RankGrid::new(Arc::clone(&topo), 0, 1);
        let g1 = RankGrid::new(topo, 1, 1);
        let ghosts0: Vec<CellId> = g0.ghost_owners().iter().map(|&(id, _)| id).collect();
        assert_eq!(ghosts0, g1.exports());
        assert!(g0.ghost_owners().iter().all(|&(_, owner)| owner == 1));
        assert!(g0.cell(ghosts0[0]).is_some());
        assert!(!g0.is_local(ghosts0[0]));
    }

    #[test]
    fn test_neighbors_limited_to_held_cells() {
        let topo = Arc::new(MeshTopology::new(&test_config([16, 1, 1], 2)));
        let grid = RankGrid::new(topo, 0, 1);
        // Rank 0 owns x = 0..8 and holds ghosts three layers deep each side
        assert_eq!(grid.neighbor_at(1, FaceDirection::NegX, 3), Some(14));
        assert_eq!(grid.neighbor_at(8, FaceDirection::PosX, 3), Some(11));
        assert_eq!(grid.neighbor_at(8, FaceDirection::PosX, 4), None);
        let n: Vec<_> = grid.face_neighbors(1).into_iter().filter(|(n, _)| n.is_some()).collect();
        assert_eq!(n.len(), 6);
    }
}
