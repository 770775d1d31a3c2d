//! Emulated distributed mesh: a uniform Cartesian grid split into slabs
//!
//! Cell IDs are `1 + i + j*nx + k*nx*ny`. Ownership is a contiguous slab
//! decomposition along the longest axis; the first `n % ranks` ranks carry
//! one extra layer.

use kernel::{CellId, CellParams, FaceDirection, VLASOV_STENCIL_WIDTH};
use rustc_hash::FxHashSet;

use crate::config::SimulationConfig;

/// Ghost layer depth replicated around every rank's cells
pub const HALO_DEPTH: i64 = VLASOV_STENCIL_WIDTH as i64 + 1;

/// Global mesh topology, shared read-only by every rank
#[derive(Debug, Clone)]
pub struct MeshTopology {
    cells: [usize; 3],
    min: [f64; 3],
    cell_size: [f64; 3],
    periodic: [bool; 3],
    ranks: usize,
    split_axis: usize,
}

impl MeshTopology {
    /// Build the topology described by `config`.
    pub fn new(config: &SimulationConfig) -> Self {
        let cells = config.grid.cells;
        // Longest axis; ties go to the lowest axis
        let mut split_axis = 0;
        for a in 1..3 {
            if cells[a] > cells[split_axis] {
                split_axis = a;
            }
        }
        Self {
            cells,
            min: config.grid.min,
            cell_size: config.cell_size(),
            periodic: config.boundary_conditions.periodic(),
            ranks: config.ranks,
            split_axis,
        }
    }

    /// Cells per axis
    pub fn dims(&self) -> [usize; 3] {
        self.cells
    }

    /// Total number of cells
    pub fn cell_count(&self) -> usize {
        self.cells[0] * self.cells[1] * self.cells[2]
    }

    /// Number of ranks
    pub fn ranks(&self) -> usize {
        self.ranks
    }

    /// Per-axis periodicity
    pub fn periodic(&self) -> [bool; 3] {
        self.periodic
    }

    /// Zero-based row-major index of `id`.
    pub fn index(&self, id: CellId) -> u64 {
        id - 1
    }

    /// Integer coordinates of `id`.
    pub fn ijk(&self, id: CellId) -> [i64; 3] {
        let idx = self.index(id) as usize;
        let [nx, ny, _] = self.cells;
        [
            (idx % nx) as i64,
            ((idx / nx) % ny) as i64,
            (idx / (nx * ny)) as i64,
        ]
    }

    /// Cell at integer coordinates, wrapping periodic axes. `None` past an
    /// open edge.
    pub fn id_at(&self, mut ijk: [i64; 3]) -> Option<CellId> {
        for a in 0..3 {
            let n = self.cells[a] as i64;
            if self.periodic[a] {
                ijk[a] = ijk[a].rem_euclid(n);
            } else if ijk[a] < 0 || ijk[a] >= n {
                return None;
            }
        }
        let [nx, ny, _] = self.cells;
        let idx = ijk[0] as usize + ijk[1] as usize * nx + ijk[2] as usize * nx * ny;
        Some(idx as CellId + 1)
    }

    /// Cell `steps` cells away from `id` across face `dir`.
    pub fn neighbor_at(&self, id: CellId, dir: FaceDirection, steps: i64) -> Option<CellId> {
        let mut ijk = self.ijk(id);
        let off = dir.offset();
        for a in 0..3 {
            ijk[a] += off[a] * steps;
        }
        self.id_at(ijk)
    }

    /// Face neighbor of `id` across `dir`.
    pub fn neighbor(&self, id: CellId, dir: FaceDirection) -> Option<CellId> {
        self.neighbor_at(id, dir, 1)
    }

    /// All six `(neighbor, direction)` pairs of `id`; missing neighbors are `None`.
    pub fn face_neighbors(&self, id: CellId) -> Vec<(Option<CellId>, FaceDirection)> {
        FaceDirection::ALL
            .iter()
            .map(|&dir| (self.neighbor(id, dir), dir))
            .collect()
    }

    /// True if `id` sits on a non-periodic domain face.
    pub fn on_open_face(&self, id: CellId) -> bool {
        FaceDirection::ALL
            .iter()
            .any(|&dir| self.neighbor(id, dir).is_none())
    }

    /// Index range `[start, end)` of layers owned by `rank` along the split axis.
    fn slab(&self, rank: usize) -> (usize, usize) {
        let n = self.cells[self.split_axis];
        let base = n / self.ranks;
        let rem = n % self.ranks;
        let start = rank * base + rank.min(rem);
        let len = base + usize::from(rank < rem);
        (start, start + len)
    }

    /// Rank owning `id`.
    pub fn owner(&self, id: CellId) -> usize {
        let layer = self.ijk(id)[self.split_axis] as usize;
        (0..self.ranks)
            .find(|&r| {
                let (start, end) = self.slab(r);
                layer >= start && layer < end
            })
            .unwrap_or(self.ranks - 1)
    }

    /// Cells owned by `rank`, ascending.
    pub fn local_cells(&self, rank: usize) -> Vec<CellId> {
        let (start, end) = self.slab(rank);
        let mut ids: Vec<CellId> = (1..=self.cell_count() as CellId)
            .filter(|&id| {
                let layer = self.ijk(id)[self.split_axis] as usize;
                layer >= start && layer < end
            })
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Remote cells within `HALO_DEPTH` (Chebyshev distance) of any cell
    /// owned by `rank`, ascending.
    pub fn halo_cells(&self, rank: usize) -> Vec<CellId> {
        let mut halo: FxHashSet<CellId> = FxHashSet::default();
        for id in self.local_cells(rank) {
            let base = self.ijk(id);
            for dk in -HALO_DEPTH..=HALO_DEPTH {
                for dj in -HALO_DEPTH..=HALO_DEPTH {
                    for di in -HALO_DEPTH..=HALO_DEPTH {
                        if let Some(n) = self.id_at([base[0] + di, base[1] + dj, base[2] + dk]) {
                            if self.owner(n) != rank {
                                halo.insert(n);
                            }
                        }
                    }
                }
            }
        }
        let mut ids: Vec<CellId> = halo.into_iter().collect();
        ids.sort_unstable();
        ids
    }

    /// Geometry of `id`; fields are left to the project.
    pub fn cell_params(&self, id: CellId) -> CellParams {
        let ijk = self.ijk(id);
        CellParams {
            coords: [
                self.min[0] + ijk[0] as f64 * self.cell_size[0],
                self.min[1] + ijk[1] as f64 * self.cell_size[1],
                self.min[2] + ijk[2] as f64 * self.cell_size[2],
            ],
            extents: self.cell_size,
            ..CellParams::default()
        }
    }

    /// Spatial refinement level of `id`. The emulated mesh is unrefined.
    pub fn refinement_level(&self, _id: CellId) -> u32 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use crate::config::FaceBoundary;

    #[test]
    fn test_ids_round_trip() {
        let topo = MeshTopology::new(&test_config([4, 3, 2], 1));
        assert_eq!(topo.cell_count(), 24);
        assert_eq!(topo.id_at([0, 0, 0]), Some(1));
        assert_eq!(topo.ijk(24), [3, 2, 1]);
        for id in 1..=24 {
            assert_eq!(topo.id_at(topo.ijk(id)), Some(id));
        }
    }

    #[test]
    fn test_periodic_and_open_neighbors() {
        let mut config = test_config([4, 1, 1], 1);
        let topo = MeshTopology::new(&config);
        assert_eq!(topo.neighbor(1, FaceDirection::NegX), Some(4));
        assert_eq!(topo.neighbor(4, FaceDirection::PosX), Some(1));
        // A single-cell periodic axis wraps onto itself
        assert_eq!(topo.neighbor(2, FaceDirection::PosY), Some(2));

        config.boundary_conditions.x_min = FaceBoundary::Outflow;
        config.boundary_conditions.x_max = FaceBoundary::Outflow;
        let topo = MeshTopology::new(&config);
        assert_eq!(topo.neighbor(1, FaceDirection::NegX), None);
        assert_eq!(topo.neighbor_at(2, FaceDirection::PosX, 2), Some(4));
        assert!(topo.on_open_face(1));
        assert!(!topo.on_open_face(2));
    }

    #[test]
    fn test_slab_ownership() {
        let topo = MeshTopology::new(&test_config([2, 5, 1], 2));
        // Longest axis is y: rank 0 gets 3 layers, rank 1 gets 2
        assert_eq!(topo.local_cells(0).len(), 6);
        assert_eq!(topo.local_cells(1).len(), 4);
        let all: usize = (0..2).map(|r| topo.local_cells(r).len()).sum();
        assert_eq!(all, topo.cell_count());
        assert_eq!(topo.owner(topo.id_at([1, 2, 0]).unwrap()), 0);
        assert_eq!(topo.owner(topo.id_at([0, 3, 0]).unwrap()), 1);
    }

    #[test]
    fn test_halo_excludes_local() {
        let topo = MeshTopology::new(&test_config([8, 2, 1], 2));
        assert!(topo.halo_cells(0).iter().all(|&id| topo.owner(id) == 1));
        // Single rank owns everything, so nothing is remote
        let single = MeshTopology::new(&test_config([8, 2, 1], 1));
        assert!(single.halo_cells(0).is_empty());
    }

    #[test]
    fn test_cell_params() {
        let topo = MeshTopology::new(&test_config([2, 2, 2], 1));
        let p = topo.cell_params(topo.id_at([1, 0, 1]).unwrap());
        assert_eq!(p.coords, [1.0e6, 0.0, 1.0e6]);
        assert_eq!(p.extents, [1.0e6; 3]);
    }
}
