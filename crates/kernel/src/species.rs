//! Particle species and the uniform velocity grid their sparse meshes live on.

use crate::direction::Axis;
use crate::vmesh::{BlockId, WID};

/// Boltzmann constant (J/K).
pub const BOLTZMANN: f64 = 1.380_650_5e-23;
/// Proton mass (kg).
pub const PROTON_MASS: f64 = 1.672_621_71e-27;
/// Elementary charge (C).
pub const ELEMENTARY_CHARGE: f64 = 1.602_176_53e-19;

/// Uniform velocity grid, divided into blocks of `WID^3` velocity cells.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VelocityGrid {
    /// Lower velocity corner [vx, vy, vz] (m/s)
    pub min: [f64; 3],
    /// Upper velocity corner [vx, vy, vz] (m/s)
    pub max: [f64; 3],
    /// Number of blocks per velocity dimension
    pub blocks: [u32; 3],
}

impl VelocityGrid {
    /// Edge length of one block along `axis` (m/s).
    #[inline]
    pub fn block_size(&self, axis: Axis) -> f64 {
        let a = axis.index();
        (self.max[a] - self.min[a]) / self.blocks[a] as f64
    }

    /// Edge length of one velocity cell along `axis` (m/s).
    #[inline]
    pub fn cell_size(&self, axis: Axis) -> f64 {
        self.block_size(axis) / WID as f64
    }

    /// Volume of one velocity cell (m^3/s^3).
    pub fn cell_volume(&self) -> f64 {
        self.cell_size(Axis::X) * self.cell_size(Axis::Y) * self.cell_size(Axis::Z)
    }

    /// Number of velocity cells along `axis`.
    #[inline]
    pub fn cells_along(&self, axis: Axis) -> usize {
        self.blocks[axis.index()] as usize * WID
    }

    /// Total number of block slots in the grid.
    pub fn block_count(&self) -> usize {
        self.blocks.iter().map(|&b| b as usize).product()
    }

    /// Block ID for block indices, or `None` outside the grid.
    pub fn block_id(&self, idx: [i64; 3]) -> Option<BlockId> {
        for a in 0..3 {
            if idx[a] < 0 || idx[a] >= self.blocks[a] as i64 {
                return None;
            }
        }
        let nx = self.blocks[0] as i64;
        let ny = self.blocks[1] as i64;
        Some((idx[0] + idx[1] * nx + idx[2] * nx * ny) as BlockId)
    }

    /// Block indices `[i, j, k]` of a block ID.
    pub fn block_indices(&self, id: BlockId) -> [i64; 3] {
        let nx = self.blocks[0] as i64;
        let ny = self.blocks[1] as i64;
        let id = id as i64;
        [id % nx, (id / nx) % ny, id / (nx * ny)]
    }

    /// Block containing velocity `v` and the cell indices within it.
    pub fn locate(&self, v: [f64; 3]) -> Option<(BlockId, [usize; 3])> {
        let mut block = [0_i64; 3];
        let mut cell = [0_usize; 3];
        for axis in Axis::ALL {
            let a = axis.index();
            let c = ((v[a] - self.min[a]) / self.cell_size(axis)).floor();
            if c < 0.0 || c >= self.cells_along(axis) as f64 {
                return None;
            }
            let c = c as usize;
            block[a] = (c / WID) as i64;
            cell[a] = c % WID;
        }
        self.block_id(block).map(|id| (id, cell))
    }

    /// Lower velocity corner of a block.
    pub fn block_corner(&self, id: BlockId) -> [f64; 3] {
        let idx = self.block_indices(id);
        let mut corner = [0.0; 3];
        for axis in Axis::ALL {
            let a = axis.index();
            corner[a] = self.min[a] + idx[a] as f64 * self.block_size(axis);
        }
        corner
    }

    /// Velocity at the center of cell `cell` in block `id`.
    pub fn cell_center(&self, id: BlockId, cell: [usize; 3]) -> [f64; 3] {
        let corner = self.block_corner(id);
        let mut v = [0.0; 3];
        for axis in Axis::ALL {
            let a = axis.index();
            v[a] = corner[a] + (cell[a] as f64 + 0.5) * self.cell_size(axis);
        }
        v
    }
}

/// A particle species advanced by the solver.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Species {
    /// Display name (e.g. "proton")
    pub name: String,
    /// Particle charge (C)
    pub charge: f64,
    /// Particle mass (kg)
    pub mass: f64,
    /// Phase-space density below which a block has no content
    pub sparse_min_value: f64,
    /// Velocity grid of this species
    pub grid: VelocityGrid,
}

impl Species {
    /// Charge-to-mass ratio (C/kg).
    #[inline]
    pub fn charge_to_mass(&self) -> f64 {
        self.charge / self.mass
    }
}
