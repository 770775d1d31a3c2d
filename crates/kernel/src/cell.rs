//! Spatial cells, per-species populations, and their moment snapshots.

use crate::vmesh::VelocityMesh;

/// Global spatial cell identifier (1-based, 0 is never a valid cell).
pub type CellId = u64;

/// Boundary classification of a spatial cell.
///
/// Exactly one applies to every cell. Only [`SysBoundaryType::NotSysboundary`]
/// cells are translated and accelerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum SysBoundaryType {
    /// Regular simulation cell
    NotSysboundary = 0,
    /// Boundary cell with no non-boundary face neighbor; never touched
    DoNotCompute = 1,
    /// Open boundary cell, refilled from its inward neighbor every step
    Outflow = 2,
}

impl SysBoundaryType {
    /// Resolution order when several conditions claim one cell; higher wins.
    pub fn precedence(self) -> u32 {
        match self {
            SysBoundaryType::NotSysboundary => 0,
            SysBoundaryType::Outflow => 4,
            SysBoundaryType::DoNotCompute => 8,
        }
    }

    /// True if the boundary state is refreshed during the run.
    pub fn is_dynamic(self) -> bool {
        matches!(self, SysBoundaryType::Outflow)
    }

    /// True if the cell's distribution is translated and accelerated.
    #[inline]
    pub fn is_propagated(self) -> bool {
        self == SysBoundaryType::NotSysboundary
    }
}

/// Bulk moments of one population.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PopulationMoments {
    /// Number density (m^-3)
    pub rho: f64,
    /// Bulk velocity (m/s)
    pub v: [f64; 3],
    /// Diagonal pressure components P_11, P_22, P_33 (Pa)
    pub p: [f64; 3],
}

impl PopulationMoments {
    /// Componentwise mean of two snapshots.
    pub fn midpoint(&self, other: &Self) -> Self {
        let mut out = Self {
            rho: 0.5 * (self.rho + other.rho),
            ..Self::default()
        };
        for i in 0..3 {
            out.v[i] = 0.5 * (self.v[i] + other.v[i]);
            out.p[i] = 0.5 * (self.p[i] + other.p[i]);
        }
        out
    }
}

/// Cell-level moments aggregated over all species.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CellMoments {
    /// Mass density (kg/m^3)
    pub rhom: f64,
    /// Bulk velocity (m/s)
    pub v: [f64; 3],
    /// Charge density (C/m^3)
    pub rhoq: f64,
    /// Diagonal pressure components P_11, P_22, P_33 (Pa)
    pub p: [f64; 3],
}

impl CellMoments {
    /// Componentwise mean of two snapshots.
    pub fn midpoint(&self, other: &Self) -> Self {
        let mut out = Self {
            rhom: 0.5 * (self.rhom + other.rhom),
            rhoq: 0.5 * (self.rhoq + other.rhoq),
            ..Self::default()
        };
        for i in 0..3 {
            out.v[i] = 0.5 * (self.v[i] + other.v[i]);
            out.p[i] = 0.5 * (self.p[i] + other.p[i]);
        }
        out
    }
}

/// Per-species state on a cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Population {
    /// Sparse velocity distribution
    pub vmesh: VelocityMesh,
    /// Instantaneous / interpolated moments
    pub moments: PopulationMoments,
    /// Moments after the last translation
    pub moments_r: PopulationMoments,
    /// Moments after the last acceleration
    pub moments_v: PopulationMoments,
    /// Subcycles this cell needs for the current acceleration
    pub acc_subcycles: u32,
    /// Largest stable spatial-translation timestep (s)
    pub max_r_dt: f64,
    /// Largest stable velocity-space timestep (s)
    pub max_v_dt: f64,
}

impl Population {
    /// Empty population with unbounded timestep limits.
    pub fn new() -> Self {
        Self {
            max_r_dt: f64::MAX,
            max_v_dt: f64::MAX,
            ..Self::default()
        }
    }
}

/// Geometry and field parameters of a spatial cell.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CellParams {
    /// Lower corner [x, y, z] (m)
    pub coords: [f64; 3],
    /// Edge lengths [dx, dy, dz] (m)
    pub extents: [f64; 3],
    /// Background magnetic field (T)
    pub background_b: [f64; 3],
    /// Perturbed magnetic field (T)
    pub perturbed_b: [f64; 3],
}

impl CellParams {
    /// Total magnetic field used by the acceleration.
    pub fn total_b(&self) -> [f64; 3] {
        [
            self.background_b[0] + self.perturbed_b[0],
            self.background_b[1] + self.perturbed_b[1],
            self.background_b[2] + self.perturbed_b[2],
        ]
    }

    /// Cell volume (m^3).
    pub fn volume(&self) -> f64 {
        self.extents[0] * self.extents[1] * self.extents[2]
    }
}

/// A node of the spatial mesh with one [`Population`] per species.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialCell {
    /// Global identifier
    pub id: CellId,
    /// Boundary classification
    pub sysboundary: SysBoundaryType,
    /// Spatial refinement level (0 = coarsest)
    pub refinement_level: u32,
    /// Geometry and fields
    pub params: CellParams,
    /// Instantaneous / interpolated cell moments
    pub moments: CellMoments,
    /// Cell moments after the last translation
    pub moments_r: CellMoments,
    /// Cell moments after the last acceleration
    pub moments_v: CellMoments,
    /// Half-step moments consumed by the field solver
    pub moments_dt2: CellMoments,
    /// Minimum over species of the velocity-space timestep limit (s)
    pub max_v_dt: f64,
    /// Load-balance weight accumulator
    pub lb_weight_counter: f64,
    /// Per-species state, indexed by species ID
    pub populations: Vec<Population>,
}

impl SpatialCell {
    /// Create a non-boundary cell with `n_species` empty populations.
    pub fn new(id: CellId, params: CellParams, n_species: usize) -> Self {
        Self {
            id,
            sysboundary: SysBoundaryType::NotSysboundary,
            refinement_level: 0,
            params,
            moments: CellMoments::default(),
            moments_r: CellMoments::default(),
            moments_v: CellMoments::default(),
            moments_dt2: CellMoments::default(),
            max_v_dt: f64::MAX,
            lb_weight_counter: 0.0,
            populations: (0..n_species).map(|_| Population::new()).collect(),
        }
    }

    /// Population of species `pop`.
    ///
    /// # Panics
    /// If `pop` is not a configured species ID.
    #[inline]
    pub fn population(&self, pop: usize) -> &Population {
        &self.populations[pop]
    }

    /// Mutable population of species `pop`.
    #[inline]
    pub fn population_mut(&mut self, pop: usize) -> &mut Population {
        &mut self.populations[pop]
    }

    /// Block count of species `pop`.
    pub fn block_count(&self, pop: usize) -> usize {
        self.populations[pop].vmesh.len()
    }

    /// Center of the cell (m).
    pub fn center(&self) -> [f64; 3] {
        let p = &self.params;
        [
            p.coords[0] + 0.5 * p.extents[0],
            p.coords[1] + 0.5 * p.extents[1],
            p.coords[2] + 0.5 * p.extents[2],
        ]
    }
}
