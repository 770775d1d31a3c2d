//! Vlasov Phase-Space Kernel
//!
//! Per-cell numerics for a semi-Lagrangian Vlasov solver: everything that can
//! be evaluated on one spatial cell (or one short line of cells) without
//! knowing how the mesh is distributed.
//!
//! # Modules
//! - [`direction`] -- `Axis`, typed `FaceDirection`, and velocity sweep orders.
//! - [`species`] -- Particle species and the uniform velocity grid.
//! - [`vmesh`] -- Sparse block storage of the distribution function.
//! - [`cell`] -- Spatial cells, populations, and moment snapshots.
//! - [`remap`] -- Conservative monotone 1D remap (SLICE-3D building block).
//! - [`translation`] -- Per-block spatial translation along one axis.
//! - [`acceleration`] -- Per-cell velocity-space acceleration and subcycling.
//! - [`moments`] -- Density, bulk velocity, and pressure integration.

#![warn(missing_docs)]

pub mod acceleration;
pub mod cell;
pub mod direction;
pub mod moments;
pub mod remap;
pub mod species;
pub mod translation;
pub mod vmesh;

pub use acceleration::{
    accelerate_cell, acceleration_subcycles, prepare_accelerate_cell, subcycle_dt,
};
pub use cell::{
    CellId, CellMoments, CellParams, Population, PopulationMoments, SpatialCell, SysBoundaryType,
};
pub use direction::{velocity_axis_order, Axis, AxisOrder, FaceDirection};
pub use moments::{calculate_cell_moments, spatial_dt_limit};
pub use remap::VLASOV_STENCIL_WIDTH;
pub use species::{Species, VelocityGrid, BOLTZMANN, ELEMENTARY_CHARGE, PROTON_MASS};
pub use vmesh::{BlockId, VelocityMesh, WID, WID3};

// ---------------------------------------------------------------------------
// Conservation bookkeeping
// ---------------------------------------------------------------------------

/// Aggregate conservation metrics for a set of cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConservationMetrics {
    /// Total mass: sum of mass density times cell volume (kg)
    pub total_mass: f64,
    /// Total particle count per species
    pub particles_per_species: Vec<f64>,
    /// Total velocity blocks over all species
    pub total_blocks: usize,
}

impl ConservationMetrics {
    /// Relative drift of total mass from `reference`.
    pub fn mass_drift(&self, reference: &ConservationMetrics) -> f64 {
        if reference.total_mass.abs() > 0.0 {
            ((self.total_mass - reference.total_mass) / reference.total_mass).abs()
        } else {
            (self.total_mass - reference.total_mass).abs()
        }
    }
}

/// Sum mass and particle counts over `cells`, using each cell's current
/// distribution (not its stored moments).
pub fn conservation_metrics<'a>(
    cells: impl IntoIterator<Item = &'a SpatialCell>,
    species: &[Species],
) -> ConservationMetrics {
    let mut metrics = ConservationMetrics {
        particles_per_species: vec![0.0; species.len()],
        ..ConservationMetrics::default()
    };
    for cell in cells {
        let volume = cell.params.volume();
        let (totals, pops) = calculate_cell_moments(cell, species, false);
        metrics.total_mass += totals.rhom * volume;
        for (pop_id, pm) in pops.iter().enumerate() {
            metrics.particles_per_species[pop_id] += pm.rho * volume;
        }
        metrics.total_blocks += (0..species.len()).map(|p| cell.block_count(p)).sum::<usize>();
    }
    tracing::debug!(
        "Conservation metrics: mass={:.6e} kg, blocks={}",
        metrics.total_mass,
        metrics.total_blocks
    );
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conservation_metrics_sum_cells() {
        let sp = Species {
            name: "p".to_string(),
            charge: ELEMENTARY_CHARGE,
            mass: PROTON_MASS,
            sparse_min_value: 1e-15,
            grid: VelocityGrid {
                min: [-2.0; 3],
                max: [2.0; 3],
                blocks: [1, 1, 1],
            },
        };
        let params = CellParams {
            extents: [2.0, 1.0, 1.0],
            ..CellParams::default()
        };
        let mut cells = vec![SpatialCell::new(1, params, 1), SpatialCell::new(2, params, 1)];
        for cell in cells.iter_mut() {
            cell.population_mut(0).vmesh.set_value(&sp.grid, [0.5, 0.5, 0.5], 3.0);
        }
        let m = conservation_metrics(cells.iter(), std::slice::from_ref(&sp));
        assert!((m.particles_per_species[0] - 12.0).abs() < 1e-12);
        assert!((m.total_mass - 12.0 * PROTON_MASS).abs() < 1e-36);
        assert_eq!(m.total_blocks, 2);
        assert_eq!(m.mass_drift(&m), 0.0);
    }
}
