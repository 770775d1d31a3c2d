//! Moment stages: initial, post-translation, post-acceleration, interpolated
//!
//! Every stage is per cell and writes only its own snapshot fields, so cells
//! are processed independently (in parallel with the `parallel` feature).
//! Cells flagged `DoNotCompute` are skipped by every stage except the
//! initial one.

use kernel::{calculate_cell_moments, spatial_dt_limit, CellId, SpatialCell, Species, SysBoundaryType};

use crate::grid::RankGrid;

/// Where interpolated cell-level moments are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationTarget {
    /// The instantaneous moments
    Current,
    /// The half-step staging snapshot read by the field solver
    HalfStep,
}

fn skipped(cell: &SpatialCell) -> bool {
    cell.sysboundary == SysBoundaryType::DoNotCompute
}

/// Moments of every local cell, boundary cells included. Also seeds the
/// half-step snapshot, which the field solver reads before any real
/// post-translation/post-acceleration pair exists.
pub fn calculate_initial_moments(grid: &mut RankGrid, species: &[Species]) {
    let mut cells = grid.local_cells_mut();
    par_for_each_mut!(cells, |cell: &mut &mut SpatialCell| {
        let (totals, pops) = calculate_cell_moments(cell, species, true);
        cell.moments = totals;
        cell.moments_dt2 = totals;
        for (pop_id, pm) in pops.into_iter().enumerate() {
            cell.population_mut(pop_id).moments = pm;
        }
    });
}

/// Post-translation ("_R") moments and spatial timestep limits of every
/// local cell.
pub fn calculate_moments_r(grid: &mut RankGrid, species: &[Species], cfl: f64) {
    let mut cells = grid.local_cells_mut();
    par_for_each_mut!(cells, |cell: &mut &mut SpatialCell| {
        if skipped(cell) {
            return;
        }
        let (totals, pops) = calculate_cell_moments(cell, species, true);
        cell.moments_r = totals;
        let extents = cell.params.extents;
        for (pop_id, pm) in pops.into_iter().enumerate() {
            let pop = cell.population_mut(pop_id);
            pop.moments_r = pm;
            pop.max_r_dt = spatial_dt_limit(&pop.vmesh, &species[pop_id].grid, extents, cfl);
        }
    });
}

/// Post-acceleration ("_V") moments of the held cells in `ids`.
///
/// Without `compute_second` only densities and bulk velocities are
/// refreshed; the pressures keep their previous values.
pub fn calculate_moments_v(grid: &mut RankGrid, species: &[Species], ids: &[CellId], compute_second: bool) {
    let mut cells = grid.cells_mut(ids);
    par_for_each_mut!(cells, |cell: &mut &mut SpatialCell| {
        if skipped(cell) {
            return;
        }
        let (mut totals, pops) = calculate_cell_moments(cell, species, compute_second);
        if !compute_second {
            totals.p = cell.moments_v.p;
        }
        cell.moments_v = totals;
        for (pop_id, mut pm) in pops.into_iter().enumerate() {
            let pop = cell.population_mut(pop_id);
            if !compute_second {
                pm.p = pop.moments_v.p;
            }
            pop.moments_v = pm;
        }
    });
}

/// Arithmetic mean of the "_R" and "_V" snapshots of every local cell.
///
/// Cell-level totals go to `target`; each population's own mean always goes
/// to its instantaneous moments.
pub fn calculate_interpolated_moments(grid: &mut RankGrid, target: InterpolationTarget) {
    let mut cells = grid.local_cells_mut();
    par_for_each_mut!(cells, |cell: &mut &mut SpatialCell| {
        let mean = cell.moments_r.midpoint(&cell.moments_v);
        match target {
            InterpolationTarget::Current => cell.moments = mean,
            InterpolationTarget::HalfStep => cell.moments_dt2 = mean,
        }
        for pop in cell.populations.iter_mut() {
            pop.moments = pop.moments_r.midpoint(&pop.moments_v);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use kernel::CellMoments;

    use crate::config::tests::test_config;
    use crate::mesh::MeshTopology;

    fn setup() -> (RankGrid, Vec<Species>) {
        let config = test_config([2, 1, 1], 1);
        let species = config.species_list();
        let topo = Arc::new(MeshTopology::new(&config));
        let mut grid = RankGrid::new(topo, 0, 1);
        let g = species[0].grid.clone();
        let cell = grid.cell_mut(1).unwrap();
        cell.population_mut(0).vmesh.set_value(&g, [1.0e5, 0.0, 0.0], 2.0);
        cell.population_mut(0).vmesh.set_value(&g, [-1.0e5, 0.0, 0.0], 2.0);
        (grid, species)
    }

    #[test]
    fn test_initial_moments_seed_half_step() {
        let (mut grid, species) = setup();
        calculate_initial_moments(&mut grid, &species);
        let cell = grid.cell(1).unwrap();
        assert!(cell.moments.rhom > 0.0);
        assert_eq!(cell.moments_dt2, cell.moments);
        assert!(cell.population(0).moments.rho > 0.0);
        assert_eq!(grid.cell(2).unwrap().moments.rhom, 0.0);
    }

    #[test]
    fn test_moments_r_sets_translation_limit() {
        let (mut grid, species) = setup();
        calculate_moments_r(&mut grid, &species, 0.5);
        let cell = grid.cell(1).unwrap();
        assert!(cell.moments_r.rhom > 0.0);
        assert!(cell.population(0).max_r_dt < f64::MAX);
        assert_eq!(grid.cell(2).unwrap().population(0).max_r_dt, f64::MAX);
    }

    #[test]
    fn test_first_order_v_moments_keep_pressure() {
        let (mut grid, species) = setup();
        calculate_moments_v(&mut grid, &species, &[1], true);
        let p = grid.cell(1).unwrap().moments_v.p;
        assert!(p[0] > 0.0);
        calculate_moments_v(&mut grid, &species, &[1], false);
        assert_eq!(grid.cell(1).unwrap().moments_v.p, p);
    }

    #[test]
    fn test_interpolation_targets() {
        let (mut grid, _) = setup();
        {
            let cell = grid.cell_mut(1).unwrap();
            cell.moments_r = CellMoments { rhom: 2.0, v: [2.0, 0.0, 0.0], rhoq: 4.0, p: [1.0; 3] };
            cell.moments_v = CellMoments { rhom: 4.0, v: [0.0, 2.0, 0.0], rhoq: 0.0, p: [3.0; 3] };
            cell.population_mut(0).moments_r.rho = 1.0;
            cell.population_mut(0).moments_v.rho = 3.0;
        }
        calculate_interpolated_moments(&mut grid, InterpolationTarget::HalfStep);
        let cell = grid.cell(1).unwrap();
        assert_eq!(cell.moments_dt2.rhom, 3.0);
        assert_eq!(cell.moments_dt2.v, [1.0, 1.0, 0.0]);
        assert_eq!(cell.moments_dt2.rhoq, 2.0);
        assert_eq!(cell.moments_dt2.p, [2.0; 3]);
        assert_eq!(cell.moments.rhom, 0.0);
        assert_eq!(cell.population(0).moments.rho, 2.0);

        calculate_interpolated_moments(&mut grid, InterpolationTarget::Current);
        assert_eq!(grid.cell(1).unwrap().moments.rhom, 3.0);
    }
}
