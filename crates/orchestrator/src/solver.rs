//! Per-rank timestep driver
//!
//! A `RankSolver` owns one rank's grid view and runs the setup sequence and
//! the propagation steps. Every stage that touches ghosts is collective, so
//! all ranks of a run must call the same methods in the same order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kernel::{CellId, Species, SysBoundaryType};
use serde::Serialize;

use crate::acceleration::calculate_acceleration;
use crate::comm::Communicator;
use crate::config::SimulationConfig;
use crate::error::SolverResult;
use crate::grid::RankGrid;
use crate::mesh::MeshTopology;
use crate::moments::{calculate_initial_moments, calculate_interpolated_moments, InterpolationTarget};
use crate::project::Project;
use crate::sysboundary::{apply_outflow, classify_sysboundaries};
use crate::translation::{
    calculate_spatial_translation, select_mapper, TranslationMapper, TranslationParams,
    TranslationTiming,
};

/// Wall time per stage, accumulated over steps
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepTiming {
    /// Outflow boundary refill
    pub boundaries: Duration,
    /// Translation including halo refreshes
    pub translation: Duration,
    /// Breakdown of the translation stage
    pub translation_detail: TranslationTiming,
    /// Acceleration including block adjustment
    pub acceleration: Duration,
    /// Interpolated moments
    pub moments: Duration,
}

/// Final state of one local cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellSummary {
    /// Cell ID
    pub id: CellId,
    /// Owning rank
    pub rank: usize,
    /// Boundary type
    pub sysboundary: SysBoundaryType,
    /// Mass density (kg/m^3)
    pub rhom: f64,
    /// Bulk velocity (m/s)
    pub v: [f64; 3],
    /// Number density per species (m^-3)
    pub rho: Vec<f64>,
    /// Velocity blocks over all species
    pub blocks: usize,
    /// Mass held by the cell (kg)
    pub mass: f64,
}

/// One rank of a run
pub struct RankSolver {
    grid: RankGrid,
    comm: Communicator,
    species: Vec<Species>,
    mapper: Box<dyn TranslationMapper>,
    params: TranslationParams,
    max_rotation_deg: f64,
    dt: f64,
    tstep: u64,
    time: f64,
    timing: StepTiming,
}

impl RankSolver {
    /// Build the grid view of `comm.rank()` and classify its boundaries.
    pub fn new(config: &SimulationConfig, topology: Arc<MeshTopology>, comm: Communicator) -> Self {
        let species = config.species_list();
        let mut grid = RankGrid::new(topology, comm.rank(), species.len());
        classify_sysboundaries(&mut grid);
        Self {
            grid,
            comm,
            species,
            mapper: select_mapper(config.amr_max_spatial_ref_level),
            params: TranslationParams {
                amr_max_spatial_ref_level: config.amr_max_spatial_ref_level,
                prepare_for_rebalance: config.prepare_for_rebalance,
                max_cfl: config.vlasov_solver_max_cfl,
            },
            max_rotation_deg: config.max_acceleration_rotation,
            dt: config.dt,
            tstep: 0,
            time: 0.0,
            timing: StepTiming::default(),
        }
    }

    /// Fill local cells from `project`, then run the zero-length setup
    /// sequence: initial moments, acceleration and translation with `dt = 0`.
    pub fn initialize(&mut self, project: &dyn Project) -> SolverResult<()> {
        let ids = self.grid.local_cells().to_vec();
        for id in ids {
            let index = self.grid.topology().index(id);
            if let Some(cell) = self.grid.cell_mut(id) {
                project.set_project_cell(cell, &self.species, index);
            }
        }

        calculate_initial_moments(&mut self.grid, &self.species);
        calculate_acceleration(
            &mut self.grid,
            &self.comm,
            &self.species,
            self.max_rotation_deg,
            self.tstep,
            0.0,
        )?;
        let mut timing = TranslationTiming::default();
        calculate_spatial_translation(
            &mut self.grid,
            &self.comm,
            &self.species,
            self.mapper.as_ref(),
            &self.params,
            0.0,
            &mut timing,
        )?;

        tracing::debug!(
            "Rank {} initialized {} cells, {} blocks",
            self.comm.rank(),
            self.grid.local_cells().len(),
            self.block_count()
        );
        Ok(())
    }

    /// Advance by one timestep of the configured length.
    pub fn step(&mut self) -> SolverResult<()> {
        self.tstep += 1;

        let start = Instant::now();
        apply_outflow(&mut self.grid, &self.comm, self.species.len())?;
        self.timing.boundaries += start.elapsed();

        let start = Instant::now();
        calculate_spatial_translation(
            &mut self.grid,
            &self.comm,
            &self.species,
            self.mapper.as_ref(),
            &self.params,
            self.dt,
            &mut self.timing.translation_detail,
        )?;
        self.timing.translation += start.elapsed();

        // Fresh "_R" against the previous step's "_V"
        let start = Instant::now();
        calculate_interpolated_moments(&mut self.grid, InterpolationTarget::HalfStep);
        self.timing.moments += start.elapsed();

        let start = Instant::now();
        let report = calculate_acceleration(
            &mut self.grid,
            &self.comm,
            &self.species,
            self.max_rotation_deg,
            self.tstep,
            self.dt,
        )?;
        self.timing.acceleration += start.elapsed();

        let start = Instant::now();
        calculate_interpolated_moments(&mut self.grid, InterpolationTarget::Current);
        self.timing.moments += start.elapsed();

        self.time += self.dt;
        for (sp, acc) in self.species.iter().zip(&report) {
            tracing::debug!(
                "Rank {} step {}: {} used {} subcycles",
                self.comm.rank(),
                self.tstep,
                sp.name,
                acc.global_subcycles
            );
        }
        Ok(())
    }

    /// Completed steps
    pub fn tstep(&self) -> u64 {
        self.tstep
    }

    /// Simulated time (s)
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Accumulated stage timings
    pub fn timing(&self) -> &StepTiming {
        &self.timing
    }

    /// This rank's grid view
    pub fn grid(&self) -> &RankGrid {
        &self.grid
    }

    /// Species being propagated
    pub fn species(&self) -> &[Species] {
        &self.species
    }

    /// Velocity blocks over all local cells and species
    pub fn block_count(&self) -> usize {
        self.grid
            .iter_local()
            .map(|c| (0..self.species.len()).map(|p| c.block_count(p)).sum::<usize>())
            .sum()
    }

    /// Summaries of every local cell in ascending ID order.
    pub fn cell_summaries(&self) -> Vec<CellSummary> {
        self.grid
            .iter_local()
            .map(|cell| {
                let rho: Vec<f64> = cell.populations.iter().map(|p| p.moments.rho).collect();
                CellSummary {
                    id: cell.id,
                    rank: self.comm.rank(),
                    sysboundary: cell.sysboundary,
                    rhom: cell.moments.rhom,
                    v: cell.moments.v,
                    rho,
                    blocks: (0..self.species.len()).map(|p| cell.block_count(p)).sum(),
                    mass: cell.moments.rhom * cell.params.volume(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use kernel::CellMoments;

    use crate::config::tests::test_config;
    use crate::project::Fluctuations;

    fn solver(cells: [usize; 3]) -> RankSolver {
        let config = test_config(cells, 1);
        let topo = Arc::new(MeshTopology::new(&config));
        let comm = Communicator::create(1).remove(0);
        let mut solver = RankSolver::new(&config, topo, comm);
        let project = Fluctuations::new(config.project.clone(), config.grid.cells.iter().product::<usize>() as u64);
        solver.initialize(&project).unwrap();
        solver
    }

    #[test]
    fn test_initialize_fills_moments_and_limits() {
        let s = solver([3, 1, 1]);
        assert_eq!(s.tstep(), 0);
        assert!(s.block_count() > 0);
        for cell in s.grid().iter_local() {
            assert!(cell.moments.rhom > 0.0);
            assert_eq!(cell.moments_dt2, cell.moments);
            assert!(cell.moments_r.rhom > 0.0);
            assert!(cell.moments_v.rhom > 0.0);
            assert!(cell.max_v_dt > 0.0 && cell.max_v_dt < f64::MAX);
        }
    }

    #[test]
    fn test_step_advances_time_and_interpolates() {
        let mut s = solver([3, 1, 1]);
        s.step().unwrap();
        s.step().unwrap();
        assert_eq!(s.tstep(), 2);
        assert!((s.time() - 2.0e-3).abs() < 1e-15);
        for cell in s.grid().iter_local() {
            assert_eq!(cell.moments, cell.moments_r.midpoint(&cell.moments_v));
        }
    }

    #[test]
    fn test_half_step_moments_pair_new_r_with_previous_v() {
        let mut s = solver([3, 1, 1]);
        s.step().unwrap();
        let previous_v: Vec<CellMoments> = s.grid().iter_local().map(|c| c.moments_v).collect();

        // Extra content after the last "_V" pass only shows up in the next one
        let grid = s.species()[0].grid.clone();
        s.grid
            .cell_mut(2)
            .unwrap()
            .population_mut(0)
            .vmesh
            .set_value(&grid, [1.5e5, 0.0, 0.0], 1.0);

        s.step().unwrap();
        for (cell, v) in s.grid().iter_local().zip(&previous_v) {
            assert_eq!(cell.moments_dt2, cell.moments_r.midpoint(v));
        }
        let cell = s.grid().cell(2).unwrap();
        assert!(cell.moments.rhom > cell.moments_dt2.rhom);
    }

    #[test]
    fn test_summaries_are_sorted() {
        let s = solver([2, 2, 1]);
        let summaries = s.cell_summaries();
        let ids: Vec<CellId> = summaries.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert!(summaries.iter().all(|c| c.rank == 0 && c.mass > 0.0));
    }
}
