//! Velocity-space acceleration with cluster-wide synchronized subcycling
//!
//! Every rank runs the same number of subcycle steps per species (an
//! all-reduce maximum), so block adjustments, which refresh the halo, stay
//! collective. Cells stop participating once their own subcycle count is
//! exhausted.

use kernel::{
    accelerate_cell, acceleration_subcycles, prepare_accelerate_cell, subcycle_dt,
    velocity_axis_order, BlockId, CellId, SpatialCell, Species, SysBoundaryType,
};
use rustc_hash::FxHashSet;

use crate::comm::Communicator;
use crate::error::SolverResult;
use crate::grid::RankGrid;
use crate::halo::{refresh_halo, HaloMode};
use crate::moments::calculate_moments_v;

/// What one species' acceleration did on this rank
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeciesAcceleration {
    /// Largest subcycle count over this rank's cells
    pub local_max_subcycles: u32,
    /// Subcycle count shared by all ranks
    pub global_subcycles: u32,
    /// Number of cells accelerated at each subcycle step
    pub active_cells_per_step: Vec<usize>,
}

/// Keep only the cells whose own subcycle count exceeds `step`.
pub fn prune_for_step(grid: &RankGrid, propagated: &mut Vec<CellId>, pop: usize, step: u32) {
    propagated.retain(|&id| {
        grid.cell(id)
            .map_or(false, |c| step < c.population(pop).acc_subcycles)
    });
}

/// Add and remove velocity blocks of species `pop` on the local cells in
/// `ids` so each holds exactly the blocks its own and its face neighbors'
/// content requires. Collective: refreshes the velocity-block halo first.
/// Returns `(added, removed)` summed over cells.
pub fn adjust_velocity_blocks(
    grid: &mut RankGrid,
    comm: &Communicator,
    species: &Species,
    pop: usize,
    ids: &[CellId],
) -> SolverResult<(usize, usize)> {
    refresh_halo(grid, comm, pop, HaloMode::VelocityBlockData)?;

    let cutoff = species.sparse_min_value;
    let neighbor_content: Vec<(CellId, FxHashSet<BlockId>)> = ids
        .iter()
        .copied()
        .filter(|&id| {
            grid.cell(id)
                .map_or(false, |c| c.sysboundary != SysBoundaryType::DoNotCompute)
        })
        .map(|id| {
            let mut content: FxHashSet<BlockId> = FxHashSet::default();
            for (n, _) in grid.face_neighbors(id) {
                if let Some(cell) = n.and_then(|n| grid.cell(n)) {
                    content.extend(cell.population(pop).vmesh.content_blocks(cutoff));
                }
            }
            (id, content)
        })
        .collect();

    let mut added = 0;
    let mut removed = 0;
    for (id, content) in neighbor_content {
        if let Some(cell) = grid.cell_mut(id) {
            let (a, r) = cell.population_mut(pop).vmesh.adjust(&species.grid, cutoff, &content);
            added += a;
            removed += r;
        }
    }
    tracing::debug!(
        "Rank {} adjusted {} cells of {}: +{} / -{} blocks",
        comm.rank(),
        ids.len(),
        species.name,
        added,
        removed
    );
    Ok((added, removed))
}

/// Accelerate every species by `dt`, then compute post-acceleration moments
/// and each cell's overall velocity timestep limit.
///
/// `dt == 0` after the first step only adjusts blocks. The axis order of
/// every subcycle is a pure function of `tstep`, identical on all ranks.
pub fn calculate_acceleration(
    grid: &mut RankGrid,
    comm: &Communicator,
    species: &[Species],
    max_rotation_deg: f64,
    tstep: u64,
    dt: f64,
) -> SolverResult<Vec<SpeciesAcceleration>> {
    let local: Vec<CellId> = grid.local_cells().to_vec();
    let mut report = Vec::with_capacity(species.len());

    if dt == 0.0 && tstep > 0 {
        // Boundary conditions or translation may still have changed content
        for (pop, sp) in species.iter().enumerate() {
            adjust_velocity_blocks(grid, comm, sp, pop, &local)?;
        }
        finish_acceleration(grid, species, &local);
        return Ok(report);
    }

    let order = velocity_axis_order(tstep);
    for (pop, sp) in species.iter().enumerate() {
        let mut propagated = Vec::new();
        let mut local_max = 0;
        for &id in &local {
            let Some(cell) = grid.cell_mut(id) else { continue };
            if cell.sysboundary != SysBoundaryType::NotSysboundary {
                continue;
            }
            if !cell.population(pop).vmesh.is_empty() {
                propagated.push(id);
            }
            prepare_accelerate_cell(cell, sp, pop, max_rotation_deg);
            let population = cell.population_mut(pop);
            population.acc_subcycles = acceleration_subcycles(dt, population.max_v_dt);
            local_max = local_max.max(population.acc_subcycles);
        }

        let global_max = comm.all_reduce_max(local_max)?;
        tracing::debug!(
            "Rank {} species {}: {} cells, subcycles local {} global {}, order {:?}",
            comm.rank(),
            sp.name,
            propagated.len(),
            local_max,
            global_max,
            order
        );

        let mut active_cells_per_step = Vec::with_capacity(global_max as usize);
        for step in 0..global_max {
            if step > 0 {
                prune_for_step(grid, &mut propagated, pop, step);
            }
            active_cells_per_step.push(propagated.len());

            // Bulk velocities for the gyration
            calculate_moments_v(grid, species, &propagated, false);

            let mut cells = grid.cells_mut(&propagated);
            par_for_each_mut!(cells, |cell: &mut &mut SpatialCell| {
                let max_v_dt = cell.population(pop).max_v_dt;
                accelerate_cell(cell, sp, pop, order, subcycle_dt(step, max_v_dt, dt));
            });

            if step + 1 < global_max {
                adjust_velocity_blocks(grid, comm, sp, pop, &propagated)?;
            }
        }

        // Every local cell, including those that never accelerated
        adjust_velocity_blocks(grid, comm, sp, pop, &local)?;

        report.push(SpeciesAcceleration {
            local_max_subcycles: local_max,
            global_subcycles: global_max,
            active_cells_per_step,
        });
    }

    finish_acceleration(grid, species, &local);
    Ok(report)
}

fn finish_acceleration(grid: &mut RankGrid, species: &[Species], local: &[CellId]) {
    calculate_moments_v(grid, species, local, true);
    for cell in grid.local_cells_mut() {
        cell.max_v_dt = cell
            .populations
            .iter()
            .map(|p| p.max_v_dt)
            .fold(f64::MAX, f64::min);
    }
}
