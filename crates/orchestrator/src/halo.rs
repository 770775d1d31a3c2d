//! Halo synchronization: refresh ghost copies of remote cells
//!
//! Each refresh moves the data of exactly one species, named by the caller.
//! It is a blocking collective followed by a barrier, so every rank starts
//! the next stage with the same ghost state.

use kernel::{CellId, CellMoments, CellParams, Population, SpatialCell, SysBoundaryType};
use rustc_hash::FxHashMap;

use crate::comm::Communicator;
use crate::error::{SolverError, SolverResult};
use crate::grid::RankGrid;

/// What a halo refresh transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaloMode {
    /// Cell parameters, moments, and the whole population
    AllSpatialData,
    /// Only the velocity blocks of the population
    VelocityBlockData,
}

/// Cell-level data sent with [`HaloMode::AllSpatialData`]
#[derive(Debug, Clone, PartialEq)]
pub struct CellState {
    /// Boundary classification
    pub sysboundary: SysBoundaryType,
    /// Spatial refinement level
    pub refinement_level: u32,
    /// Geometry and fields
    pub params: CellParams,
    /// Instantaneous moments
    pub moments: CellMoments,
    /// Post-translation moments
    pub moments_r: CellMoments,
    /// Post-acceleration moments
    pub moments_v: CellMoments,
    /// Velocity timestep limit
    pub max_v_dt: f64,
}

/// Data of one cell for one species
#[derive(Debug, Clone)]
pub struct HaloPayload {
    /// Present only for [`HaloMode::AllSpatialData`]
    pub state: Option<CellState>,
    /// Population of the species being synchronized
    pub population: Population,
}

impl HaloPayload {
    fn pack(cell: &SpatialCell, pop: usize, mode: HaloMode) -> Self {
        match mode {
            HaloMode::AllSpatialData => Self {
                state: Some(CellState {
                    sysboundary: cell.sysboundary,
                    refinement_level: cell.refinement_level,
                    params: cell.params,
                    moments: cell.moments,
                    moments_r: cell.moments_r,
                    moments_v: cell.moments_v,
                    max_v_dt: cell.max_v_dt,
                }),
                population: cell.population(pop).clone(),
            },
            HaloMode::VelocityBlockData => Self {
                state: None,
                population: Population {
                    vmesh: cell.population(pop).vmesh.clone(),
                    ..Population::new()
                },
            },
        }
    }

    fn unpack(self, cell: &mut SpatialCell, pop: usize) {
        match self.state {
            Some(state) => {
                cell.sysboundary = state.sysboundary;
                cell.refinement_level = state.refinement_level;
                cell.params = state.params;
                cell.moments = state.moments;
                cell.moments_r = state.moments_r;
                cell.moments_v = state.moments_v;
                cell.max_v_dt = state.max_v_dt;
                *cell.population_mut(pop) = self.population;
            }
            None => cell.population_mut(pop).vmesh = self.population.vmesh,
        }
    }
}

/// Refresh every ghost cell of `grid` with species `pop` data from its
/// owner. Returns the number of cells received.
pub fn refresh_halo(
    grid: &mut RankGrid,
    comm: &Communicator,
    pop: usize,
    mode: HaloMode,
) -> SolverResult<usize> {
    let mut outgoing: FxHashMap<CellId, HaloPayload> = FxHashMap::default();
    for &id in grid.exports() {
        if let Some(cell) = grid.cell(id) {
            outgoing.insert(id, HaloPayload::pack(cell, pop, mode));
        }
    }
    let sent = outgoing.len();

    let received = comm.exchange(outgoing, grid.ghost_owners())?;
    let count = received.len();
    for (id, payload) in received {
        let cell = grid.cell_mut(id).ok_or_else(|| SolverError::Communication {
            rank: comm.rank(),
            reason: format!("received payload for unknown cell {}", id),
        })?;
        payload.unpack(cell, pop);
    }

    comm.barrier();
    tracing::debug!(
        "Rank {} halo refresh ({:?}, species {}): sent {}, received {}",
        comm.rank(),
        mode,
        pop,
        sent,
        count
    );
    Ok(count)
}
