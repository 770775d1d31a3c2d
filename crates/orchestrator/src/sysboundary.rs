//! Boundary classification and the outflow condition

use kernel::{CellId, FaceDirection, SysBoundaryType, VelocityMesh};

use crate::comm::Communicator;
use crate::error::SolverResult;
use crate::grid::RankGrid;
use crate::halo::{refresh_halo, HaloMode};
use crate::mesh::MeshTopology;

fn open_face_type(topology: &MeshTopology, id: CellId) -> SysBoundaryType {
    if topology.on_open_face(id) {
        SysBoundaryType::Outflow
    } else {
        SysBoundaryType::NotSysboundary
    }
}

/// Boundary type of `id`.
///
/// Cells on a non-periodic face are outflow cells. A boundary cell with no
/// regular face neighbor is left alone entirely.
pub fn classify(topology: &MeshTopology, id: CellId) -> SysBoundaryType {
    let mut result = open_face_type(topology, id);
    if result == SysBoundaryType::NotSysboundary {
        return result;
    }
    let has_regular_neighbor = topology
        .face_neighbors(id)
        .into_iter()
        .filter_map(|(n, _)| n)
        .any(|n| open_face_type(topology, n) == SysBoundaryType::NotSysboundary);
    if !has_regular_neighbor
        && SysBoundaryType::DoNotCompute.precedence() > result.precedence()
    {
        result = SysBoundaryType::DoNotCompute;
    }
    result
}

/// Classify every cell `grid` holds. Ghosts are classified from the
/// topology so they agree with their owners without communication.
pub fn classify_sysboundaries(grid: &mut RankGrid) {
    let ids: Vec<CellId> = grid
        .local_cells()
        .iter()
        .copied()
        .chain(grid.ghost_owners().iter().map(|&(id, _)| id))
        .collect();
    let mut outflow = 0;
    let mut do_not_compute = 0;
    for id in ids {
        let kind = classify(grid.topology(), id);
        match kind {
            SysBoundaryType::Outflow if grid.is_local(id) => outflow += 1,
            SysBoundaryType::DoNotCompute if grid.is_local(id) => do_not_compute += 1,
            _ => {}
        }
        if let Some(cell) = grid.cell_mut(id) {
            cell.sysboundary = kind;
        }
    }
    tracing::debug!(
        "Rank {} boundary cells: {} outflow, {} do-not-compute",
        grid.rank(),
        outflow,
        do_not_compute
    );
}

/// Regular face neighbor an outflow cell copies from: the one opposite an
/// open face, or failing that any regular face neighbor.
fn inflow_source(grid: &RankGrid, id: CellId) -> Option<CellId> {
    let is_regular = |n: CellId| {
        grid.cell(n)
            .map_or(false, |c| c.sysboundary == SysBoundaryType::NotSysboundary)
    };
    let opposite_open = FaceDirection::ALL
        .iter()
        .filter(|&&dir| grid.topology().neighbor(id, dir).is_none())
        .filter_map(|&dir| grid.neighbor(id, dir.opposite()))
        .find(|&n| is_regular(n));
    opposite_open.or_else(|| {
        grid.face_neighbors(id)
            .into_iter()
            .filter_map(|(n, _)| n)
            .find(|&n| is_regular(n))
    })
}

/// Refill every local outflow cell with the distribution of its inward
/// regular neighbor, for all species. Collective over ranks. Returns the
/// number of cells refilled per species.
pub fn apply_outflow(grid: &mut RankGrid, comm: &Communicator, n_species: usize) -> SolverResult<usize> {
    if grid.topology().periodic() == [true; 3] {
        return Ok(0);
    }

    let targets: Vec<(CellId, CellId)> = grid
        .local_cells()
        .iter()
        .copied()
        .filter(|&id| grid.cell(id).map_or(false, |c| c.sysboundary.is_dynamic()))
        .filter_map(|id| inflow_source(grid, id).map(|src| (id, src)))
        .collect();

    for pop in 0..n_species {
        refresh_halo(grid, comm, pop, HaloMode::VelocityBlockData)?;
        let copies: Vec<(CellId, VelocityMesh)> = targets
            .iter()
            .filter_map(|&(id, src)| grid.cell(src).map(|c| (id, c.population(pop).vmesh.clone())))
            .collect();
        for (id, vmesh) in copies {
            if let Some(cell) = grid.cell_mut(id) {
                cell.population_mut(pop).vmesh = vmesh;
            }
        }
    }
    Ok(targets.len())
}
