//! Spatial translation: three 1D sweeps per species in the order z, x, y
//!
//! Each sweep computes the new meshes of its whole working set from the
//! pre-sweep state and only then writes them back. Ghost cells in a working
//! set are translated redundantly on every rank that holds them, so no
//! contributions need to be returned to their owners.

use std::time::{Duration, Instant};

use kernel::translation::{translate_pencil, translate_window, WINDOW};
use kernel::{
    Axis, CellId, SpatialCell, Species, SysBoundaryType, VelocityMesh, VLASOV_STENCIL_WIDTH,
};
use rustc_hash::FxHashSet;

use crate::cell_sets::{build_cell_sets, CellSets};
use crate::comm::Communicator;
use crate::error::SolverResult;
use crate::grid::RankGrid;
use crate::halo::{refresh_halo, HaloMode};
use crate::moments::calculate_moments_r;

/// Sweep order
pub const SWEEP_ORDER: [Axis; 3] = [Axis::Z, Axis::X, Axis::Y];

/// Wall time spent in translation, accumulated over species
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TranslationTiming {
    /// Halo refresh time
    pub halo: Duration,
    /// Sweep time per axis, indexed by `Axis::index`
    pub axes: [Duration; 3],
}

/// Settings of the translation stage
#[derive(Debug, Clone, Copy)]
pub struct TranslationParams {
    /// Maximum spatial refinement level; non-zero selects pencils
    pub amr_max_spatial_ref_level: u32,
    /// Accumulate load-balance weights
    pub prepare_for_rebalance: bool,
    /// CFL number for the post-translation timestep limit
    pub max_cfl: f64,
}

/// A 1D mapping algorithm for one sweep
pub trait TranslationMapper: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// New meshes of species `pop` for every cell of `targets` after a
    /// translation along `axis` by `dt`. Must not modify the grid.
    fn map_axis(
        &self,
        grid: &RankGrid,
        targets: &[CellId],
        species: &Species,
        pop: usize,
        axis: Axis,
        dt: f64,
    ) -> Vec<(CellId, VelocityMesh)>;
}

/// Mesh of `id` as a stencil source. `DoNotCompute` cells contribute nothing.
fn source_mesh(grid: &RankGrid, id: Option<CellId>, pop: usize) -> Option<&VelocityMesh> {
    id.and_then(|id| grid.cell(id))
        .filter(|c| c.sysboundary != SysBoundaryType::DoNotCompute)
        .map(|c| &c.population(pop).vmesh)
}

fn cell_width(grid: &RankGrid, id: CellId, axis: Axis) -> f64 {
    grid.cell(id)
        .map_or(0.0, |c: &SpatialCell| c.params.extents[axis.index()])
}

/// Cell-by-cell mapping from a five-cell window; used on unrefined meshes.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformMapper;

impl UniformMapper {
    fn map_cell(
        grid: &RankGrid,
        id: CellId,
        species: &Species,
        pop: usize,
        axis: Axis,
        dt: f64,
    ) -> (CellId, VelocityMesh) {
        let s = VLASOV_STENCIL_WIDTH as i64;
        let mut window: [Option<&VelocityMesh>; WINDOW] = [None; WINDOW];
        for (slot, offset) in window.iter_mut().zip(-s..=s) {
            let n = if offset == 0 {
                Some(id)
            } else {
                grid.neighbor_at(id, axis.positive(), offset)
            };
            *slot = source_mesh(grid, n, pop);
        }
        let dx = cell_width(grid, id, axis);
        (id, translate_window(window, &species.grid, axis, dt, dx))
    }
}

impl TranslationMapper for UniformMapper {
    fn name(&self) -> &'static str {
        "uniform"
    }

    fn map_axis(
        &self,
        grid: &RankGrid,
        targets: &[CellId],
        species: &Species,
        pop: usize,
        axis: Axis,
        dt: f64,
    ) -> Vec<(CellId, VelocityMesh)> {
        par_map_collect!(targets, |&id: &CellId| Self::map_cell(grid, id, species, pop, axis, dt))
    }
}

/// Mapping along pencils: chains of working-set cells that share a
/// refinement level. Each face flux is evaluated once per pencil.
#[derive(Debug, Clone, Copy, Default)]
pub struct PencilMapper;

impl PencilMapper {
    /// Split `targets` into pencils along `axis`. A chain starts where its
    /// predecessor is outside the set or on another refinement level; a
    /// closed ring starts at its smallest cell ID.
    pub fn build_pencils(grid: &RankGrid, targets: &[CellId], axis: Axis) -> Vec<Vec<CellId>> {
        let in_set: FxHashSet<CellId> = targets.iter().copied().collect();
        let mut sorted = targets.to_vec();
        sorted.sort_unstable();

        let level = |id: CellId| grid.cell(id).map_or(0, |c| c.refinement_level);
        let continues = |from: CellId, to: CellId| in_set.contains(&to) && level(from) == level(to);

        let mut visited: FxHashSet<CellId> = FxHashSet::default();
        let mut pencils = Vec::new();
        let walk = |start: CellId, visited: &mut FxHashSet<CellId>| {
            let mut pencil = vec![start];
            visited.insert(start);
            let mut current = start;
            while let Some(next) = grid.neighbor(current, axis.positive()) {
                if !continues(current, next) || visited.contains(&next) {
                    break;
                }
                pencil.push(next);
                visited.insert(next);
                current = next;
            }
            pencil
        };

        for &id in &sorted {
            let is_start = match grid.neighbor(id, axis.negative()) {
                Some(prev) => !continues(prev, id),
                None => true,
            };
            if is_start && !visited.contains(&id) {
                pencils.push(walk(id, &mut visited));
            }
        }
        // Whatever is left lies on closed rings
        for &id in &sorted {
            if !visited.contains(&id) {
                pencils.push(walk(id, &mut visited));
            }
        }
        pencils
    }

    fn map_pencil(
        grid: &RankGrid,
        pencil: &[CellId],
        species: &Species,
        pop: usize,
        axis: Axis,
        dt: f64,
    ) -> Vec<(CellId, VelocityMesh)> {
        let s = VLASOV_STENCIL_WIDTH as i64;
        let (Some(&first), Some(&last)) = (pencil.first(), pencil.last()) else {
            return Vec::new();
        };
        let mut line: Vec<Option<&VelocityMesh>> = Vec::with_capacity(pencil.len() + 2 * s as usize);
        for offset in (1..=s).rev() {
            line.push(source_mesh(grid, grid.neighbor_at(first, axis.negative(), offset), pop));
        }
        line.extend(pencil.iter().map(|&id| source_mesh(grid, Some(id), pop)));
        for offset in 1..=s {
            line.push(source_mesh(grid, grid.neighbor_at(last, axis.positive(), offset), pop));
        }

        let dx = cell_width(grid, first, axis);
        pencil
            .iter()
            .copied()
            .zip(translate_pencil(&line, &species.grid, axis, dt, dx))
            .collect()
    }
}

impl TranslationMapper for PencilMapper {
    fn name(&self) -> &'static str {
        "pencil"
    }

    fn map_axis(
        &self,
        grid: &RankGrid,
        targets: &[CellId],
        species: &Species,
        pop: usize,
        axis: Axis,
        dt: f64,
    ) -> Vec<(CellId, VelocityMesh)> {
        let pencils = Self::build_pencils(grid, targets, axis);
        let mapped = par_map_collect!(&pencils, |pencil: &Vec<CellId>| {
            Self::map_pencil(grid, pencil, species, pop, axis, dt)
        });
        mapped.into_iter().flatten().collect()
    }
}

/// Mapping algorithm for the configured refinement level.
pub fn select_mapper(amr_max_spatial_ref_level: u32) -> Box<dyn TranslationMapper> {
    if amr_max_spatial_ref_level == 0 {
        Box::new(UniformMapper)
    } else {
        Box::new(PencilMapper)
    }
}

/// Translate every species by `dt`, then compute post-translation moments.
///
/// `dt == 0` leaves all distributions untouched and only recomputes the
/// moments. Returns the working sets used, if any sweep ran.
pub fn calculate_spatial_translation(
    grid: &mut RankGrid,
    comm: &Communicator,
    species: &[Species],
    mapper: &dyn TranslationMapper,
    params: &TranslationParams,
    dt: f64,
    timing: &mut TranslationTiming,
) -> SolverResult<Option<CellSets>> {
    if dt == 0.0 {
        calculate_moments_r(grid, species, params.max_cfl);
        return Ok(None);
    }

    let sets = build_cell_sets(
        grid,
        params.prepare_for_rebalance && params.amr_max_spatial_ref_level != 0,
    );
    let dims = grid.topology().dims();

    for (pop, sp) in species.iter().enumerate() {
        let start = Instant::now();
        refresh_halo(grid, comm, pop, HaloMode::AllSpatialData)?;
        timing.halo += start.elapsed();

        for axis in SWEEP_ORDER {
            if dims[axis.index()] <= 1 {
                continue;
            }
            let start = Instant::now();
            let updated = mapper.map_axis(grid, sets.for_axis(axis), sp, pop, axis, dt);
            for (id, vmesh) in updated {
                if let Some(cell) = grid.cell_mut(id) {
                    cell.population_mut(pop).vmesh = vmesh;
                }
            }
            timing.axes[axis.index()] += start.elapsed();
        }
        tracing::debug!(
            "Rank {} translated species {} with the {} mapper",
            comm.rank(),
            sp.name,
            mapper.name()
        );
    }

    if params.prepare_for_rebalance {
        let n_species = species.len();
        for cell in grid.local_cells_mut() {
            let blocks: usize = (0..n_species).map(|p| cell.block_count(p)).sum();
            cell.lb_weight_counter += blocks as f64;
        }
    }

    calculate_moments_r(grid, species, params.max_cfl);
    Ok(Some(sets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::tests::test_config;
    use crate::mesh::MeshTopology;
    use crate::sysboundary::classify_sysboundaries;

    fn setup(cells: [usize; 3]) -> (RankGrid, Vec<Species>) {
        let config = test_config(cells, 1);
        let species = config.species_list();
        let topo = Arc::new(MeshTopology::new(&config));
        let mut grid = RankGrid::new(topo, 0, 1);
        classify_sysboundaries(&mut grid);
        (grid, species)
    }

    fn fill_blob(grid: &mut RankGrid, species: &Species, id: CellId, value: f64) {
        let cell = grid.cell_mut(id).unwrap();
        for v in [[2.5e5, 5.0e4, 5.0e4], [-1.5e5, -5.0e4, 2.5e5], [5.0e4, 3.5e5, -5.0e4]] {
            cell.population_mut(0).vmesh.set_value(&species.grid, v, value);
        }
    }

    fn params() -> TranslationParams {
        TranslationParams {
            amr_max_spatial_ref_level: 0,
            prepare_for_rebalance: false,
            max_cfl: 0.99,
        }
    }

    #[test]
    fn test_pencils_cover_targets_once() {
        let (grid, _) = setup([5, 2, 1]);
        let targets: Vec<CellId> = grid.local_cells().to_vec();
        let pencils = PencilMapper::build_pencils(&grid, &targets, Axis::X);
        // Two periodic rings of five cells, each starting at its smallest ID
        assert_eq!(pencils.len(), 2);
        assert_eq!(pencils[0], vec![1, 2, 3, 4, 5]);
        assert_eq!(pencils[1], vec![6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_pencils_break_at_set_edges() {
        let (grid, _) = setup([6, 1, 1]);
        let pencils = PencilMapper::build_pencils(&grid, &[2, 3, 5], Axis::X);
        assert_eq!(pencils, vec![vec![2, 3], vec![5]]);
    }

    #[test]
    fn test_uniform_and_pencil_agree() {
        let (mut grid, species) = setup([6, 1, 1]);
        for (id, value) in [(1, 1.0), (2, 3.0), (4, 0.5), (5, 2.0)] {
            fill_blob(&mut grid, &species[0], id, value);
        }
        let targets = grid.local_cells().to_vec();
        let dt = 1.5;
        let mut uniform = UniformMapper.map_axis(&grid, &targets, &species[0], 0, Axis::X, dt);
        let mut pencil = PencilMapper.map_axis(&grid, &targets, &species[0], 0, Axis::X, dt);
        uniform.sort_by_key(|(id, _)| *id);
        pencil.sort_by_key(|(id, _)| *id);
        assert_eq!(uniform, pencil);
    }

    #[test]
    fn test_zero_dt_only_computes_moments() {
        let (mut grid, species) = setup([3, 1, 1]);
        fill_blob(&mut grid, &species[0], 2, 1.0);
        let before = grid.cell(2).unwrap().population(0).vmesh.clone();
        let comm = Communicator::create(1).remove(0);
        let mut timing = TranslationTiming::default();
        let sets = calculate_spatial_translation(&mut grid, &comm, &species, &UniformMapper, &params(), 0.0, &mut timing)
            .unwrap();
        assert!(sets.is_none());
        assert_eq!(grid.cell(2).unwrap().population(0).vmesh, before);
        assert!(grid.cell(2).unwrap().moments_r.rhom > 0.0);
        assert_eq!(timing, TranslationTiming::default());
    }

    #[test]
    fn test_translation_conserves_mass_on_periodic_line() {
        let (mut grid, species) = setup([4, 1, 1]);
        fill_blob(&mut grid, &species[0], 1, 1.0);
        fill_blob(&mut grid, &species[0], 3, 2.0);
        let before = kernel::conservation_metrics(grid.iter_local(), &species);
        let comm = Communicator::create(1).remove(0);
        let mut timing = TranslationTiming::default();
        let p = TranslationParams { prepare_for_rebalance: true, ..params() };
        let sets = calculate_spatial_translation(&mut grid, &comm, &species, &UniformMapper, &p, 1.5, &mut timing)
            .unwrap()
            .unwrap();
        assert_eq!(sets.x, vec![1, 2, 3, 4]);
        let after = kernel::conservation_metrics(grid.iter_local(), &species);
        assert!(after.mass_drift(&before) < 1e-12, "drift {}", after.mass_drift(&before));
        assert!(grid.cell(2).unwrap().block_count(0) > 0, "content should stream into cell 2");
        assert!(grid.iter_local().all(|c| c.lb_weight_counter == c.block_count(0) as f64));
    }
}
