//! Distributed run coordinator
//!
//! Each rank runs its own `RankSolver` on a separate thread. Ranks share
//! only the mesh topology and a communicator; ghost data moves through halo
//! refreshes inside the solver stages.

use std::sync::{Arc, Mutex};
use std::thread;

use crate::comm::Communicator;
use crate::config::SimulationConfig;
use crate::error::{SolverError, SolverResult};
use crate::mesh::MeshTopology;
use crate::project::Fluctuations;
use crate::solver::{CellSummary, RankSolver, StepTiming};

/// What one rank hands back when its thread finishes
#[derive(Debug, Clone)]
struct RankOutput {
    cells: Vec<CellSummary>,
    initial_mass: f64,
    timing: StepTiming,
}

/// Result of a distributed run
#[derive(Debug, Clone)]
pub struct DistributedResult {
    /// Final state of every cell, sorted by cell ID
    pub cells: Vec<CellSummary>,
    /// Number of ranks used
    pub ranks: usize,
    /// Number of timesteps executed
    pub timesteps: u64,
    /// Total simulated time (seconds)
    pub sim_time: f64,
    /// Total mass after setup (kg)
    pub initial_mass: f64,
    /// Stage timings per rank
    pub timings: Vec<StepTiming>,
}

impl DistributedResult {
    /// Total mass at the end of the run (kg)
    pub fn total_mass(&self) -> f64 {
        self.cells.iter().map(|c| c.mass).sum()
    }

    /// Velocity blocks over all cells and species
    pub fn total_blocks(&self) -> usize {
        self.cells.iter().map(|c| c.blocks).sum()
    }

    /// Relative change of total mass over the run
    pub fn mass_drift(&self) -> f64 {
        if self.initial_mass > 0.0 {
            ((self.total_mass() - self.initial_mass) / self.initial_mass).abs()
        } else {
            self.total_mass().abs()
        }
    }
}

fn run_rank(
    config: &SimulationConfig,
    topology: Arc<MeshTopology>,
    comm: Communicator,
    num_timesteps: u64,
) -> SolverResult<RankOutput> {
    let project = Fluctuations::new(config.project.clone(), topology.cell_count() as u64);
    let mut solver = RankSolver::new(config, topology, comm);
    solver.initialize(&project)?;
    let initial_mass = solver.cell_summaries().iter().map(|c| c.mass).sum();

    for step in 0..num_timesteps {
        solver.step()?;
        if (step + 1) % 10 == 0 {
            tracing::debug!(
                "Rank {} step {}/{}: {} blocks",
                solver.grid().rank(),
                step + 1,
                num_timesteps,
                solver.block_count()
            );
        }
    }

    Ok(RankOutput {
        cells: solver.cell_summaries(),
        initial_mass,
        timing: *solver.timing(),
    })
}

/// Run `config` for `num_timesteps` steps on `config.ranks` rank threads.
///
/// The first error any rank reports is returned. A panicking rank is
/// reported as [`SolverError::RankPanicked`].
pub fn run_distributed(config: &SimulationConfig, num_timesteps: u64) -> SolverResult<DistributedResult> {
    config.validate()?;
    let n = config.ranks;
    let topology = Arc::new(MeshTopology::new(config));

    tracing::info!(
        "Distributed run {}: {} ranks, {:?} cells, dt={:e}s, {} steps",
        config.name,
        n,
        topology.dims(),
        config.dt,
        num_timesteps
    );

    let outputs: Arc<Mutex<Vec<Option<SolverResult<RankOutput>>>>> =
        Arc::new(Mutex::new((0..n).map(|_| None).collect()));
    let mut handles = Vec::with_capacity(n);

    for comm in Communicator::create(n) {
        let rank = comm.rank();
        let config = config.clone();
        let topology = Arc::clone(&topology);
        let outputs = Arc::clone(&outputs);
        let handle = thread::Builder::new()
            .name(format!("rank-{}", rank))
            .spawn(move || {
                let result = run_rank(&config, topology, comm, num_timesteps);
                if let Err(err) = &result {
                    tracing::warn!("Rank {} failed: {}", rank, err);
                }
                if let Ok(mut slots) = outputs.lock() {
                    slots[rank] = Some(result);
                }
            })
            .map_err(|source| SolverError::Communication {
                rank,
                reason: format!("failed to spawn rank thread: {}", source),
            })?;
        handles.push((rank, handle));
    }

    for (rank, handle) in handles {
        handle.join().map_err(|_| SolverError::RankPanicked(rank))?;
    }

    let slots = {
        let mut guard = outputs.lock().map_err(|_| SolverError::Communication {
            rank: 0,
            reason: "rank output table poisoned".to_string(),
        })?;
        std::mem::take(&mut *guard)
    };

    let mut cells = Vec::with_capacity(topology.cell_count());
    let mut initial_mass = 0.0;
    let mut timings = Vec::with_capacity(n);
    for (rank, slot) in slots.into_iter().enumerate() {
        let output = slot.ok_or(SolverError::RankPanicked(rank))??;
        cells.extend(output.cells);
        initial_mass += output.initial_mass;
        timings.push(output.timing);
    }
    cells.sort_unstable_by_key(|c| c.id);

    let result = DistributedResult {
        cells,
        ranks: n,
        timesteps: num_timesteps,
        sim_time: config.dt * num_timesteps as f64,
        initial_mass,
        timings,
    };

    tracing::info!(
        "Distributed run complete: {} steps, {:.6e}s simulated, {} cells, {} blocks, mass drift {:.3e}",
        result.timesteps,
        result.sim_time,
        result.cells.len(),
        result.total_blocks(),
        result.mass_drift()
    );
    for (rank, t) in result.timings.iter().enumerate() {
        tracing::info!(
            "  Rank {}: boundaries {:?}, translation {:?} (halo {:?}, z {:?}, x {:?}, y {:?}), acceleration {:?}, moments {:?}",
            rank,
            t.boundaries,
            t.translation,
            t.translation_detail.halo,
            t.translation_detail.axes[2],
            t.translation_detail.axes[0],
            t.translation_detail.axes[1],
            t.acceleration,
            t.moments
        );
    }

    Ok(result)
}

/// Run `config` on a single rank for comparison with distributed runs.
pub fn run_single_instance(config: &SimulationConfig, num_timesteps: u64) -> SolverResult<DistributedResult> {
    let mut single = config.clone();
    single.ranks = 1;
    run_distributed(&single, num_timesteps)
}
