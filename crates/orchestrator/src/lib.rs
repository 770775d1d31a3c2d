//! Orchestration Layer
//!
//! This crate runs the distributed semi-Lagrangian Vlasov pipeline on top of
//! the per-cell numerics in `kernel`:
//! - Configuration loading and validation
//! - The emulated distributed mesh (ranks as threads) and its communicator
//! - Halo refreshes, directional cell sets, and the z/x/y translation sweeps
//! - Velocity-space acceleration with cluster-wide subcycling
//! - Moment stages, boundary handling, and the Fluctuations initial condition
//! - The per-rank solver and the distributed run coordinator

#![warn(missing_docs)]

// Per-cell loops go through these so the `parallel` feature can swap in rayon.
#[cfg(feature = "parallel")]
macro_rules! par_for_each_mut {
    ($v:expr, $f:expr) => {{
        use rayon::prelude::*;
        ($v).par_iter_mut().for_each($f)
    }};
}

#[cfg(not(feature = "parallel"))]
macro_rules! par_for_each_mut {
    ($v:expr, $f:expr) => {
        ($v).iter_mut().for_each($f)
    };
}

#[cfg(feature = "parallel")]
macro_rules! par_map_collect {
    ($v:expr, $f:expr) => {{
        use rayon::prelude::*;
        ($v).par_iter().map($f).collect::<Vec<_>>()
    }};
}

#[cfg(not(feature = "parallel"))]
macro_rules! par_map_collect {
    ($v:expr, $f:expr) => {
        ($v).iter().map($f).collect::<Vec<_>>()
    };
}

pub mod acceleration;
pub mod cell_sets;
pub mod comm;
pub mod config;
pub mod distributed;
pub mod error;
pub mod grid;
pub mod halo;
pub mod mesh;
pub mod moments;
pub mod project;
pub mod solver;
pub mod sysboundary;
pub mod translation;

pub use config::SimulationConfig;
pub use distributed::{run_distributed, run_single_instance, DistributedResult};
pub use error::{SolverError, SolverResult};
pub use solver::{CellSummary, RankSolver};

/// Load a configuration file and run it for its configured number of steps.
///
/// # Example
/// ```no_run
/// use orchestrator::run_from_config;
///
/// let result = run_from_config("config/fluctuations.json")?;
/// println!("mass drift: {:e}", result.mass_drift());
/// # Ok::<(), orchestrator::SolverError>(())
/// ```
pub fn run_from_config(config_path: &str) -> SolverResult<DistributedResult> {
    tracing::info!("Running simulation from config: {}", config_path);
    let config = SimulationConfig::load(config_path)?;
    tracing::info!("Configuration loaded: {}", config.name);
    run_distributed(&config, config.max_timesteps)
}
