//! Reference test framework for the distributed Vlasov solver
//!
//! Scenarios run the full pipeline (or one stage of it) on small grids and
//! validate conservation, rank-count parity, zero-step invariance, subcycle
//! participation and directional cell-set shapes.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use kernel::{CellId, VelocityGrid};
use orchestrator::acceleration::calculate_acceleration;
use orchestrator::cell_sets::build_cell_sets;
use orchestrator::comm::Communicator;
use orchestrator::config::{BoundaryConditions, GridConfig, SpeciesConfig};
use orchestrator::grid::RankGrid;
use orchestrator::mesh::MeshTopology;
use orchestrator::project::FluctuationsParams;
use orchestrator::sysboundary::classify_sysboundaries;
use orchestrator::{run_distributed, run_single_instance, DistributedResult, SimulationConfig, SolverResult};

/// Quiet proton Maxwellian on a periodic grid of 1000 km cells
pub fn quiet_maxwellian(cells: [usize; 3], ranks: usize, dt: f64) -> SimulationConfig {
    SimulationConfig {
        name: format!("maxwellian-{}x{}x{}", cells[0], cells[1], cells[2]),
        grid: GridConfig {
            cells,
            min: [0.0; 3],
            max: [
                1.0e6 * cells[0] as f64,
                1.0e6 * cells[1] as f64,
                1.0e6 * cells[2] as f64,
            ],
        },
        boundary_conditions: BoundaryConditions::default(),
        ranks,
        species: vec![SpeciesConfig {
            name: "proton".to_string(),
            charge: 1.0,
            mass: 1.0,
            sparse_min_value: 1.0e-15,
            velocity: VelocityGrid {
                min: [-6.0e5; 3],
                max: [6.0e5; 3],
                blocks: [3, 3, 3],
            },
        }],
        amr_max_spatial_ref_level: 0,
        prepare_for_rebalance: false,
        max_acceleration_rotation: 22.0,
        vlasov_solver_max_cfl: 0.99,
        dt,
        max_timesteps: 1,
        project: FluctuationsParams {
            density_pert_rel_amp: 0.0,
            velocity_pert_abs_amp: 0.0,
            n_velocity_samples: 2,
            ..FluctuationsParams::default()
        },
    }
}

/// Expected result criteria for a full-pipeline run
#[derive(Debug, Clone, Default)]
pub struct ExpectedResult {
    /// Total mass conservation
    pub conservation: Option<ConservationCheck>,
    /// Spatial uniformity of mass density
    pub uniformity: Option<UniformityCheck>,
    /// Same result on a single rank
    pub rank_parity: Option<RankParityCheck>,
    /// A zero-length step changes nothing
    pub zero_step: Option<ZeroStepCheck>,
}

/// Check total mass drift over the run
#[derive(Debug, Clone)]
pub struct ConservationCheck {
    /// Maximum allowed relative mass drift
    pub max_mass_drift: f64,
}

/// Check mass density variation across cells
#[derive(Debug, Clone)]
pub struct UniformityCheck {
    /// Maximum allowed relative variation of rhom
    pub max_variation: f64,
}

/// Check per-cell agreement with a single-rank run
#[derive(Debug, Clone)]
pub struct RankParityCheck {
    /// Relative tolerance on rhom
    pub tolerance: f64,
}

/// Check that a run with `dt = 0` reproduces the post-setup state
#[derive(Debug, Clone)]
pub struct ZeroStepCheck {
    /// Relative tolerance on rhom
    pub tolerance: f64,
}

/// What a reference test exercises
#[derive(Debug, Clone)]
pub enum Scenario {
    /// Full timesteps through the distributed driver
    Run {
        /// Run configuration
        config: SimulationConfig,
        /// Number of timesteps
        timesteps: u64,
        /// Criteria
        expected: ExpectedResult,
    },
    /// One acceleration stage on a row of cells with prescribed velocity
    /// timestep limits
    Subcycles {
        /// Per-cell velocity timestep limits (s)
        max_v_dt: Vec<f64>,
        /// Acceleration timestep (s)
        dt: f64,
        /// Expected number of active cells at each subcycle step
        expected_active: Vec<usize>,
    },
    /// Directional set shapes of one rank
    CellSets {
        /// Grid and partitioning
        config: SimulationConfig,
        /// Rank to inspect
        rank: usize,
        /// Expected (y, x, z) set sizes
        expected_sizes: [usize; 3],
    },
}

/// A reference test case
#[derive(Debug, Clone)]
pub struct ReferenceTest {
    /// Test name
    pub name: String,
    /// What to run and check
    pub scenario: Scenario,
}

/// Result of an individual validation check
#[derive(Debug)]
pub struct CheckResult {
    /// Check name
    pub name: String,
    /// Whether check passed
    pub passed: bool,
    /// Error message if failed
    pub message: Option<String>,
}

impl CheckResult {
    fn new(name: &str, passed: bool, message: impl FnOnce() -> String) -> Self {
        Self {
            name: name.to_string(),
            passed,
            message: if passed { None } else { Some(message()) },
        }
    }
}

/// Result of running a reference test
#[derive(Debug)]
pub struct TestResult {
    /// Test name
    pub name: String,
    /// Whether all checks passed
    pub passed: bool,
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Number of timesteps executed
    pub timesteps: u64,
    /// Simulated time (seconds)
    pub sim_time: f64,
    /// Relative mass drift, for full runs
    pub mass_drift: Option<f64>,
}

impl ReferenceTest {
    /// Run the reference test and return results
    pub fn run(&self) -> SolverResult<TestResult> {
        tracing::info!("Running reference test: {}", self.name);
        let (checks, timesteps, sim_time, mass_drift) = match &self.scenario {
            Scenario::Run {
                config,
                timesteps,
                expected,
            } => {
                let result = run_distributed(config, *timesteps)?;
                let checks = validate_run(config, *timesteps, &result, expected)?;
                (checks, result.timesteps, result.sim_time, Some(result.mass_drift()))
            }
            Scenario::Subcycles {
                max_v_dt,
                dt,
                expected_active,
            } => {
                let active = subcycle_participation(max_v_dt, *dt)?;
                let check = CheckResult::new("Subcycle participation", &active == expected_active, || {
                    format!("active cells per step {:?}, expected {:?}", active, expected_active)
                });
                (vec![check], 1, *dt, None)
            }
            Scenario::CellSets {
                config,
                rank,
                expected_sizes,
            } => (vec![validate_cell_sets(config, *rank, *expected_sizes)], 0, 0.0, None),
        };

        Ok(TestResult {
            name: self.name.clone(),
            passed: checks.iter().all(|c| c.passed),
            checks,
            timesteps,
            sim_time,
            mass_drift,
        })
    }
}

fn validate_run(
    config: &SimulationConfig,
    timesteps: u64,
    result: &DistributedResult,
    expected: &ExpectedResult,
) -> SolverResult<Vec<CheckResult>> {
    let mut checks = Vec::new();

    if let Some(check) = &expected.conservation {
        let drift = result.mass_drift();
        checks.push(CheckResult::new("Mass conservation", drift <= check.max_mass_drift, || {
            format!("drift {:.3e} exceeds {:.3e}", drift, check.max_mass_drift)
        }));
    }

    if let Some(check) = &expected.uniformity {
        let (lo, hi) = result
            .cells
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), c| (lo.min(c.rhom), hi.max(c.rhom)));
        let variation = if hi > 0.0 { (hi - lo) / hi } else { 0.0 };
        checks.push(CheckResult::new("Density uniformity", variation <= check.max_variation, || {
            format!("rhom varies by {:.3e}", variation)
        }));
    }

    if let Some(check) = &expected.rank_parity {
        let single = run_single_instance(config, timesteps)?;
        checks.push(compare_cells("Rank parity", &single, result, check.tolerance));
    }

    if let Some(check) = &expected.zero_step {
        let mut frozen = config.clone();
        frozen.dt = 0.0;
        let before = run_distributed(&frozen, 0)?;
        let after = run_distributed(&frozen, timesteps)?;
        checks.push(compare_cells("Zero-step invariance", &before, &after, check.tolerance));
    }

    Ok(checks)
}

/// Compare per-cell block counts exactly and mass densities within `tolerance`.
pub fn compare_cells(name: &str, a: &DistributedResult, b: &DistributedResult, tolerance: f64) -> CheckResult {
    if a.cells.len() != b.cells.len() {
        return CheckResult::new(name, false, || {
            format!("{} cells vs {}", a.cells.len(), b.cells.len())
        });
    }
    let mismatch = a.cells.iter().zip(&b.cells).find(|(x, y)| {
        x.id != y.id
            || x.blocks != y.blocks
            || (x.rhom - y.rhom).abs() > tolerance * x.rhom.abs().max(f64::MIN_POSITIVE)
    });
    CheckResult::new(name, mismatch.is_none(), || match mismatch {
        Some((x, y)) => format!(
            "cell {}: rhom {:e} vs {:e}, blocks {} vs {}",
            x.id, x.rhom, y.rhom, x.blocks, y.blocks
        ),
        None => String::new(),
    })
}

/// Accelerate a row of proton cells whose magnetic fields give the velocity
/// timestep limits `max_v_dt`, and report how many cells were active at each
/// subcycle step.
pub fn subcycle_participation(max_v_dt: &[f64], dt: f64) -> SolverResult<Vec<usize>> {
    let config = quiet_maxwellian([max_v_dt.len(), 1, 1], 1, dt);
    let species = config.species_list();
    let topology = Arc::new(MeshTopology::new(&config));
    let mut grid = RankGrid::new(topology, 0, species.len());
    classify_sysboundaries(&mut grid);
    let comm = Communicator::create(1).remove(0);

    let rotation = config.max_acceleration_rotation.to_radians();
    let proton = &species[0];
    for (i, &limit) in max_v_dt.iter().enumerate() {
        let Some(cell) = grid.cell_mut(i as CellId + 1) else { continue };
        cell.params.background_b = [0.0, 0.0, rotation / (proton.charge_to_mass() * limit)];
        cell.population_mut(0)
            .vmesh
            .set_value(&proton.grid, [1.5e5, 5.0e4, 5.0e4], 1.0);
    }

    let report = calculate_acceleration(&mut grid, &comm, &species, config.max_acceleration_rotation, 1, dt)?;
    Ok(report
        .into_iter()
        .next()
        .map(|r| r.active_cells_per_step)
        .unwrap_or_default())
}

fn validate_cell_sets(config: &SimulationConfig, rank: usize, expected: [usize; 3]) -> CheckResult {
    let species = config.species_list();
    let topology = Arc::new(MeshTopology::new(config));
    let mut grid = RankGrid::new(topology, rank, species.len());
    classify_sysboundaries(&mut grid);
    let sets = build_cell_sets(&grid, false);
    let sizes = [sets.y.len(), sets.x.len(), sets.z.len()];
    CheckResult::new("Cell-set sizes", sizes == expected, || {
        format!("(y, x, z) sizes {:?}, expected {:?}", sizes, expected)
    })
}

/// The standard reference suite
pub fn standard_suite() -> Vec<ReferenceTest> {
    vec![
        ReferenceTest {
            name: "Uniform Maxwellian 10x10x10".to_string(),
            scenario: Scenario::Run {
                config: quiet_maxwellian([10, 10, 10], 2, 1.0e-3),
                timesteps: 1,
                expected: ExpectedResult {
                    conservation: Some(ConservationCheck { max_mass_drift: 1.0e-9 }),
                    uniformity: Some(UniformityCheck { max_variation: 1.0e-9 }),
                    ..ExpectedResult::default()
                },
            },
        },
        ReferenceTest {
            name: "Rank Parity".to_string(),
            scenario: Scenario::Run {
                config: quiet_maxwellian([8, 2, 2], 4, 0.5),
                timesteps: 2,
                expected: ExpectedResult {
                    rank_parity: Some(RankParityCheck { tolerance: 1.0e-12 }),
                    ..ExpectedResult::default()
                },
            },
        },
        ReferenceTest {
            name: "Zero Timestep".to_string(),
            scenario: Scenario::Run {
                config: quiet_maxwellian([4, 2, 1], 2, 0.0),
                timesteps: 2,
                expected: ExpectedResult {
                    zero_step: Some(ZeroStepCheck { tolerance: 1.0e-12 }),
                    ..ExpectedResult::default()
                },
            },
        },
        ReferenceTest {
            name: "Subcycle Participation".to_string(),
            scenario: Scenario::Subcycles {
                max_v_dt: vec![2.2, 6.0],
                dt: 10.0,
                expected_active: vec![2, 2, 1, 1, 1],
            },
        },
        ReferenceTest {
            name: "Cell Sets 3x1x1".to_string(),
            scenario: Scenario::CellSets {
                config: quiet_maxwellian([3, 1, 1], 1, 1.0e-3),
                rank: 0,
                expected_sizes: [3, 3, 3],
            },
        },
    ]
}

impl TestResult {
    /// Print a summary of the test result
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(80));
        println!("Test: {}", self.name);
        println!("{}", "=".repeat(80));
        println!("Status: {}", if self.passed { "PASSED" } else { "FAILED" });
        println!("Timesteps: {}", self.timesteps);
        println!("Simulated time: {:.6e} s", self.sim_time);
        if let Some(drift) = self.mass_drift {
            println!("Mass drift: {:.3e}", drift);
        }
        println!("\nValidation Checks:");
        for check in &self.checks {
            let status = if check.passed { "PASS" } else { "FAIL" };
            print!("  [{}] {}", status, check.name);
            if let Some(ref msg) = check.message {
                print!(" - {}", msg);
            }
            println!();
        }
        println!("{}", "=".repeat(80));
    }
}
