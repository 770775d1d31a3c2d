//! Configuration parsing and validation for Vlasov runs

use kernel::{Species, VelocityGrid, ELEMENTARY_CHARGE, PROTON_MASS};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::error::{SolverError, SolverResult};
use crate::project::FluctuationsParams;

/// Main simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Human-readable simulation name
    pub name: String,
    /// Spatial grid
    pub grid: GridConfig,
    /// Boundary conditions per face
    #[serde(default)]
    pub boundary_conditions: BoundaryConditions,
    /// Number of ranks (threads) the grid is partitioned over
    #[serde(default = "default_ranks")]
    pub ranks: usize,
    /// Particle species
    pub species: Vec<SpeciesConfig>,
    /// Maximum spatial refinement level; non-zero selects the pencil mapper
    #[serde(default)]
    pub amr_max_spatial_ref_level: u32,
    /// Accumulate load-balance weights during translation
    #[serde(default)]
    pub prepare_for_rebalance: bool,
    /// Largest gyration angle per acceleration subcycle (degrees)
    #[serde(default = "default_max_rotation")]
    pub max_acceleration_rotation: f64,
    /// CFL number for the spatial translation timestep limit
    #[serde(default = "default_max_cfl")]
    pub vlasov_solver_max_cfl: f64,
    /// Timestep (seconds)
    pub dt: f64,
    /// Number of timesteps to run
    #[serde(default = "default_max_timesteps")]
    pub max_timesteps: u64,
    /// Initial-condition parameters
    #[serde(default)]
    pub project: FluctuationsParams,
}

/// Spatial grid extent and resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Cells per axis [nx, ny, nz]
    pub cells: [usize; 3],
    /// Minimum corner [x, y, z] (m)
    pub min: [f64; 3],
    /// Maximum corner [x, y, z] (m)
    pub max: [f64; 3],
}

/// Boundary condition on one domain face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaceBoundary {
    /// Wraps around to the opposite face
    Periodic,
    /// Open face; outermost cells become outflow boundary cells
    Outflow,
}

/// Boundary conditions for all six domain faces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryConditions {
    /// X minimum face boundary
    pub x_min: FaceBoundary,
    /// X maximum face boundary
    pub x_max: FaceBoundary,
    /// Y minimum face boundary
    pub y_min: FaceBoundary,
    /// Y maximum face boundary
    pub y_max: FaceBoundary,
    /// Z minimum face boundary
    pub z_min: FaceBoundary,
    /// Z maximum face boundary
    pub z_max: FaceBoundary,
}

/// One particle species
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesConfig {
    /// Species name
    pub name: String,
    /// Charge in elementary charges
    #[serde(default = "default_charge")]
    pub charge: f64,
    /// Mass in proton masses
    #[serde(default = "default_mass")]
    pub mass: f64,
    /// Sparsity cutoff for velocity blocks
    #[serde(default = "default_sparse_min_value")]
    pub sparse_min_value: f64,
    /// Velocity grid
    pub velocity: VelocityGrid,
}

// Default values
fn default_ranks() -> usize {
    1
}

fn default_max_rotation() -> f64 {
    22.0
}

fn default_max_cfl() -> f64 {
    0.99
}

fn default_max_timesteps() -> u64 {
    1
}

fn default_charge() -> f64 {
    1.0
}

fn default_mass() -> f64 {
    1.0
}

fn default_sparse_min_value() -> f64 {
    1.0e-15
}

impl Default for BoundaryConditions {
    fn default() -> Self {
        Self {
            x_min: FaceBoundary::Periodic,
            x_max: FaceBoundary::Periodic,
            y_min: FaceBoundary::Periodic,
            y_max: FaceBoundary::Periodic,
            z_min: FaceBoundary::Periodic,
            z_max: FaceBoundary::Periodic,
        }
    }
}

impl BoundaryConditions {
    /// Per-axis periodicity. Only meaningful once pairing is validated.
    pub fn periodic(&self) -> [bool; 3] {
        [
            self.x_min == FaceBoundary::Periodic,
            self.y_min == FaceBoundary::Periodic,
            self.z_min == FaceBoundary::Periodic,
        ]
    }

    /// `(min, max)` boundary of each axis.
    pub fn faces(&self) -> [(FaceBoundary, FaceBoundary); 3] {
        [
            (self.x_min, self.x_max),
            (self.y_min, self.y_max),
            (self.z_min, self.z_max),
        ]
    }
}

impl SpeciesConfig {
    /// Species in SI units.
    pub fn to_species(&self) -> Species {
        Species {
            name: self.name.clone(),
            charge: self.charge * ELEMENTARY_CHARGE,
            mass: self.mass * PROTON_MASS,
            sparse_min_value: self.sparse_min_value,
            grid: self.velocity.clone(),
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &str) -> SolverResult<Self> {
        let contents = fs::read_to_string(path).map_err(|source| SolverError::Io {
            path: path.to_string(),
            source,
        })?;

        let config: SimulationConfig = serde_json::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> SolverResult<()> {
        let invalid = |msg: &str| Err(SolverError::Config(msg.to_string()));

        // Check grid
        for a in 0..3 {
            if self.grid.cells[a] == 0 {
                return invalid("Grid must have at least one cell per axis");
            }
            if self.grid.min[a] >= self.grid.max[a] {
                return invalid("Grid min must be less than max on every axis");
            }
        }

        // Check ranks
        if self.ranks == 0 {
            return invalid("ranks must be at least 1");
        }
        let longest = self.grid.cells.iter().copied().max().unwrap_or(0);
        if self.ranks > longest {
            return Err(SolverError::Config(format!(
                "Cannot split {} cells along the longest axis across {} ranks",
                longest, self.ranks
            )));
        }

        // Check species
        if self.species.is_empty() {
            return invalid("At least one species is required");
        }
        for sp in &self.species {
            if sp.mass <= 0.0 {
                return Err(SolverError::Config(format!("Species {}: mass must be positive", sp.name)));
            }
            if sp.sparse_min_value < 0.0 {
                return Err(SolverError::Config(format!(
                    "Species {}: sparse_min_value must be non-negative",
                    sp.name
                )));
            }
            for a in 0..3 {
                if sp.velocity.blocks[a] == 0 {
                    return Err(SolverError::Config(format!(
                        "Species {}: velocity grid needs at least one block per axis",
                        sp.name
                    )));
                }
                if sp.velocity.min[a] >= sp.velocity.max[a] {
                    return Err(SolverError::Config(format!(
                        "Species {}: velocity min must be less than max",
                        sp.name
                    )));
                }
            }
        }

        // Check timestep controls
        if !self.dt.is_finite() {
            return invalid("dt must be finite");
        }
        if self.max_timesteps == 0 {
            return invalid("max_timesteps must be at least 1");
        }
        if self.max_acceleration_rotation <= 0.0 || self.max_acceleration_rotation > 180.0 {
            return invalid("max_acceleration_rotation must be in range (0, 180]");
        }
        if self.vlasov_solver_max_cfl <= 0.0 || self.vlasov_solver_max_cfl > 1.0 {
            return invalid("vlasov_solver_max_cfl must be in range (0, 1]");
        }

        let dt_limit = self.max_translation_dt();
        if self.dt.abs() > dt_limit {
            return Err(SolverError::Config(format!(
                "dt {:e}s exceeds the translation limit {:e}s at CFL {}",
                self.dt, dt_limit, self.vlasov_solver_max_cfl
            )));
        }

        self.project.validate()?;

        // Validate periodic boundaries are paired
        self.validate_periodic_boundaries()?;

        Ok(())
    }

    /// Validate that periodic boundaries are properly paired
    fn validate_periodic_boundaries(&self) -> SolverResult<()> {
        for (axis, (lo, hi)) in ["x", "y", "z"].iter().zip(self.boundary_conditions.faces()) {
            if (lo == FaceBoundary::Periodic) != (hi == FaceBoundary::Periodic) {
                return Err(SolverError::Config(format!(
                    "Periodic boundaries must be paired: {}_min and {}_max",
                    axis, axis
                )));
            }
        }
        Ok(())
    }

    /// All species in SI units, indexed by species ID
    pub fn species_list(&self) -> Vec<Species> {
        self.species.iter().map(SpeciesConfig::to_species).collect()
    }

    /// Largest `|dt|` whose spatial translation stays within the CFL limit
    /// for the fastest velocity of every species' grid.
    ///
    /// Axes with a single cell are never translated and do not constrain it.
    pub fn max_translation_dt(&self) -> f64 {
        let dx = self.cell_size();
        let mut limit = f64::MAX;
        for sp in &self.species {
            for a in 0..3 {
                if self.grid.cells[a] <= 1 {
                    continue;
                }
                let vmax = sp.velocity.min[a].abs().max(sp.velocity.max[a].abs());
                if vmax > 0.0 {
                    limit = limit.min(self.vlasov_solver_max_cfl * dx[a] / vmax);
                }
            }
        }
        limit
    }

    /// Cell edge lengths (m)
    pub fn cell_size(&self) -> [f64; 3] {
        let g = &self.grid;
        [
            (g.max[0] - g.min[0]) / g.cells[0] as f64,
            (g.max[1] - g.min[1]) / g.cells[1] as f64,
            (g.max[2] - g.min[2]) / g.cells[2] as f64,
        ]
    }
}
