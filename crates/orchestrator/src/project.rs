//! Initial conditions: the "Fluctuations" project
//!
//! A Maxwellian plasma in a uniform background field with small per-cell
//! random perturbations of density, bulk velocity, and magnetic field. The
//! perturbations are drawn from a generator seeded by the cell's row-major
//! index, so every rank produces the same initial state for a cell.

use kernel::{Axis, BlockId, SpatialCell, Species, BOLTZMANN, WID};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{SolverError, SolverResult};

/// Parameters of the Fluctuations initial condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluctuationsParams {
    /// Background field x component (T)
    pub bx0: f64,
    /// Background field y component (T)
    pub by0: f64,
    /// Background field z component (T)
    pub bz0: f64,
    /// Number density (m^-3)
    pub density: f64,
    /// Temperature (K)
    pub temperature: f64,
    /// Amplitude of the magnetic perturbation along x (T)
    pub mag_x_pert_abs_amp: f64,
    /// Amplitude of the magnetic perturbation along y (T)
    pub mag_y_pert_abs_amp: f64,
    /// Amplitude of the magnetic perturbation along z (T)
    pub mag_z_pert_abs_amp: f64,
    /// Relative amplitude of the density perturbation
    pub density_pert_rel_amp: f64,
    /// Amplitude of the bulk velocity perturbation (m/s)
    pub velocity_pert_abs_amp: f64,
    /// Sampling points per velocity dimension inside one velocity cell
    pub n_velocity_samples: u32,
    /// Phase-space densities below this are set to zero
    pub maxw_cutoff: f64,
}

impl Default for FluctuationsParams {
    fn default() -> Self {
        Self {
            bx0: 1.0e-9,
            by0: 2.0e-9,
            bz0: 3.0e-9,
            density: 1.0e7,
            temperature: 2.0e6,
            mag_x_pert_abs_amp: 1.0e-9,
            mag_y_pert_abs_amp: 1.0e-9,
            mag_z_pert_abs_amp: 1.0e-9,
            density_pert_rel_amp: 0.1,
            velocity_pert_abs_amp: 1.0e6,
            n_velocity_samples: 5,
            maxw_cutoff: 1.0e-12,
        }
    }
}

impl FluctuationsParams {
    /// Validate parameter ranges
    pub fn validate(&self) -> SolverResult<()> {
        if self.temperature <= 0.0 {
            return Err(SolverError::Config("Project temperature must be positive (Kelvin)".to_string()));
        }
        if self.density < 0.0 {
            return Err(SolverError::Config("Project density must be non-negative".to_string()));
        }
        if self.n_velocity_samples < 2 {
            return Err(SolverError::Config("n_velocity_samples must be at least 2".to_string()));
        }
        if self.maxw_cutoff < 0.0 {
            return Err(SolverError::Config("maxw_cutoff must be non-negative".to_string()));
        }
        Ok(())
    }
}

/// One-time initializer of cell parameters and distributions.
pub trait Project {
    /// Set fields and distribution of `cell`. `index` is the cell's
    /// zero-based row-major position in the global grid.
    fn set_project_cell(&self, cell: &mut SpatialCell, species: &[Species], index: u64);
}

/// Fluctuations initial condition for a grid of `total_cells` cells
#[derive(Debug, Clone)]
pub struct Fluctuations {
    params: FluctuationsParams,
    total_cells: u64,
}

impl Fluctuations {
    /// Create the project for a grid with `total_cells` cells.
    pub fn new(params: FluctuationsParams, total_cells: u64) -> Self {
        Self { params, total_cells }
    }

    /// Uniform draw in `[0, 1)` turned into a perturbation factor `0.5 - r`.
    fn centered(rng: &mut ChaCha8Rng) -> f64 {
        0.5 - rng.gen::<f64>()
    }

    /// Background and perturbed magnetic field of one cell.
    pub fn set_cell_parameters(&self, cell: &mut SpatialCell, index: u64) {
        let p = &self.params;
        let mut rng = ChaCha8Rng::seed_from_u64(index + self.total_cells);
        cell.params.background_b = [p.bx0, p.by0, p.bz0];
        cell.params.perturbed_b = [
            p.mag_x_pert_abs_amp * Self::centered(&mut rng),
            p.mag_y_pert_abs_amp * Self::centered(&mut rng),
            p.mag_z_pert_abs_amp * Self::centered(&mut rng),
        ];
    }

    /// Unnormalized Maxwellian `exp(-m v^2 / 2kT)`.
    fn maxwellian(&self, mass: f64, v: [f64; 3]) -> f64 {
        let v2 = v[0] * v[0] + v[1] * v[1] + v[2] * v[2];
        (-mass * v2 / (2.0 * BOLTZMANN * self.params.temperature)).exp()
    }

    /// Average phase-space density over the velocity cell with lower
    /// corner `v`, or zero near the grid edges and below the cutoff.
    fn phase_space_density(&self, species: &Species, v: [f64; 3], rnd_rho: f64, rnd_vel: [f64; 3]) -> f64 {
        let p = &self.params;
        let grid = &species.grid;
        let dv = [
            grid.cell_size(Axis::X),
            grid.cell_size(Axis::Y),
            grid.cell_size(Axis::Z),
        ];
        for a in 0..3 {
            if v[a] < grid.min[a] + 0.5 * dv[a] || v[a] > grid.max[a] - 1.5 * dv[a] {
                return 0.0;
            }
        }

        let n = p.n_velocity_samples;
        let step = [
            dv[0] / (n - 1) as f64,
            dv[1] / (n - 1) as f64,
            dv[2] / (n - 1) as f64,
        ];
        let shift = [
            p.velocity_pert_abs_amp * rnd_vel[0],
            p.velocity_pert_abs_amp * rnd_vel[1],
            p.velocity_pert_abs_amp * rnd_vel[2],
        ];
        let mut avg = 0.0;
        for vi in 0..n {
            for vj in 0..n {
                for vk in 0..n {
                    avg += self.maxwellian(
                        species.mass,
                        [
                            v[0] + vi as f64 * step[0] - shift[0],
                            v[1] + vj as f64 * step[1] - shift[1],
                            v[2] + vk as f64 * step[2] - shift[2],
                        ],
                    );
                }
            }
        }

        let norm = (species.mass / (2.0 * std::f64::consts::PI * BOLTZMANN * p.temperature)).powf(1.5);
        let result = avg * p.density * (1.0 + p.density_pert_rel_amp * rnd_rho) * norm / (n * n * n) as f64;
        if result < p.maxw_cutoff {
            0.0
        } else {
            result
        }
    }
}

impl Project for Fluctuations {
    fn set_project_cell(&self, cell: &mut SpatialCell, species: &[Species], index: u64) {
        self.set_cell_parameters(cell, index);

        let mut rng = ChaCha8Rng::seed_from_u64(index);
        let rnd_rho = Self::centered(&mut rng);
        let rnd_vel = [
            Self::centered(&mut rng),
            Self::centered(&mut rng),
            Self::centered(&mut rng),
        ];

        for (pop_id, sp) in species.iter().enumerate() {
            let grid = &sp.grid;
            let vmesh = &mut cell.population_mut(pop_id).vmesh;
            vmesh.clear();
            for id in 0..grid.block_count() as BlockId {
                let corner = grid.block_corner(id);
                for kc in 0..WID {
                    for jc in 0..WID {
                        for ic in 0..WID {
                            let v = [
                                corner[0] + ic as f64 * grid.cell_size(Axis::X),
                                corner[1] + jc as f64 * grid.cell_size(Axis::Y),
                                corner[2] + kc as f64 * grid.cell_size(Axis::Z),
                            ];
                            let f = self.phase_space_density(sp, v, rnd_rho, rnd_vel);
                            if f != 0.0 {
                                vmesh.set_value(grid, grid.cell_center(id, [ic, jc, kc]), f);
                            }
                        }
                    }
                }
            }
            vmesh.adjust(grid, sp.sparse_min_value, &FxHashSet::default());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::{CellParams, VelocityGrid, ELEMENTARY_CHARGE, PROTON_MASS};

    fn proton() -> Species {
        Species {
            name: "proton".to_string(),
            charge: ELEMENTARY_CHARGE,
            mass: PROTON_MASS,
            sparse_min_value: 1e-15,
            grid: VelocityGrid {
                min: [-6.0e5; 3],
                max: [6.0e5; 3],
                blocks: [3, 3, 3],
            },
        }
    }

    fn quiet_params() -> FluctuationsParams {
        FluctuationsParams {
            density_pert_rel_amp: 0.0,
            velocity_pert_abs_amp: 0.0,
            n_velocity_samples: 3,
            ..FluctuationsParams::default()
        }
    }

    #[test]
    fn test_defaults() {
        let p = FluctuationsParams::default();
        assert_eq!([p.bx0, p.by0, p.bz0], [1.0e-9, 2.0e-9, 3.0e-9]);
        assert_eq!(p.density, 1.0e7);
        assert_eq!(p.n_velocity_samples, 5);
        assert!(p.validate().is_ok());
        let bad = FluctuationsParams { n_velocity_samples: 1, ..p };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_same_index_same_cell() {
        let project = Fluctuations::new(FluctuationsParams::default(), 8);
        let sp = [proton()];
        let mut a = SpatialCell::new(1, CellParams::default(), 1);
        let mut b = SpatialCell::new(1, CellParams::default(), 1);
        project.set_project_cell(&mut a, &sp, 3);
        project.set_project_cell(&mut b, &sp, 3);
        assert_eq!(a, b);

        let mut c = SpatialCell::new(1, CellParams::default(), 1);
        project.set_project_cell(&mut c, &sp, 4);
        assert_ne!(a.params.perturbed_b, c.params.perturbed_b);
    }

    #[test]
    fn test_quiet_maxwellian_density() {
        let project = Fluctuations::new(quiet_params(), 1);
        let sp = [proton()];
        let mut cell = SpatialCell::new(1, CellParams::default(), 1);
        project.set_project_cell(&mut cell, &sp, 0);
        assert!(!cell.population(0).vmesh.is_empty());

        let (_, pops) = kernel::calculate_cell_moments(&cell, &sp, true);
        let rel = (pops[0].rho - 1.0e7).abs() / 1.0e7;
        assert!(rel < 0.1, "density {} too far from 1e7", pops[0].rho);
        // Symmetric grid and corner sampling give small but nonzero drift
        for a in 0..3 {
            assert!(pops[0].v[a].abs() < 1.0e5, "bulk velocity {:?}", pops[0].v);
        }
    }

    #[test]
    fn test_cutoff_zeroes_low_values() {
        let params = FluctuationsParams {
            maxw_cutoff: 1.0,
            ..quiet_params()
        };
        let project = Fluctuations::new(params, 1);
        let sp = [proton()];
        let mut cell = SpatialCell::new(1, CellParams::default(), 1);
        project.set_project_cell(&mut cell, &sp, 0);
        assert!(cell.population(0).vmesh.is_empty());
    }

    #[test]
    fn test_magnetic_field() {
        let project = Fluctuations::new(FluctuationsParams::default(), 10);
        let mut cell = SpatialCell::new(1, CellParams::default(), 0);
        project.set_cell_parameters(&mut cell, 2);
        assert_eq!(cell.params.background_b, [1.0e-9, 2.0e-9, 3.0e-9]);
        for b in cell.params.perturbed_b {
            assert!(b.abs() <= 0.5e-9);
        }
    }
}
