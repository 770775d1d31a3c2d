//! Velocity moments of the distribution function.
//!
//! All reductions visit blocks in ascending ID order, so a ghost copy and
//! its owner produce bit-identical moments.

use crate::cell::{CellMoments, PopulationMoments, SpatialCell};
use crate::species::{Species, VelocityGrid};
use crate::vmesh::{cell_index, VelocityMesh, WID};

/// Number density and particle flux density `n V` of one mesh.
fn density_and_flux(vmesh: &VelocityMesh, grid: &VelocityGrid) -> (f64, [f64; 3]) {
    let dv3 = grid.cell_volume();
    let mut n = 0.0;
    let mut nv = [0.0; 3];
    for id in vmesh.block_ids() {
        let Some(block) = vmesh.block(id) else { continue };
        for k in 0..WID {
            for j in 0..WID {
                for i in 0..WID {
                    let f = block[cell_index([i, j, k])];
                    if f == 0.0 {
                        continue;
                    }
                    let v = grid.cell_center(id, [i, j, k]);
                    n += f;
                    nv[0] += f * v[0];
                    nv[1] += f * v[1];
                    nv[2] += f * v[2];
                }
            }
        }
    }
    (n * dv3, [nv[0] * dv3, nv[1] * dv3, nv[2] * dv3])
}

/// Diagonal of `m ∫ f (v - bulk)^2`, component-wise.
fn diagonal_pressure(vmesh: &VelocityMesh, grid: &VelocityGrid, mass: f64, bulk: [f64; 3]) -> [f64; 3] {
    let dv3 = grid.cell_volume();
    let mut p = [0.0; 3];
    for id in vmesh.block_ids() {
        let Some(block) = vmesh.block(id) else { continue };
        for k in 0..WID {
            for j in 0..WID {
                for i in 0..WID {
                    let f = block[cell_index([i, j, k])];
                    if f == 0.0 {
                        continue;
                    }
                    let v = grid.cell_center(id, [i, j, k]);
                    for a in 0..3 {
                        let u = v[a] - bulk[a];
                        p[a] += f * u * u;
                    }
                }
            }
        }
    }
    [p[0] * mass * dv3, p[1] * mass * dv3, p[2] * mass * dv3]
}

/// Moments of `cell` for every species.
///
/// Population densities and bulk velocities are always computed. With
/// `compute_second` the diagonal pressures are evaluated relative to the
/// cell's mass-weighted bulk velocity; otherwise they are left at zero.
pub fn calculate_cell_moments(
    cell: &SpatialCell,
    species: &[Species],
    compute_second: bool,
) -> (CellMoments, Vec<PopulationMoments>) {
    let mut totals = CellMoments::default();
    let mut pops = Vec::with_capacity(species.len());
    let mut mass_flux = [0.0; 3];

    for (pop_id, sp) in species.iter().enumerate() {
        let (n, nv) = density_and_flux(&cell.population(pop_id).vmesh, &sp.grid);
        let v = if n > 0.0 {
            [nv[0] / n, nv[1] / n, nv[2] / n]
        } else {
            [0.0; 3]
        };
        totals.rhom += sp.mass * n;
        totals.rhoq += sp.charge * n;
        for a in 0..3 {
            mass_flux[a] += sp.mass * nv[a];
        }
        pops.push(PopulationMoments { rho: n, v, p: [0.0; 3] });
    }

    if totals.rhom > 0.0 {
        for a in 0..3 {
            totals.v[a] = mass_flux[a] / totals.rhom;
        }
    }

    if compute_second {
        for (pop_id, sp) in species.iter().enumerate() {
            let p = diagonal_pressure(&cell.population(pop_id).vmesh, &sp.grid, sp.mass, totals.v);
            pops[pop_id].p = p;
            for a in 0..3 {
                totals.p[a] += p[a];
            }
        }
    }

    (totals, pops)
}

/// Largest stable translation timestep of a mesh in a cell of size `extents`.
///
/// Bounded by the fastest block edge velocity present along each axis,
/// scaled by `cfl`. Unbounded for an empty mesh.
pub fn spatial_dt_limit(vmesh: &VelocityMesh, grid: &VelocityGrid, extents: [f64; 3], cfl: f64) -> f64 {
    let mut dt = f64::MAX;
    for (id, _) in vmesh.iter() {
        let corner = grid.block_corner(id);
        for axis in crate::direction::Axis::ALL {
            let a = axis.index();
            let vmax = corner[a].abs().max((corner[a] + grid.block_size(axis)).abs());
            if vmax > 0.0 {
                dt = dt.min(cfl * extents[a] / vmax);
            }
        }
    }
    dt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellParams;
    use crate::species::PROTON_MASS;

    fn species() -> Species {
        Species {
            name: "p".to_string(),
            charge: 1.0,
            mass: PROTON_MASS,
            sparse_min_value: 1e-15,
            grid: VelocityGrid {
                min: [-8.0, -8.0, -8.0],
                max: [8.0, 8.0, 8.0],
                blocks: [4, 4, 4],
            },
        }
    }

    #[test]
    fn test_single_cell_moments() {
        let sp = species();
        let mut cell = SpatialCell::new(1, CellParams::default(), 1);
        // Two velocity cells: +1.5 and -0.5 along x, equal weight
        cell.population_mut(0).vmesh.set_value(&sp.grid, [1.5, 0.5, 0.5], 2.0);
        cell.population_mut(0).vmesh.set_value(&sp.grid, [-0.5, 0.5, 0.5], 2.0);

        let (totals, pops) = calculate_cell_moments(&cell, std::slice::from_ref(&sp), true);
        assert!((pops[0].rho - 4.0).abs() < 1e-12);
        assert!((pops[0].v[0] - 0.5).abs() < 1e-12);
        assert!((pops[0].v[1] - 0.5).abs() < 1e-12);
        assert!((totals.rhom - 4.0 * PROTON_MASS).abs() < 1e-30);
        assert!((totals.rhoq - 4.0).abs() < 1e-12);
        // Each cell deviates by 1 along x, 0 along y
        assert!((pops[0].p[0] - 4.0 * PROTON_MASS).abs() < 1e-30);
        assert!(pops[0].p[1].abs() < 1e-40);
    }

    #[test]
    fn test_empty_cell_has_zero_moments() {
        let sp = species();
        let cell = SpatialCell::new(1, CellParams::default(), 1);
        let (totals, pops) = calculate_cell_moments(&cell, std::slice::from_ref(&sp), true);
        assert_eq!(totals, CellMoments::default());
        assert_eq!(pops[0], PopulationMoments::default());
    }

    #[test]
    fn test_spatial_dt_limit() {
        let sp = species();
        let mut mesh = VelocityMesh::new();
        assert_eq!(spatial_dt_limit(&mesh, &sp.grid, [1.0; 3], 1.0), f64::MAX);
        // Block spanning [0, 4) on every axis
        mesh.set_value(&sp.grid, [0.5, 0.5, 0.5], 1.0);
        let dt = spatial_dt_limit(&mesh, &sp.grid, [2.0, 2.0, 2.0], 0.5);
        assert!((dt - 0.25).abs() < 1e-12);
    }
}
