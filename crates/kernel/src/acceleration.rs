//! Per-cell velocity-space acceleration and its subcycling arithmetic.
//!
//! The acceleration is a gyration about the cell's bulk velocity:
//! `dv/dt = (q/m) (v - V) x B`. Each subcycle step applies three 1D remaps,
//! one per velocity axis, in an order shared by the whole cluster.

use std::collections::BTreeSet;

use crate::cell::SpatialCell;
use crate::direction::{Axis, AxisOrder};
use crate::remap::remap_line;
use crate::species::Species;
use crate::vmesh::{cell_index, VelocityMesh, WID};

/// Update the velocity-space timestep limit of population `pop`.
///
/// The limit allows at most `max_rotation_deg` of gyration per step. A cell
/// without magnetic field has no limit.
pub fn prepare_accelerate_cell(cell: &mut SpatialCell, species: &Species, pop: usize, max_rotation_deg: f64) {
    let b = cell.params.total_b();
    let b_mag = (b[0] * b[0] + b[1] * b[1] + b[2] * b[2]).sqrt();
    let gyro_frequency = species.charge_to_mass().abs() * b_mag;
    let max_v_dt = if gyro_frequency > 0.0 {
        max_rotation_deg.to_radians() / gyro_frequency
    } else {
        f64::MAX
    };
    cell.population_mut(pop).max_v_dt = max_v_dt;
}

/// Number of subcycles needed to cover `|dt|` with steps of at most `max_v_dt`.
/// Never less than one.
pub fn acceleration_subcycles(dt: f64, max_v_dt: f64) -> u32 {
    let n = (dt.abs() / max_v_dt).ceil();
    if n.is_finite() && n >= 1.0 {
        n as u32
    } else {
        1
    }
}

/// Signed length of subcycle `step` for a cell with limit `max_v_dt`.
///
/// Every step is `max_v_dt` long except the one that would overshoot
/// `|dt|`, which is shortened to the remainder. Steps past the end have zero
/// length. The sign follows `dt`.
pub fn subcycle_dt(step: u32, max_v_dt: f64, dt: f64) -> f64 {
    let abs_dt = dt.abs();
    let len = if (step as f64 + 1.0) * max_v_dt > abs_dt {
        (abs_dt - step as f64 * max_v_dt).max(0.0)
    } else {
        max_v_dt
    };
    if dt < 0.0 {
        -len
    } else {
        len
    }
}

/// Component `axis` of `u x b`.
#[inline]
fn cross_component(u: [f64; 3], b: [f64; 3], axis: Axis) -> f64 {
    match axis {
        Axis::X => u[1] * b[2] - u[2] * b[1],
        Axis::Y => u[2] * b[0] - u[0] * b[2],
        Axis::Z => u[0] * b[1] - u[1] * b[0],
    }
}

/// Remap `vmesh` along one velocity axis.
///
/// Lines run through the full grid extent; blocks are created where content
/// arrives and left in place where it departs.
fn map_axis(vmesh: &mut VelocityMesh, species: &Species, axis: Axis, bulk: [f64; 3], b: [f64; 3], dt: f64) {
    let grid = &species.grid;
    let a = axis.index();
    let (t1, t2) = match axis {
        Axis::X => (1, 2),
        Axis::Y => (0, 2),
        Axis::Z => (0, 1),
    };
    let n_blocks = grid.blocks[a] as i64;
    let dv = grid.cell_size(axis);
    let qm = species.charge_to_mass();

    let columns: BTreeSet<(i64, i64)> = vmesh
        .iter()
        .map(|(id, _)| {
            let idx = grid.block_indices(id);
            (idx[t1], idx[t2])
        })
        .collect();

    let mut line = vec![0.0; n_blocks as usize * WID];
    for (b1, b2) in columns {
        for c2 in 0..WID {
            for c1 in 0..WID {
                line.iter_mut().for_each(|v| *v = 0.0);
                let mut occupied = false;
                let mut sample_block = None;
                for bk in 0..n_blocks {
                    let mut idx = [0_i64; 3];
                    idx[a] = bk;
                    idx[t1] = b1;
                    idx[t2] = b2;
                    let Some(id) = grid.block_id(idx) else { continue };
                    sample_block.get_or_insert(id);
                    if let Some(block) = vmesh.block(id) {
                        for c in 0..WID {
                            let mut cell = [0_usize; 3];
                            cell[a] = c;
                            cell[t1] = c1;
                            cell[t2] = c2;
                            let f = block[cell_index(cell)];
                            line[bk as usize * WID + c] = f;
                            occupied |= f != 0.0;
                        }
                    }
                }
                let Some(sample_block) = sample_block else { continue };
                if !occupied {
                    continue;
                }

                // Transverse velocities fix the acceleration along the line
                let mut cell = [0_usize; 3];
                cell[t1] = c1;
                cell[t2] = c2;
                let v = grid.cell_center(sample_block, cell);
                let u = [v[0] - bulk[0], v[1] - bulk[1], v[2] - bulk[2]];
                let accel = qm * cross_component(u, b, axis);
                let shift = accel * dt / dv;
                let mapped = remap_line(&line, shift);

                for bk in 0..n_blocks {
                    let mut idx = [0_i64; 3];
                    idx[a] = bk;
                    idx[t1] = b1;
                    idx[t2] = b2;
                    let Some(id) = grid.block_id(idx) else { continue };
                    let values = &mapped[bk as usize * WID..(bk as usize + 1) * WID];
                    if !vmesh.contains(id) && values.iter().all(|&f| f == 0.0) {
                        continue;
                    }
                    let block = vmesh.block_or_insert(id);
                    for (c, &f) in values.iter().enumerate() {
                        let mut cell = [0_usize; 3];
                        cell[a] = c;
                        cell[t1] = c1;
                        cell[t2] = c2;
                        block[cell_index(cell)] = f;
                    }
                }
            }
        }
    }
}

/// Accelerate population `pop` of `cell` over `dt` with sweeps in `order`.
///
/// The bulk velocity is taken from the cell's "_V" moments.
pub fn accelerate_cell(cell: &mut SpatialCell, species: &Species, pop: usize, order: AxisOrder, dt: f64) {
    if dt == 0.0 {
        return;
    }
    let bulk = cell.moments_v.v;
    let b = cell.params.total_b();
    let vmesh = &mut cell.population_mut(pop).vmesh;
    for axis in order.axes() {
        map_axis(vmesh, species, axis, bulk, b, dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellParams;
    use crate::species::{VelocityGrid, PROTON_MASS};

    fn species() -> Species {
        Species {
            name: "p".to_string(),
            charge: crate::species::ELEMENTARY_CHARGE,
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
    fn test_subcycle_lengths_sum_to_dt() {
        for (dt, max_v_dt) in [(1.0, 0.3), (-1.0, 0.3), (0.9, 0.3), (0.5, 2.0)] {
            let n = acceleration_subcycles(dt, max_v_dt);
            let total: f64 = (0..n).map(|s| subcycle_dt(s, max_v_dt, dt)).sum();
            assert!((total - dt).abs() < 1e-12, "dt {} max {}: total {}", dt, max_v_dt, total);
            for s in 0..n {
                let len = subcycle_dt(s, max_v_dt, dt);
                assert!(len * dt >= 0.0, "step length sign must follow dt");
            }
        }
    }

    #[test]
    fn test_subcycle_counts() {
        assert_eq!(acceleration_subcycles(1.0, 0.3), 4);
        assert_eq!(acceleration_subcycles(0.75, 0.25), 3);
        assert_eq!(acceleration_subcycles(0.0, 0.3), 1);
        assert_eq!(acceleration_subcycles(1.0, f64::MAX), 1);
    }

    #[test]
    fn test_steps_beyond_own_count_are_empty() {
        assert_eq!(subcycle_dt(4, 0.3, 1.0), 0.0);
        assert!((subcycle_dt(3, 0.3, 1.0) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_prepare_accelerate_cell_gyration_limit() {
        let sp = species();
        let mut cell = SpatialCell::new(1, CellParams::default(), 1);
        prepare_accelerate_cell(&mut cell, &sp, 0, 22.0);
        assert_eq!(cell.population(0).max_v_dt, f64::MAX);

        cell.params.background_b = [0.0, 0.0, 1e-8];
        prepare_accelerate_cell(&mut cell, &sp, 0, 22.0);
        let omega = sp.charge_to_mass() * 1e-8;
        let expected = 22.0_f64.to_radians() / omega;
        assert!((cell.population(0).max_v_dt - expected).abs() / expected < 1e-12);
    }

    #[test]
    fn test_accelerate_conserves_density() {
        let sp = species();
        let mut cell = SpatialCell::new(1, CellParams::default(), 1);
        cell.params.background_b = [0.0, 0.0, 1e-8];
        for (vx, vy) in [(2.5, 0.5), (1.5, 0.5), (2.5, 1.5), (-0.5, -2.5)] {
            cell.population_mut(0).vmesh.set_value(&sp.grid, [vx, vy, 0.5], 1.0);
        }
        let before = cell.population(0).vmesh.total();
        prepare_accelerate_cell(&mut cell, &sp, 0, 22.0);
        let dt = cell.population(0).max_v_dt;
        accelerate_cell(&mut cell, &sp, 0, AxisOrder::Xyz, dt);
        let after = cell.population(0).vmesh.total();
        assert!(((after - before) / before).abs() < 1e-12, "before {} after {}", before, after);
        for (_, block) in cell.population(0).vmesh.iter() {
            assert!(block.iter().all(|&f| f >= -1e-15));
        }
    }

    #[test]
    fn test_zero_dt_is_identity() {
        let sp = species();
        let mut cell = SpatialCell::new(1, CellParams::default(), 1);
        cell.params.background_b = [1e-9, 2e-9, 3e-9];
        cell.population_mut(0).vmesh.set_value(&sp.grid, [0.5, 0.5, 0.5], 1.0);
        let before = cell.population(0).vmesh.clone();
        accelerate_cell(&mut cell, &sp, 0, AxisOrder::Zxy, 0.0);
        assert_eq!(cell.population(0).vmesh, before);
    }
}
