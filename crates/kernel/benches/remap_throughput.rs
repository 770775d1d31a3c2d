//! Remap throughput -- velocity-space acceleration and spatial translation
//! on a single cell at increasing velocity-grid resolution.
//!
//! Run with: cargo bench -p vlasov-kernel --bench remap_throughput

use std::time::Instant;

use kernel::translation::{translate_window, WINDOW};
use kernel::{
    accelerate_cell, velocity_axis_order, Axis, CellParams, SpatialCell, Species, VelocityGrid,
    VelocityMesh, ELEMENTARY_CHARGE, PROTON_MASS, WID,
};

fn maxwellian_cell(blocks_per_dim: u32) -> (SpatialCell, Species) {
    let species = Species {
        name: "proton".to_string(),
        charge: ELEMENTARY_CHARGE,
        mass: PROTON_MASS,
        sparse_min_value: 1e-15,
        grid: VelocityGrid {
            min: [-2.0e6; 3],
            max: [2.0e6; 3],
            blocks: [blocks_per_dim; 3],
        },
    };
    let params = CellParams {
        extents: [1.0e6; 3],
        background_b: [1e-9, 2e-9, 3e-9],
        ..CellParams::default()
    };
    let mut cell = SpatialCell::new(1, params, 1);
    let thermal = 4.0e5_f64;
    let n = blocks_per_dim as usize * WID;
    let dv = species.grid.cell_size(Axis::X);
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                let v = [
                    -2.0e6 + (i as f64 + 0.5) * dv,
                    -2.0e6 + (j as f64 + 0.5) * dv,
                    -2.0e6 + (k as f64 + 0.5) * dv,
                ];
                let v2 = v[0] * v[0] + v[1] * v[1] + v[2] * v[2];
                let f = (-v2 / (thermal * thermal)).exp();
                if f > 1e-15 {
                    cell.population_mut(0).vmesh.set_value(&species.grid, v, f);
                }
            }
        }
    }
    (cell, species)
}

fn main() {
    println!("=== Remap Throughput ===\n");
    println!(
        "{:>8} {:>8} {:>14} {:>14}",
        "Blocks", "Present", "acc ms/step", "trans ms/cell"
    );

    for &blocks in &[4_u32, 8, 12, 16] {
        let (mut cell, species) = maxwellian_cell(blocks);
        let present = cell.block_count(0);
        let steps = 5;

        let start = Instant::now();
        for tstep in 0..steps {
            accelerate_cell(&mut cell, &species, 0, velocity_axis_order(tstep), 1e-3);
        }
        let acc_ms = start.elapsed().as_secs_f64() * 1000.0 / steps as f64;

        let mesh: VelocityMesh = cell.population(0).vmesh.clone();
        let window = [Some(&mesh); WINDOW];
        let start = Instant::now();
        for _ in 0..steps {
            let _ = translate_window(window, &species.grid, Axis::X, 0.1, 1.0e6);
        }
        let trans_ms = start.elapsed().as_secs_f64() * 1000.0 / steps as f64;

        println!("{:>8} {:>8} {:>14.3} {:>14.3}", blocks, present, acc_ms, trans_ms);
    }
}
