//! Per-block spatial translation along one axis.
//!
//! Two entry points share one flux function, so they agree bit for bit:
//! [`translate_window`] updates a single target cell from its five-cell
//! window, [`translate_pencil`] updates a whole chain of cells at once.

use rustc_hash::FxHashSet;

use crate::direction::Axis;
use crate::remap::{face_flux, VLASOV_STENCIL_WIDTH};
use crate::species::VelocityGrid;
use crate::vmesh::{cell_index, Block, BlockId, VelocityMesh, WID, WID3};

/// Cells in a translation window (target plus stencil on both sides).
pub const WINDOW: usize = 2 * VLASOV_STENCIL_WIDTH + 1;

/// Shift in cell widths of each velocity cell of block `id` along `axis`.
fn block_shifts(grid: &VelocityGrid, id: BlockId, axis: Axis, dt: f64, dx: f64) -> [f64; WID3] {
    let mut shifts = [0.0; WID3];
    for k in 0..WID {
        for j in 0..WID {
            for i in 0..WID {
                let v = grid.cell_center(id, [i, j, k]);
                shifts[cell_index([i, j, k])] = v[axis.index()] * dt / dx;
            }
        }
    }
    shifts
}

/// Union of block IDs over a line of (possibly missing) meshes, ascending.
fn block_union(meshes: &[Option<&VelocityMesh>]) -> Vec<BlockId> {
    let mut ids: FxHashSet<BlockId> = FxHashSet::default();
    for mesh in meshes.iter().flatten() {
        ids.extend(mesh.iter().map(|(id, _)| id));
    }
    let mut ids: Vec<BlockId> = ids.into_iter().collect();
    ids.sort_unstable();
    ids
}

#[inline]
fn value(mesh: Option<&VelocityMesh>, id: BlockId, c: usize) -> f64 {
    mesh.and_then(|m| m.block(id)).map_or(0.0, |b| b[c])
}

/// Insert `block` into `out` if the target already had it or it carries content.
fn store(out: &mut VelocityMesh, target: Option<&VelocityMesh>, id: BlockId, block: Block) {
    let existed = target.map_or(false, |m| m.contains(id));
    if existed || block.iter().any(|&f| f != 0.0) {
        out.insert(id, block);
    }
}

/// Translated mesh of the middle cell of `window` along `axis`.
///
/// `window[2]` is the target; missing neighbors contribute nothing. `dx` is
/// the cell size along `axis`.
pub fn translate_window(
    window: [Option<&VelocityMesh>; WINDOW],
    grid: &VelocityGrid,
    axis: Axis,
    dt: f64,
    dx: f64,
) -> VelocityMesh {
    let mut out = VelocityMesh::new();
    for id in block_union(&window) {
        let shifts = block_shifts(grid, id, axis, dt, dx);
        let mut block = [0.0; WID3];
        for (c, slot) in block.iter_mut().enumerate() {
            let w = [
                value(window[0], id, c),
                value(window[1], id, c),
                value(window[2], id, c),
                value(window[3], id, c),
                value(window[4], id, c),
            ];
            let left = face_flux([w[0], w[1], w[2], w[3]], shifts[c]);
            let right = face_flux([w[1], w[2], w[3], w[4]], shifts[c]);
            *slot = w[2] + left - right;
        }
        store(&mut out, window[2], id, block);
    }
    out
}

/// Translated meshes of the interior of a pencil along `axis`.
///
/// `line` holds `VLASOV_STENCIL_WIDTH` read-only stencil cells, the pencil
/// cells, and another `VLASOV_STENCIL_WIDTH` stencil cells. Returns one mesh
/// per pencil cell in order. Each face flux is evaluated once and applied to
/// both adjacent cells.
pub fn translate_pencil(
    line: &[Option<&VelocityMesh>],
    grid: &VelocityGrid,
    axis: Axis,
    dt: f64,
    dx: f64,
) -> Vec<VelocityMesh> {
    let s = VLASOV_STENCIL_WIDTH;
    let n = line.len().saturating_sub(2 * s);
    let mut out: Vec<VelocityMesh> = (0..n).map(|_| VelocityMesh::new()).collect();
    if n == 0 {
        return out;
    }

    let ids = block_union(line);
    // Face f sits between line[s - 1 + f] and line[s + f]
    let mut fluxes = vec![0.0; n + 1];
    let mut column = vec![0.0; line.len()];
    let mut blocks: Vec<Block> = vec![[0.0; WID3]; n];

    for id in ids {
        let shifts = block_shifts(grid, id, axis, dt, dx);
        for c in 0..WID3 {
            for (slot, mesh) in column.iter_mut().zip(line.iter()) {
                *slot = value(*mesh, id, c);
            }
            for (f, flux) in fluxes.iter_mut().enumerate() {
                let k = s + f;
                *flux = face_flux([column[k - 2], column[k - 1], column[k], column[k + 1]], shifts[c]);
            }
            for (p, block) in blocks.iter_mut().enumerate() {
                block[c] = column[s + p] + fluxes[p] - fluxes[p + 1];
            }
        }
        for (p, block) in blocks.iter().enumerate() {
            store(&mut out[p], line[s + p], id, *block);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> VelocityGrid {
        VelocityGrid {
            min: [-8.0, -8.0, -8.0],
            max: [8.0, 8.0, 8.0],
            blocks: [4, 4, 4],
        }
    }

    fn uniform_line(n: usize) -> Vec<VelocityMesh> {
        let g = grid();
        (0..n)
            .map(|i| {
                let mut m = VelocityMesh::new();
                m.set_value(&g, [1.5, 0.5, 0.5], 1.0 + 0.1 * i as f64);
                m.set_value(&g, [-2.5, 0.5, 0.5], 2.0);
                m
            })
            .collect()
    }

    #[test]
    fn test_window_and_pencil_agree() {
        let g = grid();
        let meshes = uniform_line(9);
        let refs: Vec<Option<&VelocityMesh>> = meshes.iter().map(Some).collect();
        let (dt, dx) = (0.2, 1.0);

        let pencil = translate_pencil(&refs, &g, Axis::X, dt, dx);
        assert_eq!(pencil.len(), 5);
        for p in 0..5 {
            let window = [refs[p], refs[p + 1], refs[p + 2], refs[p + 3], refs[p + 4]];
            let single = translate_window(window, &g, Axis::X, dt, dx);
            assert_eq!(single, pencil[p], "pencil cell {} differs", p);
        }
    }

    #[test]
    fn test_uniform_line_is_stationary() {
        let g = grid();
        let mut m = VelocityMesh::new();
        m.set_value(&g, [3.5, -1.5, 0.5], 4.0);
        let window = [Some(&m); WINDOW];
        let out = translate_window(window, &g, Axis::X, 0.1, 1.0);
        let id = g.locate([3.5, -1.5, 0.5]).unwrap().0;
        for (a, b) in out.block(id).unwrap().iter().zip(m.block(id).unwrap().iter()) {
            assert!((a - b).abs() < 1e-14);
        }
    }

    #[test]
    fn test_content_flows_into_empty_cell() {
        let g = grid();
        let mut upwind = VelocityMesh::new();
        upwind.set_value(&g, [0.5, 0.5, 0.5], 1.0);
        // vx = 0.5, dt = 1, dx = 1: half a cell moves right
        let window = [None, Some(&upwind), None, None, None];
        let out = translate_window(window, &g, Axis::X, 1.0, 1.0);
        let (id, cell) = g.locate([0.5, 0.5, 0.5]).unwrap();
        assert!((out.block(id).unwrap()[cell_index(cell)] - 0.5).abs() < 1e-14);
    }
}
