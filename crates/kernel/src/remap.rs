//! Conservative monotone 1D remap.
//!
//! Cell averages are reconstructed as limited linear profiles
//! (monotonized-central slopes) and integrated over departure intervals.
//! Both entry points are in flux form, so the sum over a closed line is
//! preserved exactly up to round-off.
//!
//! - [`face_flux`] -- flux through one face from a 4-cell stencil, used by
//!   the spatial sweeps where the shift is bounded by the CFL limit.
//! - [`remap_line`] -- remap of a whole line by an arbitrary shift, used by
//!   velocity-space acceleration.

/// Cells needed on each side of a target cell by [`face_flux`].
pub const VLASOV_STENCIL_WIDTH: usize = 2;

/// Monotonized-central limited slope of the middle cell.
#[inline]
pub fn mc_slope(left: f64, center: f64, right: f64) -> f64 {
    let d_l = center - left;
    let d_r = right - center;
    if d_l * d_r <= 0.0 {
        return 0.0;
    }
    let d_c = 0.5 * (right - left);
    let mag = d_c.abs().min(2.0 * d_l.abs()).min(2.0 * d_r.abs());
    mag.copysign(d_c)
}

/// Integral of `a + slope * (xi - 1/2)` over `[p, q]` with `0 <= p <= q <= 1`.
#[inline]
fn integrate_cell(a: f64, slope: f64, p: f64, q: f64) -> f64 {
    let hp = p - 0.5;
    let hq = q - 0.5;
    (q - p) * a + 0.5 * slope * (hq * hq - hp * hp)
}

/// Flux through the face between `stencil[1]` and `stencil[2]`.
///
/// `stencil` holds four consecutive cell averages `[k-2, k-1, k, k+1]` around
/// face `k`. `shift` is the signed displacement in cell widths; positive
/// moves content towards `+`. The result is the content crossing the face in
/// the `+` direction. `|shift|` must not exceed one cell.
#[inline]
pub fn face_flux(stencil: [f64; 4], shift: f64) -> f64 {
    debug_assert!(shift.abs() <= 1.0 + 1e-12, "face_flux shift {} exceeds one cell", shift);
    let s = shift.clamp(-1.0, 1.0);
    if s > 0.0 {
        let a = stencil[1];
        let slope = mc_slope(stencil[0], stencil[1], stencil[2]);
        integrate_cell(a, slope, 1.0 - s, 1.0)
    } else if s < 0.0 {
        let a = stencil[2];
        let slope = mc_slope(stencil[1], stencil[2], stencil[3]);
        -integrate_cell(a, slope, 0.0, -s)
    } else {
        0.0
    }
}

/// New average of the middle cell of a 5-cell window `[i-2 ..= i+2]`.
#[inline]
pub fn update_cell(window: [f64; 5], shift: f64) -> f64 {
    let left = face_flux([window[0], window[1], window[2], window[3]], shift);
    let right = face_flux([window[1], window[2], window[3], window[4]], shift);
    window[2] + left - right
}

/// Limited slopes for a line, treating cells beyond the ends as empty.
fn line_slopes(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    (0..n)
        .map(|i| {
            let l = if i > 0 { values[i - 1] } else { 0.0 };
            let r = if i + 1 < n { values[i + 1] } else { 0.0 };
            mc_slope(l, values[i], r)
        })
        .collect()
}

/// Integral of the reconstruction over `[a, b]` in cell-index coordinates.
fn integrate_line(values: &[f64], slopes: &[f64], a: f64, b: f64) -> f64 {
    let n = values.len() as f64;
    let lo = a.max(0.0);
    let hi = b.min(n);
    if hi <= lo {
        return 0.0;
    }
    let first = lo.floor() as usize;
    let last = (hi.ceil() as usize).min(values.len());
    let mut sum = 0.0;
    for i in first..last {
        let p = (lo - i as f64).max(0.0);
        let q = (hi - i as f64).min(1.0);
        if q > p {
            sum += integrate_cell(values[i], slopes[i], p, q);
        }
    }
    sum
}

/// Remap a line of cell averages by `shift` cell widths.
///
/// Each new average is the integral of the old reconstruction over the
/// cell's departure interval. Content carried past either end is dropped and
/// nothing enters from outside.
pub fn remap_line(values: &[f64], shift: f64) -> Vec<f64> {
    if shift == 0.0 {
        return values.to_vec();
    }
    let slopes = line_slopes(values);
    (0..values.len())
        .map(|i| {
            let a = i as f64 - shift;
            integrate_line(values, &slopes, a, a + 1.0)
        })
        .collect()
}
