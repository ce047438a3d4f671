//! Quadrature rules and Legendre polynomials on the reference interval `[-1, 1]`.

use crate::Rule;
use std::f64::consts::PI;

/// Maximum number of Newton steps spent on a single Gauss root.
const MAX_NEWTON_ITERATIONS: usize = 100;

/// Evaluates the Legendre polynomials `P_0, ..., P_n` and their derivatives at `x`.
///
/// The derivative is computed with the three-term recurrence
/// `P'_m = P'_{m-2} + (2m - 1) P_{m-1}`, which stays valid at the end points `x = +-1`.
pub fn legendre_table(n: usize, x: f64, values: &mut Vec<f64>, derivatives: &mut Vec<f64>) {
    values.clear();
    derivatives.clear();
    values.push(1.0);
    derivatives.push(0.0);
    if n == 0 {
        return;
    }
    values.push(x);
    derivatives.push(1.0);
    for m in 2..=n {
        let mf = m as f64;
        let p = ((2.0 * mf - 1.0) * x * values[m - 1] - (mf - 1.0) * values[m - 2]) / mf;
        let dp = derivatives[m - 2] + (2.0 * mf - 1.0) * values[m - 1];
        values.push(p);
        derivatives.push(dp);
    }
}

/// Evaluates `(P_n(x), P'_n(x))`.
pub fn legendre(n: usize, x: f64) -> (f64, f64) {
    let mut values = Vec::with_capacity(n + 1);
    let mut derivatives = Vec::with_capacity(n + 1);
    legendre_table(n, x, &mut values, &mut derivatives);
    (values[n], derivatives[n])
}

/// Gauss quadrature for the reference interval [-1, 1].
///
/// Returns the [Gauss quadrature rule] with the given number of points. Given `n` points,
/// the rule integrates polynomials of order up to `2 n - 1` exactly. Points are returned in
/// increasing order.
///
/// # Panics
///
/// Panics if zero points are requested.
///
/// [Gauss quadrature rule]: https://en.wikipedia.org/wiki/Gaussian_quadrature
pub fn gauss(num_points: usize) -> Rule<1> {
    let n = num_points;
    assert!(n > 0, "number of points must be positive");

    // Roots are symmetric around the origin, so only the non-negative half is computed.
    let half = (n + 1) / 2;
    let mut roots = Vec::with_capacity(half);
    for i in 0..half {
        // Chebyshev-like initial guess, descending from the right end
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut dp = legendre(n, x).1;
        for _ in 0..MAX_NEWTON_ITERATIONS {
            let (p, dp_new) = legendre(n, x);
            dp = dp_new;
            let dx = -p / dp;
            x += dx;
            if dx.abs() <= 1e-15 {
                dp = legendre(n, x).1;
                break;
            }
        }
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        roots.push((x, w));
    }

    let mut weights = Vec::with_capacity(n);
    let mut points = Vec::with_capacity(n);
    for &(x, w) in &roots {
        points.push([-x]);
        weights.push(w);
    }
    // For odd n the middle root is zero and must not be duplicated
    let mirrored = n / 2;
    for &(x, w) in roots[..mirrored].iter().rev() {
        points.push([x]);
        weights.push(w);
    }
    if n % 2 == 1 {
        // The middle entry was pushed as -0.0 from the first loop; normalize it
        let mid = half - 1;
        points[mid] = [0.0];
    }

    assert_eq!(points.len(), n, "Internal error: incorrect number of points produced");
    (weights, points)
}
