//! Rules for the reference quadrilateral formed as tensor products of 1D Gauss rules.

use crate::univariate::gauss;
use crate::Rule;
use std::iter::repeat;

/// A Gauss quadrature rule for the reference quadrilateral `[-1, 1]^2`.
///
/// The rule is constructed as a tensor product from 1D rules, with the provided number of
/// points per dimension. Points are ordered with the first coordinate varying fastest.
pub fn quadrilateral_gauss(num_points_per_dim: usize) -> Rule<2> {
    let n = num_points_per_dim;
    let (weights1d, points1d) = gauss(n);

    let (weights, points) = weights1d
        .iter()
        .zip(&points1d)
        .flat_map(|(&wy, &[y])| repeat((wy, y)).zip(weights1d.iter().zip(&points1d)))
        .map(|((wy, y), (&wx, &[x]))| (wx * wy, [x, y]))
        .unzip();

    (weights, points)
}
