//! Rules for the reference triangle obtained by collapsing the reference quadrilateral.
//!
//! The Duffy map `x = (1 + u)(1 - v) / 2 - 1`, `y = v` takes `[-1, 1]^2` onto the reference
//! triangle, collapsing the top edge of the square into the vertex `(-1, 1)`. Its Jacobian
//! determinant `(1 - v) / 2` raises the degree in `v` by one, which is accounted for when
//! choosing the number of points.

use crate::univariate::gauss;
use crate::{gauss_points_for_order, Rule};

/// A collapsed Gauss rule for the reference triangle that integrates polynomials of total
/// degree `order` exactly.
pub fn triangle_gauss(order: u32) -> Rule<2> {
    let (wu, pu) = gauss(gauss_points_for_order(order));
    let (wv, pv) = gauss(gauss_points_for_order(order + 1));

    let mut weights = Vec::with_capacity(wu.len() * wv.len());
    let mut points = Vec::with_capacity(wu.len() * wv.len());
    for (&w_v, &[v]) in wv.iter().zip(&pv) {
        let jacobian = 0.5 * (1.0 - v);
        for (&w_u, &[u]) in wu.iter().zip(&pu) {
            weights.push(w_u * w_v * jacobian);
            points.push([0.5 * (1.0 + u) * (1.0 - v) - 1.0, v]);
        }
    }
    (weights, points)
}
