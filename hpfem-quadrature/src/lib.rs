//! Quadrature rules for the reference domains of 2D hp-FEM.
//!
//! Conventions:
//!
//! - the reference interval is `[-1, 1]`,
//! - the reference quadrilateral is `[-1, 1]^2`,
//! - the reference triangle has vertices `(-1, -1)`, `(1, -1)` and `(-1, 1)`.
//!
//! Rules are selected by *order*, i.e. the polynomial degree that must be integrated exactly.
//! For quadrilaterals the order applies to each coordinate direction separately, for triangles
//! it is the total degree.

use std::fmt;
use std::fmt::{Display, Formatter};

pub mod collapsed;
pub mod tensor;
pub mod univariate;

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Indicates that a rule satisfying the given requirements is not available.
    NoRuleAvailable,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRuleAvailable => {
                write!(f, "There is no quadrature rule satisfying the requirements available")
            }
        }
    }
}

impl std::error::Error for Error {}

/// A D-dimensional point.
pub type Point<const D: usize> = [f64; D];

/// A two-dimensional point.
pub type Point2 = Point<2>;

/// A D-dimensional rule, stored as `(weights, points)`.
pub type Rule<const D: usize> = (Vec<f64>, Vec<Point<D>>);

/// A two-dimensional quadrature rule.
pub type Rule2d = Rule<2>;

/// Highest order for which rules on the reference quadrilateral are handed out.
pub const MAX_QUAD_ORDER: u32 = 24;

/// Highest order for which rules on the reference triangle are handed out.
pub const MAX_TRIANGLE_ORDER: u32 = 20;

/// The two reference element shapes of 2D meshes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceShape {
    Triangle,
    Quadrilateral,
}

impl ReferenceShape {
    pub fn num_vertices(&self) -> usize {
        match self {
            Self::Triangle => 3,
            Self::Quadrilateral => 4,
        }
    }

    /// The largest order supported for this shape.
    pub fn max_order(&self) -> u32 {
        match self {
            Self::Triangle => MAX_TRIANGLE_ORDER,
            Self::Quadrilateral => MAX_QUAD_ORDER,
        }
    }
}

/// Clamps a (possibly negative) order into the range for which rules are available.
pub fn limit_order(order: i32, shape: ReferenceShape) -> u32 {
    if order < 0 {
        0
    } else {
        (order as u32).min(shape.max_order())
    }
}

/// Number of Gauss points needed to integrate a univariate polynomial of the given degree.
pub fn gauss_points_for_order(order: u32) -> usize {
    order as usize / 2 + 1
}

/// Volume rule for the given reference shape that integrates polynomials of the given order
/// exactly.
pub fn volume_rule(shape: ReferenceShape, order: u32) -> Result<Rule2d, Error> {
    if order > shape.max_order() {
        return Err(Error::NoRuleAvailable);
    }
    let rule = match shape {
        ReferenceShape::Quadrilateral => tensor::quadrilateral_gauss(gauss_points_for_order(order)),
        ReferenceShape::Triangle => collapsed::triangle_gauss(order),
    };
    Ok(rule)
}

/// Rule on the reference interval that integrates polynomials of the given order exactly.
pub fn edge_rule(order: u32) -> Rule<1> {
    univariate::gauss(gauss_points_for_order(order))
}

/// Approximates the integral of `f` with the given rule.
pub fn integrate<const D: usize>(rule: &Rule<D>, f: impl Fn(&Point<D>) -> f64) -> f64 {
    let (weights, points) = rule;
    weights
        .iter()
        .zip(points)
        .map(|(w, p)| w * f(p))
        .sum()
}
