//! Function values at integration points, and the scalar types forms are evaluated with.
//!
//! Every form kernel is evaluated in two modes: numerically with `f64`, and symbolically with
//! [`Order`], which tracks polynomial orders instead of values. Both implement [`FormScalar`],
//! so a single generic integrand serves as both the numeric and the order callback.

use num::Zero;
use std::fmt::Debug;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Deref, Div, Mul, MulAssign, Neg, Sub, SubAssign};

pub mod integrals;
mod mesh_function;

pub use mesh_function::{ExactFunction, MeshFunction, Solution};

use crate::mesh::ElementId;

pub trait FormScalar:
    Copy
    + Debug
    + Send
    + Sync
    + 'static
    + Zero
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + Sum
{
    /// A constant.
    fn from_f64(value: f64) -> Self;

    fn sqrt(self) -> Self;
    fn abs(self) -> Self;
    fn powi(self, n: i32) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
}

impl FormScalar for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    fn abs(self) -> Self {
        f64::abs(self)
    }

    fn powi(self, n: i32) -> Self {
        f64::powi(self, n)
    }

    fn exp(self) -> Self {
        f64::exp(self)
    }

    fn ln(self) -> Self {
        f64::ln(self)
    }

    fn sin(self) -> Self {
        f64::sin(self)
    }

    fn cos(self) -> Self {
        f64::cos(self)
    }
}

/// Polynomial order of an expression.
///
/// Sums and differences take the larger order, products and quotients add orders. Quotients
/// are treated like products since the integrand is approximated by a polynomial anyway.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Order(pub i32);

impl Order {
    /// Order assigned to non-polynomial expressions.
    pub const HIGH: Order = Order(20);

    pub fn get(&self) -> i32 {
        self.0
    }
}

impl Add for Order {
    type Output = Order;

    fn add(self, rhs: Self) -> Self::Output {
        Order(self.0.max(rhs.0))
    }
}

impl Sub for Order {
    type Output = Order;

    fn sub(self, rhs: Self) -> Self::Output {
        Order(self.0.max(rhs.0))
    }
}

impl Mul for Order {
    type Output = Order;

    fn mul(self, rhs: Self) -> Self::Output {
        Order(self.0 + rhs.0)
    }
}

impl Div for Order {
    type Output = Order;

    fn div(self, rhs: Self) -> Self::Output {
        Order(self.0 + rhs.0)
    }
}

impl Neg for Order {
    type Output = Order;

    fn neg(self) -> Self::Output {
        self
    }
}

impl AddAssign for Order {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Order {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for Order {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl Sum for Order {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Order(0), |a, b| a + b)
    }
}

impl Zero for Order {
    fn zero() -> Self {
        Order(0)
    }

    fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl FormScalar for Order {
    fn from_f64(_value: f64) -> Self {
        Order(0)
    }

    fn sqrt(self) -> Self {
        self
    }

    fn abs(self) -> Self {
        self
    }

    fn powi(self, n: i32) -> Self {
        Order(self.0 * n.abs())
    }

    fn exp(self) -> Self {
        Order(3 + self.0)
    }

    fn ln(self) -> Self {
        Self::HIGH
    }

    fn sin(self) -> Self {
        Self::HIGH
    }

    fn cos(self) -> Self {
        Self::HIGH
    }
}

/// Values and physical first derivatives of a scalar function at a set of points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Func<T> {
    pub val: Vec<T>,
    pub dx: Vec<T>,
    pub dy: Vec<T>,
}

impl<T: FormScalar> Func<T> {
    pub fn zeros(num_points: usize) -> Self {
        Self {
            val: vec![T::zero(); num_points],
            dx: vec![T::zero(); num_points],
            dy: vec![T::zero(); num_points],
        }
    }

    pub fn num_points(&self) -> usize {
        self.val.len()
    }

    pub fn resize(&mut self, num_points: usize) {
        self.val.resize(num_points, T::zero());
        self.dx.resize(num_points, T::zero());
        self.dy.resize(num_points, T::zero());
    }
}

impl Func<Order> {
    /// The single-point stand-in for a function of polynomial order `order`.
    pub fn order(order: i32) -> Self {
        let o = Order(order);
        Self {
            val: vec![o],
            dx: vec![o],
            dy: vec![o],
        }
    }
}

/// A function on both sides of an interface.
///
/// A missing side means the function vanishes there, as for a basis function supported on
/// the other element only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscontinuousFunc<T> {
    pub central: Option<Func<T>>,
    pub neighbor: Option<Func<T>>,
}

impl<T: FormScalar> DiscontinuousFunc<T> {
    pub fn central(func: Func<T>) -> Self {
        Self {
            central: Some(func),
            neighbor: None,
        }
    }

    pub fn neighbor(func: Func<T>) -> Self {
        Self {
            central: None,
            neighbor: Some(func),
        }
    }

    pub fn both(central: Func<T>, neighbor: Func<T>) -> Self {
        Self {
            central: Some(central),
            neighbor: Some(neighbor),
        }
    }

    fn side(func: &Option<Func<T>>, component: impl Fn(&Func<T>) -> &Vec<T>, k: usize) -> T {
        func.as_ref().map(|f| component(f)[k]).unwrap_or_else(T::zero)
    }

    pub fn val_central(&self, k: usize) -> T {
        Self::side(&self.central, |f| &f.val, k)
    }

    pub fn val_neighbor(&self, k: usize) -> T {
        Self::side(&self.neighbor, |f| &f.val, k)
    }

    /// `central - neighbor` at point `k`.
    pub fn jump(&self, k: usize) -> T {
        self.val_central(k) - self.val_neighbor(k)
    }

    pub fn average(&self, k: usize) -> T {
        T::from_f64(0.5) * (self.val_central(k) + self.val_neighbor(k))
    }

    pub fn dx_average(&self, k: usize) -> T {
        T::from_f64(0.5) * (Self::side(&self.central, |f| &f.dx, k) + Self::side(&self.neighbor, |f| &f.dx, k))
    }

    pub fn dy_average(&self, k: usize) -> T {
        T::from_f64(0.5) * (Self::side(&self.central, |f| &f.dy, k) + Self::side(&self.neighbor, |f| &f.dy, k))
    }

    pub fn dx_jump(&self, k: usize) -> T {
        Self::side(&self.central, |f| &f.dx, k) - Self::side(&self.neighbor, |f| &f.dx, k)
    }

    pub fn dy_jump(&self, k: usize) -> T {
        Self::side(&self.central, |f| &f.dy, k) - Self::side(&self.neighbor, |f| &f.dy, k)
    }
}

/// Geometry at the integration points of an element or an edge.
///
/// Normals and tangents are only populated on edges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geom<T> {
    pub x: Vec<T>,
    pub y: Vec<T>,
    pub nx: Vec<T>,
    pub ny: Vec<T>,
    pub tx: Vec<T>,
    pub ty: Vec<T>,
    /// Element marker for volumetric integrals, edge marker on edges.
    pub marker: i32,
    pub id: ElementId,
    pub diameter: f64,
    pub area: f64,
    /// Local edge of the region being integrated over, if any.
    pub edge: Option<usize>,
}

impl Geom<Order> {
    /// Orders of the coordinates of a straight-edged element.
    pub fn order(marker: i32, id: ElementId, edge: Option<usize>) -> Self {
        Self {
            x: vec![Order(1)],
            y: vec![Order(1)],
            nx: vec![Order(0)],
            ny: vec![Order(0)],
            tx: vec![Order(0)],
            ty: vec![Order(0)],
            marker,
            id,
            diameter: 0.0,
            area: 0.0,
            edge,
        }
    }
}

/// Geometry of an interface between two elements, seen from the central element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterfaceGeom<T> {
    pub geom: Geom<T>,
    pub neighbor_marker: i32,
    pub neighbor_id: ElementId,
    pub neighbor_diameter: f64,
}

impl<T> Deref for InterfaceGeom<T> {
    type Target = Geom<T>;

    fn deref(&self) -> &Self::Target {
        &self.geom
    }
}
