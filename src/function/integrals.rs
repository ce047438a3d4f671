//! Quadrature sums of common integrands.
//!
//! The weights passed in are the integration weights multiplied by the Jacobian, so every
//! helper is a plain weighted sum over the integration points. In order mode the weights are
//! a single dummy entry and the sums reduce to order arithmetic.

use super::{FormScalar, Func, Geom};
use itertools::izip;

pub fn int_v<T: FormScalar>(wt: &[f64], v: &Func<T>) -> T {
    izip!(wt, &v.val)
        .map(|(&w, &v)| T::from_f64(w) * v)
        .sum()
}

pub fn int_u_v<T: FormScalar>(wt: &[f64], u: &Func<T>, v: &Func<T>) -> T {
    izip!(wt, &u.val, &v.val)
        .map(|(&w, &u, &v)| T::from_f64(w) * u * v)
        .sum()
}

pub fn int_grad_u_grad_v<T: FormScalar>(wt: &[f64], u: &Func<T>, v: &Func<T>) -> T {
    izip!(wt, &u.dx, &u.dy, &v.dx, &v.dy)
        .map(|(&w, &ux, &uy, &vx, &vy)| T::from_f64(w) * (ux * vx + uy * vy))
        .sum()
}

pub fn int_dudx_dvdx<T: FormScalar>(wt: &[f64], u: &Func<T>, v: &Func<T>) -> T {
    izip!(wt, &u.dx, &v.dx)
        .map(|(&w, &u, &v)| T::from_f64(w) * u * v)
        .sum()
}

pub fn int_dudy_dvdy<T: FormScalar>(wt: &[f64], u: &Func<T>, v: &Func<T>) -> T {
    izip!(wt, &u.dy, &v.dy)
        .map(|(&w, &u, &v)| T::from_f64(w) * u * v)
        .sum()
}

pub fn int_dudx_dvdy<T: FormScalar>(wt: &[f64], u: &Func<T>, v: &Func<T>) -> T {
    izip!(wt, &u.dx, &v.dy)
        .map(|(&w, &u, &v)| T::from_f64(w) * u * v)
        .sum()
}

pub fn int_dudy_dvdx<T: FormScalar>(wt: &[f64], u: &Func<T>, v: &Func<T>) -> T {
    izip!(wt, &u.dy, &v.dx)
        .map(|(&w, &u, &v)| T::from_f64(w) * u * v)
        .sum()
}

pub fn int_u_dvdx<T: FormScalar>(wt: &[f64], u: &Func<T>, v: &Func<T>) -> T {
    izip!(wt, &u.val, &v.dx)
        .map(|(&w, &u, &v)| T::from_f64(w) * u * v)
        .sum()
}

pub fn int_u_dvdy<T: FormScalar>(wt: &[f64], u: &Func<T>, v: &Func<T>) -> T {
    izip!(wt, &u.val, &v.dy)
        .map(|(&w, &u, &v)| T::from_f64(w) * u * v)
        .sum()
}

/// Integral of `f(x, y) v`.
pub fn int_f_v<T: FormScalar>(wt: &[f64], f: impl Fn(T, T) -> T, v: &Func<T>, geom: &Geom<T>) -> T {
    izip!(wt, &v.val, &geom.x, &geom.y)
        .map(|(&w, &v, &x, &y)| T::from_f64(w) * f(x, y) * v)
        .sum()
}

/// Integral of `u v` times the outward normal component in x direction.
pub fn int_u_v_nx<T: FormScalar>(wt: &[f64], u: &Func<T>, v: &Func<T>, geom: &Geom<T>) -> T {
    izip!(wt, &u.val, &v.val, &geom.nx)
        .map(|(&w, &u, &v, &nx)| T::from_f64(w) * u * v * nx)
        .sum()
}
