use std::fmt::{Debug, Display, LowerExp};

use ndarray::{Array1, ScalarOperand, Zip};
use num_dual::DualNumFloat;
use num_traits::{Float, FromPrimitive};

/// Marker trait for the floating-point types the solvers run on (`f32`, `f64`).
///
/// Bundles the numeric and container traits needed throughout the crate.
/// `DualNumFloat` lets `num_dual` build its dual types on top of it.
pub trait Real:
    Float
    + DualNumFloat
    + FromPrimitive
    + ScalarOperand
    + Debug
    + Display
    + LowerExp
    + Default
    + Send
    + Sync
    + 'static
{
    /// Converts an `f64` literal, rounding to the nearest representable value.
    fn cast(v: f64) -> Self;

    /// Shorthand for `2`.
    #[inline]
    fn two() -> Self {
        Self::one() + Self::one()
    }
}

impl Real for f32 {
    #[inline]
    fn cast(v: f64) -> Self {
        v as f32
    }
}

impl Real for f64 {
    #[inline]
    fn cast(v: f64) -> Self {
        v
    }
}

/// Euclidean norm.
#[inline]
pub fn norm<T: Real>(v: &Array1<T>) -> T {
    v.dot(v).sqrt()
}

/// `‖a − b‖` without allocating.
pub fn distance<T: Real>(a: &Array1<T>, b: &Array1<T>) -> T {
    let mut s = T::zero();
    Zip::from(a).and(b).for_each(|&ai, &bi| {
        let d = ai - bi;
        s = s + d * d;
    });
    s.sqrt()
}

/// `out ← x + alpha·d`.
#[inline]
pub fn axpy_into<T: Real>(out: &mut Array1<T>, x: &Array1<T>, alpha: T, d: &Array1<T>) {
    Zip::from(out)
        .and(x)
        .and(d)
        .for_each(|o, &xi, &di| *o = xi + alpha * di);
}

/// True when every entry is finite.
#[inline]
pub fn all_finite<T: Real>(v: &Array1<T>) -> bool {
    v.iter().all(|x| x.is_finite())
}
