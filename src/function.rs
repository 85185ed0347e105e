//! User function signatures.
//!
//! Plain closures work for everything that only needs primal values:
//! a scalar objective is any `FnMut(&Array1<T>) -> T`, and an in-place
//! system is any `FnMut(&mut Array1<T>, &Array1<T>, &P)` writing `F(x)`
//! into its first argument. `P` is an opaque parameter context passed
//! through untouched; use `()` when there is none.
//!
//! Automatic differentiation needs the function to be evaluated on dual
//! numbers, which a closure over `Array1<T>` cannot do. Such functions
//! implement [`ScalarFunction`] or [`VectorFunction`] instead, generically
//! over [`DualNum`], and can be handed to primal-only consumers through the
//! [`Primal`] wrapper.

use ndarray::Array1;
use num_dual::DualNum;

use crate::numeric::Real;

/// Scalar objective `f: Rⁿ → R`.
pub trait ValueFunction<T: Real> {
    fn call(&mut self, x: &Array1<T>) -> T;
}

impl<T: Real, F> ValueFunction<T> for F
where
    F: FnMut(&Array1<T>) -> T,
{
    #[inline]
    fn call(&mut self, x: &Array1<T>) -> T {
        self(x)
    }
}

/// In-place system `F!(y, x, params)`.
pub trait SystemFunction<T: Real, P> {
    fn call(&mut self, y: &mut Array1<T>, x: &Array1<T>, params: &P);
}

impl<T: Real, P, F> SystemFunction<T, P> for F
where
    F: FnMut(&mut Array1<T>, &Array1<T>, &P),
{
    #[inline]
    fn call(&mut self, y: &mut Array1<T>, x: &Array1<T>, params: &P) {
        self(y, x, params)
    }
}

/// A scalar objective written once for `T` and every dual number over it.
///
/// ```
/// use newton_solvers::ScalarFunction;
/// use num_dual::DualNum;
///
/// struct Rosenbrock;
///
/// impl ScalarFunction<f64> for Rosenbrock {
///     fn eval<D: DualNum<f64> + Copy>(&self, x: &[D]) -> D {
///         let a = D::from(1.0) - x[0];
///         let b = x[1] - x[0] * x[0];
///         a * a + D::from(100.0) * b * b
///     }
/// }
/// ```
pub trait ScalarFunction<T: Real> {
    fn eval<D: DualNum<T> + Copy>(&self, x: &[D]) -> D;
}

/// An in-place system written once for `T` and every dual number over it.
///
/// `y` has the output dimension and arrives zero-filled.
pub trait VectorFunction<T: Real, P> {
    fn eval<D: DualNum<T> + Copy>(&self, y: &mut [D], x: &[D], params: &P);
}

/// Evaluates a generic function on plain `T` values.
///
/// Lets an AD-ready function serve as the value callback of an objective
/// or system next to its autodiff derivative provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct Primal<F>(pub F);

impl<T, F> ValueFunction<T> for Primal<F>
where
    T: Real + DualNum<T>,
    F: ScalarFunction<T>,
{
    fn call(&mut self, x: &Array1<T>) -> T {
        match x.as_slice() {
            Some(xs) => self.0.eval(xs),
            None => {
                let xs = x.to_vec();
                self.0.eval(&xs)
            }
        }
    }
}

impl<T, P, F> SystemFunction<T, P> for Primal<F>
where
    T: Real + DualNum<T>,
    F: VectorFunction<T, P>,
{
    fn call(&mut self, y: &mut Array1<T>, x: &Array1<T>, params: &P) {
        y.fill(T::zero());
        let xs = x.to_vec();
        match y.as_slice_mut() {
            Some(ys) => self.0.eval(ys, &xs, params),
            None => {
                let mut ys = vec![T::zero(); y.len()];
                self.0.eval(&mut ys, &xs, params);
                y.assign(&Array1::from(ys));
            }
        }
    }
}
