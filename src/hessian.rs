//! Hessian providers for scalar objectives.

use ndarray::{Array1, Array2};
use num_dual::{DualNum, HyperDual};

use crate::derivative::{check_step, coordinate_step, default_step};
use crate::error::{SolverError, ensure_dim};
use crate::function::ScalarFunction;
use crate::gradient::Gradient;
use crate::numeric::Real;

/// Computes `∇²f(x)`.
pub trait Hessian<T: Real> {
    /// Writes `∇²f(x)` into `h`.
    fn hessian_into(&mut self, h: &mut Array2<T>, x: &Array1<T>) -> Result<(), SolverError>;

    /// Allocating form of [`Hessian::hessian_into`].
    fn hessian(&mut self, x: &Array1<T>) -> Result<Array2<T>, SolverError> {
        let n = x.len();
        let mut h = Array2::zeros((n, n));
        self.hessian_into(&mut h, x)?;
        Ok(h)
    }
}

fn check_square<T>(n: usize, h: &Array2<T>, x: &Array1<T>) -> Result<(), SolverError> {
    ensure_dim("hessian input", n, x.len())?;
    ensure_dim("hessian rows", n, h.nrows())?;
    ensure_dim("hessian columns", n, h.ncols())
}

/// Hessian from user code `hess!(H, x)`.
#[derive(Debug, Clone)]
pub struct HessianExact<H> {
    hess: H,
    n: usize,
}

impl<H> HessianExact<H> {
    pub fn new<T: Real>(n: usize, hess: H) -> Self
    where
        H: FnMut(&mut Array2<T>, &Array1<T>),
    {
        Self { hess, n }
    }
}

impl<T: Real, H> Hessian<T> for HessianExact<H>
where
    H: FnMut(&mut Array2<T>, &Array1<T>),
{
    fn hessian_into(&mut self, h: &mut Array2<T>, x: &Array1<T>) -> Result<(), SolverError> {
        check_square(self.n, h, x)?;
        (self.hess)(h, x);
        Ok(())
    }
}

/// Hessian by central differences of a gradient provider.
///
/// The raw difference quotient is not exactly symmetric; the result is
/// replaced by `(H + Hᵀ)/2`.
#[derive(Debug, Clone)]
pub struct HessianFiniteDifferences<T, G> {
    gradient: G,
    epsilon: T,
    x_work: Array1<T>,
    g_plus: Array1<T>,
    g_minus: Array1<T>,
}

impl<T: Real, G: Gradient<T>> HessianFiniteDifferences<T, G> {
    pub fn new(n: usize, gradient: G) -> Self {
        Self {
            gradient,
            epsilon: default_step(),
            x_work: Array1::zeros(n),
            g_plus: Array1::zeros(n),
            g_minus: Array1::zeros(n),
        }
    }

    pub fn with_step(mut self, epsilon: T) -> Result<Self, SolverError> {
        self.epsilon = check_step(epsilon)?;
        Ok(self)
    }
}

impl<T: Real, G: Gradient<T>> Hessian<T> for HessianFiniteDifferences<T, G> {
    fn hessian_into(&mut self, h: &mut Array2<T>, x: &Array1<T>) -> Result<(), SolverError> {
        let n = self.x_work.len();
        check_square(n, h, x)?;

        self.x_work.assign(x);
        for col in 0..n {
            let xj = x[col];
            let step = coordinate_step(self.epsilon, xj);
            let hi = xj + step;
            let lo = xj - step;

            self.x_work[col] = hi;
            self.gradient.gradient_into(&mut self.g_plus, &self.x_work)?;
            self.x_work[col] = lo;
            self.gradient.gradient_into(&mut self.g_minus, &self.x_work)?;
            self.x_work[col] = xj;

            let width = hi - lo;
            for row in 0..n {
                h[[row, col]] = (self.g_plus[row] - self.g_minus[row]) / width;
            }
        }

        let half = T::cast(0.5);
        for i in 0..n {
            for j in (i + 1)..n {
                let s = half * (h[[i, j]] + h[[j, i]]);
                h[[i, j]] = s;
                h[[j, i]] = s;
            }
        }
        Ok(())
    }
}

/// Hessian of a [`ScalarFunction`] by hyper-dual numbers.
///
/// Entry `(i, j)` is the `ε₁ε₂` coefficient of `f` evaluated with
/// coordinate `i` seeded in `ε₁` and `j` in `ε₂`.
/// Only the upper triangle is swept; the lower is mirrored.
#[derive(Debug, Clone)]
pub struct HessianAutodiff<T: DualNum<T>, F> {
    f: F,
    duals: Vec<HyperDual<T, T>>,
}

impl<T, F> HessianAutodiff<T, F>
where
    T: Real + DualNum<T>,
    F: ScalarFunction<T>,
{
    pub fn new(n: usize, f: F) -> Self {
        let zero = T::zero();
        Self {
            f,
            duals: vec![HyperDual::new(zero, zero, zero, zero); n],
        }
    }
}

impl<T, F> Hessian<T> for HessianAutodiff<T, F>
where
    T: Real + DualNum<T>,
    F: ScalarFunction<T>,
{
    fn hessian_into(&mut self, h: &mut Array2<T>, x: &Array1<T>) -> Result<(), SolverError> {
        let n = self.duals.len();
        check_square(n, h, x)?;

        let zero = T::zero();
        for (d, &xi) in self.duals.iter_mut().zip(x.iter()) {
            *d = HyperDual::new(xi, zero, zero, zero);
        }
        for i in 0..n {
            self.duals[i].eps1 = T::one();
            for j in i..n {
                self.duals[j].eps2 = T::one();
                let out = self.f.eval(&self.duals);
                self.duals[j].eps2 = zero;
                h[[i, j]] = out.eps1eps2;
                h[[j, i]] = out.eps1eps2;
            }
            self.duals[i].eps1 = zero;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradient::{GradientAutodiff, GradientExact};
    use ndarray::array;
    use spectral::prelude::*;

    // f(x) = x0²·x1 + sin(x1) + 3·x0
    struct Cubic;

    impl ScalarFunction<f64> for Cubic {
        fn eval<D: DualNum<f64> + Copy>(&self, x: &[D]) -> D {
            x[0] * x[0] * x[1] + x[1].sin() + D::from(3.0) * x[0]
        }
    }

    fn analytic(x: &Array1<f64>) -> Array2<f64> {
        array![[2.0 * x[1], 2.0 * x[0]], [2.0 * x[0], -x[1].sin()]]
    }

    #[test]
    fn test_hyper_duals_give_exact_hessian() {
        let x = array![0.7, -1.3];
        let mut ad = HessianAutodiff::new(2, Cubic);
        let h = ad.hessian(&x).unwrap();
        let expected = analytic(&x);
        for i in 0..2 {
            for j in 0..2 {
                assert_that!(&h[[i, j]]).is_close_to(expected[[i, j]], 1e-14);
            }
        }
    }

    #[test]
    fn test_finite_differences_of_gradient_is_symmetric() {
        let x = array![0.7, -1.3];
        let mut fd = HessianFiniteDifferences::new(2, GradientAutodiff::new(2, Cubic));
        let h = fd.hessian(&x).unwrap();
        let expected = analytic(&x);
        assert_eq!(h[[0, 1]], h[[1, 0]]);
        for i in 0..2 {
            for j in 0..2 {
                assert_that!(&h[[i, j]]).is_close_to(expected[[i, j]], 1e-6);
            }
        }
    }

    #[test]
    fn test_exact_hessian_and_gradient_errors_propagate() {
        let mut exact = HessianExact::new(2, |h: &mut Array2<f64>, x: &Array1<f64>| {
            h.assign(&analytic(x));
        });
        let x = array![1.0, 2.0];
        assert_eq!(exact.hessian(&x).unwrap(), analytic(&x));

        let grad = GradientExact::new(3, |g: &mut Array1<f64>, x: &Array1<f64>| g.assign(x));
        let mut fd = HessianFiniteDifferences::new(2, grad);
        assert!(matches!(
            fd.hessian(&x),
            Err(SolverError::DimensionMismatch { expected: 3, found: 2, .. })
        ));
    }
}
