//! Gradient providers for scalar objectives.
//!
//! All providers share the in-place contract of [`Gradient::gradient_into`]
//! and are interchangeable inside an [`crate::Objective`]:
//!
//! - [`GradientExact`] forwards to a user-supplied in-place gradient,
//! - [`GradientFiniteDifferences`] uses central differences,
//! - [`GradientAutodiff`] uses forward-mode dual numbers from `num_dual`.

use ndarray::Array1;
use num_dual::{Dual, DualNum};

use crate::derivative::{check_step, coordinate_step, default_step};
use crate::error::{SolverError, ensure_dim};
use crate::function::{ScalarFunction, ValueFunction};
use crate::numeric::Real;

/// Computes `∇f(x)`.
pub trait Gradient<T: Real> {
    /// Writes `∇f(x)` into `g`.
    fn gradient_into(&mut self, g: &mut Array1<T>, x: &Array1<T>) -> Result<(), SolverError>;

    /// Allocating form of [`Gradient::gradient_into`].
    fn gradient(&mut self, x: &Array1<T>) -> Result<Array1<T>, SolverError> {
        let mut g = Array1::zeros(x.len());
        self.gradient_into(&mut g, x)?;
        Ok(g)
    }
}

/// Gradient from user code `grad!(g, x)`.
#[derive(Debug, Clone)]
pub struct GradientExact<G> {
    grad: G,
    n: usize,
}

impl<G> GradientExact<G> {
    pub fn new<T: Real>(n: usize, grad: G) -> Self
    where
        G: FnMut(&mut Array1<T>, &Array1<T>),
    {
        Self { grad, n }
    }
}

impl<T: Real, G> Gradient<T> for GradientExact<G>
where
    G: FnMut(&mut Array1<T>, &Array1<T>),
{
    fn gradient_into(&mut self, g: &mut Array1<T>, x: &Array1<T>) -> Result<(), SolverError> {
        ensure_dim("gradient input", self.n, x.len())?;
        ensure_dim("gradient output", self.n, g.len())?;
        (self.grad)(g, x);
        Ok(())
    }
}

/// Central-difference gradient of a value function.
///
/// Each call costs `2n` evaluations of `f`. The two perturbed points are
/// kept in buffers allocated at construction.
#[derive(Debug, Clone)]
pub struct GradientFiniteDifferences<T, F> {
    f: F,
    epsilon: T,
    x_plus: Array1<T>,
    x_minus: Array1<T>,
}

impl<T: Real, F: ValueFunction<T>> GradientFiniteDifferences<T, F> {
    /// Uses the default base step `8·√eps`.
    pub fn new(n: usize, f: F) -> Self {
        Self {
            f,
            epsilon: default_step(),
            x_plus: Array1::zeros(n),
            x_minus: Array1::zeros(n),
        }
    }

    /// Overrides the base step `ϵ`. Rejects non-positive or non-finite steps.
    pub fn with_step(mut self, epsilon: T) -> Result<Self, SolverError> {
        self.epsilon = check_step(epsilon)?;
        Ok(self)
    }

    pub fn step(&self) -> T {
        self.epsilon
    }
}

impl<T: Real, F: ValueFunction<T>> Gradient<T> for GradientFiniteDifferences<T, F> {
    fn gradient_into(&mut self, g: &mut Array1<T>, x: &Array1<T>) -> Result<(), SolverError> {
        let n = self.x_plus.len();
        ensure_dim("gradient input", n, x.len())?;
        ensure_dim("gradient output", n, g.len())?;

        self.x_plus.assign(x);
        self.x_minus.assign(x);
        for j in 0..n {
            let xj = x[j];
            let h = coordinate_step(self.epsilon, xj);
            self.x_plus[j] = xj + h;
            self.x_minus[j] = xj - h;
            let f_plus = self.f.call(&self.x_plus);
            let f_minus = self.f.call(&self.x_minus);
            g[j] = (f_plus - f_minus) / (self.x_plus[j] - self.x_minus[j]);
            self.x_plus[j] = xj;
            self.x_minus[j] = xj;
        }
        Ok(())
    }
}

/// Forward-mode gradient of a [`ScalarFunction`].
///
/// One dual evaluation per coordinate. The dual input vector is the
/// reusable configuration and is sized once at construction.
#[derive(Debug, Clone)]
pub struct GradientAutodiff<T: DualNum<T>, F> {
    f: F,
    duals: Vec<Dual<T, T>>,
}

impl<T, F> GradientAutodiff<T, F>
where
    T: Real + DualNum<T>,
    F: ScalarFunction<T>,
{
    pub fn new(n: usize, f: F) -> Self {
        Self {
            f,
            duals: vec![Dual::new(T::zero(), T::zero()); n],
        }
    }

    /// Value and gradient from the same sweep.
    pub fn value_and_gradient_into(
        &mut self,
        g: &mut Array1<T>,
        x: &Array1<T>,
    ) -> Result<T, SolverError> {
        let n = self.duals.len();
        ensure_dim("gradient input", n, x.len())?;
        ensure_dim("gradient output", n, g.len())?;

        for (d, &xi) in self.duals.iter_mut().zip(x.iter()) {
            *d = Dual::new(xi, T::zero());
        }
        let mut value = T::nan();
        for i in 0..n {
            self.duals[i].eps = T::one();
            let out = self.f.eval(&self.duals);
            self.duals[i].eps = T::zero();
            g[i] = out.eps;
            value = out.re;
        }
        if n == 0 {
            value = self.f.eval(&self.duals).re;
        }
        Ok(value)
    }
}

impl<T, F> Gradient<T> for GradientAutodiff<T, F>
where
    T: Real + DualNum<T>,
    F: ScalarFunction<T>,
{
    fn gradient_into(&mut self, g: &mut Array1<T>, x: &Array1<T>) -> Result<(), SolverError> {
        self.value_and_gradient_into(g, x).map(|_| ())
    }
}
