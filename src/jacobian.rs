//! Jacobian providers for in-place systems `F!(y, x, params)`.

use ndarray::{Array1, Array2};
use num_dual::{Dual, DualNum};

use crate::derivative::{check_step, coordinate_step, default_step};
use crate::error::{SolverError, ensure_dim};
use crate::function::{SystemFunction, VectorFunction};
use crate::numeric::Real;

/// Computes `J(x) = ∂F/∂x` with `J[i, j] = ∂Fᵢ/∂xⱼ`.
pub trait Jacobian<T: Real, P> {
    /// Writes `J(x)` into `j`.
    fn jacobian_into(&mut self, j: &mut Array2<T>, x: &Array1<T>, params: &P)
    -> Result<(), SolverError>;

    /// `(outputs, inputs)` when the provider knows it.
    fn shape(&self) -> Option<(usize, usize)> {
        None
    }

    /// Allocating form of [`Jacobian::jacobian_into`]. Falls back to a
    /// square shape when the provider does not know its output size.
    fn jacobian(&mut self, x: &Array1<T>, params: &P) -> Result<Array2<T>, SolverError> {
        let shape = self.shape().unwrap_or((x.len(), x.len()));
        let mut j = Array2::zeros(shape);
        self.jacobian_into(&mut j, x, params)?;
        Ok(j)
    }
}

fn check_shape<T>(m: usize, n: usize, j: &Array2<T>, x: &Array1<T>) -> Result<(), SolverError> {
    ensure_dim("jacobian input", n, x.len())?;
    ensure_dim("jacobian rows", m, j.nrows())?;
    ensure_dim("jacobian columns", n, j.ncols())
}

/// Jacobian from user code `jac!(J, x, params)`.
#[derive(Debug, Clone)]
pub struct JacobianExact<J> {
    jac: J,
    m: usize,
    n: usize,
}

impl<J> JacobianExact<J> {
    /// A Jacobian with `m` outputs and `n` inputs.
    pub fn new<T: Real, P>(m: usize, n: usize, jac: J) -> Self
    where
        J: FnMut(&mut Array2<T>, &Array1<T>, &P),
    {
        Self { jac, m, n }
    }
}

impl<T: Real, P, J> Jacobian<T, P> for JacobianExact<J>
where
    J: FnMut(&mut Array2<T>, &Array1<T>, &P),
{
    fn jacobian_into(
        &mut self,
        j: &mut Array2<T>,
        x: &Array1<T>,
        params: &P,
    ) -> Result<(), SolverError> {
        check_shape(self.m, self.n, j, x)?;
        (self.jac)(j, x, params);
        Ok(())
    }

    fn shape(&self) -> Option<(usize, usize)> {
        Some((self.m, self.n))
    }
}

/// Central-difference Jacobian, one column per pair of system evaluations.
#[derive(Debug, Clone)]
pub struct JacobianFiniteDifferences<T, F> {
    f: F,
    epsilon: T,
    x_work: Array1<T>,
    y_plus: Array1<T>,
    y_minus: Array1<T>,
}

impl<T: Real, F> JacobianFiniteDifferences<T, F> {
    pub fn new(m: usize, n: usize, f: F) -> Self {
        Self {
            f,
            epsilon: default_step(),
            x_work: Array1::zeros(n),
            y_plus: Array1::zeros(m),
            y_minus: Array1::zeros(m),
        }
    }

    pub fn with_step(mut self, epsilon: T) -> Result<Self, SolverError> {
        self.epsilon = check_step(epsilon)?;
        Ok(self)
    }
}

impl<T: Real, P, F> Jacobian<T, P> for JacobianFiniteDifferences<T, F>
where
    F: SystemFunction<T, P>,
{
    fn jacobian_into(
        &mut self,
        j: &mut Array2<T>,
        x: &Array1<T>,
        params: &P,
    ) -> Result<(), SolverError> {
        let (m, n) = (self.y_plus.len(), self.x_work.len());
        check_shape(m, n, j, x)?;

        self.x_work.assign(x);
        for col in 0..n {
            let xj = x[col];
            let h = coordinate_step(self.epsilon, xj);
            let hi = xj + h;
            let lo = xj - h;

            self.x_work[col] = hi;
            self.f.call(&mut self.y_plus, &self.x_work, params);
            self.x_work[col] = lo;
            self.f.call(&mut self.y_minus, &self.x_work, params);
            self.x_work[col] = xj;

            let width = hi - lo;
            for row in 0..m {
                j[[row, col]] = (self.y_plus[row] - self.y_minus[row]) / width;
            }
        }
        Ok(())
    }

    fn shape(&self) -> Option<(usize, usize)> {
        Some((self.y_plus.len(), self.x_work.len()))
    }
}

/// Forward-mode Jacobian of a [`VectorFunction`], one dual sweep per column.
#[derive(Debug, Clone)]
pub struct JacobianAutodiff<T: DualNum<T>, F> {
    f: F,
    x_duals: Vec<Dual<T, T>>,
    y_duals: Vec<Dual<T, T>>,
}

impl<T: Real + DualNum<T>, F> JacobianAutodiff<T, F> {
    pub fn new(m: usize, n: usize, f: F) -> Self {
        let zero = Dual::new(T::zero(), T::zero());
        Self {
            f,
            x_duals: vec![zero; n],
            y_duals: vec![zero; m],
        }
    }
}

impl<T, P, F> Jacobian<T, P> for JacobianAutodiff<T, F>
where
    T: Real + DualNum<T>,
    F: VectorFunction<T, P>,
{
    fn jacobian_into(
        &mut self,
        j: &mut Array2<T>,
        x: &Array1<T>,
        params: &P,
    ) -> Result<(), SolverError> {
        let (m, n) = (self.y_duals.len(), self.x_duals.len());
        check_shape(m, n, j, x)?;

        let zero = Dual::new(T::zero(), T::zero());
        for (d, &xi) in self.x_duals.iter_mut().zip(x.iter()) {
            *d = Dual::new(xi, T::zero());
        }
        for col in 0..n {
            self.x_duals[col].eps = T::one();
            self.y_duals.fill(zero);
            self.f.eval(&mut self.y_duals, &self.x_duals, params);
            self.x_duals[col].eps = T::zero();
            for (row, y) in self.y_duals.iter().enumerate() {
                j[[row, col]] = y.eps;
            }
        }
        Ok(())
    }

    fn shape(&self) -> Option<(usize, usize)> {
        Some((self.y_duals.len(), self.x_duals.len()))
    }
}
