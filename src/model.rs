//! Stateful Hessian models that turn a gradient into a search direction.

use ndarray::{Array1, Array2};

use crate::error::{SolverError, ensure_dim};
use crate::function::ValueFunction;
use crate::gradient::Gradient;
use crate::hessian::Hessian;
use crate::linalg::{LinearSolver, LuSolver};
use crate::numeric::Real;
use crate::objective::Objective;

/// How an optimizer obtains `δ` from `H·δ = rhs`.
///
/// A model is initialized once per solve at the starting point and then
/// updated once per iteration, before the direction is requested.
pub trait HessianModel<T: Real> {
    /// Resets the model at the starting point `x`.
    fn initialize<F, G>(
        &mut self,
        objective: &mut Objective<T, F, G>,
        x: &Array1<T>,
    ) -> Result<(), SolverError>
    where
        F: ValueFunction<T>,
        G: Gradient<T>;

    /// Moves the model to the new iterate `x`.
    fn update<F, G>(
        &mut self,
        objective: &mut Objective<T, F, G>,
        x: &Array1<T>,
    ) -> Result<(), SolverError>
    where
        F: ValueFunction<T>,
        G: Gradient<T>;

    /// Writes the direction for right-hand side `rhs` into `delta`.
    fn solve_into(&self, delta: &mut Array1<T>, rhs: &Array1<T>) -> Result<(), SolverError>;

    /// Dimension of the model; zero before `initialize`.
    fn dim(&self) -> usize;

    /// Short name for log lines.
    fn name(&self) -> &'static str;
}

/// Exact (or finite-difference) Newton model: evaluates the Hessian
/// provider at every update and solves through an LU factorization.
#[derive(Debug, Clone)]
pub struct NewtonHessian<T, H> {
    hessian: H,
    matrix: Array2<T>,
    lu: LuSolver<T>,
}

impl<T: Real, H: Hessian<T>> NewtonHessian<T, H> {
    pub fn new(hessian: H) -> Self {
        Self {
            hessian,
            matrix: Array2::zeros((0, 0)),
            lu: LuSolver::new(0),
        }
    }

    /// The Hessian evaluated at the last update.
    pub fn matrix(&self) -> &Array2<T> {
        &self.matrix
    }

    fn refresh(&mut self, x: &Array1<T>) -> Result<(), SolverError> {
        let n = x.len();
        if self.lu.dim() != n {
            self.matrix = Array2::zeros((n, n));
            self.lu = LuSolver::new(n);
        }
        self.hessian.hessian_into(&mut self.matrix, x)?;
        self.lu.factorize(&self.matrix)
    }
}

impl<T: Real, H: Hessian<T>> HessianModel<T> for NewtonHessian<T, H> {
    fn initialize<F, G>(
        &mut self,
        _objective: &mut Objective<T, F, G>,
        x: &Array1<T>,
    ) -> Result<(), SolverError>
    where
        F: ValueFunction<T>,
        G: Gradient<T>,
    {
        self.refresh(x)
    }

    fn update<F, G>(
        &mut self,
        _objective: &mut Objective<T, F, G>,
        x: &Array1<T>,
    ) -> Result<(), SolverError>
    where
        F: ValueFunction<T>,
        G: Gradient<T>,
    {
        self.refresh(x)
    }

    fn solve_into(&self, delta: &mut Array1<T>, rhs: &Array1<T>) -> Result<(), SolverError> {
        ensure_dim("newton direction", self.lu.dim(), rhs.len())?;
        self.lu.solve_into(delta, rhs)
    }

    fn dim(&self) -> usize {
        self.lu.dim()
    }

    fn name(&self) -> &'static str {
        "Newton"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hessian::HessianExact;
    use ndarray::array;
    use spectral::prelude::*;

    #[test]
    fn test_newton_model_solves_with_current_hessian() {
        let mut obj = Objective::finite_differences(2, |x: &Array1<f64>| x.dot(x));
        let mut model = NewtonHessian::new(HessianExact::new(
            2,
            |h: &mut Array2<f64>, x: &Array1<f64>| {
                h.assign(&array![[4.0 + x[0], 1.0], [1.0, 3.0]]);
            },
        ));
        assert_eq!(HessianModel::<f64>::dim(&model), 0);

        model.initialize(&mut obj, &array![0.0, 0.0]).unwrap();
        let mut delta = Array1::zeros(2);
        model.solve_into(&mut delta, &array![1.0, 2.0]).unwrap();
        assert_that!(&delta[0]).is_close_to(1.0 / 11.0, 1e-14);
        assert_that!(&delta[1]).is_close_to(7.0 / 11.0, 1e-14);

        model.update(&mut obj, &array![1.0, 0.0]).unwrap();
        assert_eq!(model.matrix()[[0, 0]], 5.0);
        assert_eq!(model.name(), "Newton");
        // The model never asks the objective for anything.
        assert_eq!(obj.g_calls(), 0);
    }

    #[test]
    fn test_singular_hessian_propagates() {
        let mut obj = Objective::finite_differences(2, |x: &Array1<f64>| x[0] * x[0]);
        let mut model = NewtonHessian::new(HessianExact::new(
            2,
            |h: &mut Array2<f64>, _: &Array1<f64>| {
                h.assign(&array![[2.0, 0.0], [0.0, 0.0]]);
            },
        ));
        assert!(matches!(
            model.initialize(&mut obj, &array![1.0, 1.0]),
            Err(SolverError::SingularMatrix { pivot: 1 })
        ));
    }
}
