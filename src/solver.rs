//! Newton and frozen-Jacobian (quasi-Newton) solvers for square systems
//! `F(x) = 0`.

use ndarray::{Array1, Array2};

use crate::cache::NewtonCache;
use crate::error::{Quantity, SolverError, ensure_dim};
use crate::function::SystemFunction;
use crate::jacobian::Jacobian;
use crate::linalg::{LinearSolver, LuSolver};
use crate::linesearch::{LineFunction, Linesearch};
use crate::numeric::{Real, all_finite, norm};
use crate::options::Options;
use crate::problem::NonlinearProblem;
use crate::result::{SolverResult, Termination};
use crate::status::Status;

/// Merit function `φ(α) = ½‖F(x̄ + α·δ)‖²` along the current direction.
///
/// `φ'(0)` is taken with the Jacobian the direction was solved with;
/// later slopes evaluate the Jacobian at the trial point.
struct MeritLine<'a, T, P, F, J> {
    problem: &'a mut NonlinearProblem<T, P, F, J>,
    cache: &'a mut NewtonCache<T>,
    slope: T,
}

impl<T, P, F, J> LineFunction<T> for MeritLine<'_, T, P, F, J>
where
    T: Real,
    F: SystemFunction<T, P>,
    J: Jacobian<T, P>,
{
    fn value(&mut self, alpha: T) -> Result<T, SolverError> {
        self.cache.trial(alpha);
        let fx = self.problem.value_cached(&self.cache.x)?;
        Ok(T::cast(0.5) * fx.dot(fx))
    }

    fn derivative(&mut self, alpha: T) -> Result<T, SolverError> {
        if alpha == T::zero() {
            return Ok(self.slope);
        }
        self.cache.trial(alpha);
        let jd = self
            .problem
            .jacobian_cached(&self.cache.x)?
            .dot(&self.cache.delta);
        let fx = self.problem.value_cached(&self.cache.x)?;
        Ok(fx.dot(&jd))
    }
}

/// Solver for `F(x) = 0` with `F: Rⁿ → Rⁿ`.
///
/// Every iteration solves `J·δ = −F(x)` through an LU factorization and
/// runs the linesearch on `½‖F‖²`. With a refactorization period `k > 1`
/// the Jacobian is evaluated and factorized only on iterations
/// `1, k + 1, 2k + 1, …` and reused in between.
#[derive(Debug, Clone)]
pub struct NewtonSolver<T, P, F, J> {
    problem: NonlinearProblem<T, P, F, J>,
    lu: LuSolver<T>,
    jacobian: Array2<T>,
    refactorize: usize,
    linesearch: Linesearch<T>,
    options: Options<T>,
    status: Status<T>,
}

impl<T, P, F, J> NewtonSolver<T, P, F, J>
where
    T: Real,
    F: SystemFunction<T, P>,
    J: Jacobian<T, P>,
{
    /// Plain Newton: fresh Jacobian every iteration.
    pub fn newton(problem: NonlinearProblem<T, P, F, J>) -> Self {
        Self::quasi_newton(problem, 1)
    }

    /// Frozen-Jacobian Newton, refactorizing every `refactorize` iterations.
    /// A period of zero is rejected when solving.
    pub fn quasi_newton(problem: NonlinearProblem<T, P, F, J>, refactorize: usize) -> Self {
        let n = problem.dim();
        Self {
            problem,
            lu: LuSolver::new(n),
            jacobian: Array2::zeros((n, n)),
            refactorize,
            linesearch: Linesearch::default(),
            options: Options::default(),
            status: Status::new(),
        }
    }

    pub fn with_options(mut self, options: Options<T>) -> Self {
        self.options = options;
        self
    }

    pub fn with_linesearch(mut self, linesearch: Linesearch<T>) -> Self {
        self.linesearch = linesearch;
        self
    }

    pub fn options(&self) -> &Options<T> {
        &self.options
    }

    pub fn problem(&self) -> &NonlinearProblem<T, P, F, J> {
        &self.problem
    }

    pub fn problem_mut(&mut self) -> &mut NonlinearProblem<T, P, F, J> {
        &mut self.problem
    }

    pub fn refactorize(&self) -> usize {
        self.refactorize
    }

    pub fn status(&self) -> &Status<T> {
        &self.status
    }

    fn method(&self) -> &'static str {
        if self.refactorize == 1 {
            "Newton"
        } else {
            "Quasi-Newton"
        }
    }

    /// Solves from the starting point in `x`, leaving the final iterate there.
    pub fn solve(&mut self, x: &mut Array1<T>) -> Result<SolverResult<T>, SolverError> {
        self.options.validate()?;
        self.linesearch.validate()?;
        if self.refactorize == 0 {
            return Err(SolverError::invalid("the refactorization period must be at least 1"));
        }
        let n = self.problem.dim();
        if n == 0 {
            return Err(SolverError::invalid("the system has no unknowns"));
        }
        ensure_dim("starting point", n, x.len())?;
        let method = self.method();
        let opts = self.options;

        self.problem.clear_cache();
        self.status.clear();
        if self.lu.dim() != n {
            self.lu = LuSolver::new(n);
            self.jacobian = Array2::zeros((n, n));
        }

        if !all_finite(x) {
            return Err(SolverError::NonFiniteIterate {
                iteration: 0,
                quantity: Quantity::X,
            });
        }
        let fx0_norm = norm(self.problem.value_cached(x)?);
        if !fx0_norm.is_finite() {
            return Err(SolverError::NonFiniteIterate {
                iteration: 0,
                quantity: Quantity::F,
            });
        }

        self.status.rfa = Some(fx0_norm);
        if opts.min_iterations == 0 && fx0_norm <= opts.f_abstol {
            self.status.f_converged = true;
            return self.finish(x, Termination::Converged);
        }

        let mut cache = NewtonCache::new(n);

        let termination = loop {
            self.status.iteration += 1;
            let iteration = self.status.iteration;

            if (iteration - 1) % self.refactorize == 0 {
                let j = self.problem.jacobian_cached(x)?;
                self.lu.factorize(j)?;
                self.jacobian.assign(j);
            }

            let lu = &self.lu;
            let fx = self.problem.value_cached(x)?;
            let fx_prev_norm = norm(fx);
            cache.update(x, fx, |delta, rhs| lu.solve_into(delta, rhs))?;
            let slope = cache.g.dot(&self.jacobian.dot(&cache.delta));

            let outcome = self.linesearch.search(&mut MeritLine {
                problem: &mut self.problem,
                cache: &mut cache,
                slope,
            })?;
            if !outcome.converged {
                log::debug!(
                    "[{method}] {} linesearch did not satisfy its acceptance test; taking α = {}.",
                    self.linesearch.name(),
                    outcome.alpha
                );
            }

            x.assign(cache.trial(outcome.alpha));
            let fx = self.problem.value_cached(x)?;
            self.status
                .update_solver(x, &cache.x_prev, fx, fx_prev_norm, fx0_norm);
            self.status.record_linesearch(outcome.converged);
            self.status.assess_convergence(&opts);

            if opts.verbosity >= 2 {
                log::info!(
                    "[{method}] iter {iteration:>4}: ‖F(x)‖ = {:e}, ‖Δx‖ = {:e}, α = {:e}",
                    self.status.rfa.unwrap_or_else(T::nan),
                    self.status.rxa.unwrap_or_else(T::nan),
                    outcome.alpha,
                );
            }
            if opts.verbosity >= 1 && iteration == opts.warn_iterations && !self.status.converged() {
                log::warn!(
                    "[{method}] {iteration} iterations without convergence (‖F(x)‖ = {:e}).",
                    self.status.rfa.unwrap_or_else(T::nan)
                );
            }

            if let Some(reason) = self.status.termination(&opts)? {
                break reason;
            }
        };

        self.finish(x, termination)
    }

    fn finish(
        &mut self,
        x: &Array1<T>,
        termination: Termination,
    ) -> Result<SolverResult<T>, SolverError> {
        let residual = self.problem.value_cached(x)?.clone();
        let result = SolverResult {
            x: x.clone(),
            residual,
            status: self.status.clone(),
            converged: termination == Termination::Converged,
            termination,
            f_calls: self.problem.f_calls(),
            j_calls: self.problem.j_calls(),
            method: self.method(),
            linesearch: self.linesearch.name(),
        };
        if self.options.verbosity >= 1 {
            log::info!("[{}] {result}", result.method);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jacobian::JacobianExact;
    use ndarray::array;
    use spectral::prelude::*;

    fn circle(y: &mut Array1<f64>, x: &Array1<f64>, r: &f64) {
        y[0] = x[0] * x[0] + x[1] * x[1] - r * r;
        y[1] = x[0] - x[1];
    }

    fn circle_jacobian(j: &mut Array2<f64>, x: &Array1<f64>, _: &f64) {
        j.assign(&array![[2.0 * x[0], 2.0 * x[1]], [1.0, -1.0]]);
    }

    #[test]
    fn test_linear_system_is_solved_by_one_newton_step() {
        let problem = NonlinearProblem::new(
            2,
            |y: &mut Array1<f64>, x: &Array1<f64>, _: &()| {
                y[0] = 4.0 * x[0] + x[1] - 1.0;
                y[1] = x[0] + 3.0 * x[1] - 2.0;
            },
            JacobianExact::new(2, 2, |j: &mut Array2<f64>, _: &Array1<f64>, _: &()| {
                j.assign(&array![[4.0, 1.0], [1.0, 3.0]]);
            }),
            (),
        );
        let mut x = array![3.0, -4.0];
        let result = NewtonSolver::newton(problem).solve(&mut x).unwrap();
        assert!(result.converged);
        assert!(result.iterations() <= 2);
        assert_that!(&x[0]).is_close_to(1.0 / 11.0, 1e-12);
        assert_that!(&x[1]).is_close_to(7.0 / 11.0, 1e-12);
        assert_eq!(result.method, "Newton");
    }

    #[test]
    fn test_params_select_the_root() {
        let problem = NonlinearProblem::new(2, circle, JacobianExact::new(2, 2, circle_jacobian), 2.0);
        let mut x = array![1.0, 0.5];
        let result = NewtonSolver::newton(problem).solve(&mut x).unwrap();
        assert!(result.converged);
        assert_that!(&x[0]).is_close_to(2f64.sqrt(), 1e-10);
        assert_that!(&x[1]).is_close_to(2f64.sqrt(), 1e-10);
        assert!(result.residual_norm() < 1e-10);
    }

    #[test]
    fn test_frozen_jacobian_is_refactorized_periodically() {
        let problem = NonlinearProblem::new(2, circle, JacobianExact::new(2, 2, circle_jacobian), 2.0);
        let mut x = array![1.0, 0.5];
        let result = NewtonSolver::quasi_newton(problem, 3)
            .with_linesearch(Linesearch::backtracking())
            .solve(&mut x)
            .unwrap();
        assert!(result.converged);
        assert_eq!(result.method, "Quasi-Newton");
        assert_eq!(result.j_calls, (result.iterations() + 2) / 3);
        assert_that!(&x[0]).is_close_to(2f64.sqrt(), 1e-10);
    }

    #[test]
    fn test_start_at_root_takes_no_iterations() {
        let problem = NonlinearProblem::new(
            1,
            |y: &mut Array1<f64>, x: &Array1<f64>, _: &()| y[0] = x[0],
            JacobianExact::new(1, 1, |j: &mut Array2<f64>, _: &Array1<f64>, _: &()| j[[0, 0]] = 1.0),
            (),
        );
        let mut x = array![0.0];
        let result = NewtonSolver::newton(problem).solve(&mut x).unwrap();
        assert_eq!(result.iterations(), 0);
        assert_eq!(result.j_calls, 0);
        assert!(result.converged);
    }

    #[test]
    fn test_zero_refactorization_period_is_rejected() {
        let problem = NonlinearProblem::new(2, circle, JacobianExact::new(2, 2, circle_jacobian), 2.0);
        let err = NewtonSolver::quasi_newton(problem, 0)
            .solve(&mut array![1.0, 0.5])
            .unwrap_err();
        assert!(matches!(err, SolverError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_starting_point_dimension_is_checked() {
        let problem = NonlinearProblem::new(2, circle, JacobianExact::new(2, 2, circle_jacobian), 2.0);
        let err = NewtonSolver::newton(problem).solve(&mut array![1.0]).unwrap_err();
        assert!(matches!(
            err,
            SolverError::DimensionMismatch { expected: 2, found: 1, .. }
        ));
    }

    #[test]
    fn test_singular_jacobian_propagates() {
        // Two parallel lines: no solution, rank-one Jacobian.
        let problem = NonlinearProblem::new(
            2,
            |y: &mut Array1<f64>, x: &Array1<f64>, _: &()| {
                y[0] = x[0] + x[1] - 1.0;
                y[1] = x[0] + x[1] - 2.0;
            },
            JacobianExact::new(2, 2, |j: &mut Array2<f64>, _: &Array1<f64>, _: &()| j.fill(1.0)),
            (),
        );
        let err = NewtonSolver::newton(problem).solve(&mut array![0.0, 0.0]).unwrap_err();
        assert!(matches!(err, SolverError::SingularMatrix { .. }));
    }

    #[test]
    fn test_missing_jacobian_is_reported() {
        let problem = NonlinearProblem::value_only(2, circle, 2.0);
        let err = NewtonSolver::newton(problem).solve(&mut array![1.0, 0.5]).unwrap_err();
        assert_eq!(err, SolverError::DerivativeNotImplemented { kind: "jacobian" });
    }

    #[test]
    fn test_bisection_merit_search_uses_trial_jacobians() {
        let problem = NonlinearProblem::new(2, circle, JacobianExact::new(2, 2, circle_jacobian), 2.0);
        let mut x = array![1.0, 0.5];
        let result = NewtonSolver::newton(problem)
            .with_linesearch(Linesearch::bisection())
            .solve(&mut x)
            .unwrap();
        assert!(result.converged);
        assert_eq!(result.linesearch, "Bisection");
        assert_that!(&x[1]).is_close_to(2f64.sqrt(), 1e-8);
    }
}
