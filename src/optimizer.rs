//! Newton and quasi-Newton minimization.
//!
//! One driver loop serves every Hessian model. Per iteration it
//!
//! 1. moves the model to the current iterate,
//! 2. solves for the direction `δ` from `H·δ = −∇f(x)`,
//! 3. runs the linesearch on `φ(α) = f(x + α·δ)`,
//! 4. accepts `x + α·δ` and records residuals in the [`Status`],
//!
//! and stops as soon as [`Status::termination`] gives a reason to.

use ndarray::Array1;

use crate::cache::NewtonCache;
use crate::error::{Quantity, SolverError};
use crate::function::ValueFunction;
use crate::gradient::Gradient;
use crate::hessian::Hessian;
use crate::linesearch::{LineFunction, Linesearch};
use crate::model::{HessianModel, NewtonHessian};
use crate::numeric::{Real, all_finite, norm};
use crate::objective::Objective;
use crate::options::Options;
use crate::result::{OptimizerResult, Termination};
use crate::secant::{Bfgs, Dfp};
use crate::status::Status;

/// `φ(α) = f(x̄ + α·δ)` backed by the memoized objective, so the accepted
/// trial point is never evaluated twice.
struct ObjectiveLine<'a, T, F, G> {
    objective: &'a mut Objective<T, F, G>,
    cache: &'a mut NewtonCache<T>,
}

impl<T, F, G> LineFunction<T> for ObjectiveLine<'_, T, F, G>
where
    T: Real,
    F: ValueFunction<T>,
    G: Gradient<T>,
{
    fn value(&mut self, alpha: T) -> Result<T, SolverError> {
        let x = self.cache.trial(alpha);
        Ok(self.objective.value_cached(x))
    }

    fn derivative(&mut self, alpha: T) -> Result<T, SolverError> {
        if alpha == T::zero() {
            return Ok(self.cache.slope());
        }
        let x = self.cache.trial(alpha);
        let g = self.objective.gradient_cached(x)?;
        Ok(g.dot(&self.cache.delta))
    }
}

/// Minimizer of `f` built from an objective, a Hessian model, a linesearch
/// and [`Options`].
///
/// ```
/// use ndarray::{array, Array1};
/// use newton_solvers::{GradientExact, Linesearch, Objective, Optimizer};
///
/// let objective = Objective::new(
///     |x: &Array1<f64>| (x[0] - 1.0).powi(2) + 10.0 * (x[1] + 2.0).powi(2),
///     GradientExact::new(2, |g: &mut Array1<f64>, x: &Array1<f64>| {
///         g[0] = 2.0 * (x[0] - 1.0);
///         g[1] = 20.0 * (x[1] + 2.0);
///     }),
/// );
/// let mut x = array![0.0, 0.0];
/// let result = Optimizer::bfgs(objective)
///     .with_linesearch(Linesearch::backtracking())
///     .solve(&mut x)
///     .unwrap();
/// assert!(result.converged);
/// assert!((x[0] - 1.0).abs() < 1e-6 && (x[1] + 2.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct Optimizer<T, F, G, H> {
    objective: Objective<T, F, G>,
    model: H,
    linesearch: Linesearch<T>,
    options: Options<T>,
    status: Status<T>,
}

/// Newton's method with a Hessian provider `HP`.
pub type NewtonOptimizer<T, F, G, HP> = Optimizer<T, F, G, NewtonHessian<T, HP>>;
/// BFGS quasi-Newton method.
pub type BfgsOptimizer<T, F, G> = Optimizer<T, F, G, Bfgs<T>>;
/// DFP quasi-Newton method.
pub type DfpOptimizer<T, F, G> = Optimizer<T, F, G, Dfp<T>>;

impl<T, F, G, HP> Optimizer<T, F, G, NewtonHessian<T, HP>>
where
    T: Real,
    F: ValueFunction<T>,
    G: Gradient<T>,
    HP: Hessian<T>,
{
    pub fn newton(objective: Objective<T, F, G>, hessian: HP) -> Self {
        Self::new(objective, NewtonHessian::new(hessian))
    }
}

impl<T, F, G> Optimizer<T, F, G, Bfgs<T>>
where
    T: Real,
    F: ValueFunction<T>,
    G: Gradient<T>,
{
    pub fn bfgs(objective: Objective<T, F, G>) -> Self {
        Self::new(objective, Bfgs::new())
    }
}

impl<T, F, G> Optimizer<T, F, G, Dfp<T>>
where
    T: Real,
    F: ValueFunction<T>,
    G: Gradient<T>,
{
    pub fn dfp(objective: Objective<T, F, G>) -> Self {
        Self::new(objective, Dfp::new())
    }
}

impl<T, F, G, H> Optimizer<T, F, G, H>
where
    T: Real,
    F: ValueFunction<T>,
    G: Gradient<T>,
    H: HessianModel<T>,
{
    pub fn new(objective: Objective<T, F, G>, model: H) -> Self {
        Self {
            objective,
            model,
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

    pub fn objective(&self) -> &Objective<T, F, G> {
        &self.objective
    }

    pub fn objective_mut(&mut self) -> &mut Objective<T, F, G> {
        &mut self.objective
    }

    pub fn model(&self) -> &H {
        &self.model
    }

    /// Status of the last (or running) solve.
    pub fn status(&self) -> &Status<T> {
        &self.status
    }

    /// Minimizes from the starting point in `x`, leaving the final iterate
    /// there.
    ///
    /// Running out of iterations is reported through the result's
    /// `termination`, not as an error. Errors are reserved for invalid
    /// configuration, missing derivatives, singular Hessians and
    /// non-finite iterates.
    pub fn solve(&mut self, x: &mut Array1<T>) -> Result<OptimizerResult<T>, SolverError> {
        self.options.validate()?;
        self.linesearch.validate()?;
        let n = x.len();
        if n == 0 {
            return Err(SolverError::invalid("the starting point is empty"));
        }
        let method = self.model.name();
        let opts = self.options;

        self.objective.clear_cache();
        self.status.clear();

        if !all_finite(x) {
            return Err(SolverError::NonFiniteIterate {
                iteration: 0,
                quantity: Quantity::X,
            });
        }
        let mut f = self.objective.value_cached(x);
        if !f.is_finite() {
            return Err(SolverError::NonFiniteIterate {
                iteration: 0,
                quantity: Quantity::F,
            });
        }
        let g0_norm = norm(self.objective.gradient_cached(x)?);
        if !g0_norm.is_finite() {
            return Err(SolverError::NonFiniteIterate {
                iteration: 0,
                quantity: Quantity::G,
            });
        }

        self.status.rg = Some(g0_norm);
        if opts.min_iterations == 0 && g0_norm <= opts.g_restol {
            self.status.g_converged = true;
            return self.finish(x, f, Termination::Converged);
        }

        self.model.initialize(&mut self.objective, x)?;
        let mut cache = NewtonCache::new(n);

        let termination = loop {
            self.status.iteration += 1;
            let iteration = self.status.iteration;
            if iteration > 1 {
                self.model.update(&mut self.objective, x)?;
            }

            let model = &self.model;
            let g = self.objective.gradient_cached(x)?;
            cache.update(x, g, |delta, rhs| model.solve_into(delta, rhs))?;

            let f_prev = f;
            let outcome = self.linesearch.search(&mut ObjectiveLine {
                objective: &mut self.objective,
                cache: &mut cache,
            })?;
            if !outcome.converged {
                log::debug!(
                    "[{method}] {} linesearch did not satisfy its acceptance test; taking α = {}.",
                    self.linesearch.name(),
                    outcome.alpha
                );
            }

            x.assign(cache.trial(outcome.alpha));
            f = self.objective.value_cached(x);
            let g = self.objective.gradient_cached(x)?;
            self.status.update_optimizer(x, &cache.x_prev, f, f_prev, g);
            self.status.record_linesearch(outcome.converged);
            self.status.assess_convergence(&opts);

            if opts.verbosity >= 2 {
                log::info!(
                    "[{method}] iter {iteration:>4}: f = {f:e}, ‖g‖ = {:e}, ‖Δx‖ = {:e}, α = {:e}",
                    self.status.rg.unwrap_or_else(T::nan),
                    self.status.rxa.unwrap_or_else(T::nan),
                    outcome.alpha,
                );
            }
            if opts.verbosity >= 1 && iteration == opts.warn_iterations && !self.status.converged() {
                log::warn!(
                    "[{method}] {iteration} iterations without convergence (‖g‖ = {:e}).",
                    self.status.rg.unwrap_or_else(T::nan)
                );
            }

            if let Some(reason) = self.status.termination(&opts)? {
                break reason;
            }
        };

        self.finish(x, f, termination)
    }

    fn finish(
        &mut self,
        x: &Array1<T>,
        f: T,
        termination: Termination,
    ) -> Result<OptimizerResult<T>, SolverError> {
        let gradient = self.objective.gradient_cached(x)?.clone();
        let result = OptimizerResult {
            x: x.clone(),
            value: f,
            gradient,
            status: self.status.clone(),
            converged: termination == Termination::Converged,
            termination,
            f_calls: self.objective.f_calls(),
            g_calls: self.objective.g_calls(),
            method: self.model.name(),
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
    use crate::gradient::GradientExact;
    use crate::hessian::HessianExact;
    use ndarray::{Array2, array};
    use spectral::prelude::*;

    fn quadratic(x: &Array1<f64>) -> f64 {
        // ½xᵀHx − bᵀx with H = [[4, 1], [1, 3]], b = [1, 2].
        0.5 * (4.0 * x[0] * x[0] + 2.0 * x[0] * x[1] + 3.0 * x[1] * x[1]) - x[0] - 2.0 * x[1]
    }

    fn quadratic_grad(g: &mut Array1<f64>, x: &Array1<f64>) {
        g[0] = 4.0 * x[0] + x[1] - 1.0;
        g[1] = x[0] + 3.0 * x[1] - 2.0;
    }

    fn quadratic_hess(h: &mut Array2<f64>, _: &Array1<f64>) {
        h.assign(&array![[4.0, 1.0], [1.0, 3.0]]);
    }

    fn objective() -> Objective<
        f64,
        fn(&Array1<f64>) -> f64,
        GradientExact<fn(&mut Array1<f64>, &Array1<f64>)>,
    > {
        Objective::new(
            quadratic as fn(&Array1<f64>) -> f64,
            GradientExact::new(2, quadratic_grad as fn(&mut Array1<f64>, &Array1<f64>)),
        )
    }

    fn hessian() -> HessianExact<fn(&mut Array2<f64>, &Array1<f64>)> {
        HessianExact::new(2, quadratic_hess as fn(&mut Array2<f64>, &Array1<f64>))
    }

    // --- Newton on a quadratic ---

    #[test]
    fn test_newton_solves_quadratic_in_one_iteration_with_every_linesearch() {
        // H⁻¹b = [1/11, 7/11].
        for ls in [
            Linesearch::fixed(1.0),
            Linesearch::bisection(),
            Linesearch::backtracking(),
            Linesearch::quadratic(),
        ] {
            let mut x = array![3.0, -4.0];
            let result = Optimizer::newton(objective(), hessian())
                .with_linesearch(ls)
                .solve(&mut x)
                .unwrap();
            assert!(result.converged, "{}", ls.name());
            assert_eq!(result.iterations(), 1, "{}", ls.name());
            assert_that!(&x[0]).is_close_to(1.0 / 11.0, 1e-12);
            assert_that!(&x[1]).is_close_to(7.0 / 11.0, 1e-12);
        }
    }

    #[test]
    fn test_starting_at_the_minimum_takes_no_iterations() {
        let mut x = array![1.0 / 11.0, 7.0 / 11.0];
        let result = Optimizer::bfgs(objective()).solve(&mut x).unwrap();
        assert_eq!(result.iterations(), 0);
        assert_eq!(result.termination, Termination::Converged);
        assert!(result.status.g_converged);
    }

    #[test]
    fn test_min_iterations_forces_work() {
        let mut x = array![1.0 / 11.0, 7.0 / 11.0];
        let result = Optimizer::bfgs(objective())
            .with_options(Options::default().with_min_iterations(2))
            .solve(&mut x)
            .unwrap();
        assert!(result.iterations() >= 2);
    }

    // --- Quasi-Newton ---

    #[test]
    fn test_quasi_newton_methods_converge_on_quadratic() {
        for method in ["BFGS", "DFP"] {
            let mut x = array![3.0, -4.0];
            let result = match method {
                "BFGS" => Optimizer::bfgs(objective()).solve(&mut x).unwrap(),
                _ => Optimizer::dfp(objective()).solve(&mut x).unwrap(),
            };
            assert!(result.converged, "{method}");
            assert_eq!(result.method, method);
            assert_that!(&x[0]).is_close_to(1.0 / 11.0, 1e-7);
            assert_that!(&x[1]).is_close_to(7.0 / 11.0, 1e-7);
        }
    }

    #[test]
    fn test_evaluations_are_not_repeated() {
        let mut x = array![3.0, -4.0];
        let mut opt = Optimizer::newton(objective(), hessian()).with_linesearch(Linesearch::backtracking());
        let result = opt.solve(&mut x).unwrap();
        // f(x₀), f(x₁); ∇f(x₀), ∇f(x₁).
        assert_eq!(result.f_calls, 2);
        assert_eq!(result.g_calls, 2);
    }

    // --- Termination ---

    #[test]
    fn test_iteration_budget_is_not_an_error() {
        // Rosenbrock needs far more than three iterations.
        let objective = Objective::new(
            |x: &Array1<f64>| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2),
            GradientExact::new(2, |g: &mut Array1<f64>, x: &Array1<f64>| {
                g[0] = -2.0 * (1.0 - x[0]) - 400.0 * x[0] * (x[1] - x[0] * x[0]);
                g[1] = 200.0 * (x[1] - x[0] * x[0]);
            }),
        );
        let mut x = array![-1.2, 1.0];
        let result = Optimizer::bfgs(objective)
            .with_options(Options::default().with_max_iterations(3))
            .solve(&mut x)
            .unwrap();
        assert!(!result.converged);
        assert_eq!(result.termination, Termination::MaxIterations);
        assert_eq!(result.iterations(), 3);
    }

    #[test]
    fn test_ascent_step_is_not_reported_as_convergence() {
        // x⁴ − x² is concave at 0.1, so the Newton step climbs towards the maximum at 0.
        let objective = Objective::new(
            |x: &Array1<f64>| x[0].powi(4) - x[0] * x[0],
            GradientExact::new(1, |g: &mut Array1<f64>, x: &Array1<f64>| {
                g[0] = 4.0 * x[0].powi(3) - 2.0 * x[0];
            }),
        );
        let hessian = HessianExact::new(1, |h: &mut Array2<f64>, x: &Array1<f64>| {
            h[[0, 0]] = 12.0 * x[0] * x[0] - 2.0;
        });
        let mut x = array![0.1];
        let result = Optimizer::newton(objective, hessian).solve(&mut x).unwrap();
        assert!(!result.converged);
        assert_eq!(result.termination, Termination::LinesearchFailed);
        assert_that!(&x[0]).is_close_to(0.1, 1e-12);
    }

    #[test]
    fn test_fixed_step_that_does_not_descend_is_a_failure() {
        let objective = Objective::new(
            |x: &Array1<f64>| x.dot(x),
            GradientExact::new(3, |g: &mut Array1<f64>, x: &Array1<f64>| {
                g.assign(&(x * 2.0));
            }),
        );
        let mut x = array![1.0, 0.0, 0.0];
        let result = Optimizer::bfgs(objective)
            .with_linesearch(Linesearch::fixed(1.0))
            .solve(&mut x)
            .unwrap();
        assert!(!result.converged);
        assert_eq!(result.termination, Termination::LinesearchFailed);
        assert_eq!(x, array![-1.0, 0.0, 0.0]);
    }

    std::thread_local! {
        static STALL_WARNINGS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
    }

    /// Counts the stall warnings logged on the current test thread.
    struct StallCounter;

    impl log::Log for StallCounter {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::Level::Warn
        }

        fn log(&self, record: &log::Record) {
            if record.args().to_string().contains("without convergence") {
                STALL_WARNINGS.with(|n| n.set(n.get() + 1));
            }
        }

        fn flush(&self) {}
    }

    static STALL_COUNTER: StallCounter = StallCounter;

    #[test]
    fn test_stall_warning_respects_verbosity() {
        let _ = log::set_logger(&STALL_COUNTER);
        log::set_max_level(log::LevelFilter::Warn);
        let rosenbrock = || {
            Objective::new(
                |x: &Array1<f64>| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2),
                GradientExact::new(2, |g: &mut Array1<f64>, x: &Array1<f64>| {
                    g[0] = -2.0 * (1.0 - x[0]) - 400.0 * x[0] * (x[1] - x[0] * x[0]);
                    g[1] = 200.0 * (x[1] - x[0] * x[0]);
                }),
            )
        };
        let run = |verbosity: u8| {
            let mut x = array![-1.2, 1.0];
            let options = Options::default()
                .with_max_iterations(3)
                .with_warn_iterations(2)
                .with_verbosity(verbosity);
            STALL_WARNINGS.with(|n| n.set(0));
            Optimizer::bfgs(rosenbrock()).with_options(options).solve(&mut x).unwrap();
            STALL_WARNINGS.with(|n| n.get())
        };
        assert_eq!(run(0), 0);
        assert_eq!(run(1), 1);
    }

    #[test]
    fn test_non_finite_start_is_rejected() {
        let mut x = array![f64::NAN, 0.0];
        assert!(matches!(
            Optimizer::bfgs(objective()).solve(&mut x),
            Err(SolverError::NonFiniteIterate { iteration: 0, quantity: Quantity::X })
        ));
    }

    #[test]
    fn test_missing_gradient_is_reported() {
        let mut x = array![1.0];
        let err = Optimizer::bfgs(Objective::value_only(|x: &Array1<f64>| x[0] * x[0]))
            .solve(&mut x)
            .unwrap_err();
        assert_eq!(err, SolverError::DerivativeNotImplemented { kind: "gradient" });
    }

    #[test]
    fn test_invalid_linesearch_is_rejected() {
        let mut x = array![1.0, 1.0];
        let err = Optimizer::bfgs(objective())
            .with_linesearch(Linesearch::fixed(-1.0))
            .solve(&mut x)
            .unwrap_err();
        assert!(matches!(err, SolverError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_result_summary_line() {
        let mut x = array![3.0, -4.0];
        let result = Optimizer::newton(objective(), hessian())
            .with_options(Options::default().with_verbosity(0))
            .solve(&mut x)
            .unwrap();
        let line = result.to_string();
        assert!(line.starts_with("Newton with Backtracking: converged after 1 iterations"));
    }
}
