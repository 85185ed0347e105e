//! Newton and quasi-Newton solvers for unconstrained minimization and
//! square nonlinear systems, with linesearch step control.
//!
//! # Features
//! - Minimization of `f: Rⁿ → R` with three Hessian models: exact Newton
//!   (any [`Hessian`] provider, LU solve), BFGS and DFP (secant updates of
//!   the inverse Hessian, no linear solve). Secant updates are skipped when
//!   the curvature denominators vanish.
//! - Root finding for `F: Rⁿ → Rⁿ` with Newton or a frozen-Jacobian
//!   variant that refactorizes every `k` iterations, globalized by a
//!   linesearch on `½‖F‖²`.
//! - Derivatives from user closures, central finite differences, or
//!   forward-mode dual numbers from `num_dual`, selected at construction.
//! - Static, Backtracking (Armijo), Quadratic/cubic interpolation and
//!   Bisection linesearches. Trial steps with a non-finite objective are
//!   halved instead of accepted.
//! - Memoized objectives with evaluation counters.
//! - Soft convergence tolerances, hard break thresholds and an explicit
//!   [`Termination`] reason. Running out of iterations is a result, not an
//!   error.
//!
//! ## Defaults (key settings)
//! - Tolerances: `x_abstol = x_reltol = f_reltol = 2ε`, `f_abstol = 0`,
//!   `g_restol = √ε`, at most 1000 iterations.
//! - Linesearch: Backtracking with `α₀ = 1`, `c = 1e-4`, `p = 0.5`.
//! - Finite differences: step `ϵ·|xⱼ| + ϵ` with `ϵ = 8√ε`.
//! - Logging through the `log` facade; `verbosity` 1 prints a summary per
//!   solve, 2 adds a line per iteration.
//!
//! # Example
//!
//! Minimize the Rosenbrock function with BFGS, taking the gradient from
//! dual numbers.
//!
//! ```
//! use ndarray::array;
//! use newton_solvers::{Objective, Optimizer, Options, ScalarFunction};
//! use num_dual::DualNum;
//!
//! #[derive(Clone)]
//! struct Rosenbrock;
//!
//! impl ScalarFunction<f64> for Rosenbrock {
//!     fn eval<D: DualNum<f64> + Copy>(&self, x: &[D]) -> D {
//!         let a = D::from(1.0) - x[0];
//!         let b = x[1] - x[0] * x[0];
//!         a * a + D::from(100.0) * b * b
//!     }
//! }
//!
//! let mut x = array![-1.2, 1.0];
//! let result = Optimizer::bfgs(Objective::autodiff(2, Rosenbrock))
//!     .with_options(Options::default().with_max_iterations(200))
//!     .solve(&mut x)
//!     .expect("BFGS failed to solve");
//!
//! println!("{result}");
//! assert!(result.converged);
//! assert!((x[0] - 1.0).abs() < 1e-6);
//! assert!((x[1] - 1.0).abs() < 1e-6);
//! ```

mod cache;
mod derivative;
mod error;
mod function;
mod gradient;
mod hessian;
mod jacobian;
mod linalg;
pub mod linesearch;
mod model;
mod numeric;
mod objective;
mod optimizer;
mod options;
mod problem;
mod result;
mod secant;
mod solver;
mod status;

pub use cache::NewtonCache;
pub use derivative::{Unavailable, default_step};
pub use error::{Quantity, SolverError};
pub use function::{Primal, ScalarFunction, SystemFunction, ValueFunction, VectorFunction};
pub use gradient::{Gradient, GradientAutodiff, GradientExact, GradientFiniteDifferences};
pub use hessian::{Hessian, HessianAutodiff, HessianExact, HessianFiniteDifferences};
pub use jacobian::{Jacobian, JacobianAutodiff, JacobianExact, JacobianFiniteDifferences};
pub use linalg::{LinearSolver, LuSolver};
pub use linesearch::{
    BacktrackingConfig, BisectionConfig, LineFn, LineFunction, Linesearch, LinesearchOutcome,
    QuadraticConfig, StaticConfig,
};
pub use model::{HessianModel, NewtonHessian};
pub use numeric::Real;
pub use objective::Objective;
pub use optimizer::{BfgsOptimizer, DfpOptimizer, NewtonOptimizer, Optimizer};
pub use options::Options;
pub use problem::NonlinearProblem;
pub use result::{OptimizerResult, SolverResult, Termination};
pub use secant::{Bfgs, Dfp};
pub use solver::NewtonSolver;
pub use status::Status;
