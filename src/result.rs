use std::fmt;

use ndarray::Array1;

use crate::numeric::Real;
use crate::status::Status;

/// Why a solve stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Termination {
    /// A convergence test passed after at least `min_iterations`.
    Converged,
    /// `max_iterations` ran out first.
    MaxIterations,
    /// A residual went above its `*_break` threshold.
    BreakThreshold,
    /// `f` increased while increases were disallowed.
    FIncreased,
    /// Only the step-size tests passed, and the step that passed them was
    /// not accepted by the linesearch. The iterate is not a solution.
    LinesearchFailed,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Termination::Converged => "converged",
            Termination::MaxIterations => "maximum iterations reached",
            Termination::BreakThreshold => "break threshold exceeded",
            Termination::FIncreased => "objective increased",
            Termination::LinesearchFailed => "linesearch failed",
        };
        f.write_str(s)
    }
}

/// Outcome of a minimization.
#[derive(Debug, Clone)]
pub struct OptimizerResult<T> {
    /// Final iterate.
    pub x: Array1<T>,
    /// `f(x)`.
    pub value: T,
    /// `∇f(x)`.
    pub gradient: Array1<T>,
    pub status: Status<T>,
    pub converged: bool,
    pub termination: Termination,
    /// Value evaluations by the objective. Gradient evaluations, including
    /// finite-difference ones, are counted in `g_calls`.
    pub f_calls: usize,
    pub g_calls: usize,
    /// Name of the Hessian model ("Newton", "BFGS", "DFP").
    pub method: &'static str,
    /// Name of the linesearch.
    pub linesearch: &'static str,
}

impl<T: Real> OptimizerResult<T> {
    pub fn iterations(&self) -> usize {
        self.status.iteration
    }
}

impl<T: Real> fmt::Display for OptimizerResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} with {}: {} after {} iterations, f = {:e}, ‖g‖ = {:e} ({} f-calls, {} g-calls)",
            self.method,
            self.linesearch,
            self.termination,
            self.status.iteration,
            self.value,
            crate::numeric::norm(&self.gradient),
            self.f_calls,
            self.g_calls,
        )
    }
}

/// Outcome of a nonlinear system solve.
#[derive(Debug, Clone)]
pub struct SolverResult<T> {
    /// Final iterate.
    pub x: Array1<T>,
    /// `F(x)`.
    pub residual: Array1<T>,
    pub status: Status<T>,
    pub converged: bool,
    pub termination: Termination,
    pub f_calls: usize,
    pub j_calls: usize,
    /// "Newton" or "Quasi-Newton".
    pub method: &'static str,
    pub linesearch: &'static str,
}

impl<T: Real> SolverResult<T> {
    pub fn iterations(&self) -> usize {
        self.status.iteration
    }

    /// `‖F(x)‖`.
    pub fn residual_norm(&self) -> T {
        crate::numeric::norm(&self.residual)
    }
}

impl<T: Real> fmt::Display for SolverResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} with {}: {} after {} iterations, ‖F(x)‖ = {:e} ({} F-calls, {} J-calls)",
            self.method,
            self.linesearch,
            self.termination,
            self.status.iteration,
            self.residual_norm(),
            self.f_calls,
            self.j_calls,
        )
    }
}
