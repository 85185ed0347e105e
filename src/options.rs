use crate::error::SolverError;
use crate::numeric::Real;

/// Tolerances and iteration limits of a solve.
///
/// Built once (usually through the `with_*` methods) and read-only while a
/// solver runs.
///
/// Convergence is soft: a residual at or below its tolerance marks the
/// corresponding quantity converged, but the solver keeps going until
/// `min_iterations` have run. Break thresholds are hard limits: a residual
/// strictly above its `*_break` threshold stops the solve at once.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Options<T> {
    /// `‖x − x̄‖ ≤ x_abstol` marks `x` converged.
    pub x_abstol: T,
    /// `‖x − x̄‖/‖x‖ ≤ x_reltol` marks `x` converged.
    pub x_reltol: T,
    /// Absolute change (optimizers) or size (solvers) of `f`. At the default
    /// of zero an optimizer step that leaves `f` unchanged counts as converged.
    pub f_abstol: T,
    /// Relative change of `f`, or `‖F(x)‖/‖F(x₀)‖` for solvers.
    pub f_reltol: T,
    /// `‖∇f(x)‖ ≤ g_restol` marks the gradient converged.
    pub g_restol: T,
    pub x_abstol_break: Option<T>,
    pub x_reltol_break: Option<T>,
    pub f_abstol_break: Option<T>,
    pub f_reltol_break: Option<T>,
    pub g_restol_break: Option<T>,
    pub min_iterations: usize,
    pub max_iterations: usize,
    /// Iteration count past which a warning is logged if the solve has not
    /// converged yet.
    pub warn_iterations: usize,
    /// When `false`, an iteration that increases `f` stops the solve.
    pub allow_f_increases: bool,
    /// 0 is silent, 1 logs a summary at termination, 2 adds one line per
    /// iteration.
    pub verbosity: u8,
}

impl<T: Real> Default for Options<T> {
    fn default() -> Self {
        let eps = T::epsilon();
        Self {
            x_abstol: T::two() * eps,
            x_reltol: T::two() * eps,
            f_abstol: T::zero(),
            f_reltol: T::two() * eps,
            g_restol: eps.sqrt(),
            x_abstol_break: None,
            x_reltol_break: None,
            f_abstol_break: None,
            f_reltol_break: None,
            g_restol_break: None,
            min_iterations: 0,
            max_iterations: 1000,
            warn_iterations: 1000,
            allow_f_increases: true,
            verbosity: 1,
        }
    }
}

impl<T: Real> Options<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_x_abstol(mut self, tol: T) -> Self {
        self.x_abstol = tol;
        self
    }

    pub fn with_x_reltol(mut self, tol: T) -> Self {
        self.x_reltol = tol;
        self
    }

    pub fn with_f_abstol(mut self, tol: T) -> Self {
        self.f_abstol = tol;
        self
    }

    pub fn with_f_reltol(mut self, tol: T) -> Self {
        self.f_reltol = tol;
        self
    }

    pub fn with_g_restol(mut self, tol: T) -> Self {
        self.g_restol = tol;
        self
    }

    /// Sets the break thresholds for `‖x − x̄‖` and `‖x − x̄‖/‖x‖`.
    pub fn with_x_break(mut self, abstol: Option<T>, reltol: Option<T>) -> Self {
        self.x_abstol_break = abstol;
        self.x_reltol_break = reltol;
        self
    }

    pub fn with_f_break(mut self, abstol: Option<T>, reltol: Option<T>) -> Self {
        self.f_abstol_break = abstol;
        self.f_reltol_break = reltol;
        self
    }

    pub fn with_g_break(mut self, restol: Option<T>) -> Self {
        self.g_restol_break = restol;
        self
    }

    pub fn with_min_iterations(mut self, n: usize) -> Self {
        self.min_iterations = n;
        self
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_warn_iterations(mut self, n: usize) -> Self {
        self.warn_iterations = n;
        self
    }

    pub fn with_allow_f_increases(mut self, allow: bool) -> Self {
        self.allow_f_increases = allow;
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Checks that tolerances are non-negative and the iteration bounds are
    /// consistent.
    pub fn validate(&self) -> Result<(), SolverError> {
        let tolerances = [
            ("x_abstol", Some(self.x_abstol)),
            ("x_reltol", Some(self.x_reltol)),
            ("f_abstol", Some(self.f_abstol)),
            ("f_reltol", Some(self.f_reltol)),
            ("g_restol", Some(self.g_restol)),
            ("x_abstol_break", self.x_abstol_break),
            ("x_reltol_break", self.x_reltol_break),
            ("f_abstol_break", self.f_abstol_break),
            ("f_reltol_break", self.f_reltol_break),
            ("g_restol_break", self.g_restol_break),
        ];
        for (name, value) in tolerances {
            if let Some(v) = value {
                if v.is_nan() || v < T::zero() {
                    return Err(SolverError::invalid(format!(
                        "{name} must be non-negative, got {v}"
                    )));
                }
            }
        }
        if self.min_iterations > self.max_iterations {
            return Err(SolverError::invalid(format!(
                "min_iterations ({}) exceeds max_iterations ({})",
                self.min_iterations, self.max_iterations
            )));
        }
        Ok(())
    }
}
