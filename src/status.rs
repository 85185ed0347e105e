//! Per-iteration residuals and the stopping rule.

use ndarray::Array1;

use crate::error::{Quantity, SolverError};
use crate::numeric::{Real, all_finite, distance, norm};
use crate::options::Options;
use crate::result::Termination;

/// Residuals of the last accepted iteration and the flags derived from them.
///
/// Residuals are `None` until the first update (and after [`Status::clear`]).
/// A status changes only through `update_*`, [`Status::record_linesearch`]
/// and [`Status::assess_convergence`], once per accepted iteration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Status<T> {
    pub iteration: usize,
    /// `‖x − x̄‖`.
    pub rxa: Option<T>,
    /// `‖x − x̄‖/‖x‖`.
    pub rxr: Option<T>,
    /// `|f − f̄|` for optimizers, `‖F(x)‖` for solvers.
    pub rfa: Option<T>,
    /// `|f − f̄|/|f|` for optimizers, `‖F(x)‖/‖F(x₀)‖` for solvers.
    pub rfr: Option<T>,
    /// `‖∇f(x)‖`; optimizers only.
    pub rg: Option<T>,
    pub x_converged: bool,
    pub f_converged: bool,
    pub g_converged: bool,
    pub f_increased: bool,
    /// The last step failed its linesearch acceptance test.
    pub linesearch_failed: bool,
    pub x_isnan: bool,
    pub f_isnan: bool,
    pub g_isnan: bool,
}

impl<T> Default for Status<T> {
    fn default() -> Self {
        Self {
            iteration: 0,
            rxa: None,
            rxr: None,
            rfa: None,
            rfr: None,
            rg: None,
            x_converged: false,
            f_converged: false,
            g_converged: false,
            f_increased: false,
            linesearch_failed: false,
            x_isnan: false,
            f_isnan: false,
            g_isnan: false,
        }
    }
}

fn at_most<T: Real>(residual: Option<T>, tol: T) -> bool {
    matches!(residual, Some(r) if r <= tol)
}

fn above<T: Real>(residual: Option<T>, threshold: Option<T>) -> bool {
    matches!((residual, threshold), (Some(r), Some(t)) if r > t)
}

impl<T: Real> Status<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to the freshly constructed state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Residuals of an optimizer step from `(x̄, f̄)` to `(x, f)` with gradient `g`.
    pub fn update_optimizer(
        &mut self,
        x: &Array1<T>,
        x_prev: &Array1<T>,
        f: T,
        f_prev: T,
        g: &Array1<T>,
    ) {
        let rxa = distance(x, x_prev);
        let rfa = (f - f_prev).abs();
        self.rxa = Some(rxa);
        self.rxr = Some(rxa / norm(x));
        self.rfa = Some(rfa);
        self.rfr = Some(rfa / f.abs());
        self.rg = Some(norm(g));
        self.f_increased = f > f_prev;
        self.x_isnan = !all_finite(x);
        self.f_isnan = !f.is_finite();
        self.g_isnan = !all_finite(g);
    }

    /// Residuals of a solver step from `x̄` to `x`, where `fx` is `F(x)`,
    /// `fx_prev_norm` is `‖F(x̄)‖` and `fx0_norm` is `‖F(x₀)‖`.
    pub fn update_solver(
        &mut self,
        x: &Array1<T>,
        x_prev: &Array1<T>,
        fx: &Array1<T>,
        fx_prev_norm: T,
        fx0_norm: T,
    ) {
        let rxa = distance(x, x_prev);
        let rfa = norm(fx);
        self.rxa = Some(rxa);
        self.rxr = Some(rxa / norm(x));
        self.rfa = Some(rfa);
        self.rfr = Some(rfa / fx0_norm);
        self.rg = None;
        self.f_increased = rfa > fx_prev_norm;
        self.x_isnan = !all_finite(x);
        self.f_isnan = !all_finite(fx);
        self.g_isnan = false;
    }

    /// Records whether the linesearch accepted the last step.
    pub fn record_linesearch(&mut self, converged: bool) {
        self.linesearch_failed = !converged;
    }

    /// Sets the convergence flags from the residuals.
    ///
    /// `x` converges on either of its tolerances, `f` likewise, and the
    /// gradient on `g_restol`. Missing residuals never converge.
    pub fn assess_convergence(&mut self, options: &Options<T>) {
        self.x_converged = at_most(self.rxa, options.x_abstol) || at_most(self.rxr, options.x_reltol);
        self.f_converged = at_most(self.rfa, options.f_abstol) || at_most(self.rfr, options.f_reltol);
        self.g_converged = at_most(self.rg, options.g_restol);
    }

    /// Whether any quantity has converged.
    pub fn converged(&self) -> bool {
        self.x_converged || self.f_converged || self.g_converged
    }

    /// Whether the residual itself converged: `‖∇f‖` for optimizers,
    /// `‖F‖` for solvers (which carry no gradient residual).
    pub fn residual_converged(&self) -> bool {
        match self.rg {
            Some(_) => self.g_converged,
            None => self.f_converged,
        }
    }

    /// Whether a residual went above its break threshold.
    pub fn break_threshold_exceeded(&self, options: &Options<T>) -> bool {
        above(self.rxa, options.x_abstol_break)
            || above(self.rxr, options.x_reltol_break)
            || above(self.rfa, options.f_abstol_break)
            || above(self.rfr, options.f_reltol_break)
            || above(self.rg, options.g_restol_break)
    }

    /// Reason to stop now, if any. Pure in `self` and `options`.
    ///
    /// Fails with [`SolverError::NonFiniteIterate`] when `x`, `f` or `g`
    /// was flagged non-finite by the last update. Step-size convergence on a
    /// step the linesearch rejected stops with
    /// [`Termination::LinesearchFailed`] unless the residual converged too.
    pub fn termination(&self, options: &Options<T>) -> Result<Option<Termination>, SolverError> {
        for (flag, quantity) in [
            (self.x_isnan, Quantity::X),
            (self.f_isnan, Quantity::F),
            (self.g_isnan, Quantity::G),
        ] {
            if flag {
                return Err(SolverError::NonFiniteIterate {
                    iteration: self.iteration,
                    quantity,
                });
            }
        }

        let reason = if self.converged() && self.iteration >= options.min_iterations {
            if self.linesearch_failed && !self.residual_converged() {
                Some(Termination::LinesearchFailed)
            } else {
                Some(Termination::Converged)
            }
        } else if self.break_threshold_exceeded(options) {
            Some(Termination::BreakThreshold)
        } else if self.f_increased && !options.allow_f_increases {
            Some(Termination::FIncreased)
        } else if self.iteration >= options.max_iterations {
            Some(Termination::MaxIterations)
        } else {
            None
        };
        Ok(reason)
    }

    /// Whether the solve should stop after this iteration.
    pub fn meets_stopping_criteria(&self, options: &Options<T>) -> Result<bool, SolverError> {
        Ok(self.termination(options)?.is_some())
    }
}
