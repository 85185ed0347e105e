//! Secant approximations of the inverse Hessian.
//!
//! Both models keep `Q ≈ H⁻¹` directly, so a direction costs one
//! matrix-vector product and no linear solve. `Q` starts as the identity
//! and is changed by a rank-2 update built from
//!
//! ```text
//! δ = x − x̄        γ = ∇f(x) − ∇f(x̄)
//! ```
//!
//! Whenever a denominator of the update vanishes (or is not finite) the
//! update is skipped and `Q` is left exactly as it was.

use ndarray::linalg::general_mat_vec_mul;
use ndarray::{Array1, Array2, Zip};

use crate::error::{SolverError, ensure_dim};
use crate::function::ValueFunction;
use crate::gradient::Gradient;
use crate::model::HessianModel;
use crate::numeric::Real;
use crate::objective::Objective;

/// State shared by the secant models. Scratch vectors are allocated at
/// `initialize` and reused by every update.
#[derive(Debug, Clone)]
struct SecantState<T> {
    q: Array2<T>,
    x: Array1<T>,
    g: Array1<T>,
    delta: Array1<T>,
    gamma: Array1<T>,
    q_gamma: Array1<T>,
    anchored: bool,
    applied: usize,
    skipped: usize,
}

impl<T: Real> SecantState<T> {
    fn new() -> Self {
        Self {
            q: Array2::zeros((0, 0)),
            x: Array1::zeros(0),
            g: Array1::zeros(0),
            delta: Array1::zeros(0),
            gamma: Array1::zeros(0),
            q_gamma: Array1::zeros(0),
            anchored: false,
            applied: 0,
            skipped: 0,
        }
    }

    fn initialize<F, G>(
        &mut self,
        objective: &mut Objective<T, F, G>,
        x: &Array1<T>,
    ) -> Result<(), SolverError>
    where
        F: ValueFunction<T>,
        G: Gradient<T>,
    {
        let n = x.len();
        if self.x.len() != n {
            self.x = Array1::zeros(n);
            self.g = Array1::zeros(n);
            self.delta = Array1::zeros(n);
            self.gamma = Array1::zeros(n);
            self.q_gamma = Array1::zeros(n);
        }
        self.q = Array2::eye(n);
        self.anchored = false;
        self.applied = 0;
        self.skipped = 0;

        let g = objective.gradient_cached(x)?;
        self.x.assign(x);
        self.g.assign(g);
        self.anchored = true;
        Ok(())
    }

    /// Moves to `x`, filling `delta`, `gamma` and `q_gamma`. Returns
    /// `(δ·γ, γᵀQγ)`.
    fn shift<F, G>(
        &mut self,
        objective: &mut Objective<T, F, G>,
        x: &Array1<T>,
    ) -> Result<(T, T), SolverError>
    where
        F: ValueFunction<T>,
        G: Gradient<T>,
    {
        ensure_dim("secant update", self.x.len(), x.len())?;
        let g_new = objective.gradient_cached(x)?;

        Zip::from(&mut self.delta)
            .and(x)
            .and(&self.x)
            .for_each(|d, &xn, &xo| *d = xn - xo);
        Zip::from(&mut self.gamma)
            .and(g_new)
            .and(&self.g)
            .for_each(|y, &gn, &go| *y = gn - go);
        self.x.assign(x);
        self.g.assign(g_new);

        self.q_gamma.fill(T::zero());
        general_mat_vec_mul(T::one(), &self.q, &self.gamma, T::zero(), &mut self.q_gamma);
        Ok((self.delta.dot(&self.gamma), self.gamma.dot(&self.q_gamma)))
    }

    fn skip(&mut self, model: &str, dg: T, gqg: T) {
        self.skipped += 1;
        log::debug!("[{model}] Skipping update: δ·γ = {dg}, γᵀQγ = {gqg}.");
    }

    fn apply(&self, delta: &mut Array1<T>, rhs: &Array1<T>) -> Result<(), SolverError> {
        ensure_dim("secant direction", self.q.nrows(), rhs.len())?;
        ensure_dim("secant direction", self.q.nrows(), delta.len())?;
        delta.fill(T::zero());
        general_mat_vec_mul(T::one(), &self.q, rhs, T::zero(), delta);
        Ok(())
    }
}

fn usable<T: Real>(v: T) -> bool {
    v.is_finite() && v != T::zero()
}

/// Broyden–Fletcher–Goldfarb–Shanno inverse-Hessian model.
///
/// ```text
/// Q ← Q − (δγᵀQ + Qγδᵀ)/(δ·γ) + (1 + γᵀQγ/(δ·γ))·δδᵀ/(δ·γ)
/// ```
///
/// applied only when `δ·γ ≠ 0`.
#[derive(Debug, Clone)]
pub struct Bfgs<T> {
    state: SecantState<T>,
}

impl<T: Real> Bfgs<T> {
    pub fn new() -> Self {
        Self {
            state: SecantState::new(),
        }
    }

    /// Current approximation of `H⁻¹`.
    pub fn inverse_hessian(&self) -> &Array2<T> {
        &self.state.q
    }

    pub fn updates_applied(&self) -> usize {
        self.state.applied
    }

    pub fn updates_skipped(&self) -> usize {
        self.state.skipped
    }
}

impl<T: Real> Default for Bfgs<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> HessianModel<T> for Bfgs<T> {
    fn initialize<F, G>(
        &mut self,
        objective: &mut Objective<T, F, G>,
        x: &Array1<T>,
    ) -> Result<(), SolverError>
    where
        F: ValueFunction<T>,
        G: Gradient<T>,
    {
        self.state.initialize(objective, x)
    }

    fn update<F, G>(
        &mut self,
        objective: &mut Objective<T, F, G>,
        x: &Array1<T>,
    ) -> Result<(), SolverError>
    where
        F: ValueFunction<T>,
        G: Gradient<T>,
    {
        if !self.state.anchored {
            return self.state.initialize(objective, x);
        }
        let (dg, gqg) = self.state.shift(objective, x)?;
        if !usable(dg) || !gqg.is_finite() {
            self.state.skip("BFGS", dg, gqg);
            return Ok(());
        }

        let SecantState {
            q, delta, q_gamma, ..
        } = &mut self.state;
        let c = (T::one() + gqg / dg) / dg;
        Zip::indexed(q).for_each(|(i, j), qij| {
            let (di, dj) = (delta[i], delta[j]);
            *qij = *qij - (di * q_gamma[j] + q_gamma[i] * dj) / dg + c * di * dj;
        });
        self.state.applied += 1;
        Ok(())
    }

    fn solve_into(&self, delta: &mut Array1<T>, rhs: &Array1<T>) -> Result<(), SolverError> {
        self.state.apply(delta, rhs)
    }

    fn dim(&self) -> usize {
        self.state.x.len()
    }

    fn name(&self) -> &'static str {
        "BFGS"
    }
}

/// Davidon–Fletcher–Powell inverse-Hessian model.
///
/// ```text
/// Q ← Q − Qγγᵀ Q/(γᵀQγ) + δδᵀ/(δ·γ)
/// ```
///
/// applied only when both `δ·γ ≠ 0` and `γᵀQγ ≠ 0`.
#[derive(Debug, Clone)]
pub struct Dfp<T> {
    state: SecantState<T>,
}

impl<T: Real> Dfp<T> {
    pub fn new() -> Self {
        Self {
            state: SecantState::new(),
        }
    }

    pub fn inverse_hessian(&self) -> &Array2<T> {
        &self.state.q
    }

    pub fn updates_applied(&self) -> usize {
        self.state.applied
    }

    pub fn updates_skipped(&self) -> usize {
        self.state.skipped
    }
}

impl<T: Real> Default for Dfp<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> HessianModel<T> for Dfp<T> {
    fn initialize<F, G>(
        &mut self,
        objective: &mut Objective<T, F, G>,
        x: &Array1<T>,
    ) -> Result<(), SolverError>
    where
        F: ValueFunction<T>,
        G: Gradient<T>,
    {
        self.state.initialize(objective, x)
    }

    fn update<F, G>(
        &mut self,
        objective: &mut Objective<T, F, G>,
        x: &Array1<T>,
    ) -> Result<(), SolverError>
    where
        F: ValueFunction<T>,
        G: Gradient<T>,
    {
        if !self.state.anchored {
            return self.state.initialize(objective, x);
        }
        let (dg, gqg) = self.state.shift(objective, x)?;
        if !usable(dg) || !usable(gqg) {
            self.state.skip("DFP", dg, gqg);
            return Ok(());
        }

        let SecantState {
            q, delta, q_gamma, ..
        } = &mut self.state;
        Zip::indexed(q).for_each(|(i, j), qij| {
            *qij = *qij - q_gamma[i] * q_gamma[j] / gqg + delta[i] * delta[j] / dg;
        });
        self.state.applied += 1;
        Ok(())
    }

    fn solve_into(&self, delta: &mut Array1<T>, rhs: &Array1<T>) -> Result<(), SolverError> {
        self.state.apply(delta, rhs)
    }

    fn dim(&self) -> usize {
        self.state.x.len()
    }

    fn name(&self) -> &'static str {
        "DFP"
    }
}
