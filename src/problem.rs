//! Memoized nonlinear systems `F(x) = 0`.

use ndarray::{Array1, Array2};
use num_dual::DualNum;

use crate::derivative::Unavailable;
use crate::error::{SolverError, ensure_dim};
use crate::function::{Primal, SystemFunction, VectorFunction};
use crate::jacobian::{Jacobian, JacobianAutodiff, JacobianFiniteDifferences};
use crate::numeric::Real;
use crate::objective::Cached;

/// A square system `F: Rⁿ → Rⁿ` with a Jacobian provider and a parameter
/// context passed to both.
///
/// Caching follows [`crate::Objective`]: plain, `_force` and `_cached`
/// flavours, with `f_calls` and `j_calls` counting real evaluations.
#[derive(Debug, Clone)]
pub struct NonlinearProblem<T, P, F, J> {
    f: F,
    jacobian: J,
    params: P,
    n: usize,
    f_cache: Option<Cached<T, Array1<T>>>,
    j_cache: Option<Cached<T, Array2<T>>>,
    f_calls: usize,
    j_calls: usize,
}

impl<T, P, F, J> NonlinearProblem<T, P, F, J>
where
    T: Real,
    F: SystemFunction<T, P>,
    J: Jacobian<T, P>,
{
    pub fn new(n: usize, f: F, jacobian: J, params: P) -> Self {
        Self {
            f,
            jacobian,
            params,
            n,
            f_cache: None,
            j_cache: None,
            f_calls: 0,
            j_calls: 0,
        }
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    /// Writes `F(x)` into `y` without touching the cache.
    pub fn value_into(&mut self, y: &mut Array1<T>, x: &Array1<T>) -> Result<(), SolverError> {
        ensure_dim("system input", self.n, x.len())?;
        ensure_dim("system output", self.n, y.len())?;
        self.f_calls += 1;
        self.f.call(y, x, &self.params);
        Ok(())
    }

    /// Allocating form of [`NonlinearProblem::value_into`].
    pub fn value(&mut self, x: &Array1<T>) -> Result<Array1<T>, SolverError> {
        let mut y = Array1::zeros(self.n);
        self.value_into(&mut y, x)?;
        Ok(y)
    }

    /// `F(x)`, evaluated only if `x` is not the cached argument.
    pub fn value_cached(&mut self, x: &Array1<T>) -> Result<&Array1<T>, SolverError> {
        self.refresh_value(x, false)
    }

    /// Evaluates `F(x)` and caches it.
    pub fn value_force(&mut self, x: &Array1<T>) -> Result<&Array1<T>, SolverError> {
        self.refresh_value(x, true)
    }

    fn refresh_value(&mut self, x: &Array1<T>, force: bool) -> Result<&Array1<T>, SolverError> {
        ensure_dim("system input", self.n, x.len())?;
        let n = self.n;
        let entry = match self.f_cache.take() {
            Some(c) if !force && c.x == *x => c,
            stale => {
                let mut c = stale.unwrap_or_else(|| Cached {
                    x: Array1::zeros(n),
                    value: Array1::zeros(n),
                });
                self.f_calls += 1;
                self.f.call(&mut c.value, x, &self.params);
                c.x.assign(x);
                c
            }
        };
        Ok(&self.f_cache.insert(entry).value)
    }

    /// Writes `J(x)` into `j` without touching the cache.
    pub fn jacobian_into(&mut self, j: &mut Array2<T>, x: &Array1<T>) -> Result<(), SolverError> {
        self.j_calls += 1;
        self.jacobian.jacobian_into(j, x, &self.params)
    }

    /// Allocating form of [`NonlinearProblem::jacobian_into`].
    pub fn jacobian(&mut self, x: &Array1<T>) -> Result<Array2<T>, SolverError> {
        let mut j = Array2::zeros((self.n, self.n));
        self.jacobian_into(&mut j, x)?;
        Ok(j)
    }

    /// `J(x)`, evaluated only if `x` is not the cached argument.
    pub fn jacobian_cached(&mut self, x: &Array1<T>) -> Result<&Array2<T>, SolverError> {
        self.refresh_jacobian(x, false)
    }

    /// Evaluates `J(x)` and caches it.
    pub fn jacobian_force(&mut self, x: &Array1<T>) -> Result<&Array2<T>, SolverError> {
        self.refresh_jacobian(x, true)
    }

    fn refresh_jacobian(&mut self, x: &Array1<T>, force: bool) -> Result<&Array2<T>, SolverError> {
        let n = self.n;
        let entry = match self.j_cache.take() {
            Some(c) if !force && c.x == *x => c,
            stale => {
                let mut c = stale.unwrap_or_else(|| Cached {
                    x: Array1::zeros(n),
                    value: Array2::zeros((n, n)),
                });
                self.j_calls += 1;
                self.jacobian.jacobian_into(&mut c.value, x, &self.params)?;
                c.x.assign(x);
                c
            }
        };
        Ok(&self.j_cache.insert(entry).value)
    }

    /// Last cached residual vector, if any.
    pub fn last_value(&self) -> Option<&Array1<T>> {
        self.f_cache.as_ref().map(|c| &c.value)
    }

    pub fn clear_cache(&mut self) {
        self.f_cache = None;
        self.j_cache = None;
    }

    pub fn reset_counters(&mut self) {
        self.f_calls = 0;
        self.j_calls = 0;
    }

    pub fn f_calls(&self) -> usize {
        self.f_calls
    }

    pub fn j_calls(&self) -> usize {
        self.j_calls
    }
}

impl<T, P, F> NonlinearProblem<T, P, F, JacobianFiniteDifferences<T, F>>
where
    T: Real,
    F: SystemFunction<T, P> + Clone,
{
    /// System whose Jacobian is taken by central differences on a clone of `f`.
    pub fn finite_differences(n: usize, f: F, params: P) -> Self {
        let jacobian = JacobianFiniteDifferences::new(n, n, f.clone());
        Self::new(n, f, jacobian, params)
    }
}

impl<T, P, V> NonlinearProblem<T, P, Primal<V>, JacobianAutodiff<T, V>>
where
    T: Real + DualNum<T>,
    V: VectorFunction<T, P> + Clone,
{
    /// System whose Jacobian comes from forward-mode dual numbers.
    pub fn autodiff(n: usize, func: V, params: P) -> Self {
        let jacobian = JacobianAutodiff::new(n, n, func.clone());
        Self::new(n, Primal(func), jacobian, params)
    }
}

impl<T, P, F> NonlinearProblem<T, P, F, Unavailable>
where
    T: Real,
    F: SystemFunction<T, P>,
{
    pub fn value_only(n: usize, f: F, params: P) -> Self {
        Self::new(n, f, Unavailable, params)
    }
}
