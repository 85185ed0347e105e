//! Memoized scalar objectives.

use ndarray::Array1;
use num_dual::DualNum;

use crate::derivative::Unavailable;
use crate::error::SolverError;
use crate::function::{Primal, ScalarFunction, ValueFunction};
use crate::gradient::{Gradient, GradientAutodiff, GradientFiniteDifferences};
use crate::numeric::Real;

/// Argument and result of the last forced evaluation.
#[derive(Debug, Clone)]
pub(crate) struct Cached<T, V> {
    pub(crate) x: Array1<T>,
    pub(crate) value: V,
}

/// A scalar objective `f` paired with a gradient provider.
///
/// Three evaluation flavours exist for both the value and the gradient:
///
/// - `value` / `gradient` always evaluate and leave the cache alone,
/// - `value_force` / `gradient_force` always evaluate and store the result
///   together with its argument,
/// - `value_cached` / `gradient_cached` return the stored result when the
///   argument equals the stored one, and force an evaluation otherwise.
///
/// Every evaluation of the underlying function increments `f_calls` or
/// `g_calls`; cache hits do not.
#[derive(Debug, Clone)]
pub struct Objective<T, F, G> {
    f: F,
    gradient: G,
    f_cache: Option<Cached<T, T>>,
    g_cache: Option<Cached<T, Array1<T>>>,
    f_calls: usize,
    g_calls: usize,
}

impl<T, F, G> Objective<T, F, G>
where
    T: Real,
    F: ValueFunction<T>,
    G: Gradient<T>,
{
    pub fn new(f: F, gradient: G) -> Self {
        Self {
            f,
            gradient,
            f_cache: None,
            g_cache: None,
            f_calls: 0,
            g_calls: 0,
        }
    }

    /// Evaluates `f(x)` without touching the cache.
    pub fn value(&mut self, x: &Array1<T>) -> T {
        self.f_calls += 1;
        self.f.call(x)
    }

    /// Evaluates `f(x)` unless `x` is the cached argument.
    pub fn value_cached(&mut self, x: &Array1<T>) -> T {
        self.refresh_value(x, false)
    }

    /// Evaluates `f(x)` and caches it.
    pub fn value_force(&mut self, x: &Array1<T>) -> T {
        self.refresh_value(x, true)
    }

    fn refresh_value(&mut self, x: &Array1<T>, force: bool) -> T {
        let entry = match self.f_cache.take() {
            Some(c) if !force && c.x == *x => c,
            stale => {
                let mut c = match stale {
                    Some(c) if c.x.len() == x.len() => c,
                    _ => Cached {
                        x: Array1::zeros(x.len()),
                        value: T::nan(),
                    },
                };
                self.f_calls += 1;
                c.value = self.f.call(x);
                c.x.assign(x);
                c
            }
        };
        self.f_cache.insert(entry).value
    }

    /// Writes `∇f(x)` into `g` without touching the cache.
    pub fn gradient_into(&mut self, g: &mut Array1<T>, x: &Array1<T>) -> Result<(), SolverError> {
        self.g_calls += 1;
        self.gradient.gradient_into(g, x)
    }

    /// Allocating form of [`Objective::gradient_into`].
    pub fn gradient(&mut self, x: &Array1<T>) -> Result<Array1<T>, SolverError> {
        let mut g = Array1::zeros(x.len());
        self.gradient_into(&mut g, x)?;
        Ok(g)
    }

    /// `∇f(x)`, evaluated only if `x` is not the cached argument.
    pub fn gradient_cached(&mut self, x: &Array1<T>) -> Result<&Array1<T>, SolverError> {
        self.refresh_gradient(x, false)
    }

    /// Evaluates `∇f(x)` and caches it.
    pub fn gradient_force(&mut self, x: &Array1<T>) -> Result<&Array1<T>, SolverError> {
        self.refresh_gradient(x, true)
    }

    fn refresh_gradient(&mut self, x: &Array1<T>, force: bool) -> Result<&Array1<T>, SolverError> {
        let entry = match self.g_cache.take() {
            Some(c) if !force && c.x == *x => c,
            stale => {
                let n = x.len();
                let mut c = match stale {
                    Some(c) if c.x.len() == n => c,
                    _ => Cached {
                        x: Array1::zeros(n),
                        value: Array1::zeros(n),
                    },
                };
                self.g_calls += 1;
                self.gradient.gradient_into(&mut c.value, x)?;
                c.x.assign(x);
                c
            }
        };
        Ok(&self.g_cache.insert(entry).value)
    }

    /// Last cached value, if any.
    pub fn last_value(&self) -> Option<T> {
        self.f_cache.as_ref().map(|c| c.value)
    }

    /// Last cached gradient, if any.
    pub fn last_gradient(&self) -> Option<&Array1<T>> {
        self.g_cache.as_ref().map(|c| &c.value)
    }

    /// Forgets cached values. Counters are kept.
    pub fn clear_cache(&mut self) {
        self.f_cache = None;
        self.g_cache = None;
    }

    pub fn reset_counters(&mut self) {
        self.f_calls = 0;
        self.g_calls = 0;
    }

    pub fn f_calls(&self) -> usize {
        self.f_calls
    }

    pub fn g_calls(&self) -> usize {
        self.g_calls
    }
}

impl<T, F> Objective<T, F, GradientFiniteDifferences<T, F>>
where
    T: Real,
    F: ValueFunction<T> + Clone,
{
    /// Objective whose gradient is taken by central differences of `f`.
    ///
    /// The difference evaluations run on a clone of `f` and are counted in
    /// `g_calls`, not `f_calls`.
    pub fn finite_differences(n: usize, f: F) -> Self {
        let gradient = GradientFiniteDifferences::new(n, f.clone());
        Self::new(f, gradient)
    }
}

impl<T, S> Objective<T, Primal<S>, GradientAutodiff<T, S>>
where
    T: Real + DualNum<T>,
    S: ScalarFunction<T> + Clone,
{
    /// Objective whose gradient comes from forward-mode dual numbers.
    pub fn autodiff(n: usize, func: S) -> Self {
        let gradient = GradientAutodiff::new(n, func.clone());
        Self::new(Primal(func), gradient)
    }
}

impl<T, F> Objective<T, F, Unavailable>
where
    T: Real,
    F: ValueFunction<T>,
{
    /// Objective without a gradient. Gradient requests fail with
    /// [`SolverError::DerivativeNotImplemented`].
    pub fn value_only(f: F) -> Self {
        Self::new(f, Unavailable)
    }
}
