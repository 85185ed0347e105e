//! Step-length control along a search direction.
//!
//! A linesearch sees the objective only through its restriction to the
//! search ray, `φ(α) = f(x + α·d)` with slope `φ'(α) = ∇f(x + α·d)·d`,
//! supplied by a [`LineFunction`]. Four strategies are available:
//!
//! - [`Linesearch::Static`] takes a fixed step and reports it accepted
//!   only if it lowers `φ`,
//! - [`Linesearch::Backtracking`] shrinks the step geometrically until the
//!   Armijo sufficient-decrease test holds,
//! - [`Linesearch::Quadratic`] shrinks it to the minimizer of a quadratic
//!   (first reduction) or cubic (later reductions) model of `φ`,
//! - [`Linesearch::Bisection`] brackets a zero of `φ'` and bisects it.
//!
//! Trial steps that produce a non-finite `φ` are halved until `φ` becomes
//! finite again or the step underflows below the smallest normal `T`.

use crate::error::SolverError;
use crate::numeric::Real;

/// One-dimensional restriction `φ` of an objective along a direction.
pub trait LineFunction<T: Real> {
    /// `φ(α)`.
    fn value(&mut self, alpha: T) -> Result<T, SolverError>;
    /// `φ'(α)`.
    fn derivative(&mut self, alpha: T) -> Result<T, SolverError>;
}

/// Adapts a pair of closures into a [`LineFunction`].
pub struct LineFn<V, D> {
    pub value: V,
    pub derivative: D,
}

impl<V, D> LineFn<V, D> {
    pub fn new<T: Real>(value: V, derivative: D) -> Self
    where
        V: FnMut(T) -> T,
        D: FnMut(T) -> T,
    {
        Self { value, derivative }
    }
}

impl<T: Real, V, D> LineFunction<T> for LineFn<V, D>
where
    V: FnMut(T) -> T,
    D: FnMut(T) -> T,
{
    fn value(&mut self, alpha: T) -> Result<T, SolverError> {
        Ok((self.value)(alpha))
    }

    fn derivative(&mut self, alpha: T) -> Result<T, SolverError> {
        Ok((self.derivative)(alpha))
    }
}

/// Accepted step of one linesearch call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinesearchOutcome<T> {
    /// Accepted step length.
    pub alpha: T,
    /// `φ(alpha)`.
    pub value: T,
    /// Reductions (or bisections) performed after the first trial.
    pub iterations: usize,
    /// Whether the acceptance test held. When `false` the last trial is
    /// returned anyway.
    pub converged: bool,
}

/// Fixed step.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StaticConfig<T> {
    pub alpha: T,
}

impl<T: Real> Default for StaticConfig<T> {
    fn default() -> Self {
        Self { alpha: T::one() }
    }
}

/// Armijo backtracking: accept `α` once `φ(α) ≤ φ(0) + c·α·φ'(0)`,
/// otherwise `α ← p·α`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BacktrackingConfig<T> {
    pub alpha0: T,
    pub c: T,
    pub p: T,
    pub max_iterations: usize,
}

impl<T: Real> Default for BacktrackingConfig<T> {
    fn default() -> Self {
        Self {
            alpha0: T::one(),
            c: T::cast(1e-4),
            p: T::cast(0.5),
            max_iterations: 100,
        }
    }
}

/// Backtracking with interpolated reductions, clamped to
/// `[sigma0·α, sigma1·α]`. Degenerate fits fall back to `sigma1·α`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QuadraticConfig<T> {
    pub alpha0: T,
    pub c: T,
    pub sigma0: T,
    pub sigma1: T,
    pub max_iterations: usize,
}

impl<T: Real> Default for QuadraticConfig<T> {
    fn default() -> Self {
        Self {
            alpha0: T::one(),
            c: T::cast(1e-4),
            sigma0: T::cast(0.1),
            sigma1: T::cast(0.5),
            max_iterations: 100,
        }
    }
}

/// Bisection on `φ'`.
///
/// Stops once `|φ'(α)| ≤ max(df_abstol, df_reltol·|φ'(0)|)` or the bracket
/// is narrower than `2·x_abstol`. When `φ'(alpha0) < 0` the bracket is first
/// grown by doubling, at most `max_bracket_expansions` times.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BisectionConfig<T> {
    pub alpha0: T,
    pub x_abstol: T,
    pub df_abstol: T,
    pub df_reltol: T,
    pub max_iterations: usize,
    pub max_bracket_expansions: usize,
}

impl<T: Real> Default for BisectionConfig<T> {
    fn default() -> Self {
        Self {
            alpha0: T::one(),
            x_abstol: T::two() * T::epsilon(),
            df_abstol: T::two() * T::epsilon(),
            df_reltol: T::epsilon().sqrt(),
            max_iterations: 100,
            max_bracket_expansions: 30,
        }
    }
}

/// Step-length strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Linesearch<T> {
    Static(StaticConfig<T>),
    Bisection(BisectionConfig<T>),
    Backtracking(BacktrackingConfig<T>),
    /// Interpolating backtracking. Paired with BFGS in `f32` the cubic fit
    /// can lose enough digits to stall short of the tolerances.
    Quadratic(QuadraticConfig<T>),
}

impl<T: Real> Default for Linesearch<T> {
    fn default() -> Self {
        Linesearch::Backtracking(BacktrackingConfig::default())
    }
}

impl<T: Real> Linesearch<T> {
    pub fn fixed(alpha: T) -> Self {
        Linesearch::Static(StaticConfig { alpha })
    }

    pub fn bisection() -> Self {
        Linesearch::Bisection(BisectionConfig::default())
    }

    pub fn backtracking() -> Self {
        Linesearch::Backtracking(BacktrackingConfig::default())
    }

    pub fn quadratic() -> Self {
        Linesearch::Quadratic(QuadraticConfig::default())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Linesearch::Static(_) => "Static",
            Linesearch::Bisection(_) => "Bisection",
            Linesearch::Backtracking(_) => "Backtracking",
            Linesearch::Quadratic(_) => "Quadratic",
        }
    }

    /// Rejects settings under which the search cannot make sense.
    pub fn validate(&self) -> Result<(), SolverError> {
        let positive = |v: T| v.is_finite() && v > T::zero();
        let unit = |v: T| v.is_finite() && v > T::zero() && v < T::one();
        let ok = match self {
            Linesearch::Static(c) => positive(c.alpha),
            Linesearch::Backtracking(c) => positive(c.alpha0) && unit(c.c) && unit(c.p),
            Linesearch::Quadratic(c) => {
                positive(c.alpha0) && unit(c.c) && unit(c.sigma0) && unit(c.sigma1) && c.sigma0 <= c.sigma1
            }
            Linesearch::Bisection(c) => {
                positive(c.alpha0)
                    && c.x_abstol >= T::zero()
                    && c.df_abstol >= T::zero()
                    && c.df_reltol >= T::zero()
            }
        };
        if ok {
            Ok(())
        } else {
            Err(SolverError::invalid(format!("{self:?} has out-of-range parameters")))
        }
    }

    /// Runs the search on `line`.
    pub fn search<L: LineFunction<T>>(
        &self,
        line: &mut L,
    ) -> Result<LinesearchOutcome<T>, SolverError> {
        match self {
            Linesearch::Static(c) => {
                let phi0 = line.value(T::zero())?;
                let (alpha, value) = finite_trial(line, c.alpha)?;
                Ok(LinesearchOutcome {
                    alpha,
                    value,
                    iterations: 0,
                    converged: value < phi0,
                })
            }
            Linesearch::Backtracking(c) => backtracking(line, c),
            Linesearch::Quadratic(c) => interpolating(line, c),
            Linesearch::Bisection(c) => bisection_search(line, c),
        }
    }
}

/// `φ(α)`, halving `α` while the value is not finite.
///
/// Gives up once `α` drops below `T::min_positive_value()`.
fn finite_trial<T: Real, L: LineFunction<T>>(line: &mut L, alpha: T) -> Result<(T, T), SolverError> {
    let half = T::cast(0.5);
    let mut a = alpha;
    let mut attempts = 0;
    loop {
        let v = line.value(a)?;
        if v.is_finite() {
            if attempts > 0 {
                log::debug!(
                    "[Linesearch] Non-finite objective along direction; step reduced to {a:e} after {attempts} halvings."
                );
            }
            return Ok((a, v));
        }
        a = a * half;
        attempts += 1;
        if !(a >= T::min_positive_value()) {
            return Err(SolverError::NonFiniteLinesearch { attempts });
        }
    }
}

/// `φ(0)` and `φ'(0)`; both must be finite.
fn origin<T: Real, L: LineFunction<T>>(line: &mut L) -> Result<(T, T), SolverError> {
    let phi0 = line.value(T::zero())?;
    let dphi0 = line.derivative(T::zero())?;
    if !phi0.is_finite() || !dphi0.is_finite() {
        return Err(SolverError::NonFiniteLinesearch { attempts: 0 });
    }
    if dphi0 >= T::zero() {
        log::warn!("[Linesearch] Not a descent direction (φ'(0) = {dphi0}).");
    }
    Ok((phi0, dphi0))
}

/// Sufficient decrease along a descent direction. An ascent direction never
/// passes, even when the step is too small to change `φ`.
fn armijo<T: Real>(phi: T, phi0: T, c_alpha: T, dphi0: T) -> bool {
    dphi0 < T::zero() && phi <= phi0 + c_alpha * dphi0
}

fn backtracking<T: Real, L: LineFunction<T>>(
    line: &mut L,
    config: &BacktrackingConfig<T>,
) -> Result<LinesearchOutcome<T>, SolverError> {
    let (phi0, dphi0) = origin(line)?;
    let (mut alpha, mut phi) = finite_trial(line, config.alpha0)?;

    for iteration in 0..config.max_iterations {
        if armijo(phi, phi0, config.c * alpha, dphi0) {
            return Ok(LinesearchOutcome {
                alpha,
                value: phi,
                iterations: iteration,
                converged: true,
            });
        }
        (alpha, phi) = finite_trial(line, config.p * alpha)?;
    }

    let converged = armijo(phi, phi0, config.c * alpha, dphi0);
    if !converged {
        log::debug!("[Backtracking] No sufficient decrease after {} reductions.", config.max_iterations);
    }
    Ok(LinesearchOutcome {
        alpha,
        value: phi,
        iterations: config.max_iterations,
        converged,
    })
}

/// Minimizer of the quadratic through `φ(0)`, `φ'(0)` and `φ(α)`.
fn quadratic_step<T: Real>(alpha: T, phi: T, phi0: T, dphi0: T) -> Option<T> {
    let denom = T::two() * (phi - phi0 - dphi0 * alpha);
    if !denom.is_finite() || denom == T::zero() {
        return None;
    }
    let out = -(dphi0 * alpha * alpha) / denom;
    out.is_finite().then_some(out)
}

/// Minimizer of the cubic through `φ(0)`, `φ'(0)`, `φ(α₁)` and `φ(α₂)`.
fn cubic_step<T: Real>(alpha1: T, phi1: T, alpha2: T, phi2: T, phi0: T, dphi0: T) -> Option<T> {
    let d1 = phi1 - phi0 - dphi0 * alpha1;
    let d2 = phi2 - phi0 - dphi0 * alpha2;
    let denom = alpha1 * alpha1 * alpha2 * alpha2 * (alpha2 - alpha1);
    if !denom.is_finite() || denom == T::zero() {
        return None;
    }
    let a = (alpha1 * alpha1 * d2 - alpha2 * alpha2 * d1) / denom;
    let b = (-alpha1 * alpha1 * alpha1 * d2 + alpha2 * alpha2 * alpha2 * d1) / denom;
    if !a.is_finite() || !b.is_finite() {
        return None;
    }

    if a.abs() <= T::epsilon() {
        let denom_b = T::two() * b;
        if denom_b == T::zero() || !denom_b.is_finite() {
            return None;
        }
        let out = -dphi0 / denom_b;
        return out.is_finite().then_some(out);
    }

    let three = T::cast(3.0);
    let disc = (b * b - three * a * dphi0).max(T::zero());
    let out = (-b + disc.sqrt()) / (three * a);
    out.is_finite().then_some(out)
}

fn interpolating<T: Real, L: LineFunction<T>>(
    line: &mut L,
    config: &QuadraticConfig<T>,
) -> Result<LinesearchOutcome<T>, SolverError> {
    let (phi0, dphi0) = origin(line)?;
    let (mut alpha, mut phi) = finite_trial(line, config.alpha0)?;
    let mut previous: Option<(T, T)> = None;

    for iteration in 0..config.max_iterations {
        if armijo(phi, phi0, config.c * alpha, dphi0) {
            return Ok(LinesearchOutcome {
                alpha,
                value: phi,
                iterations: iteration,
                converged: true,
            });
        }

        let model = match previous {
            None => quadratic_step(alpha, phi, phi0, dphi0),
            Some((alpha_prev, phi_prev)) => {
                cubic_step(alpha, phi, alpha_prev, phi_prev, phi0, dphi0)
            }
        };
        let lo = config.sigma0 * alpha;
        let hi = config.sigma1 * alpha;
        let next = model.unwrap_or(hi).max(lo).min(hi);

        previous = Some((alpha, phi));
        (alpha, phi) = finite_trial(line, next)?;
    }

    let converged = armijo(phi, phi0, config.c * alpha, dphi0);
    Ok(LinesearchOutcome {
        alpha,
        value: phi,
        iterations: config.max_iterations,
        converged,
    })
}

fn bisection_search<T: Real, L: LineFunction<T>>(
    line: &mut L,
    config: &BisectionConfig<T>,
) -> Result<LinesearchOutcome<T>, SolverError> {
    let (_, dphi0) = origin(line)?;
    let tol = config.df_abstol.max(config.df_reltol * dphi0.abs());

    let (alpha0, phi_alpha0) = finite_trial(line, config.alpha0)?;
    let d_alpha0 = line.derivative(alpha0)?;
    if d_alpha0.is_finite() && d_alpha0.abs() <= tol {
        return Ok(LinesearchOutcome {
            alpha: alpha0,
            value: phi_alpha0,
            iterations: 0,
            converged: dphi0 < T::zero(),
        });
    }

    // Find [lo, hi] with φ'(lo) < 0 ≤ φ'(hi).
    let (mut lo, mut d_lo) = (T::zero(), dphi0);
    let mut hi = alpha0;
    if d_alpha0.is_finite() && d_alpha0 < T::zero() {
        (lo, d_lo) = (alpha0, d_alpha0);
        let mut expansions = 0;
        loop {
            if expansions == config.max_bracket_expansions {
                log::debug!("[Bisection] No sign change of φ' found; taking the largest step tried.");
                let value = line.value(hi)?;
                return Ok(LinesearchOutcome {
                    alpha: hi,
                    value,
                    iterations: expansions,
                    converged: false,
                });
            }
            expansions += 1;
            hi = hi * T::two();
            let d_hi = line.derivative(hi)?;
            if !d_hi.is_finite() || d_hi >= T::zero() {
                break;
            }
            (lo, d_lo) = (hi, d_hi);
        }
    }

    let root = bisect(
        |a| line.derivative(a),
        lo,
        d_lo,
        hi,
        tol,
        config.x_abstol,
        config.max_iterations,
    )?;
    let (alpha, value) = finite_trial(line, root.x)?;
    Ok(LinesearchOutcome {
        alpha,
        value,
        iterations: root.iterations,
        converged: root.converged && dphi0 < T::zero(),
    })
}

/// Result of a scalar root search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootOutcome<T> {
    pub x: T,
    pub fx: T,
    pub iterations: usize,
    pub converged: bool,
}

/// Bisection on `[lo, hi]`, given `f(lo)`. A non-finite `f` at a midpoint
/// is treated like an overshoot and moves `hi` down.
fn bisect<T: Real>(
    mut f: impl FnMut(T) -> Result<T, SolverError>,
    mut lo: T,
    mut f_lo: T,
    mut hi: T,
    f_tol: T,
    x_tol: T,
    max_iterations: usize,
) -> Result<RootOutcome<T>, SolverError> {
    let half = T::cast(0.5);
    let mut mid = lo + half * (hi - lo);
    let mut f_mid = T::nan();
    for iteration in 1..=max_iterations {
        mid = lo + half * (hi - lo);
        f_mid = f(mid)?;
        if !f_mid.is_finite() {
            hi = mid;
            continue;
        }
        if f_mid.abs() <= f_tol || half * (hi - lo) <= x_tol {
            return Ok(RootOutcome {
                x: mid,
                fx: f_mid,
                iterations: iteration,
                converged: true,
            });
        }
        if (f_mid < T::zero()) == (f_lo < T::zero()) {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }
    Ok(RootOutcome {
        x: mid,
        fx: f_mid,
        iterations: max_iterations,
        converged: false,
    })
}

/// Finds a root of `f` in `[a, b]` by bisection.
///
/// Uses `x_abstol`, `df_abstol` and `max_iterations` from `config`. The
/// endpoints must have opposite signs.
pub fn bisection<T: Real>(
    mut f: impl FnMut(T) -> T,
    a: T,
    b: T,
    config: &BisectionConfig<T>,
) -> Result<RootOutcome<T>, SolverError> {
    let (fa, fb) = (f(a), f(b));
    for (x, fx) in [(a, fa), (b, fb)] {
        if fx == T::zero() {
            return Ok(RootOutcome {
                x,
                fx,
                iterations: 0,
                converged: true,
            });
        }
    }
    if !(fa.is_finite() && fb.is_finite()) || (fa < T::zero()) == (fb < T::zero()) {
        return Err(SolverError::invalid(format!(
            "bisection needs a sign change on [{a}, {b}], got f = {fa} and {fb}"
        )));
    }
    bisect(
        |x| Ok(f(x)),
        a,
        fa,
        b,
        config.df_abstol,
        config.x_abstol,
        config.max_iterations,
    )
}

/// Brackets a local minimum of `f` starting from `x0` with initial `step`.
///
/// Returns `(a, b, c)` with `a < b < c` and `f(b) ≤ min(f(a), f(c))`, or
/// `None` if no bracket is found within `max_expansions` step doublings.
pub fn bracket_minimum<T: Real>(
    mut f: impl FnMut(T) -> T,
    x0: T,
    step: T,
    max_expansions: usize,
) -> Option<(T, T, T)> {
    if step == T::zero() || !step.is_finite() {
        return None;
    }
    let (f0, f1) = (f(x0), f(x0 + step));
    let (mut a, mut b, mut fb) = if f1 > f0 {
        (x0 + step, x0, f0)
    } else {
        (x0, x0 + step, f1)
    };
    let mut c = b + T::two() * (b - a);
    let mut fc = f(c);
    for _ in 0..max_expansions {
        if fc >= fb {
            return Some(if a < c { (a, b, c) } else { (c, b, a) });
        }
        (a, b, fb) = (b, c, fc);
        c = b + T::two() * (b - a);
        fc = f(c);
    }
    None
}
