use ndarray::Array1;

use crate::error::{SolverError, ensure_dim};
use crate::numeric::{Real, axpy_into};

/// Work vectors of one Newton-type solve.
///
/// After [`NewtonCache::update`], `delta` solves `H·δ = rhs` with
/// `rhs = −g` for whatever `H` the caller's solve closure represents.
/// `x` is scratch for trial points `x̄ + α·δ` during the linesearch.
#[derive(Debug, Clone)]
pub struct NewtonCache<T> {
    /// Iterate the current direction starts from (`x̄`).
    pub x_prev: Array1<T>,
    /// Trial point.
    pub x: Array1<T>,
    /// Search direction.
    pub delta: Array1<T>,
    /// Gradient (or residual vector) at `x_prev`.
    pub g: Array1<T>,
    pub rhs: Array1<T>,
}

impl<T: Real> NewtonCache<T> {
    pub fn new(n: usize) -> Self {
        Self {
            x_prev: Array1::zeros(n),
            x: Array1::zeros(n),
            delta: Array1::zeros(n),
            g: Array1::zeros(n),
            rhs: Array1::zeros(n),
        }
    }

    pub fn dim(&self) -> usize {
        self.x_prev.len()
    }

    /// Anchors the cache at `x` with gradient `g` and computes the direction
    /// through `solve(delta, rhs)`.
    pub fn update<S>(&mut self, x: &Array1<T>, g: &Array1<T>, solve: S) -> Result<(), SolverError>
    where
        S: FnOnce(&mut Array1<T>, &Array1<T>) -> Result<(), SolverError>,
    {
        let n = self.dim();
        ensure_dim("iteration cache (x)", n, x.len())?;
        ensure_dim("iteration cache (g)", n, g.len())?;
        self.x_prev.assign(x);
        self.x.assign(x);
        self.g.assign(g);
        self.rhs.zip_mut_with(g, |r, &gi| *r = -gi);
        solve(&mut self.delta, &self.rhs)
    }

    /// Writes `x̄ + α·δ` into `x` and returns it.
    pub fn trial(&mut self, alpha: T) -> &Array1<T> {
        axpy_into(&mut self.x, &self.x_prev, alpha, &self.delta);
        &self.x
    }

    /// `g·δ`, the directional derivative at `x̄`.
    pub fn slope(&self) -> T {
        self.g.dot(&self.delta)
    }
}
