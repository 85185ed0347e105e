//! Dense linear solves for Newton directions.

use ndarray::{Array1, Array2};

use crate::error::{SolverError, ensure_dim};
use crate::numeric::Real;

/// Factor-once, solve-many back end for `A·x = b`.
pub trait LinearSolver<T: Real> {
    /// Factorizes `a`, replacing any previous factorization.
    fn factorize(&mut self, a: &Array2<T>) -> Result<(), SolverError>;

    /// Solves `A·x = b` against the current factorization, writing `x` into `out`.
    fn solve_into(&self, out: &mut Array1<T>, b: &Array1<T>) -> Result<(), SolverError>;

    /// Allocating form of [`LinearSolver::solve_into`].
    fn solve(&self, b: &Array1<T>) -> Result<Array1<T>, SolverError> {
        let mut out = Array1::zeros(b.len());
        self.solve_into(&mut out, b)?;
        Ok(out)
    }
}

/// LU decomposition with partial pivoting.
///
/// Storage for the combined L/U factors and the row permutation is
/// allocated once at construction; `factorize` overwrites it in place.
#[derive(Debug, Clone)]
pub struct LuSolver<T> {
    /// L strictly below the diagonal (unit diagonal implicit), U on and above.
    lu: Array2<T>,
    /// `perm[i]` is the original row of factored row `i`.
    perm: Vec<usize>,
    factorized: bool,
}

impl<T: Real> LuSolver<T> {
    pub fn new(n: usize) -> Self {
        Self {
            lu: Array2::zeros((n, n)),
            perm: (0..n).collect(),
            factorized: false,
        }
    }

    pub fn dim(&self) -> usize {
        self.perm.len()
    }

    /// Whether a factorization is currently held.
    pub fn is_factorized(&self) -> bool {
        self.factorized
    }
}

impl<T: Real> LinearSolver<T> for LuSolver<T> {
    #[allow(clippy::needless_range_loop)]
    fn factorize(&mut self, a: &Array2<T>) -> Result<(), SolverError> {
        let n = self.dim();
        ensure_dim("LU factorization (rows)", n, a.nrows())?;
        ensure_dim("LU factorization (columns)", n, a.ncols())?;
        self.factorized = false;
        self.lu.assign(a);
        for (i, p) in self.perm.iter_mut().enumerate() {
            *p = i;
        }

        let scale = a.iter().fold(T::zero(), |m, v| m.max(v.abs()));
        let tiny = T::cast(n.max(1) as f64) * T::epsilon() * scale;

        for col in 0..n {
            let mut max_val = self.lu[[col, col]].abs();
            let mut max_row = col;
            for row in (col + 1)..n {
                let v = self.lu[[row, col]].abs();
                if v > max_val {
                    max_val = v;
                    max_row = row;
                }
            }

            if !max_val.is_finite() || max_val == T::zero() || max_val <= tiny {
                return Err(SolverError::SingularMatrix { pivot: col });
            }

            if max_row != col {
                for j in 0..n {
                    self.lu.swap([col, j], [max_row, j]);
                }
                self.perm.swap(col, max_row);
            }

            let pivot = self.lu[[col, col]];
            for row in (col + 1)..n {
                let factor = self.lu[[row, col]] / pivot;
                self.lu[[row, col]] = factor;
                for j in (col + 1)..n {
                    let u = self.lu[[col, j]];
                    self.lu[[row, j]] = self.lu[[row, j]] - factor * u;
                }
            }
        }

        self.factorized = true;
        Ok(())
    }

    #[allow(clippy::needless_range_loop)]
    fn solve_into(&self, out: &mut Array1<T>, b: &Array1<T>) -> Result<(), SolverError> {
        let n = self.dim();
        ensure_dim("LU solve (right-hand side)", n, b.len())?;
        ensure_dim("LU solve (output)", n, out.len())?;
        if !self.factorized {
            return Err(SolverError::invalid(
                "LU solve requested before a successful factorization",
            ));
        }

        // Forward substitution with the permuted right-hand side: L·y = P·b.
        for i in 0..n {
            let mut s = b[self.perm[i]];
            for j in 0..i {
                s = s - self.lu[[i, j]] * out[j];
            }
            out[i] = s;
        }

        // Back substitution: U·x = y.
        for i in (0..n).rev() {
            let mut s = out[i];
            for j in (i + 1)..n {
                s = s - self.lu[[i, j]] * out[j];
            }
            out[i] = s / self.lu[[i, i]];
        }
        Ok(())
    }
}
