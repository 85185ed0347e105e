use std::fmt;

/// Quantity of an iterate that turned out NaN or infinite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    /// The iterate itself.
    X,
    /// The objective value, or the residual vector of a nonlinear system.
    F,
    /// The gradient of the objective.
    G,
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::X => write!(f, "x"),
            Quantity::F => write!(f, "f"),
            Quantity::G => write!(f, "g"),
        }
    }
}

/// An error type for clear diagnostics.
///
/// Running out of iterations is not an error: solvers report it through
/// [`crate::Termination`] on an `Ok` result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolverError {
    #[error("Dimension mismatch in {context}: expected {expected}, found {found}.")]
    DimensionMismatch {
        /// Where the mismatch was detected.
        context: &'static str,
        /// The dimension the component was built for.
        expected: usize,
        /// The dimension it was handed.
        found: usize,
    },
    #[error("No {kind} is available for this function; supply one or pick another derivative mode.")]
    DerivativeNotImplemented {
        /// Which derivative was requested ("gradient", "jacobian", "hessian").
        kind: &'static str,
    },
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Human readable description of the offending setting.
        reason: String,
    },
    #[error("The matrix is singular to working precision (zero pivot in column {pivot}).")]
    SingularMatrix {
        /// Column in which elimination broke down.
        pivot: usize,
    },
    #[error(
        "The search direction produced non-finite values after {attempts} step reductions. The problem may be diverging."
    )]
    NonFiniteLinesearch {
        /// Number of halvings tried before giving up.
        attempts: usize,
    },
    #[error("{quantity} became NaN or infinite at iteration {iteration}, indicating numerical instability.")]
    NonFiniteIterate {
        /// Iteration at which the non-finite value was detected.
        iteration: usize,
        /// Which quantity was affected.
        quantity: Quantity,
    },
}

impl SolverError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        SolverError::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}

/// Returns `DimensionMismatch` unless `found == expected`.
pub(crate) fn ensure_dim(
    context: &'static str,
    expected: usize,
    found: usize,
) -> Result<(), SolverError> {
    if expected == found {
        Ok(())
    } else {
        Err(SolverError::DimensionMismatch {
            context,
            expected,
            found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_check_reports_both_sizes() {
        let err = ensure_dim("gradient", 3, 2).unwrap_err();
        assert_eq!(
            err,
            SolverError::DimensionMismatch {
                context: "gradient",
                expected: 3,
                found: 2
            }
        );
        assert!(err.to_string().contains("expected 3, found 2"));
        assert!(ensure_dim("gradient", 4, 4).is_ok());
    }

    #[test]
    fn test_non_finite_iterate_names_the_quantity() {
        let err = SolverError::NonFiniteIterate {
            iteration: 7,
            quantity: Quantity::G,
        };
        assert_eq!(
            err.to_string(),
            "g became NaN or infinite at iteration 7, indicating numerical instability."
        );
    }
}
