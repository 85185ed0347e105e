//! Pieces shared by the derivative providers.

use ndarray::{Array1, Array2};

use crate::error::SolverError;
use crate::gradient::Gradient;
use crate::hessian::Hessian;
use crate::jacobian::Jacobian;
use crate::numeric::Real;

/// Default finite-difference base step, `8·√eps`.
#[inline]
pub fn default_step<T: Real>() -> T {
    T::cast(8.0) * T::epsilon().sqrt()
}

/// Per-coordinate step `ϵ·|xⱼ| + ϵ`.
///
/// Strictly positive whenever `epsilon` is.
#[inline]
pub(crate) fn coordinate_step<T: Real>(epsilon: T, xj: T) -> T {
    epsilon * xj.abs() + epsilon
}

pub(crate) fn check_step<T: Real>(epsilon: T) -> Result<T, SolverError> {
    if epsilon.is_finite() && epsilon > T::zero() {
        Ok(epsilon)
    } else {
        Err(SolverError::invalid(format!(
            "finite-difference step must be positive and finite, got {epsilon}"
        )))
    }
}

/// A derivative that was never supplied.
///
/// Stands in for the gradient, Jacobian or Hessian of a problem that only
/// has values. Every request fails with
/// [`SolverError::DerivativeNotImplemented`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unavailable;

impl<T: Real> Gradient<T> for Unavailable {
    fn gradient_into(&mut self, _g: &mut Array1<T>, _x: &Array1<T>) -> Result<(), SolverError> {
        Err(SolverError::DerivativeNotImplemented { kind: "gradient" })
    }
}

impl<T: Real, P> Jacobian<T, P> for Unavailable {
    fn jacobian_into(
        &mut self,
        _j: &mut Array2<T>,
        _x: &Array1<T>,
        _params: &P,
    ) -> Result<(), SolverError> {
        Err(SolverError::DerivativeNotImplemented { kind: "jacobian" })
    }
}

impl<T: Real> Hessian<T> for Unavailable {
    fn hessian_into(&mut self, _h: &mut Array2<T>, _x: &Array1<T>) -> Result<(), SolverError> {
        Err(SolverError::DerivativeNotImplemented { kind: "hessian" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_steps_never_vanish() {
        let eps = default_step::<f64>();
        assert!(coordinate_step(eps, 0.0) > 0.0);
        assert_eq!(coordinate_step(eps, -2.0), 3.0 * eps);
        assert!(check_step(0.0_f64).is_err());
        assert!(check_step(f64::NAN).is_err());
    }

    #[test]
    fn test_unavailable_derivatives_fail_loudly() {
        let x = array![1.0_f64];
        let mut g = Array1::zeros(1);
        let mut m = Array2::zeros((1, 1));
        assert_eq!(
            Unavailable.gradient_into(&mut g, &x),
            Err(SolverError::DerivativeNotImplemented { kind: "gradient" })
        );
        assert_eq!(
            Jacobian::<f64, ()>::jacobian_into(&mut Unavailable, &mut m, &x, &()),
            Err(SolverError::DerivativeNotImplemented { kind: "jacobian" })
        );
        assert!(matches!(
            Unavailable.hessian(&x),
            Err(SolverError::DerivativeNotImplemented { kind: "hessian" })
        ));
    }
}
