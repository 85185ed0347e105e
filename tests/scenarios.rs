use ndarray::{Array1, Array2, array};
use newton_solvers::{
    Bfgs, Dfp, Gradient, GradientAutodiff, GradientExact, GradientFiniteDifferences,
    HessianAutodiff, HessianExact, HessianFiniteDifferences, HessianModel, Linesearch,
    NewtonHessian, NewtonSolver, NonlinearProblem, Objective, Optimizer, OptimizerResult, Options,
    ScalarFunction, Termination, VectorFunction,
};
use num_dual::DualNum;
use spectral::prelude::*;

#[derive(Clone)]
struct SumOfSquares;

impl ScalarFunction<f64> for SumOfSquares {
    fn eval<D: DualNum<f64> + Copy>(&self, x: &[D]) -> D {
        x.iter().fold(D::from(0.0), |acc, &xi| acc + xi * xi)
    }
}

/// `exp(x)·(x³ − 5x² + 2x) + 2`.
#[derive(Clone)]
struct ExpCubic;

impl VectorFunction<f64, ()> for ExpCubic {
    fn eval<D: DualNum<f64> + Copy>(&self, y: &mut [D], x: &[D], _: &()) {
        let t = x[0];
        let poly = t * t * t - D::from(5.0) * t * t + D::from(2.0) * t;
        y[0] = t.exp() * poly + D::from(2.0);
    }
}

const EXP_CUBIC_ROOTS: [f64; 4] = [
    -4.735035753706987,
    -0.6737697823920028,
    0.7613128434711648,
    4.560440205363601,
];

fn all_linesearches() -> [Linesearch<f64>; 4] {
    [
        Linesearch::fixed(1.0),
        Linesearch::bisection(),
        Linesearch::backtracking(),
        Linesearch::quadratic(),
    ]
}

fn minimize_sum_of_squares<H: HessianModel<f64>>(
    model: H,
    linesearch: Linesearch<f64>,
) -> (Array1<f64>, OptimizerResult<f64>) {
    let mut x = array![1.0, 0.0, 0.0];
    let result = Optimizer::new(Objective::autodiff(3, SumOfSquares), model)
        .with_linesearch(linesearch)
        .with_options(Options::default().with_verbosity(0))
        .solve(&mut x)
        .unwrap();
    (x, result)
}

fn assert_at_origin(x: &Array1<f64>, result: &OptimizerResult<f64>) {
    let tol = (2000.0 * f64::EPSILON).cbrt();
    assert!(result.converged, "{result}");
    assert!(x.iter().all(|xi| xi.abs() <= tol), "{result}");
    assert!(result.value <= tol, "{result}");
}

#[test]
fn test_newton_sum_of_squares_with_every_hessian_and_linesearch() {
    for ls in all_linesearches() {
        let exact = NewtonHessian::new(HessianExact::new(3, |h: &mut Array2<f64>, _: &Array1<f64>| {
            h.assign(&(Array2::<f64>::eye(3) * 2.0))
        }));
        let (x, result) = minimize_sum_of_squares(exact, ls);
        assert_at_origin(&x, &result);

        let autodiff = NewtonHessian::new(HessianAutodiff::new(3, SumOfSquares));
        let (x, result) = minimize_sum_of_squares(autodiff, ls);
        assert_at_origin(&x, &result);

        let finite = NewtonHessian::new(HessianFiniteDifferences::new(
            3,
            GradientAutodiff::new(3, SumOfSquares),
        ));
        let (x, result) = minimize_sum_of_squares(finite, ls);
        assert_at_origin(&x, &result);
    }
}

#[test]
fn test_secant_methods_sum_of_squares() {
    for ls in [
        Linesearch::bisection(),
        Linesearch::backtracking(),
        Linesearch::quadratic(),
    ] {
        let (x, result) = minimize_sum_of_squares(Bfgs::new(), ls);
        assert_at_origin(&x, &result);
        let (x, result) = minimize_sum_of_squares(Dfp::new(), ls);
        assert_at_origin(&x, &result);
    }
}

#[test]
fn test_newton_quadratic_one_iteration_from_autodiff() {
    #[derive(Clone)]
    struct Quadratic;

    impl ScalarFunction<f64> for Quadratic {
        fn eval<D: DualNum<f64> + Copy>(&self, x: &[D]) -> D {
            let c = |v: f64| D::from(v);
            c(0.5) * (c(4.0) * x[0] * x[0] + c(2.0) * x[0] * x[1] + c(3.0) * x[1] * x[1])
                - x[0]
                - c(2.0) * x[1]
        }
    }

    for ls in all_linesearches() {
        let mut x = array![-10.0, 10.0];
        let result = Optimizer::newton(
            Objective::autodiff(2, Quadratic),
            HessianAutodiff::new(2, Quadratic),
        )
        .with_linesearch(ls)
        .solve(&mut x)
        .unwrap();
        assert_eq!(result.iterations(), 1, "{result}");
        assert_that!(&x[0]).is_close_to(1.0 / 11.0, 1e-12);
        assert_that!(&x[1]).is_close_to(7.0 / 11.0, 1e-12);
    }
}

#[test]
fn test_exp_cubic_root_finding_from_unit_interval() {
    // Dense enough to hit the starts near 0.236 whose first step overflows `exp`.
    for i in 1..1000 {
        let x0 = i as f64 / 1000.0;
        let mut x = array![x0];
        let problem = NonlinearProblem::autodiff(1, ExpCubic, ());
        let result = NewtonSolver::newton(problem)
            .with_linesearch(Linesearch::backtracking())
            .solve(&mut x)
            .unwrap();

        assert!(result.converged, "x0 = {x0}: {result}");
        assert!(result.iterations() <= 20, "x0 = {x0}: {result}");
        assert!(result.residual_norm() <= 1e-12, "x0 = {x0}: {result}");
        assert!(
            EXP_CUBIC_ROOTS.iter().any(|r| (x[0] - r).abs() < 1e-8),
            "x0 = {x0} ended at {}",
            x[0]
        );
    }
}

#[test]
fn test_frozen_jacobian_with_finite_differences() {
    fn circle(y: &mut Array1<f64>, x: &Array1<f64>, r: &f64) {
        y[0] = x[0] * x[0] + x[1] * x[1] - r * r;
        y[1] = x[0] - x[1];
    }

    let mut x = array![1.0, 0.5];
    let problem = NonlinearProblem::finite_differences(2, circle, 2.0);
    let result = NewtonSolver::quasi_newton(problem, 2).solve(&mut x).unwrap();
    assert!(result.converged, "{result}");
    assert_that!(&x[0]).is_close_to(2f64.sqrt(), 1e-8);
    assert_that!(&x[1]).is_close_to(2f64.sqrt(), 1e-8);
}

#[test]
fn test_single_precision_newton_and_bfgs() {
    let quadratic = |x: &Array1<f32>| {
        0.5 * (4.0 * x[0] * x[0] + 2.0 * x[0] * x[1] + 3.0 * x[1] * x[1]) - x[0] - 2.0 * x[1]
    };
    let grad = |g: &mut Array1<f32>, x: &Array1<f32>| {
        g[0] = 4.0 * x[0] + x[1] - 1.0;
        g[1] = x[0] + 3.0 * x[1] - 2.0;
    };

    let mut x = array![3.0f32, -4.0];
    let result = Optimizer::newton(
        Objective::new(quadratic, GradientExact::new(2, grad)),
        HessianExact::new(2, |h: &mut Array2<f32>, _: &Array1<f32>| {
            h.assign(&array![[4.0, 1.0], [1.0, 3.0]])
        }),
    )
    .solve(&mut x)
    .unwrap();
    assert!(result.converged);
    assert_that!(&x[0]).is_close_to(1.0f32 / 11.0, 1e-5);
    assert_that!(&x[1]).is_close_to(7.0f32 / 11.0, 1e-5);

    let mut x = array![1.0f32, 0.0, 0.0];
    let result = Optimizer::bfgs(Objective::new(
        |x: &Array1<f32>| x.dot(x),
        GradientExact::new(3, |g: &mut Array1<f32>, x: &Array1<f32>| g.assign(&(x * 2.0))),
    ))
    .solve(&mut x)
    .unwrap();
    let tol = (2000.0 * f32::EPSILON).cbrt();
    assert!(result.converged);
    assert!(x.iter().all(|xi| xi.abs() <= tol));
}

#[test]
fn test_memoized_evaluations() {
    let mut objective = Objective::<f64, _, _>::finite_differences(2, |x: &Array1<f64>| x[0] * x[0] + x[1]);
    let x = array![1.0, 2.0];
    objective.value_cached(&x);
    objective.value_cached(&x);
    assert_eq!(objective.f_calls(), 1);

    objective.gradient_cached(&x).unwrap();
    objective.gradient_cached(&x).unwrap();
    assert_eq!(objective.g_calls(), 1);
}

#[test]
fn test_gradient_providers_agree() {
    let x = array![1.0, -2.0, 3.0];
    let exact = &x * 2.0;

    let finite = GradientFiniteDifferences::<f64, _>::new(3, |x: &Array1<f64>| x.dot(x))
        .gradient(&x)
        .unwrap();
    for (a, b) in finite.iter().zip(exact.iter()) {
        assert_that!(*a).is_close_to(*b, 1e-7);
    }

    let autodiff = GradientAutodiff::<f64, _>::new(3, SumOfSquares).gradient(&x).unwrap();
    assert_eq!(autodiff, exact);
}

#[test]
fn test_non_finite_trial_is_recovered() {
    // Undefined past 1.5; the unit BFGS step from 0 overshoots to 2.
    let objective = Objective::new(
        |x: &Array1<f64>| {
            if x[0] > 1.5 {
                f64::NAN
            } else {
                (x[0] - 1.0) * (x[0] - 1.0)
            }
        },
        GradientExact::new(1, |g: &mut Array1<f64>, x: &Array1<f64>| g[0] = 2.0 * (x[0] - 1.0)),
    );
    let mut x = array![0.0];
    let result = Optimizer::bfgs(objective).solve(&mut x).unwrap();
    assert!(result.converged);
    assert_eq!(x[0], 1.0);
}

#[test]
fn test_hard_stops_are_reported_not_raised() {
    let quadratic = Objective::new(
        |x: &Array1<f64>| {
            0.5 * (4.0 * x[0] * x[0] + 2.0 * x[0] * x[1] + 3.0 * x[1] * x[1]) - x[0] - 2.0 * x[1]
        },
        GradientExact::new(2, |g: &mut Array1<f64>, x: &Array1<f64>| {
            g[0] = 4.0 * x[0] + x[1] - 1.0;
            g[1] = x[0] + 3.0 * x[1] - 2.0;
        }),
    );
    let mut x = array![3.0, -4.0];
    let result = Optimizer::bfgs(quadratic)
        .with_options(Options::default().with_x_break(Some(1e-3), None))
        .solve(&mut x)
        .unwrap();
    assert_eq!(result.termination, Termination::BreakThreshold);
    assert_eq!(result.iterations(), 1);
    assert!(!result.converged);

    // A fixed step of 3 along −∇f maps x to −5x.
    let square = Objective::new(
        |x: &Array1<f64>| x[0] * x[0],
        GradientExact::new(1, |g: &mut Array1<f64>, x: &Array1<f64>| g[0] = 2.0 * x[0]),
    );
    let mut x = array![1.0];
    let result = Optimizer::bfgs(square)
        .with_linesearch(Linesearch::fixed(3.0))
        .with_options(Options::default().with_allow_f_increases(false))
        .solve(&mut x)
        .unwrap();
    assert_eq!(result.termination, Termination::FIncreased);
    assert_eq!(x[0], -5.0);
}

#[cfg(feature = "serde")]
#[test]
fn test_configuration_round_trips_through_json() {
    let options = Options::<f64>::default()
        .with_g_restol(1e-9)
        .with_f_break(Some(1e6), None);
    let json = serde_json::to_string(&options).unwrap();
    let back: Options<f64> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, options);

    let linesearch = Linesearch::<f64>::quadratic();
    let json = serde_json::to_string(&linesearch).unwrap();
    let back: Linesearch<f64> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, linesearch);
}
