// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Trust-Region Least Squares
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Dogleg trust-region method for `min ½‖f(x)‖²`.
//!
//! Steps are computed in scaled variables `x = d ∘ u`. The Gauss-Newton
//! step comes from an SVD pseudoinverse, so rank-deficient Jacobians are
//! handled without regularisation. A trial step is accepted only when the
//! actual reduction is positive and at least `eta` times the predicted one.

use fusion_math::linalg::{column_norms, norm, pinv};
use fusion_types::error::{FusionError, FusionResult};
use ndarray::{Array1, Array2};

use super::{LeastSquaresProblem, OptimResult, TerminationReason};

const SHRINK_BELOW: f64 = 0.25;
const GROW_ABOVE: f64 = 0.75;
const SHRINK_FACTOR: f64 = 0.25;
const GROW_FACTOR: f64 = 2.0;

/// How the first trust radius is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum InitialRadius {
    /// Length of the first scaled Gauss-Newton step.
    #[default]
    GaussNewtonStep,
    /// Norm of the scaled starting point.
    ScaledX,
    Fixed(f64),
}

/// Variable scaling `d` in `x = d ∘ u`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum XScale {
    /// Inverse Jacobian column norms, with the norms never decreasing
    /// between iterations.
    #[default]
    Jacobian,
    Fixed(Array1<f64>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrustRegionConfig {
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    pub max_nfev: usize,
    pub initial_radius: InitialRadius,
    pub max_radius: f64,
    /// Minimum ratio of actual to predicted reduction for acceptance.
    pub eta: f64,
    pub x_scale: XScale,
    /// 2 logs every iteration at debug level.
    pub verbose: u8,
}

impl Default for TrustRegionConfig {
    fn default() -> Self {
        Self {
            ftol: 1e-6,
            xtol: 1e-6,
            gtol: 1e-6,
            max_nfev: 100,
            initial_radius: InitialRadius::GaussNewtonStep,
            max_radius: f64::INFINITY,
            eta: 0.0,
            x_scale: XScale::Jacobian,
            verbose: 1,
        }
    }
}

fn validate_trust_region_config(config: &TrustRegionConfig, dim_x: usize) -> FusionResult<()> {
    for (name, value) in [("ftol", config.ftol), ("xtol", config.xtol), ("gtol", config.gtol)] {
        if !value.is_finite() || value < 0.0 {
            return Err(FusionError::ConfigError(format!(
                "trust_region.{name} must be finite and >= 0"
            )));
        }
    }
    if config.max_nfev == 0 {
        return Err(FusionError::ConfigError(
            "trust_region.max_nfev must be >= 1".to_string(),
        ));
    }
    if config.max_radius.is_nan() || config.max_radius <= 0.0 {
        return Err(FusionError::ConfigError(
            "trust_region.max_radius must be > 0".to_string(),
        ));
    }
    if !config.eta.is_finite() || !(0.0..1.0).contains(&config.eta) {
        return Err(FusionError::ConfigError(
            "trust_region.eta must be in [0, 1)".to_string(),
        ));
    }
    if let InitialRadius::Fixed(r) = config.initial_radius {
        if !r.is_finite() || r <= 0.0 {
            return Err(FusionError::ConfigError(
                "trust_region.initial_radius must be finite and > 0".to_string(),
            ));
        }
    }
    if let XScale::Fixed(d) = &config.x_scale {
        if d.len() != dim_x {
            return Err(FusionError::DimensionMismatch {
                context: "trust_region.x_scale".to_string(),
                expected: dim_x,
                got: d.len(),
            });
        }
        if d.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(FusionError::ConfigError(
                "trust_region.x_scale entries must be finite and > 0".to_string(),
            ));
        }
    }
    Ok(())
}

fn all_finite<'a>(values: impl IntoIterator<Item = &'a f64>) -> bool {
    values.into_iter().all(|v| v.is_finite())
}

fn inf_norm(v: &Array1<f64>) -> f64 {
    v.iter().fold(0.0, |m, x| m.max(x.abs()))
}

/// Jacobian column norms. Columns at or below the finite-difference noise
/// floor, relative to the largest column, are treated as zero and mapped to 1.
fn jacobian_norms(jac: &Array2<f64>) -> Array1<f64> {
    let norms = column_norms(jac.view());
    let floor = f64::EPSILON.sqrt() * norms.fold(0.0_f64, |acc, &v| acc.max(v));
    norms.mapv(|v| if v <= floor { 1.0 } else { v })
}

/// Dogleg step inside `radius`. Returns the step and whether it lies on
/// the trust-region boundary.
fn dogleg(gauss_newton: &Array1<f64>, cauchy: &Array1<f64>, radius: f64) -> (Array1<f64>, bool) {
    if norm(gauss_newton) <= radius {
        return (gauss_newton.clone(), false);
    }
    let cauchy_norm = norm(cauchy);
    if cauchy_norm >= radius {
        return (cauchy * (radius / cauchy_norm), true);
    }
    // ‖c + t (p − c)‖ = radius for t in [0, 1]
    let diff = gauss_newton - cauchy;
    let a = diff.dot(&diff);
    let b = 2.0 * cauchy.dot(&diff);
    let c = cauchy.dot(cauchy) - radius * radius;
    let t = (-b + (b * b - 4.0 * a * c).max(0.0).sqrt()) / (2.0 * a);
    (cauchy + &(diff * t), true)
}

/// Minimise `½‖f(x)‖²` from `x0`.
///
/// Non-convergence is not an error: the result carries the termination
/// reason and `converged == false`. Errors are reserved for invalid
/// configuration and failures propagated from the problem.
pub fn trust_region_lsq<P: LeastSquaresProblem + ?Sized>(
    problem: &mut P,
    x0: &Array1<f64>,
    config: &TrustRegionConfig,
) -> FusionResult<OptimResult> {
    let n = problem.dim_x();
    if x0.len() != n {
        return Err(FusionError::DimensionMismatch {
            context: "trust-region starting point".to_string(),
            expected: n,
            got: x0.len(),
        });
    }
    validate_trust_region_config(config, n)?;

    let mut x = x0.clone();
    let mut f = problem.residual(&x)?;
    let mut nfev = 1;
    let mut njev = 0;
    let mut cost = 0.5 * f.dot(&f);
    let mut cost_history = vec![cost];
    let mut iterations = 0;

    let finish = |x: Array1<f64>,
                  f: Array1<f64>,
                  gradient_norm: f64,
                  iterations: usize,
                  nfev: usize,
                  njev: usize,
                  termination: TerminationReason,
                  cost_history: Vec<f64>| {
        let cost = 0.5 * f.dot(&f);
        if config.verbose >= 1 {
            log::info!(
                "trust region finished: {termination:?} after {iterations} iterations, \
                 cost = {cost:.6e}, |g| = {gradient_norm:.3e}, nfev = {nfev}, njev = {njev}"
            );
        }
        OptimResult {
            x,
            cost,
            fun: f,
            gradient_norm,
            iterations,
            nfev,
            njev,
            termination,
            converged: termination.is_converged(),
            cost_history,
        }
    };

    if !all_finite(f.iter()) {
        return Ok(finish(
            x,
            f,
            f64::NAN,
            0,
            nfev,
            njev,
            TerminationReason::NumericalError,
            cost_history,
        ));
    }

    let mut jac = problem.jacobian(&x)?;
    njev += 1;
    if !all_finite(jac.iter()) {
        return Ok(finish(
            x,
            f,
            f64::NAN,
            0,
            nfev,
            njev,
            TerminationReason::NumericalError,
            cost_history,
        ));
    }

    let mut col_norms = jacobian_norms(&jac);
    let mut d = match &config.x_scale {
        XScale::Jacobian => col_norms.mapv(|v| 1.0 / v),
        XScale::Fixed(d) => d.clone(),
    };

    let mut j_u = &jac * &d;
    let mut g_u = j_u.t().dot(&f);
    let mut gradient_norm = inf_norm(&g_u);
    let mut gauss_newton = -pinv(&j_u).dot(&f);

    let mut radius = match config.initial_radius {
        InitialRadius::GaussNewtonStep => norm(&gauss_newton),
        InitialRadius::ScaledX => norm(&(&x / &d)),
        InitialRadius::Fixed(r) => r,
    };
    if radius == 0.0 || !radius.is_finite() {
        radius = 1.0;
    }
    radius = radius.min(config.max_radius);

    if gradient_norm < config.gtol {
        return Ok(finish(
            x,
            f,
            gradient_norm,
            0,
            nfev,
            njev,
            TerminationReason::GradientNorm,
            cost_history,
        ));
    }

    let termination = 'outer: loop {
        let jg = j_u.dot(&g_u);
        let jg_sq = jg.dot(&jg);
        let cauchy = if jg_sq > 0.0 {
            &g_u * (-g_u.dot(&g_u) / jg_sq)
        } else {
            Array1::zeros(n)
        };

        loop {
            if nfev >= config.max_nfev {
                break 'outer TerminationReason::MaxEvaluations;
            }
            let (p_u, on_boundary) = dogleg(&gauss_newton, &cauchy, radius);
            let step = &d * &p_u;
            let step_norm = norm(&step);
            let x_new = &x + &step;
            let f_new = problem.residual(&x_new)?;
            nfev += 1;

            let jp = j_u.dot(&p_u);
            let predicted = -(g_u.dot(&p_u) + 0.5 * jp.dot(&jp));
            let cost_new = 0.5 * f_new.dot(&f_new);
            let actual = cost - cost_new;
            let usable = problem.last_evaluation_trusted() && cost_new.is_finite();
            let ratio = if usable && predicted > 0.0 {
                actual / predicted
            } else {
                -1.0
            };

            let p_norm = norm(&p_u);
            if ratio < SHRINK_BELOW {
                radius = SHRINK_FACTOR * p_norm;
            } else if ratio > GROW_ABOVE && on_boundary {
                radius = (GROW_FACTOR * radius).min(config.max_radius);
            }

            if ratio > config.eta && actual > 0.0 {
                let cost_old = cost;
                x = x_new;
                f = f_new;
                cost = cost_new;
                iterations += 1;
                cost_history.push(cost);

                jac = problem.jacobian(&x)?;
                njev += 1;
                if !all_finite(jac.iter()) {
                    break 'outer TerminationReason::NumericalError;
                }
                if let XScale::Jacobian = config.x_scale {
                    col_norms = Array1::from_iter(
                        col_norms
                            .iter()
                            .zip(jacobian_norms(&jac).iter())
                            .map(|(&old, &new)| old.max(new)),
                    );
                    d = col_norms.mapv(|v| 1.0 / v);
                }
                j_u = &jac * &d;
                g_u = j_u.t().dot(&f);
                gradient_norm = inf_norm(&g_u);

                if config.verbose >= 2 {
                    log::debug!(
                        "iter {iterations:>4}: cost = {cost:.6e}, reduction = {actual:.3e}, \
                         |step| = {step_norm:.3e}, |g| = {gradient_norm:.3e}, radius = {radius:.3e}"
                    );
                }

                if actual < config.ftol * cost_old && ratio > SHRINK_BELOW {
                    break 'outer TerminationReason::FunctionChange;
                }
                if step_norm < config.xtol * (config.xtol + norm(&x)) {
                    break 'outer TerminationReason::StepSize;
                }
                if gradient_norm < config.gtol {
                    break 'outer TerminationReason::GradientNorm;
                }
                gauss_newton = -pinv(&j_u).dot(&f);
                continue 'outer;
            }

            if config.verbose >= 2 {
                log::debug!("step rejected: ratio = {ratio:.3e}, radius -> {radius:.3e}");
            }
            if step_norm < config.xtol * (config.xtol + norm(&x)) {
                break 'outer TerminationReason::StepSize;
            }
        }
    };

    if termination == TerminationReason::MaxEvaluations {
        log::warn!(
            "trust region stopped after {nfev} evaluations without meeting tolerances (cost = {cost:.6e})"
        );
    }
    Ok(finish(
        x,
        f,
        gradient_norm,
        iterations,
        nfev,
        njev,
        termination,
        cost_history,
    ))
}
