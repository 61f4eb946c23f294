// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Least-Squares Solvers
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Nonlinear least-squares problems and the trust-region solver.

mod trust_region;

use fusion_types::error::FusionResult;
use ndarray::{Array1, Array2};

use crate::objectives::BuiltObjective;

pub use trust_region::{trust_region_lsq, InitialRadius, TrustRegionConfig, XScale};

/// `min ½‖f(x)‖²` over an unconstrained vector.
///
/// Evaluation takes `&mut self` so implementations may cache or re-solve
/// internal state (the proximal projection re-solves an equilibrium).
pub trait LeastSquaresProblem {
    fn dim_x(&self) -> usize;

    fn dim_f(&self) -> usize;

    fn residual(&mut self, x: &Array1<f64>) -> FusionResult<Array1<f64>>;

    fn jacobian(&mut self, x: &Array1<f64>) -> FusionResult<Array2<f64>>;

    /// `false` when the last [`LeastSquaresProblem::residual`] is known to be
    /// inaccurate; the solver then rejects the trial step.
    fn last_evaluation_trusted(&self) -> bool {
        true
    }
}

impl LeastSquaresProblem for BuiltObjective {
    fn dim_x(&self) -> usize {
        BuiltObjective::dim_x(self)
    }

    fn dim_f(&self) -> usize {
        BuiltObjective::dim_f(self)
    }

    fn residual(&mut self, x: &Array1<f64>) -> FusionResult<Array1<f64>> {
        self.compute_scaled_error(x)
    }

    fn jacobian(&mut self, x: &Array1<f64>) -> FusionResult<Array2<f64>> {
        self.jacobian_scaled(x)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Relative cost reduction below `ftol`.
    FunctionChange,
    /// Step below `xtol` relative to `x`.
    StepSize,
    /// Scaled gradient below `gtol`.
    GradientNorm,
    /// `max_nfev` residual evaluations used.
    MaxEvaluations,
    /// Residual or Jacobian became non-finite.
    NumericalError,
}

impl TerminationReason {
    pub fn is_converged(self) -> bool {
        matches!(
            self,
            TerminationReason::FunctionChange
                | TerminationReason::StepSize
                | TerminationReason::GradientNorm
        )
    }
}

#[derive(Debug, Clone)]
pub struct OptimResult {
    pub x: Array1<f64>,
    /// `½‖f(x)‖²`
    pub cost: f64,
    pub fun: Array1<f64>,
    /// Infinity norm of the scaled gradient at `x`.
    pub gradient_norm: f64,
    /// Accepted steps.
    pub iterations: usize,
    pub nfev: usize,
    pub njev: usize,
    pub termination: TerminationReason,
    pub converged: bool,
    /// Cost after every accepted step, starting with the initial cost.
    pub cost_history: Vec<f64>,
}
