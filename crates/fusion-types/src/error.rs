// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Errors
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FusionError {
    /// An objective could not resolve its constant arrays against the equilibrium.
    #[error("Failed to build objective '{objective}': {message}")]
    Build { objective: String, message: String },

    /// The stacked linear constraints have no exact solution.
    #[error("Linear constraints are infeasible: |A x_p - b| = {residual_norm:.3e} > {tolerance:.3e}")]
    InfeasibleConstraint { residual_norm: f64, tolerance: f64 },

    /// Null-space factorization left nothing to optimize.
    #[error("Degenerate constraint basis: {message}")]
    DegenerateBasis { message: String },

    /// Nested equilibrium re-solve inside the proximal projection did not converge.
    #[error("Inner equilibrium solve diverged after {iterations} iterations (cost {cost:.3e})")]
    InnerSolveDivergence { iterations: usize, cost: f64 },

    #[error("Dimension mismatch in {context}: expected {expected}, got {got}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        got: usize,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type FusionResult<T> = Result<T, FusionError>;
