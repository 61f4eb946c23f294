// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Vacuum permeability (H/m).
pub const MU0_SI: f64 = 1.2566370614e-6;

/// Machine epsilon used for rank cutoffs.
pub const EPS: f64 = f64::EPSILON;

/// Default singular-value cutoff for least-squares fits and perturbations.
pub const DEFAULT_RCOND: f64 = 1e-6;

/// Tolerance on ‖A·x − b‖ for a feasible linear constraint set.
pub const CONSTRAINT_TOL: f64 = 1e-8;
