// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Radial Profiles
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Power-series profiles `f(ρ) = Σ c_l ρ^l`.

use fusion_math::spectral::power_series;
use fusion_types::config::ProfileTerm;
use ndarray::{Array1, Array2};

/// Coefficients for `l = 0..=l_max` packed from a sparse term list.
pub fn coefficients_from_terms(terms: &[ProfileTerm]) -> Array1<f64> {
    let size = terms.iter().map(|t| t.l + 1).max().unwrap_or(1);
    let mut coeffs = Array1::zeros(size);
    for t in terms {
        coeffs[t.l] += t.value;
    }
    coeffs
}

/// `(len(rho) × num_coeffs)` matrix of `d^order/dρ^order ρ^l`.
pub fn design_matrix(rho: &Array1<f64>, num_coeffs: usize, order: usize) -> Array2<f64> {
    Array2::from_shape_fn((rho.len(), num_coeffs), |(i, l)| power_series(rho[i], l, order))
}

pub fn evaluate(coeffs: &Array1<f64>, rho: f64, order: usize) -> f64 {
    coeffs
        .iter()
        .enumerate()
        .map(|(l, c)| c * power_series(rho, l, order))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_from_terms() {
        let terms = [
            ProfileTerm { l: 0, value: 1e3 },
            ProfileTerm { l: 2, value: -1e3 },
        ];
        let c = coefficients_from_terms(&terms);
        assert_eq!(c.to_vec(), vec![1e3, 0.0, -1e3]);
        assert!((evaluate(&c, 0.5, 0) - 750.0).abs() < 1e-10);
        assert!((evaluate(&c, 0.5, 1) + 1e3).abs() < 1e-10);
        let d = design_matrix(&Array1::from(vec![0.5]), 3, 1);
        assert!((d.dot(&c)[0] + 1e3).abs() < 1e-10);
    }

    #[test]
    fn test_empty_profile_is_zero() {
        let c = coefficients_from_terms(&[]);
        assert_eq!(c.len(), 1);
        assert_eq!(evaluate(&c, 0.3, 0), 0.0);
    }
}
