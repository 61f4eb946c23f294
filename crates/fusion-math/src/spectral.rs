// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Spectral Primitives
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Zernike radial polynomials, Fourier harmonics and power series,
//! with derivatives.

/// Highest derivative order supported by the evaluators.
pub const MAX_DERIVATIVE: usize = 2;

fn factorial(n: usize) -> f64 {
    (1..=n).fold(1.0, |acc, k| acc * k as f64)
}

/// `d^order/dx^order` of `x^p`.
fn power_derivative(x: f64, p: usize, order: usize) -> f64 {
    if order > p {
        return 0.0;
    }
    let coeff = ((p - order + 1)..=p).fold(1.0, |acc, k| acc * k as f64);
    coeff * x.powi((p - order) as i32)
}

/// Zernike radial polynomial `R_l^|m|(ρ)` or its `dr`-th radial derivative.
///
/// Zero unless `|m| ≤ l` and `l − |m|` is even.
pub fn zernike_radial(rho: f64, l: usize, m: i32, dr: usize) -> f64 {
    let m = m.unsigned_abs() as usize;
    if m > l || (l - m) % 2 != 0 {
        return 0.0;
    }
    let half_diff = (l - m) / 2;
    let half_sum = (l + m) / 2;
    (0..=half_diff)
        .map(|k| {
            let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
            let c = sign * factorial(l - k)
                / (factorial(k) * factorial(half_sum - k) * factorial(half_diff - k));
            c * power_derivative(rho, l - 2 * k, dr)
        })
        .sum()
}

/// Fourier harmonic of mode `m` at `angle`, differentiated `order` times.
///
/// `m ≥ 0` is `cos(m·f·angle)`, `m < 0` is `sin(|m|·f·angle)` where `f` is
/// the frequency multiplier (number of field periods for toroidal modes).
pub fn fourier(angle: f64, m: i32, order: usize, frequency: f64) -> f64 {
    let k = m.unsigned_abs() as f64 * frequency;
    let phase = k * angle;
    // d^j cos = cos(x + jπ/2), d^j sin = sin(x + jπ/2)
    let shift = order as f64 * std::f64::consts::FRAC_PI_2;
    let scale = k.powi(order as i32);
    if m >= 0 {
        if m == 0 {
            return if order == 0 { 1.0 } else { 0.0 };
        }
        scale * (phase + shift).cos()
    } else {
        scale * (phase + shift).sin()
    }
}

/// `d^order/dρ^order` of `ρ^l`.
pub fn power_series(rho: f64, l: usize, order: usize) -> f64 {
    power_derivative(rho, l, order)
}
