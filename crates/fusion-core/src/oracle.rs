// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Differentiation Oracle
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Derivatives of vector and scalar functions of the state vector.
//!
//! Objectives never inspect how derivatives are produced; they hand a
//! closure to a [`DifferentiationOracle`]. The provided oracle uses central
//! differences with columns evaluated in parallel on the rayon pool.

use ndarray::{Array1, Array2};
use rayon::prelude::*;

pub type VectorFn<'a> = dyn Fn(&Array1<f64>) -> Array1<f64> + Sync + 'a;
pub type ScalarFn<'a> = dyn Fn(&Array1<f64>) -> f64 + Sync + 'a;

pub trait DifferentiationOracle: Send + Sync + std::fmt::Debug {
    /// `∂f_i/∂x_j`, shape `(dim_f, dim_x)`.
    fn jacobian(&self, f: &VectorFn<'_>, x: &Array1<f64>) -> Array2<f64>;

    fn gradient(&self, f: &ScalarFn<'_>, x: &Array1<f64>) -> Array1<f64>;

    fn hessian(&self, f: &ScalarFn<'_>, x: &Array1<f64>) -> Array2<f64>;

    /// Jacobian-vector product `J·v`.
    fn jvp(&self, f: &VectorFn<'_>, x: &Array1<f64>, v: &Array1<f64>) -> Array1<f64> {
        self.jacobian(f, x).dot(v)
    }

    /// Vector-Jacobian product `Jᵀ·v`.
    fn vjp(&self, f: &VectorFn<'_>, x: &Array1<f64>, v: &Array1<f64>) -> Array1<f64> {
        self.jacobian(f, x).t().dot(v)
    }
}

/// Second-order central differences.
#[derive(Debug, Clone, Copy)]
pub struct CentralDifference {
    /// Relative step, scaled by `max(1, |x_j|)` (default: ε^(1/3))
    pub rel_step: f64,
    /// Evaluate columns on the rayon pool (default: true)
    pub parallel: bool,
}

impl Default for CentralDifference {
    fn default() -> Self {
        CentralDifference {
            rel_step: f64::EPSILON.cbrt(),
            parallel: true,
        }
    }
}

impl CentralDifference {
    fn perturbed(&self, x: &Array1<f64>, j: usize, scale: f64) -> (Array1<f64>, Array1<f64>, f64) {
        let h = scale * x[j].abs().max(1.0);
        let mut xp = x.clone();
        let mut xm = x.clone();
        xp[j] += h;
        xm[j] -= h;
        let width = xp[j] - xm[j];
        (xp, xm, width)
    }

    fn map_indices<T, F>(&self, n: usize, op: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        if self.parallel && n > 1 {
            (0..n).into_par_iter().map(op).collect()
        } else {
            (0..n).map(op).collect()
        }
    }
}

impl DifferentiationOracle for CentralDifference {
    fn jacobian(&self, f: &VectorFn<'_>, x: &Array1<f64>) -> Array2<f64> {
        let n = x.len();
        if n == 0 {
            return Array2::zeros((f(x).len(), 0));
        }
        let columns = self.map_indices(n, |j| {
            let (xp, xm, width) = self.perturbed(x, j, self.rel_step);
            (f(&xp) - f(&xm)) / width
        });
        let m = columns[0].len();
        let mut jac = Array2::zeros((m, n));
        for (j, col) in columns.iter().enumerate() {
            jac.column_mut(j).assign(col);
        }
        jac
    }

    fn gradient(&self, f: &ScalarFn<'_>, x: &Array1<f64>) -> Array1<f64> {
        Array1::from(self.map_indices(x.len(), |j| {
            let (xp, xm, width) = self.perturbed(x, j, self.rel_step);
            (f(&xp) - f(&xm)) / width
        }))
    }

    fn hessian(&self, f: &ScalarFn<'_>, x: &Array1<f64>) -> Array2<f64> {
        let n = x.len();
        let scale = f64::EPSILON.powf(0.25);
        let h: Vec<f64> = x.iter().map(|v| scale * v.abs().max(1.0)).collect();
        let f0 = f(x);
        let eval = |shifts: &[(usize, f64)]| {
            let mut y = x.clone();
            for &(i, d) in shifts {
                y[i] += d;
            }
            f(&y)
        };
        let rows = self.map_indices(n, |i| {
            let mut row = vec![0.0; n];
            row[i] = (eval(&[(i, h[i])]) - 2.0 * f0 + eval(&[(i, -h[i])])) / (h[i] * h[i]);
            for j in (i + 1)..n {
                row[j] = (eval(&[(i, h[i]), (j, h[j])]) - eval(&[(i, h[i]), (j, -h[j])])
                    - eval(&[(i, -h[i]), (j, h[j])])
                    + eval(&[(i, -h[i]), (j, -h[j])]))
                    / (4.0 * h[i] * h[j]);
            }
            row
        });
        let mut hess = Array2::zeros((n, n));
        for (i, row) in rows.iter().enumerate() {
            for j in i..n {
                hess[[i, j]] = row[j];
                hess[[j, i]] = row[j];
            }
        }
        hess
    }
}
