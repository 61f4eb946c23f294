// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Linear Algebra
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Linear algebra utilities.
//!
//! One-sided Jacobi SVD with the full right basis, rank-revealing
//! pseudoinverse, null space, least squares and Jacobian column scaling.

use ndarray::{Array1, Array2, ArrayView2, Axis};

const MAX_SWEEPS: usize = 60;

/// Singular value decomposition `A = U · diag(s) · Vt`.
///
/// `u` is thin (`m × k`, `k = min(m, n)`), `vt` is the full `n × n`
/// right basis so that rows `rank..n` span the null space of `A`.
/// Singular values are sorted in descending order.
#[derive(Debug, Clone)]
pub struct Svd {
    pub u: Array2<f64>,
    pub s: Array1<f64>,
    pub vt: Array2<f64>,
}

impl Svd {
    /// Number of singular values above `tol`.
    pub fn rank(&self, tol: f64) -> usize {
        self.s.iter().take_while(|&&s| s > tol).count()
    }

    /// Default rank threshold `eps · max(m, n) · σ_max`.
    pub fn default_tolerance(&self) -> f64 {
        let (m, n) = (self.u.nrows(), self.vt.nrows());
        let smax = self.s.first().copied().unwrap_or(0.0);
        f64::EPSILON * (m.max(n) as f64) * smax
    }

    /// Pseudoinverse keeping singular values strictly above `cutoff`.
    pub fn pinv(&self, cutoff: f64) -> Array2<f64> {
        let (m, n) = (self.u.nrows(), self.vt.nrows());
        let mut result = Array2::zeros((n, m));
        for idx in 0..self.rank(cutoff) {
            let inv_s = 1.0 / self.s[idx];
            let v = self.vt.row(idx);
            let u = self.u.column(idx);
            for i in 0..n {
                let vi = v[i] * inv_s;
                if vi == 0.0 {
                    continue;
                }
                for j in 0..m {
                    result[[i, j]] += vi * u[j];
                }
            }
        }
        result
    }

    /// Orthonormal basis (as columns) of the right null space.
    pub fn null_space(&self, tol: f64) -> Array2<f64> {
        let rank = self.rank(tol);
        self.vt.slice(ndarray::s![rank.., ..]).t().to_owned()
    }
}

/// One-sided (Hestenes) Jacobi SVD.
///
/// Orthogonalizes the columns of `A` by plane rotations, accumulating the
/// rotations in `V`. Works directly on `A`, so small singular values keep
/// full relative accuracy (no `AᵀA` squaring).
pub fn jacobi_svd(a: &Array2<f64>) -> Svd {
    let (m, n) = a.dim();
    let k = m.min(n);
    let mut w = a.clone();
    let mut v: Array2<f64> = Array2::eye(n);

    for _ in 0..MAX_SWEEPS {
        let mut rotated = false;
        for p in 0..n {
            for q in (p + 1)..n {
                let alpha = w.column(p).dot(&w.column(p));
                let beta = w.column(q).dot(&w.column(q));
                let gamma = w.column(p).dot(&w.column(q));
                if gamma == 0.0 || gamma.abs() <= f64::EPSILON * (alpha * beta).sqrt() {
                    continue;
                }
                rotated = true;
                let zeta = (beta - alpha) / (2.0 * gamma);
                let t = zeta.signum() / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = c * t;
                rotate_columns(&mut w, p, q, c, s);
                rotate_columns(&mut v, p, q, c, s);
            }
        }
        if !rotated {
            break;
        }
    }

    let norms: Vec<f64> = (0..n).map(|j| w.column(j).dot(&w.column(j)).sqrt()).collect();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| {
        norms[j]
            .partial_cmp(&norms[i])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut s = Array1::zeros(k);
    let mut u = Array2::zeros((m, k));
    let mut vt = Array2::zeros((n, n));
    for (idx, &col) in order.iter().enumerate() {
        vt.row_mut(idx).assign(&v.column(col));
        if idx < k {
            s[idx] = norms[col];
            if norms[col] > 0.0 {
                let inv = 1.0 / norms[col];
                u.column_mut(idx).assign(&w.column(col).mapv(|x| x * inv));
            }
        }
    }
    Svd { u, s, vt }
}

fn rotate_columns(a: &mut Array2<f64>, p: usize, q: usize, c: f64, s: f64) {
    for i in 0..a.nrows() {
        let ap = a[[i, p]];
        let aq = a[[i, q]];
        a[[i, p]] = c * ap - s * aq;
        a[[i, q]] = s * ap + c * aq;
    }
}

/// Pseudoinverse with an absolute singular value cutoff.
pub fn pinv_svd(a: &Array2<f64>, sv_cutoff: f64) -> Array2<f64> {
    jacobi_svd(a).pinv(sv_cutoff)
}

/// Pseudoinverse with the default rank threshold `eps · max(m, n) · σ_max`.
pub fn pinv(a: &Array2<f64>) -> Array2<f64> {
    let svd = jacobi_svd(a);
    let tol = svd.default_tolerance();
    svd.pinv(tol)
}

/// Pseudoinverse discarding singular values below `rcond · σ_max`.
pub fn pinv_rcond(a: &Array2<f64>, rcond: f64) -> Array2<f64> {
    let svd = jacobi_svd(a);
    let smax = svd.s.first().copied().unwrap_or(0.0);
    svd.pinv(rcond * smax)
}

/// Orthonormal null-space basis of `A` (`n × (n − rank)`).
pub fn null_space(a: &Array2<f64>) -> Array2<f64> {
    let svd = jacobi_svd(a);
    let tol = svd.default_tolerance();
    svd.null_space(tol)
}

pub fn matrix_rank(a: &Array2<f64>) -> usize {
    let svd = jacobi_svd(a);
    svd.rank(svd.default_tolerance())
}

/// Minimum-norm least-squares solution of `A x = b` with relative cutoff.
pub fn lstsq(a: &Array2<f64>, b: &Array1<f64>, rcond: f64) -> Array1<f64> {
    pinv_rcond(a, rcond).dot(b)
}

/// Euclidean norm of every column.
pub fn column_norms(a: ArrayView2<f64>) -> Array1<f64> {
    a.map_axis(Axis(0), |col| col.dot(&col).sqrt())
}

/// Jacobian column scaling: `(scale, inv_scale)` with `scale = 1/‖J_j‖`,
/// zero columns mapped to 1.
pub fn jac_scale(a: ArrayView2<f64>) -> (Array1<f64>, Array1<f64>) {
    let norms = column_norms(a).mapv(|v| if v == 0.0 { 1.0 } else { v });
    let scale = norms.mapv(|v| 1.0 / v);
    (scale, norms)
}

pub fn norm(v: &Array1<f64>) -> f64 {
    v.dot(v).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn reconstruct(svd: &Svd) -> Array2<f64> {
        let k = svd.s.len();
        let us = &svd.u * &svd.s;
        us.dot(&svd.vt.slice(ndarray::s![..k, ..]))
    }

    #[test]
    fn test_svd_identity() {
        let a = Array2::eye(3);
        let svd = jacobi_svd(&a);
        for i in 0..3 {
            assert!((svd.s[i] - 1.0).abs() < 1e-12, "sigma[{i}] = {}", svd.s[i]);
        }
        let r = reconstruct(&svd);
        assert!((&r - &a).iter().all(|d| d.abs() < 1e-12));
    }

    #[test]
    fn test_svd_wide_matrix_has_full_right_basis() {
        let a = array![[1.0, 2.0, 3.0], [0.0, 1.0, 1.0]];
        let svd = jacobi_svd(&a);
        assert_eq!(svd.s.len(), 2);
        assert_eq!(svd.vt.dim(), (3, 3));
        let vvt = svd.vt.dot(&svd.vt.t());
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((vvt[[i, j]] - expected).abs() < 1e-12);
            }
        }
        let r = reconstruct(&svd);
        assert!((&r - &a).iter().all(|d| d.abs() < 1e-12));
    }

    #[test]
    fn test_null_space_of_rank_deficient() {
        let a = array![[1.0, 1.0, 0.0], [2.0, 2.0, 0.0]];
        let z = null_space(&a);
        assert_eq!(z.ncols(), 2);
        let az = a.dot(&z);
        assert!(az.iter().all(|v| v.abs() < 1e-12), "A Z = {az:?}");
        assert_eq!(matrix_rank(&a), 1);
    }

    #[test]
    fn test_small_singular_value_keeps_relative_accuracy() {
        let a = array![[1.0, 0.0], [0.0, 1e-9]];
        let svd = jacobi_svd(&a);
        assert!((svd.s[1] - 1e-9).abs() < 1e-21, "s = {:?}", svd.s);
    }

    #[test]
    fn test_pinv_svd_identity() {
        let a = Array2::eye(3);
        let p = pinv_svd(&a, 1e-10);
        assert!((&p - &a).iter().all(|d| d.abs() < 1e-12));
    }

    #[test]
    fn test_lstsq_overdetermined() {
        let a = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let b = array![1.0, 2.0, 3.0];
        let x = lstsq(&a, &b, 1e-12);
        assert!((x[0] - 1.0).abs() < 1e-12 && (x[1] - 2.0).abs() < 1e-12, "x = {x}");
    }

    #[test]
    fn test_jac_scale_zero_column() {
        let a = array![[3.0, 0.0], [4.0, 0.0]];
        let (scale, inv) = jac_scale(a.view());
        assert!((scale[0] - 0.2).abs() < 1e-15);
        assert_eq!(scale[1], 1.0);
        assert_eq!(inv[0], 5.0);
    }

    #[test]
    fn test_empty_matrix() {
        let a = Array2::<f64>::zeros((0, 3));
        let svd = jacobi_svd(&a);
        assert_eq!(svd.s.len(), 0);
        assert_eq!(svd.null_space(0.0).ncols(), 3);
        assert_eq!(pinv(&a).dim(), (3, 0));
    }
}
