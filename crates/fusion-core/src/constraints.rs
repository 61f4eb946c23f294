// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Linear Constraint Elimination
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Elimination of linear equality constraints `A x = b`.
//!
//! Every feasible `x` is written `x = x_p + Z r` with `x_p` a particular
//! solution and `Z` an orthonormal null-space basis of `A`. Rows with a
//! single nonzero pin a variable outright; those variables are removed
//! before the SVD so the factorization only sees the coupled remainder.

use fusion_math::linalg::{jacobi_svd, norm};
use fusion_types::constants::CONSTRAINT_TOL;
use fusion_types::error::{FusionError, FusionResult};
use fusion_types::state::StateLayout;
use ndarray::{Array1, Array2, Axis};

use crate::objectives::BuiltObjective;
use crate::solvers::LeastSquaresProblem;

/// Factorized constraint set over one state layout.
#[derive(Debug, Clone)]
pub struct ConstraintEliminator {
    layout: StateLayout,
    a: Array2<f64>,
    b: Array1<f64>,
    /// `(row, column)` of every single-nonzero row.
    pinned: Vec<(usize, usize)>,
    fixed_idx: Vec<usize>,
    unfixed_idx: Vec<usize>,
    coupled_rows: Vec<usize>,
    /// `A[coupled_rows, unfixed_idx]⁺`
    a_coupled_pinv: Array2<f64>,
    xp: Array1<f64>,
    z: Array2<f64>,
}

impl ConstraintEliminator {
    /// Factorize the stacked linear system of `constraints`, whose layout
    /// is the optimization layout.
    pub fn factorize(constraints: &BuiltObjective) -> FusionResult<Self> {
        let (a, b) = constraints.linear_system()?;
        Self::from_system(constraints.layout().clone(), a, b)
    }

    pub fn from_system(layout: StateLayout, a: Array2<f64>, b: Array1<f64>) -> FusionResult<Self> {
        let n = a.ncols();
        if n != layout.dim() {
            return Err(FusionError::DimensionMismatch {
                context: "constraint matrix columns".to_string(),
                expected: layout.dim(),
                got: n,
            });
        }
        if b.len() != a.nrows() {
            return Err(FusionError::DimensionMismatch {
                context: "constraint right-hand side".to_string(),
                expected: a.nrows(),
                got: b.len(),
            });
        }

        let mut pinned = Vec::new();
        let mut coupled_rows = Vec::new();
        let mut is_fixed = vec![false; n];
        for (i, row) in a.axis_iter(Axis(0)).enumerate() {
            let mut nonzero = row.iter().enumerate().filter(|(_, v)| **v != 0.0);
            match (nonzero.next(), nonzero.next()) {
                (Some((j, _)), None) => {
                    pinned.push((i, j));
                    is_fixed[j] = true;
                }
                _ => coupled_rows.push(i),
            }
        }
        let fixed_idx: Vec<usize> = (0..n).filter(|&j| is_fixed[j]).collect();
        let unfixed_idx: Vec<usize> = (0..n).filter(|&j| !is_fixed[j]).collect();

        let a_coupled = Array2::from_shape_fn((coupled_rows.len(), unfixed_idx.len()), |(i, j)| {
            a[[coupled_rows[i], unfixed_idx[j]]]
        });
        let svd = jacobi_svd(&a_coupled);
        let tol = svd.default_tolerance();
        let a_coupled_pinv = svd.pinv(tol);
        let z = svd.null_space(tol);
        if z.ncols() == 0 {
            return Err(FusionError::DegenerateBasis {
                message: format!(
                    "constraints fix all {n} variables ({} pinned, {} coupled rows)",
                    fixed_idx.len(),
                    coupled_rows.len()
                ),
            });
        }

        let mut eliminator = ConstraintEliminator {
            layout,
            a,
            b: Array1::zeros(0),
            pinned,
            fixed_idx,
            unfixed_idx,
            coupled_rows,
            a_coupled_pinv,
            xp: Array1::zeros(n),
            z,
        };
        eliminator.set_target(b)?;
        Ok(eliminator)
    }

    fn set_target(&mut self, b: Array1<f64>) -> FusionResult<()> {
        let n = self.a.ncols();
        let mut xp = Array1::zeros(n);
        for &(i, j) in &self.pinned {
            xp[j] = b[i] / self.a[[i, j]];
        }
        let rhs = Array1::from_iter(self.coupled_rows.iter().map(|&i| {
            let coupling: f64 = self.fixed_idx.iter().map(|&j| self.a[[i, j]] * xp[j]).sum();
            b[i] - coupling
        }));
        let free = self.a_coupled_pinv.dot(&rhs);
        for (k, &j) in self.unfixed_idx.iter().enumerate() {
            xp[j] = free[k];
        }

        let violation = norm(&(self.a.dot(&xp) - &b));
        let tolerance = CONSTRAINT_TOL * (1.0 + norm(&b));
        if violation > tolerance {
            return Err(FusionError::InfeasibleConstraint {
                residual_norm: violation,
                tolerance,
            });
        }
        self.xp = xp;
        self.b = b;
        Ok(())
    }

    /// Same `A` with a new right-hand side. `Z` is reused.
    pub fn retarget(&self, b: Array1<f64>) -> FusionResult<Self> {
        if b.len() != self.a.nrows() {
            return Err(FusionError::DimensionMismatch {
                context: "constraint right-hand side".to_string(),
                expected: self.a.nrows(),
                got: b.len(),
            });
        }
        let mut out = self.clone();
        out.set_target(b)?;
        Ok(out)
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn a(&self) -> &Array2<f64> {
        &self.a
    }

    pub fn b(&self) -> &Array1<f64> {
        &self.b
    }

    /// Particular solution `x_p`.
    pub fn xp(&self) -> &Array1<f64> {
        &self.xp
    }

    /// Null-space basis over the unfixed variables.
    pub fn z(&self) -> &Array2<f64> {
        &self.z
    }

    pub fn fixed_idx(&self) -> &[usize] {
        &self.fixed_idx
    }

    pub fn unfixed_idx(&self) -> &[usize] {
        &self.unfixed_idx
    }

    pub fn dim_x(&self) -> usize {
        self.a.ncols()
    }

    pub fn dim_reduced(&self) -> usize {
        self.z.ncols()
    }

    fn check(&self, len: usize, expected: usize, context: &str) -> FusionResult<()> {
        if len != expected {
            return Err(FusionError::DimensionMismatch {
                context: context.to_string(),
                expected,
                got: len,
            });
        }
        Ok(())
    }

    /// `r = Zᵀ (x[unfixed] − x_p[unfixed])`.
    pub fn project(&self, x: &Array1<f64>) -> FusionResult<Array1<f64>> {
        self.check(x.len(), self.dim_x(), "projecting state vector")?;
        let dx = Array1::from_iter(self.unfixed_idx.iter().map(|&j| x[j] - self.xp[j]));
        Ok(self.z.t().dot(&dx))
    }

    /// `x = x_p + Z r` with `Z r` scattered into the unfixed positions.
    pub fn recover(&self, r: &Array1<f64>) -> FusionResult<Array1<f64>> {
        self.check(r.len(), self.dim_reduced(), "recovering reduced vector")?;
        let mut x = self.xp.clone();
        let zr = self.z.dot(r);
        for (k, &j) in self.unfixed_idx.iter().enumerate() {
            x[j] += zr[k];
        }
        Ok(x)
    }

    /// `J[:, unfixed] · Z`.
    pub fn reduce_jacobian(&self, jac: &Array2<f64>) -> FusionResult<Array2<f64>> {
        self.check(jac.ncols(), self.dim_x(), "reducing jacobian columns")?;
        Ok(jac.select(Axis(1), &self.unfixed_idx).dot(&self.z))
    }

    /// `‖A x − b‖`.
    pub fn violation(&self, x: &Array1<f64>) -> FusionResult<f64> {
        self.check(x.len(), self.dim_x(), "constraint violation")?;
        Ok(norm(&(self.a.dot(x) - &self.b)))
    }
}

/// A least-squares problem restricted to the feasible set of an eliminator.
#[derive(Debug)]
pub struct LinearConstraintProjection<P> {
    problem: P,
    eliminator: ConstraintEliminator,
}

impl<P: LeastSquaresProblem> LinearConstraintProjection<P> {
    pub fn new(problem: P, eliminator: ConstraintEliminator) -> FusionResult<Self> {
        if problem.dim_x() != eliminator.dim_x() {
            return Err(FusionError::DimensionMismatch {
                context: "constraint projection".to_string(),
                expected: eliminator.dim_x(),
                got: problem.dim_x(),
            });
        }
        Ok(Self { problem, eliminator })
    }

    pub fn eliminator(&self) -> &ConstraintEliminator {
        &self.eliminator
    }

    pub fn problem(&self) -> &P {
        &self.problem
    }

    pub fn problem_mut(&mut self) -> &mut P {
        &mut self.problem
    }

    pub fn into_inner(self) -> P {
        self.problem
    }
}

impl<P: LeastSquaresProblem> LeastSquaresProblem for LinearConstraintProjection<P> {
    fn dim_x(&self) -> usize {
        self.eliminator.dim_reduced()
    }

    fn dim_f(&self) -> usize {
        self.problem.dim_f()
    }

    fn residual(&mut self, r: &Array1<f64>) -> FusionResult<Array1<f64>> {
        let x = self.eliminator.recover(r)?;
        self.problem.residual(&x)
    }

    fn jacobian(&mut self, r: &Array1<f64>) -> FusionResult<Array2<f64>> {
        let x = self.eliminator.recover(r)?;
        let jac = self.problem.jacobian(&x)?;
        self.eliminator.reduce_jacobian(&jac)
    }

    fn last_evaluation_trusted(&self) -> bool {
        self.problem.last_evaluation_trusted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusion_types::state::{Arg, Dimensions};
    use ndarray::array;

    fn layout(n: usize) -> StateLayout {
        StateLayout::new(&[Arg::RLmn], &Dimensions::new().with(Arg::RLmn, n))
    }

    #[test]
    fn test_pinned_and_coupled_rows() {
        // x0 = 2, x1 + x2 = 3, x3 free
        let a = array![[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 1.0, 0.0]];
        let b = array![2.0, 3.0];
        let e = ConstraintEliminator::from_system(layout(4), a, b).unwrap();
        assert_eq!(e.fixed_idx(), &[0]);
        assert_eq!(e.unfixed_idx(), &[1, 2, 3]);
        assert_eq!(e.dim_reduced(), 2);
        assert!(e.violation(e.xp()).unwrap() < 1e-12);

        let x = e.recover(&array![0.7, -1.3]).unwrap();
        assert!(e.violation(&x).unwrap() < 1e-12);
        assert_eq!(x[0], 2.0);
        let back = e.recover(&e.project(&x).unwrap()).unwrap();
        assert!(norm(&(&back - &x)) < 1e-12);
    }

    #[test]
    fn test_infeasible_rejected() {
        let a = array![[1.0, 0.0], [2.0, 0.0]];
        let err = ConstraintEliminator::from_system(layout(2), a, array![1.0, 1.0]).unwrap_err();
        assert!(matches!(err, FusionError::InfeasibleConstraint { .. }));
    }

    #[test]
    fn test_fully_determined_is_degenerate() {
        let a = array![[1.0, 1.0], [1.0, -1.0]];
        let err = ConstraintEliminator::from_system(layout(2), a, array![1.0, 0.0]).unwrap_err();
        assert!(matches!(err, FusionError::DegenerateBasis { .. }));
    }

    #[test]
    fn test_retarget_keeps_basis() {
        let a = array![[1.0, 0.0, 0.0], [0.0, 1.0, -1.0]];
        let e = ConstraintEliminator::from_system(layout(3), a, array![1.0, 0.0]).unwrap();
        let moved = e.retarget(array![4.0, 2.0]).unwrap();
        assert_eq!(moved.z(), e.z());
        assert_eq!(moved.xp()[0], 4.0);
        assert!(moved.violation(moved.xp()).unwrap() < 1e-12);
    }

    #[test]
    fn test_no_constraints_is_identity() {
        let e = ConstraintEliminator::from_system(layout(3), Array2::zeros((0, 3)), Array1::zeros(0)).unwrap();
        assert_eq!(e.dim_reduced(), 3);
        let x = array![1.0, -2.0, 0.5];
        let back = e.recover(&e.project(&x).unwrap()).unwrap();
        assert!(norm(&(&back - &x)) < 1e-12);
    }
}
