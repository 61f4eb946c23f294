// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Objective Composition
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Ordered residual lists and their immutable built form.
//!
//! Concatenation order is the insertion order of the residuals. A built
//! objective is a pure function of the state vector; rebuilding after a
//! resolution change yields a fresh instance.

use std::sync::Arc;
use std::time::Instant;

use fusion_types::error::{FusionError, FusionResult};
use fusion_types::state::StateLayout;
use ndarray::{s, Array1, Array2};

use super::{BuiltResidual, Goal, Residual, ResidualKernel};
use crate::equilibrium::Equilibrium;
use crate::oracle::{CentralDifference, DifferentiationOracle};

/// Unbuilt list of residuals.
#[derive(Debug, Clone, Default)]
pub struct ObjectiveComposite {
    residuals: Vec<Arc<dyn Residual>>,
    verbose: u8,
}

impl ObjectiveComposite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, residual: impl Residual + 'static) -> Self {
        self.with_shared(Arc::new(residual))
    }

    pub fn with_shared(mut self, residual: Arc<dyn Residual>) -> Self {
        self.residuals.push(residual);
        self
    }

    /// 3 logs build timings.
    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn residuals(&self) -> &[Arc<dyn Residual>] {
        &self.residuals
    }

    pub fn len(&self) -> usize {
        self.residuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residuals.is_empty()
    }

    /// Build over the equilibrium's full state layout.
    pub fn build(&self, eq: &Equilibrium) -> FusionResult<BuiltObjective> {
        self.build_on(eq, &eq.layout())
    }

    /// Build over `layout`, which must contain every block the residuals read.
    pub fn build_on(&self, eq: &Equilibrium, layout: &StateLayout) -> FusionResult<BuiltObjective> {
        let mut built = Vec::with_capacity(self.residuals.len());
        let mut columns = Vec::with_capacity(self.residuals.len());
        for residual in &self.residuals {
            let start = Instant::now();
            let r = residual.build(eq)?;
            let mut cols = Vec::with_capacity(r.layout.dim());
            for &arg in r.layout.args() {
                if r.layout.size(arg) == 0 {
                    continue;
                }
                let range = layout.range(arg).ok_or_else(|| FusionError::Build {
                    objective: r.name.clone(),
                    message: format!("block {arg} is not part of the optimization layout"),
                })?;
                if range.len() != r.layout.size(arg) {
                    return Err(FusionError::DimensionMismatch {
                        context: format!("{} block {arg}", r.name),
                        expected: r.layout.size(arg),
                        got: range.len(),
                    });
                }
                cols.extend(range);
            }
            if self.verbose >= 3 {
                log::info!(
                    "built {} (dim_f = {}) in {:.3} ms",
                    r.name,
                    r.dim_f,
                    start.elapsed().as_secs_f64() * 1e3
                );
            }
            columns.push(cols);
            built.push(r);
        }
        let mut row_offsets = Vec::with_capacity(built.len() + 1);
        row_offsets.push(0);
        for r in &built {
            let last = row_offsets[row_offsets.len() - 1];
            row_offsets.push(last + r.dim_f);
        }
        Ok(BuiltObjective {
            residuals: built,
            columns,
            row_offsets,
            layout: layout.clone(),
            oracle: Arc::new(CentralDifference::default()),
        })
    }
}

/// Immutable objective over a fixed state layout.
#[derive(Debug, Clone)]
pub struct BuiltObjective {
    residuals: Vec<BuiltResidual>,
    /// Absolute state indices read by each residual, in its own layout order.
    columns: Vec<Vec<usize>>,
    row_offsets: Vec<usize>,
    layout: StateLayout,
    oracle: Arc<dyn DifferentiationOracle>,
}

impl BuiltObjective {
    pub fn with_oracle(mut self, oracle: Arc<dyn DifferentiationOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn residuals(&self) -> &[BuiltResidual] {
        &self.residuals
    }

    pub fn dim_x(&self) -> usize {
        self.layout.dim()
    }

    pub fn dim_f(&self) -> usize {
        self.row_offsets[self.row_offsets.len() - 1]
    }

    pub fn is_linear(&self) -> bool {
        self.residuals.iter().all(BuiltResidual::is_linear)
    }

    fn check(&self, x: &Array1<f64>) -> FusionResult<()> {
        if x.len() != self.dim_x() {
            return Err(FusionError::DimensionMismatch {
                context: "objective state vector".to_string(),
                expected: self.dim_x(),
                got: x.len(),
            });
        }
        Ok(())
    }

    fn sub_state(&self, i: usize, x: &Array1<f64>) -> Array1<f64> {
        Array1::from_iter(self.columns[i].iter().map(|&c| x[c]))
    }

    fn concat(&self, mut part: impl FnMut(usize, &BuiltResidual) -> Array1<f64>) -> Array1<f64> {
        let mut out = Array1::zeros(self.dim_f());
        for (i, r) in self.residuals.iter().enumerate() {
            let rows = self.row_offsets[i]..self.row_offsets[i + 1];
            out.slice_mut(s![rows]).assign(&part(i, r));
        }
        out
    }

    fn scaled_error_unchecked(&self, x: &Array1<f64>) -> Array1<f64> {
        self.concat(|i, r| {
            let value = r.compute(&self.sub_state(i, x));
            r.scale(r.goal.error(&value))
        })
    }

    /// Concatenated raw residual values.
    pub fn compute_unscaled(&self, x: &Array1<f64>) -> FusionResult<Array1<f64>> {
        self.check(x)?;
        Ok(self.concat(|i, r| r.compute(&self.sub_state(i, x))))
    }

    /// Raw values times weight over normalization, without target shift.
    pub fn compute_scaled(&self, x: &Array1<f64>) -> FusionResult<Array1<f64>> {
        self.check(x)?;
        Ok(self.concat(|i, r| r.scale(r.compute(&self.sub_state(i, x)))))
    }

    /// Target-shifted (or bound-clamped) and scaled residuals.
    pub fn compute_scaled_error(&self, x: &Array1<f64>) -> FusionResult<Array1<f64>> {
        self.check(x)?;
        Ok(self.scaled_error_unchecked(x))
    }

    /// `½‖compute_scaled_error(x)‖²`.
    pub fn compute_scalar(&self, x: &Array1<f64>) -> FusionResult<f64> {
        let e = self.compute_scaled_error(x)?;
        Ok(0.5 * e.dot(&e))
    }

    fn residual_jacobian(&self, i: usize, x: &Array1<f64>) -> Array2<f64> {
        let r = &self.residuals[i];
        match &r.kernel {
            ResidualKernel::Linear { a } => a.clone(),
            ResidualKernel::Nonlinear(kernel) => {
                let f = |xs: &Array1<f64>| kernel.compute(xs);
                self.oracle.jacobian(&f, &self.sub_state(i, x))
            }
        }
    }

    fn assemble_jacobian(&self, x: &Array1<f64>, scaled: bool) -> Array2<f64> {
        let mut jac = Array2::zeros((self.dim_f(), self.dim_x()));
        for (i, r) in self.residuals.iter().enumerate() {
            let block = self.residual_jacobian(i, x);
            let scale = if scaled {
                r.row_scale()
            } else {
                Array1::ones(r.dim_f)
            };
            let row0 = self.row_offsets[i];
            for (k, &col) in self.columns[i].iter().enumerate() {
                for row in 0..r.dim_f {
                    jac[[row0 + row, col]] = block[[row, k]] * scale[row];
                }
            }
        }
        jac
    }

    /// Jacobian of [`BuiltObjective::compute_scaled`]. Exact for linear
    /// residuals, from the oracle otherwise.
    pub fn jacobian_scaled(&self, x: &Array1<f64>) -> FusionResult<Array2<f64>> {
        self.check(x)?;
        Ok(self.assemble_jacobian(x, true))
    }

    pub fn jacobian_unscaled(&self, x: &Array1<f64>) -> FusionResult<Array2<f64>> {
        self.check(x)?;
        Ok(self.assemble_jacobian(x, false))
    }

    /// `J·v` of the scaled residuals.
    pub fn jvp_scaled(&self, x: &Array1<f64>, v: &Array1<f64>) -> FusionResult<Array1<f64>> {
        self.check(x)?;
        self.check(v)?;
        Ok(self.concat(|i, r| {
            let vs = self.sub_state(i, v);
            let jv = match &r.kernel {
                ResidualKernel::Linear { a } => a.dot(&vs),
                ResidualKernel::Nonlinear(kernel) => {
                    let f = |xs: &Array1<f64>| kernel.compute(xs);
                    self.oracle.jvp(&f, &self.sub_state(i, x), &vs)
                }
            };
            jv * &r.row_scale()
        }))
    }

    /// `Jᵀ·v` of the scaled residuals.
    pub fn vjp_scaled(&self, x: &Array1<f64>, v: &Array1<f64>) -> FusionResult<Array1<f64>> {
        self.check(x)?;
        if v.len() != self.dim_f() {
            return Err(FusionError::DimensionMismatch {
                context: "vector-jacobian product cotangent".to_string(),
                expected: self.dim_f(),
                got: v.len(),
            });
        }
        let mut out = Array1::zeros(self.dim_x());
        for (i, r) in self.residuals.iter().enumerate() {
            let rows = self.row_offsets[i]..self.row_offsets[i + 1];
            let w = &v.slice(s![rows]).to_owned() * &r.row_scale();
            let vj = match &r.kernel {
                ResidualKernel::Linear { a } => a.t().dot(&w),
                ResidualKernel::Nonlinear(kernel) => {
                    let f = |xs: &Array1<f64>| kernel.compute(xs);
                    self.oracle.vjp(&f, &self.sub_state(i, x), &w)
                }
            };
            for (k, &col) in self.columns[i].iter().enumerate() {
                out[col] += vj[k];
            }
        }
        Ok(out)
    }

    /// Gradient of [`BuiltObjective::compute_scalar`].
    pub fn gradient(&self, x: &Array1<f64>) -> FusionResult<Array1<f64>> {
        let e = self.compute_scaled_error(x)?;
        self.vjp_scaled(x, &e)
    }

    /// Hessian of [`BuiltObjective::compute_scalar`] from the oracle.
    pub fn hessian(&self, x: &Array1<f64>) -> FusionResult<Array2<f64>> {
        self.check(x)?;
        let f = |y: &Array1<f64>| {
            let e = self.scaled_error_unchecked(y);
            0.5 * e.dot(&e)
        };
        Ok(self.oracle.hessian(&f, x))
    }

    /// Stacked `(A, b)` of an all-linear objective, with `A` aligned to the
    /// objective layout. Bounded residuals cannot be eliminated.
    pub fn linear_system(&self) -> FusionResult<(Array2<f64>, Array1<f64>)> {
        let mut a_full = Array2::zeros((self.dim_f(), self.dim_x()));
        let mut b = Array1::zeros(self.dim_f());
        for (i, r) in self.residuals.iter().enumerate() {
            let ResidualKernel::Linear { a } = &r.kernel else {
                return Err(FusionError::Build {
                    objective: r.name.clone(),
                    message: "nonlinear residual cannot be used as a linear constraint".to_string(),
                });
            };
            let Goal::Target(target) = &r.goal else {
                return Err(FusionError::Build {
                    objective: r.name.clone(),
                    message: "bounded residual cannot be used as an equality constraint".to_string(),
                });
            };
            let row0 = self.row_offsets[i];
            for (k, &col) in self.columns[i].iter().enumerate() {
                for row in 0..r.dim_f {
                    a_full[[row0 + row, col]] = a[[row, k]];
                }
            }
            b.slice_mut(s![row0..row0 + r.dim_f]).assign(target);
        }
        Ok((a_full, b))
    }

    /// Per-residual norms of the scaled error, logged at info level.
    pub fn report(&self, x: &Array1<f64>) -> FusionResult<Vec<(String, f64)>> {
        let e = self.compute_scaled_error(x)?;
        let mut lines = Vec::with_capacity(self.residuals.len());
        for (i, r) in self.residuals.iter().enumerate() {
            let part = e.slice(s![self.row_offsets[i]..self.row_offsets[i + 1]]);
            let norm = part.dot(&part).sqrt();
            log::info!("{:<24} |f| = {:.6e} ({} residuals)", r.name, norm, r.dim_f);
            lines.push((r.name.clone(), norm));
        }
        log::info!("{:<24} cost = {:.6e}", "total", 0.5 * e.dot(&e));
        Ok(lines)
    }
}
