// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Proximal Projection
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Bi-level optimization with the equilibrium as an implicit function.
//!
//! Outer variables `c` are the boundary, profile and flux blocks. For each
//! `c` the interior coefficients are re-solved so that the force residual
//! `F(x) = 0`, and the outer objective `G` is evaluated on that
//! equilibrium. Derivatives follow from the implicit function theorem:
//!
//! ```text
//! dG/dc = G_x·dxdc − G_x,red · (F_x,red)⁺ · F_x·dxdc
//! ```
//!
//! where `red` denotes columns reduced onto the null space of the fixed
//! boundary constraints and `dxdc` maps `c` onto the full state.

use std::collections::{HashMap, VecDeque};

use fusion_math::linalg::{jac_scale, jacobi_svd, pinv};
use fusion_types::constants::EPS;
use fusion_types::error::{FusionError, FusionResult};
use fusion_types::state::{Arg, StateLayout};
use ndarray::{s, Array1, Array2, Axis};

use crate::constraints::{ConstraintEliminator, LinearConstraintProjection};
use crate::equilibrium::Equilibrium;
use crate::objectives::{
    get_fixed_boundary_constraints, BuiltObjective, FixBoundaryR, FixBoundaryZ, FixedBoundaryMode,
    ObjectiveComposite, Residual, ResidualKernel,
};
use crate::solvers::{trust_region_lsq, LeastSquaresProblem, OptimResult, TrustRegionConfig};

/// Blocks that make up the outer variables, in global order.
pub const OUTER_ARGS: [Arg; 6] = [Arg::RbLmn, Arg::ZbLmn, Arg::PL, Arg::IL, Arg::CL, Arg::Psi];

/// Number of distinct `c` whose equilibria are remembered.
pub const CACHE_CAPACITY: usize = 32;

type CacheKey = Vec<u64>;

fn cache_key(c: &Array1<f64>) -> CacheKey {
    c.iter().map(|v| v.to_bits()).collect()
}

#[derive(Debug, Clone)]
struct CachedSolve {
    x: Array1<f64>,
    converged: bool,
}

/// Exact-match memo of re-solved equilibria with first-in first-out eviction.
#[derive(Debug, Default)]
struct SolveCache {
    entries: HashMap<CacheKey, CachedSolve>,
    order: VecDeque<CacheKey>,
}

impl SolveCache {
    fn get(&self, key: &CacheKey) -> Option<&CachedSolve> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: CacheKey, value: CachedSolve) {
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > CACHE_CAPACITY {
            if let Some(old) = self.order.pop_front() {
                self.entries.remove(&old);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// `(F̂x)⁺·Fc` from an SVD whose singular values are all lifted by the
/// smallest one. Values still below `ε·max(m, n)·σ_max` are dropped.
fn regularized_solve(fxh: &Array2<f64>, fc: &Array2<f64>) -> Array2<f64> {
    let svd = jacobi_svd(fxh);
    let floor = svd.s.last().copied().unwrap_or(0.0);
    let regularized = svd.s.mapv(|v| v + floor);
    let smax = regularized.first().copied().unwrap_or(0.0);
    let cutoff = EPS * fxh.nrows().max(fxh.ncols()) as f64 * smax;
    let keep = regularized.iter().take_while(|&&v| v > cutoff).count();

    // V_k diag(1/σ_k) U_kᵀ Fc
    let u_k = svd.u.slice(s![.., ..keep]);
    let mut coeffs = u_k.t().dot(fc);
    for (mut row, &sigma) in coeffs.axis_iter_mut(Axis(0)).zip(regularized.iter()) {
        row.mapv_inplace(|v| v / sigma);
    }
    let v_k = svd.vt.slice(s![..keep, ..]);
    v_k.t().dot(&coeffs)
}

/// Outer least-squares problem over `c` with the equilibrium re-solved on
/// every new evaluation point.
#[derive(Debug)]
pub struct ProximalProjection {
    /// Equilibrium at the last stored `c`.
    eq: Equilibrium,
    objective: BuiltObjective,
    equation: BuiltObjective,
    inner_constraints: ObjectiveComposite,
    inner: ConstraintEliminator,
    inner_config: TrustRegionConfig,
    c_layout: StateLayout,
    x_layout: StateLayout,
    dxdc: Array2<f64>,
    c_base: Array1<f64>,
    x_base: Array1<f64>,
    cache: SolveCache,
    history: Vec<Array1<f64>>,
    last_trusted: bool,
    inner_solves: usize,
}

impl ProximalProjection {
    /// `objective` is the outer target `G`, `equation` the force residual
    /// `F` that must vanish at every outer iterate.
    pub fn new(
        eq: &Equilibrium,
        objective: &ObjectiveComposite,
        equation: &ObjectiveComposite,
        inner_config: TrustRegionConfig,
    ) -> FusionResult<Self> {
        let x_layout = eq.layout();
        let c_layout = StateLayout::new(&OUTER_ARGS, &eq.dimensions());
        let objective = objective.build(eq)?;
        let equation = equation.build(eq)?;
        if equation.is_linear() {
            log::warn!("proximal equation residual is linear; the inner solve is a projection");
        }
        let inner_constraints = get_fixed_boundary_constraints(eq);
        let inner = ConstraintEliminator::factorize(&inner_constraints.build(eq)?)?;
        let dxdc = Self::build_dxdc(eq, &x_layout, &c_layout)?;
        let x_base = eq.state();
        let c_base = c_layout.restrict(&x_base, &x_layout)?;
        Ok(ProximalProjection {
            eq: eq.clone(),
            objective,
            equation,
            inner_constraints,
            inner,
            inner_config,
            c_layout,
            x_layout,
            dxdc,
            history: vec![c_base.clone()],
            c_base,
            x_base,
            cache: SolveCache::default(),
            last_trusted: true,
            inner_solves: 0,
        })
    }

    /// Identity on every outer block plus the interior response
    /// `(A_R)⁺` that keeps the interior-boundary link satisfied when the
    /// surface coefficients move.
    fn build_dxdc(eq: &Equilibrium, x_layout: &StateLayout, c_layout: &StateLayout) -> FusionResult<Array2<f64>> {
        let mut dxdc = Array2::zeros((x_layout.dim(), c_layout.dim()));
        for &arg in c_layout.args() {
            let (Some(rows), Some(cols)) = (x_layout.range(arg), c_layout.range(arg)) else {
                continue;
            };
            for (i, j) in rows.zip(cols) {
                dxdc[[i, j]] = 1.0;
            }
        }
        let links: [(Box<dyn Residual>, Arg, Arg); 2] = [
            (
                Box::new(FixBoundaryR::new(FixedBoundaryMode::OnEquilibriumCoefficients)),
                Arg::RLmn,
                Arg::RbLmn,
            ),
            (
                Box::new(FixBoundaryZ::new(FixedBoundaryMode::OnEquilibriumCoefficients)),
                Arg::ZLmn,
                Arg::ZbLmn,
            ),
        ];
        for (residual, interior, surface) in links {
            let built = residual.build(eq)?;
            let ResidualKernel::Linear { a } = &built.kernel else {
                continue;
            };
            let n_int = built.layout.size(interior);
            let a_int = a.slice(s![.., ..n_int]).to_owned();
            // rows follow the surface modes one-to-one
            let response = pinv(&a_int);
            let (Some(rows), Some(cols)) = (x_layout.range(interior), c_layout.range(surface)) else {
                continue;
            };
            dxdc.slice_mut(s![rows, cols]).assign(&response);
        }
        Ok(dxdc)
    }

    pub fn c_layout(&self) -> &StateLayout {
        &self.c_layout
    }

    /// Outer variables of the stored equilibrium.
    pub fn c(&self) -> &Array1<f64> {
        &self.c_base
    }

    pub fn equilibrium(&self) -> &Equilibrium {
        &self.eq
    }

    /// Every stored outer iterate, starting with the initial one.
    pub fn history(&self) -> &[Array1<f64>] {
        &self.history
    }

    /// Number of nested solves run so far; cache hits do not count.
    pub fn inner_solves(&self) -> usize {
        self.inner_solves
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    pub fn dxdc(&self) -> &Array2<f64> {
        &self.dxdc
    }

    fn check_c(&self, c: &Array1<f64>) -> FusionResult<()> {
        if c.len() != self.c_layout.dim() {
            return Err(FusionError::DimensionMismatch {
                context: "proximal outer variables".to_string(),
                expected: self.c_layout.dim(),
                got: c.len(),
            });
        }
        Ok(())
    }

    /// Constraint set of the inner problem with targets taken from `x`.
    fn inner_eliminator(&self, x: &Array1<f64>) -> FusionResult<(Equilibrium, ConstraintEliminator)> {
        let eq = self.eq.with_state(x)?;
        let (_, b) = self.inner_constraints.build(&eq)?.linear_system()?;
        let eliminator = self.inner.retarget(b)?;
        Ok((eq, eliminator))
    }

    /// Equilibrium state for `c`. Perturbs the stored baseline along
    /// `dxdc`, takes one linearized step on `F` and re-solves it with the
    /// trust-region method. With `store` the result becomes the baseline
    /// for later perturbations.
    pub fn update_equilibrium(&mut self, c: &Array1<f64>, store: bool) -> FusionResult<Array1<f64>> {
        self.check_c(c)?;
        let key = cache_key(c);
        let (x, converged) = match self.cache.get(&key) {
            Some(hit) => (hit.x.clone(), hit.converged),
            None => {
                let solved = self.solve_inner(c)?;
                self.cache.insert(key, solved.clone());
                (solved.x, solved.converged)
            }
        };
        self.last_trusted = converged;
        if store {
            let (eq, inner) = self.inner_eliminator(&x)?;
            self.eq = eq;
            self.inner = inner;
            self.x_base = x.clone();
            self.c_base = c.clone();
            self.history.push(c.clone());
        }
        Ok(x)
    }

    fn solve_inner(&mut self, c: &Array1<f64>) -> FusionResult<CachedSolve> {
        let dc = c - &self.c_base;
        let x_pert = &self.x_base + &self.dxdc.dot(&dc);
        let (_, eliminator) = self.inner_eliminator(&x_pert)?;
        let r0 = eliminator.project(&x_pert)?;

        let mut problem = LinearConstraintProjection::new(self.equation.clone(), eliminator)?;
        let f0 = problem.residual(&r0)?;
        let j0 = problem.jacobian(&r0)?;
        let r1 = &r0 - &pinv(&j0).dot(&f0);
        let f1 = problem.residual(&r1)?;
        let start = if f1.dot(&f1) < f0.dot(&f0) { r1 } else { r0 };

        let result: OptimResult = trust_region_lsq(&mut problem, &start, &self.inner_config)?;
        self.inner_solves += 1;
        if !result.converged {
            log::warn!(
                "{}; outer step will be rejected",
                FusionError::InnerSolveDivergence {
                    iterations: result.iterations,
                    cost: result.cost,
                }
            );
        }
        let x = problem.eliminator().recover(&result.x)?;
        Ok(CachedSolve {
            x,
            converged: result.converged,
        })
    }

    /// Full state of the equilibrium for `c`, without committing it.
    pub fn state_at(&mut self, c: &Array1<f64>) -> FusionResult<Array1<f64>> {
        self.update_equilibrium(c, false)
    }

    /// Implicit-function Jacobian of the scaled outer error w.r.t. `c`.
    /// Stores the equilibrium for `c` as the new baseline.
    pub fn jacobian_scaled(&mut self, c: &Array1<f64>) -> FusionResult<Array2<f64>> {
        let x = self.update_equilibrium(c, true)?;
        let fx = self.equation.jacobian_scaled(&x)?;
        let gx = self.objective.jacobian_scaled(&x)?;
        let fc = fx.dot(&self.dxdc);
        let gc = gx.dot(&self.dxdc);
        let fx_red = self.inner.reduce_jacobian(&fx)?;
        let gx_red = self.inner.reduce_jacobian(&gx)?;
        if fx_red.ncols() == 0 {
            return Ok(gc);
        }

        let (wx, _) = jac_scale(fx_red.view());
        let fxh = &fx_red * &wx;
        let gxh = &gx_red * &wx;
        let dr_dc = regularized_solve(&fxh, &fc);
        Ok(gc - gxh.dot(&dr_dc))
    }

    /// Committed equilibrium after an outer solve.
    pub fn into_equilibrium(self) -> Equilibrium {
        self.eq
    }

    pub fn x_layout(&self) -> &StateLayout {
        &self.x_layout
    }
}

impl LeastSquaresProblem for ProximalProjection {
    fn dim_x(&self) -> usize {
        self.c_layout.dim()
    }

    fn dim_f(&self) -> usize {
        self.objective.dim_f()
    }

    fn residual(&mut self, c: &Array1<f64>) -> FusionResult<Array1<f64>> {
        let x = self.update_equilibrium(c, false)?;
        self.objective.compute_scaled_error(&x)
    }

    fn jacobian(&mut self, c: &Array1<f64>) -> FusionResult<Array2<f64>> {
        self.jacobian_scaled(c)
    }

    fn last_evaluation_trusted(&self) -> bool {
        self.last_trusted
    }
}

/// Solver settings for both levels of a proximal solve.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximalConfig {
    pub outer: TrustRegionConfig,
    pub inner: TrustRegionConfig,
}

impl Default for ProximalConfig {
    fn default() -> Self {
        ProximalConfig {
            outer: TrustRegionConfig::default(),
            inner: TrustRegionConfig {
                verbose: 0,
                ..TrustRegionConfig::default()
            },
        }
    }
}

#[derive(Debug)]
pub struct ProximalOutcome {
    pub equilibrium: Equilibrium,
    pub result: OptimResult,
    pub history: Vec<Array1<f64>>,
    pub inner_solves: usize,
}

/// Minimise `objective` over the outer variables subject to the linear
/// `constraints` (built on the outer layout) while `equation` holds.
pub fn solve_proximal(
    eq: &Equilibrium,
    objective: &ObjectiveComposite,
    constraints: &ObjectiveComposite,
    equation: &ObjectiveComposite,
    config: &ProximalConfig,
) -> FusionResult<ProximalOutcome> {
    let projection = ProximalProjection::new(eq, objective, equation, config.inner.clone())?;
    let outer = ConstraintEliminator::factorize(&constraints.build_on(eq, projection.c_layout())?)?;
    let r0 = outer.project(projection.c())?;
    let mut problem = LinearConstraintProjection::new(projection, outer)?;
    let result = trust_region_lsq(&mut problem, &r0, &config.outer)?;

    let c = problem.eliminator().recover(&result.x)?;
    let mut projection = problem.into_inner();
    projection.update_equilibrium(&c, true)?;
    let history = projection.history().to_vec();
    let inner_solves = projection.inner_solves();
    Ok(ProximalOutcome {
        equilibrium: projection.into_equilibrium(),
        result,
        history,
        inner_solves,
    })
}
