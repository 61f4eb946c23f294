// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Model Force Balance
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Nonlinear elliptic force residual evaluated at the collocation nodes.
//!
//! With `e_ρ = R_ρ Z_θ − R_θ Z_ρ` and the polar Laplacian
//! `Δ = ∂ρρ + ∂ρ/ρ + ∂θθ/ρ²`, every node contributes three rows:
//!
//! ```text
//! F_R = e_ρ (ΔR + ζ_r R_ζζ) − p_r μ0 ρ p'(ρ) R / Ψ²
//! F_Z = e_ρ (ΔZ + ζ_r Z_ζζ)
//! F_λ = e_r e_ρ (λ − ζ_r ι(ρ) R_ζ)
//! ```
//!
//! `p_r`, `ζ_r`, `e_r` are the continuation ratios. A boundary whose
//! geometry is linear in ρ and harmonic in the poloidal plane is an exact
//! vacuum solution, which makes the circular tokamak a closed-form check.

use std::f64::consts::PI;
use std::sync::Arc;

use fusion_types::config::ContinuationStep;
use fusion_types::constants::MU0_SI;
use fusion_types::error::FusionResult;
use fusion_types::state::{Arg, StateLayout};
use ndarray::{Array1, Array2, Zip};

use super::{BuiltResidual, NonlinearKernel, Residual, ResidualBuilder, ResidualKernel, ResidualOptions};
use crate::basis::Derivative;
use crate::equilibrium::{Equilibrium, RotationProfile};
use crate::profiles;

/// Continuation multipliers carried by the force residual.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceRatios {
    pub pres_ratio: f64,
    pub zeta_ratio: f64,
    pub errr_ratio: f64,
}

impl Default for ForceRatios {
    fn default() -> Self {
        ForceRatios {
            pres_ratio: 1.0,
            zeta_ratio: 1.0,
            errr_ratio: 1e-2,
        }
    }
}

impl From<&ContinuationStep> for ForceRatios {
    fn from(step: &ContinuationStep) -> Self {
        ForceRatios {
            pres_ratio: step.pres_ratio,
            zeta_ratio: step.zeta_ratio,
            errr_ratio: step.errr_ratio,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ForceBalance {
    ratios: ForceRatios,
    options: ResidualOptions,
}

impl ForceBalance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ratios(mut self, ratios: ForceRatios) -> Self {
        self.ratios = ratios;
        self
    }

    pub fn ratios(&self) -> ForceRatios {
        self.ratios
    }
}

impl ResidualBuilder for ForceBalance {
    fn options_mut(&mut self) -> &mut ResidualOptions {
        &mut self.options
    }
}

impl Residual for ForceBalance {
    fn name(&self) -> &str {
        "ForceBalance"
    }

    fn linear(&self) -> bool {
        false
    }

    fn build(&self, eq: &Equilibrium) -> FusionResult<BuiltResidual> {
        let basis = eq.basis();
        let grid = eq.grid();
        let design = |dr, dt, dz| basis.design_matrix(grid, Derivative::new(dr, dt, dz));
        let rho = grid.node_rho();
        let (rotation, rotation_scale) = match eq.rotation() {
            RotationProfile::Iota => (Arg::IL, 1.0),
            RotationProfile::Current => (Arg::CL, MU0_SI / (2.0 * PI)),
        };
        let kernel = ForceKernel {
            layout: StateLayout::new(
                &[Arg::RLmn, Arg::ZLmn, Arg::LLmn, Arg::PL, rotation, Arg::Psi],
                &eq.dimensions(),
            ),
            value: design(0, 0, 0),
            d_r: design(1, 0, 0),
            d_t: design(0, 1, 0),
            d_z: design(0, 0, 1),
            d_rr: design(2, 0, 0),
            d_tt: design(0, 2, 0),
            d_zz: design(0, 0, 2),
            pressure_slope: profiles::design_matrix(&rho, eq.block(Arg::PL).len(), 1),
            rotation_value: profiles::design_matrix(&rho, eq.block(rotation).len(), 0),
            rotation,
            rotation_scale,
            rho,
            ratios: self.ratios,
        };
        let dim_f = 3 * grid.num_nodes();
        let (goal, weight, normalization) = self.options.resolve(self.name(), dim_f, Array1::zeros(dim_f))?;
        Ok(BuiltResidual {
            name: self.name().to_string(),
            layout: kernel.layout.clone(),
            dim_f,
            goal,
            weight,
            normalization,
            kernel: ResidualKernel::Nonlinear(Arc::new(kernel)),
        })
    }
}

#[derive(Debug)]
struct ForceKernel {
    layout: StateLayout,
    value: Array2<f64>,
    d_r: Array2<f64>,
    d_t: Array2<f64>,
    d_z: Array2<f64>,
    d_rr: Array2<f64>,
    d_tt: Array2<f64>,
    d_zz: Array2<f64>,
    pressure_slope: Array2<f64>,
    rotation_value: Array2<f64>,
    rotation: Arg,
    /// 1 for ι, `μ0/2π` for a current profile (then divided by Ψ).
    rotation_scale: f64,
    rho: Array1<f64>,
    ratios: ForceRatios,
}

impl ForceKernel {
    fn laplacian(&self, c: &Array1<f64>) -> Array1<f64> {
        let mut out = self.d_rr.dot(c);
        Zip::from(&mut out)
            .and(&self.d_r.dot(c))
            .and(&self.d_tt.dot(c))
            .and(&self.d_zz.dot(c))
            .and(&self.rho)
            .for_each(|o, &x_r, &x_tt, &x_zz, &rho| {
                *o += x_r / rho + x_tt / (rho * rho) + self.ratios.zeta_ratio * x_zz;
            });
        out
    }
}

impl NonlinearKernel for ForceKernel {
    fn compute(&self, x: &Array1<f64>) -> Array1<f64> {
        let r_lmn = self.layout.block(x, Arg::RLmn).to_owned();
        let z_lmn = self.layout.block(x, Arg::ZLmn).to_owned();
        let l_lmn = self.layout.block(x, Arg::LLmn).to_owned();
        let pressure = self.layout.block(x, Arg::PL).to_owned();
        let rotation = self.layout.block(x, self.rotation).to_owned();
        let psi = self.layout.block(x, Arg::Psi).first().copied().unwrap_or(1.0);

        let r = self.value.dot(&r_lmn);
        let r_z = self.d_z.dot(&r_lmn);
        let lambda = self.value.dot(&l_lmn);
        let e_rho = self.d_r.dot(&r_lmn) * self.d_t.dot(&z_lmn) - self.d_t.dot(&r_lmn) * self.d_r.dot(&z_lmn);
        let dp = self.pressure_slope.dot(&pressure);
        let rotation_scale = match self.rotation {
            Arg::CL => self.rotation_scale / psi,
            _ => self.rotation_scale,
        };
        let iota = self.rotation_value.dot(&rotation) * rotation_scale;
        let lap_r = self.laplacian(&r_lmn);
        let lap_z = self.laplacian(&z_lmn);

        let n = r.len();
        let ForceRatios {
            pres_ratio,
            zeta_ratio,
            errr_ratio,
        } = self.ratios;
        let mut out = Array1::zeros(3 * n);
        for i in 0..n {
            let source = pres_ratio * MU0_SI * self.rho[i] * dp[i] * r[i] / (psi * psi);
            out[i] = e_rho[i] * lap_r[i] - source;
            out[n + i] = e_rho[i] * lap_z[i];
            out[2 * n + i] = errr_ratio * e_rho[i] * (lambda[i] - zeta_ratio * iota[i] * r_z[i]);
        }
        out
    }
}
