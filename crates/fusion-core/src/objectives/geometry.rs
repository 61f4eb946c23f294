// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Geometric Objectives
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Shape targets measured on the last closed flux surface.

use std::f64::consts::PI;
use std::sync::Arc;

use fusion_types::error::FusionResult;
use fusion_types::state::{Arg, StateLayout};
use ndarray::{Array1, Array2};

use super::{BuiltResidual, NonlinearKernel, Residual, ResidualBuilder, ResidualKernel, ResidualOptions};
use crate::basis::Derivative;
use crate::equilibrium::Equilibrium;
use crate::grid::Grid;

const MIN_POLOIDAL_POINTS: usize = 16;

/// Major radius over minor radius of the boundary surface.
///
/// Cross sections are traced as polygons in every toroidal plane; the
/// major radius is the mean area centroid and the minor radius is
/// `sqrt(⟨|A|⟩ / π)`. Defaults to a target of 2.
#[derive(Debug, Clone, Default)]
pub struct AspectRatio {
    options: ResidualOptions,
}

impl AspectRatio {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResidualBuilder for AspectRatio {
    fn options_mut(&mut self) -> &mut ResidualOptions {
        &mut self.options
    }
}

impl Residual for AspectRatio {
    fn name(&self) -> &str {
        "AspectRatio"
    }

    fn linear(&self) -> bool {
        false
    }

    fn build(&self, eq: &Equilibrium) -> FusionResult<BuiltResidual> {
        let res = eq.resolution();
        let n_theta = 2 * res.m_nodes.max(MIN_POLOIDAL_POINTS) + 1;
        let n_zeta = 2 * res.n_nodes + 1;
        let grid = Grid::surface(1.0, n_theta, n_zeta, eq.nfp());
        let kernel = AspectKernel {
            layout: StateLayout::new(&[Arg::RLmn, Arg::ZLmn], &eq.dimensions()),
            value: eq.basis().design_matrix(&grid, Derivative::VALUE),
            n_theta,
            n_zeta,
        };
        let (goal, weight, normalization) = self.options.resolve(self.name(), 1, Array1::from(vec![2.0]))?;
        Ok(BuiltResidual {
            name: self.name().to_string(),
            layout: kernel.layout.clone(),
            dim_f: 1,
            goal,
            weight,
            normalization,
            kernel: ResidualKernel::Nonlinear(Arc::new(kernel)),
        })
    }
}

#[derive(Debug)]
struct AspectKernel {
    layout: StateLayout,
    value: Array2<f64>,
    n_theta: usize,
    n_zeta: usize,
}

impl NonlinearKernel for AspectKernel {
    fn compute(&self, x: &Array1<f64>) -> Array1<f64> {
        let r = self.value.dot(&self.layout.block(x, Arg::RLmn));
        let z = self.value.dot(&self.layout.block(x, Arg::ZLmn));
        let mut area_sum = 0.0;
        let mut centroid_sum = 0.0;
        for iz in 0..self.n_zeta {
            let base = iz * self.n_theta;
            let mut area = 0.0;
            let mut moment = 0.0;
            for it in 0..self.n_theta {
                let i = base + it;
                let j = base + (it + 1) % self.n_theta;
                let cross = r[i] * z[j] - r[j] * z[i];
                area += cross;
                moment += (r[i] + r[j]) * cross;
            }
            area *= 0.5;
            centroid_sum += moment / (6.0 * area);
            area_sum += area.abs();
        }
        let planes = self.n_zeta as f64;
        let minor = (area_sum / planes / PI).sqrt();
        Array1::from(vec![centroid_sum / planes / minor])
    }
}
