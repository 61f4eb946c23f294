// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Stream Function Gauge
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! λ is defined up to a flux function; pin its poloidal average on axis.

use fusion_math::spectral::zernike_radial;
use fusion_types::error::FusionResult;
use fusion_types::state::{Arg, StateLayout};
use ndarray::{Array1, Array2};

use super::{BuiltResidual, Residual, ResidualBuilder, ResidualKernel, ResidualOptions};
use crate::equilibrium::Equilibrium;

/// `Σ_l λ_l0n · R_l^0(0) = 0` for every toroidal mode number `n`.
#[derive(Debug, Clone, Default)]
pub struct FixLambdaGauge {
    options: ResidualOptions,
}

impl FixLambdaGauge {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResidualBuilder for FixLambdaGauge {
    fn options_mut(&mut self) -> &mut ResidualOptions {
        &mut self.options
    }
}

impl Residual for FixLambdaGauge {
    fn name(&self) -> &str {
        "FixLambdaGauge"
    }

    fn linear(&self) -> bool {
        true
    }

    fn build(&self, eq: &Equilibrium) -> FusionResult<BuiltResidual> {
        let basis = eq.basis();
        let n_max = basis.n_max() as i32;
        let mut a = Array2::zeros(((2 * n_max + 1) as usize, basis.num_modes()));
        for (i, mode) in basis.modes().iter().enumerate() {
            if mode.m == 0 {
                a[[(mode.n + n_max) as usize, i]] = zernike_radial(0.0, mode.l, 0, 0);
            }
        }
        let dim_f = a.nrows();
        let (goal, weight, normalization) = self.options.resolve(self.name(), dim_f, Array1::zeros(dim_f))?;
        Ok(BuiltResidual {
            name: self.name().to_string(),
            layout: StateLayout::new(&[Arg::LLmn], &eq.dimensions()),
            dim_f,
            goal,
            weight,
            normalization,
            kernel: ResidualKernel::Linear { a },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equilibrium::{Resolution, RotationProfile};

    #[test]
    fn test_gauge_signs_alternate_with_radial_order() {
        let res = Resolution { m: 4, n: 1, m_nodes: 4, n_nodes: 1 };
        let eq = Equilibrium::new(2, res, RotationProfile::Iota, (1, 1), 1.0);
        let r = FixLambdaGauge::new().build(&eq).unwrap();
        assert_eq!(r.dim_f, 3);
        let ResidualKernel::Linear { a } = &r.kernel else {
            panic!("expected linear kernel");
        };
        let basis = eq.basis();
        for (i, mode) in basis.modes().iter().enumerate() {
            let row = (mode.n + 1) as usize;
            let expected = match (mode.m, mode.l) {
                (0, 0) | (0, 4) => 1.0,
                (0, 2) => -1.0,
                _ => 0.0,
            };
            assert_eq!(a[[row, i]], expected, "mode {mode:?}");
        }
    }
}
