// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Profile and Flux Constraints
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Linear residuals fixing profile coefficients and the enclosed flux.

use fusion_types::error::{FusionError, FusionResult};
use fusion_types::state::{Arg, StateLayout};
use ndarray::Array1;

use super::{
    selection_matrix, BuiltResidual, ModeSelection, Residual, ResidualBuilder, ResidualKernel,
    ResidualOptions,
};
use crate::equilibrium::{Equilibrium, RotationProfile};

fn fix_block(
    name: &str,
    arg: Arg,
    eq: &Equilibrium,
    modes: &ModeSelection<usize>,
    options: &ResidualOptions,
) -> FusionResult<BuiltResidual> {
    let current = eq.block(arg);
    let size = current.len();
    let rows = modes.select(name, size, |l| (l < size).then_some(l));
    let a = selection_matrix(&rows, size);
    let default_target = Array1::from_iter(rows.iter().map(|&j| current[j]));
    let dim_f = rows.len();
    let (goal, weight, normalization) = options.resolve(name, dim_f, default_target)?;
    Ok(BuiltResidual {
        name: name.to_string(),
        layout: StateLayout::new(&[arg], &eq.dimensions()),
        dim_f,
        goal,
        weight,
        normalization,
        kernel: ResidualKernel::Linear { a },
    })
}

macro_rules! profile_residual {
    ($(#[$doc:meta])* $ty:ident, $name:literal, $arg:expr, $required:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default)]
        pub struct $ty {
            modes: ModeSelection<usize>,
            options: ResidualOptions,
        }

        impl $ty {
            pub fn new() -> Self {
                Self::default()
            }

            /// Restrict to power-series orders `l`.
            pub fn with_modes(mut self, modes: ModeSelection<usize>) -> Self {
                self.modes = modes;
                self
            }
        }

        impl ResidualBuilder for $ty {
            fn options_mut(&mut self) -> &mut ResidualOptions {
                &mut self.options
            }
        }

        impl Residual for $ty {
            fn name(&self) -> &str {
                $name
            }

            fn linear(&self) -> bool {
                true
            }

            fn build(&self, eq: &Equilibrium) -> FusionResult<BuiltResidual> {
                let required: Option<RotationProfile> = $required;
                if let Some(kind) = required {
                    if eq.rotation() != kind {
                        return Err(FusionError::Build {
                            objective: $name.to_string(),
                            message: format!(
                                "equilibrium is specified by {:?}, no {:?} profile assigned",
                                eq.rotation(),
                                kind
                            ),
                        });
                    }
                }
                fix_block($name, $arg, eq, &self.modes, &self.options)
            }
        }
    };
}

profile_residual!(
    /// Fixes pressure coefficients.
    FixPressure,
    "FixPressure",
    Arg::PL,
    None
);
profile_residual!(
    /// Fixes rotational transform coefficients.
    FixIota,
    "FixIota",
    Arg::IL,
    Some(RotationProfile::Iota)
);
profile_residual!(
    /// Fixes toroidal current coefficients.
    FixCurrent,
    "FixCurrent",
    Arg::CL,
    Some(RotationProfile::Current)
);

/// Fixes the total toroidal flux.
#[derive(Debug, Clone, Default)]
pub struct FixPsi {
    options: ResidualOptions,
}

impl FixPsi {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResidualBuilder for FixPsi {
    fn options_mut(&mut self) -> &mut ResidualOptions {
        &mut self.options
    }
}

impl Residual for FixPsi {
    fn name(&self) -> &str {
        "FixPsi"
    }

    fn linear(&self) -> bool {
        true
    }

    fn build(&self, eq: &Equilibrium) -> FusionResult<BuiltResidual> {
        fix_block(self.name(), Arg::Psi, eq, &ModeSelection::All, &self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equilibrium::Resolution;
    use crate::objectives::Goal;

    fn eq(rotation: RotationProfile) -> Equilibrium {
        let res = Resolution { m: 1, n: 0, m_nodes: 2, n_nodes: 0 };
        Equilibrium::new(1, res, rotation, (3, 2), 2.5)
            .with_block(Arg::PL, Array1::from(vec![1e3, 0.0, -1e3]))
            .unwrap()
    }

    #[test]
    fn test_fix_current_requires_current_profile() {
        let err = FixCurrent::new().build(&eq(RotationProfile::Iota)).unwrap_err();
        assert!(matches!(err, FusionError::Build { .. }), "got {err}");
        assert!(FixIota::new().build(&eq(RotationProfile::Iota)).is_ok());
        assert!(FixIota::new().build(&eq(RotationProfile::Current)).is_err());
    }

    #[test]
    fn test_fix_pressure_selected_modes() {
        let r = FixPressure::new()
            .with_modes(ModeSelection::Only(vec![0, 2, 9]))
            .build(&eq(RotationProfile::Current))
            .unwrap();
        assert_eq!(r.dim_f, 2);
        assert_eq!(r.goal, Goal::Target(Array1::from(vec![1e3, -1e3])));
    }

    #[test]
    fn test_fix_psi_explicit_target() {
        let r = FixPsi::new().with_target([3.0]).build(&eq(RotationProfile::Current)).unwrap();
        assert_eq!(r.goal, Goal::Target(Array1::from(vec![3.0])));
        let r = FixPsi::new().build(&eq(RotationProfile::Current)).unwrap();
        assert_eq!(r.goal, Goal::Target(Array1::from(vec![2.5])));
    }
}
