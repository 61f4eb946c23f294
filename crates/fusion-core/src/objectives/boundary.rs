// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Boundary Constraints
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Linear residuals holding the last closed flux surface in place.

use fusion_math::spectral::zernike_radial;
use fusion_types::error::FusionResult;
use fusion_types::state::{Arg, StateLayout};
use ndarray::{Array1, Array2};

use super::{
    selection_matrix, BuiltResidual, ModeSelection, Residual, ResidualBuilder, ResidualKernel,
    ResidualOptions,
};
use crate::basis::Mode;
use crate::equilibrium::Equilibrium;

/// What a boundary residual constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FixedBoundaryMode {
    /// Surface coefficients `Rb_mn` held at their targets.
    #[default]
    OnSurfaceCoefficients,
    /// Interior coefficients evaluated at `ρ = 1` equal the surface
    /// coefficients: `Σ_l R_lmn·R_l^|m|(1) − Rb_mn = 0`.
    OnEquilibriumCoefficients,
}

#[derive(Debug, Clone, Copy)]
enum Component {
    R,
    Z,
}

impl Component {
    fn interior(self) -> Arg {
        match self {
            Component::R => Arg::RLmn,
            Component::Z => Arg::ZLmn,
        }
    }

    fn surface(self) -> Arg {
        match self {
            Component::R => Arg::RbLmn,
            Component::Z => Arg::ZbLmn,
        }
    }
}

#[derive(Debug, Clone)]
struct BoundaryFix {
    component: Component,
    mode: FixedBoundaryMode,
    modes: ModeSelection<(i32, i32)>,
    options: ResidualOptions,
    name: String,
}

impl BoundaryFix {
    fn new(component: Component, mode: FixedBoundaryMode) -> Self {
        let base = match component {
            Component::R => "FixBoundaryR",
            Component::Z => "FixBoundaryZ",
        };
        let name = match mode {
            FixedBoundaryMode::OnSurfaceCoefficients => base.to_string(),
            FixedBoundaryMode::OnEquilibriumCoefficients => format!("{base} (interior)"),
        };
        BoundaryFix {
            component,
            mode,
            modes: ModeSelection::All,
            options: ResidualOptions::default(),
            name,
        }
    }

    fn build(&self, eq: &Equilibrium) -> FusionResult<BuiltResidual> {
        let surface = eq.surface_basis();
        let rows = self.modes.select(&self.name, surface.num_modes(), |(m, n)| {
            surface.index_of(Mode::new(0, m, n))
        });
        let surface_arg = self.component.surface();
        let dims = eq.dimensions();

        let (layout, a, default_target) = match self.mode {
            FixedBoundaryMode::OnSurfaceCoefficients => {
                let a = selection_matrix(&rows, surface.num_modes());
                let current = eq.block(surface_arg);
                let target = Array1::from_iter(rows.iter().map(|&j| current[j]));
                (StateLayout::new(&[surface_arg], &dims), a, target)
            }
            FixedBoundaryMode::OnEquilibriumCoefficients => {
                let basis = eq.basis();
                let n_int = basis.num_modes();
                let mut a = Array2::zeros((rows.len(), n_int + surface.num_modes()));
                for (row, &j) in rows.iter().enumerate() {
                    let sm = surface.modes()[j];
                    for (i, mode) in basis.modes().iter().enumerate() {
                        if mode.m == sm.m && mode.n == sm.n {
                            a[[row, i]] = zernike_radial(1.0, mode.l, mode.m, 0);
                        }
                    }
                    a[[row, n_int + j]] = -1.0;
                }
                let layout = StateLayout::new(&[self.component.interior(), surface_arg], &dims);
                (layout, a, Array1::zeros(rows.len()))
            }
        };
        let dim_f = rows.len();
        let (goal, weight, normalization) = self.options.resolve(&self.name, dim_f, default_target)?;
        Ok(BuiltResidual {
            name: self.name.clone(),
            layout,
            dim_f,
            goal,
            weight,
            normalization,
            kernel: ResidualKernel::Linear { a },
        })
    }
}

macro_rules! boundary_residual {
    ($(#[$doc:meta])* $ty:ident, $component:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $ty(BoundaryFix);

        impl $ty {
            pub fn new(mode: FixedBoundaryMode) -> Self {
                $ty(BoundaryFix::new($component, mode))
            }

            /// Restrict to surface modes `(m, n)`.
            pub fn with_modes(mut self, modes: ModeSelection<(i32, i32)>) -> Self {
                self.0.modes = modes;
                self
            }

            pub fn mode(&self) -> FixedBoundaryMode {
                self.0.mode
            }
        }

        impl ResidualBuilder for $ty {
            fn options_mut(&mut self) -> &mut ResidualOptions {
                &mut self.0.options
            }
        }

        impl Residual for $ty {
            fn name(&self) -> &str {
                &self.0.name
            }

            fn linear(&self) -> bool {
                true
            }

            fn build(&self, eq: &Equilibrium) -> FusionResult<BuiltResidual> {
                self.0.build(eq)
            }
        }
    };
}

boundary_residual!(
    /// Fixes the R boundary, on the surface or through the interior.
    FixBoundaryR,
    Component::R
);
boundary_residual!(
    /// Fixes the Z boundary, on the surface or through the interior.
    FixBoundaryZ,
    Component::Z
);
