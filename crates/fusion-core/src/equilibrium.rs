// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Equilibrium Container
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Spectral equilibrium: bases, collocation grid and coefficient blocks.
//!
//! An [`Equilibrium`] is a value. Every transformation (new state, new
//! boundary, new resolution) returns a fresh instance.

use fusion_math::linalg::lstsq;
use fusion_math::spectral::fourier;
use fusion_types::config::{AxisMode, ContinuationStep, EquilibriumInputs, SurfaceMode};
use fusion_types::constants::DEFAULT_RCOND;
use fusion_types::error::{FusionError, FusionResult};
use fusion_types::state::{Arg, Dimensions, StateLayout, ARG_COUNT, ARG_ORDER};
use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};

use crate::basis::{Derivative, Mode, SpectralBasis};
use crate::grid::Grid;
use crate::profiles;

/// Spectral and node resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    #[serde(rename = "M")]
    pub m: usize,
    #[serde(rename = "N")]
    pub n: usize,
    #[serde(rename = "M_nodes")]
    pub m_nodes: usize,
    #[serde(rename = "N_nodes")]
    pub n_nodes: usize,
}

impl From<&ContinuationStep> for Resolution {
    fn from(step: &ContinuationStep) -> Self {
        Resolution {
            m: step.m,
            n: step.n,
            m_nodes: step.m_nodes,
            n_nodes: step.n_nodes,
        }
    }
}

/// Which rotation profile the equilibrium is specified by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationProfile {
    Iota,
    Current,
}

#[derive(Debug, Clone)]
pub struct Equilibrium {
    nfp: usize,
    resolution: Resolution,
    rotation: RotationProfile,
    basis: SpectralBasis,
    surface_basis: SpectralBasis,
    grid: Grid,
    blocks: Vec<Array1<f64>>,
}

impl Equilibrium {
    /// Zero state at `resolution` with profile sizes taken from `profile_sizes`
    /// (pressure, rotation).
    pub fn new(
        nfp: usize,
        resolution: Resolution,
        rotation: RotationProfile,
        profile_sizes: (usize, usize),
        psi: f64,
    ) -> Self {
        let basis = SpectralBasis::fourier_zernike(resolution.m, resolution.n, nfp);
        let surface_basis = SpectralBasis::double_fourier(resolution.m, resolution.n, nfp);
        let grid = Grid::concentric(resolution.m_nodes, resolution.n_nodes, nfp);
        let (n_iota, n_current) = match rotation {
            RotationProfile::Iota => (profile_sizes.1, 0),
            RotationProfile::Current => (0, profile_sizes.1),
        };
        let sizes = [
            basis.num_modes(),
            basis.num_modes(),
            basis.num_modes(),
            surface_basis.num_modes(),
            surface_basis.num_modes(),
            profile_sizes.0,
            n_iota,
            n_current,
            1,
        ];
        let mut blocks: Vec<Array1<f64>> = sizes.iter().map(|&n| Array1::zeros(n)).collect();
        blocks[Arg::Psi.index()][0] = psi;
        Equilibrium {
            nfp,
            resolution,
            rotation,
            basis,
            surface_basis,
            grid,
            blocks,
        }
    }

    /// Equilibrium for the first continuation step: boundary scaled by the
    /// step's `bdry_ratio`, profiles from the inputs, interior geometry from
    /// [`Equilibrium::initial_guess`].
    pub fn from_inputs(inputs: &EquilibriumInputs, step: &ContinuationStep) -> FusionResult<Self> {
        inputs.validate()?;
        let (rotation, rotation_terms) = match (&inputs.iota, &inputs.current) {
            (Some(iota), _) => (RotationProfile::Iota, iota.as_slice()),
            (None, Some(current)) => (RotationProfile::Current, current.as_slice()),
            (None, None) => (RotationProfile::Current, &[][..]),
        };
        let pressure = profiles::coefficients_from_terms(&inputs.pressure);
        let rotation_coeffs = profiles::coefficients_from_terms(rotation_terms);
        let eq = Equilibrium::new(
            inputs.nfp,
            Resolution::from(step),
            rotation,
            (pressure.len(), rotation_coeffs.len()),
            inputs.psi,
        );
        let rotation_arg = match rotation {
            RotationProfile::Iota => Arg::IL,
            RotationProfile::Current => Arg::CL,
        };
        eq.with_block(Arg::PL, pressure)?
            .with_block(rotation_arg, rotation_coeffs)?
            .with_surface(&inputs.surface, step.bdry_ratio)
            .initial_guess(&inputs.axis)
    }

    pub fn nfp(&self) -> usize {
        self.nfp
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn rotation(&self) -> RotationProfile {
        self.rotation
    }

    /// Basis shared by R, Z and λ.
    pub fn basis(&self) -> &SpectralBasis {
        &self.basis
    }

    pub fn surface_basis(&self) -> &SpectralBasis {
        &self.surface_basis
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn psi(&self) -> f64 {
        self.blocks[Arg::Psi.index()][0]
    }

    pub fn block(&self, arg: Arg) -> &Array1<f64> {
        &self.blocks[arg.index()]
    }

    pub fn dimensions(&self) -> Dimensions {
        ARG_ORDER
            .iter()
            .fold(Dimensions::new(), |d, &a| d.with(a, self.blocks[a.index()].len()))
    }

    /// Layout over every block, in global order.
    pub fn layout(&self) -> StateLayout {
        StateLayout::new(&ARG_ORDER, &self.dimensions())
    }

    /// Full packed state vector.
    pub fn state(&self) -> Array1<f64> {
        Array1::from_iter(self.blocks.iter().flat_map(|b| b.iter().copied()))
    }

    pub fn with_state(&self, x: &Array1<f64>) -> FusionResult<Self> {
        let layout = self.layout();
        let blocks = layout.unpack(x)?;
        let mut out = self.clone();
        for (arg, values) in blocks.iter() {
            out.blocks[arg.index()] = values.clone();
        }
        Ok(out)
    }

    pub fn with_block(&self, arg: Arg, values: Array1<f64>) -> FusionResult<Self> {
        let expected = self.blocks[arg.index()].len();
        if values.len() != expected {
            return Err(FusionError::DimensionMismatch {
                context: format!("equilibrium block {arg}"),
                expected,
                got: values.len(),
            });
        }
        let mut out = self.clone();
        out.blocks[arg.index()] = values;
        Ok(out)
    }

    /// Replace the boundary coefficients, scaling every `n ≠ 0` mode by
    /// `bdry_ratio`. Modes outside the current resolution are dropped.
    pub fn with_surface(&self, surface: &[SurfaceMode], bdry_ratio: f64) -> Self {
        let mut rb = Array1::zeros(self.surface_basis.num_modes());
        let mut zb = Array1::zeros(self.surface_basis.num_modes());
        for mode in surface {
            let Some(j) = self.surface_basis.index_of(Mode::new(0, mode.m, mode.n)) else {
                log::debug!(
                    "surface mode (m={}, n={}) outside resolution (M={}, N={})",
                    mode.m,
                    mode.n,
                    self.resolution.m,
                    self.resolution.n
                );
                continue;
            };
            let ratio = if mode.n == 0 { 1.0 } else { bdry_ratio };
            rb[j] = mode.r * ratio;
            zb[j] = mode.z * ratio;
        }
        let mut out = self.clone();
        out.blocks[Arg::RbLmn.index()] = rb;
        out.blocks[Arg::ZbLmn.index()] = zb;
        out
    }

    /// Fit the interior geometry to `X = X_axis(ζ) + ρ·(X_bdry(θ,ζ) − X_axis(ζ))`
    /// at the collocation nodes. λ starts at zero. Without an explicit axis
    /// the `m = 0` part of the boundary is used.
    pub fn initial_guess(&self, axis: &[AxisMode]) -> FusionResult<Self> {
        let surface = self.surface_basis.design_matrix(&self.grid, Derivative::VALUE);
        let r_bdry = surface.dot(self.block(Arg::RbLmn));
        let z_bdry = surface.dot(self.block(Arg::ZbLmn));

        let nodes = self.grid.num_nodes();
        let mut r_axis = Array1::zeros(nodes);
        let mut z_axis = Array1::zeros(nodes);
        for i in 0..nodes {
            let (_, _, zeta) = self.grid.node(i);
            if axis.is_empty() {
                for (j, mode) in self.surface_basis.modes().iter().enumerate() {
                    if mode.m == 0 {
                        let f = fourier(zeta, mode.n, 0, self.nfp as f64);
                        r_axis[i] += self.block(Arg::RbLmn)[j] * f;
                        z_axis[i] += self.block(Arg::ZbLmn)[j] * f;
                    }
                }
            } else {
                for mode in axis {
                    let f = fourier(zeta, mode.n, 0, self.nfp as f64);
                    r_axis[i] += mode.r * f;
                    z_axis[i] += mode.z * f;
                }
            }
        }

        let rho = self.grid.node_rho();
        let blend = |ax: &Array1<f64>, bd: &Array1<f64>| -> Array1<f64> {
            let mut out = Array1::zeros(nodes);
            Zip::from(&mut out)
                .and(ax)
                .and(bd)
                .and(&rho)
                .for_each(|o, &a, &b, &r| *o = a + r * (b - a));
            out
        };
        let design = self.basis.design_matrix(&self.grid, Derivative::VALUE);
        let r_lmn = lstsq(&design, &blend(&r_axis, &r_bdry), DEFAULT_RCOND);
        let z_lmn = lstsq(&design, &blend(&z_axis, &z_bdry), DEFAULT_RCOND);

        self.with_block(Arg::RLmn, r_lmn)?
            .with_block(Arg::ZLmn, z_lmn)?
            .with_block(Arg::LLmn, Array1::zeros(self.basis.num_modes()))
    }

    /// Same equilibrium at a new resolution. Spectral blocks are remapped by
    /// mode match (zero fill for new modes, truncation for removed ones);
    /// profiles and flux are unchanged.
    pub fn change_resolution(&self, resolution: Resolution) -> Self {
        let basis = SpectralBasis::fourier_zernike(resolution.m, resolution.n, self.nfp);
        let surface_basis = SpectralBasis::double_fourier(resolution.m, resolution.n, self.nfp);
        let mut blocks = self.blocks.clone();
        for arg in [Arg::RLmn, Arg::ZLmn, Arg::LLmn] {
            blocks[arg.index()] = basis.map_coefficients(&self.basis, self.block(arg));
        }
        for arg in [Arg::RbLmn, Arg::ZbLmn] {
            blocks[arg.index()] = surface_basis.map_coefficients(&self.surface_basis, self.block(arg));
        }
        Equilibrium {
            nfp: self.nfp,
            resolution,
            rotation: self.rotation,
            grid: Grid::concentric(resolution.m_nodes, resolution.n_nodes, self.nfp),
            basis,
            surface_basis,
            blocks,
        }
    }

    pub fn snapshot(&self) -> EquilibriumSnapshot {
        EquilibriumSnapshot {
            nfp: self.nfp,
            resolution: self.resolution,
            rotation: self.rotation,
            modes: self.basis.modes().to_vec(),
            surface_modes: self.surface_basis.modes().to_vec(),
            blocks: ARG_ORDER
                .iter()
                .map(|&arg| NamedBlock {
                    arg,
                    values: self.block(arg).to_vec(),
                })
                .collect(),
        }
    }

    pub fn from_snapshot(snapshot: &EquilibriumSnapshot) -> FusionResult<Self> {
        if snapshot.blocks.len() != ARG_COUNT
            || snapshot
                .blocks
                .iter()
                .zip(ARG_ORDER.iter())
                .any(|(b, &a)| b.arg != a)
        {
            return Err(FusionError::ConfigError(
                "snapshot blocks are not in the global block order".to_string(),
            ));
        }
        let block_len = |arg: Arg| snapshot.blocks[arg.index()].values.len();
        let rotation_len = match snapshot.rotation {
            RotationProfile::Iota => block_len(Arg::IL),
            RotationProfile::Current => block_len(Arg::CL),
        };
        let psi = snapshot.blocks[Arg::Psi.index()]
            .values
            .first()
            .copied()
            .unwrap_or(0.0);
        let mut eq = Equilibrium::new(
            snapshot.nfp,
            snapshot.resolution,
            snapshot.rotation,
            (block_len(Arg::PL), rotation_len),
            psi,
        );
        if eq.basis.modes() != snapshot.modes.as_slice()
            || eq.surface_basis.modes() != snapshot.surface_modes.as_slice()
        {
            return Err(FusionError::ConfigError(
                "snapshot mode indices do not match its resolution".to_string(),
            ));
        }
        for block in &snapshot.blocks {
            eq = eq.with_block(block.arg, Array1::from(block.values.clone()))?;
        }
        Ok(eq)
    }
}

/// Coefficients of one block, tagged with its argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedBlock {
    pub arg: Arg,
    pub values: Vec<f64>,
}

/// Serialisable copy of an equilibrium: state blocks in global order plus
/// the mode indices needed to interpret them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquilibriumSnapshot {
    #[serde(rename = "NFP")]
    pub nfp: usize,
    pub resolution: Resolution,
    pub rotation: RotationProfile,
    pub modes: Vec<Mode>,
    pub surface_modes: Vec<Mode>,
    pub blocks: Vec<NamedBlock>,
}

impl EquilibriumSnapshot {
    /// Packed state vector in global block order.
    pub fn state(&self) -> Array1<f64> {
        Array1::from_iter(self.blocks.iter().flat_map(|b| b.values.iter().copied()))
    }
}
