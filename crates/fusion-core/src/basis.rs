// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Spectral Bases
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Fourier-Zernike and double-Fourier bases with design matrices.
//!
//! Mode ordering is deterministic: toroidal number `n` outermost, then
//! radial order `l`, then poloidal number `m` (ANSI order within each `n`).
//! Coefficients are remapped between resolutions by exact mode match.

use std::collections::HashMap;

use fusion_math::spectral::{fourier, zernike_radial};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::grid::Grid;

/// Spectral mode `(l, m, n)`. Double-Fourier modes carry `l = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Mode {
    pub l: usize,
    pub m: i32,
    pub n: i32,
}

impl Mode {
    pub const fn new(l: usize, m: i32, n: i32) -> Self {
        Mode { l, m, n }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BasisKind {
    /// Zernike radial × Fourier poloidal × Fourier toroidal.
    FourierZernike,
    /// Fourier poloidal × Fourier toroidal on a single surface.
    DoubleFourier,
}

/// Derivative orders `(∂ρ, ∂θ, ∂ζ)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Derivative {
    pub dr: usize,
    pub dt: usize,
    pub dz: usize,
}

impl Derivative {
    pub const VALUE: Derivative = Derivative::new(0, 0, 0);

    pub const fn new(dr: usize, dt: usize, dz: usize) -> Self {
        Derivative { dr, dt, dz }
    }
}

#[derive(Debug, Clone)]
pub struct SpectralBasis {
    kind: BasisKind,
    m_max: usize,
    n_max: usize,
    nfp: usize,
    modes: Vec<Mode>,
    index: HashMap<Mode, usize>,
}

impl PartialEq for SpectralBasis {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.nfp == other.nfp && self.modes == other.modes
    }
}

impl SpectralBasis {
    /// Fourier-Zernike basis with `|m| ≤ l ≤ M`, `l ≡ m (mod 2)`, `|n| ≤ N`.
    pub fn fourier_zernike(m_max: usize, n_max: usize, nfp: usize) -> Self {
        let mut modes = Vec::new();
        for n in -(n_max as i32)..=(n_max as i32) {
            for l in 0..=m_max {
                let l_i = l as i32;
                for m in (-l_i..=l_i).step_by(2) {
                    modes.push(Mode::new(l, m, n));
                }
            }
        }
        Self::from_modes(BasisKind::FourierZernike, m_max, n_max, nfp, modes)
    }

    /// Double-Fourier basis with `|m| ≤ M`, `|n| ≤ N`.
    pub fn double_fourier(m_max: usize, n_max: usize, nfp: usize) -> Self {
        let mut modes = Vec::new();
        for n in -(n_max as i32)..=(n_max as i32) {
            for m in -(m_max as i32)..=(m_max as i32) {
                modes.push(Mode::new(0, m, n));
            }
        }
        Self::from_modes(BasisKind::DoubleFourier, m_max, n_max, nfp, modes)
    }

    fn from_modes(kind: BasisKind, m_max: usize, n_max: usize, nfp: usize, modes: Vec<Mode>) -> Self {
        let index = modes.iter().enumerate().map(|(i, &m)| (m, i)).collect();
        SpectralBasis {
            kind,
            m_max,
            n_max,
            nfp,
            modes,
            index,
        }
    }

    pub fn kind(&self) -> BasisKind {
        self.kind
    }

    pub fn m_max(&self) -> usize {
        self.m_max
    }

    pub fn n_max(&self) -> usize {
        self.n_max
    }

    pub fn nfp(&self) -> usize {
        self.nfp
    }

    pub fn modes(&self) -> &[Mode] {
        &self.modes
    }

    pub fn num_modes(&self) -> usize {
        self.modes.len()
    }

    pub fn index_of(&self, mode: Mode) -> Option<usize> {
        self.index.get(&mode).copied()
    }

    /// Value of basis function `mode` at one node.
    pub fn eval_mode(&self, mode: Mode, rho: f64, theta: f64, zeta: f64, d: Derivative) -> f64 {
        let radial = match self.kind {
            BasisKind::FourierZernike => zernike_radial(rho, mode.l, mode.m, d.dr),
            BasisKind::DoubleFourier => {
                if d.dr == 0 {
                    1.0
                } else {
                    0.0
                }
            }
        };
        if radial == 0.0 {
            return 0.0;
        }
        radial * fourier(theta, mode.m, d.dt, 1.0) * fourier(zeta, mode.n, d.dz, self.nfp as f64)
    }

    /// Design matrix `(num_nodes × num_modes)` mapping coefficients to the
    /// requested derivative at every grid node.
    pub fn design_matrix(&self, grid: &Grid, d: Derivative) -> Array2<f64> {
        let nodes = grid.num_nodes();
        let mut out = Array2::zeros((nodes, self.modes.len()));
        for i in 0..nodes {
            let (rho, theta, zeta) = grid.node(i);
            for (j, &mode) in self.modes.iter().enumerate() {
                out[[i, j]] = self.eval_mode(mode, rho, theta, zeta, d);
            }
        }
        out
    }

    /// Re-index `coeffs` (expressed in `from`) onto this basis. Shared modes
    /// are copied, modes only present here start at zero, and modes only
    /// present in `from` are dropped.
    pub fn map_coefficients(&self, from: &SpectralBasis, coeffs: &Array1<f64>) -> Array1<f64> {
        Array1::from_iter(self.modes.iter().map(|&mode| {
            from.index_of(mode).map_or(0.0, |j| coeffs[j])
        }))
    }
}
