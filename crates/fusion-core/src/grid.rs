// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Collocation Grids
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Tensor-product collocation nodes in (ρ, θ, ζ).
//!
//! Node `i` is laid out as `(iz · n_rho + ir) · n_theta + it`, so every
//! closed poloidal curve is a contiguous run of `n_theta` nodes.

use std::f64::consts::PI;

use ndarray::Array1;

#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    rho: Array1<f64>,
    theta: Array1<f64>,
    zeta: Array1<f64>,
    nfp: usize,
}

impl Grid {
    /// Concentric rings `ρ_k = sin(πk / 2N_r)`, `k = 1..N_r`, `N_r = M_nodes + 1`,
    /// with `2·M_nodes + 1` poloidal and `2·N_nodes + 1` toroidal points.
    /// The axis itself is excluded and the last ring is the boundary.
    pub fn concentric(m_nodes: usize, n_nodes: usize, nfp: usize) -> Self {
        let n_rho = m_nodes + 1;
        let rho = Array1::from_iter(
            (1..=n_rho).map(|k| (PI * k as f64 / (2.0 * n_rho as f64)).sin()),
        );
        Grid {
            rho,
            theta: Self::periodic(2 * m_nodes + 1, 2.0 * PI),
            zeta: Self::periodic(2 * n_nodes + 1, 2.0 * PI / nfp.max(1) as f64),
            nfp: nfp.max(1),
        }
    }

    /// Single flux surface at `rho` sampled with `n_theta × n_zeta` points.
    pub fn surface(rho: f64, n_theta: usize, n_zeta: usize, nfp: usize) -> Self {
        Grid {
            rho: Array1::from(vec![rho]),
            theta: Self::periodic(n_theta.max(1), 2.0 * PI),
            zeta: Self::periodic(n_zeta.max(1), 2.0 * PI / nfp.max(1) as f64),
            nfp: nfp.max(1),
        }
    }

    fn periodic(count: usize, period: f64) -> Array1<f64> {
        Array1::from_iter((0..count).map(|i| period * i as f64 / count as f64))
    }

    pub fn num_rho(&self) -> usize {
        self.rho.len()
    }

    pub fn num_theta(&self) -> usize {
        self.theta.len()
    }

    pub fn num_zeta(&self) -> usize {
        self.zeta.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.rho.len() * self.theta.len() * self.zeta.len()
    }

    pub fn nfp(&self) -> usize {
        self.nfp
    }

    pub fn rho_values(&self) -> &Array1<f64> {
        &self.rho
    }

    /// `(ρ, θ, ζ)` of node `i`.
    pub fn node(&self, i: usize) -> (f64, f64, f64) {
        let nt = self.theta.len();
        let nr = self.rho.len();
        let it = i % nt;
        let ir = (i / nt) % nr;
        let iz = i / (nt * nr);
        (self.rho[ir], self.theta[it], self.zeta[iz])
    }

    /// ρ at every node.
    pub fn node_rho(&self) -> Array1<f64> {
        Array1::from_iter((0..self.num_nodes()).map(|i| self.node(i).0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concentric_layout() {
        let grid = Grid::concentric(2, 1, 3);
        assert_eq!(grid.num_rho(), 3);
        assert_eq!(grid.num_theta(), 5);
        assert_eq!(grid.num_zeta(), 3);
        assert_eq!(grid.num_nodes(), 45);
        assert!((grid.rho_values()[2] - 1.0).abs() < 1e-15);
        assert!(grid.rho_values()[0] > 0.0);

        let (rho, theta, zeta) = grid.node(5 * 3 + 2);
        assert!((rho - grid.rho_values()[0]).abs() < 1e-15);
        assert!((theta - 2.0 * 2.0 * PI / 5.0).abs() < 1e-14);
        assert!((zeta - 2.0 * PI / 9.0).abs() < 1e-14);
    }

    #[test]
    fn test_surface_grid() {
        let grid = Grid::surface(1.0, 16, 1, 1);
        assert_eq!(grid.num_nodes(), 16);
        assert!(grid.node_rho().iter().all(|&r| r == 1.0));
    }
}
