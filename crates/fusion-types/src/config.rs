// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Equilibrium inputs and continuation schedules.
//!
//! Both are plain JSON. Per-step continuation fields accept a scalar or an
//! array; arrays are broadcast to a common length by
//! [`ContinuationConfig::steps`].

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{FusionError, FusionResult};

fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> FusionResult<T> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

// ── Equilibrium inputs ───────────────────────────────────────────────

/// One boundary Fourier mode. `m < 0` selects sin(|m|θ), `n < 0` sin(|n|·NFP·ζ).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceMode {
    pub m: i32,
    pub n: i32,
    #[serde(rename = "R", default)]
    pub r: f64,
    #[serde(rename = "Z", default)]
    pub z: f64,
}

/// One magnetic-axis toroidal mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisMode {
    pub n: i32,
    #[serde(rename = "R", default)]
    pub r: f64,
    #[serde(rename = "Z", default)]
    pub z: f64,
}

/// Power-series term `value · ρ^l`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileTerm {
    pub l: usize,
    pub value: f64,
}

/// Physical description of the equilibrium to be solved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquilibriumInputs {
    /// Number of field periods (default: 1)
    #[serde(rename = "NFP", default = "default_nfp")]
    pub nfp: usize,
    /// Total toroidal flux through the boundary (default: 1.0)
    #[serde(rename = "Psi", default = "default_psi")]
    pub psi: f64,
    pub surface: Vec<SurfaceMode>,
    /// Optional axis; when empty the m = 0 part of the boundary is used.
    #[serde(default)]
    pub axis: Vec<AxisMode>,
    #[serde(default)]
    pub pressure: Vec<ProfileTerm>,
    /// Rotational transform. Mutually exclusive with `current`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iota: Option<Vec<ProfileTerm>>,
    /// Toroidal current. Defaults to zero current when neither is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<Vec<ProfileTerm>>,
}

fn default_nfp() -> usize {
    1
}
fn default_psi() -> f64 {
    1.0
}

impl EquilibriumInputs {
    pub fn from_file(path: impl AsRef<Path>) -> FusionResult<Self> {
        let inputs: Self = read_json(path)?;
        inputs.validate()?;
        Ok(inputs)
    }

    pub fn from_json_str(text: &str) -> FusionResult<Self> {
        let inputs: Self = serde_json::from_str(text)?;
        inputs.validate()?;
        Ok(inputs)
    }

    pub fn validate(&self) -> FusionResult<()> {
        if self.nfp < 1 {
            return Err(FusionError::ConfigError("NFP must be >= 1".to_string()));
        }
        if !self.psi.is_finite() || self.psi <= 0.0 {
            return Err(FusionError::ConfigError(
                "Psi must be finite and > 0".to_string(),
            ));
        }
        if self.surface.is_empty() {
            return Err(FusionError::ConfigError(
                "surface must contain at least one mode".to_string(),
            ));
        }
        for (i, mode) in self.surface.iter().enumerate() {
            if !mode.r.is_finite() || !mode.z.is_finite() {
                return Err(FusionError::ConfigError(format!(
                    "surface mode (m={}, n={}) has a non-finite coefficient",
                    mode.m, mode.n
                )));
            }
            if self.surface[..i]
                .iter()
                .any(|other| other.m == mode.m && other.n == mode.n)
            {
                return Err(FusionError::ConfigError(format!(
                    "duplicate surface mode (m={}, n={})",
                    mode.m, mode.n
                )));
            }
        }
        if !self.surface.iter().any(|mode| mode.m == 0 && mode.n == 0 && mode.r > 0.0) {
            return Err(FusionError::ConfigError(
                "surface must have a positive (m=0, n=0) major radius".to_string(),
            ));
        }
        if self
            .axis
            .iter()
            .any(|mode| !mode.r.is_finite() || !mode.z.is_finite())
        {
            return Err(FusionError::ConfigError(
                "axis coefficients must be finite".to_string(),
            ));
        }
        if self.iota.is_some() && self.current.is_some() {
            return Err(FusionError::ConfigError(
                "specify at most one of iota or current".to_string(),
            ));
        }
        let profiles = [
            ("pressure", Some(&self.pressure)),
            ("iota", self.iota.as_ref()),
            ("current", self.current.as_ref()),
        ];
        for (name, terms) in profiles {
            if let Some(terms) = terms {
                if terms.iter().any(|t| !t.value.is_finite()) {
                    return Err(FusionError::ConfigError(format!(
                        "{name} coefficients must be finite"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Largest poloidal and toroidal mode numbers present on the boundary.
    pub fn surface_resolution(&self) -> (usize, usize) {
        self.surface.iter().fold((0, 0), |(m, n), mode| {
            (m.max(mode.m.unsigned_abs() as usize), n.max(mode.n.unsigned_abs() as usize))
        })
    }
}

// ── Continuation schedule ────────────────────────────────────────────

/// A scalar or an array in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    fn len(&self) -> usize {
        match self {
            OneOrMany::One(_) => 1,
            OneOrMany::Many(v) => v.len(),
        }
    }

    fn broadcast(&self, name: &str, len: usize) -> FusionResult<Vec<T>> {
        match self {
            OneOrMany::One(v) => Ok(vec![v.clone(); len]),
            OneOrMany::Many(v) if v.len() == len => Ok(v.clone()),
            OneOrMany::Many(v) if v.len() == 1 => Ok(vec![v[0].clone(); len]),
            OneOrMany::Many(v) => Err(FusionError::ConfigError(format!(
                "{name} has {} entries, cannot broadcast to {len} steps",
                v.len()
            ))),
        }
    }
}

impl<T> From<T> for OneOrMany<T> {
    fn from(value: T) -> Self {
        OneOrMany::One(value)
    }
}

/// Continuation parameter arrays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuationConfig {
    /// Poloidal spectral resolution per step
    #[serde(rename = "M")]
    pub m: OneOrMany<usize>,
    /// Toroidal spectral resolution per step (default: 0)
    #[serde(rename = "N", default = "default_zero")]
    pub n: OneOrMany<usize>,
    /// Poloidal node resolution (default: 2·M)
    #[serde(rename = "M_nodes", default, skip_serializing_if = "Option::is_none")]
    pub m_nodes: Option<OneOrMany<usize>>,
    /// Toroidal node resolution (default: 2·N)
    #[serde(rename = "N_nodes", default, skip_serializing_if = "Option::is_none")]
    pub n_nodes: Option<OneOrMany<usize>>,
    /// Fraction of non-axisymmetric boundary shaping (default: 1.0)
    #[serde(default = "default_one")]
    pub bdry_ratio: OneOrMany<f64>,
    /// Fraction of the pressure profile (default: 1.0)
    #[serde(default = "default_one")]
    pub pres_ratio: OneOrMany<f64>,
    /// Fraction of toroidal derivative terms (default: 1.0)
    #[serde(default = "default_one")]
    pub zeta_ratio: OneOrMany<f64>,
    /// Weight of the stream-function residual (default: 1e-2)
    #[serde(default = "default_errr")]
    pub errr_ratio: OneOrMany<f64>,
    /// Relative cost-decrease tolerance (default: 1e-6)
    #[serde(default = "default_tol")]
    pub ftol: OneOrMany<f64>,
    /// Relative step tolerance (default: 1e-6)
    #[serde(default = "default_tol")]
    pub xtol: OneOrMany<f64>,
    /// Gradient-norm tolerance (default: 1e-6)
    #[serde(default = "default_tol")]
    pub gtol: OneOrMany<f64>,
    /// Function-evaluation budget per step (default: 100)
    #[serde(default = "default_max_nfev")]
    pub max_nfev: OneOrMany<usize>,
    /// 0 silent, 1 step summaries, 2 iteration trace, 3 build timings (default: 1)
    #[serde(default = "default_verbose")]
    pub verbose: u8,
}

fn default_zero() -> OneOrMany<usize> {
    OneOrMany::One(0)
}
fn default_one() -> OneOrMany<f64> {
    OneOrMany::One(1.0)
}
fn default_errr() -> OneOrMany<f64> {
    OneOrMany::One(1e-2)
}
fn default_tol() -> OneOrMany<f64> {
    OneOrMany::One(1e-6)
}
fn default_max_nfev() -> OneOrMany<usize> {
    OneOrMany::One(100)
}
fn default_verbose() -> u8 {
    1
}

impl Default for ContinuationConfig {
    fn default() -> Self {
        ContinuationConfig {
            m: OneOrMany::One(1),
            n: default_zero(),
            m_nodes: None,
            n_nodes: None,
            bdry_ratio: default_one(),
            pres_ratio: default_one(),
            zeta_ratio: default_one(),
            errr_ratio: default_errr(),
            ftol: default_tol(),
            xtol: default_tol(),
            gtol: default_tol(),
            max_nfev: default_max_nfev(),
            verbose: default_verbose(),
        }
    }
}

/// One row of the broadcast continuation arrays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContinuationStep {
    #[serde(rename = "M")]
    pub m: usize,
    #[serde(rename = "N")]
    pub n: usize,
    #[serde(rename = "M_nodes")]
    pub m_nodes: usize,
    #[serde(rename = "N_nodes")]
    pub n_nodes: usize,
    pub bdry_ratio: f64,
    pub pres_ratio: f64,
    pub zeta_ratio: f64,
    pub errr_ratio: f64,
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    pub max_nfev: usize,
}

impl ContinuationStep {
    pub fn same_resolution(&self, other: &ContinuationStep) -> bool {
        self.m == other.m
            && self.n == other.n
            && self.m_nodes == other.m_nodes
            && self.n_nodes == other.n_nodes
    }

    /// Continuation ratios in fixed order: bdry, pres, zeta, errr.
    pub fn ratios(&self) -> [f64; 4] {
        [self.bdry_ratio, self.pres_ratio, self.zeta_ratio, self.errr_ratio]
    }
}

impl ContinuationConfig {
    pub fn from_file(path: impl AsRef<Path>) -> FusionResult<Self> {
        let cfg: Self = read_json(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_str(text: &str) -> FusionResult<Self> {
        let cfg: Self = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn num_steps(&self) -> usize {
        let mut lens = vec![
            self.m.len(),
            self.n.len(),
            self.bdry_ratio.len(),
            self.pres_ratio.len(),
            self.zeta_ratio.len(),
            self.errr_ratio.len(),
            self.ftol.len(),
            self.xtol.len(),
            self.gtol.len(),
            self.max_nfev.len(),
        ];
        lens.extend(self.m_nodes.iter().map(OneOrMany::len));
        lens.extend(self.n_nodes.iter().map(OneOrMany::len));
        lens.into_iter().max().unwrap_or(1)
    }

    /// Broadcast all arrays to a common length and return the rows.
    pub fn steps(&self) -> FusionResult<Vec<ContinuationStep>> {
        let len = self.num_steps();
        if len == 0 {
            return Err(FusionError::ConfigError(
                "continuation arrays must not be empty".to_string(),
            ));
        }
        let m = self.m.broadcast("M", len)?;
        let n = self.n.broadcast("N", len)?;
        let m_nodes = match &self.m_nodes {
            Some(v) => v.broadcast("M_nodes", len)?,
            None => m.iter().map(|&m| 2 * m).collect(),
        };
        let n_nodes = match &self.n_nodes {
            Some(v) => v.broadcast("N_nodes", len)?,
            None => n.iter().map(|&n| 2 * n).collect(),
        };
        let bdry = self.bdry_ratio.broadcast("bdry_ratio", len)?;
        let pres = self.pres_ratio.broadcast("pres_ratio", len)?;
        let zeta = self.zeta_ratio.broadcast("zeta_ratio", len)?;
        let errr = self.errr_ratio.broadcast("errr_ratio", len)?;
        let ftol = self.ftol.broadcast("ftol", len)?;
        let xtol = self.xtol.broadcast("xtol", len)?;
        let gtol = self.gtol.broadcast("gtol", len)?;
        let max_nfev = self.max_nfev.broadcast("max_nfev", len)?;

        Ok((0..len)
            .map(|i| ContinuationStep {
                m: m[i],
                n: n[i],
                m_nodes: m_nodes[i],
                n_nodes: n_nodes[i],
                bdry_ratio: bdry[i],
                pres_ratio: pres[i],
                zeta_ratio: zeta[i],
                errr_ratio: errr[i],
                ftol: ftol[i],
                xtol: xtol[i],
                gtol: gtol[i],
                max_nfev: max_nfev[i],
            })
            .collect())
    }

    pub fn validate(&self) -> FusionResult<()> {
        for step in self.steps()? {
            if step.m < 1 {
                return Err(FusionError::ConfigError("M must be >= 1".to_string()));
            }
            if step.m_nodes < step.m || step.n_nodes < step.n {
                return Err(FusionError::ConfigError(format!(
                    "node resolution ({}, {}) must be >= spectral resolution ({}, {})",
                    step.m_nodes, step.n_nodes, step.m, step.n
                )));
            }
            if step.max_nfev == 0 {
                return Err(FusionError::ConfigError(
                    "max_nfev must be >= 1".to_string(),
                ));
            }
            for (name, value) in [
                ("bdry_ratio", step.bdry_ratio),
                ("zeta_ratio", step.zeta_ratio),
            ] {
                if !(0.0..=1.0).contains(&value) {
                    return Err(FusionError::ConfigError(format!(
                        "{name} must be in [0, 1], got {value}"
                    )));
                }
            }
            for (name, value) in [
                ("pres_ratio", step.pres_ratio),
                ("errr_ratio", step.errr_ratio),
                ("ftol", step.ftol),
                ("xtol", step.xtol),
                ("gtol", step.gtol),
            ] {
                if !value.is_finite() || value < 0.0 {
                    return Err(FusionError::ConfigError(format!(
                        "{name} must be finite and >= 0, got {value}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Complete run description: what to solve and how to continue to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub equilibrium: EquilibriumInputs,
    #[serde(default)]
    pub continuation: ContinuationConfig,
}

impl RunConfig {
    pub fn from_file(path: impl AsRef<Path>) -> FusionResult<Self> {
        let cfg: Self = read_json(path)?;
        cfg.equilibrium.validate()?;
        cfg.continuation.validate()?;
        Ok(cfg)
    }
}
