// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Residual Contracts
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Residual catalog and the contract every residual satisfies.
//!
//! A [`Residual`] is an unbuilt description. `build` resolves it against an
//! [`Equilibrium`] into a [`BuiltResidual`] whose constant arrays are fixed
//! until the resolution changes. Linear residuals carry their matrix `A`
//! explicitly so the constraint eliminator can factorize them.

mod boundary;
mod composite;
mod force_balance;
mod gauge;
mod geometry;
mod profiles;

use std::fmt;
use std::sync::Arc;

use fusion_types::error::{FusionError, FusionResult};
use fusion_types::state::StateLayout;
use ndarray::{Array1, Array2};

use crate::equilibrium::{Equilibrium, RotationProfile};

pub use boundary::{FixBoundaryR, FixBoundaryZ, FixedBoundaryMode};
pub use composite::{BuiltObjective, ObjectiveComposite};
pub use force_balance::{ForceBalance, ForceRatios};
pub use gauge::FixLambdaGauge;
pub use geometry::AspectRatio;
pub use profiles::{FixCurrent, FixIota, FixPressure, FixPsi};

/// An equation family that can be resolved against an equilibrium.
pub trait Residual: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// `true` when evaluation is `A·x_sub` for a constant `A`.
    fn linear(&self) -> bool;

    fn build(&self, eq: &Equilibrium) -> FusionResult<BuiltResidual>;
}

/// Nonlinear evaluation over a residual's own sub-state.
pub trait NonlinearKernel: Send + Sync + fmt::Debug {
    fn compute(&self, x: &Array1<f64>) -> Array1<f64>;
}

#[derive(Debug, Clone)]
pub enum ResidualKernel {
    Linear { a: Array2<f64> },
    Nonlinear(Arc<dyn NonlinearKernel>),
}

/// Exactly one of a target or a bound pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Goal {
    Target(Array1<f64>),
    Bounds {
        lower: Array1<f64>,
        upper: Array1<f64>,
    },
}

impl Goal {
    /// `value − target`, or the clamped bound violation: zero inside
    /// `[lower, upper]`, `value − nearest bound` outside.
    pub fn error(&self, value: &Array1<f64>) -> Array1<f64> {
        match self {
            Goal::Target(target) => value - target,
            Goal::Bounds { lower, upper } => Array1::from_iter(
                value
                    .iter()
                    .zip(lower.iter().zip(upper.iter()))
                    .map(|(&v, (&lo, &hi))| {
                        if v < lo {
                            v - lo
                        } else if v > hi {
                            v - hi
                        } else {
                            0.0
                        }
                    }),
            ),
        }
    }
}

/// A residual resolved against one equilibrium resolution.
#[derive(Debug, Clone)]
pub struct BuiltResidual {
    pub name: String,
    /// Blocks this residual reads, in global order.
    pub layout: StateLayout,
    pub dim_f: usize,
    pub goal: Goal,
    pub weight: Array1<f64>,
    pub normalization: f64,
    pub kernel: ResidualKernel,
}

impl BuiltResidual {
    pub fn is_linear(&self) -> bool {
        matches!(self.kernel, ResidualKernel::Linear { .. })
    }

    /// Raw value over the residual's own sub-state.
    pub fn compute(&self, x: &Array1<f64>) -> Array1<f64> {
        match &self.kernel {
            ResidualKernel::Linear { a } => a.dot(x),
            ResidualKernel::Nonlinear(kernel) => kernel.compute(x),
        }
    }

    pub fn scale(&self, value: Array1<f64>) -> Array1<f64> {
        value * &self.weight / self.normalization
    }

    /// Row scaling applied by [`BuiltResidual::scale`].
    pub fn row_scale(&self) -> Array1<f64> {
        &self.weight / self.normalization
    }
}

/// Per-residual target, bounds, weight and normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResidualOptions {
    pub target: Option<Vec<f64>>,
    pub bounds: Option<(Vec<f64>, Vec<f64>)>,
    pub weight: Option<Vec<f64>>,
    pub normalization: Option<f64>,
}

fn broadcast(name: &str, what: &str, values: &[f64], dim_f: usize) -> FusionResult<Array1<f64>> {
    match values.len() {
        1 => Ok(Array1::from_elem(dim_f, values[0])),
        n if n == dim_f => Ok(Array1::from(values.to_vec())),
        n => Err(FusionError::Build {
            objective: name.to_string(),
            message: format!("{what} has {n} entries, expected 1 or {dim_f}"),
        }),
    }
}

impl ResidualOptions {
    /// Resolve options into a goal, weights and normalization, broadcasting
    /// scalars to `dim_f`. `default_target` is used when neither a target nor
    /// bounds were given.
    pub fn resolve(
        &self,
        name: &str,
        dim_f: usize,
        default_target: Array1<f64>,
    ) -> FusionResult<(Goal, Array1<f64>, f64)> {
        let goal = match (&self.target, &self.bounds) {
            (Some(_), Some(_)) => {
                return Err(FusionError::Build {
                    objective: name.to_string(),
                    message: "target and bounds are mutually exclusive".to_string(),
                })
            }
            (Some(t), None) => Goal::Target(broadcast(name, "target", t, dim_f)?),
            (None, Some((lo, hi))) => {
                let lower = broadcast(name, "lower bound", lo, dim_f)?;
                let upper = broadcast(name, "upper bound", hi, dim_f)?;
                if lower.iter().zip(upper.iter()).any(|(l, u)| l > u) {
                    return Err(FusionError::Build {
                        objective: name.to_string(),
                        message: "lower bound exceeds upper bound".to_string(),
                    });
                }
                Goal::Bounds { lower, upper }
            }
            (None, None) => Goal::Target(default_target),
        };
        let weight = match &self.weight {
            Some(w) => broadcast(name, "weight", w, dim_f)?,
            None => Array1::ones(dim_f),
        };
        let normalization = self.normalization.unwrap_or(1.0);
        if !normalization.is_finite() || normalization <= 0.0 {
            return Err(FusionError::Build {
                objective: name.to_string(),
                message: format!("normalization must be finite and > 0, got {normalization}"),
            });
        }
        Ok((goal, weight, normalization))
    }
}

/// Builder methods shared by every residual.
pub trait ResidualBuilder: Sized {
    fn options_mut(&mut self) -> &mut ResidualOptions;

    fn with_target(mut self, target: impl Into<Vec<f64>>) -> Self {
        self.options_mut().target = Some(target.into());
        self
    }

    fn with_bounds(mut self, lower: impl Into<Vec<f64>>, upper: impl Into<Vec<f64>>) -> Self {
        self.options_mut().bounds = Some((lower.into(), upper.into()));
        self
    }

    fn with_weight(mut self, weight: impl Into<Vec<f64>>) -> Self {
        self.options_mut().weight = Some(weight.into());
        self
    }

    fn with_normalization(mut self, normalization: f64) -> Self {
        self.options_mut().normalization = Some(normalization);
        self
    }
}

/// Which modes a fixing residual acts on.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ModeSelection<T> {
    #[default]
    All,
    None,
    Only(Vec<T>),
}

impl<T: Copy + fmt::Debug> ModeSelection<T> {
    /// Block indices of the selected modes. Requested modes missing from the
    /// basis are dropped with a warning.
    pub fn select(&self, name: &str, available: usize, lookup: impl Fn(T) -> Option<usize>) -> Vec<usize> {
        match self {
            ModeSelection::All => (0..available).collect(),
            ModeSelection::None => Vec::new(),
            ModeSelection::Only(modes) => modes
                .iter()
                .filter_map(|&mode| {
                    let idx = lookup(mode);
                    if idx.is_none() {
                        log::warn!("{name}: mode {mode:?} not in basis, dropped");
                    }
                    idx
                })
                .collect(),
        }
    }
}

/// Selection matrix with a single 1 per row at `cols`.
pub(crate) fn selection_matrix(cols: &[usize], width: usize) -> Array2<f64> {
    let mut a = Array2::zeros((cols.len(), width));
    for (row, &col) in cols.iter().enumerate() {
        a[[row, col]] = 1.0;
    }
    a
}

/// Standard linear constraints for a fixed-boundary solve: boundary
/// coefficients fixed and linked to the interior, λ gauge, pressure,
/// rotation profile and flux fixed at their current values.
pub fn get_fixed_boundary_constraints(eq: &Equilibrium) -> ObjectiveComposite {
    let rotation: Arc<dyn Residual> = match eq.rotation() {
        RotationProfile::Iota => Arc::new(FixIota::new()),
        RotationProfile::Current => Arc::new(FixCurrent::new()),
    };
    ObjectiveComposite::new()
        .with(FixBoundaryR::new(FixedBoundaryMode::OnSurfaceCoefficients))
        .with(FixBoundaryZ::new(FixedBoundaryMode::OnSurfaceCoefficients))
        .with(FixBoundaryR::new(FixedBoundaryMode::OnEquilibriumCoefficients))
        .with(FixBoundaryZ::new(FixedBoundaryMode::OnEquilibriumCoefficients))
        .with(FixLambdaGauge::new())
        .with(FixPressure::new())
        .with_shared(rotation)
        .with(FixPsi::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_bounds_clamp() {
        let goal = Goal::Bounds {
            lower: array![-1.0, -1.0, -1.0, -1.0, -1.0],
            upper: array![2.0, 2.0, 2.0, 2.0, 2.0],
        };
        let err = goal.error(&array![-3.0, -1.0, 0.5, 2.0, 5.0]);
        assert_eq!(err.to_vec(), vec![-2.0, 0.0, 0.0, 0.0, 3.0]);
    }

    #[test]
    fn test_target_error() {
        let goal = Goal::Target(array![1.0, 2.0]);
        assert_eq!(goal.error(&array![1.5, 0.0]).to_vec(), vec![0.5, -2.0]);
    }

    #[test]
    fn test_resolve_broadcasts_and_rejects() {
        let opts = ResidualOptions {
            target: Some(vec![3.0]),
            weight: Some(vec![2.0]),
            ..ResidualOptions::default()
        };
        let (goal, w, norm) = opts.resolve("t", 3, Array1::zeros(3)).unwrap();
        assert_eq!(goal, Goal::Target(array![3.0, 3.0, 3.0]));
        assert_eq!(w.to_vec(), vec![2.0; 3]);
        assert_eq!(norm, 1.0);

        let both = ResidualOptions {
            target: Some(vec![1.0]),
            bounds: Some((vec![0.0], vec![1.0])),
            ..ResidualOptions::default()
        };
        assert!(matches!(
            both.resolve("t", 1, Array1::zeros(1)),
            Err(FusionError::Build { .. })
        ));

        let bad_len = ResidualOptions {
            weight: Some(vec![1.0, 2.0]),
            ..ResidualOptions::default()
        };
        assert!(bad_len.resolve("t", 3, Array1::zeros(3)).is_err());
    }

    #[test]
    fn test_mode_selection() {
        let lookup = |m: i32| if (0..3).contains(&m) { Some(m as usize) } else { None };
        assert_eq!(ModeSelection::All.select("t", 3, lookup), vec![0, 1, 2]);
        assert!(ModeSelection::<i32>::None.select("t", 3, lookup).is_empty());
        assert_eq!(ModeSelection::Only(vec![2, 7]).select("t", 3, lookup), vec![2]);
    }
}
