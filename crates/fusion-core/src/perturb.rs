// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Perturbative Warm Start
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! First-order extrapolation of a solution to changed continuation ratios.

use fusion_math::linalg::pinv_rcond;
use fusion_types::constants::DEFAULT_RCOND;
use fusion_types::error::FusionResult;
use ndarray::Array1;

use crate::constraints::ConstraintEliminator;
use crate::objectives::BuiltObjective;

/// Warm start for `new` from the solution `x` of `old`.
///
/// `x` is first projected onto the constraint set of `eliminator`, then
/// moved by the least-squares step `J_old,red · Δr = −F_new` using the
/// Jacobian of the previous objective. The step is dropped when it does
/// not lower the new cost.
pub fn perturb(
    old: &BuiltObjective,
    new: &BuiltObjective,
    eliminator: &ConstraintEliminator,
    x: &Array1<f64>,
) -> FusionResult<Array1<f64>> {
    let r1 = eliminator.project(x)?;
    let x1 = eliminator.recover(&r1)?;
    let jac = eliminator.reduce_jacobian(&old.jacobian_scaled(&x1)?)?;
    let rhs = new.compute_scaled_error(&x1)?;
    let dr = pinv_rcond(&jac, DEFAULT_RCOND).dot(&rhs);
    let x2 = eliminator.recover(&(&r1 - &dr))?;

    let cost_before = new.compute_scalar(&x1)?;
    let cost_after = new.compute_scalar(&x2)?;
    if cost_after.is_finite() && cost_after <= cost_before {
        log::debug!("perturbation lowered cost {cost_before:.6e} -> {cost_after:.6e}");
        Ok(x2)
    } else {
        log::debug!("perturbation rejected: cost {cost_before:.6e} -> {cost_after:.6e}");
        Ok(x1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equilibrium::{Equilibrium, Resolution, RotationProfile};
    use crate::objectives::{get_fixed_boundary_constraints, ForceBalance, ForceRatios, ObjectiveComposite};
    use fusion_types::config::{ProfileTerm, SurfaceMode};
    use fusion_types::state::Arg;

    #[test]
    fn test_pressure_ramp_warm_start_lowers_cost() {
        let res = Resolution { m: 2, n: 0, m_nodes: 4, n_nodes: 0 };
        let surface = [
            SurfaceMode { m: 0, n: 0, r: 3.0, z: 0.0 },
            SurfaceMode { m: 1, n: 0, r: 1.0, z: 0.0 },
            SurfaceMode { m: -1, n: 0, r: 0.0, z: 1.0 },
        ];
        let pressure = crate::profiles::coefficients_from_terms(&[
            ProfileTerm { l: 0, value: 1e5 },
            ProfileTerm { l: 2, value: -1e5 },
        ]);
        let eq = Equilibrium::new(1, res, RotationProfile::Current, (3, 1), 1.0)
            .with_block(Arg::PL, pressure)
            .unwrap()
            .with_surface(&surface, 1.0)
            .initial_guess(&[])
            .unwrap();
        let build = |pres_ratio| {
            let ratios = ForceRatios {
                pres_ratio,
                ..ForceRatios::default()
            };
            ObjectiveComposite::new()
                .with(ForceBalance::new().with_ratios(ratios))
                .build(&eq)
                .unwrap()
        };
        let old = build(0.0);
        let new = build(1.0);
        let elim = ConstraintEliminator::factorize(&get_fixed_boundary_constraints(&eq).build(&eq).unwrap()).unwrap();
        let x = eq.state();
        let warm = perturb(&old, &new, &elim, &x).unwrap();
        assert!(new.compute_scalar(&warm).unwrap() <= new.compute_scalar(&x).unwrap());
        assert!(elim.violation(&warm).unwrap() < 1e-8);
    }
}
