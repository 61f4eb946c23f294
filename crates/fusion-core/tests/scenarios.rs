// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — End-to-End Equilibrium Scenarios
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Full solves through the public API: continuation, proximal
//! optimization, checkpoints, error surfaces and derivative consistency.

use fusion_core::basis::Mode;
use fusion_core::checkpoint::JsonCheckpoint;
use fusion_core::continuation::{solve_continuation, ContinuationDriver};
use fusion_core::equilibrium::{Equilibrium, Resolution};
use fusion_core::objectives::{
    AspectRatio, FixBoundaryR, FixCurrent, FixPressure, FixPsi, FixedBoundaryMode, ForceBalance,
    ForceRatios, ModeSelection, ObjectiveComposite, ResidualBuilder,
};
use fusion_core::proximal::{solve_proximal, ProximalConfig};
use fusion_core::solvers::TrustRegionConfig;
use fusion_types::config::{ContinuationConfig, EquilibriumInputs, OneOrMany, ProfileTerm};
use fusion_types::error::FusionError;
use fusion_types::state::Arg;

fn circle_inputs() -> EquilibriumInputs {
    EquilibriumInputs::from_json_str(
        r#"{
            "surface": [
                {"m": 0, "n": 0, "R": 1.0},
                {"m": 1, "n": 0, "R": 0.1},
                {"m": -1, "n": 0, "Z": -0.1}
            ]
        }"#,
    )
    .unwrap()
}

fn shaped_inputs() -> EquilibriumInputs {
    EquilibriumInputs::from_json_str(
        r#"{
            "Psi": 1.0,
            "surface": [
                {"m": 0, "n": 0, "R": 1.0},
                {"m": 1, "n": 0, "R": 0.1},
                {"m": -1, "n": 0, "Z": -0.15}
            ],
            "pressure": [{"l": 0, "value": 1000.0}, {"l": 2, "value": -1000.0}],
            "current": [{"l": 0, "value": 0.0}]
        }"#,
    )
    .unwrap()
}

fn quiet(m: Vec<usize>) -> ContinuationConfig {
    ContinuationConfig {
        m: OneOrMany::Many(m),
        verbose: 0,
        ..ContinuationConfig::default()
    }
}

#[test]
fn circular_vacuum_equilibrium_is_recovered() {
    let result = solve_continuation(&circle_inputs(), &quiet(vec![1])).unwrap();
    let record = &result.steps[0].record;
    assert!(record.converged, "termination {}", record.termination);
    assert!(record.cost < 1e-10, "cost {}", record.cost);
    assert!(record.iterations < 50);
    assert!(record.constraint_violation < 1e-8);

    // R(ρ,θ) = 1 + 0.1 ρ cos θ, Z = -0.1 ρ sin θ
    let eq = result.final_equilibrium();
    let basis = eq.basis();
    let r = eq.block(Arg::RLmn);
    let z = eq.block(Arg::ZLmn);
    let at = |mode| basis.index_of(mode).unwrap();
    assert!((r[at(Mode::new(0, 0, 0))] - 1.0).abs() < 1e-8);
    assert!((r[at(Mode::new(1, 1, 0))] - 0.1).abs() < 1e-8);
    assert!((z[at(Mode::new(1, -1, 0))] + 0.1).abs() < 1e-8);
}

#[test]
fn continuation_in_resolution_never_worsens_the_residual() {
    let config = ContinuationConfig {
        m_nodes: Some(OneOrMany::One(6)),
        ..quiet(vec![1, 2, 3])
    };
    let result = solve_continuation(&shaped_inputs(), &config).unwrap();
    assert_eq!(result.steps.len(), 3);

    let last = result.final_equilibrium().resolution();
    let ratios = ForceRatios::from(&result.steps[2].record.step);
    let objective = ObjectiveComposite::new().with(ForceBalance::new().with_ratios(ratios));
    let costs: Vec<f64> = result
        .steps
        .iter()
        .map(|outcome| {
            let eq = outcome.equilibrium.change_resolution(last);
            objective.build(&eq).unwrap().compute_scalar(&eq.state()).unwrap()
        })
        .collect();
    for pair in costs.windows(2) {
        assert!(pair[1] <= pair[0] * (1.0 + 1e-6) + 1e-14, "costs {costs:?}");
    }
    for record in result.records() {
        assert!(record.constraint_violation < 1e-8, "{record:?}");
    }
}

#[test]
fn unconverged_step_is_recorded_and_run_continues() {
    // zero tolerances can never be met, so each step runs out of evaluations
    let config = ContinuationConfig {
        ftol: OneOrMany::One(0.0),
        xtol: OneOrMany::One(0.0),
        gtol: OneOrMany::One(0.0),
        max_nfev: OneOrMany::One(2),
        ..quiet(vec![2, 3])
    };
    let result = solve_continuation(&shaped_inputs(), &config).unwrap();
    assert_eq!(result.steps.len(), 2);
    assert!(!result.all_converged());

    let first = &result.steps[0].record;
    assert_eq!(first.termination, "max_nfev");
    assert!(!first.converged);
    assert_eq!(first.nfev, 2);

    let second = &result.steps[1].record;
    assert_eq!(second.index, 1);
    assert_eq!(second.step.m, 3);
    assert!(second.nfev >= 1);
    assert_eq!(result.final_equilibrium().resolution().m, 3);
}

#[test]
fn pressure_ramp_uses_perturbation() {
    let config = ContinuationConfig {
        pres_ratio: OneOrMany::Many(vec![0.0, 0.5, 1.0]),
        ..quiet(vec![2, 2, 2])
    };
    let result = solve_continuation(&shaped_inputs(), &config).unwrap();
    assert!(result.all_converged());
    let ratios: Vec<f64> = result.records().map(|r| r.step.pres_ratio).collect();
    assert_eq!(ratios, vec![0.0, 0.5, 1.0]);
}

#[test]
fn resolution_round_trip_is_lossless() {
    let inputs = shaped_inputs();
    let step = quiet(vec![1]).steps().unwrap()[0];
    let eq = Equilibrium::from_inputs(&inputs, &step).unwrap();
    let low = eq.resolution();
    let high = Resolution { m: 3, m_nodes: 6, ..low };

    let expanded = eq.change_resolution(high);
    for arg in [Arg::RLmn, Arg::ZLmn, Arg::LLmn] {
        let block = expanded.block(arg);
        for (i, mode) in expanded.basis().modes().iter().enumerate() {
            match eq.basis().index_of(*mode) {
                Some(j) => assert_eq!(block[i], eq.block(arg)[j]),
                None => assert_eq!(block[i], 0.0),
            }
        }
    }
    let back = expanded.change_resolution(low);
    assert_eq!(back.state(), eq.state());
}

#[test]
fn proximal_reaches_target_aspect_ratio() {
    let inputs = circle_inputs();
    let step = quiet(vec![1]).steps().unwrap()[0];
    let eq = Equilibrium::from_inputs(&inputs, &step).unwrap();

    let aspect = ObjectiveComposite::new().with(AspectRatio::new().with_target([8.0]));
    let constraints = ObjectiveComposite::new()
        .with(FixBoundaryR::new(FixedBoundaryMode::OnSurfaceCoefficients).with_modes(ModeSelection::Only(vec![(0, 0)])))
        .with(FixPressure::new())
        .with(FixCurrent::new())
        .with(FixPsi::new());
    let equation = ObjectiveComposite::new().with(ForceBalance::new());
    let tight = TrustRegionConfig {
        ftol: 1e-12,
        xtol: 1e-12,
        gtol: 1e-10,
        max_nfev: 50,
        verbose: 0,
        ..TrustRegionConfig::default()
    };
    let config = ProximalConfig {
        outer: tight.clone(),
        inner: tight,
    };
    let outcome = solve_proximal(&eq, &aspect, &constraints, &equation, &config).unwrap();
    assert!(outcome.result.converged, "{:?}", outcome.result.termination);
    assert!(outcome.history.len() > 1);
    assert!(outcome.inner_solves > 0);

    let solved = &outcome.equilibrium;
    let built = ObjectiveComposite::new().with(AspectRatio::new()).build(solved).unwrap();
    assert_eq!(built.dim_f(), 1);
    let value = built.compute_unscaled(&solved.state()).unwrap()[0];
    assert!((value - 8.0).abs() < 1e-4, "aspect ratio {value}");

    let rb00 = solved.surface_basis().index_of(Mode::new(0, 0, 0)).unwrap();
    assert!((solved.block(Arg::RbLmn)[rb00] - 1.0).abs() < 1e-12);
    let force = equation.build(solved).unwrap().compute_scalar(&solved.state()).unwrap();
    assert!(force < 1e-8, "force residual {force}");
}

#[test]
fn fixing_absent_current_profile_is_a_build_error() {
    let inputs = EquilibriumInputs {
        iota: Some(vec![ProfileTerm { l: 0, value: 0.5 }]),
        ..circle_inputs()
    };
    let step = quiet(vec![1]).steps().unwrap()[0];
    let eq = Equilibrium::from_inputs(&inputs, &step).unwrap();
    let err = ObjectiveComposite::new()
        .with(FixCurrent::new())
        .build(&eq)
        .unwrap_err();
    assert!(matches!(err, FusionError::Build { .. }), "{err}");
}

#[test]
fn checkpoints_follow_every_step() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("continuation.jsonl");
    let sink = JsonCheckpoint::create(&path).unwrap();
    let mut driver = ContinuationDriver::new(circle_inputs(), quiet(vec![1, 2]))
        .unwrap()
        .with_checkpoint(Box::new(sink));
    let result = driver.run().unwrap();
    drop(driver);

    let records = JsonCheckpoint::read_all(&path).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].step, 0);
    let restored = Equilibrium::from_snapshot(&records[1].snapshot).unwrap();
    let expected = result.final_equilibrium();
    assert_eq!(restored.resolution(), expected.resolution());
    assert_eq!(restored.state(), expected.state());
}

#[test]
fn derivatives_match_finite_differences() {
    let step = ContinuationConfig {
        m: OneOrMany::One(2),
        verbose: 0,
        ..ContinuationConfig::default()
    }
    .steps()
    .unwrap()[0];
    let eq = Equilibrium::from_inputs(&shaped_inputs(), &step).unwrap();
    let objective = ObjectiveComposite::new()
        .with(ForceBalance::new())
        .with(AspectRatio::new().with_target([9.0]))
        .build(&eq)
        .unwrap();

    let n = objective.dim_x();
    let x = &eq.state() + &ndarray::Array1::from_shape_fn(n, |i| 1e-3 * ((i as f64) * 0.7).sin());
    let v = ndarray::Array1::from_shape_fn(n, |i| ((i as f64) * 1.3).cos());
    let h = 1e-6;
    let xp = &x + &(&v * h);
    let xm = &x - &(&v * h);

    let fd = (&objective.compute_scaled(&xp).unwrap() - &objective.compute_scaled(&xm).unwrap()) / (2.0 * h);
    let jv = objective.jvp_scaled(&x, &v).unwrap();
    let scale = 1.0 + jv.iter().fold(0.0f64, |m, a| m.max(a.abs()));
    let err = (&jv - &fd).iter().fold(0.0f64, |m, a| m.max(a.abs()));
    assert!(err < 1e-5 * scale, "jvp error {err:.3e} (scale {scale:.3e})");

    let jac = objective.jacobian_scaled(&x).unwrap();
    let w = objective.compute_scaled_error(&x).unwrap();
    let vj = objective.vjp_scaled(&x, &w).unwrap();
    let dense = jac.t().dot(&w);
    let vscale = 1.0 + dense.iter().fold(0.0f64, |m, a| m.max(a.abs()));
    assert!((&vj - &dense).iter().all(|d| d.abs() < 1e-8 * vscale));

    let g = objective.gradient(&x).unwrap();
    let slope = (objective.compute_scalar(&xp).unwrap() - objective.compute_scalar(&xm).unwrap()) / (2.0 * h);
    let gv = g.dot(&v);
    assert!((gv - slope).abs() < 1e-5 * (1.0 + gv.abs()), "directional derivative {gv} vs {slope}");
}
