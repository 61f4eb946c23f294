// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Property-Based Tests (proptest) for fusion-core
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for fusion-core using proptest.
//!
//! Covers: feasibility of recovered states, projection round trips,
//! zero-fill coefficient embedding between resolutions, bound clamping.

use fusion_core::basis::SpectralBasis;
use fusion_core::constraints::ConstraintEliminator;
use fusion_core::objectives::Goal;
use fusion_types::state::{Arg, Dimensions, StateLayout};
use ndarray::{Array1, Array2};
use proptest::prelude::*;

/// Feasible linear system `A x = b` with `b = A x0`, a non-trivial null
/// space and optionally a pinned first column.
#[derive(Debug, Clone)]
struct System {
    a: Array2<f64>,
    b: Array1<f64>,
    x0: Array1<f64>,
}

fn arb_system() -> impl Strategy<Value = System> {
    (3usize..8, any::<bool>()).prop_flat_map(|(n, pin)| {
        (1usize..n - 1).prop_flat_map(move |k| {
            (
                prop::collection::vec(-2.0f64..2.0, k * n),
                prop::collection::vec(-1.0f64..1.0, n),
            )
                .prop_map(move |(a, x0)| {
                    let coupled = Array2::from_shape_vec((k, n), a).unwrap();
                    let rows = if pin { k + 1 } else { k };
                    let mut a = Array2::zeros((rows, n));
                    a.slice_mut(ndarray::s![..k, ..]).assign(&coupled);
                    if pin {
                        a[[k, 0]] = 1.0;
                    }
                    let x0 = Array1::from_vec(x0);
                    let b = a.dot(&x0);
                    System { a, b, x0 }
                })
        })
    })
}

fn eliminator(sys: &System) -> ConstraintEliminator {
    let n = sys.a.ncols();
    let layout = StateLayout::new(&[Arg::RLmn], &Dimensions::new().with(Arg::RLmn, n));
    ConstraintEliminator::from_system(layout, sys.a.clone(), sys.b.clone()).unwrap()
}

fn max_abs(v: &Array1<f64>) -> f64 {
    v.iter().fold(0.0f64, |acc, x| acc.max(x.abs()))
}

proptest! {
    /// Every reduced vector maps back onto the constraint set.
    #[test]
    fn recovered_states_are_feasible(
        sys in arb_system(),
        seed in prop::collection::vec(-3.0f64..3.0, 8),
    ) {
        let elim = eliminator(&sys);
        let r = Array1::from_iter(seed.iter().cycle().take(elim.dim_reduced()).copied());
        let x = elim.recover(&r).unwrap();
        let scale = 1.0 + max_abs(&sys.b) + max_abs(&x);
        let violation = elim.violation(&x).unwrap();
        prop_assert!(violation < 1e-8 * scale, "violation {}", violation);
    }

    /// Projecting a recovered state returns the reduced vector.
    #[test]
    fn project_inverts_recover(
        sys in arb_system(),
        seed in prop::collection::vec(-3.0f64..3.0, 8),
    ) {
        let elim = eliminator(&sys);
        let r = Array1::from_iter(seed.iter().cycle().take(elim.dim_reduced()).copied());
        let back = elim.project(&elim.recover(&r).unwrap()).unwrap();
        prop_assert!(max_abs(&(&back - &r)) < 1e-9);
    }

    /// A feasible state survives the project/recover round trip.
    #[test]
    fn feasible_state_round_trips(sys in arb_system()) {
        let elim = eliminator(&sys);
        let x = elim.recover(&elim.project(&sys.x0).unwrap()).unwrap();
        prop_assert!(max_abs(&(&x - &sys.x0)) < 1e-8, "{:?} vs {:?}", x, sys.x0);
    }

    /// Pinned columns keep their fixed value for any reduced vector.
    #[test]
    fn pinned_column_is_clamped(
        sys in arb_system(),
        seed in prop::collection::vec(-3.0f64..3.0, 8),
    ) {
        let elim = eliminator(&sys);
        let r = Array1::from_iter(seed.iter().cycle().take(elim.dim_reduced()).copied());
        let x = elim.recover(&r).unwrap();
        for &j in elim.fixed_idx() {
            prop_assert_eq!(x[j], elim.xp()[j]);
        }
    }

    /// Raising the resolution zero-fills new modes and lowering it again
    /// restores the original coefficients exactly.
    #[test]
    fn coefficient_embedding_round_trips(
        m in 1usize..4,
        n in 0usize..2,
        dm in 0usize..3,
        dn in 0usize..2,
        values in prop::collection::vec(-1.0f64..1.0, 64),
    ) {
        let low = SpectralBasis::fourier_zernike(m, n, 2);
        let high = SpectralBasis::fourier_zernike(m + dm, n + dn, 2);
        let coeffs = Array1::from_iter(values.iter().cycle().take(low.num_modes()).copied());
        let up = high.map_coefficients(&low, &coeffs);
        for (i, mode) in high.modes().iter().enumerate() {
            if low.index_of(*mode).is_none() {
                prop_assert_eq!(up[i], 0.0);
            }
        }
        let down = low.map_coefficients(&high, &up);
        prop_assert_eq!(down, coeffs);
    }
}

proptest! {
    /// Values inside the bounds carry no error; outside, the error is the
    /// signed distance to the nearest bound.
    #[test]
    fn bound_error_is_clamped(
        lo in -5.0f64..0.0,
        width in 0.0f64..5.0,
        value in -10.0f64..10.0,
    ) {
        let hi = lo + width;
        let goal = Goal::Bounds { lower: ndarray::array![lo], upper: ndarray::array![hi] };
        let err = goal.error(&ndarray::array![value])[0];
        if value < lo {
            prop_assert_eq!(err, value - lo);
        } else if value > hi {
            prop_assert_eq!(err, value - hi);
        } else {
            prop_assert_eq!(err, 0.0);
        }
    }
}
