// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Property-Based Tests (proptest) for fusion-types
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for fusion-types using proptest.
//!
//! Covers: state layout packing invariants, continuation broadcasting.

use fusion_types::config::{ContinuationConfig, OneOrMany};
use fusion_types::state::{Arg, Dimensions, StateLayout, ARG_ORDER};
use ndarray::Array1;
use proptest::prelude::*;

fn arb_dims() -> impl Strategy<Value = Dimensions> {
    prop::collection::vec(0usize..12, 9).prop_map(|sizes| {
        ARG_ORDER
            .iter()
            .zip(sizes)
            .fold(Dimensions::new(), |d, (&a, n)| d.with(a, n))
    })
}

fn arb_args() -> impl Strategy<Value = Vec<Arg>> {
    prop::sample::subsequence(ARG_ORDER.to_vec(), 1..=9).prop_shuffle()
}

// ── State Layout ─────────────────────────────────────────────────────

proptest! {
    /// Blocks are disjoint, contiguous and exhaustive.
    #[test]
    fn layout_blocks_tile_vector(dims in arb_dims(), args in arb_args()) {
        let layout = StateLayout::new(&args, &dims);
        let total: usize = layout.args().iter().map(|&a| dims.get(a)).sum();
        prop_assert_eq!(layout.dim(), total);

        let mut next = 0;
        for &arg in layout.args() {
            let r = layout.range(arg).unwrap();
            prop_assert_eq!(r.start, next);
            next = r.end;
        }
        prop_assert_eq!(next, layout.dim());
    }

    /// Argument order is independent of the order the caller lists them.
    #[test]
    fn layout_order_is_global(dims in arb_dims(), args in arb_args()) {
        let layout = StateLayout::new(&args, &dims);
        let mut reversed = args.clone();
        reversed.reverse();
        prop_assert_eq!(&layout, &StateLayout::new(&reversed, &dims));
        prop_assert!(layout.args().windows(2).all(|w| w[0] < w[1]));
    }

    /// Restricting to a sub-layout and aligning back is a projection.
    #[test]
    fn restrict_then_align_keeps_blocks(dims in arb_dims(), args in arb_args()) {
        let full = StateLayout::new(&ARG_ORDER, &dims);
        let sub = StateLayout::new(&args, &dims);
        let x = Array1::from_iter((0..full.dim()).map(|i| i as f64 + 1.0));
        let xs = sub.restrict(&x, &full).unwrap();
        let jac = xs.clone().insert_axis(ndarray::Axis(0));
        let back = full.align_columns(&jac, &sub).unwrap();
        for &arg in full.args() {
            let block = full.block(&back.row(0).to_owned(), arg).to_owned();
            if sub.contains(arg) {
                prop_assert_eq!(block, full.block(&x, arg).to_owned());
            } else {
                prop_assert!(block.iter().all(|&v| v == 0.0));
            }
        }
    }
}

// ── Continuation Broadcasting ────────────────────────────────────────

proptest! {
    /// Broadcast length equals the longest array; scalars repeat.
    #[test]
    fn continuation_broadcast_length(ms in prop::collection::vec(1usize..6, 1..8), ftol in 1e-12f64..1e-3) {
        let cfg = ContinuationConfig {
            m: OneOrMany::Many(ms.clone()),
            ftol: OneOrMany::One(ftol),
            ..ContinuationConfig::default()
        };
        let steps = cfg.steps().unwrap();
        prop_assert_eq!(steps.len(), ms.len());
        for (step, &m) in steps.iter().zip(&ms) {
            prop_assert_eq!(step.m, m);
            prop_assert_eq!(step.m_nodes, 2 * m);
            prop_assert!((step.ftol - ftol).abs() == 0.0);
        }
    }
}
