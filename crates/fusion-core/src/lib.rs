// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Crate Root
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Spectral MHD equilibrium solver.
//!
//! Layer 1: basis, grid, profiles, equilibrium container, oracle
//! Layer 2: residual catalog and objective composition
//! Layer 3: constraint elimination, trust region, proximal projection
//! Layer 4: perturbation, continuation, checkpoints

pub mod basis;
pub mod checkpoint;
pub mod constraints;
pub mod continuation;
pub mod equilibrium;
pub mod grid;
pub mod objectives;
pub mod oracle;
pub mod perturb;
pub mod profiles;
pub mod proximal;
pub mod solvers;
