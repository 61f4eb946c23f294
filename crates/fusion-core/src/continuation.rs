// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Continuation Driver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Sequential equilibrium solves over increasing resolution and ratios.
//!
//! Each step warm-starts from the previous one: blocks are re-indexed when
//! the resolution changes, the boundary is rescaled by the step's
//! `bdry_ratio`, and a first-order perturbation is applied when any ratio
//! changed. A step that fails to converge is recorded and the sequence
//! continues; only errors (infeasible constraints, missing profiles)
//! abort the run.

use fusion_types::config::{ContinuationConfig, ContinuationStep, EquilibriumInputs};
use fusion_types::error::{FusionError, FusionResult};
use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointSink;
use crate::constraints::{ConstraintEliminator, LinearConstraintProjection};
use crate::equilibrium::{Equilibrium, Resolution};
use crate::objectives::{get_fixed_boundary_constraints, BuiltObjective, ForceBalance, ForceRatios, ObjectiveComposite};
use crate::perturb::perturb;
use crate::solvers::{trust_region_lsq, InitialRadius, TerminationReason, TrustRegionConfig, XScale};

/// Summary of one continuation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub step: ContinuationStep,
    pub cost: f64,
    pub iterations: usize,
    pub nfev: usize,
    pub converged: bool,
    pub termination: String,
    /// `‖A x − b‖` of the fixed-boundary constraints at the solution.
    pub constraint_violation: f64,
}

#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub record: StepRecord,
    pub equilibrium: Equilibrium,
}

#[derive(Debug, Clone)]
pub struct ContinuationResult {
    /// Cold-start guess of the first step, before any solve.
    pub initial: Equilibrium,
    pub steps: Vec<StepOutcome>,
}

impl ContinuationResult {
    pub fn final_equilibrium(&self) -> &Equilibrium {
        self.steps
            .last()
            .map_or(&self.initial, |outcome| &outcome.equilibrium)
    }

    pub fn records(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().map(|s| &s.record)
    }

    pub fn all_converged(&self) -> bool {
        self.steps.iter().all(|s| s.record.converged)
    }
}

pub struct ContinuationDriver {
    inputs: EquilibriumInputs,
    config: ContinuationConfig,
    checkpoint: Option<Box<dyn CheckpointSink>>,
}

impl ContinuationDriver {
    pub fn new(inputs: EquilibriumInputs, config: ContinuationConfig) -> FusionResult<Self> {
        inputs.validate()?;
        config.validate()?;
        Ok(ContinuationDriver {
            inputs,
            config,
            checkpoint: None,
        })
    }

    pub fn with_checkpoint(mut self, sink: Box<dyn CheckpointSink>) -> Self {
        self.checkpoint = Some(sink);
        self
    }

    /// Hand back the checkpoint sink, e.g. to inspect an in-memory record.
    pub fn take_checkpoint(&mut self) -> Option<Box<dyn CheckpointSink>> {
        self.checkpoint.take()
    }

    fn solver_config(&self, step: &ContinuationStep) -> TrustRegionConfig {
        TrustRegionConfig {
            ftol: step.ftol,
            xtol: step.xtol,
            gtol: step.gtol,
            max_nfev: step.max_nfev,
            initial_radius: InitialRadius::GaussNewtonStep,
            x_scale: XScale::Jacobian,
            verbose: self.config.verbose,
            ..TrustRegionConfig::default()
        }
    }

    fn force_objective(&self, eq: &Equilibrium, ratios: ForceRatios) -> FusionResult<BuiltObjective> {
        ObjectiveComposite::new()
            .with(ForceBalance::new().with_ratios(ratios))
            .with_verbose(self.config.verbose)
            .build(eq)
    }

    pub fn run(&mut self) -> FusionResult<ContinuationResult> {
        let steps = self.config.steps()?;
        let verbose = self.config.verbose;

        let mut initial: Option<Equilibrium> = None;
        let mut previous: Option<(ContinuationStep, Equilibrium)> = None;
        let mut outcomes = Vec::with_capacity(steps.len());

        for (index, step) in steps.iter().enumerate() {
            let ratios = ForceRatios::from(step);
            let eq = match &previous {
                None => {
                    let eq = Equilibrium::from_inputs(&self.inputs, step)?;
                    initial = Some(eq.clone());
                    eq
                }
                Some((prev_step, prev_eq)) => {
                    let eq = if step.same_resolution(prev_step) {
                        prev_eq.clone()
                    } else {
                        if verbose >= 1 {
                            log::info!(
                                "step {index}: resolution M={} N={} M_nodes={} N_nodes={}",
                                step.m,
                                step.n,
                                step.m_nodes,
                                step.n_nodes
                            );
                        }
                        prev_eq.change_resolution(Resolution::from(step))
                    };
                    eq.with_surface(&self.inputs.surface, step.bdry_ratio)
                }
            };

            let objective = self.force_objective(&eq, ratios)?;
            let constraints = get_fixed_boundary_constraints(&eq)
                .with_verbose(verbose)
                .build(&eq)?;
            let eliminator = ConstraintEliminator::factorize(&constraints)?;

            let ratios_changed = previous
                .as_ref()
                .is_some_and(|(prev_step, _)| prev_step.ratios() != step.ratios());
            let x0 = match &previous {
                Some((prev_step, _)) if ratios_changed => {
                    if verbose >= 1 {
                        log::info!(
                            "step {index}: perturbing ratios {:?} -> {:?}",
                            prev_step.ratios(),
                            step.ratios()
                        );
                    }
                    let old = self.force_objective(&eq, ForceRatios::from(prev_step))?;
                    perturb(&old, &objective, &eliminator, &eq.state())?
                }
                _ => eq.state(),
            };
            let r0 = eliminator.project(&x0)?;

            let mut problem = LinearConstraintProjection::new(objective, eliminator)?;
            let result = trust_region_lsq(&mut problem, &r0, &self.solver_config(step))?;
            let x = problem.eliminator().recover(&result.x)?;
            let violation = problem.eliminator().violation(&x)?;
            let eq = eq.with_state(&x)?;

            if !result.converged {
                log::warn!(
                    "step {index} did not converge ({:?}, cost = {:.6e}); continuing from best iterate",
                    result.termination,
                    result.cost
                );
            }
            if verbose >= 1 {
                log::info!(
                    "step {index}: cost = {:.6e}, {} iterations, {:?}",
                    result.cost,
                    result.iterations,
                    result.termination
                );
                problem.problem().report(&x)?;
            }

            if let Some(sink) = self.checkpoint.as_mut() {
                sink.record(index, &eq.snapshot())?;
            }

            let record = StepRecord {
                index,
                step: *step,
                cost: result.cost,
                iterations: result.iterations,
                nfev: result.nfev,
                converged: result.converged,
                termination: termination_name(result.termination).to_string(),
                constraint_violation: violation,
            };
            outcomes.push(StepOutcome {
                record,
                equilibrium: eq.clone(),
            });
            previous = Some((*step, eq));
        }

        let initial = initial.ok_or_else(|| {
            FusionError::ConfigError("continuation produced no initial equilibrium".to_string())
        })?;
        Ok(ContinuationResult {
            initial,
            steps: outcomes,
        })
    }
}

fn termination_name(reason: TerminationReason) -> &'static str {
    match reason {
        TerminationReason::FunctionChange => "ftol",
        TerminationReason::StepSize => "xtol",
        TerminationReason::GradientNorm => "gtol",
        TerminationReason::MaxEvaluations => "max_nfev",
        TerminationReason::NumericalError => "numerical",
    }
}

/// Build and run a driver in one call.
pub fn solve_continuation(
    inputs: &EquilibriumInputs,
    config: &ContinuationConfig,
) -> FusionResult<ContinuationResult> {
    ContinuationDriver::new(inputs.clone(), config.clone())?.run()
}
