//! Pipeline driver.
//!
//! Runs an ordered [`PhaseSet`] over an ordered operand list on the calling
//! thread, accounting progress and honoring cancellation between operands
//! and phases.

use std::sync::Arc;

use crate::action::ActionRegistry;
use crate::config::{EngineConfig, FailurePolicy};
use crate::context::ProvisioningContext;
use crate::fs::remove_path_if_exists;
use crate::metadata::Operand;
use crate::phase::{Phase, PhaseParameters, PhaseSet, WorkSplit};
use crate::progress::{ProgressMonitor, ProgressSlice, split_ticks};
use crate::repository::CachingArtifactRepository;
use crate::status::{Severity, Status};

/// Ticks reported over one run, whatever the phase set.
pub const TOTAL_TICKS: u64 = 100_000;

#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    registry: Arc<ActionRegistry>,
}

/// Result of one phase and whether the run must stop after it.
struct PhaseOutcome {
    status: Status,
    stop: bool,
}

impl Engine {
    pub fn new(config: EngineConfig, registry: Arc<ActionRegistry>) -> Self {
        Self { config, registry }
    }

    /// Default configuration and the built-in actions.
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default(), Arc::new(ActionRegistry::with_builtin_actions()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    /// Run every phase over `operands` and return the composite outcome.
    ///
    /// The staging cache is left as the phases left it; see [`Engine::perform`]
    /// for commit-or-discard.
    pub fn run(
        &self,
        phases: &PhaseSet,
        operands: &[Operand],
        ctx: &ProvisioningContext,
        monitor: &dyn ProgressMonitor,
    ) -> Status {
        let weights: Vec<u64> = phases.phases().iter().map(|p| self.phase_weight(p.as_ref())).collect();
        let budgets = split_ticks(TOTAL_TICKS, &weights);

        monitor.begin("Provisioning", TOTAL_TICKS);
        tracing::info!(phases = phases.len(), operands = operands.len(), "Starting provisioning run");

        let mut status = Status::multi("Provisioning run");
        let mut next = 0;
        for (phase, budget) in phases.phases().iter().zip(&budgets) {
            if ctx.is_cancelled() {
                tracing::warn!(phase = phase.id(), "Run cancelled before phase");
                status.add(Status::cancel().with_subject(phase.id()));
                break;
            }
            next += 1;

            let outcome = self.run_phase(phase.as_ref(), operands, ctx, monitor, *budget);
            tracing::info!(
                phase = phase.id(),
                severity = %outcome.status.severity(),
                "Finished phase"
            );
            status.add(outcome.status);
            if outcome.stop {
                break;
            }
        }

        // Skipped phases still account for their share.
        for budget in budgets.iter().skip(next) {
            ProgressSlice::new(monitor, *budget).finish();
        }
        monitor.done();

        tracing::info!(severity = %status.severity(), "Provisioning run finished");
        status
    }

    /// [`Engine::run`], then commit the staging cache on success or throw its
    /// pending additions away on failure or cancellation.
    pub fn perform(
        &self,
        phases: &PhaseSet,
        operands: &[Operand],
        ctx: &ProvisioningContext,
        monitor: &dyn ProgressMonitor,
    ) -> Status {
        let mut status = self.run(phases, operands, ctx, monitor);
        let staging = ctx.staging();

        if status.severity().is_failure() {
            if let Err(err) = discard_staged(staging) {
                tracing::warn!(error = %err, "Failed to discard staged artifacts");
                status.add(Status::warning(format!("Failed to discard staged artifacts: {err:#}")));
            }
        } else if let Err(err) = staging.save() {
            status.add(Status::from_error(&err.context("Failed to commit staged artifacts")));
        }
        status
    }

    fn phase_weight(&self, phase: &dyn Phase) -> u64 {
        self.config
            .phase(phase.id())
            .and_then(|c| c.weight)
            .unwrap_or_else(|| phase.weight())
    }

    fn phase_split(&self, phase: &dyn Phase) -> WorkSplit {
        self.config
            .phase(phase.id())
            .and_then(|c| c.split)
            .map(WorkSplit::from)
            .unwrap_or_else(|| phase.work_split())
    }

    fn run_phase(
        &self,
        phase: &dyn Phase,
        operands: &[Operand],
        ctx: &ProvisioningContext,
        monitor: &dyn ProgressMonitor,
        budget: u64,
    ) -> PhaseOutcome {
        let parts = split_ticks(budget, &self.phase_split(phase).weights());
        let (pre, main, post) = (
            ProgressSlice::new(monitor, parts[0]),
            ProgressSlice::new(monitor, parts[1]),
            ProgressSlice::new(monitor, parts[2]),
        );

        monitor.subtask(phase.id());
        tracing::debug!(phase = phase.id(), "Starting phase");

        let mut status = Status::multi(format!("Phase {}", phase.id())).with_subject(phase.id());
        let mut params = PhaseParameters::new();

        let init = phase.initialize_phase(ctx, &mut params);
        pre.finish();
        if init.severity().is_failure() {
            tracing::warn!(phase = phase.id(), "Phase setup failed");
            status.merge(init);
            main.finish();
            post.finish();
            return PhaseOutcome { status, stop: true };
        }
        status.merge(init);

        let applicable: Vec<&Operand> = operands.iter().filter(|o| phase.is_applicable(o)).collect();
        let operand_ticks = split_ticks(parts[1], &vec![1; applicable.len()]);
        for (operand, ticks) in applicable.into_iter().zip(operand_ticks) {
            if ctx.is_cancelled() {
                tracing::warn!(phase = phase.id(), operand = %operand, "Run cancelled");
                break;
            }
            let result = phase.perform_operand(ctx, &self.registry, operand, &mut params);
            main.advance(ticks);

            let fatal = result.is_fatal();
            if !result.is_ok() || fatal {
                status.add(result);
            }
            if fatal {
                tracing::warn!(phase = phase.id(), operand = %operand, "Fatal failure, skipping remaining operands");
                break;
            }
        }
        main.finish();

        status.merge(phase.complete_phase(ctx, &mut params, &post));
        post.finish();

        if ctx.is_cancelled() && !status.is_cancel() {
            status.add(Status::cancel());
        }

        let stop = match status.severity() {
            Severity::Cancel => true,
            Severity::Error => {
                status.is_fatal()
                    || phase.failure_is_fatal()
                    || self.config.failure_policy == FailurePolicy::Abort
            }
            Severity::Ok | Severity::Warning => status.is_fatal(),
        };
        PhaseOutcome { status, stop }
    }
}

/// Delete content the collector staged for pending additions, then drop the
/// pending additions themselves.
fn discard_staged(staging: &CachingArtifactRepository) -> anyhow::Result<()> {
    for descriptor in staging.pending_additions() {
        if staging.inner().contains_key(descriptor.key())? {
            continue;
        }
        if let Some(path) = staging.artifact_file(&descriptor) {
            if let Err(err) = remove_path_if_exists(&path) {
                tracing::warn!(path = %path.display(), error = %err, "Failed to delete staged content");
            }
        }
    }
    staging.remove_all()
}
