//! Pipeline phases.
//!
//! A phase gets three hooks per run: `initialize_phase` once, then
//! `is_applicable` / `perform_operand` for every operand in order, then
//! `complete_phase` once. State shared between the hooks lives in
//! [`PhaseParameters`].

pub mod check_trust;
pub mod collect;
pub mod params;
pub mod touchpoint;

use std::sync::Arc;

use crate::action::{ActionContext, ActionRegistry, ResolvedAction};
use crate::collect::Collector;
use crate::context::ProvisioningContext;
use crate::error::InstructionError;
use crate::metadata::{Operand, Unit};
use crate::progress::ProgressSlice;
use crate::status::Status;
use crate::trust::TrustVerifier;

pub use check_trust::CheckTrust;
pub use collect::Collect;
pub use params::PhaseParameters;
pub use touchpoint::{PhaseTarget, TouchpointPhase};

pub const CHECK_TRUST: &str = "check_trust";
pub const COLLECT: &str = "collect";
pub const UNCONFIGURE: &str = "unconfigure";
pub const UNINSTALL: &str = "uninstall";
pub const INSTALL: &str = "install";
pub const CONFIGURE: &str = "configure";

/// Relative progress weights of a phase's setup, per-operand work and teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkSplit {
    pub pre: u64,
    pub main: u64,
    pub post: u64,
}

impl WorkSplit {
    pub const fn new(pre: u64, main: u64, post: u64) -> Self {
        Self { pre, main, post }
    }

    pub fn weights(&self) -> [u64; 3] {
        [self.pre, self.main, self.post]
    }
}

impl Default for WorkSplit {
    fn default() -> Self {
        Self::new(1, 1, 1)
    }
}

impl From<[u64; 3]> for WorkSplit {
    fn from([pre, main, post]: [u64; 3]) -> Self {
        Self::new(pre, main, post)
    }
}

/// One named stage of the pipeline.
pub trait Phase: Send + Sync {
    fn id(&self) -> &str;

    /// Share of overall progress, relative to the other phases of the set.
    fn weight(&self) -> u64;

    fn work_split(&self) -> WorkSplit {
        WorkSplit::default()
    }

    /// An `Error` from this phase stops the run whatever the failure policy.
    fn failure_is_fatal(&self) -> bool {
        false
    }

    /// Batch setup. An `Error` here aborts the run.
    fn initialize_phase(&self, _ctx: &ProvisioningContext, _params: &mut PhaseParameters) -> Status {
        Status::ok()
    }

    fn is_applicable(&self, operand: &Operand) -> bool;

    /// The unit this phase's actions operate on.
    fn target_unit<'a>(&self, operand: &'a Operand) -> Option<&'a Unit> {
        operand.after()
    }

    fn actions(
        &self,
        registry: &ActionRegistry,
        unit: &Unit,
        ctx: &ProvisioningContext,
    ) -> Result<Vec<ResolvedAction>, InstructionError> {
        registry.resolve(unit, self.id(), ctx.profile())
    }

    /// Resolve and execute this phase's actions for one operand.
    fn perform_operand(
        &self,
        ctx: &ProvisioningContext,
        registry: &ActionRegistry,
        operand: &Operand,
        params: &mut PhaseParameters,
    ) -> Status {
        let Some(unit) = self.target_unit(operand) else {
            return Status::ok();
        };
        match self.actions(registry, unit, ctx) {
            Ok(actions) => execute_actions(self.id(), &actions, ctx, operand, unit, params),
            Err(err) => instruction_failure(unit, &err),
        }
    }

    /// Batch teardown; `progress` is this phase's post-operand budget.
    fn complete_phase(
        &self,
        _ctx: &ProvisioningContext,
        _params: &mut PhaseParameters,
        _progress: &ProgressSlice<'_>,
    ) -> Status {
        Status::ok()
    }
}

/// Run `actions` in order for one operand.
///
/// The first action ending in `Error` or `Cancel` stops the rest. `Err`
/// returned by an action becomes an `Error` status.
pub fn execute_actions(
    phase_id: &str,
    actions: &[ResolvedAction],
    ctx: &ProvisioningContext,
    operand: &Operand,
    unit: &Unit,
    params: &mut PhaseParameters,
) -> Status {
    let mut status = Status::multi(format!("{} {}", phase_id, operand)).with_subject(unit.to_string());

    for resolved in actions {
        let mut action_ctx = ActionContext {
            phase_id,
            operand,
            unit,
            arguments: &resolved.arguments,
            provisioning: ctx,
            params: &mut *params,
        };
        let result = resolved
            .action
            .execute(&mut action_ctx)
            .unwrap_or_else(|err| Status::from_error(&err));

        if result.is_ok() && !result.is_fatal() {
            continue;
        }
        tracing::warn!(
            phase = phase_id,
            unit = %unit,
            action = resolved.action.name(),
            severity = %result.severity(),
            "Action did not complete cleanly"
        );
        let failed = result.severity().is_failure();
        let result = if result.subject().is_some() {
            result
        } else {
            result.with_subject(format!("{}:{}", unit, resolved.action.name()))
        };
        status.add(result);
        if failed {
            break;
        }
    }
    status
}

fn instruction_failure(unit: &Unit, err: &InstructionError) -> Status {
    tracing::warn!(unit = %unit, error = %err, "Invalid touchpoint instructions");
    Status::error(format!("Invalid touchpoint instructions: {}", err)).with_subject(unit.to_string())
}

/// Ordered phases for one run.
#[derive(Default)]
pub struct PhaseSet {
    phases: Vec<Box<dyn Phase>>,
}

impl PhaseSet {
    pub fn new(phases: Vec<Box<dyn Phase>>) -> Self {
        Self { phases }
    }

    /// `check_trust, collect, unconfigure, uninstall, install, configure`
    pub fn standard(verifier: Arc<dyn TrustVerifier>, collector: Arc<dyn Collector>) -> Self {
        Self::new(vec![
            Box::new(CheckTrust::new(verifier)),
            Box::new(Collect::new(collector)),
            Box::new(TouchpointPhase::unconfigure()),
            Box::new(TouchpointPhase::uninstall()),
            Box::new(TouchpointPhase::install()),
            Box::new(TouchpointPhase::configure()),
        ])
    }

    pub fn push(&mut self, phase: Box<dyn Phase>) {
        self.phases.push(phase);
    }

    pub fn phases(&self) -> &[Box<dyn Phase>] {
        &self.phases
    }

    pub fn ids(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

impl std::fmt::Debug for PhaseSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, NATIVE_TOUCHPOINT};
    use crate::metadata::{Profile, TouchpointType};
    use crate::repository::{CachingArtifactRepository, MemoryArtifactRepository};
    use semver::Version;
    use std::path::PathBuf;

    #[derive(Debug)]
    struct Fixed(&'static str, Status);

    impl Action for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn execute(&self, _ctx: &mut ActionContext<'_>) -> anyhow::Result<Status> {
            Ok(self.1.clone())
        }

        fn undo(&self, _ctx: &mut ActionContext<'_>) -> anyhow::Result<Status> {
            Ok(Status::ok())
        }
    }

    #[derive(Debug)]
    struct Failing;

    impl Action for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn execute(&self, _ctx: &mut ActionContext<'_>) -> anyhow::Result<Status> {
            anyhow::bail!("disk unplugged")
        }

        fn undo(&self, _ctx: &mut ActionContext<'_>) -> anyhow::Result<Status> {
            Ok(Status::ok())
        }
    }

    fn context() -> ProvisioningContext {
        let backing = Arc::new(MemoryArtifactRepository::new("phase").unwrap());
        ProvisioningContext::new(
            Profile::new("test", PathBuf::from("/opt/app")),
            Arc::new(CachingArtifactRepository::new(backing)),
        )
    }

    fn unit() -> Unit {
        Unit::new("tool", Version::new(1, 0, 0))
            .with_touchpoint_type(TouchpointType::new(NATIVE_TOUCHPOINT, Version::new(1, 0, 0)))
    }

    fn resolved(action: impl Action + 'static) -> ResolvedAction {
        ResolvedAction {
            action: Box::new(action),
            arguments: Default::default(),
        }
    }

    #[test]
    fn first_failure_stops_remaining_actions() {
        let unit = unit();
        let operand = Operand::install(unit.clone());
        let actions = vec![
            resolved(Fixed("warn", Status::warning("slow"))),
            resolved(Failing),
            resolved(Fixed("never", Status::error("should not run"))),
        ];
        let mut params = PhaseParameters::new();

        let status = execute_actions(INSTALL, &actions, &context(), &operand, &unit, &mut params);
        assert_eq!(status.children().len(), 2);
        assert!(status.children()[1].message().contains("disk unplugged"));
        assert_eq!(status.children()[1].subject(), Some("tool/1.0.0:failing"));
    }

    #[test]
    fn instruction_errors_become_operand_errors() {
        let phase = TouchpointPhase::install();
        let unit = unit().with_instruction(INSTALL, "mkdir(path");
        let operand = Operand::install(unit);
        let mut params = PhaseParameters::new();

        let status = phase.perform_operand(
            &context(),
            &ActionRegistry::with_builtin_actions(),
            &operand,
            &mut params,
        );
        assert!(status.severity().is_failure());
        assert!(status.message().contains("Invalid touchpoint instructions"));
    }

    #[test]
    fn standard_set_order() {
        struct NoTrust;
        impl TrustVerifier for NoTrust {
            fn verify(&self, _requests: &[crate::metadata::ArtifactRequest]) -> Status {
                Status::ok()
            }
        }
        struct NoCollect;
        impl Collector for NoCollect {
            fn collect(
                &self,
                _batches: Vec<crate::metadata::ArtifactRequestBatch>,
                _cancel: &crate::progress::CancelToken,
                _progress: &ProgressSlice<'_>,
            ) -> Status {
                Status::ok()
            }
        }

        let set = PhaseSet::standard(Arc::new(NoTrust), Arc::new(NoCollect));
        assert_eq!(
            set.ids(),
            vec![CHECK_TRUST, COLLECT, UNCONFIGURE, UNINSTALL, INSTALL, CONFIGURE]
        );
    }
}
