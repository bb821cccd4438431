//! `check_trust`: verify signatures of everything about to be collected.

use std::sync::Arc;

use super::{CHECK_TRUST, Phase, PhaseParameters, execute_actions, instruction_failure};
use crate::action::ActionRegistry;
use crate::context::ProvisioningContext;
use crate::metadata::Operand;
use crate::progress::ProgressSlice;
use crate::status::Status;
use crate::trust::TrustVerifier;

pub struct CheckTrust {
    verifier: Arc<dyn TrustVerifier>,
}

impl CheckTrust {
    pub fn new(verifier: Arc<dyn TrustVerifier>) -> Self {
        Self { verifier }
    }
}

impl Phase for CheckTrust {
    fn id(&self) -> &str {
        CHECK_TRUST
    }

    fn weight(&self) -> u64 {
        10
    }

    fn failure_is_fatal(&self) -> bool {
        true
    }

    fn is_applicable(&self, operand: &Operand) -> bool {
        operand.after().is_some()
    }

    /// Touchpoints with their own trust actions run them; everything else
    /// queues the unit's artifacts for the verifier.
    fn perform_operand(
        &self,
        ctx: &ProvisioningContext,
        registry: &ActionRegistry,
        operand: &Operand,
        params: &mut PhaseParameters,
    ) -> Status {
        let Some(unit) = operand.after() else {
            return Status::ok();
        };
        match self.actions(registry, unit, ctx) {
            Ok(actions) if actions.is_empty() => {
                params.add_trust_requests(unit.artifact_requests());
                Status::ok()
            }
            Ok(actions) => execute_actions(self.id(), &actions, ctx, operand, unit, params),
            Err(err) => instruction_failure(unit, &err),
        }
    }

    fn complete_phase(
        &self,
        _ctx: &ProvisioningContext,
        params: &mut PhaseParameters,
        _progress: &ProgressSlice<'_>,
    ) -> Status {
        let requests = params.take_trust_requests();
        if requests.is_empty() {
            return Status::ok();
        }
        tracing::debug!(count = requests.len(), "Verifying artifact signatures");
        self.verifier.verify(&requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::NATIVE_TOUCHPOINT;
    use crate::metadata::{ArtifactKey, ArtifactRequest, Profile, TouchpointType, Unit};
    use crate::progress::NullProgress;
    use crate::repository::{CachingArtifactRepository, MemoryArtifactRepository};
    use semver::Version;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingVerifier {
        calls: Mutex<Vec<Vec<ArtifactRequest>>>,
    }

    impl TrustVerifier for RecordingVerifier {
        fn verify(&self, requests: &[ArtifactRequest]) -> Status {
            self.calls.lock().unwrap().push(requests.to_vec());
            Status::ok()
        }
    }

    fn context() -> ProvisioningContext {
        let backing = Arc::new(MemoryArtifactRepository::new("trust-phase").unwrap());
        ProvisioningContext::new(
            Profile::new("test", PathBuf::from("/opt/app")),
            Arc::new(CachingArtifactRepository::new(backing)),
        )
    }

    fn unit(id: &str) -> Unit {
        Unit::new(id, Version::new(1, 0, 0))
            .with_touchpoint_type(TouchpointType::new(NATIVE_TOUCHPOINT, Version::new(1, 0, 0)))
            .with_artifact(ArtifactKey::new("binary", id, Version::new(1, 0, 0)))
    }

    #[test]
    fn accumulates_requests_and_verifies_once() {
        let verifier = Arc::new(RecordingVerifier::default());
        let phase = CheckTrust::new(verifier.clone());
        let registry = ActionRegistry::with_builtin_actions();
        let ctx = context();
        let mut params = PhaseParameters::new();

        for id in ["a", "b"] {
            let status = phase.perform_operand(&ctx, &registry, &Operand::install(unit(id)), &mut params);
            assert!(status.is_ok());
        }
        assert_eq!(params.trust_requests().len(), 2);

        let status = phase.complete_phase(&ctx, &mut params, &ProgressSlice::new(&NullProgress, 0));
        assert!(status.is_ok());
        let calls = verifier.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 2);
    }

    #[test]
    fn no_requests_skips_verifier() {
        let verifier = Arc::new(RecordingVerifier::default());
        let phase = CheckTrust::new(verifier.clone());
        let mut params = PhaseParameters::new();

        let status = phase.complete_phase(&context(), &mut params, &ProgressSlice::new(&NullProgress, 0));
        assert!(status.is_ok());
        assert!(verifier.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn explicit_trust_actions_replace_verification() {
        let verifier = Arc::new(RecordingVerifier::default());
        let phase = CheckTrust::new(verifier);
        let registry = ActionRegistry::with_builtin_actions();
        let mut params = PhaseParameters::new();
        let unit = unit("a").with_instruction(CHECK_TRUST, "collect()");

        let status = phase.perform_operand(&context(), &registry, &Operand::install(unit), &mut params);
        assert!(status.is_ok());
        assert!(params.trust_requests().is_empty());
    }

    #[test]
    fn uninstalls_are_not_checked() {
        let phase = CheckTrust::new(Arc::new(RecordingVerifier::default()));
        assert!(!phase.is_applicable(&Operand::uninstall(unit("a"))));
        assert!(phase.failure_is_fatal());
    }
}
