use crate::metadata::{ArtifactRequest, ArtifactRequestBatch};

/// Per-phase scratch state.
///
/// Created empty before `initialize_phase`, threaded through every operand
/// step and `complete_phase`, and dropped when the phase ends.
#[derive(Debug, Default)]
pub struct PhaseParameters {
    artifact_requests: Vec<ArtifactRequestBatch>,
    trust_requests: Vec<ArtifactRequest>,
}

impl PhaseParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one operand's artifact requests for the collector. Empty batches are ignored.
    pub fn add_artifact_requests(&mut self, batch: ArtifactRequestBatch) {
        if !batch.is_empty() {
            self.artifact_requests.push(batch);
        }
    }

    pub fn artifact_requests(&self) -> &[ArtifactRequestBatch] {
        &self.artifact_requests
    }

    pub fn take_artifact_requests(&mut self) -> Vec<ArtifactRequestBatch> {
        std::mem::take(&mut self.artifact_requests)
    }

    /// Queue requests for the trust verifier.
    pub fn add_trust_requests(&mut self, requests: impl IntoIterator<Item = ArtifactRequest>) {
        self.trust_requests.extend(requests);
    }

    pub fn trust_requests(&self) -> &[ArtifactRequest] {
        &self.trust_requests
    }

    pub fn take_trust_requests(&mut self) -> Vec<ArtifactRequest> {
        std::mem::take(&mut self.trust_requests)
    }
}
