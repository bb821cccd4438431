//! `collect`: gather artifact request batches and hand them to the collector.

use std::sync::Arc;

use super::{COLLECT, Phase, PhaseParameters, WorkSplit};
use crate::collect::Collector;
use crate::context::ProvisioningContext;
use crate::metadata::Operand;
use crate::progress::ProgressSlice;
use crate::status::Status;

pub struct Collect {
    collector: Arc<dyn Collector>,
}

impl Collect {
    pub fn new(collector: Arc<dyn Collector>) -> Self {
        Self { collector }
    }
}

impl Phase for Collect {
    fn id(&self) -> &str {
        COLLECT
    }

    fn weight(&self) -> u64 {
        100
    }

    /// Nearly all of the work happens in the collector.
    fn work_split(&self) -> WorkSplit {
        WorkSplit::new(0, 100, 1000)
    }

    fn is_applicable(&self, operand: &Operand) -> bool {
        operand.after().is_some()
    }

    fn complete_phase(
        &self,
        ctx: &ProvisioningContext,
        params: &mut PhaseParameters,
        progress: &ProgressSlice<'_>,
    ) -> Status {
        let batches = params.take_artifact_requests();
        if batches.is_empty() {
            return Status::ok();
        }
        tracing::info!(batches = batches.len(), "Collecting artifacts");
        self.collector.collect(batches, ctx.cancel_token(), progress)
    }
}
