//! Shared services for one pipeline run.

use std::sync::Arc;

use crate::collect::SourceChain;
use crate::metadata::Profile;
use crate::progress::CancelToken;
use crate::repository::CachingArtifactRepository;

/// Everything a phase or action needs to reach outside the operand it is
/// working on.
///
/// Built once per run by the caller and handed to [`crate::engine::Engine`].
#[derive(Debug, Clone)]
pub struct ProvisioningContext {
    profile: Profile,
    staging: Arc<CachingArtifactRepository>,
    sources: Arc<SourceChain>,
    cancel: CancelToken,
}

impl ProvisioningContext {
    /// Context with an empty source chain and a fresh cancellation token.
    pub fn new(profile: Profile, staging: Arc<CachingArtifactRepository>) -> Self {
        Self {
            profile,
            staging,
            sources: Arc::new(SourceChain::new()),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_sources(mut self, sources: Arc<SourceChain>) -> Self {
        self.sources = sources;
        self
    }

    /// Use a token the caller keeps a clone of, so it can cancel the run.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// The write-buffering repository collected artifacts are staged in.
    pub fn staging(&self) -> &Arc<CachingArtifactRepository> {
        &self.staging
    }

    pub fn sources(&self) -> &Arc<SourceChain> {
        &self.sources
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
