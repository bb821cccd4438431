//! Artifact collection: sources, and the collector the collect phase hands
//! its request batches to.

pub mod download;
pub mod http;
pub mod source;

use crate::metadata::ArtifactRequestBatch;
use crate::progress::{CancelToken, ProgressSlice};
use crate::status::Status;

pub use download::{DEFAULT_MAX_PARALLEL, DownloadManager};
pub use http::HttpSource;
pub use source::{ArtifactSource, RepositorySource, SourceChain};

/// Materializes requested artifacts locally.
///
/// Returns one child status per failed request, with the artifact key as
/// subject. Implementations report exactly `progress.budget()` ticks.
pub trait Collector: Send + Sync {
    fn collect(
        &self,
        batches: Vec<ArtifactRequestBatch>,
        cancel: &CancelToken,
        progress: &ProgressSlice<'_>,
    ) -> Status;
}
