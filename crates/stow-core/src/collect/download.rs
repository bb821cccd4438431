//! Parallel artifact download into the staging repository.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::{ArtifactSource, Collector, SourceChain};
use crate::config::CollectConfig;
use crate::fs::{checksum_file, verify_checksum};
use crate::metadata::{ArtifactDescriptor, ArtifactRequest, ArtifactRequestBatch};
use crate::progress::{CancelToken, ProgressSlice, split_ticks};
use crate::repository::CachingArtifactRepository;
use crate::status::Status;

pub const DEFAULT_MAX_PARALLEL: usize = 4;

enum Outcome {
    Fetched(ArtifactDescriptor),
    Present,
    Cancelled,
    Failed(anyhow::Error),
}

/// Downloads requested artifacts from a [`SourceChain`] into the staging cache.
///
/// Content is written next to its final location, checked against the
/// descriptor checksum, and only then moved into place and registered with
/// the cache. Requests for the same key are fetched once.
///
/// `collect` drives its own tokio runtime and must not be called from inside
/// an async context.
#[derive(Debug)]
pub struct DownloadManager {
    sources: Arc<SourceChain>,
    destination: Arc<CachingArtifactRepository>,
    max_parallel: usize,
}

impl DownloadManager {
    pub fn new(sources: Arc<SourceChain>, destination: Arc<CachingArtifactRepository>) -> Self {
        Self {
            sources,
            destination,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }

    pub fn from_config(
        config: &CollectConfig,
        sources: Arc<SourceChain>,
        destination: Arc<CachingArtifactRepository>,
    ) -> Self {
        Self::new(sources, destination).with_max_parallel(config.max_parallel)
    }

    /// Bound on concurrent downloads (at least one).
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    async fn collect_all(
        &self,
        requests: Vec<ArtifactRequest>,
        cancel: &CancelToken,
        progress: &ProgressSlice<'_>,
    ) -> Status {
        let ticks = split_ticks(progress.budget(), &vec![1; requests.len()]);
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut joins = JoinSet::new();

        for (index, request) in requests.iter().cloned().enumerate() {
            let semaphore = semaphore.clone();
            let sources = self.sources.clone();
            let destination = self.destination.clone();
            let cancel = cancel.clone();
            joins.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) if cancel.is_cancelled() => Outcome::Cancelled,
                    Ok(_permit) => fetch_request(&sources, &destination, &request)
                        .await
                        .unwrap_or_else(Outcome::Failed),
                    Err(err) => Outcome::Failed(err.into()),
                };
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<Outcome>> = requests.iter().map(|_| None).collect();
        while let Some(joined) = joins.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    progress.advance(ticks[index]);
                    outcomes[index] = Some(outcome);
                }
                Err(err) => tracing::error!(error = %err, "Download task failed"),
            }
        }
        progress.finish();

        let mut status = Status::multi(format!("Collected {} artifacts", requests.len()));
        for (request, outcome) in requests.iter().zip(outcomes) {
            let subject = request.key.to_string();
            match outcome {
                Some(Outcome::Fetched(descriptor)) => {
                    tracing::info!(artifact = %descriptor, "Collected artifact");
                }
                Some(Outcome::Present) => {
                    tracing::debug!(artifact = %request.key, "Artifact already present");
                }
                Some(Outcome::Cancelled) => status.add(Status::cancel().with_subject(subject)),
                Some(Outcome::Failed(err)) => {
                    tracing::warn!(artifact = %request.key, error = %format!("{err:#}"), "Failed to collect artifact");
                    status.add(Status::from_error(&err).with_subject(subject));
                }
                None => status.add(Status::error("Download task aborted").with_subject(subject)),
            }
        }
        status
    }
}

impl Collector for DownloadManager {
    fn collect(
        &self,
        batches: Vec<ArtifactRequestBatch>,
        cancel: &CancelToken,
        progress: &ProgressSlice<'_>,
    ) -> Status {
        let mut requests: Vec<ArtifactRequest> = Vec::new();
        for request in batches.into_iter().flatten() {
            if !requests.iter().any(|r| r.key == request.key) {
                requests.push(request);
            }
        }
        if requests.is_empty() {
            progress.finish();
            return Status::ok();
        }

        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.max_parallel)
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                progress.finish();
                return Status::error(format!("Failed to start download runtime: {err}"));
            }
        };
        runtime.block_on(self.collect_all(requests, cancel, progress))
    }
}

async fn fetch_request(
    sources: &SourceChain,
    destination: &Arc<CachingArtifactRepository>,
    request: &ArtifactRequest,
) -> anyhow::Result<Outcome> {
    let mut last_error = None;

    for source in sources.sources() {
        let descriptor = match source.descriptors(&request.key) {
            Ok(found) => found.into_iter().find(|d| d.format().is_none()),
            Err(err) => {
                last_error = Some(err);
                continue;
            }
        };
        let Some(descriptor) = descriptor else {
            continue;
        };
        if destination.contains(&descriptor)? {
            return Ok(Outcome::Present);
        }

        match download(source.as_ref(), &descriptor, destination).await {
            Ok(()) => return Ok(Outcome::Fetched(descriptor)),
            Err(err) => {
                tracing::debug!(source = %source.location(), artifact = %descriptor, error = %format!("{err:#}"), "Source failed, trying next");
                last_error = Some(err);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| anyhow::anyhow!("Artifact {} not found in any source", request.key)))
}

async fn download(
    source: &dyn ArtifactSource,
    descriptor: &ArtifactDescriptor,
    destination: &CachingArtifactRepository,
) -> anyhow::Result<()> {
    let path = destination
        .artifact_file(descriptor)
        .context("Staging repository does not store artifact content")?;
    let bytes = source
        .fetch(descriptor)
        .await
        .with_context(|| format!("Failed to fetch {} from {}", descriptor, source.location()))?;

    let expected = descriptor.checksum().map(str::to_string);
    tokio::task::spawn_blocking(move || persist_verified(&path, &bytes, expected.as_deref()))
        .await
        .context("Download writer task failed")??;

    destination.add_descriptor(descriptor.clone());
    Ok(())
}

/// Write `bytes` to a temp file beside `path`, verify, then rename into place.
fn persist_verified(path: &Path, bytes: &[u8], expected: Option<&str>) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("Invalid artifact path: {}", path.display()))?;
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    temp.write_all(bytes)
        .with_context(|| format!("Failed to write temp file for {}", path.display()))?;
    temp.flush()?;

    if let Some(expected) = expected {
        let actual = checksum_file(temp.path())?;
        verify_checksum(expected, &actual)?;
    }

    temp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("Failed to move artifact into place: {}", path.display()))?;
    Ok(())
}
