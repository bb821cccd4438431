//! Places artifacts can be fetched from.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use url::Url;

use crate::metadata::{ArtifactDescriptor, ArtifactKey};
use crate::repository::ArtifactRepository;

/// A remote or local origin of artifact metadata and content.
#[async_trait]
pub trait ArtifactSource: Send + Sync + fmt::Debug {
    fn location(&self) -> &Url;

    /// Descriptors this source offers for `key`.
    fn descriptors(&self, key: &ArtifactKey) -> anyhow::Result<Vec<ArtifactDescriptor>>;

    /// Raw bytes of the content described by `descriptor`.
    async fn fetch(&self, descriptor: &ArtifactDescriptor) -> anyhow::Result<Vec<u8>>;
}

/// Serves artifacts out of any repository that stores content on disk.
pub struct RepositorySource {
    repository: Arc<dyn ArtifactRepository>,
}

impl RepositorySource {
    pub fn new(repository: Arc<dyn ArtifactRepository>) -> Self {
        Self { repository }
    }
}

impl fmt::Debug for RepositorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositorySource")
            .field("location", &self.repository.location().as_str())
            .finish()
    }
}

#[async_trait]
impl ArtifactSource for RepositorySource {
    fn location(&self) -> &Url {
        self.repository.location()
    }

    fn descriptors(&self, key: &ArtifactKey) -> anyhow::Result<Vec<ArtifactDescriptor>> {
        self.repository.artifact_descriptors(key)
    }

    async fn fetch(&self, descriptor: &ArtifactDescriptor) -> anyhow::Result<Vec<u8>> {
        let path = self.repository.artifact_file(descriptor).with_context(|| {
            format!(
                "Repository {} does not store artifact content",
                self.repository.location()
            )
        })?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read artifact: {}", path.display()))
    }
}

/// Ordered list of sources. Earlier sources win.
#[derive(Debug, Default)]
pub struct SourceChain {
    sources: Vec<Arc<dyn ArtifactSource>>,
}

impl SourceChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: Arc<dyn ArtifactSource>) -> Self {
        self.push(source);
        self
    }

    pub fn push(&mut self, source: Arc<dyn ArtifactSource>) {
        self.sources.push(source);
    }

    pub fn sources(&self) -> &[Arc<dyn ArtifactSource>] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Descriptors from the first source that knows `key`.
    ///
    /// A failing source is skipped. The last error is returned only when no
    /// source answered at all.
    pub fn descriptors(&self, key: &ArtifactKey) -> anyhow::Result<Vec<ArtifactDescriptor>> {
        let mut last_error = None;
        let mut answered = false;
        for source in &self.sources {
            match source.descriptors(key) {
                Ok(found) if !found.is_empty() => return Ok(found),
                Ok(_) => answered = true,
                Err(err) => {
                    tracing::debug!(source = %source.location(), artifact = %key, error = %format!("{err:#}"), "Source lookup failed");
                    last_error = Some(err);
                }
            }
        }
        match last_error {
            Some(err) if !answered => Err(err),
            _ => Ok(Vec::new()),
        }
    }
}
