//! HTTP mirror of a file repository.
//!
//! A mirror serves the same layout a [`FileArtifactRepository`] writes: an
//! `artifacts.json` index at the base URL and content files beneath it.
//!
//! [`FileArtifactRepository`]: crate::repository::FileArtifactRepository

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use url::Url;

use super::ArtifactSource;
use crate::metadata::{ArtifactDescriptor, ArtifactKey};
use crate::repository::{INDEX_FILE, RepositoryIndex, content_relative_path};

#[derive(Debug)]
pub struct HttpSource {
    base: Url,
    client: reqwest::Client,
    index: RepositoryIndex,
}

impl HttpSource {
    /// Download the mirror's index and build a source from it.
    pub async fn connect(base: Url, timeout: Duration) -> anyhow::Result<Self> {
        let base = directory_url(base);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let index_url = base
            .join(INDEX_FILE)
            .with_context(|| format!("Invalid mirror URL: {}", base))?;
        let bytes = get_bytes(&client, &index_url).await?;
        let index = RepositoryIndex::from_slice(&bytes)
            .with_context(|| format!("Invalid index at {}", index_url))?;

        tracing::debug!(mirror = %base, artifacts = index.artifacts.len(), "Loaded mirror index");
        Ok(Self::from_index(base, client, index))
    }

    /// Build a source from an index obtained elsewhere.
    pub fn from_index(base: Url, client: reqwest::Client, index: RepositoryIndex) -> Self {
        Self {
            base: directory_url(base),
            client,
            index,
        }
    }

    pub fn content_url(&self, descriptor: &ArtifactDescriptor) -> anyhow::Result<Url> {
        let relative = content_relative_path(descriptor);
        self.base
            .join(&relative)
            .with_context(|| format!("Invalid content path: {}", relative))
    }
}

#[async_trait]
impl ArtifactSource for HttpSource {
    fn location(&self) -> &Url {
        &self.base
    }

    fn descriptors(&self, key: &ArtifactKey) -> anyhow::Result<Vec<ArtifactDescriptor>> {
        Ok(self
            .index
            .descriptors_for(key)
            .into_iter()
            .map(|mut d| {
                d.set_repository(self.base.clone());
                d
            })
            .collect())
    }

    async fn fetch(&self, descriptor: &ArtifactDescriptor) -> anyhow::Result<Vec<u8>> {
        let url = self.content_url(descriptor)?;
        get_bytes(&self.client, &url).await
    }
}

async fn get_bytes(client: &reqwest::Client, url: &Url) -> anyhow::Result<Vec<u8>> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("Failed to download {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!("Failed to download: HTTP {} from {}", response.status(), url);
    }

    let bytes = response
        .bytes()
        .await
        .with_context(|| format!("Failed to read response body from {}", url))?;
    Ok(bytes.to_vec())
}

/// `Url::join` drops the last path segment unless the base ends in `/`.
fn directory_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{FORMAT_PROPERTY, PACKED_FORMAT};
    use semver::Version;

    fn source() -> HttpSource {
        let key = ArtifactKey::new("binary", "tool", Version::new(1, 4, 0));
        let mut index = RepositoryIndex::new();
        index.artifacts.push(ArtifactDescriptor::new(key.clone()));
        index
            .artifacts
            .push(ArtifactDescriptor::new(key).with_property(FORMAT_PROPERTY, PACKED_FORMAT));
        HttpSource::from_index(
            Url::parse("https://mirror.example.com/releases").unwrap(),
            reqwest::Client::new(),
            index,
        )
    }

    #[test]
    fn content_urls_follow_repository_layout() {
        let source = source();
        let found = source
            .descriptors(&ArtifactKey::new("binary", "tool", Version::new(1, 4, 0)))
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].repository().map(Url::as_str), Some("https://mirror.example.com/releases/"));

        assert_eq!(
            source.content_url(&found[0]).unwrap().as_str(),
            "https://mirror.example.com/releases/binary/tool_1.4.0"
        );
        assert_eq!(
            source.content_url(&found[1]).unwrap().as_str(),
            "https://mirror.example.com/releases/binary/tool_1.4.0.packed"
        );
    }

    #[test]
    fn unknown_keys_yield_nothing() {
        let missing = ArtifactKey::new("binary", "other", Version::new(1, 0, 0));
        assert!(source().descriptors(&missing).unwrap().is_empty());
    }
}
