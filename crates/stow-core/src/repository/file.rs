//! File-backed artifact repository.
//!
//! Layout under the repository root:
//! - `artifacts.json`: index of descriptors and repository properties
//! - `<classifier>/<id>_<version>`: raw artifact content
//! - `<classifier>/<id>_<version>.<format>`: alternate forms (e.g. `.packed`)

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{ArtifactRepository, lock};
use crate::metadata::{ArtifactDescriptor, ArtifactKey};

/// File name of the repository index.
pub const INDEX_FILE: &str = "artifacts.json";

const INDEX_VERSION: u32 = 1;

/// `<classifier>/<id>_<version>[.<format>]`, relative to a repository root.
///
/// Shared by file repositories and HTTP mirrors.
pub fn content_relative_path(descriptor: &ArtifactDescriptor) -> String {
    let key = descriptor.key();
    let mut path = format!("{}/{}_{}", key.classifier, key.id, key.version);
    if let Some(format) = descriptor.format() {
        path.push('.');
        path.push_str(format);
    }
    path
}

/// Serialized repository index.
///
/// The same format is served by HTTP mirrors, so it is public.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryIndex {
    /// Index format version
    pub version: u32,

    /// Timestamp of the last write
    pub updated_at: chrono::DateTime<chrono::Utc>,

    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    #[serde(default)]
    pub artifacts: Vec<ArtifactDescriptor>,
}

impl RepositoryIndex {
    pub fn new() -> Self {
        Self {
            version: INDEX_VERSION,
            updated_at: chrono::Utc::now(),
            properties: BTreeMap::new(),
            artifacts: Vec::new(),
        }
    }

    /// Parse and validate index bytes.
    pub fn from_slice(bytes: &[u8]) -> anyhow::Result<Self> {
        let index: RepositoryIndex =
            serde_json::from_slice(bytes).context("Failed to parse repository index")?;
        index.validate()?;
        Ok(index)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.version != INDEX_VERSION {
            anyhow::bail!("Unsupported repository index version: {}", self.version);
        }
        Ok(())
    }

    /// Descriptors for `key`, in index order.
    pub fn descriptors_for(&self, key: &ArtifactKey) -> Vec<ArtifactDescriptor> {
        self.artifacts
            .iter()
            .filter(|d| d.key() == key)
            .cloned()
            .collect()
    }
}

impl Default for RepositoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Repository persisted in a directory.
///
/// The index is held in memory and written through atomically (tmp + rename)
/// on every mutation.
#[derive(Debug)]
pub struct FileArtifactRepository {
    root: PathBuf,
    location: Url,
    index: Mutex<RepositoryIndex>,
}

impl FileArtifactRepository {
    /// Open the repository at `root`, creating an empty one if needed.
    pub fn open(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).with_context(|| {
            format!("Failed to create repository directory: {}", root.display())
        })?;
        let root = fs::canonicalize(&root)
            .with_context(|| format!("Failed to resolve repository path: {}", root.display()))?;
        let location = Url::from_directory_path(&root)
            .map_err(|_| anyhow::anyhow!("Invalid repository path: {}", root.display()))?;
        let index = Self::load_index(&root)?;
        Ok(Self {
            root,
            location,
            index: Mutex::new(index),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the content for `descriptor`, whether or not it exists yet.
    pub fn content_path(&self, descriptor: &ArtifactDescriptor) -> PathBuf {
        self.root.join(content_relative_path(descriptor))
    }

    fn load_index(root: &Path) -> anyhow::Result<RepositoryIndex> {
        let index_path = root.join(INDEX_FILE);
        if !index_path.exists() {
            return Ok(RepositoryIndex::new());
        }
        let bytes = fs::read(&index_path)
            .with_context(|| format!("Failed to read index: {}", index_path.display()))?;
        RepositoryIndex::from_slice(&bytes)
            .with_context(|| format!("Invalid index: {}", index_path.display()))
    }

    fn save_index(&self, index: &mut RepositoryIndex) -> anyhow::Result<()> {
        index.updated_at = chrono::Utc::now();
        let index_path = self.root.join(INDEX_FILE);
        let tmp_path = self
            .root
            .join(format!("{}.{}.tmp", INDEX_FILE, std::process::id()));

        let bytes = serde_json::to_vec_pretty(index).context("Failed to serialize index")?;
        fs::write(&tmp_path, bytes)
            .with_context(|| format!("Failed to write tmp index: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &index_path)
            .with_context(|| format!("Failed to rename tmp index: {}", tmp_path.display()))?;
        Ok(())
    }

    fn stamp(&self, descriptor: &ArtifactDescriptor) -> ArtifactDescriptor {
        let mut owned = descriptor.clone();
        owned.set_repository(self.location.clone());
        owned
    }
}

impl ArtifactRepository for FileArtifactRepository {
    fn location(&self) -> &Url {
        &self.location
    }

    fn artifact_descriptors(&self, key: &ArtifactKey) -> anyhow::Result<Vec<ArtifactDescriptor>> {
        let index = lock(&self.index);
        Ok(index
            .descriptors_for(key)
            .iter()
            .map(|d| self.stamp(d))
            .collect())
    }

    fn contains(&self, descriptor: &ArtifactDescriptor) -> anyhow::Result<bool> {
        Ok(lock(&self.index).artifacts.contains(descriptor))
    }

    fn contains_key(&self, key: &ArtifactKey) -> anyhow::Result<bool> {
        Ok(lock(&self.index).artifacts.iter().any(|d| d.key() == key))
    }

    fn add_descriptors(&self, descriptors: &[ArtifactDescriptor]) -> anyhow::Result<()> {
        let mut index = lock(&self.index);
        let mut changed = false;
        for descriptor in descriptors {
            if !index.artifacts.contains(descriptor) {
                index.artifacts.push(descriptor.clone());
                changed = true;
            }
        }
        if changed {
            self.save_index(&mut index)?;
        }
        Ok(())
    }

    fn remove_descriptor(&self, descriptor: &ArtifactDescriptor) -> anyhow::Result<()> {
        let mut index = lock(&self.index);
        let before = index.artifacts.len();
        index.artifacts.retain(|d| d != descriptor);
        if index.artifacts.len() == before {
            return Ok(());
        }
        self.save_index(&mut index)?;

        let content = self.content_path(descriptor);
        if content.exists() {
            fs::remove_file(&content).with_context(|| {
                format!("Failed to remove artifact content: {}", content.display())
            })?;
        }
        Ok(())
    }

    fn properties(&self) -> anyhow::Result<BTreeMap<String, String>> {
        Ok(lock(&self.index).properties.clone())
    }

    fn set_property(&self, key: &str, value: Option<&str>) -> anyhow::Result<Option<String>> {
        let mut index = lock(&self.index);
        let previous = match value {
            Some(value) => index
                .properties
                .insert(key.to_string(), value.to_string()),
            None => index.properties.remove(key),
        };
        self.save_index(&mut index)?;
        Ok(previous)
    }

    fn artifact_file(&self, descriptor: &ArtifactDescriptor) -> Option<PathBuf> {
        Some(self.content_path(descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{FORMAT_PROPERTY, PACKED_FORMAT};
    use semver::Version;
    use tempfile::TempDir;

    fn key(id: &str) -> ArtifactKey {
        ArtifactKey::new("binary", id, Version::new(2, 1, 0))
    }

    #[test]
    fn open_creates_empty_repository() {
        let temp = TempDir::new().unwrap();
        let repo = FileArtifactRepository::open(temp.path().join("repo")).unwrap();
        assert!(repo.properties().unwrap().is_empty());
        assert!(!repo.contains_key(&key("a")).unwrap());
        assert_eq!(repo.location().scheme(), "file");
    }

    #[test]
    fn index_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("repo");
        {
            let repo = FileArtifactRepository::open(&root).unwrap();
            repo.add_descriptors(&[ArtifactDescriptor::new(key("a"))])
                .unwrap();
            repo.set_property("p2.name", Some("local")).unwrap();
        }

        let reopened = FileArtifactRepository::open(&root).unwrap();
        assert!(reopened.contains_key(&key("a")).unwrap());
        assert_eq!(
            reopened.properties().unwrap().get("p2.name").map(String::as_str),
            Some("local")
        );
        assert!(!root.join(format!("{}.{}.tmp", INDEX_FILE, std::process::id())).exists());
    }

    #[test]
    fn content_path_distinguishes_formats() {
        let temp = TempDir::new().unwrap();
        let repo = FileArtifactRepository::open(temp.path()).unwrap();
        let raw = ArtifactDescriptor::new(key("tool"));
        let packed =
            ArtifactDescriptor::new(key("tool")).with_property(FORMAT_PROPERTY, PACKED_FORMAT);

        assert!(repo.content_path(&raw).ends_with("binary/tool_2.1.0"));
        assert!(repo.content_path(&packed).ends_with("binary/tool_2.1.0.packed"));
    }

    #[test]
    fn remove_deletes_content() {
        let temp = TempDir::new().unwrap();
        let repo = FileArtifactRepository::open(temp.path()).unwrap();
        let descriptor = ArtifactDescriptor::new(key("tool"));
        let content = repo.content_path(&descriptor);
        fs::create_dir_all(content.parent().unwrap()).unwrap();
        fs::write(&content, b"bytes").unwrap();
        repo.add_descriptors(std::slice::from_ref(&descriptor))
            .unwrap();

        repo.remove_descriptor(&descriptor).unwrap();
        assert!(!content.exists());
        assert!(!repo.contains(&descriptor).unwrap());
    }

    #[test]
    fn rejects_unknown_index_version() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(INDEX_FILE),
            r#"{"version": 9, "updated_at": "2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let err = FileArtifactRepository::open(temp.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Unsupported repository index version"));
    }
}
