//! Artifact repositories: backing stores and the write-buffering cache.
//!
//! A backing store owns descriptors and (for file-backed stores) artifact
//! content. The [`CachingArtifactRepository`] sits in front of a store during a
//! pipeline run and only forwards changes when explicitly saved.

pub mod cache;
pub mod file;
pub mod memory;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use url::Url;

use crate::metadata::{ArtifactDescriptor, ArtifactKey};

pub use cache::CachingArtifactRepository;
pub use file::{FileArtifactRepository, INDEX_FILE, RepositoryIndex, content_relative_path};
pub use memory::{MemoryArtifactRepository, RepositoryCall};

/// A store of artifact descriptors and repository properties.
///
/// Implementations use interior mutability so one instance can be shared
/// behind an `Arc` by a pipeline and concurrent readers. Every call is
/// individually atomic; adding an existing descriptor or removing a missing
/// one is not an error.
pub trait ArtifactRepository: Send + Sync {
    /// Stable location identifying this repository.
    fn location(&self) -> &Url;

    /// All descriptors stored for `key`.
    fn artifact_descriptors(&self, key: &ArtifactKey) -> anyhow::Result<Vec<ArtifactDescriptor>>;

    fn contains(&self, descriptor: &ArtifactDescriptor) -> anyhow::Result<bool>;

    fn contains_key(&self, key: &ArtifactKey) -> anyhow::Result<bool>;

    fn add_descriptors(&self, descriptors: &[ArtifactDescriptor]) -> anyhow::Result<()>;

    fn remove_descriptor(&self, descriptor: &ArtifactDescriptor) -> anyhow::Result<()>;

    fn properties(&self) -> anyhow::Result<BTreeMap<String, String>>;

    /// Set (`Some`) or remove (`None`) a property, returning the previous value.
    fn set_property(&self, key: &str, value: Option<&str>) -> anyhow::Result<Option<String>>;

    /// Where the content of `descriptor` lives on disk, for file-backed stores.
    fn artifact_file(&self, _descriptor: &ArtifactDescriptor) -> Option<PathBuf> {
        None
    }
}

// Critical sections are single collection updates, so a poisoned lock still
// guards consistent state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
