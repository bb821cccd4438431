//! Write-buffering repository that stages changes in front of a backing store.
//!
//! Additions, removals and property edits are held in memory until
//! [`CachingArtifactRepository::save`] flushes them. Nothing reaches the backing
//! store before that, so discarding a cache discards the whole batch.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use url::Url;

use super::{ArtifactRepository, lock};
use crate::metadata::{ArtifactDescriptor, ArtifactKey};

/// A buffered property edit. `Unset` is a tombstone for removal.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PropertyChange {
    Set(String),
    Unset,
}

impl PropertyChange {
    fn as_value(&self) -> Option<&str> {
        match self {
            PropertyChange::Set(value) => Some(value),
            PropertyChange::Unset => None,
        }
    }
}

#[derive(Debug, Default)]
struct CacheBuffers {
    to_add: BTreeSet<ArtifactDescriptor>,
    to_remove: BTreeSet<ArtifactDescriptor>,
    property_changes: BTreeMap<String, PropertyChange>,
    /// Pending additions grouped by key; mirrors `to_add`.
    pending_index: BTreeMap<ArtifactKey, Vec<ArtifactDescriptor>>,
    /// Additions handed to the backing store by a running `save`.
    in_flight: BTreeSet<ArtifactDescriptor>,
}

impl CacheBuffers {
    fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty() && self.property_changes.is_empty()
    }

    fn purge_pending(&mut self, descriptor: &ArtifactDescriptor) -> bool {
        if !self.to_add.remove(descriptor) {
            return false;
        }
        if let Some(list) = self.pending_index.get_mut(descriptor.key()) {
            list.retain(|d| d != descriptor);
            if list.is_empty() {
                self.pending_index.remove(descriptor.key());
            }
        }
        true
    }
}

/// Staging repository in front of a backing [`ArtifactRepository`].
pub struct CachingArtifactRepository {
    location: Url,
    inner: Arc<dyn ArtifactRepository>,
    buffers: Mutex<CacheBuffers>,
    /// Held for the whole of `save`; one flush at a time.
    flushing: Mutex<()>,
}

impl std::fmt::Debug for CachingArtifactRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingArtifactRepository")
            .field("location", &self.location.as_str())
            .field("inner", &self.inner.location().as_str())
            .finish()
    }
}

impl CachingArtifactRepository {
    pub fn new(inner: Arc<dyn ArtifactRepository>) -> Self {
        let mut location = inner.location().clone();
        location.set_fragment(Some("staging"));
        Self {
            location,
            inner,
            buffers: Mutex::new(CacheBuffers::default()),
            flushing: Mutex::new(()),
        }
    }

    /// Location of this cache (the backing location with a `#staging` fragment).
    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn inner(&self) -> &Arc<dyn ArtifactRepository> {
        &self.inner
    }

    pub fn add_descriptor(&self, descriptor: ArtifactDescriptor) {
        self.add_descriptors(std::iter::once(descriptor));
    }

    /// Stage descriptors for addition. Cancels any pending removal of the same descriptor.
    pub fn add_descriptors(&self, descriptors: impl IntoIterator<Item = ArtifactDescriptor>) {
        let mut buffers = lock(&self.buffers);
        for mut descriptor in descriptors {
            descriptor.set_repository(self.location.clone());
            buffers.to_remove.remove(&descriptor);
            if buffers.to_add.insert(descriptor.clone()) {
                buffers
                    .pending_index
                    .entry(descriptor.key().clone())
                    .or_default()
                    .push(descriptor);
            }
        }
    }

    /// Remove a descriptor.
    ///
    /// A descriptor that only exists as a pending addition is dropped without
    /// touching the backing store. Anything else is staged for removal,
    /// including an addition a concurrent `save` is already writing. Returns
    /// whether a pending addition was cancelled.
    pub fn remove_descriptor(&self, descriptor: &ArtifactDescriptor) -> anyhow::Result<bool> {
        let committed = self.inner.contains(descriptor)?;
        let mut buffers = lock(&self.buffers);
        let in_flight = buffers.in_flight.contains(descriptor);
        let purged = buffers.purge_pending(descriptor);
        if !purged || committed || in_flight {
            buffers.to_remove.insert(descriptor.clone());
        }
        Ok(purged && !in_flight)
    }

    /// Remove every descriptor visible for `key`. Returns whether any pending addition was cancelled.
    pub fn remove_key(&self, key: &ArtifactKey) -> anyhow::Result<bool> {
        let mut cancelled = false;
        for descriptor in self.artifact_descriptors(key)? {
            cancelled |= self.remove_descriptor(&descriptor)?;
        }
        Ok(cancelled)
    }

    /// Drop every pending addition through the normal removal bookkeeping.
    pub fn remove_all(&self) -> anyhow::Result<()> {
        for descriptor in self.pending_additions() {
            self.remove_descriptor(&descriptor)?;
        }
        Ok(())
    }

    /// Pending additions followed by committed descriptors, without duplicates.
    pub fn artifact_descriptors(&self, key: &ArtifactKey) -> anyhow::Result<Vec<ArtifactDescriptor>> {
        let mut result = lock(&self.buffers)
            .pending_index
            .get(key)
            .cloned()
            .unwrap_or_default();
        for descriptor in self.inner.artifact_descriptors(key)? {
            if !result.contains(&descriptor) {
                result.push(descriptor);
            }
        }
        Ok(result)
    }

    pub fn contains(&self, descriptor: &ArtifactDescriptor) -> anyhow::Result<bool> {
        if lock(&self.buffers).to_add.contains(descriptor) {
            return Ok(true);
        }
        self.inner.contains(descriptor)
    }

    pub fn contains_key(&self, key: &ArtifactKey) -> anyhow::Result<bool> {
        if lock(&self.buffers).pending_index.contains_key(key) {
            return Ok(true);
        }
        self.inner.contains_key(key)
    }

    /// Committed properties of the backing store; buffered edits are not visible.
    pub fn properties(&self) -> anyhow::Result<BTreeMap<String, String>> {
        self.inner.properties()
    }

    /// Buffer a property edit (`None` removes the key on save).
    ///
    /// Returns the backing store's committed value, not a previously buffered one.
    pub fn set_property(&self, key: &str, value: Option<&str>) -> anyhow::Result<Option<String>> {
        let change = match value {
            Some(value) => PropertyChange::Set(value.to_string()),
            None => PropertyChange::Unset,
        };
        lock(&self.buffers)
            .property_changes
            .insert(key.to_string(), change);
        Ok(self.inner.properties()?.get(key).cloned())
    }

    /// Snapshot of the pending additions.
    pub fn pending_additions(&self) -> Vec<ArtifactDescriptor> {
        lock(&self.buffers).to_add.iter().cloned().collect()
    }

    pub fn has_pending_changes(&self) -> bool {
        !lock(&self.buffers).is_empty()
    }

    /// Content location of `descriptor` in the backing store, if it is file-backed.
    pub fn artifact_file(&self, descriptor: &ArtifactDescriptor) -> Option<PathBuf> {
        self.inner.artifact_file(descriptor)
    }

    /// Flush buffered changes: properties, then additions as one batch, then removals.
    ///
    /// Each buffer is snapshotted right before it is written and only the
    /// flushed items are cleared afterwards, so changes staged while the backing
    /// store is being written survive for the next save. Removals staged while
    /// additions are being written are flushed by this same save.
    pub fn save(&self) -> anyhow::Result<()> {
        let _flushing = lock(&self.flushing);
        let properties: Vec<(String, PropertyChange)> = {
            let buffers = lock(&self.buffers);
            if buffers.is_empty() {
                return Ok(());
            }
            buffers
                .property_changes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };

        for (key, change) in &properties {
            self.inner.set_property(key, change.as_value())?;
        }
        {
            let mut buffers = lock(&self.buffers);
            for (key, change) in &properties {
                if buffers.property_changes.get(key) == Some(change) {
                    buffers.property_changes.remove(key);
                }
            }
        }

        let additions: Vec<ArtifactDescriptor> = {
            let mut buffers = lock(&self.buffers);
            buffers.in_flight = buffers.to_add.clone();
            buffers.to_add.iter().cloned().collect()
        };
        if !additions.is_empty() {
            let written = self.inner.add_descriptors(&additions);
            let mut buffers = lock(&self.buffers);
            buffers.in_flight.clear();
            written?;
            for descriptor in &additions {
                buffers.purge_pending(descriptor);
            }
        }

        let removals: Vec<ArtifactDescriptor> =
            lock(&self.buffers).to_remove.iter().cloned().collect();
        for descriptor in &removals {
            self.inner.remove_descriptor(descriptor)?;
            lock(&self.buffers).to_remove.remove(descriptor);
        }

        tracing::info!(
            repository = %self.inner.location(),
            properties = properties.len(),
            added = additions.len(),
            removed = removals.len(),
            "Committed staged repository changes"
        );
        Ok(())
    }
}

impl ArtifactRepository for CachingArtifactRepository {
    fn location(&self) -> &Url {
        &self.location
    }

    fn artifact_descriptors(&self, key: &ArtifactKey) -> anyhow::Result<Vec<ArtifactDescriptor>> {
        CachingArtifactRepository::artifact_descriptors(self, key)
    }

    fn contains(&self, descriptor: &ArtifactDescriptor) -> anyhow::Result<bool> {
        CachingArtifactRepository::contains(self, descriptor)
    }

    fn contains_key(&self, key: &ArtifactKey) -> anyhow::Result<bool> {
        CachingArtifactRepository::contains_key(self, key)
    }

    fn add_descriptors(&self, descriptors: &[ArtifactDescriptor]) -> anyhow::Result<()> {
        CachingArtifactRepository::add_descriptors(self, descriptors.iter().cloned());
        Ok(())
    }

    fn remove_descriptor(&self, descriptor: &ArtifactDescriptor) -> anyhow::Result<()> {
        CachingArtifactRepository::remove_descriptor(self, descriptor).map(|_| ())
    }

    fn properties(&self) -> anyhow::Result<BTreeMap<String, String>> {
        CachingArtifactRepository::properties(self)
    }

    fn set_property(&self, key: &str, value: Option<&str>) -> anyhow::Result<Option<String>> {
        CachingArtifactRepository::set_property(self, key, value)
    }

    fn artifact_file(&self, descriptor: &ArtifactDescriptor) -> Option<PathBuf> {
        CachingArtifactRepository::artifact_file(self, descriptor)
    }
}
