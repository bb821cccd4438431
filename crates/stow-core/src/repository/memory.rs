//! In-memory artifact repository.

use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

use url::Url;

use super::{ArtifactRepository, lock, read, write};
use crate::metadata::{ArtifactDescriptor, ArtifactKey};

/// A mutating call received by a [`MemoryArtifactRepository`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryCall {
    AddDescriptors(Vec<ArtifactKey>),
    RemoveDescriptor(ArtifactKey),
    SetProperty(String, Option<String>),
}

#[derive(Debug, Default)]
struct MemoryState {
    descriptors: Vec<ArtifactDescriptor>,
    properties: BTreeMap<String, String>,
}

/// Repository kept entirely in memory.
///
/// Every mutating call is journaled, which lets callers check exactly when a
/// buffering layer in front of it flushed.
#[derive(Debug)]
pub struct MemoryArtifactRepository {
    location: Url,
    state: RwLock<MemoryState>,
    journal: Mutex<Vec<RepositoryCall>>,
}

impl MemoryArtifactRepository {
    pub fn new(name: &str) -> anyhow::Result<Self> {
        let location = Url::parse(&format!("memory:/{name}"))?;
        Ok(Self {
            location,
            state: RwLock::new(MemoryState::default()),
            journal: Mutex::new(Vec::new()),
        })
    }

    /// Mutating calls received so far, oldest first.
    pub fn calls(&self) -> Vec<RepositoryCall> {
        lock(&self.journal).clone()
    }

    pub fn descriptor_count(&self) -> usize {
        read(&self.state).descriptors.len()
    }

    fn record(&self, call: RepositoryCall) {
        lock(&self.journal).push(call);
    }
}

impl ArtifactRepository for MemoryArtifactRepository {
    fn location(&self) -> &Url {
        &self.location
    }

    fn artifact_descriptors(&self, key: &ArtifactKey) -> anyhow::Result<Vec<ArtifactDescriptor>> {
        Ok(read(&self.state)
            .descriptors
            .iter()
            .filter(|d| d.key() == key)
            .cloned()
            .collect())
    }

    fn contains(&self, descriptor: &ArtifactDescriptor) -> anyhow::Result<bool> {
        Ok(read(&self.state).descriptors.contains(descriptor))
    }

    fn contains_key(&self, key: &ArtifactKey) -> anyhow::Result<bool> {
        Ok(read(&self.state)
            .descriptors
            .iter()
            .any(|d| d.key() == key))
    }

    fn add_descriptors(&self, descriptors: &[ArtifactDescriptor]) -> anyhow::Result<()> {
        self.record(RepositoryCall::AddDescriptors(
            descriptors.iter().map(|d| d.key().clone()).collect(),
        ));
        let mut state = write(&self.state);
        for descriptor in descriptors {
            if state.descriptors.contains(descriptor) {
                continue;
            }
            let mut owned = descriptor.clone();
            owned.set_repository(self.location.clone());
            state.descriptors.push(owned);
        }
        Ok(())
    }

    fn remove_descriptor(&self, descriptor: &ArtifactDescriptor) -> anyhow::Result<()> {
        self.record(RepositoryCall::RemoveDescriptor(descriptor.key().clone()));
        write(&self.state).descriptors.retain(|d| d != descriptor);
        Ok(())
    }

    fn properties(&self) -> anyhow::Result<BTreeMap<String, String>> {
        Ok(read(&self.state).properties.clone())
    }

    fn set_property(&self, key: &str, value: Option<&str>) -> anyhow::Result<Option<String>> {
        self.record(RepositoryCall::SetProperty(
            key.to_string(),
            value.map(str::to_string),
        ));
        let mut state = write(&self.state);
        Ok(match value {
            Some(value) => state.properties.insert(key.to_string(), value.to_string()),
            None => state.properties.remove(key),
        })
    }
}
