//! Artifact identities, descriptors and collection requests.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use semver::Version;
use serde::{Deserialize, Serialize};
use url::Url;

/// Descriptor property naming the stored form of an artifact (absent means raw).
pub const FORMAT_PROPERTY: &str = "format";
/// `format` value for packed artifacts.
pub const PACKED_FORMAT: &str = "packed";
/// Hex blake3 digest of the artifact content.
pub const CHECKSUM_PROPERTY: &str = "download.checksum.blake3";
/// Name of the key that signed the artifact checksum.
pub const SIGNER_PROPERTY: &str = "signature.signer";
/// Base64 ed25519 signature over the checksum string.
pub const SIGNATURE_PROPERTY: &str = "signature.value";

/// Identity of a binary artifact: classifier, id and version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub classifier: String,
    pub id: String,
    pub version: Version,
}

impl ArtifactKey {
    pub fn new(classifier: impl Into<String>, id: impl Into<String>, version: Version) -> Self {
        Self {
            classifier: classifier.into(),
            id: id.into(),
            version,
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.classifier, self.id, self.version)
    }
}

/// One stored form of an artifact.
///
/// Equality and hashing cover the key and properties only; the owning
/// repository is bookkeeping and never distinguishes two descriptors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    key: ArtifactKey,
    #[serde(default)]
    properties: BTreeMap<String, String>,
    #[serde(skip)]
    repository: Option<Url>,
}

impl ArtifactDescriptor {
    pub fn new(key: ArtifactKey) -> Self {
        Self {
            key,
            properties: BTreeMap::new(),
            repository: None,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn key(&self) -> &ArtifactKey {
        &self.key
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Stored form, `None` for the canonical raw form.
    pub fn format(&self) -> Option<&str> {
        self.property(FORMAT_PROPERTY)
    }

    pub fn checksum(&self) -> Option<&str> {
        self.property(CHECKSUM_PROPERTY)
    }

    /// Location of the repository that currently owns this descriptor.
    pub fn repository(&self) -> Option<&Url> {
        self.repository.as_ref()
    }

    pub(crate) fn set_repository(&mut self, location: Url) {
        self.repository = Some(location);
    }
}

impl PartialEq for ArtifactDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.properties == other.properties
    }
}

impl Eq for ArtifactDescriptor {}

impl Hash for ArtifactDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.properties.hash(state);
    }
}

impl PartialOrd for ArtifactDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ArtifactDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.properties.cmp(&other.properties))
    }
}

impl fmt::Display for ArtifactDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.format() {
            Some(format) => write!(f, "{} ({})", self.key, format),
            None => write!(f, "{}", self.key),
        }
    }
}

/// Request to materialize one artifact locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRequest {
    pub key: ArtifactKey,
    /// Identity of the unit that needs the artifact, for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}

impl ArtifactRequest {
    pub fn new(key: ArtifactKey) -> Self {
        Self {
            key,
            requested_by: None,
        }
    }

    pub fn requested_by(mut self, unit: impl Into<String>) -> Self {
        self.requested_by = Some(unit.into());
        self
    }
}

/// Requests contributed by one operand, kept together for the collector.
pub type ArtifactRequestBatch = Vec<ArtifactRequest>;
