//! Artifact trust verification.
//!
//! The check-trust phase hands every artifact request of the batch to a
//! [`TrustVerifier`] before anything is collected or installed.

pub mod store;

use std::collections::BTreeSet;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64;
use ed25519_dalek::Signature;

use crate::collect::SourceChain;
use crate::config::TrustConfig;
use crate::error::{ConfigError, TrustError};
use crate::metadata::{ArtifactDescriptor, ArtifactRequest, SIGNATURE_PROPERTY, SIGNER_PROPERTY};
use crate::status::Status;

pub use store::{TrustStore, decode_public_key};

/// Batch-scoped signature check.
pub trait TrustVerifier: Send + Sync {
    /// Verify every requested artifact. The result has one `Error` child per
    /// rejected artifact, with the artifact key as subject.
    fn verify(&self, requests: &[ArtifactRequest]) -> Status;
}

/// Checks ed25519 signatures over artifact checksums.
///
/// A descriptor is signed when it names a signer (`signature.signer`) and
/// carries a base64 signature (`signature.value`) over its checksum hex
/// string. Every descriptor of a requested key must pass.
pub struct CertificateChecker {
    store: TrustStore,
    sources: Arc<SourceChain>,
    allow_unsigned: bool,
}

impl CertificateChecker {
    pub fn new(store: TrustStore, sources: Arc<SourceChain>) -> Self {
        Self {
            store,
            sources,
            allow_unsigned: true,
        }
    }

    pub fn from_config(config: &TrustConfig, sources: Arc<SourceChain>) -> Result<Self, ConfigError> {
        let store = TrustStore::from_base64_keys(&config.keys)?;
        Ok(Self::new(store, sources).allow_unsigned(config.allow_unsigned))
    }

    /// Whether artifacts without any signature metadata pass.
    pub fn allow_unsigned(mut self, allow: bool) -> Self {
        self.allow_unsigned = allow;
        self
    }

    fn check_request(&self, request: &ArtifactRequest) -> Result<(), TrustError> {
        let descriptors = self
            .sources
            .descriptors(&request.key)
            .map_err(|err| {
                tracing::warn!(artifact = %request.key, error = %format!("{err:#}"), "Descriptor lookup failed");
                TrustError::NotFound
            })?;
        if descriptors.is_empty() {
            return Err(TrustError::NotFound);
        }
        descriptors
            .iter()
            .try_for_each(|descriptor| self.check_descriptor(descriptor))
    }

    fn check_descriptor(&self, descriptor: &ArtifactDescriptor) -> Result<(), TrustError> {
        let signer = descriptor.property(SIGNER_PROPERTY);
        let value = descriptor.property(SIGNATURE_PROPERTY);

        let (signer, value) = match (signer, value) {
            (None, None) => {
                if self.allow_unsigned {
                    tracing::debug!(artifact = %descriptor, "Accepting unsigned artifact");
                    return Ok(());
                }
                return Err(TrustError::Unsigned);
            }
            (Some(signer), None) => return Err(TrustError::MissingSignature(signer.to_string())),
            (None, Some(_)) => return Err(TrustError::MissingSigner),
            (Some(signer), Some(value)) => (signer, value),
        };

        let key = self
            .store
            .key(signer)
            .ok_or_else(|| TrustError::UntrustedSigner(signer.to_string()))?;
        let checksum = descriptor.checksum().ok_or(TrustError::MissingChecksum)?;
        let bytes = Base64
            .decode(value.trim())
            .map_err(|_| TrustError::MalformedSignature)?;
        let signature =
            Signature::try_from(bytes.as_slice()).map_err(|_| TrustError::MalformedSignature)?;

        key.verify_strict(checksum.to_ascii_lowercase().as_bytes(), &signature)
            .map_err(|_| TrustError::BadSignature(signer.to_string()))
    }
}

impl TrustVerifier for CertificateChecker {
    fn verify(&self, requests: &[ArtifactRequest]) -> Status {
        let mut status = Status::multi("Artifact trust verification");
        let mut seen = BTreeSet::new();

        for request in requests {
            if !seen.insert(&request.key) {
                continue;
            }
            if let Err(err) = self.check_request(request) {
                tracing::warn!(artifact = %request.key, reason = %err, "Artifact failed trust check");
                let mut child = Status::error(err.to_string()).with_subject(request.key.to_string());
                if let Some(unit) = &request.requested_by {
                    child = child.with_message(format!("{} (required by {})", err, unit));
                }
                status.add(child);
            }
        }

        if status.severity().is_failure() {
            status = status.with_message("Artifacts failed trust verification");
        }
        tracing::debug!(checked = seen.len(), severity = %status.severity(), "Trust verification finished");
        status
    }
}
