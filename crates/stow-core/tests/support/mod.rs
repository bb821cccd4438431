//! Shared fixtures for pipeline integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as Base64;
use ed25519_dalek::{Signer, SigningKey};
use semver::Version;
use stow_core::action::NATIVE_TOUCHPOINT;
use stow_core::collect::{Collector, DownloadManager, RepositorySource, SourceChain};
use stow_core::context::ProvisioningContext;
use stow_core::fs::checksum_bytes;
use stow_core::metadata::{
    ArtifactDescriptor, ArtifactKey, ArtifactRequestBatch, CHECKSUM_PROPERTY, Profile,
    SIGNATURE_PROPERTY, SIGNER_PROPERTY, TouchpointType, Unit,
};
use stow_core::phase::PhaseSet;
use stow_core::progress::{CancelToken, ProgressSlice};
use stow_core::repository::{ArtifactRepository, CachingArtifactRepository, FileArtifactRepository};
use stow_core::status::Status;
use stow_core::trust::{CertificateChecker, TrustStore};
use tempfile::TempDir;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stow_core=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

pub fn key(id: &str) -> ArtifactKey {
    ArtifactKey::new("binary", id, Version::new(1, 0, 0))
}

/// A zip archive holding `entries` as `(path, contents)`.
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, contents) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf.into_inner()
}

/// Unit of the native touchpoint shipping the artifact `key(id)`.
pub fn native_unit(id: &str) -> Unit {
    Unit::new(id, Version::new(1, 0, 0))
        .with_touchpoint_type(TouchpointType::new(NATIVE_TOUCHPOINT, Version::new(1, 0, 0)))
        .with_artifact(key(id))
}

/// A remote repository to collect from, a local one to stage into, and an
/// install root.
pub struct Workspace {
    pub temp: TempDir,
    pub remote: Arc<FileArtifactRepository>,
    pub local: Arc<FileArtifactRepository>,
    pub staging: Arc<CachingArtifactRepository>,
    pub install_root: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let remote = Arc::new(FileArtifactRepository::open(temp.path().join("remote")).unwrap());
        let local = Arc::new(FileArtifactRepository::open(temp.path().join("local")).unwrap());
        let staging = Arc::new(CachingArtifactRepository::new(local.clone()));
        let install_root = temp.path().join("install");
        std::fs::create_dir_all(&install_root).unwrap();
        Self {
            temp,
            remote,
            local,
            staging,
            install_root,
        }
    }

    /// Publish `bytes` as `key(id)` in the remote repository, optionally signed.
    pub fn publish(&self, id: &str, bytes: &[u8], signer: Option<(&str, &SigningKey)>) -> ArtifactDescriptor {
        let checksum = checksum_bytes(bytes);
        let mut descriptor =
            ArtifactDescriptor::new(key(id)).with_property(CHECKSUM_PROPERTY, checksum.clone());
        if let Some((name, signing_key)) = signer {
            let signature = signing_key.sign(checksum.as_bytes());
            descriptor = descriptor
                .with_property(SIGNER_PROPERTY, name)
                .with_property(SIGNATURE_PROPERTY, Base64.encode(signature.to_bytes()));
        }
        let path = self.remote.content_path(&descriptor);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
        self.remote.add_descriptors(&[descriptor.clone()]).unwrap();
        descriptor
    }

    pub fn sources(&self) -> Arc<SourceChain> {
        Arc::new(SourceChain::new().with_source(Arc::new(RepositorySource::new(self.remote.clone()))))
    }

    pub fn context(&self) -> ProvisioningContext {
        ProvisioningContext::new(
            Profile::new("test", self.install_root.clone()),
            self.staging.clone(),
        )
        .with_sources(self.sources())
    }

    /// Standard phases backed by the real verifier and downloader.
    pub fn phases(&self, trusted: TrustStore) -> PhaseSet {
        let verifier = CertificateChecker::new(trusted, self.sources());
        let collector = DownloadManager::new(self.sources(), self.staging.clone());
        PhaseSet::standard(Arc::new(verifier), Arc::new(collector))
    }
}

/// Collector double recording what it was asked for.
#[derive(Default)]
pub struct RecordingCollector {
    pub batches: Mutex<Vec<ArtifactRequestBatch>>,
}

impl RecordingCollector {
    pub fn calls(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

impl Collector for RecordingCollector {
    fn collect(
        &self,
        batches: Vec<ArtifactRequestBatch>,
        _cancel: &CancelToken,
        progress: &ProgressSlice<'_>,
    ) -> Status {
        self.batches.lock().unwrap().extend(batches);
        progress.finish();
        Status::ok()
    }
}
