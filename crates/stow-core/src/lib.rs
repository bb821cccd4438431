//! Stow Core Library
//!
//! Executes a provisioning plan, an ordered list of operands, through an
//! ordered set of phases: trust verification, artifact collection into a
//! write-buffered staging repository, then the touchpoint phases that
//! install and remove units.

pub mod action;
pub mod collect;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod fs;
pub mod metadata;
pub mod phase;
pub mod progress;
pub mod repository;
pub mod status;
pub mod trust;

/// Re-exports of commonly used types
pub mod prelude {
    // Plan metadata
    pub use crate::metadata::{
        ArtifactDescriptor, ArtifactKey, ArtifactRequest, ArtifactRequestBatch, Operand, Profile,
        TouchpointType, Unit,
    };

    // Pipeline
    pub use crate::context::ProvisioningContext;
    pub use crate::engine::Engine;
    pub use crate::phase::{Phase, PhaseParameters, PhaseSet, WorkSplit};
    pub use crate::progress::{CancelToken, NullProgress, ProgressMonitor};
    pub use crate::status::{Severity, Status};

    // Actions
    pub use crate::action::{Action, ActionContext, ActionRegistry};

    // Collection and trust
    pub use crate::collect::{Collector, DownloadManager, HttpSource, RepositorySource, SourceChain};
    pub use crate::trust::{CertificateChecker, TrustStore, TrustVerifier};

    // Repositories
    pub use crate::repository::{
        ArtifactRepository, CachingArtifactRepository, FileArtifactRepository,
        MemoryArtifactRepository,
    };

    // Configuration
    pub use crate::config::{EngineConfig, FailurePolicy};
}
