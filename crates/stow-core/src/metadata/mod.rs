//! Value objects handed to the pipeline by the planner.
//!
//! Units, operands and artifact identities are immutable once built; the
//! pipeline only reads them.

pub mod artifact;
pub mod operand;
pub mod profile;
pub mod unit;

pub use artifact::{
    ArtifactDescriptor, ArtifactKey, ArtifactRequest, ArtifactRequestBatch, CHECKSUM_PROPERTY,
    FORMAT_PROPERTY, PACKED_FORMAT, SIGNATURE_PROPERTY, SIGNER_PROPERTY,
};
pub use operand::{Operand, OperandKind};
pub use profile::Profile;
pub use unit::{TouchpointData, TouchpointType, Unit};
