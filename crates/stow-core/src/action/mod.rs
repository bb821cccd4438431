//! Actions: the atomic, reversible steps a phase runs for one operand.
//!
//! Actions are resolved from a unit's touchpoint instructions by the
//! [`ActionRegistry`] and executed in order by the owning phase.

pub mod builtin;
pub mod parser;
pub mod registry;

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::context::ProvisioningContext;
use crate::fs::resolve_within;
use crate::metadata::{Operand, Unit};
use crate::phase::PhaseParameters;
use crate::status::Status;

pub use parser::{ActionArgs, ParsedInstruction, expand_variables, parse_instructions};
pub use registry::{ActionFactory, ActionRegistry, NATIVE_TOUCHPOINT, ResolvedAction};

/// Argument value that refers to the unit's own artifact content.
pub const ARTIFACT_REFERENCE: &str = "@artifact";

/// A single step executed for one operand during one phase.
///
/// `execute` returning `Err` is treated like an `Error` status for the
/// operand. A non-fatal failing status stops the remaining actions of that
/// operand only.
pub trait Action: Send + Sync + fmt::Debug {
    /// Name used in touchpoint instructions.
    fn name(&self) -> &str;

    fn execute(&self, ctx: &mut ActionContext<'_>) -> anyhow::Result<Status>;

    /// Reverse a previous `execute` with the same arguments.
    fn undo(&self, ctx: &mut ActionContext<'_>) -> anyhow::Result<Status>;
}

/// Inputs visible to an executing action.
pub struct ActionContext<'a> {
    pub phase_id: &'a str,
    pub operand: &'a Operand,
    /// The unit the phase acts on (`before` for removal phases, `after` otherwise).
    pub unit: &'a Unit,
    pub arguments: &'a ActionArgs,
    pub provisioning: &'a ProvisioningContext,
    pub params: &'a mut PhaseParameters,
}

impl ActionContext<'_> {
    pub fn argument(&self, name: &str) -> Option<&str> {
        self.arguments.get(name).map(String::as_str)
    }

    pub fn required_argument(&self, name: &str) -> anyhow::Result<&str> {
        self.argument(name)
            .with_context(|| format!("Missing required argument `{}`", name))
    }

    pub fn install_root(&self) -> &Path {
        self.provisioning.profile().install_root()
    }

    /// Resolve a path argument inside the profile's install root.
    pub fn install_path(&self, name: &str) -> anyhow::Result<PathBuf> {
        let value = self.required_argument(name)?;
        resolve_within(self.install_root(), Path::new(value))
    }

    /// Resolve a source argument: `@artifact` or a filesystem path.
    pub fn source_path(&self, name: &str) -> anyhow::Result<PathBuf> {
        let value = self.required_argument(name)?;
        if value == ARTIFACT_REFERENCE {
            return self.artifact_file();
        }
        Ok(PathBuf::from(value))
    }

    /// On-disk content of the unit's first artifact, in its canonical (unpacked) form.
    pub fn artifact_file(&self) -> anyhow::Result<PathBuf> {
        let key = self
            .unit
            .artifacts()
            .first()
            .with_context(|| format!("Unit {} has no artifacts", self.unit))?;
        let staging = self.provisioning.staging();
        let descriptor = staging
            .artifact_descriptors(key)?
            .into_iter()
            .find(|d| d.format().is_none())
            .with_context(|| format!("Artifact {} is not available locally", key))?;
        let path = staging
            .artifact_file(&descriptor)
            .with_context(|| format!("Artifact {} has no local content", key))?;
        if !path.is_file() {
            anyhow::bail!("Artifact content missing: {}", path.display());
        }
        Ok(path)
    }
}
