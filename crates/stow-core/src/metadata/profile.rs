//! The environment a plan is applied to.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Variable that expands to the profile's install root.
pub const INSTALL_FOLDER_VARIABLE: &str = "installFolder";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    id: String,
    install_root: PathBuf,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

impl Profile {
    pub fn new(id: impl Into<String>, install_root: PathBuf) -> Self {
        Self {
            id: id.into(),
            install_root,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Value of a `${name}` variable in touchpoint instructions.
    pub fn variable(&self, name: &str) -> Option<String> {
        if name == INSTALL_FOLDER_VARIABLE {
            return Some(self.install_root.to_string_lossy().into_owned());
        }
        self.property(name).map(str::to_string)
    }
}
