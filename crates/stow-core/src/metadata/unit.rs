//! Installable units and their touchpoint metadata.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use semver::Version;
use serde::{Deserialize, Serialize};

use super::artifact::{ArtifactKey, ArtifactRequest};

/// Tag selecting which action table applies to a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TouchpointType {
    pub id: String,
    pub version: Version,
}

impl TouchpointType {
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }

    /// The "no touchpoint" marker.
    pub fn none() -> Self {
        Self::new("", Version::new(0, 0, 0))
    }

    pub fn is_none(&self) -> bool {
        self.id.is_empty()
    }
}

impl Default for TouchpointType {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Display for TouchpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("none");
        }
        write!(f, "{}@{}", self.id, self.version)
    }
}

/// Instruction bodies keyed by phase id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TouchpointData {
    instructions: BTreeMap<String, String>,
}

impl TouchpointData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instruction(mut self, phase_id: impl Into<String>, body: impl Into<String>) -> Self {
        self.instructions.insert(phase_id.into(), body.into());
        self
    }

    pub fn instruction(&self, phase_id: &str) -> Option<&str> {
        self.instructions.get(phase_id).map(String::as_str)
    }
}

/// An installable unit. Two units are equal when id and version match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    id: String,
    version: Version,
    #[serde(default)]
    touchpoint_type: TouchpointType,
    #[serde(default)]
    touchpoint_data: Vec<TouchpointData>,
    #[serde(default)]
    artifacts: Vec<ArtifactKey>,
}

impl Unit {
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
            touchpoint_type: TouchpointType::none(),
            touchpoint_data: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn with_touchpoint_type(mut self, touchpoint_type: TouchpointType) -> Self {
        self.touchpoint_type = touchpoint_type;
        self
    }

    pub fn with_touchpoint_data(mut self, data: TouchpointData) -> Self {
        self.touchpoint_data.push(data);
        self
    }

    /// Add an instruction to the most recent touchpoint data block.
    pub fn with_instruction(mut self, phase_id: impl Into<String>, body: impl Into<String>) -> Self {
        let data = self.touchpoint_data.pop().unwrap_or_default();
        self.touchpoint_data
            .push(data.with_instruction(phase_id, body));
        self
    }

    pub fn with_artifact(mut self, key: ArtifactKey) -> Self {
        self.artifacts.push(key);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn touchpoint_type(&self) -> &TouchpointType {
        &self.touchpoint_type
    }

    pub fn touchpoint_data(&self) -> &[TouchpointData] {
        &self.touchpoint_data
    }

    pub fn artifacts(&self) -> &[ArtifactKey] {
        &self.artifacts
    }

    /// Instruction bodies for a phase, in touchpoint data order.
    pub fn instructions<'a>(&'a self, phase_id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.touchpoint_data
            .iter()
            .filter_map(move |data| data.instruction(phase_id))
    }

    /// One request per artifact the unit requires.
    pub fn artifact_requests(&self) -> Vec<ArtifactRequest> {
        self.artifacts
            .iter()
            .map(|key| ArtifactRequest::new(key.clone()).requested_by(self.to_string()))
            .collect()
    }
}

impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.version == other.version
    }
}

impl Eq for Unit {}

impl Hash for Unit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.version.hash(state);
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.id, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_metadata() {
        let a = Unit::new("editor", Version::new(1, 0, 0))
            .with_instruction("install", "mkdir(path:${installFolder}/editor)");
        let b = Unit::new("editor", Version::new(1, 0, 0));
        let c = Unit::new("editor", Version::new(1, 0, 1));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn instructions_follow_touchpoint_data_order() {
        let unit = Unit::new("editor", Version::new(1, 0, 0))
            .with_touchpoint_data(TouchpointData::new().with_instruction("install", "first()"))
            .with_touchpoint_data(
                TouchpointData::new()
                    .with_instruction("install", "second()")
                    .with_instruction("configure", "third()"),
            );

        let install: Vec<_> = unit.instructions("install").collect();
        assert_eq!(install, vec!["first()", "second()"]);
        assert_eq!(unit.instructions("uninstall").count(), 0);
    }

    #[test]
    fn artifact_requests_name_the_unit() {
        let key = ArtifactKey::new("binary", "editor", Version::new(1, 0, 0));
        let unit = Unit::new("editor", Version::new(1, 0, 0)).with_artifact(key.clone());
        let requests = unit.artifact_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].key, key);
        assert_eq!(requests[0].requested_by.as_deref(), Some("editor/1.0.0"));
    }

    #[test]
    fn touchpoint_none_is_default() {
        let unit = Unit::new("bare", Version::new(0, 1, 0));
        assert!(unit.touchpoint_type().is_none());
        assert_eq!(unit.touchpoint_type().to_string(), "none");
    }
}
