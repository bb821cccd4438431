//! Before/after pairs describing one unit's change in a plan.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::unit::Unit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperandKind {
    Install,
    Uninstall,
    Update,
}

/// One state change: install (`after` only), uninstall (`before` only) or update (both).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawOperand")]
pub struct Operand {
    before: Option<Unit>,
    after: Option<Unit>,
}

#[derive(Deserialize)]
struct RawOperand {
    #[serde(default)]
    before: Option<Unit>,
    #[serde(default)]
    after: Option<Unit>,
}

impl TryFrom<RawOperand> for Operand {
    type Error = String;

    fn try_from(raw: RawOperand) -> Result<Self, Self::Error> {
        if raw.before.is_none() && raw.after.is_none() {
            return Err("operand needs a before or an after unit".to_string());
        }
        Ok(Self {
            before: raw.before,
            after: raw.after,
        })
    }
}

impl Operand {
    pub fn install(unit: Unit) -> Self {
        Self {
            before: None,
            after: Some(unit),
        }
    }

    pub fn uninstall(unit: Unit) -> Self {
        Self {
            before: Some(unit),
            after: None,
        }
    }

    pub fn update(before: Unit, after: Unit) -> Self {
        Self {
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn before(&self) -> Option<&Unit> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&Unit> {
        self.after.as_ref()
    }

    pub fn kind(&self) -> OperandKind {
        match (&self.before, &self.after) {
            (None, Some(_)) => OperandKind::Install,
            (Some(_), None) => OperandKind::Uninstall,
            _ => OperandKind::Update,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.before, &self.after) {
            (None, Some(after)) => write!(f, "install {after}"),
            (Some(before), None) => write!(f, "uninstall {before}"),
            (Some(before), Some(after)) => write!(f, "update {before} -> {after}"),
            (None, None) => f.write_str("empty operand"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    fn unit(version: u64) -> Unit {
        Unit::new("editor", Version::new(1, version, 0))
    }

    #[test]
    fn kind_follows_present_units() {
        assert_eq!(Operand::install(unit(0)).kind(), OperandKind::Install);
        assert_eq!(Operand::uninstall(unit(0)).kind(), OperandKind::Uninstall);
        assert_eq!(Operand::update(unit(0), unit(1)).kind(), OperandKind::Update);
    }

    #[test]
    fn display_describes_change() {
        let op = Operand::update(unit(0), unit(1));
        assert_eq!(op.to_string(), "update editor/1.0.0 -> editor/1.1.0");
    }

    #[test]
    fn deserialize_rejects_empty_operand() {
        let err = serde_json::from_str::<Operand>("{}").unwrap_err();
        assert!(err.to_string().contains("before or an after"));

        let op: Operand =
            serde_json::from_str(r#"{"after": {"id": "editor", "version": "1.0.0"}}"#).unwrap();
        assert_eq!(op.kind(), OperandKind::Install);
    }
}
