//! Phases that only run the touchpoint actions of a unit.

use super::{CONFIGURE, INSTALL, Phase, UNCONFIGURE, UNINSTALL};
use crate::metadata::{Operand, Unit};

/// Which side of an operand a phase acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTarget {
    /// The unit being removed or replaced
    Before,
    /// The unit being installed
    After,
}

#[derive(Debug, Clone)]
pub struct TouchpointPhase {
    id: String,
    weight: u64,
    target: PhaseTarget,
}

impl TouchpointPhase {
    pub fn new(id: impl Into<String>, weight: u64, target: PhaseTarget) -> Self {
        Self {
            id: id.into(),
            weight,
            target,
        }
    }

    pub fn unconfigure() -> Self {
        Self::new(UNCONFIGURE, 10, PhaseTarget::Before)
    }

    pub fn uninstall() -> Self {
        Self::new(UNINSTALL, 50, PhaseTarget::Before)
    }

    pub fn install() -> Self {
        Self::new(INSTALL, 50, PhaseTarget::After)
    }

    pub fn configure() -> Self {
        Self::new(CONFIGURE, 10, PhaseTarget::After)
    }

    pub fn target(&self) -> PhaseTarget {
        self.target
    }
}

impl Phase for TouchpointPhase {
    fn id(&self) -> &str {
        &self.id
    }

    fn weight(&self) -> u64 {
        self.weight
    }

    fn is_applicable(&self, operand: &Operand) -> bool {
        self.target_unit(operand).is_some()
    }

    fn target_unit<'a>(&self, operand: &'a Operand) -> Option<&'a Unit> {
        match self.target {
            PhaseTarget::Before => operand.before(),
            PhaseTarget::After => operand.after(),
        }
    }
}
