//! Capability tables mapping touchpoint instructions to actions.
//!
//! Two tables drive resolution:
//! - `(touchpoint id, action name) -> factory`; actions registered without a
//!   touchpoint are available to every touchpoint type.
//! - `(phase id, touchpoint id) -> default instruction body`, used when a unit
//!   carries no instructions of its own for a phase.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::builtin::{CleanupZipAction, CollectAction, CopyAction, MkdirAction, RmdirAction, UnzipAction};
use super::parser::{ActionArgs, expand_variables, parse_instructions};
use super::Action;
use crate::error::InstructionError;
use crate::metadata::{Profile, TouchpointType, Unit};

/// Touchpoint type that ships with default collect/install/uninstall instructions.
pub const NATIVE_TOUCHPOINT: &str = "native";

/// Builds a fresh action instance for each resolution.
pub type ActionFactory = Arc<dyn Fn() -> Box<dyn Action> + Send + Sync>;

/// An action ready to execute, with its arguments already expanded.
#[derive(Debug)]
pub struct ResolvedAction {
    pub action: Box<dyn Action>,
    pub arguments: ActionArgs,
}

/// Registry of known actions and per-touchpoint default instructions.
///
/// Built once and shared by `Arc` across runs.
#[derive(Default)]
pub struct ActionRegistry {
    actions: BTreeMap<(String, String), ActionFactory>,
    defaults: BTreeMap<(String, String), String>,
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl ActionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in actions and the native touchpoint defaults.
    pub fn with_builtin_actions() -> Self {
        let mut registry = Self::new();
        registry.register("collect", || Box::new(CollectAction));
        registry.register("mkdir", || Box::new(MkdirAction));
        registry.register("rmdir", || Box::new(RmdirAction));
        registry.register("copy", || Box::new(CopyAction));
        registry.register("unzip", || Box::new(UnzipAction));
        registry.register("cleanupzip", || Box::new(CleanupZipAction));

        registry.register_default("collect", NATIVE_TOUCHPOINT, "collect()");
        registry.register_default(
            "install",
            NATIVE_TOUCHPOINT,
            "unzip(source:@artifact,target:${installFolder})",
        );
        registry.register_default(
            "uninstall",
            NATIVE_TOUCHPOINT,
            "cleanupzip(source:@artifact,target:${installFolder})",
        );
        registry
    }

    /// Register an action available to every touchpoint type.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Action> + Send + Sync + 'static,
    {
        self.actions
            .insert((String::new(), name.to_string()), Arc::new(factory));
    }

    /// Register an action only visible to units of one touchpoint type.
    ///
    /// Takes precedence over a generic action of the same name.
    pub fn register_for_touchpoint<F>(&mut self, touchpoint: &str, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Action> + Send + Sync + 'static,
    {
        self.actions
            .insert((touchpoint.to_string(), name.to_string()), Arc::new(factory));
    }

    /// Set the instruction body run for `phase_id` when a unit of `touchpoint` has none.
    pub fn register_default(&mut self, phase_id: &str, touchpoint: &str, body: &str) {
        self.defaults
            .insert((phase_id.to_string(), touchpoint.to_string()), body.to_string());
    }

    pub fn default_instruction(&self, phase_id: &str, touchpoint: &TouchpointType) -> Option<&str> {
        if touchpoint.is_none() {
            return None;
        }
        self.defaults
            .get(&(phase_id.to_string(), touchpoint.id.clone()))
            .map(String::as_str)
    }

    fn factory(&self, touchpoint: &TouchpointType, name: &str) -> Option<&ActionFactory> {
        let qualified = if touchpoint.is_none() {
            None
        } else {
            self.actions.get(&(touchpoint.id.clone(), name.to_string()))
        };
        qualified.or_else(|| self.actions.get(&(String::new(), name.to_string())))
    }

    /// Actions `unit` runs in `phase_id`.
    ///
    /// The unit's own instructions win; otherwise the touchpoint default is
    /// used; otherwise the phase has nothing to do for this unit.
    pub fn resolve(
        &self,
        unit: &Unit,
        phase_id: &str,
        profile: &Profile,
    ) -> Result<Vec<ResolvedAction>, InstructionError> {
        let mut bodies: Vec<&str> = unit.instructions(phase_id).collect();
        if bodies.is_empty() {
            match self.default_instruction(phase_id, unit.touchpoint_type()) {
                Some(body) => bodies.push(body),
                None => return Ok(Vec::new()),
            }
        }

        let mut resolved = Vec::new();
        for body in bodies {
            for instruction in parse_instructions(body)? {
                let factory = self
                    .factory(unit.touchpoint_type(), &instruction.name)
                    .ok_or_else(|| InstructionError::UnknownAction {
                        action: instruction.name.clone(),
                        touchpoint: unit.touchpoint_type().to_string(),
                    })?;

                let mut arguments = ActionArgs::new();
                for (key, value) in instruction.arguments {
                    let expanded = expand_variables(&value, |name| profile.variable(name))?;
                    arguments.insert(key, expanded);
                }
                resolved.push(ResolvedAction {
                    action: factory(),
                    arguments,
                });
            }
        }
        Ok(resolved)
    }
}
