//! Shared registry of compiled machines, keyed by machine id.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::error::TapeError;
use crate::machine::{Machine, MachineDescription};

/// JSON of the bundled unary incrementer.
pub const UNARY_INCREMENTER: &str = include_str!("../machines/unary_incrementer.json");

/// Registration behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterOptions {
    /// Replace a machine already registered under the same id.
    pub overwrite: bool,
}

impl RegisterOptions {
    /// Options that replace existing registrations.
    pub const fn overwrite() -> Self {
        Self { overwrite: true }
    }
}

/// Machines available to tape steppers.
#[derive(Debug, Clone, Default)]
pub struct MachineRegistry {
    machines: BTreeMap<String, Arc<Machine>>,
}

impl MachineRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every bundled machine.
    pub fn with_bundled() -> Result<Self, TapeError> {
        let mut registry = Self::new();
        registry.register_json(UNARY_INCREMENTER, Some("bundled:unary_incrementer.json"), RegisterOptions::default())?;
        Ok(registry)
    }

    /// Compile and register a description.
    pub fn register(
        &mut self,
        description: MachineDescription,
        source: Option<&str>,
        options: RegisterOptions,
    ) -> Result<Arc<Machine>, TapeError> {
        if !options.overwrite && self.machines.contains_key(&description.id) {
            return Err(TapeError::AlreadyRegistered { id: description.id });
        }
        let machine = Arc::new(Machine::compile(description, source)?);
        info!(
            id = machine.id(),
            transitions = machine.transition_count(),
            source = machine.source().unwrap_or("inline"),
            "tape machine registered"
        );
        self.machines.insert(machine.id().to_owned(), Arc::clone(&machine));
        Ok(machine)
    }

    /// Parse a JSON description and register it.
    pub fn register_json(
        &mut self,
        text: &str,
        source: Option<&str>,
        options: RegisterOptions,
    ) -> Result<Arc<Machine>, TapeError> {
        let description: MachineDescription = serde_json::from_str(text)?;
        self.register(description, source, options)
    }

    /// Read a JSON description file and register it, recording the path as
    /// its source.
    pub fn register_file(&mut self, path: &Path, options: RegisterOptions) -> Result<Arc<Machine>, TapeError> {
        let text = std::fs::read_to_string(path).map_err(|source| TapeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let source = path.display().to_string();
        self.register_json(&text, Some(&source), options)
    }

    /// Machine registered under `id`.
    pub fn get(&self, id: &str) -> Option<Arc<Machine>> {
        self.machines.get(id).cloned()
    }

    /// Machine registered under `id`, or [`TapeError::UnknownMachine`].
    pub fn resolve(&self, id: &str) -> Result<Arc<Machine>, TapeError> {
        self.get(id).ok_or_else(|| TapeError::UnknownMachine { id: id.to_owned() })
    }

    /// Unregister `id`. Returns whether it was registered.
    pub fn remove(&mut self, id: &str) -> bool {
        self.machines.remove(id).is_some()
    }

    /// Unregister everything.
    pub fn clear(&mut self) {
        self.machines.clear();
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.machines.keys().map(String::as_str)
    }

    /// Number of registered machines.
    pub fn len(&self) -> usize {
        self.machines.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn bundled_registry_holds_the_incrementer() {
        let registry = MachineRegistry::with_bundled().unwrap();
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["unary_incrementer"]);
        assert!(registry.resolve("unary_incrementer").is_ok());
        assert!(matches!(registry.resolve("nope"), Err(TapeError::UnknownMachine { .. })));
    }

    #[test]
    fn duplicate_ids_need_overwrite() {
        let mut registry = MachineRegistry::with_bundled().unwrap();
        let again = registry.register_json(UNARY_INCREMENTER, None, RegisterOptions::default());
        assert!(matches!(again, Err(TapeError::AlreadyRegistered { .. })));
        let replaced = registry.register_json(UNARY_INCREMENTER, Some("copy"), RegisterOptions::overwrite()).unwrap();
        assert_eq!(replaced.source(), Some("copy"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_and_clear() {
        let mut registry = MachineRegistry::with_bundled().unwrap();
        assert!(registry.remove("unary_incrementer"));
        assert!(!registry.remove("unary_incrementer"));
        registry.register_json(UNARY_INCREMENTER, None, RegisterOptions::default()).unwrap();
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn missing_files_report_their_path() {
        let mut registry = MachineRegistry::new();
        let result = registry.register_file(Path::new("/definitely/not/here.json"), RegisterOptions::default());
        assert!(matches!(result, Err(TapeError::Io { .. })));
    }
}
