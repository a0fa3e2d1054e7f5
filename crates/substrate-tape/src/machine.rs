//! Declarative machine descriptions and their compiled transition tables.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use substrate_core::snapshot::Metadata;

use crate::error::TapeError;

/// Head movement after a write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Move {
    /// One cell left.
    #[serde(rename = "L")]
    Left,
    /// One cell right.
    #[serde(rename = "R")]
    Right,
    /// Stay put.
    #[default]
    #[serde(rename = "N")]
    Stay,
}

impl Move {
    /// Signed head offset.
    pub const fn delta(self) -> i64 {
        match self {
            Self::Left => -1,
            Self::Right => 1,
            Self::Stay => 0,
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "L",
            Self::Right => "R",
            Self::Stay => "N",
        })
    }
}

/// One row of a machine description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionSpec {
    /// State the rule applies in.
    pub state: String,
    /// Symbol under the head.
    pub read: u8,
    /// Symbol written.
    pub write: u8,
    /// Head movement.
    #[serde(rename = "move")]
    pub movement: Move,
    /// State entered.
    pub next: String,
}

/// A machine as written in a description file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDescription {
    /// Registry id.
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Symbol read from cells never written.
    #[serde(default)]
    pub blank: u8,
    /// Starting state.
    pub initial_state: String,
    /// States that stop the machine.
    #[serde(default = "default_halt_states")]
    pub halt_states: Vec<String>,
    /// Transition rows.
    #[serde(default)]
    pub transitions: Vec<TransitionSpec>,
}

fn default_halt_states() -> Vec<String> {
    vec!["halt".to_owned()]
}

/// The action of one compiled transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Symbol written.
    pub write: u8,
    /// Head movement.
    pub movement: Move,
    /// State entered.
    pub next: String,
}

/// A compiled, immutable machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    id: String,
    name: Option<String>,
    description: Option<String>,
    source: Option<String>,
    blank: u8,
    initial_state: String,
    halt_states: BTreeSet<String>,
    table: BTreeMap<(String, u8), Transition>,
}

impl Machine {
    /// Compile a description. `source` records where it was loaded from.
    pub fn compile(description: MachineDescription, source: Option<&str>) -> Result<Self, TapeError> {
        let MachineDescription {
            id,
            name,
            description,
            blank,
            initial_state,
            halt_states,
            transitions,
        } = description;
        if id.trim().is_empty() {
            return Err(TapeError::EmptyId);
        }
        if initial_state.trim().is_empty() {
            return Err(TapeError::EmptyInitialState { id });
        }

        let mut table = BTreeMap::new();
        for spec in transitions {
            let key = (spec.state, spec.read);
            if table.contains_key(&key) {
                let (state, read) = key;
                return Err(TapeError::DuplicateTransition { id, state, read });
            }
            table.insert(
                key,
                Transition {
                    write: spec.write,
                    movement: spec.movement,
                    next: spec.next,
                },
            );
        }

        Ok(Self {
            id,
            name,
            description,
            source: source.map(str::to_owned),
            blank,
            initial_state,
            halt_states: halt_states.into_iter().collect(),
            table,
        })
    }

    /// Parse and compile a JSON description.
    pub fn from_json(text: &str, source: Option<&str>) -> Result<Self, TapeError> {
        Self::compile(serde_json::from_str(text)?, source)
    }

    /// Registry id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Where the description was loaded from, if known.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Blank symbol.
    pub const fn blank(&self) -> u8 {
        self.blank
    }

    /// Starting state.
    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    /// Whether `state` stops the machine.
    pub fn is_halt(&self, state: &str) -> bool {
        self.halt_states.contains(state)
    }

    /// Transition for `state` reading `read`, if defined.
    pub fn transition(&self, state: &str, read: u8) -> Option<&Transition> {
        self.table.get(&(state.to_owned(), read))
    }

    /// Number of transitions.
    pub fn transition_count(&self) -> usize {
        self.table.len()
    }

    /// Descriptive metadata reported in snapshots.
    pub fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        let entries = [
            ("name", self.name.as_deref()),
            ("description", self.description.as_deref()),
            ("source", self.source.as_deref()),
        ];
        for (key, value) in entries {
            if let Some(value) = value {
                metadata.insert(key.to_owned(), Value::from(value));
            }
        }
        metadata.insert("transitions".to_owned(), Value::from(self.table.len()));
        metadata
    }
}
