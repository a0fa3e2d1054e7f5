//! Genome opcodes and normalized instructions.

use std::fmt;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// The five genome opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Opcode {
    /// Jump when hunger exceeds a threshold.
    IfHungerGt,
    /// Jump when chi is below a threshold.
    IfChiLt,
    /// Stage the exploration (distress) bias.
    SetExplore,
    /// Stage the bond bias as the inverse of a threshold.
    SetBondThreshold,
    /// Unconditional jump.
    Goto,
}

impl Opcode {
    /// Every opcode, in canonical order.
    pub const ALL: [Self; 5] = [
        Self::IfHungerGt,
        Self::IfChiLt,
        Self::SetExplore,
        Self::SetBondThreshold,
        Self::Goto,
    ];

    /// Canonical upper-case name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::IfHungerGt => "IF_HUNGER_GT",
            Self::IfChiLt => "IF_CHI_LT",
            Self::SetExplore => "SET_EXPLORE",
            Self::SetBondThreshold => "SET_BOND_THRESHOLD",
            Self::Goto => "GOTO",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(name))
    }

    /// Whether the opcode can change the instruction pointer.
    pub const fn is_jump(self) -> bool {
        matches!(self, Self::IfHungerGt | Self::IfChiLt | Self::Goto)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A normalized instruction. Thresholds are finite and range-clamped and
/// jump targets are valid indices of the program they belong to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    /// `IF_HUNGER_GT(threshold, target)`, threshold in `[0, 1]`.
    IfHungerGt {
        /// Hunger threshold.
        threshold: f64,
        /// Jump target.
        target: usize,
    },
    /// `IF_CHI_LT(threshold, target)`, threshold in `[0, MAX]`.
    IfChiLt {
        /// Chi threshold.
        threshold: f64,
        /// Jump target.
        target: usize,
    },
    /// `SET_EXPLORE(intensity)`, intensity in `[0, 1]`.
    SetExplore {
        /// Exploration intensity.
        intensity: f64,
    },
    /// `SET_BOND_THRESHOLD(threshold)`, threshold in `[0, 1]`.
    SetBondThreshold {
        /// Bond threshold.
        threshold: f64,
    },
    /// `GOTO(target)`.
    Goto {
        /// Jump target.
        target: usize,
    },
}

impl Instruction {
    /// The instruction's opcode.
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::IfHungerGt { .. } => Opcode::IfHungerGt,
            Self::IfChiLt { .. } => Opcode::IfChiLt,
            Self::SetExplore { .. } => Opcode::SetExplore,
            Self::SetBondThreshold { .. } => Opcode::SetBondThreshold,
            Self::Goto { .. } => Opcode::Goto,
        }
    }

    /// Jump target, for jumping instructions.
    pub const fn target(&self) -> Option<usize> {
        match self {
            Self::IfHungerGt { target, .. } | Self::IfChiLt { target, .. } | Self::Goto { target } => {
                Some(*target)
            }
            Self::SetExplore { .. } | Self::SetBondThreshold { .. } => None,
        }
    }

    /// Arguments as JSON values: thresholds as floats, targets as integers.
    pub fn args(&self) -> Vec<Value> {
        match *self {
            Self::IfHungerGt { threshold, target } | Self::IfChiLt { threshold, target } => {
                vec![Value::from(threshold), Value::from(target)]
            }
            Self::SetExplore { intensity } => vec![Value::from(intensity)],
            Self::SetBondThreshold { threshold } => vec![Value::from(threshold)],
            Self::Goto { target } => vec![Value::from(target)],
        }
    }
}

impl Serialize for Instruction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Instruction", 2)?;
        state.serialize_field("op", self.opcode().name())?;
        state.serialize_field("args", &self.args())?;
        state.end()
    }
}
