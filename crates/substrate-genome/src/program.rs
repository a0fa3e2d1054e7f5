//! Raw program descriptors and their one-time normalization.
//!
//! Programs arrive in loose shapes: a bare opcode name (`"GOTO"`), a
//! positional array (`["IF_HUNGER_GT", 0.6, 3]`) or an object
//! (`{"op": "SET_EXPLORE", "args": [0.25]}`, with `instruction` or `code`
//! accepted in place of `op`). Normalization runs in two passes:
//!
//! 1. Drop entries whose opcode is unknown or not a string, and coerce each
//!    argument to a finite number (opcode-specific fallback 0).
//! 2. With the final length known, clamp thresholds into their ranges and
//!    jump targets into `[0, len - 1]`.
//!
//! The result can never reference an invalid position, and normalizing an
//! already-normalized program reproduces it exactly.

use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use substrate_core::config::SubstrateConfig;
use substrate_core::snapshot::Provenance;

use crate::opcode::{Instruction, Opcode};

/// Default starting chi; thresholds for `IF_CHI_LT` are capped at four times
/// this value.
pub const DEFAULT_START_CHI: f64 = 15.0;

const NO_ARGS: &[Value] = &[];

/// Ranges applied during normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgramLimits {
    /// Upper bound of `IF_CHI_LT` thresholds.
    pub max_chi_threshold: f64,
}

impl ProgramLimits {
    /// Limits derived from the simulation's starting chi.
    pub fn from_start_chi(start_chi: f64) -> Self {
        Self {
            max_chi_threshold: start_chi * 4.0,
        }
    }

    /// Limits from the `simulation` section of the substrate config.
    pub fn from_config(config: &SubstrateConfig) -> Self {
        Self {
            max_chi_threshold: config.simulation.max_chi_threshold(),
        }
    }
}

impl Default for ProgramLimits {
    fn default() -> Self {
        Self::from_start_chi(DEFAULT_START_CHI)
    }
}

/// Object-shaped raw instruction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawObject {
    /// Opcode name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<Value>,
    /// Alternate opcode field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<Value>,
    /// Alternate opcode field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
    /// Arguments; anything but an array counts as no arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

/// One raw program entry, as supplied by a caller or a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawInstruction {
    /// Bare opcode name, no arguments.
    Name(String),
    /// `[opcode, arg0, arg1, ...]`.
    Positional(Vec<Value>),
    /// `{op | instruction | code, args}`.
    Object(RawObject),
    /// Anything else; always dropped.
    Other(Value),
}

impl RawInstruction {
    /// Object form `{op, args}`.
    pub fn object(op: &str, args: Vec<Value>) -> Self {
        Self::Object(RawObject {
            op: Some(Value::from(op)),
            args: Some(Value::Array(args)),
            ..RawObject::default()
        })
    }

    /// Opcode and raw arguments, or `None` if the entry is malformed.
    fn parts(&self) -> Option<(Opcode, &[Value])> {
        match self {
            Self::Name(name) => Some((Opcode::parse(name)?, NO_ARGS)),
            Self::Positional(items) => {
                let (head, rest) = items.split_first()?;
                Some((Opcode::parse(head.as_str()?)?, rest))
            }
            Self::Object(object) => {
                let name = [&object.op, &object.instruction, &object.code]
                    .into_iter()
                    .flatten()
                    .find(|value| is_truthy(value))?;
                let args = match &object.args {
                    Some(Value::Array(items)) => items.as_slice(),
                    _ => NO_ARGS,
                };
                Some((Opcode::parse(name.as_str()?)?, args))
            }
            Self::Other(_) => None,
        }
    }
}

impl From<Instruction> for RawInstruction {
    fn from(instruction: Instruction) -> Self {
        Self::object(instruction.opcode().name(), instruction.args())
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Coerce a raw argument to a finite number: finite numbers as-is, numeric
/// strings parsed (blank strings are 0), booleans 1/0, null 0. Anything
/// else yields `fallback`.
pub fn to_finite(value: Option<&Value>, fallback: f64) -> f64 {
    let number = match value {
        None | Some(Value::Null) => Some(0.0),
        Some(Value::Bool(flag)) => Some(if *flag { 1.0 } else { 0.0 }),
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        Some(Value::Array(_) | Value::Object(_)) => None,
    };
    number.filter(|n| n.is_finite()).unwrap_or(fallback)
}

/// Clamp into `[min, max]`; non-finite values become `min`.
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if value.is_finite() { value.max(min).min(max) } else { min }
}

/// Clamp into `[0, 1]`; non-finite values become 0.
pub fn clamp01(value: f64) -> f64 {
    clamp(value, 0.0, 1.0)
}

/// Floor `value` into a valid index `[0, last]`; non-finite values become 0.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn clamp_index(value: f64, last: usize) -> usize {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    let floored = value.floor();
    if floored >= last as f64 {
        last
    } else {
        // In (0, last), so the cast is exact.
        floored as usize
    }
}

/// First-pass result: opcode plus coerced arguments.
#[derive(Debug, Clone, Copy)]
struct Prepared {
    op: Opcode,
    a: f64,
    b: f64,
}

fn prepare(raw: &RawInstruction) -> Option<Prepared> {
    let (op, args) = raw.parts()?;
    let a = to_finite(args.first(), 0.0);
    let b = if op.is_jump() && op != Opcode::Goto {
        to_finite(args.get(1), 0.0)
    } else {
        0.0
    };
    Some(Prepared { op, a, b })
}

fn finalize(prepared: Prepared, last: usize, limits: ProgramLimits) -> Instruction {
    let Prepared { op, a, b } = prepared;
    match op {
        Opcode::IfHungerGt => Instruction::IfHungerGt {
            threshold: clamp01(a),
            target: clamp_index(b, last),
        },
        Opcode::IfChiLt => Instruction::IfChiLt {
            threshold: clamp(a, 0.0, limits.max_chi_threshold),
            target: clamp_index(b, last),
        },
        Opcode::SetExplore => Instruction::SetExplore { intensity: clamp01(a) },
        Opcode::SetBondThreshold => Instruction::SetBondThreshold { threshold: clamp01(a) },
        Opcode::Goto => Instruction::Goto {
            target: clamp_index(a, last),
        },
    }
}

/// Normalize raw entries into a [`Program`].
pub fn normalize(raw: &[RawInstruction], limits: ProgramLimits) -> Program {
    let prepared: Vec<Prepared> = raw.iter().filter_map(prepare).collect();
    let last = prepared.len().saturating_sub(1);
    prepared
        .into_iter()
        .map(|entry| finalize(entry, last, limits))
        .collect()
}

/// Normalize a JSON program. Anything but an array is an empty program, and
/// entries that do not decode are dropped.
pub fn normalize_value(value: &Value, limits: ProgramLimits) -> Program {
    let Value::Array(items) = value else {
        return Program::empty();
    };
    let raw: Vec<RawInstruction> = items
        .iter()
        .map(|item| {
            serde_json::from_value(item.clone()).unwrap_or_else(|_| RawInstruction::Other(Value::Null))
        })
        .collect();
    normalize(&raw, limits)
}

/// An immutable, normalized program. Cloning shares the instructions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program(Arc<[Instruction]>);

impl Serialize for Program {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl Program {
    /// The empty (permanently halted) program.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Instruction at `ip`, if in range.
    pub fn instruction(&self, ip: usize) -> Option<&Instruction> {
        self.0.get(ip)
    }

    /// Index of the last instruction, or `None` when empty.
    pub fn last_index(&self) -> Option<usize> {
        self.0.len().checked_sub(1)
    }

    /// Raw object form of every instruction, suitable for re-normalizing or
    /// for persisting.
    pub fn to_raw(&self) -> Vec<RawInstruction> {
        self.0.iter().copied().map(RawInstruction::from).collect()
    }
}

impl Deref for Program {
    type Target = [Instruction];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromIterator<Instruction> for Program {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A raw program together with where it came from. Produced by the
/// initializers and presets, consumed by the genome stepper.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramDescriptor {
    /// Raw entries, normalized when loaded.
    pub program: Vec<RawInstruction>,
    /// Origin, manifest key and metadata.
    pub provenance: Provenance,
}

impl ProgramDescriptor {
    /// Descriptor for a bare raw program with no provenance.
    pub fn from_raw(program: Vec<RawInstruction>) -> Self {
        Self {
            program,
            provenance: Provenance::default(),
        }
    }
}
