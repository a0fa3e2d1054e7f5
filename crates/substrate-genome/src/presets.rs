//! Hand-authored preset programs selectable by key.

use serde_json::{Value, json};
use substrate_core::snapshot::Provenance;

use crate::program::{ProgramDescriptor, RawInstruction};

/// Keys of every bundled preset.
pub const PRESET_KEYS: [&str; 2] = ["hunger-loop", "chi-branch"];

struct Preset {
    key: &'static str,
    description: &'static str,
    program: fn() -> Vec<RawInstruction>,
}

fn op(name: &str, args: Value) -> RawInstruction {
    let args = match args {
        Value::Array(items) => items,
        other => vec![other],
    };
    RawInstruction::object(name, args)
}

const PRESETS: [Preset; 2] = [
    Preset {
        key: "hunger-loop",
        description: "Loop that raises explore noise when hunger exceeds 60% and relaxes bonds otherwise.",
        program: || {
            vec![
                op("SET_EXPLORE", json!([0.25])),
                op("IF_HUNGER_GT", json!([0.6, 3])),
                op("SET_BOND_THRESHOLD", json!([0.5])),
                op("GOTO", json!([1])),
            ]
        },
    },
    Preset {
        key: "chi-branch",
        description: "Keeps high exploration until chi recovers, then lowers bond threshold to stay linked.",
        program: || {
            vec![
                op("SET_EXPLORE", json!([0.8])),
                op("IF_CHI_LT", json!([8, 3])),
                op("GOTO", json!([0])),
                op("SET_BOND_THRESHOLD", json!([0.2])),
                op("GOTO", json!([0])),
            ]
        },
    },
];

/// Look up a preset by key (trimmed, case-insensitive).
///
/// The descriptor carries manifest key `preset:<key>`, origin
/// `preset.<key>` and a `description` metadata entry.
pub fn preset(name: &str) -> Option<ProgramDescriptor> {
    let key = name.trim().to_ascii_lowercase();
    let preset = PRESETS.iter().find(|preset| preset.key == key)?;
    Some(ProgramDescriptor {
        program: (preset.program)(),
        provenance: Provenance {
            origin: Some(format!("preset.{}", preset.key)),
            manifest_key: Some(format!("preset:{}", preset.key)),
            ..Provenance::default()
        }
        .meta("description", preset.description),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Instruction;
    use crate::program::{ProgramLimits, normalize};

    #[test]
    fn lookup_trims_and_ignores_case() {
        let descriptor = preset("  Hunger-Loop ");
        assert!(descriptor.is_some());
        let descriptor = descriptor.unwrap_or_default();
        assert_eq!(descriptor.provenance.manifest_key.as_deref(), Some("preset:hunger-loop"));
        assert_eq!(descriptor.provenance.origin.as_deref(), Some("preset.hunger-loop"));
        assert!(descriptor.provenance.metadata.contains_key("description"));
    }

    #[test]
    fn unknown_presets_are_none() {
        assert!(preset("").is_none());
        assert!(preset("hunger").is_none());
    }

    #[test]
    fn every_preset_normalizes_without_loss() {
        for key in PRESET_KEYS {
            let descriptor = preset(key).unwrap_or_default();
            let program = normalize(&descriptor.program, ProgramLimits::default());
            assert_eq!(program.len(), descriptor.program.len(), "{key}");
        }
    }

    #[test]
    fn chi_branch_shape() {
        let descriptor = preset("chi-branch").unwrap_or_default();
        let program = normalize(&descriptor.program, ProgramLimits::default());
        assert_eq!(
            program.instruction(1),
            Some(&Instruction::IfChiLt {
                threshold: 8.0,
                target: 3
            })
        );
    }
}
