//! Library program initializers: `empty` and seeded `random`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use substrate_core::rng::Mulberry32;
use substrate_core::snapshot::Provenance;

use crate::opcode::Opcode;
use crate::program::{ProgramDescriptor, ProgramLimits, RawInstruction};

/// Label mixed into the random initializer's seed.
const RANDOM_STREAM_LABEL: u32 = 0x4753_4E4D;

/// The available program initializers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgramInitializer {
    /// No instructions; the VM is halted from the start.
    #[default]
    Empty,
    /// Seeded procedural program.
    Random,
}

impl ProgramInitializer {
    /// Resolve by case-insensitive name; unknown names fall back to
    /// [`ProgramInitializer::Empty`].
    pub fn resolve(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("random") {
            Self::Random
        } else {
            Self::Empty
        }
    }

    /// Produce a program descriptor.
    pub fn build(self, options: &RandomOptions, limits: ProgramLimits) -> ProgramDescriptor {
        match self {
            Self::Empty => empty(),
            Self::Random => random(options, limits),
        }
    }
}

/// Parameters of the random initializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RandomOptions {
    /// Seed, mixed with the initializer's stream label.
    pub seed: u32,
    /// Shortest program length.
    pub min_length: usize,
    /// Longest program length (raised to `min_length` if smaller).
    pub max_length: usize,
    /// Whether `GOTO` may be drawn.
    pub allow_goto: bool,
    /// Whether `IF_CHI_LT` may be drawn.
    pub include_chi: bool,
}

impl Default for RandomOptions {
    fn default() -> Self {
        Self {
            seed: 0,
            min_length: 3,
            max_length: 9,
            allow_goto: true,
            include_chi: true,
        }
    }
}

/// The empty program.
pub fn empty() -> ProgramDescriptor {
    ProgramDescriptor {
        program: Vec::new(),
        provenance: Provenance::with_origin("empty").meta("length", 0),
    }
}

/// A seeded procedural program of `min_length..=max_length` instructions
/// drawn from the allowed opcode pool.
pub fn random(options: &RandomOptions, limits: ProgramLimits) -> ProgramDescriptor {
    let mut rng = Mulberry32::seeded(options.seed, RANDOM_STREAM_LABEL);
    let min = options.min_length;
    let max = options.max_length.max(min);
    let length = if min == max {
        min
    } else {
        let span = max.saturating_sub(min).saturating_add(1);
        min.saturating_add(rng.next_index(span))
    };

    let pool: Vec<Opcode> = Opcode::ALL
        .into_iter()
        .filter(|op| match op {
            Opcode::Goto => options.allow_goto,
            Opcode::IfChiLt => options.include_chi,
            _ => true,
        })
        .collect();
    let targets = length.max(1);

    let program = (0..length)
        .map(|_| {
            let op = pool
                .get(rng.next_index(pool.len()))
                .copied()
                .unwrap_or(Opcode::SetExplore);
            let args = match op {
                Opcode::IfHungerGt => vec![
                    Value::from(rng.next_unit()),
                    Value::from(rng.next_index(targets)),
                ],
                Opcode::IfChiLt => vec![
                    Value::from(rng.next_unit() * limits.max_chi_threshold),
                    Value::from(rng.next_index(targets)),
                ],
                Opcode::SetExplore | Opcode::SetBondThreshold => vec![Value::from(rng.next_unit())],
                Opcode::Goto => vec![Value::from(rng.next_index(targets))],
            };
            RawInstruction::object(op.name(), args)
        })
        .collect::<Vec<_>>();

    let provenance = Provenance::with_origin("prng")
        .meta("seed", options.seed)
        .meta("length", program.len())
        .meta("minLength", min)
        .meta("maxLength", max)
        .meta("allowGoto", options.allow_goto)
        .meta("includeChi", options.include_chi);
    ProgramDescriptor { program, provenance }
}
