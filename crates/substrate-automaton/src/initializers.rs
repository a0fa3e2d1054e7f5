//! Named Rule 110 initializers.
//!
//! - `ether` tiles the 16-cell ether background, shifted by `phase`.
//! - `glider` lays the ether down and overlays a glider at `offset` (or
//!   centered when no offset is given).
//! - `random` fills cells independently from a seeded Mulberry32 stream at
//!   the requested density.
//!
//! Every initializer reports provenance (origin tag and metadata) alongside
//! the cells so snapshots can say where a state came from.

use serde::{Deserialize, Serialize};
use substrate_core::rng::Mulberry32;
use substrate_core::seed::mix_seed;
use substrate_core::snapshot::Provenance;

/// Wolfram rule number.
pub const RULE110: u8 = 110;

/// Default automaton width.
pub const DEFAULT_WIDTH: usize = 256;

/// The repeating ether background.
pub const ETHER_PATTERN: [u8; 16] = [0, 0, 0, 1, 0, 0, 1, 1, 0, 1, 1, 1, 1, 0, 0, 0];

/// Glider overlaid by the `glider` initializer.
pub const GLIDER_PATTERN: [u8; 14] = [1, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1, 1, 0];

/// Label mixed into the random initializer's seed.
const RANDOM_STREAM_LABEL: u32 = 0x6D2B_79F5;

/// The available initializers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Initializer {
    /// Ether background.
    #[default]
    Ether,
    /// Ether plus one glider.
    Glider,
    /// Seeded random cells.
    Random,
}

impl Initializer {
    /// Resolve an initializer by case-insensitive name. Unknown names fall
    /// back to [`Initializer::Ether`].
    pub fn resolve(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "glider" => Self::Glider,
            "random" => Self::Random,
            _ => Self::Ether,
        }
    }

    /// Lower-case name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ether => "ether",
            Self::Glider => "glider",
            Self::Random => "random",
        }
    }

    /// Produce cells for `width` with `options`.
    pub fn build(self, width: usize, options: &InitOptions) -> Seeded {
        match self {
            Self::Ether => ether(width, options.phase),
            Self::Glider => glider(width, options.phase, options.offset),
            Self::Random => random(width, options.seed, options.density),
        }
    }
}

/// Parameters shared by the initializers. Each initializer reads only the
/// fields it needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitOptions {
    /// Ether phase shift (any integer; reduced modulo the pattern length).
    pub phase: i64,
    /// Glider start offset; `None` centers the glider.
    pub offset: Option<i64>,
    /// Seed for `random`.
    pub seed: u32,
    /// Live-cell probability for `random`.
    pub density: f64,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            phase: 0,
            offset: None,
            seed: 0,
            density: 0.5,
        }
    }
}

/// Cells plus where they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Seeded {
    /// Initial cells, one 0/1 byte per cell.
    pub cells: Vec<u8>,
    /// Origin tag and metadata.
    pub provenance: Provenance,
}

fn tile(width: usize, pattern: &[u8], phase: i64) -> Vec<u8> {
    let len = i64::try_from(pattern.len()).unwrap_or(1).max(1);
    let shift = usize::try_from(phase.rem_euclid(len)).unwrap_or(0);
    pattern.iter().copied().cycle().skip(shift).take(width).collect()
}

/// Tile the ether pattern across `width` cells starting at `phase`.
pub fn ether(width: usize, phase: i64) -> Seeded {
    Seeded {
        cells: tile(width, &ETHER_PATTERN, phase),
        provenance: Provenance::with_origin("ether")
            .meta("rule", RULE110)
            .meta("phase", phase),
    }
}

/// Offset a glider starts at: the requested offset clamped into the row,
/// or the centered position when none is given.
pub fn glider_start(width: usize, offset: Option<i64>) -> usize {
    let last = width.saturating_sub(1);
    match offset {
        Some(offset) if offset <= 0 => 0,
        Some(offset) => usize::try_from(offset).map_or(last, |offset| offset.min(last)),
        None => (width / 2).saturating_sub(GLIDER_PATTERN.len() / 2),
    }
}

/// Ether background with a glider overlaid at `offset`.
pub fn glider(width: usize, phase: i64, offset: Option<i64>) -> Seeded {
    let mut cells = tile(width, &ETHER_PATTERN, phase);
    let start = glider_start(width, offset);
    for (cell, value) in cells.iter_mut().skip(start).zip(GLIDER_PATTERN) {
        *cell = value;
    }
    Seeded {
        cells,
        provenance: Provenance::with_origin("ether+glider")
            .meta("rule", RULE110)
            .meta("phase", phase)
            .meta("offset", start),
    }
}

/// Independent cells drawn from a seeded stream: a cell is live when its
/// unit draw is below `density`.
pub fn random(width: usize, seed: u32, density: f64) -> Seeded {
    let mut rng = Mulberry32::new(mix_seed(seed, RANDOM_STREAM_LABEL));
    let cells = (0..width)
        .map(|_| u8::from(rng.next_unit() < density))
        .collect();
    Seeded {
        cells,
        provenance: Provenance::with_origin("prng")
            .meta("rule", RULE110)
            .meta("seed", seed)
            .meta("density", density),
    }
}
