//! Seed mixing: derive independent, reproducible 32-bit seeds per subsystem.
//!
//! Every subsystem that needs randomness receives its own stream by mixing
//! the run's base seed with a namespace label. The arithmetic is fixed
//! 32-bit unsigned wraparound so that golden hashes recorded by any other
//! implementation of the substrate stay valid.

/// Additive constant folded into every mix (the 32-bit golden ratio).
const GOLDEN_GAMMA: u32 = 0x9E37_79B9;

/// FNV-1a 32-bit offset basis.
const FNV_OFFSET: u32 = 0x811C_9DC5;

/// FNV-1a 32-bit prime.
const FNV_PRIME: u32 = 0x0100_0193;

/// A namespace label for [`mix_seed`].
///
/// Numeric labels are used verbatim. Named labels are folded to 32 bits
/// with FNV-1a first, so `"rule110.random"` and its FNV value produce the
/// same stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedLabel<'a> {
    /// A raw 32-bit label.
    Numeric(u32),
    /// A human-readable label, hashed before mixing.
    Named(&'a str),
}

impl SeedLabel<'_> {
    /// Return the 32-bit value this label contributes to the mix.
    pub fn value(self) -> u32 {
        match self {
            Self::Numeric(value) => value,
            Self::Named(name) => fnv1a(name.as_bytes()),
        }
    }
}

impl From<u32> for SeedLabel<'_> {
    fn from(value: u32) -> Self {
        Self::Numeric(value)
    }
}

impl<'a> From<&'a str> for SeedLabel<'a> {
    fn from(name: &'a str) -> Self {
        Self::Named(name)
    }
}

/// 32-bit FNV-1a over a byte string.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Mix a base seed with a namespace label into an independent 32-bit seed.
///
/// The label is rotated and xor-ed into the seed together with the golden
/// gamma, then avalanched with the murmur3 finalizer. The function is pure
/// and total: the same `(seed, label)` pair always yields the same output.
pub fn mix_seed<'a>(seed: u32, label: impl Into<SeedLabel<'a>>) -> u32 {
    let label = label.into().value();
    let mut h = seed ^ label.rotate_left(13) ^ GOLDEN_GAMMA;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85EB_CA6B);
    h ^= h >> 13;
    h = h.wrapping_mul(0xC2B2_AE35);
    h ^= h >> 16;
    h
}
