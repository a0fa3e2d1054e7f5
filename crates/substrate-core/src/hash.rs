//! Content hashes for golden records.
//!
//! Automaton states hash as the `0`/`1` bitstring of their cells; every
//! other stepper hashes its compact JSON snapshot.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Lower-case hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Encode cells as a bitstring: non-zero cells become `'1'`, zero `'0'`.
pub fn encode_bits(cells: &[u8]) -> String {
    cells
        .iter()
        .map(|cell| if *cell == 0 { '0' } else { '1' })
        .collect()
}

/// Hash of the bitstring of `cells`.
pub fn hash_cells(cells: &[u8]) -> String {
    sha256_hex(encode_bits(cells).as_bytes())
}

/// Hash of the compact JSON serialization of `value`.
pub fn hash_serialized<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(sha256_hex(&bytes))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_hash() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn bits_encoding() {
        assert_eq!(encode_bits(&[0, 1, 1, 0, 2]), "01101");
    }

    #[test]
    fn cell_hash_is_bitstring_hash() {
        assert_eq!(hash_cells(&[1, 0, 1]), sha256_hex(b"101"));
    }

    #[test]
    fn serialized_hash_uses_compact_json() {
        let value = serde_json::json!({"a": 1, "b": [true]});
        assert_eq!(
            hash_serialized(&value).unwrap(),
            sha256_hex(br#"{"a":1,"b":[true]}"#)
        );
    }
}
