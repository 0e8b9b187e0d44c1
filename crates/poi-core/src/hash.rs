//! Poseidon hashing over BN254 for accumulator nodes.
//!
//! Hashes are rendered as 64-char lowercase hex without `0x`. Inputs are
//! interpreted as big-endian field elements and reduced mod the scalar field.

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use light_poseidon::{Poseidon, PoseidonHasher};

use crate::errors::{PoiError, Result};

/// Width of a hex-encoded 32-byte hash.
pub const HASH_HEX_LEN: usize = 64;

/// keccak256("Railgun") mod the BN254 scalar field.
pub const MERKLE_ZERO_VALUE: &str =
    "0488f89b25bc7011eaf6a5edce71aeafb9fe706faa3c0a5cd9cbe868ae3b9ffc";

/// Strip `0x`, lowercase, and left-pad to 64 hex chars.
pub fn normalize_hex(value: &str) -> String {
    let trimmed = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
        .to_lowercase();
    if trimmed.len() >= HASH_HEX_LEN {
        trimmed
    } else {
        format!("{trimmed:0>width$}", width = HASH_HEX_LEN)
    }
}

/// Parse hex into a field element.
pub fn hex_to_field(value: &str) -> Result<Fr> {
    let normalized = normalize_hex(value);
    if normalized.len() != HASH_HEX_LEN {
        return Err(PoiError::validation(format!(
            "hash must be at most 32 bytes: {value}"
        )));
    }
    let bytes = hex::decode(&normalized)
        .map_err(|e| PoiError::validation(format!("invalid hex {value}: {e}")))?;
    Ok(Fr::from_be_bytes_mod_order(&bytes))
}

/// Render a field element as normalized hex.
pub fn field_to_hex(value: &Fr) -> String {
    normalize_hex(&hex::encode(value.into_bigint().to_bytes_be()))
}

/// Reusable 2-input Poseidon instance for merkle hashing.
pub struct MerkleHasher {
    poseidon: Poseidon<Fr>,
}

impl MerkleHasher {
    /// Build circom-compatible parameters for 2 inputs.
    pub fn new() -> Result<Self> {
        let poseidon = Poseidon::<Fr>::new_circom(2)
            .map_err(|e| PoiError::internal(format!("poseidon parameters: {e}")))?;
        Ok(Self { poseidon })
    }

    /// `Hash(left, right)`
    pub fn hash_left_right(&mut self, left: &str, right: &str) -> Result<String> {
        let inputs = [hex_to_field(left)?, hex_to_field(right)?];
        let out = self
            .poseidon
            .hash(&inputs)
            .map_err(|e| PoiError::internal(format!("poseidon hash: {e}")))?;
        Ok(field_to_hex(&out))
    }
}

impl std::fmt::Debug for MerkleHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MerkleHasher").finish_non_exhaustive()
    }
}

/// One-shot Poseidon over any number of hex inputs (1..=12).
pub fn poseidon_hex(inputs: &[&str]) -> Result<String> {
    let fields = inputs
        .iter()
        .map(|input| hex_to_field(input))
        .collect::<Result<Vec<_>>>()?;
    let mut poseidon = Poseidon::<Fr>::new_circom(fields.len())
        .map_err(|e| PoiError::internal(format!("poseidon parameters: {e}")))?;
    let out = poseidon
        .hash(&fields)
        .map_err(|e| PoiError::internal(format!("poseidon hash: {e}")))?;
    Ok(field_to_hex(&out))
}

/// Compute the zero ladder `Z[0..=depth]` with `Z[l] = Hash(Z[l-1], Z[l-1])`.
pub fn zero_values(depth: usize) -> Result<Vec<String>> {
    let mut hasher = MerkleHasher::new()?;
    let mut zeros = Vec::with_capacity(depth + 1);
    let mut current = normalize_hex(MERKLE_ZERO_VALUE);
    zeros.push(current.clone());
    for _ in 0..depth {
        current = hasher.hash_left_right(&current, &current)?;
        zeros.push(current.clone());
    }
    Ok(zeros)
}
