//! Ed25519 list signatures
//!
//! A list's public key is its identity. Signed events, blocked shields and
//! validated txid checkpoints are all signed over canonical JSON encodings so
//! every node derives identical message bytes.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::Serialize;

use crate::errors::{PoiError, Result};
use crate::types::{BlockedShield, ListKey, SignedPoiEvent, SnarkProof, ValidatedTxidCheckpoint};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventMessage<'a> {
    index: u64,
    blinded_commitment_starting_index: u64,
    blinded_commitments: &'a [String],
    proof: &'a Option<SnarkProof>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BlockedShieldMessage<'a> {
    commitment_hash: &'a str,
    blinded_commitment: &'a str,
    block_reason: &'a Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TxidCheckpointMessage<'a> {
    txid_index: u64,
    merkleroot: &'a str,
}

/// Canonical bytes of `{index, blindedCommitmentStartingIndex, blindedCommitments, proof}`.
pub fn signed_event_message(
    index: u64,
    blinded_commitment_starting_index: u64,
    blinded_commitments: &[String],
    proof: &Option<SnarkProof>,
) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&EventMessage {
        index,
        blinded_commitment_starting_index,
        blinded_commitments,
        proof,
    })?)
}

/// Canonical bytes of a blocked shield record (signature excluded).
pub fn blocked_shield_message(
    commitment_hash: &str,
    blinded_commitment: &str,
    block_reason: &Option<String>,
) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&BlockedShieldMessage {
        commitment_hash,
        blinded_commitment,
        block_reason,
    })?)
}

/// Canonical bytes of a validated txid checkpoint.
pub fn txid_checkpoint_message(txid_index: u64, merkleroot: &str) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&TxidCheckpointMessage {
        txid_index,
        merkleroot,
    })?)
}

/// Signing key of the list this node operates.
#[derive(Clone)]
pub struct ListSigner {
    signing_key: SigningKey,
}

impl ListSigner {
    /// Build from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Build from a hex-encoded 32-byte seed.
    pub fn from_hex(seed_hex: &str) -> Result<Self> {
        let bytes = hex::decode(seed_hex.trim_start_matches("0x"))
            .map_err(|e| PoiError::config(format!("list signing key is not hex: {e}")))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| PoiError::config("list signing key must be 32 bytes"))?;
        Ok(Self::from_seed(seed))
    }

    /// List identity: hex public key.
    pub fn list_key(&self) -> ListKey {
        ListKey::new(hex::encode(self.signing_key.verifying_key().to_bytes()))
    }

    /// Sign arbitrary bytes, returning hex.
    pub fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }

    /// Sign an event position.
    pub fn sign_event(
        &self,
        index: u64,
        blinded_commitment_starting_index: u64,
        blinded_commitments: &[String],
        proof: &Option<SnarkProof>,
    ) -> Result<String> {
        let message = signed_event_message(
            index,
            blinded_commitment_starting_index,
            blinded_commitments,
            proof,
        )?;
        Ok(self.sign(&message))
    }

    /// Produce a signed blocked-shield record.
    pub fn sign_blocked_shield(
        &self,
        commitment_hash: &str,
        blinded_commitment: &str,
        block_reason: Option<String>,
    ) -> Result<BlockedShield> {
        let message = blocked_shield_message(commitment_hash, blinded_commitment, &block_reason)?;
        Ok(BlockedShield {
            commitment_hash: commitment_hash.to_string(),
            blinded_commitment: blinded_commitment.to_string(),
            block_reason,
            signature: self.sign(&message),
        })
    }

    /// Produce a signed validated-txid checkpoint.
    pub fn sign_txid_checkpoint(
        &self,
        txid_index: u64,
        merkleroot: &str,
    ) -> Result<ValidatedTxidCheckpoint> {
        let message = txid_checkpoint_message(txid_index, merkleroot)?;
        Ok(ValidatedTxidCheckpoint {
            txid_index,
            merkleroot: merkleroot.to_string(),
            list_key: self.list_key(),
            signature: self.sign(&message),
        })
    }
}

impl std::fmt::Debug for ListSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListSigner")
            .field("list_key", &self.list_key())
            .finish()
    }
}

/// Verify a hex signature by a list key.
pub fn verify_signature(list_key: &ListKey, message: &[u8], signature_hex: &str) -> Result<()> {
    let key_bytes: [u8; 32] = hex::decode(list_key.as_str())
        .map_err(|e| PoiError::validation(format!("list key is not hex: {e}")))?
        .try_into()
        .map_err(|_| PoiError::validation("list key must be 32 bytes"))?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| PoiError::validation(format!("invalid list key: {e}")))?;
    let sig_bytes: [u8; 64] = hex::decode(signature_hex)
        .map_err(|e| PoiError::validation(format!("signature is not hex: {e}")))?
        .try_into()
        .map_err(|_| PoiError::validation("signature must be 64 bytes"))?;
    verifying_key
        .verify(message, &Signature::from_bytes(&sig_bytes))
        .map_err(|_| PoiError::validation(format!("bad signature for list {list_key}")))
}

/// Verify a signed event against its list key.
pub fn verify_signed_event(list_key: &ListKey, event: &SignedPoiEvent) -> Result<()> {
    let message = signed_event_message(
        event.index,
        event.blinded_commitment_starting_index,
        &event.event.blinded_commitments,
        &event.event.proof,
    )?;
    verify_signature(list_key, &message, &event.signature)
}

/// Verify a blocked shield record against its list key.
pub fn verify_blocked_shield(list_key: &ListKey, blocked: &BlockedShield) -> Result<()> {
    let message = blocked_shield_message(
        &blocked.commitment_hash,
        &blocked.blinded_commitment,
        &blocked.block_reason,
    )?;
    verify_signature(list_key, &message, &blocked.signature)
}

/// Verify a validated-txid checkpoint against the list key it names.
pub fn verify_txid_checkpoint(checkpoint: &ValidatedTxidCheckpoint) -> Result<()> {
    let message = txid_checkpoint_message(checkpoint.txid_index, &checkpoint.merkleroot)?;
    verify_signature(&checkpoint.list_key, &message, &checkpoint.signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PoiEvent, PoiEventKind};

    fn signed_event(signer: &ListSigner) -> SignedPoiEvent {
        let event = PoiEvent::new(
            PoiEventKind::Shield {
                commitment_hash: "01".into(),
            },
            vec!["02".into()],
            None,
        );
        let signature = signer
            .sign_event(0, 0, &event.blinded_commitments, &event.proof)
            .unwrap();
        SignedPoiEvent {
            index: 0,
            blinded_commitment_starting_index: 0,
            event,
            signature,
        }
    }

    #[test]
    fn test_signed_event_verifies() {
        let signer = ListSigner::from_seed([7u8; 32]);
        let event = signed_event(&signer);
        assert!(verify_signed_event(&signer.list_key(), &event).is_ok());
    }

    #[test]
    fn test_tampered_event_rejected() {
        let signer = ListSigner::from_seed([7u8; 32]);
        let mut event = signed_event(&signer);
        event.index = 1;
        assert!(verify_signed_event(&signer.list_key(), &event).is_err());
    }

    #[test]
    fn test_wrong_list_rejected() {
        let signer = ListSigner::from_seed([7u8; 32]);
        let other = ListSigner::from_seed([8u8; 32]);
        let event = signed_event(&signer);
        assert!(verify_signed_event(&other.list_key(), &event).is_err());
    }

    #[test]
    fn test_blocked_shield_signature() {
        let signer = ListSigner::from_seed([7u8; 32]);
        let mut blocked = signer
            .sign_blocked_shield("0a", "0b", Some("sanctioned".into()))
            .unwrap();
        assert!(verify_blocked_shield(&signer.list_key(), &blocked).is_ok());
        blocked.block_reason = None;
        assert!(verify_blocked_shield(&signer.list_key(), &blocked).is_err());
    }

    #[test]
    fn test_txid_checkpoint_signature() {
        let signer = ListSigner::from_seed([7u8; 32]);
        let mut checkpoint = signer.sign_txid_checkpoint(12, "abcd").unwrap();
        assert!(verify_txid_checkpoint(&checkpoint).is_ok());
        checkpoint.txid_index = 13;
        assert!(verify_txid_checkpoint(&checkpoint).is_err());
    }

    #[test]
    fn test_from_hex() {
        let signer = ListSigner::from_hex(&hex::encode([7u8; 32])).unwrap();
        assert_eq!(signer.list_key(), ListSigner::from_seed([7u8; 32]).list_key());
        assert!(ListSigner::from_hex("abcd").is_err());
    }
}
