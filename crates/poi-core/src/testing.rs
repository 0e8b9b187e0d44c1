//! Shared fixtures for test suites across the workspace.

use crate::signature::ListSigner;
use crate::types::{
    Chain, NetworkName, ShieldProofData, SnarkProof, TransactProofData, TxidVersion,
};
use crate::verifier::{Circuit, ProofVerifier};

/// Marker placed in `pi_a[0]` of proofs the [`MarkerVerifier`] rejects.
pub const INVALID_PROOF_MARKER: &str = "invalid";

/// Default chain used by tests.
pub fn test_chain() -> Chain {
    Chain::new(NetworkName::Ethereum, TxidVersion::V2PoseidonMerkle)
}

/// Deterministic list signer.
pub fn test_signer(seed: u8) -> ListSigner {
    ListSigner::from_seed([seed; 32])
}

/// Well-formed proof artifact.
pub fn test_snark_proof() -> SnarkProof {
    SnarkProof {
        pi_a: ["1".into(), "2".into()],
        pi_b: [["3".into(), "4".into()], ["5".into(), "6".into()]],
        pi_c: ["7".into(), "8".into()],
    }
}

/// Proof artifact the [`MarkerVerifier`] rejects.
pub fn invalid_snark_proof() -> SnarkProof {
    SnarkProof {
        pi_a: [INVALID_PROOF_MARKER.into(), "2".into()],
        ..test_snark_proof()
    }
}

/// Shield proof for `blinded_commitment`.
pub fn test_shield_proof(commitment_hash: &str, blinded_commitment: &str) -> ShieldProofData {
    ShieldProofData {
        snark_proof: test_snark_proof(),
        commitment_hash: commitment_hash.into(),
        blinded_commitment: blinded_commitment.into(),
    }
}

/// Transact proof with the given outputs and POI roots.
pub fn test_transact_proof(
    blinded_commitments_out: &[&str],
    poi_merkleroots: Vec<String>,
    txid_merkleroot: String,
    txid_merkleroot_index: u64,
) -> TransactProofData {
    TransactProofData {
        snark_proof: test_snark_proof(),
        poi_merkleroots,
        txid_merkleroot,
        txid_merkleroot_index,
        blinded_commitments_out: blinded_commitments_out.iter().map(|c| c.to_string()).collect(),
        railgun_txid_if_has_unshield: None,
    }
}

/// Verifier that accepts every proof except ones carrying the invalid marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerVerifier;

impl ProofVerifier for MarkerVerifier {
    fn verify(&self, _circuit: Circuit, _public_signals: &[String], proof: &SnarkProof) -> bool {
        proof.pi_a[0] != INVALID_PROOF_MARKER
    }
}
