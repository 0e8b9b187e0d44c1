//! External verification seams: snark proofs and shield screening.

use crate::types::{Chain, SnarkProof};

/// Circuit a proof was generated for; the verifier picks the verification key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Circuit {
    /// Shield POI circuit
    Shield,
    /// Transact POI circuit sized by inputs and outputs
    Transact {
        /// Number of POI merkleroots (one per input)
        inputs: usize,
        /// Number of output commitments
        outputs: usize,
    },
}

/// Groth16 verification backed by externally managed verification keys.
///
/// A `false` result is a permanent rejection of the submission.
pub trait ProofVerifier: Send + Sync {
    /// Verify `proof` for `circuit` against `public_signals`.
    fn verify(&self, circuit: Circuit, public_signals: &[String], proof: &SnarkProof) -> bool;
}

/// Verifier with a fixed answer, for deployments where proofs are checked
/// by an upstream gateway before reaching the node.
#[derive(Debug, Clone, Copy)]
pub struct StaticVerifier {
    accept: bool,
}

impl StaticVerifier {
    /// Accept every proof
    pub fn accepting() -> Self {
        Self { accept: true }
    }

    /// Reject every proof
    pub fn rejecting() -> Self {
        Self { accept: false }
    }
}

impl ProofVerifier for StaticVerifier {
    fn verify(&self, _circuit: Circuit, _public_signals: &[String], _proof: &SnarkProof) -> bool {
        self.accept
    }
}

/// Screening outcome for a queued shield.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShieldDecision {
    /// Attest the shield
    Allow,
    /// Block the shield with an optional reason
    Block(Option<String>),
}

/// List operator policy deciding whether a shield deposit is allowed.
pub trait ShieldScreener: Send + Sync {
    /// Screen one shield.
    fn screen(&self, chain: Chain, commitment_hash: &str, blinded_commitment: &str) -> ShieldDecision;
}

/// Screener that allows every shield.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllScreener;

impl ShieldScreener for AllowAllScreener {
    fn screen(&self, _chain: Chain, _commitment_hash: &str, _blinded: &str) -> ShieldDecision {
        ShieldDecision::Allow
    }
}
