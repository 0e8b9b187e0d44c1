//! Core domain types: lists, chains, POI events, mempool proofs and statuses.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::normalize_hex;

// =============================================================================
// Identifiers
// =============================================================================

/// Identity of a compliance list: the hex Ed25519 public key of its operator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListKey(String);

impl ListKey {
    /// Wrap a list key, normalizing hex casing.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into().trim_start_matches("0x").to_lowercase())
    }

    /// Borrow the key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ListKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Fixed-length hex identifier of a shielded note instance for a list.
pub type BlindedCommitment = String;

/// Supported blockchain networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NetworkName {
    /// Ethereum mainnet
    Ethereum,
    /// Ethereum Sepolia testnet
    EthereumSepolia,
    /// BNB Smart Chain
    BNBChain,
    /// Polygon PoS
    Polygon,
    /// Arbitrum One
    Arbitrum,
    /// Local development chain
    Hardhat,
}

impl fmt::Display for NetworkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetworkName::Ethereum => "Ethereum",
            NetworkName::EthereumSepolia => "Ethereum_Sepolia",
            NetworkName::BNBChain => "BNB_Chain",
            NetworkName::Polygon => "Polygon",
            NetworkName::Arbitrum => "Arbitrum",
            NetworkName::Hardhat => "Hardhat",
        };
        f.write_str(name)
    }
}

/// Versioned commitment scheme of the shielded pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TxidVersion {
    /// Poseidon txid merkletree, V2 contracts
    V2PoseidonMerkle,
    /// Poseidon txid merkletree, V3 contracts
    V3PoseidonMerkle,
}

impl fmt::Display for TxidVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxidVersion::V2PoseidonMerkle => f.write_str("V2_PoseidonMerkle"),
            TxidVersion::V3PoseidonMerkle => f.write_str("V3_PoseidonMerkle"),
        }
    }
}

/// (network, proof-set version) pair; every persisted entity is scoped by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    /// Blockchain network
    pub network: NetworkName,
    /// Commitment scheme version
    pub txid_version: TxidVersion,
}

impl Chain {
    /// Create a chain scope
    pub fn new(network: NetworkName, txid_version: TxidVersion) -> Self {
        Self {
            network,
            txid_version,
        }
    }

    /// Namespace prefix used by the document store.
    pub fn namespace(&self) -> String {
        format!("{}/{}", self.network, self.txid_version)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.txid_version)
    }
}

// =============================================================================
// Snark proofs
// =============================================================================

/// Groth16 proof artifact produced outside the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnarkProof {
    /// A point
    pub pi_a: [String; 2],
    /// B point
    pub pi_b: [[String; 2]; 2],
    /// C point
    pub pi_c: [String; 2],
}

// =============================================================================
// POI events
// =============================================================================

/// Discriminant of a POI event with its kind-specific identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PoiEventKind {
    /// Attestation for a shield deposit
    #[serde(rename_all = "camelCase")]
    Shield {
        /// On-chain commitment hash of the shielded note
        commitment_hash: String,
    },
    /// Attestation for the outputs of a private transaction
    #[serde(rename_all = "camelCase")]
    Transact {
        /// Railgun txid when the transaction also unshields
        railgun_txid_if_has_unshield: Option<String>,
    },
    /// Attestation for a transaction predating transact proofs
    #[serde(rename_all = "camelCase")]
    LegacyTransact {
        /// Position of the transaction in the txid ledger
        txid_index: u64,
    },
}

impl PoiEventKind {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            PoiEventKind::Shield { .. } => "shield",
            PoiEventKind::Transact { .. } => "transact",
            PoiEventKind::LegacyTransact { .. } => "legacy_transact",
        }
    }

    /// Auxiliary identifier carried by the event, if any.
    pub fn auxiliary_hash(&self) -> Option<String> {
        match self {
            PoiEventKind::Shield { commitment_hash } => Some(commitment_hash.clone()),
            PoiEventKind::Transact {
                railgun_txid_if_has_unshield,
            } => railgun_txid_if_has_unshield.clone(),
            PoiEventKind::LegacyTransact { .. } => None,
        }
    }
}

/// Unsigned attestation produced once an underlying proof is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoiEvent {
    /// Event kind and identifier
    pub kind: PoiEventKind,
    /// Accumulator leaves, in order
    pub blinded_commitments: Vec<BlindedCommitment>,
    /// Proof artifact backing the attestation (absent for queued shields)
    pub proof: Option<SnarkProof>,
}

impl PoiEvent {
    /// Build an event, normalizing commitment hex.
    pub fn new(
        kind: PoiEventKind,
        blinded_commitments: Vec<BlindedCommitment>,
        proof: Option<SnarkProof>,
    ) -> Self {
        Self {
            kind,
            blinded_commitments: blinded_commitments
                .iter()
                .map(|c| normalize_hex(c))
                .collect(),
            proof,
        }
    }

    /// First commitment, used for queue deduplication.
    pub fn first_commitment(&self) -> Option<&BlindedCommitment> {
        self.blinded_commitments.first()
    }
}

/// POI event with its position in the ordered log and the list signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPoiEvent {
    /// Position in the per-list ordered log
    pub index: u64,
    /// Global leaf position of the first commitment
    pub blinded_commitment_starting_index: u64,
    /// Unsigned event payload
    pub event: PoiEvent,
    /// Hex Ed25519 signature by the list key
    pub signature: String,
}

impl SignedPoiEvent {
    /// Commitments occupy `[start, start + count)` in the accumulator.
    pub fn commitment_count(&self) -> u64 {
        self.event.blinded_commitments.len() as u64
    }

    /// Leaf position following the last commitment of this event.
    pub fn next_starting_index(&self) -> u64 {
        self.blinded_commitment_starting_index + self.commitment_count()
    }
}

// =============================================================================
// Mempool proofs
// =============================================================================

/// Proof that a shield deposit is allowed by a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShieldProofData {
    /// Snark proof
    pub snark_proof: SnarkProof,
    /// On-chain commitment hash
    pub commitment_hash: String,
    /// Blinded commitment of the shield
    pub blinded_commitment: BlindedCommitment,
}

impl ShieldProofData {
    /// Dedup key
    pub fn key(&self) -> String {
        normalize_hex(&self.blinded_commitment)
    }

    /// Public signals fed to the shield circuit verifier.
    pub fn public_signals(&self) -> Vec<String> {
        vec![
            normalize_hex(&self.commitment_hash),
            normalize_hex(&self.blinded_commitment),
        ]
    }
}

/// Proof that a private transaction's inputs were all POI-valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactProofData {
    /// Snark proof
    pub snark_proof: SnarkProof,
    /// POI merkleroots the inputs were proven against, one per input
    pub poi_merkleroots: Vec<String>,
    /// Txid merkleroot after the transaction
    pub txid_merkleroot: String,
    /// Txid ledger index the root was taken at
    pub txid_merkleroot_index: u64,
    /// Output blinded commitments
    pub blinded_commitments_out: Vec<BlindedCommitment>,
    /// Railgun txid when the transaction unshields
    pub railgun_txid_if_has_unshield: Option<String>,
}

impl TransactProofData {
    /// Dedup key: first output commitment, or the unshield txid.
    pub fn key(&self) -> Option<String> {
        self.blinded_commitments_out
            .first()
            .or(self.railgun_txid_if_has_unshield.as_ref())
            .map(|value| normalize_hex(value))
    }

    /// Public signals fed to the transact circuit verifier.
    pub fn public_signals(&self) -> Vec<String> {
        let mut signals = Vec::with_capacity(
            2 + self.blinded_commitments_out.len() + self.poi_merkleroots.len(),
        );
        signals.push(normalize_hex(&self.txid_merkleroot));
        signals.extend(self.blinded_commitments_out.iter().map(|c| normalize_hex(c)));
        signals.extend(self.poi_merkleroots.iter().map(|r| normalize_hex(r)));
        signals.push(normalize_hex(
            self.railgun_txid_if_has_unshield.as_deref().unwrap_or("00"),
        ));
        signals
    }
}

/// Attestation input for transactions that predate transact proofs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTransactProofData {
    /// Global position of the commitment in the txid ledger
    pub txid_index: u64,
    /// Note public key
    pub npk: String,
    /// Note value
    pub value: String,
    /// Token hash
    pub token_hash: String,
    /// Blinded commitment to attest
    pub blinded_commitment: BlindedCommitment,
}

impl LegacyTransactProofData {
    /// Dedup key
    pub fn key(&self) -> String {
        normalize_hex(&self.blinded_commitment)
    }
}

/// Record of a shield blocked by a list, signed by that list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedShield {
    /// Commitment hash of the shield
    pub commitment_hash: String,
    /// Blinded commitment of the shield
    pub blinded_commitment: BlindedCommitment,
    /// Optional human-readable reason
    pub block_reason: Option<String>,
    /// Hex Ed25519 signature by the list key
    pub signature: String,
}

impl BlockedShield {
    /// Dedup key
    pub fn key(&self) -> String {
        normalize_hex(&self.blinded_commitment)
    }
}

/// Which mempool a proof belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProofKind {
    /// Shield proofs (standard bloom filter)
    Shield,
    /// Transact proofs (counting bloom filter)
    Transact,
    /// Legacy transact proofs (counting bloom filter)
    LegacyTransact,
    /// Blocked shields (standard bloom filter)
    BlockedShield,
}

/// Proof exchanged through the peer transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MempoolProof {
    /// Shield proof for a list
    #[serde(rename_all = "camelCase")]
    Shield {
        /// List the proof targets
        list_key: ListKey,
        /// Proof data
        proof: ShieldProofData,
    },
    /// Transact proof for a list
    #[serde(rename_all = "camelCase")]
    Transact {
        /// List the proof targets
        list_key: ListKey,
        /// Proof data
        proof: TransactProofData,
    },
    /// Legacy transact proof (list independent)
    LegacyTransact {
        /// Proof data
        proof: LegacyTransactProofData,
    },
    /// Blocked shield record for a list
    #[serde(rename_all = "camelCase")]
    BlockedShield {
        /// List that blocked the shield
        list_key: ListKey,
        /// Signed record
        blocked: BlockedShield,
    },
}

// =============================================================================
// Statuses
// =============================================================================

/// Category of a blinded commitment being queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlindedCommitmentType {
    /// Output of a shield
    Shield,
    /// Output of a private transaction
    Transact,
    /// Unshield of a private transaction
    Unshield,
}

/// POI status of a commitment for one list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoiStatus {
    /// Commitment is a leaf in the list's accumulator
    Valid,
    /// List blocked the shield
    ShieldBlocked,
    /// Shield is queued but not yet attested
    ShieldPending,
    /// Transact proof submitted, event not yet produced
    TransactProofSubmitted,
    /// Nothing known
    Missing,
}

/// Commitment with its kind, used by batch status queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlindedCommitmentData {
    /// Commitment
    pub blinded_commitment: BlindedCommitment,
    /// Commitment category
    #[serde(rename = "type")]
    pub commitment_type: BlindedCommitmentType,
}

/// Batch status result keyed by commitment then list.
pub type PoiStatusMap = BTreeMap<BlindedCommitment, BTreeMap<ListKey, PoiStatus>>;

// =============================================================================
// Merkle proofs
// =============================================================================

/// Inclusion proof for a leaf of a single tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    /// Leaf value
    pub leaf: String,
    /// Sibling hashes from level 0 upward
    pub elements: Vec<String>,
    /// Leaf index as a bit vector (bit `l` set: node is a right child at level `l`), hex
    pub indices: String,
    /// Tree root
    pub root: String,
}

// =============================================================================
// Txid ledger and node status
// =============================================================================

/// Chain-derived txid ledger state and its peer-validated frontier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RailgunTxidStatus {
    /// Latest txid index scanned locally
    pub current_txid_index: Option<u64>,
    /// Root at the latest index
    pub current_merkleroot: Option<String>,
    /// Highest index validated with a peer
    pub validated_txid_index: Option<u64>,
    /// Root at the validated index
    pub validated_merkleroot: Option<String>,
}

/// Counts of the shield queue by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShieldQueueCounts {
    /// Waiting to be screened
    pub pending: u64,
    /// Promoted into events
    pub allowed: u64,
    /// Blocked by the list
    pub blocked: u64,
}

/// Per-list status advertised to peers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListStatus {
    /// Length of the ordered event log
    pub poi_events_length: u64,
    /// Pending transact proofs for this list
    pub pending_transact_proofs: u64,
    /// Blocked shields known for this list
    pub blocked_shields: u64,
    /// Shield queue counts (only meaningful for the owned list)
    pub shield_queue: ShieldQueueCounts,
}

/// Status for one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStatus {
    /// Chain scope
    pub chain: Chain,
    /// Txid ledger state
    pub txid_status: RailgunTxidStatus,
    /// Per-list status
    pub lists: BTreeMap<ListKey, ListStatus>,
    /// Legacy transact proofs in the mempool
    pub legacy_transact_proofs: u64,
}

/// Full node status exchanged at the start of each sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// Lists the node tracks
    pub list_keys: Vec<ListKey>,
    /// Per-chain status
    pub chains: Vec<ChainStatus>,
}

impl NodeStatus {
    /// Look up a chain's status.
    pub fn chain(&self, chain: Chain) -> Option<&ChainStatus> {
        self.chains.iter().find(|status| status.chain == chain)
    }
}

/// Validated txid checkpoint pushed to peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedTxidCheckpoint {
    /// Validated txid index
    pub txid_index: u64,
    /// Root at that index
    pub merkleroot: String,
    /// List key of the sender
    pub list_key: ListKey,
    /// Signature of the sender over `{txidIndex, merkleroot}`
    pub signature: String,
}
