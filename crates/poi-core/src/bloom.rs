//! Bloom filter codec for differential sync.
//!
//! Peers describe what they already hold with a bloom filter; the receiver
//! answers with entries absent from it. Both filter flavours share the same
//! geometry so serialized filters are interchangeable across nodes:
//! - [`BloomFilter`]: insert-only bit array (shield proofs, blocked shields)
//! - [`CountingBloomFilter`]: 4-bit counters supporting removal (transact proofs)
//!
//! Serialized form is base64 (standard alphabet) of the packed slots.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::errors::{PoiError, Result};

/// Slot count shared by every node.
pub const BLOOM_FILTER_SIZE_BITS: usize = 2_876_042;

/// Hash functions per item.
pub const BLOOM_FILTER_HASH_FUNCTIONS: u32 = 20;

/// Fixed seed mixed into every position hash.
pub const BLOOM_FILTER_SEED: u64 = 0x5eed_0fb1_00d;

const COUNTER_MAX: u8 = 0x0f;

/// Slot positions for an item.
fn positions(item: &str, num_slots: usize, num_hashes: u32) -> impl Iterator<Item = usize> + '_ {
    (0..num_hashes).map(move |i| {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&BLOOM_FILTER_SEED.to_le_bytes());
        hasher.update(&i.to_le_bytes());
        hasher.update(item.as_bytes());
        let digest = hasher.finalize();
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest.as_bytes()[..8]);
        (u64::from_le_bytes(word) % num_slots as u64) as usize
    })
}

fn decode_base64(serialized: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(serialized.trim())
        .map_err(|e| PoiError::serialization(format!("bloom filter base64: {e}")))
}

// =============================================================================
// Standard filter
// =============================================================================

/// Insert-only bloom filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u8>,
    num_bits: usize,
    num_hashes: u32,
    element_count: u64,
}

impl BloomFilter {
    /// Empty filter with the network-wide geometry.
    pub fn new() -> Self {
        Self::with_params(BLOOM_FILTER_SIZE_BITS, BLOOM_FILTER_HASH_FUNCTIONS)
    }

    /// Empty filter with explicit geometry.
    pub fn with_params(num_bits: usize, num_hashes: u32) -> Self {
        Self {
            bits: vec![0u8; num_bits.div_ceil(8)],
            num_bits,
            num_hashes,
            element_count: 0,
        }
    }

    /// Add an item.
    pub fn insert(&mut self, item: &str) {
        let slots: Vec<usize> = positions(item, self.num_bits, self.num_hashes).collect();
        for slot in slots {
            self.bits[slot / 8] |= 1u8 << (slot % 8);
        }
        self.element_count += 1;
    }

    /// Probabilistic membership; never false for inserted items.
    pub fn contains(&self, item: &str) -> bool {
        positions(item, self.num_bits, self.num_hashes)
            .all(|slot| self.bits[slot / 8] & (1u8 << (slot % 8)) != 0)
    }

    /// Items inserted since creation (not recovered by deserialization).
    pub fn element_count(&self) -> u64 {
        self.element_count
    }

    /// Base64 of the bit array.
    pub fn serialize(&self) -> String {
        STANDARD.encode(&self.bits)
    }

    /// Decode a filter with the network-wide geometry.
    pub fn deserialize(serialized: &str) -> Result<Self> {
        Self::deserialize_with_params(serialized, BLOOM_FILTER_SIZE_BITS, BLOOM_FILTER_HASH_FUNCTIONS)
    }

    /// Decode a filter with explicit geometry.
    pub fn deserialize_with_params(
        serialized: &str,
        num_bits: usize,
        num_hashes: u32,
    ) -> Result<Self> {
        let bits = decode_base64(serialized)?;
        if bits.len() != num_bits.div_ceil(8) {
            return Err(PoiError::serialization(format!(
                "bloom filter has {} bytes, expected {}",
                bits.len(),
                num_bits.div_ceil(8)
            )));
        }
        Ok(Self {
            bits,
            num_bits,
            num_hashes,
            element_count: 0,
        })
    }
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Counting filter
// =============================================================================

/// Bloom filter with saturating 4-bit counters per slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountingBloomFilter {
    counters: Vec<u8>,
    num_hashes: u32,
}

impl CountingBloomFilter {
    /// Empty filter with the network-wide geometry.
    pub fn new() -> Self {
        Self::with_params(BLOOM_FILTER_SIZE_BITS, BLOOM_FILTER_HASH_FUNCTIONS)
    }

    /// Empty filter with explicit geometry.
    pub fn with_params(num_slots: usize, num_hashes: u32) -> Self {
        Self {
            counters: vec![0u8; num_slots],
            num_hashes,
        }
    }

    fn num_slots(&self) -> usize {
        self.counters.len()
    }

    /// Add an item.
    pub fn insert(&mut self, item: &str) {
        let slots: Vec<usize> = positions(item, self.num_slots(), self.num_hashes).collect();
        for slot in slots {
            if self.counters[slot] < COUNTER_MAX {
                self.counters[slot] += 1;
            }
        }
    }

    /// Remove a previously inserted item. Saturated counters stay pinned.
    pub fn remove(&mut self, item: &str) -> bool {
        if !self.contains(item) {
            return false;
        }
        let slots: Vec<usize> = positions(item, self.num_slots(), self.num_hashes).collect();
        for slot in slots {
            if self.counters[slot] > 0 && self.counters[slot] < COUNTER_MAX {
                self.counters[slot] -= 1;
            }
        }
        true
    }

    /// Probabilistic membership.
    pub fn contains(&self, item: &str) -> bool {
        positions(item, self.num_slots(), self.num_hashes).all(|slot| self.counters[slot] > 0)
    }

    /// Base64 of counters packed two per byte (low nibble first).
    pub fn serialize(&self) -> String {
        let packed: Vec<u8> = self
            .counters
            .chunks(2)
            .map(|pair| pair[0] | (pair.get(1).copied().unwrap_or(0) << 4))
            .collect();
        STANDARD.encode(packed)
    }

    /// Decode a filter with the network-wide geometry.
    pub fn deserialize(serialized: &str) -> Result<Self> {
        Self::deserialize_with_params(serialized, BLOOM_FILTER_SIZE_BITS, BLOOM_FILTER_HASH_FUNCTIONS)
    }

    /// Decode a filter with explicit geometry.
    pub fn deserialize_with_params(
        serialized: &str,
        num_slots: usize,
        num_hashes: u32,
    ) -> Result<Self> {
        let packed = decode_base64(serialized)?;
        if packed.len() != num_slots.div_ceil(2) {
            return Err(PoiError::serialization(format!(
                "counting bloom filter has {} bytes, expected {}",
                packed.len(),
                num_slots.div_ceil(2)
            )));
        }
        let mut counters = Vec::with_capacity(num_slots);
        for byte in packed {
            counters.push(byte & 0x0f);
            counters.push(byte >> 4);
        }
        counters.truncate(num_slots);
        Ok(Self {
            counters,
            num_hashes,
        })
    }
}

impl Default for CountingBloomFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Any serialized filter answers membership the same way: a slot is set
/// when its counter (or bit) is non-zero.
#[derive(Debug, Clone)]
pub enum PeerFilter {
    /// Decoded standard filter
    Standard(BloomFilter),
    /// Decoded counting filter
    Counting(CountingBloomFilter),
}

impl PeerFilter {
    /// Membership test.
    pub fn contains(&self, item: &str) -> bool {
        match self {
            PeerFilter::Standard(filter) => filter.contains(item),
            PeerFilter::Counting(filter) => filter.contains(item),
        }
    }
}
