use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of the per-process token salt in bytes.
pub const SALT_LEN: usize = 16;

/// Fingerprints at or below this Hamming distance belong to the same task.
pub const DEFAULT_SIMILARITY_THRESHOLD: u32 = 5;

const BITS: usize = 64;

/// 64-bit SimHash of a payload.
///
/// The raw value carries no meaning on its own; compare fingerprints with
/// [`Fingerprint::distance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Fingerprint of a payload without tokens.
    pub const EMPTY: Fingerprint = Fingerprint(0);

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    /// Number of differing bits (0..=64).
    pub fn distance(self, other: Fingerprint) -> u32 {
        distance(self, other)
    }

    pub fn is_similar(self, other: Fingerprint, threshold: u32) -> bool {
        self.distance(other) <= threshold
    }
}

/// Hamming distance between two fingerprints.
#[inline]
pub fn distance(a: Fingerprint, b: Fingerprint) -> u32 {
    (a.0 ^ b.0).count_ones()
}

/// Computes salted SimHash fingerprints.
#[derive(Clone)]
pub struct Fingerprinter {
    salt: [u8; SALT_LEN],
}

impl Fingerprinter {
    /// Create a fingerprinter with a fresh salt from the thread-local CSPRNG.
    pub fn new() -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::rng().fill(&mut salt);
        Self { salt }
    }

    /// Create a fingerprinter with a caller-chosen salt.
    ///
    /// Two fingerprinters with the same salt produce identical fingerprints.
    pub fn with_salt(salt: [u8; SALT_LEN]) -> Self {
        Self { salt }
    }

    /// SimHash of `text`.
    ///
    /// Tokens are the whitespace-separated words of `text`, taken as-is (no
    /// normalisation). Every occurrence votes, so repeated tokens weigh more.
    /// A vote of exactly zero yields a set bit. Text without tokens maps to
    /// [`Fingerprint::EMPTY`].
    pub fn fingerprint(&self, text: &str) -> Fingerprint {
        let mut votes = [0i32; BITS];
        let mut seen_token = false;

        for token in text.split_whitespace() {
            seen_token = true;
            let hash = self.token_hash(token);
            for (bit, vote) in votes.iter_mut().enumerate() {
                if (hash >> bit) & 1 == 1 {
                    *vote = vote.saturating_add(1);
                } else {
                    *vote = vote.saturating_sub(1);
                }
            }
        }

        if !seen_token {
            return Fingerprint::EMPTY;
        }

        let bits = votes
            .iter()
            .enumerate()
            .filter(|(_, vote)| **vote >= 0)
            .fold(0u64, |acc, (bit, _)| acc | (1u64 << bit));
        Fingerprint(bits)
    }

    fn token_hash(&self, token: &str) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.salt);
        hasher.update(token.as_bytes());
        let digest = hasher.finalize();

        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(head)
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Fingerprinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprinter").finish_non_exhaustive()
    }
}
