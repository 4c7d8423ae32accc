//! Content hashes identifying source-control positions

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A 32-byte hash naming a checkout position (commit or manifest)
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CommitHash([u8; 32]);

/// The all-zero hash, meaning "no known position"
pub const ZERO_HASH: CommitHash = CommitHash([0u8; 32]);

impl CommitHash {
    /// Create a CommitHash from raw bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the hash as a byte slice
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether this is [`ZERO_HASH`]
    pub fn is_zero(&self) -> bool {
        *self == ZERO_HASH
    }

    /// Lowercase hex rendering of the hash
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|byte| format!("{byte:02x}")).collect()
    }

    /// Parse a 64-character hex string
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != 64 {
            anyhow::bail!("hash hex must be 64 characters, got {}", hex.len());
        }
        let mut bytes = [0u8; 32];
        for (slot, pair) in bytes.iter_mut().zip(hex.as_bytes().chunks_exact(2)) {
            if !pair.iter().all(u8::is_ascii_hexdigit) {
                anyhow::bail!("non-hex character in hash: {hex}");
            }
            *slot = u8::from_str_radix(std::str::from_utf8(pair)?, 16)?;
        }
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for CommitHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CommitHash({})", self.to_hex())
    }
}

impl std::fmt::Display for CommitHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Hash bytes using BLAKE3
pub fn digest(data: &[u8]) -> CommitHash {
    let hash = blake3::hash(data);
    CommitHash::from_bytes(*hash.as_bytes())
}
