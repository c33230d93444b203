//! Pluggable hash functions for key fingerprinting.
//!
//! # Responsibilities
//! - Map a string or integer key to a stable fingerprint
//! - Select the algorithm by configuration name
//! - Fall back to SipHash-2-4 on unrecognized names instead of erroring
//!
//! Used by the IpHash and ConsistentHash criteria. The same key always
//! produces the same fingerprint within a process; there is no ordering
//! guarantee across algorithms.

use std::hash::Hasher;
use std::io::Cursor;

use md5::{Digest, Md5};
use sha2::Sha256;
use siphasher::sip::SipHasher24;

/// Supported hash kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashKind {
    /// Not so bad, but a little slow.
    Md5,
    /// Fast, not great for very small keys.
    Murmur3_32,
    /// Reliable, a little slow.
    Sha256,
    /// Fast and reliable, the best for small keys. The default.
    #[default]
    Sip24,
}

impl HashKind {
    /// Resolve a configuration name. Unrecognized names (including empty)
    /// fall back to [`HashKind::Sip24`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "MD5" => HashKind::Md5,
            "MURMUR3_32" => HashKind::Murmur3_32,
            "SHA256" => HashKind::Sha256,
            "SIP24" => HashKind::Sip24,
            _ => HashKind::Sip24,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashKind::Md5 => "MD5",
            HashKind::Murmur3_32 => "MURMUR3_32",
            HashKind::Sha256 => "SHA256",
            HashKind::Sip24 => "SIP24",
        }
    }
}

/// Digest bytes in algorithm output order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    /// First four digest bytes, little-endian. Shorter digests are
    /// zero-padded.
    pub fn as_u32(&self) -> u32 {
        let mut buf = [0u8; 4];
        for (i, b) in self.0.iter().take(4).enumerate() {
            buf[i] = *b;
        }
        u32::from_le_bytes(buf)
    }

    /// First eight digest bytes, little-endian. Shorter digests are
    /// zero-padded.
    pub fn as_u64(&self) -> u64 {
        let mut buf = [0u8; 8];
        for (i, b) in self.0.iter().take(8).enumerate() {
            buf[i] = *b;
        }
        u64::from_le_bytes(buf)
    }

    /// Lowercase hex rendering of the full digest.
    pub fn as_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// A named hash algorithm producing [`Fingerprint`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashEngine {
    kind: HashKind,
}

impl HashEngine {
    pub fn new(kind: HashKind) -> Self {
        Self { kind }
    }

    /// Construct from a configuration name, defaulting on unknown names.
    pub fn from_name(name: &str) -> Self {
        Self {
            kind: HashKind::from_name(name),
        }
    }

    pub fn kind(&self) -> HashKind {
        self.kind
    }

    /// Fingerprint a string key.
    pub fn hash_str(&self, key: &str) -> Fingerprint {
        self.hash_bytes(key.as_bytes())
    }

    /// Fingerprint an integer key (little-endian byte representation).
    pub fn hash_u64(&self, key: u64) -> Fingerprint {
        self.hash_bytes(&key.to_le_bytes())
    }

    fn hash_bytes(&self, bytes: &[u8]) -> Fingerprint {
        let digest = match self.kind {
            HashKind::Md5 => Md5::digest(bytes).to_vec(),
            HashKind::Murmur3_32 => {
                // The reader is a cursor over an in-memory slice; this
                // cannot fail.
                let h = murmur3::murmur3_32(&mut Cursor::new(bytes), 0).unwrap_or(0);
                h.to_le_bytes().to_vec()
            }
            HashKind::Sha256 => Sha256::digest(bytes).to_vec(),
            HashKind::Sip24 => {
                let mut hasher = SipHasher24::new_with_keys(0, 0);
                hasher.write(bytes);
                hasher.finish().to_le_bytes().to_vec()
            }
        };
        Fingerprint(digest)
    }
}
