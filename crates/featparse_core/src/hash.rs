// hash.rs: feature hashing (murmur3-32 plus the integer shortcut used for numeric names)
use serde::Deserialize;

use crate::error::ConfigError;

/// Multiplier used to spread derived and quadratic indices.
pub const QUADRATIC_CONSTANT: u32 = 27942141;
/// Base mixing constant for affix features.
pub const AFFIX_CONSTANT: u32 = 7369791;
/// Prime used when crossing feature indices.
pub const FNV_PRIME: u32 = 16777619;
/// Index of the implicit bias feature.
pub const CONSTANT: u32 = 11650396;

/// Reserved namespace indices for derived feature families.
pub const CONSTANT_NAMESPACE: u8 = 128;
pub const AFFIX_NAMESPACE: u8 = 132;
pub const SPELLING_NAMESPACE: u8 = 133;
pub const DICTIONARY_NAMESPACE: u8 = 135;

/// Seed used when hashing a namespace name.
pub const HASH_BASE: u32 = 0;

#[inline]
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// MurmurHash3 x86 32-bit. Persisted models depend on this exact function.
pub fn uniform_hash(key: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h1 = seed;
    let mut blocks = key.chunks_exact(4);
    for block in &mut blocks {
        let mut k1 = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        k1 = k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let mut k1: u32 = 0;
        for (i, &b) in tail.iter().enumerate() {
            k1 ^= (b as u32) << (8 * i);
        }
        k1 = k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= key.len() as u32;
    fmix32(h1)
}

/// Hash a name the way the default "strings" mode does: surrounding
/// whitespace is ignored, an all-digit name maps to its integer value plus
/// the seed, anything else goes through murmur3.
pub fn hash_string(name: &[u8], seed: u32) -> u32 {
    let mut start = 0usize;
    let mut end = name.len();
    while start < end && name[start] <= 0x20 {
        start += 1;
    }
    while end > start && name[end - 1] <= 0x20 {
        end -= 1;
    }
    let trimmed = &name[start..end];

    let mut acc: u32 = 0;
    for &b in trimmed {
        if b.is_ascii_digit() {
            acc = acc.wrapping_mul(10).wrapping_add((b - b'0') as u32);
        } else {
            return uniform_hash(trimmed, seed);
        }
    }
    acc.wrapping_add(seed)
}

/// Hash every name through murmur3, numeric or not.
pub fn hash_all(name: &[u8], seed: u32) -> u32 {
    uniform_hash(name, seed)
}

/// Which hash function maps feature and namespace names to indices.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashMode {
    #[default]
    Strings,
    All,
}

impl HashMode {
    #[inline]
    pub fn hash(self, name: &[u8], seed: u32) -> u32 {
        match self {
            HashMode::Strings => hash_string(name, seed),
            HashMode::All => hash_all(name, seed),
        }
    }

    /// Seed for every feature of a namespace.
    #[inline]
    pub fn namespace_seed(self, namespace: &[u8]) -> u32 {
        self.hash(namespace, HASH_BASE)
    }
}

impl std::str::FromStr for HashMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strings" => Ok(HashMode::Strings),
            "all" => Ok(HashMode::All),
            other => Err(ConfigError::HashMode(other.to_string())),
        }
    }
}
