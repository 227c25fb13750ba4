//! Content fingerprinter
//!
//! Hashes a fixed leading window plus the total size. Cheap for large files
//! and good enough to catch the same photo being picked twice; collisions
//! between different files sharing both prefix and size are accepted.

use sha2::{Digest, Sha256};
use shutter_core::constants::FINGERPRINT_WINDOW_BYTES;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Fixed-length (32 byte) content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.to_hex())
    }
}

pub struct Fingerprinter {
    window: usize,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(FINGERPRINT_WINDOW_BYTES)
    }
}

impl Fingerprinter {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }

    pub fn fingerprint(&self, data: &[u8]) -> Fingerprint {
        let window = &data[..data.len().min(self.window)];
        let mut hasher = Sha256::new();
        hasher.update(window);
        hasher.update((data.len() as u64).to_le_bytes());
        Fingerprint(hasher.finalize().into())
    }
}
