//! Module Fingerprints
//!
//! Content digests used to tell an unchanged module file from an updated one.

use std::fmt;
use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::common::FingerprintError;

/// SHA-256 digest of a module's bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// First `len` hex characters, for file names and log lines.
    pub fn short(&self, len: usize) -> String {
        let mut hex = self.to_string();
        hex.truncate(len);
        hex
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short(12))
    }
}

pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    Fingerprint(Sha256::digest(bytes).into())
}

/// A module file's contents together with their fingerprint.
#[derive(Debug, Clone)]
pub struct ModuleBytes {
    pub bytes: Vec<u8>,
    pub fingerprint: Fingerprint,
}

impl ModuleBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        let fingerprint = fingerprint(&bytes);
        Self { bytes, fingerprint }
    }

    pub fn read(path: &Path) -> Result<Self, FingerprintError> {
        let bytes = fs::read(path).map_err(|source| FingerprintError {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(bytes))
    }
}
