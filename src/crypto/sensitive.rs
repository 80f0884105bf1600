/// Wrapper for signing key material that is zeroized on drop.
use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{AnchorError, Result};

/// A variable-length secret buffer that is zeroized when dropped.
///
/// Holds the raw key as read from the key medium (a WIF string for
/// Bitcoin, a hex private key for Ethereum).
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SensitiveVec(Vec<u8>);

impl SensitiveVec {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Strip surrounding whitespace (key files usually end in a newline).
    pub fn trimmed(mut self) -> Self {
        let start = self.0.iter().position(|b| !b.is_ascii_whitespace());
        let end = self.0.iter().rposition(|b| !b.is_ascii_whitespace());
        let trimmed = match (start, end) {
            (Some(s), Some(e)) => self.0[s..=e].to_vec(),
            _ => Vec::new(),
        };
        self.0.zeroize();
        Self(trimmed)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// View the key as text, for WIF / hex encoded keys.
    pub fn as_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.0)
            .map_err(|_| AnchorError::KeyMedium("key material is not valid UTF-8".into()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for SensitiveVec {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SensitiveVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveVec([REDACTED; {}])", self.0.len())
    }
}
