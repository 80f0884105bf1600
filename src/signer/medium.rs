/// Key media: where the signing key lives while it is plugged in.
use std::path::{Path, PathBuf};

use crate::crypto::sensitive::SensitiveVec;
use crate::error::{AnchorError, Result};

pub trait KeyMedium: Send + Sync {
    /// Human-readable location for operator prompts and logs.
    fn describe(&self) -> String;

    /// Whether the medium is currently attached.
    fn is_present(&self) -> bool;

    /// Read the raw key. Callers own the returned secret.
    fn read_key(&self) -> Result<SensitiveVec>;
}

/// A key file, typically on removable storage (e.g. `/media/usb/pk_issuer.txt`).
#[derive(Debug, Clone)]
pub struct FileKeyMedium {
    path: PathBuf,
}

impl FileKeyMedium {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyMedium for FileKeyMedium {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn is_present(&self) -> bool {
        self.path.is_file()
    }

    fn read_key(&self) -> Result<SensitiveVec> {
        let raw = std::fs::read(&self.path).map_err(|e| {
            AnchorError::KeyMedium(format!("cannot read {}: {e}", self.path.display()))
        })?;
        Ok(SensitiveVec::new(raw).trimmed())
    }
}
