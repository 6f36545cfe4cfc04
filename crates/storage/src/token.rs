// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auth token store (spec §4.6). A single opaque token lives at a
//! well-known path, written atomically with `0600` permissions on POSIX.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Return the token on disk, creating a fresh one if none exists yet.
    pub fn load_or_create(&self) -> Result<String, TokenStoreError> {
        if let Some(token) = self.load()? {
            return Ok(token);
        }
        let token = generate_token();
        self.write(&token)?;
        Ok(token)
    }

    pub fn load(&self) -> Result<Option<String>, TokenStoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(Some(contents.trim().to_string()))
    }

    /// Generate a fresh token, persist it atomically, and return it. The
    /// caller is responsible for swapping its in-memory copy and closing out
    /// connections authenticated under the old token.
    pub fn rotate(&self) -> Result<String, TokenStoreError> {
        let token = generate_token();
        self.write(&token)?;
        Ok(token)
    }

    fn write(&self, token: &str) -> Result<(), TokenStoreError> {
        write_atomic_0600(&self.path, token.as_bytes())?;
        Ok(())
    }
}

/// Two concatenated UUIDv4s (32 random bytes, hex-encoded) — enough entropy
/// for a bearer token without pulling in a dedicated RNG crate; `uuid`'s v4
/// generator already uses the OS CSPRNG.
fn generate_token() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

fn write_atomic_0600(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(&tmp_path, path)
}
