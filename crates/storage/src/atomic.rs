// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic JSON file persistence shared by the snapshot stores (registry,
//! pid record, token). Write-temp-then-rename so a crash mid-write never
//! leaves a half-written file in place; corrupt files are rotated aside
//! rather than deleted, so an operator can inspect them.

use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum AtomicFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize `value` to `path` atomically: write to `path.tmp`, fsync, rename.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AtomicFileError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, value)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load `path` if it exists. A corrupt file is rotated to `.bak` and `None`
/// is returned so the caller can fall back to a fresh/recovered state.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, AtomicFileError> {
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    match serde_json::from_reader(reader) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            let bak_path = rotate_bak_path(path);
            warn!(
                error = %e,
                path = %path.display(),
                bak = %bak_path.display(),
                "corrupt file, moving to .bak and starting fresh",
            );
            fs::rename(path, &bak_path)?;
            Ok(None)
        }
    }
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`. The
/// oldest backup is removed when the limit is reached.
pub fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }

    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Demo {
        n: u32,
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("demo.json");
        save_json(&path, &Demo { n: 7 }).expect("save");
        let loaded: Option<Demo> = load_json(&path).expect("load");
        assert_eq!(loaded, Some(Demo { n: 7 }));
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("missing.json");
        let loaded: Option<Demo> = load_json(&path).expect("load");
        assert_eq!(loaded, None);
    }

    #[test]
    fn corrupt_file_is_rotated_to_bak() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("demo.json");
        fs::write(&path, b"not json").expect("write");
        let loaded: Option<Demo> = load_json(&path).expect("load");
        assert_eq!(loaded, None);
        assert!(path.with_extension("bak").exists());
        assert!(!path.exists());
    }
}
