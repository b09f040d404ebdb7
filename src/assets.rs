//! Asset directories bundled into the stack
//!
//! The stack references three local directories: bucket seed content and the
//! code of two functions. Each is hashed up front so the graph builder stays
//! free of I/O and a content change shows up as a property change.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// A local directory and the hash of its contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSource {
    /// Path as it appears in the template
    pub path: String,
    /// BLAKE3 over relative paths and file contents, `None` when not scanned
    pub hash: Option<String>,
}

impl AssetSource {
    /// Hash every regular file under `dir`, in sorted path order
    pub fn scan(dir: &Path) -> Result<Self> {
        let mut hasher = blake3::Hasher::new();
        let mut file_count = 0;

        let walker = WalkDir::new(dir).sort_by_file_name();
        for entry in walker {
            let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            let rel = rel.to_string_lossy().replace('\\', "/");
            let content = fs::read(entry.path())
                .with_context(|| format!("Failed to read asset {}", entry.path().display()))?;

            hasher.update(rel.as_bytes());
            hasher.update(&[0]);
            hasher.update(&content);
            file_count += 1;
        }

        log::debug!("Hashed {} asset file(s) in {}", file_count, dir.display());
        Ok(Self {
            path: dir.to_string_lossy().to_string(),
            hash: Some(hasher.finalize().to_hex().to_string()),
        })
    }

    /// Reference a directory without reading it
    pub fn unscanned(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            hash: None,
        }
    }

    /// Scan when the directory exists, otherwise reference it unscanned
    pub fn scan_or_reference(dir: &Path) -> Result<Self> {
        if dir.is_dir() {
            Self::scan(dir)
        } else {
            log::warn!("Asset directory {} not found, not hashing it", dir.display());
            Ok(Self::unscanned(dir.to_string_lossy()))
        }
    }
}

/// The three asset directories of the stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackAssets {
    /// Seeded into the bucket (`resources/worker.py`, `resources/sqs_queue.py`)
    pub seed: AssetSource,
    /// Code of the bucket-event function
    pub bucket_handler: AssetSource,
    /// Code of the build-orchestration function
    pub build_runner: AssetSource,
}

impl StackAssets {
    pub fn locate(root: &Path) -> Result<Self> {
        Ok(Self {
            seed: AssetSource::scan_or_reference(&root.join("s3"))?,
            bucket_handler: AssetSource::scan_or_reference(&root.join("sqs"))?,
            build_runner: AssetSource::scan_or_reference(&root.join("codebuild"))?,
        })
    }

    /// Relative, unscanned references
    #[cfg(test)]
    pub fn unscanned() -> Self {
        Self {
            seed: AssetSource::unscanned("assets/s3"),
            bucket_handler: AssetSource::unscanned("assets/sqs"),
            build_runner: AssetSource::unscanned("assets/codebuild"),
        }
    }
}
