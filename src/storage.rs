//! File-backed blob store for uploaded media.
//!
//! Blobs are addressed by a generated key so concurrent uploads of files with
//! the same name never collide. Keys are flat (no subdirectories).

use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Generate a unique storage key for an uploaded file:
    /// `{epoch}_{rand4}_{sanitized original name}`.
    pub fn generate_key(original_name: &str) -> String {
        let epoch = chrono::Utc::now().timestamp();
        let suffix = fastrand::u32(1000..=9999);
        format!("{}_{}_{}", epoch, suffix, sanitize_filename(original_name))
    }

    pub fn path_of(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub async fn save(&self, key: &str, bytes: &[u8]) -> std::io::Result<()> {
        fs::create_dir_all(&self.root).await?;
        fs::write(self.path_of(key), bytes).await
    }

    pub async fn exists(&self, key: &str) -> bool {
        fs::try_exists(self.path_of(key)).await.unwrap_or(false)
    }

    pub async fn read(&self, key: &str) -> std::io::Result<Vec<u8>> {
        fs::read(self.path_of(key)).await
    }

    /// Remove a blob. Missing blobs are not an error; the record is what the
    /// caller is really deleting.
    pub async fn remove(&self, key: &str) -> std::io::Result<()> {
        match fs::remove_file(self.path_of(key)).await {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Keep alphanumerics, dot, dash and underscore; everything else becomes `_`.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('_').is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}
