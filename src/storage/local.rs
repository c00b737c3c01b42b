// SPDX-License-Identifier: MPL-2.0

//! Local durable store
//!
//! One file per key under the data directory. Reads never fail: a missing
//! or unreadable file yields the default and a log line. Writes go to a
//! temporary file that is renamed over the target, so a crash mid-write
//! leaves the previous value intact. Ordering between writers is the
//! caller's concern; [`super::ConfigSync`] serialises its own writes.

use crate::config::{self, AdminStats, ConfigSnapshot, Frame, Language, ThemeConfig};
use crate::constants::local_store::{FRAMES_FILE, LANGUAGE_FILE, STATS_FILE, THEME_FILE};
use crate::errors::SyncError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// JSON files in one directory
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_json<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        let path = self.dir.join(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No stored value, using default");
                return T::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read stored value");
                return T::default();
            }
        };

        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Stored value is corrupt, using default");
            T::default()
        })
    }

    /// Write `bytes` to `name` atomically
    async fn write_atomic(&self, name: &str, bytes: Vec<u8>) -> Result<(), SyncError> {
        let target = self.dir.join(name);
        // Unique per write so overlapping writers never share a temp file
        let temp = self
            .dir
            .join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()));
        let fail = |e: std::io::Error| SyncError::LocalWrite(format!("{}: {}", target.display(), e));

        tokio::fs::create_dir_all(&self.dir).await.map_err(fail)?;
        tokio::fs::write(&temp, &bytes).await.map_err(fail)?;
        tokio::fs::rename(&temp, &target).await.map_err(fail)?;

        debug!(path = %target.display(), size = bytes.len(), "Stored value written");
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), SyncError> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| SyncError::LocalWrite(format!("{}: {}", name, e)))?;
        self.write_atomic(name, bytes).await
    }

    pub async fn load_frames(&self) -> Vec<Frame> {
        self.read_json(FRAMES_FILE).await
    }

    /// Stored theme with defaults filled in
    pub async fn load_theme(&self) -> ThemeConfig {
        config::fill_defaults(self.read_json(THEME_FILE).await)
    }

    pub async fn load_stats(&self) -> AdminStats {
        self.read_json(STATS_FILE).await
    }

    pub async fn load_language(&self) -> Language {
        match tokio::fs::read_to_string(self.dir.join(LANGUAGE_FILE)).await {
            Ok(code) => Language::from_code(&code).unwrap_or_default(),
            Err(_) => Language::default(),
        }
    }

    /// Last known-good snapshot
    pub async fn load_snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            frames: self.load_frames().await,
            theme: self.load_theme().await,
            stats: self.load_stats().await,
            updated_at: None,
        }
    }

    pub async fn save_frames(&self, frames: &[Frame]) -> Result<(), SyncError> {
        self.write_json(FRAMES_FILE, frames).await
    }

    pub async fn save_theme(&self, theme: &ThemeConfig) -> Result<(), SyncError> {
        self.write_json(THEME_FILE, theme).await
    }

    pub async fn save_stats(&self, stats: &AdminStats) -> Result<(), SyncError> {
        self.write_json(STATS_FILE, stats).await
    }

    pub async fn save_language(&self, language: Language) -> Result<(), SyncError> {
        self.write_atomic(LANGUAGE_FILE, language.code().as_bytes().to_vec())
            .await
    }

    /// Write frames, theme and stats
    pub async fn save_snapshot(&self, snapshot: &ConfigSnapshot) -> Result<(), SyncError> {
        self.save_frames(&snapshot.frames).await?;
        self.save_theme(&snapshot.theme).await?;
        self.save_stats(&snapshot.stats).await
    }
}

/// Saved composites in `photos_dir`, newest first
pub async fn list_photos(photos_dir: PathBuf) -> Vec<PathBuf> {
    tokio::task::spawn_blocking(move || {
        let mut files: Vec<(std::time::SystemTime, PathBuf)> = std::fs::read_dir(&photos_dir)
            .map(|entries| {
                entries
                    .flatten()
                    .filter_map(|entry| {
                        let path = entry.path();
                        let ext = path.extension()?.to_string_lossy().to_string();
                        if !ext.eq_ignore_ascii_case("jpg") && !ext.eq_ignore_ascii_case("png") {
                            return None;
                        }
                        let modified = entry.metadata().ok()?.modified().ok()?;
                        Some((modified, path))
                    })
                    .collect()
            })
            .unwrap_or_default();

        files.sort_by(|a, b| b.0.cmp(&a.0));
        files.into_iter().map(|(_, path)| path).collect()
    })
    .await
    .unwrap_or_default()
}
