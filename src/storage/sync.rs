// SPDX-License-Identifier: MPL-2.0

//! Configuration and stats synchronisation
//!
//! The local store is read first and is always written through; the cloud
//! document is fetched in the background and merged into the in-memory
//! snapshot when it arrives. A cloud failure never replaces local state.

use super::assets;
use super::local::LocalStore;
use crate::backends::cloud::{CloudServices, CloudSnapshot};
use crate::config::{
    self, AdminStats, ConfigSnapshot, FirebaseConfig, Frame, Language, ThemeConfig,
};
use crate::errors::SyncError;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as WriteLock, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

struct SyncState {
    snapshot: ConfigSnapshot,
    language: Language,
    /// In-memory only; resolved against the frame list on read
    selected_frame: Option<String>,
}

/// Outcome of recording a completed session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRecorded {
    /// Counter value after the optimistic increment
    pub total: u64,
    /// A remote increment was started
    pub mirrored: bool,
}

/// Local-first configuration with best-effort cloud mirroring
pub struct ConfigSync {
    local: LocalStore,
    cloud: CloudServices,
    state: Mutex<SyncState>,
    updates: watch::Sender<ConfigSnapshot>,
    /// Held across "mutate state, write file" so disk order follows memory order
    writes: WriteLock<()>,
    /// Remote counter increments still in flight
    pending: Mutex<JoinSet<()>>,
}

impl ConfigSync {
    /// Read the last known-good snapshot; never touches the network
    pub async fn load(local: LocalStore, cloud: CloudServices) -> Arc<Self> {
        let snapshot = local.load_snapshot().await;
        let language = local.load_language().await;
        info!(
            dir = %local.dir().display(),
            frames = snapshot.frames.len(),
            total_photos = snapshot.stats.total_photos,
            language = language.code(),
            "Local configuration loaded"
        );

        let (updates, _) = watch::channel(snapshot.clone());
        Arc::new(Self {
            local,
            cloud,
            state: Mutex::new(SyncState {
                snapshot,
                language,
                selected_frame: None,
            }),
            updates,
            writes: WriteLock::new(()),
            pending: Mutex::new(JoinSet::new()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, snapshot: ConfigSnapshot) {
        self.updates.send_replace(snapshot);
    }

    pub fn cloud(&self) -> &CloudServices {
        &self.cloud
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        self.lock().snapshot.clone()
    }

    pub fn theme(&self) -> ThemeConfig {
        self.lock().snapshot.theme.clone()
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.lock().snapshot.frames.clone()
    }

    pub fn stats(&self) -> AdminStats {
        self.lock().snapshot.stats
    }

    pub fn language(&self) -> Language {
        self.lock().language
    }

    /// Cloud credentials from the current theme, if usable
    pub fn credentials(&self) -> Option<FirebaseConfig> {
        self.lock().snapshot.theme.cloud_credentials().cloned()
    }

    /// Frame to composite with, falling back to the first frame
    pub fn selected_frame(&self) -> Option<Frame> {
        let state = self.lock();
        config::select_frame(&state.snapshot.frames, state.selected_frame.as_deref()).cloned()
    }

    pub fn select_frame(&self, frame_id: Option<String>) {
        debug!(frame = ?frame_id, "Frame selected");
        self.lock().selected_frame = frame_id;
    }

    /// Watch configuration changes
    pub fn subscribe(&self) -> watch::Receiver<ConfigSnapshot> {
        self.updates.subscribe()
    }

    pub async fn set_frames(&self, frames: Vec<Frame>) -> Result<(), SyncError> {
        let _write = self.writes.lock().await;
        let snapshot = {
            let mut state = self.lock();
            state.snapshot.frames = frames;
            state.snapshot.clone()
        };
        self.notify(snapshot.clone());
        self.local.save_frames(&snapshot.frames).await
    }

    pub async fn set_theme(&self, theme: ThemeConfig) -> Result<(), SyncError> {
        let _write = self.writes.lock().await;
        let snapshot = {
            let mut state = self.lock();
            state.snapshot.theme = config::fill_defaults(theme);
            state.snapshot.clone()
        };
        self.notify(snapshot.clone());
        self.local.save_theme(&snapshot.theme).await
    }

    pub async fn set_stats(&self, stats: AdminStats) -> Result<(), SyncError> {
        let _write = self.writes.lock().await;
        let snapshot = {
            let mut state = self.lock();
            state.snapshot.stats = stats;
            state.snapshot.clone()
        };
        self.notify(snapshot);
        self.local.save_stats(&stats).await
    }

    pub async fn set_language(&self, language: Language) -> Result<(), SyncError> {
        let _write = self.writes.lock().await;
        self.lock().language = language;
        self.local.save_language(language).await
    }

    /// Start reconciliation in the background when credentials exist
    pub fn spawn_reconcile(self: &Arc<Self>) -> Option<JoinHandle<Result<ConfigSnapshot, SyncError>>> {
        self.credentials()?;
        let this = Arc::clone(self);
        Some(tokio::spawn(async move { this.reconcile().await }))
    }

    /// Fetch the cloud snapshot and merge it into local state
    ///
    /// A missing cloud document leaves local state as is.
    pub async fn reconcile(&self) -> Result<ConfigSnapshot, SyncError> {
        let Some(credentials) = self.credentials() else {
            return Err(SyncError::ConfigSyncFailed("no cloud credentials".into()));
        };

        let cloud = match self.cloud.documents.get_snapshot(&credentials).await {
            Ok(Some(cloud)) => cloud,
            Ok(None) => {
                info!("No cloud settings document yet, keeping local configuration");
                return Ok(self.snapshot());
            }
            Err(e) => {
                warn!(error = %e, "Cloud configuration fetch failed, keeping local configuration");
                return Err(SyncError::ConfigSyncFailed(e.to_string()));
            }
        };

        let _write = self.writes.lock().await;
        let merged = {
            let mut state = self.lock();
            state.snapshot = merge_snapshot(&state.snapshot, cloud);
            state.snapshot.clone()
        };

        self.notify(merged.clone());
        if let Err(e) = self.local.save_snapshot(&merged).await {
            warn!(error = %e, "Failed to persist merged configuration");
        }

        info!(
            frames = merged.frames.len(),
            total_photos = merged.stats.total_photos,
            "Configuration reconciled with cloud"
        );
        Ok(merged)
    }

    /// Count one completed session
    ///
    /// The in-memory and local counters move immediately and are never
    /// rolled back; the remote increment runs in the background until
    /// [`Self::flush`].
    pub async fn record_completed_session(&self) -> SessionRecorded {
        let write = self.writes.lock().await;
        let (snapshot, credentials) = {
            let mut state = self.lock();
            state.snapshot.stats.total_photos += 1;
            let credentials = state.snapshot.theme.cloud_credentials().cloned();
            (state.snapshot.clone(), credentials)
        };
        let total = snapshot.stats.total_photos;
        self.notify(snapshot.clone());

        if let Err(e) = self.local.save_stats(&snapshot.stats).await {
            warn!(error = %e, "Failed to persist photo counter");
        }
        drop(write);

        let mirrored = credentials.is_some();
        if let Some(credentials) = credentials {
            let cloud = self.cloud.clone();
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            // Reap finished increments so the set stays small on long runs
            while pending.try_join_next().is_some() {}
            pending.spawn(async move {
                match cloud.documents.increment_counter(&credentials).await {
                    Ok(()) => debug!("Remote photo counter incremented"),
                    Err(e) => warn!(error = %e, "Remote photo counter increment failed"),
                }
            });
        }

        info!(total, mirrored, "Session recorded");
        SessionRecorded { total, mirrored }
    }

    /// Wait for remote counter increments started so far
    pub async fn flush(&self) {
        let mut pending = {
            let mut guard = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        while pending.join_next().await.is_some() {}
    }

    /// Admin save path: promote embedded assets, write the cloud document,
    /// then adopt the stored snapshot locally
    pub async fn publish(&self) -> Result<ConfigSnapshot, SyncError> {
        let Some(credentials) = self.credentials() else {
            return Err(SyncError::ConfigSyncFailed("no cloud credentials".into()));
        };

        let current = self.snapshot();
        let stored = assets::publish_snapshot(&self.cloud, &credentials, &current).await?;

        let _write = self.writes.lock().await;
        {
            let mut state = self.lock();
            state.snapshot.frames = stored.frames.clone();
            state.snapshot.theme = stored.theme.clone();
            state.snapshot.updated_at = stored.updated_at.clone();
        }
        let snapshot = self.snapshot();
        self.notify(snapshot.clone());
        self.local.save_snapshot(&snapshot).await?;
        Ok(snapshot)
    }
}

impl std::fmt::Debug for ConfigSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSync")
            .field("local", &self.local)
            .finish_non_exhaustive()
    }
}

/// Merge a cloud snapshot over the local one
///
/// - A non-empty cloud frame list replaces local frames; empty or absent
///   leaves them alone.
/// - Cloud theme keys overwrite local keys; keys the cloud omits (notably
///   `firebaseConfig`) keep their local value.
/// - Cloud stats replace local stats.
pub fn merge_snapshot(local: &ConfigSnapshot, cloud: CloudSnapshot) -> ConfigSnapshot {
    let mut merged = local.clone();

    if let Some(frames) = cloud.frames
        && !frames.is_empty()
    {
        merged.frames = frames;
    }

    if let Some(Value::Object(cloud_theme)) = cloud.theme {
        merged.theme = merge_theme(&local.theme, cloud_theme);
    }

    if let Some(stats) = cloud.stats {
        merged.stats = stats;
    }

    if cloud.updated_at.is_some() {
        merged.updated_at = cloud.updated_at;
    }

    merged
}

fn merge_theme(local: &ThemeConfig, cloud: serde_json::Map<String, Value>) -> ThemeConfig {
    let mut base = match serde_json::to_value(local) {
        Ok(Value::Object(base)) => base,
        _ => serde_json::Map::new(),
    };

    for (key, value) in cloud {
        if !value.is_null() {
            base.insert(key, value);
        }
    }

    match serde_json::from_value::<ThemeConfig>(Value::Object(base)) {
        Ok(theme) => config::fill_defaults(theme),
        Err(e) => {
            warn!(error = %e, "Cloud theme is malformed, keeping local theme");
            local.clone()
        }
    }
}
