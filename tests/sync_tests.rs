// SPDX-License-Identifier: MPL-2.0

//! Integration tests for local-first configuration sync

use photobooth::backends::cloud::{CloudServices, DocumentStore, MemoryStore};
use photobooth::config::{FirebaseConfig, Frame, ThemeConfig};
use photobooth::pipelines::photo::raster::to_data_uri;
use photobooth::storage::{ConfigSync, LocalStore};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn credentials() -> FirebaseConfig {
    FirebaseConfig {
        api_key: "key".into(),
        project_id: "booth".into(),
        storage_bucket: "booth.appspot.com".into(),
        ..Default::default()
    }
}

async fn seeded_local(dir: &TempDir) -> LocalStore {
    let local = LocalStore::new(dir.path());
    let theme = ThemeConfig {
        event_title: "Local Event".into(),
        firebase_config: Some(credentials()),
        ..ThemeConfig::default()
    };
    local.save_theme(&theme).await.unwrap();
    local
}

#[tokio::test]
async fn test_reconcile_merges_and_persists() {
    let dir = TempDir::new().unwrap();
    let local = seeded_local(&dir).await;

    let memory = Arc::new(MemoryStore::with_document(json!({
        "frames": [{ "id": "f1", "name": "Gold", "url": "https://cdn.example.com/f1.png" }],
        "theme": { "eventTitle": "Cloud Event", "primaryColor": "#ff0000" },
        "stats": { "totalPhotos": 41 },
        "updatedAt": "2026-01-01T00:00:00Z"
    })));
    let cloud = CloudServices::new(memory.clone(), memory.clone());

    let sync = ConfigSync::load(local, cloud).await;
    let merged = sync.reconcile().await.unwrap();

    assert_eq!(merged.theme.event_title, "Cloud Event");
    assert_eq!(merged.theme.primary_color, "#ff0000");
    // The cloud omits the credentials; they stay local
    assert_eq!(merged.theme.firebase_config, Some(credentials()));
    assert_eq!(merged.frames.len(), 1);
    assert_eq!(merged.stats.total_photos, 41);

    // A fresh start without network sees the merged state
    let reloaded = LocalStore::new(dir.path()).load_snapshot().await;
    assert_eq!(reloaded.theme.event_title, "Cloud Event");
    assert_eq!(reloaded.stats.total_photos, 41);
}

#[tokio::test]
async fn test_empty_cloud_frames_keep_local_frames() {
    let dir = TempDir::new().unwrap();
    let local = seeded_local(&dir).await;
    local
        .save_frames(&[Frame {
            id: "local".into(),
            name: "Local".into(),
            url: "frames/local.png".into(),
            is_ai_generated: None,
        }])
        .await
        .unwrap();

    let memory = Arc::new(MemoryStore::with_document(json!({ "frames": [] })));
    let sync = ConfigSync::load(local, CloudServices::new(memory.clone(), memory)).await;
    let merged = sync.reconcile().await.unwrap();

    assert_eq!(merged.frames.len(), 1);
    assert_eq!(merged.frames[0].id, "local");
    assert_eq!(merged.theme.event_title, "Local Event");
}

#[tokio::test]
async fn test_concurrent_increments_are_not_lost() {
    let memory = MemoryStore::new();
    let creds = credentials();

    let (a, b) = tokio::join!(
        memory.increment_counter(&creds),
        memory.increment_counter(&creds)
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(memory.counter(), Some(2));
}

#[tokio::test]
async fn test_concurrent_sessions_count_twice() {
    let dir = TempDir::new().unwrap();
    let local = seeded_local(&dir).await;
    let (cloud, memory) = CloudServices::in_memory();
    let sync = ConfigSync::load(local, cloud).await;

    let (a, b) = tokio::join!(
        sync.record_completed_session(),
        sync.record_completed_session()
    );
    assert!(a.mirrored && b.mirrored);
    assert_ne!(a.total, b.total);

    sync.flush().await;
    assert_eq!(sync.stats().total_photos, 2);
    assert_eq!(memory.counter(), Some(2));
    assert_eq!(LocalStore::new(dir.path()).load_stats().await.total_photos, 2);
}

#[tokio::test]
async fn test_publish_promotes_embedded_assets() {
    let dir = TempDir::new().unwrap();
    let local = seeded_local(&dir).await;
    let png = vec![0x89, b'P', b'N', b'G', 1, 2, 3];
    local
        .save_frames(&[Frame {
            id: "f9".into(),
            name: "Fresh".into(),
            url: to_data_uri("image/png", &png),
            is_ai_generated: Some(true),
        }])
        .await
        .unwrap();

    let (cloud, memory) = CloudServices::in_memory();
    let sync = ConfigSync::load(local, cloud).await;
    let published = sync.publish().await.unwrap();

    assert_eq!(published.frames[0].url, "memory://assets/frames/f9.png");
    assert_eq!(memory.blob("assets/frames/f9.png"), Some(png));
    assert!(published.updated_at.is_some());

    // No data URI reaches the document
    let document = memory.document().unwrap().to_string();
    assert!(!document.contains("data:"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stored_counter_matches_memory_under_contention() {
    for _ in 0..20 {
        let dir = TempDir::new().unwrap();
        let (cloud, _) = CloudServices::in_memory();
        let sync = ConfigSync::load(LocalStore::new(dir.path()), cloud).await;

        let sessions: Vec<_> = (0..8)
            .map(|_| {
                let sync = Arc::clone(&sync);
                tokio::spawn(async move { sync.record_completed_session().await })
            })
            .collect();
        for session in sessions {
            session.await.unwrap();
        }

        assert_eq!(sync.stats().total_photos, 8);
        assert_eq!(
            LocalStore::new(dir.path()).load_stats().await.total_photos,
            8
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reconcile_does_not_rewind_session_counter() {
    let dir = TempDir::new().unwrap();
    let local = seeded_local(&dir).await;
    let memory = Arc::new(MemoryStore::with_document(json!({
        "stats": { "totalPhotos": 10 }
    })));
    let sync = ConfigSync::load(local, CloudServices::new(memory.clone(), memory)).await;

    let reconcile = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move { sync.reconcile().await })
    };
    let session = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move { sync.record_completed_session().await })
    };
    reconcile.await.unwrap().unwrap();
    session.await.unwrap();
    sync.flush().await;

    // Whatever the interleaving, the file holds the last in-memory value
    assert_eq!(
        LocalStore::new(dir.path()).load_stats().await,
        sync.stats()
    );
}
