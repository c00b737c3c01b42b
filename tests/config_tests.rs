// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use photobooth::config::{
    ConfigSnapshot, Frame, KioskSettings, Language, ThemeConfig, fill_defaults, select_frame,
};
use photobooth::pipelines::photo::OutputCanvas;
use photobooth::storage::LocalStore;
use tempfile::TempDir;

#[test]
fn test_settings_default() {
    // Test that default settings can be created
    let settings = KioskSettings::default();

    // Check sensible defaults
    assert_eq!(settings.auto_reset_secs, 20);
    assert_eq!(settings.countdown_ticks, 3);
    assert_eq!(
        settings.canvas,
        OutputCanvas::Source,
        "Captures keep the source resolution by default"
    );
    assert!(settings.camera_override.is_none());
}

#[test]
fn test_camera_override_wins_over_theme() {
    let theme = ThemeConfig {
        preferred_camera_id: Some("/dev/video0".into()),
        ..ThemeConfig::default()
    };
    let mut settings = KioskSettings::default();
    assert_eq!(settings.preferred_device(&theme).as_deref(), Some("/dev/video0"));

    settings.camera_override = Some("/dev/video4".into());
    assert_eq!(settings.preferred_device(&theme).as_deref(), Some("/dev/video4"));
}

#[test]
fn test_default_theme_is_complete() {
    // Test that every label has a value after defaults are applied
    let theme = fill_defaults(ThemeConfig::default());
    assert!(!theme.event_title.is_empty());
    assert!(!theme.capture_button_text.is_empty());
    assert!(!theme.retake_button_text.is_empty());
    assert!(theme.font_sizes.is_some());
    assert!(theme.cloud_credentials().is_none());
}

#[test]
fn test_frame_selection_falls_back_to_first() {
    let frames: Vec<Frame> = ["a", "b"]
        .iter()
        .map(|id| Frame {
            id: id.to_string(),
            name: id.to_uppercase(),
            url: format!("frames/{id}.png"),
            is_ai_generated: None,
        })
        .collect();

    assert_eq!(select_frame(&frames, Some("b")).map(|f| f.id.as_str()), Some("b"));
    assert_eq!(select_frame(&frames, Some("gone")).map(|f| f.id.as_str()), Some("a"));
    assert_eq!(select_frame(&frames, None).map(|f| f.id.as_str()), Some("a"));
    assert!(select_frame(&[], None).is_none());
}

#[test]
fn test_snapshot_wire_names_are_camel_case() {
    let json = serde_json::to_value(ConfigSnapshot::default()).unwrap();
    assert!(json.pointer("/stats/totalPhotos").is_some());
    assert!(json.pointer("/theme/eventTitle").is_some());
}

#[tokio::test]
async fn test_corrupt_local_files_fall_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("theme.json"), "{ not json").unwrap();
    std::fs::write(dir.path().join("language"), "klingon").unwrap();

    let local = LocalStore::new(dir.path());
    let theme = local.load_theme().await;
    assert_eq!(theme, fill_defaults(ThemeConfig::default()));
    assert_eq!(local.load_language().await, Language::default());
}
