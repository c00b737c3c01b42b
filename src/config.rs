// SPDX-License-Identifier: GPL-3.0-only

//! Kiosk configuration records
//!
//! These are the records the branding/administration side produces and the
//! capture pipeline consumes. They are stored locally as JSON and mirrored to
//! the cloud document store, so field names stay camelCase on the wire.

use crate::backends::remix::RemixStyle;
use crate::constants;
use crate::pipelines::photo::OutputCanvas;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Cloud project credentials (Firebase web config)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_id: Option<String>,
}

impl FirebaseConfig {
    /// Enough to reach the document store
    pub fn is_usable(&self) -> bool {
        !self.api_key.is_empty() && !self.project_id.is_empty()
    }

    /// Enough to reach the blob store
    pub fn has_storage(&self) -> bool {
        !self.api_key.is_empty() && !self.storage_bucket.is_empty()
    }
}

/// A decorative frame overlay
///
/// `url` is either a self-contained `data:` URI (freshly added in the admin
/// editor), an http(s) URL (after promotion to the blob store) or a local path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_ai_generated: Option<bool>,
}

/// Usage counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminStats {
    pub total_photos: u64,
}

/// Per-element font sizes in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FontSizes {
    pub title: f32,
    pub subtitle: f32,
    pub badge: f32,
    pub button: f32,
    pub result_title: f32,
    pub result_subtitle: f32,
    pub loading_text: f32,
    pub qr_title: f32,
    pub qr_subtitle: f32,
}

impl Default for FontSizes {
    fn default() -> Self {
        Self {
            title: 60.0,
            subtitle: 24.0,
            badge: 16.0,
            button: 18.0,
            result_title: 48.0,
            result_subtitle: 20.0,
            loading_text: 30.0,
            qr_title: 32.0,
            qr_subtitle: 16.0,
        }
    }
}

/// Badge shown on the home screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoBadge {
    pub id: String,
    #[serde(default)]
    pub icon_type: String,
    #[serde(default)]
    pub top_text: String,
    #[serde(default)]
    pub bottom_text: String,
}

/// Branding, labels, hardware preference and cloud credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThemeConfig {
    pub event_title: String,
    pub event_subtitle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loading_icon_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_image_url: Option<String>,
    pub primary_color: String,
    pub background_color: String,
    pub font_family: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_sizes: Option<FontSizes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_camera_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firebase_config: Option<FirebaseConfig>,
    pub top_badge_text: String,
    pub shoot_with_mascot_text: String,
    pub capture_button_text: String,
    pub upload_button_text: String,
    pub congrats_text: String,
    pub result_instructions: String,
    pub download_button_text: String,
    pub retake_button_text: String,
    pub qr_scan_text: String,
    pub info_badges: Vec<InfoBadge>,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            event_title: "AI PHOTO BOOTH".to_string(),
            event_subtitle: "Snap a photo with Aiyogu".to_string(),
            logo_url: None,
            loading_icon_url: None,
            background_image_url: None,
            primary_color: "#00f3ff".to_string(),
            background_color: "#020617".to_string(),
            font_family: "Inter, sans-serif".to_string(),
            font_sizes: Some(FontSizes::default()),
            preferred_camera_id: None,
            firebase_config: None,
            top_badge_text: "CREATIVE AI CONTEST".to_string(),
            shoot_with_mascot_text: "Take a photo with Aiyogu".to_string(),
            capture_button_text: "CAPTURE".to_string(),
            upload_button_text: "UPLOAD".to_string(),
            congrats_text: "Looking great!".to_string(),
            result_instructions: "Scan to open the photo on your phone".to_string(),
            download_button_text: "DOWNLOAD".to_string(),
            retake_button_text: "RETAKE".to_string(),
            qr_scan_text: "SCAN QR CODE".to_string(),
            info_badges: Vec::new(),
        }
    }
}

impl ThemeConfig {
    /// Credentials, if they are complete enough to reach the document store
    pub fn cloud_credentials(&self) -> Option<&FirebaseConfig> {
        self.firebase_config.as_ref().filter(|c| c.is_usable())
    }

    /// Font sizes with defaults applied
    pub fn fonts(&self) -> FontSizes {
        self.font_sizes.unwrap_or_default()
    }
}

/// Fill missing or blank theme sub-fields with their defaults
///
/// Called once wherever a theme enters the process (local load, cloud merge),
/// so consumers never need their own fallbacks.
pub fn fill_defaults(mut theme: ThemeConfig) -> ThemeConfig {
    let defaults = ThemeConfig::default();

    fn fill(value: &mut String, default: String) {
        if value.trim().is_empty() {
            *value = default;
        }
    }

    fill(&mut theme.event_title, defaults.event_title);
    fill(&mut theme.event_subtitle, defaults.event_subtitle);
    fill(&mut theme.primary_color, defaults.primary_color);
    fill(&mut theme.background_color, defaults.background_color);
    fill(&mut theme.font_family, defaults.font_family);
    fill(&mut theme.top_badge_text, defaults.top_badge_text);
    fill(&mut theme.shoot_with_mascot_text, defaults.shoot_with_mascot_text);
    fill(&mut theme.capture_button_text, defaults.capture_button_text);
    fill(&mut theme.upload_button_text, defaults.upload_button_text);
    fill(&mut theme.congrats_text, defaults.congrats_text);
    fill(&mut theme.result_instructions, defaults.result_instructions);
    fill(&mut theme.download_button_text, defaults.download_button_text);
    fill(&mut theme.retake_button_text, defaults.retake_button_text);
    fill(&mut theme.qr_scan_text, defaults.qr_scan_text);

    if theme.font_sizes.is_none() {
        theme.font_sizes = defaults.font_sizes;
    }

    // Empty strings from old editors mean "not set"
    for url in [
        &mut theme.logo_url,
        &mut theme.loading_icon_url,
        &mut theme.background_image_url,
        &mut theme.preferred_camera_id,
    ] {
        if url.as_deref().is_some_and(|u| u.trim().is_empty()) {
            *url = None;
        }
    }

    theme
}

/// UI language
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Vi,
    En,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::Vi => "vi",
            Language::En => "en",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "vi" => Some(Language::Vi),
            "en" => Some(Language::En),
            _ => None,
        }
    }
}

/// The unit of cloud reconciliation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigSnapshot {
    pub frames: Vec<Frame>,
    pub theme: ThemeConfig,
    pub stats: AdminStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Pick the frame to composite with
///
/// Falls back to the first frame when the selection is unset or no longer exists.
pub fn select_frame<'a>(frames: &'a [Frame], selected: Option<&str>) -> Option<&'a Frame> {
    selected
        .and_then(|id| frames.iter().find(|f| f.id == id))
        .or_else(|| frames.first())
}

/// Runtime policy of this kiosk (not synced to the cloud)
#[derive(Debug, Clone)]
pub struct KioskSettings {
    /// Seconds on the result screen before the automatic retake
    pub auto_reset_secs: u64,
    /// Countdown ticks before capture
    pub countdown_ticks: u32,
    /// Remix instruction set
    pub remix_style: RemixStyle,
    /// Remix submission width bound
    pub remix_max_width: u32,
    /// Remix submission JPEG quality
    pub remix_quality: u8,
    /// Output canvas strategy for captures and composites
    pub canvas: OutputCanvas,
    /// Remix API base URL
    pub remix_endpoint: String,
    /// Remix model name
    pub remix_model: String,
    /// Remix API key
    pub remix_api_key: Option<String>,
    /// Local durable store and saved composites
    pub data_dir: PathBuf,
    /// Device forced from the command line; wins over the theme preference
    pub camera_override: Option<String>,
}

impl Default for KioskSettings {
    fn default() -> Self {
        Self {
            auto_reset_secs: constants::session::AUTO_RESET_SECS,
            countdown_ticks: constants::session::COUNTDOWN_TICKS,
            remix_style: RemixStyle::default(),
            remix_max_width: constants::remix::MAX_WIDTH,
            remix_quality: constants::remix::JPEG_QUALITY,
            canvas: OutputCanvas::default(),
            remix_endpoint: constants::remix::DEFAULT_ENDPOINT.to_string(),
            remix_model: constants::remix::DEFAULT_MODEL.to_string(),
            remix_api_key: None,
            data_dir: default_data_dir(),
            camera_override: None,
        }
    }
}

impl KioskSettings {
    /// Defaults plus the remix API key from the environment
    pub fn from_env() -> Self {
        let remix_api_key = constants::remix::API_KEY_ENV
            .iter()
            .find_map(|name| std::env::var(name).ok())
            .filter(|key| !key.trim().is_empty());

        Self {
            remix_api_key,
            ..Self::default()
        }
    }

    /// Directory receiving locally saved composites
    pub fn photos_dir(&self) -> PathBuf {
        self.data_dir.join(constants::local_store::PHOTOS_DIR)
    }

    /// Device to open given the theme's preference
    pub fn preferred_device(&self, theme: &ThemeConfig) -> Option<String> {
        self.camera_override
            .clone()
            .or_else(|| theme.preferred_camera_id.clone())
    }
}

/// Default data directory (`$XDG_DATA_HOME/photobooth`)
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(constants::local_store::APP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: &str) -> Frame {
        Frame {
            id: id.to_string(),
            name: id.to_string(),
            url: format!("https://example.com/{id}.png"),
            is_ai_generated: None,
        }
    }

    #[test]
    fn test_fill_defaults_restores_blank_fields() {
        let theme = ThemeConfig {
            event_title: "  ".into(),
            font_sizes: None,
            logo_url: Some(String::new()),
            ..ThemeConfig::default()
        };
        let filled = fill_defaults(theme);
        assert_eq!(filled.event_title, ThemeConfig::default().event_title);
        assert_eq!(filled.font_sizes, Some(FontSizes::default()));
        assert_eq!(filled.logo_url, None);
    }

    #[test]
    fn test_fill_defaults_keeps_set_fields() {
        let theme = ThemeConfig {
            event_title: "Expo 2026".into(),
            preferred_camera_id: Some("/dev/video2".into()),
            ..ThemeConfig::default()
        };
        let filled = fill_defaults(theme);
        assert_eq!(filled.event_title, "Expo 2026");
        assert_eq!(filled.preferred_camera_id.as_deref(), Some("/dev/video2"));
    }

    #[test]
    fn test_partial_theme_deserializes_with_defaults() {
        let theme: ThemeConfig =
            serde_json::from_str(r#"{"eventTitle":"Booth","fontSizes":{"title":72}}"#).unwrap();
        assert_eq!(theme.event_title, "Booth");
        let fonts = theme.fonts();
        assert_eq!(fonts.title, 72.0);
        assert_eq!(fonts.subtitle, FontSizes::default().subtitle);
    }

    #[test]
    fn test_theme_wire_names_are_camel_case() {
        let theme = ThemeConfig {
            firebase_config: Some(FirebaseConfig {
                api_key: "k".into(),
                project_id: "p".into(),
                ..Default::default()
            }),
            ..ThemeConfig::default()
        };
        let json = serde_json::to_value(&theme).unwrap();
        assert_eq!(json["firebaseConfig"]["apiKey"], "k");
        assert!(json.get("eventTitle").is_some());
    }

    #[test]
    fn test_cloud_credentials_require_key_and_project() {
        let mut theme = ThemeConfig::default();
        assert!(theme.cloud_credentials().is_none());
        theme.firebase_config = Some(FirebaseConfig {
            api_key: "k".into(),
            ..Default::default()
        });
        assert!(theme.cloud_credentials().is_none());
        theme.firebase_config.as_mut().unwrap().project_id = "p".into();
        assert!(theme.cloud_credentials().is_some());
    }

    #[test]
    fn test_select_frame_falls_back_to_first() {
        let frames = vec![frame("a"), frame("b")];
        assert_eq!(select_frame(&frames, Some("b")).unwrap().id, "b");
        assert_eq!(select_frame(&frames, Some("gone")).unwrap().id, "a");
        assert_eq!(select_frame(&frames, None).unwrap().id, "a");
        assert!(select_frame(&[], Some("a")).is_none());
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::from_code("en"), Some(Language::En));
        assert_eq!(Language::from_code("fr"), None);
        assert_eq!(Language::default().code(), "vi");
    }
}
