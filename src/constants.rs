// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Output geometry shared by capture, remix normalisation and compositing
pub mod geometry {
    /// Portrait 4:5 output ratio (width / height)
    pub const TARGET_RATIO_NUM: u32 = 4;
    pub const TARGET_RATIO_DEN: u32 = 5;

    /// Canvas used by the fixed-canvas output strategy
    pub const FIXED_CANVAS_WIDTH: u32 = 1080;
    pub const FIXED_CANVAS_HEIGHT: u32 = 1350;

    /// Resolution requested from capture devices (devices fall back to their best mode)
    pub const RESOLUTION_HINT: (u32, u32) = (3840, 2160);
}

/// Session state machine timing
pub mod session {
    use super::Duration;

    /// Countdown ticks shown before the frame is grabbed (3, 2, 1)
    pub const COUNTDOWN_TICKS: u32 = 3;

    /// Interval between countdown ticks
    pub const COUNTDOWN_INTERVAL: Duration = Duration::from_secs(1);

    /// Seconds the result stays on screen before the kiosk resets itself
    pub const AUTO_RESET_SECS: u64 = 20;

    /// Upper bound for the best-effort blob delete issued on retake
    pub const DELETE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Capacity of the controller input channel
    pub const INPUT_CHANNEL_CAPACITY: usize = 32;
}

/// Remote remix request shaping
pub mod remix {
    use super::Duration;

    /// Width bound applied before submission
    pub const MAX_WIDTH: u32 = 1024;

    /// JPEG quality of the submitted capture
    pub const JPEG_QUALITY: u8 = 80;

    /// Default generative model
    pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

    /// Default API base URL
    pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

    /// Environment variables consulted for the API key, in order
    pub const API_KEY_ENV: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

    /// Request timeout for one remix attempt
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);
}

/// Cloud document/blob store layout
pub mod cloud {
    use super::Duration;

    /// Collection and document holding the kiosk configuration
    pub const SETTINGS_COLLECTION: &str = "settings";
    pub const SETTINGS_DOCUMENT: &str = "global";

    /// Field path of the shared photo counter
    pub const COUNTER_FIELD: &str = "stats.totalPhotos";

    /// Prefix of uploaded session photos
    pub const PHOTO_PREFIX: &str = "photos/booth";

    pub const FIRESTORE_BASE: &str = "https://firestore.googleapis.com/v1";
    pub const STORAGE_BASE: &str = "https://firebasestorage.googleapis.com/v0";

    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Local durable store layout
pub mod local_store {
    pub const APP_DIR: &str = "photobooth";
    pub const FRAMES_FILE: &str = "frames.json";
    pub const THEME_FILE: &str = "theme.json";
    pub const STATS_FILE: &str = "stats.json";
    pub const LANGUAGE_FILE: &str = "language";
    pub const PHOTOS_DIR: &str = "photos";
    pub const LOG_FILE: &str = "kiosk.log";
}

/// Encoder quality settings
pub mod encoding {
    /// Final composites are written at the codec's maximum quality
    pub const COMPOSITE_JPEG_QUALITY: u8 = 100;
}

/// Capture device timing
pub mod device {
    use super::Duration;

    /// Frames to discard while the sensor settles after opening
    pub const WARMUP_FRAMES: u32 = 5;

    /// How long to wait for the first frame before declaring the device unusable
    pub const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(5);

    /// Buffers requested from the V4L2 driver
    pub const STREAM_BUFFERS: u32 = 4;
}

/// Terminal kiosk refresh
pub mod terminal {
    use super::Duration;

    pub const POLL_INTERVAL: Duration = Duration::from_millis(33);
}
