// SPDX-License-Identifier: MPL-2.0

//! Photobooth - a walk-up photo kiosk
//!
//! This library provides the capture-process-sync pipeline of the kiosk:
//! camera capture, the generative mascot remix, frame compositing and the
//! local-first configuration with cloud hand-off.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera, remix service and cloud store abstractions
//! - [`pipelines`]: Crop, composite and encode
//! - [`session`]: The capture state machine
//! - [`storage`]: Local durable store, cloud sync and blob assets
//! - [`config`]: Configuration records and kiosk settings
//! - [`kiosk`]: Wiring of all of the above
//!
//! # Example
//!
//! ```ignore
//! // Typically run via:
//! // photobooth kiosk
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod kiosk;
pub mod pipelines;
pub mod session;
pub mod storage;
pub mod terminal;

// Re-export commonly used types
pub use config::{ConfigSnapshot, KioskSettings, ThemeConfig};
pub use errors::{AppError, AppResult};
pub use kiosk::Kiosk;
pub use session::{SessionHandle, SessionState, SessionView};
