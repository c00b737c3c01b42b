// SPDX-License-Identifier: MPL-2.0

//! Processing pipelines
//!
//! Heavy raster work for a session runs here, off the session task, so the
//! live preview and the state machine never block on it.
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Device Frame │ ──▶ │  Photo Pipeline   │ ──▶ │  JPEG File   │
//! │   (RGBA)     │     │  - Crop 4:5       │     │              │
//! │              │     │  - Frame overlay  │     │              │
//! │              │     │  - Encoding       │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`photo`]: crop, composite and encode

pub mod photo;
