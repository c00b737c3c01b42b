// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer
//!
//! Everything the kiosk talks to outside the process:
//! - Camera capture via V4L2 (or a still image)
//! - The generative remix service
//! - The cloud document and blob stores
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Capture Session                 │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌─────────────┐    ┌──────────────────┐   │
//! │  │   Camera    │    │      Remix       │   │
//! │  │   (V4L2)    │    │     (Gemini)     │   │
//! │  └─────────────┘    └──────────────────┘   │
//! │                     ┌──────────────────┐   │
//! │                     │      Cloud       │   │
//! │                     │    (Firebase)    │   │
//! │                     └──────────────────┘   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Device enumeration, selection and frame capture
//! - [`remix`]: Remote remix client
//! - [`cloud`]: Document/blob store traits and implementations

pub mod camera;
pub mod cloud;
pub mod remix;
