// SPDX-License-Identifier: MPL-2.0

//! Persistence
//!
//! - [`local`]: JSON files under the data directory, always written first
//! - [`sync`]: in-memory configuration, cloud reconciliation and stats
//! - [`assets`]: blob promotion and the session composite lifecycle

pub mod assets;
pub mod local;
pub mod sync;

pub use assets::{CloudAssetRef, delete_session_composite, upload_session_composite};
pub use local::{LocalStore, list_photos};
pub use sync::{ConfigSync, SessionRecorded, merge_snapshot};
