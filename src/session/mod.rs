// SPDX-License-Identifier: GPL-3.0-only

//! Capture session state machine
//!
//! One [`CaptureSession`] is live at a time. The controller composes the
//! device manager, remix client, composite pipeline and persistence into
//! its lifecycle and publishes a [`SessionView`] after every change.

pub mod controller;
pub mod state;

pub use controller::{SessionCommand, SessionHandle, SessionServices, Transition, spawn};
pub use state::{CaptureSession, QrPayload, SessionId, SessionState, SessionView};
