// SPDX-License-Identifier: GPL-3.0-only

//! Raster loading
//!
//! Frame overlays and branding assets are referenced by a string that is
//! either a self-contained `data:` URI, an http(s) URL or a local path.
//! Loading always runs to completion and yields a decoded raster or a
//! [`DecodeError`]; there is no partially loaded state.

use crate::backends::cloud::http_client;
use crate::errors::DecodeError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::RgbaImage;
use tracing::debug;

/// Decoded `data:` URI payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// True when the reference embeds its payload instead of pointing elsewhere
pub fn is_embedded(reference: &str) -> bool {
    reference.starts_with("data:")
}

/// Parse a base64 `data:` URI
pub fn parse_data_uri(reference: &str) -> Result<DataUri, DecodeError> {
    let rest = reference
        .strip_prefix("data:")
        .ok_or(DecodeError::InvalidDataUri)?;
    let (header, payload) = rest.split_once(',').ok_or(DecodeError::InvalidDataUri)?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or(DecodeError::InvalidDataUri)?;

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|_| DecodeError::InvalidDataUri)?;

    Ok(DataUri {
        mime_type: if mime_type.is_empty() {
            "application/octet-stream".to_string()
        } else {
            mime_type.to_string()
        },
        bytes,
    })
}

/// Build a base64 `data:` URI
pub fn to_data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// Decode raster bytes on the blocking pool
pub async fn decode_raster(bytes: Vec<u8>) -> Result<RgbaImage, DecodeError> {
    tokio::task::spawn_blocking(move || {
        image::load_from_memory(&bytes)
            .map(|img| img.to_rgba8())
            .map_err(DecodeError::from)
    })
    .await
    .map_err(|e| DecodeError::Format(format!("Decode task error: {}", e)))?
}

/// Fetch the raw bytes behind a reference
pub async fn fetch_bytes(reference: &str) -> Result<Vec<u8>, DecodeError> {
    if is_embedded(reference) {
        return parse_data_uri(reference).map(|uri| uri.bytes);
    }

    let load_error = |reason: String| DecodeError::Load {
        source_ref: abbreviate(reference),
        reason,
    };

    if reference.starts_with("http://") || reference.starts_with("https://") {
        let response = http_client()
            .get(reference)
            .send()
            .await
            .map_err(|e| load_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(load_error(format!("HTTP {}", response.status())));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| load_error(e.to_string()))?;
        return Ok(bytes.to_vec());
    }

    tokio::fs::read(reference)
        .await
        .map_err(|e| load_error(e.to_string()))
}

/// Load and decode the raster behind a reference
pub async fn load_raster(reference: &str) -> Result<RgbaImage, DecodeError> {
    debug!(source = %abbreviate(reference), "Loading raster");
    let bytes = fetch_bytes(reference).await?;
    decode_raster(bytes).await
}

/// Shorten data URIs for log output
fn abbreviate(reference: &str) -> String {
    if is_embedded(reference) {
        let header = reference.split(',').next().unwrap_or("data:");
        format!("{},…", header)
    } else {
        reference.to_string()
    }
}
