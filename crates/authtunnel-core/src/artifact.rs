//! The captured session artifact — cookies plus serialized client storage.
//!
//! Written wholesale on every capture; no merging, no versioning. Consumed
//! by unattended automation (see `authtunnel-verify`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TunnelError};

/// One cookie as captured from the browsing context.
///
/// Only `name` and `value` are required so hand-written artifacts stay
/// loadable; everything else survives a round trip when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
    pub name: String,
    pub value: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Expiry as seconds since the epoch; session cookies omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,

    /// Injection scope hint for cookies that carry no domain; filled by
    /// consumers (the verifier uses the target URL), never captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Snapshot of an authenticated session, produced fresh on every capture.
///
/// `storage` is the page's `localStorage` serialized to a JSON string by an
/// in-page expression; it is stored opaquely and never merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapturedSession {
    pub cookies: Vec<CookieRecord>,
    pub storage: String,
}

impl CapturedSession {
    /// Write the artifact, fully overwriting any previous content.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Load an artifact. A missing file is a distinct error so callers can
    /// fail before allocating any browser resources.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TunnelError::ArtifactMissing(path.to_path_buf()));
        }
        let raw = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&raw)?)
    }
}
