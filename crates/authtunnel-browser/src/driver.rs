//! Capability traits for driving one browser process/context/page triple.

use std::path::PathBuf;

use async_trait::async_trait;

use authtunnel_core::artifact::CookieRecord;
use authtunnel_core::error::Result;

/// Chromium flags passed to every launch. The sandbox is never disabled and
/// the set is not configurable; configuring an upstream proxy does not relax
/// it.
pub const LAUNCH_ARGS: &[&str] = &["--disable-dev-shm-usage", "--no-first-run", "--no-zygote"];

/// Identifying string presented by operator-driven pages.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Launch configuration for one browser instance.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub executable: Option<PathBuf>,
    /// Always true in practice; explicit so intent shows at call sites.
    pub headless: bool,
    /// Upstream proxy server, routing only.
    pub proxy: Option<String>,
    pub viewport: (u32, u32),
    pub user_agent: String,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            proxy: None,
            viewport: (1280, 720),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Launches browser instances. One instance per connection, never shared.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Instance>>;
}

/// A running browser process plus its single browsing context.
#[async_trait]
pub trait Instance: Send + Sync {
    /// Open the one page this instance serves.
    async fn new_page(&self) -> Result<Box<dyn Page>>;

    /// Tear down context and process. Must tolerate repeat invocations and
    /// partially-torn-down state without raising.
    async fn close(&mut self) -> Result<()>;
}

/// The single mutable page resource owned by a connection.
#[async_trait]
pub trait Page: Send + Sync {
    /// One compressed raster snapshot of the current page.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn click(&self, x: f64, y: f64) -> Result<()>;

    async fn type_text(&self, text: &str) -> Result<()>;

    async fn press_key(&self, key: &str) -> Result<()>;

    async fn goto(&self, url: &str) -> Result<()>;

    /// All cookies visible to the browsing context.
    async fn cookies(&self) -> Result<Vec<CookieRecord>>;

    async fn set_cookies(&self, cookies: Vec<CookieRecord>) -> Result<()>;

    /// Evaluate an expression in page context and return its JSON value.
    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value>;

    /// Rendered HTML of the current document.
    async fn content(&self) -> Result<String>;
}

/// Normalize an operator-supplied navigation target.
///
/// Targets without a recognizable scheme get `https://` prefixed; a
/// candidate that still does not look like a URL is dropped (`None`), never
/// an error.
pub fn normalize_target_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
        return None;
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Some(trimmed.to_string());
    }
    Some(format!("https://{trimmed}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_insertion() {
        assert_eq!(
            normalize_target_url("example.com").as_deref(),
            Some("https://example.com")
        );
    }

    #[test]
    fn test_explicit_scheme_passthrough() {
        assert_eq!(
            normalize_target_url("http://example.com/login").as_deref(),
            Some("http://example.com/login")
        );
        assert_eq!(
            normalize_target_url("https://example.com").as_deref(),
            Some("https://example.com")
        );
    }

    #[test]
    fn test_garbage_dropped() {
        assert_eq!(normalize_target_url("not a url, no scheme"), None);
        assert_eq!(normalize_target_url(""), None);
        assert_eq!(normalize_target_url("   "), None);
    }

    #[test]
    fn test_surrounding_whitespace_trimmed() {
        assert_eq!(
            normalize_target_url("  example.com  ").as_deref(),
            Some("https://example.com")
        );
    }

    #[test]
    fn test_sandbox_never_relaxed() {
        assert!(!LAUNCH_ARGS.iter().any(|a| a.contains("--no-sandbox")));
    }
}
