//! Server configuration and access-token resolution.

use std::fmt;
use std::path::{Path, PathBuf};

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Environment variable consulted when no explicit token or env override is
/// configured.
pub const DEFAULT_TOKEN_ENV: &str = "AUTHTUNNEL_TOKEN";

/// Environment variable holding the upstream proxy for the operator-driven
/// browser.
pub const PROXY_ENV: &str = "BROWSER_PROXY";

/// Tunnel server configuration.
///
/// Loaded from a JSON5 file with `${ENV_VAR}` substitution before parsing.
/// Every field has a default, so an absent file yields a working localhost
/// setup. The config is constructed once at startup and handed to the server
/// instance; nothing here is process-global.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port the HTTP/WebSocket server listens on.
    pub port: u16,

    /// Bind host.
    pub host: String,

    /// Path to the browser executable. `None` lets the automation layer
    /// discover an installed Chromium.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<String>,

    /// Where the captured session artifact is written. Shared paths across
    /// connections are uncoordinated: last write wins.
    pub session_file: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_env: Option<String>,

    /// Upstream proxy for the operator-driven browser only. The verifier
    /// never uses it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_proxy: Option<String>,

    /// Page opened right after launch, before the operator takes over.
    pub start_url: String,

    /// Frame streamer tick interval in milliseconds.
    pub frame_interval_ms: u64,

    pub viewport: ViewportConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 19191,
            host: "127.0.0.1".to_string(),
            executable_path: None,
            session_file: "session.json".to_string(),
            access_token: None,
            access_token_env: None,
            upstream_proxy: None,
            start_url: "https://www.google.com".to_string(),
            frame_interval_ms: 400,
            viewport: ViewportConfig::default(),
        }
    }
}

/// Fixed browser viewport; operators see exactly this many page pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl ServerConfig {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::TunnelError::Io)?;
        let substituted = substitute_env_vars(&raw);

        let config: ServerConfig = json5::from_str(&substituted)
            .map_err(|e| crate::error::TunnelError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Resolve the access token once, at startup: explicit value, then
    /// environment variable, then a freshly generated secret.
    pub fn resolve_access_token(&self) -> AccessToken {
        if let Some(token) = &self.access_token {
            if !token.is_empty() {
                return AccessToken::new(token.clone());
            }
        }
        let env_name = self.access_token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV);
        if let Ok(token) = std::env::var(env_name) {
            if !token.is_empty() {
                return AccessToken::new(token);
            }
        }
        AccessToken::generate()
    }

    /// Resolve the upstream proxy: explicit value first, then `BROWSER_PROXY`.
    pub fn resolve_upstream_proxy(&self) -> Option<String> {
        if let Some(proxy) = &self.upstream_proxy {
            if !proxy.is_empty() {
                return Some(proxy.clone());
            }
        }
        std::env::var(PROXY_ENV).ok().filter(|p| !p.is_empty())
    }

    /// Session artifact path with `~` expanded.
    pub fn session_file_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.session_file).as_ref())
    }

    /// Browser executable path with `~` expanded, if configured.
    pub fn executable(&self) -> Option<PathBuf> {
        self.executable_path
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
    }
}

/// Shared secret gating the HTTP entry point and the live-channel handshake.
///
/// Resolved once per server instance and compared on every gated request.
/// Never expires; there is no rate limiting or lockout.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Generate a random 16-byte hex token.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Constant-time comparison against a supplied token.
    pub fn verify(&self, supplied: &str) -> bool {
        constant_time_eq(&self.0, supplied)
    }

    /// The raw secret, needed for the access link printed at startup.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 19191);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.session_file, "session.json");
        assert_eq!(config.frame_interval_ms, 400);
        assert_eq!(config.viewport.width, 1280);
        assert_eq!(config.viewport.height, 720);
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let config = ServerConfig::load(Path::new("/nonexistent/authtunnel.json5")).unwrap();
        assert_eq!(config.port, 19191);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ port: 4242, start_url: 'https://example.com' }}").unwrap();

        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.port, 4242);
        assert_eq!(config.start_url, "https://example.com");
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_env_substitution() {
        // SAFETY: test-local variable name, no concurrent reader cares.
        unsafe { std::env::set_var("AUTHTUNNEL_TEST_SUBST", "tok-123") };
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ access_token: \"${{AUTHTUNNEL_TEST_SUBST}}\" }}").unwrap();

        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.access_token.as_deref(), Some("tok-123"));
    }

    #[test]
    fn test_token_explicit_wins() {
        let config = ServerConfig {
            access_token: Some("explicit".into()),
            access_token_env: Some("AUTHTUNNEL_TEST_UNSET".into()),
            ..Default::default()
        };
        assert!(config.resolve_access_token().verify("explicit"));
    }

    #[test]
    fn test_token_env_fallback() {
        unsafe { std::env::set_var("AUTHTUNNEL_TEST_TOKEN", "from-env") };
        let config = ServerConfig {
            access_token_env: Some("AUTHTUNNEL_TEST_TOKEN".into()),
            ..Default::default()
        };
        assert!(config.resolve_access_token().verify("from-env"));
    }

    #[test]
    fn test_token_generated_when_unconfigured() {
        let config = ServerConfig {
            access_token_env: Some("AUTHTUNNEL_TEST_NEVER_SET".into()),
            ..Default::default()
        };
        let token = config.resolve_access_token();
        assert_eq!(token.expose().len(), 32);
        assert!(token.expose().chars().all(|c| c.is_ascii_hexdigit()));
        // Two resolutions must not collide.
        assert_ne!(token.expose(), config.resolve_access_token().expose());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("hello", "hello"));
        assert!(!constant_time_eq("hello", "world"));
        assert!(!constant_time_eq("hello", "hell"));
    }

    #[test]
    fn test_verify_rejects_empty() {
        let token = AccessToken::new("secret");
        assert!(!token.verify(""));
    }
}
