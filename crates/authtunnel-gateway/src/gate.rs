//! Access gate — shared-secret check on the HTTP entry point and the
//! live-channel handshake.

use serde::Deserialize;

use authtunnel_core::config::AccessToken;

/// `token` query parameter carried on `/` and on the `/ws` handshake.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// Verify a supplied token against the instance secret.
///
/// Absent tokens are denied outright. Nothing is served and no browser
/// resource is allocated before this passes. No rate limiting, no lockout.
pub fn verify_access(token: &AccessToken, supplied: Option<&str>) -> bool {
    supplied.is_some_and(|t| token.verify(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_token_allowed() {
        let token = AccessToken::new("secret");
        assert!(verify_access(&token, Some("secret")));
    }

    #[test]
    fn test_wrong_token_denied() {
        let token = AccessToken::new("secret");
        assert!(!verify_access(&token, Some("Secret")));
        assert!(!verify_access(&token, Some("secret ")));
        assert!(!verify_access(&token, Some("")));
    }

    #[test]
    fn test_missing_token_denied() {
        let token = AccessToken::new("secret");
        assert!(!verify_access(&token, None));
    }
}
