//! Server-lifetime login token.

use rand::distributions::Alphanumeric;
use rand::Rng;

pub const TOKEN_LEN: usize = 15;
pub const CSRF_TOKEN_LEN: usize = 64;

/// Random alphanumeric string of length `n`.
pub fn random_string(n: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(n)
        .map(char::from)
        .collect()
}

/// Compare two secrets without stopping at the first differing byte.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Holds the one secret a browser must present to use the panel.
///
/// The value is fixed at construction and there is no way to replace it.
#[derive(Debug, Clone)]
pub struct TokenStore {
    debug: bool,
    token: Option<String>,
}

impl TokenStore {
    /// Generate a fresh token, or none at all in debug mode.
    pub fn new(debug: bool) -> Self {
        if debug {
            Self::insecure()
        } else {
            Self {
                debug: false,
                token: Some(random_string(TOKEN_LEN)),
            }
        }
    }

    /// Debug mode: no token, every request is let through.
    pub fn insecure() -> Self {
        Self {
            debug: true,
            token: None,
        }
    }

    #[cfg(test)]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            debug: false,
            token: Some(token.into()),
        }
    }

    /// Protected mode whose token was never produced.
    #[cfg(test)]
    pub fn missing() -> Self {
        Self {
            debug: false,
            token: None,
        }
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.token
            .as_deref()
            .is_some_and(|t| constant_time_eq(t.as_bytes(), candidate.as_bytes()))
    }

    /// URL a user opens to authenticate against this server.
    pub fn login_url(&self, base: &str) -> Option<String> {
        self.token
            .as_ref()
            .map(|t| format!("{}/?token={}", base.trim_end_matches('/'), t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_is_alphanumeric_and_fixed_length() {
        let store = TokenStore::new(false);
        let token = store.token().expect("token");
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(store.matches(token));
        assert!(!store.is_debug());
    }

    #[test]
    fn debug_mode_has_no_token() {
        let store = TokenStore::new(true);
        assert!(store.is_debug());
        assert!(store.token().is_none());
        assert!(!store.matches(""));
    }

    #[test]
    fn token_comparison_needs_an_exact_match() {
        let store = TokenStore::with_token("abc123");
        assert!(store.matches("abc123"));
        assert!(!store.matches("abc124"));
        assert!(!store.matches("abc12"));
        assert!(!store.matches("abc1234"));
        assert!(!store.matches(""));
        assert!(constant_time_eq(b"", b""));
        assert!(!constant_time_eq(b"a", b"b"));
    }

    #[test]
    fn login_url_carries_token() {
        let store = TokenStore::with_token("abc");
        assert_eq!(
            store.login_url("http://127.0.0.1:5000/").as_deref(),
            Some("http://127.0.0.1:5000/?token=abc")
        );
        assert!(TokenStore::insecure().login_url("http://x").is_none());
    }
}
