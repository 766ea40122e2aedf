//! Request authentication context and API secret matching.

use subtle::ConstantTimeEq;

use crate::config::AuthApiSecret;

/// Authentication context attached to each request by the auth middleware.
#[derive(Debug, Clone, Default)]
pub struct Auth {
    /// Identifier of the matched API secret, when authenticated
    pub id: Option<String>,
}

impl Auth {
    /// Context for an authenticated request.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
        }
    }

    /// Context used when authentication is disabled.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.id.is_some()
    }
}

/// Match a presented token against the configured API secrets.
///
/// Comparison is constant-time per secret; every configured secret is
/// checked regardless of earlier matches so timing does not leak which
/// entry matched.
pub fn match_api_secret_id<'a>(token: &str, secrets: &'a [AuthApiSecret]) -> Option<&'a str> {
    let mut matched = None;
    for entry in secrets {
        if entry
            .secret
            .as_bytes()
            .ct_eq(token.as_bytes())
            .unwrap_u8()
            == 1
        {
            matched = Some(entry.id.as_str());
        }
    }
    matched
}
