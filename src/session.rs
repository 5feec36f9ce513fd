use zeroize::Zeroizing;

/// Credential held by an authenticated caller.
///
/// The token is opaque: it is only ever forwarded as a bearer header. The
/// subscription identity is supplied alongside it by whoever issued the
/// session, never parsed out of the token.
#[derive(Clone)]
pub struct Session {
    token: Zeroizing<String>,
    user_id: Option<String>,
}

impl Session {
    pub fn new(token: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            token: Zeroizing::new(token.into()),
            user_id: user_id.filter(|id| !id.trim().is_empty()),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token.as_str())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}
