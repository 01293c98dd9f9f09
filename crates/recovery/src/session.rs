//! Recovery session token and its lifetime

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Authorization handed out by the recovery server
///
/// A session lives inside the client that acquired it and is never shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    board_id: Option<String>,
    acquired_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Session {
    /// A session acquired now that lives for `ttl`
    #[must_use]
    pub fn new(token: impl Into<String>, ttl: Duration) -> Self {
        let acquired_at = Utc::now();
        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|ttl| acquired_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::with_expiry(token, acquired_at, expires_at)
    }

    #[must_use]
    pub fn with_expiry(
        token: impl Into<String>,
        acquired_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token: token.into(),
            board_id: None,
            acquired_at,
            expires_at,
        }
    }

    /// Value of the `session` cookie
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The `Cookie` header value that presents this session
    #[must_use]
    pub fn cookie(&self) -> String {
        format!("session={}", self.token)
    }

    /// Board the session was bound to when the product was resolved
    #[must_use]
    pub fn board_id(&self) -> Option<&str> {
        self.board_id.as_deref()
    }

    pub(crate) fn bind_board(&mut self, board_id: &str) {
        self.board_id = Some(board_id.to_string());
    }

    #[must_use]
    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Time left before expiry, zero once expired
    #[must_use]
    pub fn expires_in(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or_default()
    }
}

/// The `session` cookie found in a `Set-Cookie` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SessionCookie {
    pub token: String,
    pub max_age: Option<u64>,
}

/// Extract the session cookie and its `Max-Age` from one `Set-Cookie` value
pub(crate) fn parse_session_cookie(header: &str) -> Option<SessionCookie> {
    let mut parts = header.split(';').map(str::trim);
    let token = parts.next()?.strip_prefix("session=")?;
    if token.is_empty() {
        return None;
    }

    let max_age = parts.find_map(|attribute| {
        let (name, value) = attribute.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("max-age")
            .then(|| value.trim().parse().ok())
            .flatten()
    });

    Some(SessionCookie {
        token: token.to_string(),
        max_age,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_and_max_age() {
        let cookie = parse_session_cookie("session=abc123; Max-Age=900; Path=/; HttpOnly").unwrap();
        assert_eq!(cookie.token, "abc123");
        assert_eq!(cookie.max_age, Some(900));
    }

    #[test]
    fn max_age_is_optional() {
        let cookie = parse_session_cookie("session=abc; Path=/").unwrap();
        assert_eq!(cookie.max_age, None);
    }

    #[test]
    fn ignores_other_cookies() {
        assert!(parse_session_cookie("tracking=1; Path=/").is_none());
        assert!(parse_session_cookie("session=; Path=/").is_none());
    }

    #[test]
    fn expiry_follows_ttl() {
        let session = Session::new("t", Duration::from_secs(60));
        assert!(!session.is_expired());
        assert!(session.expires_in() <= Duration::from_secs(60));
        assert_eq!(session.cookie(), "session=t");

        let now = Utc::now();
        let stale = Session::with_expiry("t", now - TimeDelta::seconds(10), now - TimeDelta::seconds(1));
        assert!(stale.is_expired());
        assert_eq!(stale.expires_in(), Duration::ZERO);
    }
}
