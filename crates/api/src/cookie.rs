//! The session cookie.

use std::time::Duration;

use axum::http::{HeaderMap, header};

use keystone_infra::SessionToken;

pub const SESSION_COOKIE: &str = "keystone_session";

pub fn session_cookie(token: &SessionToken, ttl: Duration) -> String {
    format!(
        "{SESSION_COOKIE}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        token.as_str(),
        ttl.as_secs()
    )
}

pub fn cleared_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0")
}

/// The first well-formed session token among the request's cookies.
pub fn session_token(headers: &HeaderMap) -> Option<SessionToken> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| {
            pair.trim()
                .strip_prefix(SESSION_COOKIE)
                .and_then(|rest| rest.strip_prefix('='))
        })
        .find_map(SessionToken::parse)
}
