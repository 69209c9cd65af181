//! Cross-origin policy: origins are allowed by regular expression.

use std::time::Duration;

use axum::http::{HeaderValue, Method, header, request::Parts};
use regex::RegexSet;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(172_800);

/// Origins matching any pattern, anchored at both ends.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    patterns: RegexSet,
}

impl OriginPolicy {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let anchored = patterns.iter().map(|p| format!("^(?:{})$", p.as_ref()));
        Ok(Self {
            patterns: RegexSet::new(anchored)?,
        })
    }

    pub fn allows(&self, origin: &str) -> bool {
        self.patterns.is_match(origin)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

pub fn cors_layer(policy: OriginPolicy) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _request: &Parts| {
                origin.to_str().map(|o| policy.allows(o)).unwrap_or(false)
            },
        ))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::CONTENT_LENGTH,
            header::ACCEPT_ENCODING,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::ORIGIN,
            header::CACHE_CONTROL,
        ])
        .max_age(PREFLIGHT_MAX_AGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_must_match_a_whole_pattern() {
        let policy = OriginPolicy::new(&[r"https://([a-z]+\.)?example\.com", r"http://localhost:\d+"]).unwrap();

        assert!(policy.allows("https://example.com"));
        assert!(policy.allows("https://admin.example.com"));
        assert!(policy.allows("http://localhost:5173"));
        assert!(!policy.allows("https://example.com.evil.io"));
        assert!(!policy.allows("https://evil.io/?https://example.com"));
    }

    #[test]
    fn no_patterns_allow_nothing() {
        let policy = OriginPolicy::new::<&str>(&[]).unwrap();
        assert!(policy.is_empty());
        assert!(!policy.allows("https://example.com"));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(OriginPolicy::new(&["("]).is_err());
    }
}
