use keystone_infra::SessionToken;

/// Authenticated caller of a request, resolved from its session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    username: String,
    session: SessionToken,
}

impl PrincipalContext {
    pub fn new(username: String, session: SessionToken) -> Self {
        Self { username, session }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn session(&self) -> &SessionToken {
        &self.session
    }
}
