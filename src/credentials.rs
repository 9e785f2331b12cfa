use std::sync::Arc;

/// Credentials attached to an outgoing request.
///
/// Cookie sessions are first-class because cloud servers hand sync clients a
/// session cookie after the initial login flow.
#[derive(Debug, Clone)]
pub enum Credentials {
    Basic { username: String, password: String },
    Bearer(String),
    Cookie(String),
}

/// Read-only source of the current credentials.
///
/// The engine only ever reads from the store to attach auth to a request; it
/// never mutates it. When a request comes back with a credential failure the
/// caller refreshes the store and retries on its own terms.
pub trait CredentialStore: Send + Sync {
    fn current(&self) -> Credentials;
}

/// Fixed credentials, for hosts that keep refresh logic elsewhere.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    credentials: Credentials,
}

impl StaticCredentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            credentials: Credentials::Basic {
                username: username.into(),
                password: password.into(),
            },
        })
    }

    pub fn bearer(token: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            credentials: Credentials::Bearer(token.into()),
        })
    }

    pub fn cookie(cookie: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            credentials: Credentials::Cookie(cookie.into()),
        })
    }
}

impl CredentialStore for StaticCredentials {
    fn current(&self) -> Credentials {
        self.credentials.clone()
    }
}
