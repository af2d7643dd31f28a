use serde::{Deserialize, Serialize};

use super::domain::Office;

/// Role attached to an authenticated caller. Students act only on their own
/// applications; an office actor decides only for its own office; the
/// administrator role is read-only over every queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Office(Office),
    Administrator,
}

/// Verified caller identity supplied by the external auth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub subject: String,
    pub role: Role,
}

/// Opaque credential material; the workflow never inspects it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub actor: Actor,
}

/// External identity service boundary.
pub trait AuthProvider: Send + Sync {
    fn authenticate(&self, credentials: &Credentials) -> Result<Session, AuthError>;
    fn verify(&self, token: &str) -> Result<Actor, AuthError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid or expired token")]
    InvalidToken,
}
