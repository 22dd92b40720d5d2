use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maps a bearer credential to the member it was issued to
#[mockall::automock]
#[async_trait::async_trait]
pub trait IdentityPort: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Principal, Error>;
}

/// Role granted to the holder of a credential
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Operator of the marketplace, may credit points to any member
    Admin,
}

/// Authenticated caller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub member_id: Uuid,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn member(member_id: Uuid) -> Self {
        Self {
            member_id,
            roles: Vec::new(),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The credential is malformed, expired, or was not issued by us
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// Concrete adapter errors
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
