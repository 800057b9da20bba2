use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Role;

/// Identity of the authenticated subject (`sub` claim).
///
/// The backend issues either a numeric user id or an email here, so this is
/// kept as an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Claims extracted from a bearer credential.
///
/// Only [`crate::decode`] constructs this from a credential; a string that
/// fails to decode never yields a `ClaimSet`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSet {
    /// Subject / user identifier.
    pub subject: SubjectId,

    pub email: Option<String>,

    /// Display name.
    pub name: Option<String>,

    /// `None` when the backend issued a token without a role claim.
    pub role: Option<Role>,

    /// Expiration instant (`exp`).
    pub expires_at: DateTime<Utc>,
}

impl ClaimSet {
    /// `true` once `now` has reached the expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }
}
