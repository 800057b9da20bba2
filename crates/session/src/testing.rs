//! Credential minting for unit tests.

use chrono::{DateTime, Utc};
use cybertrain_auth::Role;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::json;

pub(crate) const TEST_SECRET: &[u8] = b"test-secret";

pub(crate) fn mint(sub: &str, role: Option<Role>, expires_at: DateTime<Utc>) -> String {
    let mut claims = json!({
        "sub": sub,
        "email": format!("{sub}@example.com"),
        "name": format!("User {sub}"),
        "exp": expires_at.timestamp(),
    });
    if let Some(role) = role {
        claims["role"] = json!(role.as_str());
    }

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET),
    )
    .expect("failed to encode jwt")
}
