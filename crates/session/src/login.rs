//! Login call boundary.
//!
//! This is the one backend call that never goes through the interceptor: it
//! runs without a credential and its 4xx answers mean "wrong password", not
//! "session expired".

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::join_url;
use crate::error::{SessionError, SessionResult};

pub const LOGIN_ENDPOINT: &str = "/api/auth/login";

/// How the backend should check the password.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    #[default]
    Email,
    Ldap,
}

impl FromStr for LoginMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "email" => Ok(LoginMethod::Email),
            "ldap" => Ok(LoginMethod::Ldap),
            other => Err(format!("unknown login method '{other}' (expected email or ldap)")),
        }
    }
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub login_method: LoginMethod,
}

impl core::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("login_method", &self.login_method)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
}

/// Client for the authentication endpoint.
#[derive(Debug, Clone)]
pub struct LoginClient {
    http: reqwest::Client,
    endpoint: String,
}

impl LoginClient {
    pub fn new(http: reqwest::Client, api_base_url: &str) -> Self {
        Self {
            http,
            endpoint: join_url(api_base_url, LOGIN_ENDPOINT),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Submit credentials and return the issued bearer credential.
    pub async fn request_token(&self, request: &LoginRequest) -> SessionResult<String> {
        let resp = self.http.post(&self.endpoint).json(request).send().await?;

        let status = resp.status();
        if !status.is_success() {
            tracing::info!(status = status.as_u16(), email = %request.email, "login refused");
            return Err(SessionError::InvalidCredentials {
                status: status.as_u16(),
            });
        }

        let body: LoginResponse = resp
            .json()
            .await
            .map_err(|e| SessionError::UnexpectedResponse(e.to_string()))?;

        Ok(body.access_token)
    }
}
