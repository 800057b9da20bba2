//! Authorization decoration for outbound HTTP calls.
//!
//! Every guarded call goes through [`AuthorizedClient`]: the credential is
//! attached on the way out, and a 401 on the way back clears the session and
//! sends the user to the login view. The server is the final authority on
//! credential validity, so a locally "valid" session is still dropped when the
//! server disagrees (clock skew, revocation).

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response, StatusCode};

use crate::config::join_url;
use crate::error::{SessionError, SessionResult};
use crate::navigator::{Navigator, Redirect};
use crate::store::SessionStore;

/// Session generation a request was issued under, if any.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IssuedUnder(Option<u64>);

impl IssuedUnder {
    pub fn generation(&self) -> Option<u64> {
        self.0
    }
}

/// HTTP client wrapper for every call except the login call itself.
pub struct AuthorizedClient {
    http: reqwest::Client,
    store: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
    api_base_url: String,
    login_path: String,
}

impl AuthorizedClient {
    pub fn new(
        http: reqwest::Client,
        store: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
        api_base_url: impl Into<String>,
        login_path: impl Into<String>,
    ) -> Self {
        Self {
            http,
            store,
            navigator,
            api_base_url: api_base_url.into(),
            login_path: login_path.into(),
        }
    }

    /// Start a request against a backend path.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, join_url(&self.api_base_url, path))
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, path)
    }

    pub fn put(&self, path: &str) -> RequestBuilder {
        self.request(Method::PUT, path)
    }

    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.request(Method::DELETE, path)
    }

    /// Attach the bearer credential when a session is active.
    ///
    /// Without a session the request is passed through unchanged.
    pub fn authorize(&self, request: RequestBuilder) -> (RequestBuilder, IssuedUnder) {
        match self.store.current() {
            Some(session) => (
                request.bearer_auth(session.credential().expose()),
                IssuedUnder(Some(session.generation())),
            ),
            None => (request, IssuedUnder(None)),
        }
    }

    /// React to the server's verdict on a response.
    ///
    /// A 401 clears the session it was issued under and redirects to login,
    /// but only for the call that actually performs that transition: any
    /// number of concurrent failures under one session yield one redirect, and
    /// a failure for a superseded session leaves the newer one alone.
    pub fn inspect(&self, response: Response, issued: IssuedUnder) -> SessionResult<Response> {
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let url = response.url().path().to_string();
        match issued.generation() {
            Some(generation) if self.store.clear_if(generation) => {
                tracing::warn!(generation, path = %url, "server rejected credential; signing out");
                self.navigator.redirect(Redirect::to(self.login_path.clone()));
            }
            generation => {
                tracing::debug!(?generation, path = %url, "401 for a session that is no longer live");
            }
        }

        Err(SessionError::AuthorizationRejected)
    }

    /// Authorize, dispatch and inspect in one step.
    pub async fn send(&self, request: RequestBuilder) -> SessionResult<Response> {
        let (request, issued) = self.authorize(request);
        let response = request.send().await?;
        self.inspect(response, issued)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::clock::ManualClock;
    use crate::navigator::QueuedNavigator;
    use crate::slot::MemorySlot;
    use crate::testing::mint;

    fn fixture() -> (AuthorizedClient, Arc<SessionStore>, Arc<QueuedNavigator>) {
        let clock = ManualClock::new(Utc::now());
        let store = Arc::new(SessionStore::new(
            Arc::new(MemorySlot::new()),
            Arc::new(clock),
        ));
        let navigator = Arc::new(QueuedNavigator::new());
        let client = AuthorizedClient::new(
            reqwest::Client::new(),
            store.clone(),
            navigator.clone(),
            "http://backend.test/",
            "/login",
        );
        (client, store, navigator)
    }

    fn unauthorized() -> Response {
        let response = axum::http::Response::builder()
            .status(401)
            .body(Vec::<u8>::new())
            .unwrap();
        Response::from(response)
    }

    #[test]
    fn attaches_bearer_only_with_session() {
        let (client, store, _) = fixture();

        let (request, issued) = client.authorize(client.get("/api/modules"));
        let request = request.build().unwrap();
        assert_eq!(request.url().as_str(), "http://backend.test/api/modules");
        assert!(request.headers().get("authorization").is_none());
        assert_eq!(issued.generation(), None);

        let token = mint("1", None, Utc::now() + Duration::hours(1));
        let session = store.adopt(token.clone()).unwrap();

        let (request, issued) = client.authorize(client.get("api/modules"));
        let request = request.build().unwrap();
        assert_eq!(
            request.headers().get("authorization").unwrap(),
            &format!("Bearer {token}")
        );
        assert_eq!(issued.generation(), Some(session.generation()));
    }

    #[test]
    fn unauthorized_clears_and_redirects_once() {
        let (client, store, navigator) = fixture();
        let session = store
            .adopt(mint("1", None, Utc::now() + Duration::hours(1)))
            .unwrap();
        let issued = IssuedUnder(Some(session.generation()));

        for _ in 0..3 {
            let result = client.inspect(unauthorized(), issued);
            assert!(matches!(result, Err(SessionError::AuthorizationRejected)));
        }

        assert!(!store.is_authenticated());
        assert_eq!(navigator.drain(), vec![Redirect::to("/login")]);
    }

    #[test]
    fn stale_unauthorized_keeps_newer_session() {
        let (client, store, navigator) = fixture();
        let old = store
            .adopt(mint("1", None, Utc::now() + Duration::hours(1)))
            .unwrap();
        let new = store
            .adopt(mint("2", None, Utc::now() + Duration::hours(1)))
            .unwrap();

        let result = client.inspect(unauthorized(), IssuedUnder(Some(old.generation())));
        assert!(result.is_err());
        assert_eq!(store.current(), Some(new));
        assert!(navigator.is_empty());
    }

    #[test]
    fn unauthenticated_unauthorized_does_not_redirect() {
        let (client, store, navigator) = fixture();
        let result = client.inspect(unauthorized(), IssuedUnder(None));
        assert!(matches!(result, Err(SessionError::AuthorizationRejected)));
        assert!(!store.is_authenticated());
        assert!(navigator.is_empty());
    }

    #[test]
    fn other_statuses_pass_through() {
        let (client, store, navigator) = fixture();
        let session = store
            .adopt(mint("1", None, Utc::now() + Duration::hours(1)))
            .unwrap();

        for status in [200, 403, 404, 500] {
            let response = Response::from(
                axum::http::Response::builder()
                    .status(status)
                    .body(Vec::<u8>::new())
                    .unwrap(),
            );
            let response = client
                .inspect(response, IssuedUnder(Some(session.generation())))
                .unwrap();
            assert_eq!(response.status().as_u16(), status);
        }

        assert!(store.is_authenticated());
        assert!(navigator.is_empty());
    }
}
