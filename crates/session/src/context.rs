//! Application-facing authentication context.

use std::sync::{Arc, OnceLock};

use cybertrain_auth::Role;

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::error::SessionResult;
use crate::guard::{GuardDecision, RouteGuard};
use crate::interceptor::AuthorizedClient;
use crate::login::{LoginClient, LoginMethod, LoginRequest};
use crate::monitor::ExpiryMonitor;
use crate::navigator::Navigator;
use crate::slot::CredentialSlot;
use crate::store::{SessionStore, SessionView};

/// Dashboard a signed-in user lands on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Dashboard {
    Admin,
    Employee,
}

/// Owns the session store, the expiry monitor and the single interceptor.
///
/// Construct one per process and hand references to whatever needs session
/// state; nothing here is global.
pub struct AuthContext {
    config: SessionConfig,
    store: Arc<SessionStore>,
    monitor: ExpiryMonitor,
    navigator: Arc<dyn Navigator>,
    guard: RouteGuard,
    login: LoginClient,
    http: reqwest::Client,
    authorized: OnceLock<Arc<AuthorizedClient>>,
}

impl AuthContext {
    /// Restore any persisted session and start the expiry monitor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: SessionConfig,
        slot: Arc<dyn CredentialSlot>,
        clock: Arc<dyn Clock>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let store = Arc::new(SessionStore::new(slot, clock.clone()));
        store.initialize();

        let monitor = ExpiryMonitor::spawn(
            store.clone(),
            config.check_interval(),
            navigator.clone(),
            config.login_path.clone(),
        );
        let guard = RouteGuard::new(config.route_paths(), clock);
        let http = reqwest::Client::new();
        let login = LoginClient::new(http.clone(), &config.api_base_url);

        tracing::info!(
            api = %config.api_base_url,
            authenticated = store.is_authenticated(),
            "auth context started"
        );

        Self {
            config,
            store,
            monitor,
            navigator,
            guard,
            login,
            http,
            authorized: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Submit credentials and adopt the issued credential.
    ///
    /// Errors here are the only ones meant for the user ("invalid
    /// credentials"); the previous session is untouched on failure.
    pub async fn login(
        &self,
        email: impl Into<String>,
        password: impl Into<String>,
        method: LoginMethod,
    ) -> SessionResult<SessionView> {
        let request = LoginRequest {
            email: email.into(),
            password: password.into(),
            login_method: method,
        };

        let token = self.login.request_token(&request).await?;
        let session = self.store.adopt(token)?;
        tracing::info!(
            subject = %session.claims().subject,
            role = ?session.claims().role,
            "logged in"
        );
        Ok(self.current_session())
    }

    pub fn logout(&self) {
        self.store.clear();
        tracing::info!("logged out");
    }

    pub fn current_session(&self) -> SessionView {
        self.store.view()
    }

    /// The interceptor-wrapped HTTP client.
    ///
    /// Created on first use; every later call returns the same instance, so
    /// repeated mounting never stacks wrappers.
    pub fn http(&self) -> Arc<AuthorizedClient> {
        self.authorized
            .get_or_init(|| {
                tracing::debug!("installing authorization interceptor");
                Arc::new(AuthorizedClient::new(
                    self.http.clone(),
                    self.store.clone(),
                    self.navigator.clone(),
                    self.config.api_base_url.clone(),
                    self.config.login_path.clone(),
                ))
            })
            .clone()
    }

    pub fn guard(&self) -> &RouteGuard {
        &self.guard
    }

    /// Run the route guard for `target` against this context's session.
    pub fn evaluate(&self, target: &str, required_role: Option<Role>) -> GuardDecision {
        self.guard.evaluate(&self.store, target, required_role)
    }

    /// Role-specific dashboard for the signed-in user.
    pub fn landing_view(&self) -> Option<Dashboard> {
        let session = self.store.current()?;
        Some(match session.claims().role {
            Some(Role::Admin) => Dashboard::Admin,
            _ => Dashboard::Employee,
        })
    }

    /// Stop background work. The session itself is left as is.
    pub fn shutdown(&self) {
        self.monitor.shutdown();
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

    fn start(slot: Arc<MemorySlot>) -> AuthContext {
        AuthContext::start(
            SessionConfig::default(),
            slot,
            Arc::new(ManualClock::new(Utc::now())),
            Arc::new(QueuedNavigator::new()),
        )
    }

    #[tokio::test]
    async fn http_client_is_installed_once() {
        let ctx = start(Arc::new(MemorySlot::new()));
        let first = ctx.http();
        let second = ctx.http();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn restores_persisted_session_on_start() {
        let token = mint("8", Some(Role::Admin), Utc::now() + Duration::hours(1));
        let ctx = start(Arc::new(MemorySlot::with_credential(token)));

        let view = ctx.current_session();
        assert!(view.is_authenticated);
        assert_eq!(view.claims.unwrap().subject.as_str(), "8");
        assert_eq!(ctx.landing_view(), Some(Dashboard::Admin));
    }

    #[tokio::test]
    async fn logout_clears_session_and_slot() {
        let token = mint("8", Some(Role::Employee), Utc::now() + Duration::hours(1));
        let slot = Arc::new(MemorySlot::with_credential(token));
        let ctx = start(slot.clone());
        assert_eq!(ctx.landing_view(), Some(Dashboard::Employee));

        ctx.logout();
        assert!(!ctx.current_session().is_authenticated);
        assert_eq!(ctx.landing_view(), None);
        assert_eq!(slot.peek(), None);
        ctx.shutdown();
    }

    #[tokio::test]
    async fn landing_view_defaults_to_employee_without_role() {
        let token = mint("8", None, Utc::now() + Duration::hours(1));
        let ctx = start(Arc::new(MemorySlot::with_credential(token)));
        assert_eq!(ctx.landing_view(), Some(Dashboard::Employee));
    }
}
