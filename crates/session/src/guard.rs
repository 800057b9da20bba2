//! Access decision evaluated before rendering a protected view.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use cybertrain_auth::Role;

use crate::clock::Clock;
use crate::config::RoutePaths;
use crate::navigator::Redirect;
use crate::store::{Session, SessionStore};

/// Why a navigation was redirected.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// No session: go log in.
    Unauthenticated,
    /// Authenticated, but the view requires another role.
    WrongRole,
    /// The session's claims expired between monitor ticks.
    Expired { generation: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    Redirect {
        redirect: Redirect,
        reason: DenialReason,
    },
}

impl GuardDecision {
    pub fn is_render(&self) -> bool {
        matches!(self, GuardDecision::Render)
    }

    pub fn redirect(&self) -> Option<&Redirect> {
        match self {
            GuardDecision::Render => None,
            GuardDecision::Redirect { redirect, .. } => Some(redirect),
        }
    }
}

/// Pure access decision.
///
/// 1. No session → login, remembering `target`.
/// 2. Role required and not held → landing view (the user is signed in).
/// 3. Claims expired → login, remembering `target`.
/// 4. Otherwise render.
pub fn decide(
    paths: &RoutePaths,
    session: Option<&Session>,
    target: &str,
    required_role: Option<Role>,
    now: DateTime<Utc>,
) -> GuardDecision {
    let Some(session) = session else {
        return GuardDecision::Redirect {
            redirect: Redirect::returning_to(paths.login.clone(), target),
            reason: DenialReason::Unauthenticated,
        };
    };

    if let Some(role) = required_role {
        if !session.claims().has_role(role) {
            return GuardDecision::Redirect {
                redirect: Redirect::to(paths.landing.clone()),
                reason: DenialReason::WrongRole,
            };
        }
    }

    if session.is_expired_at(now) {
        return GuardDecision::Redirect {
            redirect: Redirect::returning_to(paths.login.clone(), target),
            reason: DenialReason::Expired {
                generation: session.generation(),
            },
        };
    }

    GuardDecision::Render
}

/// Route guard bound to the application's redirect targets.
#[derive(Clone)]
pub struct RouteGuard {
    paths: RoutePaths,
    clock: Arc<dyn Clock>,
}

impl RouteGuard {
    pub fn new(paths: RoutePaths, clock: Arc<dyn Clock>) -> Self {
        Self { paths, clock }
    }

    pub fn paths(&self) -> &RoutePaths {
        &self.paths
    }

    /// Decide whether `target` may render, clearing the session if the
    /// decision found it expired.
    pub fn evaluate(
        &self,
        store: &SessionStore,
        target: &str,
        required_role: Option<Role>,
    ) -> GuardDecision {
        let snapshot = store.current();
        let decision = decide(
            &self.paths,
            snapshot.as_deref(),
            target,
            required_role,
            self.clock.now(),
        );

        match &decision {
            GuardDecision::Redirect {
                reason: DenialReason::Expired { generation },
                ..
            } => {
                if store.clear_if(*generation) {
                    tracing::info!(generation, path = target, "session expired before navigation");
                }
            }
            GuardDecision::Redirect { reason, redirect } => {
                tracing::debug!(path = target, ?reason, to = %redirect.to, "navigation redirected");
            }
            GuardDecision::Render => {}
        }

        decision
    }
}
