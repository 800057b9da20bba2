//! Background expiry check for the active session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::navigator::{Navigator, Redirect};
use crate::store::{Session, SessionStore};

/// Periodically clears the session once its claims have expired.
///
/// The worker follows the store's subscription: while a session is active it
/// runs one interval armed for that session's generation; when the session is
/// replaced or cleared the interval is dropped and re-armed (or not). At most
/// one timer is live at a time, and a tick can only ever clear the session it
/// was armed for. A tick that signs the user out also sends them to the login
/// view.
pub struct ExpiryMonitor {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl ExpiryMonitor {
    /// Spawn the monitor on the current tokio runtime.
    pub fn spawn(
        store: Arc<SessionStore>,
        period: Duration,
        navigator: Arc<dyn Navigator>,
        login_path: impl Into<String>,
    ) -> Self {
        let shutdown = Arc::new(Notify::new());
        let worker = Worker {
            store,
            navigator,
            login_path: login_path.into(),
        };
        let handle = tokio::spawn(worker.run(period, shutdown.clone()));
        tracing::debug!(period_secs = period.as_secs(), "expiry monitor started");
        Self { shutdown, handle }
    }

    /// Request graceful shutdown of the worker.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ExpiryMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Worker {
    store: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
    login_path: String,
}

impl Worker {
    async fn run(self, period: Duration, shutdown: Arc<Notify>) {
        let mut changes = self.store.subscribe();

        loop {
            let armed = changes.borrow_and_update().clone();

            let session = match armed {
                Some(session) => session,
                None => {
                    // Nothing to watch; sleep until a session shows up.
                    tokio::select! {
                        _ = shutdown.notified() => break,
                        changed = changes.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                    continue;
                }
            };

            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::debug!(generation = session.generation(), "expiry timer armed");

            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        tracing::info!("expiry monitor stopped");
                        return;
                    }
                    changed = changes.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        tracing::debug!(generation = session.generation(), "expiry timer disarmed");
                        break;
                    }
                    _ = ticker.tick() => self.check(&session),
                }
            }
        }

        tracing::info!("expiry monitor stopped");
    }

    fn check(&self, session: &Session) {
        let now = self.store.now();
        if !session.is_expired_at(now) {
            return;
        }

        if self.store.clear_if(session.generation()) {
            tracing::info!(
                generation = session.generation(),
                expired_at = %session.claims().expires_at,
                "session expired"
            );
            self.navigator.redirect(Redirect::to(self.login_path.clone()));
        }
    }
}
