//! Navigation side of the session layer.

use parking_lot::Mutex;
use serde::Serialize;

/// A navigation the host application must perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    /// Path to navigate to (replacing the current history entry).
    pub to: String,
    /// Originally requested location to come back to after login.
    pub return_to: Option<String>,
}

impl Redirect {
    pub fn to(path: impl Into<String>) -> Self {
        Self {
            to: path.into(),
            return_to: None,
        }
    }

    pub fn returning_to(path: impl Into<String>, return_to: impl Into<String>) -> Self {
        Self {
            to: path.into(),
            return_to: Some(return_to.into()),
        }
    }
}

/// Performs redirects on behalf of the session layer.
///
/// The interceptor calls this when the server rejects a credential; the host
/// (router, CLI, webview bridge) decides how to act on it.
pub trait Navigator: Send + Sync {
    fn redirect(&self, redirect: Redirect);
}

/// Navigator that queues redirects for the host to drain.
#[derive(Debug, Default)]
pub struct QueuedNavigator {
    pending: Mutex<Vec<Redirect>>,
}

impl QueuedNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every redirect issued since the last drain, oldest first.
    pub fn drain(&self) -> Vec<Redirect> {
        std::mem::take(&mut *self.pending.lock())
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl Navigator for QueuedNavigator {
    fn redirect(&self, redirect: Redirect) {
        tracing::info!(to = %redirect.to, return_to = ?redirect.return_to, "redirect requested");
        self.pending.lock().push(redirect);
    }
}
