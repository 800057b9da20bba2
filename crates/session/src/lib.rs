//! `cybertrain-session`
//!
//! **Responsibility:** client-side session and access control for the
//! training platform.
//!
//! This crate provides:
//! - A single session store with a persisted credential slot
//! - A background expiry monitor
//! - An HTTP client wrapper that attaches the bearer credential and signs out
//!   on 401
//! - A route guard for protected views
//!
//! Credentials are decoded, not verified (see `cybertrain_auth::codec`). The
//! backend remains the authority on every request.

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod interceptor;
pub mod login;
pub mod monitor;
pub mod navigator;
pub mod slot;
pub mod store;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RoutePaths, SessionConfig};
pub use context::{AuthContext, Dashboard};
pub use error::{SessionError, SessionResult};
pub use guard::{DenialReason, GuardDecision, RouteGuard, decide};
pub use interceptor::{AuthorizedClient, IssuedUnder};
pub use login::{LoginClient, LoginMethod, LoginRequest};
pub use monitor::ExpiryMonitor;
pub use navigator::{Navigator, QueuedNavigator, Redirect};
pub use slot::{CredentialSlot, FileSlot, MemorySlot, SlotError};
pub use store::{Credential, Session, SessionStore, SessionView, Snapshot};
