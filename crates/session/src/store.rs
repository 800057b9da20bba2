//! Process-wide session state.
//!
//! One [`SessionStore`] exists per process. It owns the current
//! credential/claims pair, mirrors the raw credential into the persisted slot,
//! and publishes every change to subscribers before the mutating call
//! returns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

use cybertrain_auth::{ClaimSet, decode};

use crate::clock::Clock;
use crate::error::{SessionError, SessionResult};
use crate::slot::CredentialSlot;

/// Raw bearer credential. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for Credential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// An active session: the credential and its decoded claims, adopted together.
///
/// `generation` increases with every adoption and identifies this session
/// for freshness checks on deferred clears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    generation: u64,
    credential: Credential,
    claims: ClaimSet,
}

impl Session {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn claims(&self) -> &ClaimSet {
        &self.claims
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.claims.is_expired_at(now)
    }
}

/// Immutable view of the store; `None` means no session.
pub type Snapshot = Option<Arc<Session>>;

/// What UI consumers read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub is_authenticated: bool,
    pub claims: Option<ClaimSet>,
}

impl From<&Snapshot> for SessionView {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            is_authenticated: snapshot.is_some(),
            claims: snapshot.as_ref().map(|s| s.claims.clone()),
        }
    }
}

pub struct SessionStore {
    slot: Arc<dyn CredentialSlot>,
    clock: Arc<dyn Clock>,
    state: watch::Sender<Snapshot>,
    /// Serializes mutations so the slot write and the publish are one step.
    mutation: Mutex<()>,
    next_generation: AtomicU64,
    initialized: AtomicBool,
}

impl SessionStore {
    pub fn new(slot: Arc<dyn CredentialSlot>, clock: Arc<dyn Clock>) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            slot,
            clock,
            state,
            mutation: Mutex::new(()),
            next_generation: AtomicU64::new(1),
            initialized: AtomicBool::new(false),
        }
    }

    /// Restore a session left in the persisted slot by a previous run.
    ///
    /// Runs once; later calls return the current snapshot untouched. A
    /// credential that is undecodable or already expired is removed from the
    /// slot and the store stays empty.
    pub fn initialize(&self) -> Snapshot {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return self.current();
        }

        let stored = match self.slot.load() {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                tracing::debug!("no persisted credential; starting signed out");
                return None;
            }
            Err(e) => {
                let err = SessionError::from(e);
                tracing::warn!(error = %err, "could not read persisted credential; starting signed out");
                return None;
            }
        };

        // From here on the slot and the snapshot change together. A login that
        // landed while the slot was being read wins and its credential stays.
        let _guard = self.mutation.lock();
        if self.state.borrow().is_some() {
            return self.current();
        }

        let claims = match decode(&stored) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!(error = %e, "discarding undecodable persisted credential");
                self.remove_persisted();
                return None;
            }
        };

        if claims.is_expired_at(self.clock.now()) {
            tracing::info!(
                subject = %claims.subject,
                expired_at = %claims.expires_at,
                "discarding expired persisted credential"
            );
            self.remove_persisted();
            return None;
        }

        // A logout during the read emptied the slot; do not resurrect it.
        if !matches!(self.slot.load(), Ok(Some(ref still)) if *still == stored) {
            tracing::debug!("persisted credential changed during restore; starting signed out");
            return None;
        }

        let session = self.install(stored, claims);
        tracing::info!(
            generation = session.generation,
            subject = %session.claims.subject,
            "restored persisted session"
        );
        Some(session)
    }

    /// Decode `credential` and make it the current session.
    ///
    /// On failure the previous session (if any) is left exactly as it was.
    pub fn adopt(&self, credential: impl Into<String>) -> SessionResult<Arc<Session>> {
        let credential = credential.into();
        let claims = decode(&credential)?;

        if claims.is_expired_at(self.clock.now()) {
            return Err(SessionError::ExpiredCredential {
                expired_at: claims.expires_at,
            });
        }

        let _guard = self.mutation.lock();
        if let Err(e) = self.slot.store(&credential) {
            let err = SessionError::from(e);
            tracing::warn!(error = %err, "session will not survive a restart");
        }
        let session = self.install(credential, claims);
        tracing::info!(
            generation = session.generation,
            subject = %session.claims.subject,
            expires_at = %session.claims.expires_at,
            "session adopted"
        );
        Ok(session)
    }

    /// Drop the current session and empty the slot. Idempotent.
    pub fn clear(&self) {
        let _guard = self.mutation.lock();
        self.remove_persisted();
        let cleared = self.state.send_if_modified(|snapshot| snapshot.take().is_some());
        if cleared {
            tracing::info!("session cleared");
        }
    }

    /// Clear only if the live session is still `generation`.
    ///
    /// Returns `true` if this call performed the transition to signed out.
    /// Deferred observers (expiry ticks, failed responses, guard checks) use
    /// this so they can never clear a session adopted after they looked.
    pub fn clear_if(&self, generation: u64) -> bool {
        let _guard = self.mutation.lock();
        let live = self.state.borrow().as_ref().map(|s| s.generation);
        if live != Some(generation) {
            tracing::debug!(generation, ?live, "skipping clear for a superseded session");
            return false;
        }

        self.remove_persisted();
        self.state.send_replace(None);
        tracing::info!(generation, "session cleared");
        true
    }

    /// Current snapshot. Never blocks on I/O.
    pub fn current(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    pub fn view(&self) -> SessionView {
        SessionView::from(&self.current())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// Receive every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state.subscribe()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Caller must hold `mutation`.
    fn install(&self, credential: String, claims: ClaimSet) -> Arc<Session> {
        let session = Arc::new(Session {
            generation: self.next_generation.fetch_add(1, Ordering::SeqCst),
            credential: Credential(credential),
            claims,
        });
        self.state.send_replace(Some(session.clone()));
        session
    }

    fn remove_persisted(&self) {
        if let Err(e) = self.slot.remove() {
            let err = SessionError::from(e);
            tracing::warn!(error = %err, "stale credential may remain in storage");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use chrono::Duration;
    use cybertrain_auth::Role;
    use proptest::prelude::*;

    use super::*;
    use crate::clock::ManualClock;
    use crate::slot::{MemorySlot, SlotError};
    use crate::testing::mint;

    fn store_with(slot: Arc<dyn CredentialSlot>, clock: &ManualClock) -> SessionStore {
        SessionStore::new(slot, Arc::new(clock.clone()))
    }

    fn fixture() -> (SessionStore, Arc<MemorySlot>, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let slot = Arc::new(MemorySlot::new());
        (store_with(slot.clone(), &clock), slot, clock)
    }

    /// Slot that fails every operation and counts calls.
    #[derive(Default)]
    struct BrokenSlot {
        calls: AtomicUsize,
    }

    impl CredentialSlot for BrokenSlot {
        fn load(&self) -> Result<Option<String>, SlotError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(SlotError::NoDataDir)
        }
        fn store(&self, _: &str) -> Result<(), SlotError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(SlotError::NoDataDir)
        }
        fn remove(&self) -> Result<(), SlotError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(SlotError::NoDataDir)
        }
    }

    /// Slot that records whether it was ever written or emptied.
    #[derive(Default)]
    struct WatchedSlot {
        inner: MemorySlot,
        removes: AtomicUsize,
    }

    impl CredentialSlot for WatchedSlot {
        fn load(&self) -> Result<Option<String>, SlotError> {
            self.inner.load()
        }
        fn store(&self, credential: &str) -> Result<(), SlotError> {
            self.inner.store(credential)
        }
        fn remove(&self) -> Result<(), SlotError> {
            self.removes.fetch_add(1, Ordering::SeqCst);
            self.inner.remove()
        }
    }

    /// Slot whose first read lets another caller log in or out mid-read.
    struct InterleavedSlot {
        inner: MemorySlot,
        stale: String,
        during_load: parking_lot::Mutex<Option<Box<dyn FnOnce(&SessionStore) + Send>>>,
        store: std::sync::OnceLock<std::sync::Weak<SessionStore>>,
    }

    impl InterleavedSlot {
        fn new(stale: String, during_load: impl FnOnce(&SessionStore) + Send + 'static) -> Arc<Self> {
            Arc::new(Self {
                inner: MemorySlot::with_credential(stale.clone()),
                stale,
                during_load: parking_lot::Mutex::new(Some(Box::new(during_load))),
                store: std::sync::OnceLock::new(),
            })
        }

        fn attach(&self, store: &Arc<SessionStore>) {
            let _ = self.store.set(Arc::downgrade(store));
        }
    }

    impl CredentialSlot for InterleavedSlot {
        fn load(&self) -> Result<Option<String>, SlotError> {
            let hook = self.during_load.lock().take();
            if let (Some(hook), Some(store)) = (hook, self.store.get().and_then(|s| s.upgrade())) {
                hook(&store);
                return Ok(Some(self.stale.clone()));
            }
            self.inner.load()
        }
        fn store(&self, credential: &str) -> Result<(), SlotError> {
            self.inner.store(credential)
        }
        fn remove(&self) -> Result<(), SlotError> {
            self.inner.remove()
        }
    }

    fn interleaved(
        stale: String,
        clock: &ManualClock,
        during_load: impl FnOnce(&SessionStore) + Send + 'static,
    ) -> (Arc<SessionStore>, Arc<InterleavedSlot>) {
        let slot = InterleavedSlot::new(stale, during_load);
        let store = Arc::new(store_with(slot.clone(), clock));
        slot.attach(&store);
        (store, slot)
    }

    #[test]
    fn adopt_then_current_matches_decode() {
        let (store, slot, clock) = fixture();
        let token = mint("7", Some(Role::Employee), clock.now() + Duration::hours(1));

        let session = store.adopt(token.clone()).unwrap();
        let current = store.current().unwrap();

        assert_eq!(current.claims(), &cybertrain_auth::decode(&token).unwrap());
        assert_eq!(current.generation(), session.generation());
        assert_eq!(current.credential().expose(), token);
        assert_eq!(slot.peek().as_deref(), Some(token.as_str()));
        assert!(store.view().is_authenticated);
    }

    #[test]
    fn malformed_adopt_leaves_prior_session() {
        let (store, slot, clock) = fixture();
        let token = mint("7", None, clock.now() + Duration::hours(1));
        let before = store.adopt(token.clone()).unwrap();

        let err = store.adopt("not-a-credential").unwrap_err();
        assert!(matches!(err, SessionError::MalformedCredential(_)));
        assert_eq!(store.current(), Some(before));
        assert_eq!(slot.peek(), Some(token));
    }

    #[test]
    fn malformed_adopt_from_absent_stays_absent() {
        let (store, slot, _) = fixture();
        assert!(store.adopt("a.b").is_err());
        assert_eq!(store.current(), None);
        assert_eq!(slot.peek(), None);
    }

    #[test]
    fn expired_adopt_is_rejected() {
        let (store, slot, clock) = fixture();
        let token = mint("7", None, clock.now() - Duration::seconds(1));

        let err = store.adopt(token).unwrap_err();
        assert!(matches!(err, SessionError::ExpiredCredential { .. }));
        assert_eq!(store.current(), None);
        assert_eq!(slot.peek(), None);
    }

    #[test]
    fn readoption_replaces_wholesale() {
        let (store, slot, clock) = fixture();
        let first = store
            .adopt(mint("1", Some(Role::Employee), clock.now() + Duration::hours(1)))
            .unwrap();
        let second_token = mint("2", Some(Role::Admin), clock.now() + Duration::hours(2));
        let second = store.adopt(second_token.clone()).unwrap();

        assert!(second.generation() > first.generation());
        let current = store.current().unwrap();
        assert_eq!(current.claims().subject.as_str(), "2");
        assert_eq!(current.credential().expose(), second_token);
        assert_eq!(slot.peek(), Some(second_token));
    }

    #[test]
    fn clear_twice_equals_clear_once() {
        let (store, slot, clock) = fixture();
        store
            .adopt(mint("1", None, clock.now() + Duration::hours(1)))
            .unwrap();
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        store.clear();
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        store.clear();
        assert!(!rx.has_changed().unwrap());
        assert_eq!(store.current(), None);
        assert_eq!(slot.peek(), None);
    }

    #[test]
    fn clear_if_ignores_superseded_generation() {
        let (store, _, clock) = fixture();
        let old = store
            .adopt(mint("1", None, clock.now() + Duration::hours(1)))
            .unwrap();
        let new = store
            .adopt(mint("2", None, clock.now() + Duration::hours(1)))
            .unwrap();

        assert!(!store.clear_if(old.generation()));
        assert_eq!(store.current(), Some(new.clone()));

        assert!(store.clear_if(new.generation()));
        assert!(!store.clear_if(new.generation()));
        assert_eq!(store.current(), None);
    }

    #[test]
    fn initialize_restores_valid_credential() {
        let clock = ManualClock::new(Utc::now());
        let token = mint("9", Some(Role::Admin), clock.now() + Duration::minutes(30));
        let store = store_with(Arc::new(MemorySlot::with_credential(token)), &clock);

        let restored = store.initialize().unwrap();
        assert_eq!(restored.claims().role, Some(Role::Admin));
        assert!(store.is_authenticated());
    }

    #[test]
    fn initialize_discards_expired_credential() {
        let clock = ManualClock::new(Utc::now());
        for offset in [Duration::zero(), Duration::seconds(-1), Duration::days(-3)] {
            let slot = Arc::new(MemorySlot::with_credential(mint(
                "9",
                None,
                clock.now() + offset,
            )));
            let store = store_with(slot.clone(), &clock);

            assert_eq!(store.initialize(), None);
            assert_eq!(slot.peek(), None);
        }
    }

    #[test]
    fn initialize_discards_undecodable_credential() {
        let clock = ManualClock::new(Utc::now());
        let slot = Arc::new(MemorySlot::with_credential("garbage"));
        let store = store_with(slot.clone(), &clock);

        assert_eq!(store.initialize(), None);
        assert_eq!(slot.peek(), None);
    }

    #[test]
    fn initialize_with_empty_slot_touches_nothing() {
        let clock = ManualClock::new(Utc::now());
        let slot = Arc::new(WatchedSlot::default());
        let store = store_with(slot.clone(), &clock);

        assert_eq!(store.initialize(), None);
        assert_eq!(slot.removes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn initialize_runs_once() {
        let clock = ManualClock::new(Utc::now());
        let slot = Arc::new(MemorySlot::new());
        let store = store_with(slot.clone(), &clock);

        assert_eq!(store.initialize(), None);
        // A credential appearing later is not picked up by a second call.
        slot.store(&mint("1", None, clock.now() + Duration::hours(1)))
            .unwrap();
        assert_eq!(store.initialize(), None);
    }

    #[test]
    fn login_during_restore_keeps_its_credential() {
        let clock = ManualClock::new(Utc::now());
        let fresh = mint("new", Some(Role::Admin), clock.now() + Duration::hours(1));
        let stale_cases = [
            mint("old", None, clock.now() - Duration::minutes(5)),
            "garbage".to_string(),
            mint("old", None, clock.now() + Duration::hours(1)),
        ];

        for stale in stale_cases {
            let login = fresh.clone();
            let (store, slot) = interleaved(stale, &clock, move |store| {
                store.adopt(login).unwrap();
            });

            let restored = store.initialize().unwrap();
            assert_eq!(restored.claims().subject.as_str(), "new");
            assert_eq!(store.current(), Some(restored));
            assert_eq!(slot.inner.peek().as_deref(), Some(fresh.as_str()));
        }
    }

    #[test]
    fn logout_during_restore_is_not_undone() {
        let clock = ManualClock::new(Utc::now());
        let stale = mint("old", None, clock.now() + Duration::hours(1));
        let (store, slot) = interleaved(stale, &clock, |store| store.clear());

        assert_eq!(store.initialize(), None);
        assert!(!store.is_authenticated());
        assert_eq!(slot.inner.peek(), None);
    }

    #[test]
    fn storage_failure_degrades_to_memory_only() {
        let clock = ManualClock::new(Utc::now());
        let slot = Arc::new(BrokenSlot::default());
        let store = store_with(slot.clone(), &clock);

        assert_eq!(store.initialize(), None);
        let session = store
            .adopt(mint("3", None, clock.now() + Duration::hours(1)))
            .unwrap();
        assert_eq!(store.current(), Some(session));

        store.clear();
        assert_eq!(store.current(), None);
        assert!(slot.calls.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn subscribers_see_mutation_before_adopt_returns() {
        let (store, _, clock) = fixture();
        let rx = store.subscribe();
        let session = store
            .adopt(mint("5", None, clock.now() + Duration::hours(1)))
            .unwrap();
        assert_eq!(rx.borrow().as_ref(), Some(&session));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let (store, _, clock) = fixture();
        let token = mint("5", None, clock.now() + Duration::hours(1));
        let session = store.adopt(token.clone()).unwrap();
        let printed = format!("{session:?}");
        assert!(!printed.contains(&token));
        assert!(printed.contains("<redacted>"));
    }

    proptest! {
        #[test]
        fn undecodable_adopt_never_disturbs_session(garbage in "[A-Za-z0-9_.-]{0,40}") {
            prop_assume!(cybertrain_auth::decode(&garbage).is_err());

            let (store, slot, clock) = fixture();
            let token = mint("1", None, clock.now() + Duration::hours(1));
            let before = store.adopt(token.clone()).unwrap();

            let result = store.adopt(garbage);
            prop_assert!(matches!(result, Err(SessionError::MalformedCredential(_))));
            prop_assert_eq!(store.current(), Some(before));
            prop_assert_eq!(slot.peek(), Some(token));
        }
    }
}
