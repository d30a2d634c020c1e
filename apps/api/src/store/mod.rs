//! Process-wide store — the only shared mutable state in the app.
//!
//! Created once in `main`, handed to the HTTP layer inside `AppState`, and
//! never re-instantiated. Every mutation goes through [`Store::update`], which
//! applies a closure to the whole record under the watch channel's lock, so a
//! change to one field can never clobber another.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::models::user::Identity;
use crate::platform::{Platform, PlatformHost};

pub mod adapters;
pub mod gate;
pub mod handlers;
pub mod session;

use gate::{CapabilityGate, GateStatus};

/// Recorded when the gate deadline passes without a platform client.
pub const PLATFORM_UNAVAILABLE: &str = "platform unavailable";

/// Recorded when a capability is used before the gate has opened.
pub const CAPABILITIES_NOT_READY: &str = "platform capabilities are not ready";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Session {
    #[default]
    Unauthenticated,
    Authenticated { identity: Identity },
}

impl Session {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Session::Authenticated { identity } => Some(identity),
            Session::Unauthenticated => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    pub is_loading: bool,
    pub last_error: Option<String>,
    pub capabilities_ready: bool,
    pub session: Session,
}

pub struct Store {
    state: watch::Sender<StoreState>,
    host: Arc<dyn PlatformHost>,
    gate: CapabilityGate,
}

impl Store {
    pub fn new(host: Arc<dyn PlatformHost>) -> Self {
        let gate = CapabilityGate::new(Arc::clone(&host));
        Self::with_gate(host, gate)
    }

    pub fn with_gate(host: Arc<dyn PlatformHost>, gate: CapabilityGate) -> Self {
        let (state, _) = watch::channel(StoreState::default());
        Self { state, host, gate }
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> StoreState {
        self.state.borrow().clone()
    }

    /// Observe every state change.
    #[allow(dead_code)]
    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.state.subscribe()
    }

    /// The single write path into the state.
    pub(crate) fn update(&self, mutate: impl FnOnce(&mut StoreState)) {
        self.state.send_modify(mutate);
    }

    /// Records an error. Loading stops and the session drops to unauthenticated;
    /// this is the only way the identity is cleared without a sign-out.
    pub(crate) fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("Store error: {message}");
        self.update(|state| {
            state.last_error = Some(message);
            state.is_loading = false;
            state.session = Session::Unauthenticated;
        });
    }

    /// Marks an operation in flight. A stale error is dropped in the same
    /// update so loading and an error are never observed together.
    pub(crate) fn begin_loading(&self) {
        self.update(|state| {
            state.is_loading = true;
            state.last_error = None;
        });
    }

    pub fn clear_error(&self) {
        self.update(|state| state.last_error = None);
    }

    /// The live identity, if signed in.
    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().session.identity().cloned()
    }

    #[allow(dead_code)]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().session.is_authenticated()
    }

    /// The platform client, but only once the gate has opened.
    pub(crate) fn ready_platform(&self) -> Option<Arc<Platform>> {
        if !self.state.borrow().capabilities_ready {
            return None;
        }
        self.host.client()
    }

    /// Waits for the platform client, then checks for a live session.
    pub async fn init(&self) {
        self.begin_loading();
        self.gate.start();

        match self.gate.wait().await {
            GateStatus::Ready => {
                self.update(|state| state.capabilities_ready = true);
                info!("Platform capabilities ready");
                self.check_status().await;
            }
            _ => self.set_error(PLATFORM_UNAVAILABLE),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use super::*;
    use crate::platform::memory::test_platform;
    use crate::platform::PlatformSlot;

    /// A store whose gate has already opened onto `platform`.
    pub(crate) async fn ready_store(platform: Platform) -> Store {
        let slot = Arc::new(PlatformSlot::new());
        slot.install(platform);
        let store = Store::new(slot);
        store.init().await;
        store
    }

    pub(crate) fn assert_error_invariant(state: &StoreState) {
        if state.last_error.is_some() {
            assert!(!state.is_loading, "error recorded while loading: {state:?}");
            assert_eq!(state.session, Session::Unauthenticated);
        }
        if let Session::Authenticated { identity } = &state.session {
            assert!(!identity.id.is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_without_platform_reports_unavailable() {
        let store = Store::new(Arc::new(PlatformSlot::new()));

        store.init().await;

        let state = store.snapshot();
        assert_eq!(state.last_error.as_deref(), Some(PLATFORM_UNAVAILABLE));
        assert!(!state.is_loading);
        assert!(!state.capabilities_ready);
        assert_error_invariant(&state);
    }

    #[tokio::test]
    async fn test_init_with_platform_marks_capabilities_ready() {
        let store = ready_store(test_platform()).await;

        let state = store.snapshot();
        assert!(state.capabilities_ready);
        assert!(!state.is_loading);
        assert_eq!(state.last_error, None);
        assert_eq!(state.session, Session::Unauthenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_init_shares_one_wait() {
        let slot = Arc::new(PlatformSlot::new());
        let store = Arc::new(Store::new(slot.clone()));

        let first = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.init().await }
        });
        let second = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.init().await }
        });
        tokio::time::sleep(Duration::from_millis(250)).await;
        slot.install(test_platform());

        first.await.unwrap();
        second.await.unwrap();
        assert!(store.snapshot().capabilities_ready);
        assert_eq!(store.snapshot().last_error, None);
    }

    #[test]
    fn test_set_error_resets_loading_and_session() {
        let store = Store::new(Arc::new(PlatformSlot::new()));
        store.update(|state| {
            state.is_loading = true;
            state.capabilities_ready = true;
            state.session = Session::Authenticated {
                identity: Identity::new("u1", "ada"),
            };
        });

        store.set_error("boom");

        let state = store.snapshot();
        assert_eq!(state.last_error.as_deref(), Some("boom"));
        assert!(!state.is_loading);
        assert_eq!(state.session, Session::Unauthenticated);
        assert!(state.capabilities_ready, "unrelated fields must survive");
    }

    #[test]
    fn test_clear_error_is_idempotent_and_touches_nothing_else() {
        let store = Store::new(Arc::new(PlatformSlot::new()));
        store.update(|state| state.capabilities_ready = true);
        store.set_error("boom");

        store.clear_error();
        let once = store.snapshot();
        store.clear_error();
        let twice = store.snapshot();

        assert_eq!(once, twice);
        assert_eq!(once.last_error, None);
        assert!(once.capabilities_ready);
    }

    #[test]
    fn test_ready_platform_requires_open_gate() {
        let slot = Arc::new(PlatformSlot::new());
        slot.install(test_platform());
        let store = Store::new(slot);

        assert!(store.ready_platform().is_none());
        store.update(|state| state.capabilities_ready = true);
        assert!(store.ready_platform().is_some());
    }

    #[tokio::test]
    async fn test_subscribers_observe_updates() {
        let store = Store::new(Arc::new(PlatformSlot::new()));
        let mut rx = store.subscribe();

        store.update(|state| state.is_loading = true);

        rx.changed().await.unwrap();
        assert!(rx.borrow().is_loading);
    }

    #[test]
    fn test_session_serializes_with_status_tag() {
        let session = Session::Authenticated {
            identity: Identity::new("u1", "ada"),
        };
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["status"], "authenticated");
        assert_eq!(json["identity"]["id"], "u1");

        let json = serde_json::to_value(Session::Unauthenticated).unwrap();
        assert_eq!(json["status"], "unauthenticated");
    }
}
