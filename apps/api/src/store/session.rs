//! Session state machine: `unauthenticated` ⇄ `authenticated`.
//!
//! The session lives in `StoreState`; `Session::Authenticated` carries the
//! identity, so an authenticated session without one cannot be represented.

use tracing::info;

use crate::platform::PlatformError;
use crate::store::{Session, Store, CAPABILITIES_NOT_READY};

impl Store {
    /// Asks the platform whether a session is live and syncs the state with it.
    /// Returns whether the session ended up authenticated.
    pub async fn check_status(&self) -> bool {
        self.begin_loading();

        let Some(platform) = self.ready_platform() else {
            self.set_error(CAPABILITIES_NOT_READY);
            return false;
        };

        let lookup = async {
            if platform.identity.is_signed_in().await? {
                platform.identity.get_user().await.map(Some)
            } else {
                Ok::<_, PlatformError>(None)
            }
        };

        match lookup.await {
            Ok(Some(identity)) => {
                info!("Session authenticated as {}", identity.id);
                self.update(|state| {
                    state.session = Session::Authenticated { identity };
                    state.last_error = None;
                    state.is_loading = false;
                });
                true
            }
            Ok(None) => {
                self.update(|state| {
                    state.session = Session::Unauthenticated;
                    state.is_loading = false;
                });
                false
            }
            Err(e) => {
                self.set_error(format!("Failed to check auth status: {e}"));
                false
            }
        }
    }

    /// Signs in through the platform, then re-checks the session.
    pub async fn sign_in(&self) -> bool {
        self.begin_loading();

        let Some(platform) = self.ready_platform() else {
            self.set_error(CAPABILITIES_NOT_READY);
            return false;
        };

        if let Err(e) = platform.identity.sign_in().await {
            self.set_error(format!("Sign in failed: {e}"));
            return false;
        }
        self.check_status().await
    }

    /// Signs out. On failure the error is recorded; callers should re-check
    /// rather than trust the resulting session.
    pub async fn sign_out(&self) -> bool {
        self.begin_loading();

        let Some(platform) = self.ready_platform() else {
            self.set_error(CAPABILITIES_NOT_READY);
            return false;
        };

        match platform.identity.sign_out().await {
            Ok(()) => {
                info!("Signed out");
                self.update(|state| {
                    state.session = Session::Unauthenticated;
                    state.is_loading = false;
                });
                true
            }
            Err(e) => {
                self.set_error(format!("Sign out failed: {e}"));
                false
            }
        }
    }

    /// Re-fetches the identity of a live session without going through sign-in.
    ///
    /// Unlike `check_status` this never moves the session to unauthenticated
    /// itself. A failure is only recorded as an error, although recording it
    /// still resets the session through `set_error`.
    pub async fn refresh(&self) -> bool {
        self.begin_loading();

        let Some(platform) = self.ready_platform() else {
            self.set_error(CAPABILITIES_NOT_READY);
            return false;
        };

        match platform.identity.get_user().await {
            Ok(identity) => {
                self.update(|state| {
                    state.session = Session::Authenticated { identity };
                    state.last_error = None;
                    state.is_loading = false;
                });
                true
            }
            Err(e) => {
                self.set_error(format!("Failed to refresh user: {e}"));
                false
            }
        }
    }
}
