//! Client-side session management for the portal API
//!
//! Keeps a short-lived access token and a longer-lived refresh token current,
//! renews the access token shortly before it expires, and routes every API
//! call through a gateway that guarantees a fresh token is attached.
//!
//! Session lifecycle:
//! 1. `SessionContext::new` at startup, then `restore()` from the credential file
//! 2. `login()` if nothing was restored → store + `SessionState` populated
//! 3. `gateway().request()` → `RefreshCoordinator::ensure_fresh()` → headers → transport
//! 4. Access token within the threshold → one shared refresh, however many callers
//! 5. Refresh failure → store and session cleared, callers see `Unauthenticated`
//! 6. `logout()` clears everything

pub mod context;
pub mod error;
pub mod gateway;
pub mod refresh;
pub mod session;

#[cfg(test)]
mod test_support;

pub use context::{SessionConfig, SessionContext};
pub use error::{ApiError, RefreshError};
pub use gateway::Gateway;
pub use refresh::{RefreshCoordinator, needs_refresh};
pub use session::{Session, SessionObserver, SessionState, SubscriptionId};
