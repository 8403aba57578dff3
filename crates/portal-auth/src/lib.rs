//! Portal authentication primitives
//!
//! Token decoding, durable credential storage and the two unauthenticated
//! endpoint calls (login and refresh). This crate holds no session state of
//! its own; `portal-session` composes these pieces into the refresh
//! coordinator and request gateway.
//!
//! Credential flow:
//! 1. `token::login()` submits email/password and returns a `TokenPair`
//! 2. `claims::decode()` turns the access token into `Claims` (no signature check)
//! 3. `CredentialStore::save()` persists the pair plus the decoded claims
//! 4. When the access token nears expiry, `token::refresh()` mints a new pair
//! 5. Refresh failure ends in `CredentialStore::clear()`

pub mod claims;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use claims::{Claims, Tenant, decode, now_millis};
pub use constants::*;
pub use credentials::{CredentialStore, StoredCredentials};
pub use error::{Error, Result};
pub use token::{Endpoints, TokenPair, login, refresh};
