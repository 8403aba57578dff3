//! Shared fixtures for unit tests

use std::sync::Arc;
use std::time::Duration;

use portal_auth::{Claims, CredentialStore, Tenant, claims::encode_unsigned};
use tempfile::TempDir;
use transport::Transport;
use transport::testing::ScriptedTransport;

use crate::gateway::Gateway;
use crate::refresh::RefreshCoordinator;
use crate::session::SessionState;

pub const REFRESH_URL: &str = portal_auth::REFRESH_PATH;
pub const LOGIN_URL: &str = portal_auth::LOGIN_PATH;
pub const CHANGE_PASSWORD_URL: &str = portal_auth::CHANGE_PASSWORD_PATH;

pub fn tenant(id: &str) -> Tenant {
    Tenant {
        id: id.into(),
        slug: format!("{id}-slug"),
        name: format!("Tenant {id}"),
        role: "member".into(),
    }
}

pub fn claims_expiring_in(subject: &str, secs: i64) -> Claims {
    let now_secs = (portal_auth::now_millis() / 1000) as i64;
    Claims {
        subject: subject.into(),
        issued_at: now_secs as u64,
        expires_at: (now_secs + secs).max(0) as u64,
        roles: vec!["member".into()],
        tenants: vec![tenant("t-1"), tenant("t-2")],
    }
}

pub fn token_expiring_in(subject: &str, secs: i64) -> String {
    encode_unsigned(&claims_expiring_in(subject, secs))
}

pub fn refresh_body(access: &str, refresh: &str) -> serde_json::Value {
    serde_json::json!({ "access_token": access, "refresh_token": refresh })
}

pub fn login_body(access: &str, refresh: &str) -> serde_json::Value {
    serde_json::json!({ "token": access, "refresh_token": refresh })
}

/// Store, session, scripted transport and coordinator wired together.
pub struct Fixture {
    _dir: TempDir,
    pub store: Arc<CredentialStore>,
    pub session: Arc<SessionState>,
    pub transport: Arc<ScriptedTransport>,
    pub coordinator: Arc<RefreshCoordinator>,
}

impl Fixture {
    pub async fn empty() -> Self {
        Self::build(ScriptedTransport::new()).await
    }

    /// Logged in as "u1" with refresh token "R1", access token expiring in
    /// `expires_in_secs`.
    pub async fn logged_in(expires_in_secs: i64) -> Self {
        let fx = Self::empty().await;
        fx.seed(expires_in_secs).await;
        fx
    }

    /// Like `logged_in`, but every transport response is held for `delay`.
    pub async fn with_delay(expires_in_secs: i64, delay: Duration) -> Self {
        let fx = Self::build(ScriptedTransport::new().with_delay(delay)).await;
        fx.seed(expires_in_secs).await;
        fx
    }

    pub fn gateway(&self) -> Gateway {
        Gateway::new(
            self.coordinator.clone(),
            self.store.clone(),
            self.session.clone(),
            self.dyn_transport(),
            CHANGE_PASSWORD_URL,
        )
    }

    pub fn dyn_transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    async fn build(transport: ScriptedTransport) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CredentialStore::open(dir.path().join("session.json")).await);
        let session = Arc::new(SessionState::new());
        let transport = Arc::new(transport);
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            session.clone(),
            transport.clone(),
            REFRESH_URL,
            portal_auth::DEFAULT_REFRESH_THRESHOLD,
        ));
        Self {
            _dir: dir,
            store,
            session,
            transport,
            coordinator,
        }
    }

    async fn seed(&self, expires_in_secs: i64) {
        let claims = claims_expiring_in("u1", expires_in_secs);
        self.store
            .save(&encode_unsigned(&claims), "R1", &claims)
            .await;
        self.session.publish(&claims);
    }
}
