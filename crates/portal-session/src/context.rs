//! Per-session context
//!
//! `SessionContext` owns the store, the session projection, the refresh
//! coordinator and the gateway for one logged-in user. Create it at startup,
//! `restore` from disk, `login` if that found nothing, and `logout` at the end.

use std::sync::Arc;
use std::time::Duration;

use portal_auth::{CredentialStore, DEFAULT_REFRESH_THRESHOLD, Endpoints, Tenant};
use tracing::{info, warn};
use transport::Transport;

use crate::error::RefreshError;
use crate::gateway::Gateway;
use crate::refresh::{RefreshCoordinator, install};
use crate::session::{Session, SessionState};

/// Endpoint locations and the renewal threshold.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub endpoints: Endpoints,
    pub refresh_threshold: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
        }
    }
}

pub struct SessionContext {
    store: Arc<CredentialStore>,
    session: Arc<SessionState>,
    transport: Arc<dyn Transport>,
    coordinator: Arc<RefreshCoordinator>,
    gateway: Gateway,
    login_url: String,
}

impl SessionContext {
    pub fn new(
        store: Arc<CredentialStore>,
        transport: Arc<dyn Transport>,
        config: SessionConfig,
    ) -> Self {
        let session = Arc::new(SessionState::new());
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            session.clone(),
            transport.clone(),
            config.endpoints.refresh,
            config.refresh_threshold,
        ));
        let gateway = Gateway::new(
            coordinator.clone(),
            store.clone(),
            session.clone(),
            transport.clone(),
            config.endpoints.change_password,
        );
        Self {
            store,
            session,
            transport,
            coordinator,
            gateway,
            login_url: config.endpoints.login,
        }
    }

    /// Observable session projection; subscribe here for identity changes.
    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Rebuild the session from stored credentials.
    ///
    /// Returns true when a decodable access token was found. An expired but
    /// decodable token still restores; the next request renews it. A
    /// malformed token is discarded along with the rest of the store.
    pub async fn restore(&self) -> bool {
        let stored = self.store.load().await;
        let Some(access) = stored.access_token.as_deref() else {
            return false;
        };

        match portal_auth::decode(access) {
            Ok(claims) => {
                self.session.publish(&claims);
                if let Some(tenant) = &stored.selected_tenant
                    && self.session.select_tenant(&tenant.id).is_none()
                {
                    self.store.save_selected_tenant(None).await;
                }
                info!(subject = %claims.subject, "session restored from storage");
                true
            }
            Err(e) => {
                warn!(error = %e, "stored access token is unusable, discarding session");
                self.store.clear().await;
                self.session.clear();
                false
            }
        }
    }

    /// Log in with email and password.
    ///
    /// Nothing is written until the returned access token has decoded, so
    /// every failure leaves the store and session exactly as they were.
    pub async fn login(&self, email: &str, password: &str) -> portal_auth::Result<Session> {
        let pair = portal_auth::login(self.transport.as_ref(), &self.login_url, email, password)
            .await
            .inspect_err(|e| warn!(email, error = %e, "login failed"))?;
        let claims = portal_auth::decode(&pair.access_token)?;

        let _epoch = self.coordinator.new_epoch().await;
        install(&self.store, &self.session, &pair, &claims).await;
        info!(subject = %claims.subject, "logged in");
        Ok(self.session.current())
    }

    /// End the session. A renewal still in flight is discarded rather than
    /// installed.
    pub async fn logout(&self) {
        let _epoch = self.coordinator.new_epoch().await;
        self.session.clear();
        self.store.clear().await;
        info!("logged out");
    }

    /// True when a stored access token decodes and has not yet expired.
    pub async fn is_logged_in(&self) -> bool {
        self.store
            .access_token()
            .await
            .and_then(|token| portal_auth::decode(&token).ok())
            .is_some_and(|claims| !claims.is_expired_at(portal_auth::now_millis()))
    }

    /// Select a tenant for subsequent requests and persist the choice.
    /// Returns `None` if the session does not grant that tenant.
    pub async fn select_tenant(&self, tenant_id: &str) -> Option<Tenant> {
        let tenant = self.session.select_tenant(tenant_id)?;
        self.store.save_selected_tenant(Some(tenant.clone())).await;
        Some(tenant)
    }

    /// Renew the access token now if it is within the threshold.
    pub async fn ensure_fresh(&self) -> Result<(), RefreshError> {
        self.coordinator.ensure_fresh().await
    }
}
