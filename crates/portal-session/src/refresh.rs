//! Access-token renewal with a single in-flight refresh
//!
//! `ensure_fresh` is called before every authenticated request. The common
//! path reads the stored token, sees it is outside the threshold and returns
//! without touching the network.
//!
//! When renewal is needed, exactly one refresh call is made per expiry
//! window no matter how many callers arrive together:
//! - the first caller to find the state `Idle` re-checks the token under the
//!   state lock, flips the state to `InFlight` and spawns the renewal task
//! - everyone else (including that first caller) waits on the same
//!   `watch` channel and receives the same outcome
//!
//! The renewal runs on its own task so a caller that stops waiting cannot
//! cancel a refresh other callers depend on. The task persists and publishes
//! the new pair BEFORE returning the state to `Idle`, so a caller that finds
//! `Idle` afterwards also finds the fresh token.
//!
//! Failure is terminal: the store and session are cleared (fail closed) and
//! the user must log in again. There is no automatic retry.
//!
//! Login and logout start a new session epoch. A renewal begun under an
//! earlier epoch neither installs its pair nor clears the store; its waiters
//! get `RefreshError::Interrupted`. The epoch lock is held while credentials
//! are replaced or cleared, so a renewal can never land after a logout.

use std::sync::Arc;
use std::time::Duration;

use portal_auth::{Claims, CredentialStore, TokenPair};
use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::{debug, info, warn};
use transport::Transport;

use crate::error::RefreshError;
use crate::session::SessionState;

type Outcome = std::result::Result<(), RefreshError>;

/// Renewal bookkeeping. The receiver lets late arrivals join the refresh.
enum RefreshState {
    Idle,
    InFlight(watch::Receiver<Option<Outcome>>),
}

/// Whether `access_token` must be renewed before use at `now_millis`.
///
/// True when the token is absent, undecodable, or expires within `threshold`.
pub fn needs_refresh(access_token: Option<&str>, now_millis: u64, threshold: Duration) -> bool {
    let Some(token) = access_token else {
        return true;
    };
    match portal_auth::decode(token) {
        Ok(claims) => {
            let threshold_millis = threshold.as_millis() as u64;
            claims.expires_at_millis() < now_millis.saturating_add(threshold_millis)
        }
        Err(e) => {
            debug!(error = %e, "stored access token is malformed");
            true
        }
    }
}

struct Inner {
    store: Arc<CredentialStore>,
    session: Arc<SessionState>,
    transport: Arc<dyn Transport>,
    refresh_url: String,
    threshold: Duration,
    state: Mutex<RefreshState>,
    /// Bumped by every login and logout.
    epoch: Mutex<u64>,
}

/// Keeps the stored access token fresh.
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        session: Arc<SessionState>,
        transport: Arc<dyn Transport>,
        refresh_url: impl Into<String>,
        threshold: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                session,
                transport,
                refresh_url: refresh_url.into(),
                threshold,
                state: Mutex::new(RefreshState::Idle),
                epoch: Mutex::new(0),
            }),
        }
    }

    pub fn threshold(&self) -> Duration {
        self.inner.threshold
    }

    /// Start a new session epoch, discarding any renewal still in flight.
    /// Hold the guard while replacing or clearing credentials.
    pub(crate) async fn new_epoch(&self) -> MutexGuard<'_, u64> {
        let mut epoch = self.inner.epoch.lock().await;
        *epoch += 1;
        epoch
    }

    /// Make sure the stored access token is usable, renewing it if needed.
    pub async fn ensure_fresh(&self) -> Result<(), RefreshError> {
        let access = self.inner.store.access_token().await;
        if !self.inner.needs_refresh(access.as_deref()) {
            return Ok(());
        }

        let mut outcome_rx = {
            let mut state = self.inner.state.lock().await;
            match &*state {
                RefreshState::InFlight(rx) => {
                    debug!("joining in-flight token refresh");
                    rx.clone()
                }
                RefreshState::Idle => {
                    // A refresh may have finished between the read above and
                    // taking the lock
                    let access = self.inner.store.access_token().await;
                    if !self.inner.needs_refresh(access.as_deref()) {
                        return Ok(());
                    }
                    let epoch = *self.inner.epoch.lock().await;
                    let (tx, rx) = watch::channel(None);
                    *state = RefreshState::InFlight(rx.clone());
                    tokio::spawn(renew(self.inner.clone(), epoch, tx));
                    rx
                }
            }
        };

        let settled = match outcome_rx.wait_for(Option::is_some).await {
            Ok(settled) => (*settled).clone(),
            Err(_) => None,
        };
        match settled {
            Some(outcome) => outcome,
            None => {
                // The renewal task died without settling; don't leave later
                // callers parked on a closed channel
                let mut state = self.inner.state.lock().await;
                if matches!(&*state, RefreshState::InFlight(rx) if rx.has_changed().is_err()) {
                    *state = RefreshState::Idle;
                }
                Err(RefreshError::Interrupted)
            }
        }
    }
}

impl Inner {
    fn needs_refresh(&self, access_token: Option<&str>) -> bool {
        needs_refresh(access_token, portal_auth::now_millis(), self.threshold)
    }

    async fn refresh(&self) -> Result<(TokenPair, Claims), RefreshError> {
        let refresh_token = self
            .store
            .load()
            .await
            .refresh_token
            .ok_or(RefreshError::MissingRefreshToken)?;

        let pair = portal_auth::refresh(self.transport.as_ref(), &self.refresh_url, &refresh_token).await?;
        let claims = portal_auth::decode(&pair.access_token)
            .map_err(|e| RefreshError::MalformedToken(e.to_string()))?;
        Ok((pair, claims))
    }
}

/// Renewal task body. Always settles the channel, even on failure.
async fn renew(inner: Arc<Inner>, started_in: u64, outcome_tx: watch::Sender<Option<Outcome>>) {
    let result = inner.refresh().await;

    let outcome = {
        let epoch = inner.epoch.lock().await;
        if *epoch != started_in {
            metrics::counter!("session_refresh_total", "outcome" => "discarded").increment(1);
            info!(error = ?result.as_ref().err(), "session changed during refresh, discarding result");
            Err(RefreshError::Interrupted)
        } else {
            match result {
                Ok((pair, claims)) => {
                    install(&inner.store, &inner.session, &pair, &claims).await;
                    metrics::counter!("session_refresh_total", "outcome" => "success").increment(1);
                    info!("access token refreshed");
                    Ok(())
                }
                Err(e) => {
                    metrics::counter!("session_refresh_total", "outcome" => "failure").increment(1);
                    warn!(error = %e, "token refresh failed, ending session");
                    inner.session.clear();
                    inner.store.clear().await;
                    Err(e)
                }
            }
        }
    };

    *inner.state.lock().await = RefreshState::Idle;
    outcome_tx.send_replace(Some(outcome));
}

/// Persist a new pair and publish its claims, keeping the stored tenant
/// selection in step with what the session kept.
pub(crate) async fn install(
    store: &CredentialStore,
    session: &SessionState,
    pair: &TokenPair,
    claims: &Claims,
) {
    store
        .save(&pair.access_token, &pair.refresh_token, claims)
        .await;
    session.publish(claims);
    store
        .save_selected_tenant(session.current().selected_tenant)
        .await;
}
