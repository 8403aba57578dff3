//! Observable session projection
//!
//! `SessionState` holds the `Session` derived from the current access token
//! and pushes every change to subscribed observers synchronously, on the
//! caller's task, before `publish`/`clear` return. Observers get the latest
//! value only; there is no history replay. A new subscriber is immediately
//! handed the current value so it never has to poll for the initial state.
//!
//! The lock is released before observers run, so an observer may read the
//! state (or even subscribe others) without deadlocking.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use portal_auth::{Claims, Tenant};
use serde::Serialize;
use tracing::debug;

/// What the rest of the application knows about who is logged in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    pub identity: Option<String>,
    pub is_privileged: bool,
    pub available_tenants: Vec<Tenant>,
    pub selected_tenant: Option<Tenant>,
}

impl Session {
    /// Project `claims`, keeping `selected` only if the claims still grant it.
    fn from_claims(claims: &Claims, selected: Option<&str>) -> Self {
        Self {
            identity: Some(claims.subject.clone()),
            is_privileged: claims.is_privileged(),
            available_tenants: claims.tenants.clone(),
            selected_tenant: selected.and_then(|id| claims.tenant(id)).cloned(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn selected_tenant_id(&self) -> Option<&str> {
        self.selected_tenant.as_ref().map(|t| t.id.as_str())
    }
}

/// Receives every session change.
pub trait SessionObserver: Send + Sync {
    fn session_changed(&self, session: &Session);
}

impl<F> SessionObserver for F
where
    F: Fn(&Session) + Send + Sync,
{
    fn session_changed(&self, session: &Session) {
        self(session)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Inner {
    current: Session,
    observers: Vec<(SubscriptionId, Arc<dyn SessionObserver>)>,
    next_id: u64,
}

#[derive(Default)]
pub struct SessionState {
    inner: Mutex<Inner>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Session {
        self.lock().current.clone()
    }

    pub fn subscribe(&self, observer: Arc<dyn SessionObserver>) -> SubscriptionId {
        let (id, snapshot) = {
            let mut inner = self.lock();
            let id = SubscriptionId(inner.next_id);
            inner.next_id += 1;
            inner.observers.push((id, observer.clone()));
            (id, inner.current.clone())
        };
        observer.session_changed(&snapshot);
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.observers.len();
        inner.observers.retain(|(sid, _)| *sid != id);
        inner.observers.len() != before
    }

    /// Replace the projection with one derived from `claims`.
    ///
    /// The selected tenant carries over when the new claims still list it.
    pub fn publish(&self, claims: &Claims) {
        self.update(|current| {
            let selected = current.selected_tenant_id().map(str::to_owned);
            Session::from_claims(claims, selected.as_deref())
        });
    }

    /// Reset to the empty (logged-out) projection.
    pub fn clear(&self) {
        self.update(|_| Session::default());
    }

    /// Select one of the available tenants. Returns `None`, changing
    /// nothing, when `tenant_id` is not available.
    pub fn select_tenant(&self, tenant_id: &str) -> Option<Tenant> {
        let tenant = self
            .lock()
            .current
            .available_tenants
            .iter()
            .find(|t| t.id == tenant_id)
            .cloned()?;
        let selected = tenant.clone();
        self.update(move |current| Session {
            selected_tenant: Some(selected),
            ..current.clone()
        });
        Some(tenant)
    }

    fn update(&self, next: impl FnOnce(&Session) -> Session) {
        let (snapshot, observers) = {
            let mut inner = self.lock();
            inner.current = next(&inner.current);
            let observers: Vec<_> = inner.observers.iter().map(|(_, o)| o.clone()).collect();
            (inner.current.clone(), observers)
        };
        debug!(
            identity = ?snapshot.identity,
            tenant = ?snapshot.selected_tenant_id(),
            observers = observers.len(),
            "session changed"
        );
        for observer in observers {
            observer.session_changed(&snapshot);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
