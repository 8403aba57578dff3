//! Authenticated request gateway
//!
//! Every API call goes through `Gateway::request`, which:
//! 1. runs `ensure_fresh` and short-circuits with `Unauthenticated` if the
//!    session cannot be renewed (the target request is never sent)
//! 2. attaches `Authorization: Bearer <token>` and `X-Tenant-ID` (empty when
//!    no tenant is selected), plus `Content-Type` when there is a JSON body
//! 3. sends the request through the transport and normalizes the outcome
//!
//! A request may therefore renew the token pair as a side effect.

use std::sync::Arc;

use portal_auth::{CredentialStore, TENANT_HEADER};
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use transport::{HttpRequest, Transport};

use crate::error::ApiError;
use crate::refresh::RefreshCoordinator;
use crate::session::SessionState;

pub struct Gateway {
    coordinator: Arc<RefreshCoordinator>,
    store: Arc<CredentialStore>,
    session: Arc<SessionState>,
    transport: Arc<dyn Transport>,
    change_password_url: String,
}

impl Gateway {
    pub fn new(
        coordinator: Arc<RefreshCoordinator>,
        store: Arc<CredentialStore>,
        session: Arc<SessionState>,
        transport: Arc<dyn Transport>,
        change_password_url: impl Into<String>,
    ) -> Self {
        Self {
            coordinator,
            store,
            session,
            transport,
            change_password_url: change_password_url.into(),
        }
    }

    /// Send an authenticated request and parse the JSON response as `T`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, ApiError> {
        let text = self.execute(method, url, body).await?;
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        self.request(Method::GET, url, None).await
    }

    pub async fn post<T, B>(&self, url: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, url, Some(encode(body)?)).await
    }

    pub async fn put<T, B>(&self, url: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PUT, url, Some(encode(body)?)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        self.request(Method::DELETE, url, None).await
    }

    /// Change the logged-in user's password. Only success matters; any
    /// response body is ignored.
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        let body = serde_json::json!({
            "current_password": current_password,
            "new_password": new_password,
        });
        self.execute(Method::POST, &self.change_password_url, Some(body))
            .await
            .map(|_| ())
    }

    /// Run the request and return the success body text. Every outcome is
    /// counted in `gateway_requests_total`.
    async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<String, ApiError> {
        let result = self.send_authorized(method, url, body).await;
        metrics::counter!("gateway_requests_total", "outcome" => outcome(&result)).increment(1);
        result
    }

    async fn send_authorized(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<String, ApiError> {
        if let Err(e) = self.coordinator.ensure_fresh().await {
            warn!(%method, url, error = %e, "no valid session, request not sent");
            return Err(ApiError::Unauthenticated);
        }

        let request = self.authorize(HttpRequest::new(method.clone(), url)).await?;
        let request = match body {
            Some(body) => request
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .json(body),
            None => request,
        };

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(%method, url, error = %e, "request failed without a response");
                return Err(ApiError::Network);
            }
        };

        if !response.is_success() {
            debug!(%method, url, status = response.status, "request returned error status");
            let message = if response.body.is_empty() {
                format!("Request failed: {}", response.status)
            } else {
                response.body
            };
            return Err(ApiError::Status {
                status: response.status,
                message,
            });
        }

        Ok(response.body)
    }

    async fn authorize(&self, request: HttpRequest) -> Result<HttpRequest, ApiError> {
        // A logout can race in after ensure_fresh
        let Some(access) = self.store.access_token().await else {
            return Err(ApiError::Unauthenticated);
        };
        let bearer = HeaderValue::from_str(&format!("Bearer {access}"))
            .map_err(|e| ApiError::Encode(format!("access token is not a valid header: {e}")))?;

        let tenant_id = self.session.current().selected_tenant.map(|t| t.id).unwrap_or_default();
        let tenant = HeaderValue::from_str(&tenant_id)
            .map_err(|e| ApiError::Encode(format!("tenant id is not a valid header: {e}")))?;

        Ok(request
            .header(AUTHORIZATION, bearer)
            .header(HeaderName::from_static(TENANT_HEADER), tenant))
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Encode(e.to_string()))
}

/// Metric label for a request outcome.
fn outcome(result: &Result<String, ApiError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(ApiError::Unauthenticated) => "unauthenticated",
        Err(ApiError::Status { .. }) => "status",
        Err(ApiError::Network) => "network",
        Err(ApiError::Decode(_)) => "decode",
        Err(ApiError::Encode(_)) => "encode",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Fixture, REFRESH_URL, refresh_body, token_expiring_in};
    use serde::Deserialize;
    use transport::TransportError;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Widget {
        id: u32,
        name: String,
    }

    #[tokio::test]
    async fn attaches_bearer_and_empty_tenant_header() {
        let fx = Fixture::logged_in(3600).await;
        fx.transport
            .respond_json("/api/widgets/1", 200, serde_json::json!({"id": 1, "name": "gear"}));

        let widget: Widget = fx.gateway().get("/api/widgets/1").await.unwrap();
        assert_eq!(widget, Widget { id: 1, name: "gear".into() });

        let call = &fx.transport.calls()[0];
        let access = fx.store.access_token().await.unwrap();
        assert_eq!(call.method, Method::GET);
        assert_eq!(call.headers[AUTHORIZATION], format!("Bearer {access}").as_str());
        assert_eq!(call.headers[TENANT_HEADER], "");
        assert!(call.headers.get(CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    async fn selected_tenant_scopes_request() {
        let fx = Fixture::logged_in(3600).await;
        fx.session.select_tenant("t-2").unwrap();
        fx.transport.respond_json("/api/things", 200, serde_json::json!([]));

        let things: Vec<serde_json::Value> = fx.gateway().get("/api/things").await.unwrap();
        assert!(things.is_empty());
        assert_eq!(fx.transport.calls()[0].headers[TENANT_HEADER], "t-2");
    }

    #[tokio::test]
    async fn json_body_sets_content_type() {
        let fx = Fixture::logged_in(3600).await;
        fx.transport
            .respond_json("/api/widgets", 201, serde_json::json!({"id": 7, "name": "cog"}));

        let created: Widget = fx
            .gateway()
            .post("/api/widgets", &serde_json::json!({"name": "cog"}))
            .await
            .unwrap();
        assert_eq!(created.id, 7);

        let call = &fx.transport.calls()[0];
        assert_eq!(call.method, Method::POST);
        assert_eq!(call.headers[CONTENT_TYPE], "application/json");
        assert_eq!(call.body.as_ref().unwrap()["name"], "cog");
    }

    #[tokio::test]
    async fn put_and_delete_use_their_methods() {
        let fx = Fixture::logged_in(3600).await;
        fx.transport.respond_json("/api/widgets/7", 200, serde_json::json!({"ok": true}));
        let gateway = fx.gateway();

        let _: serde_json::Value = gateway.put("/api/widgets/7", &[1, 2, 3]).await.unwrap();
        let _: serde_json::Value = gateway.delete("/api/widgets/7").await.unwrap();

        let calls = fx.transport.calls();
        assert_eq!(calls[0].method, Method::PUT);
        assert_eq!(calls[1].method, Method::DELETE);
    }

    #[tokio::test]
    async fn error_status_carries_body_text() {
        let fx = Fixture::logged_in(3600).await;
        fx.transport.respond("/api/widgets", 409, "name already taken");

        let err = fx.gateway().get::<Widget>("/api/widgets").await.unwrap_err();
        assert_eq!(
            err,
            ApiError::Status {
                status: 409,
                message: "name already taken".into()
            }
        );
    }

    #[tokio::test]
    async fn error_status_without_body_uses_status_message() {
        let fx = Fixture::logged_in(3600).await;
        fx.transport.respond("/api/widgets", 500, "");

        let err = fx.gateway().get::<Widget>("/api/widgets").await.unwrap_err();
        assert_eq!(err.to_string(), "Request failed: 500");
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn no_response_is_network_error() {
        let fx = Fixture::logged_in(3600).await;
        fx.transport
            .fail("/api/widgets", TransportError::Request("connection refused".into()));

        let err = fx.gateway().get::<Widget>("/api/widgets").await.unwrap_err();
        assert_eq!(err, ApiError::Network);
        assert_eq!(err.to_string(), "network error");
    }

    #[tokio::test]
    async fn unparseable_success_body_is_decode_error() {
        let fx = Fixture::logged_in(3600).await;
        fx.transport.respond("/api/widgets/1", 200, "<html>");

        let err = fx.gateway().get::<Widget>("/api/widgets/1").await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn logged_out_request_is_never_sent() {
        let fx = Fixture::empty().await;

        let err = fx.gateway().get::<Widget>("/api/widgets").await.unwrap_err();
        assert!(err.is_unauthenticated());
        assert!(fx.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed_before_request() {
        let fx = Fixture::logged_in(60).await;
        let renewed = token_expiring_in("u1", 3600);
        fx.transport
            .respond_json(REFRESH_URL, 200, refresh_body(&renewed, "R2"));
        fx.transport.respond_json("/api/me", 200, serde_json::json!({"id": 1, "name": "me"}));

        let _: Widget = fx.gateway().get("/api/me").await.unwrap();

        let calls = fx.transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].url, REFRESH_URL);
        assert_eq!(calls[1].url, "/api/me");
        assert_eq!(calls[1].headers[AUTHORIZATION], format!("Bearer {renewed}").as_str());
    }

    #[tokio::test]
    async fn failed_refresh_is_authentication_failure_and_clears_store() {
        let fx = Fixture::logged_in(60).await;
        fx.transport.respond(REFRESH_URL, 401, "");

        let err = fx.gateway().get::<Widget>("/api/me").await.unwrap_err();
        assert_eq!(err, ApiError::Unauthenticated);
        assert_eq!(fx.transport.calls_to("/api/me"), 0);
        assert_eq!(fx.store.load().await, Default::default());
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_refresh() {
        let fx = Fixture::with_delay(60, std::time::Duration::from_millis(30)).await;
        fx.transport.respond_json(
            REFRESH_URL,
            200,
            refresh_body(&token_expiring_in("u1", 3600), "R2"),
        );
        fx.transport.respond_json("/api/a", 200, serde_json::json!({"id": 1, "name": "a"}));
        fx.transport.respond_json("/api/b", 200, serde_json::json!({"id": 2, "name": "b"}));
        let gateway = fx.gateway();

        let (a, b) = tokio::join!(gateway.get::<Widget>("/api/a"), gateway.get::<Widget>("/api/b"));

        assert_eq!(a.unwrap().id, 1);
        assert_eq!(b.unwrap().id, 2);
        assert_eq!(fx.transport.calls_to(REFRESH_URL), 1);
    }

    #[tokio::test]
    async fn change_password_posts_both_passwords() {
        let fx = Fixture::logged_in(3600).await;
        fx.transport.respond(crate::test_support::CHANGE_PASSWORD_URL, 204, "");

        fx.gateway().change_password("old-pw", "new-pw").await.unwrap();

        let call = &fx.transport.calls()[0];
        assert_eq!(call.method, Method::POST);
        assert_eq!(
            call.body.as_ref().unwrap(),
            &serde_json::json!({"current_password": "old-pw", "new_password": "new-pw"})
        );
        assert!(call.headers.contains_key(AUTHORIZATION));
    }

    #[tokio::test]
    async fn change_password_rejection_is_reported() {
        let fx = Fixture::logged_in(3600).await;
        fx.transport
            .respond(crate::test_support::CHANGE_PASSWORD_URL, 400, "current password is wrong");

        let err = fx.gateway().change_password("bad", "new").await.unwrap_err();
        assert_eq!(err.to_string(), "current password is wrong");
    }

    #[test]
    fn every_outcome_has_a_metric_label() {
        assert_eq!(outcome(&Ok(String::new())), "success");
        assert_eq!(outcome(&Err(ApiError::Unauthenticated)), "unauthenticated");
        assert_eq!(
            outcome(&Err(ApiError::Status {
                status: 500,
                message: String::new()
            })),
            "status"
        );
        assert_eq!(outcome(&Err(ApiError::Network)), "network");
        assert_eq!(outcome(&Err(ApiError::Encode("x".into()))), "encode");
    }

    #[tokio::test]
    async fn request_after_logout_is_unauthenticated_without_network() {
        let fx = Fixture::logged_in(3600).await;
        fx.store.clear().await;
        fx.session.clear();

        let err = fx
            .gateway()
            .get::<serde_json::Value>("/api/widgets/1")
            .await
            .unwrap_err();

        assert_eq!(err, ApiError::Unauthenticated);
        assert!(fx.transport.calls().is_empty());
    }
}
