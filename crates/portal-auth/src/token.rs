//! Login and refresh endpoint calls
//!
//! Both are plain JSON POSTs that need no bearer token. They return a
//! `TokenPair`; the caller decides how to decode, persist and publish it.
//! The two endpoints name the access token differently (`token` for login,
//! `access_token` for refresh), so each has its own response type.

use std::fmt;

use serde::Deserialize;
use tracing::debug;
use transport::{HttpRequest, HttpResponse, Transport};

use crate::constants::{CHANGE_PASSWORD_PATH, LOGIN_PATH, REFRESH_PATH};
use crate::error::{Error, Result};

/// Endpoint URLs, absolute or relative to the transport's base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub login: String,
    pub refresh: String,
    pub change_password: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: LOGIN_PATH.to_string(),
            refresh: REFRESH_PATH.to_string(),
            change_password: CHANGE_PASSWORD_PATH.to_string(),
        }
    }
}

/// A freshly minted access/refresh pair.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenPair { .. }")
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
    refresh_token: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
}

/// Submit email/password to the login endpoint.
///
/// On a non-success status the server's body is returned verbatim as the
/// error message, so the caller can show it to the user unchanged.
pub async fn login(
    transport: &dyn Transport,
    url: &str,
    email: &str,
    password: &str,
) -> Result<TokenPair> {
    let request = HttpRequest::post_json(
        url,
        serde_json::json!({ "email": email, "password": password }),
    );
    let response = transport
        .send(request)
        .await
        .map_err(|e| Error::Network(e.to_string()))?;

    if !response.is_success() {
        return Err(server_error(response, "login failed"));
    }

    let body: LoginResponse = serde_json::from_str(&response.body)
        .map_err(|e| Error::InvalidResponse(format!("login response: {e}")))?;
    debug!("login endpoint issued a token pair");
    Ok(TokenPair {
        access_token: body.token,
        refresh_token: body.refresh_token,
    })
}

/// Exchange a refresh token for a new pair.
pub async fn refresh(transport: &dyn Transport, url: &str, refresh_token: &str) -> Result<TokenPair> {
    let request = HttpRequest::post_json(
        url,
        serde_json::json!({ "refresh_token": refresh_token }),
    );
    let response = transport
        .send(request)
        .await
        .map_err(|e| Error::Network(e.to_string()))?;

    if !response.is_success() {
        return Err(server_error(response, "token refresh rejected"));
    }

    let body: RefreshResponse = serde_json::from_str(&response.body)
        .map_err(|e| Error::InvalidResponse(format!("refresh response: {e}")))?;
    debug!("refresh endpoint issued a token pair");
    Ok(TokenPair {
        access_token: body.access_token,
        refresh_token: body.refresh_token,
    })
}

fn server_error(response: HttpResponse, fallback: &str) -> Error {
    let message = if response.body.trim().is_empty() {
        format!("{fallback} ({})", response.status)
    } else {
        response.body
    };
    Error::AuthServer {
        status: response.status,
        message,
    }
}
