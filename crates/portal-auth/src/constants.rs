//! Portal API constants

use std::time::Duration;

/// Login endpoint, relative to the API base URL.
pub const LOGIN_PATH: &str = "/api/login";

/// Refresh endpoint, relative to the API base URL.
pub const REFRESH_PATH: &str = "/api/refresh";

/// Change-password endpoint, relative to the API base URL.
pub const CHANGE_PASSWORD_PATH: &str = "/api/change-password";

/// Renew the access token when it has less than this left.
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_millis(120_000);

/// Header carrying the selected tenant id on authenticated requests.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Role claim that marks a global administrator.
pub const PRIVILEGED_ROLE: &str = "global_admin";
