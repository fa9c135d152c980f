//! Request authorization seam.
//!
//! Every metadata and query request passes through a [`RequestAuthorizer`],
//! which decides whether the caller may touch the named connection and
//! which engine security role the request runs under. The default allows
//! everything with no role; bearer-token mode maps static tokens to a role
//! per connection.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

use cubist_core::config::{AuthMode, AuthSettings};

/// Outcome of an authorization check. A denied status carries a message
/// for the log, never for the response body.
#[derive(Debug, Clone)]
pub struct AuthorizationStatus {
    pub authorized: bool,
    pub role: Option<String>,
    pub token: Option<String>,
    pub message: Option<String>,
}

impl AuthorizationStatus {
    pub fn allowed(role: Option<String>, token: Option<String>) -> Self {
        AuthorizationStatus {
            authorized: true,
            role,
            token,
            message: None,
        }
    }

    pub fn denied(message: impl Into<String>) -> Self {
        AuthorizationStatus {
            authorized: false,
            role: None,
            token: None,
            message: Some(message.into()),
        }
    }
}

pub trait RequestAuthorizer: Send + Sync {
    fn authorize(&self, headers: &HeaderMap, connection_name: &str) -> AuthorizationStatus;
}

/// Admits every request with no role restriction.
#[derive(Debug, Default)]
pub struct AllowAllAuthorizer;

impl RequestAuthorizer for AllowAllAuthorizer {
    fn authorize(&self, _headers: &HeaderMap, _connection_name: &str) -> AuthorizationStatus {
        AuthorizationStatus::allowed(None, None)
    }
}

/// Maps static bearer tokens to a role per connection. The role value "*"
/// grants access without a role restriction.
#[derive(Debug, Default)]
pub struct BearerTokenAuthorizer {
    tokens: HashMap<String, HashMap<String, String>>,
}

impl BearerTokenAuthorizer {
    pub fn new(tokens: HashMap<String, HashMap<String, String>>) -> Self {
        BearerTokenAuthorizer { tokens }
    }

    fn bearer_token(headers: &HeaderMap) -> Option<&str> {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
    }
}

impl RequestAuthorizer for BearerTokenAuthorizer {
    fn authorize(&self, headers: &HeaderMap, connection_name: &str) -> AuthorizationStatus {
        let Some(token) = Self::bearer_token(headers) else {
            return AuthorizationStatus::denied("request carries no bearer token");
        };
        let Some(connections) = self.tokens.get(token) else {
            return AuthorizationStatus::denied(format!("unrecognized bearer token {token}"));
        };
        let Some(role) = connections.get(connection_name) else {
            return AuthorizationStatus::denied(format!(
                "token {token} is not authorized for connection {connection_name}"
            ));
        };
        let role = if role == "*" {
            None
        } else {
            Some(role.clone())
        };
        AuthorizationStatus::allowed(role, Some(token.to_string()))
    }
}

/// Build the authorizer the configuration asks for.
pub fn authorizer_from_settings(settings: &AuthSettings) -> Arc<dyn RequestAuthorizer> {
    match settings.mode {
        AuthMode::AllowAll => Arc::new(AllowAllAuthorizer),
        AuthMode::BearerToken => Arc::new(BearerTokenAuthorizer::new(settings.tokens.clone())),
    }
}
