use crate::{
    auth::jwt::{CallerIdentity, JwtAccessTokenService},
    error::{ErrorCode, ServiceError},
};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use casegate_common::{acl::RoleSet, types::AccessLevel};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    /// Global roles from the token. Case roles are added per request.
    pub roles: RoleSet,
}

impl AuthenticatedUser {
    /// Granted when any held role starts with `unrestricted_prefix`.
    pub fn access_level(&self, unrestricted_prefix: &str) -> AccessLevel {
        if self.roles.iter().any(|role| role.starts_with(unrestricted_prefix)) {
            AccessLevel::Granted
        } else {
            AccessLevel::Restricted
        }
    }
}

pub async fn require_bearer_auth(
    State(jwt_service): State<Arc<JwtAccessTokenService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
    {
        Some(token) => token,
        None => return unauthorized_response("missing bearer token"),
    };

    let CallerIdentity { user_id, roles } = match jwt_service.validate_caller_token(token) {
        Ok(identity) => identity,
        Err(error) => {
            tracing::debug!(error = %error, "rejected bearer token");
            return unauthorized_response("invalid bearer token");
        }
    };

    request.extensions_mut().insert(AuthenticatedUser { user_id, roles });

    next.run(request).await
}

fn extract_bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    Some(token)
}

fn unauthorized_response(message: &'static str) -> Response {
    ServiceError::new(ErrorCode::AuthInvalidToken, message).into_response()
}
