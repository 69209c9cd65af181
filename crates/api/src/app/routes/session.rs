//! Login, logout and the caller's own account.

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;

use keystone_infra::{Persistable, UserKey};

use crate::app::errors::{self, ApiResult, domain_error_to_response, json_body};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;
use crate::cookie;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Any failure, including a malformed body, is reported as bad credentials.
pub async fn login(
    State(services): State<AppServices>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult {
    let Ok(body) = json_body(payload) else {
        return Err(errors::invalid_credentials());
    };

    let Some(mut user) = services
        .credentials
        .authenticate(body.username.trim(), &body.password)
        .await
    else {
        return Err(errors::invalid_credentials());
    };

    let token = services
        .sessions
        .create(&user.username, services.policy.session_ttl)
        .await
        .map_err(domain_error_to_response)?;

    user.load_all_association_ids(&*services.store)
        .await
        .map_err(domain_error_to_response)?;

    tracing::info!(username = %user.username, "login");
    Ok((
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            cookie::session_cookie(&token, services.policy.session_ttl),
        )],
        Json(user),
    )
        .into_response())
}

pub async fn logout(
    State(services): State<AppServices>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    services
        .sessions
        .destroy(principal.session())
        .await
        .map_err(domain_error_to_response)?;

    tracing::info!(username = principal.username(), "logout");
    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, cookie::cleared_session_cookie())],
    )
        .into_response())
}

/// A session whose account has since been deleted counts as no session.
pub async fn me(
    State(services): State<AppServices>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    let mut user = services
        .store
        .find_user(UserKey::Username(principal.username()))
        .await
        .map_err(domain_error_to_response)?
        .ok_or_else(errors::unauthenticated)?;

    user.load_all_association_ids(&*services.store)
        .await
        .map_err(domain_error_to_response)?;

    Ok(Json(user).into_response())
}
