use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use keystone_auth::PermissionName;

use crate::app::errors::{self, domain_error_to_response};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;
use crate::cookie;

/// State of a route group guarded by one permission.
#[derive(Clone)]
pub struct PermissionGate {
    pub services: AppServices,
    pub permission: PermissionName,
}

impl PermissionGate {
    pub fn new(services: AppServices, permission: PermissionName) -> Self {
        Self { services, permission }
    }
}

/// Require a live session; the principal is attached to the request.
pub async fn session_middleware(
    State(services): State<AppServices>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let principal = resolve_principal(&services, req.headers()).await?;
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

/// Require a live session whose user holds the gate's permission.
///
/// A denied request never reaches the handler.
pub async fn permission_middleware(
    State(gate): State<PermissionGate>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let principal = resolve_principal(&gate.services, req.headers()).await?;

    if !gate
        .services
        .authorizer
        .has_permission(principal.username(), &gate.permission)
        .await
    {
        tracing::info!(
            username = principal.username(),
            permission = %gate.permission,
            method = %req.method(),
            path = req.uri().path(),
            "request denied"
        );
        return Err(errors::forbidden());
    }

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

async fn resolve_principal(services: &AppServices, headers: &HeaderMap) -> Result<PrincipalContext, Response> {
    let token = cookie::session_token(headers).ok_or_else(errors::unauthenticated)?;

    let username = services
        .sessions
        .resolve(&token)
        .await
        .map_err(domain_error_to_response)?
        .ok_or_else(errors::unauthenticated)?;

    Ok(PrincipalContext::new(username, token))
}
