use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};

use keystone_auth::MANAGE_USER;

use crate::app::services::AppServices;
use crate::middleware::{self, PermissionGate};

pub mod common;
pub mod groups;
pub mod permissions;
pub mod session;
pub mod system;
pub mod users;

/// Everything mounted under `/api/v1`.
pub fn router(services: AppServices) -> Router<AppServices> {
    Router::new()
        .merge(public_routes())
        .merge(session_routes(services.clone()))
        .merge(managed_routes(services))
}

fn public_routes() -> Router<AppServices> {
    Router::new()
        .route("/ping", get(system::ping))
        .route("/user/login", post(session::login))
}

/// Any logged-in user.
fn session_routes(services: AppServices) -> Router<AppServices> {
    Router::new()
        .route("/user/logout", post(session::logout))
        .route("/user/me", get(session::me))
        .route_layer(from_fn_with_state(services, middleware::session_middleware))
}

/// Account administration, gated on `manage_user`.
fn managed_routes(services: AppServices) -> Router<AppServices> {
    let gate = PermissionGate::new(services, MANAGE_USER);
    Router::new()
        .route("/users", get(users::list_users))
        .route("/user", post(users::create_user))
        .route(
            "/user/:id",
            get(users::get_user)
                .patch(users::patch_user)
                .put(users::put_user)
                .delete(users::delete_user),
        )
        .route("/groups", get(groups::list_groups))
        .route("/group", post(groups::create_group))
        .route(
            "/group/:id",
            get(groups::get_group)
                .patch(groups::patch_group)
                .put(groups::put_group)
                .delete(groups::delete_group),
        )
        .route("/permissions", get(permissions::list_permissions))
        .route("/permission", post(permissions::create_permission))
        .route(
            "/permission/:id",
            get(permissions::get_permission)
                .patch(permissions::patch_permission)
                .put(permissions::put_permission)
                .delete(permissions::delete_permission),
        )
        .route_layer(from_fn_with_state(gate, middleware::permission_middleware))
}
