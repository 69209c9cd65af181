use axum::{
    Json,
    extract::{Path, Query, State, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use keystone_auth::{User, UserChanges, UserField};
use keystone_core::{GroupId, Operator, PermissionId, QuerySpec, UserId};
use keystone_infra::{Persistable, UserKey};

use crate::app::errors::{ApiResult, domain_error_to_response, json_body};
use crate::app::routes::common::{ListParams, list_response, not_found, parse_id, query_params};
use crate::app::services::AppServices;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    /// Falls back to the configured base password when absent or empty.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub superuser: bool,
    #[serde(default)]
    pub permission_ids: Option<Vec<PermissionId>>,
    #[serde(default)]
    pub group_ids: Option<Vec<GroupId>>,
}

fn default_active() -> bool {
    true
}

/// Partial update; absent fields are left alone.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PatchUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub active: Option<bool>,
    pub superuser: Option<bool>,
    pub permission_ids: Option<Vec<PermissionId>>,
    pub group_ids: Option<Vec<GroupId>>,
}

/// Full replacement of the scalar columns. The password and association
/// sets are still only changed when present.
#[derive(Debug, Deserialize)]
pub struct PutUserRequest {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub superuser: bool,
    #[serde(default)]
    pub permission_ids: Option<Vec<PermissionId>>,
    #[serde(default)]
    pub group_ids: Option<Vec<GroupId>>,
}

impl From<PutUserRequest> for PatchUserRequest {
    fn from(body: PutUserRequest) -> Self {
        Self {
            username: Some(body.username),
            password: body.password,
            display_name: Some(body.display_name),
            phone: Some(body.phone),
            active: Some(body.active),
            superuser: Some(body.superuser),
            permission_ids: body.permission_ids,
            group_ids: body.group_ids,
        }
    }
}

/// `ListParams` plus the user flags. Flattened query structs lose their
/// field types, so the paging fields are repeated.
#[derive(Debug, Default, Deserialize)]
pub struct UserListParams {
    pub page: Option<u32>,
    pub pagesize: Option<u32>,
    pub search: Option<String>,
    pub active: Option<bool>,
    pub superuser: Option<bool>,
}

impl UserListParams {
    fn to_query(&self, default_size: u32) -> QuerySpec<UserField> {
        let list = ListParams {
            page: self.page,
            pagesize: self.pagesize,
            search: self.search.clone(),
        };
        let mut query = QuerySpec::new()
            .search(list.search_term())
            .paginate(list.pagination(default_size));
        if let Some(active) = self.active {
            query = query.filter(UserField::Active, Operator::Eq, active);
        }
        if let Some(superuser) = self.superuser {
            query = query.filter(UserField::Superuser, Operator::Eq, superuser);
        }
        query
    }
}

async fn load(services: &AppServices, id: &str) -> Result<User, axum::response::Response> {
    let id: UserId = parse_id(id)?;
    services
        .store
        .find_user(UserKey::Id(id))
        .await
        .map_err(domain_error_to_response)?
        .ok_or_else(|| not_found("user", id))
}

pub async fn get_user(State(services): State<AppServices>, Path(id): Path<String>) -> ApiResult {
    let mut user = load(&services, &id).await?;
    user.load_all_association_ids(&*services.store)
        .await
        .map_err(domain_error_to_response)?;
    Ok(Json(user).into_response())
}

pub async fn list_users(
    State(services): State<AppServices>,
    params: Result<Query<UserListParams>, QueryRejection>,
) -> ApiResult {
    let params = query_params(params)?;
    let page = services
        .store
        .list_users(&params.to_query(services.policy.page_size))
        .await
        .map_err(domain_error_to_response)?;
    Ok(list_response(page))
}

pub async fn create_user(
    State(services): State<AppServices>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> ApiResult {
    let body = json_body(payload)?;

    let password = match body.password {
        Some(p) if !p.is_empty() => p,
        _ => services.policy.base_password.clone(),
    };
    let hash = services
        .credentials
        .hash_password(&password)
        .await
        .map_err(domain_error_to_response)?;

    let mut user = User::new(body.username, hash)
        .with_display_name(body.display_name)
        .with_phone(body.phone)
        .with_active(body.active)
        .with_superuser(body.superuser);
    user.permission_ids = body.permission_ids;
    user.group_ids = body.group_ids;

    user.create(&*services.store)
        .await
        .map_err(domain_error_to_response)?;

    tracing::info!(id = %user.id, username = %user.username, "user created");
    Ok((StatusCode::CREATED, Json(user)).into_response())
}

pub async fn patch_user(
    State(services): State<AppServices>,
    Path(id): Path<String>,
    payload: Result<Json<PatchUserRequest>, JsonRejection>,
) -> ApiResult {
    let body = json_body(payload)?;
    apply_changes(&services, &id, body).await
}

pub async fn put_user(
    State(services): State<AppServices>,
    Path(id): Path<String>,
    payload: Result<Json<PutUserRequest>, JsonRejection>,
) -> ApiResult {
    let body = json_body(payload)?;
    apply_changes(&services, &id, body.into()).await
}

async fn apply_changes(services: &AppServices, id: &str, body: PatchUserRequest) -> ApiResult {
    let mut user = load(services, id).await?;
    let previous_username = user.username.clone();

    let password_hash = match body.password.as_deref() {
        Some(p) if !p.is_empty() => Some(
            services
                .credentials
                .hash_password(p)
                .await
                .map_err(domain_error_to_response)?,
        ),
        _ => None,
    };
    user.apply(UserChanges {
        username: body.username,
        password_hash,
        display_name: body.display_name,
        phone: body.phone,
        active: body.active,
        superuser: body.superuser,
        permission_ids: body.permission_ids,
        group_ids: body.group_ids,
    });

    user.update(&*services.store)
        .await
        .map_err(domain_error_to_response)?;
    user.load_all_association_ids(&*services.store)
        .await
        .map_err(domain_error_to_response)?;
    if user.username != previous_username {
        end_sessions(services, &previous_username).await?;
    }

    tracing::info!(id = %user.id, "user updated");
    Ok(Json(user).into_response())
}

pub async fn delete_user(State(services): State<AppServices>, Path(id): Path<String>) -> ApiResult {
    let user = load(&services, &id).await?;
    user.delete(&*services.store)
        .await
        .map_err(domain_error_to_response)?;
    end_sessions(&services, &user.username).await?;

    tracing::info!(id = %user.id, username = %user.username, "user deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Sessions name accounts by username, so a freed name must not keep them.
async fn end_sessions(services: &AppServices, username: &str) -> Result<(), Response> {
    let ended = services
        .sessions
        .destroy_for_user(username)
        .await
        .map_err(domain_error_to_response)?;
    if ended > 0 {
        tracing::info!(username, ended, "sessions ended");
    }
    Ok(())
}
