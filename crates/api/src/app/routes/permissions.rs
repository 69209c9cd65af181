use axum::{
    Json,
    extract::{Path, Query, State, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use keystone_auth::{Permission, PermissionChanges, PermissionField};
use keystone_core::{GroupId, PermissionId, QuerySpec, UserId};
use keystone_infra::{PermissionKey, Persistable};

use crate::app::errors::{ApiResult, domain_error_to_response, json_body};
use crate::app::routes::common::{ListParams, list_response, not_found, parse_id, query_params};
use crate::app::services::AppServices;

/// Body of POST and PUT.
#[derive(Debug, Deserialize)]
pub struct PermissionRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub user_ids: Option<Vec<UserId>>,
    #[serde(default)]
    pub group_ids: Option<Vec<GroupId>>,
}

impl From<PermissionRequest> for PermissionChanges {
    fn from(body: PermissionRequest) -> Self {
        Self {
            name: Some(body.name),
            description: Some(body.description),
            user_ids: body.user_ids,
            group_ids: body.group_ids,
        }
    }
}

async fn load(services: &AppServices, id: &str) -> Result<Permission, Response> {
    let id: PermissionId = parse_id(id)?;
    services
        .store
        .find_permission(PermissionKey::Id(id))
        .await
        .map_err(domain_error_to_response)?
        .ok_or_else(|| not_found("permission", id))
}

pub async fn get_permission(State(services): State<AppServices>, Path(id): Path<String>) -> ApiResult {
    let mut permission = load(&services, &id).await?;
    permission
        .load_all_association_ids(&*services.store)
        .await
        .map_err(domain_error_to_response)?;
    Ok(Json(permission).into_response())
}

pub async fn list_permissions(
    State(services): State<AppServices>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult {
    let params = query_params(params)?;
    let query = QuerySpec::<PermissionField>::new()
        .search(params.search_term())
        .paginate(params.pagination(services.policy.page_size));
    let page = services
        .store
        .list_permissions(&query)
        .await
        .map_err(domain_error_to_response)?;
    Ok(list_response(page))
}

pub async fn create_permission(
    State(services): State<AppServices>,
    payload: Result<Json<PermissionRequest>, JsonRejection>,
) -> ApiResult {
    let body = json_body(payload)?;
    let mut permission = Permission::new(body.name).with_description(body.description);
    permission.user_ids = body.user_ids;
    permission.group_ids = body.group_ids;

    permission
        .create(&*services.store)
        .await
        .map_err(domain_error_to_response)?;

    tracing::info!(id = %permission.id, name = %permission.name, "permission created");
    Ok((StatusCode::CREATED, Json(permission)).into_response())
}

pub async fn patch_permission(
    State(services): State<AppServices>,
    Path(id): Path<String>,
    payload: Result<Json<PermissionChanges>, JsonRejection>,
) -> ApiResult {
    let changes = json_body(payload)?;
    apply_changes(&services, &id, changes).await
}

pub async fn put_permission(
    State(services): State<AppServices>,
    Path(id): Path<String>,
    payload: Result<Json<PermissionRequest>, JsonRejection>,
) -> ApiResult {
    let body = json_body(payload)?;
    apply_changes(&services, &id, body.into()).await
}

async fn apply_changes(services: &AppServices, id: &str, changes: PermissionChanges) -> ApiResult {
    let mut permission = load(services, id).await?;
    permission.apply(changes);
    permission
        .update(&*services.store)
        .await
        .map_err(domain_error_to_response)?;
    permission
        .load_all_association_ids(&*services.store)
        .await
        .map_err(domain_error_to_response)?;

    tracing::info!(id = %permission.id, "permission updated");
    Ok(Json(permission).into_response())
}

pub async fn delete_permission(State(services): State<AppServices>, Path(id): Path<String>) -> ApiResult {
    let permission = load(&services, &id).await?;
    permission
        .delete(&*services.store)
        .await
        .map_err(domain_error_to_response)?;

    tracing::info!(id = %permission.id, "permission deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}
