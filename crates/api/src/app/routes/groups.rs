use axum::{
    Json,
    extract::{Path, Query, State, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use keystone_auth::{Group, GroupChanges, GroupField};
use keystone_core::{GroupId, PermissionId, QuerySpec, UserId};
use keystone_infra::Persistable;

use crate::app::errors::{ApiResult, domain_error_to_response, json_body};
use crate::app::routes::common::{ListParams, list_response, not_found, parse_id, query_params};
use crate::app::services::AppServices;

/// Body of POST and PUT.
#[derive(Debug, Deserialize)]
pub struct GroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub user_ids: Option<Vec<UserId>>,
    #[serde(default)]
    pub permission_ids: Option<Vec<PermissionId>>,
}

impl From<GroupRequest> for GroupChanges {
    fn from(body: GroupRequest) -> Self {
        Self {
            name: Some(body.name),
            description: Some(body.description),
            user_ids: body.user_ids,
            permission_ids: body.permission_ids,
        }
    }
}

async fn load(services: &AppServices, id: &str) -> Result<Group, Response> {
    let id: GroupId = parse_id(id)?;
    services
        .store
        .find_group(id)
        .await
        .map_err(domain_error_to_response)?
        .ok_or_else(|| not_found("group", id))
}

pub async fn get_group(State(services): State<AppServices>, Path(id): Path<String>) -> ApiResult {
    let mut group = load(&services, &id).await?;
    group
        .load_all_association_ids(&*services.store)
        .await
        .map_err(domain_error_to_response)?;
    Ok(Json(group).into_response())
}

pub async fn list_groups(
    State(services): State<AppServices>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult {
    let params = query_params(params)?;
    let query = QuerySpec::<GroupField>::new()
        .search(params.search_term())
        .paginate(params.pagination(services.policy.page_size));
    let page = services
        .store
        .list_groups(&query)
        .await
        .map_err(domain_error_to_response)?;
    Ok(list_response(page))
}

pub async fn create_group(
    State(services): State<AppServices>,
    payload: Result<Json<GroupRequest>, JsonRejection>,
) -> ApiResult {
    let body = json_body(payload)?;
    let mut group = Group::new(body.name).with_description(body.description);
    group.user_ids = body.user_ids;
    group.permission_ids = body.permission_ids;

    group
        .create(&*services.store)
        .await
        .map_err(domain_error_to_response)?;

    tracing::info!(id = %group.id, name = %group.name, "group created");
    Ok((StatusCode::CREATED, Json(group)).into_response())
}

pub async fn patch_group(
    State(services): State<AppServices>,
    Path(id): Path<String>,
    payload: Result<Json<GroupChanges>, JsonRejection>,
) -> ApiResult {
    let changes = json_body(payload)?;
    apply_changes(&services, &id, changes).await
}

pub async fn put_group(
    State(services): State<AppServices>,
    Path(id): Path<String>,
    payload: Result<Json<GroupRequest>, JsonRejection>,
) -> ApiResult {
    let body = json_body(payload)?;
    apply_changes(&services, &id, body.into()).await
}

async fn apply_changes(services: &AppServices, id: &str, changes: GroupChanges) -> ApiResult {
    let mut group = load(services, id).await?;
    group.apply(changes);
    group
        .update(&*services.store)
        .await
        .map_err(domain_error_to_response)?;
    group
        .load_all_association_ids(&*services.store)
        .await
        .map_err(domain_error_to_response)?;

    tracing::info!(id = %group.id, "group updated");
    Ok(Json(group).into_response())
}

pub async fn delete_group(State(services): State<AppServices>, Path(id): Path<String>) -> ApiResult {
    let group = load(&services, &id).await?;
    group
        .delete(&*services.store)
        .await
        .map_err(domain_error_to_response)?;

    tracing::info!(id = %group.id, "group deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}
