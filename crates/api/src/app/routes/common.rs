use axum::{
    Json,
    extract::{Query, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use keystone_core::{DomainError, Page, Pagination};

use crate::app::errors::{domain_error_to_response, json_error};

/// Paging and search parameters shared by every list endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub pagesize: Option<u32>,
    pub search: Option<String>,
}

impl ListParams {
    pub fn pagination(&self, default_size: u32) -> Pagination {
        Pagination::new(self.page, self.pagesize, default_size)
    }

    pub fn search_term(&self) -> &str {
        self.search.as_deref().unwrap_or_default()
    }
}

pub fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, Response> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| json_error(StatusCode::BAD_REQUEST, "malformed", rejection.body_text()))
}

/// Parse a path id; malformed ids are a 400, never a lookup.
pub fn parse_id<T>(raw: &str) -> Result<T, Response>
where
    T: core::str::FromStr<Err = DomainError>,
{
    raw.parse::<T>().map_err(domain_error_to_response)
}

pub fn list_response<T: Serialize>(page: Page<T>) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "items": page.items, "count": page.total })),
    )
        .into_response()
}

pub fn not_found(kind: &str, id: impl core::fmt::Display) -> Response {
    domain_error_to_response(DomainError::not_found(format!("{kind} {id}")))
}

#[cfg(test)]
mod tests {
    use keystone_core::UserId;

    use super::*;

    #[test]
    fn list_params_fall_back_to_the_configured_size() {
        let params = ListParams {
            page: Some(2),
            pagesize: None,
            search: None,
        };
        let pagination = params.pagination(20);
        assert_eq!(pagination.limit(), Some(20));
        assert_eq!(pagination.offset(), 20);
        assert!(!ListParams::default().pagination(20).is_paged());
    }

    #[test]
    fn path_ids_must_be_non_negative_integers() {
        assert_eq!(parse_id::<UserId>("7").ok(), Some(UserId::new(7)));
        for raw in ["x", "-1", ""] {
            let status = parse_id::<UserId>(raw).err().map(|r| r.status());
            assert_eq!(status, Some(StatusCode::BAD_REQUEST), "{raw:?}");
        }
    }
}
