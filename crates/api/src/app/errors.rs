use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use keystone_core::DomainError;

/// Handlers return the error response itself on failure.
pub type ApiResult = Result<Response, Response>;

pub fn domain_error_to_response(err: DomainError) -> Response {
    match err {
        DomainError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        DomainError::ConstraintViolation(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::Malformed(msg) => json_error(StatusCode::BAD_REQUEST, "malformed", msg),
        DomainError::StoreUnavailable(msg) => {
            tracing::warn!(error = %msg, "store unavailable");
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "store_unavailable",
                "the store is temporarily unavailable",
            )
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn unauthenticated() -> Response {
    json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "login required")
}

pub fn forbidden() -> Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", "permission denied")
}

pub fn invalid_credentials() -> Response {
    json_error(
        StatusCode::BAD_REQUEST,
        "invalid_credentials",
        "invalid username or password",
    )
}

/// Unwrap a JSON body, reporting a bad payload the same way as other input errors.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| json_error(StatusCode::BAD_REQUEST, "malformed", rejection.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_statuses() {
        let cases = [
            (DomainError::not_found("user 3"), StatusCode::NOT_FOUND),
            (DomainError::constraint("taken"), StatusCode::CONFLICT),
            (DomainError::malformed("empty"), StatusCode::BAD_REQUEST),
            (DomainError::unavailable("timeout"), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(domain_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn gate_responses() {
        assert_eq!(unauthenticated().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(forbidden().status(), StatusCode::FORBIDDEN);
        assert_eq!(invalid_credentials().status(), StatusCode::BAD_REQUEST);
    }
}
