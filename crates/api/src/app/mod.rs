//! HTTP application wiring.
//!
//! - `services.rs`: stores, authorizer, credential checker, sessions
//! - `routes/`: handlers, one file per resource
//! - `errors.rs`: consistent error responses

use axum::Router;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::cors::{OriginPolicy, cors_layer};

pub mod errors;
pub mod routes;
pub mod services;

pub const API_PREFIX: &str = "/api/v1";

/// Build the full HTTP router (used by `main.rs` and the black-box tests).
pub fn build_app(services: services::AppServices, origins: OriginPolicy) -> Router {
    Router::new()
        .nest(API_PREFIX, routes::router(services.clone()))
        .with_state(services)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(LatencyUnit::Millis),
                        ),
                )
                .layer(cors_layer(origins)),
        )
}
