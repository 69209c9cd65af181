//! HTTP API: configuration, routing, session and permission gates.

pub mod app;
pub mod config;
pub mod context;
pub mod cookie;
pub mod cors;
pub mod middleware;
