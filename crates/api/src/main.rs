use anyhow::Context;

use keystone_api::app::{self, services::AppServices};
use keystone_api::config::Settings;
use keystone_api::cors::OriginPolicy;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    keystone_observability::init(&settings.log_settings())?;

    let origins = OriginPolicy::new(&settings.app.cors_origins).context("invalid app.cors_origins pattern")?;
    if origins.is_empty() {
        tracing::info!("no CORS origins configured; cross-origin requests are refused");
    }

    let services = AppServices::from_settings(&settings)
        .await
        .context("failed to open the store")?;

    if let (Some(username), Some(password)) = (&settings.bootstrap.superuser, &settings.bootstrap.password) {
        services
            .ensure_superuser(username, password)
            .await
            .context("failed to create the bootstrap superuser")?;
    }

    let cleanup = keystone_infra::spawn_periodic_cleanup(services.sessions.clone(), settings.session_cleanup_interval());

    let app = app::build_app(services, origins);

    let addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        name = %settings.app.name,
        run_mode = ?settings.app.run_mode,
        "listening on {}",
        listener.local_addr()?
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    cleanup.abort();
    served.context("server error")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
