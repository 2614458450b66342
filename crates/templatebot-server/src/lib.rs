pub mod auth;
pub mod error;
pub mod routes;
pub mod signature;
pub mod state;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use templatebot_core::config::Config;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let slack = Router::new()
        .route(
            "/slack/interactions",
            post(routes::interactions::slack_interaction),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            signature::require_slack_signature,
        ));

    let events = Router::new()
        .route("/events", post(routes::interactions::post_event))
        .route("/events/render", post(routes::interactions::post_render))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::require_event_token,
        ));

    Router::new()
        .route("/", get(routes::index::get_index))
        // Templates
        .route("/templates", get(routes::templates::list_templates))
        .route("/templates/{name}", get(routes::templates::get_template))
        // Interactions
        .merge(events)
        .merge(slack)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Start the server from `config` on `0.0.0.0:{port}`.
pub async fn serve(config: &Config, port: u16) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    serve_on(state, listener, shutdown_signal()).await
}

/// Serve on a pre-bound listener until `shutdown` resolves, wait up to the
/// shutdown grace for background requests, then delete every cached
/// template checkout. Checkouts are left on disk if requests are still
/// running when the grace expires.
pub async fn serve_on(
    state: AppState,
    listener: tokio::net::TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let port = listener.local_addr()?.port();
    let cache = state.cache().clone();
    let tasks = state.tasks.clone();
    let grace = state.shutdown_grace;
    tracing::info!(
        port,
        repo = cache.url(),
        git_ref = %state.default_ref,
        "templatebot listening"
    );

    // Warm the default ref so the first request does not pay for the clone.
    let warm = state.clone();
    tasks.spawn(async move {
        if let Err(e) = warm.cache().resolve(&warm.default_ref).await {
            tracing::warn!(git_ref = %warm.default_ref, "could not prime template cache: {e}");
        }
    });

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tasks.close();
    if !tasks.is_empty() {
        tracing::info!(pending = tasks.len(), "waiting for in-flight requests");
    }
    if tokio::time::timeout(grace, tasks.wait()).await.is_err() {
        tracing::warn!(
            pending = tasks.len(),
            dir = %cache.cache_dir().display(),
            "requests still running after {grace:?}; leaving template cache in place"
        );
        return Ok(());
    }

    tracing::info!(dir = %cache.cache_dir().display(), "shutting down; purging template cache");
    cache.purge_all().await?;
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT, starting graceful shutdown"),
        () = terminate => tracing::info!("received SIGTERM, starting graceful shutdown"),
    }
}
