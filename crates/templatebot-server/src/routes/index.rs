use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Metadata {
    pub name: &'static str,
    pub version: &'static str,
}

/// GET /: application name and version, for health checks.
pub async fn get_index() -> Json<Metadata> {
    Json(Metadata {
        name: "templatebot",
        version: env!("CARGO_PKG_VERSION"),
    })
}
