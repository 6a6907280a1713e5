use crate::server::{ServerRouter, json::Json};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use murmur_db::store::FeedStore;
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::warn;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(health)
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize)]
enum DatabaseStatus {
    Connected,
    Disconnected,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct HealthResponse {
    success: bool,
    message: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    database: DatabaseStatus,
}

#[derive(TypedPath)]
#[typed_path("/api/health")]
struct HealthPath;

/// Liveness plus a round trip to the store. Always answers 200; a broken
/// store only shows up in `database`.
async fn health(_: HealthPath, State(store): State<Arc<dyn FeedStore>>) -> Json<HealthResponse> {
    let database = match store.ping().await {
        Ok(()) => DatabaseStatus::Connected,
        Err(err) => {
            warn!(error = %err, "Health check could not reach the store");
            DatabaseStatus::Disconnected
        }
    };

    Json(HealthResponse {
        success: true,
        message: "Server is running",
        timestamp: OffsetDateTime::now_utc(),
        database,
    })
}
