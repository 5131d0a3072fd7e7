//! Liveness check

use hyper::StatusCode;
use serde::Serialize;

use crate::routes::helpers::{json_response, HttpResponse};
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub store: &'static str,
    pub timestamp: String,
    #[serde(rename = "chatRooms")]
    pub chat_rooms: usize,
}

pub fn health_check(state: &AppState) -> HttpResponse {
    json_response(
        StatusCode::OK,
        &HealthResponse {
            healthy: true,
            version: env!("CARGO_PKG_VERSION"),
            store: state.store.backend(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            chat_rooms: state.chat.rooms().room_count(),
        },
    )
}
