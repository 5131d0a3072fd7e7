//! Chat socket upgrade
//!
//! The session token comes from `?token=` or the `Authorization` header and
//! is checked before the upgrade; a missing or invalid token gets `401`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::{extract_token_from_header, extract_token_from_query};
use crate::chat::socket;
use crate::routes::helpers::{error_response, session_user};
use crate::server::http::AppState;
use crate::types::CommunityError;

/// Handle the WebSocket upgrade for street chat
pub async fn handle_chat_upgrade(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    if !hyper_tungstenite::is_upgrade_request(&req) {
        return error_response(&CommunityError::Validation(
            "WebSocket upgrade required".into(),
        ));
    }

    let token = extract_token_from_query(req.uri().query()).or_else(|| {
        let auth_header = req
            .headers()
            .get(hyper::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        extract_token_from_header(auth_header).map(str::to_string)
    });
    let Some(token) = token else {
        warn!("Chat socket rejected: no token");
        return error_response(&CommunityError::Unauthorized("Authentication required".into()));
    };

    let user = match session_user(&state, &token).await {
        Ok(user) => user,
        Err(e) => {
            warn!("Chat socket rejected: {}", e);
            return error_response(&e);
        }
    };

    let (response, websocket) = match hyper_tungstenite::upgrade(req, None) {
        Ok(upgrade) => upgrade,
        Err(e) => {
            error!("WebSocket upgrade error: {:?}", e);
            let mut response = Response::new(Full::new(Bytes::from("WebSocket upgrade failed")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return response;
        }
    };

    info!("Chat socket upgrade for user {}", user.id);
    let chat = Arc::clone(&state.chat);
    tokio::spawn(async move {
        match websocket.await {
            Ok(ws) => {
                if let Err(e) = socket::run_session(ws, chat, user.id).await {
                    warn!("Chat socket error: {}", e);
                }
            }
            Err(e) => {
                error!("WebSocket connection failed: {}", e);
            }
        }
    });

    // Convert the upgrade response
    let (parts, _) = response.into_parts();
    Response::from_parts(parts, Full::new(Bytes::new()))
}
