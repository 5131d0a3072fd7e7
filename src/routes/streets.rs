//! Street chat over HTTP
//!
//! - `GET /streets/:groupId/chat?cursor=&limit=` history since the caller joined
//! - `POST /streets/:groupId/chat` post a message (also broadcast to sockets)

use hyper::body::Incoming;
use hyper::{Method, Request, StatusCode};
use serde::Deserialize;

use crate::auth::PermissionLevel;
use crate::routes::helpers::{
    authenticate, json_response, method_not_allowed, parse_id, parse_json_body, query_param,
    respond, HttpResponse,
};
use crate::server::AppState;
use crate::types::Result;

#[derive(Deserialize)]
struct PostChat {
    text: String,
}

pub async fn handle_street_request(
    req: Request<Incoming>,
    state: &AppState,
    segments: &[&str],
) -> Option<HttpResponse> {
    let method = req.method().clone();
    let response = match (&method, segments) {
        (&Method::GET, ["streets", group_id, "chat"]) => respond(history(req, state, group_id).await),
        (&Method::POST, ["streets", group_id, "chat"]) => respond(post(req, state, group_id).await),
        (_, ["streets", _, "chat"]) => method_not_allowed(),
        _ => return None,
    };
    Some(response)
}

async fn history(req: Request<Incoming>, state: &AppState, group_id: &str) -> Result<HttpResponse> {
    let user = authenticate(state, req.headers(), PermissionLevel::Verified).await?;
    let street_group_id = parse_id(group_id, "group id")?;

    let query = req.uri().query();
    let cursor = query_param(query, "cursor");
    let limit = query_param(query, "limit").and_then(|l| l.parse::<i64>().ok());

    let page = state
        .chat
        .history(user.id, street_group_id, cursor.as_deref(), limit)
        .await?;
    Ok(json_response(StatusCode::OK, &page))
}

async fn post(req: Request<Incoming>, state: &AppState, group_id: &str) -> Result<HttpResponse> {
    let user = authenticate(state, req.headers(), PermissionLevel::Verified).await?;
    let street_group_id = parse_id(group_id, "group id")?;
    let body: PostChat = parse_json_body(req).await?;

    let message = state.chat.post(user.id, street_group_id, &body.text).await?;
    Ok(json_response(StatusCode::CREATED, &message))
}
