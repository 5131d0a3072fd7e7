//! Direct message routes

use hyper::body::Incoming;
use hyper::{Method, Request, StatusCode};

use crate::auth::PermissionLevel;
use crate::community::{OpenConversation, SendMessage};
use crate::routes::helpers::{
    authenticate, json_response, method_not_allowed, parse_id, parse_json_body, respond,
    HttpResponse,
};
use crate::server::AppState;
use crate::types::Result;

pub async fn handle_conversation_request(
    req: Request<Incoming>,
    state: &AppState,
    segments: &[&str],
) -> Option<HttpResponse> {
    let method = req.method().clone();
    let response = match (&method, segments) {
        (&Method::POST, ["conversations"]) => respond(open(req, state).await),
        (&Method::GET, ["conversations"]) => respond(list(req, state).await),
        (&Method::GET, ["conversations", id, "messages"]) => respond(messages(req, state, id).await),
        (&Method::POST, ["conversations", id, "messages"]) => respond(send(req, state, id).await),
        (_, ["conversations", ..]) => method_not_allowed(),
        _ => return None,
    };
    Some(response)
}

async fn open(req: Request<Incoming>, state: &AppState) -> Result<HttpResponse> {
    let user = authenticate(state, req.headers(), PermissionLevel::Verified).await?;
    let body: OpenConversation = parse_json_body(req).await?;
    let other_id = parse_id(&body.other_user_id, "otherUserId")?;

    let (conversation, created) = state.conversations.open(&user, other_id).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok(json_response(status, &conversation))
}

async fn list(req: Request<Incoming>, state: &AppState) -> Result<HttpResponse> {
    let user = authenticate(state, req.headers(), PermissionLevel::Verified).await?;
    let conversations = state.conversations.list(&user).await?;
    Ok(json_response(StatusCode::OK, &conversations))
}

async fn messages(req: Request<Incoming>, state: &AppState, id: &str) -> Result<HttpResponse> {
    let user = authenticate(state, req.headers(), PermissionLevel::Verified).await?;
    let messages = state
        .conversations
        .messages(&user, parse_id(id, "conversation id")?)
        .await?;
    Ok(json_response(StatusCode::OK, &messages))
}

async fn send(req: Request<Incoming>, state: &AppState, id: &str) -> Result<HttpResponse> {
    let user = authenticate(state, req.headers(), PermissionLevel::Verified).await?;
    let conversation_id = parse_id(id, "conversation id")?;
    let body: SendMessage = parse_json_body(req).await?;
    let message = state.conversations.send(&user, conversation_id, &body).await?;
    Ok(json_response(StatusCode::CREATED, &message))
}
