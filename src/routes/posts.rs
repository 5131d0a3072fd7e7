//! Post and comment routes

use hyper::body::Incoming;
use hyper::{Method, Request, StatusCode};

use crate::auth::PermissionLevel;
use crate::community::{CreateComment, CreatePost, PostUpdate};
use crate::routes::helpers::{
    authenticate, json_response, message_response, method_not_allowed, parse_id, parse_json_body,
    respond, HttpResponse,
};
use crate::server::AppState;
use crate::types::Result;

pub async fn handle_post_request(
    req: Request<Incoming>,
    state: &AppState,
    segments: &[&str],
) -> Option<HttpResponse> {
    let method = req.method().clone();
    let response = match (&method, segments) {
        (&Method::POST, ["posts"]) => respond(create(req, state).await),
        (&Method::GET, ["posts", id]) => respond(get(req, state, id).await),
        (&Method::PATCH, ["posts", id]) => respond(update(req, state, id).await),
        (&Method::DELETE, ["posts", id]) => respond(delete(req, state, id).await),
        (&Method::GET, ["posts", id, "comments"]) => respond(comments(req, state, id).await),
        (&Method::POST, ["posts", id, "comments"]) => respond(add_comment(req, state, id).await),
        (_, ["posts", ..]) => method_not_allowed(),
        _ => return None,
    };
    Some(response)
}

async fn create(req: Request<Incoming>, state: &AppState) -> Result<HttpResponse> {
    let user = authenticate(state, req.headers(), PermissionLevel::Verified).await?;
    let body: CreatePost = parse_json_body(req).await?;
    let post = state.posts.create(&user, &body).await?;
    Ok(json_response(StatusCode::CREATED, &post))
}

async fn get(req: Request<Incoming>, state: &AppState, id: &str) -> Result<HttpResponse> {
    let user = authenticate(state, req.headers(), PermissionLevel::Verified).await?;
    let post = state.posts.get(&user, parse_id(id, "post id")?).await?;
    Ok(json_response(StatusCode::OK, &post))
}

async fn update(req: Request<Incoming>, state: &AppState, id: &str) -> Result<HttpResponse> {
    let user = authenticate(state, req.headers(), PermissionLevel::Verified).await?;
    let post_id = parse_id(id, "post id")?;
    let body: PostUpdate = parse_json_body(req).await?;
    let post = state.posts.update(&user, post_id, &body).await?;
    Ok(json_response(StatusCode::OK, &post))
}

async fn delete(req: Request<Incoming>, state: &AppState, id: &str) -> Result<HttpResponse> {
    let user = authenticate(state, req.headers(), PermissionLevel::Verified).await?;
    let message = state.posts.delete(&user, parse_id(id, "post id")?).await?;
    Ok(message_response(StatusCode::OK, message))
}

async fn comments(req: Request<Incoming>, state: &AppState, id: &str) -> Result<HttpResponse> {
    let user = authenticate(state, req.headers(), PermissionLevel::Verified).await?;
    let comments = state.posts.comments(&user, parse_id(id, "post id")?).await?;
    Ok(json_response(StatusCode::OK, &comments))
}

async fn add_comment(req: Request<Incoming>, state: &AppState, id: &str) -> Result<HttpResponse> {
    let user = authenticate(state, req.headers(), PermissionLevel::Verified).await?;
    let post_id = parse_id(id, "post id")?;
    let body: CreateComment = parse_json_body(req).await?;
    let comment = state.posts.add_comment(&user, post_id, &body).await?;
    Ok(json_response(StatusCode::CREATED, &comment))
}
