//! Account routes
//!
//! - `POST /auth/register` create an account and mail a verification link
//! - `POST /auth/login` exchange credentials for a session token
//! - `GET /auth/verify?token=` confirm an email address
//! - `GET /me` the caller's identity and placement
//! - `PATCH /me/profile` change first name or postcode

use hyper::body::Incoming;
use hyper::{Method, Request, StatusCode};
use serde::Serialize;

use crate::auth::PermissionLevel;
use crate::community::views::UserView;
use crate::community::{LoginRequest, ProfileUpdate, RegisterRequest};
use crate::routes::helpers::{
    authenticate, json_response, message_response, method_not_allowed, parse_json_body,
    query_param, respond, HttpResponse,
};
use crate::server::AppState;
use crate::types::{CommunityError, Result};

#[derive(Serialize)]
struct ProfileResponse {
    message: &'static str,
    updates: ProfileUpdate,
}

pub async fn handle_auth_request(
    req: Request<Incoming>,
    state: &AppState,
    segments: &[&str],
) -> Option<HttpResponse> {
    let method = req.method().clone();
    let response = match (&method, segments) {
        (&Method::POST, ["auth", "register"]) => respond(register(req, state).await),
        (&Method::POST, ["auth", "login"]) => respond(login(req, state).await),
        (&Method::GET, ["auth", "verify"]) => respond(verify(req, state).await),
        (&Method::GET, ["me"]) => respond(me(req, state).await),
        (&Method::PATCH, ["me", "profile"]) => respond(update_profile(req, state).await),
        (_, ["auth", "register" | "login" | "verify"]) | (_, ["me"]) | (_, ["me", "profile"]) => {
            method_not_allowed()
        }
        _ => return None,
    };
    Some(response)
}

async fn register(req: Request<Incoming>, state: &AppState) -> Result<HttpResponse> {
    let body: RegisterRequest = parse_json_body(req).await?;
    let message = state.accounts.register(&body).await?;
    Ok(message_response(StatusCode::CREATED, message))
}

async fn login(req: Request<Incoming>, state: &AppState) -> Result<HttpResponse> {
    let body: LoginRequest = parse_json_body(req).await?;
    let session = state.accounts.login(&body).await?;
    Ok(json_response(StatusCode::OK, &session))
}

async fn verify(req: Request<Incoming>, state: &AppState) -> Result<HttpResponse> {
    let token = query_param(req.uri().query(), "token")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| CommunityError::Validation("token is required".into()))?;
    let message = state.accounts.verify_email(&token).await?;
    Ok(message_response(StatusCode::OK, message))
}

async fn me(req: Request<Incoming>, state: &AppState) -> Result<HttpResponse> {
    let user = authenticate(state, req.headers(), PermissionLevel::Authenticated).await?;
    Ok(json_response(StatusCode::OK, &UserView::from(&user)))
}

async fn update_profile(req: Request<Incoming>, state: &AppState) -> Result<HttpResponse> {
    let user = authenticate(state, req.headers(), PermissionLevel::Authenticated).await?;
    let body: ProfileUpdate = parse_json_body(req).await?;
    let updates = state.accounts.update_profile(user.id, &body).await?;
    Ok(json_response(
        StatusCode::OK,
        &ProfileResponse {
            message: "Profile updated",
            updates,
        },
    ))
}
