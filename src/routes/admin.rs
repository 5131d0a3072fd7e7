//! Reports and admin console routes
//!
//! `POST /reports` is open to any verified user; everything under `/admin`
//! requires an admin.

use hyper::body::Incoming;
use hyper::{Method, Request, StatusCode};

use crate::auth::PermissionLevel;
use crate::community::{CreateReport, ReportAction};
use crate::routes::addresses::TransferBody;
use crate::routes::helpers::{
    authenticate, json_response, message_response, method_not_allowed, parse_id, parse_json_body,
    query_param, respond, HttpResponse,
};
use crate::server::AppState;
use crate::types::{CommunityError, Result};

pub async fn handle_admin_request(
    req: Request<Incoming>,
    state: &AppState,
    segments: &[&str],
) -> Option<HttpResponse> {
    let method = req.method().clone();
    let response = match (&method, segments) {
        (&Method::POST, ["reports"]) => respond(file_report(req, state).await),
        (&Method::GET, ["admin", "stats"]) => respond(stats(req, state).await),
        (&Method::PATCH, ["admin", "users", id, "toggle-admin"]) => {
            respond(toggle_admin(req, state, id).await)
        }
        (&Method::GET, ["admin", "reports"]) => respond(open_reports(req, state).await),
        (&Method::POST, ["admin", "reports", id, "action"]) => {
            respond(act_on_report(req, state, id).await)
        }
        (&Method::GET, ["admin", "addresses"]) => respond(addresses(req, state).await),
        (&Method::POST, ["admin", "addresses", id, "transfer-owner"]) => {
            respond(transfer_owner(req, state, id).await)
        }
        (_, ["reports"]) | (_, ["admin", ..]) => method_not_allowed(),
        _ => return None,
    };
    Some(response)
}

async fn file_report(req: Request<Incoming>, state: &AppState) -> Result<HttpResponse> {
    let user = authenticate(state, req.headers(), PermissionLevel::Verified).await?;
    let body: CreateReport = parse_json_body(req).await?;
    let report = state.moderation.report(&user, &body).await?;
    Ok(json_response(StatusCode::CREATED, &report))
}

async fn stats(req: Request<Incoming>, state: &AppState) -> Result<HttpResponse> {
    authenticate(state, req.headers(), PermissionLevel::Admin).await?;
    let stats = state.moderation.stats().await?;
    Ok(json_response(StatusCode::OK, &stats))
}

async fn toggle_admin(req: Request<Incoming>, state: &AppState, id: &str) -> Result<HttpResponse> {
    let admin = authenticate(state, req.headers(), PermissionLevel::Admin).await?;
    let outcome = state
        .moderation
        .toggle_admin(&admin, parse_id(id, "user id")?)
        .await?;
    Ok(json_response(StatusCode::OK, &outcome))
}

async fn open_reports(req: Request<Incoming>, state: &AppState) -> Result<HttpResponse> {
    authenticate(state, req.headers(), PermissionLevel::Admin).await?;
    let reports = state.moderation.open_reports().await?;
    Ok(json_response(StatusCode::OK, &reports))
}

async fn act_on_report(req: Request<Incoming>, state: &AppState, id: &str) -> Result<HttpResponse> {
    let admin = authenticate(state, req.headers(), PermissionLevel::Admin).await?;
    let report_id = parse_id(id, "report id")?;
    let body: ReportAction = parse_json_body(req).await?;
    let report = state
        .moderation
        .act_on_report(&admin, report_id, body.action)
        .await?;
    Ok(json_response(StatusCode::OK, &report))
}

async fn addresses(req: Request<Incoming>, state: &AppState) -> Result<HttpResponse> {
    authenticate(state, req.headers(), PermissionLevel::Admin).await?;
    let postcode = query_param(req.uri().query(), "postcode")
        .ok_or_else(|| CommunityError::Validation("postcode is required".into()))?;
    let listing = state.moderation.addresses_by_postcode(&postcode).await?;
    Ok(json_response(StatusCode::OK, &listing))
}

async fn transfer_owner(req: Request<Incoming>, state: &AppState, id: &str) -> Result<HttpResponse> {
    let admin = authenticate(state, req.headers(), PermissionLevel::Admin).await?;
    let address_id = parse_id(id, "address id")?;
    let body: TransferBody = parse_json_body(req).await?;
    let new_owner_id = parse_id(&body.new_owner_id, "newOwnerId")?;

    let message = state
        .moderation
        .transfer_owner(&admin, address_id, new_owner_id)
        .await?;
    Ok(message_response(StatusCode::OK, message))
}
