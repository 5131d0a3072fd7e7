//! Address membership routes
//!
//! Thin adapters over [`crate::membership::MembershipCoordinator`]. Every
//! route requires a verified caller; ownership checks happen in the
//! coordinator.

use hyper::body::Incoming;
use hyper::{Method, Request, StatusCode};
use serde::{Deserialize, Serialize};

use crate::auth::PermissionLevel;
use crate::membership::{JoinRequest, JoinStatus};
use crate::routes::helpers::{
    authenticate, json_response, message_response, method_not_allowed, parse_id, parse_json_body,
    respond, HttpResponse,
};
use crate::server::AppState;
use crate::types::Result;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinResponse {
    status: JoinStatus,
    message: &'static str,
    address_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransferBody {
    pub new_owner_id: String,
}

/// The decision routes on a pending request or an active resident
#[derive(Clone, Copy)]
enum Decision {
    Approve,
    Deny,
    Remove,
}

pub async fn handle_address_request(
    req: Request<Incoming>,
    state: &AppState,
    segments: &[&str],
) -> Option<HttpResponse> {
    let method = req.method().clone();
    let response = match (&method, segments) {
        (&Method::POST, ["addresses", "join"]) => respond(join(req, state).await),
        (&Method::POST, ["addresses", address_id, "requests", request_id, "approve"]) => {
            respond(decide(req, state, address_id, request_id, Decision::Approve).await)
        }
        (&Method::POST, ["addresses", address_id, "requests", request_id, "deny"]) => {
            respond(decide(req, state, address_id, request_id, Decision::Deny).await)
        }
        (&Method::POST, ["addresses", address_id, "residents", user_id, "remove"]) => {
            respond(decide(req, state, address_id, user_id, Decision::Remove).await)
        }
        (&Method::POST, ["addresses", address_id, "ownership", "transfer"]) => {
            respond(transfer(req, state, address_id).await)
        }
        (_, ["addresses", ..]) => method_not_allowed(),
        _ => return None,
    };
    Some(response)
}

async fn join(req: Request<Incoming>, state: &AppState) -> Result<HttpResponse> {
    let user = authenticate(state, req.headers(), PermissionLevel::Verified).await?;
    let body: JoinRequest = parse_json_body(req).await?;
    let outcome = state.coordinator.join(user.id, &body).await?;

    Ok(json_response(
        outcome.http_status(),
        &JoinResponse {
            status: outcome.status,
            message: outcome.message,
            address_id: outcome.address_id.to_hex(),
        },
    ))
}

async fn decide(
    req: Request<Incoming>,
    state: &AppState,
    address_id: &str,
    subject_id: &str,
    decision: Decision,
) -> Result<HttpResponse> {
    let user = authenticate(state, req.headers(), PermissionLevel::Verified).await?;
    let address_id = parse_id(address_id, "address id")?;

    let message = match decision {
        Decision::Approve => {
            let request_id = parse_id(subject_id, "request id")?;
            state.coordinator.approve(user.id, address_id, request_id).await?
        }
        Decision::Deny => {
            let request_id = parse_id(subject_id, "request id")?;
            state.coordinator.deny(user.id, address_id, request_id).await?
        }
        Decision::Remove => {
            let target_id = parse_id(subject_id, "user id")?;
            state.coordinator.remove(user.id, address_id, target_id).await?
        }
    };
    Ok(message_response(StatusCode::OK, message))
}

async fn transfer(req: Request<Incoming>, state: &AppState, address_id: &str) -> Result<HttpResponse> {
    let user = authenticate(state, req.headers(), PermissionLevel::Verified).await?;
    let address_id = parse_id(address_id, "address id")?;
    let body: TransferBody = parse_json_body(req).await?;
    let new_owner_id = parse_id(&body.new_owner_id, "newOwnerId")?;

    let message = state.coordinator.transfer(user.id, address_id, new_owner_id).await?;
    Ok(message_response(StatusCode::OK, message))
}
