//! Shared request and response plumbing for route handlers

use bson::oid::ObjectId;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use hyper::{HeaderMap, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, warn};

use crate::auth::{extract_token_from_header, PermissionLevel, TokenPurpose};
use crate::db::schemas::UserDoc;
use crate::server::AppState;
use crate::store::settle;
use crate::types::{CommunityError, Result};

pub type HttpResponse = Response<Full<Bytes>>;

/// Largest JSON body accepted
pub const MAX_BODY_BYTES: usize = 10240;

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
    code: &'static str,
}

#[derive(Serialize)]
struct MessageBody<'a> {
    message: &'a str,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// `{"message": ...}`
pub fn message_response(status: StatusCode, message: &str) -> HttpResponse {
    json_response(status, &MessageBody { message })
}

/// `{"message", "code"}` with the error's status. Server faults are logged
/// and masked.
pub fn error_response(err: &CommunityError) -> HttpResponse {
    let status = err.status_code();
    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else {
        warn!("Request rejected ({}): {}", status.as_u16(), err);
    }
    let message = err.public_message();
    json_response(
        status,
        &ErrorBody {
            message: &message,
            code: err.code(),
        },
    )
}

/// Map a handler outcome to a response
pub fn respond(result: Result<HttpResponse>) -> HttpResponse {
    result.unwrap_or_else(|e| error_response(&e))
}

pub fn not_found_response(path: &str) -> HttpResponse {
    error_response(&CommunityError::NotFound(format!("No route for {}", path)))
}

pub fn method_not_allowed() -> HttpResponse {
    message_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

/// Read and decode a JSON request body, giving up once it passes
/// [`MAX_BODY_BYTES`]
pub async fn parse_json_body<T, B>(req: Request<B>) -> Result<T>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                CommunityError::Validation("Request body too large".into())
            } else {
                CommunityError::Validation(format!("Failed to read body: {}", e))
            }
        })?;

    serde_json::from_slice(&body.to_bytes())
        .map_err(|e| CommunityError::Validation(format!("Invalid JSON: {}", e)))
}

/// First value of a query parameter
pub fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(query?)
        .ok()?
        .into_iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
}

/// Parse a hex id from a path segment or body field
pub fn parse_id(raw: &str, what: &str) -> Result<ObjectId> {
    ObjectId::parse_str(raw).map_err(|_| CommunityError::Validation(format!("Invalid {}", what)))
}

/// Resolve the caller from a bearer session token and require `min` level.
///
/// The user record is re-read on every call.
pub async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    min: PermissionLevel,
) -> Result<UserDoc> {
    let auth_header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let token = extract_token_from_header(auth_header)
        .ok_or_else(|| CommunityError::Unauthorized("Authentication required".into()))?;

    let user = session_user(state, token).await?;
    let level = PermissionLevel::of(&user);
    if level < min {
        return Err(match min {
            PermissionLevel::Admin => CommunityError::Forbidden("Admin access required".into()),
            _ => CommunityError::Forbidden("Please verify your email to continue".into()),
        });
    }
    Ok(user)
}

/// The user a session token belongs to
pub async fn session_user(state: &AppState, token: &str) -> Result<UserDoc> {
    let claims = state
        .jwt
        .verify_token(token)
        .claims_for(TokenPurpose::Session)?;
    let user_id = ObjectId::parse_str(&claims.sub)
        .map_err(|_| CommunityError::Unauthorized("Invalid token".into()))?;

    let mut uow = state.store.begin().await?;
    let result = uow.user(user_id).await;
    settle(uow, result)
        .await?
        .ok_or_else(|| CommunityError::Unauthorized("User not found".into()))
}

/// Path split into its non-empty segments
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments() {
        assert_eq!(segments("/posts/abc/comments"), vec!["posts", "abc", "comments"]);
        assert_eq!(segments("/health/"), vec!["health"]);
        assert!(segments("/").is_empty());
    }

    #[test]
    fn test_query_param() {
        assert_eq!(
            query_param(Some("cursor=abc&limit=5"), "limit").as_deref(),
            Some("5")
        );
        assert_eq!(
            query_param(Some("postcode=KA12%208EE"), "postcode").as_deref(),
            Some("KA12 8EE")
        );
        assert_eq!(query_param(None, "limit"), None);
    }

    #[tokio::test]
    async fn test_json_body_limit() {
        let fits = format!(r#"{{"text":"{}"}}"#, "x".repeat(100));
        let value: serde_json::Value = parse_json_body(Request::new(Full::new(Bytes::from(fits))))
            .await
            .unwrap();
        assert_eq!(value["text"].as_str().map(str::len), Some(100));

        let oversized = format!(r#"{{"text":"{}"}}"#, "x".repeat(MAX_BODY_BYTES));
        let result: Result<serde_json::Value> =
            parse_json_body(Request::new(Full::new(Bytes::from(oversized)))).await;
        assert!(matches!(
            result,
            Err(CommunityError::Validation(m)) if m == "Request body too large"
        ));

        let result: Result<serde_json::Value> =
            parse_json_body(Request::new(Full::new(Bytes::from_static(b"{not json")))).await;
        assert!(matches!(result, Err(CommunityError::Validation(m)) if m.starts_with("Invalid JSON")));
    }

    #[test]
    fn test_error_response_masks_internals() {
        let response = error_response(&CommunityError::Database("connection reset".into()));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = error_response(&CommunityError::Forbidden("nope".into()));
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_parse_id() {
        assert!(parse_id("64b7f0c2a1b2c3d4e5f60718", "address id").is_ok());
        assert!(matches!(
            parse_id("nope", "address id"),
            Err(CommunityError::Validation(m)) if m == "Invalid address id"
        ));
    }
}
