//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one task per connection, upgrades enabled for
//! the chat socket. Paths are accepted with or without an `/api` prefix.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::chat::StreetChat;
use crate::community::{AccountService, ConversationService, ModerationService, PostService};
use crate::config::Args;
use crate::auth::JwtValidator;
use crate::logging::AuditLogger;
use crate::membership::MembershipCoordinator;
use crate::routes::{self, helpers};
use crate::server::websocket;
use crate::services::{EmailService, PostcodeClient};
use crate::store::Store;
use crate::types::Result;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub store: Arc<dyn Store>,
    pub jwt: JwtValidator,
    /// Sole writer of residency and street membership
    pub coordinator: MembershipCoordinator,
    /// Street chat rooms and history
    pub chat: Arc<StreetChat>,
    pub accounts: AccountService,
    pub posts: PostService,
    pub conversations: ConversationService,
    pub moderation: ModerationService,
    pub postcodes: PostcodeClient,
    pub audit: AuditLogger,
}

impl AppState {
    /// Wire every service onto one store
    pub fn new(args: Args, store: Arc<dyn Store>, audit: AuditLogger) -> Result<Self> {
        let jwt = args.jwt_validator()?;
        let email = EmailService::new(
            args.email_api_url.clone(),
            args.resend_api_key.clone(),
            args.email_from.clone(),
        );
        if !email.is_configured() {
            warn!("RESEND_API_KEY not set - emails will be logged, not sent");
        }

        let coordinator = MembershipCoordinator::new(Arc::clone(&store), audit.clone());

        Ok(Self {
            chat: Arc::new(StreetChat::new(Arc::clone(&store))),
            accounts: AccountService::new(
                Arc::clone(&store),
                jwt.clone(),
                email,
                args.client_origin.clone(),
            ),
            posts: PostService::new(Arc::clone(&store)),
            conversations: ConversationService::new(Arc::clone(&store)),
            moderation: ModerationService::new(Arc::clone(&store), coordinator.clone()),
            postcodes: PostcodeClient::new(args.postcode_api_url.clone()),
            coordinator,
            jwt,
            store,
            audit,
            args,
        })
    }
}

/// Bind the configured address and serve until the process ends
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;
    info!(
        "Connected Community listening on {} ({} store)",
        state.args.listen,
        state.store.backend()
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - do not use in production");
    }

    serve(listener, state).await
}

/// Accept connections on an already bound listener
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let raw_path = req.uri().path().to_string();
    let path = strip_api_prefix(&raw_path).to_string();

    info!("[{}] {} {}", addr, method, path);

    if method == Method::OPTIONS {
        return Ok(to_boxed(with_cors(preflight_response(), &state.args.client_origin)));
    }

    // The upgrade response goes out untouched
    if path == "/ws" {
        return Ok(to_boxed(websocket::handle_chat_upgrade(Arc::clone(&state), req).await));
    }

    let segments = helpers::segments(&path);
    let response = match segments.first().copied() {
        Some("health") if segments.len() == 1 && method == Method::GET => {
            Some(routes::health_check(&state))
        }
        Some("auth") | Some("me") => routes::handle_auth_request(req, &state, &segments).await,
        Some("addresses") => routes::handle_address_request(req, &state, &segments).await,
        Some("streets") => routes::handle_street_request(req, &state, &segments).await,
        Some("posts") => routes::handle_post_request(req, &state, &segments).await,
        Some("conversations") => routes::handle_conversation_request(req, &state, &segments).await,
        Some("reports") | Some("admin") => routes::handle_admin_request(req, &state, &segments).await,
        Some("geo") if segments == ["geo", "resolve-postcode"] && method == Method::GET => {
            Some(helpers::respond(routes::resolve_postcode(&req, &state).await))
        }
        _ => None,
    }
    .unwrap_or_else(|| helpers::not_found_response(&path));

    Ok(to_boxed(with_cors(response, &state.args.client_origin)))
}

/// `/api/foo` and `/foo` route the same
fn strip_api_prefix(path: &str) -> &str {
    match path.strip_prefix("/api") {
        Some("") => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    }
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

fn with_cors(mut response: Response<Full<Bytes>>, origin: &str) -> Response<Full<Bytes>> {
    let headers = response.headers_mut();
    if let Ok(origin) = HeaderValue::from_str(origin) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    }
    response
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PATCH, DELETE, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_api_prefix() {
        assert_eq!(strip_api_prefix("/api/addresses/join"), "/addresses/join");
        assert_eq!(strip_api_prefix("/addresses/join"), "/addresses/join");
        assert_eq!(strip_api_prefix("/api"), "/");
        assert_eq!(strip_api_prefix("/apiary"), "/apiary");
    }

    #[test]
    fn test_preflight_carries_origin() {
        let response = with_cors(preflight_response(), "http://localhost:5173");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5173"
        );
    }
}
