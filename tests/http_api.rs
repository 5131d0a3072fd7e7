//! HTTP and WebSocket surface, served on an ephemeral port over the
//! in-memory store

mod common;

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use common::*;
use connected_community::logging::AuditLogger;
use connected_community::store::{Store, UnitOfWork};
use connected_community::{serve, AppState, Args};

struct TestServer {
    addr: SocketAddr,
    store: Arc<dyn Store>,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let args = Args::try_parse_from(["connected-community", "--dev-mode", "--memory-store"])
            .unwrap();
        let store = memory_store();
        let state = Arc::new(AppState::new(args, Arc::clone(&store), AuditLogger::new()).unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state));

        Self {
            addr,
            store,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Register, verify and log in; returns the session token
    async fn signed_in(&self, first_name: &str) -> String {
        let email = format!("{}@example.com", first_name.to_lowercase());
        let response = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "email": email,
                "password": "correct-horse",
                "firstName": first_name,
                "postcode": "KA12 8EE",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);

        mark_verified(&self.store, &email).await;
        self.login(&email).await
    }

    async fn login(&self, email: &str) -> String {
        let response = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": "correct-horse" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    async fn join_high_street(&self, token: &str) -> (u16, Value) {
        let response = self
            .client
            .post(self.url("/api/addresses/join"))
            .bearer_auth(token)
            .json(&json!({
                "line1": "1 High Street",
                "postcode": "KA12 8EE",
                "town": "Irvine",
                "streetName": "High Street",
            }))
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn me(&self, token: &str) -> Value {
        self.client
            .get(self.url("/api/me"))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;

    let response = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["healthy"], true);
    assert_eq!(body["store"], "memory");

    let prefixed = server.client.get(server.url("/api/health")).send().await.unwrap();
    assert_eq!(prefixed.status(), 200);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let server = TestServer::start().await;
    let response = server.client.get(server.url("/api/nowhere")).send().await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_preflight() {
    let server = TestServer::start().await;
    let response = server
        .client
        .request(reqwest::Method::OPTIONS, server.url("/api/addresses/join"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "http://localhost:5173"
    );
}

#[tokio::test]
async fn test_identity_gate() {
    let server = TestServer::start().await;

    let anonymous = server
        .client
        .post(server.url("/api/addresses/join"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), 401);

    let forged = server
        .client
        .get(server.url("/api/me"))
        .bearer_auth("not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status(), 401);

    // Registered but not yet verified
    let register = server
        .client
        .post(server.url("/api/auth/register"))
        .json(&json!({
            "email": "una@example.com",
            "password": "correct-horse",
            "firstName": "Una",
            "postcode": "KA12 8EE",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(register.status(), 201);
    let token = server.login("una@example.com").await;

    let me = server.me(&token).await;
    assert_eq!(me["firstName"], "Una");
    assert!(me["emailVerifiedAt"].is_null());

    let (status, body) = server.join_high_street(&token).await;
    assert_eq!(status, 403);
    assert_eq!(body["message"], "Please verify your email to continue");
}

#[tokio::test]
async fn test_register_conflict_and_bad_login() {
    let server = TestServer::start().await;
    server.signed_in("Alice").await;

    let duplicate = server
        .client
        .post(server.url("/api/auth/register"))
        .json(&json!({
            "email": "ALICE@example.com",
            "password": "correct-horse",
            "firstName": "Alice",
            "postcode": "KA12 8EE",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), 409);

    let wrong = server
        .client
        .post(server.url("/api/auth/login"))
        .json(&json!({ "email": "alice@example.com", "password": "wrong-horse" }))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), 401);

    let malformed = server
        .client
        .post(server.url("/api/auth/login"))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), 400);
}

#[tokio::test]
async fn test_membership_over_http() {
    let server = TestServer::start().await;
    let alice = server.signed_in("Alice").await;
    let bob = server.signed_in("Bob").await;

    let (status, claimed) = server.join_high_street(&alice).await;
    assert_eq!(status, 201);
    assert_eq!(claimed["status"], "OWNER");
    let address_id = claimed["addressId"].as_str().unwrap().to_string();

    let (status, pending) = server.join_high_street(&bob).await;
    assert_eq!(status, 202);
    assert_eq!(pending["status"], "PENDING");

    let (status, again) = server.join_high_street(&bob).await;
    assert_eq!(status, 202);
    assert_eq!(again["message"], "Request already submitted");

    // The request id is the caller's resident record
    let bob_id = server.me(&bob).await["id"].as_str().unwrap().to_string();
    let mut uow = server.store.begin().await.unwrap();
    let records = uow
        .residents(
            &connected_community::store::ResidentQuery::at(
                bson::oid::ObjectId::parse_str(&address_id).unwrap(),
            ),
        )
        .await
        .unwrap();
    uow.abort().await.unwrap();
    let request_id = records
        .iter()
        .find(|r| r.user_id.to_hex() == bob_id)
        .unwrap()
        .id
        .to_hex();

    let by_bob = server
        .client
        .post(server.url(&format!(
            "/api/addresses/{}/requests/{}/approve",
            address_id, request_id
        )))
        .bearer_auth(&bob)
        .send()
        .await
        .unwrap();
    assert_eq!(by_bob.status(), 403);

    let approved = server
        .client
        .post(server.url(&format!(
            "/api/addresses/{}/requests/{}/approve",
            address_id, request_id
        )))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(approved.status(), 200);

    let twice = server
        .client
        .post(server.url(&format!(
            "/api/addresses/{}/requests/{}/approve",
            address_id, request_id
        )))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(twice.status(), 400);

    let transferred = server
        .client
        .post(server.url(&format!("/api/addresses/{}/ownership/transfer", address_id)))
        .bearer_auth(&alice)
        .json(&json!({ "newOwnerId": bob_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(transferred.status(), 200);

    assert_eq!(server.me(&alice).await["addressRole"], "RESIDENT");
    let bob_me = server.me(&bob).await;
    assert_eq!(bob_me["addressRole"], "OWNER");
    assert_eq!(bob_me["addressId"], address_id.as_str());

    let bad_id = server
        .client
        .post(server.url("/api/addresses/not-an-id/ownership/transfer"))
        .bearer_auth(&alice)
        .json(&json!({ "newOwnerId": bob_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_id.status(), 400);
}

#[tokio::test]
async fn test_street_chat_over_http() {
    let server = TestServer::start().await;
    let alice = server.signed_in("Alice").await;
    let olly = server.signed_in("Olly").await;

    server.join_high_street(&alice).await;
    let street_id = server.me(&alice).await["streetGroupId"]
        .as_str()
        .unwrap()
        .to_string();
    let chat_url = server.url(&format!("/api/streets/{}/chat", street_id));

    let posted = server
        .client
        .post(&chat_url)
        .bearer_auth(&alice)
        .json(&json!({ "text": "Hello street" }))
        .send()
        .await
        .unwrap();
    assert_eq!(posted.status(), 201);
    let message: Value = posted.json().await.unwrap();
    assert_eq!(message["senderName"], "Alice");

    let page: Value = server
        .client
        .get(&chat_url)
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["messages"].as_array().unwrap().len(), 1);
    assert_eq!(page["messages"][0]["text"], "Hello street");
    assert!(page["nextCursor"].is_null());

    let outsider = server
        .client
        .get(&chat_url)
        .bearer_auth(&olly)
        .send()
        .await
        .unwrap();
    assert_eq!(outsider.status(), 403);
}

#[tokio::test]
async fn test_chat_socket_round_trip() {
    let server = TestServer::start().await;
    let alice = server.signed_in("Alice").await;
    server.join_high_street(&alice).await;
    let street_id = server.me(&alice).await["streetGroupId"]
        .as_str()
        .unwrap()
        .to_string();

    let refused = tokio_tungstenite::connect_async(format!("ws://{}/ws", server.addr)).await;
    assert!(refused.is_err());

    let (mut socket, _) =
        tokio_tungstenite::connect_async(format!("ws://{}/ws?token={}", server.addr, alice))
            .await
            .unwrap();

    let join = json!({ "type": "streetGroup:join", "groupId": street_id });
    socket.send(Message::Text(join.to_string())).await.unwrap();
    let say = json!({ "type": "streetGroup:message", "groupId": street_id, "text": "over the socket" });
    socket.send(Message::Text(say.to_string())).await.unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => break text,
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {:?}", other),
            }
        }
    })
    .await
    .unwrap();

    let frame: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(frame["type"], "streetGroup:message");
    assert_eq!(frame["message"]["text"], "over the socket");
    assert_eq!(frame["message"]["streetGroupId"], street_id.as_str());
}
