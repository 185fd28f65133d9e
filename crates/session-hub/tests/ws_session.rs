//! End-to-end tests: real bound server, real WebSocket clients.
//!
//! The server runs on an ephemeral port with the in-memory repository;
//! clients speak the wire protocol through tokio-tungstenite and the
//! REST surface through reqwest.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use session_hub::actors::hub::HubHandle;
use session_hub::auth::AuthGate;
use session_hub::config::Config;
use session_hub::registry::SessionRegistry;
use session_hub::repositories::MemorySessionRepository;
use session_hub::routes::{build_routes, AppState};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    hub: HubHandle,
}

impl TestServer {
    async fn spawn() -> Self {
        let vars = HashMap::from([(
            "HUB_TOKEN_SECRET".to_string(),
            "e2e-test-secret".to_string(),
        )]);
        let config = Config::from_vars(&vars).expect("test config");

        let hub = HubHandle::new();
        let state = Arc::new(AppState {
            repo: Arc::new(MemorySessionRepository::new()),
            hub: hub.clone(),
            registry: Arc::new(SessionRegistry::new()),
            auth: AuthGate::new(config.token_secret.clone()),
            config,
        });

        let app = build_routes(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("server task");
        });

        Self { addr, hub }
    }

    fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn ws_client(&self) -> WsClient {
        let (client, _) = connect_async(format!("ws://{}/ws", self.addr))
            .await
            .expect("ws connect");
        client
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.hub.cancel();
    }
}

async fn send_json(client: &mut WsClient, value: Value) {
    client
        .send(Message::Text(value.to_string()))
        .await
        .expect("ws send");
}

/// Next text frame as JSON, skipping transport frames.
async fn recv_json(client: &mut WsClient) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("ws error");

        match frame {
            Message::Text(text) => return serde_json::from_str(&text).expect("valid json"),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// True once the stream has closed (close frame or EOF).
async fn closed(client: &mut WsClient) -> bool {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), client.next()).await {
            Err(_) => return false,
            Ok(None) => return true,
            Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return true,
            Ok(Some(Ok(_))) => {}
        }
    }
}

#[tokio::test]
async fn join_receives_full_history_sync() {
    let server = TestServer::spawn().await;
    let http = reqwest::Client::new();

    // Seed history over REST
    let response = http
        .put(server.http_url("/v1/rooms/demo/history"))
        .json(&json!({"history": [3, "00", 17]}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let mut client = server.ws_client().await;
    send_json(&mut client, json!({"kind": "join", "key": "demo"})).await;

    let sync = recv_json(&mut client).await;
    assert_eq!(sync["kind"], "sync");
    assert_eq!(sync["key"], "demo");
    assert_eq!(sync["history"], json!([3, "00", 17]));
    assert_eq!(sync["full"], true);
}

#[tokio::test]
async fn add_is_broadcast_to_all_members_with_version() {
    let server = TestServer::spawn().await;

    let mut alice = server.ws_client().await;
    let mut bob = server.ws_client().await;

    send_json(&mut alice, json!({"kind": "join", "key": "shared"})).await;
    assert_eq!(recv_json(&mut alice).await["kind"], "sync");

    send_json(&mut bob, json!({"kind": "join", "key": "shared"})).await;
    assert_eq!(recv_json(&mut bob).await["kind"], "sync");

    send_json(&mut alice, json!({"kind": "add", "number": 17})).await;

    for client in [&mut alice, &mut bob] {
        let update = recv_json(client).await;
        assert_eq!(update["kind"], "add");
        assert_eq!(update["number"], 17);
        assert_eq!(update["version"], 1);
    }

    // The append was persisted
    let history: Value = reqwest::get(server.http_url("/v1/rooms/shared/history"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["history"], json!([17]));
}

#[tokio::test]
async fn remove_is_broadcast_and_persisted() {
    let server = TestServer::spawn().await;
    let http = reqwest::Client::new();

    http.put(server.http_url("/v1/rooms/trim/history"))
        .json(&json!({"history": [5, 10, 15]}))
        .send()
        .await
        .unwrap();

    let mut client = server.ws_client().await;
    send_json(&mut client, json!({"kind": "join", "key": "trim"})).await;
    recv_json(&mut client).await;

    send_json(&mut client, json!({"kind": "remove", "index": 1})).await;

    let update = recv_json(&mut client).await;
    assert_eq!(update["kind"], "remove");
    assert_eq!(update["index"], 1);
    assert_eq!(update["version"], 2);

    let history: Value = reqwest::get(server.http_url("/v1/rooms/trim/history"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["history"], json!([5, 15]));
}

#[tokio::test]
async fn late_join_sync_is_never_older_than_delivered_broadcasts() {
    let server = TestServer::spawn().await;

    let mut writer = server.ws_client().await;
    send_json(&mut writer, json!({"kind": "join", "key": "busy"})).await;
    recv_json(&mut writer).await;

    // Flood appends while the reader joins mid-stream
    let writer_task = tokio::spawn(async move {
        for n in 0..30_i64 {
            send_json(&mut writer, json!({"kind": "add", "number": n % 37})).await;
        }
        writer
    });

    let mut reader = server.ws_client().await;
    send_json(&mut reader, json!({"kind": "join", "key": "busy"})).await;

    // Broadcasts queued ahead of the sync are legal; the sync must not
    // be older than any of them.
    let mut max_version_before_sync = 0_u64;
    let sync = loop {
        let frame = recv_json(&mut reader).await;
        match frame["kind"].as_str() {
            Some("sync") => break frame,
            Some("add") => {
                max_version_before_sync =
                    max_version_before_sync.max(frame["version"].as_u64().unwrap());
            }
            other => panic!("unexpected frame before sync: {other:?}"),
        }
    };

    let history_len = sync["history"].as_array().unwrap().len() as u64;
    assert!(
        history_len >= max_version_before_sync,
        "sync history ({history_len} entries) predates an already-delivered \
         broadcast (version {max_version_before_sync})"
    );

    let _ = writer_task.await.unwrap();
}

#[tokio::test]
async fn members_of_other_rooms_do_not_see_broadcasts() {
    let server = TestServer::spawn().await;

    let mut insider = server.ws_client().await;
    let mut outsider = server.ws_client().await;

    send_json(&mut insider, json!({"kind": "join", "key": "room-a"})).await;
    recv_json(&mut insider).await;
    send_json(&mut outsider, json!({"kind": "join", "key": "room-b"})).await;
    recv_json(&mut outsider).await;

    send_json(&mut insider, json!({"kind": "add", "number": 9})).await;
    assert_eq!(recv_json(&mut insider).await["kind"], "add");

    // The outsider hears nothing; its own add is the next thing it sees
    send_json(&mut outsider, json!({"kind": "add", "number": 2})).await;
    let frame = recv_json(&mut outsider).await;
    assert_eq!(frame["kind"], "add");
    assert_eq!(frame["number"], 2);
}

#[tokio::test]
async fn protected_room_requires_valid_token() {
    let server = TestServer::spawn().await;
    let http = reqwest::Client::new();

    // Create the room with a password and get a token
    let auth: Value = http
        .post(server.http_url("/v1/rooms/auth"))
        .json(&json!({"key": "vault", "password": "hunter2"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let token = auth["token"].as_str().unwrap().to_string();

    // No token: rejected, not joined
    let mut intruder = server.ws_client().await;
    send_json(&mut intruder, json!({"kind": "join", "key": "vault"})).await;
    let rejection = recv_json(&mut intruder).await;
    assert_eq!(rejection["kind"], "authRequired");
    assert_eq!(rejection["key"], "vault");

    // A rejected join leaves the connection usable but unjoined
    send_json(&mut intruder, json!({"kind": "add", "number": 1})).await;
    assert_eq!(recv_json(&mut intruder).await["kind"], "error");

    // With the minted token: admitted
    let mut member = server.ws_client().await;
    send_json(
        &mut member,
        json!({"kind": "join", "key": "vault", "token": token}),
    )
    .await;
    assert_eq!(recv_json(&mut member).await["kind"], "sync");
}

#[tokio::test]
async fn token_minted_for_another_room_is_rejected() {
    let server = TestServer::spawn().await;
    let http = reqwest::Client::new();

    // Two protected rooms
    for key in ["left", "right"] {
        http.post(server.http_url("/v1/rooms/auth"))
            .json(&json!({"key": key, "password": "pw"}))
            .send()
            .await
            .unwrap();
    }
    let auth: Value = http
        .post(server.http_url("/v1/rooms/auth"))
        .json(&json!({"key": "left", "password": "pw"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let left_token = auth["token"].as_str().unwrap();

    let mut client = server.ws_client().await;
    send_json(
        &mut client,
        json!({"kind": "join", "key": "right", "token": left_token}),
    )
    .await;
    assert_eq!(recv_json(&mut client).await["kind"], "authRequired");
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let server = TestServer::spawn().await;
    let http = reqwest::Client::new();

    http.post(server.http_url("/v1/rooms/auth"))
        .json(&json!({"key": "vault", "password": "right"}))
        .send()
        .await
        .unwrap();

    let response = http
        .post(server.http_url("/v1/rooms/auth"))
        .json(&json!({"key": "vault", "password": "wrong"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_frames_do_not_kill_the_connection() {
    let server = TestServer::spawn().await;

    let mut client = server.ws_client().await;
    send_json(&mut client, json!({"kind": "shout", "text": "hello"})).await;
    let error = recv_json(&mut client).await;
    assert_eq!(error["kind"], "error");

    // Still able to join afterwards
    send_json(&mut client, json!({"kind": "join", "key": "resilient"})).await;
    assert_eq!(recv_json(&mut client).await["kind"], "sync");
}

#[tokio::test]
async fn invalid_wheel_number_is_rejected_without_broadcast() {
    let server = TestServer::spawn().await;

    let mut client = server.ws_client().await;
    send_json(&mut client, json!({"kind": "join", "key": "strict"})).await;
    recv_json(&mut client).await;

    send_json(&mut client, json!({"kind": "add", "number": 37})).await;
    assert_eq!(recv_json(&mut client).await["kind"], "error");

    let history: Value = reqwest::get(server.http_url("/v1/rooms/strict/history"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["history"], json!([]));
}

#[tokio::test]
async fn admin_snapshot_and_eviction() {
    let server = TestServer::spawn().await;
    let http = reqwest::Client::new();

    let mut client = server.ws_client().await;
    send_json(&mut client, json!({"kind": "join", "key": "watched"})).await;
    recv_json(&mut client).await;

    // The console sees the room and its connection
    let sessions: Value = http
        .get(server.http_url("/v1/admin/sessions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let room = sessions["sessions"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["key"] == "watched")
        .expect("room in snapshot");
    assert_eq!(room["activeConnections"], 1);
    assert_eq!(room["passwordProtected"], false);

    let connection_id = room["connections"][0]["id"].as_str().unwrap().to_string();

    // Evict it
    let response = http
        .post(server.http_url(&format!(
            "/v1/admin/connections/{connection_id}/disconnect"
        )))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    // The socket closes on the client side
    assert!(closed(&mut client).await);

    // A second eviction finds nothing
    let response = http
        .post(server.http_url(&format!(
            "/v1/admin/connections/{connection_id}/disconnect"
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_stats_reflect_rooms_and_history() {
    let server = TestServer::spawn().await;
    let http = reqwest::Client::new();

    http.put(server.http_url("/v1/rooms/statsroom/history"))
        .json(&json!({"history": [1, 2, 3, 4]}))
        .send()
        .await
        .unwrap();

    let mut client = server.ws_client().await;
    send_json(&mut client, json!({"kind": "join", "key": "statsroom"})).await;
    recv_json(&mut client).await;

    let stats: Value = http
        .get(server.http_url("/v1/admin/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(stats["totalSessions"], 1);
    assert_eq!(stats["activeConnections"], 1);
    assert_eq!(stats["totalHistoryEntries"], 4);
}

#[tokio::test]
async fn health_endpoint_reports_counts() {
    let server = TestServer::spawn().await;

    let mut client = server.ws_client().await;
    send_json(&mut client, json!({"kind": "join", "key": "pulse"})).await;
    recv_json(&mut client).await;

    let health: Value = reqwest::get(server.http_url("/v1/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(health["status"], "healthy");
    assert_eq!(health["roomCount"], 1);
    assert_eq!(health["connectionCount"], 1);
}
