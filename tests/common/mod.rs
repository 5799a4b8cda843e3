//! Shared fixtures for the integration tests: a router that speaks the binary
//! management protocol over a real TCP socket, and a portal app wired to it.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::{Router, body::Body, http::StatusCode};
use bytes::Bytes;
use fleetlink::{
    adapters::{
        AppState, ConfigShipDirectory, HttpHandler, InMemoryRecordStore, TcpMgmtConnector,
        TokenAuthority, auth::ADMIN_ROLE, sftp::remote_path,
    },
    config::{LoginMode, ServerConfig, ShipConfig},
    core::{
        RouterControl, SentenceCodec,
        login::challenge_response,
        sentence::{Record, Sentence},
    },
    ports::{FileTransport, FileTransportResult, RouterEndpoint},
};
use futures_util::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::codec::Framed;
use tower::ServiceExt;

pub const SHIP: &str = "IMO9562623";
pub const ROUTER_USER: &str = "admin";
pub const ROUTER_PASS: &str = "bridge-pass";
const CHALLENGE: &str = "0a1b2c3d4e5f60718293a4b5c6d7e8f9";
const JWT_SECRET: &str = "integration-secret";

type Table = Vec<Vec<(String, String)>>;

/// Fake onboard router. Print commands answer from the seeded tables;
/// everything else is acknowledged with a bare `!done`.
#[derive(Clone, Default)]
pub struct RouterScript {
    tables: HashMap<String, Table>,
    login_trap: Option<String>,
}

impl RouterScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(mut self, command: &str, fields: &[(&str, &str)]) -> Self {
        self.tables.entry(command.to_string()).or_default().push(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    /// Reject every login with a trap carrying `message`
    pub fn reject_login(mut self, message: &str) -> Self {
        self.login_trap = Some(message.to_string());
        self
    }
}

pub struct RouterServer {
    pub port: u16,
    received: Arc<Mutex<Vec<Vec<String>>>>,
}

impl RouterServer {
    pub async fn start(script: RouterScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(script);

        let log = received.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let script = script.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let framed = Framed::new(stream, SentenceCodec::new());
                    serve_session(framed, &script, &log).await;
                });
            }
        });

        Self { port, received }
    }

    /// Sentences received after login, in arrival order
    pub fn received(&self) -> Vec<Vec<String>> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_command(&self, head: &str) -> Option<Vec<String>> {
        self.received()
            .into_iter()
            .find(|words| words.first().map(String::as_str) == Some(head))
    }
}

fn sentence(words: &[&str]) -> Sentence {
    Sentence::new(words.iter().map(|w| w.to_string()).collect())
}

async fn serve_session(
    mut framed: Framed<tokio::net::TcpStream, SentenceCodec>,
    script: &RouterScript,
    log: &Mutex<Vec<Vec<String>>>,
) {
    let Some(Ok(first)) = framed.next().await else {
        return;
    };
    assert_eq!(first.head(), Some("/login"));
    framed
        .send(sentence(&["!done", &format!("=ret={CHALLENGE}")]))
        .await
        .unwrap();

    let Some(Ok(answer)) = framed.next().await else {
        return;
    };
    let record = Record::from_words(&answer.words()[1..]);
    let expected = challenge_response(ROUTER_PASS, CHALLENGE).unwrap();
    let trap = match &script.login_trap {
        Some(message) => Some(message.clone()),
        None if record.get("name") != Some(ROUTER_USER)
            || record.get("response") != Some(expected.as_str()) =>
        {
            Some("invalid user name or password".to_string())
        }
        None => None,
    };
    if let Some(message) = trap {
        framed
            .send(sentence(&["!trap", &format!("=message={message}")]))
            .await
            .unwrap();
        framed.send(sentence(&["!done"])).await.unwrap();
        return;
    }
    framed.send(sentence(&["!done"])).await.unwrap();

    while let Some(Ok(request)) = framed.next().await {
        let words = request.words().to_vec();
        log.lock().unwrap().push(words.clone());

        let head = words.first().cloned().unwrap_or_default();
        let queries: Vec<(String, String)> = words
            .iter()
            .filter_map(|w| w.strip_prefix('?'))
            .filter_map(|q| q.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        for row in script.tables.get(&head).into_iter().flatten() {
            let matches = queries
                .iter()
                .all(|(k, v)| row.iter().any(|(rk, rv)| rk == k && rv == v));
            if !matches {
                continue;
            }
            let mut reply = vec!["!re".to_string()];
            reply.extend(row.iter().map(|(k, v)| format!("={k}={v}")));
            framed.send(Sentence::new(reply)).await.unwrap();
        }
        framed.send(sentence(&["!done"])).await.unwrap();
    }
}

/// A local port with nothing listening on it
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// File channel that keeps uploads in memory
#[derive(Default)]
pub struct MemoryFiles {
    uploads: Mutex<Vec<(String, Bytes)>>,
}

impl MemoryFiles {
    /// `(remote path, contents)` of every upload
    pub fn uploads(&self) -> Vec<(String, Bytes)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileTransport for MemoryFiles {
    async fn upload(
        &self,
        _endpoint: &RouterEndpoint,
        file_name: &str,
        contents: Bytes,
        _dial_timeout: Duration,
    ) -> FileTransportResult<u64> {
        let written = contents.len() as u64;
        self.uploads
            .lock()
            .unwrap()
            .push((remote_path(file_name), contents));
        Ok(written)
    }
}

pub fn ship(id: &str, router_ip: &str, router_port: u16) -> ShipConfig {
    ShipConfig {
        id: id.to_string(),
        name: "Ocean Star".to_string(),
        router_ip: router_ip.to_string(),
        router_port,
        ssh_port: 22,
        router_user: ROUTER_USER.to_string(),
        router_pass: ROUTER_PASS.to_string(),
        online: true,
        crew: Vec::new(),
    }
}

/// The portal API in front of `ships`
pub struct Portal {
    app: Router,
    token: String,
}

impl Portal {
    pub fn new(ships: Vec<ShipConfig>, files: Arc<dyn FileTransport>) -> Self {
        let mut config = ServerConfig::default();
        config.auth.jwt_secret = JWT_SECRET.to_string();
        config.router.mgmt_dial_timeout = "1s".to_string();
        config.router.health_dial_timeout = "1s".to_string();
        config.portal.default_ship_id = ships.first().map(|s| s.id.clone());
        config.ships = ships;

        let control = Arc::new(RouterControl::new(
            Arc::new(ConfigShipDirectory::from_config(&config)),
            Arc::new(TcpMgmtConnector::new(LoginMode::Challenge)),
            files,
            config.router.control_settings().unwrap(),
        ));
        let state = Arc::new(AppState {
            control,
            records: Arc::new(InMemoryRecordStore::new()),
            config: Arc::new(ArcSwap::from_pointee(config)),
        });
        let app = HttpHandler::new(state).unwrap().router();
        let token = TokenAuthority::new(JWT_SECRET)
            .issue("bridge-officer", ADMIN_ROLE, Duration::from_secs(300))
            .unwrap();
        Self { app, token }
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        content_type: Option<String>,
        body: Body,
    ) -> (StatusCode, Value) {
        let mut builder = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {}", self.token));
        if let Some(content_type) = content_type {
            builder = builder.header("Content-Type", content_type);
        }
        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request("GET", uri, None, Body::empty()).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(
            "POST",
            uri,
            Some("application/json".to_string()),
            Body::from(body.to_string()),
        )
        .await
    }

    pub async fn post_empty(&self, uri: &str) -> (StatusCode, Value) {
        self.request("POST", uri, None, Body::empty()).await
    }
}
