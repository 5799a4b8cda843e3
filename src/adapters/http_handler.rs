//! Portal HTTP API.
//!
//! Binds the router feature operations and the voucher / bandwidth plan
//! records to `/api/...` routes. Everything except `/api/health` requires a
//! bearer token.
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    Extension, Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Path, State,
        multipart::MultipartRejection,
        rejection::JsonRejection,
    },
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    routing::{get, post},
};
use chrono::Utc;
use eyre::{Result, WrapErr};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{
    adapters::{
        api_error::ApiError,
        auth::{Claims, TokenAuthority},
        middleware::{
            request_id_middleware, request_timing_middleware, require_bearer,
            security_headers_middleware,
        },
    },
    config::models::ServerConfig,
    core::{
        control::RouterControl,
        firewall::FirewallPolicy,
        reports::{HealthReport, OnlineSession, OpMessage, TerminalOutput},
    },
    ports::record_store::{BandwidthPlan, RecordStore, RecordStoreError, Voucher},
};

/// Multipart field carrying the configuration script
pub const CONFIG_FILE_FIELD: &str = "config_file";

const MAX_CONFIG_UPLOAD: usize = 16 * 1024 * 1024;
const VOUCHER_CODE_ATTEMPTS: usize = 5;

/// Shared state of the API handlers
pub struct AppState {
    pub control: Arc<RouterControl>,
    pub records: Arc<dyn RecordStore>,
    /// Current configuration; swapped on reload
    pub config: Arc<ArcSwap<ServerConfig>>,
}

impl AppState {
    fn default_ship(&self) -> Option<String> {
        self.config.load().portal.default_ship_id.clone()
    }

    fn implied_ship(&self) -> Result<String, ApiError> {
        self.default_ship()
            .ok_or_else(|| ApiError::not_found("no default ship is configured"))
    }
}

/// HTTP handler for the fleetlink portal API
pub struct HttpHandler {
    state: Arc<AppState>,
    authority: Arc<TokenAuthority>,
    cors: CorsLayer,
}

impl HttpHandler {
    /// The token secret and CORS policy are read once from the current
    /// configuration.
    pub fn new(state: Arc<AppState>) -> Result<Self> {
        let config = state.config.load_full();
        let authority = Arc::new(TokenAuthority::new(&config.auth.jwt_secret));
        let cors = cors_layer(&config)?;
        Ok(Self {
            state,
            authority,
            cors,
        })
    }

    pub fn router(self) -> Router {
        let protected = Router::new()
            .route("/api/ships/{ship_id}/router/stats", get(router_stats))
            .route("/api/ships/{ship_id}/router/sync", post(router_sync))
            .route("/api/ships/{ship_id}/router/reboot", post(router_reboot))
            .route("/api/ships/{ship_id}/router/firewall", post(router_firewall))
            .route(
                "/api/ships/{ship_id}/router/config",
                post(router_config).layer(DefaultBodyLimit::max(MAX_CONFIG_UPLOAD)),
            )
            .route("/api/ships/{ship_id}/router/terminal", post(router_terminal))
            .route("/api/online-users", get(online_users))
            .route("/api/online-users/{username}/kick", post(kick_user))
            .route("/api/vouchers", get(list_vouchers).post(create_voucher))
            .route("/api/bandwidth-plans", get(list_plans).post(create_plan))
            .route_layer(middleware::from_fn_with_state(
                self.authority.clone(),
                require_bearer,
            ));

        Router::new()
            .route("/api/health", get(liveness))
            .merge(protected)
            .layer(middleware::from_fn(request_timing_middleware))
            .layer(middleware::from_fn(security_headers_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .layer(self.cors)
            .with_state(self.state)
    }
}

fn cors_layer(config: &ServerConfig) -> Result<CorsLayer> {
    let origins = config
        .cors
        .allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin.trim_end_matches('/'))
                .wrap_err_with(|| format!("Invalid CORS origin: {origin}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(config.cors.max_age()?))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

#[derive(Debug, Serialize)]
struct Liveness {
    status: &'static str,
    version: &'static str,
}

async fn liveness() -> Json<Liveness> {
    Json(Liveness {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn router_stats(
    State(state): State<Arc<AppState>>,
    Path(ship_id): Path<String>,
) -> Result<Json<HealthReport>, ApiError> {
    Ok(Json(state.control.health(&ship_id).await?))
}

async fn router_sync(
    State(state): State<Arc<AppState>>,
    Path(ship_id): Path<String>,
) -> Result<Json<OpMessage>, ApiError> {
    Ok(Json(state.control.sync_crew(&ship_id).await?))
}

async fn router_reboot(
    State(state): State<Arc<AppState>>,
    Path(ship_id): Path<String>,
) -> Result<Json<OpMessage>, ApiError> {
    Ok(Json(state.control.reboot(&ship_id).await?))
}

async fn router_firewall(
    State(state): State<Arc<AppState>>,
    Path(ship_id): Path<String>,
    payload: Result<Json<FirewallPolicy>, JsonRejection>,
) -> Result<Json<OpMessage>, ApiError> {
    let policy = json_body(payload)?;
    Ok(Json(
        state.control.reconcile_firewall(&ship_id, policy).await?,
    ))
}

async fn router_config(
    State(state): State<Arc<AppState>>,
    Path(ship_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<OpMessage>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some(CONFIG_FILE_FIELD) {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request("config_file has no file name"))?;
        let contents = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("failed to read config_file: {e}")))?;
        upload = Some((file_name, contents));
        break;
    }

    let (file_name, contents) = upload.ok_or_else(|| ApiError::bad_request("No file uploaded"))?;
    Ok(Json(
        state
            .control
            .upload_config(&ship_id, &file_name, contents)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct TerminalRequest {
    #[serde(default)]
    command: String,
}

async fn router_terminal(
    State(state): State<Arc<AppState>>,
    Path(ship_id): Path<String>,
    payload: Result<Json<TerminalRequest>, JsonRejection>,
) -> Result<Json<TerminalOutput>, ApiError> {
    let request = json_body(payload)?;
    Ok(Json(
        state.control.terminal(&ship_id, &request.command).await?,
    ))
}

async fn online_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<OnlineSession>>, ApiError> {
    let ship_id = state.implied_ship()?;
    let sessions = state.control.online_sessions(&ship_id).await?;
    Ok(Json(
        sessions.into_iter().map(OnlineSession::rounded).collect(),
    ))
}

async fn kick_user(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Json<OpMessage>, ApiError> {
    let ship_id = state.implied_ship()?;
    Ok(Json(state.control.kick(&ship_id, &username).await?))
}

fn default_data_plan() -> String {
    "DataPlan".to_string()
}

fn default_valid_days() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct NewVoucherRequest {
    #[serde(default = "default_data_plan")]
    data_plan: String,
    #[serde(default = "default_valid_days")]
    valid_days: u32,
    #[serde(default)]
    created_by: Option<String>,
    #[serde(default)]
    ship_id: Option<String>,
}

/// `VOU-` followed by five random digits
fn voucher_code() -> String {
    format!("VOU-{:05}", rand::rng().random_range(0..100_000u32))
}

async fn list_vouchers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Voucher>>, ApiError> {
    Ok(Json(state.records.list_vouchers().await?))
}

async fn create_voucher(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<NewVoucherRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Voucher>), ApiError> {
    let request = json_body(payload)?;
    if request.data_plan.trim().is_empty() {
        return Err(ApiError::bad_request("data_plan is required"));
    }
    let ship_id = request.ship_id.or_else(|| state.default_ship());

    let mut attempt = 0;
    let voucher = loop {
        attempt += 1;
        let candidate = Voucher {
            id: 0,
            code: voucher_code(),
            data_plan: request.data_plan.clone(),
            status: "Unused".to_string(),
            created_by: request
                .created_by
                .clone()
                .unwrap_or_else(|| claims.username.clone()),
            valid_days: request.valid_days,
            ship_id: ship_id.clone(),
            created_at: Utc::now(),
        };
        match state.records.insert_voucher(candidate).await {
            Ok(voucher) => break voucher,
            Err(RecordStoreError::Duplicate(_)) if attempt < VOUCHER_CODE_ATTEMPTS => continue,
            Err(e) => return Err(e.into()),
        }
    };
    tracing::info!(code = %voucher.code, plan = %voucher.data_plan, "voucher issued");

    if let Some(ship_id) = provisioning_target(ship_id.as_deref(), "voucher") {
        let outcome = state.control.provision_voucher(ship_id, &voucher).await;
        tracing::debug!(?outcome, "voucher provisioning finished");
    }
    Ok((StatusCode::CREATED, Json(voucher)))
}

#[derive(Debug, Deserialize)]
struct NewPlanRequest {
    name: String,
    upload_speed: u32,
    download_speed: u32,
    #[serde(default)]
    burst_limit: Option<String>,
    #[serde(default)]
    burst_threshold: Option<String>,
    #[serde(default)]
    burst_time: Option<String>,
    #[serde(default)]
    priority: Option<u8>,
    #[serde(default)]
    limit_at: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    ship_id: Option<String>,
}

async fn list_plans(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BandwidthPlan>>, ApiError> {
    Ok(Json(state.records.list_plans().await?))
}

async fn create_plan(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewPlanRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BandwidthPlan>), ApiError> {
    let request = json_body(payload)?;
    if request.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    if request.upload_speed == 0 || request.download_speed == 0 {
        return Err(ApiError::bad_request(
            "upload_speed and download_speed must be positive",
        ));
    }
    let ship_id = request.ship_id.or_else(|| state.default_ship());

    let plan = state
        .records
        .insert_plan(BandwidthPlan {
            id: 0,
            name: request.name.trim().to_string(),
            upload_speed: request.upload_speed,
            download_speed: request.download_speed,
            burst_limit: request.burst_limit,
            burst_threshold: request.burst_threshold,
            burst_time: request.burst_time,
            priority: request.priority,
            limit_at: request.limit_at,
            status: request
                .status
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "Active".to_string()),
            ship_id: ship_id.clone(),
            created_at: Utc::now(),
        })
        .await?;
    tracing::info!(plan = %plan.name, "bandwidth plan created");

    if let Some(ship_id) = provisioning_target(ship_id.as_deref(), "plan") {
        let outcome = state.control.provision_plan(ship_id, &plan).await;
        tracing::debug!(?outcome, "plan provisioning finished");
    }
    Ok((StatusCode::CREATED, Json(plan)))
}

/// Ship a committed record is provisioned on. Provisioning outcomes never
/// reach the caller.
fn provisioning_target<'a>(ship_id: Option<&'a str>, kind: &str) -> Option<&'a str> {
    if ship_id.is_none() {
        tracing::info!(kind, "no target ship; router provisioning skipped");
    }
    ship_id
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt; // for oneshot

    use super::*;
    use crate::{
        adapters::{auth::ADMIN_ROLE, record_store::InMemoryRecordStore},
        config::models::ShipConfig,
        core::{
            control::ControlSettings,
            testing::{FakeRouter, RecordingFiles, StaticDirectory, endpoint},
        },
        ports::mgmt_transport::TransportError,
    };

    const SHIP: &str = "IMO9562623";
    const SECRET: &str = "test-secret";

    struct TestApp {
        router: FakeRouter,
        records: Arc<InMemoryRecordStore>,
        app: Router,
        token: String,
    }

    fn test_app() -> TestApp {
        let router = FakeRouter::new();
        let records = Arc::new(InMemoryRecordStore::new());
        let directory = StaticDirectory::default().with_ship(endpoint(SHIP, "10.20.0.1"), Vec::new());
        let control = Arc::new(RouterControl::new(
            Arc::new(directory),
            Arc::new(router.clone()),
            Arc::new(RecordingFiles::default()),
            ControlSettings::default(),
        ));

        let mut config = ServerConfig::default();
        config.auth.jwt_secret = SECRET.to_string();
        config.portal.default_ship_id = Some(SHIP.to_string());
        config.ships.push(ShipConfig {
            id: SHIP.to_string(),
            name: String::new(),
            router_ip: "10.20.0.1".to_string(),
            router_port: 8728,
            ssh_port: 22,
            router_user: "admin".to_string(),
            router_pass: "pw".to_string(),
            online: true,
            crew: Vec::new(),
        });

        let state = Arc::new(AppState {
            control,
            records: records.clone(),
            config: Arc::new(ArcSwap::from_pointee(config)),
        });
        let app = HttpHandler::new(state).unwrap().router();
        let token = TokenAuthority::new(SECRET)
            .issue("captain", ADMIN_ROLE, Duration::from_secs(600))
            .unwrap();
        TestApp {
            router,
            records,
            app,
            token,
        }
    }

    impl TestApp {
        async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let mut builder = axum::http::Request::builder()
                .method(method)
                .uri(uri)
                .header("Authorization", format!("Bearer {}", self.token));
            let body = match body {
                Some(json) => {
                    builder = builder.header("Content-Type", "application/json");
                    Body::from(json.to_string())
                }
                None => Body::empty(),
            };
            let response = self
                .app
                .clone()
                .oneshot(builder.body(body).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, value)
        }
    }

    #[tokio::test]
    async fn test_liveness_is_public() {
        let t = test_app();
        let response = t
            .app
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_router_endpoints_require_token() {
        let t = test_app();
        let response = t
            .app
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/online-users")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_stats_degraded_is_ok() {
        let t = test_app();
        t.router
            .refuse_connections(TransportError::Unreachable("connection refused".into()));
        let (status, body) = t
            .send("GET", &format!("/api/ships/{SHIP}/router/stats"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connected"], false);
        assert!(body.get("router_pass").is_none());
    }

    #[tokio::test]
    async fn test_unknown_ship_is_404() {
        let t = test_app();
        let (status, body) = t.send("POST", "/api/ships/ghost/router/reboot", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_kick_not_online_is_404() {
        let t = test_app();
        let (status, body) = t
            .send("POST", "/api/online-users/alice/kick", None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "user not online");
    }

    #[tokio::test]
    async fn test_online_users_rounded() {
        let t = test_app();
        t.router.seed(
            "/ip/hotspot/active",
            &[
                ("user", "alice"),
                ("server", "hotspot1"),
                ("address", "10.5.50.2"),
                ("uptime", "1h"),
                ("bytes-in", "1048576"),
                ("bytes-out", "3145728"),
            ],
        );
        let (status, body) = t.send("GET", "/api/online-users", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["user"], "alice");
        assert_eq!(body[0]["upload_MB"], 1.0);
        assert_eq!(body[0]["total_MB"], 4.0);
    }

    #[tokio::test]
    async fn test_firewall_rejects_malformed_json() {
        let t = test_app();
        let (status, body) = t
            .send(
                "POST",
                &format!("/api/ships/{SHIP}/router/firewall"),
                Some(json!({"block_youtube": "yes"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_firewall_reconciles() {
        let t = test_app();
        let (status, body) = t
            .send(
                "POST",
                &format!("/api/ships/{SHIP}/router/firewall"),
                Some(json!({"block_youtube": true, "block_tiktok": true})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Firewall updated: blocking Youtube, Tiktok");
        assert_eq!(t.router.table("/ip/firewall/layer7-protocol").len(), 2);
        assert_eq!(t.router.table("/ip/firewall/filter").len(), 2);
    }

    #[tokio::test]
    async fn test_terminal_empty_command_is_400() {
        let t = test_app();
        let (status, _) = t
            .send(
                "POST",
                &format!("/api/ships/{SHIP}/router/terminal"),
                Some(json!({"command": "  "})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_config_upload_requires_multipart() {
        let t = test_app();
        let (status, body) = t
            .send(
                "POST",
                &format!("/api/ships/{SHIP}/router/config"),
                Some(json!({"config_file": "cfg.rsc"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "BAD_REQUEST");
        assert!(t.router.sent_heads().is_empty());
    }

    #[tokio::test]
    async fn test_create_voucher_provisions_hotspot_user() {
        let t = test_app();
        let (status, body) = t
            .send("POST", "/api/vouchers", Some(json!({"data_plan": "Crew-Basic", "valid_days": 7})))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let code = body["code"].as_str().unwrap().to_string();
        assert!(code.starts_with("VOU-") && code.len() == 9);
        assert_eq!(body["status"], "Unused");
        assert_eq!(body["created_by"], "captain");

        let users = t.router.table("/ip/hotspot/user");
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].get("name"), Some(code.as_str()));
        assert_eq!(users[0].get("comment"), Some("Voucher"));

        let (status, listed) = t.send("GET", "/api/vouchers", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_plan_survives_router_outage() {
        let t = test_app();
        t.router
            .refuse_connections(TransportError::Unreachable("connection refused".into()));
        let (status, body) = t
            .send(
                "POST",
                "/api/bandwidth-plans",
                Some(json!({"name": "Crew-Basic", "upload_speed": 512, "download_speed": 2048})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["name"], "Crew-Basic");
        assert_eq!(body["status"], "Active");
        assert_eq!(t.records.list_plans().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_plan_validates() {
        let t = test_app();
        let (status, _) = t
            .send(
                "POST",
                "/api/bandwidth-plans",
                Some(json!({"name": "Crew-Basic", "upload_speed": 0, "download_speed": 2048})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_voucher_code_shape() {
        for _ in 0..50 {
            let code = voucher_code();
            assert_eq!(code.len(), 9);
            assert!(code[4..].chars().all(|c| c.is_ascii_digit()));
        }
    }
}
