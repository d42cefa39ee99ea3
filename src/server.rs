//!
//! filegate HTTP server
//! --------------------
//! Axum router serving course and blog files through the authorization gate.
//!
//! Responsibilities:
//! - Session cookie handling and login/logout backed by the site catalog.
//! - `GET /file.php/<path>` and the `?file=<path>` workaround form.
//! - Holding the per-session lock while the gate runs, releasing it before streaming.
//! - Startup logging of the data root and catalog inventory.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::{parse_bool, ServerConfig};
use crate::error::AppError;
use crate::gate::{self, FileRequest, GateContext};
use crate::host::{Host, SiteCatalog};
use crate::identity::{AuthProvider, CatalogAuthProvider, LoginRequest, SessionLease, SessionManager};
use crate::path::{file_argument, VirtualPath};
use crate::respond;

const SESSION_COOKIE: &str = "filegate_session";
const SLASH_ARGUMENTS_PROBE: &str = "testslasharguments";

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub host: Host,
    pub sessions: SessionManager,
    pub auth: Arc<dyn AuthProvider>,
}

impl AppState {
    pub fn new(config: ServerConfig, catalog: SiteCatalog) -> AppState {
        let catalog = Arc::new(catalog);
        let sessions = SessionManager::new(Duration::from_secs(config.session_ttl_secs));
        AppState {
            config: Arc::new(config),
            host: Host::from_catalog(catalog.clone()),
            auth: Arc::new(CatalogAuthProvider::new(catalog, sessions.clone())),
            sessions,
        }
    }
}

fn log_startup(config: &ServerConfig, catalog: &SiteCatalog) {
    let cwd = std::env::current_dir().ok();
    info!(
        target: "startup",
        "filegate starting. cwd={:?}, data_root={:?}, catalog={:?}, data_root_exists={}",
        cwd, config.data_root, config.catalog_path(), config.data_root.exists()
    );
    info!(
        target: "startup",
        "policy: file_lifetime={}s, site_course={}, blog_level={:?}, force_login={}, prevent_hidden_files={}",
        config.file_lifetime_secs, config.site_course_id, config.blog_level, config.force_login,
        config.prevent_access_to_hidden_files
    );
    let modules: Vec<String> = catalog.modules.iter().map(|m| m.name.clone()).collect();
    info!(
        target: "startup",
        "catalog: {} courses, {} users, modules=[{}]",
        catalog.courses.len(), catalog.users.len(), modules.join(", ")
    );
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "filegate ok" }))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/file.php", get(serve_query))
        .route("/file.php/{*path}", get(serve_path))
        .route("/file", get(serve_query))
        .route("/file/{*path}", get(serve_path))
        .with_state(state)
}

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let catalog_path = config.catalog_path();
    let catalog = SiteCatalog::load(&catalog_path)
        .with_context(|| format!("While loading site catalog for data root {:?}", config.data_root))?;
    if !config.data_root.is_dir() {
        warn!("data root {:?} is not a directory; every file request will 404", config.data_root);
    }
    log_startup(&config, &catalog);

    let port = config.http_port;
    let app = router(AppState::new(config, catalog));
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct FileQuery {
    pub file: Option<String>,
    pub forcedownload: Option<String>,
}

impl FileQuery {
    /// Repeated keys keep the last value.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> FileQuery {
        let mut q = FileQuery::default();
        for (k, v) in pairs {
            match k.as_str() {
                "file" => q.file = Some(v),
                "forcedownload" => q.forcedownload = Some(v),
                _ => {}
            }
        }
        q
    }

    /// Known false spellings and the empty string are false, anything else true.
    pub fn force_download(&self) -> bool {
        self.forcedownload.as_deref().map(|v| parse_bool(v).unwrap_or(true)).unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct LoginPayload { username: String, password: String }

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie")?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name { return Some(v[1..].to_string()); }
        }
    }
    None
}

fn set_session_cookie(token: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("{}={}; HttpOnly; Secure; SameSite=Strict; Path=/", SESSION_COOKIE, token)).ok()
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("filegate_session=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=Strict; Path=/")
}

async fn login(State(state): State<AppState>, Json(payload): Json<LoginPayload>) -> impl IntoResponse {
    let req = LoginRequest { username: payload.username, password: payload.password, ip: None };
    match state.auth.login(&req) {
        Ok(resp) => {
            let mut headers = HeaderMap::new();
            if let Some(c) = set_session_cookie(&resp.session.token) {
                headers.insert("set-cookie", c);
            }
            (StatusCode::OK, headers, Json(serde_json::json!({"status":"ok"})))
        }
        Err(e) => {
            info!(target: "filegate::auth", user = %req.username, "login failed: {e}");
            (StatusCode::UNAUTHORIZED, HeaderMap::new(), Json(serde_json::json!({"status":"unauthorized"})))
        }
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = parse_cookie(&headers, SESSION_COOKIE) {
        state.sessions.logout(&token);
    }
    let mut h = HeaderMap::new();
    h.insert("set-cookie", clear_session_cookie());
    (StatusCode::OK, h, Json(serde_json::json!({"status":"ok"})))
}

async fn serve_path(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    serve(&state, &headers, Some(path), FileQuery::from_pairs(pairs)).await
}

async fn serve_query(State(state): State<AppState>, headers: HeaderMap, Query(pairs): Query<Vec<(String, String)>>) -> Response {
    serve(&state, &headers, None, FileQuery::from_pairs(pairs)).await
}

async fn serve(state: &AppState, headers: &HeaderMap, path_info: Option<String>, q: FileQuery) -> Response {
    if path_info.as_deref() == Some(SLASH_ARGUMENTS_PROBE) {
        return (StatusCode::OK, "test -1 : Incorrect use - slash arguments ok").into_response();
    }
    let Some(relative) = file_argument(path_info.as_deref(), q.file.as_deref()) else {
        return AppError::malformed("no_arguments", "no valid arguments supplied").into_response();
    };
    // Malformed paths are rejected before any session or catalog lookup.
    let vpath = match VirtualPath::parse(&relative) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };
    let force_download = q.force_download();

    let lease = match parse_cookie(headers, SESSION_COOKIE) {
        Some(token) => state.sessions.lease(&token).await,
        None => None,
    };
    let user = lease.as_ref().map(|l| l.principal().username.clone()).unwrap_or_else(|| "-".into());

    let span = info_span!("file_request", path = %relative, user = %user);
    serve_gated(state, vpath, force_download, lease).instrument(span).await
}

async fn serve_gated(state: &AppState, vpath: VirtualPath, force_download: bool, mut lease: Option<SessionLease>) -> Response {
    let ctx = GateContext { host: &state.host, config: &state.config };
    let req = FileRequest { path: vpath, force_download };
    let authorized = match gate::authorize(&ctx, &req, lease.as_mut()).await {
        Ok(a) => a,
        Err(denied) => {
            info!(target: "filegate::server", code = denied.error.code_str(), "file request denied");
            return denied.into_response();
        }
    };
    match respond::serve_authorized(authorized, lease).await {
        Ok(resp) => resp,
        Err(e) => {
            if matches!(e, AppError::Internal { .. }) {
                error!(target: "filegate::server", "serving file failed: {e}");
            }
            e.into_response()
        }
    }
}
