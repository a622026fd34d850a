//! HTTPS request server for a stash instance.
//!
//! Dispatches four operations (push, pull, last, status) onto the stash, one
//! request to completion at a time; each request opens a fresh stash and
//! persists before the next is admitted. Any request carrying a `debug`
//! query parameter short-circuits into a plain-text diagnostic dump without
//! touching the stash. Unknown paths answer 500 with an empty body.

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use stash::{Item, ItemInfo, Stash, StashConfig};
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::advertise::{self, Advertisement};
use crate::tls::{self, TlsCertPaths};

/// Server configuration.
pub struct ServeConfig {
    /// Instance name to advertise.
    pub name: String,
    /// Port to bind; OS-assigned ephemeral port when `None`.
    pub port: Option<u16>,
    pub stash: StashConfig,
    pub cert_paths: TlsCertPaths,
}

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    stash_config: StashConfig,
    /// Serializes requests: the stash sees one operation at a time.
    gate: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(stash_config: StashConfig) -> Self {
        Self {
            stash_config,
            gate: Arc::new(Mutex::new(())),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/push", get(handle_push).post(handle_push))
        .route("/pull", get(handle_pull))
        .route("/last", get(handle_last))
        .route("/status", get(handle_status))
        .fallback(handle_unknown)
        .layer(middleware::from_fn(debug_dump))
        .with_state(state)
}

/// Advertise the instance and serve requests until interrupted.
pub async fn run(config: ServeConfig) -> Result<()> {
    // Missing credentials are fatal before anything is advertised.
    let rustls = tls::load_rustls_config(&config.cert_paths).await?;

    let bind_port = config.port.unwrap_or(0);
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, bind_port))
        .with_context(|| format!("failed to bind port {bind_port}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to set listener non-blocking")?;
    let port = listener.local_addr()?.port();

    let addr = advertise::local_ipv4();
    let advertisement = Advertisement::register(&config.name, addr, port)?;

    let app = router(AppState::new(config.stash));

    let handle = axum_server::Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        async move {
            shutdown_signal().await;
            handle.graceful_shutdown(Some(Duration::from_secs(2)));
        }
    });

    info!("remotestash serving at https://{addr}:{port}");
    let result = axum_server::from_tcp_rustls(listener, rustls)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await;

    advertisement.shutdown();
    result.context("server error")?;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

/// Middleware: a `debug` query parameter on any path answers with a
/// diagnostic dump and performs no stash operation, even for `/push`.
async fn debug_dump(request: Request, next: Next) -> Response {
    let has_debug = request
        .uri()
        .query()
        .map(|q| q.split('&').any(|p| p == "debug" || p.starts_with("debug=")))
        .unwrap_or(false);
    if !has_debug {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = request.headers().clone();
    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .unwrap_or_default();

    use std::fmt::Write as _;
    let mut dump = String::new();
    let _ = writeln!(dump, "client: {peer}");
    let _ = writeln!(dump, "method: {method}");
    let _ = writeln!(dump, "path: {}", uri.path());
    let _ = writeln!(dump, "query: {}", uri.query().unwrap_or(""));
    let _ = writeln!(dump, "headers:");
    for (name, value) in &headers {
        let _ = writeln!(dump, "  {}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
    if !body.is_empty() {
        let _ = writeln!(dump, "body ({} bytes):", body.len());
        let _ = writeln!(dump, "{}", String::from_utf8_lossy(&body));
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        dump,
    )
        .into_response()
}

async fn handle_push(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let _gate = state.gate.lock().await;

    let content_type = match headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        Some(ct) => ct.to_string(),
        None => {
            warn!("push request without Content-Type header");
            "application/octet-stream".to_string()
        }
    };

    let item = Item::from_bytes(body.to_vec(), ItemInfo::new(content_type));
    let result = Stash::open(state.stash_config.clone()).and_then(|mut stash| stash.push(item));
    match result {
        Ok(()) => Json(serde_json::json!({"success": 1})).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn handle_pull(State(state): State<AppState>) -> Response {
    let _gate = state.gate.lock().await;
    match Stash::open(state.stash_config.clone()).and_then(|mut stash| stash.pull()) {
        Ok(item) => item_response(item),
        Err(e) => internal_error(e),
    }
}

async fn handle_last(State(state): State<AppState>) -> Response {
    let _gate = state.gate.lock().await;
    match Stash::open(state.stash_config.clone()) {
        Ok(stash) => item_response(stash.last()),
        Err(e) => internal_error(e),
    }
}

async fn handle_status(State(state): State<AppState>) -> Response {
    let _gate = state.gate.lock().await;
    match Stash::open(state.stash_config.clone()) {
        Ok(stash) => Json(stash.status()).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn handle_unknown() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Item bytes with the item's content type; an absent item is a valid empty
/// 200 response.
fn item_response(item: Option<Item>) -> Response {
    let Some(item) = item else {
        return StatusCode::OK.into_response();
    };
    let bytes = item.as_bytes().unwrap_or_default();
    let mut response = (StatusCode::OK, bytes).into_response();
    if !item.info.content_type.is_empty() {
        if let Ok(value) = item.info.content_type.parse() {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
    }
    response
}

fn internal_error(e: anyhow::Error) -> Response {
    error!(error = %e, "request failed");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}
