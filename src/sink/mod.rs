//! HTTP log sink: receives events from the mini-app and appends one row per
//! event to Google Sheets or a local CSV file.
//!
//! Routes:
//! - `OPTIONS /api/logAppEvent` → 204 (CORS preflight, also the client probe)
//! - `POST /api/logAppEvent` → append row
//! - `GET /metrics` → Prometheus text format

pub mod csv_sink;
pub mod row;
pub mod sheets;

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::{SinkBackendKind, SinkConfig};
use crate::metrics;

pub use csv_sink::CsvAppender;
pub use row::{IncomingEvent, RequestError, SheetRow};
pub use sheets::{ServiceAccount, SheetsAppender};

pub const LOG_PATH: &str = "/api/logAppEvent";

/// Row destination.
#[derive(Debug, Clone)]
pub enum SinkBackend {
    Sheets(SheetsAppender),
    Csv(CsvAppender),
    /// Backend could not be built; every append answers with a
    /// configuration error carrying this message.
    Unconfigured(String),
}

impl SinkBackend {
    pub fn from_config(config: &SinkConfig) -> Self {
        match config.backend {
            SinkBackendKind::Csv => SinkBackend::Csv(CsvAppender::new(&config.csv_path)),
            SinkBackendKind::Sheets => match SheetsAppender::from_config(config) {
                Ok(appender) => SinkBackend::Sheets(appender),
                Err(err) => {
                    warn!("Google Sheets backend unavailable: {}", err);
                    SinkBackend::Unconfigured(err.to_string())
                }
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SinkBackend::Sheets(_) => "sheets",
            SinkBackend::Csv(_) => "csv",
            SinkBackend::Unconfigured(_) => "unconfigured",
        }
    }

    fn failure_label(&self) -> &'static str {
        match self {
            SinkBackend::Sheets(_) => "Google Sheets operation failed",
            _ => "Row append failed",
        }
    }

    async fn append(&self, row: SheetRow) -> crate::Result<()> {
        match self {
            SinkBackend::Sheets(appender) => appender.append_row(row).await,
            SinkBackend::Csv(appender) => {
                let appender = appender.clone();
                tokio::task::spawn_blocking(move || appender.append_row(row))
                    .await
                    .map_err(|e| crate::Error::Storage(format!("CSV writer task failed: {}", e)))?
            }
            SinkBackend::Unconfigured(message) => Err(crate::Error::Config(message.clone())),
        }
    }
}

fn json_response(status: StatusCode, body: Option<Value>) -> Response<Full<Bytes>> {
    let payload = body.map(|b| Bytes::from(b.to_string())).unwrap_or_default();
    let mut response = Response::new(Full::new(payload));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

pub struct LogSink {
    backend: SinkBackend,
}

impl LogSink {
    pub fn new(backend: SinkBackend) -> Self {
        Self { backend }
    }

    pub fn from_config(config: &SinkConfig) -> Self {
        Self::new(SinkBackend::from_config(config))
    }

    pub fn backend(&self) -> &SinkBackend {
        &self.backend
    }

    /// Route one request. Never fails; every outcome is an HTTP response.
    pub async fn handle(&self, method: &Method, path: &str, body: &[u8]) -> Response<Full<Bytes>> {
        let response = match (method, path) {
            (&Method::OPTIONS, LOG_PATH) => json_response(StatusCode::NO_CONTENT, None),
            (&Method::POST, LOG_PATH) => self.log_event(body).await,
            (_, LOG_PATH) => json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                Some(json!({ "error": "Method not allowed" })),
            ),
            (&Method::GET, "/metrics") => match metrics::metrics_response().await {
                Ok(response) => response,
                Err(never) => match never {},
            },
            _ => json_response(StatusCode::NOT_FOUND, Some(json!({ "error": "Not found" }))),
        };

        metrics::record_sink_response(response.status());
        response
    }

    async fn log_event(&self, body: &[u8]) -> Response<Full<Bytes>> {
        let incoming = match IncomingEvent::parse(body) {
            Ok(incoming) => incoming,
            Err(err) => {
                warn!("Rejected log request: {}", err.message());
                return json_response(
                    StatusCode::BAD_REQUEST,
                    Some(json!({ "error": err.message() })),
                );
            }
        };

        info!(
            event = %incoming.event,
            user_id = ?incoming.user_id,
            username = ?incoming.username,
            "Log request received"
        );

        if let SinkBackend::Unconfigured(message) = &self.backend {
            error!("Log sink is not configured: {}", message);
            return json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                Some(json!({ "error": "Server configuration error", "message": message })),
            );
        }

        let row = SheetRow::from_event(&incoming);
        let started = Instant::now();
        let result = self.backend.append(row).await;
        metrics::record_append(self.backend.label(), started.elapsed());

        match result {
            Ok(()) => json_response(
                StatusCode::OK,
                Some(json!({ "success": true, "message": "Event logged successfully" })),
            ),
            Err(err) => {
                error!(event = %incoming.event, "Failed to append row: {}", err);
                json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Some(json!({
                        "error": self.backend.failure_label(),
                        "message": err.to_string(),
                    })),
                )
            }
        }
    }
}

async fn handle_request(
    sink: Arc<LogSink>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!(%path, "Failed to read request body: {}", err);
            return Ok(json_response(
                StatusCode::BAD_REQUEST,
                Some(json!({ "error": "Invalid JSON in request body" })),
            ));
        }
    };

    Ok(sink.handle(&method, &path, &body).await)
}

/// Accept connections until `shutdown` resolves.
pub async fn serve_listener<F>(
    listener: TcpListener,
    sink: Arc<LogSink>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let addr = listener.local_addr()?;
    info!(%addr, backend = sink.backend().label(), "Log sink listening");
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = &mut shutdown => {
                info!(%addr, "Log sink shutting down");
                return Ok(());
            }
        };

        let sink = Arc::clone(&sink);
        let service = service_fn(move |req| handle_request(Arc::clone(&sink), req));
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Log sink connection error: {}", err);
            }
        });
    }
}

pub async fn serve<F>(addr: SocketAddr, sink: Arc<LogSink>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, sink, shutdown).await
}
