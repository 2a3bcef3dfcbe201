//! Relaygate Admin Status Endpoint
//!
//! A read-only HTTP view of the gateway: `GET /targets` returns the latency
//! table and `GET /health` reports liveness. Handlers copy what they need
//! under the table lock and never touch the forwarding path.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::UNIX_EPOCH;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use relaygate_core::{LatencyEntry, SharedLatencyTable};
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Status endpoint failures.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Listener could not be bound or accept failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One backend as reported by `/targets`.
#[derive(Debug, Serialize)]
struct Target {
    rtt: f64,
    addr: String,
    last_seen: f64,
}

impl From<&LatencyEntry> for Target {
    fn from(entry: &LatencyEntry) -> Self {
        Self {
            rtt: entry.rtt_ms,
            addr: entry.addr.to_string(),
            last_seen: entry
                .last_seen
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Targets {
    available_targets: BTreeMap<String, Target>,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
}

/// The HTTP status server.
pub struct StatusServer {
    listener: TcpListener,
    latency: SharedLatencyTable,
}

impl StatusServer {
    /// Bind the status listener.
    pub async fn bind(addr: SocketAddr, latency: SharedLatencyTable) -> Result<Self, AdminError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, latency })
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, AdminError> {
        Ok(self.listener.local_addr()?)
    }

    /// Spawns the accept loop as a background Tokio task.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<Result<(), AdminError>> {
        tokio::spawn(self.run(shutdown))
    }

    /// Serve requests until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), AdminError> {
        info!(addr = %self.local_addr()?, "Status API listening");

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            let stream = match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    error!(error = %e, "Failed to accept status connection");
                    continue;
                }
            };

            let io = TokioIo::new(stream);
            let latency = self.latency.clone();
            let shutdown = shutdown.clone();
            tokio::task::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let response = handle_request(&req, &latency, &shutdown);
                    async move { Ok::<_, Infallible>(response) }
                });
                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!(error = ?err, "Error serving status connection");
                }
            });
        }
        info!("Status API stopped");
        Ok(())
    }
}

/// Routes a status request. Read-only: copies the latency table and returns.
fn handle_request<B>(
    req: &Request<B>,
    latency: &SharedLatencyTable,
    shutdown: &CancellationToken,
) -> Response<Full<Bytes>> {
    if req.method() != Method::GET {
        return empty(StatusCode::METHOD_NOT_ALLOWED);
    }

    match req.uri().path() {
        "/targets" => {
            let available_targets = latency
                .snapshot()
                .iter()
                .map(|(id, entry)| (id.clone(), Target::from(entry)))
                .collect();
            json(StatusCode::OK, &Targets { available_targets })
        }
        "/health" if shutdown.is_cancelled() => {
            json(StatusCode::SERVICE_UNAVAILABLE, &Health { status: "unhealthy" })
        }
        "/health" => json(StatusCode::OK, &Health { status: "healthy" }),
        _ => empty(StatusCode::NOT_FOUND),
    }
}

fn json<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Full::new(Bytes::from(bytes)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to encode status response");
            empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaygate_core::LatencyTable;
    use std::sync::Arc;

    type Running = (String, CancellationToken, JoinHandle<Result<(), AdminError>>);

    async fn start(latency: SharedLatencyTable) -> Running {
        let server = StatusServer::bind(SocketAddr::from(([127, 0, 0, 1], 0)), latency)
            .await
            .unwrap();
        let base = format!("http://{}", server.local_addr().unwrap());
        let shutdown = CancellationToken::new();
        let handle = server.spawn(shutdown.clone());
        (base, shutdown, handle)
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn targets_mirror_latency_table() {
        let latency = Arc::new(LatencyTable::new());
        latency.upsert("signal-1", LatencyEntry::new(5.0, "10.0.0.9:13024".parse().unwrap()));
        let (base, shutdown, handle) = start(latency.clone()).await;

        let body: serde_json::Value = client()
            .get(format!("{base}/targets"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let target = &body["available_targets"]["signal-1"];
        assert_eq!(target["rtt"], 5.0);
        assert_eq!(target["addr"], "10.0.0.9:13024");
        assert!(target["last_seen"].as_f64().unwrap() > 0.0);
        assert_eq!(latency.len(), 1);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn empty_table_reports_no_targets() {
        let (base, shutdown, _handle) = start(Arc::new(LatencyTable::new())).await;

        let body: serde_json::Value = client()
            .get(format!("{base}/targets"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body, serde_json::json!({ "available_targets": {} }));
        shutdown.cancel();
    }

    #[tokio::test]
    async fn health_and_unknown_paths() {
        let (base, shutdown, _handle) = start(Arc::new(LatencyTable::new())).await;
        let http = client();

        let health = http.get(format!("{base}/health")).send().await.unwrap();
        assert_eq!(health.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = health.json().await.unwrap();
        assert_eq!(body["status"], "healthy");

        let missing = http.get(format!("{base}/nope")).send().await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
        shutdown.cancel();
    }

    #[test]
    fn health_turns_unhealthy_during_shutdown() {
        let latency = Arc::new(LatencyTable::new());
        let shutdown = CancellationToken::new();
        let req = Request::get("/health").body(()).unwrap();

        assert_eq!(handle_request(&req, &latency, &shutdown).status(), StatusCode::OK);
        shutdown.cancel();
        assert_eq!(
            handle_request(&req, &latency, &shutdown).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn writes_are_rejected() {
        let latency = Arc::new(LatencyTable::new());
        let req = Request::post("/targets").body(()).unwrap();
        let response = handle_request(&req, &latency, &CancellationToken::new());
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
