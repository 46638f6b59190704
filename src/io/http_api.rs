//! Coordinator HTTP API
//!
//! JSON over HTTP/1.1 on hyper. Every route is served both at the root and
//! under `/api`. Ledger work runs on the blocking pool so a slow disk never
//! stalls the accept loop.
//!
//! Domain outcomes (conflicts, unknown tokens) are HTTP 200 with the outcome
//! in the body; malformed requests are 400, storage failures 500.

use crate::domain::wire::{
    AckReply, AckStatus, EnrollRequest, ModeReply, RenameRequest, ScanRequest, SetModeReply,
    SetModeRequest,
};
use crate::io::prometheus::format_prometheus_metrics;
use crate::services::coordinator::{scan_reply, SessionCoordinator};
use crate::services::error::CoordinatorError;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

const MAX_BODY_BYTES: usize = 64 * 1024;

type HttpResponse = Response<Full<Bytes>>;

/// Strip the optional `/api` prefix
fn route_path(path: &str) -> &str {
    match path.strip_prefix("/api") {
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    }
}

fn with_cors(mut response: HttpResponse) -> HttpResponse {
    response.headers_mut().insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    response
}

fn text_response(status: StatusCode, body: &'static str) -> HttpResponse {
    with_cors(
        Response::builder()
            .status(status)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Full::new(Bytes::from(body)))
            .expect("static response should not fail"),
    )
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> HttpResponse {
    match serde_json::to_vec(value) {
        Ok(body) => with_cors(
            Response::builder()
                .status(status)
                .header(CONTENT_TYPE, "application/json")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"),
        ),
        Err(e) => {
            error!(error = %e, "http_serialize_error");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn bad_request(message: impl Into<String>) -> HttpResponse {
    json_response(StatusCode::BAD_REQUEST, &AckReply::error(message))
}

/// HTTP status for a failed coordinator call
fn error_status(err: &CoordinatorError) -> StatusCode {
    match err {
        CoordinatorError::Validation(_) => StatusCode::BAD_REQUEST,
        e if e.is_internal() => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    }
}

async fn read_json<T: DeserializeOwned>(
    req: Request<hyper::body::Incoming>,
) -> Result<T, HttpResponse> {
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| bad_request(format!("unreadable body: {}", e)))?
        .to_bytes();
    serde_json::from_slice(&body).map_err(|e| bad_request(format!("invalid request: {}", e)))
}

/// Run a ledger operation on the blocking pool
async fn blocking<T, F>(coordinator: &Arc<SessionCoordinator>, op: F) -> Result<T, CoordinatorError>
where
    T: Send + 'static,
    F: FnOnce(&SessionCoordinator) -> Result<T, CoordinatorError> + Send + 'static,
{
    let coordinator = Arc::clone(coordinator);
    tokio::task::spawn_blocking(move || op(&coordinator))
        .await
        .unwrap_or_else(|e| Err(CoordinatorError::Internal(e.to_string())))
}

async fn handle_scan(
    req: Request<hyper::body::Incoming>,
    coordinator: &Arc<SessionCoordinator>,
) -> HttpResponse {
    let scan: ScanRequest = match read_json(req).await {
        Ok(scan) => scan,
        Err(response) => return response,
    };
    let result = blocking(coordinator, move |c| c.scan(&scan)).await;
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => error_status(e),
    };
    json_response(status, &scan_reply(&result))
}

async fn handle_enroll(
    req: Request<hyper::body::Incoming>,
    coordinator: &Arc<SessionCoordinator>,
) -> HttpResponse {
    let enroll: EnrollRequest = match read_json(req).await {
        Ok(enroll) => enroll,
        Err(response) => return response,
    };
    match blocking(coordinator, move |c| c.enroll(&enroll)).await {
        Ok(identity) => json_response(
            StatusCode::OK,
            &AckReply::success(format!("Successfully enrolled {}", identity.name)),
        ),
        Err(e) => json_response(error_status(&e), &AckReply::error(e.to_string())),
    }
}

async fn handle_rename(
    req: Request<hyper::body::Incoming>,
    coordinator: &Arc<SessionCoordinator>,
) -> HttpResponse {
    let rename: RenameRequest = match read_json(req).await {
        Ok(rename) => rename,
        Err(response) => return response,
    };
    match blocking(coordinator, move |c| c.rename(&rename.identity_id, &rename.name)).await {
        Ok(()) => json_response(StatusCode::OK, &AckReply::success("User renamed successfully")),
        Err(e) => json_response(error_status(&e), &AckReply::error(e.to_string())),
    }
}

async fn handle_set_mode(
    req: Request<hyper::body::Incoming>,
    coordinator: &Arc<SessionCoordinator>,
) -> HttpResponse {
    let set: SetModeRequest = match read_json(req).await {
        Ok(set) => set,
        Err(response) => return response,
    };
    match coordinator.set_mode(&set.mode) {
        Ok(mode) => json_response(
            StatusCode::OK,
            &SetModeReply { status: AckStatus::Success, mode: Some(mode), message: None },
        ),
        Err(e) => json_response(
            error_status(&e),
            &SetModeReply { status: AckStatus::Error, mode: None, message: Some(e.to_string()) },
        ),
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    coordinator: Arc<SessionCoordinator>,
) -> Result<HttpResponse, Infallible> {
    let method = req.method().clone();
    let path = route_path(req.uri().path()).to_string();

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") => text_response(StatusCode::OK, "ok"),
        (&Method::GET, "/metrics") => with_cors(
            Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(format_prometheus_metrics(coordinator.metrics()))))
                .expect("static response should not fail"),
        ),
        (&Method::GET, "/mode") => {
            json_response(StatusCode::OK, &ModeReply { mode: coordinator.mode() })
        }
        (&Method::POST, "/mode") => handle_set_mode(req, &coordinator).await,
        (&Method::POST, "/scan") => handle_scan(req, &coordinator).await,
        (&Method::POST, "/enroll") => handle_enroll(req, &coordinator).await,
        (&Method::POST, "/rename") => handle_rename(req, &coordinator).await,
        (&Method::GET, "/history") => match blocking(&coordinator, |c| c.history()).await {
            Ok(rows) => json_response(StatusCode::OK, &rows),
            Err(e) => json_response(error_status(&e), &AckReply::error(e.to_string())),
        },
        (&Method::GET, "/users") => match blocking(&coordinator, |c| c.users()).await {
            Ok(rows) => json_response(StatusCode::OK, &rows),
            Err(e) => json_response(error_status(&e), &AckReply::error(e.to_string())),
        },
        // CORS preflight for the dashboard
        (&Method::OPTIONS, _) => with_cors(
            Response::builder()
                .status(StatusCode::OK)
                .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
                .header("Access-Control-Allow-Headers", "Content-Type")
                .body(Full::new(Bytes::new()))
                .expect("static response should not fail"),
        ),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    debug!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        "http_request"
    );
    Ok(response)
}

/// Serve the API on an already-bound listener until shutdown
pub async fn serve(
    listener: TcpListener,
    coordinator: Arc<SessionCoordinator>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let coordinator = coordinator.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                handle_request(req, coordinator.clone())
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                debug!(error = %e, "api_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "api_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("api_server_shutdown");
                    return;
                }
            }
        }
    }
}

/// Bind and run the coordinator API server
pub async fn start_api_server(
    bind_address: &str,
    port: u16,
    coordinator: Arc<SessionCoordinator>,
    shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind((bind_address, port)).await?;
    info!(addr = %listener.local_addr()?, "api_server_started");
    serve(listener, coordinator, shutdown).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::error::Conflict;

    #[test]
    fn test_route_path() {
        assert_eq!(route_path("/api/scan"), "/scan");
        assert_eq!(route_path("/scan"), "/scan");
        assert_eq!(route_path("/api"), "/api");
        assert_eq!(route_path("/apiscan"), "/apiscan");
    }

    #[test]
    fn test_error_status() {
        assert_eq!(
            error_status(&CoordinatorError::validation("bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&CoordinatorError::Conflict(Conflict::AlreadyRegistered)),
            StatusCode::OK
        );
        assert_eq!(
            error_status(&CoordinatorError::Internal("join".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
