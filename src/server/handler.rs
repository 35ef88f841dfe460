//! Request handling
//!
//! Turns routed requests into responses and maps upload errors to status
//! codes.

use super::AppState;
use crate::metrics;
use crate::router::{RequestParser, Route, RouteError, UploadRequest};
use crate::upload::payload::ONE_MB;
use crate::upload::{Payload, PayloadSource, UploadError};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info, warn};

/// JSON body of a successful upload
#[derive(Debug, Serialize)]
struct UploadReport {
    summary: String,
    key: String,
    location: String,
    parts: u32,
    bytes: u64,
    elapsed_ms: u128,
}

/// JSON body of a failed request
#[derive(Debug, Serialize)]
struct ErrorReport {
    error: &'static str,
    message: String,
}

pub(crate) async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();

    info!("Handling {} {}", method, path);

    let (label, response) = match RequestParser::parse(&method, &path, req.uri().query()) {
        Ok(route) => (route.label(), dispatch(route, &state).await),
        Err(e) => {
            warn!(method = %method, path = %path, error = %e, "Rejected request");
            ("unmatched", route_error_response(&e))
        }
    };

    metrics::record_request(label, response.status().as_u16());
    Ok(response)
}

async fn dispatch(route: Route, state: &AppState) -> Response<Full<Bytes>> {
    match route {
        Route::Health => text_response(StatusCode::OK, "ok"),
        Route::Metrics if state.metrics_enabled => match metrics::gather() {
            Ok((content_type, body)) => {
                let mut response = Response::new(Full::new(Bytes::from(body)));
                if let Ok(value) = HeaderValue::from_str(&content_type) {
                    response.headers_mut().insert(CONTENT_TYPE, value);
                }
                response
            }
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics")
            }
        },
        Route::Metrics => text_response(StatusCode::NOT_FOUND, "Not Found"),
        Route::Upload(request) => handle_upload(request, state).await,
    }
}

async fn handle_upload(request: UploadRequest, state: &AppState) -> Response<Full<Bytes>> {
    let service = match state.services.get(&request.target) {
        Some(service) => service,
        None => {
            return error_response(
                StatusCode::NOT_FOUND,
                "unknown_target",
                format!("No upload target named '{}'", request.target),
            )
        }
    };

    if let Err(response) = check_payload_limit(&request.source, state.max_payload_mb).await {
        return response;
    }

    let payload = match Payload::load(request.source).await {
        Ok(payload) => payload,
        Err(e) => return upload_error_response(&e),
    };

    match service.upload(&payload, request.options).await {
        Ok(outcome) => {
            info!(
                target_name = %request.target,
                key = %outcome.key,
                parts = outcome.part_count,
                bytes = outcome.bytes_uploaded,
                "{}",
                outcome.summary()
            );
            let report = UploadReport {
                summary: outcome.summary(),
                key: outcome.key,
                location: outcome.location,
                parts: outcome.part_count,
                bytes: outcome.bytes_uploaded,
                elapsed_ms: outcome.elapsed.as_millis(),
            };
            json_response(StatusCode::OK, &report)
        }
        Err(e) => upload_error_response(&e),
    }
}

/// Reject payloads over `max_payload_mb` before anything is read into memory
async fn check_payload_limit(
    source: &PayloadSource,
    max_payload_mb: u64,
) -> Result<(), Response<Full<Bytes>>> {
    let limit_bytes = max_payload_mb.saturating_mul(ONE_MB);
    let message = match source {
        PayloadSource::Synthetic { size_mb } if *size_mb > max_payload_mb => format!(
            "fileSizeMb {} exceeds the limit of {}",
            size_mb, max_payload_mb
        ),
        PayloadSource::Synthetic { .. } => return Ok(()),
        PayloadSource::File { path } => match tokio::fs::metadata(path).await {
            Ok(meta) if meta.len() > limit_bytes => format!(
                "fileName {} is {} bytes, over the limit of {} MB",
                path.display(),
                meta.len(),
                max_payload_mb
            ),
            Ok(_) => return Ok(()),
            Err(e) => return Err(upload_error_response(&UploadError::from(e))),
        },
    };
    Err(error_response(
        StatusCode::BAD_REQUEST,
        "invalid_parameter",
        message,
    ))
}

fn route_error_response(err: &RouteError) -> Response<Full<Bytes>> {
    let (status, kind) = match err {
        RouteError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        RouteError::MethodNotAllowed(_) => (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed"),
        RouteError::MissingParameter
        | RouteError::ConflictingParameters
        | RouteError::InvalidParameter { .. } => (StatusCode::BAD_REQUEST, "invalid_parameter"),
    };
    error_response(status, kind, err.to_string())
}

fn upload_error_response(err: &UploadError) -> Response<Full<Bytes>> {
    let status = match err {
        UploadError::Backend { .. } => StatusCode::BAD_GATEWAY,
        UploadError::Config(_) | UploadError::Io { .. } | UploadError::Corrupted { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, err.kind(), err.to_string())
}

fn error_response(status: StatusCode, kind: &'static str, message: String) -> Response<Full<Bytes>> {
    json_response(
        status,
        &ErrorReport {
            error: kind,
            message,
        },
    )
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(body) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}
