//! Request router
//!
//! Maps incoming requests to routes and parses the upload parameters.
//!
//! | Method | Path | Route |
//! |--------|------|-------|
//! | GET | `/upload/{target}?fileSizeMb=N` | synthetic payload upload |
//! | GET | `/upload/{target}?fileName=PATH` | file payload upload |
//! | GET | `/health` | health check |
//! | GET | `/metrics` | Prometheus metrics |
//!
//! Upload routes also accept `verify=true` and `cleanup=true`.

use crate::upload::{PayloadSource, UploadOptions};
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Router errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RouteError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Exactly one of fileName or fileSizeMb must be provided")]
    MissingParameter,

    #[error("fileName and fileSizeMb are mutually exclusive")]
    ConflictingParameters,

    #[error("Invalid value for {name}: {value}")]
    InvalidParameter { name: String, value: String },
}

/// Parsed upload request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub target: String,
    pub source: PayloadSource,
    pub options: UploadOptions,
}

/// Routes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Health,
    Metrics,
    Upload(UploadRequest),
}

impl Route {
    /// Label used in request metrics
    pub fn label(&self) -> &'static str {
        match self {
            Route::Health => "health",
            Route::Metrics => "metrics",
            Route::Upload(_) => "upload",
        }
    }
}

/// Request parser
pub struct RequestParser;

impl RequestParser {
    /// Parse an HTTP request into a route
    pub fn parse(method: &str, path: &str, query: Option<&str>) -> Result<Route, RouteError> {
        let target = match path {
            "/health" | "/metrics" => None,
            _ => {
                let target = path
                    .strip_prefix("/upload/")
                    .map(|t| t.trim_end_matches('/'))
                    .filter(|t| !t.is_empty() && !t.contains('/'))
                    .ok_or_else(|| RouteError::NotFound(path.to_string()))?;
                Some(Self::decode(target))
            }
        };

        // Known path from here on; the method is checked before any parameter
        if method != "GET" {
            return Err(RouteError::MethodNotAllowed(format!(
                "{} {} (only GET is served)",
                method, path
            )));
        }

        match target {
            Some(target) => Ok(Route::Upload(Self::parse_upload(target, query)?)),
            None if path == "/health" => Ok(Route::Health),
            None => Ok(Route::Metrics),
        }
    }

    fn parse_upload(target: String, query: Option<&str>) -> Result<UploadRequest, RouteError> {
        let params = Self::parse_query(query);

        let file_name = params.get("fileName").filter(|v| !v.is_empty());
        let file_size = params.get("fileSizeMb").filter(|v| !v.is_empty());

        let source = match (file_name, file_size) {
            (Some(_), Some(_)) => return Err(RouteError::ConflictingParameters),
            (None, None) => return Err(RouteError::MissingParameter),
            (Some(name), None) => PayloadSource::File {
                path: PathBuf::from(name),
            },
            (None, Some(size)) => {
                let size_mb = size
                    .parse::<u64>()
                    .ok()
                    .filter(|s| *s > 0)
                    .ok_or_else(|| RouteError::InvalidParameter {
                        name: "fileSizeMb".into(),
                        value: size.clone(),
                    })?;
                PayloadSource::Synthetic { size_mb }
            }
        };

        let options = UploadOptions {
            verify: Self::parse_flag(&params, "verify")?,
            cleanup: Self::parse_flag(&params, "cleanup")?,
        };

        Ok(UploadRequest {
            target,
            source,
            options,
        })
    }

    fn parse_flag(params: &HashMap<String, String>, name: &str) -> Result<bool, RouteError> {
        match params.get(name).map(String::as_str) {
            None | Some("false") | Some("0") => Ok(false),
            Some("") | Some("true") | Some("1") => Ok(true),
            Some(other) => Err(RouteError::InvalidParameter {
                name: name.to_string(),
                value: other.to_string(),
            }),
        }
    }

    fn decode(value: &str) -> String {
        let value = value.replace('+', " ");
        percent_decode_str(&value).decode_utf8_lossy().into_owned()
    }

    fn parse_query(query: Option<&str>) -> HashMap<String, String> {
        let mut params = HashMap::new();
        if let Some(q) = query {
            for pair in q.split('&').filter(|p| !p.is_empty()) {
                let mut kv = pair.splitn(2, '=');
                if let Some(key) = kv.next() {
                    let value = kv.next().unwrap_or("");
                    params.insert(Self::decode(key), Self::decode(value));
                }
            }
        }
        params
    }
}
