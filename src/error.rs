use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

// ─── PVGIS client ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PvgisError {
    #[error("PVGIS request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("PVGIS returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("PVGIS returned invalid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid PVGIS url: {0}")]
    InvalidUrl(String),

    #[error("PVGIS rate limiter closed")]
    LimiterClosed,
}

impl PvgisError {
    /// 429, 529 and any other 5xx are worth another attempt; everything else is final.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                *status == 429 || *status == 529 || (500..600).contains(status)
            }
            Self::Http(e) => e
                .status()
                .map(|s| s.as_u16() == 429 || s.is_server_error())
                .unwrap_or(false),
            Self::Decode(_) | Self::InvalidUrl(_) | Self::LimiterClosed => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

// ─── Simulation run ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Pvgis(#[from] PvgisError),

    #[error("simulation engine task failed: {0}")]
    Engine(#[from] tokio::task::JoinError),
}

// ─── Response cache ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cache payload error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cache directory error: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Request validation ──────────────────────────────────────────────────────

/// Field path -> message, e.g. `economics.capex` -> `must be > 0`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValidationError {
    pub fields: BTreeMap<String, String>,
}

impl ValidationError {
    pub fn check(&mut self, ok: bool, field: &str, message: impl Into<String>) {
        if !ok {
            self.fields
                .entry(field.to_owned())
                .or_insert_with(|| message.into());
        }
    }

    /// Inclusive range check; NaN never passes.
    pub fn range(&mut self, field: &str, value: f64, min: f64, max: f64) {
        self.check(
            value >= min && value <= max,
            field,
            format!("must be between {min} and {max}"),
        );
    }

    pub fn positive(&mut self, field: &str, value: f64) {
        self.check(value > 0.0 && value.is_finite(), field, "must be > 0");
    }

    pub fn non_negative(&mut self, field: &str, value: f64) {
        self.check(value >= 0.0 && value.is_finite(), field, "must be >= 0");
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.fields.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect();
        write!(f, "invalid request ({})", parts.join(", "))
    }
}

impl std::error::Error for ValidationError {}

// ─── HTTP boundary ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error("{message}: {source}")]
    Upstream {
        message: &'static str,
        #[source]
        source: PvgisError,
    },

    #[error("simulation engine failed: {0}")]
    Engine(#[source] tokio::task::JoinError),
}

impl From<SimulationError> for ApiError {
    fn from(e: SimulationError) -> Self {
        match e {
            SimulationError::Pvgis(source) => Self::Upstream {
                message: "Internal server error, PVGIS simulation failed",
                source,
            },
            SimulationError::Engine(e) => Self::Engine(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(v) => {
                (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": v.fields })))
                    .into_response()
            }
            Self::MalformedBody(msg) => {
                (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": msg })))
                    .into_response()
            }
            Self::Upstream { message, source } => {
                error!("[API] {}: {}", message, source);
                (StatusCode::BAD_GATEWAY, Json(serde_json::json!({ "error": message })))
                    .into_response()
            }
            Self::Engine(e) => {
                error!("[API] simulation engine failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "Internal server error, simulation failed" })),
                )
                    .into_response()
            }
        }
    }
}
