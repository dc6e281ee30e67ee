use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use confluence_core::{SignalError, SignalGenerator, TradingSignal};
use confluence_data::{VenueError, VenueName};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Duration};
use thiserror::Error;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

/// Shared handler state: one [`SignalGenerator`] per available venue.
#[derive(Debug)]
pub struct AppState {
    generators: HashMap<VenueName, SignalGenerator>,
    default_venue: VenueName,
    signal_timeout: Duration,
}

impl AppState {
    pub fn new(default_venue: VenueName, signal_timeout: Duration) -> Self {
        Self {
            generators: HashMap::new(),
            default_venue,
            signal_timeout,
        }
    }

    pub fn with_generator(mut self, venue: VenueName, generator: SignalGenerator) -> Self {
        self.generators.insert(venue, generator);
        self
    }

    async fn generate(
        &self,
        symbol: Option<String>,
        broker: Option<String>,
    ) -> Result<TradingSignal, ApiError> {
        let symbol = symbol
            .map(|symbol| symbol.trim().to_string())
            .filter(|symbol| !symbol.is_empty())
            .ok_or(ApiError::MissingSymbol)?;

        let venue = match broker.as_deref().map(str::trim) {
            Some(broker) if !broker.is_empty() => broker.parse::<VenueName>()?,
            _ => self.default_venue,
        };

        let generator = self
            .generators
            .get(&venue)
            .ok_or_else(|| VenueError::NotSupported(venue.display_name().to_string()))?;

        let signal = tokio::time::timeout(
            self.signal_timeout,
            generator.generate_signal(&symbol, &venue.to_string()),
        )
        .await
        .map_err(|_| ApiError::Timeout(self.signal_timeout))??;

        Ok(signal)
    }
}

/// Body of `POST /api/signals` and query of `GET /api/signals/current`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SignalRequest {
    pub symbol: Option<String>,
    pub broker: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignalResponse {
    pub success: bool,
    pub data: TradingSignal,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub success: bool,
    pub ready: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

/// Failures of an API request, rendered as `{success: false, error}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Symbol is required")]
    MissingSymbol,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error("signal generation timed out after {0:?}")]
    Timeout(Duration),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingSymbol | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Signal(error) if error.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match &self {
            ApiError::Signal(SignalError::MissingSymbol) => ApiError::MissingSymbol.to_string(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            error!(%error, "signal request failed");
        }

        let body = ErrorBody {
            success: false,
            error,
            path: None,
        };
        (status, Json(body)).into_response()
    }
}

/// Build the application [`Router`].
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
        .route("/api/signals", post(analyze))
        .route("/api/signals/analyze", post(analyze))
        .route("/api/signals/current", get(current))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        status: "healthy",
        timestamp: Utc::now(),
    })
}

pub async fn ready() -> Json<ReadyResponse> {
    Json(ReadyResponse {
        success: true,
        ready: true,
        timestamp: Utc::now(),
    })
}

/// `POST /api/signals/analyze`
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SignalRequest>, JsonRejection>,
) -> Result<Json<SignalResponse>, ApiError> {
    let Json(request) = payload?;
    info!(symbol = ?request.symbol, broker = ?request.broker, "analyze request");

    let data = state.generate(request.symbol, request.broker).await?;
    Ok(Json(SignalResponse {
        success: true,
        data,
    }))
}

/// `GET /api/signals/current?symbol=..&broker=..`
pub async fn current(
    State(state): State<Arc<AppState>>,
    Query(request): Query<SignalRequest>,
) -> Result<Json<SignalResponse>, ApiError> {
    let data = state.generate(request.symbol, request.broker).await?;
    Ok(Json(SignalResponse {
        success: true,
        data,
    }))
}

pub async fn not_found(uri: Uri) -> Response {
    let body = ErrorBody {
        success: false,
        error: "Not found".to_string(),
        path: Some(uri.path().to_string()),
    };
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}
