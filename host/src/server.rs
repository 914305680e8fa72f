//! ==============================================================================
//! server.rs - http api
//! ==============================================================================
//!
//! purpose:
//!     the only surface of the host. the esp32 posts raw readings here, the
//!     browser dashboard drives measurements and reads snapshots, advice,
//!     weather and forecasts.
//!
//! routes:
//!     GET  /                          status page (dashboard.rs)
//!     GET  /health
//!     POST /api/sensor                {rawValue, deviceId?} from the device
//!     GET  /api/sensor?deviceId=      last reading for a device
//!     GET  /api/measurement           acquisition snapshot
//!     POST /api/measurement/start     {grain?}
//!     POST /api/measurement/cancel
//!     PUT  /api/grain                 {grain}
//!     GET  /api/advice?grain=&moisture=
//!     GET  /api/weather?lat=&lng=
//!     GET  /api/forecast/moisture
//!     GET  /api/forecast/temperature
//!
//! relationships:
//!     - uses: store.rs, acquisition/*, advisor.rs, weather.rs, forecast.rs
//!     - started by: main.rs
//!
//! ==============================================================================

use crate::acquisition::{AcquisitionController, AcquisitionSnapshot};
use crate::advisor::{get_advice, AdviceOutcome, Advisor};
use crate::dashboard;
use crate::domain::{GrainType, RawReading};
use crate::forecast::{self, DailyForecast};
use crate::store::ReadingStore;
use crate::weather::{WeatherClient, WeatherData};

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// ==============================================================================
// shared state
// ==============================================================================
// cheap to clone: every field is a handle onto shared state.

pub struct AppState<A: Advisor> {
    pub store: Arc<ReadingStore>,
    pub acquisition: AcquisitionController<A>,
    pub advisor: Arc<A>,
    pub weather: Arc<WeatherClient>,
    /// device used when a request does not name one
    pub default_device: String,
    pub show_sensor_data: bool,
}

impl<A: Advisor> Clone for AppState<A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            acquisition: self.acquisition.clone(),
            advisor: self.advisor.clone(),
            weather: self.weather.clone(),
            default_device: self.default_device.clone(),
            show_sensor_data: self.show_sensor_data,
        }
    }
}

pub fn create_router<A: Advisor>(state: AppState<A>) -> Router {
    Router::new()
        .route("/", get(dashboard_handler::<A>))
        .route("/health", get(health_handler))
        .route("/api/sensor", post(ingest_handler::<A>).get(latest_handler::<A>))
        .route("/api/measurement", get(snapshot_handler::<A>))
        .route("/api/measurement/start", post(start_handler::<A>))
        .route("/api/measurement/cancel", post(cancel_handler::<A>))
        .route("/api/grain", put(grain_handler::<A>))
        .route("/api/advice", get(advice_handler::<A>))
        .route("/api/weather", get(weather_handler::<A>))
        .route("/api/forecast/moisture", get(moisture_forecast_handler))
        .route("/api/forecast/temperature", get(temperature_forecast_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ==============================================================================
// sensor endpoint
// ==============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceQuery {
    device_id: Option<String>,
}

fn invalid_payload() -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid data" }))).into_response()
}

/// POST /api/sensor
/// body must be a json object with a numeric `rawValue`; nothing is stored otherwise
async fn ingest_handler<A: Advisor>(State(state): State<AppState<A>>, body: Bytes) -> Response {
    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return invalid_payload();
    };
    let Some(raw_value) = payload.get("rawValue").and_then(|v| v.as_f64()) else {
        return invalid_payload();
    };

    let device_id = match payload.get("deviceId") {
        None | Some(serde_json::Value::Null) => state.default_device.clone(),
        Some(serde_json::Value::String(id)) if !id.is_empty() => id.clone(),
        Some(_) => return invalid_payload(),
    };

    state.store.put(&device_id, raw_value).await;
    if state.show_sensor_data {
        tracing::info!("[SENSOR] Received from {}: {}", device_id, raw_value);
    }

    Json(json!({ "success": true })).into_response()
}

/// GET /api/sensor
async fn latest_handler<A: Advisor>(
    State(state): State<AppState<A>>,
    Query(query): Query<DeviceQuery>,
) -> Json<RawReading> {
    let device_id = query.device_id.unwrap_or_else(|| state.default_device.clone());
    Json(state.store.latest(&device_id).await)
}

// ==============================================================================
// acquisition control
// ==============================================================================

#[derive(Deserialize, Default)]
struct StartRequest {
    grain: Option<GrainType>,
}

#[derive(Deserialize)]
struct GrainRequest {
    grain: GrainType,
}

async fn snapshot_handler<A: Advisor>(
    State(state): State<AppState<A>>,
) -> Json<AcquisitionSnapshot> {
    Json(state.acquisition.snapshot().await)
}

/// POST /api/measurement/start - body is optional
async fn start_handler<A: Advisor>(
    State(state): State<AppState<A>>,
    body: Option<Json<StartRequest>>,
) -> Json<AcquisitionSnapshot> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    Json(state.acquisition.start(request.grain).await)
}

async fn cancel_handler<A: Advisor>(State(state): State<AppState<A>>) -> Json<AcquisitionSnapshot> {
    Json(state.acquisition.cancel().await)
}

async fn grain_handler<A: Advisor>(
    State(state): State<AppState<A>>,
    Json(request): Json<GrainRequest>,
) -> Json<AcquisitionSnapshot> {
    Json(state.acquisition.select_grain(request.grain).await)
}

// ==============================================================================
// advice, weather, forecasts
// ==============================================================================

#[derive(Deserialize)]
struct AdviceQuery {
    grain: GrainType,
    moisture: f64,
}

/// GET /api/advice - always 200; failures come back as fallback advice + notice
async fn advice_handler<A: Advisor>(
    State(state): State<AppState<A>>,
    Query(query): Query<AdviceQuery>,
) -> Json<AdviceOutcome> {
    Json(get_advice(state.advisor.as_ref(), query.grain, query.moisture).await)
}

#[derive(Deserialize)]
struct WeatherQuery {
    lat: f64,
    lng: f64,
}

#[derive(Serialize)]
struct WeatherResponse {
    available: bool,
    #[serde(flatten)]
    data: Option<WeatherData>,
}

/// GET /api/weather - upstream failures are reported as `available: false`
async fn weather_handler<A: Advisor>(
    State(state): State<AppState<A>>,
    Query(query): Query<WeatherQuery>,
) -> Json<WeatherResponse> {
    match state.weather.fetch(query.lat, query.lng).await {
        Ok(data) => Json(WeatherResponse { available: true, data: Some(data) }),
        Err(e) => {
            tracing::warn!("[WEATHER] ⚠ {:#}", e);
            Json(WeatherResponse { available: false, data: None })
        }
    }
}

async fn moisture_forecast_handler() -> Json<Vec<DailyForecast>> {
    let today = Utc::now().date_naive();
    Json(forecast::moisture_forecast(&mut rand::thread_rng(), today))
}

async fn temperature_forecast_handler() -> Json<Vec<DailyForecast>> {
    let today = Utc::now().date_naive();
    Json(forecast::temperature_forecast(&mut rand::thread_rng(), today))
}

// ==============================================================================
// misc
// ==============================================================================

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "timestamp": Utc::now().to_rfc3339() }))
}

async fn dashboard_handler<A: Advisor>(State(state): State<AppState<A>>) -> Html<String> {
    let snapshot = state.acquisition.snapshot().await;
    let latest = state.store.latest(&state.default_device).await;
    Html(dashboard::render(&snapshot, &state.default_device, &latest))
}
