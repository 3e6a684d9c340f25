// 🌐 REST API - axum routes over the stock ledger
// Request binding and response shaping only; every rule lives in the ledger

use crate::db::{validate_category, validate_quantity, SqliteStore, UnitId, UnitPayload, UnitRecord};
use crate::error::StockError;
use crate::ledger::StockLedger;
use crate::query::QueryParams;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::error;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    ledger: Arc<Mutex<StockLedger<SqliteStore>>>,
}

impl AppState {
    pub fn new(ledger: StockLedger<SqliteStore>) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(ledger)),
        }
    }

    fn ledger(&self) -> Result<MutexGuard<'_, StockLedger<SqliteStore>>, ApiError> {
        self.ledger
            .lock()
            .map_err(|_| ApiError(StockError::ProcessingFailure("ledger lock poisoned".to_string())))
    }
}

// ============================================================================
// Envelope + errors
// ============================================================================

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

pub struct ApiError(StockError);

impl From<StockError> for ApiError {
    fn from(err: StockError) -> Self {
        ApiError(err)
    }
}

fn status_for(err: &StockError) -> StatusCode {
    match err {
        StockError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        StockError::NotFound(_) => StatusCode::NOT_FOUND,
        StockError::InsufficientStock { .. } => StatusCode::CONFLICT,
        StockError::ProcessingFailure(_) | StockError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if !self.0.is_client_error() {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(ApiResponse::<()>::err(self.0.to_string()))).into_response()
    }
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountParams {
    #[serde(default, alias = "color")]
    pub category: Option<String>,
    #[serde(default, alias = "operation")]
    pub comparison_operator: Option<String>,
    #[serde(default, alias = "cottonPart")]
    pub composition_ratio: Option<f64>,
}

/// Update body; a composition ratio, if sent, is ignored
#[derive(Debug, Deserialize)]
pub struct UpdatePayload {
    #[serde(alias = "color")]
    pub category: String,
    pub quantity: i64,
}

#[derive(Serialize)]
struct BatchResult {
    message: String,
    imported: usize,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/units/income - Register incoming stock
async fn income(
    State(state): State<AppState>,
    Json(payload): Json<UnitPayload>,
) -> Result<Response, ApiError> {
    let entry = payload.validate()?;
    let unit = state.ledger()?.income(entry)?;
    let location = format!("/api/units/{}", unit.id);

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(ApiResponse::ok(unit)),
    )
        .into_response())
}

/// POST /api/units/outcome - Register outgoing stock
async fn outcome(
    State(state): State<AppState>,
    Json(payload): Json<UnitPayload>,
) -> Result<StatusCode, ApiError> {
    let entry = payload.validate()?;
    state.ledger()?.outcome(&entry)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/units - Filtered and sorted listing
async fn list_units(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<ApiResponse<Vec<UnitRecord>>>, ApiError> {
    let units = state.ledger()?.list(&params)?;
    Ok(Json(ApiResponse::ok(units)))
}

/// GET /api/units/count - Total quantity over matching units
async fn count_units(
    State(state): State<AppState>,
    Query(params): Query<CountParams>,
) -> Result<Json<ApiResponse<u64>>, ApiError> {
    let total = state.ledger()?.count(
        params.category.as_deref(),
        params.comparison_operator.as_deref(),
        params.composition_ratio,
    )?;
    Ok(Json(ApiResponse::ok(total)))
}

/// GET /api/units/:id - One unit
async fn get_unit(
    State(state): State<AppState>,
    Path(id): Path<UnitId>,
) -> Result<Json<ApiResponse<UnitRecord>>, ApiError> {
    let unit = state.ledger()?.get(&id)?;
    Ok(Json(ApiResponse::ok(unit)))
}

/// PUT /api/units/:id - Overwrite category and quantity
async fn update_unit(
    State(state): State<AppState>,
    Path(id): Path<UnitId>,
    Json(payload): Json<UpdatePayload>,
) -> Result<StatusCode, ApiError> {
    let category = validate_category(&payload.category)?;
    let quantity = validate_quantity(payload.quantity)?;
    state.ledger()?.update(&id, category, quantity)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/units/batch - Upload units from a CSV file (multipart field `file`)
async fn upload_batch(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut file = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => match field.bytes().await {
                Ok(bytes) => {
                    file = Some(bytes);
                    break;
                }
                Err(e) => return batch_failure(StockError::ProcessingFailure(e.to_string())),
            },
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => return batch_failure(StockError::invalid(e.to_string())),
        }
    }

    let Some(bytes) = file else {
        return batch_failure(StockError::invalid("Missing multipart field 'file'"));
    };

    let result = state
        .ledger()
        .map_err(|e| e.0)
        .and_then(|mut ledger| ledger.import_csv(&bytes));

    match result {
        Ok(summary) => Json(ApiResponse::ok(BatchResult {
            message: summary.message(),
            imported: summary.count(),
        }))
        .into_response(),
        Err(e) => batch_failure(e),
    }
}

/// Malformed input → 400, anything unexpected → 500
fn batch_failure(err: StockError) -> Response {
    match err {
        StockError::InvalidArgument(msg) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::err(format!("Error: {}", msg))),
        ),
        other => {
            error!(error = %other, "Error processing CSV upload");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::err(format!(
                    "Error happened in file loading: {}",
                    other
                ))),
            )
        }
    }
    .into_response()
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let units = Router::new()
        .route("/", get(list_units))
        .route("/income", post(income))
        .route("/outcome", post(outcome))
        .route("/count", get(count_units))
        .route("/batch", post(upload_batch))
        .route("/:id", get(get_unit).put(update_unit));

    Router::new()
        .route("/api/health", get(health_check))
        .nest("/api/units", units)
        .with_state(state)
}
