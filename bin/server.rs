// Superstore Analytics - Web Server
// Read-only JSON API over the Pareto analysis and the aggregate reports

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use superstore_analytics::{
    init_tracing, monthly_seasonality, open_database, run_pareto, sales_by_dimension,
    shipping_cost_by_mode, AppConfig, EntityDimension, GroupDimension, ParetoAnalyzer,
    ParetoError, ParetoReport, SalesFilter, SalesQuery, SqliteSource, ZeroTotalPolicy,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    config: Arc<AppConfig>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message.into()),
        }),
    )
        .into_response()
}

/// Query string accepted by the Pareto endpoints; everything is optional
#[derive(Debug, Default, Deserialize)]
struct ParetoParams {
    threshold: Option<String>,
    entity: Option<String>,
    group: Option<String>,
    policy: Option<String>,
    country: Option<String>,
    city: Option<String>,
    segment: Option<String>,
    market: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

/// Query string accepted by the report endpoints
#[derive(Debug, Default, Deserialize)]
struct ReportParams {
    by: Option<String>,
    country: Option<String>,
    city: Option<String>,
    segment: Option<String>,
    market: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

fn parse_opt<T: std::str::FromStr>(raw: &Option<String>, name: &str) -> Result<Option<T>, String>
where
    T::Err: std::fmt::Display,
{
    raw.as_deref()
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|e| format!("Invalid {} '{}': {}", name, value, e))
        })
        .transpose()
}

fn build_filter(
    country: &Option<String>,
    city: &Option<String>,
    segment: &Option<String>,
    market: &Option<String>,
    from: &Option<String>,
    to: &Option<String>,
) -> Result<SalesFilter, String> {
    Ok(SalesFilter {
        country: country.clone(),
        city: city.clone(),
        segment: segment.clone(),
        market: market.clone(),
        from: parse_opt(from, "from")?,
        to: parse_opt(to, "to")?,
    })
}

fn build_request(
    params: &ParetoParams,
    config: &AppConfig,
) -> Result<(SalesQuery, ParetoAnalyzer), String> {
    let defaults = &config.pareto;

    let threshold: Decimal = parse_opt(&params.threshold, "threshold")?.unwrap_or(defaults.threshold);
    let entity: EntityDimension = parse_opt(&params.entity, "entity")?.unwrap_or(defaults.entity);
    let group: GroupDimension = parse_opt(&params.group, "group")?.unwrap_or(defaults.group);
    let policy: ZeroTotalPolicy =
        parse_opt(&params.policy, "policy")?.unwrap_or(defaults.zero_total_policy);

    let filter = build_filter(
        &params.country,
        &params.city,
        &params.segment,
        &params.market,
        &params.from,
        &params.to,
    )?;

    let analyzer = ParetoAnalyzer::new(threshold)
        .map_err(|e| e.to_string())?
        .with_policy(policy);

    Ok((SalesQuery::new(entity, group).with_filter(filter), analyzer))
}

/// 400 for a bad request, 422 for data the analysis refused
fn pareto_status(err: &ParetoError) -> StatusCode {
    if err.is_caller_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    }
}

/// Narrow `query` to the single group named in the path
fn restrict_to_group(query: SalesQuery, group_id: String) -> Result<SalesQuery, String> {
    let mut filter = query.filter.clone();
    match query.group {
        GroupDimension::City => filter.city = Some(group_id),
        GroupDimension::Country => filter.country = Some(group_id),
        GroupDimension::Segment => filter.segment = Some(group_id),
        GroupDimension::Market => filter.market = Some(group_id),
        other => return Err(format!("Group lookup is not supported for '{}'", other)),
    }
    Ok(query.with_filter(filter))
}

fn analyze(state: &AppState, query: &SalesQuery, analyzer: &ParetoAnalyzer) -> Response {
    let conn = match state.db.lock() {
        Ok(conn) => conn,
        Err(_) => return failure(StatusCode::INTERNAL_SERVER_ERROR, "Database lock poisoned"),
    };

    match run_pareto(&SqliteSource::new(&conn), query, analyzer) {
        Ok(report) => ApiResponse::<ParetoReport>::ok(report),
        Err(e) => match e.downcast_ref::<ParetoError>() {
            Some(pareto_error) => failure(pareto_status(pareto_error), pareto_error.to_string()),
            None => {
                error!("Error running Pareto analysis: {:#}", e);
                failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        },
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    ApiResponse::ok("OK")
}

/// GET /api/pareto - Pareto analysis with query-string options
async fn get_pareto(State(state): State<AppState>, Query(params): Query<ParetoParams>) -> Response {
    match build_request(&params, &state.config) {
        Ok((query, analyzer)) => analyze(&state, &query, &analyzer),
        Err(message) => failure(StatusCode::BAD_REQUEST, message),
    }
}

/// GET /api/groups/:group/pareto - Pareto analysis restricted to one group
///
/// `Path` has already percent-decoded the group id ("New%20York%20City").
async fn get_group_pareto(
    State(state): State<AppState>,
    Path(group): Path<String>,
    Query(params): Query<ParetoParams>,
) -> Response {
    let request = build_request(&params, &state.config)
        .and_then(|(query, analyzer)| {
            restrict_to_group(query, group).map(|query| (query, analyzer))
        });

    match request {
        Ok((query, analyzer)) => analyze(&state, &query, &analyzer),
        Err(message) => failure(StatusCode::BAD_REQUEST, message),
    }
}

/// GET /api/reports/segments - Sales per dimension (default: segment)
async fn get_segments(State(state): State<AppState>, Query(params): Query<ReportParams>) -> Response {
    let by: GroupDimension = match parse_opt(&params.by, "by") {
        Ok(by) => by.unwrap_or(GroupDimension::Segment),
        Err(message) => return failure(StatusCode::BAD_REQUEST, message),
    };
    let filter = match report_filter(&params) {
        Ok(filter) => filter,
        Err(message) => return failure(StatusCode::BAD_REQUEST, message),
    };

    let conn = match state.db.lock() {
        Ok(conn) => conn,
        Err(_) => return failure(StatusCode::INTERNAL_SERVER_ERROR, "Database lock poisoned"),
    };
    match sales_by_dimension(&conn, by, &filter) {
        Ok(rows) => ApiResponse::ok(rows),
        Err(e) => {
            error!("Error building segment report: {:#}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /api/reports/seasonality - Sales per calendar month
async fn get_seasonality(
    State(state): State<AppState>,
    Query(params): Query<ReportParams>,
) -> Response {
    let filter = match report_filter(&params) {
        Ok(filter) => filter,
        Err(message) => return failure(StatusCode::BAD_REQUEST, message),
    };

    let conn = match state.db.lock() {
        Ok(conn) => conn,
        Err(_) => return failure(StatusCode::INTERNAL_SERVER_ERROR, "Database lock poisoned"),
    };
    match monthly_seasonality(&conn, &filter) {
        Ok(rows) => ApiResponse::ok(rows),
        Err(e) => {
            error!("Error building seasonality report: {:#}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /api/reports/shipping - Shipping cost per ship mode
async fn get_shipping(State(state): State<AppState>, Query(params): Query<ReportParams>) -> Response {
    let filter = match report_filter(&params) {
        Ok(filter) => filter,
        Err(message) => return failure(StatusCode::BAD_REQUEST, message),
    };

    let conn = match state.db.lock() {
        Ok(conn) => conn,
        Err(_) => return failure(StatusCode::INTERNAL_SERVER_ERROR, "Database lock poisoned"),
    };
    match shipping_cost_by_mode(&conn, &filter) {
        Ok(rows) => ApiResponse::ok(rows),
        Err(e) => {
            error!("Error building shipping report: {:#}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn report_filter(params: &ReportParams) -> Result<SalesFilter, String> {
    build_filter(
        &params.country,
        &params.city,
        &params.segment,
        &params.market,
        &params.from,
        &params.to,
    )
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    println!("🌐 Superstore Analytics - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config_path = std::env::var_os("SUPERSTORE_CONFIG").map(std::path::PathBuf::from);
    let mut config = AppConfig::load_or_default(config_path.as_deref())?;
    if let Some(db) = std::env::var_os("SUPERSTORE_DB") {
        config.database_path = db.into();
    }

    let conn = open_database(&config.database_path)?;
    println!("✓ Database opened: {}", config.database_path.display());

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        config: Arc::new(config),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/pareto", get(get_pareto))
        .route("/groups/:group/pareto", get(get_group_pareto))
        .route("/reports/segments", get(get_segments))
        .route("/reports/seasonality", get(get_seasonality))
        .route("/reports/shipping", get(get_shipping))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let addr = std::env::var("SUPERSTORE_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(%addr, "Server listening");
    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/pareto?threshold=80&group=segment", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;

    Ok(())
}
