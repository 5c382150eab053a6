// Property Flip Analyzer - Web Server
// REST API with Axum

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use property_flip::{
    analysis_detail, get_all_properties, setup_database, AnalysisConfig, AnalysisDetail, Analyzer,
    PropertyOutcome, StaticSource, SubjectProperty,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    config: AnalysisConfig,
}

impl AppState {
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, Response> {
        self.db
            .lock()
            .map_err(|_| internal_error("database lock poisoned"))
    }
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

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

fn internal_error(message: impl Into<String>) -> Response {
    let message = message.into();
    error!("{}", message);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::err(message)),
    )
        .into_response()
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    addresses: Vec<String>,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    analyzed: usize,
    failed: usize,
    outcomes: Vec<PropertyOutcome>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/properties - All known properties
async fn get_properties(State(state): State<AppState>) -> Response {
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(response) => return response,
    };

    match get_all_properties(&conn) {
        Ok(properties) => (StatusCode::OK, Json(ApiResponse::<Vec<SubjectProperty>>::ok(properties))).into_response(),
        Err(e) => internal_error(format!("Error getting properties: {}", e)),
    }
}

/// POST /api/analyze - Analyze the given addresses (all when empty)
async fn analyze(State(state): State<AppState>, Json(request): Json<AnalyzeRequest>) -> Response {
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(response) => return response,
    };

    let source = StaticSource::new();
    let analyzer = Analyzer::with_source(&conn, state.config, &source);
    let now = Utc::now();

    let outcomes = if request.addresses.is_empty() {
        match analyzer.analyze_all(now) {
            Ok(outcomes) => outcomes,
            Err(e) => return internal_error(format!("Error analyzing properties: {}", e)),
        }
    } else {
        analyzer.analyze_addresses(&request.addresses, now)
    };

    let analyzed = outcomes.iter().filter(|o| o.result().is_some()).count();
    let response = AnalyzeResponse {
        analyzed,
        failed: outcomes.len() - analyzed,
        outcomes,
    };

    (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
}

/// GET /api/analysis/:address - Property, latest valuation and latest analysis
async fn get_analysis(State(state): State<AppState>, Path(address): Path<String>) -> Response {
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(response) => return response,
    };

    match analysis_detail(&conn, &address) {
        Ok(Some(detail)) => (StatusCode::OK, Json(ApiResponse::<AnalysisDetail>::ok(detail))).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::err(format!("No analysis for {}", address))),
        )
            .into_response(),
        Err(e) => internal_error(format!("Error getting analysis for {}: {}", address, e)),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    property_flip::logging::init_logging()?;

    println!("🌐 Property Flip Analyzer - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = AnalysisConfig::from_env()?;

    let db_path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| "property_flip.db".to_string());
    let conn = Connection::open(&db_path)?;
    setup_database(&conn)?;
    println!("✓ Database opened: {}", db_path);

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        config,
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/properties", get(get_properties))
        .route("/analyze", post(analyze))
        .route("/analysis/:address", get(get_analysis))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let addr = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(%addr, "server listening");
    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/properties", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;

    Ok(())
}
