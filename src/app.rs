use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Query, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use log::info;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::config::Config;
use crate::downloader;
use crate::error::AppError;
use crate::importer::import_rows;
use crate::loader;
use crate::login::{self, AuthGate, AuthUser, UserStore};
use crate::port::{AgentPatch, AgentRecord};
use crate::store::{FileStore, PortStore};

const UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

/// Shared state for every request handler
pub struct AppState {
    pub ports: Arc<dyn PortStore>,
    pub users: UserStore,
    pub auth: AuthGate,
    pub started_at: Instant,
    pub cookie_secure: bool,
    pub static_dir: std::path::PathBuf,
}

impl AppState {
    pub fn new(ports: Arc<dyn PortStore>, users: UserStore, auth: AuthGate) -> Self {
        AppState {
            ports,
            users,
            auth,
            started_at: Instant::now(),
            cookie_secure: false,
            static_dir: "static".into(),
        }
    }
}

/// Build the HTTP router
///
/// # Arguments
/// * `state` - Shared stores and token gate
///
/// # Returns
/// * `Router` - All API routes plus the static dashboard under `/static`
pub fn router(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.static_dir);

    Router::new()
        .route(
            "/api/ports",
            get(get_ports)
                .post(upsert_port)
                .put(update_agent)
                .delete(delete_port),
        )
        .route(
            "/api/ports/upload",
            post(upload_ports).layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
        .route("/api/ports/export", get(export_ports))
        .route("/api/auth/login", post(login::handle_login))
        .route("/api/auth/logout", post(login::handle_logout))
        .route("/api/auth/verify", get(login::handle_verify))
        .route("/api/users", get(login::list_users).post(login::create_user))
        .route("/api/admin/system", get(system_status))
        .nest_service("/static", static_files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the stores described by `config` and serve until shutdown
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let ports = FileStore::open(config.ports_path())?;
    let users = UserStore::open(config.users_path())?;
    if let Some(seed) = &config.admin {
        login::seed_admin(&users, seed)?;
    }

    let app_state = Arc::new(AppState {
        ports: Arc::new(ports),
        users,
        auth: AuthGate::new(&config.jwt_secret, config.token_ttl),
        started_at: Instant::now(),
        cookie_secure: config.cookie_secure,
        static_dir: config.static_dir.clone(),
    });

    let app = router(app_state);

    let address = config.bind_address();
    let listener = TcpListener::bind(&address).await?;
    info!("Listening on http://{}", address);
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct CityQuery {
    city: Option<String>,
}

async fn get_ports(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CityQuery>,
) -> Result<impl IntoResponse, AppError> {
    match query.city.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(city) => {
            let port = state
                .ports
                .find_by_city(city)?
                .ok_or_else(|| AppError::NotFound("City not found".to_string()))?;
            Ok(Json(json!({ "success": true, "data": port })))
        }
        None => {
            let ports = state.ports.list()?;
            Ok(Json(json!({ "success": true, "data": ports })))
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpsertRequest {
    city: String,
    agents: Vec<AgentRecord>,
}

const INVALID_UPSERT: &str = "Invalid data format. Required: city (string) and agents (array)";

async fn upsert_port(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpsertRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload.map_err(|_| AppError::Validation(INVALID_UPSERT.to_string()))?;

    if request.city.trim().is_empty() {
        return Err(AppError::Validation(INVALID_UPSERT.to_string()));
    }

    let mut agents = request.agents;
    for agent in &mut agents {
        agent.name = agent.name.trim().to_string();
        if agent.name.is_empty() {
            return Err(AppError::Validation("Every agent needs a name".to_string()));
        }
    }

    let port = state.ports.upsert_city(&request.city, agents)?;
    info!("Saved {} agents for {}", port.agents.len(), port.city);

    Ok(Json(json!({
        "success": true,
        "message": "Port data saved successfully",
        "data": port,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest {
    city: String,
    agent_name: String,
    updates: AgentPatch,
}

async fn update_agent(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    let port = state
        .ports
        .find_by_city(&request.city)?
        .ok_or_else(|| AppError::NotFound("City not found".to_string()))?;

    if port.agent(&request.agent_name).is_none() {
        return Err(AppError::NotFound(
            "Agent not found in this city".to_string(),
        ));
    }

    if let Some(new_name) = request.updates.name.as_deref().map(str::trim) {
        if new_name.is_empty() {
            return Err(AppError::Validation("Agent name cannot be empty".to_string()));
        }
        if new_name != request.agent_name && port.agent(new_name).is_some() {
            return Err(AppError::Validation(format!(
                "Agent {} already exists in this city",
                new_name
            )));
        }
    }

    let updated = state
        .ports
        .update_agent(&request.city, &request.agent_name, &request.updates)?
        .ok_or_else(|| AppError::NotFound("Agent not found in this city".to_string()))?;

    Ok(Json(json!({
        "success": true,
        "message": "Agent updated successfully",
        "data": updated,
    })))
}

#[derive(Debug, Deserialize)]
struct DeleteQuery {
    city: Option<String>,
    agent: Option<String>,
}

async fn delete_port(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeleteQuery>,
) -> Result<impl IntoResponse, AppError> {
    let city = query
        .city
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::Validation("City parameter is required".to_string()))?;

    let message = match query.agent.filter(|a| !a.is_empty()) {
        Some(agent) => {
            if !state.ports.remove_agent(&city, &agent)? {
                return Err(AppError::NotFound("Agent not found".to_string()));
            }
            "Agent deleted successfully"
        }
        None => {
            if !state.ports.delete_city(&city)? {
                return Err(AppError::NotFound("City not found".to_string()));
            }
            "City deleted successfully"
        }
    };

    Ok(Json(json!({ "success": true, "message": message })))
}

/// Import an uploaded workbook
///
/// Reads the multipart `file` field, parses its first worksheet and runs the
/// importer off the async runtime. The token is checked before the body is
/// read.
async fn upload_ports(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut file_bytes = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(e.body_text()))?;
            file_bytes = Some(bytes);
            break;
        }
    }

    let bytes = file_bytes
        .filter(|b| !b.is_empty())
        .ok_or_else(|| AppError::Validation("No file uploaded".to_string()))?;

    let rows = loader::from_bytes(&bytes)
        .map_err(|e| AppError::Validation(format!("Could not read spreadsheet: {}", e)))?;

    let store = Arc::clone(&state.ports);
    let summary = tokio::task::spawn_blocking(move || import_rows(store.as_ref(), &rows))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(Json(json!({ "success": true, "message": summary.message() })))
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

async fn export_ports(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let ports = state.ports.list()?;

    let (content_type, filename, body) = match query.format.as_deref().unwrap_or("xlsx") {
        "xlsx" => {
            let bytes = downloader::to_xlsx(&ports)
                .map_err(|e| AppError::Internal(format!("Excel export failed: {}", e)))?;
            (
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                "port-inventory.xlsx",
                bytes,
            )
        }
        "csv" => (
            "text/csv",
            "port-inventory.csv",
            downloader::to_csv(&ports).into_bytes(),
        ),
        other => {
            return Err(AppError::Validation(format!(
                "Unsupported export format: {}",
                other
            )));
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    ))
}

async fn system_status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let ports = state.ports.list()?;
    let agents: usize = ports.iter().map(|p| p.agents.len()).sum();
    let containers = ports
        .iter()
        .fold(0u64, |acc, p| acc.saturating_add(p.total_containers()));

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "data": {
                "status": "ok",
                "store": {
                    "cities": ports.len(),
                    "agents": agents,
                    "containers": containers,
                },
                "uptime": state.started_at.elapsed().as_secs(),
                "version": env!("CARGO_PKG_VERSION"),
            }
        })),
    ))
}
