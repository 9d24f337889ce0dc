//! HTTP server implementation using Axum.

use crate::actions::Action;
use crate::dispatch::{self, ActionRequest};
use crate::error::{panic_response, PanelError};
use crate::form::FormFields;
use crate::guard::{csrf_protect, require_token, session_layer, SessionId};
use crate::manifest;
use crate::publish;
use crate::state::{cleanup_expired_sessions, AppState, Workspace};
use crate::views;
use crate::workspace::{describe, ActiveProject};
use axum::{
    body::Bytes,
    extract::{Extension, Path, Query, Request, State},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::interval;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Deserialize)]
struct SubprojectQuery {
    sp: Option<String>,
}

#[derive(Deserialize)]
struct OptionsQuery {
    act: Option<String>,
}

/// Build the router. Everything but the background endpoints and the health
/// check needs the login token; every POST needs the CSRF token.
pub fn app_router(state: AppState) -> Router {
    with_layers(routes(state.clone()), state)
}

fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/", get(index))
        .route("/process", post(process))
        .route("/action", post(action))
        .route("/shutdown", get(shutdown))
        .route("/:name/summary/*path", get(summary_file))
        .route_layer(middleware::from_fn_with_state(state, require_token));

    Router::new()
        .merge(protected)
        .route("/_background_subproject", get(background_subproject))
        .route("/_background_options", get(background_options))
        .route("/_background_summary", get(background_summary))
        .route("/health", get(health))
}

/// Innermost first: CSRF, panic catching, sessions, tracing. The session
/// layer must sit outside the panic layer to see its reset marker.
fn with_layers(routes: Router<AppState>, state: AppState) -> Router {
    routes
        .layer(middleware::from_fn_with_state(state.clone(), csrf_protect))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(state.clone(), session_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server until `/shutdown` or ctrl-c.
pub async fn run_server(state: AppState) -> std::io::Result<()> {
    // Spawn cleanup task
    let sessions = state.sessions.clone();
    let ttl = state.config.session_ttl;
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            cleanup_expired_sessions(&sessions, ttl).await;
        }
    });

    let addr = state.config.addr();
    let shutdown = state.shutdown.clone();
    let app = app_router(state);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
}

async fn shutdown_signal(requested: Arc<Notify>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    tokio::select! {
        _ = requested.notified() => info!("Shutting down..."),
        _ = ctrl_c => info!("Received ctrl-c, shutting down..."),
    }
}

async fn session_workspace(state: &AppState, id: &str) -> Result<Workspace, PanelError> {
    state
        .workspace(id)
        .await
        .ok_or_else(|| PanelError::Internal(format!("session {} disappeared", id)))
}

async fn health() -> &'static str {
    "OK"
}

async fn index(
    State(state): State<AppState>,
    Extension(SessionId(id)): Extension<SessionId>,
) -> Result<Html<String>, PanelError> {
    let manifest_path = manifest::manifest_path(state.config.manifest.as_deref())?;
    let projects =
        tokio::task::spawn_blocking(move || manifest::load_projects(&manifest_path)).await??;
    let csrf = state.csrf_token(&id).await;
    Ok(Html(views::index_page(&projects, &csrf)))
}

async fn process(
    State(state): State<AppState>,
    Extension(SessionId(id)): Extension<SessionId>,
    body: Bytes,
) -> Result<Html<String>, PanelError> {
    let form = FormFields::parse(&body);
    let selected = form
        .get("select_project")
        .ok_or(PanelError::MissingField("select_project"))?
        .to_string();
    let subproject = form
        .get("subprojects")
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    info!(project = %selected, subproject = ?subproject, "POST /process");

    let mut workspace = session_workspace(&state, &id).await?.lock_owned().await;
    let info = tokio::task::spawn_blocking(move || -> Result<_, PanelError> {
        let mut active = ActiveProject::select(&selected)?;
        if let Some(name) = subproject {
            active.activate_subproject(&name)?;
        }
        let info = active.summary().clone();
        *workspace = Some(active);
        Ok(info)
    })
    .await??;

    let csrf = state.csrf_token(&id).await;
    Ok(Html(views::process_page(&info, &csrf)))
}

async fn background_subproject(
    State(state): State<AppState>,
    Extension(SessionId(id)): Extension<SessionId>,
    Query(query): Query<SubprojectQuery>,
) -> Result<Json<serde_json::Value>, PanelError> {
    let sp = query.sp.ok_or(PanelError::MissingField("sp"))?;
    let mut workspace = session_workspace(&state, &id).await?.lock_owned().await;
    let info = tokio::task::spawn_blocking(move || -> Result<_, PanelError> {
        let active = workspace.as_mut().ok_or(PanelError::NoProjectSelected)?;
        Ok(active.activate_subproject(&sp)?.clone())
    })
    .await??;

    Ok(Json(json!({
        "subproj_txt": info.subproject_text(),
        "sample_count": info.sample_count,
    })))
}

async fn background_options(
    State(state): State<AppState>,
    Extension(SessionId(id)): Extension<SessionId>,
    Query(query): Query<OptionsQuery>,
) -> Result<Json<serde_json::Value>, PanelError> {
    let action = match query.act.as_deref().filter(|a| !a.is_empty()) {
        Some(act) => act.parse::<Action>()?,
        None => Action::default(),
    };
    state.set_selected_action(&id, action).await;
    Ok(Json(json!({
        "options": views::options_fragment(action.options()),
    })))
}

async fn background_summary(
    State(state): State<AppState>,
    Extension(SessionId(id)): Extension<SessionId>,
) -> Result<Json<serde_json::Value>, PanelError> {
    let info = {
        let workspace = session_workspace(&state, &id).await?;
        let active = workspace.lock().await;
        let info = describe(active.as_ref())?.clone();
        info
    };
    let link = state.publisher.publish(&info).await;
    Ok(Json(json!({
        "summary": views::summary_fragment(&link),
    })))
}

async fn action(
    State(state): State<AppState>,
    Extension(SessionId(id)): Extension<SessionId>,
    body: Bytes,
) -> Result<Html<String>, PanelError> {
    let form = FormFields::parse(&body);
    let action = match form.get("act").filter(|a| !a.is_empty()) {
        Some(act) => act.parse::<Action>()?,
        None => state.selected_action(&id).await.unwrap_or_default(),
    };

    // Snapshot the config path so a concurrent selection cannot change it mid-run.
    let config_file = {
        let workspace = session_workspace(&state, &id).await?;
        let active = workspace.lock().await;
        let path = active
            .as_ref()
            .map(|a| a.config_file().to_path_buf())
            .ok_or(PanelError::NoProjectSelected)?;
        path
    };
    let request = ActionRequest::new(
        state.config.tool.clone(),
        action,
        form.all("opt"),
        config_file,
    )?;
    info!(action = %action, options = ?request.options, "POST /action");

    let _running = state.dispatch_lock.lock().await;
    let output = tokio::task::spawn_blocking(move || dispatch::execute(&request)).await??;
    info!(
        exit = ?output.exit_code,
        signal = ?output.signal,
        lines = output.lines.len(),
        succeeded = output.succeeded(),
        "POST /action finished"
    );
    Ok(Html(views::execute_page(&output)))
}

async fn summary_file(
    State(state): State<AppState>,
    Extension(SessionId(id)): Extension<SessionId>,
    Path((name, path)): Path<(String, String)>,
    request: Request,
) -> Result<Response, PanelError> {
    // The session's own project wins over whatever was published under the name.
    let own_dir = match state.workspace(&id).await {
        Some(workspace) => {
            let active = workspace.lock().await;
            let dir = active
                .as_ref()
                .map(|a| a.summary())
                .filter(|s| s.name == name)
                .map(|s| s.output_dir.clone());
            dir
        }
        None => None,
    };
    let file = match own_dir {
        Some(dir) => publish::resolve_within(&dir, &path).await?,
        None => state.publisher.resolve(&name, &path).await?,
    };
    let response = ServeFile::new(file)
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {});
    Ok(response.into_response())
}

async fn shutdown(
    State(state): State<AppState>,
    Extension(SessionId(id)): Extension<SessionId>,
) -> &'static str {
    state.clear_auth(&id).await;
    state.shutdown.notify_one();
    "Server shutting down..."
}
