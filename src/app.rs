#![cfg(feature = "web")]
use axum::{
    Form, Router,
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use handlebars::Handlebars;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::graph::{GraphType, create_graph};
use crate::ingest::{self, IngestReport};
use crate::query;
use crate::scatter::create_scatter_fragment;
use crate::store::{RecordStore, SqliteStore};

/// Name of the multipart field carrying an uploaded CSV file
pub const UPLOAD_FIELD: &str = "file";

/// Shared state handed to every handler
///
/// The record store is injected rather than opened globally, so tests can
/// run the router against an in-memory database.
pub struct AppState {
    store: Arc<dyn RecordStore>,
    config: Config,
    templates: Handlebars<'static>,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, config: Config) -> Result<AppState> {
        let mut templates = Handlebars::new();
        for (name, source) in [
            ("index", include_str!("./templates/index.hbs")),
            ("table", include_str!("./templates/table.hbs")),
            ("chart", include_str!("./templates/chart.hbs")),
            ("interactive_chart", include_str!("./templates/interactive_chart.hbs")),
            ("upload", include_str!("./templates/upload.hbs")),
        ] {
            templates
                .register_template_string(name, source)
                .map_err(|e| Error::Render(e.to_string()))?;
        }
        Ok(AppState {
            store,
            config,
            templates,
        })
    }

    fn render(&self, name: &str, data: &serde_json::Value) -> Result<Html<String>> {
        self.templates
            .render(name, data)
            .map(Html)
            .map_err(|e| Error::Render(e.to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchForm {
    #[serde(default)]
    search: String,
}

/// Build the router with every route of the application
pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();
    Router::new()
        .route("/", get(serve_landing))
        .route("/load_data", get(load_data))
        .route("/countries", get(list_countries).post(search_countries))
        .route("/charts", get(charts))
        .route("/interactive-chart", get(interactive_chart))
        .route("/upload", get(upload_form).post(upload_file))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
}

/// Open the configured database and serve until the process stops
pub async fn run(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let store = SqliteStore::open(&config.database_path)?;
    std::fs::create_dir_all(&config.static_dir)?;
    let bind_addr = config.bind_addr.clone();

    let state = Arc::new(AppState::new(Arc::new(store), config)?);
    let app = router(state);

    let listener = TcpListener::bind(&bind_addr).await?;
    log::info!("Listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_landing(State(state): State<Arc<AppState>>) -> Result<Html<String>> {
    state.render("index", &json!({}))
}

async fn load_data(State(state): State<Arc<AppState>>) -> Result<String> {
    let report = ingest::load_spreadsheet(state.store.as_ref(), &state.config.spreadsheet_path)?;
    Ok(confirmation("Data loaded", &report))
}

async fn list_countries(
    State(state): State<Arc<AppState>>,
    Query(form): Query<SearchForm>,
) -> Result<Html<String>> {
    render_countries(&state, &form.search)
}

async fn search_countries(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SearchForm>,
) -> Result<Html<String>> {
    render_countries(&state, &form.search)
}

fn render_countries(state: &AppState, search: &str) -> Result<Html<String>> {
    let data = query::search(state.store.as_ref(), Some(search))?;
    state.render(
        "table",
        &json!({ "data": data, "search_query": search, "count": data.len() }),
    )
}

async fn charts(State(state): State<Arc<AppState>>) -> Result<Html<String>> {
    let records = state.store.all()?;
    std::fs::create_dir_all(&state.config.static_dir)?;

    let mut charts = Vec::new();
    for graph_type in GraphType::STATIC {
        let png = create_graph(&records, graph_type)?;
        std::fs::write(state.config.static_dir.join(graph_type.file_name()), png)?;
        charts.push(format!("static/{}", graph_type.file_name()));
    }

    state.render("chart", &json!({ "charts": charts }))
}

async fn interactive_chart(State(state): State<Arc<AppState>>) -> Result<Html<String>> {
    let records = state.store.all()?;
    let chart_html = create_scatter_fragment(&records)?;
    state.render("interactive_chart", &json!({ "chart_html": chart_html }))
}

async fn upload_form(State(state): State<Arc<AppState>>) -> Result<Html<String>> {
    state.render("upload", &json!({ "field": UPLOAD_FIELD }))
}

async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<String> {
    let mut payload = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::ParseError(e.to_string()))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            payload = field
                .bytes()
                .await
                .map_err(|e| Error::ParseError(e.to_string()))?
                .to_vec();
        }
    }

    let report = ingest::append_csv(state.store.as_ref(), &payload)?;
    Ok(confirmation("Data uploaded", &report))
}

fn confirmation(action: &str, report: &IngestReport) -> String {
    let mut message = format!("{}: {} rows", action, report.inserted);
    if report.skipped > 0 {
        message.push_str(&format!(", {} skipped without a name", report.skipped));
    }
    if !report.issues.is_empty() {
        message.push_str(&format!(
            ", {} values kept without integer coercion",
            report.issues.len()
        ));
    }
    message
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::SourceNotFound(_) => StatusCode::NOT_FOUND,
            Error::SchemaMismatch { .. } | Error::EmptyPayload | Error::ParseError(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::InsufficientData(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::StorageUnavailable(_)
            | Error::Render(_)
            | Error::Config(_)
            | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            log::error!("{}", self);
        } else {
            log::warn!("{}", self);
        }
        (status, self.to_string()).into_response()
    }
}
