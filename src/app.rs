#![cfg(feature = "web")]

use axum::{
    Form, Json, Router,
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{Local, NaiveDateTime};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::dataset::DashboardSummary;
use crate::error::DashboardError;
use crate::login::{CredentialStore, Operation, Session, SessionRegistry, UserCredentials};
use crate::record::IncidentRecord;
use crate::store::Store;
use crate::workflows::{
    AppendOutcome, IncidentForm, KgidView, ReportForm, ReportOutcome, records_for_kgid,
    report_incident, submit_incident,
};

const SESSION_COOKIE: &str = "session";

/// Everything a request handler needs, built once at startup.
pub struct AppState {
    pub store: Store,
    pub credentials: CredentialStore,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(store: Store, credentials: CredentialStore) -> Self {
        AppState {
            store,
            credentials,
            sessions: SessionRegistry::default(),
        }
    }

    fn session(&self, jar: &CookieJar) -> Session {
        jar.get(SESSION_COOKIE)
            .map(|cookie| self.sessions.get(cookie.value()))
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct KgidQuery {
    kgid: String,
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = match &self {
            DashboardError::Auth(_) => StatusCode::UNAUTHORIZED,
            DashboardError::Forbidden { .. } => StatusCode::FORBIDDEN,
            DashboardError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DashboardError::NotFound(_) => StatusCode::NOT_FOUND,
            DashboardError::DataUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            DashboardError::Persist(_) | DashboardError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            log::error!("{self}");
        }

        let fields = match &self {
            DashboardError::Validation(fields) => fields.clone(),
            _ => Vec::new(),
        };
        let body = serde_json::json!({
            "error": self.to_string(),
            "fields": fields,
        });
        (status, Json(body)).into_response()
    }
}

/// Build the dashboard router
///
/// # Arguments
/// * `state` - Shared store, credentials and sessions
/// * `static_dir` - Directory of frontend assets served under `/static`
///
/// # Returns
/// * `Router` - Ready to be served
pub fn router(state: Arc<AppState>, static_dir: &Path) -> Router {
    Router::new()
        .route("/login", post(handle_login))
        .route("/logout", post(handle_logout))
        .route("/api/session", get(session_info))
        .route("/api/dashboard", get(dashboard))
        .route("/api/records", get(list_records).post(append_record))
        .route("/api/constable/records", get(constable_records))
        .route("/api/constable/report", post(constable_report))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
}

/// Start the dashboard server
///
/// Loads credentials and the dataset up front so a missing or malformed
/// file stops the server before it starts listening.
///
/// # Arguments
/// * `config` - Parsed command-line configuration
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Runs until the server stops
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let credentials = config.credentials()?;
    let store = Store::new(&config.dataset)?;
    store.load()?;

    let state = Arc::new(AppState::new(store, credentials));
    let app = router(state, &config.static_dir);

    let listener = TcpListener::bind(config.bind).await?;
    log::info!("Listening on http://{}", config.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Runs password hashing and whole-file reads and writes on the blocking pool.
async fn blocking<T, F>(state: &Arc<AppState>, work: F) -> Result<T, DashboardError>
where
    F: FnOnce(&AppState) -> Result<T, DashboardError> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || work(&state))
        .await
        .map_err(|e| DashboardError::Internal(format!("worker task failed: {e}")))?
}

/// Handle user login requests
///
/// Validates the credentials and, on success, stores a new session and sets
/// its id in the `session` cookie. A failed attempt leaves any existing
/// session untouched.
async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(credentials): Form<UserCredentials>,
) -> Result<(CookieJar, Json<Session>), DashboardError> {
    let session = blocking(&state, move |state| {
        let mut session = Session::default();
        session.login(&state.credentials, &credentials.username, &credentials.password)?;
        Ok(session)
    })
    .await?;

    if let Some(old) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(old.value());
    }
    let session_id = state.sessions.create(session.clone());
    let cookie = Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true);

    Ok((jar.add(cookie), Json(session)))
}

/// Handle user logout
///
/// Drops the server-side session and clears the cookie.
async fn handle_logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Json<Session>) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value());
    }
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Json(Session::default()),
    )
}

async fn session_info(State(state): State<Arc<AppState>>, jar: CookieJar) -> Json<Session> {
    Json(state.session(&jar))
}

async fn dashboard(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Json<DashboardSummary>, DashboardError> {
    state.session(&jar).require(Operation::ReadAggregates)?;
    blocking(&state, |state| Ok(state.store.load()?.summary()))
        .await
        .map(Json)
}

async fn list_records(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Json<Vec<IncidentRecord>>, DashboardError> {
    state.session(&jar).require(Operation::ReadAggregates)?;
    blocking(&state, |state| Ok(state.store.load()?.records().to_vec()))
        .await
        .map(Json)
}

async fn append_record(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<IncidentForm>,
) -> Result<Response, DashboardError> {
    let session = state.session(&jar);
    let outcome = blocking(&state, move |state| {
        submit_incident(&state.store, &session, &form, now())
    })
    .await?;
    let status = match outcome {
        AppendOutcome::Appended { .. } => StatusCode::CREATED,
        AppendOutcome::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    };
    Ok((status, Json(outcome)).into_response())
}

async fn constable_records(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<KgidQuery>,
) -> Result<Json<KgidView>, DashboardError> {
    let session = state.session(&jar);
    blocking(&state, move |state| {
        records_for_kgid(&state.store, &session, &query.kgid)
    })
    .await
    .map(Json)
}

/// Handle a constable's evidence submission
///
/// Reads `kgid`, `case_number` and `photo` from a multipart form. The photo
/// bytes are only checked for presence and are dropped afterwards.
async fn constable_report(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<Response, DashboardError> {
    let session = state.session(&jar);
    session.require(Operation::UpdateReported)?;

    let mut form = ReportForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DashboardError::validation("photo", e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "kgid" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| DashboardError::validation("kgid", e.body_text()))?;
                form.kgid = Some(text);
            }
            "case_number" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| DashboardError::validation("case_number", e.body_text()))?;
                form.case_number = Some(text);
            }
            "photo" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| DashboardError::validation("photo", e.body_text()))?;
                form.photo = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    let outcome = blocking(&state, move |state| {
        report_incident(&state.store, &session, &form, now())
    })
    .await?;
    let status = match outcome {
        ReportOutcome::Updated { .. } => StatusCode::OK,
        ReportOutcome::NotFound => StatusCode::NOT_FOUND,
        ReportOutcome::IncompleteInput { .. } => StatusCode::BAD_REQUEST,
    };
    Ok((status, Json(outcome)).into_response())
}
