//! HTTP handlers for the notes API, auth endpoints and proxy fallback.

use std::{collections::BTreeMap, sync::Arc, time::Instant};

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, FromRef, Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::{
    ApiProxy, AuthError, BlogError, Config, ListNotesOptions, NoteIndex, NotePage, NoteStorage,
    NoteUpdate, OptionalAuth, RequireAuth, Result, TokenAuthority, PROXY_PREFIX,
};

/// Shared state handed to every handler.
pub struct AppState {
    pub storage: Arc<Mutex<NoteStorage>>,
    pub auth: TokenAuthority,
    pub proxy: ApiProxy,
    pub started_at: Instant,
}

impl AppState {
    /// Prepares the notes directory and builds the token and proxy services.
    pub fn new(config: &Config) -> Result<Arc<Self>> {
        let storage = NoteStorage::new(config.clone());
        storage.initialize()?;
        Self::with_storage(Arc::new(Mutex::new(storage)), config)
    }

    /// Builds state around an already initialized store.
    pub fn with_storage(storage: Arc<Mutex<NoteStorage>>, config: &Config) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            storage,
            auth: TokenAuthority::from_config(config)?,
            proxy: ApiProxy::from_config(config)?,
            started_at: Instant::now(),
        }))
    }
}

impl FromRef<Arc<AppState>> for TokenAuthority {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.auth.clone()
    }
}

/// Error reply rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Internal(String),
}

impl ApiError {
    fn note_not_found() -> Self {
        ApiError::NotFound("Note not found".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<BlogError> for ApiError {
    fn from(e: BlogError) -> Self {
        match e {
            BlogError::NoteNotFound { .. } => ApiError::note_not_found(),
            other => {
                error!("Request failed: {}", other);
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Query parameters of `/api/notes`. Kept as strings so unparseable values
/// fall back to defaults instead of failing the request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesQuery {
    pub id: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub tag: Option<String>,
    pub is_public: Option<String>,
}

impl NotesQuery {
    fn id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    fn list_options(&self) -> ListNotesOptions {
        let defaults = ListNotesOptions::default();
        ListNotesOptions {
            page: parse_or(self.page.as_deref(), defaults.page),
            page_size: parse_or(self.page_size.as_deref(), defaults.page_size),
            tag: self.tag.clone().filter(|t| !t.is_empty()),
            is_public: match self.is_public.as_deref() {
                Some("true") => Some(true),
                Some("false") => Some(false),
                _ => None,
            },
        }
        .normalized()
    }
}

fn parse_or(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNoteRequest {
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNoteRequest {
    pub id: Option<String>,
    #[serde(flatten)]
    pub changes: NoteUpdate,
}

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub year: Option<String>,
    pub month: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// `GET /api/notes`: one note by `id`, or a filtered page.
///
/// Anonymous callers only ever see public notes; a private note looked up by
/// id answers 404 exactly like a missing one.
pub async fn get_notes(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<NotesQuery>,
) -> ApiResult<Response> {
    if let Some(id) = query.id() {
        let note = state.storage.lock().await.get_note(id)?;
        return match note {
            Some(note) if note.is_public || user.is_some() => Ok(Json(note).into_response()),
            _ => Err(ApiError::note_not_found()),
        };
    }

    let mut options = query.list_options();
    if user.is_none() {
        // Private notes filtered for visibility leave nothing to show.
        if options.is_public == Some(false) {
            return Ok(Json(NotePage {
                notes: Vec::new(),
                total: 0,
                page: options.page,
                page_size: options.page_size,
            })
            .into_response());
        }
        options.is_public = Some(true);
    }
    let page = state.storage.lock().await.list_notes(options)?;
    Ok(Json(page).into_response())
}

/// `POST /api/notes`
pub async fn create_note(
    State(state): State<Arc<AppState>>,
    RequireAuth(claims): RequireAuth,
    body: std::result::Result<Json<CreateNoteRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = body?;
    if request.data.is_empty() {
        return Err(ApiError::BadRequest("Data is required".to_string()));
    }

    let note = state
        .storage
        .lock()
        .await
        .create_note(request.data, request.is_public, request.tags)?;
    info!("{} created note {}", claims.email, note.id);
    Ok((StatusCode::CREATED, Json(note)).into_response())
}

/// `PUT /api/notes`
pub async fn update_note(
    State(state): State<Arc<AppState>>,
    RequireAuth(claims): RequireAuth,
    body: std::result::Result<Json<UpdateNoteRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = body?;
    let id = request
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("ID is required".to_string()))?;

    let note = state
        .storage
        .lock()
        .await
        .update_note(&id, request.changes)?;
    info!("{} updated note {}", claims.email, note.id);
    Ok(Json(note).into_response())
}

/// `DELETE /api/notes?id=`
pub async fn delete_note(
    State(state): State<Arc<AppState>>,
    RequireAuth(claims): RequireAuth,
    Query(query): Query<NotesQuery>,
) -> ApiResult<Response> {
    let id = query
        .id()
        .ok_or_else(|| ApiError::BadRequest("ID is required".to_string()))?;

    state.storage.lock().await.delete_note(id)?;
    info!("{} deleted note {}", claims.email, id);
    Ok(Json(json!({ "success": true })).into_response())
}

/// `GET /api/notes/stats`: the raw index document.
pub async fn note_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<NoteIndex>> {
    let index = state.storage.lock().await.read_index()?;
    Ok(Json(index))
}

/// `GET /api/notes/stats/month?year=&month=`: notes per day of one month.
pub async fn month_stats(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<MonthQuery>,
) -> ApiResult<Json<BTreeMap<String, usize>>> {
    let year = bounded_param(query.year.as_deref(), "year", 1900..=2100)?;
    let month = bounded_param(query.month.as_deref(), "month", 1..=12)?;

    let counts = state
        .storage
        .lock()
        .await
        .month_stats(year, month as u32, user.is_none())?;
    Ok(Json(counts))
}

fn bounded_param(
    raw: Option<&str>,
    name: &str,
    range: std::ops::RangeInclusive<i32>,
) -> ApiResult<i32> {
    let raw = raw
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{} parameter is required", name)))?;
    raw.parse::<i32>()
        .ok()
        .filter(|v| range.contains(v))
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid {} parameter", name)))
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = body?;
    match state.auth.login(&request.email, &request.password) {
        Ok(token) => {
            info!("Login succeeded for {}", request.email);
            Ok(Json(json!({ "token": token })))
        }
        Err(AuthError::InvalidCredentials) => {
            warn!("Login failed for {}", request.email);
            Err(ApiError::Unauthorized("Invalid credentials".to_string()))
        }
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}

/// `GET /api/auth/check`
pub async fn check_auth(RequireAuth(claims): RequireAuth) -> Json<Value> {
    Json(json!({ "valid": true, "user": { "email": claims.email } }))
}

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptimeSecs": state.started_at.elapsed().as_secs(),
    }))
}

/// Fallback: relays anything under `/api/` to the upstream API.
pub async fn proxy_fallback(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match uri.path().strip_prefix(PROXY_PREFIX) {
        Some(rest) if rest.starts_with('/') => {
            state
                .proxy
                .forward(method, rest, uri.query(), &headers, body)
                .await
        }
        _ => (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_falls_back_on_bad_paging() {
        let query = NotesQuery {
            page: Some("-2".into()),
            page_size: Some("1000".into()),
            tag: Some(String::new()),
            is_public: Some("yes".into()),
            ..Default::default()
        };
        let options = query.list_options();
        assert_eq!(options.page, 1);
        assert_eq!(options.page_size, 20);
        assert_eq!(options.tag, None);
        assert_eq!(options.is_public, None);
    }

    #[test]
    fn list_query_reads_filters() {
        let query = NotesQuery {
            page: Some("2".into()),
            page_size: Some("5".into()),
            tag: Some("rust".into()),
            is_public: Some("false".into()),
            ..Default::default()
        };
        let options = query.list_options();
        assert_eq!((options.page, options.page_size), (2, 5));
        assert_eq!(options.tag.as_deref(), Some("rust"));
        assert_eq!(options.is_public, Some(false));
    }

    #[test]
    fn month_parameters_are_range_checked() {
        assert_eq!(bounded_param(Some("2024"), "year", 1900..=2100).unwrap(), 2024);
        assert!(bounded_param(Some("1899"), "year", 1900..=2100).is_err());
        assert!(bounded_param(Some("13"), "month", 1..=12).is_err());
        assert!(bounded_param(Some("x"), "month", 1..=12).is_err());
        assert!(bounded_param(None, "month", 1..=12).is_err());
    }

    #[test]
    fn not_found_maps_to_404_everything_else_to_500() {
        let response = ApiError::from(BlogError::NoteNotFound { id: "1".into() }).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = ApiError::from(BlogError::ServerError {
            message: "boom".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
