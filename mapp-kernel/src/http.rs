/**
 * API REST MAPP - Serveur HTTP du kernel
 *
 * RÔLE :
 * Couche fine au-dessus des opérations du kernel : extraction du viewer,
 * décodage des corps JSON, sérialisation des réponses.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, routes sous /api + /health
 * - Viewer lu dans un header posé par le proxy d'authentification
 *   (absent = anonyme) ; les routes "amis" exigent un viewer connu
 * - Ingestion protégée par la clé de callback du corps de requête
 * - Erreurs métier → JSON `{"message": ...}` (cf. MappError)
 */

use crate::error::MappError;
use crate::friends::{add_friend, list_friends, remove_friends, search_people};
use crate::ingest;
use crate::queries::{self, Refresh};
use crate::state::AppState;
use crate::store::StoreError;
use crate::viewer::Viewer;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/refresh", get(refresh))
        .route("/api/rooms", get(rooms))
        .route("/api/rooms/{which}", get(rooms_machines))
        .route("/api/update_schema", post(update_schema))
        .route("/api/update", post(update))
        .route("/api/update_available", post(update_available))
        .route("/api/friends", get(friends).post(edit_friends))
        .route("/api/search", get(search))
        .with_state(app_state)
}

fn viewer(app: &AppState, headers: &HeaderMap) -> Viewer {
    let identity = headers
        .get(app.cfg.viewer_header.as_str())
        .and_then(|v| v.to_str().ok());
    Viewer::from_identity(identity)
}

/// Corps JSON illisible = Null (la clé de callback manquera)
fn json_body(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

fn typed_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, MappError> {
    serde_json::from_slice(body).map_err(|e| MappError::Validation(format!("Malformed JSON content: {e}")))
}

/// Exécute une opération du kernel sur un thread bloquant (le store peut faire des I/O synchrones)
async fn blocking<T, F>(app: AppState, op: F) -> Result<T, MappError>
where
    F: FnOnce(&AppState) -> Result<T, MappError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || op(&app))
        .await
        .map_err(|e| MappError::Store(StoreError::Backend(format!("blocking task failed: {e}"))))?
}

// GET /health
async fn health(State(app): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "store": app.lab.store().backend_name() }))
}

#[derive(Debug, Deserialize)]
struct RefreshParams {
    #[serde(default)]
    site: String,
}

// GET /api/refresh?site=<room_key>
async fn refresh(
    State(app): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RefreshParams>,
) -> Result<Response, MappError> {
    let viewer = viewer(&app, &headers);
    let max_age = format!("max-age={}", app.cfg.refresh_max_age_secs);
    let view = blocking(app, move |app| {
        queries::refresh(&app.lab, app.directory.as_ref(), &viewer, &params.site)
    })
    .await?;

    let is_demo = view.is_demo();
    let mut resp = Json::<Refresh>(view).into_response();
    if !is_demo {
        if let Ok(value) = HeaderValue::from_str(&max_age) {
            resp.headers_mut().insert(header::CACHE_CONTROL, value);
        }
    }
    Ok(resp)
}

// GET /api/rooms
async fn rooms(State(app): State<AppState>) -> Result<Json<Value>, MappError> {
    let rooms = blocking(app, |app| queries::rooms_list(&app.lab)).await?;
    Ok(Json(json!({ "rooms": rooms })))
}

// GET /api/rooms/{which}
async fn rooms_machines(State(app): State<AppState>, Path(which): Path<String>) -> Result<Json<Value>, MappError> {
    let machines = blocking(app, move |app| queries::room_machines(&app.lab, &which)).await?;
    Ok(Json(json!({ "machines": machines })))
}

// POST /api/update_schema
async fn update_schema(State(app): State<AppState>, body: Bytes) -> Result<Json<Value>, MappError> {
    let payload = json_body(&body);
    blocking(app, move |app| ingest::update_schema(&app.lab, &payload).map(|_| ())).await?;
    Ok(Json(json!({ "success": true })))
}

// POST /api/update
async fn update(State(app): State<AppState>, body: Bytes) -> Result<Json<Value>, MappError> {
    let payload = json_body(&body);
    blocking(app, move |app| ingest::update(&app.lab, &payload).map(|_| ())).await?;
    Ok(Json(json!({ "status": "ok" })))
}

// POST /api/update_available
async fn update_available(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, MappError> {
    let viewer = viewer(&app, &headers);
    let payload = json_body(&body);
    let behind = blocking(app, move |app| queries::update_available(&app.lab, &viewer, &payload)).await?;
    let status = if behind { "True" } else { "False" };
    Ok(Json(json!({ "status": status })))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum FriendsForm {
    Add { uun: String },
    Del {
        #[serde(default)]
        delfriends: Vec<String>,
    },
}

// GET /api/friends
async fn friends(State(app): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, MappError> {
    let viewer = viewer(&app, &headers);
    let list = blocking(app, move |app| list_friends(&app.lab, &viewer, app.directory.as_ref())).await?;
    Ok(Json(json!({ "friendList": list })))
}

// POST /api/friends  {"type": "add", "uun": ..} | {"type": "del", "delfriends": [..]}
async fn edit_friends(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, MappError> {
    let viewer = viewer(&app, &headers);
    if viewer.is_anonymous() {
        return Err(MappError::LoginRequired);
    }
    let form = typed_body::<FriendsForm>(&body)?;

    let list = blocking(app, move |app| {
        match form {
            FriendsForm::Add { uun } => add_friend(&app.lab, &viewer, &uun)?,
            FriendsForm::Del { delfriends } => remove_friends(&app.lab, &viewer, delfriends)?,
        }
        list_friends(&app.lab, &viewer, app.directory.as_ref())
    })
    .await?;
    Ok(Json(json!({ "friendList": list })))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    name: String,
}

// GET /api/search?name=<partial>
async fn search(
    State(app): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, MappError> {
    let viewer = viewer(&app, &headers);
    let people = blocking(app, move |app| {
        search_people(&app.lab, &viewer, app.directory.as_ref(), &params.name)
    })
    .await?;
    Ok(Json(json!({ "people": people })))
}
