// REST API - JSON over HTTP with Axum
//
// Every route lives under /api/v1. Handlers are thin: parse the body, call
// the registry / relations / search engine, render entities through the codec.
// Error bodies are always {"error": "<message>"}.

use crate::codec::Mapping;
use crate::entities::{Amenity, City, Entity, EntityKind, Place, Record, State as StateEntity, User};
use crate::error::StoreError;
use crate::registry::Registry;
use crate::search::{self, SearchMode, SearchRequest};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub search_mode: SearchMode,
}

impl AppState {
    pub fn new(registry: Arc<Registry>, search_mode: SearchMode) -> Self {
        Self {
            registry,
            search_mode,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: "Not found".to_string(),
        }
    }

    fn bad_request<T: Into<String>>(message: T) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { .. } => ApiError::not_found(),
            StoreError::Validation(message) => ApiError::bad_request(message),
            other => {
                tracing::error!(error = %other, "request failed");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: other.to_string(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Helpers
// ============================================================================

/// Request bodies must be a JSON object
fn parse_object(body: &Bytes) -> ApiResult<Mapping> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(ApiError::bad_request("Not a JSON")),
    }
}

/// Wire form of an entity; user password hashes never leave the server
fn render(record: &Record) -> ApiResult<Value> {
    let mut map = record.to_mapping()?;
    if record.kind() == EntityKind::User {
        map.remove("password");
    }
    Ok(Value::Object(map))
}

fn render_all<E: Entity>(entities: Vec<E>) -> ApiResult<Json<Value>> {
    let rendered = entities
        .into_iter()
        .map(|e| render(&e.into_record()))
        .collect::<ApiResult<Vec<Value>>>()?;
    Ok(Json(Value::Array(rendered)))
}

fn require<E: Entity>(registry: &Registry, id: &str) -> ApiResult<E> {
    registry.get::<E>(id)?.ok_or_else(ApiError::not_found)
}

/// `user_id` must be supplied and name an existing user
fn require_user(registry: &Registry, supplied: &Mapping) -> ApiResult<()> {
    let user_id = supplied
        .get("user_id")
        .ok_or_else(|| ApiError::from(StoreError::missing("user_id")))?;
    match user_id.as_str() {
        Some(id) => require::<User>(registry, id).map(|_| ()),
        None => Err(ApiError::not_found()),
    }
}

fn created(record: &Record) -> ApiResult<(StatusCode, Json<Value>)> {
    Ok((StatusCode::CREATED, Json(render(record)?)))
}

// ============================================================================
// Generic handlers (one entity type per route)
// ============================================================================

async fn list(State(app): State<AppState>, kind: EntityKind) -> ApiResult<Json<Value>> {
    let rendered = app
        .registry
        .all_records(kind)?
        .iter()
        .map(render)
        .collect::<ApiResult<Vec<Value>>>()?;
    Ok(Json(Value::Array(rendered)))
}

async fn show(State(app): State<AppState>, Path(id): Path<String>, kind: EntityKind) -> ApiResult<Json<Value>> {
    let record = app.registry.get_record(kind, &id)?.ok_or_else(ApiError::not_found)?;
    Ok(Json(render(&record)?))
}

async fn create(State(app): State<AppState>, body: Bytes, kind: EntityKind) -> ApiResult<(StatusCode, Json<Value>)> {
    let supplied = parse_object(&body)?;
    let record = app.registry.persist(Record::from_input(kind, &supplied)?)?;
    created(&record)
}

async fn update(
    State(app): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
    kind: EntityKind,
) -> ApiResult<Json<Value>> {
    let existing = app.registry.get_record(kind, &id)?.ok_or_else(ApiError::not_found)?;
    let supplied = parse_object(&body)?;
    let record = app.registry.persist(existing.apply_update(&supplied)?)?;
    Ok(Json(render(&record)?))
}

async fn destroy(State(app): State<AppState>, Path(id): Path<String>, kind: EntityKind) -> ApiResult<Json<Value>> {
    let report = app.registry.delete_by_id(kind, &id)?;
    tracing::info!(kind = %kind, id = %id, removed = report.total(), links = report.links_removed, "entity deleted");
    Ok(Json(json!({})))
}

// ============================================================================
// Nested collections
// ============================================================================

/// GET /states/:id/cities
async fn cities_of_state(State(app): State<AppState>, Path(state_id): Path<String>) -> ApiResult<Json<Value>> {
    require::<StateEntity>(&app.registry, &state_id)?;
    render_all(app.registry.relations().cities_of(&state_id)?)
}

/// POST /states/:id/cities
async fn create_city(
    State(app): State<AppState>,
    Path(state_id): Path<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require::<StateEntity>(&app.registry, &state_id)?;
    let mut supplied = parse_object(&body)?;
    supplied.insert("state_id".to_string(), Value::String(state_id));
    let record = app.registry.persist(Record::from_input(EntityKind::City, &supplied)?)?;
    created(&record)
}

/// GET /cities/:id/places
async fn places_of_city(State(app): State<AppState>, Path(city_id): Path<String>) -> ApiResult<Json<Value>> {
    require::<City>(&app.registry, &city_id)?;
    render_all(app.registry.relations().places_of_city(&city_id)?)
}

/// POST /cities/:id/places
async fn create_place(
    State(app): State<AppState>,
    Path(city_id): Path<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require::<City>(&app.registry, &city_id)?;
    let mut supplied = parse_object(&body)?;
    require_user(&app.registry, &supplied)?;
    supplied.insert("city_id".to_string(), Value::String(city_id));
    let record = app.registry.persist(Record::from_input(EntityKind::Place, &supplied)?)?;
    created(&record)
}

/// GET /places/:id/reviews
async fn reviews_of_place(State(app): State<AppState>, Path(place_id): Path<String>) -> ApiResult<Json<Value>> {
    require::<Place>(&app.registry, &place_id)?;
    render_all(app.registry.relations().reviews_of(&place_id)?)
}

/// POST /places/:id/reviews
async fn create_review(
    State(app): State<AppState>,
    Path(place_id): Path<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut supplied = parse_object(&body)?;
    supplied.insert("place_id".to_string(), Value::String(place_id.clone()));
    // body problems are reported before unknown ids
    let review = Record::from_input(EntityKind::Review, &supplied)?;
    require_user(&app.registry, &supplied)?;
    require::<Place>(&app.registry, &place_id)?;
    created(&app.registry.persist(review)?)
}

// ============================================================================
// Place amenities
// ============================================================================

/// GET /places/:id/amenities
async fn amenities_of_place(State(app): State<AppState>, Path(place_id): Path<String>) -> ApiResult<Json<Value>> {
    require::<Place>(&app.registry, &place_id)?;
    render_all(app.registry.relations().amenities_of(&place_id)?)
}

/// POST /places/:id/amenities/:amenity_id
///
/// 201 when the link is new, 200 when it already existed
async fn link_amenity(
    State(app): State<AppState>,
    Path((place_id, amenity_id)): Path<(String, String)>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require::<Place>(&app.registry, &place_id)?;
    let amenity = require::<Amenity>(&app.registry, &amenity_id)?;

    let status = if app.registry.relations().link(&place_id, &amenity_id)? {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(render(&amenity.into_record())?)))
}

/// DELETE /places/:id/amenities/:amenity_id
async fn unlink_amenity(
    State(app): State<AppState>,
    Path((place_id, amenity_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    require::<Place>(&app.registry, &place_id)?;
    require::<Amenity>(&app.registry, &amenity_id)?;

    if !app.registry.relations().unlink(&place_id, &amenity_id)? {
        return Err(ApiError::not_found());
    }
    Ok(Json(json!({})))
}

// ============================================================================
// Index and search
// ============================================================================

/// GET /status
async fn status() -> Json<Value> {
    Json(json!({ "status": "OK" }))
}

/// GET /stats
async fn stats(State(app): State<AppState>) -> ApiResult<Json<Value>> {
    let counts = app.registry.stats()?;
    Ok(Json(json!(counts)))
}

/// POST /places_search
async fn places_search(State(app): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    let supplied = parse_object(&body)?;
    let request: SearchRequest = serde_json::from_value(Value::Object(supplied))
        .map_err(|e| ApiError::bad_request(format!("Invalid search: {}", e)))?;
    render_all(search::search(&app.registry, &request, app.search_mode)?)
}

async fn fallback() -> ApiError {
    ApiError::not_found()
}

// ============================================================================
// Router
// ============================================================================

/// GET/POST on /<collection>
fn collection_routes(kind: EntityKind) -> Router<AppState> {
    Router::new().route(
        &format!("/{}", kind.collection()),
        get(move |app: State<AppState>| list(app, kind))
            .post(move |app: State<AppState>, body: Bytes| create(app, body, kind)),
    )
}

/// GET/PUT/DELETE on /<collection>/:id
fn item_routes(kind: EntityKind) -> Router<AppState> {
    Router::new().route(
        &format!("/{}/:id", kind.collection()),
        get(move |app: State<AppState>, id: Path<String>| show(app, id, kind))
            .put(move |app: State<AppState>, id: Path<String>, body: Bytes| update(app, id, body, kind))
            .delete(move |app: State<AppState>, id: Path<String>| destroy(app, id, kind)),
    )
}

pub fn router(state: AppState) -> Router {
    let mut api = Router::new()
        .route("/status", get(status))
        .route("/stats", get(stats))
        .route("/states/:id/cities", get(cities_of_state).post(create_city))
        .route("/cities/:id/places", get(places_of_city).post(create_place))
        .route("/places/:id/reviews", get(reviews_of_place).post(create_review))
        .route("/places/:id/amenities", get(amenities_of_place))
        .route(
            "/places/:id/amenities/:amenity_id",
            post(link_amenity).delete(unlink_amenity),
        )
        .route("/places_search", post(places_search));

    for kind in [EntityKind::State, EntityKind::Amenity, EntityKind::User] {
        api = api.merge(collection_routes(kind));
    }
    for kind in EntityKind::ALL {
        api = api.merge(item_routes(kind));
    }

    Router::new()
        .nest("/api/v1", api)
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
