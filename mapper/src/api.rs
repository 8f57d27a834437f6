//! JSON HTTP adapter. Each handler locks the shared state, performs one user
//! action and returns its result.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
};
use serde::{Deserialize, Serialize};
use shared::{
    ApiError, Coordinate, CustomerDraft, CustomerLocation, ImportMode, ImportSummary, Language,
    MapClickOutcome, MeasurementResponse, Region, RegionDraft, Site, SiteDraft, SitePatch,
    SiteProximity, StateSnapshot, UserLocation,
};
use tokio::sync::Mutex;

use crate::{
    error::{MapperError, TransferError},
    registry::SearchField,
    state::AppState,
    transfer::{self, ExportKind},
};

pub type SharedState = Arc<Mutex<AppState>>;

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn shared_state(state: AppState) -> SharedState {
    Arc::new(Mutex::new(state))
}

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/sites", get(list_sites).post(create_site))
        .route(
            "/api/sites/:id",
            get(get_site).patch(update_site).delete(delete_site),
        )
        .route("/api/sites/:id/notes", put(update_notes))
        .route("/api/sites/:id/edit", post(begin_edit))
        .route("/api/edit", patch(stage_edit).delete(cancel_edit))
        .route("/api/edit/commit", post(commit_edit))
        .route("/api/selection", axum::routing::delete(clear_selection))
        .route("/api/selection/:id", put(select_site))
        .route("/api/regions", get(list_regions).post(create_region))
        .route("/api/regions/:code/select", post(select_region))
        .route("/api/customer", put(set_customer).delete(clear_customer))
        .route("/api/user-location", put(set_user_location))
        .route("/api/language", put(set_language))
        .route("/api/layers/:icon", post(toggle_layer))
        .route("/api/map-click", post(map_click))
        .route(
            "/api/measurement",
            get(get_measurement).delete(clear_measurement),
        )
        .route("/api/measurement/toggle", post(toggle_measurement))
        .route("/api/measurement/points", post(add_measure_point))
        .route("/api/import/json", post(import_json))
        .route("/api/import/csv", post(import_csv))
        .route("/api/export/json", get(export_json))
        .route("/api/export/gpx", get(export_gpx))
        .route("/api/export/csv-template", get(export_csv_template))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct SiteQuery {
    pub q: Option<String>,
    /// Comma-separated subset of `name,type,category,notes`.
    pub fields: Option<String>,
    #[serde(default)]
    pub visible: bool,
}

#[derive(Debug, Deserialize)]
pub struct NotesRequest {
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct LanguageRequest {
    pub language: Language,
}

#[derive(Debug, Default, Deserialize)]
pub struct ImportQuery {
    #[serde(default)]
    pub mode: ImportMode,
}

#[derive(Debug, Default, Deserialize)]
pub struct TemplateQuery {
    #[serde(default)]
    pub sample: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EditView {
    pub site_id: String,
    pub patch: SitePatch,
    pub preview: Site,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LayerResponse {
    pub icon: String,
    pub visible: bool,
}

/// GET /api/state - Everything a renderer needs besides the site list
async fn get_state(State(state): State<SharedState>) -> Json<StateSnapshot> {
    let state = state.lock().await;
    Json(state.snapshot())
}

/// GET /api/sites?q=&fields=&visible= - List, search, or filter by layer
async fn list_sites(
    State(state): State<SharedState>,
    Query(query): Query<SiteQuery>,
) -> ApiResult<Json<Vec<Site>>> {
    let fields = match query.fields.as_deref() {
        Some(list) => list
            .split(',')
            .filter(|f| !f.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<SearchField>, _>>()
            .map_err(mapper_error_to_api_error)?,
        None => SearchField::ALL.to_vec(),
    };

    let state = state.lock().await;
    let text = query.q.as_deref().unwrap_or_default();
    let sites = if query.visible {
        state.search_visible_sites(text, &fields)
    } else {
        state.search_sites(text, &fields)
    };
    tracing::debug!("listing {} site(s)", sites.len());
    Ok(Json(sites.into_iter().cloned().collect()))
}

/// POST /api/sites - Create a site from the add form
async fn create_site(
    State(state): State<SharedState>,
    Json(draft): Json<SiteDraft>,
) -> ApiResult<(StatusCode, Json<Site>)> {
    let mut state = state.lock().await;
    state
        .add_site(draft)
        .map(|site| (StatusCode::CREATED, Json(site)))
        .map_err(mapper_error_to_api_error)
}

/// GET /api/sites/:id - A site with its distance from the operator and customer
async fn get_site(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SiteProximity>> {
    let state = state.lock().await;
    state
        .site_proximity(&id)
        .map(Json)
        .map_err(mapper_error_to_api_error)
}

async fn update_site(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(patch): Json<SitePatch>,
) -> ApiResult<Json<Site>> {
    let mut state = state.lock().await;
    state
        .update_site(&id, patch)
        .map(Json)
        .map_err(mapper_error_to_api_error)
}

async fn delete_site(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let mut state = state.lock().await;
    state
        .delete_site(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(mapper_error_to_api_error)
}

/// PUT /api/sites/:id/notes - Inline notes editor in the site panel
async fn update_notes(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<NotesRequest>,
) -> ApiResult<Json<Site>> {
    let mut state = state.lock().await;
    state
        .update_notes(&id, req.notes)
        .map(Json)
        .map_err(mapper_error_to_api_error)
}

async fn begin_edit(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<EditView>> {
    let mut state = state.lock().await;
    state.begin_edit(&id).map_err(mapper_error_to_api_error)?;
    edit_view(&state).map(Json)
}

async fn stage_edit(
    State(state): State<SharedState>,
    Json(patch): Json<SitePatch>,
) -> ApiResult<Json<EditView>> {
    let mut state = state.lock().await;
    state.stage_edit(patch).map_err(mapper_error_to_api_error)?;
    edit_view(&state).map(Json)
}

async fn commit_edit(State(state): State<SharedState>) -> ApiResult<Json<Site>> {
    let mut state = state.lock().await;
    state
        .commit_edit()
        .map(Json)
        .map_err(mapper_error_to_api_error)
}

async fn cancel_edit(State(state): State<SharedState>) -> StatusCode {
    state.lock().await.cancel_edit();
    StatusCode::NO_CONTENT
}

fn edit_view(state: &AppState) -> ApiResult<EditView> {
    let no_edit = || mapper_error_to_api_error(MapperError::validation("edit", "no edit in progress"));
    let edit = state.editing().ok_or_else(no_edit)?;
    let preview = state.edit_preview().ok_or_else(no_edit)?;
    Ok(EditView {
        site_id: edit.site_id.clone(),
        patch: edit.patch.clone(),
        preview,
    })
}

async fn select_site(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Site>> {
    let mut state = state.lock().await;
    state
        .select_site(&id)
        .map(|site| Json(site.clone()))
        .map_err(mapper_error_to_api_error)
}

async fn clear_selection(State(state): State<SharedState>) -> StatusCode {
    state.lock().await.clear_selection();
    StatusCode::NO_CONTENT
}

async fn list_regions(State(state): State<SharedState>) -> Json<Vec<Region>> {
    let state = state.lock().await;
    Json(state.regions().to_vec())
}

/// POST /api/regions - Add a country; it becomes the selected region
async fn create_region(
    State(state): State<SharedState>,
    Json(draft): Json<RegionDraft>,
) -> ApiResult<(StatusCode, Json<Region>)> {
    let mut state = state.lock().await;
    state
        .add_region(draft)
        .map(|region| (StatusCode::CREATED, Json(region)))
        .map_err(mapper_error_to_api_error)
}

async fn select_region(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> ApiResult<Json<Region>> {
    let mut state = state.lock().await;
    state
        .select_region(&code)
        .map(Json)
        .map_err(mapper_error_to_api_error)
}

async fn set_customer(
    State(state): State<SharedState>,
    Json(draft): Json<CustomerDraft>,
) -> ApiResult<Json<CustomerLocation>> {
    let mut state = state.lock().await;
    state
        .set_customer(draft)
        .map(Json)
        .map_err(mapper_error_to_api_error)
}

async fn clear_customer(State(state): State<SharedState>) -> StatusCode {
    state.lock().await.clear_customer();
    StatusCode::NO_CONTENT
}

/// PUT /api/user-location - Position reported by the client device
async fn set_user_location(
    State(state): State<SharedState>,
    Json(location): Json<UserLocation>,
) -> ApiResult<Json<UserLocation>> {
    let mut state = state.lock().await;
    state
        .set_user_location(location)
        .map(|()| Json(location))
        .map_err(mapper_error_to_api_error)
}

async fn set_language(
    State(state): State<SharedState>,
    Json(req): Json<LanguageRequest>,
) -> Json<StateSnapshot> {
    let mut state = state.lock().await;
    state.set_language(req.language);
    Json(state.snapshot())
}

async fn toggle_layer(
    State(state): State<SharedState>,
    Path(icon): Path<String>,
) -> Json<LayerResponse> {
    let visible = state.lock().await.toggle_layer(&icon);
    Json(LayerResponse { icon, visible })
}

async fn map_click(
    State(state): State<SharedState>,
    Json(point): Json<Coordinate>,
) -> ApiResult<Json<MapClickOutcome>> {
    let mut state = state.lock().await;
    state
        .map_click(point)
        .map(Json)
        .map_err(mapper_error_to_api_error)
}

async fn get_measurement(State(state): State<SharedState>) -> Json<MeasurementResponse> {
    let state = state.lock().await;
    Json(state.measurement_summary())
}

async fn toggle_measurement(State(state): State<SharedState>) -> Json<MeasurementResponse> {
    let mut state = state.lock().await;
    state.toggle_measurement();
    Json(state.measurement_summary())
}

async fn add_measure_point(
    State(state): State<SharedState>,
    Json(point): Json<Coordinate>,
) -> ApiResult<Json<MeasurementResponse>> {
    let mut state = state.lock().await;
    if !state.add_measure_point(point) {
        return Err(mapper_error_to_api_error(MapperError::validation(
            "point",
            "not measuring or coordinate out of range",
        )));
    }
    Ok(Json(state.measurement_summary()))
}

async fn clear_measurement(State(state): State<SharedState>) -> Json<MeasurementResponse> {
    let mut state = state.lock().await;
    state.clear_measurement();
    Json(state.measurement_summary())
}

/// POST /api/import/json?mode=append|replace - Body is the uploaded file text
async fn import_json(
    State(state): State<SharedState>,
    Query(query): Query<ImportQuery>,
    body: String,
) -> ApiResult<Json<ImportSummary>> {
    let mut state = state.lock().await;
    state
        .import_json(&body, query.mode)
        .map(Json)
        .map_err(mapper_error_to_api_error)
}

async fn import_csv(
    State(state): State<SharedState>,
    Query(query): Query<ImportQuery>,
    body: String,
) -> Json<ImportSummary> {
    let mut state = state.lock().await;
    Json(state.import_csv(&body, query.mode))
}

async fn export_json(State(state): State<SharedState>) -> ApiResult<Response> {
    let body = transfer::export_json(state.lock().await.sites()).map_err(internal_error)?;
    Ok(attachment(ExportKind::Json, body))
}

async fn export_gpx(State(state): State<SharedState>) -> ApiResult<Response> {
    let body = transfer::export_gpx(state.lock().await.sites()).map_err(internal_error)?;
    Ok(attachment(ExportKind::Gpx, body))
}

async fn export_csv_template(Query(query): Query<TemplateQuery>) -> Response {
    attachment(
        ExportKind::CsvTemplate {
            sample: query.sample,
        },
        transfer::export_csv_template(query.sample),
    )
}

fn attachment(kind: ExportKind, body: String) -> Response {
    let file_name = transfer::export_file_name(kind, chrono::Local::now().date_naive());
    tracing::info!("exporting {file_name}");
    (
        [
            (header::CONTENT_TYPE, kind.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    )
        .into_response()
}

fn mapper_error_to_api_error(err: MapperError) -> (StatusCode, Json<ApiError>) {
    let status = match &err {
        MapperError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        MapperError::NotFound { .. } => StatusCode::NOT_FOUND,
        MapperError::Parse(_) => StatusCode::BAD_REQUEST,
    };
    tracing::debug!("request rejected: {err}");
    (
        status,
        Json(ApiError {
            message: err.to_string(),
        }),
    )
}

fn internal_error(err: TransferError) -> (StatusCode, Json<ApiError>) {
    tracing::warn!("export failed: {err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError {
            message: err.to_string(),
        }),
    )
}
