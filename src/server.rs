use crate::config::AppConfig;
use crate::index::{symbol_at, RegionIndex};
use crate::processing::{build_frame, popup, Frame, Popup};
use crate::render::{Bounds, Viewport};
use crate::state::{MonthCursor, StyleMode, ViewError, ViewState};
use crate::types::Layers;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

pub struct AppState {
    pub layers: Layers,
    pub index: RegionIndex,
    pub config: AppConfig,
    pub viewport: Viewport,
    pub view: RwLock<ViewState>,
}

impl AppState {
    pub fn new(config: AppConfig, layers: Layers) -> Self {
        info!("Building spatial index for API...");
        let index = RegionIndex::build(&layers);
        let viewport = Viewport::from_config(&config.map);
        Self {
            layers,
            index,
            config,
            viewport,
            view: RwLock::new(ViewState::default()),
        }
    }
}

#[derive(Deserialize)]
pub struct QueryParams {
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
pub struct QueryResponse {
    state: String,
    popup: Popup,
    html: String,
}

#[derive(Serialize)]
pub struct MapResponse {
    center: [f64; 2],
    zoom: f64,
    min_zoom: f64,
    max_zoom: f64,
    max_bounds: Bounds,
    tile_url: String,
    attribution: String,
}

pub struct ApiError(ViewError);

impl From<ViewError> for ApiError {
    fn from(err: ViewError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.0.to_string()).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let frame_service = ServeDir::new(&state.config.output.frame_dir);

    Router::new()
        .route("/api/map", get(map_handler))
        .route("/api/frame", get(frame_handler))
        .route("/api/month/next", post(next_month))
        .route("/api/month/prev", post(prev_month))
        .route("/api/month/:index", put(select_month))
        .route("/api/style/:mode", put(select_style))
        .route("/api/legend.svg", get(legend_handler))
        .route("/api/query", get(query_handler))
        .nest_service("/frames", frame_service)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, layers: Layers) -> Result<()> {
    let port = config.server.port;
    let state = Arc::new(AppState::new(config, layers));
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn map_handler(State(state): State<Arc<AppState>>) -> Json<MapResponse> {
    let map = &state.config.map;
    Json(MapResponse {
        center: map.center,
        zoom: map.zoom,
        min_zoom: map.min_zoom,
        max_zoom: map.max_zoom,
        max_bounds: state.viewport.bounds(),
        tile_url: map.tile_url.clone(),
        attribution: map.attribution.clone(),
    })
}

async fn frame_handler(State(state): State<Arc<AppState>>) -> Json<Frame> {
    let view = *state.view.read().await;
    Json(build_frame(&state.layers, view))
}

async fn next_month(State(state): State<Arc<AppState>>) -> Json<Frame> {
    Json(update(&state, ViewState::forward).await)
}

async fn prev_month(State(state): State<Arc<AppState>>) -> Json<Frame> {
    Json(update(&state, ViewState::reverse).await)
}

async fn select_month(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Result<Json<Frame>, ApiError> {
    let month = MonthCursor::new(index)?;
    Ok(Json(update(&state, |view| view.month = month).await))
}

async fn select_style(
    State(state): State<Arc<AppState>>,
    Path(mode): Path<String>,
) -> Result<Json<Frame>, ApiError> {
    let style: StyleMode = mode.parse()?;
    Ok(Json(update(&state, |view| view.select_style(style)).await))
}

async fn legend_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let view = *state.view.read().await;
    let legend = build_frame(&state.layers, view).legend;
    debug!("{} legend for {}", view.style, legend.title());
    ([(header::CONTENT_TYPE, "image/svg+xml")], legend.to_svg())
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<QueryResponse>> {
    let view = *state.view.read().await;
    let layers = &state.layers;

    let hit = match view.style {
        StyleMode::Proportional => symbol_at(
            layers,
            view.month,
            state.config.map.zoom,
            params.lon,
            params.lat,
        )
        .map(|i| (&layers.points[i].state, &layers.points[i].counts)),
        StyleMode::Choropleth => state
            .index
            .region_at(layers, params.lon, params.lat)
            .map(|i| (&layers.polygons[i].state, &layers.polygons[i].counts)),
    };

    Json(hit.map(|(name, counts)| {
        let popup = popup(view.month, name, counts);
        QueryResponse {
            state: name.clone(),
            html: popup.to_html(),
            popup,
        }
    }))
}

/// Applies one control interaction under the write lock and recomputes the
/// frame for the resulting view.
async fn update<F>(state: &AppState, apply: F) -> Frame
where
    F: FnOnce(&mut ViewState),
{
    let mut view = state.view.write().await;
    apply(&mut *view);
    debug!("view is now {} / {}", view.month.name(), view.style);
    build_frame(&state.layers, *view)
}
