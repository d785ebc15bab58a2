//! REST API for the pallet planning service.
//!
//! Provides HTTP endpoints for communication with the frontend.
//! Uses Axum as the web framework and supports CORS.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::{StatusCode, Uri, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use utoipa::{OpenApi, ToSchema};

use crate::config::{ApiConfig, PlannerConfig};
use crate::model::{
    BoxSpec, Catalog, Fragility, OrderLine, Orientation, Pallet, PalletProfile, ValidationError,
};
use crate::packer::LayerStrategy;
use crate::planner::{PlanResult, PlanStatus, plan_pallets, plan_pallets_with_progress};

#[derive(Clone)]
struct ApiState {
    planner_config: PlannerConfig,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>palletizer API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"
            integrity="sha384-2YH8WDRaj7V2OqU/trsmzSagmk/E2SutiCsGkdgoQwC9pNUJV1u/141DHB6jgs8t"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                const ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                    presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                    layout: "StandaloneLayout",
                });
                window.ui = ui;
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Embedded Web Assets (HTML, CSS, JS)
#[derive(RustEmbed)]
#[folder = "web/"]
struct WebAssets;

/// Optional per-request pallet profile override.
#[derive(Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PalletProfileRequest {
    pub length: f64,
    pub width: f64,
    pub max_height: f64,
    pub max_weight: f64,
    pub tare_weight: f64,
}

impl PalletProfileRequest {
    fn into_profile(self) -> Result<PalletProfile, ValidationError> {
        PalletProfile::new(
            self.length,
            self.width,
            self.max_height,
            self.max_weight,
            self.tare_weight,
        )
    }
}

/// Request structure for the planning endpoint.
///
/// `catalog` carries the product master data snapshot the orders are
/// resolved against; `pallet` and `strategy` override the configured
/// defaults for this request only.
#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "catalog": {
            "A100": {
                "fragility": "strong",
                "box1": {
                    "unitsPerBox": 10,
                    "weightKg": 5.0,
                    "dimensions": [60.0, 40.0, 30.0],
                    "orientation": "both"
                }
            }
        },
        "orders": [
            {
                "sku": "A100",
                "displayName": "Apple juice 1l",
                "boxTypeKey": "box1",
                "requestedUnits": 25
            }
        ],
        "strategy": "guillotine"
    })
)]
pub struct PlanRequest {
    #[schema(value_type = Object)]
    pub catalog: Catalog,
    pub orders: Vec<OrderLine>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub pallet: Option<PalletProfileRequest>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub strategy: Option<LayerStrategy>,
}

#[derive(Debug)]
struct ValidatedPlanRequest {
    catalog: Catalog,
    orders: Vec<OrderLine>,
    profile_override: Option<PalletProfile>,
    strategy_override: Option<LayerStrategy>,
}

impl ValidatedPlanRequest {
    fn order_count(&self) -> usize {
        self.orders.len()
    }

    fn product_count(&self) -> usize {
        self.catalog.len()
    }

    fn into_parts(
        self,
    ) -> (
        Catalog,
        Vec<OrderLine>,
        Option<PalletProfile>,
        Option<LayerStrategy>,
    ) {
        (
            self.catalog,
            self.orders,
            self.profile_override,
            self.strategy_override,
        )
    }
}

#[derive(Debug)]
enum PlanRequestValidationError {
    InvalidCatalog(ValidationError),
    InvalidProfile(ValidationError),
}

impl PlanRequest {
    fn into_validated(self) -> Result<ValidatedPlanRequest, PlanRequestValidationError> {
        self.catalog
            .validate()
            .map_err(PlanRequestValidationError::InvalidCatalog)?;

        let profile_override = self
            .pallet
            .map(PalletProfileRequest::into_profile)
            .transpose()
            .map_err(PlanRequestValidationError::InvalidProfile)?;

        Ok(ValidatedPlanRequest {
            catalog: self.catalog,
            orders: self.orders,
            profile_override,
            strategy_override: self.strategy,
        })
    }
}

/// Response structure with the complete loading plan.
#[derive(Serialize, ToSchema)]
pub struct PlanResponse {
    pub status: PlanStatus,
    pub is_complete: bool,
    pub pallets: Vec<PlannedPallet>,
    pub unplaced: Vec<UnplacedBoxReport>,
    pub skipped_lines: Vec<SkippedLineReport>,
    pub totals: PlanTotals,
}

/// Single pallet with derived summary values and its layers.
#[derive(Serialize, ToSchema)]
pub struct PlannedPallet {
    pub id: usize,
    pub total_height: f64,
    pub total_weight: f64,
    pub box_count: usize,
    pub unit_count: u32,
    pub layers: Vec<PlannedLayer>,
}

/// Single layer with grouped report rows and raw placements.
#[derive(Serialize, ToSchema)]
pub struct PlannedLayer {
    pub id: usize,
    pub height: f64,
    pub weight_kg: f64,
    pub rows: Vec<LayerRow>,
    pub placements: Vec<PlacedBoxReport>,
}

/// One report row: all boxes of a SKU/box-type within one layer.
///
/// `units` is `unitsPerBox × boxes`, as on the original planning sheet; when
/// the last box of an order line is only partially filled this overstates
/// the truly ordered units.
#[derive(Serialize, ToSchema)]
pub struct LayerRow {
    pub sku: String,
    pub product: String,
    pub units: u32,
    pub box_type: String,
    pub boxes: usize,
}

/// Raw placement of a single box, for visualization.
#[derive(Serialize, ToSchema)]
pub struct PlacedBoxReport {
    pub id: usize,
    pub sku: String,
    pub x: f64,
    pub y: f64,
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

/// A box that could not be placed on any pallet.
#[derive(Serialize, ToSchema)]
pub struct UnplacedBoxReport {
    pub id: usize,
    pub sku: String,
    pub box_type_key: String,
    pub weight_kg: f64,
    pub reason_code: String,
    pub reason: String,
}

/// An order line that was skipped during expansion.
#[derive(Serialize, ToSchema)]
pub struct SkippedLineReport {
    pub sku: String,
    pub box_type_key: String,
    pub reason_code: String,
    pub reason: String,
}

/// Grand totals across all pallets ("order resume").
#[derive(Serialize, ToSchema)]
pub struct PlanTotals {
    pub pallets: usize,
    pub boxes: usize,
    pub units: u32,
    pub weight_kg: f64,
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn catalog_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid catalog data",
        details,
    )
}

fn profile_config_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid pallet profile",
        details,
    )
}

fn parse_plan_request(
    payload: Result<Json<PlanRequest>, JsonRejection>,
) -> Result<ValidatedPlanRequest, Response> {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(err) => return Err(json_deserialize_error(err)),
    };

    match payload.into_validated() {
        Ok(validated) => Ok(validated),
        Err(PlanRequestValidationError::InvalidCatalog(err)) => Err(catalog_error(err.to_string())),
        Err(PlanRequestValidationError::InvalidProfile(err)) => {
            Err(profile_config_error(err.to_string()))
        }
    }
}

fn layer_rows(layer: &crate::model::Layer) -> Vec<LayerRow> {
    let mut rows: Vec<LayerRow> = Vec::new();
    for placement in &layer.placements {
        let instance = &placement.instance;
        match rows
            .iter_mut()
            .find(|r| r.sku == instance.sku && r.box_type == instance.box_type_key.to_uppercase())
        {
            Some(row) => {
                row.boxes += 1;
                row.units += instance.units_per_box;
            }
            None => rows.push(LayerRow {
                sku: instance.sku.clone(),
                product: instance.display_name.clone(),
                units: instance.units_per_box,
                box_type: instance.box_type_key.to_uppercase(),
                boxes: 1,
            }),
        }
    }
    rows
}

fn planned_pallet(id: usize, pallet: &Pallet, profile: &PalletProfile) -> PlannedPallet {
    let layers: Vec<PlannedLayer> = pallet
        .layers
        .iter()
        .enumerate()
        .map(|(li, layer)| PlannedLayer {
            id: li + 1,
            height: layer.height,
            weight_kg: layer.weight_kg,
            rows: layer_rows(layer),
            placements: layer
                .placements
                .iter()
                .map(|p| PlacedBoxReport {
                    id: p.instance.id,
                    sku: p.instance.sku.clone(),
                    x: p.x,
                    y: p.y,
                    length: p.placed.l,
                    width: p.placed.w,
                    height: p.instance.height,
                })
                .collect(),
        })
        .collect();

    let unit_count = layers
        .iter()
        .flat_map(|l| l.rows.iter())
        .map(|r| r.units)
        .sum();

    PlannedPallet {
        id,
        total_height: pallet.stack_height(),
        total_weight: profile.tare_weight + pallet.cargo_weight(),
        box_count: pallet.box_count(),
        unit_count,
        layers,
    }
}

impl PlanResponse {
    /// Creates a PlanResponse from a PlanResult (DRY principle).
    pub fn from_plan_result(result: PlanResult) -> Self {
        let profile = result.profile;
        let pallets: Vec<PlannedPallet> = result
            .pallets
            .iter()
            .enumerate()
            .map(|(i, pallet)| planned_pallet(i + 1, pallet, &profile))
            .collect();

        let totals = PlanTotals {
            pallets: pallets.len(),
            boxes: pallets.iter().map(|p| p.box_count).sum(),
            units: pallets.iter().map(|p| p.unit_count).sum(),
            weight_kg: pallets.iter().map(|p| p.total_weight).sum(),
        };

        Self {
            status: result.status,
            is_complete: result.is_complete(),
            pallets,
            unplaced: result
                .unplaced
                .iter()
                .map(|entry| UnplacedBoxReport {
                    id: entry.instance.id,
                    sku: entry.instance.sku.clone(),
                    box_type_key: entry.instance.box_type_key.clone(),
                    weight_kg: entry.instance.weight_kg,
                    reason_code: entry.reason.code().to_string(),
                    reason: entry.reason.to_string(),
                })
                .collect(),
            skipped_lines: result
                .skipped
                .iter()
                .map(|entry| SkippedLineReport {
                    sku: entry.line.sku.clone(),
                    box_type_key: entry.line.box_type_key.clone(),
                    reason_code: entry.reason.code().to_string(),
                    reason: entry.reason.to_string(),
                })
                .collect(),
            totals,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_plan, handle_plan_stream),
    components(
        schemas(
            PlanRequest,
            PalletProfileRequest,
            PlanResponse,
            PlannedPallet,
            PlannedLayer,
            LayerRow,
            PlacedBoxReport,
            UnplacedBoxReport,
            SkippedLineReport,
            PlanTotals,
            ErrorResponse,
            OrderLine,
            BoxSpec,
            Fragility,
            Orientation,
            PalletProfile,
            PlanStatus,
            LayerStrategy
        )
    ),
    tags((name = "planning", description = "Endpoints for pallet load planning"))
)]
struct ApiDoc;

/// Starts the API server.
///
/// Configures CORS for cross-origin requests from the frontend.
/// Blocks until the server is terminated.
pub async fn start_api_server(config: ApiConfig, planner_config: PlannerConfig) {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let state = ApiState { planner_config };

    let app = Router::new()
        // API endpoints
        .route("/plan", post(handle_plan))
        .route("/plan_stream", post(handle_plan_stream))
        // API documentation
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        // Web-UI (embedded)
        .route("/", get(serve_index))
        .route("/{*path}", get(serve_static))
        .layer(cors)
        .with_state(state);

    let addr = config.socket_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            panic!("❌ Could not bind API server to {}: {}", addr, err);
        }
    };

    let display_host = config.display_host().to_string();
    println!(
        "🚀 Server running on http://{}:{}",
        display_host,
        config.port()
    );
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        println!("💡 Local access: http://localhost:{}", config.port());
    }
    println!("🧱 API Endpoints:");
    println!("   - POST /plan");
    println!("   - POST /plan_stream");
    println!("📑 Documentation:");
    println!("   - GET /docs");
    println!("   - GET /docs/openapi.json");
    println!("🌐 Web-UI: http://{}:{}", display_host, config.port());

    if let Err(err) = axum::serve(listener, app).await {
        eprintln!("❌ API server terminated with an error: {err}");
    }
}

/// Handler for POST /plan endpoint.
///
/// Takes a catalog snapshot and order lines and computes the loading plan.
///
/// # Returns
/// JSON response with all pallets, layers, diagnostics and totals
#[utoipa::path(
    post,
    path = "/plan",
    request_body = PlanRequest,
    responses(
        (status = 200, description = "Successfully planned the order", body = PlanResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request, catalog or pallet profile",
            body = ErrorResponse
        )
    ),
    tag = "planning"
)]
async fn handle_plan(
    State(state): State<ApiState>,
    payload: Result<Json<PlanRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_plan_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let order_count = request.order_count();
    let product_count = request.product_count();
    let (catalog, orders, profile_override, strategy_override) = request.into_parts();

    println!(
        "📥 New plan request: {} order lines, {} catalog products",
        order_count, product_count
    );
    let profile = profile_override.unwrap_or_else(|| state.planner_config.pallet_profile());
    let mut planning_config = state.planner_config.planning_config();
    if let Some(strategy) = strategy_override {
        planning_config.strategy = strategy;
    }

    let result = plan_pallets(&catalog, &orders, &profile, planning_config);
    println!(
        "🧱 Result: {} pallets, {} boxes placed, {} unplaceable, {:.1} kg gross",
        result.pallet_count(),
        result.placed_box_count(),
        result.unplaced.len(),
        result.total_weight()
    );

    let response = PlanResponse::from_plan_result(result);
    (StatusCode::OK, Json(response)).into_response()
}

/// Handler for POST /plan_stream endpoint (SSE).
///
/// Streams plan events in real-time as Server-Sent Events
/// (text/event-stream). The frontend can visualize pallets and layers live
/// without waiting for the complete result.
#[utoipa::path(
    post,
    path = "/plan_stream",
    request_body = PlanRequest,
    responses(
        (
            status = 200,
            description = "Streams plan events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request, catalog or pallet profile",
            body = ErrorResponse
        )
    ),
    tag = "planning"
)]
async fn handle_plan_stream(
    State(state): State<ApiState>,
    payload: Result<Json<PlanRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_plan_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let (catalog, orders, profile_override, strategy_override) = request.into_parts();

    let (tx, rx) = mpsc::channel::<String>(32);

    let profile = profile_override.unwrap_or_else(|| state.planner_config.pallet_profile());
    let mut planning_config = state.planner_config.planning_config();
    if let Some(strategy) = strategy_override {
        planning_config.strategy = strategy;
    }

    tokio::task::spawn_blocking(move || {
        let _ = plan_pallets_with_progress(&catalog, &orders, &profile, planning_config, |evt| {
            if let Ok(json) = serde_json::to_string(evt) {
                if tx.blocking_send(json).is_err() {
                    // Receiver has closed the stream; remaining events are discarded.
                }
            }
        });
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

/// Serves the index.html main page
async fn serve_index() -> Response {
    match WebAssets::get("index.html") {
        Some(content) => Html(content.data).into_response(),
        None => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
    }
}

/// Serves static assets (JS, CSS, etc.)
async fn serve_static(uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');

    match WebAssets::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.as_ref())], content.data).into_response()
        }
        None => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
    }
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}
