use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::services::ForecastService;

#[derive(Clone)]
pub struct AppState {
    pub forecast_service: ForecastService,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ReachQuery {
    pub watershed: String,
    pub subbasin: String,
    pub comid: String,
    #[serde(default)]
    pub startdate: String,
}

#[derive(Debug, Deserialize)]
pub struct WarningPointsQuery {
    pub model: String,
    pub watershed: String,
    pub subbasin: String,
}

#[derive(Debug, Deserialize)]
pub struct WatershedQuery {
    pub watershed: String,
    pub subbasin: String,
}

#[derive(Debug, Deserialize)]
pub struct CsvExportQuery {
    pub watershed_name: String,
    pub subbasin_name: String,
    pub reach_id: String,
    #[serde(default)]
    pub startdate: String,
}

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/forecast-percent", get(forecast_percent))
        .route("/warning-points", get(warning_points))
        .route("/available-dates", get(available_dates))
        .route("/flow-duration", get(flow_duration))
        .route("/historic-data-csv", get(historic_data_csv))
        .route("/forecast-data-csv", get(forecast_data_csv))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}

/// Any fetch-or-compute failure collapses to one opaque error body; failure
/// detail stays in the logs.
fn no_data_response(message: &str) -> Response {
    (StatusCode::OK, Json(serde_json::json!({ "error": message }))).into_response()
}

#[instrument(skip(_state))]
async fn health(State(_state): State<AppState>) -> impl IntoResponse {
    debug!("Health check requested");
    let response = HealthResponse {
        status: "healthy".to_string(),
    };
    (StatusCode::OK, Json(response))
}

#[instrument(skip(state), fields(comid = %params.comid))]
async fn forecast_percent(
    State(state): State<AppState>,
    Query(params): Query<ReachQuery>,
) -> Response {
    debug!("Computing exceedance table for reach {}", params.comid);
    match state
        .forecast_service
        .forecast_percent(
            &params.watershed,
            &params.subbasin,
            &params.comid,
            &params.startdate,
        )
        .await
    {
        Ok(table) => {
            info!(
                "Returning exceedance table for reach {} with {} days",
                params.comid,
                table.percdates.len()
            );
            Json(table).into_response()
        }
        Err(e) => {
            error!("Failed to compute exceedance table for reach {}: {}", params.comid, e);
            no_data_response("No data found for the selected reach.")
        }
    }
}

#[instrument(skip(state), fields(model = %params.model))]
async fn warning_points(
    State(state): State<AppState>,
    Query(params): Query<WarningPointsQuery>,
) -> Response {
    debug!("Fetching warning points for watershed {}", params.watershed);
    match state
        .forecast_service
        .warning_points(&params.model, &params.watershed, &params.subbasin)
        .await
    {
        Ok(points) => Json(points).into_response(),
        Err(e) => {
            error!("Failed to fetch warning points for watershed {}: {}", params.watershed, e);
            no_data_response("No data found for the selected reach.")
        }
    }
}

#[instrument(skip(state))]
async fn available_dates(
    State(state): State<AppState>,
    Query(params): Query<WatershedQuery>,
) -> Response {
    match state
        .forecast_service
        .available_dates(&params.watershed, &params.subbasin)
        .await
    {
        Ok(dates) => Json(dates).into_response(),
        Err(e) => {
            error!("Failed to fetch available dates for watershed {}: {}", params.watershed, e);
            no_data_response("No data found for the selected reach.")
        }
    }
}

#[instrument(skip(state), fields(comid = %params.comid))]
async fn flow_duration(
    State(state): State<AppState>,
    Query(params): Query<ReachQuery>,
) -> Response {
    match state
        .forecast_service
        .flow_duration(&params.watershed, &params.subbasin, &params.comid)
        .await
    {
        Ok(curve) => {
            info!(
                "Returning flow-duration curve for reach {} with {} points",
                params.comid,
                curve.flow.len()
            );
            Json(curve).into_response()
        }
        Err(e) => {
            error!("Failed to build flow-duration curve for reach {}: {}", params.comid, e);
            no_data_response("No historic data found for calculating flow duration curve.")
        }
    }
}

#[instrument(skip(state), fields(reach_id = %params.reach_id))]
async fn historic_data_csv(
    State(state): State<AppState>,
    Query(params): Query<CsvExportQuery>,
) -> Response {
    match state
        .forecast_service
        .historic_csv_export(&params.watershed_name, &params.subbasin_name, &params.reach_id)
        .await
    {
        Ok(export) => csv_attachment(export.filename, export.content),
        Err(e) => {
            error!("Failed to export historic CSV for reach {}: {}", params.reach_id, e);
            no_data_response("No historic data found.")
        }
    }
}

#[instrument(skip(state), fields(reach_id = %params.reach_id))]
async fn forecast_data_csv(
    State(state): State<AppState>,
    Query(params): Query<CsvExportQuery>,
) -> Response {
    match state
        .forecast_service
        .forecast_csv_export(
            &params.watershed_name,
            &params.subbasin_name,
            &params.reach_id,
            &params.startdate,
        )
        .await
    {
        Ok(export) => csv_attachment(export.filename, export.content),
        Err(e) => {
            error!("Failed to export forecast CSV for reach {}: {}", params.reach_id, e);
            no_data_response("No forecast data found.")
        }
    }
}

fn csv_attachment(filename: String, content: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
        ],
        content,
    )
        .into_response()
}
