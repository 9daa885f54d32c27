use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::fetch_error::FetchError;
use crate::fetcher::SptFetcher;
use crate::services::exceedance_service::{
    forecast_percent_table, ExceedanceError, ForecastPercentTable,
};
use crate::services::flow_duration_service::{
    flow_duration_curve, parse_daily_flows, FlowDurationCurve, FlowDurationError,
};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Exceedance(#[from] ExceedanceError),
    #[error(transparent)]
    FlowDuration(#[from] FlowDurationError),
    #[error("Unknown forecast model: {0}")]
    UnknownModel(String),
    #[error("Forecast dataset is empty")]
    EmptyForecast,
}

/// Forecast models the dashboard can route to. Routing is an explicit enum
/// dispatch; adding a model means adding a variant and its match arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    EcmwfRapid,
}

impl ModelKind {
    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            "ECMWF-RAPID" | "ecmwf" => Some(Self::EcmwfRapid),
            _ => None,
        }
    }
}

/// Warning points grouped by return period, as raw GeoJSON feature arrays.
#[derive(Debug, Serialize)]
pub struct WarningPoints {
    pub success: String,
    pub warning20: Value,
    pub warning10: Value,
    pub warning2: Value,
}

/// A CSV download ready to serve as an attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvExport {
    pub filename: String,
    pub content: String,
}

/// Orchestrates upstream fetches and the pure transforms behind each
/// dashboard endpoint. All state is the injected fetcher; every call is
/// request-scoped.
#[derive(Clone)]
pub struct ForecastService {
    fetcher: SptFetcher,
}

impl ForecastService {
    pub fn new(fetcher: SptFetcher) -> Self {
        Self { fetcher }
    }

    /// Return-period exceedance table for a reach.
    #[instrument(skip(self), fields(reach_id = %reach_id))]
    pub async fn forecast_percent(
        &self,
        watershed: &str,
        subbasin: &str,
        reach_id: &str,
        startdate: &str,
    ) -> Result<ForecastPercentTable, ServiceError> {
        let folder = forecast_folder(startdate);

        let ensemble_csv = self
            .fetcher
            .fetch_ensemble_csv(watershed, subbasin, reach_id, folder)
            .await?;
        let return_periods = self
            .fetcher
            .fetch_return_periods(watershed, subbasin, reach_id)
            .await?;

        let table = forecast_percent_table(&ensemble_csv, &return_periods)?;
        info!(
            "Computed exceedance table for reach {} ({} days)",
            reach_id,
            table.percdates.len()
        );
        Ok(table)
    }

    /// Warning points for the 20-, 10- and 2-year return periods.
    #[instrument(skip(self), fields(model = %model))]
    pub async fn warning_points(
        &self,
        model: &str,
        watershed: &str,
        subbasin: &str,
    ) -> Result<WarningPoints, ServiceError> {
        match ModelKind::from_param(model) {
            Some(ModelKind::EcmwfRapid) => self.ecmwf_warning_points(watershed, subbasin).await,
            None => Err(ServiceError::UnknownModel(model.to_string())),
        }
    }

    async fn ecmwf_warning_points(
        &self,
        watershed: &str,
        subbasin: &str,
    ) -> Result<WarningPoints, ServiceError> {
        let warning20 = self
            .fetcher
            .fetch_warning_points(watershed, subbasin, 20)
            .await?;
        let warning10 = self
            .fetcher
            .fetch_warning_points(watershed, subbasin, 10)
            .await?;
        let warning2 = self
            .fetcher
            .fetch_warning_points(watershed, subbasin, 2)
            .await?;

        Ok(WarningPoints {
            success: "Data analysis complete!".to_string(),
            warning20,
            warning10,
            warning2,
        })
    }

    /// Flow-duration curve from the reach's historic simulation.
    #[instrument(skip(self), fields(reach_id = %reach_id))]
    pub async fn flow_duration(
        &self,
        watershed: &str,
        subbasin: &str,
        reach_id: &str,
    ) -> Result<FlowDurationCurve, ServiceError> {
        let historic_csv = self
            .fetcher
            .fetch_historic_csv(watershed, subbasin, reach_id)
            .await?;
        let flows = parse_daily_flows(&historic_csv)?;
        debug!("Parsed {} historic daily flows", flows.len());
        Ok(flow_duration_curve(&flows))
    }

    /// Forecast folder dates available upstream, passed through verbatim.
    #[instrument(skip(self))]
    pub async fn available_dates(
        &self,
        watershed: &str,
        subbasin: &str,
    ) -> Result<Value, ServiceError> {
        Ok(self
            .fetcher
            .fetch_available_dates(watershed, subbasin)
            .await?)
    }

    /// Historic simulation as a downloadable CSV.
    #[instrument(skip(self), fields(reach_id = %reach_id))]
    pub async fn historic_csv_export(
        &self,
        watershed: &str,
        subbasin: &str,
        reach_id: &str,
    ) -> Result<CsvExport, ServiceError> {
        let raw = self
            .fetcher
            .fetch_historic_csv(watershed, subbasin, reach_id)
            .await?;

        Ok(CsvExport {
            filename: format!("historic_streamflow_{watershed}_{subbasin}_{reach_id}.csv"),
            content: rebuild_csv("datetime,streamflow (m3/s)", &raw),
        })
    }

    /// Forecast statistics as a downloadable CSV. The filename carries the
    /// forecast initialization date taken from the first data row.
    #[instrument(skip(self), fields(reach_id = %reach_id))]
    pub async fn forecast_csv_export(
        &self,
        watershed: &str,
        subbasin: &str,
        reach_id: &str,
        startdate: &str,
    ) -> Result<CsvExport, ServiceError> {
        let folder = forecast_folder(startdate);
        let raw = self
            .fetcher
            .fetch_forecast_csv(watershed, subbasin, reach_id, folder)
            .await?;

        let init_time = forecast_init_time(&raw).ok_or(ServiceError::EmptyForecast)?;

        let header = "datetime,high_res (m3/s),max (m3/s),mean (m3/s),min (m3/s),\
                      std_dev_range_lower (m3/s),std_dev_range_upper (m3/s)";
        Ok(CsvExport {
            filename: format!(
                "streamflow_forecast_{watershed}_{subbasin}_{reach_id}_{init_time}.csv"
            ),
            content: rebuild_csv(header, &raw),
        })
    }
}

/// An empty start date from the client means the latest forecast run.
fn forecast_folder(startdate: &str) -> &str {
    if startdate.is_empty() {
        "most_recent"
    } else {
        startdate
    }
}

/// Date portion of the first data row's timestamp, e.g.
/// `2025-03-01 00:00:00,...` yields `2025-03-01`.
fn forecast_init_time(raw_csv: &str) -> Option<&str> {
    let first_row = raw_csv.lines().nth(1)?;
    let timestamp = first_row.split(',').next()?;
    timestamp.split(' ').next()
}

/// Re-emit upstream CSV data rows under our own header.
fn rebuild_csv(header: &str, raw_csv: &str) -> String {
    let mut out = String::with_capacity(header.len() + raw_csv.len());
    out.push_str(header);
    out.push('\n');
    for line in raw_csv.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}
