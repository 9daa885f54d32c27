use std::collections::HashMap;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::fetch_error::FetchError;

/// Client for the streamflow-prediction-tool API.
///
/// Every request carries the deployment's API token. Transient HTTP failures
/// are retried with exponential backoff; retry policy lives here, never in
/// the downstream transforms.
#[derive(Clone)]
pub struct SptFetcher {
    client: reqwest::Client,
    api_source: String,
    token: String,
}

impl SptFetcher {
    /// Create a new fetcher.
    /// `api_source` is the deployment root, e.g. `https://tethys.byu.edu`.
    pub fn new(api_source: String, token: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("Failed to create HTTP client"),
            api_source,
            token,
        }
    }

    /// Raw forecast ensemble CSV for a reach: one header row, then one row
    /// per timestamp with one flow column per ensemble member.
    #[instrument(skip(self), fields(reach_id = %reach_id))]
    pub async fn fetch_ensemble_csv(
        &self,
        watershed: &str,
        subbasin: &str,
        reach_id: &str,
        forecast_folder: &str,
    ) -> Result<String, FetchError> {
        self.get_text(
            "GetEnsemble",
            &[
                ("watershed_name", watershed),
                ("subbasin_name", subbasin),
                ("reach_id", reach_id),
                ("forecast_folder", forecast_folder),
            ],
        )
        .await
    }

    /// Return-period thresholds for a reach, e.g.
    /// `{"two": 120.4, "ten": 310.0, "twenty": 452.7, "max": 980.1}`.
    /// Upstream serializes threshold values inconsistently (numbers or
    /// strings), so both forms are accepted.
    #[instrument(skip(self), fields(reach_id = %reach_id))]
    pub async fn fetch_return_periods(
        &self,
        watershed: &str,
        subbasin: &str,
        reach_id: &str,
    ) -> Result<HashMap<String, f64>, FetchError> {
        let body = self
            .get_text(
                "GetReturnPeriods",
                &[
                    ("watershed_name", watershed),
                    ("subbasin_name", subbasin),
                    ("reach_id", reach_id),
                ],
            )
            .await?;

        let parsed: HashMap<String, Value> = serde_json::from_str(&body)?;

        let mut thresholds = HashMap::with_capacity(parsed.len());
        for (label, value) in parsed {
            let flow = match &value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.parse::<f64>().ok(),
                _ => None,
            }
            .ok_or_else(|| FetchError::NumberError(value.to_string()))?;
            thresholds.insert(label, flow);
        }

        debug!("Fetched {} return-period thresholds", thresholds.len());
        Ok(thresholds)
    }

    /// GeoJSON warning-point features for one return period.
    #[instrument(skip(self), fields(return_period = return_period))]
    pub async fn fetch_warning_points(
        &self,
        watershed: &str,
        subbasin: &str,
        return_period: u32,
    ) -> Result<Value, FetchError> {
        let rp = return_period.to_string();
        let body = self
            .get_text(
                "GetWarningPoints",
                &[
                    ("watershed_name", watershed),
                    ("subbasin_name", subbasin),
                    ("return_period", rp.as_str()),
                ],
            )
            .await?;

        let mut parsed: Value = serde_json::from_str(&body)?;
        match parsed.get_mut("features") {
            Some(features) => Ok(features.take()),
            None => Err(FetchError::MissingField("features")),
        }
    }

    /// Historic simulation CSV for a reach (`datetime,streamflow` rows).
    #[instrument(skip(self), fields(reach_id = %reach_id))]
    pub async fn fetch_historic_csv(
        &self,
        watershed: &str,
        subbasin: &str,
        reach_id: &str,
    ) -> Result<String, FetchError> {
        self.get_text(
            "GetHistoricData",
            &[
                ("watershed_name", watershed),
                ("subbasin_name", subbasin),
                ("reach_id", reach_id),
                ("return_format", "csv"),
            ],
        )
        .await
    }

    /// Forecast statistics CSV for a reach (high_res/max/mean/min/std-dev
    /// columns).
    #[instrument(skip(self), fields(reach_id = %reach_id))]
    pub async fn fetch_forecast_csv(
        &self,
        watershed: &str,
        subbasin: &str,
        reach_id: &str,
        forecast_folder: &str,
    ) -> Result<String, FetchError> {
        self.get_text(
            "GetForecast",
            &[
                ("watershed_name", watershed),
                ("subbasin_name", subbasin),
                ("reach_id", reach_id),
                ("forecast_folder", forecast_folder),
                ("return_format", "csv"),
            ],
        )
        .await
    }

    /// Forecast folder dates available for a watershed/subbasin.
    #[instrument(skip(self))]
    pub async fn fetch_available_dates(
        &self,
        watershed: &str,
        subbasin: &str,
    ) -> Result<Value, FetchError> {
        let body = self
            .get_text(
                "GetAvailableDates",
                &[("watershed_name", watershed), ("subbasin_name", subbasin)],
            )
            .await?;

        Ok(serde_json::from_str(&body)?)
    }

    /// Perform one authenticated GET against an API endpoint, retrying
    /// transport-level failures.
    async fn get_text(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<String, FetchError> {
        let url = format!(
            "{}/apps/streamflow-prediction-tool/api/{}/",
            self.api_source, endpoint
        );

        let fetch = || async {
            debug!("Sending HTTP request to {}", url);
            let response = self
                .client
                .get(&url)
                .query(params)
                .header("Authorization", format!("Token {}", self.token))
                .send()
                .await?;

            let status = response.status();
            debug!("Received HTTP response with status: {}", status);
            if !status.is_success() {
                return Err(FetchError::UpstreamStatus(status));
            }

            Ok(response.text().await?)
        };

        fetch
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(250))
                    .with_max_times(2),
            )
            .when(|e| matches!(e, FetchError::Request(_)))
            .notify(|err, dur| {
                warn!("Retrying upstream fetch after {:?}: {}", dur, err);
            })
            .await
    }
}
