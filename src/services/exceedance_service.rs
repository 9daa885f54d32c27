/// Return-period exceedance aggregation
///
/// Turns a raw forecast-ensemble CSV and a set of flood return-period
/// thresholds into the per-day table behind the dashboard's probability
/// chart: for each forecast day, the percentage of ensemble members whose
/// flow exceeds the 2-, 10- and 20-year thresholds.
use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

/// Upstream forecasts always carry 51 ensemble members. The divisor is this
/// constant rather than the observed column count, matching the upstream
/// product definition even for truncated datasets.
pub const ENSEMBLE_MEMBER_COUNT: f64 = 51.0;

/// The most recent forecast days are dropped from the chart.
const DISPLAY_TRIM_TAIL: usize = 5;

/// Threshold labels aggregated into the output table. The "max" entry of a
/// return-period response is informational and never aggregated.
const THRESHOLD_LABELS: [&str; 3] = ["two", "ten", "twenty"];

#[derive(Error, Debug)]
pub enum ExceedanceError {
    #[error("Failed to parse flow value: {0}")]
    MalformedFlow(String),

    #[error("Failed to parse timestamp date: {0}")]
    MalformedDate(String),

    #[error("Ensemble row has no flow columns: {0}")]
    MissingColumns(String),

    #[error("Return periods are missing the '{0}' threshold")]
    MissingThreshold(String),
}

/// Aligned output series for the probability chart.
///
/// All four arrays have the same length and share an ordering: entry `i` of
/// `two`/`ten`/`twenty` is the exceedance percentage on day `percdates[i]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPercentTable {
    pub percdates: Vec<String>,
    pub two: Vec<String>,
    pub ten: Vec<String>,
    pub twenty: Vec<String>,
}

/// One parsed ensemble row: the forecast day plus one flow value per member.
#[derive(Debug, Clone)]
struct EnsembleRow {
    date: NaiveDate,
    flows: Vec<f64>,
}

/// Build the probability table from a raw ensemble CSV and a return-period
/// threshold map.
///
/// The first CSV row is a header and is discarded. Each data row is
/// `timestamp,member1,...,memberN` where the first 10 characters of the
/// timestamp are an ISO `YYYY-MM-DD` date. A member counts toward a day if
/// its flow strictly exceeds the threshold at any timestamp on that day;
/// multiple exceedances by one member on one day count once.
///
/// An ensemble with no data rows produces empty series rather than an error.
#[instrument(skip(ensemble_csv, return_periods), fields(csv_size = ensemble_csv.len()))]
pub fn forecast_percent_table(
    ensemble_csv: &str,
    return_periods: &HashMap<String, f64>,
) -> Result<ForecastPercentTable, ExceedanceError> {
    let rows = parse_ensemble_rows(ensemble_csv)?;
    debug!("Parsed {} ensemble rows", rows.len());

    let mut series: Vec<(&str, BTreeMap<NaiveDate, f64>)> = Vec::new();
    for label in THRESHOLD_LABELS {
        let threshold = return_periods
            .get(label)
            .copied()
            .ok_or_else(|| ExceedanceError::MissingThreshold(label.to_string()))?;
        series.push((label, exceedance_percent_by_date(&rows, threshold)));
    }

    let dates: Vec<NaiveDate> = series[0].1.keys().copied().collect();

    let mut table = ForecastPercentTable {
        percdates: dates.iter().map(|d| short_date_label(*d)).collect(),
        two: format_percents(&series[0].1),
        ten: format_percents(&series[1].1),
        twenty: format_percents(&series[2].1),
    };

    trim_display_tail(&mut table);
    debug!("Built probability table with {} days", table.percdates.len());
    Ok(table)
}

/// Parse the raw ensemble CSV, dropping the header row.
fn parse_ensemble_rows(ensemble_csv: &str) -> Result<Vec<EnsembleRow>, ExceedanceError> {
    let mut rows = Vec::new();

    for line in ensemble_csv.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }

        let mut fields = line.split(',');
        let timestamp = fields.next().unwrap_or_default();

        // The timestamp may carry a time-of-day suffix; only the date part
        // matters for daily aggregation.
        let date = timestamp
            .get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .ok_or_else(|| ExceedanceError::MalformedDate(timestamp.to_string()))?;

        let flows = fields
            .map(|field| {
                field
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| ExceedanceError::MalformedFlow(field.to_string()))
            })
            .collect::<Result<Vec<f64>, ExceedanceError>>()?;

        if flows.is_empty() {
            return Err(ExceedanceError::MissingColumns(line.to_string()));
        }

        rows.push(EnsembleRow { date, flows });
    }

    Ok(rows)
}

/// Per-day exceedance percentage for a single threshold.
///
/// Every forecast day present in the input appears in the result, including
/// days where no member exceeds the threshold (0%). Member indices are
/// deduplicated per day before counting.
fn exceedance_percent_by_date(rows: &[EnsembleRow], threshold: f64) -> BTreeMap<NaiveDate, f64> {
    let mut exceeding: BTreeMap<NaiveDate, HashSet<usize>> = BTreeMap::new();

    for row in rows {
        let members = exceeding.entry(row.date).or_default();
        for (idx, flow) in row.flows.iter().enumerate() {
            // Strictly greater: a flow exactly at the threshold is not an
            // exceedance.
            if *flow > threshold {
                members.insert(idx + 1);
            }
        }
    }

    exceeding
        .into_iter()
        .map(|(date, members)| (date, members.len() as f64 / ENSEMBLE_MEMBER_COUNT * 100.0))
        .collect()
}

/// Short axis label for a forecast day: the last four characters of the
/// `YYYY-MM-DD` form, e.g. `2026-08-29` becomes `8-29`.
fn short_date_label(date: NaiveDate) -> String {
    let full = date.format("%Y-%m-%d").to_string();
    full[full.len() - 4..].to_string()
}

/// Percentages rendered as rounded-integer strings, in date order.
fn format_percents(percents: &BTreeMap<NaiveDate, f64>) -> Vec<String> {
    percents.values().map(|p| format!("{p:.0}")).collect()
}

/// Drop the trailing [`DISPLAY_TRIM_TAIL`] entries from every series,
/// clamping to empty when fewer entries exist.
fn trim_display_tail(table: &mut ForecastPercentTable) {
    let keep = table.percdates.len().saturating_sub(DISPLAY_TRIM_TAIL);
    table.percdates.truncate(keep);
    table.two.truncate(keep);
    table.ten.truncate(keep);
    table.twenty.truncate(keep);
}
