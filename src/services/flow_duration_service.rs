/// Flow-duration curve computation
///
/// From a historic simulation of daily average flows, computes the classic
/// flow-duration curve: flows sorted from largest to smallest against the
/// percentage of time each flow is equalled or exceeded.
use std::cmp::Ordering;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug)]
pub enum FlowDurationError {
    #[error("Failed to parse flow value: {0}")]
    MalformedFlow(String),

    #[error("Historic row has no flow column: {0}")]
    MissingColumns(String),
}

/// Aligned curve series: `flow[i]` is equalled or exceeded
/// `exceedance_probability[i]` percent of the time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowDurationCurve {
    pub exceedance_probability: Vec<f64>,
    pub flow: Vec<f64>,
}

/// Extract daily average flows from a historic simulation CSV
/// (`datetime,streamflow` rows under a header row).
pub fn parse_daily_flows(historic_csv: &str) -> Result<Vec<f64>, FlowDurationError> {
    let mut flows = Vec::new();

    for line in historic_csv.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }

        let value = line
            .split(',')
            .nth(1)
            .ok_or_else(|| FlowDurationError::MissingColumns(line.to_string()))?;

        flows.push(
            value
                .trim()
                .parse::<f64>()
                .map_err(|_| FlowDurationError::MalformedFlow(value.to_string()))?,
        );
    }

    Ok(flows)
}

/// Build the curve from daily average flows.
///
/// Probabilities use average-method ranking so tied flows share one
/// probability, with the Weibull-style `n + 1` denominator.
#[instrument(skip(daily_flows), fields(samples = daily_flows.len()))]
pub fn flow_duration_curve(daily_flows: &[f64]) -> FlowDurationCurve {
    let mut sorted = daily_flows.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));

    let n = sorted.len() as f64;
    let exceedance_probability = average_ranks(&sorted)
        .into_iter()
        .map(|rank| 100.0 * (n - rank) / (n + 1.0))
        .collect();

    debug!("Computed flow-duration curve over {} samples", sorted.len());
    FlowDurationCurve {
        exceedance_probability,
        flow: sorted,
    }
}

/// 1-based ranks by magnitude; tied values receive the mean of the ranks
/// they span.
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // Positions i..=j (0-based) hold ties; their 1-based ranks average
        // to (i + j + 2) / 2.
        let rank = (i + j + 2) as f64 / 2.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }

    ranks
}
