//! Rendering of run reports.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::Summary;
use crate::domain::{Metric, RunReport};

/// What was benchmarked, printed above the results
#[derive(Debug, Clone, Serialize)]
pub struct RunDescription {
    #[serde(rename = "type")]
    pub pod_type: String,
    pub pods: usize,
    pub sequential: bool,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    description: &'a RunDescription,
    elapsed_ms: f64,
    metrics: Vec<JsonMetric>,
}

#[derive(Debug, Serialize)]
struct JsonMetric {
    metric: Metric,
    summary: Option<Summary>,
}

/// Metrics to report, deletion latency only when it was measured
pub fn metrics(include_deleted: bool) -> Vec<Metric> {
    let mut metrics = Metric::STARTUP.to_vec();
    if include_deleted {
        metrics.push(Metric::TimeToDeleted);
    }
    metrics
}

pub fn render_table(
    description: &RunDescription,
    report: &RunReport,
    include_deleted: bool,
) -> String {
    let mode = if description.sequential {
        "sequentially"
    } else {
        "in parallel"
    };

    let mut out = format!(
        "Created {} {} pods {}, results are in ms:\n\n",
        description.pods, description.pod_type, mode
    );
    out.push_str(&format!(
        "{:<26} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}\n",
        "METRIC", "MIN", "MAX", "MEAN", "P50", "P95", "P99"
    ));
    out.push_str(&format!("{}\n", "-".repeat(92)));

    for metric in metrics(include_deleted) {
        match report.summary(metric) {
            Ok(s) => out.push_str(&format!(
                "{:<26} {:>10.0} {:>10.0} {:>10.0} {:>10.0} {:>10.0} {:>10.0}\n",
                metric.label(),
                s.min,
                s.max,
                s.mean,
                s.p50,
                s.p95,
                s.p99
            )),
            Err(_) => out.push_str(&format!(
                "{:<26} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}\n",
                metric.label(),
                "n/a",
                "n/a",
                "n/a",
                "n/a",
                "n/a",
                "n/a"
            )),
        }
    }

    out
}

pub fn render_json(
    description: &RunDescription,
    report: &RunReport,
    include_deleted: bool,
) -> Result<String> {
    let json = JsonReport {
        description,
        elapsed_ms: report.elapsed_ms(),
        metrics: metrics(include_deleted)
            .into_iter()
            .map(|metric| JsonMetric {
                metric,
                summary: report.summary(metric).ok(),
            })
            .collect(),
    };

    serde_json::to_string_pretty(&json).context("Failed to serialize report")
}
