//! Summary statistics over a completed task's rounds.
//!
//! Pure aggregation: latency/token stats are computed only over rounds where
//! the respective value is present, and the corresponding keys are omitted
//! entirely (not zeroed) when no round carries the value.

use serde::{Deserialize, Serialize};

/// Per-round facts the aggregator consumes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundStats {
    pub latency_ms: Option<i64>,
    pub total_tokens: Option<i64>,
    /// Whether the round's output parsed as structured JSON.
    pub parsed: bool,
}

/// Aggregated metrics persisted once per completed task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub rounds: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_latency_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_total_tokens: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_total_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_total_tokens: Option<i64>,
    /// Rounds with structured output / total rounds, rounded to 4 decimals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_success_rate: Option<f64>,
}

pub fn aggregate(rounds: &[RoundStats]) -> MetricsSummary {
    let mut summary = MetricsSummary {
        rounds: rounds.len(),
        ..Default::default()
    };

    let latencies: Vec<i64> = rounds.iter().filter_map(|r| r.latency_ms).collect();
    if !latencies.is_empty() {
        summary.avg_latency_ms = Some(mean(&latencies));
        summary.min_latency_ms = latencies.iter().min().copied();
        summary.max_latency_ms = latencies.iter().max().copied();
    }

    let tokens: Vec<i64> = rounds.iter().filter_map(|r| r.total_tokens).collect();
    if !tokens.is_empty() {
        summary.avg_total_tokens = Some(mean(&tokens));
        summary.min_total_tokens = tokens.iter().min().copied();
        summary.max_total_tokens = tokens.iter().max().copied();
    }

    if !rounds.is_empty() {
        let parsed = rounds.iter().filter(|r| r.parsed).count();
        summary.json_success_rate = Some(round4(parsed as f64 / rounds.len() as f64));
    }

    summary
}

fn mean(values: &[i64]) -> f64 {
    values.iter().sum::<i64>() as f64 / values.len() as f64
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
