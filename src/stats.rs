use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::metrics::is_auto_zero_metric;
use crate::types::TickRecord;

/// Summary of one replayed or simulated tick stream.
#[derive(Debug, Default, Serialize)]
pub struct ReplayStats {
    pub timestamp: DateTime<Utc>,
    pub source: Option<String>,

    pub total_ticks: usize,
    pub eligible_ticks: usize,
    pub zero_decisions: usize,

    pub distinct_vehicles: usize,
    pub distinct_metrics: usize,

    /// Metrics still reported as zero when the run ended.
    pub zeroed_at_end: usize,

    #[serde(skip)]
    vehicles: HashSet<String>,
    #[serde(skip)]
    metrics: HashSet<String>,
}

impl ReplayStats {
    pub fn new(source: Option<String>) -> Self {
        ReplayStats {
            timestamp: Utc::now(),
            source,
            ..Default::default()
        }
    }

    /// Folds one tick and its decision into the summary.
    pub fn record(&mut self, tick: &TickRecord, zeroed: bool) {
        self.total_ticks += 1;
        if is_auto_zero_metric(&tick.metric_id) {
            self.eligible_ticks += 1;
        }
        if zeroed {
            self.zero_decisions += 1;
        }
        self.vehicles.insert(tick.vehicle_id.clone());
        self.metrics.insert(tick.metric_id.clone());
        self.distinct_vehicles = self.vehicles.len();
        self.distinct_metrics = self.metrics.len();
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    /// Share of eligible ticks that were decided as zero.
    pub fn zero_pct(&self) -> f64 {
        Self::pct(self.zero_decisions, self.eligible_ticks)
    }
}
