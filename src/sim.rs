//! Deterministic scripted fleet used by the `simulate` subcommand.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use autozero::metrics::AUTO_ZERO_METRICS;
use autozero::source::TelemetrySource;
use autozero::types::{FieldReading, TripSnapshot, TripState};

/// Minutes a scripted vehicle spends driving in each cycle.
const DRIVE_MINUTES: i64 = 10;

/// Minutes a scripted vehicle spends parked (trip completed) in each cycle.
const PARK_MINUTES: i64 = 20;

/// Per-vehicle phase offset so the fleet does not move in lockstep.
const STAGGER_MINUTES: i64 = 7;

/// A control field outside the eligible table; it keeps reporting while the
/// vehicle is parked, the way a device battery sensor does.
const CONTROL_METRIC: &str = "std.battery_voltage.value";

/// A fleet whose vehicles alternate a fixed drive/park cycle.
///
/// While a vehicle drives, its trip is active and readings renew on every
/// poll. While it is parked, the latest trip reports completed and the
/// eligible readings stay frozen at the moment it stopped.
pub struct ScriptedFleet {
    start: DateTime<Utc>,
    vehicle_ids: Vec<String>,
}

struct Phase {
    cycle: i64,
    parked: bool,
    parked_since: DateTime<Utc>,
}

impl ScriptedFleet {
    pub fn new(vehicles: usize, start: DateTime<Utc>) -> Self {
        Self {
            start,
            vehicle_ids: (1..=vehicles).map(|i| format!("sim-v{i}")).collect(),
        }
    }

    fn phase(&self, vehicle_id: &str, now: DateTime<Utc>) -> Phase {
        let index = self
            .vehicle_ids
            .iter()
            .position(|v| v == vehicle_id)
            .unwrap_or(0) as i64;

        let origin = self.start - Duration::minutes(index * STAGGER_MINUTES);
        let cycle_len = DRIVE_MINUTES + PARK_MINUTES;
        let elapsed_min = (now - origin).num_minutes().max(0);

        let cycle = elapsed_min / cycle_len;
        let within = elapsed_min % cycle_len;

        Phase {
            cycle,
            parked: within >= DRIVE_MINUTES,
            parked_since: origin + Duration::minutes(cycle * cycle_len + DRIVE_MINUTES),
        }
    }

    /// Deterministic sample value for a metric at a point in time.
    fn sample_value(metric_id: &str, at: DateTime<Utc>) -> f64 {
        let minute = at.timestamp() / 60;
        match metric_id {
            "obd.rpm.value" => 800.0 + (minute % 20) as f64 * 50.0,
            "obd.speed.value" => (minute % 90) as f64,
            "obd.coolant_temp.value" => 70.0 + (minute % 25) as f64,
            _ => (minute % 100) as f64 / 10.0,
        }
    }

    /// Readings for one vehicle as of `now`: every eligible metric plus the
    /// always-fresh control field.
    pub fn fields_at(&self, vehicle_id: &str, now: DateTime<Utc>) -> HashMap<String, FieldReading> {
        let phase = self.phase(vehicle_id, now);
        let seen = if phase.parked { phase.parked_since } else { now };

        let mut fields: HashMap<String, FieldReading> = AUTO_ZERO_METRICS
            .iter()
            .map(|(metric_id, _)| {
                (
                    metric_id.to_string(),
                    FieldReading {
                        last_value: json!(Self::sample_value(metric_id, seen)),
                        last_seen: seen,
                    },
                )
            })
            .collect();

        fields.insert(
            CONTROL_METRIC.to_string(),
            FieldReading {
                last_value: json!(12.6),
                last_seen: now,
            },
        );

        fields
    }

    /// The vehicle's latest trip as of `now`.
    pub fn trip_at(&self, vehicle_id: &str, now: DateTime<Utc>) -> TripSnapshot {
        let phase = self.phase(vehicle_id, now);
        TripSnapshot {
            trip_id: format!("{vehicle_id}-trip-{}", phase.cycle),
            state: if phase.parked {
                TripState::Completed
            } else {
                TripState::Active
            },
        }
    }
}

#[async_trait]
impl TelemetrySource for ScriptedFleet {
    async fn vehicles(&self) -> Result<Vec<String>> {
        Ok(self.vehicle_ids.clone())
    }

    async fn poll_fields(&self, vehicle_id: &str) -> Result<HashMap<String, FieldReading>> {
        Ok(self.fields_at(vehicle_id, Utc::now()))
    }

    async fn latest_trip(&self, vehicle_id: &str) -> Result<Option<TripSnapshot>> {
        Ok(Some(self.trip_at(vehicle_id, Utc::now())))
    }
}
