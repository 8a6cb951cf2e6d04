//! Domain types shared by the decision engine and the replay tooling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifies one telemetry channel on one vehicle. Equality by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricKey {
    pub vehicle_id: String,
    pub metric_id: String,
}

impl MetricKey {
    pub fn new(vehicle_id: &str, metric_id: &str) -> Self {
        Self {
            vehicle_id: vehicle_id.to_string(),
            metric_id: metric_id.to_string(),
        }
    }
}

/// Identifies one trip instance on one vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TripKey {
    pub vehicle_id: String,
    pub trip_id: String,
}

impl TripKey {
    pub fn new(vehicle_id: &str, trip_id: &str) -> Self {
        Self {
            vehicle_id: vehicle_id.to_string(),
            trip_id: trip_id.to_string(),
        }
    }
}

/// Lifecycle state of a trip as reported by the telemetry source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripState {
    Active,
    Completed,
    Other,
}

impl TripState {
    /// Maps the raw state strings used by the upstream API. `in_progress`
    /// and `started` both mean a trip is underway.
    pub fn parse(raw: &str) -> TripState {
        match raw {
            "completed" => TripState::Completed,
            "in_progress" | "started" => TripState::Active,
            _ => TripState::Other,
        }
    }
}

/// The most recently known trip for a vehicle. May be older than the
/// current tick if no new trip has started since.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripSnapshot {
    pub trip_id: String,
    pub state: TripState,
}

/// The most recent value of one telemetry field, with the timestamp the
/// source claims it was observed (not when the poller polled).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldReading {
    pub last_value: Value,
    pub last_seen: DateTime<Utc>,
}

impl FieldReading {
    /// The value a caller substitutes when a metric is zeroed, typed to
    /// match the real value (integer fields stay integers).
    pub fn zero_value(&self) -> Value {
        match &self.last_value {
            Value::Number(n) if n.is_u64() || n.is_i64() => Value::from(0),
            _ => Value::from(0.0),
        }
    }
}

/// One row of a recorded tick log.
///
/// An empty `last_seen` means the source has never reported the field; an
/// empty `trip_id`/`trip_state` pair means no trip is known for the vehicle
/// on that tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickRecord {
    pub ts: DateTime<Utc>,
    pub vehicle_id: String,
    pub metric_id: String,
    pub last_value: Option<f64>,
    pub last_seen: Option<DateTime<Utc>>,
    pub trip_id: Option<String>,
    pub trip_state: Option<TripState>,
}

impl TickRecord {
    pub fn reading(&self) -> Option<FieldReading> {
        self.last_seen.map(|last_seen| FieldReading {
            last_value: self.last_value.map_or(Value::Null, Value::from),
            last_seen,
        })
    }

    pub fn trip(&self) -> Option<TripSnapshot> {
        match (&self.trip_id, self.trip_state) {
            (Some(trip_id), Some(state)) => Some(TripSnapshot {
                trip_id: trip_id.clone(),
                state,
            }),
            _ => None,
        }
    }
}

/// One decision row appended to the output CSV: what the caller would
/// report for the metric on that tick.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub ts: DateTime<Utc>,
    pub vehicle_id: String,
    pub metric_id: String,
    pub zeroed: bool,
    pub reported_value: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trip_state_parse() {
        assert_eq!(TripState::parse("completed"), TripState::Completed);
        assert_eq!(TripState::parse("in_progress"), TripState::Active);
        assert_eq!(TripState::parse("started"), TripState::Active);
        assert_eq!(TripState::parse("recalculating"), TripState::Other);
        assert_eq!(TripState::parse(""), TripState::Other);
    }

    #[test]
    fn test_zero_value_matches_number_type() {
        let ts = "2026-01-05T08:00:00Z".parse().unwrap();
        let int_reading = FieldReading {
            last_value: json!(850),
            last_seen: ts,
        };
        assert_eq!(int_reading.zero_value(), json!(0));

        let float_reading = FieldReading {
            last_value: json!(12.5),
            last_seen: ts,
        };
        assert_eq!(float_reading.zero_value(), json!(0.0));

        let null_reading = FieldReading {
            last_value: Value::Null,
            last_seen: ts,
        };
        assert_eq!(null_reading.zero_value(), json!(0.0));
    }

    #[test]
    fn test_tick_record_without_last_seen_has_no_reading() {
        let record = TickRecord {
            ts: "2026-01-05T08:00:00Z".parse().unwrap(),
            vehicle_id: "v1".to_string(),
            metric_id: "obd.rpm.value".to_string(),
            last_value: None,
            last_seen: None,
            trip_id: None,
            trip_state: None,
        };
        assert!(record.reading().is_none());
        assert!(record.trip().is_none());
    }

    #[test]
    fn test_tick_record_reading_and_trip() {
        let record = TickRecord {
            ts: "2026-01-05T08:06:00Z".parse().unwrap(),
            vehicle_id: "v1".to_string(),
            metric_id: "obd.rpm.value".to_string(),
            last_value: Some(850.0),
            last_seen: Some("2026-01-05T08:00:00Z".parse().unwrap()),
            trip_id: Some("t1".to_string()),
            trip_state: Some(TripState::Completed),
        };

        let reading = record.reading().unwrap();
        assert_eq!(reading.last_value, json!(850.0));
        assert_eq!(
            reading.last_seen,
            "2026-01-05T08:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );

        let trip = record.trip().unwrap();
        assert_eq!(trip.trip_id, "t1");
        assert_eq!(trip.state, TripState::Completed);
    }

    #[test]
    fn test_tick_record_csv_parsing() {
        let csv_data = "\
ts,vehicle_id,metric_id,last_value,last_seen,trip_id,trip_state
2026-01-05T08:06:00Z,v1,obd.rpm.value,850,2026-01-05T08:00:00Z,t1,completed
2026-01-05T08:07:00Z,v2,std.fuel_used_gps.value,12.5,2026-01-05T08:00:00Z,,
";
        let mut rdr = csv::Reader::from_reader(csv_data.as_bytes());
        let rows: Vec<TickRecord> = rdr.deserialize().map(|r| r.unwrap()).collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].trip_state, Some(TripState::Completed));
        assert!(rows[1].trip_id.is_none());
        assert!(rows[1].trip_state.is_none());
    }
}
