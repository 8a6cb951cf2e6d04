//! The fixed table of metrics eligible for auto-zeroing.

/// Metrics that may be reported as zero once a vehicle is known to be
/// stopped, with their display labels. The set is closed: metrics outside
/// this table are never zeroed regardless of the feature flag.
pub static AUTO_ZERO_METRICS: &[(&str, &str)] = &[
    ("obd.coolant_temp.value", "Coolant Temperature (OBD)"),
    ("obd.engine_load.value", "Engine Load (OBD)"),
    ("obd.rpm.value", "Engine RPM (OBD)"),
    ("obd.run_time.value", "Engine Run Time (OBD)"),
    ("std.fuel_used_gps.value", "Fuel Used (GPS)"),
    ("obd.throttle_pos.value", "Throttle Position (OBD)"),
    ("obd.speed.value", "Vehicle Speed (OBD)"),
    ("std.accelerometer_axis_x.value", "X-Axis Acceleration"),
    ("std.accelerometer_axis_y.value", "Y-Axis Acceleration"),
    ("std.accelerometer_axis_z.value", "Z-Axis Acceleration"),
];

/// Returns `true` if `metric_id` is eligible for auto-zeroing.
pub fn is_auto_zero_metric(metric_id: &str) -> bool {
    AUTO_ZERO_METRICS.iter().any(|(id, _)| *id == metric_id)
}

/// Returns the display label for an eligible metric.
pub fn metric_label(metric_id: &str) -> Option<&'static str> {
    AUTO_ZERO_METRICS
        .iter()
        .find(|(id, _)| *id == metric_id)
        .map(|(_, label)| *label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_the_closed_ten_metric_set() {
        assert_eq!(AUTO_ZERO_METRICS.len(), 10);
    }

    #[test]
    fn test_eligible_lookup() {
        assert!(is_auto_zero_metric("obd.rpm.value"));
        assert!(is_auto_zero_metric("std.accelerometer_axis_z.value"));
        assert!(!is_auto_zero_metric("some.unrelated.metric"));
        assert!(!is_auto_zero_metric(""));
    }

    #[test]
    fn test_metric_label() {
        assert_eq!(metric_label("obd.rpm.value"), Some("Engine RPM (OBD)"));
        assert_eq!(metric_label("std.fuel_used_gps.value"), Some("Fuel Used (GPS)"));
        assert_eq!(metric_label("some.unrelated.metric"), None);
    }
}
