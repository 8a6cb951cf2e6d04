//! Seam between the decision engine's callers and whatever produces ticks.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{FieldReading, TripSnapshot};

/// A provider of per-vehicle telemetry snapshots.
///
/// The production implementation is the REST polling layer, which lives
/// outside this crate; the `simulate` subcommand ships a scripted fleet.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Vehicle ids currently known to the source.
    async fn vehicles(&self) -> Result<Vec<String>>;

    /// Latest reading per field id for one vehicle.
    async fn poll_fields(&self, vehicle_id: &str) -> Result<HashMap<String, FieldReading>>;

    /// The vehicle's most recently known trip, if any.
    async fn latest_trip(&self, vehicle_id: &str) -> Result<Option<TripSnapshot>>;
}
