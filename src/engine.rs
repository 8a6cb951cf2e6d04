//! The auto-zero decision engine.
//!
//! Decides, once per polling tick per metric, whether a previously reported
//! telemetry value should be treated as zero because the vehicle is known to
//! be idle. Two independent signals corroborate the decision: trip completion
//! (primary path) and data staleness (fallback when no trip is known). Both
//! paths require several consecutive confirming observations before acting,
//! and an un-zeroed metric enters a cooldown so the decision cannot flap.
//!
//! The engine performs no I/O and never suspends. Callers that poll vehicles
//! concurrently should wrap one instance in a single coarse lock; calls for
//! the same (vehicle, metric) pair must not run unsynchronized.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::metrics::{is_auto_zero_metric, metric_label};
use crate::types::{FieldReading, MetricKey, TripKey, TripSnapshot, TripState};

/// Minutes after a trip completes before zeroing may begin; the reading
/// itself must also be at least this stale.
const WAIT_AFTER_COMPLETION_MINUTES: i64 = 5;

/// Consecutive COMPLETED observations required before the primary path acts.
const REQUIRED_COMPLETED_CALLS: u32 = 6;

/// Re-zeroing is suppressed for this long after fresh data un-zeros a metric.
const UNZERO_COOLDOWN_MINUTES: i64 = 30;

/// Minimum reading age for a fallback tick to count toward the stale streak.
const STALE_TICK_AGE_MINUTES: i64 = 1;

/// Consecutive stale observations required on the fallback path.
const REQUIRED_STALE_CALLS: u32 = 30;

/// Default retention for [`AutoZeroEngine::cleanup_old_entries`].
pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// Consecutive-stale-reading streak for one metric. Keyed by the reading's
/// own `last_seen` so that new data breaks the streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StaleStreak {
    count: u32,
    last_seen: DateTime<Utc>,
}

/// Diagnostic snapshot of one metric's auto-zero state, surfaced by callers
/// as entity attributes.
#[derive(Debug, Clone, Serialize)]
pub struct MetricStatus {
    pub eligible: bool,
    pub is_zeroed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zeroed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
}

/// Per-(vehicle, metric) auto-zero state machine.
///
/// One long-lived instance serves the whole process. All state is in memory
/// only and rebuilds empty on restart. The maps grow in response to decision
/// calls and are trimmed by [`cleanup_old_entries`](Self::cleanup_old_entries)
/// and [`prune_vehicles`](Self::prune_vehicles) alone.
#[derive(Debug, Default)]
pub struct AutoZeroEngine {
    /// When a trip was first observed as COMPLETED. Keyed by trip, not
    /// vehicle: it must survive the vehicle moving on to another trip id.
    trip_completion_times: HashMap<TripKey, DateTime<Utc>>,
    /// Consecutive ticks in which the vehicle's latest trip was COMPLETED.
    completed_call_counts: HashMap<String, u32>,
    /// Metrics currently reported as zero, with the reading's `last_seen`
    /// at the moment zeroing began.
    zeroed_metrics: HashMap<MetricKey, DateTime<Utc>>,
    /// Expiry before which a metric may not be zeroed again.
    metric_cooldowns: HashMap<MetricKey, DateTime<Utc>>,
    /// Last observed (trip_id, state) per vehicle, for transition detection.
    last_trip_state: HashMap<String, (String, TripState)>,
    /// Fallback-path stale streaks.
    stale_call_counts: HashMap<MetricKey, StaleStreak>,
}

impl AutoZeroEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides whether the caller should substitute zero for the metric's
    /// real value on this tick.
    ///
    /// Never fails: absent or ineligible input degrades to `false`. The
    /// caller owns the substitution itself; this returns only the decision.
    pub fn should_zero_metric(
        &mut self,
        vehicle_id: &str,
        metric_id: &str,
        reading: Option<&FieldReading>,
        trip: Option<&TripSnapshot>,
        auto_zero_enabled: bool,
    ) -> bool {
        self.should_zero_metric_at(Utc::now(), vehicle_id, metric_id, reading, trip, auto_zero_enabled)
    }

    /// Same decision with an injected clock. `now` is captured once per call
    /// so every comparison sees one consistent time reference; replay and
    /// tests drive this directly with recorded timestamps.
    pub fn should_zero_metric_at(
        &mut self,
        now: DateTime<Utc>,
        vehicle_id: &str,
        metric_id: &str,
        reading: Option<&FieldReading>,
        trip: Option<&TripSnapshot>,
        auto_zero_enabled: bool,
    ) -> bool {
        if !auto_zero_enabled || !is_auto_zero_metric(metric_id) {
            return false;
        }
        let Some(reading) = reading else {
            debug!(vehicle_id, metric_id, "no field data, skipping auto-zero evaluation");
            return false;
        };

        let key = MetricKey::new(vehicle_id, metric_id);
        let label = metric_label(metric_id).unwrap_or(metric_id);

        // Lazy expiry: cooldowns are checked and dropped here, not by timer.
        if let Some(&until) = self.metric_cooldowns.get(&key) {
            if now < until {
                debug!(vehicle_id, metric = label, until = %until, "cooldown active, not zeroing");
                return false;
            }
            self.metric_cooldowns.remove(&key);
        }

        // Fresh data un-zeros the metric and starts the re-zero cooldown.
        if let Some(&zeroed_since) = self.zeroed_metrics.get(&key) {
            if reading.last_seen > zeroed_since {
                let until = now + Duration::minutes(UNZERO_COOLDOWN_MINUTES);
                self.zeroed_metrics.remove(&key);
                self.metric_cooldowns.insert(key.clone(), until);
                info!(
                    vehicle_id,
                    metric = label,
                    last_seen = %reading.last_seen,
                    cooldown_until = %until,
                    "fresh data received, un-zeroing metric"
                );
                return false;
            }
        }

        match trip {
            Some(trip) => self.decide_with_trip(now, &key, label, reading, trip),
            None => self.decide_without_trip(now, &key, label, reading),
        }
    }

    /// Primary path: the vehicle's latest trip is known. Zeroing requires a
    /// settled COMPLETED state, a grace period after completion, and a stale
    /// reading, all at once.
    fn decide_with_trip(
        &mut self,
        now: DateTime<Utc>,
        key: &MetricKey,
        label: &str,
        reading: &FieldReading,
        trip: &TripSnapshot,
    ) -> bool {
        let vehicle_id = key.vehicle_id.as_str();

        let observed = (trip.trip_id.clone(), trip.state);
        if self.last_trip_state.get(vehicle_id) != Some(&observed) {
            debug!(
                vehicle = %vehicle_id,
                trip_id = %trip.trip_id,
                state = ?trip.state,
                "trip state transition"
            );
            self.last_trip_state.insert(vehicle_id.to_string(), observed);
            if trip.state != TripState::Completed {
                self.completed_call_counts.insert(vehicle_id.to_string(), 0);
            }
        }

        if trip.state != TripState::Completed {
            // Active or unknown-state trips never zero, and they clear any
            // standing zero without a cooldown.
            self.completed_call_counts.insert(vehicle_id.to_string(), 0);
            if self.zeroed_metrics.remove(key).is_some() {
                info!(vehicle = %vehicle_id, metric = label, trip_id = %trip.trip_id, "trip resumed, un-zeroing metric");
            }
            return false;
        }

        // First-observed-completed timestamp; never overwritten for the
        // same trip.
        let trip_key = TripKey::new(vehicle_id, &trip.trip_id);
        let completed_at = *self.trip_completion_times.entry(trip_key).or_insert(now);

        let count = self
            .completed_call_counts
            .entry(vehicle_id.to_string())
            .or_insert(0);
        if *count < REQUIRED_COMPLETED_CALLS {
            *count += 1;
        }
        let count = *count;

        if count < REQUIRED_COMPLETED_CALLS {
            debug!(
                vehicle = %vehicle_id,
                metric = label,
                count,
                required = REQUIRED_COMPLETED_CALLS,
                "trip completed, awaiting consecutive confirmations"
            );
            return false;
        }
        if now - completed_at < Duration::minutes(WAIT_AFTER_COMPLETION_MINUTES) {
            debug!(vehicle = %vehicle_id, metric = label, completed_at = %completed_at, "inside post-completion grace period");
            return false;
        }
        if now - reading.last_seen < Duration::minutes(WAIT_AFTER_COMPLETION_MINUTES) {
            debug!(vehicle = %vehicle_id, metric = label, last_seen = %reading.last_seen, "reading still fresh, not zeroing");
            return false;
        }

        if !self.zeroed_metrics.contains_key(key) {
            self.zeroed_metrics.insert(key.clone(), reading.last_seen);
            info!(
                vehicle = %vehicle_id,
                metric = label,
                trip_id = %trip.trip_id,
                last_seen = %reading.last_seen,
                "zeroing metric: trip completed and data stale"
            );
        }
        true
    }

    /// Fallback path: no trip is known for the vehicle, so the decision
    /// rests on staleness alone. Slower on purpose: 30 confirming ticks
    /// instead of 6.
    fn decide_without_trip(
        &mut self,
        now: DateTime<Utc>,
        key: &MetricKey,
        label: &str,
        reading: &FieldReading,
    ) -> bool {
        let streak = self.stale_call_counts.get(key).copied().unwrap_or(StaleStreak {
            count: 0,
            last_seen: reading.last_seen,
        });

        if streak.last_seen != reading.last_seen {
            // New data arrived since the last call; the streak restarts.
            debug!(vehicle = %key.vehicle_id, metric = label, last_seen = %reading.last_seen, "new data broke the stale streak");
            self.stale_call_counts.insert(
                key.clone(),
                StaleStreak {
                    count: 0,
                    last_seen: reading.last_seen,
                },
            );
            return false;
        }

        if now - reading.last_seen < Duration::minutes(STALE_TICK_AGE_MINUTES) {
            // Too fresh to count as a stale tick.
            return false;
        }

        let count = if streak.count < REQUIRED_STALE_CALLS {
            streak.count + 1
        } else {
            streak.count
        };
        let updated = StaleStreak {
            count,
            last_seen: reading.last_seen,
        };
        if updated != streak {
            self.stale_call_counts.insert(key.clone(), updated);
        }

        if count >= REQUIRED_STALE_CALLS {
            if !self.zeroed_metrics.contains_key(key) {
                self.zeroed_metrics.insert(key.clone(), reading.last_seen);
                info!(
                    vehicle = %key.vehicle_id,
                    metric = label,
                    stale_calls = count,
                    last_seen = %reading.last_seen,
                    "zeroing metric: no trip data and readings stale"
                );
            }
            return true;
        }

        debug!(
            vehicle = %key.vehicle_id,
            metric = label,
            count,
            required = REQUIRED_STALE_CALLS,
            "stale tick counted"
        );
        false
    }

    /// Housekeeping: trims completion times and stale streaks older than the
    /// retention window and drops already-expired cooldowns. Intended to run
    /// on a fixed schedule (e.g. hourly), once globally, not per vehicle.
    ///
    /// `zeroed_metrics`, `completed_call_counts`, and `last_trip_state` are
    /// deliberately left alone here; they are bounded by the fleet roster
    /// and trimmed by [`prune_vehicles`](Self::prune_vehicles).
    pub fn cleanup_old_entries(&mut self, retention_hours: i64) {
        self.cleanup_old_entries_at(Utc::now(), retention_hours)
    }

    /// Same housekeeping with an injected clock.
    pub fn cleanup_old_entries_at(&mut self, now: DateTime<Utc>, retention_hours: i64) {
        let cutoff = now - Duration::hours(retention_hours);
        let before = self.trip_completion_times.len()
            + self.metric_cooldowns.len()
            + self.stale_call_counts.len();

        self.trip_completion_times.retain(|_, completed_at| *completed_at >= cutoff);
        self.metric_cooldowns.retain(|_, until| *until >= now);
        self.stale_call_counts.retain(|_, streak| streak.last_seen >= cutoff);

        let after = self.trip_completion_times.len()
            + self.metric_cooldowns.len()
            + self.stale_call_counts.len();
        if after < before {
            debug!(removed = before - after, retention_hours, "auto-zero cleanup removed expired entries");
        }
    }

    /// Drops all state for vehicles absent from `roster`. Complements the
    /// time-based cleanup, which leaves the per-vehicle tables alone.
    pub fn prune_vehicles(&mut self, roster: &HashSet<String>) {
        let before = self.zeroed_metrics.len() + self.last_trip_state.len();

        self.trip_completion_times.retain(|k, _| roster.contains(&k.vehicle_id));
        self.completed_call_counts.retain(|v, _| roster.contains(v));
        self.zeroed_metrics.retain(|k, _| roster.contains(&k.vehicle_id));
        self.metric_cooldowns.retain(|k, _| roster.contains(&k.vehicle_id));
        self.last_trip_state.retain(|v, _| roster.contains(v));
        self.stale_call_counts.retain(|k, _| roster.contains(&k.vehicle_id));

        let after = self.zeroed_metrics.len() + self.last_trip_state.len();
        if after < before {
            info!(roster_size = roster.len(), "pruned auto-zero state for vehicles no longer in roster");
        }
    }

    /// Whether the metric is currently marked as zeroed. Callers use this to
    /// report zero before the first reading of a session arrives.
    pub fn is_zeroed(&self, vehicle_id: &str, metric_id: &str) -> bool {
        self.zeroed_metrics
            .contains_key(&MetricKey::new(vehicle_id, metric_id))
    }

    /// Number of metrics currently reported as zero, fleet-wide.
    pub fn zeroed_count(&self) -> usize {
        self.zeroed_metrics.len()
    }

    /// Diagnostic snapshot for one metric.
    pub fn metric_status(&self, vehicle_id: &str, metric_id: &str) -> MetricStatus {
        let key = MetricKey::new(vehicle_id, metric_id);
        MetricStatus {
            eligible: is_auto_zero_metric(metric_id),
            is_zeroed: self.zeroed_metrics.contains_key(&key),
            zeroed_at: self.zeroed_metrics.get(&key).copied(),
            cooldown_until: self.metric_cooldowns.get(&key).copied(),
        }
    }
}
