//! Metrics definitions for the R2P service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `r2p_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `command`: 2 values (ready, unready)
//! - `outcome`: bounded by result and error codes (~8 values)
//! - `class`: 5 values (timer classes)
//! - `status`: 3 values (posted, failed, skipped)
//! - `operation`: bounded by collaborator calls (~8 values)
//!
//! Member ids are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Announcement publishing spans Discord round trips and optional rendering
        .set_buckets_for_metric(
            Matcher::Prefix("r2p_announcement".to_string()),
            &[0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set announcement duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Roster Metrics (Gauges)
// ============================================================================

/// Set the roster size after a regeneration.
///
/// Metrics: `r2p_roster_active_members`, `r2p_roster_pending_arrivals`
/// Labels: none
// usize to f64 conversion is safe for realistic roster sizes
#[allow(clippy::cast_precision_loss)]
pub fn set_roster_size(active: usize, pending: usize) {
    gauge!("r2p_roster_active_members").set(active as f64);
    gauge!("r2p_roster_pending_arrivals").set(pending as f64);
}

// ============================================================================
// Command Metrics (Counters)
// ============================================================================

/// Record a roster command and its outcome.
///
/// Metric: `r2p_commands_total`
/// Labels: `command`, `outcome`
///
/// Outcome is `added`, `scheduled`, `removed` or an error code.
pub fn record_command(command: &str, outcome: &str) {
    counter!(
        "r2p_commands_total",
        "command" => command.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

// ============================================================================
// Timer Metrics (Counters)
// ============================================================================

/// Record a timer whose expiry changed roster state.
///
/// Metric: `r2p_timers_fired_total`
/// Labels: `class`
pub fn record_timer_fired(class: &str) {
    counter!("r2p_timers_fired_total", "class" => class.to_string()).increment(1);
}

/// Record a timer that fired after being cancelled, replaced or outlived by
/// a state change.
///
/// Metric: `r2p_timers_stale_total`
/// Labels: `class`
///
/// A steady trickle is expected; a spike means the mailbox is lagging.
pub fn record_timer_stale(class: &str) {
    counter!("r2p_timers_stale_total", "class" => class.to_string()).increment(1);
}

// ============================================================================
// Announcement Metrics
// ============================================================================

/// Record an announcement publish attempt.
///
/// Metrics: `r2p_announcements_total`, `r2p_announcement_duration_seconds`
/// Labels: `status` (posted, failed)
pub fn record_announcement(status: &str, duration: Duration) {
    counter!("r2p_announcements_total", "status" => status.to_string()).increment(1);
    histogram!("r2p_announcement_duration_seconds", "status" => status.to_string())
        .record(duration.as_secs_f64());
}

/// Record snapshots superseded before they were published.
///
/// Metric: `r2p_announcements_total`
/// Labels: `status` = skipped
pub fn record_announcements_skipped(count: u64) {
    counter!("r2p_announcements_total", "status" => "skipped").increment(count);
}

// ============================================================================
// Collaborator Metrics (Counters)
// ============================================================================

/// Record a failed collaborator call that was logged and skipped.
///
/// Metric: `r2p_collaborator_failures_total`
/// Labels: `operation`
///
/// Operations: catalogue_items, render, post_message, delete_message,
/// store_load, store_save, grant_ready_role, revoke_ready_role.
pub fn record_collaborator_failure(operation: &str) {
    counter!(
        "r2p_collaborator_failures_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without an installed recorder these calls are no-ops; the tests check
    // that every helper accepts its label values without panicking.

    #[test]
    fn test_set_roster_size() {
        set_roster_size(0, 0);
        set_roster_size(3, 1);
        set_roster_size(50, 20);
    }

    #[test]
    fn test_record_command() {
        record_command("ready", "added");
        record_command("ready", "scheduled");
        record_command("ready", "DELAY_TOO_LONG");
        record_command("unready", "removed");
        record_command("unready", "NOT_IN_ROSTER");
    }

    #[test]
    fn test_record_timers() {
        for class in ["pending", "grace", "offline_grace", "voice_grace", "absolute_timeout"] {
            record_timer_fired(class);
            record_timer_stale(class);
        }
    }

    #[test]
    fn test_record_announcement() {
        record_announcement("posted", Duration::from_millis(120));
        record_announcement("failed", Duration::from_secs(10));
        record_announcements_skipped(3);
    }

    #[test]
    fn test_record_collaborator_failure() {
        record_collaborator_failure("delete_message");
        record_collaborator_failure("store_save");
    }
}
