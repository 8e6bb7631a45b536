use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total statements executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "fleetd_queries_total";

/// Histogram: statement latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "fleetd_query_duration_seconds";

// ── Domain metrics ──────────────────────────────────────────────

/// Counter: bookings persisted.
pub const BOOKINGS_CREATED_TOTAL: &str = "fleetd_bookings_created_total";

/// Counter: booking requests refused because the dates were taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "fleetd_booking_conflicts_total";

/// Counter: booking status changes. Labels: status.
pub const STATUS_CHANGES_TOTAL: &str = "fleetd_status_changes_total";

/// Counter: notification sink failures. Labels: sink.
pub const NOTIFY_FAILURES_TOTAL: &str = "fleetd_notify_failures_total";

/// Counter: expired reset codes removed by the reaper.
pub const RESET_CODES_REAPED_TOTAL: &str = "fleetd_reset_codes_reaped_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "fleetd_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "fleetd_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "fleetd_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "fleetd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "fleetd_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertVehicle { .. } => "insert_vehicle",
        Command::SetVehicleAvailability { .. } => "set_vehicle_availability",
        Command::ToggleVehicleAvailability { .. } => "toggle_vehicle_availability",
        Command::DeleteVehicle { .. } => "delete_vehicle",
        Command::SelectVehicles => "select_vehicles",
        Command::SelectOwnerVehicles => "select_owner_vehicles",
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectVehicleAvailability { .. } => "select_vehicle_availability",
        Command::InsertBooking { .. } => "insert_booking",
        Command::UpdateBookingStatus { .. } => "update_booking_status",
        Command::SelectBookings => "select_bookings",
        Command::SelectBooking { .. } => "select_booking",
        Command::SelectOwnerBookings => "select_owner_bookings",
        Command::SelectDashboard => "select_dashboard",
        Command::InsertPasswordReset { .. } => "insert_password_reset",
        Command::DeletePasswordReset { .. } => "delete_password_reset",
    }
}
