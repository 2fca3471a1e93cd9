use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "slotwise_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "slotwise_query_duration_seconds";

// ── Domain metrics ──────────────────────────────────────────────

/// Counter: committed service edits. Labels: op (create, update, disable, reactivate, delete).
pub const SCHEDULE_COMMITS_TOTAL: &str = "slotwise_schedule_commits_total";

/// Counter: bookings admitted.
pub const BOOKINGS_ADMITTED_TOTAL: &str = "slotwise_bookings_admitted_total";

/// Counter: booking attempts refused. Labels: reason.
pub const BOOKINGS_REJECTED_TOTAL: &str = "slotwise_bookings_rejected_total";

/// Counter: providers registered.
pub const PROVIDERS_REGISTERED_TOTAL: &str = "slotwise_providers_registered_total";

/// Counter: completed WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "slotwise_wal_compactions_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "slotwise_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "slotwise_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "slotwise_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotwise_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (records per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotwise_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus exporter on port {port}: {e}"),
    }
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertProvider { .. } => "insert_provider",
        Command::InsertStaff { .. } => "insert_staff",
        Command::InsertService { .. } => "insert_service",
        Command::UpdateService { .. } => "update_service",
        Command::SetServiceActive { .. } => "set_service_active",
        Command::DeleteService { .. } => "delete_service",
        Command::InsertBooking { .. } => "insert_booking",
        Command::SelectProviders { .. } => "select_providers",
        Command::SelectServices { .. } => "select_services",
        Command::SelectBookings { .. } => "select_bookings",
        Command::SelectSlots { .. } => "select_slots",
        Command::SelectAvailableDays { .. } => "select_available_days",
        Command::SelectAvailability { .. } => "select_availability",
    }
}
