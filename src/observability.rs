use std::net::SocketAddr;

use crate::command::Command;

// ── Booking outcomes ────────────────────────────────────────────

/// Counter: bookings committed.
pub const BOOKINGS_TOTAL: &str = "roombook_bookings_total";

/// Counter: booking attempts refused. Labels: reason.
pub const BOOKINGS_REJECTED_TOTAL: &str = "roombook_bookings_rejected_total";

/// Counter: bookings cancelled.
pub const CANCELLATIONS_TOTAL: &str = "roombook_cancellations_total";

/// Counter: notifier failures swallowed after a commit. Labels: kind.
pub const NOTIFY_FAILURES_TOTAL: &str = "roombook_notify_failures_total";

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: commands executed. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "roombook_commands_total";

/// Histogram: command latency in seconds. Labels: command.
pub const COMMAND_DURATION_SECONDS: &str = "roombook_command_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

pub const CONNECTIONS_ACTIVE: &str = "roombook_connections_active";
pub const CONNECTIONS_TOTAL: &str = "roombook_connections_total";
pub const CONNECTIONS_REJECTED_TOTAL: &str = "roombook_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roombook_wal_flush_duration_seconds";

/// Histogram: saves per WAL flush.
pub const WAL_FLUSH_BATCH_SIZE: &str = "roombook_wal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op if `port` is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short metrics label for a command.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::CreateRoom { .. } => "create_room",
        Command::ListRooms => "list_rooms",
        Command::Book { .. } => "book",
        Command::Available { .. } => "available",
        Command::Cancel { .. } => "cancel",
        Command::Listen { .. } => "listen",
        Command::Unlisten => "unlisten",
        Command::Ping => "ping",
    }
}
