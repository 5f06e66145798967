use std::net::SocketAddr;

// ── Engine metrics ──────────────────────────────────────────────

/// Counter: availability checks. Labels: result.
pub const AVAILABILITY_CHECKS_TOTAL: &str = "slotwise_availability_checks_total";

/// Counter: forward slot searches. Labels: result.
pub const SLOT_SEARCHES_TOTAL: &str = "slotwise_slot_searches_total";

/// Histogram: candidate slots examined per search.
pub const SLOT_SEARCH_CANDIDATES: &str = "slotwise_slot_search_candidates";

/// Histogram: slot search latency in seconds.
pub const SLOT_SEARCH_DURATION_SECONDS: &str = "slotwise_slot_search_duration_seconds";

/// Counter: booking calls. Labels: outcome.
pub const BOOKINGS_TOTAL: &str = "slotwise_bookings_total";

/// Histogram: booking call latency in seconds.
pub const BOOKING_DURATION_SECONDS: &str = "slotwise_booking_duration_seconds";

// ── Store metrics ───────────────────────────────────────────────

/// Counter: events appended to the store journal.
pub const JOURNAL_APPENDS_TOTAL: &str = "slotwise_journal_appends_total";

/// Counter: hours lookups served from cache. Labels: result (hit/miss).
pub const HOURS_CACHE_LOOKUPS_TOTAL: &str = "slotwise_hours_cache_lookups_total";

/// Install the fmt tracing subscriber. Call once from the host binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().try_init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::warn!("failed to install Prometheus exporter: {e}"),
    }
}
