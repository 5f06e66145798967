use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::limits::*;

pub const DEFAULT_SLOT_GRANULARITY_MINUTES: u32 = 15;
pub const DEFAULT_SEARCH_HORIZON_DAYS: u32 = 7;
pub const DEFAULT_SERVICE_DURATION_MINUTES: u32 = 60;
pub const DEFAULT_HOURS_CACHE_TTL_SECS: u64 = 30;

/// Tunables of the scheduling engine. Fixed for the lifetime of an engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Step between candidate slot starts.
    pub slot_granularity_minutes: u32,
    /// Days searched past the requested date.
    pub search_horizon_days: u32,
    /// Duration of a service that does not declare one.
    pub default_service_duration_minutes: u32,
    pub hours_cache_ttl_secs: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            slot_granularity_minutes: DEFAULT_SLOT_GRANULARITY_MINUTES,
            search_horizon_days: DEFAULT_SEARCH_HORIZON_DAYS,
            default_service_duration_minutes: DEFAULT_SERVICE_DURATION_MINUTES,
            hours_cache_ttl_secs: DEFAULT_HOURS_CACHE_TTL_SECS,
        }
    }
}

impl SchedulingConfig {
    /// Read `SLOTWISE_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let config: Self = serde_json::from_str(raw)?;
        Ok(config.sanitized())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
            match lookup(key) {
                Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                    warn!("ignoring unparsable {key}={raw}");
                    default
                }),
                None => default,
            }
        }

        Self {
            slot_granularity_minutes: parsed(
                &lookup,
                "SLOTWISE_SLOT_GRANULARITY_MINUTES",
                DEFAULT_SLOT_GRANULARITY_MINUTES,
            ),
            search_horizon_days: parsed(&lookup, "SLOTWISE_SEARCH_HORIZON_DAYS", DEFAULT_SEARCH_HORIZON_DAYS),
            default_service_duration_minutes: parsed(
                &lookup,
                "SLOTWISE_DEFAULT_SERVICE_MINUTES",
                DEFAULT_SERVICE_DURATION_MINUTES,
            ),
            hours_cache_ttl_secs: parsed(&lookup, "SLOTWISE_HOURS_CACHE_TTL_SECS", DEFAULT_HOURS_CACHE_TTL_SECS),
        }
        .sanitized()
    }

    /// Replace out-of-range values with defaults.
    pub fn sanitized(mut self) -> Self {
        if !(MIN_GRANULARITY_MINUTES..=MAX_GRANULARITY_MINUTES).contains(&self.slot_granularity_minutes) {
            warn!(
                "slot granularity {} out of range, using {DEFAULT_SLOT_GRANULARITY_MINUTES}",
                self.slot_granularity_minutes
            );
            self.slot_granularity_minutes = DEFAULT_SLOT_GRANULARITY_MINUTES;
        }
        if self.search_horizon_days > MAX_HORIZON_DAYS {
            warn!(
                "search horizon {} out of range, using {DEFAULT_SEARCH_HORIZON_DAYS}",
                self.search_horizon_days
            );
            self.search_horizon_days = DEFAULT_SEARCH_HORIZON_DAYS;
        }
        if self.default_service_duration_minutes == 0
            || self.default_service_duration_minutes > MAX_SERVICE_DURATION_MINUTES
        {
            warn!(
                "default service duration {} out of range, using {DEFAULT_SERVICE_DURATION_MINUTES}",
                self.default_service_duration_minutes
            );
            self.default_service_duration_minutes = DEFAULT_SERVICE_DURATION_MINUTES;
        }
        self
    }

    pub fn hours_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.hours_cache_ttl_secs)
    }
}
