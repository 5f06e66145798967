//! Hard caps applied to caller-supplied values.

/// Earliest year an appointment may start in.
pub const MIN_VALID_YEAR: i32 = 2000;
/// Latest year an appointment may start in.
pub const MAX_VALID_YEAR: i32 = 2200;

/// A single service never runs past a day.
pub const MAX_SERVICE_DURATION_MINUTES: u32 = 24 * 60;

pub const MIN_GRANULARITY_MINUTES: u32 = 1;
pub const MAX_GRANULARITY_MINUTES: u32 = 24 * 60;

pub const MAX_HORIZON_DAYS: u32 = 366;

pub const MAX_NOTES_LEN: usize = 4096;
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 256;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_REASON_LEN: usize = 1024;
