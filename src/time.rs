use std::time::{SystemTime, UNIX_EPOCH};

/// Monotonically non-decreasing wall-clock milliseconds since the Unix epoch.
///
/// Used wherever a cheap, coarse timestamp is sufficient (span fields,
/// cooldown arithmetic). For persisted created_at/updated_at columns use
/// `now_utc` instead so values round-trip through `chrono`/`sqlx` directly.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub fn now_utc() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
