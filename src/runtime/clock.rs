//! Wall-clock stamps for outcome and run metadata.

use std::time::SystemTime;

pub fn wall_time_iso_utc() -> String {
    // Metadata only; nothing decides on these values.
    let now = SystemTime::now();
    let dt: time::OffsetDateTime = now.into();
    dt.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
