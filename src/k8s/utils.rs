use chrono::{DateTime, Duration, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

#[must_use]
pub fn format_duration(duration: Duration) -> String {
    if duration.num_days() > 0 {
        format!("{}d", duration.num_days())
    } else if duration.num_hours() > 0 {
        format!("{}h", duration.num_hours())
    } else if duration.num_minutes() > 0 {
        format!("{}m", duration.num_minutes())
    } else {
        format!("{}s", duration.num_seconds())
    }
}

/// Age of a resource from its creation timestamp, `Unk` when absent
pub(crate) fn age_since(created: Option<&Time>) -> String {
    created.map_or_else(
        || "Unk".to_string(),
        |ts| {
            let ts: DateTime<Utc> = ts.0;
            format_duration(Utc::now().signed_duration_since(ts))
        },
    )
}
