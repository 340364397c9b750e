use crate::k8s::{RawWatchItem, ResourceKind};
use k8s_openapi::serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
    Error,
}

impl EventType {
    /// Parse the wire name. `None` for types that carry no change (bookmarks).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ADDED" => Some(Self::Added),
            "MODIFIED" => Some(Self::Modified),
            "DELETED" => Some(Self::Deleted),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "ADDED",
            Self::Modified => "MODIFIED",
            Self::Deleted => "DELETED",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized projection of one watch stream item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub event_type: EventType,
    pub kind: ResourceKind,
    pub name: String,
    /// Empty for cluster scoped kinds and degenerate errors
    pub namespace: String,
    pub phase: Option<String>,
    /// Server supplied detail, only set on `ERROR` events
    pub message: Option<String>,
}

impl WatchEvent {
    /// Placeholder for an error item whose payload could not be decoded
    #[must_use]
    pub fn degenerate(kind: ResourceKind, message: Option<String>) -> Self {
        Self {
            event_type: EventType::Error,
            kind,
            name: String::new(),
            namespace: String::new(),
            phase: None,
            message,
        }
    }

    /// Project a raw item. Returns `None` for item types that carry no change.
    /// Items without a usable object name become degenerate `ERROR` events.
    #[must_use]
    pub fn from_raw(kind: ResourceKind, raw: &RawWatchItem) -> Option<Self> {
        let event_type = EventType::parse(&raw.event_type)?;
        if event_type == EventType::Error {
            let message = raw
                .object
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string);
            return Some(Self::degenerate(kind, message));
        }

        let metadata = raw.object.get("metadata");
        let Some(name) = metadata
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
        else {
            return Some(Self::degenerate(
                kind,
                Some(format!("unparsable {event_type} payload")),
            ));
        };

        Some(Self {
            event_type,
            kind,
            name: name.to_string(),
            namespace: metadata
                .and_then(|m| m.get("namespace"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            phase: raw
                .object
                .get("status")
                .and_then(|s| s.get("phase"))
                .and_then(Value::as_str)
                .map(str::to_string),
            message: None,
        })
    }

    /// Error code carried by an `ERROR` item, if the payload had one
    #[must_use]
    pub fn error_code(raw: &RawWatchItem) -> Option<u64> {
        raw.object.get("code").and_then(Value::as_u64)
    }
}

/// Text sent to a subscriber for one event
#[must_use]
pub fn format_message(event: &WatchEvent) -> String {
    let target = if event.namespace.is_empty() {
        event.name.clone()
    } else {
        format!("{}/{}", event.namespace, event.name)
    };
    match &event.phase {
        Some(phase) => format!("[{}] {} {} ({})", event.event_type, event.kind, target, phase),
        None => format!("[{}] {} {}", event.event_type, event.kind, target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::serde_json::json;

    #[test]
    fn test_from_raw_pod() {
        let raw = RawWatchItem::new(
            "MODIFIED",
            json!({
                "metadata": {"name": "web-1", "namespace": "shop"},
                "status": {"phase": "Running"}
            }),
        );
        let event = WatchEvent::from_raw(ResourceKind::Pod, &raw).unwrap();
        assert_eq!(event.event_type, EventType::Modified);
        assert_eq!(event.name, "web-1");
        assert_eq!(event.namespace, "shop");
        assert_eq!(event.phase.as_deref(), Some("Running"));
        assert_eq!(format_message(&event), "[MODIFIED] pod shop/web-1 (Running)");
    }

    #[test]
    fn test_from_raw_namespace_without_status() {
        let raw = RawWatchItem::new("ADDED", json!({"metadata": {"name": "shop"}}));
        let event = WatchEvent::from_raw(ResourceKind::Namespace, &raw).unwrap();
        assert_eq!(event.namespace, "");
        assert!(event.phase.is_none());
        assert_eq!(format_message(&event), "[ADDED] namespace shop");
    }

    #[test]
    fn test_unparsable_payloads_degrade_to_error() {
        let garbage = RawWatchItem::new("ERROR", json!("not an object"));
        let event = WatchEvent::from_raw(ResourceKind::Pod, &garbage).unwrap();
        assert_eq!(event, WatchEvent::degenerate(ResourceKind::Pod, None));

        let nameless = RawWatchItem::new("ADDED", json!({"metadata": {}}));
        let event = WatchEvent::from_raw(ResourceKind::Pod, &nameless).unwrap();
        assert_eq!(event.event_type, EventType::Error);
        assert!(event.name.is_empty());
    }

    #[test]
    fn test_bookmarks_are_skipped() {
        let raw = RawWatchItem::new("BOOKMARK", json!({"metadata": {"name": "x"}}));
        assert!(WatchEvent::from_raw(ResourceKind::Pod, &raw).is_none());
    }
}
