/**
 * Delivery decisions for one event and one subscriber.
 *
 * Pure functions only: no clocks, no storage, no logging.
 */
use crate::k8s::ResourceKind;
use crate::store::{SubscriberConfig, Verbosity};
use crate::watch::{EventType, WatchEvent};

/// How bad an event looks to a human watching the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Classify an event by type and phase.
///
/// `Failed`/`Unknown` phases and `ERROR` items are errors. Nominal phases
/// (`Running`, `Succeeded`, `Active`) are informational unless the resource
/// is being deleted. Everything else, including a missing phase, is a warning.
#[must_use]
pub fn severity(event: &WatchEvent) -> Severity {
    if event.event_type == EventType::Error {
        return Severity::Error;
    }
    match event.phase.as_deref() {
        Some("Failed" | "Unknown") => Severity::Error,
        Some("Running" | "Succeeded" | "Active") if event.event_type != EventType::Deleted => {
            Severity::Info
        }
        _ => Severity::Warning,
    }
}

#[must_use]
pub fn accepts(verbosity: Verbosity, severity: Severity) -> bool {
    let floor = match verbosity {
        Verbosity::All => Severity::Info,
        Verbosity::Warn => Severity::Warning,
        Verbosity::Error => Severity::Error,
    };
    severity >= floor
}

/// Whether `event` should reach a subscriber configured as `config`.
///
/// Pod events need the pod name in the monitored set. Namespace events go to
/// every subscriber. Both are then gated on verbosity.
#[must_use]
pub fn should_deliver(event: &WatchEvent, config: &SubscriberConfig) -> bool {
    let interested = match event.kind {
        ResourceKind::Pod => config.monitored.contains(&event.name),
        ResourceKind::Namespace => true,
    };
    interested && accepts(config.verbosity, severity(event))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(event_type: EventType, name: &str, phase: Option<&str>) -> WatchEvent {
        WatchEvent {
            event_type,
            kind: ResourceKind::Pod,
            name: name.to_string(),
            namespace: "default".to_string(),
            phase: phase.map(str::to_string),
            message: None,
        }
    }

    fn watching(names: &[&str], verbosity: Verbosity) -> SubscriberConfig {
        SubscriberConfig {
            monitored: names.iter().map(|n| (*n).to_string()).collect(),
            verbosity,
            ..SubscriberConfig::default()
        }
    }

    #[test]
    fn test_error_verbosity_gates_on_phase() {
        let config = watching(&["x"], Verbosity::Error);
        assert!(!should_deliver(&pod(EventType::Modified, "x", Some("Running")), &config));
        assert!(should_deliver(&pod(EventType::Modified, "x", Some("Failed")), &config));
        assert!(!should_deliver(&pod(EventType::Modified, "x", Some("Pending")), &config));
    }

    #[test]
    fn test_warn_verbosity() {
        let config = watching(&["x"], Verbosity::Warn);
        assert!(!should_deliver(&pod(EventType::Modified, "x", Some("Succeeded")), &config));
        assert!(should_deliver(&pod(EventType::Added, "x", Some("Pending")), &config));
        assert!(should_deliver(&pod(EventType::Deleted, "x", Some("Running")), &config));
        assert!(should_deliver(&pod(EventType::Modified, "x", Some("Unknown")), &config));
    }

    #[test]
    fn test_all_verbosity_requires_monitored_name() {
        let config = watching(&["x"], Verbosity::All);
        assert!(should_deliver(&pod(EventType::Added, "x", Some("Running")), &config));
        assert!(!should_deliver(&pod(EventType::Added, "y", Some("Failed")), &config));
        assert!(!should_deliver(&pod(EventType::Added, "x", None), &watching(&[], Verbosity::All)));
    }

    #[test]
    fn test_namespace_events_ignore_monitored_names() {
        let event = WatchEvent {
            kind: ResourceKind::Namespace,
            namespace: String::new(),
            ..pod(EventType::Modified, "shop", Some("Terminating"))
        };
        assert!(should_deliver(&event, &watching(&[], Verbosity::Warn)));
        assert!(!should_deliver(&event, &watching(&[], Verbosity::Error)));

        let active = WatchEvent {
            phase: Some("Active".to_string()),
            ..event
        };
        assert!(should_deliver(&active, &watching(&[], Verbosity::All)));
        assert!(!should_deliver(&active, &watching(&[], Verbosity::Warn)));
    }

    #[test]
    fn test_decision_is_deterministic() {
        let config = watching(&["x"], Verbosity::Warn);
        let event = pod(EventType::Modified, "x", Some("Pending"));
        let first = should_deliver(&event, &config);
        for _ in 0..100 {
            assert_eq!(should_deliver(&event, &config), first);
        }
    }
}
