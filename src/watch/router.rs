use super::event::{EventType, WatchEvent, format_message};
use crate::chat::ChatTransport;
use crate::error::DeliveryFailure;
use crate::filter::should_deliver;
use crate::k8s::ResourceKind;
use crate::store::SubscriberStore;
use futures::future::join_all;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Outcome of routing one event
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RouteReport {
    pub delivered: usize,
    pub suppressed: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RouterStats {
    pub events_routed: u64,
    pub deliveries: u64,
    pub delivery_failures: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Delivered,
    Suppressed,
    Failed,
}

/// Fans one event out to every interested subscriber.
///
/// Subscriber state is read from the store per event; the router keeps none.
/// Sends for one event run concurrently and independently, and `route` only
/// returns once all of them have finished or timed out.
pub struct EventRouter {
    store: Arc<SubscriberStore>,
    transport: Arc<dyn ChatTransport>,
    send_timeout: Duration,
    stats: RwLock<RouterStats>,
}

impl EventRouter {
    #[must_use]
    pub fn new(store: Arc<SubscriberStore>, transport: Arc<dyn ChatTransport>, send_timeout: Duration) -> Self {
        Self {
            store,
            transport,
            send_timeout,
            stats: RwLock::new(RouterStats::default()),
        }
    }

    pub async fn route(&self, event: &WatchEvent) -> RouteReport {
        let mut report = RouteReport::default();

        if event.event_type == EventType::Error {
            warn!(
                "⚠️  {} watch reported an error: {}",
                event.kind,
                event.message.as_deref().unwrap_or("unparsable payload")
            );
            return report;
        }

        let recipients = match event.kind {
            ResourceKind::Pod => self.store.pod_subscribers().await,
            ResourceKind::Namespace => self.store.all_subscribers().await,
        };
        let recipients = match recipients {
            Ok(recipients) => recipients,
            Err(e) => {
                error!("❌ Could not read subscribers for {} event: {}", event.kind, e);
                return report;
            }
        };

        let message = format_message(event);
        let outcomes = join_all(
            recipients
                .iter()
                .map(|user| self.deliver_to(user, event, &message)),
        )
        .await;

        for outcome in outcomes {
            match outcome {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Suppressed => report.suppressed += 1,
                Delivery::Failed => report.failed += 1,
            }
        }

        if let Ok(mut stats) = self.stats.write() {
            stats.events_routed += 1;
            stats.deliveries += report.delivered as u64;
            stats.delivery_failures += report.failed as u64;
        }
        debug!("📨 {} -> {:?}", message, report);
        report
    }

    async fn deliver_to(&self, user: &str, event: &WatchEvent, message: &str) -> Delivery {
        let config = match self.store.get(user).await {
            Ok(Some(config)) => config,
            Ok(None) => return Delivery::Suppressed,
            Err(e) => {
                warn!("could not read config for {}: {}", user, e);
                return Delivery::Failed;
            }
        };
        if !should_deliver(event, &config) {
            return Delivery::Suppressed;
        }

        match tokio::time::timeout(self.send_timeout, self.send(user, message)).await {
            Ok(Ok(())) => Delivery::Delivered,
            Ok(Err(failure)) => {
                warn!("📭 {}", failure);
                Delivery::Failed
            }
            Err(_) => {
                warn!("📭 {}", DeliveryFailure::TimedOut(user.to_string()));
                Delivery::Failed
            }
        }
    }

    async fn send(&self, user: &str, message: &str) -> Result<(), DeliveryFailure> {
        let chat_id = self
            .transport
            .resolve(user)
            .await
            .map_err(|_| DeliveryFailure::Unreachable(user.to_string()))?;
        self.transport
            .send(&chat_id, message)
            .await
            .map_err(|e| DeliveryFailure::Send {
                recipient: user.to_string(),
                reason: e.to_string(),
            })
    }

    #[must_use]
    pub fn stats(&self) -> RouterStats {
        self.stats.read().map_or_else(|_| RouterStats::default(), |stats| *stats)
    }
}
