use crate::bus::EventBus;
use crate::types::{AuditLevel, Event, EventEnvelope};

/// Append-only sink for pipeline-stage events.
pub trait AuditLog: Send + Sync {
    fn record(&self, event: Event);
}

impl AuditLog for EventBus {
    /// Mirror the event to `tracing` at its audit level, then publish it.
    fn record(&self, event: Event) {
        let key = event.key();
        let message = event.message();
        let template_id = key.template_id.as_deref().unwrap_or("-");
        let trigger_id = key.trigger_id.as_deref().unwrap_or("-");
        let workspace_id = key.workspace_id.as_deref().unwrap_or("-");
        let category = key.category.as_str();

        match key.level {
            AuditLevel::Debug => tracing::debug!(
                category,
                template_id,
                trigger_id,
                workspace_id,
                "{}",
                message
            ),
            AuditLevel::Info => tracing::info!(
                category,
                template_id,
                trigger_id,
                workspace_id,
                "{}",
                message
            ),
            AuditLevel::Warn => tracing::warn!(
                category,
                template_id,
                trigger_id,
                workspace_id,
                "{}",
                message
            ),
            AuditLevel::Error => tracing::error!(
                category,
                template_id,
                trigger_id,
                workspace_id,
                "{}",
                message
            ),
        }

        self.publish(EventEnvelope::new(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_publishes_to_subscribers() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.record(Event::TriggerSkipped {
            trigger_id: "trg_1".to_string(),
            reason: "capacity".to_string(),
        });

        let received = rx.recv().await.unwrap();
        assert!(matches!(received.event, Event::TriggerSkipped { .. }));
        assert_eq!(bus.event_count(), 1);
    }

    #[test]
    fn test_record_without_subscribers_is_dropped() {
        let bus = EventBus::new();
        bus.record(Event::ResolutionStarted {
            template_id: "tpl_1".to_string(),
            trigger_id: None,
        });
        assert_eq!(bus.event_count(), 1);
    }
}
