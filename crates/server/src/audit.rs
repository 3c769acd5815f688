//! Persists audit events from the bus into the `audit_log` table.

use db::{AuditRepository, NewAuditRecord};
use events::{EventBus, EventEnvelope};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, warn};

pub fn to_record(envelope: &EventEnvelope) -> NewAuditRecord {
    let key = envelope.event.key();
    NewAuditRecord {
        id: envelope.id.to_string(),
        template_id: key.template_id,
        trigger_id: key.trigger_id,
        workspace_id: key.workspace_id,
        category: key.category.as_str().to_string(),
        level: key.level.as_str().to_string(),
        message: envelope.event.message(),
        data: serde_json::to_value(&envelope.event).ok(),
        created_at: envelope.timestamp,
    }
}

/// Subscribe to the bus and append every event until the bus closes.
pub fn spawn_audit_persister(bus: &EventBus, repository: AuditRepository) -> JoinHandle<()> {
    let mut rx = bus.subscribe();

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(envelope) => {
                    if let Err(e) = repository.append(&to_record(&envelope)).await {
                        error!(
                            event_id = %envelope.id,
                            error = %e,
                            "Failed to persist audit event"
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Audit persister lagged, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::{AuditLog, Event};
    use std::time::Duration;

    #[test]
    fn test_to_record_carries_key() {
        let envelope = EventEnvelope::new(Event::TriggerCompleted {
            trigger_id: "trg_1".into(),
            template_id: "tpl_1".into(),
            workspace_id: "ws-1".into(),
        });

        let record = to_record(&envelope);
        assert_eq!(record.trigger_id.as_deref(), Some("trg_1"));
        assert_eq!(record.template_id.as_deref(), Some("tpl_1"));
        assert_eq!(record.workspace_id.as_deref(), Some("ws-1"));
        assert_eq!(record.category, "trigger");
        assert_eq!(record.data.unwrap()["type"], "trigger.completed");
    }

    #[tokio::test]
    async fn test_persister_appends_events() {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        let repository = AuditRepository::new(pool);
        let bus = EventBus::new();
        let _handle = spawn_audit_persister(&bus, repository.clone());

        bus.record(Event::TriggerFired {
            trigger_id: "trg_1".into(),
            template_id: "tpl_1".into(),
        });

        let mut records = Vec::new();
        for _ in 0..50 {
            records = repository.find_by_trigger("trg_1").await.unwrap();
            if !records.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, "info");
    }
}
