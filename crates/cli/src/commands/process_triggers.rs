use std::sync::Arc;

use orgflow_core::audit::{AuditEvent, AuditSink};
use orgflow_core::notify::{Notification, NotificationSink};
use orgflow_db::{NpsService, SqlAuditSink, SqlEmployeeRepository, SqlNpsRepository};
use tracing::warn;

use crate::commands::{with_migrated_pool, CommandResult};

/// Collects notifications so the one-shot pass can report them on stdout.
#[derive(Default)]
struct CollectingNotifier {
    sent: std::sync::Mutex<Vec<Notification>>,
}

impl NotificationSink for CollectingNotifier {
    fn notify(&self, notification: Notification) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
    }
}

/// Buffers audit events and writes them before the runtime shuts down.
struct InlineAudit {
    sink: SqlAuditSink,
    pending: std::sync::Mutex<Vec<AuditEvent>>,
}

impl AuditSink for InlineAudit {
    fn emit(&self, event: AuditEvent) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push(event);
        }
    }
}

impl InlineAudit {
    fn new(sink: SqlAuditSink) -> Self {
        Self { sink, pending: std::sync::Mutex::new(Vec::new()) }
    }

    /// Writes buffered events; returns how many could not be persisted.
    async fn flush(&self) -> usize {
        let events = match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => return 0,
        };
        let mut failed = 0;
        for event in &events {
            if let Err(error) = self.sink.record(event).await {
                failed += 1;
                warn!(
                    event_name = "audit.emit.failed",
                    correlation_id = %event.correlation_id,
                    event_type = %event.event_type,
                    error = %error,
                    "failed to persist audit event"
                );
            }
        }
        failed
    }
}

pub fn run() -> CommandResult {
    let result = with_migrated_pool("process-triggers", |config, pool| async move {
        let notifier = Arc::new(CollectingNotifier::default());
        let audit = Arc::new(InlineAudit::new(SqlAuditSink::new(pool.clone())));
        let service = NpsService::new(
            SqlNpsRepository::new(pool.clone()),
            SqlEmployeeRepository::new(pool),
            config.nps_settings(),
            audit.clone(),
            notifier.clone(),
        );

        let report = service.process_pending().await;
        let audit_failures = audit.flush().await;
        let notifications =
            notifier.sent.lock().map(|sent| sent.clone()).unwrap_or_default();
        Ok((report, notifications, audit_failures))
    });

    match result {
        Ok((report, notifications, audit_failures)) => {
            let message = format!(
                "processed {} due triggers: {} sent, {} errors",
                report.processed, report.sent, report.errors
            );
            if report.errors > 0 {
                return CommandResult::failure("process-triggers", "trigger_errors", message, 8);
            }
            let data = serde_json::json!({
                "report": report,
                "notifications": notifications,
                "audit_failures": audit_failures,
            });
            CommandResult::success_with_data("process-triggers", message, Some(data))
        }
        Err(failure) => failure,
    }
}
