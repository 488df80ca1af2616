use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::state::AppServices;

/// Runs one NPS trigger pass every `interval` until `shutdown` fires.
/// A zero interval disables the loop.
pub fn spawn_trigger_poller(
    services: Arc<AppServices>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        info!(
            event_name = "nps.poller.disabled",
            correlation_id = "nps-poller",
            "nps trigger poller disabled"
        );
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            event_name = "nps.poller.started",
            correlation_id = "nps-poller",
            interval_secs = interval.as_secs(),
            "nps trigger poller started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = services.nps.process_pending().await;
                    if report.errors > 0 {
                        warn!(
                            event_name = "nps.poller.pass_with_errors",
                            correlation_id = "nps-poller",
                            errors = report.errors,
                            "nps poller pass finished with errors"
                        );
                    }
                }
                _ = shutdown.recv() => {
                    info!(
                        event_name = "nps.poller.stopped",
                        correlation_id = "shutdown",
                        "nps trigger poller stopped"
                    );
                    break;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use orgflow_core::audit::{AuditContext, InMemoryAuditSink};
    use orgflow_core::config::AppConfig;
    use orgflow_core::domain::employee::EmployeeId;
    use orgflow_core::domain::nps::ProcessId;
    use orgflow_core::notify::InMemoryNotificationSink;
    use orgflow_core::nps::TriggerRequest;
    use orgflow_db::{connect_with_settings, migrations, DemoSeedDataset};
    use tokio::sync::broadcast;

    use super::spawn_trigger_poller;
    use crate::state::AppServices;

    #[tokio::test]
    async fn zero_interval_disables_the_loop() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        let services = AppServices::with_sinks(
            &AppConfig::default(),
            pool,
            Arc::new(InMemoryAuditSink::default()),
            Arc::new(InMemoryNotificationSink::default()),
        )
        .expect("services");
        let (_tx, rx) = broadcast::channel(1);

        assert!(spawn_trigger_poller(Arc::new(services), Duration::ZERO, rx).is_none());
    }

    #[tokio::test]
    async fn poller_sends_due_triggers_and_stops_on_shutdown() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        DemoSeedDataset::load(&pool).await.expect("seed");
        let notifier = InMemoryNotificationSink::default();
        let services = Arc::new(
            AppServices::with_sinks(
                &AppConfig::default(),
                pool,
                Arc::new(InMemoryAuditSink::default()),
                Arc::new(notifier.clone()),
            )
            .expect("services"),
        );

        let outcome = services
            .nps
            .schedule_at(
                &TriggerRequest {
                    process_id: ProcessId("PDI-1".to_string()),
                    employee_id: EmployeeId::new("emp-dev1"),
                    delay_minutes: Some(0),
                },
                &AuditContext::system("test"),
                Utc::now(),
            )
            .await;
        assert!(outcome.is_scheduled());

        let (tx, rx) = broadcast::channel(1);
        let handle = spawn_trigger_poller(services, Duration::from_millis(20), rx).expect("spawned");

        for _ in 0..100 {
            if !notifier.sent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(notifier.sent().len(), 1);

        tx.send(()).expect("shutdown");
        handle.await.expect("poller task");
    }
}
