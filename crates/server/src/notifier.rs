use orgflow_core::notify::{Notification, NotificationSink};
use tracing::info;

/// Delivers notifications to the structured log. Messages without a
/// recipient are addressed to the deployment owner.
#[derive(Clone, Debug, Default)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(&self, notification: Notification) {
        let recipient =
            notification.recipient.as_ref().map(|id| id.as_str().to_owned()).unwrap_or_else(|| "owner".to_owned());
        info!(
            event_name = "notification.sent",
            correlation_id = "notification",
            recipient = %recipient,
            title = %notification.title,
            content = %notification.content,
            "notification dispatched"
        );
    }
}
