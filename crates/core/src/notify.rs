use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::domain::employee::EmployeeId;

/// Outbound message. No recipient means the deployment owner/admin channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: Option<EmployeeId>,
    pub title: String,
    pub content: String,
}

impl Notification {
    pub fn to(recipient: EmployeeId, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self { recipient: Some(recipient), title: title.into(), content: content.into() }
    }

    pub fn owner(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self { recipient: None, title: title.into(), content: content.into() }
    }
}

/// Best-effort delivery. Implementations log their own failures.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

#[derive(Clone, Default)]
pub struct InMemoryNotificationSink {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotificationSink {
    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl NotificationSink for InMemoryNotificationSink {
    fn notify(&self, notification: Notification) {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}
