pub mod desktop;
pub mod error;

use crate::config::{NotifyBackend, Settings};
use crate::domain::alert::Notification;
use error::NotifyError;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Granted,
    Denied,
}

/// Where alerts are shown besides the panel.
#[async_trait::async_trait]
pub trait NotificationSurface: Send + Sync {
    fn name(&self) -> &'static str;

    async fn permission(&self) -> Permission;

    async fn show(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes alerts to the log only.
#[derive(Debug)]
pub struct LogNotifier {
    permission: Permission,
}

impl LogNotifier {
    pub fn new(permission: Permission) -> Self {
        Self { permission }
    }
}

#[async_trait::async_trait]
impl NotificationSurface for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn permission(&self) -> Permission {
        self.permission
    }

    async fn show(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.permission == Permission::Denied {
            return Err(NotifyError::PermissionDenied);
        }
        tracing::info!(
            tag = %notification.tag,
            "[ALERT] {}: {}",
            notification.title,
            notification.body
        );
        Ok(())
    }
}

pub fn from_settings(settings: &Settings) -> Arc<dyn NotificationSurface> {
    let permission = if settings.notify_permission_granted {
        Permission::Granted
    } else {
        Permission::Denied
    };
    match settings.notify_backend {
        NotifyBackend::Desktop => Arc::new(desktop::DesktopNotifier::new(permission)),
        NotifyBackend::Log => Arc::new(LogNotifier::new(permission)),
    }
}
