use crate::domain::alert::Notification;
use crate::notify::error::NotifyError;
use crate::notify::{NotificationSurface, Permission};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const APP_NAME: &str = "Invest Alert";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NotifierKind {
    NotifyRust,
    LogOnly,
}

/// Desktop notifications through notify-rust. Downgrades to log-only after the first failure.
#[derive(Debug)]
pub struct DesktopNotifier {
    permission: Permission,
    kind: Mutex<NotifierKind>,
}

impl DesktopNotifier {
    pub fn new(permission: Permission) -> Self {
        debug!(?permission, "DesktopNotifier created: using notify-rust backend initially");
        Self {
            permission,
            kind: Mutex::new(NotifierKind::NotifyRust),
        }
    }

    async fn show_desktop(notification: &Notification) -> Result<(), NotifyError> {
        let n = notification.clone();
        let res = tokio::task::spawn_blocking(move || {
            let mut builder = notify_rust::Notification::new();
            builder
                .appname(APP_NAME)
                .summary(&n.title)
                .body(&n.body)
                .icon(&n.icon);
            for action in &n.actions {
                builder.action(&action.action, &action.title);
            }
            #[cfg(all(unix, not(target_os = "macos")))]
            builder.id(replace_id(&n.tag));
            builder.show().map(|_| ()).map_err(|e| e.to_string())
        })
        .await;

        match res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(detail)) => Err(NotifyError::RegistrationFailed(detail)),
            Err(e) => Err(NotifyError::RegistrationFailed(format!(
                "notification task failed: {e}"
            ))),
        }
    }
}

// Same tag replaces the previous notification of that kind.
#[cfg(all(unix, not(target_os = "macos")))]
fn replace_id(tag: &str) -> u32 {
    match tag {
        "morning-stock" => 2001,
        "evening-volume" => 2002,
        _ => 2000,
    }
}

#[async_trait::async_trait]
impl NotificationSurface for DesktopNotifier {
    fn name(&self) -> &'static str {
        "desktop"
    }

    async fn permission(&self) -> Permission {
        self.permission
    }

    async fn show(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.permission == Permission::Denied {
            return Err(NotifyError::PermissionDenied);
        }

        let mut kind = self.kind.lock().await;
        match *kind {
            NotifierKind::NotifyRust => match Self::show_desktop(notification).await {
                Ok(()) => {
                    debug!(tag = %notification.tag, "desktop notification shown");
                    Ok(())
                }
                Err(e) => {
                    warn!(error = %e, "notify-rust failed; downgrading to LogOnly notifier");
                    *kind = NotifierKind::LogOnly;
                    info!("[ALERT] {}: {}", notification.title, notification.body);
                    Err(e)
                }
            },
            NotifierKind::LogOnly => {
                info!("[ALERT] {}: {}", notification.title, notification.body);
                Err(NotifyError::RegistrationFailed(
                    "desktop backend unavailable; logged only".to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::alert::AlertKind;

    #[tokio::test]
    async fn denied_permission_never_touches_backend() {
        let notifier = DesktopNotifier::new(Permission::Denied);
        let n = Notification::new(AlertKind::Morning, "b".to_string(), "/icon-192.png");
        assert_eq!(notifier.show(&n).await, Err(NotifyError::PermissionDenied));
        assert_eq!(*notifier.kind.lock().await, NotifierKind::NotifyRust);
    }

    #[tokio::test]
    async fn log_only_mode_reports_the_alert_as_undelivered() {
        let notifier = DesktopNotifier::new(Permission::Granted);
        *notifier.kind.lock().await = NotifierKind::LogOnly;
        let n = Notification::new(AlertKind::Evening, "b".to_string(), "/icon-192.png");
        assert!(matches!(
            notifier.show(&n).await,
            Err(NotifyError::RegistrationFailed(_))
        ));
        assert_eq!(*notifier.kind.lock().await, NotifierKind::LogOnly);
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    #[test]
    fn tags_map_to_stable_replace_ids() {
        assert_eq!(replace_id("morning-stock"), 2001);
        assert_eq!(replace_id("evening-volume"), 2002);
    }
}
