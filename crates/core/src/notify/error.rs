use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The surface is not allowed to show notifications.
    PermissionDenied,
    /// The backend could not be reached or rejected the notification.
    RegistrationFailed(String),
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::PermissionDenied => write!(f, "notification permission denied"),
            NotifyError::RegistrationFailed(detail) => {
                write!(f, "notification backend registration failed: {detail}")
            }
        }
    }
}

impl std::error::Error for NotifyError {}
