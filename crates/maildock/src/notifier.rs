//! Desktop notifications.

use std::sync::{Mutex, PoisonError};

use maildock_core::{NotifyError, Notifier, Permission};
use notify_rust::Notification;
use tracing::info;

/// Shows notifications through the desktop notification service.
///
/// A terminal cannot prompt, so the permission answer comes from the
/// `notifications` setting.
pub struct DesktopNotifier {
    app_name: String,
    allowed: bool,
    permission: Mutex<Permission>,
}

impl DesktopNotifier {
    /// Creates a notifier that has not been granted anything yet.
    pub fn new(app_name: impl Into<String>, allowed: bool) -> Self {
        Self {
            app_name: app_name.into(),
            allowed,
            permission: Mutex::new(Permission::Default),
        }
    }
}

impl Notifier for DesktopNotifier {
    fn permission(&self) -> Permission {
        *self.permission.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request_permission(&self) -> Permission {
        let answer = if self.allowed {
            Permission::Granted
        } else {
            Permission::Denied
        };
        *self.permission.lock().unwrap_or_else(PoisonError::into_inner) = answer;
        info!(?answer, "desktop notifications");
        answer
    }

    fn notify(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        if self.permission() != Permission::Granted {
            return Err(NotifyError::PermissionDenied);
        }
        Notification::new()
            .appname(&self.app_name)
            .summary(title)
            .body(body)
            .show()
            .map(|_| ())
            .map_err(|e| NotifyError::Platform(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_follows_setting() {
        let notifier = DesktopNotifier::new("Maildock", false);
        assert_eq!(notifier.permission(), Permission::Default);
        assert_eq!(notifier.request_permission(), Permission::Denied);
        assert_eq!(
            notifier.notify("New mail", "hi"),
            Err(NotifyError::PermissionDenied)
        );

        let notifier = DesktopNotifier::new("Maildock", true);
        assert_eq!(notifier.request_permission(), Permission::Granted);
    }
}
