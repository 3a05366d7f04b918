//! Desktop alert capability.
//!
//! Wraps the native notification surface behind the `Alerts` trait so
//! consumers can be exercised without a desktop session. Permission
//! mirrors the notifications config: an explicit enable means granted,
//! an explicit disable means denied, and an absent flag means the user
//! has not decided yet.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::info;

#[allow(unused_imports)]
use vd_core::error::VdError;
use vd_core::error::VdResult;
use vd_core::config::ConfigHandle;

/// Permission state for surfacing alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertPermission {
    /// Alerts may be shown.
    Granted,
    /// The user declined alerts.
    Denied,
    /// The user has not been asked yet.
    Default,
}

impl std::fmt::Display for AlertPermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertPermission::Granted => "granted",
            AlertPermission::Denied => "denied",
            AlertPermission::Default => "default",
        };
        write!(f, "{s}")
    }
}

/// A user-facing alert.
#[derive(Debug, Clone)]
pub struct Alert {
    /// Alert title.
    pub title: String,
    /// Alert body text.
    pub body: String,
    /// Freedesktop icon name.
    pub icon: String,
}

/// Platform alerting capability.
///
/// `permission` and `show` are synchronous so subscription callbacks
/// can call them inline; asking the user is the only asynchronous
/// operation.
#[async_trait]
pub trait Alerts: Send + Sync {
    /// Whether this platform can surface alerts at all.
    fn is_available(&self) -> bool;

    /// Current permission state.
    fn permission(&self) -> AlertPermission;

    /// Ask the user for permission. Resolves to the new state, which is
    /// final for undecided users and unchanged for everyone else.
    async fn request_permission(&self) -> AlertPermission;

    /// Surface an alert.
    fn show(&self, alert: &Alert) -> VdResult<()>;
}

/// Desktop implementation over the native notification service.
pub struct DesktopAlerts {
    config: ConfigHandle,
    /// Cached permission so callbacks can read it without touching the
    /// async config lock.
    permission: Mutex<AlertPermission>,
}

impl DesktopAlerts {
    /// Build from the current notifications config.
    pub async fn from_config(config: ConfigHandle) -> Self {
        let permission = permission_from_flag(config.read().await.notifications.enabled);
        Self {
            config,
            permission: Mutex::new(permission),
        }
    }

    fn current(&self) -> AlertPermission {
        *self
            .permission
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Map the tri-state config flag onto a permission.
fn permission_from_flag(enabled: Option<bool>) -> AlertPermission {
    match enabled {
        Some(true) => AlertPermission::Granted,
        Some(false) => AlertPermission::Denied,
        None => AlertPermission::Default,
    }
}

#[async_trait]
impl Alerts for DesktopAlerts {
    fn is_available(&self) -> bool {
        cfg!(any(target_os = "linux", target_os = "macos", target_os = "windows"))
    }

    fn permission(&self) -> AlertPermission {
        self.current()
    }

    async fn request_permission(&self) -> AlertPermission {
        let current = self.current();
        if current != AlertPermission::Default {
            return current;
        }

        // Desktop sessions have no runtime permission prompt; first use
        // records a grant so the decision survives restarts.
        {
            let mut config = self.config.write().await;
            config.notifications.enabled = Some(true);
        }
        *self
            .permission
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = AlertPermission::Granted;

        #[cfg(not(test))]
        if let Err(e) = self.config.save().await {
            tracing::warn!("failed to persist alert permission: {e}");
        }

        info!("alert permission granted");
        AlertPermission::Granted
    }

    fn show(&self, alert: &Alert) -> VdResult<()> {
        #[cfg(not(test))]
        {
            notify_rust::Notification::new()
                .summary(&alert.title)
                .body(&alert.body)
                .icon(&alert.icon)
                .appname(vd_core::constants::APP_NAME)
                .show()
                .map_err(|e| VdError::Notification(e.to_string()))?;
        }

        let _ = alert;
        Ok(())
    }
}
