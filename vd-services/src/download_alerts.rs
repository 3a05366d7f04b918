//! Built-in subscriber that alerts when downloads finish.
//!
//! Attaches to the subscription registry like any external consumer and
//! surfaces a desktop alert whenever a download-complete event carries
//! at least one video.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use vd_core::constants;
use vd_stream::{
    DownloadCompletePayload, MessageCallback, MessageFilter, StreamEventType,
    SubscriptionRegistry,
};

use crate::alerts::{Alert, AlertPermission, Alerts};

/// Subscription that turns download-complete events into desktop alerts.
///
/// Holds the callback it registered so it can remove exactly that
/// subscription later; dropping the trigger detaches it.
pub struct DownloadAlertTrigger {
    registry: Arc<SubscriptionRegistry>,
    callback: MessageCallback,
}

impl DownloadAlertTrigger {
    /// Subscribe to download-complete events on `registry`.
    pub fn attach(registry: Arc<SubscriptionRegistry>, alerts: Arc<dyn Alerts>) -> Self {
        let callback: MessageCallback =
            Arc::new(move |payload: &Value| on_download_complete(&alerts, payload));
        let filter: MessageFilter =
            Arc::new(|message| message.event_type == StreamEventType::DownloadComplete);

        registry.add(filter, Arc::clone(&callback));
        debug!("download alert trigger attached");

        Self { registry, callback }
    }

    /// Remove this trigger's subscription. Safe to call more than once.
    pub fn detach(&self) {
        if self.registry.remove(&self.callback) > 0 {
            debug!("download alert trigger detached");
        }
    }
}

impl Drop for DownloadAlertTrigger {
    fn drop(&mut self) {
        self.detach();
    }
}

fn on_download_complete(alerts: &Arc<dyn Alerts>, payload: &Value) {
    let payload: DownloadCompletePayload = match serde_json::from_value(payload.clone()) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("malformed downloadComplete payload: {e}");
            return;
        }
    };

    let count = payload.videos.len();
    if count == 0 {
        debug!("downloadComplete carried no videos, skipping alert");
        return;
    }

    if !alerts.is_available() {
        debug!("alerts unavailable on this platform, skipping");
        return;
    }

    match alerts.permission() {
        AlertPermission::Granted => show_batch_alert(alerts, count),
        AlertPermission::Denied => {
            debug!("alerts denied, skipping download alert");
        }
        AlertPermission::Default => {
            // Ask without blocking the dispatch cycle; alert only if the
            // user grants.
            let alerts = Arc::clone(alerts);
            tokio::spawn(async move {
                if alerts.request_permission().await == AlertPermission::Granted {
                    show_batch_alert(&alerts, count);
                }
            });
        }
    }
}

fn show_batch_alert(alerts: &Arc<dyn Alerts>, count: usize) {
    let alert = Alert {
        title: constants::APP_NAME.to_string(),
        body: format!("Downloads complete: {count} videos downloaded"),
        icon: constants::ALERT_ICON.to_string(),
    };
    if let Err(e) = alerts.show(&alert) {
        warn!("failed to show download alert: {e}");
    }
}
