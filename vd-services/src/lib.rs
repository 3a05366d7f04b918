//! Vidarr Services - Built-in consumers of the event stream.
//!
//! This crate provides the service layer that reacts to stream events:
//! - The `Alerts` capability wrapping native desktop notifications,
//!   including the granted/denied/undecided permission model
//! - The download trigger that subscribes for completed batches and
//!   raises one alert per non-empty batch

pub mod alerts;
pub mod download_alerts;

// Re-export key types
pub use alerts::{Alert, AlertPermission, Alerts, DesktopAlerts};
pub use download_alerts::DownloadAlertTrigger;
