//! Connect command - follow the server's event stream.

use std::sync::Arc;

use console::style;

use vd_core::config::{AppConfig, ConfigHandle};
use vd_core::constants;
use vd_core::error::VdResult;
use vd_services::{Alerts, DesktopAlerts, DownloadAlertTrigger};
use vd_stream::{
    ConnectionState, Dispatcher, DownloadCompletePayload, MessageCallback, StreamEventType,
    StreamManager, SubscriptionRegistry,
};

/// Run the connect command.
pub async fn run(config: ConfigHandle, address: Option<String>, save_config: bool) -> VdResult<()> {
    // Determine address: arg > config > dev default
    let addr = if let Some(a) = address {
        a
    } else {
        let current = config.read().await.server.address.clone();
        if current.is_empty() {
            println!(
                "  {} No server configured, using dev default {}",
                style("NOTE").yellow().bold(),
                constants::DEFAULT_DEV_ADDRESS
            );
            constants::DEFAULT_DEV_ADDRESS.to_string()
        } else {
            current
        }
    };

    // Apply to config
    {
        let mut cfg = config.write().await;
        cfg.server.address = AppConfig::sanitize_server_address(&addr);
    }

    let server_address = config.read().await.server.address.clone();
    println!(
        "{} Connecting to {}...",
        style("[1/3]").bold().dim(),
        server_address
    );
    let ws_url = config.read().await.ws_url()?;

    // Optionally save config to disk
    if save_config {
        let cfg = config.read().await;
        let path = AppConfig::default_config_path()?;
        cfg.save_to_file(&path)?;
        println!("  {} Config saved to {}", style("OK").green(), path.display());
    }

    // Set up the subscription pipeline
    println!(
        "{} Preparing subscriptions...",
        style("[2/3]").bold().dim(),
    );
    let registry = Arc::new(SubscriptionRegistry::new());
    let dispatcher = Dispatcher::new(Arc::clone(&registry));

    let alerts: Arc<dyn Alerts> = Arc::new(DesktopAlerts::from_config(config.clone()).await);
    println!("  Alert permission: {}", alerts.permission());
    let trigger = DownloadAlertTrigger::attach(Arc::clone(&registry), Arc::clone(&alerts));

    // Print finished download batches.
    let batch_printer: MessageCallback = Arc::new(|payload: &serde_json::Value| {
        let batch: DownloadCompletePayload = match serde_json::from_value(payload.clone()) {
            Ok(batch) => batch,
            Err(_) => return,
        };
        println!(
            "  {} {} {} video(s) downloaded",
            style(format!("[{}]", super::timestamp())).cyan(),
            style("complete").green().bold(),
            batch.videos.len()
        );
        for video in &batch.videos {
            println!("      {} - {}", video.channel_name, video.video_name);
        }
    });
    registry.add(
        Arc::new(|m| m.event_type == StreamEventType::DownloadComplete),
        Arc::clone(&batch_printer),
    );

    // Print every other server event as its raw payload.
    let event_printer: MessageCallback = Arc::new(|payload: &serde_json::Value| {
        println!(
            "  {} {}",
            style(format!("[{}]", super::timestamp())).cyan(),
            payload
        );
    });
    registry.add(
        Arc::new(|m| m.event_type != StreamEventType::DownloadComplete),
        Arc::clone(&event_printer),
    );

    // Open the stream
    println!(
        "{} Opening event stream...",
        style("[3/3]").bold().dim(),
    );
    let manager = StreamManager::new(ws_url, dispatcher);
    let mut state_rx = manager.state_receiver();
    manager.start().await?;
    println!(
        "  {} Listening for download events... (Ctrl+C to stop)",
        style("OK").green().bold()
    );
    println!();

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                match state {
                    ConnectionState::Connected => println!(
                        "  {} {}",
                        style("[stream]").cyan(),
                        style("connected").green()
                    ),
                    ConnectionState::PendingRetry => println!(
                        "  {} {} (retry count {})",
                        style("[stream]").cyan(),
                        style("waiting to reconnect").yellow(),
                        manager.retry_count()
                    ),
                    other => println!(
                        "  {} {}",
                        style("[stream]").cyan(),
                        style(other).dim()
                    ),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\n  Shutting down...");
                break;
            }
        }
    }

    trigger.detach();
    registry.remove(&batch_printer);
    registry.remove(&event_printer);
    manager.shutdown().await;

    Ok(())
}
