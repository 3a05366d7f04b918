//! Doctor command - check the local environment and server reachability.

use std::time::Duration;

use console::style;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::OutputFormat;
use vd_core::config::{AppConfig, ConfigHandle};
use vd_core::error::VdResult;
use vd_core::platform::Platform;

/// Extract the host:port authority from a URL for a raw TCP probe.
fn authority_of(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = rest.split(|c| c == '/' || c == '?').next().unwrap_or("");
    if authority.is_empty() {
        return None;
    }
    if authority.contains(':') {
        Some(authority.to_string())
    } else {
        let port = if url.starts_with("https://") || url.starts_with("wss://") {
            443
        } else {
            80
        };
        Some(format!("{authority}:{port}"))
    }
}

/// Run the doctor command.
pub async fn run(config: ConfigHandle, format: OutputFormat) -> VdResult<()> {
    let cfg = config.read().await;

    let platform = Platform::current();
    let config_path = AppConfig::default_config_path()?;
    let data_dir = Platform::data_dir()?;
    let log_dir = cfg.effective_log_dir()?;
    let address = cfg.server.address.clone();
    let ws_url = cfg.ws_url().ok();
    let alerts_flag = cfg.notifications.enabled;
    drop(cfg);

    // Probe the server with a raw TCP connect
    let (reachable, latency_ms) = match authority_of(&address) {
        Some(authority) => {
            let start = std::time::Instant::now();
            let connected = matches!(
                timeout(Duration::from_secs(3), TcpStream::connect(&authority)).await,
                Ok(Ok(_))
            );
            (Some(connected), start.elapsed().as_millis())
        }
        None => (None, 0),
    };

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "platform": platform.name(),
                "config_path": config_path.display().to_string(),
                "config_exists": config_path.exists(),
                "data_dir": data_dir.display().to_string(),
                "log_dir": log_dir.display().to_string(),
                "server_address": address,
                "ws_url": ws_url,
                "server_reachable": reachable,
                "latency_ms": latency_ms,
                "alerts_enabled": alerts_flag,
            });
            println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        }
        OutputFormat::Text => {
            println!("{}", style("Environment").bold().underlined());
            println!("  Platform:    {}", platform);
            println!(
                "  Config:      {} ({})",
                config_path.display(),
                if config_path.exists() { "present" } else { "missing" }
            );
            println!("  Data dir:    {}", data_dir.display());
            println!("  Log dir:     {}", log_dir.display());

            println!();
            println!("{}", style("Server").bold().underlined());
            if address.is_empty() {
                println!("  Address:     {}", style("not configured").yellow());
            } else {
                println!("  Address:     {}", address);
                if let Some(ref url) = ws_url {
                    println!("  Stream URL:  {}", url);
                }
                match reachable {
                    Some(true) => {
                        println!("  Reachable:   {} ({}ms)", style("yes").green(), latency_ms)
                    }
                    Some(false) => println!("  Reachable:   {}", style("no").red()),
                    None => {}
                }
            }

            println!();
            println!("{}", style("Notifications").bold().underlined());
            println!(
                "  Alerts:      {}",
                match alerts_flag {
                    Some(true) => style("enabled").green().to_string(),
                    Some(false) => style("disabled").red().to_string(),
                    None => style("not decided").yellow().to_string(),
                }
            );
        }
    }

    Ok(())
}
