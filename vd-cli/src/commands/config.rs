//! Config commands.

use clap::Subcommand;
use console::style;

use crate::OutputFormat;
use vd_core::config::{AppConfig, ConfigHandle};
use vd_core::error::VdResult;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show all configuration values.
    Show,
    /// Get a specific value by key path.
    Get {
        /// Config key path (e.g., "server.address", "logging.level").
        key: String,
    },
    /// Set a specific value by key path.
    Set {
        /// Config key path (e.g., "server.address", "logging.level").
        key: String,
        /// New value.
        value: String,
    },
    /// Print the config file path.
    Path,
}

/// Render the tri-state notifications flag.
fn flag_to_string(enabled: Option<bool>) -> String {
    match enabled {
        Some(true) => "true".to_string(),
        Some(false) => "false".to_string(),
        None => "unset".to_string(),
    }
}

/// Resolve a dot-separated key path to a value from the config.
fn get_config_value(cfg: &AppConfig, key: &str) -> Option<String> {
    match key {
        "server.address" => Some(cfg.server.address.clone()),
        "logging.level" | "log.level" => Some(cfg.logging.level.clone()),
        "logging.directory" => Some(cfg.logging.directory.clone()),
        "logging.json_output" => Some(cfg.logging.json_output.to_string()),
        "notifications.enabled" => Some(flag_to_string(cfg.notifications.enabled)),
        _ => None,
    }
}

/// Apply a value to a dot-separated key path on the config.
fn set_config_value(cfg: &mut AppConfig, key: &str, value: &str) -> Result<(), String> {
    match key {
        "server.address" => {
            cfg.server.address = AppConfig::sanitize_server_address(value);
        }
        "logging.level" | "log.level" => {
            let v = value.to_lowercase();
            if !["trace", "debug", "info", "warn", "error"].contains(&v.as_str()) {
                return Err("expected one of: trace, debug, info, warn, error".to_string());
            }
            cfg.logging.level = v;
        }
        "logging.directory" => {
            cfg.logging.directory = value.to_string();
        }
        "logging.json_output" => {
            cfg.logging.json_output = value.parse().map_err(|_| "expected true/false".to_string())?;
        }
        "notifications.enabled" => {
            cfg.notifications.enabled = if value.eq_ignore_ascii_case("unset") {
                None
            } else {
                Some(value.parse().map_err(|_| "expected true/false/unset".to_string())?)
            };
        }
        _ => {
            return Err(format!("unknown config key: {key}"));
        }
    }
    Ok(())
}

fn print_config_text(cfg: &AppConfig) {
    println!("{}", style("Server").bold().underlined());
    println!("  server.address          {}", cfg.server.address);

    println!();
    println!("{}", style("Logging").bold().underlined());
    println!("  logging.level           {}", cfg.logging.level);
    println!("  logging.directory       {}", cfg.logging.directory);
    println!("  logging.json_output     {}", cfg.logging.json_output);

    println!();
    println!("{}", style("Notifications").bold().underlined());
    println!(
        "  notifications.enabled   {}",
        flag_to_string(cfg.notifications.enabled)
    );
}

fn config_json(cfg: &AppConfig) -> serde_json::Value {
    serde_json::json!({
        "server": {
            "address": cfg.server.address,
        },
        "logging": {
            "level": cfg.logging.level,
            "directory": cfg.logging.directory,
            "json_output": cfg.logging.json_output,
        },
        "notifications": {
            "enabled": cfg.notifications.enabled,
        },
    })
}

pub async fn run(config: ConfigHandle, action: ConfigAction, format: OutputFormat) -> VdResult<()> {
    match action {
        ConfigAction::Show => {
            let cfg = config.read().await;
            match format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&config_json(&cfg)).unwrap_or_default()
                    );
                }
                OutputFormat::Text => {
                    print_config_text(&cfg);
                }
            }
        }
        ConfigAction::Get { key } => {
            let cfg = config.read().await;
            match get_config_value(&cfg, &key) {
                Some(value) => match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::json!({ "key": key, "value": value }));
                    }
                    OutputFormat::Text => {
                        println!("{} = {}", key, value);
                    }
                },
                None => {
                    println!(
                        "{} Unknown config key: {}",
                        style("ERROR").red().bold(),
                        key
                    );
                    println!("  Use `vidarr config show` to see available keys.");
                }
            }
        }
        ConfigAction::Set { key, value } => {
            {
                let mut cfg = config.write().await;
                match set_config_value(&mut cfg, &key, &value) {
                    Ok(()) => {}
                    Err(e) => {
                        println!(
                            "{} Failed to set {}: {}",
                            style("ERROR").red().bold(),
                            key,
                            e
                        );
                        return Ok(());
                    }
                }
            }
            // Save to disk
            let cfg = config.read().await;
            let path = AppConfig::default_config_path()?;
            cfg.save_to_file(&path)?;

            match format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::json!({ "key": key, "value": value, "saved": true })
                    );
                }
                OutputFormat::Text => {
                    println!("{} {} = {}", style("SET").green().bold(), key, value);
                }
            }
        }
        ConfigAction::Path => {
            let path = AppConfig::default_config_path()?;
            match format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::json!({
                            "path": path.display().to_string(),
                            "exists": path.exists(),
                        })
                    );
                }
                OutputFormat::Text => {
                    println!("{}", path.display());
                }
            }
        }
    }

    Ok(())
}
