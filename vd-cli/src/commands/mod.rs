//! CLI command implementations.

pub mod config;
pub mod connect;
pub mod doctor;

/// Format the current local time for event output.
pub fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
