//! Configuration management for IRToy GW
//!
//! Handles loading and parsing of the YAML daemon configuration. Button
//! dictionaries and keymaps live in their own control files (see
//! `control_file`), referenced from here.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Serial device of the IR Toy. A `*` tries digits 0-9 in its place.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// TCP port for the runtime command protocol.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_port: Option<u16>,
    /// Control files holding `button` and `keymap` entries.
    #[serde(default)]
    pub controls: Vec<PathBuf>,
    /// File receiving one `key ... { widths }` line per received packet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_log: Option<PathBuf>,
    /// Label used in the capture log for unrecognized packets.
    #[serde(default = "default_unknown_label")]
    pub unknown_label: String,
    /// uinput device for synthetic key injection (Linux).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uinput_device: Option<String>,
    /// Shell command template for scripted keypresses; `{key}` is replaced
    /// with the key name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_script_template: Option<String>,
    /// Outbound remote-control peers, dialed on startup and re-dialed once
    /// per second while absent.
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,
    #[serde(default)]
    pub tuning: Tuning,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device: None,
            command_port: None,
            controls: Vec::new(),
            capture_log: None,
            unknown_label: default_unknown_label(),
            uinput_device: None,
            key_script_template: None,
            remotes: Vec::new(),
            tuning: Tuning::default(),
        }
    }
}

/// A named remote-control text-protocol peer (media frontend, player, ...).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
}

/// Timing and matching tunables, passed into decoder/dictionary/debounce
/// construction instead of living in process-wide globals.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Tuning {
    /// An off pulse longer than this multiple of the previous pulse is an
    /// inter-packet gap...
    pub gap_multiplier: u32,
    /// ...provided it also reaches this absolute width. Short pulses make
    /// the ratio test fire on ordinary trailers.
    pub min_gap_width: u16,
    /// Per-pulse and total-width tolerance for shape matching.
    pub jitter: u16,
    /// Receiver silence after which a partial packet is flushed.
    pub packet_timeout_ms: u64,
    /// Base debounce interval for repeated keypresses.
    pub debounce_ms: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            gap_multiplier: 8,
            min_gap_width: 64,
            jitter: 3,
            packet_timeout_ms: 100,
            debounce_ms: 250,
        }
    }
}

impl Tuning {
    pub fn packet_timeout(&self) -> Duration {
        Duration::from_millis(self.packet_timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_unknown_label() -> String {
    "UNKNOWN".to_string()
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}
