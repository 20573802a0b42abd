use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::bridge::{Engine, SimulatedEngine, SocketEngine};

/// Returns the path to the settings file: `~/.config/gaze-bridge/settings.json`
fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("gaze-bridge");
    path.push("settings.json");
    path
}

/// Which engine the bridge talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// External engine process over its local socket
    Socket,
    /// In-process simulated gaze, no hardware needed
    Simulated,
}

/// Persisted bridge settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub engine: EngineKind,
    pub engine_addr: String,
    pub client_name: String,
    pub connect_timeout_ms: u64,
    pub simulated_rate_hz: f64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            engine: EngineKind::Socket,
            engine_addr: "127.0.0.1:4455".to_string(),
            client_name: "gaze-bridge".to_string(),
            connect_timeout_ms: 2000,
            simulated_rate_hz: 60.0,
        }
    }
}

impl BridgeSettings {
    /// Load settings from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        let path = settings_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse settings ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::info!("No settings file found ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Save settings to disk as pretty JSON.
    pub fn save(&self) {
        let path = settings_path();
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create config directory: {}", e);
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    log::warn!("Failed to write settings: {}", e);
                }
            }
            Err(e) => {
                log::warn!("Failed to serialize settings: {}", e);
            }
        }
    }

    /// Build the engine these settings describe
    pub fn build_engine(&self) -> Box<dyn Engine> {
        match self.engine {
            EngineKind::Socket => Box::new(
                SocketEngine::new(self.engine_addr.clone(), self.client_name.clone())
                    .with_connect_timeout(std::time::Duration::from_millis(self.connect_timeout_ms)),
            ),
            EngineKind::Simulated => Box::new(SimulatedEngine::new(self.simulated_rate_hz)),
        }
    }
}
