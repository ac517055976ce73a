use serde::Deserialize;
use std::path::Path;

use crate::config::rules::GameRules;
use crate::season::SeasonSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Delay between engine ticks at 1x speed.
    #[serde(default = "default_base_tick_ms")]
    pub base_tick_ms: u64,
    #[serde(default = "default_snapshot_directory")]
    pub snapshot_directory: String,
    /// Engine ticks between automatic snapshots.
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval: u32,
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: u32,
    #[serde(default = "default_websocket_port")]
    pub websocket_port: u16,
    #[serde(default = "default_websocket_bind")]
    pub websocket_bind: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Delay per revealed vote while a reveal phase is running headless.
    #[serde(default = "default_reveal_step_ms")]
    pub reveal_step_ms: u64,
    #[serde(default)]
    pub narration: NarrationConfig,
    #[serde(default)]
    pub season: SeasonSettings,
    #[serde(default)]
    pub rules: GameRules,
}

/// Which narrative collaborator the driver talks to.
#[derive(Debug, Clone, Deserialize)]
pub struct NarrationConfig {
    /// "template" (offline) or "llm" (OpenAI-compatible server).
    #[serde(default = "default_narration_mode")]
    pub mode: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        NarrationConfig {
            mode: default_narration_mode(),
            base_url: default_base_url(),
            model: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_tick_ms() -> u64 {
    1000
}
fn default_snapshot_directory() -> String {
    "./snapshots".to_string()
}
fn default_snapshot_interval() -> u32 {
    50
}
fn default_max_snapshots() -> u32 {
    10
}
fn default_websocket_port() -> u16 {
    8118
}
fn default_websocket_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_reveal_step_ms() -> u64 {
    800
}
fn default_narration_mode() -> String {
    "template".to_string()
}
fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}
fn default_max_tokens() -> u32 {
    256
}
fn default_temperature() -> f32 {
    0.8
}
fn default_timeout_secs() -> u64 {
    30
}

impl SimulationConfig {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        Self::from_toml_str(&content, path)
    }

    pub fn from_toml_str(content: &str, source_path: &Path) -> Result<Self, String> {
        let config: SimulationConfig =
            toml::from_str(content).map_err(|e| format!("{}: {}", source_path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        if self.base_tick_ms == 0 {
            errors.push(
                "base_tick_ms must be > 0, got 0. Example: base_tick_ms = 1000".to_string(),
            );
        }

        if self.snapshot_interval == 0 {
            errors.push(
                "snapshot_interval must be > 0, got 0. Example: snapshot_interval = 50".to_string(),
            );
        }

        if self.max_snapshots == 0 {
            errors.push(format!(
                "max_snapshots must be > 0, got {}. Example: max_snapshots = 10",
                self.max_snapshots
            ));
        }

        if !(1024..=65535).contains(&self.websocket_port) {
            errors.push(format!(
                "websocket_port must be 1024-65535, got {}. Example: websocket_port = 8118",
                self.websocket_port
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            errors.push(format!(
                "log_level must be one of {:?}, got '{}'. Example: log_level = \"info\"",
                valid_levels, self.log_level
            ));
        }

        let valid_modes = ["template", "llm"];
        if !valid_modes.contains(&self.narration.mode.as_str()) {
            errors.push(format!(
                "narration.mode must be one of {:?}, got '{}'. Example: mode = \"template\"",
                valid_modes, self.narration.mode
            ));
        }

        if self.narration.timeout_secs == 0 {
            errors.push("narration.timeout_secs must be > 0, got 0".to_string());
        }

        if let Err(e) = self.rules.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("\n"))
        }
    }
}
