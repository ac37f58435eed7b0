// Configuration management for the emesh CLI
//
// Cross-platform config stored in:
// - macOS:   ~/.config/embermesh/config.json
// - Linux:   ~/.config/embermesh/config.json
// - Windows: %APPDATA%\embermesh\config.json

use anyhow::{bail, Context, Result};
use embermesh_core::OperatingMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node identity broadcast to peers
    pub node_id: String,

    /// Transport MTU in bytes; payloads above this fragment
    pub mtu: usize,

    /// Operating mode the node starts in
    pub mode: String,

    /// Outbound priority queue capacity
    pub queue_capacity: usize,

    /// Starting ttl for originated messages
    pub default_ttl: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: format!("node-{}", uuid_suffix()),
            mtu: 512,
            mode: "daily".to_string(),
            queue_capacity: 200,
            default_ttl: 8,
        }
    }
}

fn uuid_suffix() -> String {
    use rand::Rng;
    let n: u32 = rand::thread_rng().gen();
    format!("{n:08x}")
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("embermesh");

        std::fs::create_dir_all(&config_dir)
            .context("Failed to create config directory")?;

        Ok(config_dir)
    }

    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from file, or create default if not exists
    pub fn load() -> Result<Self> {
        let config_file = Self::config_file()?;

        if config_file.exists() {
            let contents = std::fs::read_to_string(&config_file)
                .context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_file = Self::config_file()?;
        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_file, contents).context("Failed to write config file")?;
        Ok(())
    }

    pub fn operating_mode(&self) -> Result<OperatingMode> {
        match self.mode.as_str() {
            "daily" => Ok(OperatingMode::Daily),
            "emergency" => Ok(OperatingMode::Emergency),
            other => bail!("unknown mode '{other}' (expected daily|emergency)"),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.apply(key, value)?;
        self.save()
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "node_id" => self.node_id = value.to_string(),
            "mtu" => self.mtu = value.parse().context("mtu must be an integer")?,
            "mode" => {
                if value != "daily" && value != "emergency" {
                    bail!("mode must be daily or emergency");
                }
                self.mode = value.to_string();
            }
            "queue_capacity" => {
                self.queue_capacity = value.parse().context("queue_capacity must be an integer")?
            }
            "default_ttl" => {
                self.default_ttl = value.parse().context("default_ttl must be 0-255")?
            }
            other => bail!("unknown config key '{other}'"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.mtu, 512);
        assert_eq!(config.mode, "daily");
        assert_eq!(config.queue_capacity, 200);
        assert_eq!(config.default_ttl, 8);
        assert!(config.node_id.starts_with("node-"));
    }

    #[test]
    fn test_operating_mode_parses_stored_mode() {
        let mut config = Config::default();
        assert_eq!(config.operating_mode().unwrap(), OperatingMode::Daily);

        config.apply("mode", "emergency").unwrap();
        assert_eq!(config.operating_mode().unwrap(), OperatingMode::Emergency);

        config.mode = "panic".to_string();
        assert!(config.operating_mode().is_err());
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.apply("mode", "loud").is_err());
        assert!(config.apply("mtu", "not-a-number").is_err());
        assert!(config.apply("no_such_key", "1").is_err());

        config.apply("mtu", "256").unwrap();
        config.apply("default_ttl", "4").unwrap();
        assert_eq!(config.mtu, 256);
        assert_eq!(config.default_ttl, 4);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config.mtu, deserialized.mtu);
        assert_eq!(config.mode, deserialized.mode);
    }
}
