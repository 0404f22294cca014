//! # Configuration Management Module
//!
//! TOML configuration for the claim engine and its CLI.
//!
//! ## Configuration Structure
//!
//! - [`ClaimsConfig`] - Global switch, spawn claimant, limits, cache timeout
//! - [`WorldConfig`] - Border, protected zones, vertical range
//! - [`FeaturesConfig`] - Protection features that own claim settings
//! - [`StorageConfig`] - Data directory for the sled database
//! - [`LoggingConfig`] - Log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use landclaim::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("landclaim.toml").await?;
//!     config.validate()?;
//!     println!("Data dir: {}", config.storage.data_dir);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [claims]
//! enabled = true
//! spawn_claimant = "00000000-0000-0000-0000-000000000000"
//! default_chunk_limit = 64
//! default_town_chunk_limit = 256
//! idle_timeout_secs = 300
//! require_contiguous = false
//!
//! [world]
//! border_radius = 1875000
//! min_y = -64
//!
//! [[world.protected_zones]]
//! min = { x = -4, z = -4 }
//! max = { x = 4, z = 4 }
//!
//! [features]
//! grief_protection = true
//! fire_protection = true
//! combat_protection = true
//!
//! [storage]
//! data_dir = "./data"
//!
//! [logging]
//! level = "info"
//! file = "landclaim.log"
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use uuid::Uuid;

use crate::claims::cache::{CacheSettings, FeatureFlags};
use crate::claims::types::{Feature, DEFAULT_MIN_Y};
use crate::claims::world::{CellRect, MemoryWorld};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimsConfig {
    /// Master switch. When false, town lookups report nothing.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Claimant that owns spawn; exempt from protected zones and town priority.
    #[serde(default = "Uuid::nil")]
    pub spawn_claimant: Uuid,
    #[serde(default = "default_chunk_limit")]
    pub default_chunk_limit: u32,
    #[serde(default = "default_town_chunk_limit")]
    pub default_town_chunk_limit: u32,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// New player claims must touch an existing claim of the same player.
    #[serde(default)]
    pub require_contiguous: bool,
}

fn default_true() -> bool {
    true
}

fn default_chunk_limit() -> u32 {
    64
}

fn default_town_chunk_limit() -> u32 {
    256
}

fn default_idle_timeout_secs() -> u64 {
    300
}

impl Default for ClaimsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            spawn_claimant: Uuid::nil(),
            default_chunk_limit: default_chunk_limit(),
            default_town_chunk_limit: default_town_chunk_limit(),
            idle_timeout_secs: default_idle_timeout_secs(),
            require_contiguous: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Cells further than this from the origin on either axis are outside
    /// the border. `None` means unbounded.
    #[serde(default)]
    pub border_radius: Option<i32>,
    #[serde(default)]
    pub protected_zones: Vec<CellRect>,
    #[serde(default = "default_min_y")]
    pub min_y: i32,
}

fn default_min_y() -> i32 {
    DEFAULT_MIN_Y
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            border_radius: None,
            protected_zones: Vec::new(),
            min_y: DEFAULT_MIN_Y,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_true")]
    pub grief_protection: bool,
    #[serde(default = "default_true")]
    pub fire_protection: bool,
    #[serde(default = "default_true")]
    pub combat_protection: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            grief_protection: true,
            fire_protection: true,
            combat_protection: true,
        }
    }
}

impl FeaturesConfig {
    /// Push the configured toggles into the runtime flags.
    pub fn apply(&self, flags: &FeatureFlags) {
        flags.set_enabled(Feature::GriefProtection, self.grief_protection);
        flags.set_enabled(Feature::FireProtection, self.fire_protection);
        flags.set_enabled(Feature::CombatProtection, self.combat_protection);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub claims: ClaimsConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.storage.data_dir.trim().is_empty() {
            return Err(anyhow!("storage.data_dir must not be empty"));
        }
        if let Some(radius) = self.world.border_radius {
            if radius < 0 {
                return Err(anyhow!("world.border_radius must be >= 0, got {}", radius));
            }
        }
        if self.claims.idle_timeout_secs == 0 {
            return Err(anyhow!("claims.idle_timeout_secs must be > 0"));
        }
        for (i, zone) in self.world.protected_zones.iter().enumerate() {
            if zone.min.x > zone.max.x || zone.min.z > zone.max.z {
                return Err(anyhow!(
                    "world.protected_zones[{}] has min {} beyond max {}",
                    i,
                    zone.min,
                    zone.max
                ));
            }
        }
        match self.logging.level.to_ascii_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" | "off" => Ok(()),
            other => Err(anyhow!("logging.level '{}' is not a log level", other)),
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            claims_enabled: self.claims.enabled,
            spawn_id: self.claims.spawn_claimant,
            default_chunk_limit: self.claims.default_chunk_limit,
            default_town_chunk_limit: self.claims.default_town_chunk_limit,
            idle_timeout: Duration::from_secs(self.claims.idle_timeout_secs),
        }
    }

    /// Empty world carrying the configured border, zones and rules.
    pub fn build_world(&self) -> MemoryWorld {
        let mut world = MemoryWorld::new()
            .with_contiguity(self.claims.require_contiguous)
            .with_min_y(self.world.min_y);
        if let Some(radius) = self.world.border_radius {
            world = world.with_border(radius);
        }
        for zone in &self.world.protected_zones {
            world = world.with_protected_zone(*zone);
        }
        world
    }

    /// Location of the claim database inside the data directory.
    pub fn claims_db_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_dir).join("claims")
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            claims: ClaimsConfig::default(),
            world: WorldConfig::default(),
            features: FeaturesConfig::default(),
            storage: StorageConfig {
                data_dir: "./data".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("landclaim.log".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::types::CellCoord;
    use crate::claims::world::CellOwnershipSource;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.claims.enabled);
        assert_eq!(config.world.min_y, -64);
    }

    #[test]
    fn test_sections_fall_back_to_defaults() {
        let toml = r#"
            [storage]
            data_dir = "/tmp/claims"

            [logging]
            level = "debug"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.claims.default_chunk_limit, 64);
        assert_eq!(config.claims.spawn_claimant, Uuid::nil());
        assert!(config.features.fire_protection);
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = Config::default();
        config.world.border_radius = Some(-1);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.world.protected_zones.push(CellRect {
            min: CellCoord::new(5, 0),
            max: CellCoord::new(0, 0),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_build_world_applies_rules() {
        let mut config = Config::default();
        config.world.border_radius = Some(8);
        config
            .world
            .protected_zones
            .push(CellRect::new(CellCoord::new(0, 0), CellCoord::new(1, 1)));
        let world = config.build_world();
        assert!(!world.in_border(CellCoord::new(9, 0)));
        assert!(world.is_protected(CellCoord::new(1, 0)));
    }

    #[test]
    fn test_cache_settings_follow_config() {
        let mut config = Config::default();
        config.claims.idle_timeout_secs = 42;
        config.claims.enabled = false;
        let settings = config.cache_settings();
        assert_eq!(settings.idle_timeout, Duration::from_secs(42));
        assert!(!settings.claims_enabled);
    }
}
