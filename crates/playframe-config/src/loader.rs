use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use playframe_core::{PlayError, Result};

use crate::schema::{PlannerMode, PlayConfig};

/// Loads and reloads the PlayFrame configuration.
pub struct ConfigLoader {
    config: Arc<RwLock<PlayConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > PLAYFRAME_CONFIG env > ~/.playframe/playframe.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("PLAYFRAME_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".playframe")
            .join("playframe.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            Self::read(&config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            PlayConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(PlayError::Config(e));
            }
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Parse a config file without env overrides or validation.
    pub fn read(path: &Path) -> Result<PlayConfig> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str::<PlayConfig>(&raw).map_err(|e| {
            PlayError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> PlayConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<PlayConfig>> {
        Arc::clone(&self.config)
    }

    /// Path the config was loaded from.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (PLAYFRAME_MODEL, PLAYFRAME_PLANNER, etc.)
    pub fn apply_env_overrides(mut config: PlayConfig) -> PlayConfig {
        if let Ok(v) = std::env::var("PLAYFRAME_MODEL") {
            config.llm.model = v;
        }
        if let Ok(v) = std::env::var("PLAYFRAME_PROVIDER") {
            config.llm.provider = v;
        }
        if let Ok(v) = std::env::var("PLAYFRAME_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("PLAYFRAME_PLANNER") {
            match v.as_str() {
                "none" => config.orchestration.planner = PlannerMode::None,
                "free_form" => config.orchestration.planner = PlannerMode::FreeForm,
                "schema" => config.orchestration.planner = PlannerMode::Schema,
                other => warn!(value = other, "ignoring unknown PLAYFRAME_PLANNER"),
            }
        }
        // API key: config file takes priority, env is the fallback.
        if config.llm.api_key.is_none() {
            if let Ok(v) = std::env::var("OPENAI_API_KEY") {
                config.llm.api_key = Some(v);
            }
        }
        config
    }

    /// Reload the config from disk. An invalid file leaves the current config in place.
    pub fn reload(&self) -> Result<()> {
        if !self.config_path.exists() {
            return Err(PlayError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = Self::apply_env_overrides(Self::read(&self.config_path)?);
        new_config.validate().map_err(PlayError::Config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }
}
