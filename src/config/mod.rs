use crate::models::EditorConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Known working-directory paths, set once before any load or save.
///
/// Immutable value object: file names handed to the mediator are resolved
/// against the data directory, which hangs off the working directory the way
/// the game engine lays its files out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePaths {
    working_dir: Utf8PathBuf,
    data_dir: Utf8PathBuf,
}

impl FilePaths {
    /// Paths rooted at `working_dir`, with the conventional `Data` subfolder.
    pub fn new(working_dir: impl AsRef<Utf8Path>) -> Self {
        let working_dir = working_dir.as_ref().to_path_buf();
        let data_dir = working_dir.join("Data");
        Self {
            working_dir,
            data_dir,
        }
    }

    /// Paths with an explicit data directory.
    pub fn with_data_dir(
        working_dir: impl AsRef<Utf8Path>,
        data_dir: impl AsRef<Utf8Path>,
    ) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn working_dir(&self) -> &Utf8Path {
        &self.working_dir
    }

    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }
}

/// Configuration manager for loading and saving the YAML settings file.
///
/// Manages `EspDoc Config.yaml` in the configuration directory; a missing
/// file yields defaults with a warning rather than an error.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {config_dir}"))?;
        }

        Ok(Self {
            config_path: config_dir.join("EspDoc Config.yaml"),
            config_dir,
        })
    }

    /// Load the editor configuration, or defaults if the file doesn't exist.
    pub fn load_config(&self) -> Result<EditorConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
            return Ok(EditorConfig::default());
        }

        let file_contents = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: EditorConfig = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        tracing::info!("Loaded config from {}", self.config_path);
        Ok(config)
    }

    /// Save the editor configuration.
    pub fn save_config(&self, config: &EditorConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}
