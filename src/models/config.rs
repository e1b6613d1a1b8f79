use serde::{Deserialize, Serialize};

/// Editor configuration from `EspDoc Config.yaml`
///
/// Contains working-directory paths, default authorship metadata, and
/// loader tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorConfig {
    #[serde(rename = "EspDoc_Settings")]
    pub settings: EditorSettings,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            settings: EditorSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorSettings {
    /// Working directory the `Data` folder hangs off. Empty means the
    /// process working directory.
    #[serde(rename = "Working Directory", default)]
    pub working_dir: String,

    /// Author written into the header of freshly created plugins.
    #[serde(rename = "Default Author", default)]
    pub default_author: String,

    /// Milliseconds the loader worker pauses between record-group stages so
    /// a UI thread can drain progress events. Zero disables pacing.
    #[serde(rename = "Tick Interval MS", default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(rename = "Debug Mode", default)]
    pub debug_mode: bool,
}

fn default_tick_interval_ms() -> u64 {
    25
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            working_dir: String::new(),
            default_author: String::new(),
            tick_interval_ms: default_tick_interval_ms(),
            debug_mode: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let config = EditorConfig::default();
        assert_eq!(config.settings.tick_interval_ms, 25);
        assert!(!config.settings.debug_mode);
        assert!(config.settings.working_dir.is_empty());
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut config = EditorConfig::default();
        config.settings.default_author = "espdoc".to_string();
        config.settings.tick_interval_ms = 50;

        let yaml = serde_yaml_ng::to_string(&config).unwrap();
        let parsed: EditorConfig = serde_yaml_ng::from_str(&yaml).unwrap();

        assert_eq!(parsed.settings.default_author, "espdoc");
        assert_eq!(parsed.settings.tick_interval_ms, 50);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let yaml = "EspDoc_Settings:\n  Debug Mode: true\n";
        let parsed: EditorConfig = serde_yaml_ng::from_str(yaml).unwrap();

        assert!(parsed.settings.debug_mode);
        assert_eq!(parsed.settings.tick_interval_ms, 25);
    }
}
