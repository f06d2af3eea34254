use crate::appearance::{Appearance, ReadingStyle, ThemeName};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CURRENT_VERSION: u32 = 2;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "reading-session";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Settle period before a text selection becomes a highlight candidate.
    #[serde(default = "default_selection_debounce_ms")]
    pub selection_debounce_ms: u64,

    /// Minimum spacing between wheel-driven page turns.
    #[serde(default = "default_wheel_throttle_ms")]
    pub wheel_throttle_ms: u64,

    #[serde(default = "default_highlight_color")]
    pub default_highlight_color: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub theme: ThemeName,

    #[serde(default = "default_line_height")]
    pub line_height: f64,

    #[serde(default = "default_true")]
    pub justify: bool,

    #[serde(default = "default_true")]
    pub hyphenate: bool,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_selection_debounce_ms() -> u64 {
    300
}

fn default_wheel_throttle_ms() -> u64 {
    50
}

fn default_highlight_color() -> String {
    "yellow".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_line_height() -> f64 {
    ReadingStyle::default().line_height
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            selection_debounce_ms: default_selection_debounce_ms(),
            wheel_throttle_ms: default_wheel_throttle_ms(),
            default_highlight_color: default_highlight_color(),
            log_level: default_log_level(),
            theme: ThemeName::default(),
            line_height: default_line_height(),
            justify: true,
            hyphenate: true,
        }
    }
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
    }

    /// Loads the settings file at the default location, writing one with
    /// defaults if none exists. Failures fall back to defaults.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            warn!("Could not determine config directory, using default settings");
            return Self::default();
        };
        if !path.exists() {
            info!("Settings file not found, creating with defaults at {path:?}");
            let settings = Self::default();
            if let Err(e) = settings.save_to_path(&path) {
                warn!("{e:#}");
            }
            return settings;
        }
        match Self::load_from_path(&path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("{e:#}; using default settings");
                Self::default()
            }
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {path:?}"))?;
        let mut settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {path:?}"))?;
        debug!("Loaded settings from {path:?}");

        if settings.version < CURRENT_VERSION {
            settings.migrate();
            settings.save_to_path(path)?;
        }
        Ok(settings)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory {parent:?}"))?;
            }
        }
        fs::write(path, self.to_yaml())
            .with_context(|| format!("Failed to save settings to {path:?}"))?;
        debug!("Saved settings to {path:?}");
        Ok(())
    }

    fn migrate(&mut self) {
        info!(
            "Migrating settings from v{} to v{}",
            self.version, CURRENT_VERSION
        );
        // v2: theme and reading style. Serde already filled the defaults.
        if self.version < 2 {
            debug!("Adding appearance settings ({})", self.theme.name());
        }
        self.version = CURRENT_VERSION;
    }

    pub fn reading_style(&self) -> ReadingStyle {
        let line_height = if self.line_height.is_finite() && self.line_height > 0.0 {
            self.line_height
        } else {
            warn!("Invalid line_height {}, using default", self.line_height);
            default_line_height()
        };
        ReadingStyle {
            line_height,
            justify: self.justify,
            hyphenate: self.hyphenate,
        }
    }

    pub fn appearance(&self) -> Appearance {
        Appearance::new(self.theme, self.reading_style())
    }

    pub fn selection_debounce(&self) -> Duration {
        Duration::from_millis(self.selection_debounce_ms)
    }

    pub fn wheel_throttle(&self) -> Duration {
        Duration::from_millis(self.wheel_throttle_ms)
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or_else(|_| {
            warn!("Unknown log level {:?}, using info", self.log_level);
            log::LevelFilter::Info
        })
    }

    fn to_yaml(&self) -> String {
        let mut content = String::new();
        content.push_str(SETTINGS_HEADER);
        content.push_str(&format!("version: {}\n", self.version));
        content.push_str(&format!(
            "selection_debounce_ms: {}\n",
            self.selection_debounce_ms
        ));
        content.push_str(&format!("wheel_throttle_ms: {}\n", self.wheel_throttle_ms));
        content.push_str(&format!(
            "default_highlight_color: \"{}\"\n",
            self.default_highlight_color
        ));
        content.push_str(&format!("log_level: \"{}\"\n", self.log_level));
        content.push_str(&format!("theme: {}\n", self.theme.name()));
        content.push_str(&format!("line_height: {}\n", self.line_height));
        content.push_str(&format!("justify: {}\n", self.justify));
        content.push_str(&format!("hyphenate: {}\n", self.hyphenate));
        content
    }
}

const SETTINGS_HEADER: &str = r#"# ============================================================================
# Reading session settings
# ============================================================================
# Timings are in milliseconds. Highlight colors are any CSS color.
# log_level is one of: off, error, warn, info, debug, trace
# theme is one of: light, dark, cupcake, retro, dim, coffee

"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_fields_take_defaults() {
        let settings: Settings = serde_yaml::from_str("wheel_throttle_ms: 80\n").unwrap();
        assert_eq!(settings.wheel_throttle_ms, 80);
        assert_eq!(settings.selection_debounce_ms, 300);
        assert_eq!(settings.default_highlight_color, "yellow");
        assert_eq!(settings.version, CURRENT_VERSION);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILENAME);
        let settings = Settings {
            default_highlight_color: "#ffcc00".to_string(),
            log_level: "debug".to_string(),
            ..Settings::default()
        };

        settings.save_to_path(&path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# ====="));

        let loaded = Settings::load_from_path(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.log_level_filter(), log::LevelFilter::Debug);
    }

    #[test]
    fn test_old_version_is_migrated_and_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "version: 0\nselection_debounce_ms: 250\n").unwrap();

        let loaded = Settings::load_from_path(&path).unwrap();
        assert_eq!(loaded.version, CURRENT_VERSION);
        assert_eq!(loaded.selection_debounce(), Duration::from_millis(250));

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains(&format!("version: {CURRENT_VERSION}")));
    }

    #[test]
    fn test_unparseable_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "selection_debounce_ms: [").unwrap();
        let err = Settings::load_from_path(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse settings file"));
    }

    #[test]
    fn test_v1_file_gains_appearance_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "version: 1\nwheel_throttle_ms: 40\n").unwrap();

        let loaded = Settings::load_from_path(&path).unwrap();
        assert_eq!(loaded.version, CURRENT_VERSION);
        assert_eq!(loaded.appearance(), Appearance::default());

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("theme: cupcake"));
        assert!(rewritten.contains("line_height: 1.4"));
    }

    #[test]
    fn test_appearance_from_settings() {
        let settings: Settings =
            serde_yaml::from_str("theme: coffee\nline_height: 1.6\njustify: false\n").unwrap();
        let appearance = settings.appearance();
        assert_eq!(appearance.theme, ThemeName::Coffee);
        assert!(appearance.colors.is_dark);
        assert_eq!(appearance.style.line_height, 1.6);
        assert!(!appearance.style.justify);
        assert!(appearance.style.hyphenate);

        let broken = Settings {
            line_height: -2.0,
            ..Settings::default()
        };
        assert_eq!(broken.reading_style().line_height, 1.4);
    }

    #[test]
    fn test_unknown_log_level_falls_back() {
        let settings = Settings {
            log_level: "chatty".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.log_level_filter(), log::LevelFilter::Info);
    }
}
