//! Reading appearance handed to the renderer: theme colors and reading style.
//!
//! The session only decides *what* to apply. Turning an [`Appearance`] into
//! stylesheet text is the rendering view's job.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeName {
    Light,
    Dark,
    #[default]
    Cupcake,
    Retro,
    Dim,
    Coffee,
}

impl ThemeName {
    pub fn name(&self) -> &'static str {
        match self {
            ThemeName::Light => "light",
            ThemeName::Dark => "dark",
            ThemeName::Cupcake => "cupcake",
            ThemeName::Retro => "retro",
            ThemeName::Dim => "dim",
            ThemeName::Coffee => "coffee",
        }
    }

    pub fn all() -> &'static [ThemeName] {
        &[
            ThemeName::Light,
            ThemeName::Dark,
            ThemeName::Cupcake,
            ThemeName::Retro,
            ThemeName::Dim,
            ThemeName::Coffee,
        ]
    }

    pub fn is_dark(&self) -> bool {
        matches!(self, ThemeName::Dark | ThemeName::Dim | ThemeName::Coffee)
    }

    /// Text, background and link colors of the theme.
    pub fn colors(&self) -> ThemeColors {
        let (fg, bg, link) = match self {
            ThemeName::Light => ("#1f2937", "#ffffff", "#00b5ff"),
            ThemeName::Dark => ("#a6adbb", "#1d232a", "#00b5ff"),
            ThemeName::Cupcake => ("#291334", "#faf7f5", "#3abff8"),
            ThemeName::Retro => ("#282425", "#ece3ca", "#2563eb"),
            ThemeName::Dim => ("#b2ccd6", "#2a303c", "#28ebff"),
            ThemeName::Coffee => ("#c59f60", "#20161f", "#8dcac1"),
        };
        ThemeColors {
            fg: fg.to_string(),
            bg: bg.to_string(),
            link: link.to_string(),
            is_dark: self.is_dark(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeColors {
    pub fg: String,
    pub bg: String,
    pub link: String,
    pub is_dark: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadingStyle {
    pub line_height: f64,
    pub justify: bool,
    pub hyphenate: bool,
}

impl Default for ReadingStyle {
    fn default() -> Self {
        Self {
            line_height: 1.4,
            justify: true,
            hyphenate: true,
        }
    }
}

/// Everything the renderer needs to style content documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appearance {
    pub theme: ThemeName,
    pub colors: ThemeColors,
    pub style: ReadingStyle,
}

impl Default for Appearance {
    fn default() -> Self {
        Self::new(ThemeName::default(), ReadingStyle::default())
    }
}

impl Appearance {
    pub fn new(theme: ThemeName, style: ReadingStyle) -> Self {
        Self {
            theme,
            colors: theme.colors(),
            style,
        }
    }

    /// Same reading style, different theme.
    pub fn with_theme(&self, theme: ThemeName) -> Self {
        Self::new(theme, self.style)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dark_themes() {
        let dark: Vec<_> = ThemeName::all()
            .iter()
            .filter(|theme| theme.is_dark())
            .map(ThemeName::name)
            .collect();
        assert_eq!(dark, vec!["dark", "dim", "coffee"]);
        assert!(ThemeName::Coffee.colors().is_dark);
        assert!(!ThemeName::Retro.colors().is_dark);
    }

    #[test]
    fn test_with_theme_keeps_style() {
        let style = ReadingStyle {
            line_height: 1.8,
            justify: false,
            hyphenate: true,
        };
        let appearance = Appearance::new(ThemeName::Light, style).with_theme(ThemeName::Dim);
        assert_eq!(appearance.style, style);
        assert_eq!(appearance.colors, ThemeName::Dim.colors());
    }

    #[test]
    fn test_theme_names_round_trip_through_yaml() {
        for theme in ThemeName::all() {
            let yaml = serde_yaml::to_string(theme).unwrap();
            assert_eq!(yaml.trim(), theme.name());
            let back: ThemeName = serde_yaml::from_str(&yaml).unwrap();
            assert_eq!(back, *theme);
        }
    }
}
