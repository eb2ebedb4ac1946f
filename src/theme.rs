use std::path::Path;

use ratatui::style::Color;
use serde::Deserialize;

use crate::config::{Presence, load_toml_or_default};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub instructions_bg: Color,
    pub form_bg: Color,
    pub chat_bg: Color,
    pub input_bg: Color,
    pub status_bg: Color,
    pub text_fg: Color,
    pub muted_fg: Color,
    pub active_fg: Color,
    pub user_fg: Color,
    pub wizard_fg: Color,
    pub warning_fg: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            instructions_bg: Color::Rgb(40, 42, 46),
            form_bg: Color::Rgb(44, 44, 44),
            chat_bg: Color::Rgb(54, 54, 54),
            input_bg: Color::Rgb(62, 62, 62),
            status_bg: Color::Rgb(36, 36, 36),
            text_fg: Color::Rgb(225, 225, 225),
            muted_fg: Color::Rgb(150, 150, 150),
            active_fg: Color::Rgb(255, 255, 255),
            user_fg: Color::Rgb(120, 190, 255),
            wizard_fg: Color::Rgb(150, 220, 140),
            warning_fg: Color::Rgb(255, 165, 0),
        }
    }
}

impl Theme {
    /// Colors absent from the file keep their defaults.
    pub fn load_or_default(path: impl AsRef<Path>, presence: Presence) -> Self {
        Self::from_file(load_toml_or_default(path, "theme", presence))
    }

    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        Ok(Self::from_file(toml::from_str(s)?))
    }

    fn from_file(file: ThemeFile) -> Self {
        let base = Self::default();
        let colors = file.colors;
        let pick = |value: Option<RgbToml>, fallback: Color| value.map_or(fallback, RgbToml::to_color);
        Self {
            instructions_bg: pick(colors.instructions_bg, base.instructions_bg),
            form_bg: pick(colors.form_bg, base.form_bg),
            chat_bg: pick(colors.chat_bg, base.chat_bg),
            input_bg: pick(colors.input_bg, base.input_bg),
            status_bg: pick(colors.status_bg, base.status_bg),
            text_fg: pick(colors.text_fg, base.text_fg),
            muted_fg: pick(colors.muted_fg, base.muted_fg),
            active_fg: pick(colors.active_fg, base.active_fg),
            user_fg: pick(colors.user_fg, base.user_fg),
            wizard_fg: pick(colors.wizard_fg, base.wizard_fg),
            warning_fg: pick(colors.warning_fg, base.warning_fg),
        }
    }

    pub fn speaker_fg(&self, agent_id: &str) -> Color {
        match agent_id {
            "User" => self.user_fg,
            "Wizard" => self.wizard_fg,
            _ => self.muted_fg,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ThemeFile {
    #[serde(default)]
    colors: ThemeColorsToml,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ThemeColorsToml {
    instructions_bg: Option<RgbToml>,
    form_bg: Option<RgbToml>,
    chat_bg: Option<RgbToml>,
    input_bg: Option<RgbToml>,
    status_bg: Option<RgbToml>,
    text_fg: Option<RgbToml>,
    muted_fg: Option<RgbToml>,
    active_fg: Option<RgbToml>,
    user_fg: Option<RgbToml>,
    wizard_fg: Option<RgbToml>,
    warning_fg: Option<RgbToml>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct RgbToml {
    r: u8,
    g: u8,
    b: u8,
}

impl RgbToml {
    fn to_color(self) -> Color {
        Color::Rgb(self.r, self.g, self.b)
    }
}
