// src/config.rs

//! Persisted user settings.
//!
//! A flat record of preferences loaded once at startup and saved on every
//! preferences commit and on shutdown. Serialized as JSON under the user's
//! config directory. Every group carries serde defaults so settings files
//! from older versions keep loading.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::color::{Rgba, ThemeColors};

/// Maximum entries kept in the recent-games list.
pub const RECENT_GAMES_CAP: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub media: MediaConfig,
    pub colors: ColorConfig,
    pub fonts: FontConfig,
    pub volume: VolumeConfig,
    pub appearance: AppearanceConfig,
    pub script: ScriptConfig,
    pub recent_games: Vec<PathBuf>,
}

/// Enablement flags for the media subsystems.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub enable_music: bool,
    pub enable_sounds: bool,
    pub enable_video: bool,
    /// Mute all playback while the window is unfocused.
    pub mute_in_background: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        MediaConfig {
            enable_music: true,
            enable_sounds: true,
            enable_video: true,
            mute_in_background: false,
        }
    }
}

/// The themable color slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub foreground: Rgba,
    pub background: Rgba,
    pub status_foreground: Rgba,
    pub status_background: Rgba,
    pub link: Rgba,
}

impl Default for ColorConfig {
    fn default() -> Self {
        let theme = ThemeColors::default();
        ColorConfig {
            foreground: theme.foreground,
            background: theme.background,
            status_foreground: theme.status_foreground,
            status_background: theme.status_background,
            link: theme.link,
        }
    }
}

impl ColorConfig {
    pub fn theme(&self) -> ThemeColors {
        ThemeColors {
            foreground: self.foreground,
            background: self.background,
            status_foreground: self.status_foreground,
            status_background: self.status_background,
            link: self.link,
        }
    }
}

/// Font family and size selections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    /// Proportional main font, fontconfig-style name.
    pub main: String,
    pub main_size: u16,
    /// Fixed-width font used for character-cell geometry.
    pub fixed: String,
    pub fixed_size: u16,
}

impl Default for FontConfig {
    fn default() -> Self {
        FontConfig {
            main: "DejaVu Serif".to_string(),
            main_size: 12,
            fixed: "DejaVu Sans Mono".to_string(),
            fixed_size: 12,
        }
    }
}

/// Playback volumes, 0-100 per channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    pub music: u8,
    pub samples: u8,
    pub video: u8,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        VolumeConfig {
            music: 100,
            samples: 100,
            video: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppearanceConfig {
    /// Window size hint in fixed-font character cells.
    pub width_cells: u16,
    pub height_cells: u16,
    /// Blank chrome around the text area, in pixels.
    pub margin_px: u32,
    pub start_fullscreen: bool,
    /// Smooth scrolling: one short frame delay per scroll step.
    pub soft_scrolling: bool,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        AppearanceConfig {
            width_cells: 80,
            height_cells: 25,
            margin_px: 0,
            start_fullscreen: false,
            soft_scrolling: true,
        }
    }
}

/// Transcript ("script file") preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Word-wrap column for transcript output; 0 writes verbatim.
    pub wrap_width: usize,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        ScriptConfig { wrap_width: 80 }
    }
}

impl Settings {
    /// Resolves the settings file path from `$XDG_CONFIG_HOME` or `$HOME`.
    pub fn default_path() -> Option<PathBuf> {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("hugo-shell").join("settings.json"))
    }

    /// Loads settings, falling back to defaults on a missing or unreadable
    /// file. A malformed file is logged, never fatal.
    pub fn load_or_default(path: Option<&Path>) -> Settings {
        let resolved = match path.map(Path::to_path_buf).or_else(Settings::default_path) {
            Some(p) => p,
            None => {
                warn!("no config directory available, using default settings");
                return Settings::default();
            }
        };
        match fs::read_to_string(&resolved) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(settings) => {
                    info!("loaded settings from {}", resolved.display());
                    settings
                }
                Err(e) => {
                    warn!("malformed settings file {}: {}", resolved.display(), e);
                    Settings::default()
                }
            },
            Err(_) => Settings::default(),
        }
    }

    /// Saves settings, creating the parent directory as needed.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let resolved = path
            .map(Path::to_path_buf)
            .or_else(Settings::default_path)
            .context("no config directory available")?;
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(&resolved, text)
            .with_context(|| format!("writing {}", resolved.display()))?;
        info!("saved settings to {}", resolved.display());
        Ok(())
    }

    /// Records a game in the recent list: canonical-path deduplicated,
    /// most recent first, capacity bounded.
    pub fn remember_game(&mut self, path: &Path) {
        let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.recent_games.retain(|p| p != &canonical);
        self.recent_games.insert(0, canonical);
        self.recent_games.truncate(RECENT_GAMES_CAP);
    }
}
