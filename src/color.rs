// src/color.rs

//! Engine color-ID resolution.
//!
//! The engine addresses colors by small integer IDs: 0-15 are the classic
//! DOS palette, 16-21 are themable slots (default fg/bg, status line fg/bg,
//! hyperlink, margin chrome), and 100-254 select from a user-defined RGBA
//! palette the game fills in at runtime. Everything else is invalid data
//! from the game file and resolves to black with a warning; it must never
//! abort playback.

use log::warn;
use serde::{Deserialize, Serialize};

/// An RGBA color. Alpha is carried for the user-defined palette entries;
/// the base palette and theme slots are always opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Rgba { r, g, b, a: 255 }
    }

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Rgba { r, g, b, a }
    }
}

impl Default for Rgba {
    fn default() -> Self {
        BLACK
    }
}

pub const BLACK: Rgba = Rgba::opaque(0, 0, 0);
pub const WHITE: Rgba = Rgba::opaque(255, 255, 255);

// Themable slot IDs.
pub const ID_DEFAULT_FG: u16 = 16;
pub const ID_DEFAULT_BG: u16 = 17;
pub const ID_STATUS_FG: u16 = 18;
pub const ID_STATUS_BG: u16 = 19;
pub const ID_LINK: u16 = 20;
pub const ID_MARGIN: u16 = 21;

/// First and last IDs of the user-defined palette range.
pub const EXTENDED_FIRST: u16 = 100;
pub const EXTENDED_LAST: u16 = 254;
pub const EXTENDED_COUNT: usize = (EXTENDED_LAST - EXTENDED_FIRST + 1) as usize;

/// The 16 base colors, DOS numbering (1 is blue, 4 is red).
const BASE16: [Rgba; 16] = [
    Rgba::opaque(0x00, 0x00, 0x00), // 0 black
    Rgba::opaque(0x00, 0x00, 0xaa), // 1 blue
    Rgba::opaque(0x00, 0xaa, 0x00), // 2 green
    Rgba::opaque(0x00, 0xaa, 0xaa), // 3 cyan
    Rgba::opaque(0xaa, 0x00, 0x00), // 4 red
    Rgba::opaque(0xaa, 0x00, 0xaa), // 5 magenta
    Rgba::opaque(0xaa, 0x55, 0x00), // 6 brown
    Rgba::opaque(0xaa, 0xaa, 0xaa), // 7 light gray
    Rgba::opaque(0x55, 0x55, 0x55), // 8 dark gray
    Rgba::opaque(0x55, 0x55, 0xff), // 9 light blue
    Rgba::opaque(0x55, 0xff, 0x55), // 10 light green
    Rgba::opaque(0x55, 0xff, 0xff), // 11 light cyan
    Rgba::opaque(0xff, 0x55, 0x55), // 12 light red
    Rgba::opaque(0xff, 0x55, 0xff), // 13 light magenta
    Rgba::opaque(0xff, 0xff, 0x55), // 14 yellow
    Rgba::opaque(0xff, 0xff, 0xff), // 15 white
];

/// The themable slot values, normally loaded from settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemeColors {
    pub foreground: Rgba,
    pub background: Rgba,
    pub status_foreground: Rgba,
    pub status_background: Rgba,
    pub link: Rgba,
}

impl Default for ThemeColors {
    fn default() -> Self {
        ThemeColors {
            foreground: BASE16[7],
            background: BASE16[1],
            status_foreground: BASE16[1],
            status_background: BASE16[7],
            link: BASE16[11],
        }
    }
}

/// Resolves engine color IDs to concrete colors.
///
/// Owns the themable slots and the user-defined palette. The margin chrome
/// color (ID 21) is derived from the background slot rather than stored.
#[derive(Debug, Clone)]
pub struct Palette {
    theme: ThemeColors,
    extended: [Rgba; EXTENDED_COUNT],
}

impl Default for Palette {
    fn default() -> Self {
        Palette::new(ThemeColors::default())
    }
}

impl Palette {
    pub fn new(theme: ThemeColors) -> Self {
        Palette {
            theme,
            extended: [BLACK; EXTENDED_COUNT],
        }
    }

    pub fn set_theme(&mut self, theme: ThemeColors) {
        self.theme = theme;
    }

    pub fn theme(&self) -> &ThemeColors {
        &self.theme
    }

    /// Resolves an engine color ID. Out-of-range IDs come from untrusted
    /// game data; they log a warning and resolve to black.
    pub fn resolve(&self, id: u16) -> Rgba {
        match id {
            0..=15 => BASE16[id as usize],
            ID_DEFAULT_FG => self.theme.foreground,
            ID_DEFAULT_BG => self.theme.background,
            ID_STATUS_FG => self.theme.status_foreground,
            ID_STATUS_BG => self.theme.status_background,
            ID_LINK => self.theme.link,
            ID_MARGIN => self.margin_color(),
            EXTENDED_FIRST..=EXTENDED_LAST => self.extended[(id - EXTENDED_FIRST) as usize],
            _ => {
                warn!("resolve: color ID {} out of range, using black", id);
                BLACK
            }
        }
    }

    /// Assigns a user-defined palette entry. Returns false (and warns) when
    /// the ID is outside the user-defined range.
    pub fn set_extended(&mut self, id: u16, color: Rgba) -> bool {
        if !(EXTENDED_FIRST..=EXTENDED_LAST).contains(&id) {
            warn!(
                "set_extended: color ID {} outside {}..={}",
                id, EXTENDED_FIRST, EXTENDED_LAST
            );
            return false;
        }
        self.extended[(id - EXTENDED_FIRST) as usize] = color;
        true
    }

    /// The margin chrome color, derived from the background theme slot.
    pub fn margin_color(&self) -> Rgba {
        self.theme.background
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_and_theme_ids_resolve() {
        let pal = Palette::default();
        for id in 0u16..=15 {
            assert_eq!(pal.resolve(id), BASE16[id as usize]);
        }
        assert_eq!(pal.resolve(ID_DEFAULT_FG), pal.theme().foreground);
        assert_eq!(pal.resolve(ID_DEFAULT_BG), pal.theme().background);
        assert_eq!(pal.resolve(ID_STATUS_FG), pal.theme().status_foreground);
        assert_eq!(pal.resolve(ID_STATUS_BG), pal.theme().status_background);
        assert_eq!(pal.resolve(ID_LINK), pal.theme().link);
        assert_eq!(pal.resolve(ID_MARGIN), pal.margin_color());
    }

    #[test]
    fn extended_palette_round_trips() {
        let mut pal = Palette::default();
        let c = Rgba::new(1, 2, 3, 200);
        assert!(pal.set_extended(100, c));
        assert!(pal.set_extended(254, c));
        assert_eq!(pal.resolve(100), c);
        assert_eq!(pal.resolve(254), c);
    }

    #[test]
    fn unset_extended_entries_are_black() {
        let pal = Palette::default();
        assert_eq!(pal.resolve(150), BLACK);
    }

    #[test]
    fn out_of_range_ids_resolve_black() {
        let mut pal = Palette::default();
        for id in [22u16, 99, 255, 400, u16::MAX] {
            assert_eq!(pal.resolve(id), BLACK);
            assert!(!pal.set_extended(id, WHITE));
        }
        // A rejected assignment must not disturb the palette.
        assert_eq!(pal.resolve(255), BLACK);
    }
}
