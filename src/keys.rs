// src/keys.rs

//! Key symbols, modifier flags, and the engine key-code table.
//!
//! Backend drivers translate platform key events into `KeySymbol` +
//! `Modifiers`; `engine_key_code` maps those to the 16-bit codes the
//! interpreter's `getkey` entry point expects. Code 0 is reserved as the
//! sentinel meaning "the next event is a mouse click".

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Keyboard modifier state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Modifiers: u8 {
        const SHIFT = 1 << 0;
        const CONTROL = 1 << 1;
        const ALT = 1 << 2;
        const SUPER = 1 << 3;
    }
}

/// A key symbol, independent of the windowing backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum KeySymbol {
    Char(char),

    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,

    Left,
    Right,
    Up,
    Down,
    PageUp,
    PageDown,
    Home,
    End,
    Insert,
    Delete,

    Enter,
    Backspace,
    Tab,
    Escape,

    #[default]
    Unknown,
}

/// The key codes delivered to the interpreter.
///
/// Printable characters map to their Unicode scalar value; everything below
/// is the published table for special keys.
pub mod engine_keys {
    /// Sentinel: a mouse click is pending and should be fetched separately.
    pub const CLICK: u16 = 0;

    pub const BACKSPACE: u16 = 8;
    pub const TAB: u16 = 9;
    pub const ENTER: u16 = 13;
    pub const ESCAPE: u16 = 27;

    pub const ARROW_UP: u16 = 300;
    pub const ARROW_DOWN: u16 = 301;
    pub const ARROW_LEFT: u16 = 302;
    pub const ARROW_RIGHT: u16 = 303;
    pub const HOME: u16 = 304;
    pub const END: u16 = 305;
    pub const PAGE_UP: u16 = 306;
    pub const PAGE_DOWN: u16 = 307;
    pub const INSERT: u16 = 308;
    pub const DELETE: u16 = 309;

    pub const F1: u16 = 315;
}

/// Maps a key event to the code the engine expects, or `None` for keys the
/// engine has no code for (bare modifiers, unrecognized symbols).
///
/// `text` is the translated character payload from the backend, used for
/// printable keys so keyboard layout and shift state are honored.
pub fn engine_key_code(symbol: KeySymbol, text: &str) -> Option<u16> {
    use engine_keys::*;

    let code = match symbol {
        KeySymbol::Enter => ENTER,
        KeySymbol::Backspace => BACKSPACE,
        KeySymbol::Tab => TAB,
        KeySymbol::Escape => ESCAPE,
        KeySymbol::Up => ARROW_UP,
        KeySymbol::Down => ARROW_DOWN,
        KeySymbol::Left => ARROW_LEFT,
        KeySymbol::Right => ARROW_RIGHT,
        KeySymbol::Home => HOME,
        KeySymbol::End => END,
        KeySymbol::PageUp => PAGE_UP,
        KeySymbol::PageDown => PAGE_DOWN,
        KeySymbol::Insert => INSERT,
        KeySymbol::Delete => DELETE,
        KeySymbol::F1 => F1,
        KeySymbol::F2 => F1 + 1,
        KeySymbol::F3 => F1 + 2,
        KeySymbol::F4 => F1 + 3,
        KeySymbol::F5 => F1 + 4,
        KeySymbol::F6 => F1 + 5,
        KeySymbol::F7 => F1 + 6,
        KeySymbol::F8 => F1 + 7,
        KeySymbol::F9 => F1 + 8,
        KeySymbol::F10 => F1 + 9,
        KeySymbol::F11 => F1 + 10,
        KeySymbol::F12 => F1 + 11,
        KeySymbol::Char(c) => {
            // Prefer the backend's translated text so layout and shift
            // state are already applied.
            let ch = text.chars().next().unwrap_or(c);
            if ch.is_control() {
                return None;
            }
            let scalar = ch as u32;
            if scalar > u16::MAX as u32 {
                return None;
            }
            scalar as u16
        }
        KeySymbol::Unknown => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printable_keys_use_translated_text() {
        assert_eq!(engine_key_code(KeySymbol::Char('a'), "A"), Some('A' as u16));
        assert_eq!(engine_key_code(KeySymbol::Char('a'), ""), Some('a' as u16));
    }

    #[test]
    fn special_keys_map_to_table_codes() {
        assert_eq!(engine_key_code(KeySymbol::Enter, "\r"), Some(engine_keys::ENTER));
        assert_eq!(engine_key_code(KeySymbol::F3, ""), Some(engine_keys::F1 + 2));
        assert_eq!(engine_key_code(KeySymbol::Up, ""), Some(engine_keys::ARROW_UP));
    }

    #[test]
    fn unknown_and_control_yield_none() {
        assert_eq!(engine_key_code(KeySymbol::Unknown, ""), None);
        assert_eq!(engine_key_code(KeySymbol::Char('\u{1}'), "\u{1}"), None);
    }

    #[test]
    fn no_special_code_collides_with_the_click_sentinel() {
        for sym in [
            KeySymbol::Enter,
            KeySymbol::Backspace,
            KeySymbol::Tab,
            KeySymbol::Escape,
            KeySymbol::Up,
            KeySymbol::Delete,
            KeySymbol::F12,
        ] {
            assert_ne!(engine_key_code(sym, ""), Some(engine_keys::CLICK));
        }
    }
}
