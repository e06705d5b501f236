// src/font.rs

//! Font attribute flags and metrics.
//!
//! The engine's font model is a small set of attribute bits layered over two
//! families: a proportional main font and a fixed-width font. Metrics come
//! from the backend driver; the shell never measures text itself.

use bitflags::bitflags;

bitflags! {
    /// Engine font attributes. The absence of `FIXED` selects the
    /// proportional main font.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FontStyle: u8 {
        const BOLD = 1 << 0;
        const ITALIC = 1 << 1;
        const UNDERLINE = 1 << 2;
        const FIXED = 1 << 3;
    }
}

impl FontStyle {
    pub fn is_fixed(&self) -> bool {
        self.contains(FontStyle::FIXED)
    }
}

/// Metrics for one font selection, in device pixels.
///
/// `cell_width` is the advance of a reference glyph; for the proportional
/// font it is an average and only the fixed font's value is used for
/// character-cell geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontMetrics {
    pub cell_width: u32,
    pub cell_height: u32,
    pub ascent: u32,
}

impl FontMetrics {
    pub fn line_height(&self) -> u32 {
        self.cell_height
    }
}
