// src/backend/mod.rs
// Declares backend driver modules and defines the common trait.

pub mod headless;
pub mod x11;

pub use self::headless::HeadlessDriver;
// `self::` keeps the module path distinct from the `x11` crate.
pub use self::x11::XDriver;

use anyhow::Result;
use image::RgbaImage;

use crate::color::Rgba;
use crate::font::{FontMetrics, FontStyle};
use crate::keys::{KeySymbol, Modifiers};

/// A rectangle in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl PixelRect {
    pub const fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        PixelRect { x, y, w, h }
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// The all-zero rect, used by the engine as a "whole surface" sentinel.
    pub fn is_zero(&self) -> bool {
        self.x == 0 && self.y == 0 && self.w == 0 && self.h == 0
    }

    pub fn right(&self) -> i32 {
        self.x + self.w as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h as i32
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
    }

    /// Clamps this rect to the bounds of a `w` x `h` surface.
    pub fn clamped_to(&self, w: u32, h: u32) -> PixelRect {
        let x = self.x.clamp(0, w as i32);
        let y = self.y.clamp(0, h as i32);
        let right = self.right().clamp(x, w as i32);
        let bottom = self.bottom().clamp(y, h as i32);
        PixelRect::new(x, y, (right - x) as u32, (bottom - y) as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    Other,
}

/// Events delivered by a backend driver to the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    Key {
        symbol: KeySymbol,
        modifiers: Modifiers,
        /// Translated character payload, empty for non-printable keys.
        text: String,
    },
    MouseDown {
        x: i32,
        y: i32,
        button: MouseButton,
        /// 1 for a single click, 2 for a double click.
        click_count: u8,
    },
    Resize {
        width_px: u32,
        height_px: u32,
    },
    FocusGained,
    FocusLost,
    CloseRequested,
}

/// The presentation seam between the shell and a windowing system.
///
/// The driver owns the actual pixel storage (a server-side pixmap for X11, a
/// plain buffer for the headless driver); the display surface is the
/// authoritative model and calls down through this trait. Coordinates are
/// device pixels.
pub trait Driver {
    /// Drains pending windowing events.
    fn process_events(&mut self) -> Result<Vec<BackendEvent>>;

    /// Current drawable size in device pixels.
    fn surface_size(&self) -> (u32, u32);

    /// Device-pixel-ratio of the output (1.0 for a normal display).
    fn device_pixel_ratio(&self) -> f32 {
        1.0
    }

    /// Metrics of the font selected by `style`.
    fn font_metrics(&self, style: FontStyle) -> FontMetrics;

    /// Pixel advance of `text` in the font selected by `style`.
    fn measure_text(&self, style: FontStyle, text: &str) -> u32;

    fn fill_rect(&mut self, rect: PixelRect, color: Rgba);

    /// Inverts the pixels in `rect`; self-inverse, used for the cursor.
    fn invert_rect(&mut self, rect: PixelRect);

    /// Draws a glyph run. `(x, y)` is the top-left of the line box; the
    /// driver positions the baseline from its own ascent.
    fn draw_text_run(&mut self, x: i32, y: i32, text: &str, style: FontStyle, fg: Rgba);

    /// In-place blit of `src` so its top-left lands at `(dst_x, dst_y)`.
    fn copy_area(&mut self, src: PixelRect, dst_x: i32, dst_y: i32);

    fn draw_image(&mut self, img: &RgbaImage, x: i32, y: i32);

    /// Pushes the off-screen buffer to the window.
    fn present(&mut self) -> Result<()>;

    /// Saves the current buffer contents for a later `restore`, used by the
    /// scrollback overlay.
    fn snapshot(&mut self);
    fn restore(&mut self);

    fn set_title(&mut self, title: &str);
    fn set_fullscreen(&mut self, on: bool);
    fn is_fullscreen(&self) -> bool;

    fn set_clipboard(&mut self, text: &str);
    fn clipboard_text(&mut self) -> Option<String>;

    /// Opens a URL or local file through the operating system.
    fn open_url(&mut self, url: &str);

    /// Fades the window between two alpha levels over `millis`. Runs to
    /// completion before returning.
    fn fade_screen(&mut self, millis: u32, start_alpha: u8, end_alpha: u8);

    /// Non-modal error presentation; the single funnel for user-visible
    /// failures.
    fn show_error(&mut self, message: &str);

    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}
