// src/backend/headless.rs

//! Headless driver: a plain pixel buffer plus an operation log.
//!
//! Used by tests and by the shell's test harnesses. Text drawing is
//! deterministic and position-additive, so a concatenated run rasterizes
//! identically to the same text drawn as several contiguous runs.

use anyhow::Result;
use image::RgbaImage;

use super::{BackendEvent, Driver, PixelRect};
use crate::color::Rgba;
use crate::font::{FontMetrics, FontStyle};

const FIXED_CELL_W: u32 = 8;
const CELL_H: u32 = 16;
const ASCENT: u32 = 12;

/// One recorded driver call, for order-of-operations assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    FillRect(PixelRect, Rgba),
    InvertRect(PixelRect),
    DrawText { x: i32, y: i32, text: String, style: FontStyle, fg: Rgba },
    CopyArea { src: PixelRect, dst_x: i32, dst_y: i32 },
    DrawImage { x: i32, y: i32, w: u32, h: u32 },
    Present,
    Snapshot,
    Restore,
    SetTitle(String),
    SetFullscreen(bool),
    SetClipboard(String),
    OpenUrl(String),
    Fade { millis: u32, start_alpha: u8, end_alpha: u8 },
    ShowError(String),
}

pub struct HeadlessDriver {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
    saved: Option<Vec<u32>>,
    ops: Vec<DrawOp>,
    events: Vec<BackendEvent>,
    fullscreen: bool,
    clipboard: Option<String>,
}

impl HeadlessDriver {
    pub fn new(width: u32, height: u32) -> Self {
        HeadlessDriver {
            width,
            height,
            pixels: vec![0; (width * height) as usize],
            saved: None,
            ops: Vec::new(),
            events: Vec::new(),
            fullscreen: false,
            clipboard: None,
        }
    }

    pub fn push_event(&mut self, event: BackendEvent) {
        self.events.push(event);
    }

    pub fn set_clipboard_text(&mut self, text: &str) {
        self.clipboard = Some(text.to_string());
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.pixels[(y * self.width + x) as usize]
    }

    fn pack(color: Rgba) -> u32 {
        ((color.a as u32) << 24) | ((color.r as u32) << 16) | ((color.g as u32) << 8) | color.b as u32
    }

    fn put(&mut self, x: i32, y: i32, value: u32) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        self.pixels[(y as u32 * self.width + x as u32) as usize] = value;
    }

    fn get(&self, x: i32, y: i32) -> u32 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return 0;
        }
        self.pixels[(y as u32 * self.width + x as u32) as usize]
    }

    fn char_advance(style: FontStyle, ch: char) -> u32 {
        if style.is_fixed() {
            FIXED_CELL_W
        } else {
            // Deterministic per-character advance; additive over a string.
            4 + (ch as u32 % 5)
        }
    }

    /// Deterministic glyph pattern: ink position depends only on the
    /// character and the offset inside its own glyph box.
    fn glyph_ink(ch: char, gx: u32, gy: u32) -> bool {
        (ch as u32 + gx + gy * 7) % 3 == 0
    }
}

impl Driver for HeadlessDriver {
    fn process_events(&mut self) -> Result<Vec<BackendEvent>> {
        Ok(self.events.drain(..).collect())
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn font_metrics(&self, style: FontStyle) -> FontMetrics {
        FontMetrics {
            cell_width: if style.is_fixed() { FIXED_CELL_W } else { 6 },
            cell_height: CELL_H,
            ascent: ASCENT,
        }
    }

    fn measure_text(&self, style: FontStyle, text: &str) -> u32 {
        text.chars().map(|c| Self::char_advance(style, c)).sum()
    }

    fn fill_rect(&mut self, rect: PixelRect, color: Rgba) {
        self.ops.push(DrawOp::FillRect(rect, color));
        let clamped = rect.clamped_to(self.width, self.height);
        let value = Self::pack(color);
        for y in clamped.y..clamped.bottom() {
            for x in clamped.x..clamped.right() {
                self.put(x, y, value);
            }
        }
    }

    fn invert_rect(&mut self, rect: PixelRect) {
        self.ops.push(DrawOp::InvertRect(rect));
        let clamped = rect.clamped_to(self.width, self.height);
        for y in clamped.y..clamped.bottom() {
            for x in clamped.x..clamped.right() {
                let v = self.get(x, y);
                self.put(x, y, v ^ 0x00ff_ffff);
            }
        }
    }

    fn draw_text_run(&mut self, x: i32, y: i32, text: &str, style: FontStyle, fg: Rgba) {
        self.ops.push(DrawOp::DrawText {
            x,
            y,
            text: text.to_string(),
            style,
            fg,
        });
        let value = Self::pack(fg);
        let mut pen = x;
        for ch in text.chars() {
            let advance = Self::char_advance(style, ch);
            for gy in 0..CELL_H {
                for gx in 0..advance {
                    if Self::glyph_ink(ch, gx, gy) {
                        self.put(pen + gx as i32, y + gy as i32, value);
                    }
                }
            }
            pen += advance as i32;
        }
    }

    fn copy_area(&mut self, src: PixelRect, dst_x: i32, dst_y: i32) {
        self.ops.push(DrawOp::CopyArea { src, dst_x, dst_y });
        let clamped = src.clamped_to(self.width, self.height);
        let mut copied = Vec::with_capacity((clamped.w * clamped.h) as usize);
        for y in clamped.y..clamped.bottom() {
            for x in clamped.x..clamped.right() {
                copied.push(self.get(x, y));
            }
        }
        for (i, value) in copied.into_iter().enumerate() {
            let dx = (i as u32 % clamped.w) as i32;
            let dy = (i as u32 / clamped.w) as i32;
            self.put(dst_x + dx, dst_y + dy, value);
        }
    }

    fn draw_image(&mut self, img: &RgbaImage, x: i32, y: i32) {
        self.ops.push(DrawOp::DrawImage {
            x,
            y,
            w: img.width(),
            h: img.height(),
        });
        for (px, py, p) in img.enumerate_pixels() {
            let [r, g, b, a] = p.0;
            self.put(x + px as i32, y + py as i32, Self::pack(Rgba::new(r, g, b, a)));
        }
    }

    fn present(&mut self) -> Result<()> {
        self.ops.push(DrawOp::Present);
        Ok(())
    }

    fn snapshot(&mut self) {
        self.ops.push(DrawOp::Snapshot);
        self.saved = Some(self.pixels.clone());
    }

    fn restore(&mut self) {
        self.ops.push(DrawOp::Restore);
        if let Some(saved) = self.saved.take() {
            self.pixels = saved;
        }
    }

    fn set_title(&mut self, title: &str) {
        self.ops.push(DrawOp::SetTitle(title.to_string()));
    }

    fn set_fullscreen(&mut self, on: bool) {
        self.ops.push(DrawOp::SetFullscreen(on));
        self.fullscreen = on;
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    fn set_clipboard(&mut self, text: &str) {
        self.ops.push(DrawOp::SetClipboard(text.to_string()));
        self.clipboard = Some(text.to_string());
    }

    fn clipboard_text(&mut self) -> Option<String> {
        self.clipboard.clone()
    }

    fn open_url(&mut self, url: &str) {
        self.ops.push(DrawOp::OpenUrl(url.to_string()));
    }

    fn fade_screen(&mut self, millis: u32, start_alpha: u8, end_alpha: u8) {
        self.ops.push(DrawOp::Fade {
            millis,
            start_alpha,
            end_alpha,
        });
    }

    fn show_error(&mut self, message: &str) {
        self.ops.push(DrawOp::ShowError(message.to_string()));
    }
}
