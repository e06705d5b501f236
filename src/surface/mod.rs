// src/surface/mod.rs

//! The display surface: the authoritative model of what the player sees.
//!
//! The engine's coordinate model is a hybrid of character cells (window
//! definitions, caret positions, both 1-based) and device pixels (scrolling,
//! images). The surface translates both into pixel draws against the
//! backend driver, which owns the actual raster storage.
//!
//! Consecutive same-style prints are batched into a pending text run and
//! rasterized in one draw call. The run is flushed on color/font change,
//! newline, explicit flush, or before any operation that would visually
//! interleave with it; nothing reads the raster while a run is pending.

use std::collections::VecDeque;
use std::time::Duration;

use image::RgbaImage;
use log::trace;

use crate::backend::{Driver, PixelRect};
use crate::color::{Palette, Rgba, ID_MARGIN};
use crate::font::{FontMetrics, FontStyle};
use unicode_segmentation::UnicodeSegmentation;

/// One soft-scroll frame at roughly 83 Hz.
const SOFT_SCROLL_FRAME: Duration = Duration::from_millis(12);

/// Bounds on retained run records and scrolled-out text.
const RUN_RECORD_CAP: usize = 400;
const SCROLLBACK_CAP: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorShape {
    Ibeam,
    Block,
    Underline,
}

#[derive(Debug, Clone, Copy)]
pub struct CursorState {
    pub x: i32,
    pub y: i32,
    pub visible: bool,
    pub phase: bool,
    pub shape: CursorShape,
    width: u32,
    height: u32,
}

impl CursorState {
    fn rect(&self) -> PixelRect {
        match self.shape {
            CursorShape::Ibeam => PixelRect::new(self.x, self.y, 2, self.height),
            CursorShape::Block => PixelRect::new(self.x, self.y, self.width, self.height),
            CursorShape::Underline => PixelRect::new(
                self.x,
                self.y + self.height.saturating_sub(2) as i32,
                self.width,
                2,
            ),
        }
    }
}

/// A flushed text run, retained for the scrollback view and for
/// double-click word lookup.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub text: String,
    pub style: FontStyle,
}

#[derive(Debug)]
struct PendingRun {
    text: String,
    x: i32,
    y: i32,
    style: FontStyle,
    fg: u16,
    bg: u16,
}

pub struct DisplaySurface {
    width: u32,
    height: u32,
    device_pixel_ratio: f32,
    palette: Palette,
    fg: u16,
    bg: u16,
    font: FontStyle,
    window: PixelRect,
    /// Pen position: top-left of the next glyph box, device pixels.
    pen: (i32, i32),
    run: Option<PendingRun>,
    cursor: CursorState,
    cursor_drawn: bool,
    records: VecDeque<RunRecord>,
    scrollback: VecDeque<String>,
    soft_scrolling: bool,
    margin_color: Rgba,
}

impl DisplaySurface {
    pub fn new(drv: &dyn Driver, palette: Palette, soft_scrolling: bool) -> Self {
        let (width, height) = drv.surface_size();
        let metrics = drv.font_metrics(FontStyle::FIXED);
        let margin_color = palette.resolve(ID_MARGIN);
        let mut surface = DisplaySurface {
            width,
            height,
            device_pixel_ratio: drv.device_pixel_ratio(),
            palette,
            fg: crate::color::ID_DEFAULT_FG,
            bg: crate::color::ID_DEFAULT_BG,
            font: FontStyle::empty(),
            window: PixelRect::new(0, 0, width, height),
            pen: (0, 0),
            run: None,
            cursor: CursorState {
                x: 0,
                y: 0,
                visible: false,
                phase: false,
                shape: CursorShape::Ibeam,
                width: metrics.cell_width,
                height: metrics.cell_height,
            },
            cursor_drawn: false,
            records: VecDeque::new(),
            scrollback: VecDeque::new(),
            soft_scrolling,
            margin_color,
        };
        surface.update_cursor_geometry(drv);
        surface
    }

    // --- Accessors -------------------------------------------------------

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio
    }

    pub fn window(&self) -> PixelRect {
        self.window
    }

    pub fn pen(&self) -> (i32, i32) {
        self.pen
    }

    pub fn font(&self) -> FontStyle {
        self.font
    }

    pub fn fg(&self) -> u16 {
        self.fg
    }

    pub fn bg(&self) -> u16 {
        self.bg
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn margin_color(&self) -> Rgba {
        self.margin_color
    }

    pub fn cursor(&self) -> &CursorState {
        &self.cursor
    }

    pub fn records(&self) -> impl Iterator<Item = &RunRecord> {
        self.records.iter()
    }

    pub fn has_pending_run(&self) -> bool {
        self.run.is_some()
    }

    fn line_height(&self, drv: &dyn Driver) -> u32 {
        drv.font_metrics(self.font).line_height()
    }

    pub fn fixed_metrics(&self, drv: &dyn Driver) -> FontMetrics {
        drv.font_metrics(FontStyle::FIXED)
    }

    // --- Geometry --------------------------------------------------------

    pub fn handle_resize(&mut self, drv: &dyn Driver) {
        let (w, h) = drv.surface_size();
        self.width = w;
        self.height = h;
        self.window = self.window.clamped_to(w, h);
        if self.window.is_empty() {
            self.window = PixelRect::new(0, 0, w, h);
        }
    }

    /// Defines the active text window from 1-based inclusive character-cell
    /// bounds. The rectangle is clamped to the surface; an edge landing
    /// within one cell of the surface edge is extended to it so no
    /// unreachable sliver of pixels survives.
    pub fn set_window_cells(&mut self, drv: &mut dyn Driver, left: u16, top: u16, right: u16, bottom: u16) {
        self.flush_text(drv);
        let m = self.fixed_metrics(drv);
        let left = left.max(1) as i32;
        let top = top.max(1) as i32;
        let right = (right.max(left as u16)) as i32;
        let bottom = (bottom.max(top as u16)) as i32;

        let x = (left - 1) * m.cell_width as i32;
        let y = (top - 1) * m.cell_height as i32;
        let mut right_px = right * m.cell_width as i32;
        let mut bottom_px = bottom * m.cell_height as i32;

        if self.width as i32 - right_px < m.cell_width as i32 {
            right_px = self.width as i32;
        }
        if self.height as i32 - bottom_px < m.cell_height as i32 {
            bottom_px = self.height as i32;
        }

        let rect = PixelRect::new(x, y, (right_px - x).max(0) as u32, (bottom_px - y).max(0) as u32);
        self.window = rect.clamped_to(self.width, self.height);
        self.pen = (self.window.x, self.window.y);
        self.sync_cursor_to_pen();
        trace!("text window set to {:?}", self.window);
    }

    /// Window size in fixed character cells.
    pub fn window_cells(&self, drv: &dyn Driver) -> (u16, u16) {
        let m = self.fixed_metrics(drv);
        let cols = (self.window.w / m.cell_width.max(1)).max(1) as u16;
        let rows = (self.window.h / m.cell_height.max(1)).max(1) as u16;
        (cols, rows)
    }

    /// Moves the pen to a 1-based character cell within the window.
    pub fn set_caret_cell(&mut self, drv: &mut dyn Driver, col: u16, row: u16) {
        // A caret move breaks run contiguity unless it happens to land on
        // the continuation point; `print` checks that, so only the pen
        // moves here.
        let m = self.fixed_metrics(drv);
        let col = col.max(1) as i32 - 1;
        let row = row.max(1) as i32 - 1;
        self.pen = (
            self.window.x + col * m.cell_width as i32,
            self.window.y + row * m.cell_height as i32,
        );
        self.sync_cursor_to_pen();
    }

    pub fn caret_cell(&self, drv: &dyn Driver) -> (u16, u16) {
        let m = self.fixed_metrics(drv);
        let col = (self.pen.0 - self.window.x).max(0) as u32 / m.cell_width.max(1);
        let row = (self.pen.1 - self.window.y).max(0) as u32 / m.cell_height.max(1);
        (col as u16 + 1, row as u16 + 1)
    }

    /// Converts a pixel position to a 1-based cell position in the window.
    pub fn cell_at(&self, drv: &dyn Driver, x: i32, y: i32) -> (u16, u16) {
        let m = self.fixed_metrics(drv);
        let col = (x - self.window.x).max(0) as u32 / m.cell_width.max(1);
        let row = (y - self.window.y).max(0) as u32 / m.cell_height.max(1);
        (col as u16 + 1, row as u16 + 1)
    }

    // --- Style -----------------------------------------------------------

    pub fn set_fg(&mut self, drv: &mut dyn Driver, id: u16) {
        if id != self.fg {
            self.flush_text(drv);
            self.fg = id;
        }
    }

    pub fn set_bg(&mut self, drv: &mut dyn Driver, id: u16) {
        if id != self.bg {
            self.flush_text(drv);
            self.bg = id;
        }
    }

    pub fn set_font(&mut self, drv: &mut dyn Driver, style: FontStyle) {
        if style != self.font {
            self.flush_text(drv);
            self.font = style;
            self.update_cursor_geometry(drv);
        }
    }

    pub fn define_color(&mut self, id: u16, color: Rgba) -> bool {
        self.palette.set_extended(id, color)
    }

    pub fn set_theme(&mut self, theme: crate::color::ThemeColors) {
        self.palette.set_theme(theme);
        self.margin_color = self.palette.resolve(ID_MARGIN);
    }

    // --- Text ------------------------------------------------------------

    /// Prints engine text at the pen position. Consecutive prints with
    /// unchanged style and contiguous origins accumulate into one pending
    /// run; newlines flush and advance the pen one line.
    pub fn print(&mut self, drv: &mut dyn Driver, text: &str) {
        let mut rest = text;
        while let Some(nl) = rest.find('\n') {
            let (segment, tail) = rest.split_at(nl);
            self.print_segment(drv, segment);
            self.flush_text(drv);
            self.pen = (self.window.x, self.pen.1 + self.line_height(drv) as i32);
            self.sync_cursor_to_pen();
            rest = &tail[1..];
        }
        self.print_segment(drv, rest);
    }

    fn print_segment(&mut self, drv: &mut dyn Driver, segment: &str) {
        if segment.is_empty() {
            return;
        }
        let continues = match &self.run {
            Some(run) => {
                run.style == self.font
                    && run.fg == self.fg
                    && run.bg == self.bg
                    && self.pen.1 == run.y
                    && self.pen.0 == run.x + drv.measure_text(run.style, &run.text) as i32
            }
            None => false,
        };
        if !continues {
            self.flush_text(drv);
            self.run = Some(PendingRun {
                text: String::new(),
                x: self.pen.0,
                y: self.pen.1,
                style: self.font,
                fg: self.fg,
                bg: self.bg,
            });
        }
        let run = self.run.as_mut().expect("pending run was just ensured");
        run.text.push_str(segment);
        self.pen.0 = run.x + drv.measure_text(run.style, &run.text) as i32;
        self.sync_cursor_to_pen();
    }

    /// Rasterizes the pending run: background box at full line height
    /// first (glyph drawing alone does not cover it), then the glyphs.
    pub fn flush_text(&mut self, drv: &mut dyn Driver) {
        let Some(run) = self.run.take() else {
            return;
        };
        self.set_cursor_drawn(drv, false);
        let line_height = drv.font_metrics(run.style).line_height();
        let advance = drv.measure_text(run.style, &run.text);
        drv.fill_rect(
            PixelRect::new(run.x, run.y, advance, line_height),
            self.palette.resolve(run.bg),
        );
        drv.draw_text_run(run.x, run.y, &run.text, run.style, self.palette.resolve(run.fg));
        self.records.push_back(RunRecord {
            x: run.x,
            y: run.y,
            width: advance,
            text: run.text,
            style: run.style,
        });
        if self.records.len() > RUN_RECORD_CAP {
            self.records.pop_front();
        }
    }

    // --- Region operations ----------------------------------------------

    /// Clears a region to the current background. The all-zero rect is the
    /// engine's "whole surface" sentinel and additionally refreshes the
    /// derived margin chrome color.
    pub fn clear_region(&mut self, drv: &mut dyn Driver, rect: PixelRect) {
        self.flush_text(drv);
        self.set_cursor_drawn(drv, false);
        let target = if rect.is_zero() {
            self.margin_color = self.palette.resolve(ID_MARGIN);
            PixelRect::new(0, 0, self.width, self.height)
        } else {
            rect.clamped_to(self.width, self.height)
        };
        drv.fill_rect(target, self.palette.resolve(self.bg));
        self.records.retain(|r| {
            !(r.y >= target.y
                && r.y < target.bottom()
                && r.x < target.right()
                && r.x + r.width as i32 > target.x)
        });
    }

    /// Scrolls `rect` up by `pixels`, filling the exposed strip with the
    /// background. A zero distance is a no-op. With soft scrolling enabled
    /// the UI thread waits one frame to smooth the motion, skipped when the
    /// session is quitting.
    pub fn scroll_up(&mut self, drv: &mut dyn Driver, rect: PixelRect, pixels: u32, quitting: bool) {
        self.flush_text(drv);
        if pixels == 0 {
            return;
        }
        self.set_cursor_drawn(drv, false);
        let rect = rect.clamped_to(self.width, self.height);
        if rect.is_empty() {
            return;
        }
        let pixels = pixels.min(rect.h);
        let src = PixelRect::new(rect.x, rect.y + pixels as i32, rect.w, rect.h - pixels);
        drv.copy_area(src, rect.x, rect.y);
        drv.fill_rect(
            PixelRect::new(rect.x, rect.bottom() - pixels as i32, rect.w, pixels),
            self.palette.resolve(self.bg),
        );

        // Slide retained records with the content; text pushed above the
        // region joins the scrollback.
        let mut kept = VecDeque::with_capacity(self.records.len());
        for mut record in std::mem::take(&mut self.records) {
            let inside = record.y >= rect.y && record.y < rect.bottom();
            if inside {
                record.y -= pixels as i32;
                if record.y < rect.y {
                    self.push_scrollback_line(record.text);
                    continue;
                }
            }
            kept.push_back(record);
        }
        self.records = kept;

        if self.soft_scrolling && !quitting {
            std::thread::sleep(SOFT_SCROLL_FRAME);
        }
    }

    fn push_scrollback_line(&mut self, text: String) {
        self.scrollback.push_back(text);
        if self.scrollback.len() > SCROLLBACK_CAP {
            self.scrollback.pop_front();
        }
    }

    /// Blits an image immediately. The pending run is flushed first so an
    /// image can never appear underneath buffered text.
    pub fn print_image(&mut self, drv: &mut dyn Driver, img: &RgbaImage, x: i32, y: i32) {
        self.flush_text(drv);
        self.set_cursor_drawn(drv, false);
        drv.draw_image(img, x, y);
    }

    // --- Cursor ----------------------------------------------------------

    fn update_cursor_geometry(&mut self, drv: &dyn Driver) {
        let m = drv.font_metrics(self.font);
        self.cursor.width = m.cell_width;
        self.cursor.height = m.cell_height;
    }

    fn sync_cursor_to_pen(&mut self) {
        self.cursor.x = self.pen.0;
        self.cursor.y = self.pen.1;
    }

    pub fn set_cursor_shape(&mut self, shape: CursorShape) {
        self.cursor.shape = shape;
    }

    pub fn show_cursor(&mut self, drv: &mut dyn Driver, visible: bool) {
        if !visible {
            self.set_cursor_drawn(drv, false);
        }
        self.cursor.visible = visible;
    }

    /// Advances the blink phase; the cursor is drawn by inverting its
    /// rectangle, so toggling needs no saved pixels.
    pub fn blink_tick(&mut self, drv: &mut dyn Driver) {
        if !self.cursor.visible {
            return;
        }
        self.cursor.phase = !self.cursor.phase;
        let phase = self.cursor.phase;
        self.set_cursor_drawn(drv, phase);
    }

    fn set_cursor_drawn(&mut self, drv: &mut dyn Driver, on: bool) {
        if on == self.cursor_drawn {
            return;
        }
        drv.invert_rect(self.cursor.rect());
        self.cursor_drawn = on;
    }

    /// Flushes pending text and makes the cursor visible; called before
    /// the engine parks waiting for a keystroke.
    pub fn prepare_for_input(&mut self, drv: &mut dyn Driver) {
        self.flush_text(drv);
        self.show_cursor(drv, true);
        self.cursor.phase = true;
        self.set_cursor_drawn(drv, true);
    }

    // --- Line-edit echo --------------------------------------------------

    /// Redraws the in-progress command line at its origin and parks the
    /// cursor at the caret. Drawn immediately, not buffered: the edit line
    /// changes with every keystroke.
    pub fn render_edit_line(&mut self, drv: &mut dyn Driver, origin: (i32, i32), text: &str, caret: usize) {
        self.set_cursor_drawn(drv, false);
        let line_height = self.line_height(drv);
        let clear_w = (self.window.right() - origin.0).max(0) as u32;
        drv.fill_rect(
            PixelRect::new(origin.0, origin.1, clear_w, line_height),
            self.palette.resolve(self.bg),
        );
        drv.draw_text_run(origin.0, origin.1, text, self.font, self.palette.resolve(self.fg));
        let caret_x = origin.0 + drv.measure_text(self.font, &text[..caret]) as i32;
        self.pen = (origin.0 + drv.measure_text(self.font, text) as i32, origin.1);
        self.cursor.x = caret_x;
        self.cursor.y = origin.1;
        self.cursor.phase = true;
        self.set_cursor_drawn(drv, true);
    }

    // --- Rendered-text lookup -------------------------------------------

    /// The word of rendered text under a pixel position, if any. Drives the
    /// double-click completion affordance; the source is what was flushed
    /// to the screen, not the edit buffer.
    pub fn word_at(&self, drv: &dyn Driver, x: i32, y: i32) -> Option<String> {
        for record in self.records.iter().rev() {
            let line_height = drv.font_metrics(record.style).line_height();
            let hit_y = y >= record.y && y < record.y + line_height as i32;
            let hit_x = x >= record.x && x < record.x + record.width as i32;
            if !hit_y || !hit_x {
                continue;
            }
            // Locate the clicked grapheme by accumulated advance.
            let mut offset = record.x;
            let mut hit = None;
            for (idx, g) in record.text.grapheme_indices(true) {
                let advance = drv.measure_text(record.style, g) as i32;
                if x < offset + advance {
                    hit = Some(idx);
                    break;
                }
                offset += advance;
            }
            let hit = hit?;
            if !record.text[hit..]
                .chars()
                .next()
                .map(|c| c.is_alphanumeric())
                .unwrap_or(false)
            {
                return None;
            }
            let start = record.text[..hit]
                .rfind(|c: char| !c.is_alphanumeric())
                .map(|i| i + record.text[i..].chars().next().map(char::len_utf8).unwrap_or(1))
                .unwrap_or(0);
            let end = record.text[hit..]
                .find(|c: char| !c.is_alphanumeric())
                .map(|i| hit + i)
                .unwrap_or(record.text.len());
            return Some(record.text[start..end].to_string());
        }
        None
    }

    /// Lines for the scrollback view: scrolled-out text first, then the
    /// still-visible runs grouped by baseline.
    pub fn scrollback_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.scrollback.iter().cloned().collect();
        let mut visible: Vec<&RunRecord> = self.records.iter().collect();
        visible.sort_by_key(|r| (r.y, r.x));
        let mut current_y = i32::MIN;
        for record in visible {
            if record.y != current_y {
                lines.push(String::new());
                current_y = record.y;
            }
            if let Some(last) = lines.last_mut() {
                last.push_str(&record.text);
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests;
