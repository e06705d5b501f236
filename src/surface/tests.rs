// src/surface/tests.rs

use super::*;
use crate::backend::headless::{DrawOp, HeadlessDriver};
use crate::backend::Driver;
use crate::color::{Palette, Rgba, ID_DEFAULT_BG};

const W: u32 = 640;
const H: u32 = 400;

fn fixture() -> (HeadlessDriver, DisplaySurface) {
    let drv = HeadlessDriver::new(W, H);
    let surface = DisplaySurface::new(&drv, Palette::default(), false);
    (drv, surface)
}

#[test]
fn contiguous_prints_batch_into_one_run() {
    let (mut drv, mut surface) = fixture();
    surface.print(&mut drv, "go ");
    surface.print(&mut drv, "north");
    assert!(surface.has_pending_run());
    // Nothing has been rasterized yet.
    assert!(!drv.ops().iter().any(|op| matches!(op, DrawOp::DrawText { .. })));
    surface.flush_text(&mut drv);
    let texts: Vec<&DrawOp> = drv
        .ops()
        .iter()
        .filter(|op| matches!(op, DrawOp::DrawText { .. }))
        .collect();
    assert_eq!(texts.len(), 1);
    match texts[0] {
        DrawOp::DrawText { text, .. } => assert_eq!(text, "go north"),
        _ => unreachable!(),
    }
}

#[test]
fn batching_is_lossless_and_order_preserving() {
    // The same text drawn as several contiguous runs must produce the same
    // raster as a single concatenated run.
    let (mut drv_a, mut surface_a) = fixture();
    surface_a.print(&mut drv_a, "go ");
    surface_a.print(&mut drv_a, "nor");
    surface_a.print(&mut drv_a, "th");
    surface_a.flush_text(&mut drv_a);

    let (mut drv_b, mut surface_b) = fixture();
    surface_b.print(&mut drv_b, "go north");
    surface_b.flush_text(&mut drv_b);

    assert_eq!(drv_a.pixels(), drv_b.pixels());
}

#[test]
fn color_change_flushes_the_pending_run() {
    let (mut drv, mut surface) = fixture();
    surface.print(&mut drv, "red");
    surface.set_fg(&mut drv, 4);
    assert!(!surface.has_pending_run());
    let flushed: Vec<String> = surface.records().map(|r| r.text.clone()).collect();
    assert_eq!(flushed, vec!["red".to_string()]);
}

#[test]
fn font_change_flushes_and_resizes_the_cursor() {
    let (mut drv, mut surface) = fixture();
    surface.print(&mut drv, "text");
    surface.set_font(&mut drv, FontStyle::FIXED);
    assert!(!surface.has_pending_run());
    let fixed = drv.font_metrics(FontStyle::FIXED);
    assert_eq!(surface.cursor().rect().h, fixed.cell_height.max(2));
}

#[test]
fn newline_flushes_and_advances_the_pen() {
    let (mut drv, mut surface) = fixture();
    surface.print(&mut drv, "one\ntwo");
    let first_y = surface.records().next().map(|r| r.y).unwrap();
    assert_eq!(first_y, 0);
    let line_height = drv.font_metrics(surface.font()).line_height();
    assert_eq!(surface.pen().1, line_height as i32);
    assert!(surface.pen().0 > 0);
}

#[test]
fn noncontiguous_caret_move_starts_a_new_run() {
    let (mut drv, mut surface) = fixture();
    surface.set_font(&mut drv, FontStyle::FIXED);
    surface.print(&mut drv, "ab");
    surface.set_caret_cell(&mut drv, 10, 5);
    surface.print(&mut drv, "cd");
    surface.flush_text(&mut drv);
    let texts: Vec<String> = surface.records().map(|r| r.text.clone()).collect();
    assert_eq!(texts, vec!["ab".to_string(), "cd".to_string()]);
}

#[test]
fn scroll_by_zero_is_a_no_op() {
    let (mut drv, mut surface) = fixture();
    surface.print(&mut drv, "content");
    surface.flush_text(&mut drv);
    let before = drv.pixels().to_vec();
    drv.clear_ops();
    surface.scroll_up(&mut drv, PixelRect::new(0, 0, W, H), 0, false);
    assert_eq!(drv.pixels(), &before[..]);
    assert!(!drv.ops().iter().any(|op| matches!(op, DrawOp::CopyArea { .. })));
}

#[test]
fn scroll_moves_content_up_and_fills_the_exposed_strip() {
    let (mut drv, mut surface) = fixture();
    let rect = PixelRect::new(0, 0, W, 160);
    // Paint a marker row inside the scroll region.
    drv.fill_rect(PixelRect::new(0, 32, W, 16), Rgba::opaque(9, 9, 9));
    surface.scroll_up(&mut drv, rect, 16, false);
    // Marker moved up one line.
    assert_eq!(drv.pixel(0, 16), drv.pixel(5, 20));
    assert_eq!(drv.pixel(0, 16) & 0x00ff_ffff, 0x0009_0909);
    // The exposed strip is background.
    let bg = surface.palette().resolve(ID_DEFAULT_BG);
    let expected = ((bg.a as u32) << 24) | ((bg.r as u32) << 16) | ((bg.g as u32) << 8) | bg.b as u32;
    assert_eq!(drv.pixel(10, 150), expected);
}

#[test]
fn scroll_flushes_pending_text_first() {
    let (mut drv, mut surface) = fixture();
    surface.print(&mut drv, "pending");
    surface.scroll_up(&mut drv, PixelRect::new(0, 0, W, H), 16, false);
    assert!(!surface.has_pending_run());
}

#[test]
fn full_screen_clear_sentinel_fills_everything_and_refreshes_margin() {
    let (mut drv, mut surface) = fixture();
    surface.print(&mut drv, "old text");
    surface.flush_text(&mut drv);
    surface.set_bg(&mut drv, 0);
    surface.clear_region(&mut drv, PixelRect::new(0, 0, 0, 0));
    // Every pixel is the (black) background.
    assert!(drv.pixels().iter().all(|p| p & 0x00ff_ffff == 0));
    assert_eq!(surface.margin_color(), surface.palette().resolve(crate::color::ID_MARGIN));
    // Cleared text no longer participates in word lookup.
    assert_eq!(surface.word_at(&drv, 2, 2), None);
}

#[test]
fn images_never_appear_under_buffered_text() {
    let (mut drv, mut surface) = fixture();
    surface.print(&mut drv, "caption");
    let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([1, 2, 3, 255]));
    surface.print_image(&mut drv, &img, 100, 100);
    let ops = drv.ops();
    let text_pos = ops
        .iter()
        .position(|op| matches!(op, DrawOp::DrawText { .. }))
        .expect("text must be flushed");
    let image_pos = ops
        .iter()
        .position(|op| matches!(op, DrawOp::DrawImage { .. }))
        .expect("image must be drawn");
    assert!(text_pos < image_pos);
}

#[test]
fn window_edges_clamp_to_the_surface_to_avoid_slivers() {
    let (mut drv, mut surface) = fixture();
    let m = drv.font_metrics(FontStyle::FIXED);
    let cols = W / m.cell_width;
    let rows = H / m.cell_height;
    // W=640 and H=400 divide evenly by 8x16 cells, so the nominal window
    // edge lands within one cell of the surface edge and must be extended.
    surface.set_window_cells(&mut drv, 1, 1, cols as u16, rows as u16);
    assert_eq!(surface.window().right(), W as i32);
    assert_eq!(surface.window().bottom(), H as i32);
}

#[test]
fn word_lookup_finds_rendered_words() {
    let (mut drv, mut surface) = fixture();
    surface.set_font(&mut drv, FontStyle::FIXED);
    surface.print(&mut drv, "open the door");
    surface.flush_text(&mut drv);
    // "the" starts after "open " (5 fixed cells of 8 px).
    let word = surface.word_at(&drv, 5 * 8 + 2, 4);
    assert_eq!(word.as_deref(), Some("the"));
    // A click on the space between words finds nothing.
    assert_eq!(surface.word_at(&drv, 4 * 8 + 2, 4), None);
}

#[test]
fn scrolled_out_text_lands_in_scrollback() {
    let (mut drv, mut surface) = fixture();
    surface.set_font(&mut drv, FontStyle::FIXED);
    surface.print(&mut drv, "oldest line");
    surface.flush_text(&mut drv);
    let rect = PixelRect::new(0, 0, W, 160);
    surface.scroll_up(&mut drv, rect, 16, false);
    let lines = surface.scrollback_lines();
    assert!(lines.iter().any(|l| l.contains("oldest line")));
}

#[test]
fn blink_toggling_restores_the_raster() {
    let (mut drv, mut surface) = fixture();
    surface.print(&mut drv, "steady");
    surface.prepare_for_input(&mut drv);
    let lit = drv.pixels().to_vec();
    surface.blink_tick(&mut drv);
    surface.blink_tick(&mut drv);
    // Two phase flips return to the drawn-cursor raster.
    assert_eq!(drv.pixels(), &lit[..]);
}
