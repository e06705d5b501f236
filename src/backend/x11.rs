// src/backend/x11.rs

//! X11 backend driver: an Xlib window, Xft text, and a server-side back
//! buffer.
//!
//! All drawing lands on a pixmap the same size as the window; `present`
//! copies it over, so exposes are cheap repaints and the scrollback overlay
//! can snapshot the buffer wholesale. Fonts are opened through Xft from the
//! fontconfig names in settings, one face per style combination, loaded on
//! first use.

#![allow(non_snake_case)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::CString;
use std::mem;
use std::process::Command;
use std::ptr;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use image::RgbaImage;
use libc::{c_char, c_int, c_long, c_uchar, c_uint, c_ulong};
use log::{debug, info, warn};
use x11::keysym;
use x11::xft;
use x11::xlib;
use x11::xrender::{XGlyphInfo, XRenderColor};

use super::{BackendEvent, Driver, MouseButton, PixelRect};
use crate::color::Rgba;
use crate::config::{FontConfig, Settings};
use crate::font::{FontMetrics, FontStyle};
use crate::keys::{KeySymbol, Modifiers};

const KEY_TEXT_BUFFER_SIZE: usize = 32;
const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(400);
const DOUBLE_CLICK_SLOP: i32 = 5;
/// One opacity step of the fade loop.
const FADE_FRAME: Duration = Duration::from_millis(16);
/// How long `clipboard_text` waits for the selection owner to reply.
const SELECTION_TIMEOUT: Duration = Duration::from_millis(250);

pub struct XDriver {
    display: *mut xlib::Display,
    screen: c_int,
    visual: *mut xlib::Visual,
    colormap: xlib::Colormap,
    depth: c_int,
    window: xlib::Window,
    /// Back buffer; every draw call targets this, `present` copies it out.
    pixmap: xlib::Pixmap,
    saved: Option<xlib::Pixmap>,
    draw: *mut xft::XftDraw,
    gc: xlib::GC,
    width: u32,
    height: u32,
    bg_pixel: c_ulong,
    fonts: RefCell<HashMap<FontStyle, *mut xft::XftFont>>,
    font_config: FontConfig,
    colors: HashMap<Rgba, xft::XftColor>,
    wm_protocols: xlib::Atom,
    wm_delete: xlib::Atom,
    net_wm_state: xlib::Atom,
    net_wm_fullscreen: xlib::Atom,
    net_wm_opacity: xlib::Atom,
    clipboard_sel: xlib::Atom,
    utf8_string: xlib::Atom,
    targets: xlib::Atom,
    paste_prop: xlib::Atom,
    clipboard: Option<String>,
    owns_clipboard: bool,
    fullscreen: bool,
    last_click: Option<(Instant, i32, i32)>,
    cleaned_up: bool,
}

fn intern(display: *mut xlib::Display, name: &[u8]) -> xlib::Atom {
    unsafe { xlib::XInternAtom(display, name.as_ptr() as *const c_char, xlib::False) }
}

fn state_to_modifiers(state: c_uint) -> Modifiers {
    let mut modifiers = Modifiers::empty();
    if state & xlib::ShiftMask != 0 {
        modifiers.insert(Modifiers::SHIFT);
    }
    if state & xlib::ControlMask != 0 {
        modifiers.insert(Modifiers::CONTROL);
    }
    if state & xlib::Mod1Mask != 0 {
        modifiers.insert(Modifiers::ALT);
    }
    if state & xlib::Mod4Mask != 0 {
        modifiers.insert(Modifiers::SUPER);
    }
    modifiers
}

fn keysym_to_symbol(keysym_val: xlib::KeySym, text: &str) -> KeySymbol {
    if keysym_val > u32::MAX as xlib::KeySym {
        return char_fallback(text);
    }
    match keysym_val as u32 {
        keysym::XK_Return | keysym::XK_KP_Enter => KeySymbol::Enter,
        keysym::XK_BackSpace => KeySymbol::Backspace,
        keysym::XK_Tab | keysym::XK_ISO_Left_Tab => KeySymbol::Tab,
        keysym::XK_Escape => KeySymbol::Escape,
        keysym::XK_Home | keysym::XK_KP_Home => KeySymbol::Home,
        keysym::XK_End | keysym::XK_KP_End => KeySymbol::End,
        keysym::XK_Left | keysym::XK_KP_Left => KeySymbol::Left,
        keysym::XK_Right | keysym::XK_KP_Right => KeySymbol::Right,
        keysym::XK_Up | keysym::XK_KP_Up => KeySymbol::Up,
        keysym::XK_Down | keysym::XK_KP_Down => KeySymbol::Down,
        keysym::XK_Page_Up | keysym::XK_KP_Page_Up => KeySymbol::PageUp,
        keysym::XK_Page_Down | keysym::XK_KP_Page_Down => KeySymbol::PageDown,
        keysym::XK_Insert | keysym::XK_KP_Insert => KeySymbol::Insert,
        keysym::XK_Delete | keysym::XK_KP_Delete => KeySymbol::Delete,
        keysym::XK_F1 => KeySymbol::F1,
        keysym::XK_F2 => KeySymbol::F2,
        keysym::XK_F3 => KeySymbol::F3,
        keysym::XK_F4 => KeySymbol::F4,
        keysym::XK_F5 => KeySymbol::F5,
        keysym::XK_F6 => KeySymbol::F6,
        keysym::XK_F7 => KeySymbol::F7,
        keysym::XK_F8 => KeySymbol::F8,
        keysym::XK_F9 => KeySymbol::F9,
        keysym::XK_F10 => KeySymbol::F10,
        keysym::XK_F11 => KeySymbol::F11,
        keysym::XK_F12 => KeySymbol::F12,
        _ => char_fallback(text),
    }
}

fn char_fallback(text: &str) -> KeySymbol {
    match text.chars().next() {
        Some(ch) if ch != '\u{FFFD}' && !ch.is_control() => KeySymbol::Char(ch),
        _ => KeySymbol::Unknown,
    }
}

impl XDriver {
    pub fn new(settings: &Settings) -> Result<Self> {
        let display = unsafe { xlib::XOpenDisplay(ptr::null()) };
        if display.is_null() {
            bail!("cannot open X display; is DISPLAY set?");
        }
        let screen = unsafe { xlib::XDefaultScreen(display) };
        let bg = settings.colors.background;

        let mut driver = XDriver {
            display,
            screen,
            visual: unsafe { xlib::XDefaultVisual(display, screen) },
            colormap: unsafe { xlib::XDefaultColormap(display, screen) },
            depth: unsafe { xlib::XDefaultDepth(display, screen) },
            window: 0,
            pixmap: 0,
            saved: None,
            draw: ptr::null_mut(),
            gc: ptr::null_mut(),
            width: 0,
            height: 0,
            bg_pixel: ((bg.r as c_ulong) << 16) | ((bg.g as c_ulong) << 8) | bg.b as c_ulong,
            fonts: RefCell::new(HashMap::new()),
            font_config: settings.fonts.clone(),
            colors: HashMap::new(),
            wm_protocols: intern(display, b"WM_PROTOCOLS\0"),
            wm_delete: intern(display, b"WM_DELETE_WINDOW\0"),
            net_wm_state: intern(display, b"_NET_WM_STATE\0"),
            net_wm_fullscreen: intern(display, b"_NET_WM_STATE_FULLSCREEN\0"),
            net_wm_opacity: intern(display, b"_NET_WM_WINDOW_OPACITY\0"),
            clipboard_sel: intern(display, b"CLIPBOARD\0"),
            utf8_string: intern(display, b"UTF8_STRING\0"),
            targets: intern(display, b"TARGETS\0"),
            paste_prop: intern(display, b"HUGO_SHELL_PASTE\0"),
            clipboard: None,
            owns_clipboard: false,
            fullscreen: false,
            last_click: None,
            cleaned_up: false,
        };

        // Both base faces must load; styled variants fall back to them.
        let fixed = driver.font_for(FontStyle::FIXED);
        let main = driver.font_for(FontStyle::empty());
        if fixed.is_null() || main.is_null() {
            bail!(
                "could not open the configured fonts '{}' / '{}'",
                driver.font_config.main,
                driver.font_config.fixed
            );
        }

        let cell = driver.metrics_of(fixed);
        let margin = settings.appearance.margin_px;
        let width = (settings.appearance.width_cells as u32 * cell.cell_width + 2 * margin).max(64);
        let height =
            (settings.appearance.height_cells as u32 * cell.cell_height + 2 * margin).max(64);
        driver.create_window(width, height, &cell)?;
        driver.create_back_buffer(width, height)?;

        unsafe {
            xlib::XMapWindow(driver.display, driver.window);
            xlib::XSync(driver.display, xlib::False);
        }
        info!("X11 window up, {}x{} px, depth {}", width, height, driver.depth);
        Ok(driver)
    }

    fn create_window(&mut self, width: u32, height: u32, cell: &FontMetrics) -> Result<()> {
        unsafe {
            let root = xlib::XRootWindow(self.display, self.screen);
            let mut attributes: xlib::XSetWindowAttributes = mem::zeroed();
            attributes.colormap = self.colormap;
            attributes.background_pixel = self.bg_pixel;
            attributes.border_pixel = self.bg_pixel;
            attributes.event_mask = xlib::ExposureMask
                | xlib::KeyPressMask
                | xlib::StructureNotifyMask
                | xlib::FocusChangeMask
                | xlib::ButtonPressMask
                | xlib::ButtonReleaseMask;
            self.window = xlib::XCreateWindow(
                self.display,
                root,
                0,
                0,
                width as c_uint,
                height as c_uint,
                0,
                self.depth,
                xlib::InputOutput as c_uint,
                self.visual,
                xlib::CWColormap | xlib::CWBackPixel | xlib::CWBorderPixel | xlib::CWEventMask,
                &mut attributes,
            );
            if self.window == 0 {
                bail!("XCreateWindow failed");
            }

            xlib::XSetWMProtocols(self.display, self.window, [self.wm_delete].as_mut_ptr(), 1);

            let mut size_hints: xlib::XSizeHints = mem::zeroed();
            size_hints.flags = xlib::PResizeInc | xlib::PMinSize;
            size_hints.width_inc = cell.cell_width as c_int;
            size_hints.height_inc = cell.cell_height as c_int;
            size_hints.min_width = cell.cell_width as c_int;
            size_hints.min_height = cell.cell_height as c_int;
            xlib::XSetWMNormalHints(self.display, self.window, &mut size_hints);
        }
        self.set_title("hugo-shell");
        Ok(())
    }

    fn create_back_buffer(&mut self, width: u32, height: u32) -> Result<()> {
        unsafe {
            self.pixmap = xlib::XCreatePixmap(
                self.display,
                self.window,
                width,
                height,
                self.depth as c_uint,
            );
            if self.pixmap == 0 {
                bail!("XCreatePixmap failed");
            }
            let gc_values: xlib::XGCValues = mem::zeroed();
            self.gc = xlib::XCreateGC(
                self.display,
                self.pixmap,
                0,
                &gc_values as *const _ as *mut _,
            );
            if self.gc.is_null() {
                bail!("XCreateGC failed");
            }
            xlib::XSetForeground(self.display, self.gc, self.bg_pixel);
            xlib::XFillRectangle(self.display, self.pixmap, self.gc, 0, 0, width, height);
            self.draw = xft::XftDrawCreate(self.display, self.pixmap, self.visual, self.colormap);
            if self.draw.is_null() {
                bail!("XftDrawCreate failed");
            }
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Replaces the back buffer after a window resize, carrying the old
    /// contents over. The snapshot pixmap is dropped; the overlay it backs
    /// cannot survive a geometry change.
    fn resize_back_buffer(&mut self, width: u32, height: u32) {
        unsafe {
            let fresh =
                xlib::XCreatePixmap(self.display, self.window, width, height, self.depth as c_uint);
            if fresh == 0 {
                warn!("XCreatePixmap failed during resize, keeping old buffer");
                return;
            }
            xlib::XSetForeground(self.display, self.gc, self.bg_pixel);
            xlib::XFillRectangle(self.display, fresh, self.gc, 0, 0, width, height);
            xlib::XCopyArea(
                self.display,
                self.pixmap,
                fresh,
                self.gc,
                0,
                0,
                self.width.min(width),
                self.height.min(height),
                0,
                0,
            );
            xft::XftDrawChange(self.draw, fresh);
            xlib::XFreePixmap(self.display, self.pixmap);
            self.pixmap = fresh;
            if let Some(saved) = self.saved.take() {
                xlib::XFreePixmap(self.display, saved);
            }
        }
        self.width = width;
        self.height = height;
        debug!("back buffer resized to {}x{}", width, height);
    }

    fn open_font(&self, family: &str, size: u16, style: FontStyle) -> *mut xft::XftFont {
        let mut pattern = format!("{}:size={}", family, size);
        if style.contains(FontStyle::BOLD) {
            pattern.push_str(":weight=bold");
        }
        if style.contains(FontStyle::ITALIC) {
            pattern.push_str(":slant=italic");
        }
        let cstr = match CString::new(pattern.clone()) {
            Ok(c) => c,
            Err(_) => return ptr::null_mut(),
        };
        let font = unsafe { xft::XftFontOpenName(self.display, self.screen, cstr.as_ptr()) };
        if font.is_null() {
            warn!("could not open font pattern '{}'", pattern);
        }
        font
    }

    /// The Xft face for a style, opened on first use. Underline is drawn,
    /// not a face property, so it never selects a different font.
    fn font_for(&self, style: FontStyle) -> *mut xft::XftFont {
        let key = style - FontStyle::UNDERLINE;
        if let Some(&font) = self.fonts.borrow().get(&key) {
            return font;
        }
        let (family, size) = if key.is_fixed() {
            (self.font_config.fixed.clone(), self.font_config.fixed_size)
        } else {
            (self.font_config.main.clone(), self.font_config.main_size)
        };
        let mut font = self.open_font(&family, size, key);
        if font.is_null() {
            let base = key & FontStyle::FIXED;
            font = self
                .fonts
                .borrow()
                .get(&base)
                .copied()
                .unwrap_or(ptr::null_mut());
        }
        if !font.is_null() {
            self.fonts.borrow_mut().insert(key, font);
        }
        font
    }

    fn metrics_of(&self, font: *mut xft::XftFont) -> FontMetrics {
        let (ascent, descent) = unsafe { ((*font).ascent, (*font).descent) };
        FontMetrics {
            cell_width: self.advance_of(font, "M"),
            cell_height: (ascent + descent).max(1) as u32,
            ascent: ascent.max(0) as u32,
        }
    }

    fn advance_of(&self, font: *mut xft::XftFont, text: &str) -> u32 {
        let mut extents: XGlyphInfo = unsafe { mem::zeroed() };
        unsafe {
            xft::XftTextExtentsUtf8(
                self.display,
                font,
                text.as_ptr(),
                text.len() as c_int,
                &mut extents,
            );
        }
        extents.xOff.max(0) as u32
    }

    fn xft_color(&mut self, color: Rgba) -> xft::XftColor {
        if let Some(cached) = self.colors.get(&color) {
            return *cached;
        }
        let render_color = XRenderColor {
            red: ((color.r as u16) << 8) | color.r as u16,
            green: ((color.g as u16) << 8) | color.g as u16,
            blue: ((color.b as u16) << 8) | color.b as u16,
            alpha: 0xffff,
        };
        let mut allocated: xft::XftColor = unsafe { mem::zeroed() };
        let ok = unsafe {
            xft::XftColorAllocValue(
                self.display,
                self.visual,
                self.colormap,
                &render_color,
                &mut allocated,
            )
        };
        if ok == 0 {
            warn!("XftColorAllocValue failed for {:?}", color);
        }
        self.colors.insert(color, allocated);
        allocated
    }

    fn translate_key(&self, xkey: &mut xlib::XKeyEvent) -> Option<BackendEvent> {
        let mut buf = [0u8; KEY_TEXT_BUFFER_SIZE];
        let mut keysym_val: xlib::KeySym = 0;
        let count = unsafe {
            xlib::XLookupString(
                xkey,
                buf.as_mut_ptr() as *mut c_char,
                buf.len() as c_int,
                &mut keysym_val,
                ptr::null_mut(),
            )
        };
        // XLookupString yields Latin-1 under the default locale.
        let text: String = buf[..count.max(0) as usize]
            .iter()
            .map(|&b| b as char)
            .collect();
        let symbol = keysym_to_symbol(keysym_val, &text);
        if symbol == KeySymbol::Unknown && text.is_empty() {
            // Bare modifier or a dead key; nothing to deliver.
            return None;
        }
        Some(BackendEvent::Key {
            symbol,
            modifiers: state_to_modifiers(xkey.state),
            text,
        })
    }

    fn translate_button(&mut self, xbutton: &xlib::XButtonEvent) -> BackendEvent {
        let button = match xbutton.button {
            xlib::Button1 => MouseButton::Left,
            xlib::Button2 => MouseButton::Middle,
            xlib::Button3 => MouseButton::Right,
            _ => MouseButton::Other,
        };
        let mut click_count = 1;
        if button == MouseButton::Left {
            let now = Instant::now();
            if let Some((at, x, y)) = self.last_click {
                if now.duration_since(at) <= DOUBLE_CLICK_WINDOW
                    && (xbutton.x - x).abs() <= DOUBLE_CLICK_SLOP
                    && (xbutton.y - y).abs() <= DOUBLE_CLICK_SLOP
                {
                    click_count = 2;
                }
            }
            // A completed double click does not seed a triple.
            self.last_click = if click_count == 2 {
                None
            } else {
                Some((now, xbutton.x, xbutton.y))
            };
        }
        BackendEvent::MouseDown {
            x: xbutton.x,
            y: xbutton.y,
            button,
            click_count,
        }
    }

    /// Answers a paste request from another client out of our clipboard
    /// string.
    fn serve_selection(&mut self, req: &xlib::XSelectionRequestEvent) {
        let property = if req.property != 0 { req.property } else { req.target };
        let served = unsafe {
            if req.target == self.targets {
                let atoms: [xlib::Atom; 2] = [self.targets, self.utf8_string];
                xlib::XChangeProperty(
                    self.display,
                    req.requestor,
                    property,
                    xlib::XA_ATOM,
                    32,
                    xlib::PropModeReplace,
                    atoms.as_ptr() as *const c_uchar,
                    atoms.len() as c_int,
                );
                true
            } else if req.target == self.utf8_string || req.target == xlib::XA_STRING {
                match self.clipboard.as_ref() {
                    Some(text) => {
                        xlib::XChangeProperty(
                            self.display,
                            req.requestor,
                            property,
                            req.target,
                            8,
                            xlib::PropModeReplace,
                            text.as_ptr(),
                            text.len() as c_int,
                        );
                        true
                    }
                    None => false,
                }
            } else {
                false
            }
        };
        let notify = xlib::XSelectionEvent {
            type_: xlib::SelectionNotify,
            serial: 0,
            send_event: xlib::True,
            display: self.display,
            requestor: req.requestor,
            selection: req.selection,
            target: req.target,
            property: if served { property } else { 0 },
            time: req.time,
        };
        let mut event = xlib::XEvent { selection: notify };
        unsafe {
            xlib::XSendEvent(self.display, req.requestor, xlib::False, 0, &mut event);
            xlib::XFlush(self.display);
        }
    }

    fn read_paste_property(&mut self) -> Option<String> {
        let mut actual_type: xlib::Atom = 0;
        let mut actual_format: c_int = 0;
        let mut item_count: c_ulong = 0;
        let mut bytes_after: c_ulong = 0;
        let mut data: *mut c_uchar = ptr::null_mut();
        let status = unsafe {
            xlib::XGetWindowProperty(
                self.display,
                self.window,
                self.paste_prop,
                0,
                c_long::MAX / 4,
                xlib::True,
                xlib::AnyPropertyType as xlib::Atom,
                &mut actual_type,
                &mut actual_format,
                &mut item_count,
                &mut bytes_after,
                &mut data,
            )
        };
        if status != 0 || data.is_null() {
            return None;
        }
        let text = unsafe {
            let bytes = std::slice::from_raw_parts(data, item_count as usize);
            let text = String::from_utf8_lossy(bytes).into_owned();
            xlib::XFree(data as *mut _);
            text
        };
        Some(text)
    }

    fn set_window_opacity(&mut self, alpha: u8) {
        let value = ((alpha as u64 * 0xffff_ffff) / 255) as c_ulong;
        unsafe {
            if alpha == 255 {
                xlib::XDeleteProperty(self.display, self.window, self.net_wm_opacity);
            } else {
                xlib::XChangeProperty(
                    self.display,
                    self.window,
                    self.net_wm_opacity,
                    xlib::XA_CARDINAL,
                    32,
                    xlib::PropModeReplace,
                    &value as *const c_ulong as *const c_uchar,
                    1,
                );
            }
            xlib::XFlush(self.display);
        }
    }
}

impl Driver for XDriver {
    fn process_events(&mut self) -> Result<Vec<BackendEvent>> {
        let mut out = Vec::new();
        unsafe {
            while xlib::XPending(self.display) > 0 {
                let mut event: xlib::XEvent = mem::zeroed();
                xlib::XNextEvent(self.display, &mut event);
                match event.get_type() {
                    xlib::KeyPress => {
                        let mut xkey = event.key;
                        if let Some(translated) = self.translate_key(&mut xkey) {
                            out.push(translated);
                        }
                    }
                    xlib::ButtonPress => {
                        let xbutton = event.button;
                        out.push(self.translate_button(&xbutton));
                    }
                    xlib::ConfigureNotify => {
                        let conf = event.configure;
                        let (w, h) = (conf.width.max(1) as u32, conf.height.max(1) as u32);
                        if (w, h) != (self.width, self.height) {
                            self.resize_back_buffer(w, h);
                            out.push(BackendEvent::Resize {
                                width_px: w,
                                height_px: h,
                            });
                        }
                    }
                    xlib::Expose => {
                        if event.expose.count == 0 {
                            let _ = self.present();
                        }
                    }
                    xlib::FocusIn => out.push(BackendEvent::FocusGained),
                    xlib::FocusOut => out.push(BackendEvent::FocusLost),
                    xlib::ClientMessage => {
                        let msg = event.client_message;
                        if msg.message_type == self.wm_protocols
                            && msg.data.get_long(0) as xlib::Atom == self.wm_delete
                        {
                            out.push(BackendEvent::CloseRequested);
                        }
                    }
                    xlib::SelectionRequest => {
                        let req = event.selection_request;
                        self.serve_selection(&req);
                    }
                    xlib::SelectionClear => self.owns_clipboard = false,
                    _ => {}
                }
            }
        }
        Ok(out)
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn font_metrics(&self, style: FontStyle) -> FontMetrics {
        let font = self.font_for(style);
        if font.is_null() {
            return FontMetrics {
                cell_width: 8,
                cell_height: 16,
                ascent: 12,
            };
        }
        self.metrics_of(font)
    }

    fn measure_text(&self, style: FontStyle, text: &str) -> u32 {
        let font = self.font_for(style);
        if font.is_null() || text.is_empty() {
            return 0;
        }
        self.advance_of(font, text)
    }

    fn fill_rect(&mut self, rect: PixelRect, color: Rgba) {
        let rect = rect.clamped_to(self.width, self.height);
        if rect.is_empty() {
            return;
        }
        let xft_color = self.xft_color(color);
        unsafe {
            xft::XftDrawRect(self.draw, &xft_color, rect.x, rect.y, rect.w, rect.h);
        }
    }

    fn invert_rect(&mut self, rect: PixelRect) {
        let rect = rect.clamped_to(self.width, self.height);
        if rect.is_empty() {
            return;
        }
        unsafe {
            xlib::XSetFunction(self.display, self.gc, xlib::GXinvert);
            xlib::XFillRectangle(
                self.display,
                self.pixmap,
                self.gc,
                rect.x,
                rect.y,
                rect.w,
                rect.h,
            );
            xlib::XSetFunction(self.display, self.gc, xlib::GXcopy);
        }
    }

    fn draw_text_run(&mut self, x: i32, y: i32, text: &str, style: FontStyle, fg: Rgba) {
        if text.is_empty() {
            return;
        }
        let font = self.font_for(style);
        if font.is_null() {
            return;
        }
        let color = self.xft_color(fg);
        let ascent = unsafe { (*font).ascent };
        unsafe {
            xft::XftDrawStringUtf8(
                self.draw,
                &color,
                font,
                x,
                y + ascent,
                text.as_ptr(),
                text.len() as c_int,
            );
        }
        if style.contains(FontStyle::UNDERLINE) {
            let advance = self.advance_of(font, text);
            unsafe {
                xft::XftDrawRect(self.draw, &color, x, y + ascent + 1, advance, 1);
            }
        }
    }

    fn copy_area(&mut self, src: PixelRect, dst_x: i32, dst_y: i32) {
        let src = src.clamped_to(self.width, self.height);
        if src.is_empty() {
            return;
        }
        unsafe {
            xlib::XCopyArea(
                self.display,
                self.pixmap,
                self.pixmap,
                self.gc,
                src.x,
                src.y,
                src.w,
                src.h,
                dst_x,
                dst_y,
            );
        }
    }

    fn draw_image(&mut self, img: &RgbaImage, x: i32, y: i32) {
        if self.depth != 24 && self.depth != 32 {
            warn!("unsupported display depth {} for pictures", self.depth);
            return;
        }
        let (w, h) = (img.width(), img.height());
        if w == 0 || h == 0 {
            return;
        }
        // BGRX byte order under LSBFirst, independent of host endianness.
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for pixel in img.pixels() {
            let [r, g, b, _a] = pixel.0;
            data.extend_from_slice(&[b, g, r, 0]);
        }
        unsafe {
            let image = xlib::XCreateImage(
                self.display,
                self.visual,
                self.depth as c_uint,
                xlib::ZPixmap,
                0,
                data.as_mut_ptr() as *mut c_char,
                w,
                h,
                32,
                (w * 4) as c_int,
            );
            if image.is_null() {
                warn!("XCreateImage failed for a {}x{} picture", w, h);
                return;
            }
            (*image).byte_order = xlib::LSBFirst;
            xlib::XPutImage(self.display, self.pixmap, self.gc, image, 0, 0, x, y, w, h);
            // The pixel data belongs to the Vec; free only the struct.
            (*image).data = ptr::null_mut();
            xlib::XFree(image as *mut _);
        }
    }

    fn present(&mut self) -> Result<()> {
        unsafe {
            xlib::XCopyArea(
                self.display,
                self.pixmap,
                self.window,
                self.gc,
                0,
                0,
                self.width,
                self.height,
                0,
                0,
            );
            xlib::XFlush(self.display);
        }
        Ok(())
    }

    fn snapshot(&mut self) {
        unsafe {
            if let Some(old) = self.saved.take() {
                xlib::XFreePixmap(self.display, old);
            }
            let copy = xlib::XCreatePixmap(
                self.display,
                self.window,
                self.width,
                self.height,
                self.depth as c_uint,
            );
            if copy == 0 {
                warn!("XCreatePixmap failed for snapshot");
                return;
            }
            xlib::XCopyArea(
                self.display,
                self.pixmap,
                copy,
                self.gc,
                0,
                0,
                self.width,
                self.height,
                0,
                0,
            );
            self.saved = Some(copy);
        }
    }

    fn restore(&mut self) {
        unsafe {
            if let Some(saved) = self.saved.take() {
                xlib::XCopyArea(
                    self.display,
                    saved,
                    self.pixmap,
                    self.gc,
                    0,
                    0,
                    self.width,
                    self.height,
                    0,
                    0,
                );
                xlib::XFreePixmap(self.display, saved);
            }
        }
    }

    fn set_title(&mut self, title: &str) {
        let Ok(cstr) = CString::new(title) else {
            return;
        };
        unsafe {
            xlib::XStoreName(self.display, self.window, cstr.as_ptr() as *mut c_char);
            let net_wm_name = intern(self.display, b"_NET_WM_NAME\0");
            if net_wm_name != 0 && self.utf8_string != 0 {
                xlib::XChangeProperty(
                    self.display,
                    self.window,
                    net_wm_name,
                    self.utf8_string,
                    8,
                    xlib::PropModeReplace,
                    cstr.as_ptr() as *const c_uchar,
                    cstr.as_bytes().len() as c_int,
                );
            }
        }
    }

    fn set_fullscreen(&mut self, on: bool) {
        let mut data: xlib::ClientMessageData = unsafe { mem::zeroed() };
        data.set_long(0, on as c_long); // _NET_WM_STATE_ADD / _NET_WM_STATE_REMOVE
        data.set_long(1, self.net_wm_fullscreen as c_long);
        data.set_long(3, 1); // normal application source
        let message = xlib::XClientMessageEvent {
            type_: xlib::ClientMessage,
            serial: 0,
            send_event: xlib::True,
            display: self.display,
            window: self.window,
            message_type: self.net_wm_state,
            format: 32,
            data,
        };
        let mut event = xlib::XEvent {
            client_message: message,
        };
        unsafe {
            xlib::XSendEvent(
                self.display,
                xlib::XDefaultRootWindow(self.display),
                xlib::False,
                xlib::SubstructureRedirectMask | xlib::SubstructureNotifyMask,
                &mut event,
            );
            xlib::XFlush(self.display);
        }
        self.fullscreen = on;
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    fn set_clipboard(&mut self, text: &str) {
        self.clipboard = Some(text.to_string());
        unsafe {
            xlib::XSetSelectionOwner(
                self.display,
                self.clipboard_sel,
                self.window,
                xlib::CurrentTime,
            );
            self.owns_clipboard =
                xlib::XGetSelectionOwner(self.display, self.clipboard_sel) == self.window;
        }
        if !self.owns_clipboard {
            warn!("could not take ownership of the clipboard selection");
        }
    }

    fn clipboard_text(&mut self) -> Option<String> {
        if self.owns_clipboard {
            return self.clipboard.clone();
        }
        unsafe {
            xlib::XConvertSelection(
                self.display,
                self.clipboard_sel,
                self.utf8_string,
                self.paste_prop,
                self.window,
                xlib::CurrentTime,
            );
            xlib::XFlush(self.display);
            let deadline = Instant::now() + SELECTION_TIMEOUT;
            let mut event: xlib::XEvent = mem::zeroed();
            loop {
                if xlib::XCheckTypedWindowEvent(
                    self.display,
                    self.window,
                    xlib::SelectionNotify,
                    &mut event,
                ) == xlib::True
                {
                    if event.selection.property == 0 {
                        return None;
                    }
                    return self.read_paste_property();
                }
                if Instant::now() >= deadline {
                    debug!("selection owner did not reply in time");
                    return None;
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }

    fn open_url(&mut self, url: &str) {
        if let Err(e) = Command::new("xdg-open").arg(url).spawn() {
            warn!("could not open '{}': {}", url, e);
        }
    }

    fn fade_screen(&mut self, millis: u32, start_alpha: u8, end_alpha: u8) {
        let steps = (millis as u64 / FADE_FRAME.as_millis() as u64).max(1) as u32;
        for step in 0..=steps {
            let t = step as f32 / steps as f32;
            let alpha = start_alpha as f32 + (end_alpha as f32 - start_alpha as f32) * t;
            self.set_window_opacity(alpha.round().clamp(0.0, 255.0) as u8);
            if step < steps {
                std::thread::sleep(FADE_FRAME);
            }
        }
    }

    fn show_error(&mut self, message: &str) {
        // Non-modal: a child process presents the dialog while the shell
        // keeps running.
        if Command::new("xmessage")
            .args(["-center", message])
            .spawn()
            .is_err()
        {
            warn!("no dialog helper available for: {}", message);
        }
    }

    fn cleanup(&mut self) -> Result<()> {
        if self.cleaned_up || self.display.is_null() {
            return Ok(());
        }
        self.cleaned_up = true;
        unsafe {
            // Styled variants may share a base face; close each once.
            let mut closed: Vec<*mut xft::XftFont> = Vec::new();
            for (_, font) in self.fonts.borrow_mut().drain() {
                if !font.is_null() && !closed.contains(&font) {
                    closed.push(font);
                    xft::XftFontClose(self.display, font);
                }
            }
            for (_, mut color) in self.colors.drain() {
                xft::XftColorFree(self.display, self.visual, self.colormap, &mut color);
            }
            if !self.draw.is_null() {
                xft::XftDrawDestroy(self.draw);
                self.draw = ptr::null_mut();
            }
            if let Some(saved) = self.saved.take() {
                xlib::XFreePixmap(self.display, saved);
            }
            if self.pixmap != 0 {
                xlib::XFreePixmap(self.display, self.pixmap);
                self.pixmap = 0;
            }
            if !self.gc.is_null() {
                xlib::XFreeGC(self.display, self.gc);
                self.gc = ptr::null_mut();
            }
            if self.window != 0 {
                xlib::XDestroyWindow(self.display, self.window);
                self.window = 0;
            }
            xlib::XCloseDisplay(self.display);
            self.display = ptr::null_mut();
        }
        info!("X11 driver shut down");
        Ok(())
    }
}

impl Drop for XDriver {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!("X11 cleanup failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_state_maps_to_flags() {
        assert_eq!(state_to_modifiers(0), Modifiers::empty());
        assert_eq!(state_to_modifiers(xlib::ShiftMask), Modifiers::SHIFT);
        assert_eq!(state_to_modifiers(xlib::ControlMask), Modifiers::CONTROL);
        assert_eq!(state_to_modifiers(xlib::Mod1Mask), Modifiers::ALT);
        assert_eq!(state_to_modifiers(xlib::Mod4Mask), Modifiers::SUPER);
        assert_eq!(
            state_to_modifiers(xlib::ShiftMask | xlib::ControlMask),
            Modifiers::SHIFT | Modifiers::CONTROL
        );
    }

    #[test]
    fn special_keysyms_translate() {
        assert_eq!(
            keysym_to_symbol(keysym::XK_Return as xlib::KeySym, "\r"),
            KeySymbol::Enter
        );
        assert_eq!(
            keysym_to_symbol(keysym::XK_Page_Up as xlib::KeySym, ""),
            KeySymbol::PageUp
        );
        assert_eq!(
            keysym_to_symbol(keysym::XK_F3 as xlib::KeySym, ""),
            KeySymbol::F3
        );
    }

    #[test]
    fn printable_keysyms_fall_back_to_the_lookup_text() {
        assert_eq!(
            keysym_to_symbol(keysym::XK_a as xlib::KeySym, "a"),
            KeySymbol::Char('a')
        );
        assert_eq!(
            keysym_to_symbol(keysym::XK_A as xlib::KeySym, "A"),
            KeySymbol::Char('A')
        );
        // Bare modifier: no text, no symbol.
        assert_eq!(
            keysym_to_symbol(keysym::XK_Shift_L as xlib::KeySym, ""),
            KeySymbol::Unknown
        );
    }

    fn offline_driver() -> XDriver {
        XDriver {
            display: ptr::null_mut(),
            screen: 0,
            visual: ptr::null_mut(),
            colormap: 0,
            depth: 24,
            window: 0,
            pixmap: 0,
            saved: None,
            draw: ptr::null_mut(),
            gc: ptr::null_mut(),
            width: 640,
            height: 400,
            bg_pixel: 0,
            fonts: RefCell::new(HashMap::new()),
            font_config: FontConfig::default(),
            colors: HashMap::new(),
            wm_protocols: 0,
            wm_delete: 0,
            net_wm_state: 0,
            net_wm_fullscreen: 0,
            net_wm_opacity: 0,
            clipboard_sel: 0,
            utf8_string: 0,
            targets: 0,
            paste_prop: 0,
            clipboard: None,
            owns_clipboard: false,
            fullscreen: false,
            last_click: None,
            // Drop must not touch the missing display.
            cleaned_up: true,
        }
    }

    fn button_press(x: i32, y: i32) -> xlib::XButtonEvent {
        let mut event: xlib::XButtonEvent = unsafe { mem::zeroed() };
        event.type_ = xlib::ButtonPress;
        event.x = x;
        event.y = y;
        event.button = xlib::Button1;
        event
    }

    #[test]
    fn quick_second_click_counts_as_a_double() {
        let mut driver = offline_driver();
        let first = driver.translate_button(&button_press(30, 60));
        let second = driver.translate_button(&button_press(32, 61));
        match (first, second) {
            (
                BackendEvent::MouseDown { click_count: 1, .. },
                BackendEvent::MouseDown {
                    click_count: 2,
                    button: MouseButton::Left,
                    ..
                },
            ) => {}
            other => panic!("unexpected events: {:?}", other),
        }
        // The double click consumed the anchor; the next press is single.
        let third = driver.translate_button(&button_press(32, 61));
        assert!(matches!(third, BackendEvent::MouseDown { click_count: 1, .. }));
    }

    #[test]
    fn distant_second_click_stays_single() {
        let mut driver = offline_driver();
        driver.translate_button(&button_press(30, 60));
        let second = driver.translate_button(&button_press(200, 60));
        assert!(matches!(second, BackendEvent::MouseDown { click_count: 1, .. }));
    }
}
