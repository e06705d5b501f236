// src/engine/ffi.rs

//! C ABI adapter for the real Hugo engine library.
//!
//! The engine is plain C: its porting layer calls free functions named
//! `hugo_*` for every I/O operation. This module exports those symbols and
//! forwards them into the [`Host`] installed for the current session. The
//! callbacks always arrive on the thread that entered `he_main`, so the
//! active host lives in a thread-local slot scoped to [`HugoEngine::run`];
//! this is the one place the C boundary forces a static.
//!
//! Engine strings are Latin-1, converted at this boundary in both
//! directions.

use std::cell::Cell;
use std::ffi::CString;
use std::io::SeekFrom;

use libc::{c_char, c_int, c_long, c_void};
use log::warn;

use crate::color::Rgba;
use crate::engine::files::{FileHandle, FileMode};
use crate::engine::host::Host;
use crate::engine::session::{Interpreter, StringResolver};
use crate::font::FontStyle;
use crate::media::Resource;

extern "C" {
    /// The interpreter entry point from the engine library.
    fn he_main(argc: c_int, argv: *mut *mut c_char) -> c_int;
}

thread_local! {
    static ACTIVE_HOST: Cell<Option<*mut dyn Host>> = const { Cell::new(None) };
}

struct HostInstallGuard;

impl Drop for HostInstallGuard {
    fn drop(&mut self) {
        ACTIVE_HOST.with(|slot| slot.set(None));
    }
}

fn with_host<R>(default: R, f: impl FnOnce(&mut dyn Host) -> R) -> R {
    ACTIVE_HOST.with(|slot| match slot.get() {
        Some(ptr) => unsafe { f(&mut *ptr) },
        None => {
            warn!("engine callback arrived with no active host");
            default
        }
    })
}

fn latin1_to_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let bytes = unsafe { std::ffi::CStr::from_ptr(ptr) }.to_bytes();
    bytes.iter().map(|&b| b as char).collect()
}

/// Writes `text` into a C buffer as NUL-terminated Latin-1, replacing
/// characters outside the repertoire.
fn write_latin1(text: &str, buf: *mut c_char, maxlen: usize) {
    if buf.is_null() || maxlen == 0 {
        return;
    }
    let mut written = 0usize;
    for ch in text.chars() {
        if written + 1 >= maxlen {
            break;
        }
        let byte = if (ch as u32) < 256 { ch as u32 as u8 } else { b'?' };
        unsafe { *buf.add(written) = byte as c_char };
        written += 1;
    }
    unsafe { *buf.add(written) = 0 };
}

fn resource_from(path: *const c_char, offset: c_long, len: c_long) -> Resource {
    Resource {
        path: latin1_to_string(path).into(),
        offset: offset.max(0) as u64,
        len: len.max(0) as u64,
    }
}

fn mode_from(mode: *const c_char) -> FileMode {
    let mode = latin1_to_string(mode);
    if mode.contains('+') {
        FileMode::ReadWrite
    } else if mode.starts_with('a') {
        FileMode::Append
    } else if mode.starts_with('w') {
        FileMode::Write
    } else {
        FileMode::Read
    }
}

// Engine font attribute bits.
const FONT_BOLD: c_int = 1;
const FONT_ITALIC: c_int = 2;
const FONT_UNDERLINE: c_int = 4;
const FONT_PROP: c_int = 8;

fn style_from(f: c_int) -> FontStyle {
    let mut style = FontStyle::empty();
    if f & FONT_BOLD != 0 {
        style |= FontStyle::BOLD;
    }
    if f & FONT_ITALIC != 0 {
        style |= FontStyle::ITALIC;
    }
    if f & FONT_UNDERLINE != 0 {
        style |= FontStyle::UNDERLINE;
    }
    if f & FONT_PROP == 0 {
        style |= FontStyle::FIXED;
    }
    style
}

fn style_to(style: FontStyle) -> c_int {
    let mut f = 0;
    if style.contains(FontStyle::BOLD) {
        f |= FONT_BOLD;
    }
    if style.contains(FontStyle::ITALIC) {
        f |= FONT_ITALIC;
    }
    if style.contains(FontStyle::UNDERLINE) {
        f |= FONT_UNDERLINE;
    }
    if !style.contains(FontStyle::FIXED) {
        f |= FONT_PROP;
    }
    f
}

// --- Exported callbacks -------------------------------------------------

#[no_mangle]
pub extern "C" fn hugo_print(text: *const c_char) {
    with_host((), |host| host.print(&latin1_to_string(text)));
}

#[no_mangle]
pub extern "C" fn hugo_getkey() -> c_int {
    with_host(0, |host| host.get_key() as c_int)
}

#[no_mangle]
pub extern "C" fn hugo_iskeywaiting() -> c_int {
    with_host(0, |host| host.key_waiting() as c_int)
}

#[no_mangle]
pub extern "C" fn hugo_getline(prompt: *const c_char, buf: *mut c_char, maxlen: c_int) {
    with_host((), |host| {
        host.print(&latin1_to_string(prompt));
        let line = host.get_line(maxlen.max(0) as usize);
        write_latin1(&line, buf, maxlen.max(1) as usize);
    });
}

#[no_mangle]
pub extern "C" fn hugo_settextpos(x: c_int, y: c_int) {
    with_host((), |host| host.set_caret(x.max(1) as u16, y.max(1) as u16));
}

#[no_mangle]
pub extern "C" fn hugo_gettextpos(x: *mut c_int, y: *mut c_int) {
    with_host((), |host| {
        let (col, row) = host.caret();
        unsafe {
            if !x.is_null() {
                *x = col as c_int;
            }
            if !y.is_null() {
                *y = row as c_int;
            }
        }
    });
}

#[no_mangle]
pub extern "C" fn hugo_settextwindow(left: c_int, top: c_int, right: c_int, bottom: c_int) {
    with_host((), |host| {
        host.set_text_window(
            left.max(1) as u16,
            top.max(1) as u16,
            right.max(1) as u16,
            bottom.max(1) as u16,
        )
    });
}

#[no_mangle]
pub extern "C" fn hugo_clearfullscreen() {
    with_host((), |host| host.clear_screen());
}

#[no_mangle]
pub extern "C" fn hugo_clearwindow() {
    with_host((), |host| host.clear_window());
}

#[no_mangle]
pub extern "C" fn hugo_scrollwindowup() {
    with_host((), |host| host.scroll_window_up());
}

#[no_mangle]
pub extern "C" fn hugo_settextcolor(c: c_int) {
    with_host((), |host| host.set_fg_color(c.max(0) as u16));
}

#[no_mangle]
pub extern "C" fn hugo_setbackcolor(c: c_int) {
    with_host((), |host| host.set_bg_color(c.max(0) as u16));
}

#[no_mangle]
pub extern "C" fn hugo_gettextcolor() -> c_int {
    with_host(0, |host| host.text_colors().0 as c_int)
}

#[no_mangle]
pub extern "C" fn hugo_getbackcolor() -> c_int {
    with_host(0, |host| host.text_colors().1 as c_int)
}

#[no_mangle]
pub extern "C" fn hugo_setpalette(id: c_int, r: c_int, g: c_int, b: c_int, a: c_int) -> c_int {
    with_host(0, |host| {
        host.define_color(
            id.max(0) as u16,
            Rgba::new(r as u8, g as u8, b as u8, a as u8),
        ) as c_int
    })
}

#[no_mangle]
pub extern "C" fn hugo_font(f: c_int) -> c_int {
    with_host(0, |host| {
        host.set_font(style_from(f));
        1
    })
}

#[no_mangle]
pub extern "C" fn hugo_getfont() -> c_int {
    with_host(0, |host| style_to(host.font()))
}

#[no_mangle]
pub extern "C" fn hugo_fopen(path: *const c_char, mode: *const c_char) -> c_int {
    with_host(-1, |host| {
        match host.file_open(&latin1_to_string(path), mode_from(mode)) {
            Some(FileHandle(id)) => id as c_int,
            None => -1,
        }
    })
}

#[no_mangle]
pub extern "C" fn hugo_fclose(handle: c_int) -> c_int {
    with_host(0, |host| host.file_close(FileHandle(handle.max(0) as u32)) as c_int)
}

#[no_mangle]
pub extern "C" fn hugo_fread(handle: c_int, buf: *mut c_void, len: c_long) -> c_long {
    if buf.is_null() || len <= 0 {
        return 0;
    }
    with_host(0, |host| {
        let slice = unsafe { std::slice::from_raw_parts_mut(buf as *mut u8, len as usize) };
        host.file_read(FileHandle(handle.max(0) as u32), slice) as c_long
    })
}

#[no_mangle]
pub extern "C" fn hugo_fwrite(handle: c_int, buf: *const c_void, len: c_long) -> c_long {
    if buf.is_null() || len <= 0 {
        return 0;
    }
    with_host(0, |host| {
        let slice = unsafe { std::slice::from_raw_parts(buf as *const u8, len as usize) };
        host.file_write(FileHandle(handle.max(0) as u32), slice) as c_long
    })
}

#[no_mangle]
pub extern "C" fn hugo_fseek(handle: c_int, offset: c_long, whence: c_int) -> c_int {
    let pos = match whence {
        libc::SEEK_CUR => SeekFrom::Current(offset),
        libc::SEEK_END => SeekFrom::End(offset),
        _ => SeekFrom::Start(offset.max(0) as u64),
    };
    with_host(0, |host| host.file_seek(FileHandle(handle.max(0) as u32), pos) as c_int)
}

#[no_mangle]
pub extern "C" fn hugo_displaypicture(path: *const c_char, offset: c_long, len: c_long) -> c_int {
    with_host(0, |host| {
        host.display_picture(resource_from(path, offset, len)) as c_int
    })
}

#[no_mangle]
pub extern "C" fn hugo_playmusic(
    path: *const c_char,
    offset: c_long,
    len: c_long,
    looping: c_int,
    volume: c_int,
) -> c_int {
    with_host(0, |host| {
        host.play_music(
            resource_from(path, offset, len),
            looping != 0,
            volume.clamp(0, 100) as u8,
        ) as c_int
    })
}

#[no_mangle]
pub extern "C" fn hugo_stopmusic() {
    with_host((), |host| host.stop_music());
}

#[no_mangle]
pub extern "C" fn hugo_playsample(
    path: *const c_char,
    offset: c_long,
    len: c_long,
    looping: c_int,
    volume: c_int,
) -> c_int {
    with_host(0, |host| {
        host.play_sample(
            resource_from(path, offset, len),
            looping != 0,
            volume.clamp(0, 100) as u8,
        ) as c_int
    })
}

#[no_mangle]
pub extern "C" fn hugo_stopsample() {
    with_host((), |host| host.stop_sample());
}

#[no_mangle]
pub extern "C" fn hugo_playvideo(
    path: *const c_char,
    offset: c_long,
    len: c_long,
    looping: c_int,
    background: c_int,
) -> c_int {
    with_host(0, |host| {
        host.play_video(resource_from(path, offset, len), looping != 0, background != 0) as c_int
    })
}

#[no_mangle]
pub extern "C" fn hugo_stopvideo() {
    with_host((), |host| host.stop_video());
}

#[no_mangle]
pub extern "C" fn hugo_scriptopen(path: *const c_char, wrap: c_int) -> c_int {
    with_host(0, |host| {
        host.script_open(&latin1_to_string(path), wrap.max(0) as usize) as c_int
    })
}

#[no_mangle]
pub extern "C" fn hugo_scriptwrite(text: *const c_char) -> c_int {
    with_host(0, |host| host.script_write(&latin1_to_string(text)) as c_int)
}

#[no_mangle]
pub extern "C" fn hugo_scriptclose() {
    with_host((), |host| host.script_close());
}

#[no_mangle]
pub extern "C" fn hugo_screenmetrics(
    cols: *mut c_int,
    rows: *mut c_int,
    cell_width: *mut c_int,
    cell_height: *mut c_int,
    caps: *mut c_int,
) {
    with_host((), |host| {
        let m = host.screen_metrics();
        unsafe {
            if !cols.is_null() {
                *cols = m.cols as c_int;
            }
            if !rows.is_null() {
                *rows = m.rows as c_int;
            }
            if !cell_width.is_null() {
                *cell_width = m.cell_width as c_int;
            }
            if !cell_height.is_null() {
                *cell_height = m.cell_height as c_int;
            }
            if !caps.is_null() {
                *caps = m.caps.bits() as c_int;
            }
        }
    });
}

// --- The interpreter adapter --------------------------------------------

/// [`Interpreter`] backed by the linked engine library.
#[derive(Debug, Default)]
pub struct HugoEngine;

impl HugoEngine {
    pub fn new() -> Self {
        HugoEngine
    }
}

impl Interpreter for HugoEngine {
    fn run(&mut self, args: &[String], host: &mut dyn Host) -> i32 {
        // Install the host for the callbacks; the guard clears it even if
        // the engine unwinds.
        let host_ptr: *mut dyn Host = host;
        ACTIVE_HOST.with(|slot| slot.set(Some(host_ptr)));
        let _guard = HostInstallGuard;

        let c_args: Vec<CString> = args
            .iter()
            .map(|a| CString::new(a.as_str()).unwrap_or_default())
            .collect();
        let mut argv: Vec<*mut c_char> = c_args
            .iter()
            .map(|a| a.as_ptr() as *mut c_char)
            .collect();
        argv.push(std::ptr::null_mut());

        unsafe { he_main(c_args.len() as c_int, argv.as_mut_ptr()) }
    }

    fn string_resolver(&self) -> Option<StringResolver> {
        // The engine library has no string-table export; opcode requests
        // that need one log the unresolved index instead.
        None
    }
}
