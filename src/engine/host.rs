// src/engine/host.rs

//! The capability interface the interpreter calls for all I/O, and its
//! production implementation.
//!
//! Every method of [`Host`] is invoked on the engine worker thread. The
//! implementation marshals display and input work onto the UI thread
//! through the bridge and blocks until it completes, so the interpreter
//! sees a strictly ordered, synchronous world. Failures are reported
//! in-band as boolean/integer results, never as panics across the engine
//! boundary.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bitflags::bitflags;
use log::{debug, warn};

use crate::bridge::UiBridge;
use crate::color::Rgba;
use crate::engine::files::{CloseOutcome, FileHandle, FileMode, FileTable, HandleKind};
use crate::font::FontStyle;
use crate::input::SharedInput;
use crate::keys::engine_keys;
use crate::media::Resource;
use crate::script::ScriptWriter;
use crate::shell::Shell;

bitflags! {
    /// Screen capability flags reported to the interpreter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScreenCaps: u8 {
        const COLOR = 1 << 0;
        const GRAPHICS = 1 << 1;
        const SOUND = 1 << 2;
        const VIDEO = 1 << 3;
        const MOUSE = 1 << 4;
    }
}

/// Screen geometry and capabilities, in the engine's character-cell terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenMetrics {
    pub cols: u16,
    pub rows: u16,
    pub cell_width: u32,
    pub cell_height: u32,
    pub caps: ScreenCaps,
}

/// The fixed set of entry points the interpreter invokes for all I/O.
pub trait Host: Send {
    fn file_open(&mut self, path: &str, mode: FileMode) -> Option<FileHandle>;
    fn file_close(&mut self, handle: FileHandle) -> bool;
    fn file_read(&mut self, handle: FileHandle, buf: &mut [u8]) -> usize;
    fn file_write(&mut self, handle: FileHandle, data: &[u8]) -> usize;
    fn file_seek(&mut self, handle: FileHandle, pos: SeekFrom) -> bool;

    fn print(&mut self, text: &str);
    fn set_caret(&mut self, col: u16, row: u16);
    fn caret(&mut self) -> (u16, u16);
    fn clear_screen(&mut self);
    fn clear_window(&mut self);
    fn set_text_window(&mut self, left: u16, top: u16, right: u16, bottom: u16);
    fn scroll_window_up(&mut self);

    /// Blocks until a keystroke (or the click sentinel) is available.
    fn get_key(&mut self) -> u16;
    /// Non-blocking poll; refreshes the display as a side effect.
    fn key_waiting(&mut self) -> bool;
    /// The click point paired with the last click sentinel, in cells.
    fn get_click(&mut self) -> Option<(u16, u16)>;
    /// Blocks until the player commits a full line of input.
    fn get_line(&mut self, max_len: usize) -> String;

    fn set_fg_color(&mut self, id: u16);
    fn set_bg_color(&mut self, id: u16);
    /// Current (foreground, background) engine color IDs.
    fn text_colors(&mut self) -> (u16, u16);
    fn define_color(&mut self, id: u16, color: Rgba) -> bool;
    fn set_font(&mut self, style: FontStyle);
    fn font(&mut self) -> FontStyle;

    fn screen_metrics(&mut self) -> ScreenMetrics;

    fn display_picture(&mut self, resource: Resource) -> bool;
    fn play_music(&mut self, resource: Resource, looping: bool, volume: u8) -> bool;
    fn stop_music(&mut self);
    fn play_sample(&mut self, resource: Resource, looping: bool, volume: u8) -> bool;
    fn stop_sample(&mut self);
    /// Foreground video blocks this (engine) thread until playback ends.
    fn play_video(&mut self, resource: Resource, looping: bool, background: bool) -> bool;
    fn stop_video(&mut self);

    fn script_open(&mut self, path: &str, wrap_width: usize) -> bool;
    fn script_write(&mut self, text: &str) -> bool;
    fn script_close(&mut self);
}

/// Production [`Host`]: owns the per-session handles and dispatches UI work
/// through the bridge. Constructed once per game session and handed to the
/// interpreter adapter, with no process-wide singletons.
pub struct HostIo {
    bridge: UiBridge<Shell>,
    input: Arc<SharedInput>,
    files: FileTable,
    script: Option<ScriptWriter>,
}

impl HostIo {
    pub fn new(bridge: UiBridge<Shell>, input: Arc<SharedInput>) -> Self {
        HostIo {
            bridge,
            input,
            files: FileTable::new(),
            script: None,
        }
    }

    fn report_error(&self, message: String) {
        warn!("{}", message);
        self.bridge.run_on_ui(move |shell| shell.show_error(&message));
    }
}

impl Host for HostIo {
    fn file_open(&mut self, path: &str, mode: FileMode) -> Option<FileHandle> {
        self.files.open(Path::new(path), mode)
    }

    fn file_close(&mut self, handle: FileHandle) -> bool {
        match self.files.close(handle) {
            Some(CloseOutcome {
                control_write_session: true,
                ..
            }) => {
                // Closing a written control file ends the request session;
                // the parse runs against UI-thread state.
                self.bridge.run_on_ui(|shell| shell.parse_opcodes());
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    fn file_read(&mut self, handle: FileHandle, buf: &mut [u8]) -> usize {
        match self.files.kind(handle) {
            Some(HandleKind::Control) => {
                let wanted = buf.len();
                let bytes = self
                    .bridge
                    .run_on_ui(move |shell| shell.opcode_read(wanted))
                    .unwrap_or_default();
                buf[..bytes.len()].copy_from_slice(&bytes);
                bytes.len()
            }
            Some(_) => self.files.read(handle, buf),
            None => 0,
        }
    }

    fn file_write(&mut self, handle: FileHandle, data: &[u8]) -> usize {
        match self.files.kind(handle) {
            Some(HandleKind::Control) => {
                let owned = data.to_vec();
                let len = owned.len();
                self.files.mark_control_written(handle);
                self.bridge
                    .run_on_ui(move |shell| shell.opcode_write(&owned));
                len
            }
            Some(_) => self.files.write(handle, data),
            None => 0,
        }
    }

    fn file_seek(&mut self, handle: FileHandle, pos: SeekFrom) -> bool {
        self.files.seek(handle, pos)
    }

    fn print(&mut self, text: &str) {
        let text = text.to_string();
        self.bridge.run_on_ui(move |shell| shell.print_text(&text));
    }

    fn set_caret(&mut self, col: u16, row: u16) {
        self.bridge
            .run_on_ui(move |shell| shell.set_caret_cell(col, row));
    }

    fn caret(&mut self) -> (u16, u16) {
        self.bridge
            .run_on_ui(|shell| shell.caret_cell())
            .unwrap_or((1, 1))
    }

    fn clear_screen(&mut self) {
        self.bridge.run_on_ui(|shell| shell.clear_screen());
    }

    fn clear_window(&mut self) {
        self.bridge.run_on_ui(|shell| shell.clear_window());
    }

    fn set_text_window(&mut self, left: u16, top: u16, right: u16, bottom: u16) {
        self.bridge
            .run_on_ui(move |shell| shell.set_text_window(left, top, right, bottom));
    }

    fn scroll_window_up(&mut self) {
        self.bridge.run_on_ui(|shell| shell.scroll_window_up());
    }

    fn get_key(&mut self) -> u16 {
        // Flush pending output and show the cursor before parking; the
        // check-then-wait itself is race-free under the shared mutex.
        self.bridge.run_on_ui(|shell| shell.prepare_for_key_wait());
        match self.input.wait_key() {
            Some(key) => key,
            // Quitting: hand the engine an escape so it can unwind.
            None => engine_keys::ESCAPE,
        }
    }

    fn key_waiting(&mut self) -> bool {
        self.bridge.run_on_ui(|shell| shell.refresh_display());
        self.input.has_key()
    }

    fn get_click(&mut self) -> Option<(u16, u16)> {
        let (x, y) = self.input.take_click()?;
        self.bridge.run_on_ui(move |shell| shell.cell_at(x, y))
    }

    fn get_line(&mut self, max_len: usize) -> String {
        self.bridge
            .run_on_ui(move |shell| shell.begin_line_input(max_len));
        match self.input.wait_line() {
            Some(line) => line,
            None => String::new(),
        }
    }

    fn set_fg_color(&mut self, id: u16) {
        self.bridge.run_on_ui(move |shell| shell.set_fg(id));
    }

    fn set_bg_color(&mut self, id: u16) {
        self.bridge.run_on_ui(move |shell| shell.set_bg(id));
    }

    fn text_colors(&mut self) -> (u16, u16) {
        self.bridge
            .run_on_ui(|shell| shell.text_colors())
            .unwrap_or((crate::color::ID_DEFAULT_FG, crate::color::ID_DEFAULT_BG))
    }

    fn define_color(&mut self, id: u16, color: Rgba) -> bool {
        self.bridge
            .run_on_ui(move |shell| shell.define_color(id, color))
            .unwrap_or(false)
    }

    fn set_font(&mut self, style: FontStyle) {
        self.bridge.run_on_ui(move |shell| shell.set_font(style));
    }

    fn font(&mut self) -> FontStyle {
        self.bridge
            .run_on_ui(|shell| shell.font())
            .unwrap_or_default()
    }

    fn screen_metrics(&mut self) -> ScreenMetrics {
        self.bridge
            .run_on_ui(|shell| shell.screen_metrics())
            .unwrap_or(ScreenMetrics {
                cols: 80,
                rows: 25,
                cell_width: 8,
                cell_height: 16,
                caps: ScreenCaps::empty(),
            })
    }

    fn display_picture(&mut self, resource: Resource) -> bool {
        let data = match resource.read() {
            Ok(data) => data,
            Err(e) => {
                self.report_error(format!("Could not load picture: {:#}", e));
                return false;
            }
        };
        let img = match image::load_from_memory(&data) {
            Ok(img) => img.to_rgba8(),
            Err(e) => {
                self.report_error(format!(
                    "Could not decode picture from {}: {}",
                    resource.path.display(),
                    e
                ));
                return false;
            }
        };
        self.bridge
            .run_on_ui(move |shell| shell.draw_picture(&img))
            .unwrap_or(false)
    }

    fn play_music(&mut self, resource: Resource, looping: bool, volume: u8) -> bool {
        self.bridge
            .run_on_ui(move |shell| shell.play_music(&resource, looping, volume))
            .unwrap_or(false)
    }

    fn stop_music(&mut self) {
        self.bridge.run_on_ui(|shell| shell.stop_music());
    }

    fn play_sample(&mut self, resource: Resource, looping: bool, volume: u8) -> bool {
        self.bridge
            .run_on_ui(move |shell| shell.play_sample(&resource, looping, volume))
            .unwrap_or(false)
    }

    fn stop_sample(&mut self) {
        self.bridge.run_on_ui(|shell| shell.stop_sample());
    }

    fn play_video(&mut self, resource: Resource, looping: bool, background: bool) -> bool {
        let started = self
            .bridge
            .run_on_ui(move |shell| shell.play_video(&resource, looping, background));
        // Outer None: quitting. Inner None: playback failed or disabled.
        match started.flatten() {
            Some(Some(signal)) => {
                // Foreground playback: block here, on the engine thread,
                // never on the UI loop.
                debug!("waiting for foreground video to finish");
                signal.wait();
                true
            }
            Some(None) => true,
            None => false,
        }
    }

    fn stop_video(&mut self) {
        self.bridge.run_on_ui(|shell| shell.stop_video());
    }

    fn script_open(&mut self, path: &str, wrap_width: usize) -> bool {
        match ScriptWriter::create(&PathBuf::from(path), wrap_width) {
            Ok(writer) => {
                self.script = Some(writer);
                true
            }
            Err(e) => {
                self.report_error(format!("Could not open script file: {:#}", e));
                false
            }
        }
    }

    fn script_write(&mut self, text: &str) -> bool {
        match self.script.as_mut() {
            Some(writer) => match writer.write_buffered(text) {
                Ok(()) => true,
                Err(e) => {
                    warn!("script write failed: {:#}", e);
                    false
                }
            },
            None => false,
        }
    }

    fn script_close(&mut self) {
        if let Some(mut writer) = self.script.take() {
            if let Err(e) = writer.flush() {
                warn!("script flush failed: {:#}", e);
            }
        }
    }
}

impl Drop for HostIo {
    fn drop(&mut self) {
        self.files.close_all();
        self.script_close();
    }
}
