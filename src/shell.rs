// src/shell.rs

//! The UI-thread event loop and owner of all presentation state.
//!
//! The shell plays the orchestrator role: it owns the backend driver, the
//! display surface, input state, the opcode channel, the media
//! coordinators, and the engine session bookkeeping. The engine worker
//! never touches any of it directly: every mutation arrives either from a
//! windowing event or from a bridge task, both on this thread, so the
//! shared state needs no further locking.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use image::RgbaImage;
use log::{debug, info, warn};

use crate::backend::{BackendEvent, Driver, MouseButton, PixelRect};
use crate::bridge::UiBridge;
use crate::color::{Palette, Rgba};
use crate::config::Settings;
use crate::engine::host::{HostIo, ScreenCaps, ScreenMetrics};
use crate::engine::session::{EngineSession, Interpreter, StringResolver};
use crate::font::FontStyle;
use crate::input::{InputMode, InputState, SharedInput};
use crate::keys::{engine_key_code, KeySymbol, Modifiers};
use crate::media::{
    FinishSignal, NullSoundBackend, NullVideoBackend, Resource, SoundCoordinator, SoundKind,
    VideoCoordinator,
};
use crate::opcode::{OpcodeActions, OpcodeChannel};
use crate::surface::DisplaySurface;

/// UI loop cadence; bridge dispatch latency is bounded by this.
const UI_TICK: Duration = Duration::from_millis(4);
const CURSOR_BLINK_INTERVAL: Duration = Duration::from_millis(500);
/// Lines drawn by the scrollback overlay.
const SCROLLBACK_VIEW_LINES: usize = 24;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ShellStatus {
    Running,
    Shutdown,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum ViewMode {
    Normal,
    Scrollback,
}

type InterpreterFactory = Box<dyn Fn() -> Box<dyn Interpreter>>;

pub struct Shell {
    driver: Box<dyn Driver>,
    surface: DisplaySurface,
    input: InputState,
    shared_input: Arc<SharedInput>,
    opcode: OpcodeChannel,
    sound: SoundCoordinator,
    video: VideoCoordinator,
    settings: Settings,
    bridge: UiBridge<Shell>,
    session: Option<EngineSession>,
    next_game: Option<PathBuf>,
    interpreter_factory: Option<InterpreterFactory>,
    string_resolver: Option<StringResolver>,
    quitting: bool,
    view: ViewMode,
    last_blink: Instant,
}

impl Shell {
    pub fn new(driver: Box<dyn Driver>, settings: Settings) -> Self {
        let palette = Palette::new(settings.colors.theme());
        let surface = DisplaySurface::new(
            driver.as_ref(),
            palette,
            settings.appearance.soft_scrolling,
        );
        let mut sound = SoundCoordinator::new(
            Box::new(NullSoundBackend),
            settings.media.enable_music,
            settings.media.enable_sounds,
        );
        sound.set_volume(SoundKind::Music, settings.volume.music);
        sound.set_volume(SoundKind::Sample, settings.volume.samples);
        let mut video = VideoCoordinator::new(Box::new(NullVideoBackend), settings.media.enable_video);
        video.set_volume(settings.volume.video);

        Shell {
            driver,
            surface,
            input: InputState::new(),
            shared_input: Arc::new(SharedInput::new()),
            opcode: OpcodeChannel::new(),
            sound,
            video,
            settings,
            bridge: UiBridge::new(),
            session: None,
            next_game: None,
            interpreter_factory: None,
            string_resolver: None,
            quitting: false,
            view: ViewMode::Normal,
            last_blink: Instant::now(),
        }
    }

    pub fn bridge(&self) -> UiBridge<Shell> {
        self.bridge.clone()
    }

    pub fn shared_input(&self) -> Arc<SharedInput> {
        Arc::clone(&self.shared_input)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn surface(&self) -> &DisplaySurface {
        &self.surface
    }

    pub fn driver_mut(&mut self) -> &mut dyn Driver {
        self.driver.as_mut()
    }

    pub fn input_mode(&self) -> InputMode {
        self.input.mode
    }

    pub fn game_running(&self) -> bool {
        self.session.as_ref().map(EngineSession::is_running).unwrap_or(false)
    }

    // --- Session lifecycle ----------------------------------------------

    pub fn set_interpreter_factory(&mut self, factory: impl Fn() -> Box<dyn Interpreter> + 'static) {
        self.interpreter_factory = Some(Box::new(factory));
    }

    /// Starts a game now, or queues it to run after the current one ends.
    pub fn request_game(&mut self, path: PathBuf) -> Result<()> {
        if self.session.is_some() {
            info!("queueing next game {}", path.display());
            self.next_game = Some(path);
            return Ok(());
        }
        self.start_game(path)
    }

    fn start_game(&mut self, path: PathBuf) -> Result<()> {
        let factory = self
            .interpreter_factory
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no interpreter configured"))?;
        let interpreter = factory();
        self.string_resolver = interpreter.string_resolver();
        self.settings.remember_game(&path);
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "hugo-shell".to_string());
        self.driver.set_title(&title);
        let host = Box::new(HostIo::new(self.bridge.clone(), self.shared_input()));
        self.session = Some(EngineSession::start(
            interpreter,
            host,
            path,
            self.bridge.clone(),
        )?);
        Ok(())
    }

    /// Completion handler, posted from the worker thread. Joins the worker
    /// so the session fully unwinds, then chains or shuts down.
    pub fn on_game_finished(&mut self, code: i32) {
        debug!("game finished with code {}", code);
        if let Some(mut session) = self.session.take() {
            session.join();
        }
        self.stop_music();
        self.stop_sample();
        self.stop_video();
        match self.next_game.take() {
            Some(path) => {
                if let Err(e) = self.start_game(path) {
                    self.show_error(&format!("Could not start the next game: {:#}", e));
                    self.quitting = true;
                }
            }
            None => self.quitting = true,
        }
    }

    // --- Main loop -------------------------------------------------------

    pub fn run(&mut self) -> Result<()> {
        info!("entering UI loop");
        loop {
            match self.tick()? {
                ShellStatus::Running => std::thread::sleep(UI_TICK),
                ShellStatus::Shutdown => break,
            }
        }
        self.shutdown();
        Ok(())
    }

    /// One UI cycle: drain bridge work, drain windowing events, blink,
    /// present.
    pub fn tick(&mut self) -> Result<ShellStatus> {
        self.pump();
        let events = self.driver.process_events()?;
        for event in events {
            if event == BackendEvent::CloseRequested {
                info!("close requested");
                return Ok(ShellStatus::Shutdown);
            }
            self.handle_event(event);
        }
        self.update_blink();
        self.driver.present()?;
        if self.quitting {
            return Ok(ShellStatus::Shutdown);
        }
        Ok(ShellStatus::Running)
    }

    /// Drains queued bridge tasks. Safe to call from nested contexts; the
    /// bridge's guard makes inner calls no-ops.
    pub fn pump(&mut self) {
        let bridge = self.bridge.clone();
        bridge.pump(self);
    }

    /// Wakes blocked engine waits and refuses new synchronous dispatch.
    /// There is no forceful termination of the engine thread; shutdown
    /// drains its natural unblock path.
    fn begin_shutdown(&mut self) {
        self.quitting = true;
        self.bridge.begin_quit();
        self.shared_input.begin_quit();
        self.video.stop();
    }

    fn shutdown(&mut self) {
        self.begin_shutdown();
        // Keep pumping so blocked bridge calls complete; the engine thread
        // unwinds through its normal return path.
        while self.game_running() || self.bridge.has_pending() {
            self.pump();
            std::thread::sleep(UI_TICK);
        }
        if let Some(mut session) = self.session.take() {
            session.join();
        }
        if let Err(e) = self.settings.save(None) {
            warn!("could not save settings: {:#}", e);
        }
        if let Err(e) = self.driver.cleanup() {
            warn!("driver cleanup failed: {:#}", e);
        }
        info!("shell shut down");
    }

    // --- Event handling --------------------------------------------------

    pub fn handle_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::Key {
                symbol,
                modifiers,
                text,
            } => self.handle_key(symbol, modifiers, &text),
            BackendEvent::MouseDown {
                x,
                y,
                button,
                click_count,
            } => self.handle_mouse(x, y, button, click_count),
            BackendEvent::Resize {
                width_px,
                height_px,
            } => {
                debug!("resize to {}x{}", width_px, height_px);
                self.surface.handle_resize(self.driver.as_ref());
            }
            BackendEvent::FocusGained => {
                if self.settings.media.mute_in_background {
                    self.sound.set_muted(false);
                    self.video.set_muted(false);
                }
            }
            BackendEvent::FocusLost => {
                if self.settings.media.mute_in_background {
                    self.sound.set_muted(true);
                    self.video.set_muted(true);
                }
            }
            BackendEvent::CloseRequested => {
                // Filtered out in tick; reaching here means a direct call.
                self.quitting = true;
            }
        }
    }

    fn handle_key(&mut self, symbol: KeySymbol, modifiers: Modifiers, text: &str) {
        if self.view == ViewMode::Scrollback {
            // Any key dismisses the scrollback view.
            self.close_scrollback();
            return;
        }
        match self.input.mode {
            InputMode::LineEditing => self.handle_edit_key(symbol, modifiers, text),
            InputMode::Idle => {
                if let Some(code) = engine_key_code(symbol, text) {
                    // Single-slot queue: a still-pending key wins, the new
                    // one is coalesced away.
                    self.shared_input.push_key(code);
                }
            }
        }
    }

    fn handle_edit_key(&mut self, symbol: KeySymbol, modifiers: Modifiers, text: &str) {
        let ctrl = modifiers.contains(Modifiers::CONTROL);
        match symbol {
            KeySymbol::Enter => {
                self.commit_line();
                return;
            }
            KeySymbol::Backspace if ctrl => self.input.editor.delete_word_back(),
            KeySymbol::Backspace => self.input.editor.backspace(),
            KeySymbol::Delete if ctrl => self.input.editor.delete_word_forward(),
            KeySymbol::Delete => self.input.editor.delete_forward(),
            KeySymbol::Left if ctrl => self.input.editor.move_word_left(),
            KeySymbol::Left => self.input.editor.move_left(),
            KeySymbol::Right if ctrl => self.input.editor.move_word_right(),
            KeySymbol::Right => self.input.editor.move_right(),
            KeySymbol::Home => self.input.editor.move_home(),
            KeySymbol::End => self.input.editor.move_end(),
            KeySymbol::Up => self.input.editor.recall_previous(),
            KeySymbol::Down => self.input.editor.recall_next(),
            KeySymbol::PageUp => {
                self.open_scrollback();
                return;
            }
            KeySymbol::Char('v') | KeySymbol::Char('V') if ctrl => {
                if let Some(paste) = self.driver.clipboard_text() {
                    // Paste stops at the first line break; the rest is not
                    // a command.
                    let first_line = paste.lines().next().unwrap_or("");
                    self.input.editor.insert(first_line);
                }
            }
            KeySymbol::Char(_) if !ctrl && !text.is_empty() && !text.chars().all(char::is_control) => {
                self.input.editor.insert(text);
            }
            // Unrecognized combinations fall through unchanged.
            _ => return,
        }
        self.redraw_edit_line();
    }

    fn handle_mouse(&mut self, x: i32, y: i32, button: MouseButton, click_count: u8) {
        if self.view == ViewMode::Scrollback {
            self.close_scrollback();
            return;
        }
        if button != MouseButton::Left {
            return;
        }
        match self.input.mode {
            InputMode::Idle => {
                self.shared_input.push_click(x, y);
            }
            InputMode::LineEditing => {
                if click_count >= 2 {
                    // Word completion from the rendered text, inserted as
                    // if typed, space-appended, never executing.
                    if let Some(word) = self.surface.word_at(self.driver.as_ref(), x, y) {
                        self.insert_input_text(&format!("{} ", word), false);
                    }
                }
            }
        }
    }

    // --- Line editing ----------------------------------------------------

    /// Enters line-editing mode at the current pen position. Runs on the
    /// UI thread on behalf of a blocked engine `get_line`.
    pub fn begin_line_input(&mut self, max_len: usize) {
        self.surface.flush_text(self.driver.as_mut());
        let origin = self.surface.pen();
        self.input.editor.begin(origin, max_len);
        self.input.mode = InputMode::LineEditing;
        // Stale events from before the prompt must not leak into the edit.
        self.shared_input.clear_events();
        self.surface.show_cursor(self.driver.as_mut(), true);
        self.redraw_edit_line();
    }

    /// Inserts text into the pending command line as if the player typed
    /// it. With `execute` set the line is committed immediately, ending the
    /// edit session.
    pub fn insert_input_text(&mut self, text: &str, execute: bool) {
        if self.input.mode != InputMode::LineEditing {
            return;
        }
        self.input.editor.insert(text);
        if execute {
            self.commit_line();
        } else {
            self.redraw_edit_line();
        }
    }

    fn commit_line(&mut self) {
        let line = self.input.editor.commit();
        self.input.mode = InputMode::Idle;
        // Leave the echoed command on screen and move past it.
        self.surface.print(self.driver.as_mut(), "\n");
        self.surface.show_cursor(self.driver.as_mut(), false);
        self.shared_input.complete_line(line);
    }

    fn redraw_edit_line(&mut self) {
        let origin = self.input.editor.origin();
        let caret = self.input.editor.caret();
        let text = self.input.editor.buffer().to_string();
        self.surface
            .render_edit_line(self.driver.as_mut(), origin, &text, caret);
    }

    // --- Scrollback view -------------------------------------------------

    fn open_scrollback(&mut self) {
        debug!("opening scrollback view");
        self.driver.snapshot();
        self.view = ViewMode::Scrollback;
        let window = self.surface.window();
        let metrics = self.surface.fixed_metrics(self.driver.as_ref());
        let bg = self.surface.palette().resolve(self.surface.bg());
        let fg = self.surface.palette().resolve(self.surface.fg());
        self.driver.fill_rect(window, bg);
        let lines = self.surface.scrollback_lines();
        let shown = lines.len().min(SCROLLBACK_VIEW_LINES);
        let mut y = window.y;
        for line in lines.iter().skip(lines.len() - shown) {
            self.driver
                .draw_text_run(window.x, y, line, FontStyle::FIXED, fg);
            y += metrics.cell_height as i32;
            if y >= window.bottom() {
                break;
            }
        }
    }

    fn close_scrollback(&mut self) {
        debug!("closing scrollback view");
        self.driver.restore();
        self.view = ViewMode::Normal;
        if self.input.mode == InputMode::LineEditing {
            self.redraw_edit_line();
        }
    }

    // --- Cursor ----------------------------------------------------------

    fn update_blink(&mut self) {
        if self.last_blink.elapsed() < CURSOR_BLINK_INTERVAL {
            return;
        }
        self.last_blink = Instant::now();
        if self.view == ViewMode::Normal {
            self.surface.blink_tick(self.driver.as_mut());
        }
    }

    // --- Engine-facing operations (always via the bridge) ----------------

    pub fn print_text(&mut self, text: &str) {
        self.surface.print(self.driver.as_mut(), text);
    }

    pub fn set_caret_cell(&mut self, col: u16, row: u16) {
        self.surface.set_caret_cell(self.driver.as_mut(), col, row);
    }

    pub fn caret_cell(&self) -> (u16, u16) {
        self.surface.caret_cell(self.driver.as_ref())
    }

    pub fn cell_at(&self, x: i32, y: i32) -> (u16, u16) {
        self.surface.cell_at(self.driver.as_ref(), x, y)
    }

    pub fn clear_screen(&mut self) {
        self.surface
            .clear_region(self.driver.as_mut(), PixelRect::new(0, 0, 0, 0));
    }

    pub fn clear_window(&mut self) {
        let window = self.surface.window();
        self.surface.clear_region(self.driver.as_mut(), window);
    }

    pub fn set_text_window(&mut self, left: u16, top: u16, right: u16, bottom: u16) {
        self.surface
            .set_window_cells(self.driver.as_mut(), left, top, right, bottom);
    }

    pub fn scroll_window_up(&mut self) {
        let window = self.surface.window();
        let line_height = self.driver.font_metrics(FontStyle::FIXED).line_height();
        let quitting = self.quitting;
        self.surface
            .scroll_up(self.driver.as_mut(), window, line_height, quitting);
    }

    pub fn set_fg(&mut self, id: u16) {
        self.surface.set_fg(self.driver.as_mut(), id);
    }

    pub fn set_bg(&mut self, id: u16) {
        self.surface.set_bg(self.driver.as_mut(), id);
    }

    pub fn text_colors(&self) -> (u16, u16) {
        (self.surface.fg(), self.surface.bg())
    }

    pub fn set_font(&mut self, style: FontStyle) {
        self.surface.set_font(self.driver.as_mut(), style);
    }

    pub fn font(&self) -> FontStyle {
        self.surface.font()
    }

    pub fn define_color(&mut self, id: u16, color: Rgba) -> bool {
        self.surface.define_color(id, color)
    }

    pub fn screen_metrics(&self) -> ScreenMetrics {
        let (cols, rows) = self.surface.window_cells(self.driver.as_ref());
        let metrics = self.surface.fixed_metrics(self.driver.as_ref());
        let mut caps = ScreenCaps::COLOR | ScreenCaps::GRAPHICS | ScreenCaps::MOUSE;
        if self.settings.media.enable_music || self.settings.media.enable_sounds {
            caps |= ScreenCaps::SOUND;
        }
        if self.video.is_enabled() {
            caps |= ScreenCaps::VIDEO;
        }
        ScreenMetrics {
            cols,
            rows,
            cell_width: metrics.cell_width,
            cell_height: metrics.cell_height,
            caps,
        }
    }

    pub fn draw_picture(&mut self, img: &RgbaImage) -> bool {
        let (x, y) = self.surface.pen();
        self.surface.print_image(self.driver.as_mut(), img, x, y);
        true
    }

    pub fn play_music(&mut self, resource: &Resource, looping: bool, volume: u8) -> bool {
        self.sound.set_volume(SoundKind::Music, volume);
        match self.sound.play(SoundKind::Music, resource, looping) {
            Ok(started) => started,
            Err(e) => {
                self.show_error(&format!("Could not play music: {:#}", e));
                false
            }
        }
    }

    pub fn stop_music(&mut self) {
        self.sound.stop(SoundKind::Music);
    }

    pub fn play_sample(&mut self, resource: &Resource, looping: bool, volume: u8) -> bool {
        self.sound.set_volume(SoundKind::Sample, volume);
        match self.sound.play(SoundKind::Sample, resource, looping) {
            Ok(started) => started,
            Err(e) => {
                self.show_error(&format!("Could not play sound: {:#}", e));
                false
            }
        }
    }

    pub fn stop_sample(&mut self) {
        self.sound.stop(SoundKind::Sample);
    }

    /// Starts video playback. `Some(Some(_))` hands the engine thread a
    /// finish signal to wait on (foreground); `Some(None)` is background
    /// playback; `None` means the playback failed or is disabled.
    pub fn play_video(
        &mut self,
        resource: &Resource,
        looping: bool,
        background: bool,
    ) -> Option<Option<FinishSignal>> {
        match self.video.play(resource, looping, background) {
            Ok(Some(signal)) => Some(Some(signal)),
            Ok(None) if background && self.video.is_enabled() => Some(None),
            Ok(None) => None,
            Err(e) => {
                self.show_error(&format!("Could not play video: {:#}", e));
                None
            }
        }
    }

    pub fn stop_video(&mut self) {
        self.video.stop();
    }

    /// Flush + visible cursor, ahead of the engine parking on the key wait.
    pub fn prepare_for_key_wait(&mut self) {
        self.surface.prepare_for_input(self.driver.as_mut());
        let _ = self.driver.present();
    }

    /// Flush pending output so a poll sees the current screen.
    pub fn refresh_display(&mut self) {
        self.surface.flush_text(self.driver.as_mut());
        let _ = self.driver.present();
    }

    pub fn show_error(&mut self, message: &str) {
        warn!("{}", message);
        self.driver.show_error(message);
    }

    // --- Opcode channel --------------------------------------------------

    pub fn opcode_write(&mut self, bytes: &[u8]) {
        self.opcode.write_inbound(bytes);
    }

    pub fn opcode_read(&mut self, wanted: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(wanted);
        for _ in 0..wanted {
            match self.opcode.read_outbound_byte() {
                Some(b) => out.push(b),
                None => break,
            }
        }
        out
    }

    /// Runs the opcode parse against this shell's actions.
    pub fn parse_opcodes(&mut self) {
        let mut channel = std::mem::take(&mut self.opcode);
        channel.parse(self);
        self.opcode = channel;
    }
}

impl OpcodeActions for Shell {
    fn resolve_string(&mut self, index: u16) -> Option<String> {
        self.string_resolver.as_ref().and_then(|r| r(index))
    }

    fn fade_screen(&mut self, millis: u32, start_alpha: u8, end_alpha: u8, _block: bool) {
        // The driver fade runs to completion on this thread, so blocking
        // and non-blocking requests behave identically here.
        self.driver.fade_screen(millis, start_alpha, end_alpha);
    }

    fn open_url(&mut self, url: &str) {
        self.driver.open_url(url);
    }

    fn set_fullscreen(&mut self, on: bool) {
        self.driver.set_fullscreen(on);
    }

    fn set_clipboard(&mut self, text: &str) {
        self.driver.set_clipboard(text);
    }

    fn abort_process(&mut self) {
        crate::opcode::abort_process_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessDriver;

    fn headless_shell() -> Shell {
        Shell::new(Box::new(HeadlessDriver::new(640, 400)), Settings::default())
    }

    fn key(symbol: KeySymbol, text: &str) -> BackendEvent {
        BackendEvent::Key {
            symbol,
            modifiers: Modifiers::empty(),
            text: text.to_string(),
        }
    }

    fn type_text(shell: &mut Shell, text: &str) {
        for ch in text.chars() {
            shell.handle_event(key(KeySymbol::Char(ch), &ch.to_string()));
        }
    }

    #[test]
    fn idle_keys_land_in_the_shared_slot() {
        let mut shell = headless_shell();
        shell.handle_event(key(KeySymbol::Char('x'), "x"));
        assert_eq!(shell.shared_input().take_key(), Some('x' as u16));
    }

    #[test]
    fn begin_line_input_switches_mode_and_clears_stale_events() {
        let mut shell = headless_shell();
        shell.shared_input().push_key('q' as u16);
        shell.begin_line_input(80);
        assert_eq!(shell.input_mode(), InputMode::LineEditing);
        assert_eq!(shell.shared_input().take_key(), None);
    }

    #[test]
    fn typing_and_enter_commits_the_line_and_hides_the_cursor() {
        let mut shell = headless_shell();
        shell.print_text("> ");
        shell.begin_line_input(80);
        type_text(&mut shell, "go north");
        shell.handle_event(key(KeySymbol::Enter, "\r"));
        assert_eq!(shell.input_mode(), InputMode::Idle);
        assert_eq!(shell.shared_input().wait_line(), Some("go north".to_string()));
        assert!(!shell.surface().cursor().visible);
        assert_eq!(shell.input.editor.history_front(), Some("go north"));
    }

    #[test]
    fn edit_keys_are_not_queued_for_the_engine() {
        let mut shell = headless_shell();
        shell.begin_line_input(80);
        type_text(&mut shell, "abc");
        assert_eq!(shell.shared_input().take_key(), None);
        assert_eq!(shell.input.editor.buffer(), "abc");
    }

    #[test]
    fn double_click_inserts_the_rendered_word_with_a_space() {
        let mut shell = headless_shell();
        shell.set_font(FontStyle::FIXED);
        shell.print_text("open the door");
        shell.refresh_display();
        shell.begin_line_input(80);
        // "door" occupies fixed cells 9..13 on the first line; the edit
        // line itself started on the same line but the flushed record is
        // what lookup consults.
        shell.handle_event(BackendEvent::MouseDown {
            x: 9 * 8 + 2,
            y: 4,
            button: MouseButton::Left,
            click_count: 2,
        });
        assert_eq!(shell.input.editor.buffer(), "door ");
        assert_eq!(shell.input_mode(), InputMode::LineEditing);
    }

    #[test]
    fn insert_with_execute_commits_the_line() {
        let mut shell = headless_shell();
        shell.begin_line_input(80);
        type_text(&mut shell, "open ");
        shell.insert_input_text("door", true);
        assert_eq!(shell.input_mode(), InputMode::Idle);
        assert_eq!(shell.shared_input().wait_line(), Some("open door".to_string()));
    }

    #[test]
    fn insert_outside_line_editing_is_ignored() {
        let mut shell = headless_shell();
        shell.insert_input_text("stray", true);
        assert_eq!(shell.input_mode(), InputMode::Idle);
        assert_eq!(shell.shared_input().take_key(), None);
    }

    #[test]
    fn clicks_queue_for_the_engine_only_when_idle() {
        let mut shell = headless_shell();
        shell.handle_event(BackendEvent::MouseDown {
            x: 30,
            y: 40,
            button: MouseButton::Left,
            click_count: 1,
        });
        assert_eq!(shell.shared_input().take_key(), Some(crate::keys::engine_keys::CLICK));
        assert_eq!(shell.shared_input().take_click(), Some((30, 40)));
    }

    #[test]
    fn color_and_font_queries_reflect_surface_state() {
        let mut shell = headless_shell();
        shell.set_fg(4);
        shell.set_bg(0);
        shell.set_font(FontStyle::FIXED | FontStyle::BOLD);
        assert_eq!(shell.text_colors(), (4, 0));
        assert_eq!(shell.font(), FontStyle::FIXED | FontStyle::BOLD);
    }

    #[test]
    fn scrollback_view_snapshots_and_any_key_restores() {
        let mut shell = headless_shell();
        shell.print_text("history line");
        shell.begin_line_input(80);
        shell.handle_event(key(KeySymbol::PageUp, ""));
        assert_eq!(shell.view, ViewMode::Scrollback);
        shell.handle_event(key(KeySymbol::Char('x'), "x"));
        assert_eq!(shell.view, ViewMode::Normal);
        // The dismissing key is consumed by the overlay, not the editor.
        assert_eq!(shell.input.editor.buffer(), "");
    }

    #[test]
    fn parse_opcodes_round_trips_through_shell_actions() {
        let mut shell = headless_shell();
        shell.string_resolver = Some(Arc::new(|i| {
            (i == 7).then(|| "https://example.org".to_string())
        }));
        // OPEN_URL, string index 7.
        shell.opcode_write(&500i16.to_le_bytes());
        shell.opcode_write(&7i16.to_le_bytes());
        shell.parse_opcodes();
        assert_eq!(shell.opcode_read(2), vec![0, 0]);
    }

    #[test]
    fn game_finished_without_next_game_requests_shutdown() {
        let mut shell = headless_shell();
        shell.on_game_finished(0);
        assert_eq!(shell.tick().unwrap(), ShellStatus::Shutdown);
    }
}
