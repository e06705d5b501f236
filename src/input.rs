// src/input.rs

//! Input queues, the line editor, and the input-mode state machine.
//!
//! Two very different consumers meet here. The engine thread blocks for a
//! single keystroke or a completed line; the UI thread feeds events as they
//! arrive. The pending key/click slots, the completed-line slot, and the
//! quit flag are the only state both threads touch directly, guarded by one
//! mutex and condition variable ([`SharedInput`]). Everything else (the
//! edit buffer, history, mode) is UI-thread-owned.
//!
//! The pending queues are single `Option` slots on purpose: the engine
//! polls "is a key waiting" before blocking, so a newer event is coalesced
//! (dropped), never queued behind a stale one.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

use log::trace;
use unicode_segmentation::UnicodeSegmentation;

use crate::keys::engine_keys;

/// Command-line history capacity; oldest entries are evicted first.
pub const HISTORY_CAP: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Keys and clicks are queued raw for the engine.
    Idle,
    /// Keys edit the pending command line.
    LineEditing,
}

/// The engine-visible pending input slots.
#[derive(Debug, Default)]
struct PendingInput {
    key: Option<u16>,
    click: Option<(i32, i32)>,
    line: Option<String>,
    quitting: bool,
}

/// Cross-thread input rendezvous: one mutex, one condvar, no timeouts.
///
/// The check-then-wait on the engine side holds the mutex across both
/// steps, so a signal between check and wait cannot be lost.
#[derive(Debug, Default)]
pub struct SharedInput {
    state: Mutex<PendingInput>,
    cond: Condvar,
}

impl SharedInput {
    pub fn new() -> Self {
        SharedInput::default()
    }

    fn lock(&self) -> MutexGuard<'_, PendingInput> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queues a keystroke. Returns false when a key is already pending (the
    /// newer event is coalesced away).
    pub fn push_key(&self, code: u16) -> bool {
        debug_assert_ne!(code, engine_keys::CLICK, "raw keys must not use the click sentinel");
        let mut state = self.lock();
        if state.key.is_some() {
            trace!("key {} dropped, slot occupied", code);
            return false;
        }
        state.key = Some(code);
        self.cond.notify_all();
        true
    }

    /// Queues a mouse click as the sentinel key plus a point. Returns false
    /// when an event is already pending.
    pub fn push_click(&self, x: i32, y: i32) -> bool {
        let mut state = self.lock();
        if state.key.is_some() {
            trace!("click dropped, slot occupied");
            return false;
        }
        state.key = Some(engine_keys::CLICK);
        state.click = Some((x, y));
        self.cond.notify_all();
        true
    }

    pub fn has_key(&self) -> bool {
        self.lock().key.is_some()
    }

    /// Takes the pending key without blocking. A sentinel key leaves its
    /// click in place for [`take_click`](Self::take_click).
    pub fn take_key(&self) -> Option<u16> {
        self.lock().key.take()
    }

    pub fn take_click(&self) -> Option<(i32, i32)> {
        self.lock().click.take()
    }

    /// Blocks until a key (or click sentinel) arrives. Returns `None` when
    /// the shell is quitting.
    pub fn wait_key(&self) -> Option<u16> {
        let mut state = self.lock();
        loop {
            if state.quitting {
                return None;
            }
            if let Some(key) = state.key.take() {
                return Some(key);
            }
            state = self.cond.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Hands a committed line to the waiting engine thread.
    pub fn complete_line(&self, line: String) {
        let mut state = self.lock();
        state.line = Some(line);
        self.cond.notify_all();
    }

    /// Blocks until a line is committed. Returns `None` when quitting.
    pub fn wait_line(&self) -> Option<String> {
        let mut state = self.lock();
        loop {
            if state.quitting {
                return None;
            }
            if let Some(line) = state.line.take() {
                return Some(line);
            }
            state = self.cond.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Drops stale pending events, so a new edit session starts clean.
    pub fn clear_events(&self) {
        let mut state = self.lock();
        state.key = None;
        state.click = None;
        state.line = None;
    }

    /// Wakes every blocked waiter for shutdown. There is no cooperative
    /// cancellation of the engine thread beyond this.
    pub fn begin_quit(&self) {
        let mut state = self.lock();
        state.quitting = true;
        self.cond.notify_all();
    }

    pub fn is_quitting(&self) -> bool {
        self.lock().quitting
    }
}

/// The UI-thread-owned line editor: buffer, caret, history, recall backup.
#[derive(Debug, Default)]
pub struct LineEditor {
    buffer: String,
    /// Caret as a byte offset into `buffer`, always on a grapheme boundary.
    caret: usize,
    /// Pixel position where the edit line is echoed.
    origin: (i32, i32),
    max_len: usize,
    /// Most-recent-first committed lines.
    history: VecDeque<String>,
    /// Position inside `history` while recalling; `None` means the live
    /// buffer is showing.
    recall_pos: Option<usize>,
    /// Snapshot of the in-progress line taken when recall leaves it.
    recall_backup: Option<String>,
}

impl LineEditor {
    pub fn new() -> Self {
        LineEditor::default()
    }

    /// Starts a new edit session at the given echo origin.
    pub fn begin(&mut self, origin: (i32, i32), max_len: usize) {
        self.buffer.clear();
        self.caret = 0;
        self.origin = origin;
        self.max_len = max_len;
        self.recall_pos = None;
        self.recall_backup = None;
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn caret(&self) -> usize {
        self.caret
    }

    pub fn origin(&self) -> (i32, i32) {
        self.origin
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history_front(&self) -> Option<&str> {
        self.history.front().map(String::as_str)
    }

    fn prev_grapheme(&self) -> usize {
        self.buffer[..self.caret]
            .grapheme_indices(true)
            .last()
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn next_grapheme(&self) -> usize {
        self.buffer[self.caret..]
            .graphemes(true)
            .next()
            .map(|g| self.caret + g.len())
            .unwrap_or(self.buffer.len())
    }

    fn word_start_before(&self, pos: usize) -> usize {
        self.buffer
            .unicode_word_indices()
            .take_while(|(i, _)| *i < pos)
            .last()
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn word_end_after(&self, pos: usize) -> usize {
        for (i, w) in self.buffer.unicode_word_indices() {
            let end = i + w.len();
            if end > pos {
                return end;
            }
        }
        self.buffer.len()
    }

    pub fn insert(&mut self, text: &str) {
        let room = self.max_len.saturating_sub(self.buffer.chars().count());
        if room == 0 && self.max_len > 0 {
            return;
        }
        let clipped: String = if self.max_len > 0 {
            text.chars().take(room).collect()
        } else {
            text.to_string()
        };
        self.buffer.insert_str(self.caret, &clipped);
        self.caret += clipped.len();
    }

    pub fn backspace(&mut self) {
        if self.caret == 0 {
            return;
        }
        let start = self.prev_grapheme();
        self.buffer.replace_range(start..self.caret, "");
        self.caret = start;
    }

    pub fn delete_forward(&mut self) {
        if self.caret >= self.buffer.len() {
            return;
        }
        let end = self.next_grapheme();
        self.buffer.replace_range(self.caret..end, "");
    }

    pub fn delete_word_back(&mut self) {
        let start = self.word_start_before(self.caret);
        self.buffer.replace_range(start..self.caret, "");
        self.caret = start;
    }

    pub fn delete_word_forward(&mut self) {
        let end = self.word_end_after(self.caret);
        self.buffer.replace_range(self.caret..end, "");
    }

    pub fn move_left(&mut self) {
        self.caret = self.prev_grapheme();
    }

    pub fn move_right(&mut self) {
        self.caret = self.next_grapheme();
    }

    pub fn move_word_left(&mut self) {
        self.caret = self.word_start_before(self.caret);
    }

    pub fn move_word_right(&mut self) {
        self.caret = self.word_end_after(self.caret);
    }

    pub fn move_home(&mut self) {
        self.caret = 0;
    }

    pub fn move_end(&mut self) {
        self.caret = self.buffer.len();
    }

    fn load(&mut self, text: String) {
        self.buffer = text;
        self.caret = self.buffer.len();
    }

    /// Recalls the next-older history entry. Leaving the live buffer
    /// snapshots it so recall can be unwound exactly.
    pub fn recall_previous(&mut self) {
        match self.recall_pos {
            None => {
                if self.history.is_empty() {
                    return;
                }
                self.recall_backup = Some(std::mem::take(&mut self.buffer));
                self.recall_pos = Some(0);
                self.load(self.history[0].clone());
            }
            Some(pos) if pos + 1 < self.history.len() => {
                self.recall_pos = Some(pos + 1);
                self.load(self.history[pos + 1].clone());
            }
            Some(_) => {}
        }
    }

    /// Walks recall back toward the live buffer, restoring the snapshot
    /// when it crosses the newest entry.
    pub fn recall_next(&mut self) {
        match self.recall_pos {
            Some(0) => {
                self.recall_pos = None;
                let restored = self.recall_backup.take().unwrap_or_default();
                self.load(restored);
            }
            Some(pos) => {
                self.recall_pos = Some(pos - 1);
                self.load(self.history[pos - 1].clone());
            }
            None => {}
        }
    }

    /// Accepts the line: history bookkeeping, reset, return the text.
    /// The line joins history only when non-empty and different from the
    /// newest entry.
    pub fn commit(&mut self) -> String {
        let line = std::mem::take(&mut self.buffer);
        self.caret = 0;
        self.recall_pos = None;
        self.recall_backup = None;
        if !line.is_empty() && self.history.front() != Some(&line) {
            self.history.push_front(line.clone());
            self.history.truncate(HISTORY_CAP);
        }
        line
    }
}

/// The UI-thread view of input: current mode plus the editor.
#[derive(Debug, Default)]
pub struct InputState {
    pub mode: InputMode,
    pub editor: LineEditor,
}

impl Default for InputMode {
    fn default() -> Self {
        InputMode::Idle
    }
}

impl InputState {
    pub fn new() -> Self {
        InputState {
            mode: InputMode::Idle,
            editor: LineEditor::new(),
        }
    }
}
