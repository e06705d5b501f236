// src/opcode.rs

//! The host-extension opcode protocol.
//!
//! The engine reaches host capabilities beyond the base callback ABI by
//! writing requests to a virtual control file and reading replies back.
//! Requests and replies are sequences of signed 16-bit little-endian words:
//! `[opcode][param]*` in, `[result][value]*` out. The outbound queue starts
//! with a fixed two-byte handshake so the engine can probe for protocol
//! support by reading before it writes anything.
//!
//! `parse()` runs once per write session, on the UI thread, when the
//! control file is closed after writing. All side effects go through
//! [`OpcodeActions`] so the state machine stays testable.

use std::collections::VecDeque;

use log::{debug, warn};

/// Initial outbound bytes; present before any request is parsed.
pub const HANDSHAKE: [u8; 2] = *b"HO";

/// Protocol version reported by `GET_VERSION`.
pub const PROTOCOL_VERSION: (i16, i16, i16) = (1, 0, 0);

// Request opcodes.
const OP_GET_VERSION: i16 = 100;
const OP_GET_OS: i16 = 200;
const OP_ABORT: i16 = 300;
const OP_FADE_SCREEN: i16 = 400;
const OP_OPEN_URL: i16 = 500;
const OP_SET_FULLSCREEN: i16 = 600;
const OP_SET_CLIPBOARD: i16 = 700;

// Reply codes.
pub const RESULT_OK: i16 = 0;
pub const RESULT_WRONG_PARAM_COUNT: i16 = 10;
pub const RESULT_WRONG_BYTE_COUNT: i16 = 20;
pub const RESULT_UNKNOWN_OPCODE: i16 = 30;

/// Host actions an opcode request can trigger. Implemented by the shell;
/// mocked in tests.
pub trait OpcodeActions {
    /// Resolves an engine string-table index to text.
    fn resolve_string(&mut self, index: u16) -> Option<String>;

    /// Fades the window between alpha levels, blocking when requested.
    fn fade_screen(&mut self, millis: u32, start_alpha: u8, end_alpha: u8, block: bool);

    fn open_url(&mut self, url: &str);

    fn set_fullscreen(&mut self, on: bool);

    fn set_clipboard(&mut self, text: &str);

    /// Immediate process termination with no cleanup. Does not return in
    /// production; test doubles record the call instead.
    fn abort_process(&mut self);
}

/// The control-file byte queues and parse state machine.
#[derive(Debug)]
pub struct OpcodeChannel {
    inbound: VecDeque<u8>,
    outbound: VecDeque<u8>,
}

impl Default for OpcodeChannel {
    fn default() -> Self {
        OpcodeChannel::new()
    }
}

impl OpcodeChannel {
    pub fn new() -> Self {
        OpcodeChannel {
            inbound: VecDeque::new(),
            outbound: VecDeque::from(HANDSHAKE.to_vec()),
        }
    }

    /// Feeds bytes written to the control file.
    pub fn write_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    /// Drains one byte of reply data; `None` is end-of-file.
    pub fn read_outbound_byte(&mut self) -> Option<u8> {
        self.outbound.pop_front()
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    fn push_word(&mut self, word: i16) {
        let [lo, hi] = word.to_le_bytes();
        self.outbound.push_back(lo);
        self.outbound.push_back(hi);
    }

    fn take_request_words(&mut self) -> Vec<i16> {
        let mut words = Vec::with_capacity(self.inbound.len() / 2);
        while self.inbound.len() >= 2 {
            let lo = self.inbound.pop_front().unwrap();
            let hi = self.inbound.pop_front().unwrap();
            words.push(i16::from_le_bytes([lo, hi]));
        }
        self.inbound.clear();
        words
    }

    /// Parses one request session. Called when the control file is closed
    /// after writing. The inbound buffer is empty on every exit path; an
    /// empty inbound buffer leaves the previous reply (or the handshake)
    /// readable.
    pub fn parse(&mut self, actions: &mut dyn OpcodeActions) {
        if self.inbound.is_empty() {
            return;
        }
        if self.inbound.len() % 2 != 0 {
            warn!("opcode request with odd byte count {}", self.inbound.len());
            self.inbound.clear();
            self.outbound.clear();
            self.push_word(RESULT_WRONG_BYTE_COUNT);
            return;
        }

        let words = self.take_request_words();
        let opcode = words[0];
        let params = &words[1..];
        debug!("opcode request {} with {} params", opcode, params.len());

        // Each parsed request replaces the previous reply.
        self.outbound.clear();

        match (opcode, params.len()) {
            (OP_GET_VERSION, 0) => {
                self.push_word(RESULT_OK);
                let (major, minor, patch) = PROTOCOL_VERSION;
                self.push_word(major);
                self.push_word(minor);
                self.push_word(patch);
            }
            (OP_GET_OS, 0) => {
                self.push_word(RESULT_OK);
                self.push_word(host_os_code());
            }
            (OP_ABORT, 0) => {
                warn!("abort requested by game");
                actions.abort_process();
            }
            (OP_FADE_SCREEN, 4) => {
                let millis = params[0].max(0) as u32;
                let start = params[1].clamp(0, 255) as u8;
                let end = params[2].clamp(0, 255) as u8;
                let block = params[3] != 0;
                actions.fade_screen(millis, start, end, block);
                self.push_word(RESULT_OK);
            }
            (OP_OPEN_URL, 1) => {
                match actions.resolve_string(params[0] as u16) {
                    Some(url) => actions.open_url(&url),
                    None => warn!("open-url request with unresolvable string {}", params[0]),
                }
                self.push_word(RESULT_OK);
            }
            (OP_SET_FULLSCREEN, 1) => {
                actions.set_fullscreen(params[0] != 0);
                self.push_word(RESULT_OK);
            }
            (OP_SET_CLIPBOARD, 1) => {
                match actions.resolve_string(params[0] as u16) {
                    Some(text) => actions.set_clipboard(&text),
                    None => warn!("clipboard request with unresolvable string {}", params[0]),
                }
                self.push_word(RESULT_OK);
            }
            (
                OP_GET_VERSION | OP_GET_OS | OP_ABORT | OP_FADE_SCREEN | OP_OPEN_URL
                | OP_SET_FULLSCREEN | OP_SET_CLIPBOARD,
                n,
            ) => {
                warn!("opcode {} with wrong parameter count {}", opcode, n);
                self.push_word(RESULT_WRONG_PARAM_COUNT);
            }
            _ => {
                warn!("unknown opcode {}", opcode);
                self.push_word(RESULT_UNKNOWN_OPCODE);
            }
        }
    }
}

fn host_os_code() -> i16 {
    if cfg!(target_os = "windows") {
        1
    } else if cfg!(target_os = "macos") {
        2
    } else if cfg!(target_os = "linux") {
        3
    } else {
        0
    }
}

/// Terminates the process immediately, skipping all cleanup. The real
/// implementation behind [`OpcodeActions::abort_process`].
pub fn abort_process_now() -> ! {
    // _exit skips atexit handlers and destructors on purpose.
    unsafe { libc::_exit(0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockActions {
        strings: Vec<(u16, String)>,
        fades: Vec<(u32, u8, u8, bool)>,
        urls: Vec<String>,
        fullscreen: Vec<bool>,
        clipboard: Vec<String>,
        aborts: usize,
    }

    impl OpcodeActions for MockActions {
        fn resolve_string(&mut self, index: u16) -> Option<String> {
            self.strings
                .iter()
                .find(|(i, _)| *i == index)
                .map(|(_, s)| s.clone())
        }
        fn fade_screen(&mut self, millis: u32, start_alpha: u8, end_alpha: u8, block: bool) {
            self.fades.push((millis, start_alpha, end_alpha, block));
        }
        fn open_url(&mut self, url: &str) {
            self.urls.push(url.to_string());
        }
        fn set_fullscreen(&mut self, on: bool) {
            self.fullscreen.push(on);
        }
        fn set_clipboard(&mut self, text: &str) {
            self.clipboard.push(text.to_string());
        }
        fn abort_process(&mut self) {
            self.aborts += 1;
        }
    }

    fn write_words(chan: &mut OpcodeChannel, words: &[i16]) {
        for w in words {
            chan.write_inbound(&w.to_le_bytes());
        }
    }

    fn drain_words(chan: &mut OpcodeChannel) -> Vec<i16> {
        let mut out = Vec::new();
        while chan.outbound_len() >= 2 {
            let lo = chan.read_outbound_byte().unwrap();
            let hi = chan.read_outbound_byte().unwrap();
            out.push(i16::from_le_bytes([lo, hi]));
        }
        out
    }

    #[test]
    fn handshake_is_readable_before_any_request() {
        let mut chan = OpcodeChannel::new();
        assert_eq!(chan.read_outbound_byte(), Some(HANDSHAKE[0]));
        assert_eq!(chan.read_outbound_byte(), Some(HANDSHAKE[1]));
        assert_eq!(chan.read_outbound_byte(), None);
    }

    #[test]
    fn empty_parse_preserves_previous_reply() {
        let mut chan = OpcodeChannel::new();
        let mut actions = MockActions::default();
        chan.parse(&mut actions);
        assert_eq!(chan.outbound_len(), HANDSHAKE.len());
    }

    #[test]
    fn get_version_round_trips() {
        let mut chan = OpcodeChannel::new();
        let mut actions = MockActions::default();
        write_words(&mut chan, &[OP_GET_VERSION]);
        chan.parse(&mut actions);
        let reply = drain_words(&mut chan);
        assert_eq!(reply.len(), 4);
        assert_eq!(reply[0], RESULT_OK);
        assert_eq!(
            (reply[1], reply[2], reply[3]),
            PROTOCOL_VERSION
        );
    }

    #[test]
    fn extra_parameter_yields_wrong_param_count_and_nothing_else() {
        let mut chan = OpcodeChannel::new();
        let mut actions = MockActions::default();
        write_words(&mut chan, &[OP_GET_VERSION, 77]);
        chan.parse(&mut actions);
        assert_eq!(drain_words(&mut chan), vec![RESULT_WRONG_PARAM_COUNT]);
    }

    #[test]
    fn odd_byte_count_discards_and_reports() {
        let mut chan = OpcodeChannel::new();
        let mut actions = MockActions::default();
        chan.write_inbound(&[0x64, 0x00, 0x01]);
        chan.parse(&mut actions);
        assert_eq!(drain_words(&mut chan), vec![RESULT_WRONG_BYTE_COUNT]);
        // Inbound was discarded: a following parse is a no-op.
        chan.parse(&mut actions);
        assert_eq!(chan.outbound_len(), 0);
    }

    #[test]
    fn unknown_opcode_replies_unknown() {
        let mut chan = OpcodeChannel::new();
        let mut actions = MockActions::default();
        write_words(&mut chan, &[4242]);
        chan.parse(&mut actions);
        assert_eq!(drain_words(&mut chan), vec![RESULT_UNKNOWN_OPCODE]);
    }

    #[test]
    fn get_os_reports_this_platform() {
        let mut chan = OpcodeChannel::new();
        let mut actions = MockActions::default();
        write_words(&mut chan, &[OP_GET_OS]);
        chan.parse(&mut actions);
        let reply = drain_words(&mut chan);
        assert_eq!(reply[0], RESULT_OK);
        assert_eq!(reply[1], host_os_code());
    }

    #[test]
    fn fade_forwards_parameters_and_replies_ok() {
        let mut chan = OpcodeChannel::new();
        let mut actions = MockActions::default();
        write_words(&mut chan, &[OP_FADE_SCREEN, 500, 0, 255, 1]);
        chan.parse(&mut actions);
        assert_eq!(drain_words(&mut chan), vec![RESULT_OK]);
        assert_eq!(actions.fades, vec![(500, 0, 255, true)]);
    }

    #[test]
    fn open_url_and_clipboard_resolve_strings() {
        let mut chan = OpcodeChannel::new();
        let mut actions = MockActions {
            strings: vec![(3, "https://example.com".to_string()), (4, "hello".to_string())],
            ..Default::default()
        };
        write_words(&mut chan, &[OP_OPEN_URL, 3]);
        chan.parse(&mut actions);
        assert_eq!(drain_words(&mut chan), vec![RESULT_OK]);
        write_words(&mut chan, &[OP_SET_CLIPBOARD, 4]);
        chan.parse(&mut actions);
        assert_eq!(drain_words(&mut chan), vec![RESULT_OK]);
        assert_eq!(actions.urls, vec!["https://example.com"]);
        assert_eq!(actions.clipboard, vec!["hello"]);
    }

    #[test]
    fn fullscreen_toggles_through_actions() {
        let mut chan = OpcodeChannel::new();
        let mut actions = MockActions::default();
        write_words(&mut chan, &[OP_SET_FULLSCREEN, 1]);
        chan.parse(&mut actions);
        write_words(&mut chan, &[OP_SET_FULLSCREEN, 0]);
        chan.parse(&mut actions);
        assert_eq!(actions.fullscreen, vec![true, false]);
    }

    #[test]
    fn abort_reaches_the_action_and_clears_inbound() {
        let mut chan = OpcodeChannel::new();
        let mut actions = MockActions::default();
        write_words(&mut chan, &[OP_ABORT]);
        chan.parse(&mut actions);
        assert_eq!(actions.aborts, 1);
        // Production never reaches this point; the test double returns, and
        // the request must still have been consumed.
        chan.parse(&mut actions);
        assert_eq!(actions.aborts, 1);
    }
}
