// tests/line_input.rs

//! Cross-thread input end to end: a scripted interpreter on a real worker
//! thread blocks on the shell, the player's events arrive on the UI thread,
//! and the bridge hands the results back.

mod support;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use hugo_shell::backend::{BackendEvent, MouseButton};
use hugo_shell::engine::{Host, Interpreter};
use hugo_shell::input::InputMode;
use hugo_shell::keys::{engine_keys, KeySymbol, Modifiers};
use hugo_shell::shell::ShellStatus;

use support::{headless_shell, pump_until, PUMP_DEADLINE};

fn key(symbol: KeySymbol, text: &str) -> BackendEvent {
    BackendEvent::Key {
        symbol,
        modifiers: Modifiers::empty(),
        text: text.to_string(),
    }
}

struct LineGame {
    received: Arc<Mutex<Option<String>>>,
}

impl Interpreter for LineGame {
    fn run(&mut self, args: &[String], host: &mut dyn Host) -> i32 {
        assert_eq!(args.len(), 2, "argv is program name plus game path");
        host.print("> ");
        let line = host.get_line(80);
        *self.received.lock().unwrap() = Some(line);
        0
    }
}

#[test_log::test]
fn a_typed_line_reaches_the_blocked_engine_thread() {
    let mut shell = headless_shell();
    let received = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&received);
    shell.set_interpreter_factory(move || {
        Box::new(LineGame {
            received: Arc::clone(&slot),
        }) as Box<dyn Interpreter>
    });
    shell.request_game(PathBuf::from("cave.hex")).unwrap();

    pump_until(&mut shell, |s| s.input_mode() == InputMode::LineEditing);
    for ch in "go north".chars() {
        shell.handle_event(key(KeySymbol::Char(ch), &ch.to_string()));
    }
    shell.handle_event(key(KeySymbol::Enter, "\r"));

    pump_until(&mut shell, |s| !s.game_running());
    assert_eq!(received.lock().unwrap().as_deref(), Some("go north"));
    // Committing hid the cursor and left line-editing mode.
    assert!(!shell.surface().cursor().visible);
    assert_eq!(shell.input_mode(), InputMode::Idle);

    // No queued game: the finished session winds the shell down.
    let deadline = Instant::now() + PUMP_DEADLINE;
    loop {
        if shell.tick().expect("shell tick failed") == ShellStatus::Shutdown {
            break;
        }
        assert!(Instant::now() < deadline, "shell never shut down");
    }
}

struct KeyProbe {
    keys: Arc<Mutex<Vec<u16>>>,
}

impl Interpreter for KeyProbe {
    fn run(&mut self, _args: &[String], host: &mut dyn Host) -> i32 {
        let first = host.get_key();
        let second = host.get_key();
        self.keys.lock().unwrap().extend([first, second]);
        0
    }
}

#[test_log::test]
fn a_pending_key_wins_and_the_newer_event_is_coalesced_away() {
    let mut shell = headless_shell();
    let keys = Arc::new(Mutex::new(Vec::new()));
    let slot = Arc::clone(&keys);
    shell.set_interpreter_factory(move || {
        Box::new(KeyProbe {
            keys: Arc::clone(&slot),
        }) as Box<dyn Interpreter>
    });

    // Both keys arrive before the engine looks: the slot keeps the first,
    // the second is dropped rather than queued behind it.
    shell.handle_event(key(KeySymbol::Char('x'), "x"));
    shell.handle_event(key(KeySymbol::Char('y'), "y"));
    shell.request_game(PathBuf::from("probe.hex")).unwrap();

    // Once the slot drains the engine took 'x' and is parked again.
    pump_until(&mut shell, |s| !s.shared_input().has_key());
    shell.handle_event(key(KeySymbol::Char('z'), "z"));

    pump_until(&mut shell, |s| !s.game_running());
    assert_eq!(*keys.lock().unwrap(), vec!['x' as u16, 'z' as u16]);
}

struct ClickProbe {
    result: Arc<Mutex<Option<(u16, Option<(u16, u16)>)>>>,
}

impl Interpreter for ClickProbe {
    fn run(&mut self, _args: &[String], host: &mut dyn Host) -> i32 {
        let sentinel = host.get_key();
        let cell = host.get_click();
        *self.result.lock().unwrap() = Some((sentinel, cell));
        0
    }
}

#[test_log::test]
fn a_click_delivers_the_sentinel_key_then_the_cell_position() {
    let mut shell = headless_shell();
    let result = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&result);
    shell.set_interpreter_factory(move || {
        Box::new(ClickProbe {
            result: Arc::clone(&slot),
        }) as Box<dyn Interpreter>
    });

    shell.handle_event(BackendEvent::MouseDown {
        x: 30,
        y: 40,
        button: MouseButton::Left,
        click_count: 1,
    });
    shell.request_game(PathBuf::from("probe.hex")).unwrap();
    pump_until(&mut shell, |s| !s.game_running());

    // 8x16 fixed cells: pixel (30, 40) is 1-based cell (4, 3).
    let (sentinel, cell) = result.lock().unwrap().take().expect("probe never ran");
    assert_eq!(sentinel, engine_keys::CLICK);
    assert_eq!(cell, Some((4, 3)));
}
