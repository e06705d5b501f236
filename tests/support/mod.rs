// tests/support/mod.rs

//! Shared helpers: the test thread plays the UI thread, pumping the shell's
//! loop while an engine-side worker blocks on the bridge.

#![allow(dead_code)]

use std::time::{Duration, Instant};

use hugo_shell::backend::HeadlessDriver;
use hugo_shell::config::Settings;
use hugo_shell::engine::HostIo;
use hugo_shell::shell::Shell;

pub const PUMP_DEADLINE: Duration = Duration::from_secs(5);

pub fn headless_shell() -> Shell {
    Shell::new(Box::new(HeadlessDriver::new(640, 400)), Settings::default())
}

/// Ticks the shell until `done` holds.
pub fn pump_until(shell: &mut Shell, mut done: impl FnMut(&mut Shell) -> bool) {
    let deadline = Instant::now() + PUMP_DEADLINE;
    while !done(shell) {
        assert!(Instant::now() < deadline, "timed out pumping the shell");
        shell.tick().expect("shell tick failed");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Runs `body` against a fresh engine-side host on a worker thread while
/// the test thread services the bridge, then returns the worker's result.
pub fn drive_engine<R: Send + 'static>(
    shell: &mut Shell,
    body: impl FnOnce(&mut HostIo) -> R + Send + 'static,
) -> R {
    let mut host = HostIo::new(shell.bridge(), shell.shared_input());
    let worker = std::thread::spawn(move || body(&mut host));
    let deadline = Instant::now() + PUMP_DEADLINE;
    while !worker.is_finished() {
        assert!(Instant::now() < deadline, "engine-side worker hung");
        shell.tick().expect("shell tick failed");
        std::thread::sleep(Duration::from_millis(1));
    }
    worker.join().expect("engine-side worker panicked")
}
