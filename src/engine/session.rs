// src/engine/session.rs

//! Worker-thread lifecycle for one run of the interpreter.
//!
//! The interpreter entry point runs on a dedicated thread and blocks inside
//! its own loop until the game ends; completion is reported back to the UI
//! thread as a posted bridge event. Exactly one game runs at a time, and a
//! finished session is fully joined before the next one starts.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::bridge::UiBridge;
use crate::engine::host::Host;
use crate::shell::Shell;

/// Resolves engine string-table indices for the opcode channel. Provided by
/// the interpreter adapter at session start.
pub type StringResolver = Arc<dyn Fn(u16) -> Option<String> + Send + Sync>;

/// The external interpreter entry point, behind a seam so tests can drive
/// the shell with a scripted stand-in.
pub trait Interpreter: Send {
    /// Runs the game to completion. `args` is the argv the entry point
    /// expects: program name followed by the game file path.
    fn run(&mut self, args: &[String], host: &mut dyn Host) -> i32;

    /// String-table access for opcode requests, when the engine offers it.
    fn string_resolver(&self) -> Option<StringResolver> {
        None
    }
}

/// Owns the worker thread for one running game.
pub struct EngineSession {
    worker: Option<JoinHandle<i32>>,
    running: Arc<AtomicBool>,
    game_path: PathBuf,
}

impl EngineSession {
    /// Launches the interpreter on its worker thread. The completion event
    /// is posted through the bridge; the UI side joins the session there.
    pub fn start(
        mut interpreter: Box<dyn Interpreter>,
        mut host: Box<dyn Host>,
        game_path: PathBuf,
        bridge: UiBridge<Shell>,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let running_flag = Arc::clone(&running);
        let args = vec![
            "hugo-shell".to_string(),
            game_path.display().to_string(),
        ];
        info!("starting game {}", game_path.display());

        let worker = std::thread::Builder::new()
            .name("hugo-engine".to_string())
            .spawn(move || {
                let code = interpreter.run(&args, host.as_mut());
                info!("interpreter returned {}", code);
                running_flag.store(false, Ordering::Release);
                bridge.post(move |shell: &mut Shell| shell.on_game_finished(code));
                code
            })
            .context("spawning engine worker thread")?;

        Ok(EngineSession {
            worker: Some(worker),
            running,
            game_path,
        })
    }

    pub fn game_path(&self) -> &PathBuf {
        &self.game_path
    }

    /// True while the interpreter loop is still executing.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Joins the finished worker. Called from the completion handler so a
    /// session fully unwinds before the next game starts.
    pub fn join(&mut self) -> Option<i32> {
        let worker = self.worker.take()?;
        match worker.join() {
            Ok(code) => Some(code),
            Err(_) => {
                warn!("engine worker panicked");
                None
            }
        }
    }
}
