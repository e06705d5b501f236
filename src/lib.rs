// src/lib.rs

//! Desktop presentation shell for the Hugo interactive-fiction engine.
//!
//! The engine interprets game logic on a dedicated worker thread and calls
//! back into this crate for every I/O operation; the crate renders a
//! terminal-like raster surface, manages input, persists settings, and
//! brokers media playback. [`shell::Shell`] runs the UI loop;
//! [`engine::host::Host`] is the capability surface the interpreter calls;
//! [`bridge::UiBridge`] carries every engine-thread request onto the UI
//! thread and blocks until it completes.

pub mod backend;
pub mod bridge;
pub mod color;
pub mod config;
pub mod engine;
pub mod font;
pub mod input;
pub mod keys;
pub mod media;
pub mod opcode;
pub mod script;
pub mod shell;
pub mod surface;
