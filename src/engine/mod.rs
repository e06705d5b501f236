// src/engine/mod.rs

//! The engine-facing half of the shell: the capability interface the
//! interpreter calls into, the virtual-file layer, and the worker-thread
//! session lifecycle.

pub mod files;
pub mod host;
pub mod session;

#[cfg(feature = "hugo-engine")]
pub mod ffi;

pub use files::{FileHandle, FileMode, FileTable, HandleKind};
pub use host::{Host, HostIo, ScreenCaps, ScreenMetrics};
pub use session::{EngineSession, Interpreter, StringResolver};
