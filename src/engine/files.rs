// src/engine/files.rs

//! The abstracted file-handle layer under the engine's file callbacks.
//!
//! Two reserved filenames never reach the filesystem: the capability-check
//! file, whose reads always yield a fixed sentinel byte so the interpreter
//! can verify it is running under this shell, and the control file, which
//! binds to the opcode channel. The binding is resolved once at open time
//! into a handle kind; per-operation filename comparisons do not exist.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, warn};

/// Reads of this virtual file always succeed and yield the sentinel byte.
pub const CAPABILITY_CHECK_FILE: &str = "HUGOSHELL.CHK";

/// This virtual file carries the opcode channel.
pub const CONTROL_FILE: &str = "HUGOSHELL.OPC";

/// Every read of the capability-check file returns this byte.
pub const CHECK_SENTINEL_BYTE: u8 = b'1';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
    Append,
    ReadWrite,
}

impl FileMode {
    pub fn writable(&self) -> bool {
        !matches!(self, FileMode::Read)
    }
}

/// What a handle was bound to when it was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Real,
    CapabilityCheck,
    Control,
}

enum Binding {
    Real(File),
    CapabilityCheck,
    Control { mode: FileMode, written: bool },
}

/// Result of closing a handle; tells the caller whether a control-file
/// write session just ended (which triggers an opcode parse).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseOutcome {
    pub kind: HandleKind,
    pub control_write_session: bool,
}

fn virtual_kind(path: &Path) -> Option<HandleKind> {
    let name = path.file_name()?.to_str()?;
    if name.eq_ignore_ascii_case(CAPABILITY_CHECK_FILE) {
        return Some(HandleKind::CapabilityCheck);
    }
    if name.eq_ignore_ascii_case(CONTROL_FILE) {
        return Some(HandleKind::Control);
    }
    None
}

/// Open-handle table for one engine session. Real-file I/O happens here on
/// the engine thread; control-channel bytes are routed by the caller
/// through the bridge, this table only reports the handle kind.
#[derive(Default)]
pub struct FileTable {
    next: u32,
    open: HashMap<u32, Binding>,
}

impl FileTable {
    pub fn new() -> Self {
        FileTable::default()
    }

    pub fn open(&mut self, path: &Path, mode: FileMode) -> Option<FileHandle> {
        let binding = match virtual_kind(path) {
            Some(HandleKind::CapabilityCheck) => {
                // Always opens for reading, regardless of the filesystem.
                if mode.writable() {
                    warn!("capability-check file opened for writing, refusing");
                    return None;
                }
                Binding::CapabilityCheck
            }
            Some(HandleKind::Control) => Binding::Control { mode, written: false },
            _ => {
                let mut options = OpenOptions::new();
                match mode {
                    FileMode::Read => options.read(true),
                    FileMode::Write => options.write(true).create(true).truncate(true),
                    FileMode::Append => options.append(true).create(true),
                    FileMode::ReadWrite => options.read(true).write(true).create(true),
                };
                match options.open(path) {
                    Ok(file) => Binding::Real(file),
                    Err(e) => {
                        debug!("open {} failed: {}", path.display(), e);
                        return None;
                    }
                }
            }
        };
        self.next += 1;
        let id = self.next;
        self.open.insert(id, binding);
        Some(FileHandle(id))
    }

    pub fn kind(&self, handle: FileHandle) -> Option<HandleKind> {
        self.open.get(&handle.0).map(|b| match b {
            Binding::Real(_) => HandleKind::Real,
            Binding::CapabilityCheck => HandleKind::CapabilityCheck,
            Binding::Control { .. } => HandleKind::Control,
        })
    }

    /// Marks that the control channel saw a write through this handle.
    pub fn mark_control_written(&mut self, handle: FileHandle) {
        if let Some(Binding::Control { written, .. }) = self.open.get_mut(&handle.0) {
            *written = true;
        }
    }

    pub fn close(&mut self, handle: FileHandle) -> Option<CloseOutcome> {
        let binding = self.open.remove(&handle.0)?;
        let outcome = match binding {
            Binding::Real(_) => CloseOutcome {
                kind: HandleKind::Real,
                control_write_session: false,
            },
            Binding::CapabilityCheck => CloseOutcome {
                kind: HandleKind::CapabilityCheck,
                control_write_session: false,
            },
            Binding::Control { mode, written } => CloseOutcome {
                kind: HandleKind::Control,
                control_write_session: mode.writable() && written,
            },
        };
        Some(outcome)
    }

    /// Reads from a real or capability-check handle. Control reads are
    /// routed by the caller; here they yield nothing.
    pub fn read(&mut self, handle: FileHandle, buf: &mut [u8]) -> usize {
        match self.open.get_mut(&handle.0) {
            Some(Binding::Real(file)) => file.read(buf).unwrap_or(0),
            Some(Binding::CapabilityCheck) => {
                buf.fill(CHECK_SENTINEL_BYTE);
                buf.len()
            }
            Some(Binding::Control { .. }) | None => 0,
        }
    }

    /// Writes to a real handle. Control writes are routed by the caller.
    pub fn write(&mut self, handle: FileHandle, data: &[u8]) -> usize {
        match self.open.get_mut(&handle.0) {
            Some(Binding::Real(file)) => file.write(data).unwrap_or(0),
            _ => 0,
        }
    }

    /// Seeks a real handle. Virtual handles ignore seeks and report
    /// failure in-band.
    pub fn seek(&mut self, handle: FileHandle, pos: SeekFrom) -> bool {
        match self.open.get_mut(&handle.0) {
            Some(Binding::Real(file)) => file.seek(pos).is_ok(),
            _ => false,
        }
    }

    /// Closes everything, for end-of-session cleanup.
    pub fn close_all(&mut self) {
        self.open.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn capability_check_reads_always_yield_the_sentinel() {
        let mut table = FileTable::new();
        let path = PathBuf::from("/some/game/dir").join(CAPABILITY_CHECK_FILE);
        let handle = table.open(&path, FileMode::Read).unwrap();
        assert_eq!(table.kind(handle), Some(HandleKind::CapabilityCheck));
        let mut buf = [0u8; 7];
        assert_eq!(table.read(handle, &mut buf), 7);
        assert!(buf.iter().all(|b| *b == CHECK_SENTINEL_BYTE));
        // A second read keeps yielding it; there is no EOF.
        assert_eq!(table.read(handle, &mut buf), 7);
    }

    #[test]
    fn check_file_matches_case_insensitively_and_never_touches_disk() {
        let mut table = FileTable::new();
        let path = PathBuf::from("/nonexistent/dir/hugoshell.chk");
        assert!(table.open(&path, FileMode::Read).is_some());
        assert!(table.open(&path, FileMode::Write).is_none());
    }

    #[test]
    fn control_close_reports_a_write_session_only_after_writes() {
        let mut table = FileTable::new();
        let path = PathBuf::from(CONTROL_FILE);

        let read_handle = table.open(&path, FileMode::Read).unwrap();
        let outcome = table.close(read_handle).unwrap();
        assert!(!outcome.control_write_session);

        let write_handle = table.open(&path, FileMode::Write).unwrap();
        assert_eq!(table.kind(write_handle), Some(HandleKind::Control));
        table.mark_control_written(write_handle);
        let outcome = table.close(write_handle).unwrap();
        assert_eq!(outcome.kind, HandleKind::Control);
        assert!(outcome.control_write_session);
    }

    #[test]
    fn real_files_round_trip_through_the_table() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("hugo-shell-filetable-{}.dat", std::process::id()));
        let mut table = FileTable::new();

        let writer = table.open(&path, FileMode::Write).unwrap();
        assert_eq!(table.kind(writer), Some(HandleKind::Real));
        assert_eq!(table.write(writer, b"save data"), 9);
        table.close(writer);

        let reader = table.open(&path, FileMode::Read).unwrap();
        assert!(table.seek(reader, SeekFrom::Start(5)));
        let mut buf = [0u8; 4];
        assert_eq!(table.read(reader, &mut buf), 4);
        assert_eq!(&buf, b"data");
        table.close(reader);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_real_file_reports_failure_in_band() {
        let mut table = FileTable::new();
        assert!(table
            .open(Path::new("/nonexistent/save.dat"), FileMode::Read)
            .is_none());
    }
}
