// tests/opcode_session.rs

//! Opcode channel sessions over the virtual control file, crossing the real
//! bridge from a worker thread: write a request, close the handle, read the
//! reply back.

mod support;

use hugo_shell::engine::files::{CAPABILITY_CHECK_FILE, CHECK_SENTINEL_BYTE, CONTROL_FILE};
use hugo_shell::engine::{FileMode, Host, HostIo};
use hugo_shell::opcode::{
    HANDSHAKE, PROTOCOL_VERSION, RESULT_OK, RESULT_UNKNOWN_OPCODE, RESULT_WRONG_BYTE_COUNT,
    RESULT_WRONG_PARAM_COUNT,
};

use support::{drive_engine, headless_shell};

/// One request session as the interpreter performs it.
fn request(host: &mut HostIo, words: &[i16]) -> Vec<i16> {
    let handle = host
        .file_open(CONTROL_FILE, FileMode::Write)
        .expect("control file must open for writing");
    for word in words {
        assert_eq!(host.file_write(handle, &word.to_le_bytes()), 2);
    }
    // Closing a written control handle ends the session and runs the parse.
    assert!(host.file_close(handle));
    read_reply(host)
}

fn read_reply(host: &mut HostIo) -> Vec<i16> {
    let handle = host
        .file_open(CONTROL_FILE, FileMode::Read)
        .expect("control file must open for reading");
    let mut out = Vec::new();
    loop {
        let mut pair = [0u8; 2];
        if host.file_read(handle, &mut pair) < 2 {
            break;
        }
        out.push(i16::from_le_bytes(pair));
    }
    assert!(host.file_close(handle));
    out
}

#[test_log::test]
fn handshake_is_readable_before_any_request() {
    let mut shell = headless_shell();
    let (bytes, eof) = drive_engine(&mut shell, |host| {
        let handle = host.file_open(CONTROL_FILE, FileMode::Read).unwrap();
        let mut buf = [0u8; 8];
        let n = host.file_read(handle, &mut buf);
        let mut scratch = [0u8; 2];
        let eof = host.file_read(handle, &mut scratch);
        host.file_close(handle);
        (buf[..n].to_vec(), eof)
    });
    assert_eq!(bytes, HANDSHAKE);
    assert_eq!(eof, 0, "a drained channel reads as end-of-file");
}

#[test_log::test]
fn get_version_round_trips_over_the_control_file() {
    let mut shell = headless_shell();
    let reply = drive_engine(&mut shell, |host| request(host, &[100]));
    let (major, minor, patch) = PROTOCOL_VERSION;
    assert_eq!(reply, vec![RESULT_OK, major, minor, patch]);
}

#[test_log::test]
fn a_bogus_extra_parameter_yields_wrong_param_count_alone() {
    let mut shell = headless_shell();
    let reply = drive_engine(&mut shell, |host| request(host, &[100, 77]));
    assert_eq!(reply, vec![RESULT_WRONG_PARAM_COUNT]);
}

#[test_log::test]
fn an_odd_byte_count_is_discarded_and_reported() {
    let mut shell = headless_shell();
    let reply = drive_engine(&mut shell, |host| {
        let handle = host.file_open(CONTROL_FILE, FileMode::Write).unwrap();
        assert_eq!(host.file_write(handle, &[0x64, 0x00, 0x01]), 3);
        host.file_close(handle);
        let first = read_reply(host);
        // The truncated request was discarded with the session; a second
        // close-without-write parses nothing and leaves no reply behind.
        let empty_handle = host.file_open(CONTROL_FILE, FileMode::Write).unwrap();
        host.file_close(empty_handle);
        (first, read_reply(host))
    });
    assert_eq!(reply.0, vec![RESULT_WRONG_BYTE_COUNT]);
    assert_eq!(reply.1, Vec::<i16>::new());
}

#[test_log::test]
fn an_unknown_opcode_replies_unknown() {
    let mut shell = headless_shell();
    let reply = drive_engine(&mut shell, |host| request(host, &[4242]));
    assert_eq!(reply, vec![RESULT_UNKNOWN_OPCODE]);
}

#[test_log::test]
fn set_fullscreen_reaches_the_driver_and_replies_ok() {
    let mut shell = headless_shell();
    let reply = drive_engine(&mut shell, |host| request(host, &[600, 1]));
    assert_eq!(reply, vec![RESULT_OK]);
    assert!(shell.driver_mut().is_fullscreen());
}

#[test_log::test]
fn capability_file_always_reads_the_sentinel() {
    // Capability reads never cross the bridge, so no pump is needed.
    let shell = headless_shell();
    let mut host = HostIo::new(shell.bridge(), shell.shared_input());
    let path = format!("/games/{}", CAPABILITY_CHECK_FILE);
    let handle = host.file_open(&path, FileMode::Read).unwrap();
    let mut buf = [0u8; 5];
    assert_eq!(host.file_read(handle, &mut buf), 5);
    assert!(buf.iter().all(|b| *b == CHECK_SENTINEL_BYTE));
    // There is no end-of-file on the check file.
    assert_eq!(host.file_read(handle, &mut buf), 5);
    assert!(host.file_close(handle));
}
