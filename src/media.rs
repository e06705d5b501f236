// src/media.rs

//! Sound and video coordination.
//!
//! The engine requests playback of byte ranges inside its resource files;
//! the coordinators read the range, keep volume/mute state, and hand the
//! data to a backend selected at runtime behind a strategy trait. Backends
//! are external collaborators; only their synchronization contract matters
//! here: sound is fire-and-forget, foreground video blocks the engine
//! thread on a completion signal the backend must fire (also on `stop`).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};

use anyhow::{Context, Result};
use log::{debug, warn};

/// A byte range inside an engine resource file.
#[derive(Debug, Clone)]
pub struct Resource {
    pub path: PathBuf,
    pub offset: u64,
    pub len: u64,
}

impl Resource {
    /// Reads the range into memory.
    pub fn read(&self) -> Result<Vec<u8>> {
        let mut file = File::open(&self.path)
            .with_context(|| format!("opening resource file {}", self.path.display()))?;
        file.seek(SeekFrom::Start(self.offset))
            .with_context(|| format!("seeking to {} in {}", self.offset, self.path.display()))?;
        let mut data = vec![0u8; self.len as usize];
        file.read_exact(&mut data)
            .with_context(|| format!("reading {} bytes from {}", self.len, self.path.display()))?;
        Ok(data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundKind {
    Music,
    Sample,
}

/// Completion rendezvous for foreground video. The UI thread starts the
/// playback; the engine thread waits here until the backend signals.
#[derive(Clone, Default)]
pub struct FinishSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl FinishSignal {
    pub fn new() -> Self {
        FinishSignal::default()
    }

    pub fn signal(&self) {
        let (lock, cond) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner()) = true;
        cond.notify_all();
    }

    pub fn is_signaled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Blocks until the backend signals completion.
    pub fn wait(&self) {
        let (lock, cond) = &*self.inner;
        let mut done = lock.lock().unwrap_or_else(|e| e.into_inner());
        while !*done {
            done = cond.wait(done).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Runtime-selected sound backend.
pub trait SoundBackend: Send {
    fn play(&mut self, kind: SoundKind, data: Vec<u8>, looping: bool) -> Result<()>;
    fn stop(&mut self, kind: SoundKind);
    /// Effective volume 0-100, already mute-adjusted by the coordinator.
    fn set_volume(&mut self, kind: SoundKind, volume: u8);
}

/// Runtime-selected video backend. `stop` must fire the pending finish
/// signal so a blocked foreground wait is released.
pub trait VideoBackend: Send {
    fn play(&mut self, data: Vec<u8>, looping: bool, done: FinishSignal) -> Result<()>;
    fn stop(&mut self);
    fn set_volume(&mut self, volume: u8);
}

/// Backend that plays nothing and completes immediately. Keeps the shell
/// fully functional on systems without a media stack.
#[derive(Debug, Default)]
pub struct NullSoundBackend;

impl SoundBackend for NullSoundBackend {
    fn play(&mut self, kind: SoundKind, data: Vec<u8>, looping: bool) -> Result<()> {
        debug!("null sound backend: {:?}, {} bytes, looping={}", kind, data.len(), looping);
        Ok(())
    }
    fn stop(&mut self, _kind: SoundKind) {}
    fn set_volume(&mut self, _kind: SoundKind, _volume: u8) {}
}

#[derive(Debug, Default)]
pub struct NullVideoBackend;

impl VideoBackend for NullVideoBackend {
    fn play(&mut self, data: Vec<u8>, looping: bool, done: FinishSignal) -> Result<()> {
        debug!("null video backend: {} bytes, looping={}", data.len(), looping);
        done.signal();
        Ok(())
    }
    fn stop(&mut self) {}
    fn set_volume(&mut self, _volume: u8) {}
}

/// Music and sample playback state plus backend dispatch.
pub struct SoundCoordinator {
    backend: Box<dyn SoundBackend>,
    music_volume: u8,
    sample_volume: u8,
    muted: bool,
    music_enabled: bool,
    samples_enabled: bool,
}

impl SoundCoordinator {
    pub fn new(backend: Box<dyn SoundBackend>, music_enabled: bool, samples_enabled: bool) -> Self {
        SoundCoordinator {
            backend,
            music_volume: 100,
            sample_volume: 100,
            muted: false,
            music_enabled,
            samples_enabled,
        }
    }

    fn enabled(&self, kind: SoundKind) -> bool {
        match kind {
            SoundKind::Music => self.music_enabled,
            SoundKind::Sample => self.samples_enabled,
        }
    }

    fn effective_volume(&self, kind: SoundKind) -> u8 {
        if self.muted {
            return 0;
        }
        match kind {
            SoundKind::Music => self.music_volume,
            SoundKind::Sample => self.sample_volume,
        }
    }

    /// Starts playback of a resource range. Returns Ok(false) when the
    /// channel is disabled (the engine treats that as a soft failure).
    pub fn play(&mut self, kind: SoundKind, resource: &Resource, looping: bool) -> Result<bool> {
        if !self.enabled(kind) {
            debug!("{:?} playback disabled in settings", kind);
            return Ok(false);
        }
        let data = resource.read()?;
        self.backend.set_volume(kind, self.effective_volume(kind));
        self.backend.play(kind, data, looping)?;
        Ok(true)
    }

    pub fn stop(&mut self, kind: SoundKind) {
        self.backend.stop(kind);
    }

    pub fn set_volume(&mut self, kind: SoundKind, volume: u8) {
        let volume = volume.min(100);
        match kind {
            SoundKind::Music => self.music_volume = volume,
            SoundKind::Sample => self.sample_volume = volume,
        }
        self.backend.set_volume(kind, self.effective_volume(kind));
    }

    pub fn volume(&self, kind: SoundKind) -> u8 {
        match kind {
            SoundKind::Music => self.music_volume,
            SoundKind::Sample => self.sample_volume,
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.backend.set_volume(SoundKind::Music, self.effective_volume(SoundKind::Music));
        self.backend.set_volume(SoundKind::Sample, self.effective_volume(SoundKind::Sample));
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }
}

/// Video playback state plus backend dispatch.
pub struct VideoCoordinator {
    backend: Box<dyn VideoBackend>,
    volume: u8,
    muted: bool,
    enabled: bool,
    current: Option<FinishSignal>,
}

impl VideoCoordinator {
    pub fn new(backend: Box<dyn VideoBackend>, enabled: bool) -> Self {
        VideoCoordinator {
            backend,
            volume: 100,
            muted: false,
            enabled,
            current: None,
        }
    }

    /// Starts playback. For foreground video the returned signal is waited
    /// on by the engine thread, away from the UI loop.
    pub fn play(&mut self, resource: &Resource, looping: bool, background: bool) -> Result<Option<FinishSignal>> {
        if !self.enabled {
            debug!("video playback disabled in settings");
            return Ok(None);
        }
        let data = resource.read()?;
        let done = FinishSignal::new();
        self.backend
            .set_volume(if self.muted { 0 } else { self.volume });
        self.backend.play(data, looping, done.clone())?;
        self.current = Some(done.clone());
        Ok(if background { None } else { Some(done) })
    }

    /// Stops playback and releases any blocked foreground wait.
    pub fn stop(&mut self) {
        self.backend.stop();
        if let Some(signal) = self.current.take() {
            if !signal.is_signaled() {
                warn!("video backend did not signal on stop; releasing waiter");
                signal.signal();
            }
        }
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
        self.backend
            .set_volume(if self.muted { 0 } else { self.volume });
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.backend
            .set_volume(if self.muted { 0 } else { self.volume });
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingSound {
        played: Arc<AtomicUsize>,
        volumes: Arc<Mutex<Vec<(SoundKind, u8)>>>,
    }

    impl SoundBackend for RecordingSound {
        fn play(&mut self, _kind: SoundKind, _data: Vec<u8>, _looping: bool) -> Result<()> {
            self.played.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn stop(&mut self, _kind: SoundKind) {}
        fn set_volume(&mut self, kind: SoundKind, volume: u8) {
            self.volumes.lock().unwrap().push((kind, volume));
        }
    }

    fn temp_resource(bytes: &[u8]) -> Resource {
        let path = std::env::temp_dir().join(format!(
            "hugo-shell-media-{}-{}.bin",
            std::process::id(),
            bytes.len()
        ));
        let mut f = File::create(&path).unwrap();
        f.write_all(b"PADDING!").unwrap();
        f.write_all(bytes).unwrap();
        Resource {
            path,
            offset: 8,
            len: bytes.len() as u64,
        }
    }

    #[test]
    fn resource_reads_exactly_the_byte_range() {
        let res = temp_resource(b"tune-data");
        assert_eq!(res.read().unwrap(), b"tune-data");
        let _ = std::fs::remove_file(&res.path);
    }

    #[test]
    fn disabled_channel_reports_soft_failure_without_touching_the_backend() {
        let played = Arc::new(AtomicUsize::new(0));
        let backend = RecordingSound {
            played: Arc::clone(&played),
            volumes: Arc::new(Mutex::new(Vec::new())),
        };
        let mut sound = SoundCoordinator::new(Box::new(backend), false, true);
        let res = temp_resource(b"xx");
        assert!(!sound.play(SoundKind::Music, &res, false).unwrap());
        assert_eq!(played.load(Ordering::SeqCst), 0);
        let _ = std::fs::remove_file(&res.path);
    }

    #[test]
    fn mute_zeroes_the_effective_volume() {
        let volumes = Arc::new(Mutex::new(Vec::new()));
        let backend = RecordingSound {
            played: Arc::new(AtomicUsize::new(0)),
            volumes: Arc::clone(&volumes),
        };
        let mut sound = SoundCoordinator::new(Box::new(backend), true, true);
        sound.set_volume(SoundKind::Music, 80);
        sound.set_muted(true);
        let seen = volumes.lock().unwrap();
        assert!(seen.contains(&(SoundKind::Music, 80)));
        assert!(seen.iter().rev().take(2).all(|(_, v)| *v == 0));
    }

    #[test]
    fn missing_resource_is_an_error_not_a_panic() {
        let mut sound = SoundCoordinator::new(Box::new(NullSoundBackend), true, true);
        let res = Resource {
            path: PathBuf::from("/nonexistent/file.bin"),
            offset: 0,
            len: 4,
        };
        assert!(sound.play(SoundKind::Sample, &res, false).is_err());
    }

    #[test]
    fn foreground_video_returns_a_wait_signal_background_does_not() {
        let mut video = VideoCoordinator::new(Box::new(NullVideoBackend), true);
        let res = temp_resource(b"movie");
        let fg = video.play(&res, false, false).unwrap();
        assert!(fg.is_some());
        // The null backend completes immediately, so the wait returns.
        fg.unwrap().wait();
        let bg = video.play(&res, false, true).unwrap();
        assert!(bg.is_none());
        let _ = std::fs::remove_file(&res.path);
    }

    #[test]
    fn stop_releases_a_silent_backend_waiter() {
        struct SilentVideo;
        impl VideoBackend for SilentVideo {
            fn play(&mut self, _data: Vec<u8>, _looping: bool, _done: FinishSignal) -> Result<()> {
                Ok(())
            }
            fn stop(&mut self) {}
            fn set_volume(&mut self, _volume: u8) {}
        }
        let mut video = VideoCoordinator::new(Box::new(SilentVideo), true);
        let res = temp_resource(b"clip");
        let signal = video.play(&res, false, false).unwrap().unwrap();
        assert!(!signal.is_signaled());
        video.stop();
        signal.wait();
        let _ = std::fs::remove_file(&res.path);
    }
}
