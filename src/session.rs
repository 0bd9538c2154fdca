//! Emulation session
//!
//! A [`Session`] owns at most one loaded emulator plus a copy of the metadata
//! of the last started track. It walks the lifecycle
//!
//! ```text
//! Empty --load--> Loaded --start_track--> TrackReady
//!   ^                |                        |
//!   +------free------+-----------free---------+
//! ```
//!
//! Loading always releases the previous emulator first; a failed load leaves
//! the session `Empty`.
//!
//! # Example
//!
//! ```no_run
//! use gme_shim::{Session, ShimConfig, YmEngine, BLOCK_SIZE};
//!
//! let mut session = Session::new(YmEngine::default(), ShimConfig::default());
//! session.load_file("tune.ym".as_ref())?;
//! session.start_track(0)?;
//! let mut block = [0i16; BLOCK_SIZE];
//! while session.read(&mut block)? {
//!     // hand `block` to the audio device
//! }
//! # Ok::<(), gme_shim::ShimError>(())
//! ```

use crate::config::ShimConfig;
use crate::engine::{Emulator, Engine, TrackInfo};
use crate::error::{LoadError, SessionError};
use std::ffi::{CStr, CString};
use std::path::Path;

/// Output rate of every session
pub const SAMPLE_RATE: u32 = 44_100;

/// Interleaved `i16` values rendered per read (380 stereo frames)
pub const BLOCK_SIZE: usize = 760;

const _: () = assert!(BLOCK_SIZE % 2 == 0);

/// Returned for metadata that is not available
const EMPTY: &CStr = c"";

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing loaded
    Empty,
    /// File loaded, no track started
    Loaded,
    /// Track started; metadata available
    TrackReady,
}

/// Text metadata of the current track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    /// Song title
    Name,
    /// Composer
    Author,
    /// Copyright holder
    Copyright,
    /// Comment
    Comment,
}

/// Metadata copied when a track starts, stored as C strings so pointers can
/// be handed across the export boundary
#[derive(Debug)]
struct Snapshot {
    name: CString,
    author: CString,
    copyright: CString,
    comment: CString,
    length_ms: i64,
}

/// C string of `text` up to its first NUL
fn c_string(text: &str) -> CString {
    let bytes = text.split('\0').next().unwrap_or_default();
    CString::new(bytes).unwrap_or_default()
}

impl Snapshot {
    fn new(info: &TrackInfo) -> Self {
        Self {
            name: c_string(&info.song),
            author: c_string(&info.author),
            copyright: c_string(&info.copyright),
            comment: c_string(&info.comment),
            length_ms: info.length_ms,
        }
    }

    fn field(&self, field: MetadataField) -> &CStr {
        match field {
            MetadataField::Name => &self.name,
            MetadataField::Author => &self.author,
            MetadataField::Copyright => &self.copyright,
            MetadataField::Comment => &self.comment,
        }
    }
}

/// One emulator slot plus the metadata of its current track
pub struct Session<E: Engine> {
    engine: E,
    config: ShimConfig,
    emu: Option<Box<dyn Emulator>>,
    snapshot: Option<Snapshot>,
}

impl<E: Engine> Session<E> {
    /// Empty session backed by `engine`
    pub fn new(engine: E, config: ShimConfig) -> Self {
        Self {
            engine,
            config,
            emu: None,
            snapshot: None,
        }
    }

    /// Session configuration
    pub fn config(&self) -> &ShimConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        match (&self.emu, &self.snapshot) {
            (None, _) => SessionState::Empty,
            (Some(_), None) => SessionState::Loaded,
            (Some(_), Some(_)) => SessionState::TrackReady,
        }
    }

    fn emu_mut(&mut self) -> Result<&mut Box<dyn Emulator>, SessionError> {
        self.emu.as_mut().ok_or(SessionError::NoSession)
    }

    /// Load a file from disk
    pub fn load_file(&mut self, path: &Path) -> Result<(), LoadError> {
        self.free();

        let file_type = self.engine.identify_file(path).map_err(|e| {
            log::debug!("identify {} failed: {e}", path.display());
            LoadError::Identify {
                path: path.to_path_buf(),
            }
        })?;
        let mut emu = self
            .engine
            .instantiate(file_type)
            .ok_or(LoadError::Alloc(file_type.system))?;
        emu.set_sample_rate(SAMPLE_RATE)
            .map_err(LoadError::SampleRate)?;
        emu.load_file(path).map_err(LoadError::Load)?;

        log::info!(
            "loaded {} ({} {}, {} tracks)",
            path.display(),
            file_type.system,
            file_type.extension,
            emu.track_count()
        );
        self.emu = Some(emu);
        Ok(())
    }

    /// Load an in-memory file image
    pub fn load_buffer(&mut self, data: &[u8]) -> Result<(), LoadError> {
        self.free();
        let emu = self.engine.open_data(data, SAMPLE_RATE)?;
        log::info!(
            "loaded {} byte buffer ({} tracks)",
            data.len(),
            emu.track_count()
        );
        self.emu = Some(emu);
        Ok(())
    }

    /// Tracks in the loaded file, 0 when empty
    pub fn track_count(&self) -> usize {
        self.emu.as_ref().map_or(0, |emu| emu.track_count())
    }

    /// Start a track and snapshot its metadata
    ///
    /// The index is clamped to the available tracks. Returns the index
    /// actually started. On failure the previous snapshot is kept.
    pub fn start_track(&mut self, index: i64) -> Result<usize, SessionError> {
        let emu = self.emu.as_mut().ok_or(SessionError::NoSession)?;
        let count = emu.track_count();
        if count == 0 {
            return Err(SessionError::NoTracks);
        }
        let track = usize::try_from(index.max(0)).unwrap_or(usize::MAX).min(count - 1);

        emu.start_track(track)?;
        let info = emu.track_info();
        log::debug!(
            "started track {track}/{count}: '{}' by '{}', {} ms",
            info.song,
            info.author,
            info.length_ms
        );
        self.snapshot = Some(Snapshot::new(&info));
        Ok(track)
    }

    /// Render one block; `Ok(true)` while the track has more audio
    ///
    /// The whole block is written even when the track ends inside it.
    pub fn read(&mut self, block: &mut [i16; BLOCK_SIZE]) -> Result<bool, SessionError> {
        block.fill(0);
        if self.snapshot.is_none() {
            return Err(if self.emu.is_some() {
                SessionError::NoTrack
            } else {
                SessionError::NoSession
            });
        }
        let emu = self.emu_mut()?;
        emu.play(block)?;
        Ok(!emu.track_ended())
    }

    /// Voices in the loaded file, 0 when empty
    pub fn voice_count(&self) -> usize {
        self.emu.as_ref().map_or(0, |emu| emu.voice_count())
    }

    /// Mute or unmute one voice; indexes outside the voice range are ignored
    pub fn mute_voice(&mut self, index: i64, mute: bool) -> Result<(), SessionError> {
        let emu = self.emu_mut()?;
        match usize::try_from(index) {
            Ok(voice) if voice < emu.voice_count() => emu.mute_voice(voice, mute),
            _ => log::debug!("ignoring mute of voice {index}"),
        }
        Ok(())
    }

    /// Set every voice mute from a bit mask
    pub fn mute_voices(&mut self, mask: u32) -> Result<(), SessionError> {
        self.emu_mut()?.mute_voices(mask);
        Ok(())
    }

    /// Change playback speed; only `0 < tempo <= 5` is applied
    ///
    /// Returns whether the tempo was applied.
    pub fn set_tempo(&mut self, tempo: f64) -> bool {
        if !(tempo > 0.0 && tempo <= 5.0) {
            log::debug!("ignoring tempo {tempo}");
            return false;
        }
        match self.emu.as_mut() {
            Some(emu) => {
                emu.set_tempo(tempo);
                true
            }
            None => false,
        }
    }

    /// Playback position in milliseconds, 0 when empty
    pub fn position(&self) -> i64 {
        self.emu.as_ref().map_or(0, |emu| emu.tell())
    }

    /// Seek the current track
    pub fn seek(&mut self, msec: i64) -> Result<(), SessionError> {
        if self.emu.is_some() && self.snapshot.is_none() {
            return Err(SessionError::NoTrack);
        }
        self.emu_mut()?.seek(msec)?;
        Ok(())
    }

    /// Length of the current track in milliseconds
    ///
    /// -1 with nothing loaded, 0 before a track is started.
    pub fn track_length(&self) -> i64 {
        match (&self.emu, &self.snapshot) {
            (None, _) => -1,
            (Some(_), None) => 0,
            (Some(_), Some(snapshot)) => snapshot.length_ms,
        }
    }

    /// Metadata text of the current track, empty when unavailable
    ///
    /// The returned string lives until the next track start, load or free.
    pub fn metadata(&self, field: MetadataField) -> &CStr {
        self.snapshot
            .as_ref()
            .map_or(EMPTY, |snapshot| snapshot.field(field))
    }

    /// Release the emulator and metadata; returns whether anything was loaded
    pub fn free(&mut self) -> bool {
        self.snapshot = None;
        let released = self.emu.take().is_some();
        if released {
            log::debug!("session released");
        }
        released
    }
}
