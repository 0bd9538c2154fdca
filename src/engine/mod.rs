//! Emulation engine seam
//!
//! The session never decodes anything itself. It talks to an [`Engine`],
//! which recognizes file types and creates [`Emulator`] instances, and then
//! drives that emulator through the track lifecycle.
//!
//! # Trait Hierarchy
//!
//! - [`Engine`] - format identification and emulator construction
//! - [`Emulator`] - one loaded file: configure, load, start track, render,
//!   mute, tempo, seek and metadata
//!
//! Both traits are object-safe; the session stores `Box<dyn Emulator>`.

use crate::error::{EngineError, EngineResult, LoadError};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub mod ym;

pub use ym::{YmEmulator, YmEngine};

/// Bytes read from the head of a file for identification
pub const HEADER_PROBE_LEN: usize = 64;

/// A file type an engine knows how to play
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileType {
    /// Machine or sound chip family
    pub system: &'static str,
    /// Usual file extension, uppercase, without dot
    pub extension: &'static str,
}

/// Metadata for the current track
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackInfo {
    /// Song title
    pub song: String,
    /// Composer/musician
    pub author: String,
    /// Copyright holder
    pub copyright: String,
    /// Free-form comment
    pub comment: String,
    /// Playback length in milliseconds, -1 if unknown
    pub length_ms: i64,
}

/// Format identification and emulator factory
pub trait Engine: Send {
    /// Identify a file type from the first bytes of a file
    fn identify(&self, header: &[u8]) -> Option<FileType>;

    /// Identify a file on disk
    ///
    /// The default reads [`HEADER_PROBE_LEN`] bytes and defers to
    /// [`Engine::identify`].
    fn identify_file(&self, path: &Path) -> EngineResult<FileType> {
        let mut header = Vec::with_capacity(HEADER_PROBE_LEN);
        File::open(path)?
            .take(HEADER_PROBE_LEN as u64)
            .read_to_end(&mut header)?;
        self.identify(&header).ok_or_else(|| {
            EngineError::ParseError(format!("unrecognized file type: {}", path.display()))
        })
    }

    /// Create an emulator for an identified type
    ///
    /// Returns `None` when the engine cannot provide one.
    fn instantiate(&self, file_type: FileType) -> Option<Box<dyn Emulator>>;

    /// Identify, create, configure and load an in-memory image in one step
    fn open_data(&self, data: &[u8], sample_rate: u32) -> Result<Box<dyn Emulator>, LoadError> {
        let file_type = self.identify(data).ok_or_else(|| {
            LoadError::Load(EngineError::ParseError("unrecognized data".to_string()))
        })?;
        let mut emu = self
            .instantiate(file_type)
            .ok_or(LoadError::Alloc(file_type.system))?;
        emu.set_sample_rate(sample_rate)
            .map_err(LoadError::SampleRate)?;
        emu.load_data(data).map_err(LoadError::Load)?;
        Ok(emu)
    }
}

/// One loaded file
///
/// Rendering produces interleaved stereo `i16` samples at the configured rate.
pub trait Emulator: Send {
    /// Set the output rate; must be called before loading
    fn set_sample_rate(&mut self, rate: u32) -> EngineResult<()>;

    /// Output rate in Hz
    fn sample_rate(&self) -> u32;

    /// Load a file image
    fn load_data(&mut self, data: &[u8]) -> EngineResult<()>;

    /// Load a file from disk
    fn load_file(&mut self, path: &Path) -> EngineResult<()> {
        let data = std::fs::read(path)?;
        self.load_data(&data)
    }

    /// Number of tracks in the loaded file
    fn track_count(&self) -> usize;

    /// Start playing a track (0-based)
    fn start_track(&mut self, index: usize) -> EngineResult<()>;

    /// Metadata of the current track
    fn track_info(&self) -> TrackInfo;

    /// Render interleaved stereo samples into `out`
    ///
    /// The whole slice is written; silence follows the end of the track.
    fn play(&mut self, out: &mut [i16]) -> EngineResult<()>;

    /// Whether the current track has finished
    fn track_ended(&self) -> bool;

    /// Number of voices (channels) that can be muted
    fn voice_count(&self) -> usize;

    /// Mute or unmute one voice
    fn mute_voice(&mut self, index: usize, mute: bool);

    /// Set all voice mutes at once; bit `i` set mutes voice `i`
    fn mute_voices(&mut self, mask: u32) {
        for voice in 0..self.voice_count().min(32) {
            self.mute_voice(voice, mask & (1 << voice) != 0);
        }
    }

    /// Playback speed multiplier (1.0 = normal)
    fn set_tempo(&mut self, tempo: f64);

    /// Position in the current track in milliseconds
    fn tell(&self) -> i64;

    /// Jump to a position in the current track
    fn seek(&mut self, msec: i64) -> EngineResult<()>;
}
