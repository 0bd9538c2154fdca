//! Error types for the session shim and its engines

use std::path::PathBuf;

/// Error type for engine operations (identification, loading, playback)
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// IO error from filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error while parsing a file format
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Decompression error (LHA/LZH)
    #[error("Decompression error: {0}")]
    DecompressionError(String),

    /// Requested output rate is outside what the engine renders
    #[error("Unsupported sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),

    /// Track index beyond the loaded file's track count
    #[error("Track {index} out of range ({count} tracks)")]
    TrackOutOfRange {
        /// Requested track
        index: usize,
        /// Tracks available
        count: usize,
    },

    /// Operation needs loaded data
    #[error("No file loaded")]
    NotLoaded,

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Other(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Other(s.to_string())
    }
}

/// Why a load call failed
///
/// Each variant maps to the status code reported by `GameMusicEmu_LoadFile`.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    /// The engine did not recognize the file type
    #[error("Could not identify file type of '{path}'")]
    Identify {
        /// File that was probed
        path: PathBuf,
    },

    /// The engine could not create an emulator for the identified type
    #[error("Could not create emulator for {0}")]
    Alloc(&'static str),

    /// The emulator refused the fixed output rate
    #[error("Could not set sample rate: {0}")]
    SampleRate(#[source] EngineError),

    /// The emulator rejected the file or buffer contents
    #[error("Could not load data: {0}")]
    Load(#[source] EngineError),

    /// Buffer pointer or size unusable
    #[error("Invalid buffer: {0}")]
    InvalidBuffer(String),
}

impl LoadError {
    /// Status code used by the file-loading export (2..=5)
    pub fn code(&self) -> f64 {
        match self {
            LoadError::Identify { .. } => 2.0,
            LoadError::Alloc(_) => 3.0,
            LoadError::SampleRate(_) => 4.0,
            LoadError::Load(_) | LoadError::InvalidBuffer(_) => 5.0,
        }
    }
}

/// Error returned by session operations that need an active emulator
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    /// Nothing loaded, or the session was freed
    #[error("No active session")]
    NoSession,

    /// Loaded file reports zero tracks
    #[error("Loaded file has no tracks")]
    NoTracks,

    /// Rendering or seeking before a track was started
    #[error("No track started")]
    NoTrack,

    /// Error from the engine
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Error decoding a textual buffer address
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HexAddressError {
    /// No digits after the optional prefix
    #[error("Empty hex address")]
    Empty,

    /// Character that is not a hex digit
    #[error("Invalid hex digit '{ch}' at position {position}")]
    InvalidDigit {
        /// Offending character
        ch: char,
        /// Byte offset in the input
        position: usize,
    },

    /// Value does not fit a native pointer
    #[error("Hex address does not fit in {bits} bits")]
    Overflow {
        /// Pointer width
        bits: u32,
    },
}

/// Error loading the shim configuration
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("IO error reading {path}: {source}")]
    Io {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for `ShimConfig`
    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Umbrella error for crate-level helpers
#[derive(thiserror::Error, Debug)]
pub enum ShimError {
    /// Engine failure
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Load failure
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Session failure
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Bad hex address
    #[error(transparent)]
    HexAddress(#[from] HexAddressError),

    /// Bad configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Result type for crate-level helpers
pub type Result<T> = std::result::Result<T, ShimError>;
