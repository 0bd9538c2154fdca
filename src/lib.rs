//! Game music emulation session behind a flat C export table
//!
//! Hosts that can only call plain exported functions with `double`, pointer
//! and string arguments (game engines, scripting runtimes) load this library
//! and drive one music session through the `GameMusicEmu_*` functions in
//! [`ffi`]: load a file or memory image, pick a track, pull blocks of 16-bit
//! stereo audio, mute voices, change tempo, seek and read metadata.
//!
//! Rust callers can use [`Session`] directly with any [`Engine`].
//!
//! # Features
//! - Built-in engine for Atari ST YM files (YM2 to YM6, LHA-packed or raw)
//! - Cycle-level YM2149 emulation at 44.1 kHz
//! - Strict or lenient decoding of buffer addresses passed as hex text
//! - JSON configuration through `GME_SHIM_CONFIG`
//!
//! # Quick start
//! ```no_run
//! use gme_shim::ffi::*;
//! use gme_shim::BLOCK_SIZE;
//!
//! let path = c"music/Scaven6.ym";
//! let mut block = [0i16; BLOCK_SIZE];
//! unsafe {
//!     assert_eq!(GameMusicEmu_LoadFile(path.as_ptr()), 1.0);
//!     GameMusicEmu_StartTrack(0.0);
//!     while GameMusicEmu_Read(block.as_mut_ptr().cast()) == 1.0 {
//!         // queue `block` for output
//!     }
//! }
//! GameMusicEmu_Free();
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod hex;
pub mod session;

pub use config::{ShimConfig, CONFIG_ENV_VAR};
pub use engine::{Emulator, Engine, FileType, TrackInfo, YmEmulator, YmEngine};
pub use error::{
    ConfigError, EngineError, EngineResult, HexAddressError, LoadError, Result, SessionError,
    ShimError,
};
pub use hex::{decode_hex_lenient, parse_hex_address, HexMode};
pub use session::{MetadataField, Session, SessionState, BLOCK_SIZE, SAMPLE_RATE};
