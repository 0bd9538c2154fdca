//! Flat C export table
//!
//! Every function works on one process-wide [`Session`] guarded by a mutex.
//! The session is created on first use with the configuration named by
//! `GME_SHIM_CONFIG` and the built-in YM engine.
//!
//! Numbers cross the boundary as `f64`, the only numeric type some hosts can
//! pass. Status codes:
//!
//! | Call | Success | Failure |
//! |------|---------|---------|
//! | `LoadFile` | 1 | 2 identify, 3 alloc, 4 sample rate, 5 load |
//! | `LoadBuffer*`, `StartTrack`, `MuteVoices`, `SetPosition`, `Free` | 1 | 0 |
//! | `Read*` | 1 more audio | 0 ended or failed |
//! | `MuteVoice` | 0 | 1 no session |
//! | `SetTempo` | 1 | never fails |
//!
//! Metadata getters return pointers owned by the session; they stay valid
//! until the next `StartTrack`, load or `Free`.

#![allow(non_snake_case)]

use crate::config::ShimConfig;
use crate::engine::YmEngine;
use crate::error::LoadError;
use crate::session::{MetadataField, Session, BLOCK_SIZE};
use parking_lot::Mutex;
use std::ffi::{c_char, c_void, CStr};
use std::path::PathBuf;

static SESSION: Mutex<Option<Session<YmEngine>>> = parking_lot::const_mutex(None);

fn with_session<R>(f: impl FnOnce(&mut Session<YmEngine>) -> R) -> R {
    let mut slot = SESSION.lock();
    let session = slot.get_or_insert_with(|| {
        let config = ShimConfig::from_env();
        Session::new(YmEngine::new(config.loop_count), config)
    });
    f(session)
}

fn status(ok: bool) -> f64 {
    if ok {
        1.0
    } else {
        0.0
    }
}

/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn c_str<'a>(ptr: *const c_char) -> Option<&'a CStr> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr))
    }
}

/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn path_from_c(ptr: *const c_char) -> Option<PathBuf> {
    let text = c_str(ptr)?;
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        Some(PathBuf::from(std::ffi::OsStr::from_bytes(text.to_bytes())))
    }
    #[cfg(not(unix))]
    {
        text.to_str().ok().map(PathBuf::from)
    }
}

/// Decode a textual address with the configured decoder
///
/// # Safety
/// `hex` must be null or point to a NUL-terminated string.
unsafe fn decode_address(session: &Session<YmEngine>, hex: *const c_char) -> Option<usize> {
    let text = match c_str(hex).map(CStr::to_str) {
        Some(Ok(text)) => text,
        Some(Err(_)) => {
            log::warn!("hex address is not valid UTF-8");
            return None;
        }
        None => {
            log::warn!("hex address is null");
            return None;
        }
    };
    match session.config().hex_mode.decode(text) {
        Ok(0) => {
            log::warn!("hex address {text:?} decodes to null");
            None
        }
        Ok(address) => Some(address),
        Err(e) => {
            log::warn!("rejecting hex address {text:?}: {e}");
            None
        }
    }
}

/// # Safety
/// `data` must be null or valid for reads of `size` bytes.
unsafe fn load_buffer(session: &mut Session<YmEngine>, size: f64, data: *const u8) -> f64 {
    let result = if data.is_null() {
        Err(LoadError::InvalidBuffer("null pointer".to_string()))
    } else if !(size.is_finite() && size >= 0.0 && size <= isize::MAX as f64) {
        Err(LoadError::InvalidBuffer(format!("size {size}")))
    } else {
        let bytes = std::slice::from_raw_parts(data, size as usize);
        session.load_buffer(bytes)
    };

    match result {
        Ok(()) => 1.0,
        Err(e) => {
            session.free();
            log::warn!("LoadBuffer failed: {e}");
            0.0
        }
    }
}

/// # Safety
/// `buffer` must be null or valid for writes of `BLOCK_SIZE * 2` bytes.
unsafe fn read_block(session: &mut Session<YmEngine>, buffer: *mut u8) -> f64 {
    if buffer.is_null() {
        log::warn!("Read called with null buffer");
        return 0.0;
    }
    let mut block = [0i16; BLOCK_SIZE];
    let more = session.read(&mut block).unwrap_or_else(|e| {
        log::warn!("Read failed: {e}");
        false
    });
    // Host buffers carry no alignment guarantee
    std::ptr::copy_nonoverlapping(
        block.as_ptr().cast::<u8>(),
        buffer,
        BLOCK_SIZE * std::mem::size_of::<i16>(),
    );
    status(more)
}

/// Load a file from disk
///
/// # Safety
/// `path` must be null or point to a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn GameMusicEmu_LoadFile(path: *const c_char) -> f64 {
    with_session(|session| {
        let Some(path) = path_from_c(path) else {
            session.free();
            log::warn!("LoadFile called with null or unusable path");
            return 2.0;
        };
        match session.load_file(&path) {
            Ok(()) => 1.0,
            Err(e) => {
                log::warn!("LoadFile failed: {e}");
                e.code()
            }
        }
    })
}

/// Load a file image from host memory
///
/// # Safety
/// `data` must be null or valid for reads of `size` bytes.
#[no_mangle]
pub unsafe extern "C" fn GameMusicEmu_LoadBuffer(size: f64, data: *const c_void) -> f64 {
    with_session(|session| load_buffer(session, size, data.cast()))
}

/// Load a file image whose address is given as hexadecimal text
///
/// # Safety
/// `hex` must be null or a NUL-terminated string, and the address it holds
/// must be valid for reads of `size` bytes.
#[no_mangle]
pub unsafe extern "C" fn GameMusicEmu_LoadBufferFromHexAddress(
    size: f64,
    hex: *const c_char,
) -> f64 {
    with_session(|session| match decode_address(session, hex) {
        Some(address) => load_buffer(session, size, address as *const u8),
        None => {
            session.free();
            0.0
        }
    })
}

/// Old name of [`GameMusicEmu_LoadBufferFromHexAddress`]
///
/// # Safety
/// See [`GameMusicEmu_LoadBufferFromHexAddress`].
#[no_mangle]
pub unsafe extern "C" fn GameMusicEmu_LoadBufferStr(size: f64, hex: *const c_char) -> f64 {
    GameMusicEmu_LoadBufferFromHexAddress(size, hex)
}

/// Number of tracks in the loaded file
#[no_mangle]
pub extern "C" fn GameMusicEmu_NumTracks() -> f64 {
    with_session(|session| session.track_count() as f64)
}

/// Start a track; indexes past the last track start the last one
#[no_mangle]
pub extern "C" fn GameMusicEmu_StartTrack(index: f64) -> f64 {
    with_session(|session| match session.start_track(index as i64) {
        Ok(_) => 1.0,
        Err(e) => {
            log::warn!("StartTrack({index}) failed: {e}");
            0.0
        }
    })
}

/// Render `BLOCK_SIZE` interleaved stereo samples into `buffer`
///
/// # Safety
/// `buffer` must be null or valid for writes of `BLOCK_SIZE * 2` bytes.
#[no_mangle]
pub unsafe extern "C" fn GameMusicEmu_Read(buffer: *mut c_char) -> f64 {
    with_session(|session| read_block(session, buffer.cast()))
}

/// [`GameMusicEmu_Read`] with the buffer address given as hexadecimal text
///
/// # Safety
/// `hex` must be null or a NUL-terminated string, and the address it holds
/// must be valid for writes of `BLOCK_SIZE * 2` bytes.
#[no_mangle]
pub unsafe extern "C" fn GameMusicEmu_ReadFromHexAddress(hex: *const c_char) -> f64 {
    with_session(|session| match decode_address(session, hex) {
        Some(address) => read_block(session, address as *mut u8),
        None => 0.0,
    })
}

/// Old name of [`GameMusicEmu_ReadFromHexAddress`]
///
/// # Safety
/// See [`GameMusicEmu_ReadFromHexAddress`].
#[no_mangle]
pub unsafe extern "C" fn GameMusicEmu_ReadStr(hex: *const c_char) -> f64 {
    GameMusicEmu_ReadFromHexAddress(hex)
}

/// Number of voices in the loaded file
#[no_mangle]
pub extern "C" fn GameMusicEmu_NumVoices() -> f64 {
    with_session(|session| session.voice_count() as f64)
}

/// Mute (`mute > 0`) or unmute one voice
///
/// Returns 0 when applied and 1 without a session.
#[no_mangle]
pub extern "C" fn GameMusicEmu_MuteVoice(index: f64, mute: f64) -> f64 {
    with_session(|session| match session.mute_voice(index as i64, mute > 0.0) {
        Ok(()) => 0.0,
        Err(e) => {
            log::warn!("MuteVoice({index}) failed: {e}");
            1.0
        }
    })
}

/// Mute voices by bit mask; bit `i` mutes voice `i`
#[no_mangle]
pub extern "C" fn GameMusicEmu_MuteVoices(mask: f64) -> f64 {
    with_session(|session| match session.mute_voices(mask as i64 as u32) {
        Ok(()) => 1.0,
        Err(e) => {
            log::warn!("MuteVoices failed: {e}");
            0.0
        }
    })
}

/// Set playback speed; values outside `(0, 5]` are ignored
#[no_mangle]
pub extern "C" fn GameMusicEmu_SetTempo(tempo: f64) -> f64 {
    with_session(|session| {
        session.set_tempo(tempo);
    });
    1.0
}

/// Playback position in milliseconds
#[no_mangle]
pub extern "C" fn GameMusicEmu_GetPosition() -> f64 {
    with_session(|session| session.position() as f64)
}

/// Seek to a position in milliseconds
#[no_mangle]
pub extern "C" fn GameMusicEmu_SetPosition(msec: f64) -> f64 {
    with_session(|session| match session.seek(msec as i64) {
        Ok(()) => 1.0,
        Err(e) => {
            log::warn!("SetPosition({msec}) failed: {e}");
            0.0
        }
    })
}

/// Track length in milliseconds; -1 with nothing loaded
#[no_mangle]
pub extern "C" fn GameMusicEmu_GetTrackLength() -> f64 {
    with_session(|session| session.track_length() as f64)
}

fn metadata(field: MetadataField) -> *const c_char {
    with_session(|session| session.metadata(field).as_ptr())
}

/// Title of the current track
#[no_mangle]
pub extern "C" fn GameMusicEmu_GetName() -> *const c_char {
    metadata(MetadataField::Name)
}

/// Author of the current track
#[no_mangle]
pub extern "C" fn GameMusicEmu_GetAuthor() -> *const c_char {
    metadata(MetadataField::Author)
}

/// Copyright of the current track
#[no_mangle]
pub extern "C" fn GameMusicEmu_GetCopyright() -> *const c_char {
    metadata(MetadataField::Copyright)
}

/// Comment of the current track
#[no_mangle]
pub extern "C" fn GameMusicEmu_GetComment() -> *const c_char {
    metadata(MetadataField::Comment)
}

/// Release the loaded file
#[no_mangle]
pub extern "C" fn GameMusicEmu_Free() -> f64 {
    with_session(|session| status(session.free()))
}
