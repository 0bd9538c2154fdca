//! LHA decompression for packed YM files
//!
//! Most YM files in the wild are LH5 archives holding a single member. Data
//! carrying an `-lh?-` method signature near its start is unpacked with
//! `delharc`; anything else passes through unchanged.

use crate::error::{EngineError, EngineResult};
use std::io::Read;
#[cfg(not(target_arch = "wasm32"))]
use std::io::Write;

/// Search limit for the method signature (level 2 headers place it up to offset 25)
const LHA_SEARCH_LIMIT: usize = 40;

/// "-lh?-"
const LHA_SIGNATURE_LENGTH: usize = 5;

/// Decompressed size cap; YM files are typically 10KB-1MB
const MAX_DECOMPRESSED_SIZE: usize = 100 * 1024 * 1024;

fn find_lha_signature(data: &[u8]) -> Option<usize> {
    if data.len() < LHA_SIGNATURE_LENGTH + 2 {
        return None;
    }

    let search_limit = LHA_SEARCH_LIMIT.min(data.len().saturating_sub(LHA_SIGNATURE_LENGTH));

    (1..=search_limit).find(|&i| {
        matches!(
            data.get(i..i + LHA_SIGNATURE_LENGTH),
            Some([b'-', b'l', b'h', level, b'-']) if (b'0'..=b'7').contains(level)
        )
    })
}

/// Whether `data` looks like an LHA archive
pub fn is_lha_compressed(data: &[u8]) -> bool {
    find_lha_signature(data).is_some()
}

/// Unpack LHA data, or return a copy of uncompressed data
pub fn decompress_if_needed(data: &[u8]) -> EngineResult<Vec<u8>> {
    if !is_lha_compressed(data) {
        return Ok(data.to_vec());
    }

    #[cfg(target_arch = "wasm32")]
    let reader = delharc::LhaDecodeReader::new(data).map_err(|e| {
        EngineError::DecompressionError(format!("Failed to parse LHA archive from memory: {e}"))
    })?;

    // delharc wants a seekable file on native targets; the temp file lives
    // until the end of this function
    #[cfg(not(target_arch = "wasm32"))]
    let mut temp_file = tempfile::NamedTempFile::new().map_err(|e| {
        EngineError::DecompressionError(format!("Failed to create temporary file: {e}"))
    })?;
    #[cfg(not(target_arch = "wasm32"))]
    let reader = {
        temp_file
            .write_all(data)
            .and_then(|_| temp_file.flush())
            .map_err(|e| {
                EngineError::DecompressionError(format!(
                    "Failed to write {} bytes to temporary file: {e}",
                    data.len()
                ))
            })?;
        delharc::parse_file(temp_file.path()).map_err(|e| {
            EngineError::DecompressionError(format!("Failed to parse LHA archive: {e}"))
        })?
    };

    let mut decompressed = Vec::new();
    reader
        .take(MAX_DECOMPRESSED_SIZE as u64)
        .read_to_end(&mut decompressed)
        .map_err(|e| EngineError::DecompressionError(format!("LHA decompression failed: {e}")))?;

    if decompressed.len() >= MAX_DECOMPRESSED_SIZE {
        return Err(EngineError::DecompressionError(
            "Decompressed data exceeded maximum safe size (100MB)".to_string(),
        ));
    }

    log::debug!(
        "unpacked LHA archive: {} -> {} bytes",
        data.len(),
        decompressed.len()
    );
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lha_magic_detection() {
        let lha_data = b"\x20\x2d\x6c\x68\x35\x2d\x15";
        assert!(is_lha_compressed(lha_data));

        assert!(!is_lha_compressed(b"YM3!"));
        assert!(!is_lha_compressed(b"YM6!LeOnArD!"));
        assert!(!is_lha_compressed(b"XX"));
    }

    #[test]
    fn lha_compression_levels() {
        for level in b'0'..=b'7' {
            let data = [0x20, b'-', b'l', b'h', level, b'-', 0x15];
            assert!(is_lha_compressed(&data), "lh{}", level as char);
        }
        assert!(!is_lha_compressed(b"\x20-lh8-\x15"));
        assert!(!is_lha_compressed(b"\x20-lh5\x00\x15"));
    }

    #[test]
    fn signature_at_offset_zero_is_ignored() {
        // The method id always follows at least a header-size byte
        assert!(!is_lha_compressed(b"-lh5-\x00\x00"));
    }

    #[test]
    fn uncompressed_passthrough() {
        let data = b"YM3!\x00\x01\x02".to_vec();
        assert_eq!(decompress_if_needed(&data).unwrap(), data);
    }

    #[test]
    fn corrupt_archive_is_an_error() {
        let mut data = vec![0x20, b'-', b'l', b'h', b'5', b'-'];
        data.extend_from_slice(&[0xFF; 8]);
        assert!(matches!(
            decompress_if_needed(&data),
            Err(EngineError::DecompressionError(_))
        ));
    }
}
