//! YM file format parser
//!
//! Supported layouts (all big-endian):
//! - YM2 (Mad Max) / YM3: 4-byte magic + 14 registers per frame, interleaved
//! - YM3b: YM3 followed by a 4-byte loop frame
//! - YM4: 26-byte header, digidrums, three NUL-terminated strings, 14 regs
//! - YM5 / YM6: 34-byte header with clock and player rate, extra data,
//!   digidrums, strings, 16 registers per frame
//!
//! The input must already be decompressed (see `compression`).

use crate::error::{EngineError, EngineResult};
use nom::bytes::complete::{tag, take, take_until};
use nom::number::complete::{be_u16, be_u32};
use nom::sequence::tuple;
use nom::IResult;
use std::fmt;

/// Atari ST master clock
pub const DEFAULT_MASTER_CLOCK: u32 = 2_000_000;

/// PAL VBL rate
pub const DEFAULT_FRAME_RATE: u16 = 50;

/// Registers stored per frame after parsing
pub const FRAME_REGISTERS: usize = 16;

const MAX_REASONABLE_FRAMES: u32 = 100_000;

/// Frames are stored register-major instead of frame-major
const ATTR_INTERLEAVED: u32 = 1;

const SIGNATURE: &[u8] = b"LeOnArD!";

/// One VBL frame worth of PSG registers
pub type Frame = [u8; FRAME_REGISTERS];

/// YM format revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YmFormat {
    /// Mad Max register dump
    Ym2,
    /// Plain register dump
    Ym3,
    /// Register dump with loop frame
    Ym3b,
    /// Metadata and digidrums
    Ym4,
    /// Adds master clock and player rate
    Ym5,
    /// YM5 layout with extended effects
    Ym6,
}

impl YmFormat {
    /// Recognize the 4-byte magic at the start of `data`
    pub fn detect(data: &[u8]) -> Option<Self> {
        match data.get(0..4)? {
            b"YM2!" => Some(YmFormat::Ym2),
            b"YM3!" => Some(YmFormat::Ym3),
            b"YM3b" => Some(YmFormat::Ym3b),
            b"YM4!" => Some(YmFormat::Ym4),
            b"YM5!" => Some(YmFormat::Ym5),
            b"YM6!" => Some(YmFormat::Ym6),
            _ => None,
        }
    }
}

impl fmt::Display for YmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            YmFormat::Ym2 => "YM2",
            YmFormat::Ym3 => "YM3",
            YmFormat::Ym3b => "YM3b",
            YmFormat::Ym4 => "YM4",
            YmFormat::Ym5 => "YM5",
            YmFormat::Ym6 => "YM6",
        })
    }
}

/// A parsed song
#[derive(Debug, Clone)]
pub struct YmSong {
    /// Source format
    pub format: YmFormat,
    /// Register frames in playback order
    pub frames: Vec<Frame>,
    /// Song title
    pub title: String,
    /// Composer
    pub author: String,
    /// Comment
    pub comment: String,
    /// Frame playback resumes from after the last frame
    pub loop_frame: Option<usize>,
    /// PSG master clock in Hz
    pub master_clock: u32,
    /// Frames per second
    pub frame_rate: u16,
}

struct Header {
    frame_count: u32,
    attributes: u32,
    digidrum_count: u16,
    master_clock: Option<u32>,
    player_freq: Option<u16>,
    loop_frame: u32,
    extra_data_size: u16,
}

fn ym4_header(input: &[u8]) -> IResult<&[u8], Header> {
    let (input, _) = tag(&b"YM4!"[..])(input)?;
    let (input, _) = tag(SIGNATURE)(input)?;
    let (input, (frame_count, attributes, digidrum_count, loop_frame)) =
        tuple((be_u32, be_u32, be_u16, be_u32))(input)?;
    Ok((
        input,
        Header {
            frame_count,
            attributes,
            digidrum_count,
            master_clock: None,
            player_freq: None,
            loop_frame,
            extra_data_size: 0,
        },
    ))
}

fn ym5_header(input: &[u8]) -> IResult<&[u8], Header> {
    let (input, _) = take(4usize)(input)?;
    let (input, _) = tag(SIGNATURE)(input)?;
    let (input, (frame_count, attributes, digidrum_count, master_clock, player_freq)) =
        tuple((be_u32, be_u32, be_u16, be_u32, be_u16))(input)?;
    let (input, (loop_frame, extra_data_size)) = tuple((be_u32, be_u16))(input)?;
    Ok((
        input,
        Header {
            frame_count,
            attributes,
            digidrum_count,
            master_clock: Some(master_clock),
            player_freq: Some(player_freq),
            loop_frame,
            extra_data_size,
        },
    ))
}

fn skip_bytes(input: &[u8], count: usize) -> IResult<&[u8], ()> {
    let (input, _) = take(count)(input)?;
    Ok((input, ()))
}

/// Skip `count` size-prefixed digidrum samples
fn skip_digidrums(mut input: &[u8], count: u16) -> IResult<&[u8], ()> {
    for _ in 0..count {
        let (rest, size) = be_u32(input)?;
        let (rest, _) = skip_bytes(rest, size as usize)?;
        input = rest;
    }
    Ok((input, ()))
}

/// NUL-terminated Latin-1 string
fn c_string(input: &[u8]) -> IResult<&[u8], String> {
    let (input, bytes) = take_until(&b"\0"[..])(input)?;
    let (input, _) = tag(&b"\0"[..])(input)?;
    Ok((input, bytes.iter().map(|&b| b as char).collect()))
}

fn malformed(format: YmFormat, total: usize) -> impl Fn(nom::Err<nom::error::Error<&[u8]>>) -> EngineError {
    move |e| match e {
        nom::Err::Incomplete(_) => EngineError::ParseError(format!("{format} data truncated")),
        nom::Err::Error(e) | nom::Err::Failure(e) => EngineError::ParseError(format!(
            "{format} malformed at offset {} ({:?})",
            total - e.input.len(),
            e.code
        )),
    }
}

fn check_frame_count(format: YmFormat, frame_count: usize) -> EngineResult<()> {
    if frame_count == 0 {
        return Err(EngineError::ParseError(format!("{format} has zero frames")));
    }
    if frame_count > MAX_REASONABLE_FRAMES as usize {
        return Err(EngineError::ParseError(format!(
            "{format} frame count {frame_count} exceeds limit of {MAX_REASONABLE_FRAMES}"
        )));
    }
    Ok(())
}

/// Split frame data into frames, `registers` bytes each
fn read_frames(
    format: YmFormat,
    data: &[u8],
    frame_count: usize,
    registers: usize,
    interleaved: bool,
) -> EngineResult<Vec<Frame>> {
    let size = frame_count
        .checked_mul(registers)
        .ok_or_else(|| EngineError::ParseError(format!("{format} frame data size overflow")))?;
    if data.len() < size {
        return Err(EngineError::ParseError(format!(
            "{format} truncated in frame data ({} of {size} bytes)",
            data.len()
        )));
    }

    let copy = registers.min(FRAME_REGISTERS);
    let mut frames = vec![[0u8; FRAME_REGISTERS]; frame_count];
    if interleaved {
        for reg in 0..copy {
            let column = &data[reg * frame_count..(reg + 1) * frame_count];
            for (frame, &value) in frames.iter_mut().zip(column) {
                frame[reg] = value;
            }
        }
    } else {
        for (frame, chunk) in frames.iter_mut().zip(data.chunks_exact(registers)) {
            frame[..copy].copy_from_slice(&chunk[..copy]);
        }
    }
    Ok(frames)
}

fn parse_register_dump(format: YmFormat, data: &[u8]) -> EngineResult<YmSong> {
    let mut payload = &data[4..];
    let mut loop_frame = None;

    if format == YmFormat::Ym3b {
        if payload.len() < 4 {
            return Err(EngineError::ParseError("YM3b missing loop frame".to_string()));
        }
        let (body, tail) = payload.split_at(payload.len() - 4);
        payload = body;
        loop_frame = Some(u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]) as usize);
    }

    if payload.len() % 14 != 0 {
        return Err(EngineError::ParseError(format!(
            "{format} data size {} is not multiple of 14",
            payload.len()
        )));
    }
    let frame_count = payload.len() / 14;
    check_frame_count(format, frame_count)?;
    let frames = read_frames(format, payload, frame_count, 14, true)?;

    Ok(YmSong {
        format,
        frames,
        title: String::new(),
        author: String::new(),
        comment: String::new(),
        loop_frame: loop_frame.filter(|&f| f < frame_count),
        master_clock: DEFAULT_MASTER_CLOCK,
        frame_rate: DEFAULT_FRAME_RATE,
    })
}

fn parse_with_header(format: YmFormat, data: &[u8]) -> EngineResult<YmSong> {
    let err = malformed(format, data.len());
    let (rest, header) = match format {
        YmFormat::Ym4 => ym4_header(data),
        _ => ym5_header(data),
    }
    .map_err(&err)?;

    let frame_count = header.frame_count as usize;
    check_frame_count(format, frame_count)?;

    let (rest, _) = skip_bytes(rest, header.extra_data_size as usize).map_err(&err)?;
    let (rest, _) = skip_digidrums(rest, header.digidrum_count).map_err(&err)?;
    let (rest, (title, author, comment)) = tuple((c_string, c_string, c_string))(rest).map_err(&err)?;

    let interleaved = header.attributes & ATTR_INTERLEAVED != 0;
    let frames = match format {
        YmFormat::Ym4 => read_frames(format, rest, frame_count, 14, interleaved)?,
        // Some YM5 rips only store 14 registers
        _ => read_frames(format, rest, frame_count, 16, interleaved)
            .or_else(|_| read_frames(format, rest, frame_count, 14, interleaved))?,
    };

    let loop_frame = header.loop_frame as usize;
    Ok(YmSong {
        format,
        frames,
        title,
        author,
        comment,
        loop_frame: (loop_frame > 0 && loop_frame < frame_count).then_some(loop_frame),
        master_clock: header
            .master_clock
            .filter(|&c| c > 0)
            .unwrap_or(DEFAULT_MASTER_CLOCK),
        frame_rate: header
            .player_freq
            .filter(|&f| f > 0)
            .unwrap_or(DEFAULT_FRAME_RATE),
    })
}

/// Parse an uncompressed YM image
pub fn parse_song(data: &[u8]) -> EngineResult<YmSong> {
    let format = YmFormat::detect(data)
        .ok_or_else(|| EngineError::ParseError("Not a recognized YM format".to_string()))?;

    let song = match format {
        YmFormat::Ym2 | YmFormat::Ym3 | YmFormat::Ym3b => parse_register_dump(format, data)?,
        YmFormat::Ym4 | YmFormat::Ym5 | YmFormat::Ym6 => parse_with_header(format, data)?,
    };

    log::debug!(
        "parsed {} song '{}': {} frames at {} Hz, loop {:?}",
        song.format,
        song.title,
        song.frames.len(),
        song.frame_rate,
        song.loop_frame
    );
    Ok(song)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym5_header_bytes(magic: &[u8], frames: u32, attributes: u32, loop_frame: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(magic);
        data.extend_from_slice(SIGNATURE);
        data.extend_from_slice(&frames.to_be_bytes());
        data.extend_from_slice(&attributes.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes()); // no digidrum
        data.extend_from_slice(&1_000_000u32.to_be_bytes()); // master clock
        data.extend_from_slice(&60u16.to_be_bytes()); // player freq
        data.extend_from_slice(&loop_frame.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes()); // no extra data
        data
    }

    #[test]
    fn test_ym_magic_detection() {
        assert_eq!(YmFormat::detect(b"YM3!data"), Some(YmFormat::Ym3));
        assert_eq!(YmFormat::detect(b"YM3b"), Some(YmFormat::Ym3b));
        assert_eq!(YmFormat::detect(b"YM6!LeOnArD!"), Some(YmFormat::Ym6));
        assert_eq!(YmFormat::detect(b"XX"), None);
        assert_eq!(YmFormat::detect(b"NESM"), None);
    }

    #[test]
    fn test_ym3_multiple_frames() {
        let mut data = b"YM3!".to_vec();
        let frame_count = 3;
        // R0 for all frames, then R1, etc.
        for reg in 0..14u8 {
            for frame_idx in 0..frame_count {
                data.push((reg << 4) | frame_idx);
            }
        }

        let song = parse_song(&data).unwrap();
        assert_eq!(song.format, YmFormat::Ym3);
        assert_eq!(song.frames.len(), 3);
        for (reg, &value) in song.frames[1].iter().enumerate().take(14) {
            assert_eq!(value, ((reg as u8) << 4) | 1, "frame 1 register {reg}");
        }
        assert_eq!(song.frames[1][14], 0);
        assert_eq!(song.frame_rate, DEFAULT_FRAME_RATE);
        assert_eq!(song.loop_frame, None);
    }

    #[test]
    fn test_ym3_rejects_partial_frame() {
        let mut data = b"YM3!".to_vec();
        data.extend_from_slice(&[0u8; 15]);
        assert!(parse_song(&data).is_err());
    }

    #[test]
    fn test_ym3b_loop_frame() {
        let mut data = b"YM3b".to_vec();
        data.extend_from_slice(&[0u8; 14 * 2]);
        data.extend_from_slice(&1u32.to_be_bytes());

        let song = parse_song(&data).unwrap();
        assert_eq!(song.format, YmFormat::Ym3b);
        assert_eq!(song.frames.len(), 2);
        assert_eq!(song.loop_frame, Some(1));
    }

    #[test]
    fn test_ym3b_out_of_range_loop_is_dropped() {
        let mut data = b"YM3b".to_vec();
        data.extend_from_slice(&[0u8; 14 * 2]);
        data.extend_from_slice(&7u32.to_be_bytes());
        assert_eq!(parse_song(&data).unwrap().loop_frame, None);
    }

    #[test]
    fn test_ym4_parse_with_metadata() {
        let mut data = b"YM4!".to_vec();
        data.extend_from_slice(SIGNATURE);
        data.extend_from_slice(&3u32.to_be_bytes()); // 3 frames
        data.extend_from_slice(&0u32.to_be_bytes()); // non-interleaved
        data.extend_from_slice(&0u16.to_be_bytes()); // no digidrum
        data.extend_from_slice(&2u32.to_be_bytes()); // loop frame
        data.extend_from_slice(b"Test Song\0Test Author\0Test Comment\0");
        for frame_idx in 0..3u8 {
            for reg in 0..14u8 {
                data.push(frame_idx * 14 + reg);
            }
        }

        let song = parse_song(&data).unwrap();
        assert_eq!(song.title, "Test Song");
        assert_eq!(song.author, "Test Author");
        assert_eq!(song.comment, "Test Comment");
        assert_eq!(song.frames.len(), 3);
        assert_eq!(song.frames[1][0], 14);
        assert_eq!(song.frames[1][13], 27);
        assert_eq!(song.loop_frame, Some(2));
        assert_eq!(song.master_clock, DEFAULT_MASTER_CLOCK);
    }

    #[test]
    fn test_ym5_interleaved_with_values() {
        let mut data = ym5_header_bytes(b"YM5!", 2, ATTR_INTERLEAVED, 0);
        data.extend_from_slice(b"YM5 Song\0YM5 Author\0\0");
        for reg in 0..16u8 {
            for frame_idx in 0..2u8 {
                data.push(reg * 2 + frame_idx);
            }
        }
        data.extend_from_slice(b"End!");

        let song = parse_song(&data).unwrap();
        assert_eq!(song.format, YmFormat::Ym5);
        assert_eq!(song.frames[0][0], 0);
        assert_eq!(song.frames[1][0], 1);
        assert_eq!(song.frames[0][1], 2);
        assert_eq!(song.frames[1][15], 31);
        assert_eq!(song.title, "YM5 Song");
        assert_eq!(song.comment, "");
        assert_eq!(song.master_clock, 1_000_000);
        assert_eq!(song.frame_rate, 60);
        assert_eq!(song.loop_frame, None);
    }

    #[test]
    fn test_ym6_skips_digidrums_and_extra_data() {
        let mut data = Vec::new();
        data.extend_from_slice(b"YM6!");
        data.extend_from_slice(SIGNATURE);
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes()); // one digidrum
        data.extend_from_slice(&2_000_000u32.to_be_bytes());
        data.extend_from_slice(&50u16.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&2u16.to_be_bytes()); // two bytes of extra data
        data.extend_from_slice(&[0xAA, 0xBB]);
        data.extend_from_slice(&3u32.to_be_bytes());
        data.extend_from_slice(&[1, 2, 3]);
        data.extend_from_slice(b"T\0A\0C\0");
        data.extend_from_slice(&[9u8; 16]);

        let song = parse_song(&data).unwrap();
        assert_eq!(song.format, YmFormat::Ym6);
        assert_eq!(song.frames, vec![[9u8; 16]]);
        assert_eq!((song.title.as_str(), song.author.as_str()), ("T", "A"));
    }

    #[test]
    fn test_ym5_accepts_fourteen_register_frames() {
        let mut data = ym5_header_bytes(b"YM5!", 1, 0, 0);
        data.extend_from_slice(b"\0\0\0");
        data.extend_from_slice(&[7u8; 14]);

        let song = parse_song(&data).unwrap();
        assert_eq!(song.frames[0][13], 7);
        assert_eq!(song.frames[0][14], 0);
    }

    #[test]
    fn test_truncated_header_is_reported() {
        let data = b"YM5!LeOnArD!\x00\x00".to_vec();
        let err = parse_song(&data).unwrap_err();
        assert!(err.to_string().contains("YM5"), "{err}");
    }

    #[test]
    fn test_zero_frames_rejected() {
        let mut data = ym5_header_bytes(b"YM6!", 0, 0, 0);
        data.extend_from_slice(b"\0\0\0");
        assert!(parse_song(&data).is_err());
    }

    #[test]
    fn test_latin1_strings() {
        let mut data = ym5_header_bytes(b"YM5!", 1, 0, 0);
        data.extend_from_slice(b"Caf\xE9\0\0\0");
        data.extend_from_slice(&[0u8; 16]);
        assert_eq!(parse_song(&data).unwrap().title, "Café");
    }
}
