//! Built-in engine: Atari ST YM register dumps
//!
//! Files are unpacked if LHA-compressed, parsed into register frames, and
//! replayed through a software YM2149 at the frame rate stored in the file.
//! One file holds one track with three voices.

pub mod chip;
pub mod compression;
pub mod parser;
pub mod sequencer;

use crate::engine::{Emulator, Engine, FileType, TrackInfo, HEADER_PROBE_LEN};
use crate::error::{EngineError, EngineResult};
use chip::{Voices, Ym2149, ENVELOPE_SHAPE_UNCHANGED, REGISTER_COUNT};
use compression::{decompress_if_needed, is_lha_compressed};
use parser::{parse_song, Frame, YmFormat};
use sequencer::{AdvanceResult, FrameSequencer};
use std::fs::File;
use std::io::Read;
use std::ops::RangeInclusive;
use std::path::Path;

/// The one file type this engine plays
pub const YM_FILE: FileType = FileType {
    system: "Atari ST",
    extension: "YM",
};

/// Output rates the chip renders cleanly at
pub const SUPPORTED_SAMPLE_RATES: RangeInclusive<u32> = 8_000..=192_000;

const VOICE_COUNT: usize = 3;

/// Factory for [`YmEmulator`]
#[derive(Debug, Clone, Default)]
pub struct YmEngine {
    loop_count: u32,
}

impl YmEngine {
    /// Engine whose emulators replay a song's loop section `loop_count`
    /// extra times before ending the track
    pub fn new(loop_count: u32) -> Self {
        Self { loop_count }
    }
}

impl Engine for YmEngine {
    fn identify(&self, header: &[u8]) -> Option<FileType> {
        (YmFormat::detect(header).is_some() || is_lha_compressed(header)).then_some(YM_FILE)
    }

    /// Header identification, falling back to a `.ym` extension
    fn identify_file(&self, path: &Path) -> EngineResult<FileType> {
        let mut header = Vec::with_capacity(HEADER_PROBE_LEN);
        File::open(path)?
            .take(HEADER_PROBE_LEN as u64)
            .read_to_end(&mut header)?;
        if let Some(file_type) = self.identify(&header) {
            return Ok(file_type);
        }

        let has_ym_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("ym"));
        if has_ym_extension {
            log::debug!("{} identified by extension only", path.display());
            return Ok(YM_FILE);
        }

        Err(EngineError::ParseError(format!(
            "unrecognized file type: {}",
            path.display()
        )))
    }

    fn instantiate(&self, file_type: FileType) -> Option<Box<dyn Emulator>> {
        (file_type == YM_FILE)
            .then(|| Box::new(YmEmulator::new(self.loop_count)) as Box<dyn Emulator>)
    }
}

struct Song {
    format: YmFormat,
    title: String,
    author: String,
    comment: String,
    master_clock: u32,
    sequencer: FrameSequencer,
    chip: Ym2149,
}

/// YM file player
pub struct YmEmulator {
    sample_rate: u32,
    loop_count: u32,
    tempo: f64,
    muted: Voices,
    song: Option<Song>,
    started: bool,
}

impl YmEmulator {
    /// Player with nothing loaded, rendering at 44.1 kHz
    pub fn new(loop_count: u32) -> Self {
        Self {
            sample_rate: 44_100,
            loop_count,
            tempo: 1.0,
            muted: Voices::empty(),
            song: None,
            started: false,
        }
    }

    fn song_mut(&mut self) -> EngineResult<&mut Song> {
        self.song.as_mut().ok_or(EngineError::NotLoaded)
    }

    fn new_chip(&self, master_clock: u32) -> Ym2149 {
        let mut chip = Ym2149::with_clocks(master_clock, self.sample_rate);
        for voice in 0..VOICE_COUNT {
            let muted = Voices::channel(voice).is_some_and(|v| self.muted.contains(v));
            chip.set_channel_mute(voice, muted);
        }
        chip
    }
}

/// Registers to write for a frame
///
/// YM2 songs keep a drum number in R10-R13; their envelope always uses
/// shape 10 with only the low period byte.
fn chip_registers(format: YmFormat, frame: &Frame) -> [u8; REGISTER_COUNT] {
    let mut regs = [0u8; REGISTER_COUNT];
    regs.copy_from_slice(&frame[..REGISTER_COUNT]);
    if format == YmFormat::Ym2 && regs[13] != ENVELOPE_SHAPE_UNCHANGED {
        regs[12] = 0;
        regs[13] = 0x0A;
    }
    regs
}

impl Song {
    fn apply_current_frame(&mut self) {
        if let Some(frame) = self.sequencer.current_frame_regs() {
            let regs = chip_registers(self.format, frame);
            self.chip.load_frame(&regs);
        }
    }
}

impl Emulator for YmEmulator {
    fn set_sample_rate(&mut self, rate: u32) -> EngineResult<()> {
        if !SUPPORTED_SAMPLE_RATES.contains(&rate) {
            return Err(EngineError::UnsupportedSampleRate(rate));
        }
        self.sample_rate = rate;
        if let Some(master_clock) = self.song.as_ref().map(|song| song.master_clock) {
            let chip = self.new_chip(master_clock);
            if let Some(song) = self.song.as_mut() {
                song.chip = chip;
                song.sequencer.set_sample_rate(rate);
                song.apply_current_frame();
            }
        }
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn load_data(&mut self, data: &[u8]) -> EngineResult<()> {
        let data = decompress_if_needed(data)?;
        let parsed = parse_song(&data)?;

        let mut sequencer =
            FrameSequencer::new(parsed.frames, parsed.loop_frame, parsed.frame_rate);
        sequencer.set_sample_rate(self.sample_rate);
        sequencer.set_tempo(self.tempo);
        sequencer.restart(self.loop_count);

        self.song = Some(Song {
            format: parsed.format,
            title: parsed.title,
            author: parsed.author,
            comment: parsed.comment,
            master_clock: parsed.master_clock,
            sequencer,
            chip: self.new_chip(parsed.master_clock),
        });
        self.started = false;
        Ok(())
    }

    fn track_count(&self) -> usize {
        usize::from(self.song.is_some())
    }

    fn start_track(&mut self, index: usize) -> EngineResult<()> {
        let count = self.track_count();
        let loop_count = self.loop_count;
        let song = self.song_mut()?;
        if index >= count {
            return Err(EngineError::TrackOutOfRange { index, count });
        }
        song.chip.reset();
        song.sequencer.restart(loop_count);
        song.apply_current_frame();
        self.started = true;
        Ok(())
    }

    fn track_info(&self) -> TrackInfo {
        match &self.song {
            Some(song) => TrackInfo {
                song: song.title.clone(),
                author: song.author.clone(),
                copyright: String::new(),
                comment: song.comment.clone(),
                length_ms: song.sequencer.length_ms(),
            },
            None => TrackInfo {
                length_ms: -1,
                ..TrackInfo::default()
            },
        }
    }

    fn play(&mut self, out: &mut [i16]) -> EngineResult<()> {
        out.fill(0);
        if !self.started {
            return Ok(());
        }
        let song = self.song_mut()?;

        for pair in out.chunks_exact_mut(2) {
            if song.sequencer.is_ended() {
                break;
            }
            let sample = song.chip.compute_next_sample();
            pair[0] = sample;
            pair[1] = sample;
            match song.sequencer.advance_sample() {
                AdvanceResult::FrameAdvanced | AdvanceResult::Looped => {
                    song.apply_current_frame()
                }
                AdvanceResult::NoFrameChange | AdvanceResult::Completed => {}
            }
        }
        Ok(())
    }

    fn track_ended(&self) -> bool {
        match &self.song {
            Some(song) => self.started && song.sequencer.is_ended(),
            None => false,
        }
    }

    fn voice_count(&self) -> usize {
        VOICE_COUNT
    }

    fn mute_voice(&mut self, index: usize, mute: bool) {
        let Some(voice) = Voices::channel(index) else {
            return;
        };
        self.muted.set(voice, mute);
        if let Some(song) = self.song.as_mut() {
            song.chip.set_channel_mute(index, mute);
        }
    }

    fn set_tempo(&mut self, tempo: f64) {
        self.tempo = tempo;
        if let Some(song) = self.song.as_mut() {
            song.sequencer.set_tempo(tempo);
        }
    }

    fn tell(&self) -> i64 {
        match &self.song {
            Some(song) if self.started => song.sequencer.position_ms(),
            _ => 0,
        }
    }

    fn seek(&mut self, msec: i64) -> EngineResult<()> {
        let started = self.started;
        let song = self.song_mut()?;
        if !started {
            return Err(EngineError::Other("no track started".to_string()));
        }
        song.sequencer.seek_ms(msec);
        song.apply_current_frame();
        log::debug!("seek to {msec} ms, now at {} ms", song.sequencer.position_ms());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Non-interleaved YM5 with a steady tone on channel A
    fn tone_song(frames: u32, loop_frame: u32) -> Vec<u8> {
        let mut data = b"YM5!LeOnArD!".to_vec();
        data.extend_from_slice(&frames.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&2_000_000u32.to_be_bytes());
        data.extend_from_slice(&50u16.to_be_bytes());
        data.extend_from_slice(&loop_frame.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(b"Tone\0Tester\0Steady A\0");
        for _ in 0..frames {
            let mut frame = [0u8; 16];
            frame[0] = 0x1C;
            frame[1] = 0x01;
            frame[7] = 0x3E;
            frame[8] = 0x0F;
            frame[13] = ENVELOPE_SHAPE_UNCHANGED;
            data.extend_from_slice(&frame);
        }
        data.extend_from_slice(b"End!");
        data
    }

    fn loaded(frames: u32, loop_frame: u32, loop_count: u32) -> Box<dyn Emulator> {
        let mut emu = YmEngine::new(loop_count)
            .open_data(&tone_song(frames, loop_frame), 44_100)
            .unwrap();
        emu.start_track(0).unwrap();
        emu
    }

    fn peak(buf: &[i16]) -> i16 {
        buf.iter().map(|s| s.saturating_abs()).max().unwrap_or(0)
    }

    #[test]
    fn identifies_ym_and_lha() {
        let engine = YmEngine::default();
        assert_eq!(engine.identify(b"YM6!LeOnArD!"), Some(YM_FILE));
        assert_eq!(engine.identify(b"\x20\x2d\x6c\x68\x35\x2d\x15"), Some(YM_FILE));
        assert_eq!(engine.identify(b"NESM\x1a"), None);
        assert!(engine.instantiate(FileType { system: "NES", extension: "NSF" }).is_none());
    }

    #[test]
    fn identify_file_falls_back_to_extension() {
        let dir = tempfile::tempdir().unwrap();
        let by_name = dir.path().join("odd.YM");
        std::fs::write(&by_name, b"????").unwrap();
        assert_eq!(YmEngine::default().identify_file(&by_name).unwrap(), YM_FILE);

        let other = dir.path().join("odd.bin");
        std::fs::write(&other, b"????").unwrap();
        assert!(YmEngine::default().identify_file(&other).is_err());
    }

    #[test]
    fn rejects_unsupported_rate() {
        let mut emu = YmEmulator::new(0);
        assert!(matches!(
            emu.set_sample_rate(4_000),
            Err(EngineError::UnsupportedSampleRate(4_000))
        ));
        assert!(emu.set_sample_rate(48_000).is_ok());
        assert_eq!(emu.sample_rate(), 48_000);
    }

    #[test]
    fn metadata_and_length() {
        let emu = loaded(100, 0, 0);
        let info = emu.track_info();
        assert_eq!(info.song, "Tone");
        assert_eq!(info.author, "Tester");
        assert_eq!(info.comment, "Steady A");
        assert_eq!(info.copyright, "");
        assert_eq!(info.length_ms, 2000);
        assert_eq!(emu.track_count(), 1);
        assert_eq!(emu.voice_count(), 3);
    }

    #[test]
    fn start_track_bounds() {
        let mut emu = loaded(10, 0, 0);
        assert!(matches!(
            emu.start_track(1),
            Err(EngineError::TrackOutOfRange { index: 1, count: 1 })
        ));
        assert!(matches!(
            YmEmulator::new(0).start_track(0),
            Err(EngineError::NotLoaded)
        ));
    }

    #[test]
    fn renders_stereo_tone() {
        let mut emu = loaded(100, 0, 0);
        let mut buf = vec![0i16; 4410];
        emu.play(&mut buf).unwrap();
        assert!(peak(&buf) > 4000);
        assert!(buf.chunks_exact(2).all(|p| p[0] == p[1]));
    }

    #[test]
    fn muted_voice_renders_silence() {
        let mut emu = loaded(100, 0, 0);
        emu.mute_voices(0b001);
        let mut buf = vec![0i16; 4410];
        emu.play(&mut buf).unwrap();
        assert_eq!(peak(&buf), 0);

        emu.mute_voice(0, false);
        emu.play(&mut buf).unwrap();
        assert!(peak(&buf) > 4000);
    }

    #[test]
    fn mutes_survive_track_restart() {
        let mut emu = loaded(100, 0, 0);
        emu.mute_voice(0, true);
        emu.start_track(0).unwrap();
        let mut buf = vec![0i16; 2000];
        emu.play(&mut buf).unwrap();
        assert_eq!(peak(&buf), 0);
    }

    #[test]
    fn track_ends_then_silence() {
        // 5 frames at 50 Hz = 4410 stereo frames
        let mut emu = loaded(5, 0, 0);
        let mut buf = vec![0i16; 2 * 4410];
        emu.play(&mut buf).unwrap();
        assert!(emu.track_ended());
        emu.play(&mut buf).unwrap();
        assert_eq!(peak(&buf), 0);
        assert_eq!(emu.tell(), 100);
    }

    #[test]
    fn loop_passes_extend_the_track() {
        let mut emu = loaded(5, 2, 2);
        assert_eq!(emu.track_info().length_ms, 220);
        let mut buf = vec![0i16; 2 * 882 * 10];
        emu.play(&mut buf).unwrap();
        assert!(!emu.track_ended());
        let mut rest = vec![0i16; 2 * 882];
        emu.play(&mut rest).unwrap();
        assert!(emu.track_ended());
    }

    #[test]
    fn tell_tracks_song_time() {
        let mut emu = loaded(200, 0, 0);
        let mut buf = vec![0i16; 2 * 44_100];
        emu.play(&mut buf).unwrap();
        assert_abs_diff_eq!(emu.tell() as f64, 1000.0, epsilon = 20.0);

        emu.start_track(0).unwrap();
        emu.set_tempo(2.0);
        emu.play(&mut buf).unwrap();
        assert_abs_diff_eq!(emu.tell() as f64, 2000.0, epsilon = 40.0);
    }

    #[test]
    fn seek_moves_position() {
        let mut emu = loaded(200, 0, 0);
        emu.seek(1500).unwrap();
        assert_eq!(emu.tell(), 1500);
        emu.seek(60_000).unwrap();
        assert!(emu.track_ended());
        emu.seek(i64::MAX).unwrap();
        assert!(emu.track_ended());
        assert_eq!(emu.tell(), emu.track_info().length_ms);
    }

    #[test]
    fn ym2_frames_use_fixed_envelope() {
        let mut frame = [0u8; 16];
        frame[11] = 0x40;
        frame[12] = 0x33;
        frame[13] = 0x00;
        let regs = chip_registers(YmFormat::Ym2, &frame);
        assert_eq!((regs[11], regs[12], regs[13]), (0x40, 0, 0x0A));

        frame[13] = ENVELOPE_SHAPE_UNCHANGED;
        assert_eq!(chip_registers(YmFormat::Ym2, &frame)[13], ENVELOPE_SHAPE_UNCHANGED);
        frame[13] = 0x04;
        assert_eq!(chip_registers(YmFormat::Ym5, &frame)[12], 0x33);
    }
}
