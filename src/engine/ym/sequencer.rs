//! Frame timing, loops and song position

use super::parser::Frame;

/// Result of advancing the sequencer by one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceResult {
    /// Still inside the current frame
    NoFrameChange,
    /// Moved to the next frame
    FrameAdvanced,
    /// Jumped back to the loop start
    Looped,
    /// Passed the last frame; no more frames follow
    Completed,
}

/// Steps through register frames at the player rate
///
/// Position is kept in song frames: a frame played twice because of a loop
/// counts twice, and tempo changes only how many output samples a frame
/// lasts.
#[derive(Debug, Clone)]
pub struct FrameSequencer {
    frames: Vec<Frame>,
    loop_point: Option<usize>,
    frame_rate: u16,
    sample_rate: u32,
    tempo: f64,
    samples_per_frame: u32,
    samples_in_frame: u32,
    current_frame: usize,
    loop_count: u32,
    loops_left: u32,
    elapsed_frames: u64,
    ended: bool,
}

impl FrameSequencer {
    /// Sequencer over `frames` played at `frame_rate` frames per second
    pub fn new(frames: Vec<Frame>, loop_point: Option<usize>, frame_rate: u16) -> Self {
        let loop_point = loop_point.filter(|&idx| idx < frames.len());
        let mut sequencer = Self {
            frames,
            loop_point,
            frame_rate: frame_rate.max(1),
            sample_rate: 44_100,
            tempo: 1.0,
            samples_per_frame: 1,
            samples_in_frame: 0,
            current_frame: 0,
            loop_count: 0,
            loops_left: 0,
            elapsed_frames: 0,
            ended: false,
        };
        sequencer.update_timing();
        sequencer
    }

    fn update_timing(&mut self) {
        let spf = (self.sample_rate as f64 / (self.frame_rate as f64 * self.tempo)).round();
        self.samples_per_frame = (spf as u32).max(1);
        self.samples_in_frame = self.samples_in_frame.min(self.samples_per_frame - 1);
    }

    /// Output rate in Hz
    pub fn set_sample_rate(&mut self, rate: u32) {
        self.sample_rate = rate.max(1);
        self.update_timing();
    }

    /// Speed multiplier; must be positive
    pub fn set_tempo(&mut self, tempo: f64) {
        self.tempo = tempo;
        self.update_timing();
    }

    /// Output samples per frame at the current rate and tempo
    pub fn samples_per_frame(&self) -> u32 {
        self.samples_per_frame
    }

    /// Loop start frame, if the song loops
    pub fn loop_point(&self) -> Option<usize> {
        self.loop_point
    }

    /// Rewind to the first frame, allowing `loop_count` extra loop passes
    pub fn restart(&mut self, loop_count: u32) {
        self.loop_count = loop_count;
        self.loops_left = loop_count;
        self.current_frame = 0;
        self.samples_in_frame = 0;
        self.elapsed_frames = 0;
        self.ended = self.frames.is_empty();
    }

    /// Registers of the frame being played
    pub fn current_frame_regs(&self) -> Option<&Frame> {
        if self.ended {
            None
        } else {
            self.frames.get(self.current_frame)
        }
    }

    /// Whether the last frame has been played
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Frames in one full playthrough, loop passes included
    pub fn total_frames(&self) -> u64 {
        let len = self.frames.len() as u64;
        match self.loop_point {
            Some(start) => len + self.loop_count as u64 * (len - start as u64),
            None => len,
        }
    }

    /// Duration of one full playthrough in milliseconds
    pub fn length_ms(&self) -> i64 {
        (self.total_frames() * 1000 / self.frame_rate as u64) as i64
    }

    /// Song position in milliseconds
    pub fn position_ms(&self) -> i64 {
        let frames =
            self.elapsed_frames as f64 + self.samples_in_frame as f64 / self.samples_per_frame as f64;
        (frames * 1000.0 / self.frame_rate as f64) as i64
    }

    /// Advance by one output sample
    pub fn advance_sample(&mut self) -> AdvanceResult {
        if self.ended {
            return AdvanceResult::Completed;
        }

        self.samples_in_frame += 1;
        if self.samples_in_frame < self.samples_per_frame {
            return AdvanceResult::NoFrameChange;
        }
        self.samples_in_frame = 0;
        self.elapsed_frames += 1;

        if self.current_frame + 1 < self.frames.len() {
            self.current_frame += 1;
            return AdvanceResult::FrameAdvanced;
        }
        match self.loop_point {
            Some(start) if self.loops_left > 0 => {
                self.loops_left -= 1;
                self.current_frame = start;
                AdvanceResult::Looped
            }
            _ => {
                self.ended = true;
                AdvanceResult::Completed
            }
        }
    }

    /// Jump to a song position in milliseconds
    ///
    /// Positions inside loop passes land on the matching frame of the loop
    /// section. A position at or past the end ends the track.
    pub fn seek_ms(&mut self, msec: i64) {
        let target = (msec.max(0) as u64).saturating_mul(self.frame_rate as u64) / 1000;
        let total = self.total_frames();
        self.samples_in_frame = 0;

        if target >= total {
            self.elapsed_frames = total;
            self.current_frame = self.frames.len().saturating_sub(1);
            self.loops_left = 0;
            self.ended = true;
            return;
        }

        self.elapsed_frames = target;
        self.ended = false;
        let len = self.frames.len() as u64;
        match self.loop_point {
            Some(start) if target >= len => {
                let section = len - start as u64;
                let past = target - len;
                let pass = past / section;
                self.current_frame = (start as u64 + past % section) as usize;
                self.loops_left = self.loop_count - pass as u32 - 1;
            }
            _ => {
                self.current_frame = target as usize;
                self.loops_left = self.loop_count;
            }
        }
    }
}
