//! YM2149 programmable sound generator
//!
//! The chip state machine runs at an eighth of the master clock (250 kHz for
//! an Atari ST). Every host sample ORs together the square-wave gates seen
//! during the ticks it spans, looks the three channel levels up in a
//! logarithmic table and removes the DC offset.
//!
//! Per-channel state is packed into 15-bit words, five bits per voice, so the
//! tone, noise and mute gates can be combined with plain `&` and `|`.

use bitflags::bitflags;

const DC_ADJUST_HISTORY_BIT: usize = 11; // 2048 values (~20ms at 44Khz)
const DC_ADJUST_HISTORY_SIZE: usize = 1 << DC_ADJUST_HISTORY_BIT;

/// Number of writable registers
pub const REGISTER_COUNT: usize = 14;

/// R13 value meaning "leave the envelope running"
pub const ENVELOPE_SHAPE_UNCHANGED: u8 = 0xFF;

/// Valid bits per register
const REG_MASK: [u8; REGISTER_COUNT] = [
    0xff, 0x0f, 0xff, 0x0f, 0xff, 0x0f, 0x1f, 0xff, 0x1f, 0x1f, 0x1f, 0xff, 0xff, 0x0f,
];

/// Five-bit lane per voice for each 3-bit mixer value
const MASKS: [u32; 8] = [
    0x0000, 0x001f, 0x03e0, 0x03ff, 0x7c00, 0x7c1f, 0x7fe0, 0x7fff,
];

/// Measured output of the 16 fixed volume steps
const VOLUME_TABLE: [u16; 16] = [
    20, 53, 88, 125, 193, 258, 385, 525, 753, 1029, 1523, 2077, 3110, 4395, 7073, 10922,
];

const fn build_log_levels() -> [u16; 32] {
    let mut levels = [0u16; 32];
    let mut v = 1;
    while v < 16 {
        levels[v * 2] = VOLUME_TABLE[v];
        v += 1;
    }
    // Odd steps are only reachable from the envelope and sit halfway up
    let mut v = 0;
    while v < 15 {
        levels[v * 2 + 1] = (levels[v * 2] + VOLUME_TABLE[v + 1]) / 2;
        v += 1;
    }
    levels[31] = VOLUME_TABLE[15];
    levels
}

/// 32-step output levels; index `2 * v` is fixed volume `v`
const LOG_LEVELS: [u16; 32] = build_log_levels();

#[derive(Clone, Copy)]
enum Slope {
    Down,
    Up,
    Low,
    High,
}

/// Four 32-step phases per shape; phases 2 and 3 repeat forever
const fn shape_phases(shape: usize) -> [Slope; 4] {
    use Slope::*;
    match shape {
        0..=3 | 9 => [Down, Low, Low, Low],
        4..=7 | 15 => [Up, Low, Low, Low],
        8 => [Down, Down, Down, Down],
        10 => [Down, Up, Down, Up],
        11 => [Down, High, High, High],
        12 => [Up, Up, Up, Up],
        13 => [Up, High, High, High],
        _ => [Up, Down, Up, Down],
    }
}

const ENV_SHAPE_LEN: usize = 4 * 32;

const fn build_envelopes() -> [u8; 16 * ENV_SHAPE_LEN] {
    let mut table = [0u8; 16 * ENV_SHAPE_LEN];
    let mut shape = 0;
    while shape < 16 {
        let phases = shape_phases(shape);
        let mut phase = 0;
        while phase < 4 {
            let mut step = 0;
            while step < 32 {
                table[shape * ENV_SHAPE_LEN + phase * 32 + step] = match phases[phase] {
                    Slope::Down => 31 - step as u8,
                    Slope::Up => step as u8,
                    Slope::Low => 0,
                    Slope::High => 31,
                };
                step += 1;
            }
            phase += 1;
        }
        shape += 1;
    }
    table
}

/// Envelope levels for every shape, indexed by `shape * 128 + pos + 64`
const ENVELOPES: [u8; 16 * ENV_SHAPE_LEN] = build_envelopes();

bitflags! {
    /// Set of PSG voices
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Voices: u8 {
        /// Channel A
        const A = 0b001;
        /// Channel B
        const B = 0b010;
        /// Channel C
        const C = 0b100;
    }
}

impl Voices {
    /// Voice for a channel index, `None` past channel C
    pub fn channel(index: usize) -> Option<Self> {
        match index {
            0 => Some(Voices::A),
            1 => Some(Voices::B),
            2 => Some(Voices::C),
            _ => None,
        }
    }

    /// Five-bit lanes cleared for every voice in the set
    fn lane_mask(self) -> u32 {
        MASKS[self.bits() as usize]
    }
}

fn std_lib_rand(seed: &mut u32) -> u16 {
    *seed = seed.wrapping_mul(214013).wrapping_add(2531011);
    ((*seed >> 16) & 0x7fff) as u16
}

/// YM2149 emulator producing mono samples
#[derive(Clone)]
pub struct Ym2149 {
    env_offset: usize,
    ticks_per_second: u32,
    host_rate: u32,
    tone_counter: [u32; 3],
    tone_period: [u32; 3],
    tone_edges: u32,
    env_counter: u32,
    env_pos: i32,
    env_period: u32,
    noise_counter: u32,
    noise_period: u32,
    tone_mask: u32,
    noise_mask: u32,
    noise_lfsr: u32,
    noise_gate: u32,
    noise_half: bool,
    dc_history: [u16; DC_ADJUST_HISTORY_SIZE],
    dc_pos: usize,
    dc_sum: u32,
    regs: [u8; REGISTER_COUNT],
    inner_cycle: u32,
    muted: Voices,
}

impl Ym2149 {
    /// Chip clocked at `master_clock` Hz rendering at `sample_rate` Hz
    pub fn with_clocks(master_clock: u32, sample_rate: u32) -> Self {
        let mut chip = Self {
            env_offset: 0,
            ticks_per_second: (master_clock / 8).max(1),
            host_rate: sample_rate.max(1),
            tone_counter: [0; 3],
            tone_period: [0; 3],
            tone_edges: 0,
            env_counter: 0,
            env_pos: 0,
            env_period: 0,
            noise_counter: 0,
            noise_period: 0,
            tone_mask: 0,
            noise_mask: 0,
            noise_lfsr: 1,
            noise_gate: 0,
            noise_half: false,
            dc_history: [0; DC_ADJUST_HISTORY_SIZE],
            dc_pos: 0,
            dc_sum: 0,
            regs: [0; REGISTER_COUNT],
            inner_cycle: 0,
            muted: Voices::empty(),
        };
        chip.reset();
        chip
    }

    /// Power-on state: all registers cleared, mixer fully closed
    ///
    /// Voice mutes survive a reset.
    pub fn reset(&mut self) {
        let mut seed = 1u32;
        self.tone_counter = [0; 3];
        self.tone_period = [0; 3];
        // Initial edge state is unpredictable on hardware
        self.tone_edges =
            (std_lib_rand(&mut seed) as u32 & ((1 << 10) | (1 << 5) | (1 << 0))) * 0x1f;
        self.noise_lfsr = 1;
        self.noise_half = false;

        for reg in 0..REGISTER_COUNT as u8 {
            self.write_register(reg, if reg == 7 { 0x3f } else { 0 });
        }

        self.inner_cycle = 0;
        self.env_pos = 0;
        self.dc_pos = 0;
        self.dc_sum = 0;
        self.dc_history.fill(0);
    }

    /// Write a register; indexes past R13 are ignored
    pub fn write_register(&mut self, reg: u8, value: u8) {
        let reg = reg as usize;
        if reg >= REGISTER_COUNT {
            return;
        }
        self.regs[reg] = value & REG_MASK[reg];

        match reg {
            0..=5 => {
                let voice = reg >> 1;
                self.tone_period[voice] =
                    ((self.regs[voice * 2 + 1] as u32) << 8) | self.regs[voice * 2] as u32;
            }
            6 => self.noise_period = self.regs[6] as u32,
            7 => {
                self.tone_mask = MASKS[(value & 0x7) as usize];
                self.noise_mask = MASKS[((value >> 3) & 0x7) as usize];
            }
            11 | 12 => {
                self.env_period = ((self.regs[12] as u32) << 8) | self.regs[11] as u32;
            }
            13 => {
                self.env_offset = (self.regs[13] & 0x0f) as usize * ENV_SHAPE_LEN;
                self.env_pos = -64;
                self.env_counter = 0;
            }
            _ => {}
        }
    }

    /// Read back a register, 0 past R13
    pub fn read_register(&self, reg: u8) -> u8 {
        self.regs.get(reg as usize).copied().unwrap_or(0)
    }

    /// Load R0-R13 from a frame; an R13 of 0xFF keeps the running envelope
    pub fn load_frame(&mut self, regs: &[u8]) {
        for (reg, &value) in regs.iter().enumerate().take(REGISTER_COUNT) {
            if reg == 13 && value == ENVELOPE_SHAPE_UNCHANGED {
                continue;
            }
            self.write_register(reg as u8, value);
        }
    }

    /// Mute or unmute one channel (0 = A)
    pub fn set_channel_mute(&mut self, channel: usize, mute: bool) {
        if let Some(voice) = Voices::channel(channel) {
            self.muted.set(voice, mute);
        }
    }

    /// Currently muted voices
    pub fn muted(&self) -> Voices {
        self.muted
    }

    fn dc_adjust(&mut self, v: u16) -> i16 {
        self.dc_sum -= self.dc_history[self.dc_pos] as u32;
        self.dc_sum += v as u32;
        self.dc_history[self.dc_pos] = v;
        self.dc_pos = (self.dc_pos + 1) & (DC_ADJUST_HISTORY_SIZE - 1);

        // Three channels peak at 15 bits, so this cannot overshoot
        ((v as i32) - ((self.dc_sum >> DC_ADJUST_HISTORY_BIT) as i32)) as i16
    }

    fn tick(&mut self) -> u32 {
        let gates = (self.tone_edges | self.tone_mask) & (self.noise_gate | self.noise_mask);

        for v in 0..3 {
            self.tone_counter[v] += 1;
            if self.tone_counter[v] >= self.tone_period[v] {
                self.tone_edges ^= 0x1f << (v * 5);
                self.tone_counter[v] = 0;
            }
        }

        self.env_counter += 1;
        if self.env_counter >= self.env_period {
            self.env_pos += 1;
            if self.env_pos > 0 {
                self.env_pos &= 63;
            }
            self.env_counter = 0;
        }

        // Noise runs at half speed
        self.noise_half = !self.noise_half;
        if self.noise_half {
            self.noise_counter += 1;
            if self.noise_counter >= self.noise_period {
                self.noise_gate = if (self.noise_lfsr ^ (self.noise_lfsr >> 2)) & 1 != 0 {
                    !0
                } else {
                    0
                };
                self.noise_lfsr = (self.noise_lfsr >> 1) | ((self.noise_gate & 1) << 16);
                self.noise_counter = 0;
            }
        }

        gates
    }

    fn channel_level(&self, reg: usize, env_level: u32) -> u32 {
        let volume = self.regs[reg];
        if volume & 0x10 != 0 {
            env_level
        } else {
            (volume as u32) << 1
        }
    }

    /// Advance the chip by one host sample
    pub fn compute_next_sample(&mut self) -> i16 {
        let mut gates = 0u32;
        loop {
            gates |= self.tick();
            self.inner_cycle += self.host_rate;
            if self.inner_cycle >= self.ticks_per_second {
                break;
            }
        }
        // Host rates above the tick rate get one tick per sample
        self.inner_cycle = (self.inner_cycle - self.ticks_per_second).min(self.ticks_per_second - 1);

        let env_level = ENVELOPES[self.env_offset + (self.env_pos + 64) as usize] as u32;
        let mut levels = self.channel_level(8, env_level)
            | (self.channel_level(9, env_level) << 5)
            | (self.channel_level(10, env_level) << 10);
        levels &= gates & !self.muted.lane_mask();
        debug_assert!(levels < 0x8000);

        let mut sum = 0u16;
        for v in 0..3 {
            // Periods 0 and 1 are inaudible square waves; the chip outputs half level
            let half = if self.tone_period[v] > 1 { 0 } else { 1 };
            sum += LOG_LEVELS[((levels >> (v * 5)) & 31) as usize] >> half;
        }
        self.dc_adjust(sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone_a(chip: &mut Ym2149) {
        chip.write_register(0, 0x1C);
        chip.write_register(1, 0x01);
        chip.write_register(7, 0x3E);
        chip.write_register(8, 0x0F);
    }

    fn peak_to_peak(chip: &mut Ym2149, samples: usize) -> i32 {
        let out: Vec<i32> = (0..samples).map(|_| chip.compute_next_sample() as i32).collect();
        out.iter().max().unwrap() - out.iter().min().unwrap()
    }

    #[test]
    fn reset_chip_is_silent() {
        let mut chip = Ym2149::with_clocks(2_000_000, 44_100);
        assert!((0..2000).all(|_| chip.compute_next_sample() == 0));
        assert_eq!(chip.read_register(7), 0x3f);
    }

    #[test]
    fn tone_produces_square_wave() {
        let mut chip = Ym2149::with_clocks(2_000_000, 44_100);
        tone_a(&mut chip);
        assert!(peak_to_peak(&mut chip, 2000) > 10_000);
    }

    #[test]
    fn muted_channel_is_silent() {
        let mut chip = Ym2149::with_clocks(2_000_000, 44_100);
        chip.set_channel_mute(0, true);
        tone_a(&mut chip);
        assert!((0..2000).all(|_| chip.compute_next_sample() == 0));
        assert_eq!(chip.muted(), Voices::A);

        chip.set_channel_mute(0, false);
        assert!(peak_to_peak(&mut chip, 2000) > 10_000);
    }

    #[test]
    fn mute_ignores_unknown_channel() {
        let mut chip = Ym2149::with_clocks(2_000_000, 44_100);
        chip.set_channel_mute(3, true);
        assert!(chip.muted().is_empty());
    }

    #[test]
    fn registers_are_masked() {
        let mut chip = Ym2149::with_clocks(2_000_000, 44_100);
        chip.write_register(1, 0xFF);
        chip.write_register(6, 0xFF);
        chip.write_register(13, 0xFF);
        assert_eq!(chip.read_register(1), 0x0F);
        assert_eq!(chip.read_register(6), 0x1F);
        assert_eq!(chip.read_register(13), 0x0F);
        chip.write_register(14, 0x12);
        assert_eq!(chip.read_register(14), 0);
    }

    #[test]
    fn load_frame_keeps_envelope_on_ff() {
        let mut chip = Ym2149::with_clocks(2_000_000, 44_100);
        let mut frame = [0u8; 16];
        frame[13] = 0x0A;
        chip.load_frame(&frame);
        assert_eq!(chip.read_register(13), 0x0A);

        frame[13] = ENVELOPE_SHAPE_UNCHANGED;
        frame[8] = 0x10;
        chip.load_frame(&frame);
        assert_eq!(chip.read_register(13), 0x0A);
        assert_eq!(chip.read_register(8), 0x10);
    }

    #[test]
    fn envelope_shapes() {
        let shape = |s: usize| &ENVELOPES[s * ENV_SHAPE_LEN..(s + 1) * ENV_SHAPE_LEN];
        // \___
        assert_eq!(shape(0)[0], 31);
        assert_eq!(shape(0)[31], 0);
        assert!(shape(0)[32..].iter().all(|&l| l == 0));
        // ////
        assert_eq!(shape(12)[0], 0);
        assert_eq!(shape(12)[95], 31);
        // \/\/ loops down then up
        assert_eq!(shape(10)[64], 31);
        assert_eq!(shape(10)[96], 0);
        assert_eq!(shape(10)[127], 31);
        // /¯¯¯
        assert!(shape(13)[32..].iter().all(|&l| l == 31));
    }

    #[test]
    fn log_levels_match_fixed_volumes() {
        assert_eq!(LOG_LEVELS[0], 0);
        assert_eq!(LOG_LEVELS[30], 10922);
        assert_eq!(LOG_LEVELS[31], 10922);
        assert!(LOG_LEVELS.windows(2).all(|w| w[0] <= w[1]));
        assert!(3 * LOG_LEVELS[31] as u32 <= i16::MAX as u32);
    }

    #[test]
    fn high_host_rate_does_not_overflow() {
        let mut chip = Ym2149::with_clocks(1_000_000, 192_000);
        tone_a(&mut chip);
        for _ in 0..100_000 {
            chip.compute_next_sample();
        }
    }
}
