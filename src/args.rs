//! Command-line argument parsing for the host harness.

use std::env;
use std::path::PathBuf;

/// Parsed command-line arguments.
#[derive(Debug)]
pub struct CliArgs {
    /// Music file to load
    pub file_path: Option<PathBuf>,
    /// Track to start (0-based)
    pub track: f64,
    /// Tempo multiplier
    pub tempo: Option<f64>,
    /// Voice mute mask
    pub mute_mask: Option<u32>,
    /// Start position in milliseconds
    pub seek_ms: Option<f64>,
    /// Render limit in seconds
    pub seconds: f64,
    /// WAV output path
    pub wav_path: Option<PathBuf>,
    /// Print metadata and exit
    pub info_only: bool,
    /// Whether help was requested
    pub show_help: bool,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            file_path: None,
            track: 0.0,
            tempo: None,
            mute_mask: None,
            seek_ms: None,
            seconds: 180.0,
            wav_path: None,
            info_only: false,
            show_help: false,
        }
    }
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Option<T> {
    let Some(value) = value else {
        eprintln!("{flag} requires an argument");
        return None;
    };
    let parsed = value.parse().ok();
    if parsed.is_none() {
        eprintln!("Invalid value for {flag}: {value}");
    }
    parsed
}

/// Mute masks may be given in decimal or as `0x`-prefixed hex
fn parse_mask(text: &str) -> Option<u32> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

impl CliArgs {
    /// Parse arguments from the command line.
    pub fn parse() -> Self {
        Self::parse_from(env::args().skip(1))
    }

    /// Parse arguments from an iterator (without the program name).
    pub fn parse_from(iter: impl IntoIterator<Item = String>) -> Self {
        let mut args = Self::default();
        let mut iter = iter.into_iter();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--help" | "-h" => args.show_help = true,
                "--info" => args.info_only = true,
                "--track" => match parse_number(&arg, iter.next()) {
                    Some(track) => args.track = track,
                    None => args.show_help = true,
                },
                "--tempo" => match parse_number(&arg, iter.next()) {
                    Some(tempo) => args.tempo = Some(tempo),
                    None => args.show_help = true,
                },
                "--seek" => match parse_number(&arg, iter.next()) {
                    Some(ms) => args.seek_ms = Some(ms),
                    None => args.show_help = true,
                },
                "--seconds" => match parse_number(&arg, iter.next()) {
                    Some(seconds) => args.seconds = seconds,
                    None => args.show_help = true,
                },
                "--mute" => match iter.next().as_deref().and_then(parse_mask) {
                    Some(mask) => args.mute_mask = Some(mask),
                    None => {
                        eprintln!("--mute requires a decimal or 0x-prefixed mask");
                        args.show_help = true;
                    }
                },
                "--wav" => match iter.next() {
                    Some(path) => args.wav_path = Some(PathBuf::from(path)),
                    None => {
                        eprintln!("--wav requires an output path");
                        args.show_help = true;
                    }
                },
                _ if arg.starts_with('-') => {
                    eprintln!("Unknown flag: {}", arg);
                    args.show_help = true;
                }
                _ => args.file_path = Some(PathBuf::from(arg)),
            }
        }

        if args.file_path.is_none() {
            args.show_help = true;
        }
        args
    }

    /// Print help text to stderr.
    pub fn print_help() {
        eprintln!(
            "Usage:\n  gme-shim <file> [options]\n\n\
             Options:\n\
             \x20 --track <n>        Track to play (default 0, clamped to the last track)\n\
             \x20 --tempo <x>        Speed multiplier, 0 < x <= 5\n\
             \x20 --mute <mask>      Mute voices by bit mask (e.g. 5 or 0x5)\n\
             \x20 --seek <ms>        Start position in milliseconds\n\
             \x20 --seconds <s>      Stop after this many seconds (default 180)\n\
             \x20 --wav <out.wav>    Write 16-bit stereo 44.1 kHz WAV\n\
             \x20 --info             Print metadata only\n\
             \x20 -h, --help         Show this help\n\n\
             Environment:\n\
             \x20 GME_SHIM_CONFIG    JSON configuration file\n\
             \x20 RUST_LOG           Log filter (e.g. debug)\n"
        );
    }
}
