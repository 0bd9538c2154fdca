//! Host harness for the `GameMusicEmu_*` export table
//!
//! Drives the exported functions exactly as a host application would and
//! optionally writes the rendered audio to a WAV file.

mod args;

use anyhow::{bail, Context, Result};
use args::CliArgs;
use gme_shim::ffi::*;
use gme_shim::{BLOCK_SIZE, SAMPLE_RATE};
use std::ffi::{c_char, CStr, CString};
use std::path::Path;

fn c_text(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // Metadata pointers stay valid until the next track start, load or free
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

fn path_to_c(path: &Path) -> Result<CString> {
    #[cfg(unix)]
    let bytes = {
        use std::os::unix::ffi::OsStrExt;
        path.as_os_str().as_bytes().to_vec()
    };
    #[cfg(not(unix))]
    let bytes = path
        .to_str()
        .context("path is not valid UTF-8")?
        .as_bytes()
        .to_vec();
    CString::new(bytes).context("path contains a NUL byte")
}

fn load_error(code: f64) -> &'static str {
    match code as i64 {
        2 => "file type not recognized",
        3 => "could not create emulator",
        4 => "sample rate rejected",
        5 => "file could not be loaded",
        _ => "unknown error",
    }
}

fn format_ms(ms: f64) -> String {
    if ms < 0.0 {
        return "unknown".to_string();
    }
    let total = (ms / 1000.0) as u64;
    format!("{}:{:02}.{:03}", total / 60, total % 60, ms as u64 % 1000)
}

fn print_info() {
    println!("Title:     {}", c_text(GameMusicEmu_GetName()));
    println!("Author:    {}", c_text(GameMusicEmu_GetAuthor()));
    println!("Copyright: {}", c_text(GameMusicEmu_GetCopyright()));
    println!("Comment:   {}", c_text(GameMusicEmu_GetComment()));
    println!("Length:    {}", format_ms(GameMusicEmu_GetTrackLength()));
    println!(
        "Tracks:    {}   Voices: {}",
        GameMusicEmu_NumTracks(),
        GameMusicEmu_NumVoices()
    );
}

fn apply_options(args: &CliArgs) -> Result<()> {
    if let Some(mask) = args.mute_mask {
        if GameMusicEmu_MuteVoices(mask as f64) != 1.0 {
            bail!("MuteVoices({mask:#x}) failed");
        }
    }
    if let Some(tempo) = args.tempo {
        if !(tempo > 0.0 && tempo <= 5.0) {
            log::warn!("tempo {tempo} is outside (0, 5] and will be ignored");
        }
        GameMusicEmu_SetTempo(tempo);
    }
    if let Some(ms) = args.seek_ms {
        if GameMusicEmu_SetPosition(ms) != 1.0 {
            bail!("SetPosition({ms}) failed");
        }
    }
    Ok(())
}

/// Render until the track ends or the time limit; returns interleaved samples
fn render(seconds: f64) -> Vec<i16> {
    let max_blocks = (seconds.max(0.0) * SAMPLE_RATE as f64 * 2.0 / BLOCK_SIZE as f64).ceil() as usize;
    let mut samples = Vec::with_capacity(max_blocks.min(1 << 16) * BLOCK_SIZE);
    let mut block = [0i16; BLOCK_SIZE];

    for _ in 0..max_blocks {
        let more = unsafe { GameMusicEmu_Read(block.as_mut_ptr().cast()) } == 1.0;
        samples.extend_from_slice(&block);
        if !more {
            break;
        }
    }
    samples
}

fn write_wav(path: &Path, samples: &[i16]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file {}", path.display()))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .context("Failed to write sample")?;
    }
    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}

fn run(args: &CliArgs) -> Result<()> {
    let Some(file_path) = args.file_path.as_deref() else {
        bail!("no input file");
    };
    let c_path = path_to_c(file_path)?;

    let code = unsafe { GameMusicEmu_LoadFile(c_path.as_ptr()) };
    if code != 1.0 {
        bail!(
            "Failed to load {}: {} (code {code})",
            file_path.display(),
            load_error(code)
        );
    }
    if GameMusicEmu_StartTrack(args.track) != 1.0 {
        bail!("Failed to start track {}", args.track);
    }

    print_info();
    if args.info_only {
        GameMusicEmu_Free();
        return Ok(());
    }

    apply_options(args)?;
    let samples = render(args.seconds);
    let frames = samples.len() / 2;
    println!(
        "Rendered {} ({frames} frames), position {}",
        format_ms(frames as f64 * 1000.0 / SAMPLE_RATE as f64),
        format_ms(GameMusicEmu_GetPosition())
    );

    if let Some(wav_path) = args.wav_path.as_deref() {
        write_wav(wav_path, &samples)?;
        println!("Wrote {}", wav_path.display());
    }

    GameMusicEmu_Free();
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let args = CliArgs::parse();
    if args.show_help {
        CliArgs::print_help();
        return if args.file_path.is_none() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("Invalid arguments"))
        };
    }

    run(&args)
}
