//! `samd`: run recorded calls through the answering machine detector.
//!
//! Prints `<file>,<result>` per recording. With `-R`, recordings whose names
//! contain "machine", "human" or "person" are scored against that label.

mod report;

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser};
use samd_core::{Amd, AmdConfig, AmdEvent, Disposition};
use tracing::{debug, info, info_span, warn};

use crate::report::{expected_from_file_name, FileResult, Stats};

/// Samples per `process_buffer` call: 10 ms of 8 kHz mono.
const BUFFER_SAMPLES: usize = 80;

#[derive(Parser, Debug)]
#[command(name = "samd")]
#[command(version, about = "Simple answering machine detection for recorded calls")]
#[command(group(ArgGroup::new("input").required(true).args(["file", "list"])))]
struct Args {
    /// Raw 16-bit little-endian PCM or WAV file to classify
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// Text file listing recordings, one per line ('#' comments)
    #[arg(short = 'l', long)]
    list: Option<PathBuf>,

    /// JSON detector config; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// VAD energy threshold (default 130)
    #[arg(short = 'e', long)]
    energy_threshold: Option<f64>,

    /// Consecutive voice to trigger start of voice (default 20)
    #[arg(short = 'v', long)]
    voice_ms: Option<u32>,

    /// Consecutive silence to trigger start of silence (default 500)
    #[arg(short = 's', long)]
    silence_ms: Option<u32>,

    /// Time to measure background level before adjusting. 0 disables (default 100)
    #[arg(short = 'i', long)]
    initial_adjust_ms: Option<u32>,

    /// Time after first voice for the second adjustment. 0 disables (default 50)
    #[arg(short = 'n', long)]
    voice_adjust_ms: Option<u32>,

    /// Maximum factor a single adjustment may raise the threshold by (default 3)
    #[arg(short = 'a', long)]
    adjust_limit: Option<f64>,

    /// Sample rate of raw input (default 8000; WAV files use their header)
    #[arg(short = 'r', long)]
    sample_rate: Option<u32>,

    /// Interleaved channels in raw input (WAV files use their header)
    #[arg(short = 'c', long, default_value_t = 1)]
    channels: u16,

    /// Voice longer than this is classified as machine (default 1100)
    #[arg(short = 'm', long)]
    machine_ms: Option<u32>,

    /// How long to wait for voice to begin (default 2000)
    #[arg(short = 'w', long)]
    wait_for_voice_ms: Option<u32>,

    /// Enable debug logging
    #[arg(short = 'd', long)]
    debug: bool,

    /// Print an accuracy summary for labelled recordings
    #[arg(short = 'R', long)]
    summarize: bool,

    /// Write per-file results and the summary as JSON
    #[arg(long)]
    json: Option<PathBuf>,
}

impl Args {
    fn detector_config(&self) -> Result<AmdConfig> {
        let mut config = match &self.config {
            Some(path) => AmdConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => AmdConfig::default(),
        };
        if let Some(v) = self.energy_threshold {
            config.vad.energy_threshold = v;
        }
        if let Some(v) = self.voice_ms {
            config.vad.voice_ms = v;
        }
        if let Some(v) = self.silence_ms {
            config.vad.silence_ms = v;
        }
        if let Some(v) = self.initial_adjust_ms {
            config.vad.initial_adjust_ms = v;
        }
        if let Some(v) = self.voice_adjust_ms {
            config.vad.voice_adjust_ms = v;
        }
        if let Some(v) = self.adjust_limit {
            config.vad.adjust_limit = v;
        }
        if let Some(v) = self.sample_rate {
            config.sample_rate = v;
        }
        if let Some(v) = self.machine_ms {
            config.machine_ms = v;
        }
        if let Some(v) = self.wait_for_voice_ms {
            config.silence_start_ms = v;
        }
        config.validate().context("invalid detector settings")?;
        if self.channels == 0 {
            bail!("option -c (channels) must be > 0");
        }
        Ok(config)
    }
}

/// Decoded recording.
struct Audio {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.eq_ignore_ascii_case("wav"))
}

fn read_audio(path: &Path, sample_rate: u32, channels: u16) -> Result<Audio> {
    if is_wav(path) {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            bail!(
                "{}: only 16-bit integer WAV is supported ({:?}, {} bits)",
                path.display(),
                spec.sample_format,
                spec.bits_per_sample
            );
        }
        let samples = reader.samples::<i16>().collect::<Result<Vec<_>, _>>()?;
        return Ok(Audio {
            samples,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        });
    }

    let bytes = fs::read(path)?;
    if bytes.len() % 2 != 0 {
        warn!(file = %path.display(), "odd byte count, dropping trailing byte");
    }
    let samples = bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    Ok(Audio {
        samples,
        sample_rate,
        channels,
    })
}

/// Classify one recording, stopping at the first AMD decision.
fn analyze_file(path: &Path, base: &AmdConfig, channels: u16) -> Result<FileResult> {
    let span = info_span!("file", name = %path.display());
    let _enter = span.enter();

    let audio = read_audio(path, base.sample_rate, channels)
        .with_context(|| format!("reading {}", path.display()))?;
    let config = AmdConfig {
        sample_rate: audio.sample_rate,
        ..base.clone()
    };
    let mut amd = Amd::new(config)?;

    let decided_at = Rc::new(Cell::new(None));
    let sink = Rc::clone(&decided_at);
    amd.set_event_handler(move |event: &AmdEvent| {
        debug!(time_ms = event.time_ms, "{}", event.kind);
        if sink.get().is_none() {
            sink.set(Some(event.time_ms));
        }
    });

    for buf in audio.samples.chunks(BUFFER_SAMPLES) {
        amd.process_buffer(buf, audio.channels)?;
        if amd.disposition() != Disposition::Unknown {
            break;
        }
    }
    amd.release();

    let result = amd.disposition();
    info!(%result, decided_at_ms = ?decided_at.get(), "classified");
    let file = path.display().to_string();
    Ok(FileResult {
        expected: expected_from_file_name(&file),
        file,
        result,
        decided_at_ms: decided_at.get(),
    })
}

fn list_entries(list: &Path) -> Result<Vec<PathBuf>> {
    let text = fs::read_to_string(list).with_context(|| format!("reading {}", list.display()))?;
    Ok(text
        .lines()
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PathBuf::from)
        .collect())
}

fn run(args: &Args) -> Result<()> {
    let config = args.detector_config()?;
    let files = match (&args.file, &args.list) {
        (Some(file), None) => vec![file.clone()],
        (None, Some(list)) => list_entries(list)?,
        _ => bail!("exactly one of -f or -l is required"),
    };

    let mut stats = Stats::default();
    for path in &files {
        let result = analyze_file(path, &config, args.channels)?;
        println!("{},{}", result.file, result.result);
        stats.record(result);
    }

    if args.summarize {
        if let Some(summary) = stats.summary() {
            print!("{}", summary.render());
        }
    }

    if let Some(out) = &args.json {
        let json = serde_json::to_string_pretty(&stats.to_report())?;
        fs::write(out, json).with_context(|| format!("writing {}", out.display()))?;
        info!(path = %out.display(), "wrote json report");
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    // ── Tracing ───────────────────────────────────────────────────────────
    let default_filter = if args.debug {
        "samd=debug,samd_core=debug"
    } else {
        "samd=info,samd_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&args) {
        eprintln!("samd: {e:#}");
        std::process::exit(1);
    }
}
