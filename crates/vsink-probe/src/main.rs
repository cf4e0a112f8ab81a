//! vsink-probe: exercise a shared memory frame segment from the command line.
//!
//! ```text
//! vsink-probe produce --width 640 --height 480 --frames 300 --fps 30
//! vsink-probe consume /video-sink_shm_1234_0 --frames 10 --dump last.raw
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use video_sink::settings::store::load_settings;
use video_sink::{EventCallback, PixelFormat, SinkClient, SinkEvent, VideoFrame};
use vsink_shared::{FrameReader, ReadOutcome};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vsink-probe", about = "Shared memory frame sink probe")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish a moving test pattern through a sink.
    Produce {
        #[arg(long, default_value_t = 640)]
        width: u32,
        #[arg(long, default_value_t = 480)]
        height: u32,
        /// Number of frames to publish.
        #[arg(long, default_value_t = 300)]
        frames: u64,
        #[arg(long, default_value_t = 30)]
        fps: u32,
        /// Explicit segment name (generated when omitted).
        #[arg(long)]
        name: Option<String>,
        /// Sink settings JSON file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Follow the consumer read protocol on an existing segment.
    Consume {
        name: String,
        /// Stop after this many frames (runs until shutdown when omitted).
        #[arg(long)]
        frames: Option<u64>,
        /// Write the last frame's raw bytes to this file.
        #[arg(long)]
        dump: Option<PathBuf>,
        /// Give up after this many seconds without a frame.
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
}

// ── Main ─────────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("vsink-probe v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Produce {
            width,
            height,
            frames,
            fps,
            name,
            config,
        } => produce(width, height, frames, fps, name, config),
        Command::Consume {
            name,
            frames,
            dump,
            timeout,
        } => consume(&name, frames, dump, Duration::from_secs(timeout)),
    }
}

// ── Produce ──────────────────────────────────────────────────────

fn produce(
    width: u32,
    height: u32,
    frames: u64,
    fps: u32,
    name: Option<String>,
    config: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = match config {
        Some(path) => load_settings(&path)?,
        None => Default::default(),
    };
    settings.apply_env_overrides();
    if name.is_some() {
        settings.segment_name = name;
    }
    settings.shm_enabled = true;

    let sink = SinkClient::new("probe", settings);
    let on_event: EventCallback = Arc::new(|event: &SinkEvent| info!("event: {event:?}"));
    sink.set_event_callback(Some(on_event));
    if !sink.start() {
        return Err("could not create shared memory segment".into());
    }
    // Consumers take the name from stdout.
    println!("{}", sink.opened_name());

    let interval = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
    let started = Instant::now();
    for index in 0..frames {
        let frame = test_pattern(width, height, index)
            .with_timestamp(started.elapsed().as_micros() as u64);
        sink.deliver(&frame);

        let next = interval.mul_f64((index + 1) as f64);
        if let Some(wait) = next.checked_sub(started.elapsed()) {
            thread::sleep(wait);
        }
    }

    info!("diagnostics: {:?}", sink.diagnostics());
    sink.stop();
    Ok(())
}

/// RGB24 gradient with a vertical bar that moves one column per frame.
fn test_pattern(width: u32, height: u32, index: u64) -> VideoFrame {
    let bar = (index % u64::from(width.max(1))) as u32;
    let mut data = Vec::with_capacity(pattern_len(width, height));
    for y in 0..height {
        for x in 0..width {
            if x == bar {
                data.extend_from_slice(&[255, 255, 255]);
            } else {
                let shade = [(x % 256) as u8, (y % 256) as u8, (index % 256) as u8];
                data.extend_from_slice(&shade);
            }
        }
    }
    VideoFrame::new(data, width, height, PixelFormat::Rgb24)
}

fn pattern_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

// ── Consume ──────────────────────────────────────────────────────

fn consume(
    name: &str,
    frames: Option<u64>,
    dump: Option<PathBuf>,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut reader = FrameReader::open(name)?;
    info!("following '{}'", reader.name());

    let mut received = 0u64;
    let mut last_generation = None;
    let mut last_frame = None;

    loop {
        if frames.is_some_and(|limit| received >= limit) {
            break;
        }
        match reader.wait(Some(timeout))? {
            ReadOutcome::Frame(frame) => {
                if last_generation == Some(frame.generation) {
                    // Accumulated post for a frame already read.
                    continue;
                }
                received += 1;
                info!("generation {} ({} bytes)", frame.generation, frame.data.len());
                last_generation = Some(frame.generation);
                last_frame = Some(frame);
            }
            ReadOutcome::Shutdown => {
                info!("producer shut down");
                break;
            }
            ReadOutcome::TimedOut => {
                warn!("no frame within {timeout:?}");
                break;
            }
        }
    }

    if let (Some(path), Some(frame)) = (dump, last_frame) {
        std::fs::write(&path, &frame.data)?;
        info!("wrote generation {} to {}", frame.generation, path.display());
    }
    info!("received {received} frames");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_fills_every_pixel_and_moves_the_bar() {
        let frame = test_pattern(5, 2, 7);
        assert_eq!(frame.data().len(), 5 * 2 * 3);
        // Bar at column 7 % 5 on every row.
        for y in 0..2 {
            let i = (y * 5 + 2) * 3;
            assert_eq!(&frame.data()[i..i + 3], &[255, 255, 255]);
        }
        assert_eq!(&frame.data()[3..6], &[1, 0, 7]);
    }

    #[test]
    fn pattern_len_does_not_wrap_for_large_geometry() {
        // 37838 * 37838 * 3 overflows u32.
        assert_eq!(pattern_len(37_838, 37_838), 4_295_142_732);
        assert_eq!(pattern_len(640, 480), 921_600);
    }
}
