//! harness-replay - play a BioHarness capture through the engine
//!
//! Prints every delayed sample and event as one JSON object per line and a
//! summary of the run on stderr.

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bioharness::{BioHarness, EngineConfig, SignalKind};

/// Replay a raw BioHarness byte dump
#[derive(Parser)]
#[command(name = "harness-replay")]
#[command(version)]
#[command(about = "Replay a captured BioHarness byte stream", long_about = None)]
struct Cli {
    /// Raw byte dump of the serial link
    dump: PathBuf,

    /// Timing index (.csv or .json) to replay at the recorded pace
    #[arg(short, long)]
    timing: Option<PathBuf>,

    /// Engine configuration (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Playback delay in seconds, overriding the configuration
    #[arg(long)]
    delay: Option<f64>,

    /// Keep device timestamps instead of mapping them onto the host clock
    #[arg(long)]
    no_clock_correction: bool,

    /// Print events only, no waveform samples
    #[arg(long)]
    events_only: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(delay) = cli.delay {
        config.player.default_delay_secs = delay;
    }
    if cli.no_clock_correction {
        config.clock.correction_enabled = false;
    }

    info!("Replaying {}", cli.dump.display());
    let (session, mut samples) = BioHarness::replay(&cli.dump, cli.timing.as_deref(), config)
        .with_context(|| format!("opening {}", cli.dump.display()))?;

    let events_only = cli.events_only;
    let printer = tokio::spawn(async move {
        let mut out = std::io::stdout();
        let mut printed = 0u64;
        while let Some((stream, sample)) = samples.next().await {
            if events_only && SignalKind::from_name(&stream).is_some() {
                continue;
            }
            let line = serde_json::json!({
                "stream": stream,
                "index": sample.index,
                "timestamp": sample.timestamp,
                "value": sample.value,
            });
            writeln!(out, "{}", line)?;
            printed += 1;
        }
        out.flush()?;
        Ok::<_, std::io::Error>(printed)
    });

    let stats = session.finish().await.context("replay failed")?;
    let printed = printer.await.context("output task failed")??;

    eprintln!(
        "{}",
        serde_json::json!({
            "bytes": stats.driver.bytes_read,
            "frames": stats.driver.frames,
            "framing_errors": stats.driver.framing_errors,
            "messages": stats.driver.messages,
            "ignored_frames": stats.driver.ignored_frames,
            "discontinuities": stats.driver.pipeline.discontinuities,
            "heartbeat_intervals": stats.driver.pipeline.heartbeat_intervals,
            "heartbeat_overflows": stats.driver.pipeline.heartbeat_overflows,
            "delivered": stats.player.delivered,
            "printed": printed,
        })
    );
    Ok(())
}
