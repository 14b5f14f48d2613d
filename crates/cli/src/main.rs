#![deny(warnings)]

mod samples;

use anyhow::Context;
use clap::{Parser, Subcommand};
use emotion_timeline_core::config::{
    resolve_chunk_duration, resolve_optional_path, timeout_from_secs, AnalysisConfig,
    ChunkingConfig, ClassifierConfig, Concurrency, ConfigError, DecodeConfig, Env, StdEnv,
    TrailingChunkPolicy, DEFAULT_INTRA_THREADS, ENV_MODEL_PATH,
};
use emotion_timeline_core::decode::AudioInput;
use emotion_timeline_core::emotion::ClassifierSlot;
use emotion_timeline_core::timeline::format_timestamp;
use emotion_timeline_core::{AnalysisError, AnalysisReport, Analyzer, CancelSignal};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "emotion-timeline")]
#[command(about = "Speech emotion timeline (chunk -> classify -> aggregate)")]
struct Cli {
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze one recording and print the timeline.
    Analyze(AnalyzeArgs),
    /// Write synthetic test recordings.
    Samples(SamplesArgs),
}

#[derive(clap::Args, Debug)]
struct AnalyzeArgs {
    file: PathBuf,

    /// Chunk length in seconds (falls back to EMOTION_CHUNK_DURATION, then 3.0).
    #[arg(long)]
    chunk_duration: Option<f64>,

    /// Drop a final chunk shorter than this many seconds.
    #[arg(long, conflicts_with = "keep_short_tail")]
    min_trailing: Option<f64>,

    /// Keep the final chunk however short it is.
    #[arg(long)]
    keep_short_tail: bool,

    /// ONNX emotion model (falls back to EMOTION_MODEL_PATH).
    #[arg(long)]
    model: Option<PathBuf>,

    /// Skip the learned model and use the rule-based classifier.
    #[arg(long)]
    no_model: bool,

    #[arg(long)]
    no_ffmpeg: bool,

    #[arg(long)]
    allow_ffmpeg_download: bool,

    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    #[arg(long, default_value_t = DEFAULT_INTRA_THREADS)]
    intra_threads: usize,

    /// Abort the analysis after this many seconds.
    #[arg(long)]
    timeout_secs: Option<f64>,

    #[arg(long)]
    pretty: bool,

    /// Print a human-readable timeline instead of JSON.
    #[arg(long)]
    summary: bool,
}

#[derive(clap::Args, Debug)]
struct SamplesArgs {
    #[arg(default_value = "sample_audio")]
    dir: PathBuf,

    #[arg(long, default_value_t = 7)]
    seed: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    match cli.command {
        Command::Analyze(args) => analyze(args).await,
        Command::Samples(args) => {
            for path in samples::write_sample_set(&args.dir, args.seed)? {
                tracing::info!(path = %path.display(), "wrote sample");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn analyze(args: AnalyzeArgs) -> anyhow::Result<ExitCode> {
    let env = StdEnv;
    let outcome = match build_config(&args, &env) {
        Ok((cfg, timeout)) => {
            tracing::info!(
                chunk_secs = cfg.chunking.duration.secs(),
                workers = cfg.concurrency.get(),
                learned = cfg.classifier.learned_enabled,
                "config loaded"
            );
            run_analysis(&args.file, cfg, timeout).await
        }
        Err(e) => Err(AnalysisError::from(e)),
    };

    match outcome {
        Ok(report) => {
            let out = if args.summary {
                render_summary(&report)?
            } else {
                to_json(&report, args.pretty)?
            };
            println!("{out}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!(kind = %e.kind(), error = %e, "analysis failed");
            println!("{}", to_json(&e.report(), args.pretty)?);
            Ok(ExitCode::from(exit_status(&e)))
        }
    }
}

async fn run_analysis(
    file: &Path,
    cfg: AnalysisConfig,
    timeout: Option<Duration>,
) -> Result<AnalysisReport, AnalysisError> {
    let slot = ClassifierSlot::new(cfg.classifier.clone());
    // Model load blocks; keep it off the async workers.
    let classifier =
        tokio::task::block_in_place(|| slot.get()).ok_or(AnalysisError::Cancelled)?;
    let analyzer = Analyzer::new(cfg, classifier);

    let cancel = timeout.map(CancelSignal::with_timeout).unwrap_or_default();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling analysis");
                cancel.cancel();
            }
        })
    };

    let result = analyzer
        .analyze(AudioInput::path(file), None, &cancel)
        .await;
    interrupt.abort();
    slot.shutdown();
    result
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_config(
    args: &AnalyzeArgs,
    env: &impl Env,
) -> Result<(AnalysisConfig, Option<Duration>), ConfigError> {
    let duration = resolve_chunk_duration(args.chunk_duration, env)?;
    let trailing = match (args.keep_short_tail, args.min_trailing) {
        (true, _) => TrailingChunkPolicy::Keep,
        (false, Some(secs)) => TrailingChunkPolicy::drop_shorter_than(secs)?,
        (false, None) => TrailingChunkPolicy::default(),
    };
    let concurrency = Concurrency::new(args.concurrency)?;
    let timeout = args.timeout_secs.map(timeout_from_secs).transpose()?;

    let classifier = ClassifierConfig {
        model_path: resolve_optional_path(args.model.clone(), ENV_MODEL_PATH, env),
        learned_enabled: !args.no_model,
        intra_threads: args.intra_threads.max(1),
    };
    let decode = DecodeConfig {
        ffmpeg_fallback: !args.no_ffmpeg,
        allow_ffmpeg_download: args.allow_ffmpeg_download,
    };

    Ok((
        AnalysisConfig {
            chunking: ChunkingConfig { duration, trailing },
            classifier,
            decode,
            concurrency,
        },
        timeout,
    ))
}

/// 2 for bad requests, 1 for failures on our side.
fn exit_status(e: &AnalysisError) -> u8 {
    if e.is_caller_fault() {
        2
    } else {
        1
    }
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<String> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(out)
}

fn render_summary(report: &AnalysisReport) -> anyhow::Result<String> {
    let stats = &report.statistics;
    let mut out = String::new();
    writeln!(out, "classifier: {}", report.classifier)?;
    writeln!(
        out,
        "duration:   {} ({} chunks)",
        format_timestamp(stats.total_duration),
        report.results.len()
    )?;
    writeln!(out, "dominant:   {}", stats.dominant_emotion)?;

    writeln!(out, "\ntimeline:")?;
    for r in &report.results {
        writeln!(
            out,
            "  {}-{}  {:<9} {:>5.1}%",
            format_timestamp(r.start_time),
            format_timestamp(r.end_time),
            r.emotion,
            r.confidence * 100.0
        )?;
    }

    if !report.emotion_changes.is_empty() {
        writeln!(out, "\nchanges:")?;
        for c in &report.emotion_changes {
            writeln!(
                out,
                "  {}  {} -> {} ({:.2})",
                format_timestamp(c.timestamp),
                c.from_emotion,
                c.to_emotion,
                c.confidence
            )?;
        }
    }

    writeln!(out, "\ndistribution:")?;
    for (emotion, secs) in &stats.emotion_durations {
        let pct = stats.emotion_percentages.get(emotion).copied().unwrap_or(0.0);
        let count = stats.emotion_counts.get(emotion).copied().unwrap_or(0);
        writeln!(out, "  {emotion:<9} {count:>3} x  {secs:>6.1} s  {pct:>5.1}%")?;
    }
    Ok(out.trim_end().to_owned())
}
