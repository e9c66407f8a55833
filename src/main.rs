use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use speech_session::audio::{AudioConfig, AudioProcessingOptions};
use speech_session::diagnostics::{Diagnostics, LogLevel};
use speech_session::events::{CancellationReason, RecognitionResult};
use speech_session::keyword::KeywordModel;
use speech_session::nats::NatsTransport;
use speech_session::session::{Recognizer, RecognizerOptions};
use speech_session::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "speech-session", about = "Streaming speech recognition over NATS")]
struct Cli {
    /// Configuration file, with or without extension
    #[arg(long, default_value = "config/speech-session")]
    config: String,

    /// Diagnostics threshold; overrides the config file
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Write diagnostics to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Only keep diagnostic lines containing one of these substrings
    #[arg(long = "filter")]
    filters: Vec<String>,

    /// Dump the in-memory diagnostics ring to this file on exit
    #[arg(long)]
    dump_memory: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recognize a single utterance
    Once { wav: PathBuf },
    /// Recognize utterances until the file ends or Ctrl-C
    Continuous { wav: PathBuf },
    /// Wait for a keyword, then recognize continuously
    Keyword {
        #[arg(long)]
        model: PathBuf,
        wav: PathBuf,
    },
}

impl Command {
    fn wav(&self) -> &PathBuf {
        match self {
            Command::Once { wav } | Command::Continuous { wav } | Command::Keyword { wav, .. } => wav,
        }
    }
}

/// Waits for Ctrl-C, or SIGTERM on Unix
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received");
}

fn setup_diagnostics(cli: &Cli, cfg: &Config) -> Result<Arc<Diagnostics>> {
    let diagnostics = Diagnostics::new();
    diagnostics.set_level(cli.log_level.unwrap_or(cfg.diagnostics.level));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(diagnostics.layer())
        .init();

    let filters = if cli.filters.is_empty() {
        cfg.diagnostics.filters.clone()
    } else {
        cli.filters.clone()
    };

    if let Some(path) = cli.log_file.as_ref().or(cfg.diagnostics.log_file.as_ref()) {
        diagnostics.file().set_filters(filters.clone());
        diagnostics
            .file()
            .start(path, cfg.diagnostics.append)
            .context("Failed to start diagnostics file sink")?;
    }
    if cfg.diagnostics.memory || cli.dump_memory.is_some() {
        diagnostics.memory().set_filters(filters);
        diagnostics.memory().start();
    }

    Ok(diagnostics)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::load(&cli.config).with_context(|| format!("Failed to load config {}", cli.config))?;
    let diagnostics = setup_diagnostics(&cli, &cfg)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let transport = Arc::new(
        NatsTransport::connect(&cfg.transport.nats_url)
            .await
            .context("Failed to connect to NATS")?,
    );

    let processing = if cfg.input.voice_activity_detection {
        AudioProcessingOptions::new(AudioProcessingOptions::ENABLE_VOICE_ACTIVITY_DETECTION)
    } else {
        AudioProcessingOptions::default()
    };
    let audio = AudioConfig::from_wav_file(cli.command.wav(), cfg.input.buffer_duration_ms)
        .with_processing(processing);

    let mut options = RecognizerOptions::new(cfg.recognizer_config(), audio).with_session(cfg.session_config());
    if let Some(auto_detect) = cfg.auto_detect() {
        options = options.with_auto_detect(auto_detect);
    }
    let recognizer = Recognizer::new(options, transport)?;

    recognizer.on_recognizing(|partial| info!("Recognizing: {}", partial.text));
    recognizer.on_recognized(|result| {
        info!("Recognized ({:?}): {}", result.reason, result.text);
        for (language, text) in &result.translations {
            info!("  [{}] {}", language, text);
        }
    });

    let finished = Arc::new(Notify::new());
    let notify = Arc::clone(&finished);
    recognizer.on_canceled(move |details| {
        if details.reason != CancellationReason::EndOfStream {
            warn!("Canceled: {:?} {:?}", details.error_code, details.error_details);
        }
        notify.notify_one();
    });

    match &cli.command {
        Command::Once { .. } => match recognizer.recognize_once().await? {
            RecognitionResult::Recognized(result) => println!("{}", result.text),
            RecognitionResult::Canceled(details) => warn!("No result: {:?}", details.reason),
        },
        Command::Continuous { .. } => {
            recognizer.start_continuous_recognition().await?;
            tokio::select! {
                _ = shutdown_signal() => {},
                _ = finished.notified() => {},
            }
            recognizer.stop_continuous_recognition().await?;
        }
        Command::Keyword { model, .. } => {
            let model = KeywordModel::from_file(model).context("Failed to load keyword model")?;
            info!("Listening for keyword '{}'", model.keyword());
            recognizer.start_keyword_recognition(model).await?;
            tokio::select! {
                _ = shutdown_signal() => {},
                _ = finished.notified() => {},
            }
            recognizer.stop_keyword_recognition().await?;
        }
    }

    let stats = recognizer.stats();
    info!(
        "Session {}: {} utterances, {} frames sent, {} cancellations",
        stats.session_id, stats.utterances_recognized, stats.frames_sent, stats.cancellations
    );
    recognizer.close().await?;

    if let Some(path) = &cli.dump_memory {
        diagnostics
            .memory()
            .dump_to_file(path)
            .context("Failed to dump diagnostics")?;
    }
    diagnostics.shutdown();

    Ok(())
}
