//! Entry point for the manga narrator.
//!
//! Responsibilities here are intentionally minimal:
//! - Parse command-line arguments.
//! - Load user configuration from `conf/config.toml` (or `--config`).
//! - Wire the OCR sidecar, speech command and PDF converter into the core.
//! - Analyse the pages, then narrate them while printing playback events.

mod console;
mod pdf;
mod sidecar;
mod speech;

use crate::pdf::PdftoppmConverter;
use crate::sidecar::SidecarClient;
use crate::speech::CommandSpeech;
use anyhow::{Context, Result, anyhow};
use narrator_core::cache::{Bookmark, CacheStore, source_key};
use narrator_core::config::{AppConfig, PlaybackMode, load_config, serialize_config};
use narrator_core::playback::{
    PlaybackContent, PlaybackController, PlaybackEvent, PlaybackStatus, Strip,
};
use narrator_core::services::{
    FaceDetector, NoFaces, NoText, PdfConverter, SpeechEngine, TextRecognizer,
};
use narrator_core::{CancellationToken, NoContentError, PageAnalyzer};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

const USAGE: &str = "Usage: manga-narrator [--config <path>] [--mode paged|continuous] \
                     [--from-start] [--print-config] <image-or-pdf>...";

#[derive(Debug, Clone, PartialEq)]
struct CliArgs {
    sources: Vec<String>,
    config_path: PathBuf,
    mode: Option<PlaybackMode>,
    from_start: bool,
    print_config: bool,
}

fn main() {
    let reload_handle = init_tracing();
    if let Err(err) = run(&reload_handle) {
        error!("{err:?}");
        std::process::exit(1);
    }
}

fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let args = parse_args(env::args().skip(1))?;
    let config = load_config(&args.config_path);
    set_log_level(reload_handle, config.logging.log_level.as_filter_str());
    if args.print_config {
        println!("{}", serialize_config(&config)?);
        return Ok(());
    }
    info!(
        sources = args.sources.len(),
        level = %config.logging.log_level,
        mode = %args.mode.unwrap_or(config.playback.mode),
        "Starting manga narrator"
    );
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    runtime.block_on(narrate(args, config))
}

async fn narrate(args: CliArgs, config: AppConfig) -> Result<()> {
    let cache = CacheStore::from_config(&config.cache);
    let converter = PdftoppmConverter::from_config(&config.services, &config.cache);
    let sources = expand_sources(&args.sources, &converter)?;
    if sources.is_empty() {
        return Err(NoContentError::NoPages.into());
    }

    let (recognizer, faces) = engines(&config)?;
    let analyzer = Arc::new(PageAnalyzer::new(&config, recognizer, faces));
    let speech = Arc::new(CommandSpeech::new(&config.tts));

    let (interrupt_tx, mut interrupts) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(());
    })
    .context("Failed to install the Ctrl-C handler")?;

    let mode = args.mode.unwrap_or(config.playback.mode);
    let content = if mode == PlaybackMode::Continuous && sources.len() == 1 {
        let image = analyzer.loader().load(&sources[0])?;
        let scaled = analyzer.scaler().scale(image.bitmap)?;
        info!(
            width = scaled.bitmap.width(),
            height = scaled.bitmap.height(),
            "Narrating strip viewport by viewport"
        );
        PlaybackContent::Strip(Strip {
            source: image.source,
            bitmap: scaled.bitmap,
            analyzer: Arc::clone(&analyzer),
        })
    } else {
        if mode == PlaybackMode::Continuous {
            info!(
                pages = sources.len(),
                "Continuous mode reads a single image; analysing pages instead"
            );
        }
        let cancel = CancellationToken::new();
        let report = tokio::select! {
            report = analyzer.analyze_session(&sources, &cancel) => report?,
            _ = interrupts.recv() => {
                cancel.cancel();
                warn!("Interrupted during analysis");
                return Ok(());
            }
        };
        console::print_report(&report);
        PlaybackContent::Pages(report.pages)
    };

    let (controller, mut events) = prepare_playback(content, speech, &config).await?;
    let key = source_key(&sources);
    if !args.from_start {
        if let Some(bookmark) = cache.as_ref().and_then(|c| c.load_bookmark(&key)) {
            if controller.restore(&bookmark) {
                info!(
                    page = bookmark.page,
                    bubble = bookmark.bubble,
                    "Resuming from bookmark"
                );
            }
        }
    }

    controller.play();
    let mut finished = false;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                console::print_event(&event);
                if event == PlaybackEvent::StateChanged(PlaybackStatus::Finished) {
                    finished = true;
                    break;
                }
            }
            _ = interrupts.recv() => {
                controller.pause();
                info!("Interrupted; playback paused");
                break;
            }
        }
    }

    if let Some(cache) = &cache {
        let bookmark = if finished {
            Bookmark::default()
        } else {
            controller.bookmark()
        };
        cache.save_bookmark(&key, &bookmark);
    }
    Ok(())
}

/// Build the controller on the blocking pool: listing voices runs the
/// speech command synchronously.
async fn prepare_playback(
    content: PlaybackContent,
    speech: Arc<dyn SpeechEngine>,
    config: &AppConfig,
) -> Result<(PlaybackController, mpsc::UnboundedReceiver<PlaybackEvent>)> {
    let playback = config.playback.clone();
    let tts = config.tts.clone();
    tokio::task::spawn_blocking(move || PlaybackController::new(content, speech, playback, &tts))
        .await
        .context("Failed to prepare playback")
}

/// OCR and face engines: the sidecar when configured, otherwise stand-ins
/// that find nothing.
fn engines(config: &AppConfig) -> Result<(Arc<dyn TextRecognizer>, Arc<dyn FaceDetector>)> {
    match &config.services.sidecar_command {
        Some(command) => {
            let client = Arc::new(SidecarClient::spawn(
                command,
                &config.services.sidecar_args,
            )?);
            let recognizer: Arc<dyn TextRecognizer> = client.clone();
            let faces: Arc<dyn FaceDetector> = client;
            Ok((recognizer, faces))
        }
        None => {
            warn!("No OCR sidecar configured; set [services] sidecar_command to detect bubbles");
            let recognizer: Arc<dyn TextRecognizer> = Arc::new(NoText);
            let faces: Arc<dyn FaceDetector> = Arc::new(NoFaces);
            Ok((recognizer, faces))
        }
    }
}

/// Replace PDFs by their rendered page images, keeping argument order.
fn expand_sources(sources: &[String], converter: &dyn PdfConverter) -> Result<Vec<String>> {
    let mut pages = Vec::new();
    for source in sources {
        let path = Path::new(source);
        let is_pdf = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if is_pdf {
            let rendered = converter
                .convert(path)
                .with_context(|| format!("Failed to convert {source}"))?;
            info!(pdf = %source, pages = rendered.len(), "Rendered PDF pages");
            pages.extend(
                rendered
                    .into_iter()
                    .map(|page| page.to_string_lossy().into_owned()),
            );
        } else {
            pages.push(source.clone());
        }
    }
    Ok(pages)
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut parsed = CliArgs {
        sources: Vec::new(),
        config_path: PathBuf::from("conf/config.toml"),
        mode: None,
        from_start: false,
        print_config: false,
    };
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("--config needs a path\n{USAGE}"))?;
                parsed.config_path = PathBuf::from(path);
            }
            "--mode" => {
                let mode = args
                    .next()
                    .ok_or_else(|| anyhow!("--mode needs a value\n{USAGE}"))?;
                parsed.mode = Some(match mode.as_str() {
                    "paged" => PlaybackMode::Paged,
                    "continuous" => PlaybackMode::Continuous,
                    other => return Err(anyhow!("Unknown mode: {other}\n{USAGE}")),
                });
            }
            "--from-start" => parsed.from_start = true,
            "--print-config" => parsed.print_config = true,
            "-h" | "--help" => return Err(anyhow!(USAGE)),
            flag if flag.starts_with("--") => {
                return Err(anyhow!("Unknown option: {flag}\n{USAGE}"));
            }
            _ => parsed.sources.push(arg),
        }
    }
    if parsed.sources.is_empty() && !parsed.print_config {
        return Err(anyhow!(USAGE));
    }
    Ok(parsed)
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr)
                .with_filter(filter_layer),
        )
        .init();
    warn!("Logging initialized; override level with [logging] log_level or RUST_LOG");
    handle
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("debug"));
    if let Err(err) = handle.modify(|filter| *filter = parsed.clone()) {
        warn!(%level, "Failed to update log level from config: {err}");
    } else {
        info!(%level, "Applied log level from config");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<CliArgs> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_flags_and_sources_in_order() {
        let parsed = args(&[
            "--config",
            "my.toml",
            "a.png",
            "--mode",
            "continuous",
            "b.pdf",
            "--from-start",
        ])
        .unwrap();
        assert_eq!(parsed.sources, vec!["a.png", "b.pdf"]);
        assert_eq!(parsed.config_path, PathBuf::from("my.toml"));
        assert_eq!(parsed.mode, Some(PlaybackMode::Continuous));
        assert!(parsed.from_start);
    }

    #[test]
    fn rejects_missing_sources_and_unknown_flags() {
        assert!(args(&[]).is_err());
        assert!(args(&["--mode", "sideways", "a.png"]).is_err());
        assert!(args(&["--volume", "a.png"]).is_err());
        assert!(args(&["--print-config"]).is_ok());
    }

    struct FakeConverter;

    impl PdfConverter for FakeConverter {
        fn convert(&self, pdf: &Path) -> Result<Vec<PathBuf>> {
            let stem = pdf.file_stem().unwrap().to_string_lossy().into_owned();
            Ok(vec![
                PathBuf::from(format!("{stem}-1.png")),
                PathBuf::from(format!("{stem}-2.png")),
            ])
        }
    }

    /// Remembers which thread listed its voices.
    #[derive(Default)]
    struct ThreadRecordingSpeech {
        listed_on: std::sync::Mutex<Option<std::thread::ThreadId>>,
    }

    impl SpeechEngine for ThreadRecordingSpeech {
        fn speak(
            &self,
            _utterance: narrator_core::services::Utterance,
        ) -> tokio::sync::oneshot::Receiver<narrator_core::services::UtteranceOutcome> {
            tokio::sync::oneshot::channel().1
        }

        fn stop(&self) {}

        fn voices(&self) -> Vec<narrator_core::services::Voice> {
            *self.listed_on.lock().unwrap() = Some(std::thread::current().id());
            Vec::new()
        }
    }

    #[tokio::test]
    async fn voices_are_listed_off_the_runtime_thread() {
        let speech = Arc::new(ThreadRecordingSpeech::default());
        let (controller, _events) = prepare_playback(
            PlaybackContent::Pages(Vec::new()),
            speech.clone(),
            &AppConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(controller.state().status, PlaybackStatus::Stopped);
        let listed_on = speech.listed_on.lock().unwrap().unwrap();
        assert_ne!(listed_on, std::thread::current().id());
    }

    #[test]
    fn pdfs_expand_in_place() {
        let sources = vec![
            "cover.jpg".to_string(),
            "vol1.PDF".to_string(),
            "back.png".to_string(),
        ];
        let expanded = expand_sources(&sources, &FakeConverter).unwrap();
        assert_eq!(
            expanded,
            vec!["cover.jpg", "vol1-1.png", "vol1-2.png", "back.png"]
        );
    }
}
