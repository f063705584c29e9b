//! Command-line player built on the `mediacore` engine.
//!
//! This binary wires the library's pieces together: a [`FileSource`] or
//! [`HttpSource`], a [`Controller`] driving the pipeline, and a
//! [`RodioAudioSink`] for output. It exists to exercise the library and
//! give it a runnable shape, not as a feature-complete media player.

use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueHint};
use log::{debug, error, info, LevelFilter};
use url::Url;

use mediacore::config::Config;
use mediacore::controller::Controller;
use mediacore::error::{Error, Result};
use mediacore::events::ErrorEvent;
use mediacore::output::{self, RodioAudioSink};
use mediacore::signal::{self, ShutdownSignal};
use mediacore::source::{FileSource, HttpSource, Source};

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Interval between presentation ticks and packet-pump iterations.
///
/// The controller's own cooperative yields (demuxer reads, decoder
/// drain loops) happen inside `pump_once`; this is just the cadence at
/// which the main loop drives the state machine forward.
const TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Command-line arguments.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path or URL of the media file to play.
    ///
    /// Use "?" to list available stereo 44.1/48 kHz output devices and
    /// exit.
    #[arg(value_hint = ValueHint::AnyPath)]
    input: String,

    /// Select the audio output device.
    ///
    /// Format: `[<host>][|<device>][|<sample rate>][|<sample format>]`.
    /// If omitted, uses the system default output device.
    #[arg(short, long, env = "MEDIACORE_DEVICE")]
    device: Option<String>,

    /// Path to a TOML configuration file.
    #[arg(short, long, value_hint = ValueHint::FilePath, env = "MEDIACORE_CONFIG")]
    config: Option<String>,

    /// Decoder fallback policy: `auto` or `manual`.
    #[arg(
        long,
        value_parser = clap::value_parser!(mediacore::config::FallbackPolicyConfig),
        env = "MEDIACORE_FALLBACK_POLICY"
    )]
    fallback_policy: Option<mediacore::config::FallbackPolicyConfig>,

    /// Loop playback on reaching the end of the stream.
    #[arg(long, default_value_t = false, env = "MEDIACORE_LOOP")]
    r#loop: bool,

    /// Suppress all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING, env = "MEDIACORE_QUIET")]
    quiet: bool,

    /// Enable verbose logging. Use -v for debug, -vv for trace.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING, env = "MEDIACORE_VERBOSE")]
    verbose: u8,
}

/// Configures `env_logger` from the parsed verbosity, matching this
/// crate's own modules against the demux/decode backend's log noise.
fn init_logger(args: &Args) {
    let mut logger = env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let mut external_level = LevelFilter::Error;
    if args.quiet || args.verbose > 0 {
        let level = match args.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::max(),
        };

        logger.filter_module(module_path!(), level);
        logger.filter_module("mediacore", level);

        if level == LevelFilter::Trace {
            external_level = LevelFilter::max();
        }
    }

    for external_module in [
        "symphonia",
        "symphonia_bundle_flac",
        "symphonia_bundle_mp3",
        "symphonia_codec_aac",
        "symphonia_codec_pcm",
        "symphonia_core",
        "symphonia_format_isomp4",
        "symphonia_format_riff",
        "symphonia_metadata",
        "symphonia_utils_xiph",
        "ffmpeg",
    ] {
        logger.filter_module(external_module, external_level);
    }

    logger.init();
}

/// Loads configuration from `path`, or returns defaults if `path` is
/// `None`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or isn't valid TOML.
fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Config::from_toml(&text)
        }
        None => Ok(Config::default()),
    }
}

/// Builds a [`Source`] from a path or URL, distinguishing by whether
/// `input` parses as an absolute HTTP(S) URL.
fn open_source(input: &str) -> Result<Arc<dyn Source>> {
    if let Ok(url) = Url::parse(input) {
        if url.scheme() == "http" || url.scheme() == "https" {
            return Ok(Arc::new(HttpSource::new(url)?));
        }
    }
    Ok(Arc::new(FileSource::open(Path::new(input))?))
}

/// Runs the engine to completion: loads the source, plays until the
/// stream ends or a shutdown signal arrives, logging state transitions
/// and errors as they occur.
async fn run(args: Args) -> Result<ShutdownSignal> {
    if args.input == "?" {
        let devices = output::enumerate_devices();
        if devices.is_empty() {
            return Err(Error::not_found("no audio output devices found"));
        }
        info!("available audio output devices:");
        for device in devices {
            info!("- {device}");
        }
        return Ok(ShutdownSignal::Interrupt);
    }

    let mut config = load_config(args.config.as_deref())?;
    if let Some(policy) = args.fallback_policy {
        config.fallback_policy = policy;
    }
    if args.device.is_some() {
        config.device.clone_from(&args.device);
    }

    let mut controller = Controller::new(&config);
    controller.set_loop(args.r#loop);

    let events = controller.events();
    events.state_change.subscribe(|state| debug!("state -> {state:?}"));
    events.error.subscribe(|event: &ErrorEvent| {
        error!("{:?}: {}", event.kind, event.message);
    });

    let audio_sink = RodioAudioSink::open(config.device.as_deref().unwrap_or_default())?;
    controller.set_sinks(None, Some(Box::new(audio_sink)), None);

    let source = open_source(&args.input)?;
    info!("loading {}", args.input);
    controller.load(source).await?;
    controller.play().await?;

    let mut signals = signal::Handler::new()?;
    let mut ticker = tokio::time::interval(TICK_INTERVAL);

    loop {
        tokio::select! {
            biased;

            signal = signals.recv() => {
                info!("received {signal}, shutting down");
                controller.close();
                return Ok(signal);
            }

            _ = ticker.tick() => {
                let has_more = controller.pump_once().await?;
                controller.tick();
                if !has_more && controller.state() == mediacore::controller::State::Ended {
                    info!("playback finished");
                    controller.close();
                    return Ok(ShutdownSignal::Terminate);
                }
            }
        }
    }
}

/// Application entry point.
#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(&args);
    debug!("arguments: {args:?}");

    let mut version = env!("CARGO_PKG_VERSION").to_owned();
    if let Some(hash) = option_env!("MEDIACORE_COMMIT_HASH") {
        version.push_str(&format!(".{hash}"));
    }
    if let Some(date) = option_env!("MEDIACORE_COMMIT_DATE") {
        version.push_str(&format!(" ({date})"));
    }
    info!("starting {}/{version}", env!("CARGO_PKG_NAME"));

    match run(args).await {
        Ok(_signal) => {
            info!("shut down gracefully");
            process::exit(0);
        }
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    }
}
