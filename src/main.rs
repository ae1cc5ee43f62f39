//! vrclog - Structured events from VRChat log files.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Local};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vrclog::config::{ConfigError, ConfigLoader, ReplayKind, VrclogConfig};
use vrclog::display::{self, OutputFormat};
use vrclog::parser::ChainMode;
use vrclog::watcher::{EventFilter, Watcher, WatcherError};
use vrclog::{OfflineParser, VrcParser};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ChainArg {
    All,
    First,
    ContinueOnError,
}

impl From<ChainArg> for ChainMode {
    fn from(arg: ChainArg) -> Self {
        match arg {
            ChainArg::All => ChainMode::All,
            ChainArg::First => ChainMode::First,
            ChainArg::ContinueOnError => ChainMode::ContinueOnError,
        }
    }
}

#[derive(Parser)]
#[command(name = "vrclog", about = "Structured events from VRChat log files", version)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (default: ./vrclog.toml, then the user config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the active log file and print events.
    Tail {
        /// Log directory (default: auto-detect).
        #[arg(long)]
        log_dir: Option<PathBuf>,
        /// Replay the last N lines before following.
        #[arg(long, value_name = "N", conflicts_with_all = ["from_start", "since"])]
        replay_last: Option<usize>,
        /// Replay the whole file before following.
        #[arg(long, conflicts_with = "since")]
        from_start: bool,
        /// Replay events at or after this RFC 3339 time.
        #[arg(long, value_parser = parse_since)]
        since: Option<DateTime<Local>>,
        /// Wait for a log file to appear instead of failing.
        #[arg(long)]
        wait: bool,
        /// Rotation check interval in milliseconds.
        #[arg(long)]
        poll_interval_ms: Option<u64>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Parse a log file, or every log file in a directory, and exit.
    Parse {
        /// Log file or directory.
        path: PathBuf,
        /// Only events at or after this RFC 3339 time.
        #[arg(long, value_parser = parse_since)]
        since: Option<DateTime<Local>>,
        /// Fail on the first line a parser rejects.
        #[arg(long)]
        stop_on_error: bool,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Only emit these event types.
    #[arg(long = "include", value_name = "TYPE")]
    include: Vec<String>,
    /// Never emit these event types.
    #[arg(long = "exclude", value_name = "TYPE")]
    exclude: Vec<String>,
    /// YAML pattern file (repeatable).
    #[arg(long = "pattern", value_name = "FILE")]
    patterns: Vec<PathBuf>,
    /// How the built-in parser and pattern files are combined.
    #[arg(long, value_enum)]
    chain_mode: Option<ChainArg>,
    /// Include the source line in every event.
    #[arg(long)]
    raw_line: bool,
    /// Output format.
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
}

impl CommonArgs {
    fn apply(self, config: &mut VrclogConfig) {
        if !self.include.is_empty() {
            config.include_types = self.include;
        }
        if !self.exclude.is_empty() {
            config.exclude_types = self.exclude;
        }
        config.patterns.extend(self.patterns);
        if let Some(mode) = self.chain_mode {
            config.chain_mode = mode.into();
        }
        if self.raw_line {
            config.include_raw_line = true;
        }
        if let Some(format) = self.format {
            config.output = format;
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Watcher(#[from] WatcherError),

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

fn parse_since(value: &str) -> Result<DateTime<Local>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Local))
        .map_err(|e| format!("expected an RFC 3339 time: {e}"))
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down");
            token.cancel();
        }
    });
    cancel
}

async fn tail(config: VrclogConfig) -> Result<(), CliError> {
    let format = config.output;
    let watcher = Watcher::new(config.to_watch_options()?)?;
    let cancel = cancel_on_ctrl_c();
    let (mut events, mut errors) = watcher.watch(&cancel)?;

    let mut fatal = None;
    let mut handle_error = |err: WatcherError| {
        if err.is_fatal() {
            fatal = Some(err);
        } else {
            tracing::warn!(error = %err, "Watcher error");
        }
    };

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => display::print_event(&event, format)?,
                None => break,
            },
            Some(err) = errors.recv() => handle_error(err),
        }
    }
    while let Some(err) = errors.recv().await {
        handle_error(err);
    }

    watcher.close().await?;
    match fatal {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

async fn parse(
    config: VrclogConfig,
    path: PathBuf,
    stop_on_error: bool,
) -> Result<(), CliError> {
    let options = config.to_watch_options()?;
    let parser = options
        .parser
        .clone()
        .unwrap_or_else(|| Arc::new(VrcParser::new()));
    let offline = OfflineParser::new(parser)
        .with_filter(EventFilter::from_options(&options))
        .with_stop_on_error(stop_on_error);

    let cancel = cancel_on_ctrl_c();
    let events = if path.is_dir() {
        offline.parse_dir(&cancel, &path).await?
    } else {
        offline.parse_file(&cancel, &path).await?
    };

    for event in &events {
        display::print_event(event, config.output)?;
    }
    tracing::info!(events = events.len(), "Parse finished");
    Ok(())
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = match cli.config {
        Some(path) => ConfigLoader::load_from_path(&path)?,
        None => ConfigLoader::new().load()?,
    };

    match cli.command {
        Commands::Tail {
            log_dir,
            replay_last,
            from_start,
            since,
            wait,
            poll_interval_ms,
            common,
        } => {
            common.apply(&mut config);
            if log_dir.is_some() {
                config.log_dir = log_dir;
            }
            if let Some(n) = replay_last {
                config.replay.mode = ReplayKind::LastN;
                config.replay.last_n = Some(n);
            } else if from_start {
                config.replay.mode = ReplayKind::FromStart;
            } else if since.is_some() {
                config.replay.mode = ReplayKind::Since;
                config.replay.since = since;
            }
            if wait {
                config.wait_for_logs = true;
            }
            if let Some(ms) = poll_interval_ms {
                config.poll_interval_ms = ms;
            }

            tracing::info!(
                log_dir = ?config.log_dir,
                replay = ?config.replay.mode,
                patterns = config.patterns.len(),
                "Starting watcher"
            );
            tail(config).await
        }
        Commands::Parse {
            path,
            since,
            stop_on_error,
            common,
        } => {
            common.apply(&mut config);
            config.replay.mode = ReplayKind::None;
            if since.is_some() {
                config.replay.mode = ReplayKind::Since;
                config.replay.since = since;
            }
            parse(config, path, stop_on_error).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            display::print_fatal(&e);
            ExitCode::FAILURE
        }
    }
}
