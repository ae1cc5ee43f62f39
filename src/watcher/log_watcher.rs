//! The log watcher: lifecycle, replay, live tailing and rotation.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::instrument::WithSubscriber;

use super::discovery::PathResolver;
use super::error::{Phase, WatcherError};
use super::filter::EventFilter;
use super::options::{ReplayMode, WatchOptions};
use super::replay::{read_last_lines, ReplayLimits};
use super::tailer::{LineSource, TailConfig, TailStart, DEFAULT_TAIL_INTERVAL};
use crate::event::Event;
use crate::parser::Parser;

/// Receivers returned by [`Watcher::watch`].
pub type WatchChannels = (mpsc::Receiver<Event>, mpsc::Receiver<WatcherError>);

#[derive(Debug, Default)]
struct State {
    closed: bool,
    watching: bool,
    cancel: Option<CancellationToken>,
    /// Cancelled once the worker has been dropped.
    exited: Option<CancellationToken>,
    worker: Option<JoinHandle<()>>,
}

/// Watches the VRChat log directory and emits parsed events.
///
/// A watcher moves through `Created -> Watching -> Closed` and cannot be
/// restarted. [`watch`](Self::watch) spawns one worker task that resolves
/// the active log file, optionally replays existing lines, then follows the
/// file and switches to newer files as they appear.
///
/// Events are delivered with backpressure: the worker waits while the event
/// channel is full. Errors are dropped when the error channel is full. Both
/// channels close when the worker exits.
///
/// Dropping the watcher cancels its worker without waiting for it.
pub struct Watcher {
    options: Arc<WatchOptions>,
    log_dir: PathBuf,
    parser: Arc<dyn Parser>,
    resolver: Arc<dyn PathResolver>,
    filter: EventFilter,
    state: Mutex<State>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("log_dir", &self.log_dir)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Watcher {
    /// Create a watcher. No task is started.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::InvalidOptions`] if the options are invalid,
    /// and a resolver error if the log directory cannot be determined.
    pub fn new(options: WatchOptions) -> Result<Self, WatcherError> {
        options.validate()?;

        let resolver = options.resolver_or_default();
        let log_dir = resolver.resolve_directory(options.log_dir.as_deref())?;
        let parser = options.parser_or_default();
        let filter = EventFilter::from_options(&options);

        tracing::debug!(log_dir = %log_dir.display(), "Watcher created");

        Ok(Self {
            options: Arc::new(options),
            log_dir,
            parser,
            resolver,
            filter,
            state: Mutex::new(State::default()),
        })
    }

    /// Directory being watched.
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.lock_state().watching
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    /// Start the worker and return the event and error receivers.
    ///
    /// The worker stops when `parent` is cancelled, when [`close`](Self::close)
    /// is called, after a fatal error, or once the event receiver is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::AlreadyClosed`] after `close`,
    /// [`WatcherError::AlreadyWatching`] on a second call, and
    /// [`WatcherError::NoRuntime`] outside a tokio runtime.
    pub fn watch(&self, parent: &CancellationToken) -> Result<WatchChannels, WatcherError> {
        let mut state = self.lock_state();
        if state.closed {
            return Err(WatcherError::AlreadyClosed);
        }
        if state.watching {
            return Err(WatcherError::AlreadyWatching);
        }
        let runtime = Handle::try_current().map_err(|_| WatcherError::NoRuntime)?;

        let (event_tx, event_rx) = mpsc::channel(self.options.event_buffer);
        let (error_tx, error_rx) = mpsc::channel(self.options.error_buffer);
        let cancel = parent.child_token();
        let exited = CancellationToken::new();

        let worker = Worker {
            options: Arc::clone(&self.options),
            log_dir: self.log_dir.clone(),
            parser: Arc::clone(&self.parser),
            resolver: Arc::clone(&self.resolver),
            filter: self.filter.clone(),
            events: event_tx,
            errors: error_tx,
            cancel: cancel.clone(),
            _exited: exited.clone().drop_guard(),
        };

        let handle = match self.options.dispatch.clone() {
            Some(dispatch) => runtime.spawn(worker.run().with_subscriber(dispatch)),
            None => runtime.spawn(worker.run()),
        };

        state.watching = true;
        state.cancel = Some(cancel);
        state.exited = Some(exited);
        state.worker = Some(handle);
        Ok((event_rx, error_rx))
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// Every call waits for the worker, including calls made while another
    /// `close` is in progress. Calling `close` before `watch` returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::Join`] if the worker task panicked. Only the
    /// first call reports it.
    pub async fn close(&self) -> Result<(), WatcherError> {
        let (worker, exited) = {
            let mut state = self.lock_state();
            state.closed = true;
            if let Some(cancel) = &state.cancel {
                cancel.cancel();
            }
            (state.worker.take(), state.exited.clone())
        };

        if let Some(handle) = worker {
            handle.await?;
            tracing::debug!(log_dir = %self.log_dir.display(), "Watcher closed");
        }
        if let Some(exited) = exited {
            exited.cancelled().await;
        }
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(cancel) = &state.cancel {
            cancel.cancel();
        }
    }
}

/// Whether the worker keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

enum Step {
    Cancelled,
    ConsumerGone,
    Line(Option<String>),
    TailError(WatcherError),
    Rotate,
}

struct Worker {
    options: Arc<WatchOptions>,
    log_dir: PathBuf,
    parser: Arc<dyn Parser>,
    resolver: Arc<dyn PathResolver>,
    filter: EventFilter,
    events: mpsc::Sender<Event>,
    errors: mpsc::Sender<WatcherError>,
    cancel: CancellationToken,
    // Dropped last, after both senders.
    _exited: DropGuard,
}

impl Worker {
    async fn run(self) {
        tracing::debug!(log_dir = %self.log_dir.display(), "Watcher worker started");

        if let Some(path) = self.resolve_initial().await {
            let start = match self.options.replay.mode {
                ReplayMode::None => Some(TailStart::End),
                ReplayMode::FromStart | ReplayMode::Since(_) => Some(TailStart::Beginning),
                ReplayMode::LastN(n) => self.replay(&path, n).await,
            };
            if let Some(start) = start {
                self.follow(path, start).await;
            }
        }

        tracing::debug!(log_dir = %self.log_dir.display(), "Watcher worker stopped");
    }

    /// Find the active log file, waiting for one if configured.
    async fn resolve_initial(&self) -> Option<PathBuf> {
        loop {
            match self.resolver.resolve_latest_file(&self.log_dir) {
                Ok(path) => {
                    tracing::info!(path = %path.display(), "Watching log file");
                    return Some(path);
                }
                Err(e) if self.options.wait_for_logs && e.is_no_log_files() => {
                    tracing::debug!(log_dir = %self.log_dir.display(), "Waiting for log files");
                    tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => return None,
                        () = tokio::time::sleep(self.options.poll_interval) => {}
                    }
                }
                Err(e) => {
                    self.send_error(e.fatal(Phase::Resolve));
                    return None;
                }
            }
        }
    }

    /// Emit the last `n` lines and return where tailing continues.
    ///
    /// `None` means the worker should stop.
    async fn replay(&self, path: &Path, n: usize) -> Option<TailStart> {
        let limits = ReplayLimits::from(&self.options.replay);
        let owned = path.to_path_buf();
        let scanned = match tokio::task::spawn_blocking(move || {
            read_last_lines(&owned, n, &limits)
        })
        .await
        {
            Ok(result) => result.map_err(WatcherError::from),
            Err(e) => Err(WatcherError::from(e)),
        };

        match scanned {
            Ok(mut last) => {
                // An unterminated last line is left for the tail to complete.
                let resume = last.complete_lines();
                tracing::debug!(
                    path = %path.display(),
                    lines = last.lines.len(),
                    resume,
                    "Replaying last lines"
                );
                for line in &last.lines {
                    if self.process_line(line).await == Flow::Stop {
                        return None;
                    }
                }
                Some(TailStart::Offset(resume))
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Replay failed");
                self.send_error(e.during(Phase::Replay));
                Some(TailStart::End)
            }
        }
    }

    fn tail_config(&self, start: TailStart) -> TailConfig {
        TailConfig::new(start).with_interval(self.options.poll_interval.min(DEFAULT_TAIL_INTERVAL))
    }

    async fn follow(&self, path: PathBuf, start: TailStart) {
        let mut source = match LineSource::open(path, self.tail_config(start)).await {
            Ok(source) => source,
            Err(e) => {
                self.send_error(e.fatal(Phase::Tail));
                return;
            }
        };

        let poll = self.options.poll_interval;
        let mut rotation = tokio::time::interval_at(Instant::now() + poll, poll);
        rotation.set_missed_tick_behavior(MissedTickBehavior::Delay);

        'events: loop {
            let step = {
                let (lines, errors) = source.channels();
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => Step::Cancelled,
                    () = self.events.closed() => Step::ConsumerGone,
                    _ = rotation.tick() => Step::Rotate,
                    line = lines.recv() => Step::Line(line),
                    Some(e) = errors.recv() => Step::TailError(e),
                }
            };

            match step {
                Step::Cancelled => break,
                Step::ConsumerGone => {
                    tracing::debug!("Event receiver dropped, stopping");
                    break;
                }
                Step::Line(Some(line)) => {
                    if self.process_line(&line).await == Flow::Stop {
                        break;
                    }
                }
                Step::Line(None) => {
                    let path = source.path().to_path_buf();
                    self.send_error(WatcherError::LineSourceClosed(path).fatal(Phase::Tail));
                    break;
                }
                Step::TailError(e) => {
                    tracing::warn!(path = %source.path().display(), error = %e, "Tail error");
                    self.send_error(e.during(Phase::Tail));
                }
                Step::Rotate => {
                    let Some(next) = self.check_rotation(source.path()).await else {
                        continue;
                    };
                    let old = std::mem::replace(&mut source, next);
                    for line in old.stop().await {
                        if self.process_line(&line).await == Flow::Stop {
                            break 'events;
                        }
                    }
                }
            }
        }

        source.stop().await;
    }

    /// Open the newest log file if it differs from `current`.
    async fn check_rotation(&self, current: &Path) -> Option<LineSource> {
        let latest = match self.resolver.resolve_latest_file(&self.log_dir) {
            Ok(latest) => latest,
            Err(e) => {
                self.send_error(e.during(Phase::Rotation));
                return None;
            }
        };
        if latest == current {
            return None;
        }

        match LineSource::open(latest.clone(), self.tail_config(TailStart::Beginning)).await {
            Ok(source) => {
                tracing::info!(
                    from = %current.display(),
                    to = %latest.display(),
                    "Log file rotated"
                );
                Some(source)
            }
            Err(e) => {
                tracing::warn!(path = %latest.display(), error = %e, "Failed to open rotated log");
                self.send_error(e.during(Phase::Rotation));
                None
            }
        }
    }

    /// Parse one line and deliver its events.
    async fn process_line(&self, line: &str) -> Flow {
        let (result, error) = match self.parser.parse_line(&self.cancel, line).await {
            Ok(result) => (result, None),
            Err(mut e) => (e.take_partial().unwrap_or_default(), Some(e)),
        };

        for event in result.events {
            let Some(event) = self.filter.apply(event, line) else {
                continue;
            };
            if self.deliver(event).await == Flow::Stop {
                return Flow::Stop;
            }
        }

        match error {
            Some(e) if e.is_cancelled() && self.cancel.is_cancelled() => Flow::Stop,
            Some(e) => {
                self.send_error(WatcherError::from(e).during(Phase::Parse));
                Flow::Continue
            }
            None => Flow::Continue,
        }
    }

    async fn deliver(&self, event: Event) -> Flow {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Flow::Stop,
            sent = self.events.send(event) => {
                if sent.is_ok() {
                    Flow::Continue
                } else {
                    tracing::debug!("Event receiver dropped, stopping");
                    Flow::Stop
                }
            }
        }
    }

    fn send_error(&self, err: WatcherError) {
        if let Err(mpsc::error::TrySendError::Full(err)) = self.errors.try_send(err) {
            tracing::debug!(error = %err, "Error channel full, dropping error");
        }
    }
}
