//! Terminal output for the CLI.
//!
//! Human output is a stream of status lines on stderr, the status word
//! right-aligned in a twelve-column gutter. With `--message-format json`
//! stderr stays silent and each message becomes one JSON object per line on
//! stdout, tagged with a `reason`.

use std::fmt::Display;
use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::core::FetchOutcome;

/// What the shell prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Output {
    /// Failures only.
    Quiet,
    /// Status lines and a progress bar.
    #[default]
    Normal,
    /// Status lines plus one line per finished dependency; no progress bar.
    Verbose,
    /// Line-delimited JSON events on stdout, nothing on stderr.
    Json,
}

/// Color output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    fn enabled(self) -> bool {
        match self {
            ColorChoice::Auto => io::stderr().is_terminal(),
            ColorChoice::Always => true,
            ColorChoice::Never => false,
        }
    }
}

/// The word shown in the status gutter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Fetching,
    Verifying,
    Fetched,
    Cached,
    Exported,
    Finished,
    Removed,
    Missing,
    Failed,
    Info,
    Error,
}

#[derive(Clone, Copy)]
enum Tone {
    Good,
    Busy,
    Neutral,
    Caution,
    Bad,
}

impl Status {
    /// Status line for one dependency's final state.
    pub fn for_outcome(outcome: FetchOutcome) -> Status {
        match outcome {
            FetchOutcome::Fetched => Status::Fetched,
            FetchOutcome::AlreadyCached => Status::Cached,
            FetchOutcome::NotFound => Status::Missing,
            FetchOutcome::Failed => Status::Failed,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Status::Fetching => "Fetching",
            Status::Verifying => "Verifying",
            Status::Fetched => "Fetched",
            Status::Cached => "Cached",
            Status::Exported => "Exported",
            Status::Finished => "Finished",
            Status::Removed => "Removed",
            Status::Missing => "Missing",
            Status::Failed => "Failed",
            Status::Info => "Info",
            Status::Error => "error",
        }
    }

    fn tone(self) -> Tone {
        match self {
            Status::Fetched | Status::Exported | Status::Finished | Status::Removed => Tone::Good,
            Status::Fetching | Status::Verifying => Tone::Busy,
            Status::Cached | Status::Info => Tone::Neutral,
            Status::Missing => Tone::Caution,
            Status::Failed | Status::Error => Tone::Bad,
        }
    }

    /// Shown even with `--quiet`.
    fn is_failure(self) -> bool {
        matches!(self.tone(), Tone::Bad)
    }
}

impl Tone {
    fn ansi(self) -> &'static str {
        match self {
            Tone::Good => "\x1b[1;32m",
            Tone::Busy => "\x1b[1;36m",
            Tone::Neutral => "\x1b[1;34m",
            Tone::Caution => "\x1b[1;33m",
            Tone::Bad => "\x1b[1;31m",
        }
    }
}

const GUTTER: usize = 12;

/// Shared handle for everything the CLI prints.
#[derive(Debug, Default)]
pub struct Shell {
    output: Output,
    color: bool,
}

impl Shell {
    pub fn new(output: Output, color: ColorChoice) -> Self {
        let color = output != Output::Json && color.enabled();
        Shell { output, color }
    }

    /// JSON wins over `--quiet` and `--verbose`.
    pub fn from_flags(quiet: bool, verbose: bool, color: ColorChoice, json: bool) -> Self {
        let output = match (json, quiet, verbose) {
            (true, _, _) => Output::Json,
            (false, true, _) => Output::Quiet,
            (false, false, true) => Output::Verbose,
            (false, false, false) => Output::Normal,
        };
        Shell::new(output, color)
    }

    pub fn output(&self) -> Output {
        self.output
    }

    pub fn is_json(&self) -> bool {
        self.output == Output::Json
    }

    pub fn use_color(&self) -> bool {
        self.color
    }

    /// Print `{status:>12} {msg}` to stderr.
    pub fn status(&self, status: Status, msg: impl Display) {
        let shown = match self.output {
            Output::Json => false,
            Output::Quiet => status.is_failure(),
            Output::Normal | Output::Verbose => true,
        };
        if !shown {
            return;
        }

        let mut err = io::stderr().lock();
        let _ = if self.color {
            writeln!(
                err,
                "{}{:>width$}\x1b[0m {}",
                status.tone().ansi(),
                status.label(),
                msg,
                width = GUTTER
            )
        } else {
            writeln!(err, "{:>width$} {}", status.label(), msg, width = GUTTER)
        };
    }

    pub fn note(&self, msg: impl Display) {
        self.status(Status::Info, msg);
    }

    /// An `error` status line, or an `error` event in JSON mode.
    pub fn error(&self, msg: impl Display) {
        if self.is_json() {
            self.event("error", serde_json::json!({ "message": msg.to_string() }));
        } else {
            self.status(Status::Error, msg);
        }
    }

    /// Emit one JSON event on stdout; a no-op outside JSON mode.
    ///
    /// Object payloads get a `reason` field; anything else is wrapped as
    /// `{"reason": .., "value": ..}`.
    pub fn event(&self, reason: &str, payload: serde_json::Value) {
        if !self.is_json() {
            return;
        }

        let event = match payload {
            serde_json::Value::Object(mut map) => {
                map.insert("reason".to_string(), reason.into());
                serde_json::Value::Object(map)
            }
            value => serde_json::json!({ "reason": reason, "value": value }),
        };

        let mut out = io::stdout().lock();
        if serde_json::to_writer(&mut out, &event).is_ok() {
            let _ = writeln!(out);
        }
        let _ = out.flush();
    }

    /// Print `status msg` now and time until the span is finished.
    pub fn span(self: &Arc<Self>, status: Status, msg: impl Display) -> Span {
        self.status(status, msg);
        Span {
            shell: Arc::clone(self),
            started: Instant::now(),
        }
    }

    /// A progress bar over `total` items; only drawn in normal output.
    pub fn progress(self: &Arc<Self>, total: usize, label: &str) -> Progress {
        Progress::new(Arc::clone(self), total, label)
    }
}

/// Started by [`Shell::span`].
pub struct Span {
    shell: Arc<Shell>,
    started: Instant,
}

impl Span {
    /// Print `status msg in <elapsed>`.
    pub fn finish_with_message(self, status: Status, msg: impl Display) {
        let elapsed = format_duration(self.started.elapsed());
        self.shell.status(status, format!("{} in {}", msg, elapsed));
    }
}

/// Counts finished items; shared by worker threads.
pub struct Progress {
    shell: Arc<Shell>,
    bar: Option<ProgressBar>,
    total: usize,
    done: AtomicUsize,
}

impl Progress {
    fn new(shell: Arc<Shell>, total: usize, label: &str) -> Self {
        let bar = (shell.output() == Output::Normal && total > 1).then(|| {
            let bar = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::with_template(
                "{prefix:>12.cyan.bold} [{bar:30}] {pos}/{len} {wide_msg}",
            ) {
                bar.set_style(style.progress_chars("=> "));
            }
            bar.set_prefix(label.to_string());
            bar
        });

        Progress {
            shell,
            bar,
            total,
            done: AtomicUsize::new(0),
        }
    }

    /// Count `item` as finished.
    pub fn inc(&self, item: &str) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(bar) = &self.bar {
            bar.set_message(item.to_string());
            bar.inc(1);
        }

        match self.shell.output() {
            Output::Json => self.shell.event(
                "fetch-progress",
                serde_json::json!({ "done": done, "total": self.total, "item": item }),
            ),
            Output::Verbose => {
                let _ = writeln!(
                    io::stderr().lock(),
                    "{:>width$} [{}/{}] {}",
                    "",
                    done,
                    self.total,
                    item,
                    width = GUTTER
                );
            }
            Output::Quiet | Output::Normal => {}
        }
    }

    /// A status line printed above the bar.
    pub fn println(&self, status: Status, msg: impl Display) {
        match &self.bar {
            Some(bar) => bar.suspend(|| self.shell.status(status, msg)),
            None => self.shell.status(status, msg),
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }
}

/// `340ms`, `2.50s`, `3m 05s`.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}
