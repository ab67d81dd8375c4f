use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use crate::duration::format_duration;

/// Everything the tool tells the operator while it works.
///
/// Events are typed so tests can assert on what was narrated instead of
/// scraping stdout. [`ConsoleNarrator`] renders them through [`fmt::Display`].
#[derive(Debug, Clone, PartialEq)]
pub enum NarrationEvent {
    RunStarted { url: String },
    AwaitingOperator,
    Resumed,
    ProbingTarget { target: String },
    CandidateMatched { target: String, selector: String },
    CandidateMissed { target: String, selector: String },
    TargetNotFound { target: String },
    NearbyElement { probe: String, text: String },
    BodyTextScan { needle: String, found: bool },
    Clicked { target: String },
    OptionsParsed { count: usize },
    OptionStarted { index: usize, total: usize, name: String, value: String },
    AccountSelected { value: String },
    AccountSelectionMismatch { expected: String, actual: String },
    KeyboardFallback { target: String },
    PeriodAlreadySelected { label: String },
    PeriodConfirmed { label: String },
    PeriodMismatch { expected: String, actual: String },
    DownloadStarted { filename: String },
    DownloadSaved { filename: String, path: PathBuf },
    DownloadTimedOut { waited: Duration },
    Diagnostic { name: String, value: String },
    DownloadAnotherDisabled,
    ReadyForNext { indicator: String },
    OptionFinished { name: String },
    RunFinished { completed: usize, failed: usize },
}

impl fmt::Display for NarrationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunStarted { url } => write!(f, "Opening {url}..."),
            Self::AwaitingOperator => {
                write!(f, "Waiting for you to finish logging in...")
            }
            Self::Resumed => write!(f, "Continuing."),
            Self::ProbingTarget { target } => write!(f, "Looking for {target}..."),
            Self::CandidateMatched { target, selector } => {
                write!(f, "Found {target} with selector: {selector}")
            }
            Self::CandidateMissed { selector, .. } => write!(f, "No match: {selector}"),
            Self::TargetNotFound { target } => write!(f, "Could not find {target}"),
            Self::NearbyElement { probe, text } => write!(f, "  {probe}: \"{text}\""),
            Self::BodyTextScan { needle, found } => {
                if *found {
                    write!(f, "Page text mentions \"{needle}\"")
                } else {
                    write!(f, "Page text does not mention \"{needle}\"")
                }
            }
            Self::Clicked { target } => write!(f, "Clicked {target}"),
            Self::OptionsParsed { count } => write!(f, "Found {count} accounts"),
            Self::OptionStarted { index, total, name, value } => {
                write!(f, "=== Account {index}/{total}: {name} ({value}) ===")
            }
            Self::AccountSelected { value } => write!(f, "Selected account value {value}"),
            Self::AccountSelectionMismatch { expected, actual } => {
                write!(
                    f,
                    "Selection shows \"{actual}\" instead of \"{expected}\", continuing"
                )
            }
            Self::KeyboardFallback { target } => {
                write!(f, "Falling back to keyboard selection for {target}")
            }
            Self::PeriodAlreadySelected { label } => {
                write!(f, "Period already set to \"{label}\"")
            }
            Self::PeriodConfirmed { label } => write!(f, "Period set to \"{label}\""),
            Self::PeriodMismatch { expected, actual } => {
                write!(f, "Period shows \"{actual}\" instead of \"{expected}\"")
            }
            Self::DownloadStarted { filename } => write!(f, "Download started: {filename}"),
            Self::DownloadSaved { filename, path } => {
                write!(f, "Saved {filename} to {}", path.display())
            }
            Self::DownloadTimedOut { waited } => {
                write!(f, "No download after {}", format_duration(*waited))
            }
            Self::Diagnostic { name, value } => write!(f, "  {name}: {value}"),
            Self::DownloadAnotherDisabled => {
                write!(f, "\"Download other activity\" is disabled, finishing this account")
            }
            Self::ReadyForNext { indicator } => {
                write!(f, "Dialog ready again ({indicator})")
            }
            Self::OptionFinished { name } => write!(f, "=== Finished {name} ==="),
            Self::RunFinished { completed, failed } => {
                write!(f, "Done: {completed} downloaded, {failed} failed")
            }
        }
    }
}

/// Sink for narration events.
pub trait Narrator: Send + Sync {
    fn narrate(&self, event: NarrationEvent);
}

/// Narrator that prints each event to stdout.
///
/// Progress lines go to stdout so they interleave with the operator prompts;
/// `tracing` diagnostics stay on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNarrator;

impl Narrator for ConsoleNarrator {
    fn narrate(&self, event: NarrationEvent) {
        println!("{event}");
    }
}

/// Narrator that records events in memory for assertions.
#[derive(Debug, Default)]
pub struct RecordingNarrator {
    events: Mutex<Vec<NarrationEvent>>,
}

impl RecordingNarrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything narrated so far, in order.
    pub fn events(&self) -> Vec<NarrationEvent> {
        self.events.lock().expect("event log lock poisoned").clone()
    }

    /// True if any recorded event satisfies the predicate.
    pub fn saw(&self, predicate: impl Fn(&NarrationEvent) -> bool) -> bool {
        self.events
            .lock()
            .expect("event log lock poisoned")
            .iter()
            .any(|event| predicate(event))
    }
}

impl Narrator for RecordingNarrator {
    fn narrate(&self, event: NarrationEvent) {
        self.events.lock().expect("event log lock poisoned").push(event);
    }
}
