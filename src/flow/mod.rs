//! The download flow.
//!
//! Everything after the operator finishes authenticating: the two entry
//! steps that reach the download dialog, then one bounded sequence per
//! account in the dropdown. Failures stay scoped to the account they hit;
//! the iteration always advances.

pub mod accounts;
pub mod entry;
pub mod statement;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::Config;
use crate::duration::format_duration;
use crate::narrate::{NarrationEvent, Narrator};
use crate::options::{AccountOption, MalformedOptions};
use crate::ui::resolve::{resolve_visible, Resolved};
use crate::ui::{Ladder, Page};

/// Stages of the per-account sequence, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    OpenDropdown,
    SelectAccount,
    VerifyAccountSelected,
    ConfigurePeriod,
    VerifyPeriodSelected,
    TriggerDownload,
    AwaitDownload,
    PersistFile,
    TriggerDownloadAnother,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OpenDropdown => "open dropdown",
            Self::SelectAccount => "select account",
            Self::VerifyAccountSelected => "verify account selected",
            Self::ConfigurePeriod => "configure period",
            Self::VerifyPeriodSelected => "verify period selected",
            Self::TriggerDownload => "trigger download",
            Self::AwaitDownload => "await download",
            Self::PersistFile => "persist file",
            Self::TriggerDownloadAnother => "trigger download another",
        };
        write!(f, "{name}")
    }
}

/// What can go wrong in one step of the sequence.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("could not find {target} after trying {tried} selectors")]
    ElementNotFound { target: String, tried: usize },

    #[error("{target} reads \"{actual}\", expected \"{expected}\"")]
    SelectionMismatch {
        target: String,
        expected: String,
        actual: String,
    },

    #[error("no download event within {}", format_duration(*waited))]
    DownloadTimeout { waited: Duration },

    #[error("{target} is disabled")]
    ActionDisabled { target: String },

    #[error(transparent)]
    MalformedOptions(#[from] MalformedOptions),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Coarse classification of a [`StepError`], kept alongside the rendered
/// message in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ElementNotFound,
    SelectionMismatch,
    DownloadTimeout,
    ActionDisabled,
    MalformedOptions,
    Unexpected,
}

impl StepError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ElementNotFound { .. } => FailureKind::ElementNotFound,
            Self::SelectionMismatch { .. } => FailureKind::SelectionMismatch,
            Self::DownloadTimeout { .. } => FailureKind::DownloadTimeout,
            Self::ActionDisabled { .. } => FailureKind::ActionDisabled,
            Self::MalformedOptions(_) => FailureKind::MalformedOptions,
            Self::Unexpected(_) => FailureKind::Unexpected,
        }
    }
}

/// A step error pinned to the stage it happened in.
#[derive(Debug)]
pub struct StepFailure {
    pub stage: Stage,
    pub error: StepError,
}

impl StepFailure {
    pub fn new(stage: Stage, error: StepError) -> Self {
        Self { stage, error }
    }
}

/// Terminal state of one account's sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionOutcome {
    /// The account's activity file was downloaded and persisted.
    Completed { artifact: PathBuf },
    /// The sequence stopped early; later stages were skipped.
    Failed {
        stage: Stage,
        kind: FailureKind,
        message: String,
    },
}

impl OptionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

impl From<StepFailure> for OptionOutcome {
    fn from(failure: StepFailure) -> Self {
        Self::Failed {
            stage: failure.stage,
            kind: failure.error.kind(),
            message: failure.error.to_string(),
        }
    }
}

/// One account's entry in the run report.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionReport {
    pub option: AccountOption,
    pub outcome: OptionOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Everything that happened in one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub options: Vec<OptionReport>,
}

impl RunReport {
    pub fn completed(&self) -> usize {
        self.options
            .iter()
            .filter(|report| report.outcome.is_completed())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.options.len() - self.completed()
    }
}

/// Shared context threaded through every flow step.
pub struct FlowCtx<'a> {
    pub page: &'a dyn Page,
    pub narrator: &'a dyn Narrator,
    pub config: &'a Config,
}

impl<'a> FlowCtx<'a> {
    pub fn new(page: &'a dyn Page, narrator: &'a dyn Narrator, config: &'a Config) -> Self {
        Self {
            page,
            narrator,
            config,
        }
    }

    pub(crate) fn narrate(&self, event: NarrationEvent) {
        self.narrator.narrate(event);
    }

    pub(crate) async fn resolve(&self, ladder: &Ladder, timeout: Duration) -> Option<Resolved> {
        resolve_visible(self.page, self.narrator, ladder, timeout).await
    }

    pub(crate) fn not_found(&self, ladder: &Ladder) -> StepError {
        StepError::ElementNotFound {
            target: ladder.target.clone(),
            tried: ladder.candidates.len(),
        }
    }

    pub(crate) async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run the whole flow against an authenticated page: the two entry steps,
/// then the account iteration. Per-account failures are captured in the
/// report rather than propagated.
pub async fn run_flow(page: &dyn Page, narrator: &dyn Narrator, config: &Config) -> RunReport {
    let ctx = FlowCtx::new(page, narrator, config);
    let started_at = Utc::now();

    entry::run_entry_steps(&ctx).await;
    let options = accounts::iterate_accounts(&ctx).await;

    let report = RunReport {
        started_at,
        finished_at: Utc::now(),
        options,
    };
    ctx.narrate(NarrationEvent::RunFinished {
        completed: report.completed(),
        failed: report.failed(),
    });
    report
}
