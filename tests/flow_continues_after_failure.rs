mod support;

use anyhow::Result;
use ledgerpull::flow::{self, FailureKind, OptionOutcome, Stage};
use ledgerpull::narrate::{NarrationEvent, RecordingNarrator};
use ledgerpull::ui::scripted::{Mutation, ScriptedPage};
use support::{
    account_option_selector, stage_dialog, test_config, ACCOUNT_DROPDOWN, DOWNLOAD_ANOTHER,
    DOWNLOAD_BUTTON, DOWNLOAD_ENTRY, SEE_ALL_TRANSACTIONS,
};
use tempfile::TempDir;

const ACCOUNTS: &[(&str, &str)] = &[
    ("Chase Checking (...4321)", "784512"),
    ("Chase Savings (...8765)", "784513"),
];

/// Selecting the first account hides the download button, so that account
/// fails; selecting the second restores it. The second account must still
/// download.
#[tokio::test(start_paused = true)]
async fn test_failed_account_does_not_stop_later_accounts() -> Result<()> {
    let dir = TempDir::new()?;
    let page = ScriptedPage::new();
    stage_dialog(&page, ACCOUNTS);
    page.on_click(
        &account_option_selector("784512"),
        Mutation::Hide {
            selector: DOWNLOAD_BUTTON.to_string(),
        },
    );
    page.on_click(
        &account_option_selector("784513"),
        Mutation::Show {
            selector: DOWNLOAD_BUTTON.to_string(),
        },
    );
    page.queue_download("Savings_Activity.CSV", b"savings rows");

    let narrator = RecordingNarrator::new();
    let config = test_config(dir.path());

    let report = flow::run_flow(&page, &narrator, &config).await;

    assert_eq!(report.options.len(), 2);
    assert_eq!(report.completed(), 1);
    assert_eq!(report.failed(), 1);

    assert_eq!(
        report.options[0].outcome,
        OptionOutcome::Failed {
            stage: Stage::TriggerDownload,
            kind: FailureKind::ElementNotFound,
            message: "could not find download button after trying 6 selectors".to_string(),
        }
    );
    assert_eq!(
        report.options[1].outcome,
        OptionOutcome::Completed {
            artifact: dir.path().join("Savings_Activity.CSV"),
        }
    );
    assert_eq!(
        std::fs::read(dir.path().join("Savings_Activity.CSV"))?,
        b"savings rows"
    );

    // The failed account stops before the download click and skips the
    // dialog reset; the next account runs the full sequence.
    assert_eq!(
        page.clicks(),
        vec![
            SEE_ALL_TRANSACTIONS.to_string(),
            DOWNLOAD_ENTRY.to_string(),
            ACCOUNT_DROPDOWN.to_string(),
            account_option_selector("784512"),
            ACCOUNT_DROPDOWN.to_string(),
            account_option_selector("784513"),
            DOWNLOAD_BUTTON.to_string(),
            DOWNLOAD_ANOTHER.to_string(),
        ]
    );

    assert!(narrator.saw(|event| matches!(
        event,
        NarrationEvent::TargetNotFound { target } if target == "download button"
    )));
    assert!(narrator.saw(|event| matches!(
        event,
        NarrationEvent::Diagnostic { name, .. } if name.contains("failed at trigger download")
    )));
    assert!(narrator.saw(|event| matches!(
        event,
        NarrationEvent::RunFinished {
            completed: 1,
            failed: 1,
        }
    )));

    Ok(())
}
