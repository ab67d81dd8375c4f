mod support;

use anyhow::Result;
use ledgerpull::flow::{self, OptionOutcome};
use ledgerpull::narrate::{NarrationEvent, RecordingNarrator};
use ledgerpull::ui::scripted::ScriptedPage;
use support::{stage_dialog, test_config};
use tempfile::TempDir;

const ACCOUNTS: &[(&str, &str)] = &[
    ("Chase Checking (...4321)", "784512"),
    ("Chase Savings (...8765)", "784513"),
];

/// The site suggests the same filename for every account. Both accounts
/// complete; the later artifact replaces the earlier one on disk.
#[tokio::test(start_paused = true)]
async fn test_same_suggested_filename_replaces_earlier_artifact() -> Result<()> {
    let dir = TempDir::new()?;
    let page = ScriptedPage::new();
    stage_dialog(&page, ACCOUNTS);
    page.queue_download("Chase1234_Activity.CSV", b"first rows");
    page.queue_download("Chase1234_Activity.CSV", b"second rows");

    let narrator = RecordingNarrator::new();
    let config = test_config(dir.path());

    let report = flow::run_flow(&page, &narrator, &config).await;

    assert_eq!(report.completed(), 2);
    let artifact = dir.path().join("Chase1234_Activity.CSV");
    for option_report in &report.options {
        assert_eq!(
            option_report.outcome,
            OptionOutcome::Completed {
                artifact: artifact.clone(),
            }
        );
    }

    assert_eq!(std::fs::read(&artifact)?, b"second rows");
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);

    let saves = narrator
        .events()
        .iter()
        .filter(|event| matches!(event, NarrationEvent::DownloadSaved { .. }))
        .count();
    assert_eq!(saves, 2);

    Ok(())
}
