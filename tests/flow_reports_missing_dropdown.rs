mod support;

use anyhow::Result;
use ledgerpull::flow;
use ledgerpull::narrate::{NarrationEvent, RecordingNarrator};
use ledgerpull::ui::scripted::{ScriptedElement, ScriptedPage};
use support::{test_config, DOWNLOAD_ENTRY, SEE_ALL_TRANSACTIONS};
use tempfile::TempDir;

const SELECT_LIKE: &str = "select, mds-select, [role=\"combobox\"]";

/// The entry steps work but the dialog never shows an account dropdown.
/// The run ends cleanly with an empty report and narrates what select-like
/// markup was actually there.
#[tokio::test(start_paused = true)]
async fn test_missing_dropdown_ends_run_with_empty_report() -> Result<()> {
    let dir = TempDir::new()?;
    let page = ScriptedPage::new();
    page.add_element(SEE_ALL_TRANSACTIONS, ScriptedElement::new().visible());
    page.add_element(DOWNLOAD_ENTRY, ScriptedElement::new().visible());
    page.add_element(
        SELECT_LIKE,
        ScriptedElement::new()
            .visible()
            .text("Legacy account picker"),
    );

    let narrator = RecordingNarrator::new();
    let config = test_config(dir.path());

    let report = flow::run_flow(&page, &narrator, &config).await;

    assert!(report.options.is_empty());
    assert_eq!(report.completed(), 0);
    assert_eq!(report.failed(), 0);

    assert!(narrator.saw(|event| matches!(
        event,
        NarrationEvent::TargetNotFound { target } if target == "account dropdown"
    )));
    assert!(narrator.saw(|event| matches!(
        event,
        NarrationEvent::NearbyElement { text, .. } if text.contains("Legacy account picker")
    )));
    assert!(narrator.saw(|event| matches!(
        event,
        NarrationEvent::RunFinished {
            completed: 0,
            failed: 0,
        }
    )));

    Ok(())
}
