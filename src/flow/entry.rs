//! Entry steps from the authenticated landing page to the download dialog.

use crate::flow::FlowCtx;
use crate::narrate::NarrationEvent;
use crate::selectors;
use crate::ui::Ladder;

/// Walk from wherever authentication landed to the download-activity dialog.
///
/// Both steps are best-effort. The operator may already have navigated past
/// one of them by hand, so an exhausted ladder narrates its diagnostics and
/// the flow moves on to the account iteration regardless.
pub async fn run_entry_steps(ctx: &FlowCtx<'_>) {
    ctx.pause(ctx.config.pacing.after_page_change).await;

    let transactions = selectors::see_all_transactions();
    if click_if_found(ctx, &transactions).await {
        ctx.pause(ctx.config.pacing.after_page_change).await;
    }

    let entry = selectors::download_activity_entry();
    if click_if_found(ctx, &entry).await {
        ctx.pause(ctx.config.pacing.after_entry_click).await;
    }
}

async fn click_if_found(ctx: &FlowCtx<'_>, ladder: &Ladder) -> bool {
    let Some(resolved) = ctx.resolve(ladder, ctx.config.timeouts.probe).await else {
        return false;
    };

    match resolved.element.click().await {
        Ok(()) => {
            ctx.narrate(NarrationEvent::Clicked {
                target: ladder.target.clone(),
            });
            true
        }
        Err(err) => {
            ctx.narrate(NarrationEvent::Diagnostic {
                name: format!("clicking {}", ladder.target),
                value: err.to_string(),
            });
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::narrate::RecordingNarrator;
    use crate::ui::scripted::{ScriptedElement, ScriptedPage};

    const TRANSACTIONS: &str = "text=\"See all transactions\"";
    const ENTRY: &str = "[data-testid=\"quick-action-download-activity-tooltip-button\"]";

    #[tokio::test(start_paused = true)]
    async fn test_clicks_both_entry_controls_in_order() {
        let page = ScriptedPage::new();
        page.add_element(TRANSACTIONS, ScriptedElement::new().visible());
        page.add_element(ENTRY, ScriptedElement::new().visible());

        let narrator = RecordingNarrator::new();
        let config = Config::default();
        let ctx = FlowCtx::new(&page, &narrator, &config);

        run_entry_steps(&ctx).await;

        assert_eq!(page.clicks(), vec![TRANSACTIONS.to_string(), ENTRY.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_link_does_not_stop_entry() {
        let page = ScriptedPage::new();
        page.add_element(ENTRY, ScriptedElement::new().visible());
        page.set_body_text("Welcome back. See all transactions in the activity center.");

        let narrator = RecordingNarrator::new();
        let config = Config::default();
        let ctx = FlowCtx::new(&page, &narrator, &config);

        run_entry_steps(&ctx).await;

        // The link ladder exhausted and narrated its diagnostics, but the
        // dialog entry button still got clicked.
        assert!(narrator.saw(|event| matches!(
            event,
            NarrationEvent::TargetNotFound { target } if target.contains("See all transactions")
        )));
        assert!(narrator.saw(|event| matches!(
            event,
            NarrationEvent::BodyTextScan { found: true, .. }
        )));
        assert_eq!(page.clicks(), vec![ENTRY.to_string()]);
    }
}
