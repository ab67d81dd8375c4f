//! Account iteration.
//!
//! The dropdown's `options` attribute is parsed once per run; the sequence
//! then runs for every entry in list order. The dropdown itself is
//! re-resolved for every account because the dialog re-renders after each
//! download reset.

use chrono::Utc;

use crate::flow::{
    statement, FlowCtx, OptionOutcome, OptionReport, Stage, StepError, StepFailure,
};
use crate::narrate::NarrationEvent;
use crate::options::{self, AccountOption, MalformedOptions};
use crate::selectors;
use crate::ui::resolve::Resolved;

/// Resolve the account dropdown, parse its options, and run the download
/// sequence for each account in order. A failed account never stops the
/// loop; its failure lands in the report and the next account proceeds.
pub async fn iterate_accounts(ctx: &FlowCtx<'_>) -> Vec<OptionReport> {
    let ladder = selectors::account_dropdown();
    let Some(dropdown) = ctx.resolve(&ladder, ctx.config.timeouts.probe).await else {
        return Vec::new();
    };

    let options = match read_options(&dropdown).await {
        Ok(options) => options,
        Err(err) => {
            ctx.narrate(NarrationEvent::Diagnostic {
                name: "account options".to_string(),
                value: err.to_string(),
            });
            return Vec::new();
        }
    };
    ctx.narrate(NarrationEvent::OptionsParsed {
        count: options.len(),
    });

    let total = options.len();
    let mut reports = Vec::with_capacity(total);
    for (position, option) in options.into_iter().enumerate() {
        let started_at = Utc::now();
        ctx.narrate(NarrationEvent::OptionStarted {
            index: position + 1,
            total,
            name: option.name.clone(),
            value: option.value.clone(),
        });

        let outcome = match run_option(ctx, &option).await {
            Ok(artifact) => OptionOutcome::Completed { artifact },
            Err(failure) => {
                ctx.narrate(NarrationEvent::Diagnostic {
                    name: format!("{} failed at {}", option.name, failure.stage),
                    value: failure.error.to_string(),
                });
                OptionOutcome::from(failure)
            }
        };

        ctx.narrate(NarrationEvent::OptionFinished {
            name: option.name.clone(),
        });
        reports.push(OptionReport {
            option,
            outcome,
            started_at,
            finished_at: Utc::now(),
        });
    }
    reports
}

/// A missing or unparseable attribute is a payload defect; a failed read is
/// a driver fault and keeps its own error kind.
async fn read_options(dropdown: &Resolved) -> Result<Vec<AccountOption>, StepError> {
    let attribute = dropdown
        .element
        .attribute("options")
        .await?
        .ok_or_else(|| MalformedOptions::new("options attribute missing"))?;
    Ok(options::parse_account_options(&attribute)?)
}

async fn run_option(
    ctx: &FlowCtx<'_>,
    option: &AccountOption,
) -> Result<std::path::PathBuf, StepFailure> {
    let dropdown = open_dropdown(ctx).await?;
    select_account(ctx, &dropdown, option).await?;
    verify_account(ctx, &dropdown, option).await;
    ctx.pause(ctx.config.pacing.after_page_change).await;

    statement::configure_period(ctx).await?;
    let artifact = statement::download_statement(ctx).await?;
    statement::download_another(ctx).await?;
    Ok(artifact)
}

/// Re-resolve the dropdown and click it so the option list is open.
async fn open_dropdown(ctx: &FlowCtx<'_>) -> Result<Resolved, StepFailure> {
    let ladder = selectors::account_dropdown();
    let resolved = ctx
        .resolve(&ladder, ctx.config.timeouts.probe)
        .await
        .ok_or_else(|| StepFailure::new(Stage::OpenDropdown, ctx.not_found(&ladder)))?;

    resolved
        .element
        .click()
        .await
        .map_err(|err| StepFailure::new(Stage::OpenDropdown, err.into()))?;
    ctx.pause(ctx.config.pacing.after_click).await;
    Ok(resolved)
}

/// Click the option whose value matches, or fall back to one keyboard step.
async fn select_account(
    ctx: &FlowCtx<'_>,
    dropdown: &Resolved,
    option: &AccountOption,
) -> Result<(), StepFailure> {
    let ladder = selectors::account_option(&option.value);
    match ctx.resolve(&ladder, ctx.config.timeouts.option_probe).await {
        Some(target) => {
            target
                .element
                .click()
                .await
                .map_err(|err| StepFailure::new(Stage::SelectAccount, err.into()))?;
        }
        None => {
            ctx.narrate(NarrationEvent::KeyboardFallback {
                target: ladder.target.clone(),
            });
            let fallback = async {
                dropdown.element.press_key("ArrowDown").await?;
                ctx.pause(ctx.config.pacing.keyboard).await;
                dropdown.element.press_key("Enter").await
            };
            fallback
                .await
                .map_err(|err| StepFailure::new(Stage::SelectAccount, err.into()))?;
        }
    }

    ctx.pause(ctx.config.pacing.after_click).await;
    Ok(())
}

/// Read the dropdown's value back and compare. A mismatch is narrated and
/// the sequence continues anyway; see the module docs on report semantics.
async fn verify_account(ctx: &FlowCtx<'_>, dropdown: &Resolved, option: &AccountOption) {
    let actual = dropdown
        .element
        .attribute("value")
        .await
        .unwrap_or(None)
        .unwrap_or_default();

    if actual == option.value {
        ctx.narrate(NarrationEvent::AccountSelected {
            value: option.value.clone(),
        });
    } else {
        ctx.narrate(NarrationEvent::AccountSelectionMismatch {
            expected: option.value.clone(),
            actual,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::flow::FailureKind;
    use crate::narrate::RecordingNarrator;
    use crate::ui::scripted::{Mutation, ScriptedElement, ScriptedPage};

    const SELECT: &str = "mds-select#account-selector";

    fn single_option_attr() -> &'static str {
        r#"[{"name":"Checking (...1234)","value":"9","index":0}]"#
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_options_attribute_yields_empty_run() {
        let page = ScriptedPage::new();
        page.add_element(SELECT, ScriptedElement::new().visible());

        let narrator = RecordingNarrator::new();
        let config = Config::default();
        let ctx = FlowCtx::new(&page, &narrator, &config);

        let reports = iterate_accounts(&ctx).await;
        assert!(reports.is_empty());
        assert!(narrator.saw(|event| matches!(
            event,
            NarrationEvent::Diagnostic { value, .. } if value.contains("options attribute missing")
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_options_attribute_yields_empty_run() {
        let page = ScriptedPage::new();
        page.add_element(
            SELECT,
            ScriptedElement::new().visible().attribute("options", "not json"),
        );

        let narrator = RecordingNarrator::new();
        let config = Config::default();
        let ctx = FlowCtx::new(&page, &narrator, &config);

        let reports = iterate_accounts(&ctx).await;
        assert!(reports.is_empty());
        assert!(narrator.saw(|event| matches!(
            event,
            NarrationEvent::Diagnostic { value, .. } if value.contains("malformed options attribute")
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attribute_read_error_is_not_a_parse_failure() {
        let page = ScriptedPage::new();
        page.add_element(
            SELECT,
            ScriptedElement::new()
                .visible()
                .attribute_read_error("tab crashed"),
        );

        let narrator = RecordingNarrator::new();
        let config = Config::default();
        let ctx = FlowCtx::new(&page, &narrator, &config);

        let reports = iterate_accounts(&ctx).await;
        assert!(reports.is_empty());

        // The driver fault passes through untouched instead of reading as a
        // payload defect.
        assert!(narrator.saw(|event| matches!(
            event,
            NarrationEvent::Diagnostic { value, .. } if value == "tab crashed"
        )));
        assert!(!narrator.saw(|event| matches!(
            event,
            NarrationEvent::Diagnostic { value, .. } if value.contains("malformed options attribute")
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keyboard_fallback_presses_arrow_then_enter() {
        let page = ScriptedPage::new();
        page.add_element(
            SELECT,
            ScriptedElement::new()
                .visible()
                .attribute("options", single_option_attr()),
        );
        // No clickable option element anywhere; Enter lands the selection.
        page.on_press(
            SELECT,
            "Enter",
            Mutation::SetAttribute {
                selector: SELECT.to_string(),
                name: "value".to_string(),
                value: "9".to_string(),
            },
        );

        let narrator = RecordingNarrator::new();
        let config = Config::default();
        let ctx = FlowCtx::new(&page, &narrator, &config);

        let reports = iterate_accounts(&ctx).await;
        assert_eq!(reports.len(), 1);

        assert_eq!(
            page.presses(),
            vec![
                (SELECT.to_string(), "ArrowDown".to_string()),
                (SELECT.to_string(), "Enter".to_string()),
            ]
        );
        assert!(narrator.saw(|event| matches!(event, NarrationEvent::KeyboardFallback { .. })));
        assert!(narrator.saw(|event| matches!(
            event,
            NarrationEvent::AccountSelected { value } if value == "9"
        )));

        // The period dropdown is absent, so the sequence stops there, which
        // proves the verify step let it continue.
        assert!(matches!(
            &reports[0].outcome,
            OptionOutcome::Failed {
                stage: Stage::ConfigurePeriod,
                kind: FailureKind::ElementNotFound,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_mismatch_warns_and_continues() {
        let page = ScriptedPage::new();
        page.add_element(
            SELECT,
            ScriptedElement::new()
                .visible()
                .attribute("options", single_option_attr()),
        );
        page.add_element("[data-value=\"9\"]", ScriptedElement::new().visible());
        // Clicking the option lands on some other account's value.
        page.on_click(
            "[data-value=\"9\"]",
            Mutation::SetAttribute {
                selector: SELECT.to_string(),
                name: "value".to_string(),
                value: "31".to_string(),
            },
        );

        let narrator = RecordingNarrator::new();
        let config = Config::default();
        let ctx = FlowCtx::new(&page, &narrator, &config);

        let reports = iterate_accounts(&ctx).await;
        assert_eq!(reports.len(), 1);

        assert!(narrator.saw(|event| matches!(
            event,
            NarrationEvent::AccountSelectionMismatch { expected, actual }
                if expected == "9" && actual == "31"
        )));
        // Mismatch did not end the sequence; it moved on to the period stage.
        assert!(matches!(
            &reports[0].outcome,
            OptionOutcome::Failed {
                stage: Stage::ConfigurePeriod,
                ..
            }
        ));
    }
}
