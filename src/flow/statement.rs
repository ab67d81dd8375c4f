//! The per-account tail of the sequence: pick the reporting period, trigger
//! the download, persist the artifact, and reset the dialog.

use std::path::PathBuf;

use crate::flow::{FlowCtx, Stage, StepError, StepFailure};
use crate::narrate::NarrationEvent;
use crate::selectors;
use crate::ui::resolve::{wait_visible, Resolved};

/// Upper bound on keyboard-arrow steps while hunting the period option.
const MAX_ARROW_PRESSES: usize = 4;

/// Make sure the period dropdown shows the configured label.
///
/// When the control already displays the label, nothing is clicked and the
/// sequence proceeds straight to the download. Otherwise the dropdown is
/// opened and the option picked by selector, falling back to a bounded
/// keyboard scan that re-reads the highlighted option after each arrow.
pub async fn configure_period(ctx: &FlowCtx<'_>) -> Result<(), StepFailure> {
    let label = ctx.config.period_label.clone();
    let ladder = selectors::period_control(&label);
    let control = ctx
        .resolve(&ladder, ctx.config.timeouts.probe)
        .await
        .ok_or_else(|| StepFailure::new(Stage::ConfigurePeriod, ctx.not_found(&ladder)))?;

    let shown = displayed_text(&control).await;
    if shown.contains(&label) {
        ctx.narrate(NarrationEvent::PeriodAlreadySelected {
            label: label.clone(),
        });
        return Ok(());
    }

    control
        .element
        .click()
        .await
        .map_err(|err| StepFailure::new(Stage::ConfigurePeriod, err.into()))?;
    ctx.pause(ctx.config.pacing.after_click).await;

    if !select_period_option(ctx, &control, &label).await? {
        let option_ladder = selectors::period_option(&label);
        return Err(StepFailure::new(
            Stage::ConfigurePeriod,
            ctx.not_found(&option_ladder),
        ));
    }
    ctx.pause(ctx.config.pacing.after_click).await;

    let shown = displayed_text(&control).await;
    if shown.contains(&label) {
        ctx.narrate(NarrationEvent::PeriodConfirmed { label });
        Ok(())
    } else {
        ctx.narrate(NarrationEvent::PeriodMismatch {
            expected: label.clone(),
            actual: shown.clone(),
        });
        Err(StepFailure::new(
            Stage::VerifyPeriodSelected,
            StepError::SelectionMismatch {
                target: "period dropdown".to_string(),
                expected: label,
                actual: shown,
            },
        ))
    }
}

/// Pick the period option in the opened dropdown. Returns false when both
/// the selector ladder and the keyboard scan come up empty.
async fn select_period_option(
    ctx: &FlowCtx<'_>,
    control: &Resolved,
    label: &str,
) -> Result<bool, StepFailure> {
    let ladder = selectors::period_option(label);
    if let Some(option) = ctx.resolve(&ladder, ctx.config.timeouts.option_probe).await {
        option
            .element
            .click()
            .await
            .map_err(|err| StepFailure::new(Stage::ConfigurePeriod, err.into()))?;
        return Ok(true);
    }

    ctx.narrate(NarrationEvent::KeyboardFallback {
        target: ladder.target.clone(),
    });
    for _ in 0..MAX_ARROW_PRESSES {
        control
            .element
            .press_key("ArrowDown")
            .await
            .map_err(|err| StepFailure::new(Stage::ConfigurePeriod, err.into()))?;
        ctx.pause(ctx.config.pacing.keyboard).await;

        if highlighted_text(ctx).await.contains(label) {
            control
                .element
                .press_key("Enter")
                .await
                .map_err(|err| StepFailure::new(Stage::ConfigurePeriod, err.into()))?;
            return Ok(true);
        }
    }
    Ok(false)
}

async fn displayed_text(control: &Resolved) -> String {
    control
        .element
        .inner_text()
        .await
        .unwrap_or(None)
        .unwrap_or_default()
}

async fn highlighted_text(ctx: &FlowCtx<'_>) -> String {
    let highlighted = ctx
        .page
        .locate(&selectors::highlighted_option())
        .await
        .unwrap_or(None);
    match highlighted {
        Some(element) => element.inner_text().await.unwrap_or(None).unwrap_or_default(),
        None => String::new(),
    }
}

/// Trigger the download and persist the artifact under its suggested name.
///
/// The watch is armed before the click; arming after would race a download
/// that finishes immediately. A timeout narrates the page diagnostics the
/// operator needs to see what the dialog is doing.
pub async fn download_statement(ctx: &FlowCtx<'_>) -> Result<PathBuf, StepFailure> {
    let ladder = selectors::download_button();
    let button = ctx
        .resolve(&ladder, ctx.config.timeouts.probe)
        .await
        .ok_or_else(|| StepFailure::new(Stage::TriggerDownload, ctx.not_found(&ladder)))?;

    if let Ok(Some(text)) = button.element.inner_text().await {
        ctx.narrate(NarrationEvent::Diagnostic {
            name: "download button text".to_string(),
            value: text.trim().to_string(),
        });
    }
    narrate_position(ctx, "download button", &button).await;
    ctx.pause(ctx.config.pacing.before_click).await;

    let mut watch = ctx
        .page
        .arm_download_watch()
        .await
        .map_err(|err| StepFailure::new(Stage::TriggerDownload, err.into()))?;

    button
        .element
        .click()
        .await
        .map_err(|err| StepFailure::new(Stage::TriggerDownload, err.into()))?;
    ctx.narrate(NarrationEvent::Clicked {
        target: ladder.target.clone(),
    });

    let download = watch
        .next_download(ctx.config.timeouts.download)
        .await
        .map_err(|err| StepFailure::new(Stage::AwaitDownload, err.into()))?;

    let Some(download) = download else {
        ctx.narrate(NarrationEvent::DownloadTimedOut {
            waited: ctx.config.timeouts.download,
        });
        narrate_download_diagnostics(ctx, &button).await;
        return Err(StepFailure::new(
            Stage::AwaitDownload,
            StepError::DownloadTimeout {
                waited: ctx.config.timeouts.download,
            },
        ));
    };

    let filename = download.suggested_filename();
    ctx.narrate(NarrationEvent::DownloadStarted {
        filename: filename.clone(),
    });

    let dest = ctx.config.downloads_dir.join(&filename);
    download
        .save_as(&dest)
        .await
        .map_err(|err| StepFailure::new(Stage::PersistFile, err.into()))?;
    ctx.narrate(NarrationEvent::DownloadSaved {
        filename,
        path: dest.clone(),
    });

    scan_success_indicators(ctx).await;
    Ok(dest)
}

/// Where the control sits on the page, when it has a layout box.
async fn narrate_position(ctx: &FlowCtx<'_>, name: &str, control: &Resolved) {
    if let Ok(Some(rect)) = control.element.bounding_box().await {
        ctx.narrate(NarrationEvent::Diagnostic {
            name: format!("{name} position"),
            value: format!("x={}, y={}", rect.x, rect.y),
        });
    }
}

/// What the operator needs to see when the download never materialized.
async fn narrate_download_diagnostics(ctx: &FlowCtx<'_>, button: &Resolved) {
    let diagnostic = |name: &str, value: String| NarrationEvent::Diagnostic {
        name: name.to_string(),
        value,
    };

    if let Ok(url) = ctx.page.url().await {
        ctx.narrate(diagnostic("current url", url));
    }
    if let Ok(count) = ctx.page.page_count().await {
        ctx.narrate(diagnostic("open pages", count.to_string()));
    }

    if let Ok(Some(text)) = button.element.inner_text().await {
        ctx.narrate(diagnostic("button text after click", text.trim().to_string()));
    }
    if let Ok(disabled) = button.element.is_disabled().await {
        ctx.narrate(diagnostic("button disabled", disabled.to_string()));
    }

    let loading = ctx
        .page
        .locate_all(&selectors::loading_indicators())
        .await
        .unwrap_or_default();
    ctx.narrate(diagnostic("loading indicators", loading.len().to_string()));

    let alerts = ctx
        .page
        .locate_all(&selectors::error_messages())
        .await
        .unwrap_or_default();
    ctx.narrate(diagnostic("alerts", alerts.len().to_string()));
    for alert in &alerts {
        if let Ok(Some(text)) = alert.inner_text().await {
            ctx.narrate(diagnostic("alert text", text.trim().to_string()));
        }
    }
}

/// Look for a transient confirmation after a download starts. First visible
/// indicator wins; finding none is normal.
async fn scan_success_indicators(ctx: &FlowCtx<'_>) {
    for locator in selectors::success_indicators() {
        if let Some(element) = wait_visible(ctx.page, &locator, ctx.config.timeouts.indicator).await
        {
            let message = element.inner_text().await.unwrap_or(None).unwrap_or_default();
            ctx.narrate(NarrationEvent::Diagnostic {
                name: "download indicator".to_string(),
                value: message.trim().to_string(),
            });
            break;
        }
    }
}

/// Reset the dialog for the next account via "Download other activity".
///
/// A disabled control ends the account's sequence cleanly without a click;
/// the outer loop re-resolves everything for the next account anyway.
pub async fn download_another(ctx: &FlowCtx<'_>) -> Result<(), StepFailure> {
    ctx.pause(ctx.config.pacing.after_page_change).await;

    let ladder = selectors::download_another_button();
    let button = ctx
        .resolve(&ladder, ctx.config.timeouts.probe)
        .await
        .ok_or_else(|| StepFailure::new(Stage::TriggerDownloadAnother, ctx.not_found(&ladder)))?;

    narrate_position(ctx, "download other activity button", &button).await;
    if button.element.is_disabled().await.unwrap_or(false) {
        ctx.narrate(NarrationEvent::DownloadAnotherDisabled);
        return Ok(());
    }

    ctx.pause(ctx.config.pacing.before_click).await;
    button
        .element
        .click()
        .await
        .map_err(|err| StepFailure::new(Stage::TriggerDownloadAnother, err.into()))?;
    ctx.narrate(NarrationEvent::Clicked {
        target: ladder.target.clone(),
    });
    ctx.pause(ctx.config.pacing.after_page_change).await;

    scan_ready_indicators(ctx).await;
    Ok(())
}

/// Purely informational check that the dialog looks ready again.
async fn scan_ready_indicators(ctx: &FlowCtx<'_>) {
    for locator in selectors::ready_indicators() {
        if wait_visible(ctx.page, &locator, ctx.config.timeouts.ready)
            .await
            .is_some()
        {
            ctx.narrate(NarrationEvent::ReadyForNext {
                indicator: locator.to_string(),
            });
            break;
        }
    }
}
