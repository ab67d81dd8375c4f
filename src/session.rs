//! One attended run: launch Chrome, hand control to the operator for
//! login, then drive the download flow and tear the browser down.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::flow::{self, RunReport};
use crate::narrate::{ConsoleNarrator, NarrationEvent, Narrator};
use crate::ui::chrome::ChromeUi;
use crate::ui::Page;

/// Run the full attended session against a live browser.
///
/// Per-account failures are recorded in the report, not raised; the only
/// errors that abort the run are launch and initial navigation failures.
pub async fn run(config: &Config) -> Result<RunReport> {
    std::fs::create_dir_all(&config.downloads_dir).with_context(|| {
        format!(
            "Failed to create downloads directory: {}",
            config.downloads_dir.display()
        )
    })?;

    let narrator = ConsoleNarrator;
    let ui = ChromeUi::launch(config.browser.executable.as_deref()).await?;

    match attended_run(&ui, &narrator, config).await {
        Ok(report) => {
            println!("\nPress Enter to close the browser...");
            wait_for_enter();
            ui.close();
            Ok(report)
        }
        Err(err) => {
            ui.close();
            Err(err)
        }
    }
}

async fn attended_run(
    ui: &ChromeUi,
    narrator: &dyn Narrator,
    config: &Config,
) -> Result<RunReport> {
    narrator.narrate(NarrationEvent::RunStarted {
        url: config.start_url.clone(),
    });
    ui.goto(&config.start_url)
        .await
        .with_context(|| format!("Failed to open {}", config.start_url))?;

    println!("\n========================================");
    println!("Complete your login in the browser and");
    println!("open the account you want activity from.");
    println!("Then return here and press Enter.");
    println!("========================================\n");
    narrator.narrate(NarrationEvent::AwaitingOperator);
    wait_for_enter();
    narrator.narrate(NarrationEvent::Resumed);

    Ok(flow::run_flow(ui, narrator, config).await)
}

fn wait_for_enter() {
    let mut input = String::new();
    let _ = std::io::stdin().read_line(&mut input);
}
