use std::path::Path;

use ledgerpull::config::Config;
use ledgerpull::ui::scripted::{Mutation, ScriptedElement, ScriptedPage};

// Canonical locator strings the selector ladders resolve through first.
pub const SEE_ALL_TRANSACTIONS: &str = "text=\"See all transactions\"";
pub const DOWNLOAD_ENTRY: &str = "[data-testid=\"quick-action-download-activity-tooltip-button\"]";
pub const ACCOUNT_DROPDOWN: &str = "mds-select#account-selector";
pub const DOWNLOAD_BUTTON: &str = "button.button--primary:has-text(\"Download\")";
pub const DOWNLOAD_ANOTHER: &str = "button.button--secondary:has-text(\"Download other activity\")";

const PERIOD_CONTROL: &str = "#select-downloadActivityOptionId";

pub fn account_option_selector(value: &str) -> String {
    format!("[data-value=\"{value}\"]")
}

/// The escaped-JSON payload the account dropdown carries in its `options`
/// attribute, as the site serializes it.
pub fn options_attribute(accounts: &[(&str, &str)]) -> String {
    let entries: Vec<serde_json::Value> = accounts
        .iter()
        .enumerate()
        .map(|(index, (name, value))| {
            serde_json::json!({ "name": name, "value": value, "index": index })
        })
        .collect();
    serde_json::Value::Array(entries)
        .to_string()
        .replace('"', "&quot;")
}

/// Stage a page holding the whole post-login surface: both entry controls,
/// the account dropdown with its options payload, one clickable option per
/// account, the period control already showing "Since last statement", and
/// both dialog buttons.
///
/// Clicking an account option updates the dropdown's `value` attribute the
/// way the real widget does, so selection verification passes.
pub fn stage_dialog(page: &ScriptedPage, accounts: &[(&str, &str)]) {
    page.add_element(SEE_ALL_TRANSACTIONS, ScriptedElement::new().visible());
    page.add_element(DOWNLOAD_ENTRY, ScriptedElement::new().visible());
    page.add_element(
        ACCOUNT_DROPDOWN,
        ScriptedElement::new()
            .visible()
            .attribute("options", options_attribute(accounts)),
    );

    for (_, value) in accounts {
        let selector = account_option_selector(value);
        page.add_element(&selector, ScriptedElement::new().visible());
        page.on_click(
            &selector,
            Mutation::SetAttribute {
                selector: ACCOUNT_DROPDOWN.to_string(),
                name: "value".to_string(),
                value: value.to_string(),
            },
        );
    }

    page.add_element(
        PERIOD_CONTROL,
        ScriptedElement::new().visible().text("Since last statement"),
    );
    page.add_element(
        DOWNLOAD_BUTTON,
        ScriptedElement::new().visible().text("Download"),
    );
    page.add_element(
        DOWNLOAD_ANOTHER,
        ScriptedElement::new().visible().text("Download other activity"),
    );
}

pub fn test_config(downloads_dir: &Path) -> Config {
    let mut config = Config::default();
    config.downloads_dir = downloads_dir.to_path_buf();
    config
}
