//! Selector ladders for the activity-download dialog.
//!
//! This module is the whole markup contract with the site. Each target gets
//! a ladder of candidates ordered from most to least specific, so a redesign
//! that breaks one selector usually leaves a later one working. The attached
//! probes exist to make the narration useful when a ladder exhausts.

use crate::ui::{Ladder, Locator, Probe};

/// Link from the accounts overview to the full transactions page.
pub fn see_all_transactions() -> Ladder {
    Ladder::new(
        "\"See all transactions\" link",
        vec![Locator::exact_text("See all transactions")],
    )
    .with_probes(vec![
        Probe::Enumerate {
            label: "buttons mentioning transactions".to_string(),
            locator: Locator::text_within("button", "transactions"),
        },
        Probe::Enumerate {
            label: "links mentioning transactions".to_string(),
            locator: Locator::text_within("a", "transactions"),
        },
        Probe::BodyText {
            needle: "see all transactions".to_string(),
        },
        Probe::BodyText {
            needle: "transactions".to_string(),
        },
    ])
}

/// Button that opens the download-activity dialog.
pub fn download_activity_entry() -> Ladder {
    Ladder::new(
        "download activity button",
        vec![
            Locator::css("[data-testid=\"quick-action-download-activity-tooltip-button\"]"),
            Locator::css("#quick-action-download-activity-tooltip"),
            Locator::css("[aria-label=\"Download account activity\"]"),
        ],
    )
    .with_probes(vec![
        Probe::Enumerate {
            label: "buttons mentioning download".to_string(),
            locator: Locator::text_within("button", "download"),
        },
        Probe::Enumerate {
            label: "download-ish aria-labels".to_string(),
            locator: Locator::css("[aria-label*=\"download\" i]"),
        },
    ])
}

/// The account dropdown inside the dialog. Its `options` attribute carries
/// the account list as escaped JSON.
pub fn account_dropdown() -> Ladder {
    Ladder::new(
        "account dropdown",
        vec![Locator::css("mds-select#account-selector")],
    )
    .with_probes(vec![Probe::Enumerate {
        label: "select-like elements".to_string(),
        locator: Locator::css("select, mds-select, [role=\"combobox\"]"),
    }])
}

/// One account entry in the opened dropdown, addressed by its value.
pub fn account_option(value: &str) -> Ladder {
    Ladder::new(
        format!("account option {value}"),
        vec![
            Locator::css(format!("[data-value=\"{value}\"]")),
            Locator::css(format!("[value=\"{value}\"]")),
            Locator::css(format!("mds-option[value=\"{value}\"]")),
        ],
    )
}

/// The reporting-period dropdown. The later candidates match on the period
/// label itself, so resolving through one of them means the period is
/// already selected.
pub fn period_control(label: &str) -> Ladder {
    Ladder::new(
        "period dropdown",
        vec![
            Locator::css("#select-downloadActivityOptionId"),
            Locator::css(
                "button[aria-labelledby=\"label-value-announcement-downloadActivityOptionId\"]",
            ),
            Locator::text_within(".mds-select__select--box", label),
            Locator::text_within("button", label),
        ],
    )
    .with_probes(vec![Probe::Enumerate {
        label: "select-like elements".to_string(),
        locator: Locator::css("select, button[aria-haspopup=\"listbox\"], .mds-select__select"),
    }])
}

/// The period entry in the opened dropdown.
pub fn period_option(label: &str) -> Ladder {
    Ladder::new(
        format!("\"{label}\" option"),
        vec![
            Locator::text_within("mds-option", label),
            Locator::text_within("[role=\"option\"]", label),
            Locator::text_within(".mds-select__option", label),
            Locator::text_within("div", label),
        ],
    )
}

/// Whichever option the dropdown currently highlights during keyboard
/// navigation.
pub fn highlighted_option() -> Locator {
    Locator::css("[aria-selected=\"true\"], .mds-select__option--highlighted")
}

/// The primary button that triggers the download.
pub fn download_button() -> Ladder {
    Ladder::new(
        "download button",
        vec![
            Locator::text_within("button.button--primary", "Download"),
            Locator::text_within("button", "Download"),
            Locator::text_within("button .button__label", "Download"),
            Locator::text_within(".button--primary .button__label", "Download"),
            Locator::text_within("button[type=\"button\"]", "Download"),
            Locator::css(".button.button--primary.button--fluid"),
        ],
    )
    .with_probes(vec![Probe::Enumerate {
        label: "buttons on page".to_string(),
        locator: Locator::css("button"),
    }])
}

/// Transient confirmations some variants of the dialog show after the
/// download starts. Purely informational.
pub fn success_indicators() -> Vec<Locator> {
    vec![
        Locator::exact_text("Download started"),
        Locator::exact_text("Download complete"),
        Locator::exact_text("File downloaded"),
        Locator::css("[aria-live=\"polite\"]"),
        Locator::css(".success-message"),
        Locator::css(".download-success"),
    ]
}

/// Spinners and busy markers, counted when a download never materializes.
pub fn loading_indicators() -> Locator {
    Locator::css(".loading, .spinner, [aria-busy=\"true\"], .downloading")
}

/// Error and alert banners, quoted when a download never materializes.
pub fn error_messages() -> Locator {
    Locator::css(".error, .alert, .warning, [role=\"alert\"]")
}

/// The secondary button that resets the dialog for the next account.
pub fn download_another_button() -> Ladder {
    let label = "Download other activity";
    Ladder::new(
        "\"Download other activity\" button",
        vec![
            Locator::text_within("button.button--secondary", label),
            Locator::text_within("button", label),
            Locator::text_within("button .button__label", label),
            Locator::text_within(".button--secondary .button__label", label),
            Locator::text_within("button[type=\"button\"]", label),
            Locator::text_within(".button.button--secondary.button--fluid", label),
            Locator::text_within("span.button__label", label),
            Locator::text_within(".button--secondary", label),
        ],
    )
    .with_probes(vec![
        Probe::Enumerate {
            label: "secondary buttons".to_string(),
            locator: Locator::css("button.button--secondary, .button--secondary"),
        },
        Probe::Enumerate {
            label: "buttons mentioning other".to_string(),
            locator: Locator::text_within("button", "other"),
        },
        Probe::Enumerate {
            label: "buttons mentioning activity".to_string(),
            locator: Locator::text_within("button", "activity"),
        },
    ])
}

/// Signs that the dialog is back in its initial state after a reset.
/// Informational; the next account proceeds either way.
pub fn ready_indicators() -> Vec<Locator> {
    vec![
        Locator::css("mds-select#account-selector"),
        Locator::exact_text("Select account"),
        Locator::exact_text("Activity"),
        Locator::css(".mds-select__container"),
        Locator::text_within("button", "Download"),
    ]
}
