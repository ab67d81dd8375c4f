//! Candidate-ladder resolution.
//!
//! Selectors on this site rot quickly, so every target carries a ladder of
//! candidates tried in order. A candidate only counts as a match once the
//! element is actually visible; hidden template nodes stay in the DOM.

use std::time::Duration;

use crate::narrate::{NarrationEvent, Narrator};
use crate::ui::{Element, Ladder, Locator, Page, Probe};

/// How often a candidate is re-probed while waiting for visibility.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Longest nearby-element text quoted in diagnostics.
const NEARBY_TEXT_LIMIT: usize = 80;

/// Most elements described per enumeration probe.
const ENUMERATE_LIMIT: usize = 10;

/// A successful resolution: the element plus the candidate that matched.
pub struct Resolved {
    pub element: Box<dyn Element>,
    pub locator: Locator,
}

/// Resolve a ladder to a visible element.
///
/// Each candidate is polled for up to `per_candidate_timeout`, with at least
/// one probe even when the timeout is zero. Locate and visibility errors
/// count as misses for that probe. When every candidate misses, the ladder's
/// diagnostic probes run and `None` is returned.
pub async fn resolve_visible(
    page: &dyn Page,
    narrator: &dyn Narrator,
    ladder: &Ladder,
    per_candidate_timeout: Duration,
) -> Option<Resolved> {
    narrator.narrate(NarrationEvent::ProbingTarget {
        target: ladder.target.clone(),
    });

    for candidate in &ladder.candidates {
        if let Some(element) = wait_visible(page, candidate, per_candidate_timeout).await {
            narrator.narrate(NarrationEvent::CandidateMatched {
                target: ladder.target.clone(),
                selector: candidate.to_string(),
            });
            return Some(Resolved {
                element,
                locator: candidate.clone(),
            });
        }
        narrator.narrate(NarrationEvent::CandidateMissed {
            target: ladder.target.clone(),
            selector: candidate.to_string(),
        });
    }

    narrator.narrate(NarrationEvent::TargetNotFound {
        target: ladder.target.clone(),
    });
    run_probes(page, narrator, &ladder.probes).await;

    None
}

/// Poll one locator until its element is visible or the timeout lapses.
/// Probes at least once, so a zero timeout still sees an already-visible
/// element.
pub async fn wait_visible(
    page: &dyn Page,
    locator: &Locator,
    timeout: Duration,
) -> Option<Box<dyn Element>> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let found = page.locate(locator).await.unwrap_or(None);
        if let Some(element) = found {
            if element.is_visible().await.unwrap_or(false) {
                return Some(element);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Run a ladder's diagnostic probes and narrate what is actually on the page.
/// Purely informational; probe errors are swallowed.
async fn run_probes(page: &dyn Page, narrator: &dyn Narrator, probes: &[Probe]) {
    for probe in probes {
        match probe {
            Probe::Enumerate { label, locator } => {
                let elements = page.locate_all(locator).await.unwrap_or_default();
                narrator.narrate(NarrationEvent::Diagnostic {
                    name: label.clone(),
                    value: format!("{} matches", elements.len()),
                });
                for element in elements.iter().take(ENUMERATE_LIMIT) {
                    let text = describe_element(element.as_ref()).await;
                    narrator.narrate(NarrationEvent::NearbyElement {
                        probe: label.clone(),
                        text,
                    });
                }
            }
            Probe::BodyText { needle } => {
                let found = page.body_text_contains(needle).await.unwrap_or(false);
                narrator.narrate(NarrationEvent::BodyTextScan {
                    needle: needle.clone(),
                    found,
                });
            }
        }
    }
}

async fn describe_element(element: &dyn Element) -> String {
    let text = element
        .inner_text()
        .await
        .unwrap_or(None)
        .map(|t| truncate(t.trim()))
        .unwrap_or_default();
    let aria = element.attribute("aria-label").await.unwrap_or(None);

    match (text.is_empty(), aria) {
        (false, Some(aria)) => format!("{text} [aria-label: {aria}]"),
        (false, None) => text,
        (true, Some(aria)) => format!("[aria-label: {aria}]"),
        (true, None) => "<no text>".to_string(),
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= NEARBY_TEXT_LIMIT {
        text.to_string()
    } else {
        let head: String = text.chars().take(NEARBY_TEXT_LIMIT).collect();
        format!("{head}...")
    }
}
