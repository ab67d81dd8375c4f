//! Browser-facing seams.
//!
//! The flow logic talks to the page through the [`Page`] and [`Element`]
//! traits so it can run against a live Chrome tab or a scripted stand-in.

pub mod chrome;
pub mod resolve;
pub mod scripted;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// How to find an element on the page.
///
/// Text matching is not expressible in plain CSS, so it gets its own
/// variants and is evaluated in the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Plain CSS selector.
    Css(String),
    /// Elements matching `css` whose text contains `needle`, case-insensitively.
    TextWithin { css: String, needle: String },
    /// Any element whose trimmed text is exactly `needle`.
    ExactText(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn text_within(css: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::TextWithin {
            css: css.into(),
            needle: needle.into(),
        }
    }

    pub fn exact_text(needle: impl Into<String>) -> Self {
        Self::ExactText(needle.into())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(selector) => write!(f, "{selector}"),
            Self::TextWithin { css, needle } => write!(f, "{css}:has-text(\"{needle}\")"),
            Self::ExactText(needle) => write!(f, "text=\"{needle}\""),
        }
    }
}

/// Element position and size in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Diagnostic to run when a ladder exhausts without a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Enumerate matching elements and narrate their text and aria-label.
    Enumerate { label: String, locator: Locator },
    /// Report whether the page body text mentions the needle.
    BodyText { needle: String },
}

/// A target with its locator candidates, tried in order, plus the
/// diagnostics to run when none of them matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ladder {
    /// Human name for narration, e.g. "download button".
    pub target: String,
    pub candidates: Vec<Locator>,
    pub probes: Vec<Probe>,
}

impl Ladder {
    pub fn new(target: impl Into<String>, candidates: Vec<Locator>) -> Self {
        Self {
            target: target.into(),
            candidates,
            probes: Vec::new(),
        }
    }

    pub fn with_probes(mut self, probes: Vec<Probe>) -> Self {
        self.probes = probes;
        self
    }
}

/// A single browser tab.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate the tab.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Current URL, for diagnostics.
    async fn url(&self) -> Result<String>;

    /// Number of open tabs in the browser, for diagnostics.
    async fn page_count(&self) -> Result<usize>;

    /// First element matching the locator, visible or not.
    async fn locate(&self, locator: &Locator) -> Result<Option<Box<dyn Element>>>;

    /// All elements matching the locator.
    async fn locate_all(&self, locator: &Locator) -> Result<Vec<Box<dyn Element>>>;

    /// Whether the page body text contains the needle, case-insensitively.
    async fn body_text_contains(&self, needle: &str) -> Result<bool>;

    /// Start watching for downloads. Must be armed before the click that
    /// triggers the download, or a fast download can slip past unseen.
    async fn arm_download_watch(&self) -> Result<Box<dyn DownloadWatch>>;
}

/// A handle to one located element.
///
/// Handles are not live queries. Callers re-locate after anything that can
/// re-render the widget.
#[async_trait]
pub trait Element: Send + Sync {
    async fn is_visible(&self) -> Result<bool>;

    async fn click(&self) -> Result<()>;

    async fn inner_text(&self) -> Result<Option<String>>;

    async fn attribute(&self, name: &str) -> Result<Option<String>>;

    /// Disabled either via the `disabled` attribute or `aria-disabled`.
    async fn is_disabled(&self) -> Result<bool>;

    /// Position and size, or `None` when the element has no layout box.
    async fn bounding_box(&self) -> Result<Option<Rect>>;

    /// Focus the element and press a key, e.g. "ArrowDown" or "Enter".
    async fn press_key(&self, key: &str) -> Result<()>;
}

/// Watches for downloads that finish after a fixed arming point.
#[async_trait]
pub trait DownloadWatch: Send + Sync {
    /// Next finished download, or `None` if the timeout lapses first.
    async fn next_download(&mut self, timeout: Duration) -> Result<Option<Box<dyn DownloadHandle>>>;
}

/// One finished download.
#[async_trait]
pub trait DownloadHandle: Send + Sync {
    /// Filename the site suggested for the artifact.
    fn suggested_filename(&self) -> String;

    /// Persist the artifact at `dest`, replacing any previous file there.
    async fn save_as(&self, dest: &Path) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_display_css() {
        let locator = Locator::css("mds-select#account-selector");
        assert_eq!(locator.to_string(), "mds-select#account-selector");
    }

    #[test]
    fn test_locator_display_text_within() {
        let locator = Locator::text_within("button", "Download");
        assert_eq!(locator.to_string(), "button:has-text(\"Download\")");
    }

    #[test]
    fn test_locator_display_exact_text() {
        let locator = Locator::exact_text("See all transactions");
        assert_eq!(locator.to_string(), "text=\"See all transactions\"");
    }

    #[test]
    fn test_ladder_with_probes() {
        let ladder = Ladder::new(
            "download button",
            vec![Locator::css("#dl")],
        )
        .with_probes(vec![Probe::BodyText {
            needle: "download".to_string(),
        }]);

        assert_eq!(ladder.target, "download button");
        assert_eq!(ladder.candidates.len(), 1);
        assert_eq!(ladder.probes.len(), 1);
    }
}
