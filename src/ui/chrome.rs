//! Live Chrome implementation of the browser seams, over the DevTools
//! protocol.
//!
//! Downloads are steered into a private staging directory so a watch can
//! tell new files from whatever the operator's browser already held.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use futures::StreamExt;
use tempfile::TempDir;

use super::{DownloadHandle, DownloadWatch, Element, Locator, Page, Rect};

/// Attribute used to hand text-matched nodes back to the CDP query layer,
/// which only speaks CSS.
const MARK_ATTR: &str = "data-ledgerpull-mark";

const DOWNLOAD_POLL: Duration = Duration::from_millis(500);

/// A headful Chrome session owning one tab.
pub struct ChromeUi {
    browser: Browser,
    page: chromiumoxide::Page,
    staging: TempDir,
    handler_task: tokio::task::JoinHandle<()>,
    mark_seq: AtomicU64,
}

impl ChromeUi {
    /// Launch a visible Chrome and prepare a tab with download capture.
    pub async fn launch(executable: Option<&Path>) -> Result<Self> {
        let chrome_path = match executable {
            Some(path) => path.display().to_string(),
            None => find_chrome().context(
                "Chrome/Chromium not found. Install Chrome or set browser.executable in the config.",
            )?,
        };
        tracing::debug!(path = %chrome_path, "Launching browser");

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .with_head()
            .viewport(None)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to configure browser: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;
        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        let page = browser.new_page("about:blank").await?;

        let staging = tempfile::Builder::new()
            .prefix("ledgerpull-staging-")
            .tempdir()
            .context("Failed to create download staging directory")?;
        tracing::debug!(dir = %staging.path().display(), "Staging downloads");

        let download_params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(staging.path().display().to_string())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build download params: {e}"))?;
        page.execute(download_params).await?;

        Ok(Self {
            browser,
            page,
            staging,
            handler_task,
            mark_seq: AtomicU64::new(0),
        })
    }

    /// Shut the browser down and stop the CDP event pump.
    pub fn close(self) {
        drop(self.page);
        drop(self.browser);
        self.handler_task.abort();
    }

    /// Tag matching nodes with a one-shot marker attribute and return a CSS
    /// selector for them, or `None` when nothing matched.
    ///
    /// Exact matching compares the trimmed text verbatim; substring matching
    /// is case-insensitive.
    async fn mark_text_matches(
        &self,
        css: &str,
        needle: &str,
        exact: bool,
        first_only: bool,
    ) -> Result<Option<String>> {
        let token = format!("m{}", self.mark_seq.fetch_add(1, Ordering::Relaxed));
        let hit = if exact {
            "text === needle"
        } else {
            "text.toLowerCase().includes(needle.toLowerCase())"
        };
        let script = format!(
            r#"(() => {{
                const needle = {needle};
                const token = {token};
                for (const stale of document.querySelectorAll('[{attr}]')) {{
                    stale.removeAttribute('{attr}');
                }}
                let marked = 0;
                for (const node of document.querySelectorAll({css})) {{
                    const text = (node.innerText || node.textContent || '').trim();
                    if (!({hit})) continue;
                    node.setAttribute('{attr}', token);
                    marked += 1;
                    if ({first_only}) break;
                }}
                return marked;
            }})()"#,
            needle = js_literal(needle),
            token = js_literal(&token),
            attr = MARK_ATTR,
            css = js_literal(css),
            hit = hit,
            first_only = first_only,
        );

        let marked: u64 = self.page.evaluate(script).await?.into_value().unwrap_or(0);
        if marked == 0 {
            return Ok(None);
        }
        Ok(Some(format!("[{MARK_ATTR}=\"{token}\"]")))
    }

    /// A CSS selector for the locator, marking text matches as needed.
    async fn css_for(&self, locator: &Locator) -> Result<Option<String>> {
        match locator {
            Locator::Css(css) => Ok(Some(css.clone())),
            Locator::TextWithin { css, needle } => {
                self.mark_text_matches(css, needle, false, true).await
            }
            Locator::ExactText(needle) => self.mark_text_matches("*", needle, true, true).await,
        }
    }

    async fn css_for_all(&self, locator: &Locator) -> Result<Option<String>> {
        match locator {
            Locator::Css(css) => Ok(Some(css.clone())),
            Locator::TextWithin { css, needle } => {
                self.mark_text_matches(css, needle, false, false).await
            }
            Locator::ExactText(needle) => self.mark_text_matches("*", needle, true, false).await,
        }
    }
}

#[async_trait]
impl Page for ChromeUi {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {url}"))?;
        Ok(())
    }

    async fn url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn page_count(&self) -> Result<usize> {
        Ok(self.browser.pages().await?.len())
    }

    async fn locate(&self, locator: &Locator) -> Result<Option<Box<dyn Element>>> {
        let Some(selector) = self.css_for(locator).await? else {
            return Ok(None);
        };
        // find_element errors when nothing matches; treat that as absence.
        match self.page.find_element(selector).await {
            Ok(element) => Ok(Some(Box::new(ChromeElement { element }))),
            Err(_) => Ok(None),
        }
    }

    async fn locate_all(&self, locator: &Locator) -> Result<Vec<Box<dyn Element>>> {
        let Some(selector) = self.css_for_all(locator).await? else {
            return Ok(Vec::new());
        };
        let elements = self.page.find_elements(selector).await.unwrap_or_default();
        Ok(elements
            .into_iter()
            .map(|element| Box::new(ChromeElement { element }) as Box<dyn Element>)
            .collect())
    }

    async fn body_text_contains(&self, needle: &str) -> Result<bool> {
        let script = format!(
            "document.body ? document.body.innerText.toLowerCase().includes({}) : false",
            js_literal(&needle.to_lowercase()),
        );
        Ok(self.page.evaluate(script).await?.into_value().unwrap_or(false))
    }

    async fn arm_download_watch(&self) -> Result<Box<dyn DownloadWatch>> {
        let staging = self.staging.path().to_path_buf();
        let seen = list_files(&staging)?;
        Ok(Box::new(StagingWatch { staging, seen }))
    }
}

struct ChromeElement {
    element: chromiumoxide::Element,
}

#[async_trait]
impl Element for ChromeElement {
    async fn is_visible(&self) -> Result<bool> {
        let returns = self
            .element
            .call_js_fn(
                r#"function() {
                    const style = window.getComputedStyle(this);
                    if (style.display === 'none' || style.visibility === 'hidden') {
                        return false;
                    }
                    const rect = this.getBoundingClientRect();
                    return rect.width > 0 && rect.height > 0;
                }"#,
                false,
            )
            .await?;
        Ok(returns
            .result
            .value
            .and_then(|value| value.as_bool())
            .unwrap_or(false))
    }

    async fn click(&self) -> Result<()> {
        self.element.click().await?;
        Ok(())
    }

    async fn inner_text(&self) -> Result<Option<String>> {
        Ok(self.element.inner_text().await?)
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        Ok(self.element.attribute(name).await?)
    }

    async fn is_disabled(&self) -> Result<bool> {
        let returns = self
            .element
            .call_js_fn(
                r#"function() {
                    return this.disabled === true
                        || this.hasAttribute('disabled')
                        || this.getAttribute('aria-disabled') === 'true';
                }"#,
                false,
            )
            .await?;
        Ok(returns
            .result
            .value
            .and_then(|value| value.as_bool())
            .unwrap_or(false))
    }

    async fn bounding_box(&self) -> Result<Option<Rect>> {
        let returns = self
            .element
            .call_js_fn(
                r#"function() {
                    const rect = this.getBoundingClientRect();
                    if (rect.width === 0 && rect.height === 0) {
                        return null;
                    }
                    return JSON.stringify({
                        x: rect.x,
                        y: rect.y,
                        width: rect.width,
                        height: rect.height,
                    });
                }"#,
                false,
            )
            .await?;
        let Some(raw) = returns.result.value.and_then(|value| match value {
            serde_json::Value::String(json) => Some(json),
            _ => None,
        }) else {
            return Ok(None);
        };
        let parsed: serde_json::Value = serde_json::from_str(&raw)?;
        Ok(Some(Rect {
            x: parsed["x"].as_f64().unwrap_or(0.0),
            y: parsed["y"].as_f64().unwrap_or(0.0),
            width: parsed["width"].as_f64().unwrap_or(0.0),
            height: parsed["height"].as_f64().unwrap_or(0.0),
        }))
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        // Key events go to the focused node, so focus explicitly first.
        self.element.focus().await?;
        self.element.press_key(key).await?;
        Ok(())
    }
}

/// Polls the staging directory for files that appeared after arming.
struct StagingWatch {
    staging: PathBuf,
    seen: HashSet<PathBuf>,
}

#[async_trait]
impl DownloadWatch for StagingWatch {
    async fn next_download(&mut self, timeout: Duration) -> Result<Option<Box<dyn DownloadHandle>>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            for file in list_files(&self.staging)? {
                if self.seen.contains(&file) {
                    continue;
                }
                let filename = file.file_name().unwrap_or_default().to_string_lossy();
                // Chrome renames the .crdownload once the file is complete.
                if filename.ends_with(".crdownload") {
                    continue;
                }
                tracing::debug!(file = %file.display(), "Download landed in staging");
                self.seen.insert(file.clone());
                return Ok(Some(Box::new(StagingDownload { path: file })));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(DOWNLOAD_POLL).await;
        }
    }
}

struct StagingDownload {
    path: PathBuf,
}

#[async_trait]
impl DownloadHandle for StagingDownload {
    fn suggested_filename(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_string())
    }

    async fn save_as(&self, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        // The staged file must go, or Chrome suffixes the next download with
        // the same remote name as "name (1)". Rename when staging and the
        // destination share a filesystem; copy and delete otherwise.
        if tokio::fs::rename(&self.path, dest).await.is_err() {
            tokio::fs::copy(&self.path, dest)
                .await
                .with_context(|| format!("Failed to save download to {}", dest.display()))?;
            tokio::fs::remove_file(&self.path)
                .await
                .with_context(|| {
                    format!("Failed to clear staged download: {}", self.path.display())
                })?;
        }
        Ok(())
    }
}

fn list_files(dir: &Path) -> Result<HashSet<PathBuf>> {
    Ok(std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read staging directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect())
}

/// Quote a string as a JavaScript literal.
fn js_literal(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Find a Chrome/Chromium executable on this machine.
fn find_chrome() -> Option<String> {
    for name in ["google-chrome", "chromium"] {
        if let Ok(output) = std::process::Command::new("which").arg(name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(path);
                }
            }
        }
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];
    candidates
        .iter()
        .find(|path| Path::new(path).exists())
        .map(|path| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_literal_escapes_quotes() {
        assert_eq!(js_literal(r#"a "b" c"#), r#""a \"b\" c""#);
    }

    #[test]
    fn test_js_literal_plain() {
        assert_eq!(js_literal("Download"), "\"Download\"");
    }

    #[tokio::test(start_paused = true)]
    async fn test_staging_watch_picks_up_new_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.csv"), b"old").unwrap();

        let mut watch = StagingWatch {
            staging: dir.path().to_path_buf(),
            seen: list_files(dir.path()).unwrap(),
        };

        std::fs::write(dir.path().join("statement.csv"), b"data").unwrap();
        let handle = watch
            .next_download(Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.suggested_filename(), "statement.csv");
    }

    #[tokio::test(start_paused = true)]
    async fn test_staging_watch_ignores_partial_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let mut watch = StagingWatch {
            staging: dir.path().to_path_buf(),
            seen: HashSet::new(),
        };

        std::fs::write(dir.path().join("statement.csv.crdownload"), b"partial").unwrap();
        let handle = watch.next_download(Duration::from_millis(600)).await.unwrap();
        assert!(handle.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_staging_watch_times_out_on_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut watch = StagingWatch {
            staging: dir.path().to_path_buf(),
            seen: HashSet::new(),
        };

        let handle = watch.next_download(Duration::from_secs(2)).await.unwrap();
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn test_staging_download_save_as_overwrites() {
        let staging = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let source = staging.path().join("statement.csv");
        std::fs::write(&source, b"new contents").unwrap();

        let dest = dest_dir.path().join("statement.csv");
        std::fs::write(&dest, b"stale").unwrap();

        let download = StagingDownload { path: source };
        download.save_as(&dest).await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"new contents");
    }

    #[tokio::test]
    async fn test_save_as_consumes_staged_file() {
        let staging = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let source = staging.path().join("statement.csv");
        std::fs::write(&source, b"rows").unwrap();

        let download = StagingDownload {
            path: source.clone(),
        };
        download.save_as(&dest_dir.path().join("statement.csv")).await.unwrap();

        assert!(!source.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_as_frees_staged_name_for_next_download() {
        let staging = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("Chase1234_Activity.CSV");

        let mut watch = StagingWatch {
            staging: staging.path().to_path_buf(),
            seen: HashSet::new(),
        };
        std::fs::write(staging.path().join("Chase1234_Activity.CSV"), b"first rows").unwrap();
        let first = watch
            .next_download(Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        first.save_as(&dest).await.unwrap();

        // The same remote name lands under its clean name again, so the next
        // armed watch hands back the right suggested filename.
        let mut watch = StagingWatch {
            staging: staging.path().to_path_buf(),
            seen: list_files(staging.path()).unwrap(),
        };
        std::fs::write(staging.path().join("Chase1234_Activity.CSV"), b"second rows").unwrap();
        let second = watch
            .next_download(Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.suggested_filename(), "Chase1234_Activity.CSV");
        second.save_as(&dest).await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"second rows");
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
    }
}
