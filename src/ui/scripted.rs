//! Scripted in-memory page for tests.
//!
//! Elements are registered under the canonical string form of the locator
//! that should find them (see [`Locator`]'s `Display` impl). Click and key
//! hooks mutate other scripted elements, which is enough to walk the whole
//! dialog flow without a browser.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::ui::{DownloadHandle, DownloadWatch, Element, Locator, Page, Rect};

const WATCH_POLL: Duration = Duration::from_millis(50);

/// Behavior of one scripted element.
#[derive(Debug, Clone, Default)]
pub struct ScriptedElement {
    visible: bool,
    polls_until_visible: u32,
    text: Option<String>,
    attributes: HashMap<String, String>,
    disabled: bool,
    rect: Option<Rect>,
    attribute_error: Option<String>,
}

impl ScriptedElement {
    /// A hidden element with no text or attributes.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible(mut self) -> Self {
        self.visible = true;
        self
    }

    /// Visible only after `polls` visibility checks have come back false.
    pub fn visible_after(mut self, polls: u32) -> Self {
        self.visible = true;
        self.polls_until_visible = polls;
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Layout box reported by `bounding_box`. Unset elements report none.
    pub fn rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.rect = Some(Rect {
            x,
            y,
            width,
            height,
        });
        self
    }

    /// Make every attribute read fail, as a dropped CDP session would.
    pub fn attribute_read_error(mut self, message: impl Into<String>) -> Self {
        self.attribute_error = Some(message.into());
        self
    }
}

/// State change applied when a scripted element is clicked or keyed.
#[derive(Debug, Clone)]
pub enum Mutation {
    SetAttribute {
        selector: String,
        name: String,
        value: String,
    },
    SetText {
        selector: String,
        text: String,
    },
    Show {
        selector: String,
    },
    Hide {
        selector: String,
    },
    Remove {
        selector: String,
    },
}

#[derive(Default)]
struct ScriptedState {
    url: String,
    page_count: usize,
    body_text: String,
    elements: HashMap<String, Vec<ScriptedElement>>,
    click_hooks: HashMap<String, Vec<Mutation>>,
    press_hooks: HashMap<(String, String), Vec<Mutation>>,
    clicks: Vec<String>,
    presses: Vec<(String, String)>,
    visits: Vec<String>,
    downloads: VecDeque<ScriptedDownload>,
}

impl ScriptedState {
    fn apply(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::SetAttribute {
                selector,
                name,
                value,
            } => {
                if let Some(element) = self.first_mut(selector) {
                    element.attributes.insert(name.clone(), value.clone());
                }
            }
            Mutation::SetText { selector, text } => {
                if let Some(element) = self.first_mut(selector) {
                    element.text = Some(text.clone());
                }
            }
            Mutation::Show { selector } => {
                if let Some(element) = self.first_mut(selector) {
                    element.visible = true;
                    element.polls_until_visible = 0;
                }
            }
            Mutation::Hide { selector } => {
                if let Some(element) = self.first_mut(selector) {
                    element.visible = false;
                }
            }
            Mutation::Remove { selector } => {
                self.elements.remove(selector);
            }
        }
    }

    fn first_mut(&mut self, selector: &str) -> Option<&mut ScriptedElement> {
        self.elements.get_mut(selector).and_then(|v| v.first_mut())
    }
}

#[derive(Debug, Clone)]
struct ScriptedDownload {
    filename: String,
    content: Vec<u8>,
}

/// In-memory [`Page`] implementation driven entirely by the test.
#[derive(Clone)]
pub struct ScriptedPage {
    state: Arc<Mutex<ScriptedState>>,
}

impl Default for ScriptedPage {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedPage {
    pub fn new() -> Self {
        let state = ScriptedState {
            url: "https://bank.example/".to_string(),
            page_count: 1,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Register an element under the canonical locator string that should
    /// find it. Repeated calls with the same selector stack elements, which
    /// is what enumeration probes see.
    pub fn add_element(&self, selector: &str, element: ScriptedElement) {
        self.state
            .lock()
            .expect("scripted state lock poisoned")
            .elements
            .entry(selector.to_string())
            .or_default()
            .push(element);
    }

    pub fn set_body_text(&self, text: &str) {
        self.state.lock().expect("scripted state lock poisoned").body_text = text.to_string();
    }

    pub fn set_url(&self, url: &str) {
        self.state.lock().expect("scripted state lock poisoned").url = url.to_string();
    }

    pub fn set_page_count(&self, count: usize) {
        self.state.lock().expect("scripted state lock poisoned").page_count = count;
    }

    /// Apply `mutation` whenever the element under `selector` is clicked.
    pub fn on_click(&self, selector: &str, mutation: Mutation) {
        self.state
            .lock()
            .expect("scripted state lock poisoned")
            .click_hooks
            .entry(selector.to_string())
            .or_default()
            .push(mutation);
    }

    /// Apply `mutation` whenever `key` is pressed on the element under
    /// `selector`.
    pub fn on_press(&self, selector: &str, key: &str, mutation: Mutation) {
        self.state
            .lock()
            .expect("scripted state lock poisoned")
            .press_hooks
            .entry((selector.to_string(), key.to_string()))
            .or_default()
            .push(mutation);
    }

    /// Queue a download the next armed watch will yield.
    pub fn queue_download(&self, filename: &str, content: &[u8]) {
        self.state
            .lock()
            .expect("scripted state lock poisoned")
            .downloads
            .push_back(ScriptedDownload {
                filename: filename.to_string(),
                content: content.to_vec(),
            });
    }

    /// Selectors clicked, in order.
    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().expect("scripted state lock poisoned").clicks.clone()
    }

    /// `(selector, key)` pairs pressed, in order.
    pub fn presses(&self) -> Vec<(String, String)> {
        self.state.lock().expect("scripted state lock poisoned").presses.clone()
    }

    /// URLs navigated to, in order.
    pub fn visits(&self) -> Vec<String> {
        self.state.lock().expect("scripted state lock poisoned").visits.clone()
    }
}

#[async_trait]
impl Page for ScriptedPage {
    async fn goto(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().expect("scripted state lock poisoned");
        state.visits.push(url.to_string());
        state.url = url.to_string();
        Ok(())
    }

    async fn url(&self) -> Result<String> {
        Ok(self.state.lock().expect("scripted state lock poisoned").url.clone())
    }

    async fn page_count(&self) -> Result<usize> {
        Ok(self.state.lock().expect("scripted state lock poisoned").page_count)
    }

    async fn locate(&self, locator: &Locator) -> Result<Option<Box<dyn Element>>> {
        let key = locator.to_string();
        let state = self.state.lock().expect("scripted state lock poisoned");
        let found = state
            .elements
            .get(&key)
            .map_or(false, |elements| !elements.is_empty());
        drop(state);

        if found {
            Ok(Some(Box::new(ScriptedHandle {
                state: self.state.clone(),
                selector: key,
                index: 0,
            })))
        } else {
            Ok(None)
        }
    }

    async fn locate_all(&self, locator: &Locator) -> Result<Vec<Box<dyn Element>>> {
        let key = locator.to_string();
        let count = self
            .state
            .lock()
            .expect("scripted state lock poisoned")
            .elements
            .get(&key)
            .map_or(0, Vec::len);

        Ok((0..count)
            .map(|index| {
                Box::new(ScriptedHandle {
                    state: self.state.clone(),
                    selector: key.clone(),
                    index,
                }) as Box<dyn Element>
            })
            .collect())
    }

    async fn body_text_contains(&self, needle: &str) -> Result<bool> {
        let state = self.state.lock().expect("scripted state lock poisoned");
        Ok(state
            .body_text
            .to_lowercase()
            .contains(&needle.to_lowercase()))
    }

    async fn arm_download_watch(&self) -> Result<Box<dyn DownloadWatch>> {
        Ok(Box::new(ScriptedWatch {
            state: self.state.clone(),
        }))
    }
}

struct ScriptedHandle {
    state: Arc<Mutex<ScriptedState>>,
    selector: String,
    index: usize,
}

impl ScriptedHandle {
    fn read<T>(&self, f: impl FnOnce(&ScriptedElement) -> T) -> Option<T> {
        let state = self.state.lock().expect("scripted state lock poisoned");
        state
            .elements
            .get(&self.selector)
            .and_then(|v| v.get(self.index))
            .map(f)
    }
}

#[async_trait]
impl Element for ScriptedHandle {
    async fn is_visible(&self) -> Result<bool> {
        let mut state = self.state.lock().expect("scripted state lock poisoned");
        let Some(element) = state
            .elements
            .get_mut(&self.selector)
            .and_then(|v| v.get_mut(self.index))
        else {
            return Ok(false);
        };

        if element.polls_until_visible > 0 {
            element.polls_until_visible -= 1;
            return Ok(false);
        }
        Ok(element.visible)
    }

    async fn click(&self) -> Result<()> {
        let mut state = self.state.lock().expect("scripted state lock poisoned");
        state.clicks.push(self.selector.clone());
        let mutations = state
            .click_hooks
            .get(&self.selector)
            .cloned()
            .unwrap_or_default();
        for mutation in &mutations {
            state.apply(mutation);
        }
        Ok(())
    }

    async fn inner_text(&self) -> Result<Option<String>> {
        Ok(self.read(|element| element.text.clone()).flatten())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        if let Some(message) = self.read(|element| element.attribute_error.clone()).flatten() {
            return Err(anyhow::anyhow!(message));
        }
        Ok(self
            .read(|element| element.attributes.get(name).cloned())
            .flatten())
    }

    async fn is_disabled(&self) -> Result<bool> {
        Ok(self.read(|element| element.disabled).unwrap_or(false))
    }

    async fn bounding_box(&self) -> Result<Option<Rect>> {
        Ok(self.read(|element| element.rect).flatten())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock().expect("scripted state lock poisoned");
        state.presses.push((self.selector.clone(), key.to_string()));
        let mutations = state
            .press_hooks
            .get(&(self.selector.clone(), key.to_string()))
            .cloned()
            .unwrap_or_default();
        for mutation in &mutations {
            state.apply(mutation);
        }
        Ok(())
    }
}

struct ScriptedWatch {
    state: Arc<Mutex<ScriptedState>>,
}

#[async_trait]
impl DownloadWatch for ScriptedWatch {
    async fn next_download(&mut self, timeout: Duration) -> Result<Option<Box<dyn DownloadHandle>>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let next = self
                .state
                .lock()
                .expect("scripted state lock poisoned")
                .downloads
                .pop_front();
            if let Some(download) = next {
                return Ok(Some(Box::new(ScriptedDownloadHandle { download })));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(WATCH_POLL).await;
        }
    }
}

struct ScriptedDownloadHandle {
    download: ScriptedDownload,
}

#[async_trait]
impl DownloadHandle for ScriptedDownloadHandle {
    fn suggested_filename(&self) -> String {
        self.download.filename.clone()
    }

    async fn save_as(&self, dest: &Path) -> Result<()> {
        tokio::fs::write(dest, &self.download.content).await?;
        Ok(())
    }
}
