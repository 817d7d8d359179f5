//! Opened pages and reading their text.
//!
//! A [`Tabs`] set plays the part of the browser window: pages are opened by
//! URL, the most recently opened or focused one is active, and each may
//! carry a user selection. [`PageReader`] loads a tab and extracts the text
//! the summary prompt is built from.

use crate::extract::{self, MIN_PAGE_CHARS};
use reqwest::{Client, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub type TabId = u32;

/// Schemes written without `//` that still mark a full URL.
const OPAQUE_SCHEMES: &[&str] = &[
    "about",
    "chrome",
    "data",
    "edge",
    "file",
    "javascript",
    "mailto",
    "view-source",
];

fn has_scheme(url: &str) -> bool {
    if url.contains("://") {
        return true;
    }
    url.split_once(':')
        .is_some_and(|(scheme, _)| OPAQUE_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()))
}

#[derive(Debug, Error)]
pub enum PageError {
    #[error("No active tab found.")]
    NoActiveTab,
    #[error("No tab with id {0}.")]
    UnknownTab(TabId),
    #[error("Pages using '{0}' cannot be read.")]
    Restricted(String),
    #[error("Failed to fetch page: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("Failed to fetch page: {0}")]
    Status(u16),
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not extract readable text from the page.")]
    Unreadable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tab {
    pub id: TabId,
    pub url: String,
    pub selection: Option<String>,
}

#[derive(Debug, Default)]
pub struct Tabs {
    tabs: Vec<Tab>,
    active: Option<TabId>,
    next_id: TabId,
}

impl Tabs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `url` in a new tab and focuses it. Bare hosts (including
    /// `host:port`) get `https://`.
    pub fn open(&mut self, url: &str) -> TabId {
        let url = url.trim();
        let url = if has_scheme(url) {
            url.to_string()
        } else {
            format!("https://{}", url)
        };
        self.next_id += 1;
        let id = self.next_id;
        self.tabs.push(Tab {
            id,
            url,
            selection: None,
        });
        self.active = Some(id);
        debug!(id, url = %self.tabs[self.tabs.len() - 1].url, "Opened tab");
        id
    }

    pub fn focus(&mut self, id: TabId) -> Result<(), PageError> {
        if self.get(id).is_none() {
            return Err(PageError::UnknownTab(id));
        }
        self.active = Some(id);
        Ok(())
    }

    /// Closes the active tab; the most recently opened remaining tab takes over.
    pub fn close_active(&mut self) -> Option<Tab> {
        let id = self.active?;
        let idx = self.tabs.iter().position(|t| t.id == id)?;
        let closed = self.tabs.remove(idx);
        self.active = self.tabs.last().map(|t| t.id);
        Some(closed)
    }

    pub fn active_tab_id(&self) -> Result<TabId, PageError> {
        self.active.ok_or(PageError::NoActiveTab)
    }

    pub fn active(&self) -> Option<&Tab> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn get(&self, id: TabId) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.id == id)
    }

    pub fn list(&self) -> &[Tab] {
        &self.tabs
    }

    /// Sets (or clears, when blank) the selection on the active tab.
    pub fn select_text(&mut self, text: &str) -> Result<(), PageError> {
        let id = self.active_tab_id()?;
        let tab = self
            .tabs
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(PageError::UnknownTab(id))?;
        let text = text.trim();
        tab.selection = (!text.is_empty()).then(|| text.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PageReader {
    client: Client,
}

impl Default for PageReader {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl PageReader {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    async fn load(&self, url: &str) -> Result<String, PageError> {
        let scheme = url.split_once(':').map(|(s, _)| s.to_ascii_lowercase());
        match scheme.as_deref() {
            Some("http") | Some("https") => {
                let response = self
                    .client
                    .get(url)
                    .header("User-Agent", "Mozilla/5.0 (compatible; pagelens/0.1)")
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(PageError::Status(response.status().as_u16()));
                }
                Ok(response.text().await?)
            }
            Some("file") => {
                let path = Url::parse(url)
                    .ok()
                    .and_then(|u| u.to_file_path().ok())
                    .ok_or_else(|| {
                        std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a local file URL")
                    })?;
                Ok(tokio::fs::read_to_string(path).await?)
            }
            Some(other) => Err(PageError::Restricted(other.to_string())),
            None => Err(PageError::Restricted(url.to_string())),
        }
    }

    /// Readable text of `tab`, at most `max_chars` characters.
    pub async fn extract_page_text(&self, tab: &Tab, max_chars: usize) -> Result<String, PageError> {
        let html = match &tab.selection {
            // A long selection does not need the page at all.
            Some(sel) if sel.trim().chars().count() > extract::MIN_SELECTION_CHARS => String::new(),
            _ => self.load(&tab.url).await?,
        };
        let text = extract::page_excerpt(&html, tab.selection.as_deref(), max_chars);
        debug!(id = tab.id, chars = text.chars().count(), "Extracted page text");
        if text.chars().count() < MIN_PAGE_CHARS {
            return Err(PageError::Unreadable);
        }
        Ok(text)
    }
}
