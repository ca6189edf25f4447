//! Scripted in-memory renderer for unit tests

use crate::render::{ElementHandle, PageRenderer, PageSnapshot, RenderError, RenderResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};

/// Serves canned HTML per URL and records every call
///
/// A URL may hold several bodies: each load consumes one until a single body
/// remains, which is then served for every further load.
#[derive(Default)]
pub struct FakeRenderer {
    pages: HashMap<String, VecDeque<String>>,
    failures: HashMap<String, u32>,
    redirects: HashMap<String, (String, u32)>,
    unreadable: HashSet<String>,
    scripts: HashMap<String, String>,
    no_scripts: bool,
    page: Option<PageSnapshot>,
    generation: u64,
    /// Every navigation, refresh and script call, in order
    pub log: Vec<String>,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages
            .entry(url.to_string())
            .or_default()
            .push_back(html.to_string());
        self
    }

    /// Makes the next `times` loads of `url` fail
    pub fn failing(mut self, url: &str, times: u32) -> Self {
        self.failures.insert(url.to_string(), times);
        self
    }

    /// Sends the next `times` loads of `from` to `to`
    pub fn redirect(mut self, from: &str, to: &str, times: u32) -> Self {
        self.redirects.insert(from.to_string(), (to.to_string(), times));
        self
    }

    /// Loads `url` normally but fails every query against it
    pub fn unreadable(mut self, url: &str) -> Self {
        self.unreadable.insert(url.to_string());
        self
    }

    /// Behaves like a renderer without a script engine
    pub fn without_scripts(mut self) -> Self {
        self.no_scripts = true;
        self
    }

    /// Maps a script to the URL it navigates to
    pub fn script(mut self, script: &str, url: &str) -> Self {
        self.scripts.insert(script.to_string(), url.to_string());
        self
    }

    pub fn navigations(&self) -> Vec<&str> {
        self.log
            .iter()
            .filter_map(|entry| entry.strip_prefix("navigate "))
            .collect()
    }

    fn load(&mut self, url: &str) -> RenderResult<()> {
        let url = match self.redirects.get_mut(url) {
            Some((to, remaining)) if *remaining > 0 => {
                *remaining -= 1;
                to.clone()
            }
            _ => url.to_string(),
        };
        let url = &url;

        if let Some(remaining) = self.failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RenderError::Navigation {
                    url: url.to_string(),
                    message: "simulated failure".to_string(),
                });
            }
        }

        let bodies = self.pages.get_mut(url).ok_or_else(|| RenderError::Status {
            url: url.to_string(),
            status: 404,
        })?;
        let body = if bodies.len() > 1 {
            bodies.pop_front().unwrap_or_default()
        } else {
            bodies.front().cloned().unwrap_or_default()
        };

        self.generation += 1;
        self.page = Some(PageSnapshot::new(url, body, self.generation));
        Ok(())
    }

    fn current(&self) -> RenderResult<&PageSnapshot> {
        self.page.as_ref().ok_or(RenderError::NoPage)
    }

    fn readable(&self) -> RenderResult<&PageSnapshot> {
        let page = self.current()?;
        if self.unreadable.contains(page.url()) {
            return Err(RenderError::Script(format!("cannot read {}", page.url())));
        }
        Ok(page)
    }
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn navigate(&mut self, url: &str) -> RenderResult<()> {
        self.log.push(format!("navigate {}", url));
        self.load(url)
    }

    async fn wait_until_ready(&mut self) -> RenderResult<()> {
        self.current().map(|_| ())
    }

    async fn refresh(&mut self) -> RenderResult<()> {
        let url = self.current()?.url().to_string();
        self.log.push(format!("refresh {}", url));
        self.load(&url)
    }

    fn current_url(&self) -> Option<&str> {
        self.page.as_ref().map(PageSnapshot::url)
    }

    async fn query_selector(
        &mut self,
        scope: Option<ElementHandle>,
        selector: &str,
    ) -> RenderResult<Option<ElementHandle>> {
        Ok(self.readable()?.select(scope, selector, true)?.into_iter().next())
    }

    async fn query_selector_all(
        &mut self,
        scope: Option<ElementHandle>,
        selector: &str,
    ) -> RenderResult<Vec<ElementHandle>> {
        self.readable()?.select(scope, selector, false)
    }

    async fn element_text(&mut self, handle: ElementHandle) -> RenderResult<String> {
        self.readable()?.text(handle)
    }

    async fn element_attribute(
        &mut self,
        handle: ElementHandle,
        name: &str,
    ) -> RenderResult<Option<String>> {
        self.readable()?.attribute(handle, name)
    }

    async fn evaluate_script(&mut self, script: &str) -> RenderResult<String> {
        self.log.push(format!("script {}", script));
        if self.no_scripts {
            return Err(RenderError::Unsupported(script.to_string()));
        }
        let url = self
            .scripts
            .get(script)
            .cloned()
            .ok_or_else(|| RenderError::Script(format!("unknown script {}", script)))?;
        self.load(&url)?;
        Ok(String::new())
    }

    fn supports_scripts(&self) -> bool {
        !self.no_scripts
    }
}
