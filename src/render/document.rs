//! Static HTML snapshot queried with CSS selectors
//!
//! scraper's parsed tree is not `Send`, so a snapshot keeps the page source
//! and parses it again only for selector matching. Text and attributes of
//! every element are indexed once at load. Element handles are ordinals in
//! document order, tagged with the snapshot generation to catch reuse after
//! navigation.

use crate::render::{ElementHandle, RenderError, RenderResult};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::ops::Range;

#[derive(Debug, Clone)]
struct ElementData {
    /// Descendant text nodes, as a range into `PageSnapshot::texts`
    text: Range<usize>,
    attributes: Vec<(String, String)>,
}

/// One loaded page: its final URL, its HTML source and a generation counter
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    url: String,
    html: String,
    generation: u64,
    texts: Vec<String>,
    elements: Vec<ElementData>,
}

impl PageSnapshot {
    pub fn new(url: impl Into<String>, html: impl Into<String>, generation: u64) -> Self {
        let html = html.into();
        let (texts, elements) = index_elements(&Html::parse_document(&html));
        Self {
            url: url.into(),
            html,
            generation,
            texts,
            elements,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Selects elements matching `selector` under `scope` (or the document)
    ///
    /// With `first_only`, at most one handle is returned.
    pub fn select(
        &self,
        scope: Option<ElementHandle>,
        selector: &str,
        first_only: bool,
    ) -> RenderResult<Vec<ElementHandle>> {
        let selector = parse_selector(selector)?;
        let document = Html::parse_document(&self.html);
        let elements: Vec<ElementRef> = all_elements(&document).collect();
        let positions: HashMap<_, usize> = elements
            .iter()
            .enumerate()
            .map(|(ordinal, element)| (element.id(), ordinal))
            .collect();

        let matches: Vec<ElementRef> = match scope {
            Some(handle) => {
                let root = elements
                    .get(self.ordinal(handle)?)
                    .copied()
                    .ok_or(RenderError::UnknownHandle)?;
                root.select(&selector).collect()
            }
            None => document.select(&selector).collect(),
        };

        let mut handles = Vec::new();
        for element in matches {
            if let Some(&ordinal) = positions.get(&element.id()) {
                handles.push(ElementHandle::new(self.generation, ordinal));
                if first_only {
                    break;
                }
            }
        }
        Ok(handles)
    }

    /// Concatenated text content of an element
    pub fn text(&self, handle: ElementHandle) -> RenderResult<String> {
        let element = self.element(handle)?;
        Ok(self.texts[element.text.clone()].concat())
    }

    /// Attribute value of an element
    pub fn attribute(&self, handle: ElementHandle, name: &str) -> RenderResult<Option<String>> {
        let element = self.element(handle)?;
        Ok(element
            .attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone()))
    }

    fn ordinal(&self, handle: ElementHandle) -> RenderResult<usize> {
        if handle.generation() != self.generation {
            return Err(RenderError::StaleHandle);
        }
        Ok(handle.ordinal())
    }

    fn element(&self, handle: ElementHandle) -> RenderResult<&ElementData> {
        self.elements
            .get(self.ordinal(handle)?)
            .ok_or(RenderError::UnknownHandle)
    }
}

/// Indexes every element in document order
///
/// Descendant text nodes of an element are contiguous in document order, so
/// each element only records where its run of text nodes starts and ends.
fn index_elements(document: &Html) -> (Vec<String>, Vec<ElementData>) {
    let mut texts = Vec::new();
    let mut elements: Vec<ElementData> = Vec::new();
    let root = document.tree.root();
    // Ancestor chain of the current node, with element ordinals
    let mut open = vec![(root.id(), None::<usize>)];

    for node in root.descendants().skip(1) {
        let parent = node.parent().map(|parent| parent.id());
        while let Some(&(id, ordinal)) = open.last() {
            if Some(id) == parent {
                break;
            }
            open.pop();
            if let Some(ordinal) = ordinal {
                elements[ordinal].text.end = texts.len();
            }
        }

        if let Some(text) = node.value().as_text() {
            texts.push(String::from(&**text));
        }

        let ordinal = ElementRef::wrap(node).map(|element| {
            elements.push(ElementData {
                text: texts.len()..texts.len(),
                attributes: element
                    .value()
                    .attrs()
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect(),
            });
            elements.len() - 1
        });
        open.push((node.id(), ordinal));
    }

    for (_, ordinal) in open {
        if let Some(ordinal) = ordinal {
            elements[ordinal].text.end = texts.len();
        }
    }

    (texts, elements)
}

/// Every element of the document in document order
fn all_elements(document: &Html) -> impl Iterator<Item = ElementRef<'_>> {
    document.tree.root().descendants().filter_map(ElementRef::wrap)
}

fn parse_selector(selector: &str) -> RenderResult<Selector> {
    Selector::parse(selector).map_err(|e| RenderError::InvalidSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}
