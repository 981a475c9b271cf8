//! Owned, namespace-resolved element tree for OAI-PMH responses.
//!
//! Responses are small (one page of records), so the whole document is
//! materialised and then queried by `(namespace, local name)` pairs.

use quick_xml::NsReader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;

use crate::error::HarvestError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    namespace: Option<String>,
    name: String,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<Element>,
}

impl Element {
    /// Parse a complete document and return its root element.
    pub fn parse(xml: &str) -> Result<Self, HarvestError> {
        let mut reader = NsReader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root = None;

        loop {
            let (namespace, event) = reader
                .read_resolved_event()
                .map_err(HarvestError::malformed)?;

            match event {
                Event::Start(start) => stack.push(Element::open(namespace, &start)?),
                Event::Empty(start) => {
                    let element = Element::open(namespace, &start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| HarvestError::malformed("unbalanced end tag"))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        let raw = String::from_utf8_lossy(&text);
                        current.push_text(&unescape(&raw).map_err(HarvestError::malformed)?);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current.push_text(&String::from_utf8_lossy(&data));
                    }
                }
                Event::GeneralRef(reference) => {
                    if let Some(current) = stack.last_mut() {
                        let entity = format!("&{};", String::from_utf8_lossy(&reference));
                        current.push_text(&unescape(&entity).map_err(HarvestError::malformed)?);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(HarvestError::malformed(format!(
                "document ended inside <{}>",
                open.name
            )));
        }

        root.ok_or_else(|| HarvestError::malformed("document has no root element"))
    }

    fn open(namespace: ResolveResult<'_>, start: &BytesStart<'_>) -> Result<Self, HarvestError> {
        let namespace = match namespace {
            ResolveResult::Bound(ns) => Some(lossy(ns.as_ref())),
            ResolveResult::Unbound => None,
            ResolveResult::Unknown(prefix) => {
                return Err(HarvestError::malformed(format!(
                    "unknown namespace prefix {:?}",
                    lossy(&prefix)
                )));
            }
        };

        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(HarvestError::malformed)?;
            if attribute.key.as_namespace_binding().is_some() {
                continue;
            }
            let raw = String::from_utf8_lossy(&attribute.value);
            let value = unescape(&raw).map_err(HarvestError::malformed)?;
            attributes.push((
                lossy(attribute.key.local_name().as_ref()),
                value.into_owned(),
            ));
        }

        Ok(Self {
            namespace,
            name: lossy(start.local_name().as_ref()),
            attributes,
            text: None,
            children: Vec::new(),
        })
    }

    /// Only text ahead of the first child counts; tail text after a child is dropped.
    fn push_text(&mut self, text: &str) {
        if self.children.is_empty() {
            self.text.get_or_insert_with(String::new).push_str(text);
        }
    }

    /// Local name, without any namespace prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Match on namespace URI (empty string for no namespace) and local name.
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.name == name && self.namespace.as_deref().unwrap_or("") == namespace
    }

    /// Direct text content, `None` when the element has none.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First direct child with the given name.
    pub fn child(&self, namespace: &str, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.is(namespace, name))
    }

    pub fn children<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children
            .iter()
            .filter(move |child| child.is(namespace, name))
    }

    /// Every element below this one, depth first in document order.
    pub fn descendants(&self) -> impl Iterator<Item = &Element> {
        let mut pending: Vec<&Element> = self.children.iter().rev().collect();
        std::iter::from_fn(move || {
            let next = pending.pop()?;
            pending.extend(next.children.iter().rev());
            Some(next)
        })
    }

    /// This element and its descendants that carry the given name.
    pub fn find_all<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        std::iter::once(self)
            .chain(self.descendants())
            .filter(move |element| element.is(namespace, name))
    }
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), HarvestError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(HarvestError::malformed("multiple root elements")),
    }
    Ok(())
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
