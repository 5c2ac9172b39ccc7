//! The document seam and an html5ever-backed implementation of it.

use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{local_name, namespace_url, ns, parse_document, parse_fragment};
use html5ever::{Attribute, LocalName, QualName};
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};
use regex::Regex;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// What the hydration runtime needs from the page. Elements are addressed
/// by id, which for islands is the mount id.
pub trait Document {
    fn has_element(&self, id: &str) -> bool;
    fn inner_html(&self, id: &str) -> Option<String>;
    /// Returns false when no element has `id`.
    fn set_inner_html(&self, id: &str, html: &str) -> bool;
    fn attribute(&self, id: &str, name: &str) -> Option<String>;
    fn set_attribute(&self, id: &str, name: &str, value: &str) -> bool;
    fn remove_attribute(&self, id: &str, name: &str) -> bool;
    /// Whether the element is within `margin` pixels of the viewport.
    fn is_in_viewport(&self, id: &str, margin: f64) -> bool;
    /// A value assigned to `window.<name>` by the page.
    fn page_global(&self, name: &str) -> Option<Value>;
}

lazy_static! {
    static ref GLOBAL_ASSIGN_RE: Regex =
        Regex::new(r"window\.([A-Za-z_$][A-Za-z0-9_$]*)\s*=\s*").unwrap();
}

/// `window.X = <json>;` assignments in an inline script. Values that are not
/// JSON are ignored.
pub fn extract_globals(script: &str) -> HashMap<String, Value> {
    let mut globals = HashMap::new();
    for caps in GLOBAL_ASSIGN_RE.captures_iter(script) {
        let (Some(name), Some(whole)) = (caps.get(1), caps.get(0)) else {
            continue;
        };
        let rest = &script[whole.end()..];
        let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            globals.insert(name.as_str().to_string(), value);
        }
    }
    globals
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTML DOCUMENT
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory DOM for non-browser hosts and tests. Has no layout; elements
/// count as in the viewport only once marked with [`HtmlDocument::set_visible`].
pub struct HtmlDocument {
    dom: RcDom,
    globals: HashMap<String, Value>,
    visible: RefCell<HashSet<String>>,
}

fn text_of(handle: &Handle) -> String {
    let mut out = String::new();
    for child in handle.children.borrow().iter() {
        if let NodeData::Text { contents } = &child.data {
            out.push_str(&contents.borrow());
        }
    }
    out
}

fn element_id(handle: &Handle) -> Option<String> {
    match &handle.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| &*a.name.local == "id")
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

fn is_script(handle: &Handle) -> bool {
    matches!(&handle.data, NodeData::Element { name, .. } if name.local == local_name!("script"))
}

fn serialize_children(handle: &Handle) -> Option<String> {
    let mut buf = Vec::new();
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::ChildrenOnly(None),
        ..Default::default()
    };
    serialize(&mut buf, &SerializableHandle::from(handle.clone()), opts).ok()?;
    String::from_utf8(buf).ok()
}

impl HtmlDocument {
    pub fn parse(html: &str) -> Self {
        let dom = parse_document(RcDom::default(), Default::default()).one(html);
        let mut doc = Self {
            dom,
            globals: HashMap::new(),
            visible: RefCell::new(HashSet::new()),
        };
        let mut globals = HashMap::new();
        doc.walk(&mut |handle| {
            if is_script(handle) {
                globals.extend(extract_globals(&text_of(handle)));
            }
            false
        });
        doc.globals = globals;
        doc
    }

    /// Depth-first over every node; stops once `visit` returns true.
    fn walk(&self, visit: &mut dyn FnMut(&Handle) -> bool) -> Option<Handle> {
        let mut stack = vec![self.dom.document.clone()];
        while let Some(handle) = stack.pop() {
            if visit(&handle) {
                return Some(handle);
            }
            let children = handle.children.borrow();
            stack.extend(children.iter().rev().cloned());
        }
        None
    }

    fn find(&self, id: &str) -> Option<Handle> {
        self.walk(&mut |handle| element_id(handle).as_deref() == Some(id))
    }

    pub fn set_visible(&self, id: &str) {
        self.visible.borrow_mut().insert(id.to_string());
    }

    pub fn to_html(&self) -> String {
        serialize_children(&self.dom.document).unwrap_or_default()
    }

    fn with_attrs<R>(&self, id: &str, f: impl FnOnce(&mut Vec<Attribute>) -> R) -> Option<R> {
        let handle = self.find(id)?;
        match &handle.data {
            NodeData::Element { attrs, .. } => Some(f(&mut attrs.borrow_mut())),
            _ => None,
        }
    }
}

impl Document for HtmlDocument {
    fn has_element(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    fn inner_html(&self, id: &str) -> Option<String> {
        serialize_children(&self.find(id)?)
    }

    fn set_inner_html(&self, id: &str, html: &str) -> bool {
        let Some(target) = self.find(id) else {
            return false;
        };
        let context = QualName::new(None, ns!(html), local_name!("div"));
        let fragment = parse_fragment(RcDom::default(), Default::default(), context, Vec::new()).one(html);
        // The fragment parser nests its output under a synthetic <html>.
        let root = fragment.document.children.borrow().first().cloned();
        let nodes = root.map(|r| r.children.take()).unwrap_or_default();
        for node in &nodes {
            node.parent.set(Some(Rc::downgrade(&target)));
        }
        for old in target.children.replace(nodes) {
            old.parent.set(None);
        }
        true
    }

    fn attribute(&self, id: &str, name: &str) -> Option<String> {
        self.with_attrs(id, |attrs| {
            attrs
                .iter()
                .find(|a| &*a.name.local == name)
                .map(|a| a.value.to_string())
        })
        .flatten()
    }

    fn set_attribute(&self, id: &str, name: &str, value: &str) -> bool {
        self.with_attrs(id, |attrs| {
            match attrs.iter_mut().find(|a| &*a.name.local == name) {
                Some(existing) => existing.value = StrTendril::from_slice(value),
                None => attrs.push(Attribute {
                    name: QualName::new(None, ns!(), LocalName::from(name)),
                    value: StrTendril::from_slice(value),
                }),
            }
        })
        .is_some()
    }

    fn remove_attribute(&self, id: &str, name: &str) -> bool {
        self.with_attrs(id, |attrs| attrs.retain(|a| &*a.name.local != name))
            .is_some()
    }

    fn is_in_viewport(&self, id: &str, _margin: f64) -> bool {
        self.visible.borrow().contains(id)
    }

    fn page_global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAGE: &str = r#"<!DOCTYPE html><html><head></head><body>
        <div id="root"><div id="__vista_cc_0" data-vista-cc="client:counter"><button>0</button></div>
        <div id="empty"></div></div>
        <script>window.__VISTA_RSC_DATA__ = {"params":{},"searchParams":{},"pattern":"/"}; window.__VISTA_CLIENT_REFERENCES__ = [{"id":"a<b"}];</script>
        </body></html>"#;

    #[test]
    fn test_reads_globals_from_inline_scripts() {
        let doc = HtmlDocument::parse(PAGE);
        assert_eq!(doc.page_global("__VISTA_RSC_DATA__").unwrap()["pattern"], "/");
        assert_eq!(
            doc.page_global("__VISTA_CLIENT_REFERENCES__"),
            Some(json!([{"id": "a<b"}]))
        );
        assert!(doc.page_global("__MISSING__").is_none());
    }

    #[test]
    fn test_inner_html_and_replacement() {
        let doc = HtmlDocument::parse(PAGE);
        assert_eq!(doc.inner_html("__vista_cc_0").as_deref(), Some("<button>0</button>"));
        assert_eq!(doc.inner_html("empty").as_deref(), Some(""));
        assert!(doc.set_inner_html("empty", "<p>hi</p><span>x</span>"));
        assert_eq!(doc.inner_html("empty").as_deref(), Some("<p>hi</p><span>x</span>"));
        assert!(!doc.set_inner_html("nope", "<p></p>"));
    }

    #[test]
    fn test_attributes() {
        let doc = HtmlDocument::parse(PAGE);
        assert_eq!(
            doc.attribute("__vista_cc_0", "data-vista-cc").as_deref(),
            Some("client:counter")
        );
        assert!(doc.remove_attribute("__vista_cc_0", "data-vista-cc"));
        assert!(doc.set_attribute("__vista_cc_0", "data-hydrated", "true"));
        assert!(doc.attribute("__vista_cc_0", "data-vista-cc").is_none());
        assert_eq!(doc.attribute("__vista_cc_0", "data-hydrated").as_deref(), Some("true"));
        assert!(!doc.set_attribute("nope", "a", "b"));
    }

    #[test]
    fn test_viewport_is_explicit() {
        let doc = HtmlDocument::parse(PAGE);
        assert!(!doc.is_in_viewport("empty", 100.0));
        doc.set_visible("empty");
        assert!(doc.is_in_viewport("empty", 100.0));
    }

    #[test]
    fn test_extract_globals_ignores_non_json() {
        let globals = extract_globals("window.a = foo(); window.b = [1, 2];");
        assert!(!globals.contains_key("a"));
        assert_eq!(globals["b"], json!([1, 2]));
    }
}
