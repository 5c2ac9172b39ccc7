//! Server-side element tree produced by components and serialized to HTML.

use serde::{Deserialize, Serialize};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Element {
    Node {
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<Element>,
    },
    Text { value: String },
    /// Pre-rendered markup, emitted as is.
    Raw { html: String },
    Fragment { children: Vec<Element> },
}

impl Element {
    pub fn tag(tag: impl Into<String>) -> Self {
        Element::Node {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Element::Text {
            value: value.into(),
        }
    }

    pub fn raw(html: impl Into<String>) -> Self {
        Element::Raw { html: html.into() }
    }

    pub fn fragment(children: Vec<Element>) -> Self {
        Element::Fragment { children }
    }

    pub fn empty() -> Self {
        Element::Fragment {
            children: Vec::new(),
        }
    }

    /// Sets an attribute, replacing an existing one of the same name. No-op
    /// on non-node elements.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Element::Node { attrs, .. } = &mut self {
            let name = name.into();
            let value = value.into();
            match attrs.iter_mut().find(|(n, _)| *n == name) {
                Some(existing) => existing.1 = value,
                None => attrs.push((name, value)),
            }
        }
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        match &mut self {
            Element::Node { children, .. } | Element::Fragment { children } => children.push(child),
            _ => {}
        }
        self
    }

    pub fn children(self, children: impl IntoIterator<Item = Element>) -> Self {
        children.into_iter().fold(self, Element::child)
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        match self {
            Element::Node { attrs, .. } => attrs
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Element::Fragment { children } => children.iter().all(Element::is_empty),
            Element::Text { value } => value.is_empty(),
            Element::Raw { html } => html.is_empty(),
            Element::Node { .. } => false,
        }
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            Element::Node {
                tag,
                attrs,
                children,
            } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(value));
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }
                for child in children {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            Element::Text { value } => out.push_str(&escape_text(value)),
            Element::Raw { html } => out.push_str(html),
            Element::Fragment { children } => {
                for child in children {
                    child.write_html(out);
                }
            }
        }
    }
}

impl From<&str> for Element {
    fn from(value: &str) -> Self {
        Element::text(value)
    }
}

impl From<String> for Element {
    fn from(value: String) -> Self {
        Element::text(value)
    }
}

pub fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_markup() {
        let el = Element::tag("ul")
            .attr("class", "list")
            .children(vec![
                Element::tag("li").child("one".into()),
                Element::tag("li").child(Element::text("a < b")),
            ]);
        assert_eq!(
            el.to_html(),
            "<ul class=\"list\"><li>one</li><li>a &lt; b</li></ul>"
        );
    }

    #[test]
    fn test_void_and_attr_escaping() {
        let el = Element::tag("img").attr("alt", "\"x\" & y");
        assert_eq!(el.to_html(), "<img alt=\"&quot;x&quot; &amp; y\">");
    }

    #[test]
    fn test_attr_replaces_existing() {
        let el = Element::tag("div").attr("id", "a").attr("id", "b");
        assert_eq!(el.get_attr("id"), Some("b"));
        assert_eq!(el.to_html(), "<div id=\"b\"></div>");
    }

    #[test]
    fn test_fragments_and_raw() {
        let el = Element::fragment(vec![Element::raw("<b>x</b>"), Element::empty()]);
        assert_eq!(el.to_html(), "<b>x</b>");
        assert!(Element::fragment(vec![Element::empty()]).is_empty());
        assert!(!Element::tag("br").is_empty());
    }
}
