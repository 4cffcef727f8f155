//! Fragment parsing, traversal and serialization.

use core::{fmt, mem};
use std::rc::{Rc, Weak};

use html5ever::serialize::{SerializeOpts, TraversalScope, serialize};
use html5ever::tendril::TendrilSink as _;
use html5ever::{LocalName, Namespace, ParseOpts, QualName, parse_fragment};
use log::warn;
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};

use crate::selector::Selector;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// A parsed HTML fragment.
///
/// Fragments are parsed in the context of a `<body>` element, which is how the
/// markup is interpreted once it is inserted into a live document.
pub struct Fragment {
    root: Handle,
}

impl fmt::Debug for Fragment {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Fragment")
            .field("children", &self.root.children.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Fragment {
    /// Parse `html` as a body-level fragment. Leading and trailing whitespace is
    /// ignored.
    pub fn parse(html: &str) -> Self {
        let context = QualName::new(
            None,
            Namespace::from(HTML_NAMESPACE),
            LocalName::from("body"),
        );
        let dom = parse_fragment(RcDom::default(), ParseOpts::default(), context, Vec::new())
            .one(html.trim());
        // The fragment parser wraps its output in a synthetic <html> element. Detach it
        // so dropping the document does not tear down the fragment's children.
        let detached = mem::take(&mut *dom.document.children.borrow_mut());
        let root = detached
            .into_iter()
            .next()
            .unwrap_or_else(|| Rc::clone(&dom.document));
        root.parent.set(None);
        Self { root }
    }

    /// Top-level element nodes, in document order.
    pub fn top_level(&self) -> Vec<Node> {
        self.root
            .children
            .borrow()
            .iter()
            .filter(|child| is_element(child))
            .map(|child| self.node(child))
            .collect()
    }

    /// Top-level elements matching `selector`.
    pub fn filter(&self, selector: &Selector) -> Vec<Node> {
        self.top_level()
            .into_iter()
            .filter(|node| selector.matches(node))
            .collect()
    }

    /// Elements nested below the top level matching `selector`.
    pub fn find(&self, selector: &Selector) -> Vec<Node> {
        let mut found = Vec::new();
        for top in self.top_level() {
            let mut nested = Vec::new();
            collect_descendants(&top.handle, &mut nested);
            found.extend(
                nested
                    .iter()
                    .map(|handle| self.node(handle))
                    .filter(|node| selector.matches(node)),
            );
        }
        found
    }

    /// Top-level matches, or nested matches when nothing at the top level matches.
    pub fn filter_or_find(&self, selector: &Selector) -> Vec<Node> {
        let top = self.filter(selector);
        if top.is_empty() {
            self.find(selector)
        } else {
            top
        }
    }

    /// Every element in the fragment, in document order.
    pub fn elements(&self) -> Vec<Node> {
        let mut handles = Vec::new();
        collect_descendants(&self.root, &mut handles);
        handles.iter().map(|handle| self.node(handle)).collect()
    }

    /// Every element in the fragment matching `selector`, in document order.
    pub fn select_all(&self, selector: &Selector) -> Vec<Node> {
        self.elements()
            .into_iter()
            .filter(|node| selector.matches(node))
            .collect()
    }

    /// Detach `node` from the fragment. Returns `false` if it was already detached.
    pub fn remove(&self, node: &Node) -> bool {
        let Some(parent) = parent_of(&node.handle) else {
            return false;
        };
        let mut children = parent.children.borrow_mut();
        let Some(index) = children
            .iter()
            .position(|child| Rc::ptr_eq(child, &node.handle))
        else {
            return false;
        };
        children.remove(index);
        node.handle.parent.set(None);
        true
    }

    /// Whether the fragment has no nodes at all.
    pub fn is_empty(&self) -> bool {
        self.root.children.borrow().is_empty()
    }

    /// Serialize the fragment back to markup.
    pub fn to_html(&self) -> String {
        serialize_handle(&self.root, TraversalScope::ChildrenOnly(None))
    }

    fn node(&self, handle: &Handle) -> Node {
        Node {
            handle: Rc::clone(handle),
            boundary: Rc::clone(&self.root),
        }
    }
}

/// An element inside a [`Fragment`].
#[derive(Clone)]
pub struct Node {
    pub(crate) handle: Handle,
    pub(crate) boundary: Handle,
}

impl fmt::Debug for Node {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Node")
            .field("tag", &self.tag_name())
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Lowercase local tag name, or `None` for non-element nodes.
    pub fn tag_name(&self) -> Option<String> {
        match &self.handle.data {
            NodeData::Element { name, .. } => Some(name.local.to_string()),
            _ => None,
        }
    }

    /// Attribute value by local name.
    pub fn attr(&self, name: &str) -> Option<String> {
        attribute(&self.handle, name)
    }

    /// Markup of this node including its own tags.
    pub fn outer_html(&self) -> String {
        serialize_handle(&self.handle, TraversalScope::IncludeNode)
    }

    /// Markup of this node's children.
    pub fn inner_html(&self) -> String {
        let scope = match &self.handle.data {
            NodeData::Element { name, .. } => TraversalScope::ChildrenOnly(Some(name.clone())),
            _ => TraversalScope::ChildrenOnly(None),
        };
        serialize_handle(&self.handle, scope)
    }
}

pub(crate) fn is_element(handle: &Handle) -> bool {
    matches!(handle.data, NodeData::Element { .. })
}

pub(crate) fn attribute(handle: &Handle, name: &str) -> Option<String> {
    let NodeData::Element { attrs, .. } = &handle.data else {
        return None;
    };
    attrs
        .borrow()
        .iter()
        .find(|attr| &*attr.name.local == name)
        .map(|attr| attr.value.to_string())
}

/// Upgrade the weak parent link. `rcdom` keeps it in a `Cell`, so it has to be taken
/// out and put back.
pub(crate) fn parent_of(handle: &Handle) -> Option<Handle> {
    let weak = handle.parent.take();
    let parent = weak.as_ref().and_then(Weak::upgrade);
    handle.parent.set(weak);
    parent
}

/// Pre-order walk of every element strictly below `handle`.
fn collect_descendants(handle: &Handle, out: &mut Vec<Handle>) {
    let mut stack: Vec<Handle> = handle.children.borrow().iter().rev().map(Rc::clone).collect();
    while let Some(next) = stack.pop() {
        if !is_element(&next) {
            continue;
        }
        stack.extend(next.children.borrow().iter().rev().map(Rc::clone));
        out.push(next);
    }
}

fn serialize_handle(handle: &Handle, scope: TraversalScope) -> String {
    let mut out = Vec::new();
    let opts = SerializeOpts {
        traversal_scope: scope,
        ..SerializeOpts::default()
    };
    if let Err(err) = serialize(&mut out, &SerializableHandle::from(Rc::clone(handle)), opts) {
        warn!("Failed to serialize fragment: {err}");
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_serializes_simple_markup() {
        let fragment = Fragment::parse("  <p>hi</p>\n");
        assert_eq!(fragment.to_html(), "<p>hi</p>");
        assert_eq!(fragment.top_level().len(), 1);
    }

    #[test]
    fn empty_markup_is_empty() {
        let fragment = Fragment::parse("   ");
        assert!(fragment.is_empty());
        assert_eq!(fragment.to_html(), "");
    }

    #[test]
    fn remove_detaches_node() -> Result<(), crate::SelectorError> {
        let fragment = Fragment::parse("<div><span>a</span><em>b</em></div>");
        let selector = Selector::parse("span")?;
        let spans = fragment.select_all(&selector);
        assert_eq!(spans.len(), 1);
        assert!(fragment.remove(&spans[0]));
        assert!(!fragment.remove(&spans[0]));
        assert_eq!(fragment.to_html(), "<div><em>b</em></div>");
        Ok(())
    }
}
