//! CSS selector matching over parsed fragments.

use core::borrow::Borrow;
use core::fmt;
use std::rc::Rc;

use cssparser::{Parser as CssParser, ParserInput, ToCss, serialize_string};
use markup5ever_rcdom::{Handle, NodeData};
use selectors::attr::{AttrSelectorOperation, AttrSelectorOperator, CaseSensitivity, NamespaceConstraint};
use selectors::matching::{
    ElementSelectorFlags, IgnoreNthChildForInvalidation, MatchingContext, MatchingMode,
    NeedsSelectorFlags, QuirksMode, matches_selector,
};
use selectors::parser::{ParseRelative, SelectorParseErrorKind};
use selectors::{Element, NthIndexCache, OpaqueElement, SelectorList};
use thiserror::Error;

use crate::fragment::{Node, attribute, is_element, parent_of};

/// Error produced when a selector string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid selector `{selector}`: {reason}")]
pub struct SelectorError {
    /// The selector text as supplied.
    pub selector: String,
    /// Parser diagnostic.
    pub reason: String,
}

/// A parsed selector list such as `#main, .sidebar > ul`.
#[derive(Clone)]
pub struct Selector {
    source: String,
    list: SelectorList<SelectorImpl>,
}

impl fmt::Debug for Selector {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_tuple("Selector").field(&self.source).finish()
    }
}

impl Selector {
    /// Parse a comma separated selector list.
    ///
    /// # Errors
    /// Returns [`SelectorError`] when the text is not a valid selector list or uses
    /// pseudo-classes that cannot apply to detached markup.
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let mut input = ParserInput::new(source);
        let mut parser = CssParser::new(&mut input);
        let list = SelectorList::parse(&SelectorParser, &mut parser, ParseRelative::No).map_err(
            |err| SelectorError {
                selector: source.to_owned(),
                reason: format!("{:?}", err.kind),
            },
        )?;
        Ok(Self {
            source: source.to_owned(),
            list,
        })
    }

    /// The selector text as supplied.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `node` matches any selector in the list.
    pub fn matches(&self, node: &Node) -> bool {
        if !is_element(&node.handle) {
            return false;
        }
        let element = ElementWrapper::new(Rc::clone(&node.handle), Rc::clone(&node.boundary));
        let mut nth_index_cache = NthIndexCache::default();
        let mut context = MatchingContext::new(
            MatchingMode::Normal,
            None,
            &mut nth_index_cache,
            QuirksMode::NoQuirks,
            NeedsSelectorFlags::No,
            IgnoreNthChildForInvalidation::No,
        );
        self.list
            .0
            .iter()
            .any(|selector| matches_selector(selector, 0, None, &element, &mut context))
    }
}

/// Adapter exposing an rcdom node to the `selectors` matching engine.
///
/// Matching never climbs above `boundary`, the synthetic container holding the
/// fragment's top-level nodes, so `div > p` only matches when the `div` is part of
/// the fragment itself.
#[derive(Clone)]
struct ElementWrapper {
    handle: Handle,
    boundary: Handle,
}

impl fmt::Debug for ElementWrapper {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ElementWrapper")
            .field("tag", &self.local_name())
            .finish_non_exhaustive()
    }
}

impl ElementWrapper {
    fn new(handle: Handle, boundary: Handle) -> Self {
        Self { handle, boundary }
    }

    fn wrap(&self, handle: &Handle) -> Self {
        Self::new(Rc::clone(handle), Rc::clone(&self.boundary))
    }

    fn local_name(&self) -> Option<&str> {
        match &self.handle.data {
            NodeData::Element { name, .. } => Some(&*name.local),
            _ => None,
        }
    }

    fn parent(&self) -> Option<Handle> {
        parent_of(&self.handle).filter(|parent| !Rc::ptr_eq(parent, &self.boundary))
    }

    fn sibling_elements(&self) -> Vec<Handle> {
        let Some(parent) = parent_of(&self.handle) else {
            return Vec::new();
        };
        let children = parent.children.borrow();
        children.iter().filter(|child| is_element(child)).map(Rc::clone).collect()
    }

    fn position_among(&self, siblings: &[Handle]) -> Option<usize> {
        siblings
            .iter()
            .position(|sibling| Rc::ptr_eq(sibling, &self.handle))
    }
}

fn attribute_matches(
    operator: AttrSelectorOperator,
    actual: &str,
    expected: &str,
    case_sensitivity: CaseSensitivity,
) -> bool {
    let (actual, expected) = match case_sensitivity {
        CaseSensitivity::CaseSensitive => (actual.to_owned(), expected.to_owned()),
        CaseSensitivity::AsciiCaseInsensitive => {
            (actual.to_ascii_lowercase(), expected.to_ascii_lowercase())
        }
    };
    match operator {
        AttrSelectorOperator::Equal => actual == expected,
        AttrSelectorOperator::Includes => actual.split_whitespace().any(|part| part == expected),
        AttrSelectorOperator::DashMatch => {
            actual == expected || actual.starts_with(&format!("{expected}-"))
        }
        AttrSelectorOperator::Prefix => !expected.is_empty() && actual.starts_with(&expected),
        AttrSelectorOperator::Suffix => !expected.is_empty() && actual.ends_with(&expected),
        AttrSelectorOperator::Substring => !expected.is_empty() && actual.contains(&expected),
    }
}

impl Element for ElementWrapper {
    type Impl = SelectorImpl;

    fn opaque(&self) -> OpaqueElement {
        OpaqueElement::new(&*self.handle)
    }

    fn parent_element(&self) -> Option<Self> {
        let parent = self.parent()?;
        is_element(&parent).then(|| self.wrap(&parent))
    }

    fn parent_node_is_shadow_root(&self) -> bool {
        false
    }

    fn containing_shadow_host(&self) -> Option<Self> {
        None
    }

    fn is_pseudo_element(&self) -> bool {
        false
    }

    fn prev_sibling_element(&self) -> Option<Self> {
        let siblings = self.sibling_elements();
        let index = self.position_among(&siblings)?;
        index
            .checked_sub(1)
            .and_then(|prev| siblings.get(prev))
            .map(|handle| self.wrap(handle))
    }

    fn next_sibling_element(&self) -> Option<Self> {
        let siblings = self.sibling_elements();
        let index = self.position_among(&siblings)?;
        siblings.get(index + 1).map(|handle| self.wrap(handle))
    }

    fn first_element_child(&self) -> Option<Self> {
        self.handle
            .children
            .borrow()
            .iter()
            .find(|child| is_element(child))
            .map(|child| self.wrap(child))
    }

    fn is_html_element_in_html_document(&self) -> bool {
        true
    }

    fn has_local_name(&self, local_name: &str) -> bool {
        self.local_name() == Some(local_name)
    }

    fn has_namespace(&self, _ns: &()) -> bool {
        true
    }

    fn is_same_type(&self, other: &Self) -> bool {
        self.local_name() == other.local_name()
    }

    fn attr_matches(
        &self,
        ns: &NamespaceConstraint<&()>,
        local_name: &AttrString,
        operation: &AttrSelectorOperation<&AttrString>,
    ) -> bool {
        if !matches!(ns, NamespaceConstraint::Specific(())) {
            return false;
        }
        let Some(actual) = attribute(&self.handle, &local_name.0) else {
            return false;
        };
        match operation {
            AttrSelectorOperation::Exists => true,
            AttrSelectorOperation::WithValue {
                operator,
                case_sensitivity,
                value,
            } => attribute_matches(*operator, &actual, &value.0, *case_sensitivity),
        }
    }

    fn match_non_ts_pseudo_class(
        &self,
        pseudo_class: &NonTSPseudoClass,
        _context: &mut MatchingContext<Self::Impl>,
    ) -> bool {
        match *pseudo_class {}
    }

    fn match_pseudo_element(
        &self,
        pseudo_element: &PseudoElement,
        _context: &mut MatchingContext<Self::Impl>,
    ) -> bool {
        match *pseudo_element {}
    }

    fn apply_selector_flags(&self, _flags: ElementSelectorFlags) {}

    fn is_link(&self) -> bool {
        matches!(self.local_name(), Some("a" | "area"))
            && attribute(&self.handle, "href").is_some()
    }

    fn is_html_slot_element(&self) -> bool {
        self.local_name() == Some("slot")
    }

    fn has_id(&self, id: &AttrString, case_sensitivity: CaseSensitivity) -> bool {
        attribute(&self.handle, "id")
            .is_some_and(|actual| case_sensitivity.eq(actual.as_bytes(), id.0.as_bytes()))
    }

    fn has_class(&self, name: &AttrString, case_sensitivity: CaseSensitivity) -> bool {
        attribute(&self.handle, "class").is_some_and(|classes| {
            classes
                .split_whitespace()
                .any(|class| case_sensitivity.eq(class.as_bytes(), name.0.as_bytes()))
        })
    }

    fn imported_part(&self, _name: &AttrString) -> Option<AttrString> {
        None
    }

    fn is_part(&self, _name: &AttrString) -> bool {
        false
    }

    fn is_empty(&self) -> bool {
        self.handle.children.borrow().iter().all(|child| match &child.data {
            NodeData::Element { .. } => false,
            NodeData::Text { contents } => contents.borrow().is_empty(),
            _ => true,
        })
    }

    fn is_root(&self) -> bool {
        false
    }
}

/// Owned string used for every selector atom.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AttrString(pub String);

impl From<&str> for AttrString {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl Borrow<str> for AttrString {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl ToCss for AttrString {
    fn to_css<W>(&self, dest: &mut W) -> fmt::Result
    where
        W: fmt::Write,
    {
        serialize_string(&self.0, dest)
    }
}

/// Selector implementation for fragment matching.
#[derive(Debug, Clone, Copy)]
pub struct SelectorImpl;

impl selectors::SelectorImpl for SelectorImpl {
    type ExtraMatchingData<'extra> = ();
    type AttrValue = AttrString;
    type Identifier = AttrString;
    type LocalName = AttrString;
    type NamespacePrefix = AttrString;
    type NamespaceUrl = ();
    type BorrowedLocalName = str;
    type BorrowedNamespaceUrl = ();
    type NonTSPseudoClass = NonTSPseudoClass;
    type PseudoElement = PseudoElement;
}

/// Stateful pseudo-classes such as `:hover` never apply to detached markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NonTSPseudoClass {}

impl selectors::parser::NonTSPseudoClass for NonTSPseudoClass {
    type Impl = SelectorImpl;

    fn is_active_or_hover(&self) -> bool {
        match *self {}
    }

    fn is_user_action_state(&self) -> bool {
        match *self {}
    }
}

impl ToCss for NonTSPseudoClass {
    fn to_css<W>(&self, _dest: &mut W) -> fmt::Result
    where
        W: fmt::Write,
    {
        match *self {}
    }
}

/// Pseudo-elements are not supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PseudoElement {}

impl selectors::parser::PseudoElement for PseudoElement {
    type Impl = SelectorImpl;
}

impl ToCss for PseudoElement {
    fn to_css<W>(&self, _dest: &mut W) -> fmt::Result
    where
        W: fmt::Write,
    {
        match *self {}
    }
}

/// Selector parser with the default behaviour for every hook: unknown pseudo-classes
/// and pseudo-elements are rejected.
struct SelectorParser;

impl<'input> selectors::parser::Parser<'input> for SelectorParser {
    type Impl = SelectorImpl;
    type Error = SelectorParseErrorKind<'input>;
}
