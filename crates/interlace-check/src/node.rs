//! Addressing nodes inside a [`Document`].
//!
//! A [`NodeRef`] is a path of child indices from the document node: `[]` is
//! the document node itself, `[0]` the root element, `[0, 2]` the root's third
//! child (element or text). `attr` selects an attribute of the addressed
//! element. The derived ordering is document order.

use interlace_kernel::{Attribute, Document, Element, Node};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeRef {
    pub path: Vec<usize>,
    pub attr: Option<usize>,
}

impl NodeRef {
    pub fn document() -> Self {
        Self {
            path: Vec::new(),
            attr: None,
        }
    }

    pub fn root() -> Self {
        Self {
            path: vec![0],
            attr: None,
        }
    }

    pub fn child(&self, index: usize) -> Self {
        let mut path = self.path.clone();
        path.push(index);
        Self { path, attr: None }
    }

    pub fn attribute(&self, index: usize) -> Self {
        Self {
            path: self.path.clone(),
            attr: Some(index),
        }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.attr.is_some() {
            return Some(Self {
                path: self.path.clone(),
                attr: None,
            });
        }
        let (_, parent) = self.path.split_last()?;
        Some(Self {
            path: parent.to_vec(),
            attr: None,
        })
    }

    pub fn is_document(&self) -> bool {
        self.path.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.path.len() == 1 && self.attr.is_none()
    }
}

/// A resolved node.
#[derive(Debug, Clone, Copy)]
pub enum NodeView<'d> {
    Document(&'d Element),
    Element(&'d Element),
    Text(&'d str),
    Attribute(&'d Attribute),
}

impl<'d> NodeView<'d> {
    pub fn string_value(&self) -> String {
        match self {
            NodeView::Document(root) | NodeView::Element(root) => root.text(),
            NodeView::Text(text) => (*text).to_string(),
            NodeView::Attribute(attr) => attr.value.clone(),
        }
    }

    pub fn as_element(&self) -> Option<&'d Element> {
        match self {
            NodeView::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Short kind label for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            NodeView::Document(_) => "document",
            NodeView::Element(_) => "element",
            NodeView::Text(_) => "text",
            NodeView::Attribute(_) => "attribute",
        }
    }
}

pub fn resolve<'d>(document: &'d Document, node: &NodeRef) -> Option<NodeView<'d>> {
    let Some((first, rest)) = node.path.split_first() else {
        return match node.attr {
            None => Some(NodeView::Document(document.root())),
            Some(_) => None,
        };
    };
    if *first != 0 {
        return None;
    }
    let mut current = document.root();
    for (depth, index) in rest.iter().enumerate() {
        match current.children.get(*index)? {
            Node::Element(element) => current = element,
            Node::Text(text) if depth + 1 == rest.len() && node.attr.is_none() => {
                return Some(NodeView::Text(text));
            }
            Node::Text(_) => return None,
        }
    }
    match node.attr {
        Some(index) => current.attributes.get(index).map(NodeView::Attribute),
        None => Some(NodeView::Element(current)),
    }
}

/// Mutable access to the element at `path` (which must address an element).
pub fn element_mut<'d>(document: &'d mut Document, path: &[usize]) -> Option<&'d mut Element> {
    let (first, rest) = path.split_first()?;
    if *first != 0 {
        return None;
    }
    let mut current = &mut document.root;
    for index in rest {
        current = current.children.get_mut(*index)?.as_element_mut()?;
    }
    Some(current)
}

/// Child nodes (elements and text) of `node`, in document order.
pub fn children(document: &Document, node: &NodeRef) -> Vec<NodeRef> {
    match resolve(document, node) {
        Some(NodeView::Document(_)) => vec![NodeRef::root()],
        Some(NodeView::Element(element)) => (0..element.children.len())
            .map(|index| node.child(index))
            .collect(),
        _ => Vec::new(),
    }
}

/// `node` followed by all of its descendants, excluding attributes.
pub fn descendants_or_self(document: &Document, node: &NodeRef) -> Vec<NodeRef> {
    let mut out = Vec::new();
    push_subtree(document, node, &mut out);
    out
}

fn push_subtree(document: &Document, node: &NodeRef, out: &mut Vec<NodeRef>) {
    out.push(node.clone());
    for child in children(document, node) {
        push_subtree(document, &child, out);
    }
}

pub fn attributes(document: &Document, node: &NodeRef) -> Vec<NodeRef> {
    match resolve(document, node) {
        Some(NodeView::Element(element)) => (0..element.attributes.len())
            .map(|index| node.attribute(index))
            .collect(),
        _ => Vec::new(),
    }
}

/// `/a/b[2]`-style location for diagnostics.
pub fn location(document: &Document, node: &NodeRef) -> String {
    if node.is_document() {
        return "/".to_string();
    }
    let mut out = String::new();
    let mut current = document.root();
    out.push('/');
    out.push_str(&current.name.local);
    for index in node.path.iter().skip(1) {
        match current.children.get(*index) {
            Some(Node::Element(element)) => {
                let position = current.children[..*index]
                    .iter()
                    .filter_map(Node::as_element)
                    .filter(|sibling| sibling.name == element.name)
                    .count()
                    + 1;
                out.push_str(&format!("/{}[{position}]", element.name.local));
                current = element;
            }
            Some(Node::Text(_)) => {
                out.push_str("/text()");
                break;
            }
            None => break,
        }
    }
    if let Some(attr) = node.attr.and_then(|index| current.attributes.get(index)) {
        out.push_str(&format!("/@{}", attr.name));
    }
    out
}
