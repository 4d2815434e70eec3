//! Template-driven tree transforms.
//!
//! ```toml
//! [namespaces]
//! tns = "http://example.com/dfdl/helloworld/"
//!
//! [[template]]
//! match = "word"
//! action = "uppercase"
//!
//! [[template]]
//! match = "/tns:helloWorld"
//! action = "set-attribute"
//! name = "shouted"
//! value = "yes"
//! ```
//!
//! Templates run in declaration order, each over the result of the previous
//! one. A template's matches are rewritten in reverse document order, so
//! removals never invalidate nodes that are still pending.

use crate::node::{self, NodeRef, NodeView};
use crate::CompiledExpr;
use interlace_kernel::{
    Document, Element, NamespaceBindings, Node, QName, TransformEngine, TransformError,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TransformFile {
    #[serde(default)]
    namespaces: BTreeMap<String, String>,
    #[serde(default)]
    template: Vec<TemplateDef>,
}

#[derive(Debug, Deserialize)]
struct TemplateDef {
    #[serde(rename = "match")]
    pattern: String,
    #[serde(flatten)]
    action: ActionDef,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
enum ActionDef {
    SetText { value: String },
    Uppercase,
    Lowercase,
    Rename { to: String },
    Remove,
    SetAttribute { name: String, value: String },
    AppendElement { name: String, text: Option<String> },
}

/// A rewrite applied to every node a template matches.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetText(String),
    Uppercase,
    Lowercase,
    Rename(QName),
    Remove,
    SetAttribute { name: String, value: String },
    AppendElement { name: QName, text: Option<String> },
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Action::SetText(_) => "set-text",
            Action::Uppercase => "uppercase",
            Action::Lowercase => "lowercase",
            Action::Rename(_) => "rename",
            Action::Remove => "remove",
            Action::SetAttribute { .. } => "set-attribute",
            Action::AppendElement { .. } => "append-element",
        }
    }
}

#[derive(Debug, Clone)]
struct Template {
    pattern: CompiledExpr,
    action: Action,
}

/// A loaded transform definition.
#[derive(Debug, Clone)]
pub struct Transform {
    templates: Vec<Template>,
}

impl Transform {
    pub fn load(path: &Path) -> Result<Self, TransformError> {
        let text = fs::read_to_string(path)
            .map_err(|err| invalid(path, format!("cannot read transform: {err}")))?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, TransformError> {
        let file: TransformFile =
            toml::from_str(text).map_err(|err| invalid(path, err.message().to_string()))?;
        if file.template.is_empty() {
            return Err(invalid(path, "transform declares no templates".to_string()));
        }
        let namespaces: NamespaceBindings = file.namespaces.into_iter().collect();
        let templates = file
            .template
            .into_iter()
            .map(|def| {
                let pattern = CompiledExpr::compile_pattern(&def.pattern, &namespaces)
                    .map_err(|err| invalid(path, err.to_string()))?;
                let action = resolve_action(def.action, &namespaces)
                    .map_err(|cause| invalid(path, cause))?;
                Ok(Template { pattern, action })
            })
            .collect::<Result<Vec<_>, TransformError>>()?;
        Ok(Self { templates })
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Apply every template to a copy of `document`.
    pub fn apply(&self, document: &Document) -> Result<Document, TransformError> {
        let mut working = document.clone();
        for (index, template) in self.templates.iter().enumerate() {
            let matches = template
                .pattern
                .select(&working, &NodeRef::document())
                .map_err(|err| execution(index, template, err.to_string()))?;
            debug!(
                template = index + 1,
                pattern = template.pattern.source(),
                matches = matches.len(),
                "applying template"
            );
            for target in matches.iter().rev() {
                rewrite(&mut working, target, &template.action)
                    .map_err(|cause| execution(index, template, cause))?;
            }
        }
        Ok(working)
    }
}

fn invalid(path: &Path, cause: String) -> TransformError {
    TransformError::InvalidDefinition {
        path: path.to_path_buf(),
        cause,
    }
}

fn execution(index: usize, template: &Template, cause: String) -> TransformError {
    TransformError::Execution(format!(
        "template {} (`{}`): {cause}",
        index + 1,
        template.pattern.source()
    ))
}

fn resolve_action(def: ActionDef, namespaces: &NamespaceBindings) -> Result<Action, String> {
    Ok(match def {
        ActionDef::SetText { value } => Action::SetText(value),
        ActionDef::Uppercase => Action::Uppercase,
        ActionDef::Lowercase => Action::Lowercase,
        ActionDef::Rename { to } => Action::Rename(qname(&to, namespaces)?),
        ActionDef::Remove => Action::Remove,
        ActionDef::SetAttribute { name, value } => Action::SetAttribute { name, value },
        ActionDef::AppendElement { name, text } => Action::AppendElement {
            name: qname(&name, namespaces)?,
            text,
        },
    })
}

fn qname(name: &str, namespaces: &NamespaceBindings) -> Result<QName, String> {
    match name.split_once(':') {
        Some((prefix, local)) => namespaces
            .resolve(prefix)
            .map(|uri| QName::qualified(uri, local))
            .ok_or_else(|| format!("unbound namespace prefix `{prefix}` in `{name}`")),
        None if name.is_empty() => Err("element name must not be empty".to_string()),
        None => Ok(QName::local(name)),
    }
}

/// Where a matched node lives, as mutable-path coordinates.
enum Target {
    Element(Vec<usize>),
    Text { parent: Vec<usize>, index: usize },
    Attribute { element: Vec<usize>, index: usize },
}

fn rewrite(document: &mut Document, node: &NodeRef, action: &Action) -> Result<(), String> {
    let location = node::location(document, node);
    let target = match node::resolve(document, node) {
        Some(NodeView::Element(_)) => Target::Element(node.path.clone()),
        Some(NodeView::Text(_)) => {
            let (index, parent) = node
                .path
                .split_last()
                .ok_or_else(|| format!("{location}: text node without a parent"))?;
            Target::Text {
                parent: parent.to_vec(),
                index: *index,
            }
        }
        Some(NodeView::Attribute(_)) => Target::Attribute {
            element: node.path.clone(),
            index: node.attr.unwrap_or_default(),
        },
        Some(NodeView::Document(_)) => {
            return Err(format!("`{}` cannot apply to the document node", action.name()));
        }
        None => return Err(format!("{location}: node no longer exists")),
    };
    let missing = || format!("{location}: node no longer exists");

    match (action, target) {
        (Action::SetText(value), Target::Element(path)) => {
            element_at(document, &path).ok_or_else(missing)?.set_text(value.clone());
        }
        (Action::SetText(value), Target::Text { parent, index }) => {
            *text_at(document, &parent, index).ok_or_else(missing)? = value.clone();
        }
        (Action::SetText(value), Target::Attribute { element, index }) => {
            attribute_at(document, &element, index).ok_or_else(missing)?.value = value.clone();
        }
        (Action::Uppercase | Action::Lowercase, target) => {
            let convert: fn(&str) -> String = if *action == Action::Uppercase {
                str::to_uppercase
            } else {
                str::to_lowercase
            };
            match target {
                Target::Element(path) => {
                    map_text(element_at(document, &path).ok_or_else(missing)?, convert)
                }
                Target::Text { parent, index } => {
                    let text = text_at(document, &parent, index).ok_or_else(missing)?;
                    *text = convert(text);
                }
                Target::Attribute { element, index } => {
                    let attr = attribute_at(document, &element, index).ok_or_else(missing)?;
                    attr.value = convert(&attr.value);
                }
            }
        }
        (Action::Rename(name), Target::Element(path)) => {
            element_at(document, &path).ok_or_else(missing)?.name = name.clone();
        }
        (Action::Remove, Target::Element(path)) => {
            let Some((index, parent)) = path.split_last().filter(|(_, parent)| !parent.is_empty())
            else {
                return Err(format!("{location}: the root element cannot be removed"));
            };
            element_at(document, parent)
                .ok_or_else(missing)?
                .children
                .remove(*index);
        }
        (Action::Remove, Target::Text { parent, index }) => {
            element_at(document, &parent)
                .ok_or_else(missing)?
                .children
                .remove(index);
        }
        (Action::Remove, Target::Attribute { element, index }) => {
            element_at(document, &element)
                .ok_or_else(missing)?
                .attributes
                .remove(index);
        }
        (Action::SetAttribute { name, value }, Target::Element(path)) => {
            element_at(document, &path)
                .ok_or_else(missing)?
                .set_attribute(name.clone(), value.clone());
        }
        (Action::AppendElement { name, text }, Target::Element(path)) => {
            let child = match text {
                Some(text) => Element::leaf(name.clone(), text.clone()),
                None => Element::new(name.clone()),
            };
            element_at(document, &path)
                .ok_or_else(missing)?
                .children
                .push(Node::Element(child));
        }
        (action, Target::Text { .. }) => {
            return Err(format!(
                "{location}: `{}` applies to elements, matched a text node",
                action.name()
            ));
        }
        (action, Target::Attribute { .. }) => {
            return Err(format!(
                "{location}: `{}` applies to elements, matched an attribute",
                action.name()
            ));
        }
    }
    Ok(())
}

fn element_at<'d>(document: &'d mut Document, path: &[usize]) -> Option<&'d mut Element> {
    node::element_mut(document, path)
}

fn text_at<'d>(document: &'d mut Document, parent: &[usize], index: usize) -> Option<&'d mut String> {
    match node::element_mut(document, parent)?.children.get_mut(index)? {
        Node::Text(text) => Some(text),
        Node::Element(_) => None,
    }
}

fn attribute_at<'d>(
    document: &'d mut Document,
    element: &[usize],
    index: usize,
) -> Option<&'d mut interlace_kernel::Attribute> {
    node::element_mut(document, element)?.attributes.get_mut(index)
}

fn map_text(element: &mut Element, convert: fn(&str) -> String) {
    for child in &mut element.children {
        match child {
            Node::Text(text) => *text = convert(text),
            Node::Element(inner) => map_text(inner, convert),
        }
    }
}

/// [`TransformEngine`] that loads a TOML template file per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateTransform;

impl TemplateTransform {
    pub fn new() -> Self {
        Self
    }
}

impl TransformEngine for TemplateTransform {
    fn transform(
        &self,
        document: &Document,
        transform_def: &Path,
    ) -> Result<Document, TransformError> {
        Transform::load(transform_def)?.apply(document)
    }
}
