//! Class-definition schema.
//!
//! The schema is an XML document rooted at `ClassDef`. Each child element declares one
//! element type, named by its tag:
//!
//! ```xml
//! <ClassDef>
//!   <object>
//!     <property name="create" type="string" hasMetadata="true" category="General"/>
//!   </object>
//!   <sensor extends="object" selectable="true"
//!           insertInNode="register" insertType="load" insertValue="create" insertInAttribute="name">
//!     <property name="name" type="string" dependency="provider" dependencyAttribute="channel"/>
//!     <property name="providers" type="Sequenz:provider" attribute="provider"/>
//!   </sensor>
//!   <provider>
//!     <property name="channel" type="string"/>
//!   </provider>
//! </ClassDef>
//! ```
//!
//! Declarations may `extend` an earlier declaration and inherit its properties,
//! selectability and insert rule.

mod definition;
mod error;

pub use definition::{
    ClassDef, DependencyLink, InsertRule, PropertyDescriptor, PropertyKind, ScalarType,
};
pub use error::SchemaError;

use indexmap::IndexMap;
use roxmltree::Node;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const ROOT_TAG: &str = "ClassDef";
const INSERT_FIELDS: [&str; 4] = ["insertInNode", "insertType", "insertValue", "insertInAttribute"];

/// A loaded, immutable schema.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    classes: IndexMap<String, Arc<ClassDef>>,
}

impl Schema {
    /// Parse a schema from XML text.
    pub fn parse(xml: &str) -> Result<Self, SchemaError> {
        let doc = roxmltree::Document::parse(xml)?;
        let root = doc.root_element();
        if root.tag_name().name() != ROOT_TAG {
            return Err(SchemaError::UnexpectedRoot(root.tag_name().name().to_string()));
        }

        let declared: HashSet<&str> = root
            .children()
            .filter(Node::is_element)
            .map(|n| n.tag_name().name())
            .collect();

        let mut classes: IndexMap<String, Arc<ClassDef>> = IndexMap::new();
        for node in root.children().filter(Node::is_element) {
            let class = load_class(node, &classes, &declared)?;
            debug!(
                class = %class.name,
                properties = class.properties.len(),
                selectable = class.selectable,
                "schema class loaded"
            );
            classes.insert(class.name.clone(), Arc::new(class));
        }

        info!(classes = classes.len(), "schema loaded");
        Ok(Self { classes })
    }

    /// Load a schema file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let xml = std::fs::read_to_string(path)?;
        Self::parse(&xml)
    }

    /// Class by tag name.
    pub fn class(&self, name: &str) -> Option<&Arc<ClassDef>> {
        self.classes.get(name)
    }

    /// All classes in declaration order.
    pub fn classes(&self) -> impl Iterator<Item = &Arc<ClassDef>> {
        self.classes.values()
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if no class is declared.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

fn load_class(
    node: Node<'_, '_>,
    loaded: &IndexMap<String, Arc<ClassDef>>,
    declared: &HashSet<&str>,
) -> Result<ClassDef, SchemaError> {
    let name = node.tag_name().name().to_string();
    if loaded.contains_key(&name) {
        return Err(SchemaError::DuplicateClass(name));
    }

    let mut class = match node.attribute("extends") {
        Some(base) => {
            let base_class = loaded.get(base).ok_or_else(|| SchemaError::UnknownBase {
                class: name.clone(),
                base: base.to_string(),
            })?;
            ClassDef {
                name: name.clone(),
                base: Some(base.to_string()),
                ..ClassDef::clone(base_class)
            }
        }
        None => ClassDef {
            name: name.clone(),
            base: None,
            selectable: false,
            insert_rule: None,
            properties: Vec::new(),
        },
    };

    if let Some(value) = node.attribute("selectable") {
        class.selectable = parse_flag(value).ok_or_else(|| SchemaError::InvalidFlag {
            class: name.clone(),
            property: String::new(),
            field: "selectable",
            value: value.to_string(),
        })?;
    }

    let insert_fields: Vec<Option<&str>> =
        INSERT_FIELDS.iter().map(|f| node.attribute(*f)).collect();
    match insert_fields.as_slice() {
        [Some(in_node), Some(ty), Some(value), Some(attribute)] => {
            class.insert_rule = Some(InsertRule {
                insert_in_node: in_node.to_string(),
                insert_type: ty.to_string(),
                insert_value: value.to_string(),
                insert_in_attribute: attribute.to_string(),
            });
        }
        fields if fields.iter().any(Option::is_some) => {
            warn!(class = %name, "incomplete insert rule ignored; all of {INSERT_FIELDS:?} are required");
        }
        _ => {}
    }

    for prop_node in node.children().filter(Node::is_element) {
        let property = load_property(&name, prop_node, declared)?;
        match class.properties.iter_mut().find(|p| p.name == property.name) {
            Some(existing) => *existing = property,
            None => class.properties.push(property),
        }
    }

    let mut lists = class
        .properties
        .iter()
        .filter(|p| matches!(p.kind, PropertyKind::List(_)));
    if let (Some(first), Some(second)) = (lists.next(), lists.next()) {
        return Err(SchemaError::MultipleLists {
            class: name,
            first: first.name.clone(),
            second: second.name.clone(),
        });
    }

    Ok(class)
}

fn load_property(
    class: &str,
    node: Node<'_, '_>,
    declared: &HashSet<&str>,
) -> Result<PropertyDescriptor, SchemaError> {
    let required = |field: &'static str| {
        node.attribute(field).ok_or_else(|| SchemaError::MissingField {
            class: class.to_string(),
            field,
        })
    };
    let name = required("name")?.to_string();
    let ty = required("type")?;

    let flag = |field: &'static str, default: bool| -> Result<bool, SchemaError> {
        match node.attribute(field) {
            None => Ok(default),
            Some(value) => parse_flag(value).ok_or_else(|| SchemaError::InvalidFlag {
                class: class.to_string(),
                property: name.clone(),
                field,
                value: value.to_string(),
            }),
        }
    };

    let dependency = match (node.attribute("dependency"), node.attribute("dependencyAttribute")) {
        (Some(tag), Some(attribute)) => Some(DependencyLink {
            target_tag: tag.to_string(),
            target_attribute: attribute.to_string(),
        }),
        (None, None) => None,
        _ => {
            warn!(class, property = %name, "dependency needs both 'dependency' and 'dependencyAttribute'; ignored");
            None
        }
    };

    Ok(PropertyDescriptor {
        xml_name: node.attribute("attribute").unwrap_or(name.as_str()).to_string(),
        kind: parse_kind(class, &name, ty, declared)?,
        readonly: flag("readonly", false)?,
        visible: flag("visible", true)?,
        category: node.attribute("category").map(str::to_string),
        description: node.attribute("categoryDesc").map(str::to_string),
        dependency,
        has_metadata: node.has_attribute("hasMetadata"),
        data_source: node.has_attribute("dataSource"),
        default_value: None,
        name,
    })
}

fn parse_kind(
    class: &str,
    property: &str,
    ty: &str,
    declared: &HashSet<&str>,
) -> Result<PropertyKind, SchemaError> {
    if let Some((container, inner)) = ty.split_once(':') {
        if container.eq_ignore_ascii_case("enum") {
            let choices = inner
                .split('|')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
            return Ok(PropertyKind::Scalar(ScalarType::Choice(choices)));
        }
        if !declared.contains(inner) {
            return Err(SchemaError::UnknownClass {
                class: class.to_string(),
                property: property.to_string(),
                target: inner.to_string(),
            });
        }
        return Ok(PropertyKind::List(inner.to_string()));
    }

    if declared.contains(ty) {
        return Ok(PropertyKind::Object(ty.to_string()));
    }

    let scalar = match ty.to_ascii_lowercase().as_str() {
        "bool" | "boolean" | "system.boolean" => ScalarType::Bool,
        _ => ScalarType::Text,
    };
    Ok(PropertyKind::Scalar(scalar))
}

fn parse_flag(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
