//! Schema-shaped model objects.
//!
//! A [`ModelObject`] mirrors one XML element for a property view. Its shape comes from a
//! shared [`ClassDef`] plus any module options merged in at creation time; its contents are
//! an ordered map from property name to [`Value`], nested objects for single child
//! elements, and one ordered list of repeating children.
//!
//! Model objects are plain values. They are rebuilt from the text on every analysis and
//! never write to the document themselves; see [`crate::ModelSyncEngine`].

use crate::schema::{ClassDef, PropertyDescriptor, PropertyKind, ScalarType};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use xmledit_meta::ModuleMetadata;

/// Category given to properties merged from module metadata.
pub const OPTIONS_CATEGORY: &str = "Options";

/// Errors produced when reading or writing model properties.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("class '{class}' has no property '{property}'")]
    /// The property is neither declared nor merged.
    UnknownProperty {
        /// Class name.
        class: String,
        /// Property name.
        property: String,
    },

    #[error("property '{class}.{property}' is not an attribute")]
    /// The property is an object or list, not a scalar.
    NotScalar {
        /// Class name.
        class: String,
        /// Property name.
        property: String,
    },

    #[error("'{value}' is not a valid boolean for '{property}'")]
    /// A boolean property received text other than `true`/`false`.
    InvalidBool {
        /// Property name.
        property: String,
        /// Offending text.
        value: String,
    },

    #[error("'{value}' is not one of {choices:?} for '{property}'")]
    /// An enumeration property received an unknown name.
    InvalidChoice {
        /// Property name.
        property: String,
        /// Offending text.
        value: String,
        /// Allowed names.
        choices: Vec<String>,
    },
}

/// A property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Text. The empty string means "no attribute".
    Text(String),
    /// Boolean.
    Bool(bool),
    /// Enumeration name.
    Choice(String),
}

impl Value {
    /// Parse attribute text for a property of type `ty`.
    ///
    /// Empty text is always accepted and yields an empty [`Value::Text`].
    pub fn parse(property: &str, ty: &ScalarType, raw: &str) -> Result<Self, ModelError> {
        if raw.is_empty() {
            return Ok(Self::Text(String::new()));
        }
        match ty {
            ScalarType::Text => Ok(Self::Text(raw.to_string())),
            ScalarType::Bool => {
                let trimmed = raw.trim();
                if trimmed.eq_ignore_ascii_case("true") {
                    Ok(Self::Bool(true))
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Ok(Self::Bool(false))
                } else {
                    Err(ModelError::InvalidBool {
                        property: property.to_string(),
                        value: raw.to_string(),
                    })
                }
            }
            ScalarType::Choice(choices) => {
                if choices.is_empty() || choices.iter().any(|c| c == raw) {
                    Ok(Self::Choice(raw.to_string()))
                } else {
                    Err(ModelError::InvalidChoice {
                        property: property.to_string(),
                        value: raw.to_string(),
                        choices: choices.clone(),
                    })
                }
            }
        }
    }

    /// Returns `true` for empty text.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) | Self::Choice(s) => s.is_empty(),
            Self::Bool(_) => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) | Self::Choice(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Non-owning reference to the object a child was read under.
///
/// Resolve it by analyzing `line` again; it is never used to keep the parent alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    /// Parent class name.
    pub class: String,
    /// Parent anchor line.
    pub line: usize,
}

/// In-memory mirror of one XML element.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelObject {
    class: Arc<ClassDef>,
    dynamic: Vec<PropertyDescriptor>,
    module: Option<ModuleMetadata>,
    values: IndexMap<String, Value>,
    objects: IndexMap<String, ModelObject>,
    children: Vec<ModelObject>,
    line: usize,
    parent: Option<ParentRef>,
}

impl ModelObject {
    /// Create an empty, unanchored object of `class`.
    pub fn new(class: Arc<ClassDef>) -> Self {
        Self {
            class,
            dynamic: Vec::new(),
            module: None,
            values: IndexMap::new(),
            objects: IndexMap::new(),
            children: Vec::new(),
            line: 0,
            parent: None,
        }
    }

    /// Class descriptor.
    pub fn class(&self) -> &ClassDef {
        &self.class
    }

    /// Class (tag) name.
    pub fn class_name(&self) -> &str {
        &self.class.name
    }

    /// Whether the class may be selected.
    pub fn is_selectable(&self) -> bool {
        self.class.selectable
    }

    /// 1-based line the backing element starts on; `0` before the first sync.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Set the anchor line.
    pub fn set_line(&mut self, line: usize) {
        self.line = line;
    }

    /// Parent reference, for objects read as list children.
    pub fn parent(&self) -> Option<&ParentRef> {
        self.parent.as_ref()
    }

    /// Set the parent reference.
    pub fn set_parent(&mut self, parent: Option<ParentRef>) {
        self.parent = parent;
    }

    /// Module metadata merged into this object, if any.
    pub fn module(&self) -> Option<&ModuleMetadata> {
        self.module.as_ref()
    }

    /// All property descriptors: schema-declared first, then merged options.
    pub fn descriptors(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.class.properties.iter().chain(self.dynamic.iter())
    }

    /// Descriptor by property name.
    pub fn descriptor(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.descriptors().find(|d| d.name == name)
    }

    /// Descriptor by XML attribute or child element name.
    pub fn descriptor_by_xml(&self, xml_name: &str) -> Option<&PropertyDescriptor> {
        self.descriptors().find(|d| d.xml_name == xml_name)
    }

    /// XML name of a property.
    pub fn xml_name(&self, name: &str) -> Option<&str> {
        self.descriptor(name).map(|d| d.xml_name.as_str())
    }

    /// Present property values, in the order they were set.
    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    /// Value of a property, if present.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Value of a property as text; empty when absent.
    pub fn get_text(&self, name: &str) -> String {
        self.values.get(name).map(Value::to_string).unwrap_or_default()
    }

    fn scalar_type(&self, name: &str) -> Result<&ScalarType, ModelError> {
        let descriptor = self
            .descriptor(name)
            .ok_or_else(|| ModelError::UnknownProperty {
                class: self.class.name.clone(),
                property: name.to_string(),
            })?;
        match &descriptor.kind {
            PropertyKind::Scalar(ty) => Ok(ty),
            _ => Err(ModelError::NotScalar {
                class: self.class.name.clone(),
                property: name.to_string(),
            }),
        }
    }

    /// Set a property from attribute text, validated against its type.
    pub fn set_text(&mut self, name: &str, raw: &str) -> Result<(), ModelError> {
        let value = Value::parse(name, self.scalar_type(name)?, raw)?;
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Set a property value, validated against its type.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ModelError> {
        self.set_text(name, &value.into().to_string())
    }

    /// Forget a property value.
    pub fn clear(&mut self, name: &str) -> Option<Value> {
        self.values.shift_remove(name)
    }

    pub(crate) fn clear_values(&mut self) {
        self.values.clear();
        self.objects.clear();
    }

    /// Nested object stored under an object-typed property.
    pub fn object(&self, name: &str) -> Option<&ModelObject> {
        self.objects.get(name)
    }

    /// All nested objects by property name.
    pub fn objects(&self) -> &IndexMap<String, ModelObject> {
        &self.objects
    }

    pub(crate) fn set_object(&mut self, name: &str, object: ModelObject) {
        self.objects.insert(name.to_string(), object);
    }

    /// Repeating children, in document order.
    pub fn children(&self) -> &[ModelObject] {
        &self.children
    }

    pub(crate) fn clear_children(&mut self) {
        self.children.clear();
    }

    pub(crate) fn push_child(&mut self, child: ModelObject) {
        self.children.push(child);
    }

    /// Find this object or a descendant whose element starts on `line`.
    pub fn find_by_line(&self, line: usize) -> Option<&ModelObject> {
        if self.line == line {
            return Some(self);
        }
        self.children
            .iter()
            .chain(self.objects.values())
            .find_map(|c| c.find_by_line(line))
    }

    /// Merge module options as extra text properties.
    ///
    /// Options whose name (or XML name) is already a property are skipped, so
    /// schema-declared properties always win.
    pub fn merge_metadata(&mut self, module: ModuleMetadata) {
        for option in &module.options {
            if self.descriptor(&option.name).is_some()
                || self.descriptor_by_xml(&option.name).is_some()
            {
                continue;
            }
            let mut descriptor = PropertyDescriptor::text(option.name.clone());
            descriptor.category = Some(OPTIONS_CATEGORY.to_string());
            descriptor.description = (!option.help.is_empty()).then(|| option.help.clone());
            descriptor.default_value = Some(option.value.clone());
            self.dynamic.push(descriptor);
        }
        self.module = Some(module);
    }

    /// Shift the anchor of this object and its descendants by `delta` lines if they start
    /// at or after `from_line`.
    pub fn shift_lines(&mut self, from_line: usize, delta: isize) {
        if self.line >= from_line {
            self.line = self.line.saturating_add_signed(delta);
        }
        if let Some(parent) = self.parent.as_mut()
            && parent.line >= from_line
        {
            parent.line = parent.line.saturating_add_signed(delta);
        }
        for child in self.children.iter_mut().chain(self.objects.values_mut()) {
            child.shift_lines(from_line, delta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use pretty_assertions::assert_eq;
    use xmledit_meta::{ObjectKind, OptionInfo};

    fn schema() -> Schema {
        Schema::parse(
            r#"<ClassDef>
                <sensor selectable="true">
                    <property name="create" type="string" hasMetadata="true"/>
                    <property name="scale" type="bool"/>
                    <property name="mode" type="enum:fast|slow"/>
                    <property name="label" type="string" attribute="name"/>
                    <property name="providers" type="Sequenz:provider" attribute="provider"/>
                </sensor>
                <provider><property name="channel" type="string"/></provider>
            </ClassDef>"#,
        )
        .unwrap()
    }

    fn sensor() -> ModelObject {
        ModelObject::new(Arc::clone(schema().class("sensor").unwrap()))
    }

    #[test]
    fn test_typed_values() {
        let mut model = sensor();
        model.set_text("create", "Audio").unwrap();
        model.set_text("scale", "True").unwrap();
        model.set_text("mode", "slow").unwrap();

        assert_eq!(model.get("create"), Some(&Value::Text("Audio".into())));
        assert_eq!(model.get("scale"), Some(&Value::Bool(true)));
        assert_eq!(model.get("mode"), Some(&Value::Choice("slow".into())));
        assert_eq!(model.get_text("scale"), "true");
        assert_eq!(model.get_text("label"), "");
    }

    #[test]
    fn test_invalid_values() {
        let mut model = sensor();
        assert!(matches!(
            model.set_text("scale", "yes"),
            Err(ModelError::InvalidBool { .. })
        ));
        assert!(matches!(
            model.set_text("mode", "medium"),
            Err(ModelError::InvalidChoice { .. })
        ));
        assert!(matches!(
            model.set_text("nope", "x"),
            Err(ModelError::UnknownProperty { .. })
        ));
        assert!(matches!(
            model.set_text("providers", "x"),
            Err(ModelError::NotScalar { .. })
        ));
        // Empty text is always accepted: it means "remove the attribute".
        model.set_text("scale", "").unwrap();
        assert!(model.get("scale").unwrap().is_empty());
    }

    #[test]
    fn test_xml_name_mapping() {
        let model = sensor();
        assert_eq!(model.xml_name("label"), Some("name"));
        assert_eq!(model.descriptor_by_xml("name").unwrap().name, "label");
        assert_eq!(model.descriptor_by_xml("provider").unwrap().name, "providers");
    }

    #[test]
    fn test_merge_metadata_never_overwrites() {
        let mut model = sensor();
        let module = ModuleMetadata::new("Audio", ObjectKind::Sensor)
            .with_option(OptionInfo::new("sr", "sample rate", "16000"))
            .with_option(OptionInfo::new("scale", "scale output", "false"))
            .with_option(OptionInfo::new("name", "clashes with an XML name", ""));
        model.merge_metadata(module);

        let names: Vec<_> = model.descriptors().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["create", "scale", "mode", "label", "providers", "sr"]);

        let sr = model.descriptor("sr").unwrap();
        assert_eq!(sr.category.as_deref(), Some(OPTIONS_CATEGORY));
        assert_eq!(sr.description.as_deref(), Some("sample rate"));
        assert_eq!(sr.default_value.as_deref(), Some("16000"));
        assert_eq!(
            model.descriptor("scale").unwrap().kind,
            PropertyKind::Scalar(ScalarType::Bool)
        );
        assert_eq!(model.module().unwrap().name, "Audio");

        model.set_text("sr", "8000").unwrap();
        assert_eq!(model.get_text("sr"), "8000");
    }

    #[test]
    fn test_shift_lines() {
        let schema = schema();
        let mut model = ModelObject::new(Arc::clone(schema.class("sensor").unwrap()));
        model.set_line(5);
        let mut child = ModelObject::new(Arc::clone(schema.class("provider").unwrap()));
        child.set_line(6);
        child.set_parent(Some(ParentRef {
            class: "sensor".into(),
            line: 5,
        }));
        model.push_child(child);

        model.shift_lines(3, 2);
        assert_eq!(model.line(), 7);
        assert_eq!(model.children()[0].line(), 8);
        assert_eq!(model.children()[0].parent().unwrap().line, 7);

        model.shift_lines(8, -1);
        assert_eq!(model.line(), 7);
        assert_eq!(model.children()[0].line(), 7);
        assert_eq!(model.find_by_line(7).unwrap().class_name(), "sensor");
    }
}
