//! Read-only schema descriptors.
//!
//! A [`ClassDef`] describes one element type: its properties (with the XML attribute
//! each one maps to), view flags, dependency links and an optional insert rule. Classes
//! are immutable after loading and shared between every model object created from them.

/// Scalar value type of a property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalarType {
    /// Free text. Numeric and unknown host types are edited as text too.
    Text,
    /// `true` / `false`.
    Bool,
    /// One of a fixed set of names.
    Choice(Vec<String>),
}

/// What a property holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    /// An XML attribute value.
    Scalar(ScalarType),
    /// A single nested child element of the named class.
    Object(String),
    /// The repeating child elements of the named class.
    List(String),
}

impl PropertyKind {
    /// Returns `true` for attribute-backed properties.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }
}

/// Changing the owning property renames matching attributes of other elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyLink {
    /// Tag of the elements to patch.
    pub target_tag: String,
    /// Attribute on those elements that holds the old value.
    pub target_attribute: String,
}

/// Editing an element of the owning class ensures a child exists under another node.
///
/// When a model of the class is synced, the first child of the root named
/// `insert_in_node` must contain an `insert_type` element whose `insert_in_attribute`
/// equals the model's `insert_value` property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertRule {
    /// Parent node, a direct child of the document root.
    pub insert_in_node: String,
    /// Tag of the child to ensure.
    pub insert_type: String,
    /// Property of the model whose value is written.
    pub insert_value: String,
    /// Attribute of the child receiving the value.
    pub insert_in_attribute: String,
}

/// Descriptor of one property, as consulted by the view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    /// Property name.
    pub name: String,
    /// XML attribute (or child element) name; defaults to `name`.
    pub xml_name: String,
    /// Value kind.
    pub kind: PropertyKind,
    /// Shown but not editable.
    pub readonly: bool,
    /// Shown at all.
    pub visible: bool,
    /// Grouping in the property view.
    pub category: Option<String>,
    /// Help text.
    pub description: Option<String>,
    /// Rename propagation target.
    pub dependency: Option<DependencyLink>,
    /// The value names a library module whose options are merged into the model.
    pub has_metadata: bool,
    /// The value is picked from an external data source.
    pub data_source: bool,
    /// Default value (set for merged module options).
    pub default_value: Option<String>,
}

impl PropertyDescriptor {
    /// A visible, editable text property mapped to the attribute of the same name.
    pub fn text(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            xml_name: name.clone(),
            name,
            kind: PropertyKind::Scalar(ScalarType::Text),
            readonly: false,
            visible: true,
            category: None,
            description: None,
            dependency: None,
            has_metadata: false,
            data_source: false,
            default_value: None,
        }
    }
}

/// One element type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    /// Tag name.
    pub name: String,
    /// Base class, if declared with `extends`.
    pub base: Option<String>,
    /// Whether the caret may select elements of this class.
    pub selectable: bool,
    /// Insert rule, inherited from the base unless redeclared.
    pub insert_rule: Option<InsertRule>,
    /// Properties, base properties first.
    pub properties: Vec<PropertyDescriptor>,
}

impl ClassDef {
    /// Property by name.
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Property by XML attribute or child element name.
    pub fn property_by_xml(&self, xml_name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.xml_name == xml_name)
    }

    /// The repeating child collection, if any.
    pub fn list_property(&self) -> Option<&PropertyDescriptor> {
        self.properties
            .iter()
            .find(|p| matches!(p.kind, PropertyKind::List(_)))
    }

    /// The first property whose value references module metadata.
    pub fn metadata_property(&self) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.has_metadata)
    }
}
