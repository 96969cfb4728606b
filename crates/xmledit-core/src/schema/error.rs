use thiserror::Error;

#[derive(Debug, Error)]
/// Errors produced while loading a class-definition schema.
pub enum SchemaError {
    #[error("XML parse error: {0}")]
    /// The schema is not well-formed XML.
    Xml(#[from] roxmltree::Error),

    #[error("I/O error: {0}")]
    /// Reading the schema file failed.
    Io(#[from] std::io::Error),

    #[error("expected root element 'ClassDef', found '{0}'")]
    /// The document root is not `ClassDef`.
    UnexpectedRoot(String),

    #[error("class '{0}' is declared twice")]
    /// Two declarations share a tag.
    DuplicateClass(String),

    #[error("class '{class}' extends '{base}', which is not declared before it")]
    /// `extends` names an unknown or later declared class.
    UnknownBase {
        /// Declaring class.
        class: String,
        /// Missing base.
        base: String,
    },

    #[error("property of class '{class}' is missing required attribute '{field}'")]
    /// A property declaration lacks `name` or `type`.
    MissingField {
        /// Declaring class.
        class: String,
        /// Missing attribute.
        field: &'static str,
    },

    #[error("property '{class}.{property}' has invalid boolean '{value}' for '{field}'")]
    /// A boolean flag could not be parsed.
    InvalidFlag {
        /// Declaring class.
        class: String,
        /// Property name (empty for class-level flags).
        property: String,
        /// Flag attribute.
        field: &'static str,
        /// Offending text.
        value: String,
    },

    #[error("property '{class}.{property}' references unknown class '{target}'")]
    /// A list property names a class that is never declared.
    UnknownClass {
        /// Declaring class.
        class: String,
        /// Property name.
        property: String,
        /// Missing class.
        target: String,
    },

    #[error("class '{class}' declares more than one list property ('{first}', '{second}')")]
    /// Only one repeating child collection is allowed per class.
    MultipleLists {
        /// Declaring class.
        class: String,
        /// First list property.
        first: String,
        /// Second list property.
        second: String,
    },
}
