#![warn(missing_docs)]
//! `xmledit-meta` - module metadata for `xmledit-core`.
//!
//! Pipeline elements such as `<sensor create="Audio"/>` name a library module. That module
//! declares a set of options (each with help text and a default value) which the editor
//! merges into the element's model object so they show up next to the schema-declared
//! properties.
//!
//! This crate only describes that metadata and provides an in-memory [`MetadataCatalog`]
//! that can be loaded from JSON. Resolving metadata from real component libraries is the
//! host's business: implement [`MetadataSource`] for it.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Errors produced while loading or querying metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("I/O error: {0}")]
    /// Reading a catalog file failed.
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    /// The catalog file is not valid JSON or does not match the catalog layout.
    Json(#[from] serde_json::Error),

    #[error("unknown module '{0}'")]
    /// The requested module is not known to the source.
    UnknownModule(String),

    #[error("module '{name}' is unavailable: {reason}")]
    /// The module exists but its metadata could not be produced.
    Unavailable {
        /// Module name.
        name: String,
        /// Human readable reason.
        reason: String,
    },
}

/// Kind of object a module creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Plain object.
    #[default]
    Object,
    /// Stream provider.
    Provider,
    /// Stream consumer.
    Consumer,
    /// Stream transformer.
    Transformer,
    /// Feature extractor.
    Feature,
    /// Filter.
    Filter,
    /// Trigger.
    Trigger,
    /// Classification model.
    Model,
    /// Continuous model.
    ModelContinuous,
    /// Fusion scheme.
    Fusion,
    /// Sensor.
    Sensor,
    /// Feature selection.
    Selection,
}

/// A single configurable option of a module.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OptionInfo {
    /// Option name; also the XML attribute name used to set it.
    pub name: String,
    /// Help text shown next to the option.
    #[serde(default)]
    pub help: String,
    /// Default value, already rendered as text.
    #[serde(default)]
    pub value: String,
}

impl OptionInfo {
    /// Create an option description.
    pub fn new(name: impl Into<String>, help: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            value: value.into(),
        }
    }
}

/// An output channel offered by a sensor module.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelInfo {
    /// Channel name.
    pub name: String,
    /// Channel description.
    #[serde(default)]
    pub info: String,
}

/// Metadata of one library module.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModuleMetadata {
    /// Module name (the value written into the referencing attribute).
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub info: String,
    /// Object kind.
    #[serde(default)]
    pub kind: ObjectKind,
    /// Declared options, in declaration order.
    #[serde(default)]
    pub options: Vec<OptionInfo>,
    /// Channels (sensors only).
    #[serde(default)]
    pub channels: Vec<ChannelInfo>,
}

impl ModuleMetadata {
    /// Create metadata with no options or channels.
    pub fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            name: name.into(),
            info: String::new(),
            kind,
            options: Vec::new(),
            channels: Vec::new(),
        }
    }

    /// Builder-style helper adding an option.
    pub fn with_option(mut self, option: OptionInfo) -> Self {
        self.options.push(option);
        self
    }

    /// Look up an option by name.
    pub fn option(&self, name: &str) -> Option<&OptionInfo> {
        self.options.iter().find(|o| o.name == name)
    }
}

/// Something that can resolve a module name to its metadata.
///
/// Implementations must be shareable with the analysis thread.
pub trait MetadataSource: Send + Sync {
    /// Resolve `module` to its metadata.
    fn lookup(&self, module: &str) -> Result<ModuleMetadata, MetadataError>;
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    modules: Vec<ModuleMetadata>,
}

/// In-memory metadata source.
///
/// The JSON layout is `{ "modules": [ { "name": ..., "kind": ..., "options": [...] } ] }`.
#[derive(Debug, Clone, Default)]
pub struct MetadataCatalog {
    modules: HashMap<String, ModuleMetadata>,
}

impl MetadataCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a catalog from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, MetadataError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        for module in file.modules {
            catalog.insert(module);
        }
        Ok(catalog)
    }

    /// Load a catalog from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MetadataError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Add or replace a module.
    pub fn insert(&mut self, module: ModuleMetadata) {
        self.modules.insert(module.name.clone(), module);
    }

    /// Number of known modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns `true` if the catalog holds no modules.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl MetadataSource for MetadataCatalog {
    fn lookup(&self, module: &str) -> Result<ModuleMetadata, MetadataError> {
        self.modules
            .get(module)
            .cloned()
            .ok_or_else(|| MetadataError::UnknownModule(module.to_string()))
    }
}
