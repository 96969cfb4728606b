#![warn(missing_docs)]
//! XmlEdit Core - Headless XML Text/Model Synchronization Kernel
//!
//! # Overview
//!
//! `xmledit-core` keeps a pipeline XML document, held in a line-addressable text buffer,
//! consistent with a schema-shaped object model that backs a property view. It does not
//! render anything; the host editor provides the caret and shows the published model.
//!
//! # Core Features
//!
//! - **Schema-driven models**: element types, inheritance, typed attributes, one
//!   repeating child collection per type, nested objects
//! - **Module metadata**: options of the library module named by an element are merged
//!   into its model
//! - **Minimal write-back**: edits replace only the start tag of one element
//! - **Dependency propagation**: renaming an attribute renames matching references
//! - **Insert rules**: editing an element can ensure a companion element exists
//! - **Throttled selection**: buffer events are coalesced into serialized analyses
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  SelectionCoordinator (ticks, view edits)   │  ← Host API
//! ├─────────────────────────────────────────────┤
//! │  ModelSyncEngine (analyze / change)         │  ← Synchronization
//! ├─────────────────────────────────────────────┤
//! │  SchemaRepository + ModelObject             │  ← Model
//! ├─────────────────────────────────────────────┤
//! │  TagMatcher + XML location/rewriting        │  ← Document Access
//! ├─────────────────────────────────────────────┤
//! │  TextBuffer (rope-based line index)         │  ← Text Storage
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use xmledit_core::{Analysis, ModelSyncEngine, Schema, SchemaRepository, SharedBuffer, TextBuffer};
//!
//! let schema = Schema::parse(
//!     r#"<ClassDef>
//!          <sensor selectable="true">
//!            <property name="create" type="string"/>
//!            <property name="option" type="string"/>
//!          </sensor>
//!        </ClassDef>"#,
//! ).unwrap();
//!
//! let buffer = Arc::new(SharedBuffer::new(
//!     "<pipeline>\n  <sensor create=\"Audio\" option=\"x\"/>\n</pipeline>",
//! ));
//! let engine = ModelSyncEngine::new(buffer.clone(), Arc::new(SchemaRepository::new(schema)));
//!
//! let Analysis::Selected(model) = engine.analyze(2).unwrap() else { panic!() };
//! assert_eq!(model.get_text("create"), "Audio");
//!
//! let mut edited = (*model).clone();
//! edited.set_text("option", "y").unwrap();
//! engine.change_model(&edited, "option", "x").unwrap();
//! assert_eq!(buffer.line_text(2).unwrap(), "  <sensor create=\"Audio\" option=\"y\"/>");
//! ```
//!
//! # Module Description
//!
//! - [`buffer`] - Text buffer trait and the shipped thread-safe implementation
//! - [`line_index`] - Rope based line index
//! - [`tag`] - Single-line tag recognition
//! - [`schema`] - Class-definition schema loading
//! - [`model`] - Model objects and values
//! - [`repository`] - Model object factory with metadata merging
//! - [`xml`] - Element location and start-tag rewriting
//! - [`sync`] - The synchronization engine
//! - [`coordinator`] - Event coalescing and the worker thread
//! - [`config`] - Session configuration

pub mod buffer;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod line_index;
pub mod model;
pub mod repository;
pub mod schema;
pub mod sync;
pub mod tag;
pub mod xml;

pub use buffer::{
    BufferCallback, BufferDelta, BufferError, BufferEvent, LineEnding, SharedBuffer, TextBuffer,
};
pub use config::{ConfigError, CoordinatorConfig, SyncConfig, XmlEditConfig};
pub use coordinator::{PropertyChange, SelectionCoordinator};
pub use error::SyncError;
pub use line_index::LineIndex;
pub use model::{ModelError, ModelObject, OPTIONS_CATEGORY, ParentRef, Value};
pub use repository::SchemaRepository;
pub use schema::{
    ClassDef, DependencyLink, InsertRule, PropertyDescriptor, PropertyKind, ScalarType, Schema,
    SchemaError,
};
pub use sync::{
    Analysis, ChangeReport, DependentFailure, EngineState, ModelSyncEngine, SelectionCallback,
    SelectionEvent,
};
pub use tag::{TagKind, TagMatch, TagMatcher};
pub use xmledit_meta::{MetadataCatalog, MetadataError, MetadataSource, ModuleMetadata};
