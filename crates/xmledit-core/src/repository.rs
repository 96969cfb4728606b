//! Model object factory.

use crate::model::ModelObject;
use crate::schema::Schema;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};
use xmledit_meta::MetadataSource;

/// Creates fresh [`ModelObject`]s for tag names.
///
/// Built once per editor session and shared (by reference) with the engine. Module
/// metadata is optional; without a source, objects carry only schema properties.
pub struct SchemaRepository {
    schema: Schema,
    metadata: Option<Arc<dyn MetadataSource>>,
}

impl SchemaRepository {
    /// Create a repository without module metadata.
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            metadata: None,
        }
    }

    /// Attach a metadata source.
    pub fn with_metadata(mut self, source: Arc<dyn MetadataSource>) -> Self {
        self.metadata = Some(source);
        self
    }

    /// The loaded schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// A new, empty object for `tag`; `None` for tags the schema does not declare.
    pub fn get_model(&self, tag: &str) -> Option<ModelObject> {
        self.schema
            .class(tag)
            .map(|class| ModelObject::new(Arc::clone(class)))
    }

    /// Like [`get_model`](Self::get_model), then merges the options of the module named
    /// on `line_text` by the class's metadata property.
    ///
    /// Resolution failures are logged and leave the object with its schema properties.
    pub fn get_model_for_line(&self, tag: &str, line_text: &str) -> Option<ModelObject> {
        let mut model = self.get_model(tag)?;
        let (Some(source), Some(property)) = (&self.metadata, model.class().metadata_property())
        else {
            return Some(model);
        };

        let Some(module) = attribute_value(line_text, &property.xml_name) else {
            debug!(tag, attribute = %property.xml_name, "no module named on line");
            return Some(model);
        };

        match source.lookup(&module) {
            Ok(metadata) => {
                debug!(tag, module = %module, options = metadata.options.len(), "merging module options");
                model.merge_metadata(metadata);
            }
            Err(err) => {
                warn!(tag, module = %module, error = %err, "module metadata unavailable; using schema properties only");
            }
        }
        Some(model)
    }
}

/// Value of attribute `xml_name` written on a single line of text.
pub(crate) fn attribute_value(line: &str, xml_name: &str) -> Option<String> {
    let pattern = format!(
        r#"(?:^|[\s<])\s*{}\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
        regex::escape(xml_name)
    );
    let caps = Regex::new(&pattern).ok()?.captures(line)?;
    let value = caps.get(1).or_else(|| caps.get(2))?.as_str();
    (!value.is_empty()).then(|| value.to_string())
}
