//! Text/model synchronization.
//!
//! [`ModelSyncEngine`] keeps one XML document (held in a [`TextBuffer`]) and the model
//! object of the element under the caret consistent in both directions:
//!
//! - **text → model**: [`analyze`](ModelSyncEngine::analyze) recognizes the tag on a line,
//!   builds a fresh [`ModelObject`] for it and fills it from the live element, its single
//!   nested objects and its repeating children. Classes with an insert rule may write a
//!   missing child element into the document while doing so.
//! - **model → text**: [`change_model`](ModelSyncEngine::change_model) writes one edited
//!   property back into the start tag of the element and renames dependent attributes
//!   elsewhere in the document.
//!
//! # Concurrency
//!
//! The engine is shared between the scheduler thread (analysis) and the thread that
//! applies view edits. An atomic state admits one operation at a time: an overlapping
//! analysis is skipped, an overlapping change fails with [`SyncError::Busy`].
//!
//! # Failure model
//!
//! Write-backs replace only the start tag of an element, after checking that the buffer
//! still holds the exact text the edit was computed from. Dependency propagation is not
//! transactional: the primary edit stays applied and dependents that could not be
//! updated are listed in the [`ChangeReport`].

use crate::buffer::TextBuffer;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::model::{ModelError, ModelObject, ParentRef};
use crate::repository::SchemaRepository;
use crate::schema::PropertyKind;
use crate::tag::{TagKind, TagMatcher};
use crate::xml::{self, LineMap, XmlElementRef};
use parking_lot::Mutex;
use roxmltree::{Document, Node};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{debug, info, warn};

/// What the engine is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    /// Ready for the next operation.
    Idle = 0,
    /// Rebuilding the selection from the text.
    Analyzing = 1,
    /// Writing a model edit into the text.
    Applying = 2,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Analyzing,
            2 => Self::Applying,
            _ => Self::Idle,
        }
    }
}

/// Outcome of [`ModelSyncEngine::analyze`].
#[derive(Debug, Clone, PartialEq)]
pub enum Analysis {
    /// A model was built and published.
    Selected(Arc<ModelObject>),
    /// The line holds nothing selectable; "no selection" was published.
    Cleared,
    /// Another operation was in flight; nothing was done.
    Skipped,
}

/// A dependent element that was not renamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentFailure {
    /// Line the dependent element starts on.
    pub line: usize,
    /// Error message.
    pub reason: String,
}

/// Result of [`ModelSyncEngine::change_model`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeReport {
    /// Line of the edited element.
    pub line: usize,
    /// Lines of dependent elements that were renamed, ascending.
    pub updated: Vec<usize>,
    /// Dependent elements that were left unchanged, ascending by line.
    pub failed: Vec<DependentFailure>,
}

impl ChangeReport {
    /// Returns `true` if every dependent element was renamed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Selection notification.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionEvent {
    /// The active model changed; `None` means "no selection".
    ModelChanged(Option<Arc<ModelObject>>),
}

/// Selection callback type.
pub type SelectionCallback = Box<dyn FnMut(&SelectionEvent) + Send>;

/// Resets the engine state when an operation ends, including by `?`.
struct StateGuard<'a> {
    state: &'a AtomicU8,
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.state.store(EngineState::Idle as u8, Ordering::Release);
    }
}

/// Keeps a text buffer and the selected model object consistent.
pub struct ModelSyncEngine {
    buffer: Arc<dyn TextBuffer>,
    repository: Arc<SchemaRepository>,
    matcher: TagMatcher,
    config: SyncConfig,
    state: AtomicU8,
    selection: Mutex<Option<Arc<ModelObject>>>,
    subscribers: Mutex<Vec<SelectionCallback>>,
}

impl ModelSyncEngine {
    /// Create an engine with default configuration.
    pub fn new(buffer: Arc<dyn TextBuffer>, repository: Arc<SchemaRepository>) -> Self {
        Self::with_config(buffer, repository, SyncConfig::default())
    }

    /// Create an engine.
    pub fn with_config(
        buffer: Arc<dyn TextBuffer>,
        repository: Arc<SchemaRepository>,
        config: SyncConfig,
    ) -> Self {
        Self {
            buffer,
            repository,
            matcher: TagMatcher::new(),
            config,
            state: AtomicU8::new(EngineState::Idle as u8),
            selection: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// The document buffer.
    pub fn buffer(&self) -> &Arc<dyn TextBuffer> {
        &self.buffer
    }

    /// The model factory.
    pub fn repository(&self) -> &Arc<SchemaRepository> {
        &self.repository
    }

    /// Engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns `true` while an analysis or change is in flight.
    pub fn is_busy(&self) -> bool {
        self.state() != EngineState::Idle
    }

    /// The currently published model.
    pub fn selection(&self) -> Option<Arc<ModelObject>> {
        self.selection.lock().clone()
    }

    /// Register a callback for selection changes.
    ///
    /// Callbacks run on the thread that performed the analysis while the engine is still
    /// busy, so publications arrive in the order the analyses ran. A callback that calls
    /// back into the engine gets [`Analysis::Skipped`] or [`SyncError::Busy`].
    pub fn subscribe(&self, callback: SelectionCallback) {
        self.subscribers.lock().push(callback);
    }

    fn enter(&self, state: EngineState) -> Option<StateGuard<'_>> {
        self.state
            .compare_exchange(
                EngineState::Idle as u8,
                state as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| StateGuard { state: &self.state })
    }

    fn publish(&self, model: Option<Arc<ModelObject>>) {
        *self.selection.lock() = model.clone();
        let event = SelectionEvent::ModelChanged(model);
        for callback in self.subscribers.lock().iter_mut() {
            callback(&event);
        }
    }

    /// Rebuild the selection for the element on `line` (1-based) and publish it.
    ///
    /// Unknown tags, non-selectable classes and lines without a tag publish "no
    /// selection". Malformed XML and buffer errors are returned and leave the previous
    /// selection in place.
    pub fn analyze(&self, line: usize) -> Result<Analysis> {
        let Some(_guard) = self.enter(EngineState::Analyzing) else {
            debug!(line, state = ?self.state(), "analysis skipped; engine busy");
            return Ok(Analysis::Skipped);
        };

        match self.analyze_line(line) {
            Ok(Some(model)) => {
                debug!(line, class = model.class_name(), anchor = model.line(), "selected");
                let model = Arc::new(model);
                self.publish(Some(Arc::clone(&model)));
                Ok(Analysis::Selected(model))
            }
            Ok(None) => {
                debug!(line, "no selection");
                self.publish(None);
                Ok(Analysis::Cleared)
            }
            Err(err) => {
                warn!(line, error = %err, "analysis aborted; keeping previous selection");
                Err(err)
            }
        }
    }

    fn analyze_line(&self, line: usize) -> Result<Option<ModelObject>> {
        let line_text = self.buffer.line_text(line)?;
        let Some(found) = self.matcher.find(&line_text) else {
            return Ok(None);
        };

        let text = self.buffer.text();
        let doc = xml::parse(&text)?;
        let lines = LineMap::new(&text);

        let anchor = match found.kind {
            TagKind::Open => line,
            TagKind::Close => closed_element_line(&text, &doc, &lines, line, &found.name)
                .unwrap_or(line),
        };

        let anchor_text = if anchor == line {
            line_text
        } else {
            self.buffer.line_text(anchor)?
        };
        let selected = match self.repository.get_model_for_line(&found.name, &anchor_text) {
            Some(model) if model.is_selectable() => Some((model, anchor)),
            other => {
                if other.is_none() {
                    debug!(line, tag = %found.name, "tag not declared in schema");
                }
                if self.config.retry_enclosing {
                    self.enclosing_model(&doc, &lines, anchor)?
                } else {
                    None
                }
            }
        };
        let Some((mut model, anchor)) = selected else {
            return Ok(None);
        };

        self.sync_parsed(&mut model, &text, &doc, &lines, anchor)?;
        drop(doc);
        self.apply_insert_rule(&mut model)?;
        Ok(Some(model))
    }

    /// The nearest selectable element enclosing the one on `line`.
    fn enclosing_model(
        &self,
        doc: &Document<'_>,
        lines: &LineMap,
        line: usize,
    ) -> Result<Option<(ModelObject, usize)>> {
        let start = xml::element_at_line(doc, lines, line).or_else(|| {
            let byte = lines.line_start(line)?;
            doc.descendants()
                .filter(|n| n.is_element() && n.range().contains(&byte))
                .last()
        });
        let Some(start) = start else {
            return Ok(None);
        };

        for node in start.ancestors().filter(Node::is_element) {
            let name = node.tag_name().name();
            let selectable = self
                .repository
                .schema()
                .class(name)
                .is_some_and(|class| class.selectable);
            if !selectable {
                continue;
            }
            let anchor = lines.line_of(node.range().start);
            let anchor_text = self.buffer.line_text(anchor)?;
            if let Some(model) = self.repository.get_model_for_line(name, &anchor_text) {
                debug!(line, anchor, class = name, "retargeted to enclosing element");
                return Ok(Some((model, anchor)));
            }
        }
        Ok(None)
    }

    /// Fill `model` from the element starting on `line`.
    ///
    /// Values, nested objects and repeating children are replaced with what the text
    /// holds. If the class has an insert rule, a missing target child is written into
    /// the document and the model's lines are adjusted accordingly.
    pub fn sync_model(&self, model: &mut ModelObject, line: usize) -> Result<()> {
        let _guard = self.enter(EngineState::Analyzing).ok_or(SyncError::Busy)?;
        {
            let text = self.buffer.text();
            let doc = xml::parse(&text)?;
            let lines = LineMap::new(&text);
            self.sync_parsed(model, &text, &doc, &lines, line)?;
        }
        self.apply_insert_rule(model)
    }

    fn sync_parsed(
        &self,
        model: &mut ModelObject,
        text: &str,
        doc: &Document<'_>,
        lines: &LineMap,
        line: usize,
    ) -> Result<()> {
        let node = locate(text, doc, lines, line, model.class_name())?;
        self.populate(model, text, lines, node);
        Ok(())
    }

    /// A model for `node`, with module metadata read from its own start line.
    fn model_for(
        &self,
        tag: &str,
        text: &str,
        lines: &LineMap,
        node: Node<'_, '_>,
    ) -> Option<ModelObject> {
        let line_text = lines
            .line_text(text, lines.line_of(node.range().start))
            .unwrap_or_default();
        self.repository.get_model_for_line(tag, line_text)
    }

    fn populate(
        &self,
        model: &mut ModelObject,
        text: &str,
        lines: &LineMap,
        node: Node<'_, '_>,
    ) {
        model.clear_values();
        model.clear_children();
        model.set_line(lines.line_of(node.range().start));
        read_attributes(model, node);

        let parent = ParentRef {
            class: model.class_name().to_string(),
            line: model.line(),
        };

        if let Some((xml_name, target)) = model.class().list_property().and_then(|p| match &p.kind {
            PropertyKind::List(target) => Some((p.xml_name.clone(), target.clone())),
            _ => None,
        }) {
            for child in xml::child_elements(node) {
                let tag = child.tag_name().name();
                if tag != xml_name && tag != target {
                    continue;
                }
                let Some(mut item) = self
                    .model_for(tag, text, lines, child)
                    .or_else(|| self.model_for(&target, text, lines, child))
                else {
                    debug!(tag, "list item class not declared");
                    continue;
                };
                item.set_line(lines.line_of(child.range().start));
                item.set_parent(Some(parent.clone()));
                read_attributes(&mut item, child);
                model.push_child(item);
            }
        }

        let objects: Vec<(String, String, String)> = model
            .class()
            .properties
            .iter()
            .filter_map(|p| match &p.kind {
                PropertyKind::Object(target) => {
                    Some((p.name.clone(), p.xml_name.clone(), target.clone()))
                }
                _ => None,
            })
            .collect();
        for (name, xml_name, target) in objects {
            let Some(child) = xml::child_elements(node).find(|n| n.tag_name().name() == xml_name)
            else {
                continue;
            };
            let Some(mut object) = self.model_for(&target, text, lines, child) else {
                continue;
            };
            self.populate(&mut object, text, lines, child);
            object.set_parent(Some(parent.clone()));
            model.set_object(&name, object);
        }
    }

    /// Ensure the child required by the model's insert rule exists.
    fn apply_insert_rule(&self, model: &mut ModelObject) -> Result<()> {
        let Some(rule) = model.class().insert_rule.clone() else {
            return Ok(());
        };
        let value = model.get_text(&rule.insert_value);
        if value.is_empty() {
            debug!(class = model.class_name(), property = %rule.insert_value, "insert rule skipped; value is empty");
            return Ok(());
        }

        let text = self.buffer.text();
        let doc = xml::parse(&text)?;
        let Some(parent) = xml::child_elements(doc.root_element())
            .find(|n| n.tag_name().name() == rule.insert_in_node)
        else {
            debug!(node = %rule.insert_in_node, "insert rule skipped; node not found");
            return Ok(());
        };

        let present = xml::child_elements(parent).any(|n| {
            n.tag_name().name() == rule.insert_type
                && n.attribute(rule.insert_in_attribute.as_str()) == Some(value.as_str())
        });
        if present {
            return Ok(());
        }

        let lines = LineMap::new(&text);
        let child = xml::render_element(
            &rule.insert_type,
            &[(rule.insert_in_attribute.as_str(), value.as_str())],
        );
        let edit = xml::insert_first_child(&text, &lines, parent, &child, &self.config.indent);
        let removed = &text[edit.range.clone()];
        let offset = xml::char_offset(&text, edit.range.start);
        let len = removed.chars().count();
        let line = lines.line_of(edit.range.start);
        check_unchanged(self.buffer.as_ref(), line, offset, removed)?;
        self.buffer.replace(offset, len, &edit.text)?;

        let delta = edit.added_lines as isize - removed.matches('\n').count() as isize;
        model.shift_lines(lines.line_of(edit.range.end) + 1, delta);
        info!(
            node = %rule.insert_in_node,
            element = %child,
            line,
            "inserted missing element"
        );
        Ok(())
    }

    /// Write the current value of `property` into the element of `model`.
    ///
    /// An empty value removes the attribute. If the property declares a dependency,
    /// every `target_tag` element whose `target_attribute` equals `old_value` is renamed
    /// to the new value as well.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Busy`] while another operation is in flight.
    /// - [`SyncError::AnchorMismatch`] if the model's line no longer starts its element.
    /// - [`SyncError::TextDrift`] if the buffer changed while the edit was prepared.
    ///
    /// On any error the buffer is left as it was. Dependents that fail are reported in
    /// the returned [`ChangeReport`] instead.
    pub fn change_model(
        &self,
        model: &ModelObject,
        property: &str,
        old_value: &str,
    ) -> Result<ChangeReport> {
        let _guard = self.enter(EngineState::Applying).ok_or(SyncError::Busy)?;

        let descriptor = model
            .descriptor(property)
            .ok_or_else(|| ModelError::UnknownProperty {
                class: model.class_name().to_string(),
                property: property.to_string(),
            })?
            .clone();
        if !descriptor.kind.is_scalar() {
            return Err(ModelError::NotScalar {
                class: model.class_name().to_string(),
                property: property.to_string(),
            }
            .into());
        }
        let new_value = model.get_text(property);
        let value = (!new_value.is_empty()).then_some(new_value.as_str());

        {
            let text = self.buffer.text();
            let doc = xml::parse(&text)?;
            let lines = LineMap::new(&text);
            let node = locate(&text, &doc, &lines, model.line(), model.class_name())?;
            self.write_attribute(&text, &lines, node, &descriptor.xml_name, value)?;
        }
        info!(
            line = model.line(),
            class = model.class_name(),
            property,
            value = %new_value,
            "property written"
        );

        let mut report = ChangeReport {
            line: model.line(),
            ..ChangeReport::default()
        };
        let Some(link) = descriptor.dependency.as_ref() else {
            return Ok(report);
        };
        if old_value == new_value {
            return Ok(report);
        }

        let text = self.buffer.text();
        let doc = xml::parse(&text)?;
        let lines = LineMap::new(&text);
        let targets: Vec<Node<'_, '_>> = doc
            .descendants()
            .filter(|n| {
                n.is_element()
                    && n.tag_name().name() == link.target_tag
                    && n.attribute(link.target_attribute.as_str()) == Some(old_value)
            })
            .collect();

        // Back to front: each edit leaves the offsets of earlier elements valid.
        for node in targets.into_iter().rev() {
            let line = lines.line_of(node.range().start);
            match self.write_attribute(&text, &lines, node, &link.target_attribute, value) {
                Ok(()) => report.updated.push(line),
                Err(err) => {
                    warn!(
                        line,
                        tag = %link.target_tag,
                        attribute = %link.target_attribute,
                        error = %err,
                        "dependent element not updated"
                    );
                    report.failed.push(DependentFailure {
                        line,
                        reason: err.to_string(),
                    });
                }
            }
        }
        report.updated.reverse();
        report.failed.reverse();

        if !report.updated.is_empty() {
            info!(
                tag = %link.target_tag,
                attribute = %link.target_attribute,
                from = %old_value,
                to = %new_value,
                count = report.updated.len(),
                "dependents renamed"
            );
        }
        Ok(report)
    }

    /// Replace the start tag of `node` with one where `xml_name` holds `value`.
    fn write_attribute(
        &self,
        text: &str,
        lines: &LineMap,
        node: Node<'_, '_>,
        xml_name: &str,
        value: Option<&str>,
    ) -> Result<()> {
        let element = XmlElementRef::new(text, lines, node);
        let old = element.start_tag_text(text);
        let new = xml::rewrite_attribute(text, node, xml_name, value);
        if new == old {
            return Ok(());
        }
        check_unchanged(self.buffer.as_ref(), element.line, element.start_char, old)?;
        self.buffer.replace(element.start_char, element.start_tag_chars, &new)?;
        Ok(())
    }
}

/// The element of class `class` starting on `line`.
fn locate<'a, 'input>(
    text: &str,
    doc: &'a Document<'input>,
    lines: &LineMap,
    line: usize,
    class: &str,
) -> Result<Node<'a, 'input>> {
    match xml::element_at_line(doc, lines, line) {
        Some(node) if node.tag_name().name() == class => Ok(node),
        other => Err(SyncError::AnchorMismatch {
            line,
            expected: class.to_string(),
            found: other.map(|n| xml::qualified_name(text, n).to_string()),
        }),
    }
}

/// Start line of the `tag` element whose end tag is on `line`.
fn closed_element_line(
    text: &str,
    doc: &Document<'_>,
    lines: &LineMap,
    line: usize,
    tag: &str,
) -> Option<usize> {
    doc.descendants()
        .filter(|n| n.is_element() && xml::qualified_name(text, *n) == tag)
        .find(|n| lines.line_of(n.range().end.saturating_sub(1)) == line)
        .map(|n| lines.line_of(n.range().start))
}

/// Copy the attributes of `node` that map to scalar properties.
fn read_attributes(model: &mut ModelObject, node: Node<'_, '_>) {
    for attr in node.attributes() {
        let Some(name) = model
            .descriptor_by_xml(attr.name())
            .filter(|d| d.kind.is_scalar())
            .map(|d| d.name.clone())
        else {
            continue;
        };
        if let Err(err) = model.set_text(&name, attr.value()) {
            warn!(class = model.class_name(), line = model.line(), error = %err, "attribute ignored");
        }
    }
}

fn check_unchanged(buffer: &dyn TextBuffer, line: usize, offset: usize, expected: &str) -> Result<()> {
    let found = buffer
        .slice(offset, expected.chars().count())
        .unwrap_or_default();
    if found != expected {
        return Err(SyncError::TextDrift {
            line,
            expected: expected.to_string(),
            found,
        });
    }
    Ok(())
}
