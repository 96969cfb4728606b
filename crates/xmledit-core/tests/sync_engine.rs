use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use xmledit_core::{
    Analysis, BufferCallback, BufferError, ModelObject, ModelSyncEngine, Schema, SchemaRepository,
    SharedBuffer, SyncConfig, SyncError, TextBuffer,
};

const SCHEMA: &str = r#"<ClassDef>
  <object>
    <property name="create" type="string" category="General"/>
  </object>
  <register>
    <property name="loads" type="Sequenz:load" attribute="load"/>
  </register>
  <load>
    <property name="name" type="string"/>
  </load>
  <provider>
    <property name="channel" type="string"/>
    <property name="pin" type="string"/>
  </provider>
  <sensor extends="object" selectable="true"
          insertInNode="register" insertType="load" insertValue="lib" insertInAttribute="name">
    <property name="lib" type="string"/>
    <property name="name" type="string" dependency="provider" dependencyAttribute="channel"/>
    <property name="option" type="string"/>
    <property name="enabled" type="bool"/>
    <property name="providers" type="Sequenz:provider" attribute="provider"/>
  </sensor>
  <transformer extends="object" selectable="true">
    <property name="input" type="input"/>
  </transformer>
  <input>
    <property name="pin" type="string"/>
  </input>
  <inner selectable="false">
    <property name="x" type="string"/>
  </inner>
</ClassDef>"#;

const PIPELINE: &str = "<pipeline>
\t<register>
\t\t<load name=\"ssiaudio\"/>
\t</register>
\t<sensor create=\"Audio\" lib=\"ssiaudio\" name=\"A\" option=\"x\" enabled=\"true\">
\t\t<provider channel=\"A\" pin=\"audio\"/>
\t</sensor>
\t<transformer create=\"Filter\">
\t\t<input pin=\"audio\"/>
\t\t<inner x=\"1\"/>
\t</transformer>
\t<provider channel=\"A\" pin=\"x\"/>
\t<provider channel=\"C\" pin=\"y\"/>
</pipeline>";

fn repository() -> Arc<SchemaRepository> {
    Arc::new(SchemaRepository::new(Schema::parse(SCHEMA).unwrap()))
}

fn engine_for(text: &str) -> (Arc<SharedBuffer>, ModelSyncEngine) {
    let buffer = Arc::new(SharedBuffer::new(text));
    let engine = ModelSyncEngine::new(buffer.clone(), repository());
    (buffer, engine)
}

fn select(engine: &ModelSyncEngine, line: usize) -> ModelObject {
    match engine.analyze(line).unwrap() {
        Analysis::Selected(model) => (*model).clone(),
        other => panic!("expected a selection on line {line}, got {other:?}"),
    }
}

fn count(text: &str, needle: &str) -> usize {
    text.matches(needle).count()
}

#[test]
fn test_analyze_is_idempotent() {
    let (buffer, engine) = engine_for(PIPELINE);
    let first = select(&engine, 5);
    let second = select(&engine, 5);

    assert_eq!(first.values(), second.values());
    assert_eq!(first.line(), second.line());
    assert_eq!(first, second);
    assert_eq!(buffer.text(), PIPELINE);
}

#[test]
fn test_attribute_round_trip() {
    let text = "<pipeline>\n<sensor create=\"AudioSensor\" option=\"x\"/>\n</pipeline>";
    let (buffer, engine) = engine_for(text);

    let mut model = select(&engine, 2);
    assert_eq!(model.get_text("create"), "AudioSensor");
    assert_eq!(model.get_text("option"), "x");

    model.set_text("option", "y").unwrap();
    engine.change_model(&model, "option", "x").unwrap();
    assert_eq!(
        buffer.line_text(2).unwrap(),
        "<sensor create=\"AudioSensor\" option=\"y\"/>"
    );
}

#[test]
fn test_empty_value_removes_attribute() {
    let (buffer, engine) = engine_for(PIPELINE);
    let mut model = select(&engine, 5);

    model.set_text("option", "").unwrap();
    engine.change_model(&model, "option", "x").unwrap();

    assert_eq!(
        buffer.line_text(5).unwrap(),
        "\t<sensor create=\"Audio\" lib=\"ssiaudio\" name=\"A\" enabled=\"true\">"
    );
    assert!(xmledit_core::xml::parse(&buffer.text()).is_ok());
    assert!(select(&engine, 5).get("option").is_none());
}

#[test]
fn test_nested_object_and_inherited_property() {
    let (buffer, engine) = engine_for(PIPELINE);
    let mut model = select(&engine, 8);
    assert_eq!(model.class_name(), "transformer");
    assert_eq!(model.object("input").unwrap().get_text("pin"), "audio");

    model.set_text("create", "Butfilt").unwrap();
    engine.change_model(&model, "create", "Filter").unwrap();
    assert_eq!(buffer.line_text(8).unwrap(), "\t<transformer create=\"Butfilt\">");
}

#[test]
fn test_dependency_rename_propagation() {
    let (buffer, engine) = engine_for(PIPELINE);
    let mut model = select(&engine, 5);

    model.set_text("name", "B").unwrap();
    let report = engine.change_model(&model, "name", "A").unwrap();

    assert_eq!(report.line, 5);
    assert_eq!(report.updated, [6, 12]);
    assert!(report.failed.is_empty());
    assert_eq!(buffer.line_text(6).unwrap(), "\t\t<provider channel=\"B\" pin=\"audio\"/>");
    assert_eq!(buffer.line_text(12).unwrap(), "\t<provider channel=\"B\" pin=\"x\"/>");
    assert_eq!(buffer.line_text(13).unwrap(), "\t<provider channel=\"C\" pin=\"y\"/>");
    assert_eq!(count(&buffer.text(), "channel=\"A\""), 0);
}

#[test]
fn test_dependency_removal_when_emptied() {
    let (buffer, engine) = engine_for(PIPELINE);
    let mut model = select(&engine, 5);

    model.set_text("name", "").unwrap();
    let report = engine.change_model(&model, "name", "A").unwrap();

    assert_eq!(report.updated, [6, 12]);
    assert_eq!(buffer.line_text(12).unwrap(), "\t<provider pin=\"x\"/>");
    assert_eq!(buffer.line_text(13).unwrap(), "\t<provider channel=\"C\" pin=\"y\"/>");
}

#[test]
fn test_list_children_and_bool_values() {
    let (_buffer, engine) = engine_for(PIPELINE);
    let model = select(&engine, 5);

    assert_eq!(model.get("enabled"), Some(&xmledit_core::Value::Bool(true)));
    assert_eq!(model.children().len(), 1);
    let provider = &model.children()[0];
    assert_eq!(provider.class_name(), "provider");
    assert_eq!(provider.line(), 6);
    assert_eq!(provider.get_text("pin"), "audio");
    assert_eq!(provider.parent().unwrap().class, "sensor");
    assert_eq!(model.find_by_line(6), Some(provider));
}

#[test]
fn test_non_selectable_fallback() {
    let (_buffer, engine) = engine_for(PIPELINE);
    select(&engine, 5);
    assert_eq!(engine.analyze(10).unwrap(), Analysis::Cleared);
    assert!(engine.selection().is_none());

    // Lines without a tag and undeclared tags clear as well.
    select(&engine, 5);
    assert_eq!(engine.analyze(1).unwrap(), Analysis::Cleared);
}

#[test]
fn test_retry_enclosing_selects_parent() {
    let buffer = Arc::new(SharedBuffer::new(PIPELINE));
    let config = SyncConfig {
        retry_enclosing: true,
        ..SyncConfig::default()
    };
    let engine = ModelSyncEngine::with_config(buffer, repository(), config);

    let model = select(&engine, 10);
    assert_eq!(model.class_name(), "transformer");
    assert_eq!(model.line(), 8);
    // The document root is not selectable, so there is nothing to fall back to.
    assert_eq!(engine.analyze(2).unwrap(), Analysis::Cleared);
}

#[test]
fn test_insert_rule_is_idempotent() {
    let text = PIPELINE.replace("lib=\"ssiaudio\"", "lib=\"ssicamera\"");
    let (buffer, engine) = engine_for(&text);

    let model = select(&engine, 5);
    assert_eq!(model.line(), 6);
    assert_eq!(model.children()[0].line(), 7);
    assert_eq!(buffer.line_text(3).unwrap(), "\t\t<load name=\"ssicamera\"/>");
    assert_eq!(buffer.line_text(4).unwrap(), "\t\t<load name=\"ssiaudio\"/>");

    let after_first = buffer.text();
    let again = select(&engine, 6);
    assert_eq!(again.line(), 6);
    assert_eq!(buffer.text(), after_first);
    assert_eq!(count(&after_first, "<load name=\"ssicamera\"/>"), 1);

    // Already present: nothing is written.
    let (buffer, engine) = engine_for(PIPELINE);
    select(&engine, 5);
    assert_eq!(buffer.text(), PIPELINE);
}

#[test]
fn test_insert_rule_expands_empty_node() {
    let text = "<pipeline>\n  <register/>\n  <sensor lib=\"ssiaudio\"/>\n</pipeline>";
    let buffer = Arc::new(SharedBuffer::new(text));
    let config = SyncConfig {
        indent: "  ".to_string(),
        ..SyncConfig::default()
    };
    let engine = ModelSyncEngine::with_config(buffer.clone(), repository(), config);

    let model = select(&engine, 3);
    assert_eq!(model.line(), 5);
    assert_eq!(
        buffer.text(),
        "<pipeline>\n  <register>\n    <load name=\"ssiaudio\"/>\n  </register>\n  <sensor lib=\"ssiaudio\"/>\n</pipeline>"
    );
}

#[test]
fn test_malformed_xml_keeps_selection() {
    let (buffer, engine) = engine_for(PIPELINE);
    let model = select(&engine, 5);

    let start = buffer.line_start_offset(13).unwrap();
    let end = buffer.line_end_offset(13).unwrap();
    buffer.replace(start, end - start, "\t<provider channel=\"C\">").unwrap();

    let err = engine.analyze(5).unwrap_err();
    assert!(matches!(err, SyncError::Xml(_)));
    assert_eq!(engine.selection().as_deref(), Some(&model));
}

#[test]
fn test_stale_anchor_fails_without_writing() {
    let (buffer, engine) = engine_for(PIPELINE);
    let mut model = select(&engine, 5);

    buffer.remove_line(3).unwrap();
    let before = buffer.text();

    model.set_text("option", "changed").unwrap();
    let err = engine.change_model(&model, "option", "x").unwrap_err();
    assert!(matches!(
        err,
        SyncError::AnchorMismatch { line: 5, ref expected, ref found }
            if expected == "sensor" && found.as_deref() == Some("provider")
    ));
    assert_eq!(buffer.text(), before);
}

#[test]
fn test_unknown_property_is_rejected() {
    let (buffer, engine) = engine_for(PIPELINE);
    let model = select(&engine, 5);

    assert!(matches!(
        engine.change_model(&model, "missing", ""),
        Err(SyncError::Model(_))
    ));
    assert!(matches!(
        engine.change_model(&model, "providers", ""),
        Err(SyncError::Model(_))
    ));
    assert_eq!(buffer.text(), PIPELINE);
}

#[test]
fn test_crlf_document() {
    let text = PIPELINE.replace('\n', "\r\n");
    let (buffer, engine) = engine_for(&text);

    let mut model = select(&engine, 5);
    assert_eq!(model.get_text("option"), "x");
    model.set_text("option", "y").unwrap();
    engine.change_model(&model, "option", "x").unwrap();

    let saved = buffer.text_for_saving();
    assert_eq!(saved, text.replace("option=\"x\"", "option=\"y\""));
    assert_eq!(count(&saved, "\r\n"), count(&text, "\r\n"));
}

#[test]
fn test_selection_notifications() {
    let (_buffer, engine) = engine_for(PIPELINE);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    engine.subscribe(Box::new(move |event| {
        let xmledit_core::SelectionEvent::ModelChanged(model) = event;
        sink.lock()
            .unwrap()
            .push(model.as_ref().map(|m| m.class_name().to_string()));
    }));

    select(&engine, 5);
    engine.analyze(10).unwrap();
    select(&engine, 8);

    assert_eq!(
        *seen.lock().unwrap(),
        [Some("sensor".to_string()), None, Some("transformer".to_string())]
    );
}

/// Buffer wrapper that runs a hook before every replacement.
struct HookedBuffer {
    inner: SharedBuffer,
    hook: Box<dyn Fn(&str) -> Result<(), BufferError> + Send + Sync>,
}

impl TextBuffer for HookedBuffer {
    fn text(&self) -> String {
        self.inner.text()
    }

    fn line_count(&self) -> usize {
        self.inner.line_count()
    }

    fn line_text(&self, line: usize) -> Result<String, BufferError> {
        self.inner.line_text(line)
    }

    fn line_start_offset(&self, line: usize) -> Result<usize, BufferError> {
        self.inner.line_start_offset(line)
    }

    fn line_end_offset(&self, line: usize) -> Result<usize, BufferError> {
        self.inner.line_end_offset(line)
    }

    fn current_line(&self) -> usize {
        self.inner.current_line()
    }

    fn caret_offset(&self) -> usize {
        self.inner.caret_offset()
    }

    fn set_caret_offset(&self, offset: usize) -> Result<(), BufferError> {
        self.inner.set_caret_offset(offset)
    }

    fn insert(&self, offset: usize, text: &str) -> Result<(), BufferError> {
        self.replace(offset, 0, text)
    }

    fn remove_line(&self, line: usize) -> Result<(), BufferError> {
        self.inner.remove_line(line)
    }

    fn replace(&self, offset: usize, len: usize, text: &str) -> Result<(), BufferError> {
        (self.hook)(text)?;
        self.inner.replace(offset, len, text)
    }

    fn subscribe(&self, callback: BufferCallback) {
        self.inner.subscribe(callback)
    }

    fn slice(&self, offset: usize, len: usize) -> Result<String, BufferError> {
        self.inner.slice(offset, len)
    }
}

#[test]
fn test_reentrant_calls_are_rejected() {
    let text = PIPELINE.replace("lib=\"ssiaudio\"", "lib=\"ssicamera\"");
    let slot: Arc<OnceLock<Weak<ModelSyncEngine>>> = Arc::new(OnceLock::new());
    let observed = Arc::new(Mutex::new(Vec::new()));

    let hook_slot = Arc::clone(&slot);
    let hook_observed = Arc::clone(&observed);
    let buffer = Arc::new(HookedBuffer {
        inner: SharedBuffer::new(&text),
        hook: Box::new(move |_| {
            if let Some(engine) = hook_slot.get().and_then(Weak::upgrade) {
                let nested = engine.analyze(5).unwrap();
                let mut model = engine.repository().get_model("sensor").unwrap();
                let busy = matches!(engine.sync_model(&mut model, 5), Err(SyncError::Busy));
                hook_observed.lock().unwrap().push((nested, busy));
            }
            Ok(())
        }),
    });
    let engine = Arc::new(ModelSyncEngine::new(buffer.clone(), repository()));
    slot.set(Arc::downgrade(&engine)).unwrap();

    // Analysis writes the missing <load/>; the nested calls see a busy engine.
    let mut model = select(&engine, 5);
    assert_eq!(*observed.lock().unwrap(), [(Analysis::Skipped, true)]);

    // Same outcome as an engine whose buffer has no hook.
    let (plain, plain_engine) = engine_for(&text);
    select(&plain_engine, 5);
    assert_eq!(buffer.text(), plain.text());

    // Write-backs are exclusive too.
    model.set_text("option", "z").unwrap();
    engine.change_model(&model, "option", "x").unwrap();
    assert_eq!(observed.lock().unwrap().len(), 2);
    assert_eq!(observed.lock().unwrap()[1], (Analysis::Skipped, true));
    assert!(buffer.text().contains("option=\"z\""));
}

#[test]
fn test_partial_dependency_failure_is_reported() {
    let buffer = Arc::new(HookedBuffer {
        inner: SharedBuffer::new(PIPELINE),
        hook: Box::new(|text| {
            if text.contains("pin=\"x\"") {
                Err(BufferError::RangeOutOfBounds {
                    offset: 0,
                    len: 0,
                    char_count: 0,
                })
            } else {
                Ok(())
            }
        }),
    });
    let engine = ModelSyncEngine::new(buffer.clone(), repository());
    let mut model = select(&engine, 5);

    model.set_text("name", "B").unwrap();
    let report = engine.change_model(&model, "name", "A").unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.updated, [6]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].line, 12);
    assert!(buffer.line_text(5).unwrap().contains("name=\"B\""));
    assert_eq!(buffer.line_text(12).unwrap(), "\t<provider channel=\"A\" pin=\"x\"/>");
}
