use pretty_assertions::assert_eq;
use std::sync::Arc;
use xmledit_core::{
    Analysis, MetadataCatalog, MetadataError, MetadataSource, ModelObject, ModelSyncEngine,
    ModuleMetadata, OPTIONS_CATEGORY, PropertyChange, Schema, SchemaRepository,
    SelectionCoordinator, SharedBuffer, TextBuffer,
};

const SCHEMA: &str = r#"<ClassDef>
  <sensor selectable="true">
    <property name="create" type="string" hasMetadata="true"/>
    <property name="option" type="string"/>
  </sensor>
</ClassDef>"#;

const GROUP_SCHEMA: &str = r#"<ClassDef>
  <item>
    <property name="create" type="string" hasMetadata="true"/>
  </item>
  <group selectable="true">
    <property name="items" type="Sequenz:item" attribute="item"/>
  </group>
</ClassDef>"#;

const CATALOG: &str = r#"{
  "modules": [
    {
      "name": "Audio",
      "info": "Audio input",
      "kind": "sensor",
      "options": [
        {"name": "sr", "help": "sample rate", "value": "16000"},
        {"name": "option", "help": "declared by the schema too", "value": ""}
      ],
      "channels": [{"name": "audio", "info": "mono stream"}]
    }
  ]
}"#;

struct Unreachable;

impl MetadataSource for Unreachable {
    fn lookup(&self, module: &str) -> Result<ModuleMetadata, MetadataError> {
        Err(MetadataError::Unavailable {
            name: module.to_string(),
            reason: "library not found".to_string(),
        })
    }
}

fn engine(text: &str, source: Arc<dyn MetadataSource>) -> (Arc<SharedBuffer>, ModelSyncEngine) {
    let repository = SchemaRepository::new(Schema::parse(SCHEMA).unwrap()).with_metadata(source);
    let buffer = Arc::new(SharedBuffer::new(text));
    let engine = ModelSyncEngine::new(buffer.clone(), Arc::new(repository));
    (buffer, engine)
}

fn select(engine: &ModelSyncEngine, line: usize) -> Arc<ModelObject> {
    match engine.analyze(line).unwrap() {
        Analysis::Selected(model) => model,
        other => panic!("expected a selection, got {other:?}"),
    }
}

#[test]
fn test_options_are_merged_and_read() {
    let catalog = MetadataCatalog::from_json_str(CATALOG).unwrap();
    let (_buffer, engine) = engine(
        "<pipeline>\n  <sensor create=\"Audio\" sr=\"8000\"/>\n</pipeline>",
        Arc::new(catalog),
    );
    let model = select(&engine, 2);

    let names: Vec<_> = model.descriptors().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["create", "option", "sr"]);
    let sr = model.descriptor("sr").unwrap();
    assert_eq!(sr.category.as_deref(), Some(OPTIONS_CATEGORY));
    assert_eq!(sr.default_value.as_deref(), Some("16000"));
    assert_eq!(model.get_text("sr"), "8000");
    assert_eq!(model.module().unwrap().channels[0].name, "audio");
}

#[test]
fn test_option_write_back() {
    let catalog = MetadataCatalog::from_json_str(CATALOG).unwrap();
    let (buffer, engine) = engine(
        "<pipeline>\n  <sensor create=\"Audio\"/>\n</pipeline>",
        Arc::new(catalog),
    );
    let mut model = (*select(&engine, 2)).clone();

    model.set_text("sr", "48000").unwrap();
    engine.change_model(&model, "sr", "").unwrap();
    assert_eq!(
        buffer.line_text(2).unwrap(),
        "  <sensor create=\"Audio\" sr=\"48000\"/>"
    );
}

#[test]
fn test_resolution_failure_is_not_fatal() {
    let (_buffer, engine) = engine(
        "<pipeline>\n  <sensor create=\"Missing\" sr=\"8000\"/>\n</pipeline>",
        Arc::new(Unreachable),
    );
    let model = select(&engine, 2);

    assert_eq!(model.descriptors().count(), 2);
    assert_eq!(model.get_text("create"), "Missing");
    assert!(model.get("sr").is_none());
    assert!(model.module().is_none());
}

#[test]
fn test_unknown_module_in_catalog() {
    let catalog = MetadataCatalog::from_json_str(CATALOG).unwrap();
    let (_buffer, engine) = engine(
        "<pipeline>\n  <sensor create=\"Video\"/>\n</pipeline>",
        Arc::new(catalog),
    );
    assert_eq!(select(&engine, 2).descriptors().count(), 2);
}

#[test]
fn test_list_items_merge_their_own_module() {
    let catalog = MetadataCatalog::from_json_str(CATALOG).unwrap();
    let repository =
        SchemaRepository::new(Schema::parse(GROUP_SCHEMA).unwrap()).with_metadata(Arc::new(catalog));
    let buffer = Arc::new(SharedBuffer::new(
        "<pipeline>\n  <group>\n    <item create=\"Audio\" sr=\"8000\"/>\n    <item/>\n  </group>\n</pipeline>",
    ));
    let engine = Arc::new(ModelSyncEngine::new(buffer.clone(), Arc::new(repository)));
    let coordinator = SelectionCoordinator::new(engine);

    buffer.set_caret_line(2).unwrap();
    let Some(Analysis::Selected(group)) = coordinator.tick().unwrap() else {
        panic!("group not selected");
    };
    let items = group.children();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].module().unwrap().name, "Audio");
    assert_eq!(items[0].get_text("sr"), "8000");
    assert!(items[1].module().is_none());
    assert!(items[1].descriptor("sr").is_none());

    coordinator
        .property_changed(PropertyChange::new(3, "sr", "4000", "8000"))
        .unwrap();
    assert_eq!(
        buffer.line_text(3).unwrap(),
        "    <item create=\"Audio\" sr=\"4000\"/>"
    );
}
