use std::path::PathBuf;
use std::sync::Arc;
use xmledit_core::{
    Analysis, MetadataCatalog, ModelSyncEngine, PropertyChange, Schema, SchemaRepository,
    SelectionCoordinator, SharedBuffer, TextBuffer, XmlEditConfig,
};

fn data(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data").join(name)
}

fn open_sample() -> (Arc<SharedBuffer>, SelectionCoordinator) {
    let config = XmlEditConfig::from_path(data("xmledit.json")).unwrap();
    let schema = Schema::from_path(config.schema.as_ref().unwrap()).unwrap();
    let catalog = MetadataCatalog::from_path(config.metadata.as_ref().unwrap()).unwrap();
    let repository = SchemaRepository::new(schema).with_metadata(Arc::new(catalog));

    let text = std::fs::read_to_string(data("pipeline.xml")).unwrap();
    let buffer = Arc::new(SharedBuffer::new(&text));
    let engine = Arc::new(ModelSyncEngine::with_config(
        buffer.clone(),
        Arc::new(repository),
        config.sync,
    ));
    (buffer, SelectionCoordinator::new(engine))
}

fn select(buffer: &SharedBuffer, coordinator: &SelectionCoordinator, line: usize) -> Analysis {
    buffer.set_caret_line(line).unwrap();
    coordinator.mark_dirty();
    coordinator.tick().unwrap().unwrap()
}

#[test]
fn test_sensor_with_module_options() {
    let (buffer, coordinator) = open_sample();
    let Analysis::Selected(model) = select(&buffer, &coordinator, 7) else {
        panic!("sensor not selected");
    };
    assert_eq!(model.class_name(), "sensor");
    assert_eq!(model.module().unwrap().name, "Audio");
    assert_eq!(model.get_text("sr"), "16000");
    assert!(model.descriptor("device").is_some());
    assert_eq!(model.children().len(), 1);
}

#[test]
fn test_rename_sensor_updates_providers_only() {
    let (buffer, coordinator) = open_sample();
    select(&buffer, &coordinator, 7);

    let report = coordinator
        .property_changed(PropertyChange::new(7, "name", "microphone", "mic"))
        .unwrap();
    assert_eq!(report.updated, vec![8]);
    assert_eq!(
        buffer.line_text(8).unwrap(),
        "\t\t<provider channel=\"microphone\" pin=\"audio\"/>"
    );
    assert_eq!(buffer.line_text(17).unwrap(), "\t<gate open=\"mic\"/>");
}

#[test]
fn test_consumer_registers_its_library() {
    let (buffer, coordinator) = open_sample();
    let Analysis::Selected(model) = select(&buffer, &coordinator, 14) else {
        panic!("consumer not selected");
    };
    assert_eq!(buffer.line_text(4).unwrap(), "\t\t<load name=\"ssigraphic\"/>");
    assert_eq!(model.line(), 15);
    assert_eq!(model.children()[0].line(), 16);
    assert_eq!(model.children()[0].get_text("frame"), "0.2s");

    assert_eq!(select(&buffer, &coordinator, 18), Analysis::Cleared);
}
