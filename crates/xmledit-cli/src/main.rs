//! `xmledit` - inspect and edit one element of a pipeline document from the command line.
//!
//! ```text
//! xmledit --config data/xmledit.json data/pipeline.xml --line 5
//! xmledit --schema data/classdef.xml data/pipeline.xml --line 5 --set name=mic --in-place
//! ```
//!
//! The selected element is printed with its properties grouped by category. Each `--set`
//! is routed through the selection coordinator exactly as a property view edit would be.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use xmledit_core::{
    Analysis, MetadataCatalog, ModelObject, ModelSyncEngine, PropertyChange, PropertyKind, Schema,
    SchemaRepository, SelectionCoordinator, SharedBuffer, XmlEditConfig,
};

#[derive(Parser, Debug)]
#[command(name = "xmledit", about = "Inspect and edit pipeline XML elements")]
struct Args {
    /// Pipeline document to open
    file: PathBuf,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Schema file, overrides the configuration
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// Module metadata catalog, overrides the configuration
    #[arg(short, long)]
    metadata: Option<PathBuf>,

    /// 1-based line to select
    #[arg(short, long, default_value_t = 1)]
    line: usize,

    /// Property assignment `name=value`; an empty value removes the attribute
    #[arg(long = "set", value_parser = parse_assignment)]
    assignments: Vec<(String, String)>,

    /// Write edits back to the file instead of printing the document
    #[arg(long)]
    in_place: bool,

    /// Also list hidden properties
    #[arg(long)]
    all: bool,
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    if name.trim().is_empty() {
        return Err(format!("missing property name in '{raw}'"));
    }
    Ok((name.trim().to_string(), value.to_string()))
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xmledit_core=info,xmledit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => XmlEditConfig::from_path(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => XmlEditConfig::default(),
    };

    let Some(schema_path) = args.schema.clone().or(config.schema.clone()) else {
        bail!("no schema given; pass --schema or set \"schema\" in the configuration");
    };
    let schema = Schema::from_path(&schema_path)
        .with_context(|| format!("loading schema {}", schema_path.display()))?;

    let mut repository = SchemaRepository::new(schema);
    if let Some(path) = args.metadata.clone().or(config.metadata.clone()) {
        match MetadataCatalog::from_path(&path) {
            Ok(catalog) => {
                info!(modules = catalog.len(), path = %path.display(), "metadata catalog loaded");
                repository = repository.with_metadata(Arc::new(catalog));
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "metadata catalog unavailable");
            }
        }
    }

    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let buffer = Arc::new(SharedBuffer::new(&text));
    let engine = Arc::new(ModelSyncEngine::with_config(
        buffer.clone(),
        Arc::new(repository),
        config.sync.clone(),
    ));
    let coordinator = SelectionCoordinator::new(engine);

    buffer.set_caret_line(args.line)?;
    let model = match coordinator.tick()? {
        Some(Analysis::Selected(model)) => model,
        _ => {
            println!("line {}: nothing selectable", args.line);
            if !args.assignments.is_empty() {
                bail!("cannot apply --set without a selection");
            }
            return Ok(());
        }
    };
    print_model(&model, args.all);

    if args.assignments.is_empty() {
        return Ok(());
    }

    for (property, value) in &args.assignments {
        let selection = coordinator
            .selection()
            .context("selection lost after the previous edit")?;
        let descriptor = selection
            .descriptor(property)
            .with_context(|| format!("<{}> has no property '{property}'", selection.class_name()))?;
        if descriptor.readonly {
            bail!("property '{property}' is read-only");
        }

        let old_value = selection.get_text(property);
        let report = coordinator.property_changed(PropertyChange::new(
            selection.line(),
            property.clone(),
            value.clone(),
            old_value.clone(),
        ))?;
        println!(
            "set {property}: {old_value:?} -> {value:?} (line {})",
            report.line
        );
        if !report.updated.is_empty() {
            println!("  renamed dependents on lines {:?}", report.updated);
        }
        for failure in &report.failed {
            println!("  dependent on line {} not updated: {}", failure.line, failure.reason);
        }
        coordinator.tick()?;
    }

    let saved = buffer.text_for_saving();
    if args.in_place {
        std::fs::write(&args.file, saved)
            .with_context(|| format!("writing {}", args.file.display()))?;
        info!(path = %args.file.display(), "document saved");
    } else {
        println!();
        print!("{saved}");
    }
    Ok(())
}

fn print_model(model: &ModelObject, all: bool) {
    print!("<{}> line {}", model.class_name(), model.line());
    match model.module() {
        Some(module) if module.info.is_empty() => print!(" (module {})", module.name),
        Some(module) => print!(" (module {}: {})", module.name, module.info),
        None => {}
    }
    println!();

    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for descriptor in model.descriptors() {
        if !descriptor.visible && !all {
            continue;
        }
        if !descriptor.kind.is_scalar() {
            continue;
        }
        let mut line = format!("{} = {:?}", descriptor.name, model.get_text(&descriptor.name));
        if descriptor.readonly {
            line.push_str(" [read-only]");
        }
        if let Some(default) = descriptor.default_value.as_deref().filter(|d| !d.is_empty()) {
            line.push_str(&format!(" (default {default})"));
        }
        if let Some(link) = &descriptor.dependency {
            line.push_str(&format!(" -> {}.{}", link.target_tag, link.target_attribute));
        }
        if let Some(help) = &descriptor.description {
            line.push_str(&format!("  # {help}"));
        }

        let category = descriptor.category.clone().unwrap_or_else(|| "Misc".to_string());
        match groups.iter_mut().find(|(name, _)| *name == category) {
            Some((_, lines)) => lines.push(line),
            None => groups.push((category, vec![line])),
        }
    }
    for (category, lines) in groups {
        println!("  [{category}]");
        for line in lines {
            println!("    {line}");
        }
    }

    for descriptor in model.descriptors() {
        match &descriptor.kind {
            PropertyKind::Object(_) => {
                if let Some(object) = model.object(&descriptor.name) {
                    println!("  {}: {}", descriptor.name, summary(object));
                }
            }
            PropertyKind::List(_) => {
                println!("  {} ({}):", descriptor.name, model.children().len());
                for child in model.children() {
                    println!("    {}", summary(child));
                }
            }
            PropertyKind::Scalar(_) => {}
        }
    }
}

fn summary(model: &ModelObject) -> String {
    let values: Vec<String> = model
        .values()
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    format!("<{}> line {} {}", model.class_name(), model.line(), values.join(" "))
}
