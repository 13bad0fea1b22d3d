//! Command line front end for the binding engine
//!
//! Checks descriptors and runs load or save walks against XML or JSON files.
//! Widget trees are described by a JSON shape (see `model::shape`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cforms_binding::backend::{DataModel, JsonModel, XmlDocument};
use cforms_binding::{BindingConfig, BindingManager, DescriptorSource, Widget};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "cforms-binding")]
#[command(about = "Load and save form data through a binding descriptor")]
#[command(version)]
#[command(author = "OctoFHIR Team <funyloony@gmail.com>")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON file with binding configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a descriptor and report configuration errors
    Check {
        /// Binding descriptor file
        descriptor: PathBuf,
    },
    /// Load a model into a form and print the widget values as JSON
    Load {
        /// Binding descriptor file
        descriptor: PathBuf,
        /// XML or JSON model file
        #[arg(short, long)]
        model: PathBuf,
        /// JSON shape of the form
        #[arg(short, long)]
        shape: PathBuf,
        /// Pretty-print JSON output
        #[arg(short, long)]
        pretty: bool,
    },
    /// Load a model, apply edited widget values and save them back
    Save {
        /// Binding descriptor file
        descriptor: PathBuf,
        /// XML or JSON model file
        #[arg(short, long)]
        model: PathBuf,
        /// JSON shape of the form
        #[arg(short, long)]
        shape: PathBuf,
        /// JSON widget values to apply before saving
        #[arg(long)]
        values: PathBuf,
        /// Write the saved model here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

enum Model {
    Xml(XmlDocument),
    Json(JsonModel),
}

impl Model {
    fn read(path: &Path) -> Result<Model> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read model '{}'", path.display()))?;
        let is_json = path.extension().is_some_and(|ext| ext == "json")
            || text.trim_start().starts_with(['{', '[']);
        if is_json {
            let model = JsonModel::parse(&text)
                .with_context(|| format!("Invalid JSON model '{}'", path.display()))?;
            Ok(Model::Json(model))
        } else {
            Ok(Model::Xml(XmlDocument::parse(&path.display().to_string(), &text)?))
        }
    }

    fn as_data_model(&mut self) -> &mut dyn DataModel {
        match self {
            Model::Xml(document) => document,
            Model::Json(model) => model,
        }
    }

    fn render(&self) -> Result<String> {
        match self {
            Model::Xml(document) => Ok(document.to_xml_string()),
            Model::Json(model) => Ok(serde_json::to_string_pretty(model.root())?),
        }
    }
}

fn main() {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new().filter_level(level).init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => BindingConfig::from_file(path)?,
        None => BindingConfig::default(),
    };
    let manager = BindingManager::new(config)?;

    match cli.command {
        Commands::Check { descriptor } => {
            manager.create_binding(&DescriptorSource::file(&descriptor))?;
            println!("OK");
        }
        Commands::Load {
            descriptor,
            model,
            shape,
            pretty,
        } => {
            let mut model = Model::read(&model)?;
            let mut form = read_form(&shape)?;
            manager.load_form(
                &DescriptorSource::file(&descriptor),
                &mut form,
                model.as_data_model(),
            )?;
            let json = form.to_json();
            let output = if pretty {
                serde_json::to_string_pretty(&json)?
            } else {
                serde_json::to_string(&json)?
            };
            println!("{output}");
        }
        Commands::Save {
            descriptor,
            model,
            shape,
            values,
            output,
        } => {
            let source = DescriptorSource::file(&descriptor);
            let mut model = Model::read(&model)?;
            let mut form = read_form(&shape)?;
            manager.load_form(&source, &mut form, model.as_data_model())?;

            form.apply_json(&read_json(&values)?)?;
            manager.save_form(&source, &form, model.as_data_model())?;

            let rendered = model.render()?;
            match output {
                Some(path) => fs::write(&path, rendered)
                    .with_context(|| format!("Cannot write '{}'", path.display()))?,
                None => println!("{rendered}"),
            }
        }
    }
    Ok(())
}

fn read_json(path: &Path) -> Result<JsonValue> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Cannot read '{}'", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in '{}'", path.display()))
}

fn read_form(shape: &Path) -> Result<Widget> {
    Ok(Widget::from_shape("form", &read_json(shape)?)?)
}
