//! jsonapi-render CLI
//!
//! Renders JSON:API documents from a manifest file describing models,
//! serializer definitions, and records.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use jsonapi_render::{
    IncludeTree, Manifest, NoopLoader, RenderConfig, RenderOptions, Renderer, ResolveTarget,
    SharedRecord, World,
};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "jsonapi-render")]
#[command(about = "Render JSON:API documents from a manifest")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render records of a model as a JSON:API document
    Render {
        /// Manifest file (models, serializers, records)
        manifest: PathBuf,

        /// Model whose records to render
        model: String,

        /// Render the single record with this id (default: the whole collection)
        #[arg(long)]
        id: Option<String>,

        /// Relations to include, comma-separated dot paths (e.g. posts.comments)
        #[arg(long, short)]
        include: Option<String>,

        /// Transform output keys to lowerCamelCase
        #[arg(long)]
        camelize: bool,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Show the eager-load plan for a model and include request
    Plan {
        /// Manifest file (models, serializers, records)
        manifest: PathBuf,

        /// Model to plan for
        model: String,

        /// Relations to include, comma-separated dot paths
        #[arg(long, short)]
        include: Option<String>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Render {
            manifest,
            model,
            id,
            include,
            camelize,
            output,
            pretty,
        } => run_render(&manifest, &model, id, include, camelize, output, pretty),

        Commands::Plan {
            manifest,
            model,
            include,
            pretty,
        } => run_plan(&manifest, &model, include, pretty),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn load_world(path: &PathBuf) -> Result<World, u8> {
    let manifest = Manifest::load(path).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    manifest.build().map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })
}

fn parse_include(include: Option<&str>) -> Result<IncludeTree, u8> {
    match include {
        Some(text) => IncludeTree::parse(text).map_err(|e| {
            eprintln!("Error: {}", e);
            2u8
        }),
        None => Ok(IncludeTree::new()),
    }
}

/// An id argument is JSON when it parses as JSON, a plain string otherwise,
/// so `--id 7` matches a numeric id and `--id abc` a string one.
fn parse_id(id: &str) -> Value {
    serde_json::from_str(id).unwrap_or_else(|_| Value::String(id.to_string()))
}

fn run_render(
    manifest: &PathBuf,
    model: &str,
    id: Option<String>,
    include: Option<String>,
    camelize: bool,
    output: Option<PathBuf>,
    pretty: bool,
) -> Result<(), u8> {
    let world = load_world(manifest)?;
    let include = parse_include(include.as_deref())?;

    let mut config = RenderConfig::new();
    if camelize {
        config = config.key_transform(camelize_key);
    }
    let renderer = Renderer::new(world.registry.clone(), world.graph.clone())
        .config(config)
        .loader(Arc::new(NoopLoader));
    let opts = RenderOptions::new().include(include);

    let doc = match id {
        Some(id) => {
            let id = parse_id(&id);
            let record = world.store.find(model, &id).ok_or_else(|| {
                eprintln!("Error: no {} record with id {}", model, id);
                3u8
            })?;
            renderer.render_record(&record, &opts)
        }
        None => {
            let records: Vec<SharedRecord> = world.store.all(model);
            renderer.render_records(&records, &opts)
        }
    }
    .map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    write_json(&doc, output, pretty)
}

fn run_plan(
    manifest: &PathBuf,
    model: &str,
    include: Option<String>,
    pretty: bool,
) -> Result<(), u8> {
    let world = load_world(manifest)?;
    let include = parse_include(include.as_deref())?;

    let renderer = Renderer::new(world.registry.clone(), world.graph.clone());
    let serializer = renderer
        .resolver()
        .resolve(&ResolveTarget::Model(model.to_string()))
        .map_err(|e| {
            eprintln!("Error: {}", e);
            2u8
        })?;
    let plan = renderer
        .planner()
        .plan(model, &include, &serializer)
        .map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        })?;

    write_json(&plan.to_value(), None, pretty)
}

fn write_json(value: &Value, output: Option<PathBuf>, pretty: bool) -> Result<(), u8> {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match output {
        Some(path) => {
            std::fs::write(&path, &text).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", text);
        }
    }
    Ok(())
}

fn camelize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for ch in key.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}
