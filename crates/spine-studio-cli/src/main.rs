use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use spine_studio_contracts::events::EventWriter;
use spine_studio_contracts::handlers::{handle_export, HandlerResult};
use spine_studio_contracts::references::{score_candidates, ReferenceImage};
use spine_studio_contracts::slots::SlotCatalog;
use spine_studio_engine::assets::{collect_pool, load_system_references};
use spine_studio_engine::transparency::{make_transparent_png, parse_hex_color, MAX_TOLERANCE};
use spine_studio_engine::{Studio, StudioConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    name = "spine-studio",
    version,
    about = "Request pipeline for the Spine2D animation studio"
)]
struct Cli {
    /// JSON config file; environment variables and flags override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the full pipeline for one request.
    Request(RequestArgs),
    /// Classify a request without handling it.
    Classify(PromptArgs),
    /// Show which rig slots a request is about.
    Resolve(PromptArgs),
    /// Show the reference images a request would use.
    Select(SelectArgs),
    /// Remove the solid background from an image.
    Transparent(TransparentArgs),
    /// Print the export manifest.
    Export(ExportArgs),
}

#[derive(Debug, Parser)]
struct PromptArgs {
    #[arg(long)]
    prompt: String,
}

#[derive(Debug, Parser)]
struct RequestArgs {
    #[arg(long)]
    prompt: String,
    /// Rig image name, upload path, or data: locator. Repeatable.
    #[arg(long = "ref")]
    refs: Vec<String>,
    #[arg(long)]
    asset_dir: Option<PathBuf>,
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    /// `openai` or `dryrun`.
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    text_model: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
}

#[derive(Debug, Parser)]
struct SelectArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long = "ref")]
    refs: Vec<String>,
    #[arg(long)]
    asset_dir: Option<PathBuf>,
    /// Skip resolution and select for this slot.
    #[arg(long)]
    target: Option<String>,
    /// Include every scored candidate in the output.
    #[arg(long)]
    scores: bool,
}

#[derive(Debug, Parser)]
struct TransparentArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: PathBuf,
    #[arg(long)]
    tolerance: Option<f64>,
    /// `#rrggbb`; skips background estimation.
    #[arg(long)]
    background: Option<String>,
    /// Estimate the background from every pixel instead of the border.
    #[arg(long)]
    all_pixels: bool,
}

#[derive(Debug, Parser)]
struct ExportArgs {
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    animations: bool,
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    textures: bool,
    /// Base file name for the exported skeleton, atlas and texture page.
    #[arg(long)]
    base_name: Option<String>,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("spine-studio error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("SPINE_STUDIO_LOG")
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = StudioConfig::load(cli.config.as_deref())?;
    match cli.command {
        Command::Request(args) => run_request(config, args),
        Command::Classify(args) => {
            let studio = Studio::from_config(config)?;
            print_json(&json!(studio.classify(&args.prompt)))?;
            Ok(0)
        }
        Command::Resolve(args) => {
            let studio = Studio::from_config(config)?;
            print_json(&json!(studio.resolver().resolve(&args.prompt)))?;
            Ok(0)
        }
        Command::Select(args) => run_select(config, args),
        Command::Transparent(args) => run_transparent(config, args),
        Command::Export(args) => run_export(config, args),
    }
}

fn run_request(mut config: StudioConfig, args: RequestArgs) -> Result<i32> {
    if let Some(dir) = args.asset_dir {
        config.asset_dir = Some(dir);
    }
    if let Some(out) = args.out {
        config.out_dir = out;
    }
    if let Some(provider) = args.provider {
        config.image_provider = provider.trim().to_ascii_lowercase();
    }
    if let Some(model) = args.text_model {
        config.text_model = model;
    }
    if let Some(model) = args.image_model {
        config.image_model = model;
    }

    let events_path = args
        .events
        .unwrap_or_else(|| config.out_dir.join("events.jsonl"));
    let session_id = uuid::Uuid::new_v4().to_string();
    let pool = reference_pool(config.asset_dir.as_deref(), &args.refs)?;
    let studio =
        Studio::from_config(config)?.with_events(EventWriter::new(&events_path, session_id));

    let response = studio.handle_request(&args.prompt, &pool);
    print_json(&json!(response))?;
    Ok(if response.result.success { 0 } else { 2 })
}

fn run_select(config: StudioConfig, args: SelectArgs) -> Result<i32> {
    let asset_dir = args.asset_dir.as_deref().or(config.asset_dir.as_deref());
    let pool = reference_pool(asset_dir, &args.refs)?;
    let studio = Studio::from_config(config.clone())?;
    let prepared = studio.prepare(&args.prompt, &pool, args.target.as_deref());

    let mut output = json!({
        "resolution": prepared.resolution,
        "selection": prepared.selection.summary(),
    });
    if args.scores {
        let scored = score_candidates(
            &pool,
            &args.prompt,
            prepared.target_slot(),
            studio.catalog(),
        );
        if let Some(object) = output.as_object_mut() {
            object.insert("candidates".to_string(), json!(scored));
        }
    }
    print_json(&output)?;
    Ok(0)
}

fn run_transparent(config: StudioConfig, args: TransparentArgs) -> Result<i32> {
    let mut options = config.transparency_options();
    if let Some(tolerance) = args.tolerance {
        if !(0.0..=MAX_TOLERANCE).contains(&tolerance) {
            bail!("--tolerance must be between 0 and {MAX_TOLERANCE}");
        }
        options.tolerance = tolerance;
    }
    if let Some(raw) = args.background.as_deref() {
        let Some(color) = parse_hex_color(raw) else {
            bail!("--background must look like #rrggbb");
        };
        options.background = Some(color);
    }
    if args.all_pixels {
        options.edge_sampling = false;
    }

    let bytes = fs::read(&args.input)
        .with_context(|| format!("failed reading {}", args.input.display()))?;
    let (png, report) = make_transparent_png(&bytes, &options)
        .with_context(|| format!("failed processing {}", args.input.display()))?;
    if let Some(parent) = args.output.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&args.output, png)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    print_json(&json!({
        "output": args.output.to_string_lossy(),
        "report": report,
    }))?;
    Ok(0)
}

fn run_export(config: StudioConfig, args: ExportArgs) -> Result<i32> {
    print_json(&json!(export_result(config, args)))?;
    Ok(0)
}

fn export_result(mut config: StudioConfig, args: ExportArgs) -> HandlerResult {
    if let Some(base) = args.base_name {
        config.export_base_name = Some(base);
    }
    let mut params = serde_json::Map::new();
    params.insert("includeAnimations".to_string(), Value::Bool(args.animations));
    params.insert("includeTextures".to_string(), Value::Bool(args.textures));
    handle_export(&config.export_layout(), &params)
}

/// Rig images from `asset_dir` when no refs are named; otherwise exactly
/// the named refs.
fn reference_pool(asset_dir: Option<&Path>, refs: &[String]) -> Result<Vec<ReferenceImage>> {
    let system = match asset_dir {
        Some(dir) => load_system_references(dir, &SlotCatalog::shared()),
        None => {
            tracing::debug!("no asset directory configured; no rig references available");
            Vec::new()
        }
    };
    if refs.is_empty() {
        return Ok(system);
    }
    collect_pool(&system, refs)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
