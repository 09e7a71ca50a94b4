//! apiforge - AI-assisted OpenAPI tooling CLI
//!
//! ## Commands
//!
//! - `reconcile`: Normalize a raw agent response
//! - `fallback`: Derive documentation from an OpenAPI document offline
//! - `invoke`: Send a raw payload to a function or signed endpoint
//! - `analyze`: Run a domain / bounded-context / diagram analysis
//! - `docs`: Generate and store documentation for a spec
//! - `project`: Inspect the project key layout and stored specs

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use apiforge_core::{
    generate_fallback_bundle, reconcile, AnalysisKind, AnalysisRequest, AnalysisService,
    AwsTransport, Dispatcher, DocumentationGenerator, ForgeConfig, InvocationRequest, SessionId,
    SessionStore,
};
use apiforge_store::{ProjectKeys, ProjectStore};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, Level};

#[derive(Parser)]
#[command(name = "apiforge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "AI-assisted OpenAPI analysis and documentation", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a raw agent response (file path, or `-` for stdin)
    Reconcile {
        #[arg(default_value = "-")]
        input: String,
    },

    /// Print the fallback documentation bundle for an OpenAPI document
    Fallback {
        /// OpenAPI document (JSON)
        spec: PathBuf,
    },

    /// Dispatch a raw payload and print the invocation result
    Invoke {
        /// Function name or ARN (direct invocation)
        #[arg(long, conflicts_with = "url", required_unless_present = "url")]
        function: Option<String>,

        /// HTTPS endpoint (signed invocation)
        #[arg(long)]
        url: Option<String>,

        /// JSON payload file
        #[arg(short, long)]
        payload: PathBuf,

        /// Give up after this many seconds (default: analysis timeout)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Run an analysis against the analysis agent
    Analyze {
        /// domain, bounded, ascii or full
        #[arg(long = "type", default_value = "full")]
        kind: AnalysisKind,

        /// Free-text description of the system
        #[arg(long)]
        prompt: Option<String>,

        /// Whiteboard image to analyze
        #[arg(long)]
        image: Option<PathBuf>,

        /// Persist the result under this project
        #[arg(long)]
        project: Option<String>,
    },

    /// Generate documentation for a spec and store both
    Docs {
        #[arg(long)]
        project: String,

        /// OpenAPI document (JSON)
        #[arg(long)]
        spec: PathBuf,

        /// Spec id (generated when omitted)
        #[arg(long)]
        spec_id: Option<String>,
    },

    /// Project storage layout
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Print the safe name and keys for a project
    Key {
        name: String,

        /// Also print the keys of this spec
        #[arg(long)]
        spec_id: Option<String>,
    },

    /// List stored spec ids
    Specs { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    apiforge_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Reconcile { input } => cmd_reconcile(&input),
        Commands::Fallback { spec } => cmd_fallback(&spec),
        Commands::Invoke {
            function,
            url,
            payload,
            timeout_secs,
        } => cmd_invoke(function, url, &payload, timeout_secs).await,
        Commands::Analyze {
            kind,
            prompt,
            image,
            project,
        } => cmd_analyze(kind, prompt, image.as_deref(), project).await,
        Commands::Docs {
            project,
            spec,
            spec_id,
        } => cmd_docs(&project, &spec, spec_id.as_deref()).await,
        Commands::Project { action } => match action {
            ProjectAction::Key { name, spec_id } => cmd_project_key(&name, spec_id.as_deref()),
            ProjectAction::Specs { name } => cmd_project_specs(&name).await,
        },
    }
}

fn load_config() -> Result<ForgeConfig> {
    ForgeConfig::from_env().context("Failed to read apiforge configuration")
}

fn dispatcher(config: &ForgeConfig) -> Result<Dispatcher> {
    let transport = AwsTransport::from_config(config).context("Failed to create AWS transport")?;
    Ok(Dispatcher::new(Arc::new(transport)).with_max_concurrent(config.max_concurrent))
}

fn project_store(config: &ForgeConfig) -> Result<ProjectStore> {
    let blobs = config.blob_store().context("Failed to open blob store")?;
    Ok(ProjectStore::new(blobs))
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(input).with_context(|| format!("Failed to read {input}"))
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

/// Raw responses that are not JSON are reconciled as text.
fn parse_response(text: &str) -> Value {
    serde_json::from_str(text.trim()).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_reconcile(input: &str) -> Result<()> {
    let raw = read_input(input)?;
    let reconciled = reconcile(&parse_response(&raw));
    debug!(step = reconciled.step.as_str(), "reconciled");
    print_json(&reconciled)
}

fn cmd_fallback(spec: &Path) -> Result<()> {
    let spec = read_json(spec)?;
    print_json(&generate_fallback_bundle(&spec))
}

async fn cmd_invoke(
    function: Option<String>,
    url: Option<String>,
    payload: &Path,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let config = load_config()?;
    let payload = read_json(payload)?;
    let request = match (function, url) {
        (Some(function), None) => InvocationRequest::direct(function, payload),
        (None, Some(url)) => InvocationRequest::signed_http(url, payload),
        _ => bail!("exactly one of --function or --url is required"),
    };
    let timeout = timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(config.timeouts.analysis);

    let result = dispatcher(&config)?
        .invoke_with_timeout(&request, timeout)
        .await
        .with_context(|| format!("Invocation of {} failed", request.target))?;
    print_json(&result)
}

async fn cmd_analyze(
    kind: AnalysisKind,
    prompt: Option<String>,
    image: Option<&Path>,
    project: Option<String>,
) -> Result<()> {
    let config = load_config()?;
    let request = build_analysis_request(kind, prompt, image, project)?;

    let service = AnalysisService::new(
        dispatcher(&config)?,
        project_store(&config)?,
        Arc::new(SessionStore::new(1)),
        &config,
    );
    let result = service
        .analyze(&SessionId::generate(), request)
        .await
        .context("Analysis request rejected")?;
    print_json(&result)
}

fn build_analysis_request(
    kind: AnalysisKind,
    prompt: Option<String>,
    image: Option<&Path>,
    project: Option<String>,
) -> Result<AnalysisRequest> {
    let image_base64 = image
        .map(|path| {
            std::fs::read(path)
                .map(|bytes| STANDARD.encode(bytes))
                .with_context(|| format!("Failed to read image {}", path.display()))
        })
        .transpose()?;
    Ok(AnalysisRequest {
        analysis_type: kind,
        prompt,
        image_base64,
        project_name: project,
    })
}

async fn cmd_docs(project: &str, spec: &Path, spec_id: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let spec = read_json(spec)?;
    let projects = project_store(&config)?;

    let spec_id = projects
        .save_spec(project, &spec, spec_id)
        .await
        .context("Failed to store spec")?;
    let generator = DocumentationGenerator::new(dispatcher(&config)?, projects, &config);
    let (key, bundle) = generator
        .generate_and_store(project, &spec_id, &spec)
        .await
        .context("Failed to store documentation")?;

    println!("Spec:  {spec_id}");
    println!("Docs:  {key}");
    if bundle.fallback {
        println!("Note:  documentation agent unavailable; fallback documentation stored");
    } else if let Some(error) = &bundle.error {
        println!("Note:  {error}");
    }
    Ok(())
}

fn project_key_lines(name: &str, spec_id: Option<&str>) -> Result<Vec<String>> {
    let keys = ProjectKeys::new(name)?;
    let mut lines = vec![
        format!("Safe name: {}", keys.safe_name()),
        format!("Prefix:    {}", keys.prefix()),
        format!("Specs:     {}", keys.specs_prefix()),
        format!("Analysis:  {}", keys.analysis()),
        format!("Metadata:  {}", keys.metadata()),
    ];
    if let Some(spec_id) = spec_id {
        lines.push(format!("Spec:      {}", keys.spec(spec_id)?));
        lines.push(format!("Docs:      {}", keys.spec_docs(spec_id)?));
    }
    Ok(lines)
}

fn cmd_project_key(name: &str, spec_id: Option<&str>) -> Result<()> {
    for line in project_key_lines(name, spec_id)? {
        println!("{line}");
    }
    Ok(())
}

async fn cmd_project_specs(name: &str) -> Result<()> {
    let config = load_config()?;
    let specs = project_store(&config)?
        .list_specs(name)
        .await
        .with_context(|| format!("Failed to list specs of {name}"))?;
    if specs.is_empty() {
        println!("No specs stored for '{name}'");
    }
    for spec_id in specs {
        println!("{spec_id}");
    }
    Ok(())
}
