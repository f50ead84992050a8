//! CLI binary for convertdocs-client.
//!
//! A thin shim over the library crate that maps CLI flags to `ClientConfig`,
//! runs one conversion and saves the result.

use anyhow::{Context, Result};
use clap::Parser;
use convertdocs_client::{
    convert_file, inspect, registry::ParameterKind, CapabilityRegistry, ClientConfig, Operation,
    ParameterValue, SessionObserver,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── Spinner driven by session events ─────────────────────────────────────────

struct CliObserver {
    bar: ProgressBar,
    started: Instant,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Reading input…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            started: Instant::now(),
        })
    }
}

impl SessionObserver for CliObserver {
    fn on_submit(&self, operation: &str, endpoint: &str, files: usize) {
        self.bar.set_prefix("Converting");
        self.bar
            .set_message(format!("{operation}  {}", dim(&format!("{files} file(s) → {endpoint}"))));
    }

    fn on_success(&self, operation: &str, size_bytes: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {}  {}  {}",
            green("✔"),
            bold(operation),
            dim(&format!("{size_bytes} bytes")),
            dim(&format!("{:.1}s", self.started.elapsed().as_secs_f64())),
        );
    }

    fn on_failure(&self, operation: &str, message: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} {}  {}", red("✘"), bold(operation), red(message));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert with the first operation offered for the file type
  convertdocs report.pdf

  # Pick the operation explicitly
  convertdocs --operation pdf-to-jpg report.pdf -o out/

  # Image format conversion
  convertdocs --operation webp-to-png photo.webp

  # Rotate a PDF
  convertdocs --operation rotate-pdf --param rotation=180 scan.pdf

  # Merge several PDFs
  convertdocs --operation merge-pdf a.pdf b.pdf c.pdf

  # Show the operations offered for a file (no upload)
  convertdocs --inspect-only report.pdf

  # List all operations, or those for one extension
  convertdocs --list
  convertdocs --list png

ENVIRONMENT VARIABLES:
  CONVERTDOCS_API_URL     Service base URL (default http://localhost:8000/api)
  CONVERTDOCS_OUTPUT      Output directory
  CONVERTDOCS_TIMEOUT     Request timeout in seconds
  RUST_LOG                Log filter, overrides --verbose/--quiet
"#;

/// Convert documents and images through a ConvertDocs service.
#[derive(Parser, Debug)]
#[command(
    name = "convertdocs",
    version,
    about = "Convert documents and images through a ConvertDocs service",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input files. Only merge-pdf takes more than one.
    #[arg(required_unless_present = "list")]
    inputs: Vec<PathBuf>,

    /// Operation id (e.g. pdf-to-word). Defaults to the first one offered.
    #[arg(long)]
    operation: Option<String>,

    /// Extra parameter as name=value. Repeatable.
    #[arg(long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
    params: Vec<ParameterValue>,

    /// Directory to save the converted file in.
    #[arg(short, long = "output-dir", env = "CONVERTDOCS_OUTPUT", default_value = ".")]
    output_dir: PathBuf,

    /// Service base URL.
    #[arg(long, env = "CONVERTDOCS_API_URL", default_value = convertdocs_client::DEFAULT_BASE_URL)]
    api_url: String,

    /// Request timeout in seconds.
    #[arg(long, env = "CONVERTDOCS_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Refuse files larger than this many bytes before uploading.
    #[arg(long, env = "CONVERTDOCS_MAX_FILE_BYTES")]
    max_file_bytes: Option<u64>,

    /// List operations, optionally only those for one extension.
    #[arg(long, value_name = "EXT", num_args = 0..=1, default_missing_value = "")]
    list: Option<String>,

    /// Show the operations offered for the input, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Print a JSON summary instead of text.
    #[arg(long)]
    json: bool,

    /// Disable the spinner.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

fn parse_param(s: &str) -> std::result::Result<ParameterValue, String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok(ParameterValue::new(name.trim(), value.trim()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{s}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner covers normal feedback, so library INFO logs are muted
    // while it is shown.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let registry = CapabilityRegistry::builtin();

    // ── List mode ────────────────────────────────────────────────────────
    if let Some(ref ext) = cli.list {
        let ops: Vec<&'static Operation> = if ext.is_empty() {
            registry.operations().collect()
        } else {
            registry.lookup(ext).to_vec()
        };
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&ops).context("Failed to serialise operations")?
            );
        } else {
            print_operations(&ops);
        }
        return Ok(());
    }

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        for input in &cli.inputs {
            let info = inspect(input)
                .await
                .with_context(|| format!("Failed to inspect {}", input.display()))?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&info).context("Failed to serialise inspection")?
                );
            } else {
                println!("File:         {}", info.name);
                println!("Type:         {}", info.mime_type);
                println!("Size:         {} bytes", info.size_bytes);
                if info.operations.is_empty() {
                    println!("Operations:   {}", dim("none for this file type"));
                } else {
                    println!("Operations:");
                    print_operations(&info.operations);
                }
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let mut builder = ClientConfig::builder()
        .base_url(cli.api_url.clone())
        .request_timeout_secs(cli.timeout);
    if let Some(limit) = cli.max_file_bytes {
        builder = builder.max_file_bytes(limit);
    }
    if show_progress {
        builder = builder.observer(CliObserver::new() as Arc<dyn SessionObserver>);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Run conversion ───────────────────────────────────────────────────
    let conversion = convert_file(&cli.inputs, cli.operation.as_deref(), &cli.params, &config)
        .await
        .context("Conversion failed")?;
    let path = conversion
        .handle
        .save_to_dir(&cli.output_dir)
        .await
        .context("Failed to save result")?;

    if cli.json {
        let summary = json!({
            "operation": conversion.operation.id,
            "inputs": cli.inputs,
            "output": path,
            "content_type": conversion.handle.content_type(),
            "size_bytes": conversion.handle.bytes()?.len(),
            "text": conversion.handle.text(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else {
        if let Some(text) = conversion.handle.text() {
            println!("{text}");
        }
        if !cli.quiet {
            eprintln!("   {}  {}", cyan("→"), bold(&path.display().to_string()));
        }
    }

    Ok(())
}

fn print_operations(ops: &[&'static Operation]) {
    for op in ops {
        let params: Vec<String> = op
            .parameters
            .iter()
            .filter(|p| p.kind != ParameterKind::Hidden)
            .map(|p| match p.default {
                Some(d) => format!("{}={d}", p.name),
                None => p.name.to_string(),
            })
            .collect();
        println!(
            "  {:<16} {:<28} .{:<5} {}",
            bold(op.id),
            op.label,
            op.target_format,
            dim(&params.join(" ")),
        );
    }
}
