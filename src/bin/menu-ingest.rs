//! CLI binary for menu-ingest.
//!
//! A thin shim over the library crate that maps CLI flags to `IngestConfig`,
//! opens a SQLite store and prints reports.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use menu_ingest::{
    resolve_input, FileKind, IngestConfig, IngestError, IngestionReport, ItemFilter, MenuIngestor,
    OperatorMapping, SqliteMenuStore,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
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

const AFTER_HELP: &str = r#"EXAMPLES:
  # See how a CSV would be mapped before uploading it
  menu-ingest analyze menu.csv

  # Dry run: validate and show the first items without saving
  menu-ingest ingest --owner vendor-1 --preview menu.csv

  # Map an unusual header by hand
  menu-ingest ingest --owner vendor-1 --mapping '{"Item Title":"name"}' menu.csv

  # Extract a PDF menu with a specific model (PDFs are previewed unless --save)
  menu-ingest --provider openai --model gpt-4.1-mini ingest --owner vendor-1 menu.pdf

  # Extract and store a PDF menu in one go
  menu-ingest ingest --owner vendor-1 --save menu.pdf

  # Several files at once, from disk or URL
  menu-ingest ingest --owner vendor-1 -c 4 a.csv b.pdf https://example.com/menu.pdf

  # Save items reviewed after a PDF preview
  menu-ingest save --owner vendor-1 reviewed.json

  # List what is stored
  menu-ingest list --owner vendor-1 --category Beverages --available true

  # Edit or remove one stored item
  menu-ingest update --owner vendor-1 <ID> '{"price": 450, "is_available": false}'
  menu-ingest delete --owner vendor-1 <ID>

CANONICAL FIELDS:
  category, name, price     required
  description, currency     optional (currency defaults to LKR)
  is_available              optional (true/1/yes; defaults to true)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium when it is not installed system-wide
  MENU_INGEST_DB          SQLite database path
"#;

/// Ingest vendor menus from CSV and PDF files.
#[derive(Parser, Debug)]
#[command(
    name = "menu-ingest",
    version,
    about = "Ingest vendor menus from CSV and PDF files",
    long_about = "Map vendor CSV columns or extract PDF menus with an LLM, validate every item \
and store the result in SQLite. Bad rows are reported, never fatal.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// SQLite database file.
    #[arg(long, global = true, env = "MENU_INGEST_DB", default_value = "menu.db")]
    db: PathBuf,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Currency for rows and items that name none.
    #[arg(long, global = true, env = "MENU_INGEST_CURRENCY", default_value = "LKR")]
    currency: String,

    /// Upload size cap in bytes.
    #[arg(long, global = true, env = "MENU_INGEST_MAX_FILE_SIZE", default_value_t = 10 * 1024 * 1024)]
    max_file_size: usize,

    /// Items echoed back in preview mode.
    #[arg(long, global = true, env = "MENU_INGEST_PREVIEW_LIMIT", default_value_t = 10)]
    preview_limit: usize,

    /// Path to a text file containing a custom extraction prompt.
    #[arg(long, global = true, env = "MENU_INGEST_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per document.
    #[arg(long, global = true, env = "MENU_INGEST_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "MENU_INGEST_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per document on LLM failure.
    #[arg(long, global = true, env = "MENU_INGEST_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// LLM call timeout in seconds.
    #[arg(long, global = true, env = "MENU_INGEST_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "MENU_INGEST_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Output JSON instead of a human summary.
    #[arg(long, global = true, env = "MENU_INGEST_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "MENU_INGEST_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MENU_INGEST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "MENU_INGEST_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show detected columns, the automatic mapping and sample rows of a CSV.
    Analyze {
        /// Local CSV path or HTTP/HTTPS URL.
        input: String,

        /// Declared MIME type; guessed from the extension when absent.
        #[arg(long)]
        mime: Option<String>,
    },

    /// Ingest CSV or PDF menus.
    Ingest {
        /// Local file paths or HTTP/HTTPS URLs.
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Owner (vendor) the items belong to.
        #[arg(long, env = "MENU_INGEST_OWNER")]
        owner: String,

        /// Column overrides as a JSON object of header → field.
        #[arg(long)]
        mapping: Option<String>,

        /// Validate and report without saving.
        #[arg(long, conflicts_with = "save")]
        preview: bool,

        /// Save PDF extractions right away instead of previewing them.
        #[arg(long)]
        save: bool,

        /// Declared MIME type for every input.
        #[arg(long)]
        mime: Option<String>,

        /// Number of files processed at once.
        #[arg(short, long, env = "MENU_INGEST_CONCURRENCY", default_value_t = 2)]
        concurrency: usize,
    },

    /// Save reviewed items from a JSON array file.
    Save {
        /// JSON file holding an array of item objects.
        items: PathBuf,

        /// Owner (vendor) the items belong to.
        #[arg(long, env = "MENU_INGEST_OWNER")]
        owner: String,
    },

    /// List stored items.
    List {
        /// Owner (vendor) whose items to list.
        #[arg(long, env = "MENU_INGEST_OWNER")]
        owner: String,

        /// Only this category.
        #[arg(long)]
        category: Option<String>,

        /// Only available (true) or unavailable (false) items.
        #[arg(long)]
        available: Option<bool>,
    },

    /// Edit one stored item. Fields left out of the patch keep their value.
    Update {
        /// Item id as printed by `list --json` or returned on save.
        id: String,

        /// JSON object of canonical field → new value.
        patch: String,

        /// Owner (vendor) the item belongs to.
        #[arg(long, env = "MENU_INGEST_OWNER")]
        owner: String,
    },

    /// Delete one stored item.
    Delete {
        /// Item id.
        id: String,

        /// Owner (vendor) the item belongs to.
        #[arg(long, env = "MENU_INGEST_OWNER")]
        owner: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let g = &cli.global;

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !g.quiet && !g.no_progress && !g.json;
    let filter = if g.verbose {
        "debug"
    } else if g.quiet || show_progress {
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

    let config = build_config(g).await?;
    let store = Arc::new(
        SqliteMenuStore::open(&g.db)
            .with_context(|| format!("Failed to open database {}", g.db.display()))?,
    );
    let ingestor = Arc::new(MenuIngestor::new(config, store));

    match &cli.command {
        Command::Analyze { input, mime } => {
            let file = resolve_input(
                input,
                mime.as_deref(),
                g.download_timeout,
                ingestor.config().max_file_size,
            )
            .await
            .context("Failed to read input")?;
            let analysis = ingestor
                .analyze_csv(&file)
                .await
                .context("Analysis failed")?;

            if g.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&analysis).context("Failed to serialise analysis")?
                );
            } else {
                println!("File:        {}", file.filename);
                println!("Rows:        {}", analysis.total_rows);
                println!("Columns:     {}", analysis.detected_columns.join(", "));
                for (header, field) in analysis.auto_mapping.iter() {
                    println!("  {} {:<20} → {}", green("✓"), header, field);
                }
                for column in &analysis.unmapped_columns {
                    println!("  {} {}", dim("·"), dim(column));
                }
                for s in &analysis.suggestions {
                    let fields: Vec<String> =
                        s.suggested_fields.iter().map(|f| f.to_string()).collect();
                    println!("  {} '{}' might be {}", cyan("?"), s.column, fields.join(" or "));
                }
                if analysis.ready_to_upload {
                    println!("{} ready to upload", green("✔"));
                } else {
                    let missing: Vec<String> = analysis
                        .missing_required_fields
                        .iter()
                        .map(|f| f.to_string())
                        .collect();
                    println!("{} missing required: {}", red("✘"), missing.join(", "));
                }
            }
        }

        Command::Ingest {
            inputs,
            owner,
            mapping,
            preview,
            save,
            mime,
            concurrency,
        } => {
            let mapping = match mapping {
                Some(raw) => OperatorMapping::parse(raw).context("Invalid --mapping")?,
                None => OperatorMapping::new(),
            };
            let failed = run_ingest(
                &ingestor,
                g,
                inputs,
                owner,
                &mapping,
                PreviewMode::from_flags(*preview, *save),
                mime.as_deref(),
                *concurrency,
                show_progress,
            )
            .await?;
            if failed > 0 {
                anyhow::bail!("{failed} of {} inputs failed", inputs.len());
            }
        }

        Command::Save { items, owner } => {
            let raw = tokio::fs::read_to_string(items)
                .await
                .with_context(|| format!("Failed to read {}", items.display()))?;
            let values: Vec<serde_json::Value> =
                serde_json::from_str(&raw).context("Items file must hold a JSON array")?;
            let report = ingestor
                .save_reviewed_items(&values, owner)
                .await
                .context("Save failed")?;
            print_report(&items.display().to_string(), &report, g.json)?;
        }

        Command::List {
            owner,
            category,
            available,
        } => {
            let filter = ItemFilter {
                category: category.clone(),
                is_available: *available,
            };
            let items = ingestor
                .list_items(owner, &filter)
                .await
                .context("Listing failed")?;

            if g.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&items).context("Failed to serialise items")?
                );
            } else {
                for saved in &items {
                    let item = &saved.item;
                    println!(
                        "{:<16} {:<32} {:>10.2} {}  {}",
                        item.category(),
                        item.name(),
                        item.price(),
                        item.currency(),
                        if item.is_available() { green("●") } else { dim("○") }
                    );
                }
                if !g.quiet {
                    eprintln!("{} items", bold(&items.len().to_string()));
                }
            }
        }

        Command::Update { id, patch, owner } => {
            let patch: serde_json::Value =
                serde_json::from_str(patch).context("Patch must be a JSON object")?;
            match ingestor.update_item(owner, id, &patch).await {
                Ok(saved) if g.json => {
                    let body = serde_json::json!({
                        "success": true,
                        "message": "Menu item updated successfully",
                        "item": saved,
                    });
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                Ok(saved) => println!(
                    "{} updated {} ({}, {:.2} {})",
                    green("✔"),
                    bold(&saved.id),
                    saved.item.name(),
                    saved.item.price(),
                    saved.item.currency()
                ),
                Err(e) => return Err(report_error(id, &e, g.json)),
            }
        }

        Command::Delete { id, owner } => match ingestor.delete_item(owner, id).await {
            Ok(()) if g.json => {
                let body = serde_json::json!({
                    "success": true,
                    "message": "Menu item deleted successfully",
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            }
            Ok(()) => println!("{} deleted {}", green("✔"), bold(id)),
            Err(e) => return Err(report_error(id, &e, g.json)),
        },
    }

    Ok(())
}

/// Whether an ingest run saves or only previews.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PreviewMode {
    /// `--preview`: nothing is saved.
    All,
    /// Default: CSV is saved, PDF extractions are previewed for review.
    Documents,
    /// `--save`: everything is saved.
    None,
}

impl PreviewMode {
    fn from_flags(preview: bool, save: bool) -> Self {
        match (preview, save) {
            (true, _) => PreviewMode::All,
            (false, true) => PreviewMode::None,
            (false, false) => PreviewMode::Documents,
        }
    }

    fn applies_to(self, kind: Option<FileKind>) -> bool {
        match self {
            PreviewMode::All => true,
            PreviewMode::Documents => kind == Some(FileKind::Pdf),
            PreviewMode::None => false,
        }
    }
}

/// Print a failed request the same way ingest failures are printed and
/// hand back the error for the exit status.
fn report_error(input: &str, e: &IngestError, json: bool) -> anyhow::Error {
    if json {
        println!("{}", error_body(input, e));
    } else {
        eprintln!("{} {}: {}", red("✘"), bold(input), e);
    }
    anyhow::anyhow!("{e}")
}

/// Structured JSON for a failed input, keyed like a report.
fn error_body(input: &str, e: &IngestError) -> String {
    let mut body = e.to_json();
    body["input"] = serde_json::Value::String(input.to_string());
    serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string())
}

/// Ingest every input, `concurrency` at a time. Returns how many failed.
#[allow(clippy::too_many_arguments)]
async fn run_ingest(
    ingestor: &Arc<MenuIngestor>,
    g: &GlobalArgs,
    inputs: &[String],
    owner: &str,
    mapping: &OperatorMapping,
    mode: PreviewMode,
    mime: Option<&str>,
    concurrency: usize,
    show_progress: bool,
) -> Result<usize> {
    let max_size = ingestor.config().max_file_size;
    let bar = if show_progress {
        let bar = ProgressBar::new(inputs.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {pos}/{len}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix(if mode == PreviewMode::All { "Previewing" } else { "Ingesting" });
        bar.enable_steady_tick(Duration::from_millis(80));
        Some(bar)
    } else {
        None
    };

    let results: Vec<(String, Result<IngestionReport, IngestError>)> =
        stream::iter(inputs.iter().cloned())
            .map(|input| {
                let ingestor = Arc::clone(ingestor);
                let bar = bar.clone();
                async move {
                    if let Some(ref bar) = bar {
                        bar.set_message(input.clone());
                    }
                    let result = async {
                        let file =
                            resolve_input(&input, mime, g.download_timeout, max_size).await?;
                        let preview = mode.applies_to(file.classify(max_size).ok());
                        ingestor.ingest(&file, owner, mapping, preview).await
                    }
                    .await;
                    if let Some(ref bar) = bar {
                        let line = match &result {
                            Ok(r) => format!(
                                "  {} {}  {}",
                                if r.is_partial() { cyan("⚠") } else { green("✓") },
                                input,
                                dim(&r.message)
                            ),
                            Err(e) => format!("  {} {}  {}", red("✗"), input, red(&e.to_string())),
                        };
                        bar.println(line);
                        bar.inc(1);
                    }
                    (input, result)
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let mut failed = 0;
    for (input, result) in &results {
        match result {
            Ok(report) => print_report(input, report, g.json)?,
            Err(e) => {
                failed += 1;
                if g.json {
                    println!("{}", error_body(input, e));
                } else {
                    eprintln!("{} {}: {}", red("✘"), bold(input), e);
                }
            }
        }
    }
    Ok(failed)
}

fn print_report(input: &str, report: &IngestionReport, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialise report")?
        );
        return Ok(());
    }

    let s = &report.summary;
    println!(
        "{} {}  {}",
        if report.is_partial() || s.skipped_rows > 0 {
            cyan("⚠")
        } else {
            green("✔")
        },
        bold(input),
        report.message
    );
    println!(
        "   {} rows  /  {} valid  /  {} saved  /  {} skipped",
        s.total_rows, s.valid_rows, s.saved_rows, s.skipped_rows
    );
    for e in &report.errors {
        println!("   {} {}", red("·"), e);
    }
    for f in &report.failures {
        println!("   {} {}", red("·"), f.describe());
    }
    if let Some(ref items) = report.preview_data {
        for item in items {
            println!(
                "   {} {:<16} {:<32} {:>10.2} {}",
                dim("›"),
                item.category(),
                item.name(),
                item.price(),
                item.currency()
            );
        }
    }
    Ok(())
}

/// Map CLI args to `IngestConfig`.
async fn build_config(g: &GlobalArgs) -> Result<IngestConfig> {
    let mut builder = IngestConfig::builder()
        .max_file_size(g.max_file_size)
        .preview_limit(g.preview_limit)
        .default_currency(g.currency.clone())
        .max_tokens(g.max_tokens)
        .temperature(g.temperature)
        .max_retries(g.max_retries)
        .download_timeout_secs(g.download_timeout);

    if let Some(secs) = g.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(ref model) = g.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = g.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref path) = g.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}
