//! CLI binary for medbill-extract.
//!
//! A thin shim over the library crate: `serve` runs the HTTP endpoint,
//! `extract` runs one document through the pipeline and prints the
//! response envelope as JSON.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use medbill_extract::{
    serve, AppState, BillExtractor, ExtractionConfig, ExtractionResponse, ItemDefaults,
};
use std::io;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP service on port 8000
  medbill serve

  # Bind elsewhere
  medbill serve --addr 127.0.0.1:9000

  # Extract one bill and print the JSON envelope
  medbill extract https://example.com/bill.png --pretty

  # Use OpenAI instead of Gemini
  medbill --provider openai --model gpt-4.1-mini extract https://example.com/bill.png

  # Fill missing rate/quantity with 1.0 instead of dropping the item
  medbill --item-defaults default-to-one serve

REQUEST (serve mode):
  curl -X POST http://localhost:8000/extract-bill-data \
       -H 'content-type: application/json' \
       -d '{"document": "https://example.com/bill.png"}'

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_PROVIDER      Override provider (gemini, openai, anthropic, ollama, ...)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Log filter, e.g. medbill_extract=debug,tower_http=debug
"#;

/// Extract line items from medical bill images using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "medbill",
    version,
    about = "Extract line items from medical bill images using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    model: ModelArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MEDBILL_VERBOSE")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve POST /extract-bill-data over HTTP.
    Serve {
        /// Socket address to bind.
        #[arg(long, env = "MEDBILL_ADDR", default_value = "0.0.0.0:8000")]
        addr: SocketAddr,
    },
    /// Extract a single bill and print the response envelope.
    Extract {
        /// HTTP/HTTPS URL of the bill image.
        document: String,

        /// Pretty-print the JSON.
        #[arg(long)]
        pretty: bool,

        /// Disable the spinner.
        #[arg(long, env = "MEDBILL_NO_PROGRESS")]
        no_progress: bool,
    },
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// LLM provider: gemini, openai, anthropic, azure, ollama, ...
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER", default_value = "gemini")]
    provider: String,

    /// LLM model ID used for both the OCR and the extraction call.
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL", default_value = "gemini-2.5-flash")]
    model: String,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "MEDBILL_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max output tokens per model call.
    #[arg(long, global = true, env = "MEDBILL_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Per model-call timeout in seconds.
    #[arg(long, global = true, env = "MEDBILL_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Image download timeout in seconds.
    #[arg(long, global = true, env = "MEDBILL_DOWNLOAD_TIMEOUT", default_value_t = 30)]
    download_timeout: u64,

    /// Largest accepted image in MiB.
    #[arg(long, global = true, env = "MEDBILL_MAX_IMAGE_MB", default_value_t = 20)]
    max_image_mb: usize,

    /// Policy for items missing item_rate / item_quantity.
    #[arg(long, global = true, env = "MEDBILL_ITEM_DEFAULTS", value_enum, default_value = "reject")]
    item_defaults: ItemDefaultsArg,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ItemDefaultsArg {
    Reject,
    DefaultToOne,
}

impl From<ItemDefaultsArg> for ItemDefaults {
    fn from(v: ItemDefaultsArg) -> Self {
        match v {
            ItemDefaultsArg::Reject => ItemDefaults::Reject,
            ItemDefaultsArg::DefaultToOne => ItemDefaults::DefaultToOne,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "medbill_extract=debug,tower_http=debug,info"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build extractor (credential check happens here) ──────────────────
    let config = build_config(&cli.model)?;
    let extractor =
        BillExtractor::from_config(&config).context("Failed to initialise the LLM provider")?;

    match cli.command {
        Command::Serve { addr } => {
            serve(addr, AppState::new(extractor))
                .await
                .with_context(|| format!("HTTP server on {addr} failed"))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Extract {
            document,
            pretty,
            no_progress,
        } => {
            let spinner = (!no_progress).then(|| spinner(&document));
            let result = extractor.extract(&document).await;
            if let Some(bar) = spinner {
                bar.finish_and_clear();
            }

            let (response, code) = match result {
                Ok(outcome) => (
                    ExtractionResponse::success(outcome.data, outcome.token_usage),
                    ExitCode::SUCCESS,
                ),
                Err(failure) => {
                    eprintln!("error: {}", failure.error);
                    (
                        ExtractionResponse::failure(&failure.error, failure.token_usage),
                        ExitCode::FAILURE,
                    )
                }
            };

            let json = if pretty {
                serde_json::to_string_pretty(&response)
            } else {
                serde_json::to_string(&response)
            }
            .context("Failed to serialise response")?;
            println!("{json}");
            Ok(code)
        }
    }
}

/// Map CLI flags onto the library config.
fn build_config(args: &ModelArgs) -> Result<ExtractionConfig> {
    ExtractionConfig::builder()
        .provider_name(&args.provider)
        .model(&args.model)
        .temperature(args.temperature)
        .max_tokens(args.max_tokens)
        .api_timeout_secs(args.api_timeout)
        .download_timeout_secs(args.download_timeout)
        .max_image_bytes(args.max_image_mb.saturating_mul(1024 * 1024))
        .item_defaults(args.item_defaults.clone().into())
        .build()
        .context("Invalid configuration")
}

fn spinner(document: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("Extracting");
    bar.set_message(document.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}
