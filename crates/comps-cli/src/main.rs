//! Comps CLI binary.
//!
//! Extracts normalized income-statement figures for a list of tickers.

use std::process;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use comps::{
    CompsPipeline, GeminiConfig, PipelineConfig, TickerStatus, UnconvertedCurrencyPolicy,
    records_to_frame,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "comps")]
#[command(about = "Normalized income statements from the latest annual filings", long_about = None)]
#[command(version)]
struct Cli {
    /// Ticker symbols, processed in order
    #[arg(required = true)]
    tickers: Vec<String>,

    /// Contact identity sent to SEC EDGAR ("Name email@example.com")
    #[arg(long, env = "COMPS_EDGAR_IDENTITY")]
    identity: String,

    /// Gemini API key (falls back to GEMINI_API_KEY / GOOGLE_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Gemini model name
    #[arg(long)]
    model: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Table)]
    format: Format,

    /// Seconds to wait before retrying a rate-limited ticker
    #[arg(long, default_value = "20")]
    cooldown_secs: u64,

    /// Seconds to wait between tickers
    #[arg(long, default_value = "10")]
    pacing_secs: u64,

    /// Keep figures in a currency with no USD rate instead of skipping the ticker
    #[arg(long)]
    keep_unconverted: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    /// Aligned text table
    Table,
    /// JSON array of records
    Json,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = PipelineConfig::default()
        .with_rate_limit_cooldown(Duration::from_secs(cli.cooldown_secs))
        .with_inter_request_delay(Duration::from_secs(cli.pacing_secs));
    if cli.keep_unconverted {
        config = config.with_unconverted_currency(UnconvertedCurrencyPolicy::KeepUnconverted);
    }

    let mut builder = CompsPipeline::builder()
        .with_edgar(&cli.identity)
        .with_yahoo()
        .config(config);

    let gemini = match cli.api_key {
        Some(key) => Some(GeminiConfig::new(key)),
        None => GeminiConfig::from_env().ok(),
    };
    match gemini {
        Some(mut gemini) => {
            if let Some(model) = cli.model {
                gemini = gemini.with_model(model);
            }
            builder = builder.with_gemini(gemini);
        }
        None => warn!("No Gemini API key; statements that cannot be read by label will be skipped"),
    }

    let pipeline = builder.build()?;
    let report = pipeline.run_with_report(&cli.tickers).await;

    for skipped in report.skipped() {
        let reason = match &skipped.status {
            TickerStatus::NotFound => "no annual filing",
            TickerStatus::Failed(message) => message.as_str(),
            TickerStatus::Extracted(_) => continue,
        };
        eprintln!("Skipped {}: {}", skipped.ticker, reason);
    }

    let records = report.into_records();
    match cli.format {
        Format::Table => {
            if records.is_empty() {
                println!("No records extracted");
            } else {
                println!("{}", records_to_frame(&records)?);
            }
        }
        Format::Json => println!("{}", serde_json::to_string_pretty(&records)?),
    }

    Ok(())
}
