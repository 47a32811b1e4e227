use export_insights::config::{AnalysisConfig, DataConfig, LlmConfig};
use export_insights::insights::{build_prompt, format_as_markdown, InsightOrchestrator};
use export_insights::llm::LlmClient;
use export_insights::pipeline::{AnalysisEngine, Selection};
use export_insights::source::{DataSource, Dataset};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use lazy_static::lazy_static;
use regex::Regex;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

lazy_static! {
    static ref YEAR_RANGE: Regex =
        Regex::new(r"^\s*(\d{4})\s*(?:-|\.\.|to)\s*(\d{4})\s*$").expect("valid year range pattern");
}

#[derive(Parser)]
#[command(name = "export-insights")]
#[command(about = "Trend analysis and commentary for USDA PSD export data")]
#[command(version)]
struct Args {
    /// Directory holding the dataset folders (default: ./data)
    #[arg(short, long, default_value = "data", global = true)]
    data_dir: PathBuf,

    /// JSON file overriding analysis thresholds
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the commodities in a dataset
    Commodities { dataset: Dataset },

    /// List the countries in a dataset
    Countries { dataset: Dataset },

    /// Export totals by destination country for one commodity and year
    Destinations {
        dataset: Dataset,
        commodity: String,
        year: i32,
    },

    /// Analyze the export series of one commodity
    Analyze {
        dataset: Dataset,
        commodity: String,

        /// Restrict to one destination country
        #[arg(long)]
        country: Option<String>,

        /// Year range such as 2010-2020
        #[arg(long, value_parser = parse_year_range)]
        years: Option<YearRange>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Ask the language model for commentary on a commodity
    Insights {
        commodity: String,

        /// Year range such as 2010-2020
        #[arg(long, value_parser = parse_year_range)]
        years: Option<YearRange>,

        /// Print fragments as they arrive
        #[arg(long)]
        stream: bool,

        /// Format the answer as a bullet list
        #[arg(long)]
        markdown: bool,

        /// OpenAI API key (or set OPENAI_API_KEY env var)
        #[arg(long)]
        api_key: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct YearRange(i32, i32);

fn parse_year_range(raw: &str) -> std::result::Result<YearRange, String> {
    let caps = YEAR_RANGE
        .captures(raw)
        .ok_or_else(|| format!("expected a range like 2010-2020, got '{}'", raw))?;
    let min: i32 = caps[1].parse().map_err(|e| format!("{}", e))?;
    let max: i32 = caps[2].parse().map_err(|e| format!("{}", e))?;
    if min > max {
        return Err(format!("range start {} is after end {}", min, max));
    }
    Ok(YearRange(min, max))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AnalysisConfig::load(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", path.display(), e))?,
        None => AnalysisConfig::default(),
    };

    match args.command {
        Commands::Commodities { dataset } => {
            let engine = build_engine(&args.data_dir, config);
            for commodity in engine.commodities(dataset)? {
                println!("{}", commodity);
            }
            Ok(())
        }
        Commands::Countries { dataset } => {
            let engine = build_engine(&args.data_dir, config);
            for country in engine.countries(dataset)? {
                println!("{}", country);
            }
            Ok(())
        }
        Commands::Destinations {
            dataset,
            commodity,
            year,
        } => {
            let engine = build_engine(&args.data_dir, config);
            for row in engine.destinations(dataset, &commodity, year)? {
                println!("{}: {}", row.country.unwrap_or_default(), row.value);
            }
            Ok(())
        }
        Commands::Analyze {
            dataset,
            commodity,
            country,
            years,
            format,
        } => {
            let engine = build_engine(&args.data_dir, config);
            run_analysis(&engine, dataset, commodity, country, years, format)
        }
        Commands::Insights {
            commodity,
            years,
            stream,
            markdown,
            api_key,
        } => run_insights(&config, commodity, years, stream, markdown, api_key).await,
    }
}

fn build_engine(data_dir: &Path, config: AnalysisConfig) -> AnalysisEngine {
    info!("Data directory: {}", data_dir.display());
    AnalysisEngine::new(DataSource::new(DataConfig::new(data_dir)), config)
}

fn run_analysis(
    engine: &AnalysisEngine,
    dataset: Dataset,
    commodity: String,
    country: Option<String>,
    years: Option<YearRange>,
    format: OutputFormat,
) -> Result<()> {
    let mut selection = Selection::new(dataset, commodity);
    selection.country = country;
    selection.year_range = years.map(|YearRange(min, max)| (min, max));

    let report = engine.run(&selection)?;
    match format {
        OutputFormat::Text => println!("{}", report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Csv => report.write_csv(io::stdout().lock())?,
    }
    Ok(())
}

async fn run_insights(
    config: &AnalysisConfig,
    commodity: String,
    years: Option<YearRange>,
    stream: bool,
    markdown: bool,
    api_key: Option<String>,
) -> Result<()> {
    let llm_config = LlmConfig::from_env(api_key);
    if llm_config.is_dummy() {
        println!("[WARN] OpenAI API key not found - using canned insights");
    }
    let orchestrator = InsightOrchestrator::new(Arc::new(LlmClient::new(llm_config)));

    let prompt = build_prompt(
        &commodity,
        years.map(|YearRange(min, max)| (min, max)),
        &config.origin_label,
    );

    let text = if stream {
        // a markdown answer is printed once, after the stream completes
        let mut echo = StreamEcho::new(io::stdout(), !markdown);
        let buffer = orchestrator
            .stream(&prompt, |so_far| echo.update(so_far))
            .await;
        if echo.live {
            println!();
        }
        if let Some(error) = &buffer.error {
            eprintln!("{}", error);
        }
        if !markdown {
            return Ok(());
        }
        buffer.text
    } else {
        orchestrator.fetch(&prompt).await
    };

    if markdown {
        println!("{}", format_as_markdown(&text));
    } else {
        println!("{}", text);
    }
    Ok(())
}

/// Writes the unseen tail of a growing stream buffer.
struct StreamEcho<W: Write> {
    out: W,
    printed: usize,
    live: bool,
}

impl<W: Write> StreamEcho<W> {
    fn new(out: W, live: bool) -> Self {
        Self {
            out,
            printed: 0,
            live,
        }
    }

    fn update(&mut self, so_far: &str) {
        if !self.live {
            return;
        }
        let tail = so_far.get(self.printed..).unwrap_or_default();
        if write!(self.out, "{}", tail).and_then(|_| self.out.flush()).is_err() {
            warn!("Failed to echo streamed text");
        }
        self.printed = so_far.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_year_range_forms() {
        assert_eq!(parse_year_range("2010-2020").unwrap(), YearRange(2010, 2020));
        assert_eq!(parse_year_range(" 2001 to 2005 ").unwrap(), YearRange(2001, 2005));
        assert_eq!(parse_year_range("1999..2003").unwrap(), YearRange(1999, 2003));
    }

    #[test]
    fn test_parse_year_range_rejects_bad_input() {
        assert!(parse_year_range("2020-2010").is_err());
        assert!(parse_year_range("last decade").is_err());
    }

    #[test]
    fn test_stream_echo_prints_each_fragment_once() {
        let mut echo = StreamEcho::new(Vec::new(), true);
        echo.update("Exports ");
        echo.update("Exports rose.");
        assert_eq!(String::from_utf8(echo.out).unwrap(), "Exports rose.");
    }

    #[test]
    fn test_stream_echo_is_silent_for_markdown() {
        let mut echo = StreamEcho::new(Vec::new(), false);
        echo.update("1. Demand grew.");
        echo.update("1. Demand grew. 2. Prices fell.");
        assert!(echo.out.is_empty());
        assert_eq!(echo.printed, 0);
    }
}
