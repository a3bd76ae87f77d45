use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use fundcmp::core::compare::Alignment;
use fundcmp::core::series::Period;
use fundcmp::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum AlignmentArg {
    Intersection,
    ForwardFill,
}

impl From<AlignmentArg> for Alignment {
    fn from(arg: AlignmentArg) -> Alignment {
        match arg {
            AlignmentArg::Intersection => Alignment::Intersection,
            AlignmentArg::ForwardFill => Alignment::ForwardFill,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display price history for one instrument
    Series {
        /// Ticker symbol or ISIN
        instrument: String,
        /// 1m, 3m, 6m, 1y, 2y, 5y or an explicit start:end date range
        #[arg(short, long, default_value = "1y")]
        period: Period,
    },
    /// Display performance metrics for one or more instruments
    Report {
        /// Ticker symbols or ISINs
        #[arg(required = true)]
        instruments: Vec<String>,
        #[arg(short, long, default_value = "1y")]
        period: Period,
    },
    /// Compare instruments on a base-100 index
    Compare {
        /// Ticker symbols or ISINs
        #[arg(required = true, num_args = 2..)]
        instruments: Vec<String>,
        #[arg(short, long, default_value = "1y")]
        period: Period,
        /// Date axis policy when trading calendars differ
        #[arg(short, long)]
        alignment: Option<AlignmentArg>,
        /// Print every rebased data point, not just the summary
        #[arg(long)]
        points: bool,
    },
}

impl From<Commands> for fundcmp::AppCommand {
    fn from(cmd: Commands) -> fundcmp::AppCommand {
        match cmd {
            Commands::Series { instrument, period } => fundcmp::AppCommand::Series {
                instrument,
                period,
            },
            Commands::Report {
                instruments,
                period,
            } => fundcmp::AppCommand::Report {
                instruments,
                period,
            },
            Commands::Compare {
                instruments,
                period,
                alignment,
                points,
            } => fundcmp::AppCommand::Compare {
                instruments,
                period,
                alignment: alignment.map(Into::into),
                points,
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => fundcmp::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

fn setup() -> anyhow::Result<()> {
    use anyhow::Context;

    let path = fundcmp::config::AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = r#"---
providers:
  yahoo:
    base_url: "https://query1.finance.yahoo.com"
  # eodhd:
  #   base_url: "https://eodhd.com"
  #   api_token: "your-token"
  # alpha_vantage:
  #   base_url: "https://www.alphavantage.co"
  #   api_key: "your-key"

priority: [yahoo, eodhd, alpha-vantage]

cache_ttl_hours: 24
fetch_timeout_secs: 15
max_concurrent_fetches: 4
alignment: intersection
"#;

    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}
