//! mixpanel-jql CLI
//!
//! Command-line interface for JQL queries:
//! - Render a query definition to its script
//! - Run a query definition and print the rows
//! - Decode a saved JQL response
//! - Generate a default config file

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use mixpanel_jql::{decode_reader, Config, JqlClient, LoggingConfig, QueryDefinition};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[derive(Parser)]
#[command(name = "jql")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build and run Mixpanel JQL queries")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.config/mixpanel-jql/config.toml or ./jql.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Row output format (lines, pretty)
    #[arg(short, long, default_value = "lines", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the script for a query definition
    Render {
        /// Query definition (JSON)
        definition: PathBuf,
        /// One chained call per line
        #[arg(long)]
        pretty: bool,
    },

    /// Run a query definition and print its rows
    Run {
        /// Query definition (JSON)
        definition: PathBuf,
        /// API secret (default: config or MIXPANEL_API_SECRET)
        #[arg(long)]
        api_secret: Option<String>,
        /// Stop after this many rows
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Decode a saved JQL response ("-" for stdin)
    Decode {
        path: PathBuf,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config.logging);

    match cli.command {
        Commands::Render { definition, pretty } => {
            let query = load_definition(&definition)?.into_query("")?;
            if pretty {
                println!("{}", query.pretty());
            } else {
                println!("{}", query);
            }
        }

        Commands::Run {
            definition,
            api_secret,
            limit,
        } => {
            let Some(api_secret) = api_secret.or(config.credentials.api_secret.clone()) else {
                bail!("no API secret: pass --api-secret or set MIXPANEL_API_SECRET");
            };
            let query = load_definition(&definition)?.into_query(api_secret)?;
            let client = JqlClient::new(config.client.clone())?;

            let mut rows = query.send(&client).await?;
            let mut out = std::io::stdout().lock();
            let mut count = 0usize;
            while let Some(row) = rows.next().await {
                print_row(&mut out, &row?, &cli.format)?;
                count += 1;
                if limit.is_some_and(|n| count >= n) {
                    break;
                }
            }
            tracing::info!("Printed {} rows", count);
        }

        Commands::Decode { path } => {
            let reader: Box<dyn std::io::Read> = if path == Path::new("-") {
                Box::new(std::io::stdin().lock())
            } else {
                Box::new(
                    std::fs::File::open(&path)
                        .with_context(|| format!("cannot open {:?}", path))?,
                )
            };

            let mut out = std::io::stdout().lock();
            for row in decode_reader(reader) {
                print_row(&mut out, &row?, &cli.format)?;
            }
        }

        Commands::Config { output } => {
            let config = mixpanel_jql::config::generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

fn load_definition(path: &Path) -> anyhow::Result<QueryDefinition> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read query definition {:?}", path))?;
    Ok(QueryDefinition::parse(&text)?)
}

fn print_row(
    out: &mut impl Write,
    row: &serde_json::Value,
    format: &str,
) -> anyhow::Result<()> {
    match format {
        "pretty" => writeln!(out, "{}", serde_json::to_string_pretty(row)?)?,
        _ => writeln!(out, "{}", row)?,
    }
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("mixpanel_jql={}", logging.level).into());

    let layer = match logging.format.as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry().with(filter).with(layer).init();
}
