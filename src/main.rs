use anyhow::Result;
use clap::{Parser, Subcommand};
use event_map_dashboard::bar::count_by_location;
use event_map_dashboard::config::AppConfig;
use event_map_dashboard::{data, server};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the dataset and serve the dashboard
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// CSV path or URL, overriding `[input].source`
        #[arg(short, long)]
        source: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Load and validate the dataset, print a summary and exit
    Check {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long)]
        source: Option<String>,
    },
}

/// Reads `path`, or builds a default config when only a source was given.
fn resolve_config(path: &Path, source: Option<String>) -> Result<AppConfig> {
    let mut config = match &source {
        Some(source) if !path.exists() => AppConfig::with_source(source.clone()),
        _ => AppConfig::load_from_file(path)?,
    };
    if let Some(source) = source {
        config.input.source = source;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, source, port } => {
            let mut app_config = resolve_config(&config, source)?;
            if let Some(port) = port {
                app_config.server.port = port;
            }

            // Nothing is served unless the dataset loads.
            let (dataset, _) = data::load(&app_config.input).await?;
            server::start_server(app_config, dataset).await?;
        }
        Commands::Check { config, source } => {
            let app_config = resolve_config(&config, source)?;
            let (dataset, report) = data::load(&app_config.input).await?;

            println!("Source:             {}", app_config.input.source);
            println!("Rows read:          {}", report.rows_read);
            println!("Invalid rows:       {}", report.rows_skipped);
            println!("Duplicates removed: {}", report.duplicates_removed);
            println!("Records:            {}", dataset.len());

            let mut groups = count_by_location(dataset.all_records());
            groups.sort_by(|a, b| b.1.cmp(&a.1));
            println!("Locations:          {}", groups.len());
            for (location, count) in groups.iter().take(10) {
                println!("  {:>6}  {}", count, location);
            }
        }
    }

    Ok(())
}
