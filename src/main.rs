use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use datamaps::config::AppConfig;
use datamaps::{server, Datamap, Document};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

const HOST_WIDTH: f64 = 960.0;
const HOST_HEIGHT: f64 = 600.0;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the configured map to an HTML page
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Overrides [output].path
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Render the map, then serve it with the hover query API
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Render { config, out } => {
            info!("Rendering map with config: {:?}", config);
            let app_config = AppConfig::load_from_file(config)?;
            let map = build_map(&app_config).await?;
            let target = out.clone().unwrap_or_else(|| app_config.output.path.clone());
            write_page(&map, &target)?;
            info!("Render complete!");
        }
        Commands::Serve { config } => {
            info!("Serving map with config: {:?}", config);
            let app_config = AppConfig::load_from_file(config)?;
            let map = build_map(&app_config).await?;
            write_page(&map, &app_config.output.path)?;

            let static_dir = app_config
                .output
                .path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf();
            server::start_server(map, app_config.server.port, &static_dir).await?;
        }
    }

    Ok(())
}

async fn build_map(app_config: &AppConfig) -> Result<Datamap> {
    let options = app_config.map_options()?;
    let mut map = Datamap::new(Document::new(HOST_WIDTH, HOST_HEIGHT), options)
        .context("Failed to set up the map surface")?;
    map.draw().await.context("Failed to draw the map")?;
    info!("Drew {} regions", map.regions().len());

    for call in &app_config.plugins {
        map.plugin(&call.name, call.data.clone(), call.options.clone(), call.new_layer)
            .with_context(|| format!("Plugin '{}' failed", call.name))?;
    }
    Ok(map)
}

fn write_page(map: &Datamap, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
    }
    fs::write(path, map.to_html()).with_context(|| format!("Failed to write page: {:?}", path))?;
    info!("Wrote {:?}", path);
    Ok(())
}
