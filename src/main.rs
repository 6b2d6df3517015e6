pub mod config;
pub mod data;
pub mod index;
pub mod processing;
pub mod render;
pub mod server;
pub mod state;
pub mod symbology;
pub mod types;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render every month in both map styles to PNG frames
    Generate {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the interactive map state over HTTP
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Print the computed frame for one month and style as JSON
    Frame {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Month index, 0 = January
        #[arg(short, long, default_value_t = 0)]
        month: usize,
        /// `proportional` or `choropleth`
        #[arg(short, long, default_value = "proportional")]
        style: state::StyleMode,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate { config } => {
            info!("Generating frames with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(&config)?;

            let layers = data::load_layers(&app_config).await?;
            render::generate_frames(&app_config, &layers)?;

            info!("Generation complete!");
        }
        Commands::Serve { config } => {
            info!("Serving map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(&config)?;

            let layers = data::load_layers(&app_config).await?;
            server::start_server(app_config, layers).await?;
        }
        Commands::Frame {
            config,
            month,
            style,
        } => {
            let app_config = config::AppConfig::load_from_file(&config)?;
            let layers = data::load_layers(&app_config).await?;

            let mut view = state::ViewState::default();
            view.select_month(month)?;
            view.select_style(style);

            let frame = processing::build_frame(&layers, view);
            let json = serde_json::to_string_pretty(&frame).context("Failed to encode frame")?;
            println!("{}", json);
        }
    }

    Ok(())
}
