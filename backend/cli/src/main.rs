mod config_cmd;
mod context;
mod extract_cmd;
mod model_cmd;
mod template_cmd;
mod terminal_output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use visionex_config::defaults::DEFAULT_LOG_LEVEL;

use config_cmd::ConfigAction;
use context::AppContext;
use extract_cmd::ExtractArgs;
use model_cmd::ModelAction;
use template_cmd::TemplateAction;
use terminal_output::note_error;

#[derive(Parser)]
#[command(name = "visionex")]
#[command(about = "Visionex — extract named fields from images with a local vision model")]
#[command(version)]
struct Cli {
    /// Config directory (defaults to $VISIONEX_CONFIG_DIR or ~/.visionex)
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage saved field templates
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },
    /// Inspect and load models
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Extract fields from images
    Extract(ExtractArgs),
    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            note_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_dir = cli.config_dir.unwrap_or_else(visionex_config::config_dir);

    match cli.command {
        Commands::Config { action } => {
            logging::init_logger(None, DEFAULT_LOG_LEVEL, false);
            config_cmd::run(action, &config_dir).await
        }
        Commands::Template { action } => {
            let ctx = AppContext::bootstrap(&config_dir).await?;
            template_cmd::run(action, &ctx).await
        }
        Commands::Model { action } => {
            let ctx = AppContext::bootstrap(&config_dir).await?;
            model_cmd::run(action, &ctx).await
        }
        Commands::Extract(args) => {
            let ctx = AppContext::bootstrap(&config_dir).await?;
            extract_cmd::run(args, &ctx).await
        }
    }
}
