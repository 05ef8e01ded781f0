//! CLI Config Command
//!
//! Create and inspect the YAML config file.

use std::path::Path;

use anyhow::{bail, Result};
use clap::Subcommand;
use visionex_config::{apply_all_defaults, config_file_path, load_and_prepare, write_config, VisionexConfig};

use crate::terminal_output::{note_info, note_success};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write a config file populated with the defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective config after env substitution and defaults
    Show,
    /// Print the config file location
    Path,
}

pub async fn run(action: ConfigAction, config_dir: &Path) -> Result<()> {
    let path = config_file_path(config_dir);
    match action {
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists; pass --force to overwrite it", path.display());
            }
            let config = apply_all_defaults(VisionexConfig::default(), config_dir);
            write_config(&config, &path).await?;
            note_success(&format!("Wrote {}", path.display()));
        }
        ConfigAction::Show => {
            if !path.exists() {
                note_info(&format!("{} does not exist; showing defaults.", path.display()));
            }
            let config = load_and_prepare(&path, config_dir).await?;
            print!("{}", serde_yaml::to_string(&config)?);
        }
        ConfigAction::Path => println!("{}", path.display()),
    }
    Ok(())
}
