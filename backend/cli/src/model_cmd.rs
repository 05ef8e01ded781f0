//! CLI Model Command
//!
//! Inspect, fetch and forget vision-language models on the runtime.

use std::io::Write;

use anyhow::Result;
use clap::Subcommand;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use visionex_session::{LoadProgress, ModelSession};

use crate::context::AppContext;
use crate::terminal_output::{
    info_line, note_success, render_progress_bar, render_table, stream_write, warn_line, Column,
};

const BAR_WIDTH: usize = 30;

#[derive(Subcommand)]
pub enum ModelAction {
    /// Show runtime reachability and whether the model is available
    Status {
        /// Model tag (defaults to the configured model)
        #[arg(long)]
        model: Option<String>,
    },
    /// Fetch and load a model, reporting progress
    Load {
        #[arg(long)]
        model: Option<String>,
    },
    /// Clear the "loaded before" flag for a model
    Forget {
        #[arg(long)]
        model: Option<String>,
    },
}

pub async fn run(action: ModelAction, ctx: &AppContext) -> Result<()> {
    match action {
        ModelAction::Status { model } => status(ctx, &ctx.model_id(model)).await,
        ModelAction::Load { model } => {
            let model_id = ctx.model_id(model);
            let session = ctx.session()?;
            load_with_progress(&session, &model_id, &mut std::io::stdout()).await?;
            note_success(&format!("Model {model_id} is ready."));
            Ok(())
        }
        ModelAction::Forget { model } => {
            let model_id = ctx.model_id(model);
            ctx.cache.forget(&model_id)?;
            note_success(&format!("Forgot cache flag for {model_id}."));
            Ok(())
        }
    }
}

async fn status(ctx: &AppContext, model_id: &str) -> Result<()> {
    let loaded_before = if ctx.cache.is_cached(model_id) { "yes" } else { "no" };
    let Some(client) = ctx.runtime_client()? else {
        let rows = vec![
            vec!["Model".to_string(), model_id.to_string()],
            vec!["Runtime".to_string(), "not configured".to_string()],
            vec!["Loaded before".to_string(), loaded_before.to_string()],
        ];
        print_key_values(&rows);
        return Ok(());
    };
    let (server, available) = match client.version().await {
        Ok(version) => {
            let available = match client.has_model(model_id).await {
                Ok(true) => "yes".to_string(),
                Ok(false) => "no".to_string(),
                Err(e) => format!("unknown ({e})"),
            };
            (format!("ollama {version}"), available)
        }
        Err(e) => (format!("unreachable ({e})"), "unknown".to_string()),
    };
    let rows = vec![
        vec!["Model".to_string(), model_id.to_string()],
        vec!["Runtime".to_string(), client.base_url().to_string()],
        vec!["Server".to_string(), server],
        vec!["Available locally".to_string(), available],
        vec!["Loaded before".to_string(), loaded_before.to_string()],
    ];
    print_key_values(&rows);
    Ok(())
}

fn print_key_values(rows: &[Vec<String>]) {
    let columns = vec![Column::left("Key"), Column::left("Value").max_width(60)];
    println!();
    print!("{}", render_table(&columns, rows));
    println!();
}

/// Load `model_id` on `session`, drawing notes and a progress bar into
/// `out` until the load settles.
pub async fn load_with_progress(
    session: &ModelSession,
    model_id: &str,
    out: &mut dyn Write,
) -> Result<()> {
    let intro = if session.is_cached(model_id) {
        format!("{model_id} was loaded before; this should be quick.")
    } else {
        format!("Loading {model_id}; the first load downloads the weights.")
    };
    let _ = stream_write(out, &format!("{}\n", info_line(&intro)));

    let mut progress = session.subscribe_progress();
    let load = session.load(model_id);
    tokio::pin!(load);

    let outcome = loop {
        tokio::select! {
            outcome = &mut load => break outcome,
            update = progress.recv() => match update {
                Ok(update) => draw(out, &update),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break (&mut load).await,
            },
        }
    };
    loop {
        match progress.try_recv() {
            Ok(update) => draw(out, &update),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    let _ = stream_write(out, "\n");

    if let Err(e) = &outcome {
        if e.is_retriable() {
            let _ = stream_write(out, &format!("{}\n", warn_line("The load can be retried; rerun the command.")));
        }
    }
    outcome.map_err(Into::into)
}

fn draw(out: &mut dyn Write, update: &LoadProgress) {
    let line = format!("\r{} {}", update.model_id, render_progress_bar(update.percent, BAR_WIDTH));
    let _ = stream_write(out, &line);
}
