//! CLI Extract Command
//!
//! Ask every field's prompt about each image and write one JSON file per image.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use media::{DirectoryExporter, FileImageSource, FrameDirectoryCamera};
use tracing::info;
use visionex_core::{CameraSource, DataField, ExtractionResult, FileSource, ImageData, VisionError};
use visionex_session::{export_result, ExtractionOrchestrator, NamedImage};

use crate::context::AppContext;
use crate::model_cmd::load_with_progress;
use crate::template_cmd::parse_field_args;
use crate::terminal_output::{note_success, note_warn, render_table, Column, BOLD, RESET};

#[derive(Args)]
pub struct ExtractArgs {
    /// Image file to extract from; repeat for more
    #[arg(
        long = "image",
        value_name = "PATH",
        required_unless_present = "camera_dir",
        conflicts_with = "camera_dir"
    )]
    pub images: Vec<PathBuf>,
    /// Capture the newest frame from a directory a camera writes into
    #[arg(long, value_name = "DIR")]
    pub camera_dir: Option<PathBuf>,
    /// Use the fields of a saved template
    #[arg(long, conflicts_with = "fields")]
    pub template: Option<String>,
    /// A field as NAME=PROMPT; repeat for more
    #[arg(long = "field", value_name = "NAME=PROMPT")]
    pub fields: Vec<String>,
    /// Model tag (defaults to the configured model)
    #[arg(long)]
    pub model: Option<String>,
    /// Output directory (defaults to the configured one)
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,
    /// Print results as JSON on stdout instead of writing files
    #[arg(long)]
    pub stdout: bool,
}

pub async fn run(args: ExtractArgs, ctx: &AppContext) -> Result<()> {
    let fields = resolve_fields(ctx, &args)?;
    let images = match &args.camera_dir {
        Some(dir) => vec![capture_frame(dir).await?],
        None => read_images(&args.images).await,
    };
    if images.is_empty() {
        bail!("None of the given paths is a readable image");
    }

    let model_id = ctx.model_id(args.model.clone());
    let session = ctx.session()?;
    // With --stdout, stdout carries only result JSON.
    if args.stdout {
        load_with_progress(&session, &model_id, &mut std::io::stderr()).await?;
    } else {
        load_with_progress(&session, &model_id, &mut std::io::stdout()).await?;
    }

    let orchestrator = ExtractionOrchestrator::new(session);
    let exporter = DirectoryExporter::new(ctx.output_dir(args.out.clone()));
    info!(images = images.len(), fields = fields.len(), "Extracting");

    for named in &images {
        let result = orchestrator.run_extraction(&named.name, &named.image, &fields).await;
        if args.stdout {
            println!("{}", result.to_json()?);
            continue;
        }
        print_result(&result);
        let location = export_result(&exporter, &result).await?;
        note_success(&format!("Wrote {}", location.display()));
    }
    Ok(())
}

fn resolve_fields(ctx: &AppContext, args: &ExtractArgs) -> Result<Vec<DataField>> {
    let fields = match &args.template {
        Some(name) => {
            ctx.templates
                .get(name)
                .ok_or_else(|| VisionError::TemplateNotFound(name.clone()))?
                .fields
        }
        None => parse_field_args(&args.fields)?,
    };
    if fields.is_empty() {
        bail!("No fields to extract; pass --template NAME or --field NAME=PROMPT");
    }
    Ok(fields)
}

async fn read_images(paths: &[PathBuf]) -> Vec<NamedImage> {
    let source = FileImageSource::new();
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        let decoded = match source.read_as_data_url(&path.to_string_lossy()).await {
            Some(url) => ImageData::from_data_url(&url).ok(),
            None => None,
        };
        match decoded {
            Some(image) => images.push(NamedImage { name: display_name(path), image }),
            None => note_warn(&format!("Skipping {}: not a readable image", path.display())),
        }
    }
    images
}

async fn capture_frame(dir: &Path) -> Result<NamedImage> {
    let camera = FrameDirectoryCamera::new();
    camera.start(&dir.to_string_lossy()).await?;
    let captured = camera.capture().await;
    camera.stop();
    let image = ImageData::from_data_url(&captured?).context("Captured frame is not an image")?;
    let extension = match image.mime_type.as_str() {
        "image/png" => "png",
        _ => "jpg",
    };
    Ok(NamedImage { name: format!("camera-capture.{extension}"), image })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_result(result: &ExtractionResult) {
    println!("\n{BOLD}{}{RESET}", result.image_name);
    let columns = vec![Column::left("Field"), Column::left("Value").max_width(80)];
    let rows: Vec<Vec<String>> = result
        .data_fields
        .iter()
        .map(|field| {
            let value = result.extracted_data.get(&field.name).cloned().unwrap_or_default();
            vec![field.name.clone(), value]
        })
        .collect();
    print!("{}", render_table(&columns, &rows));
}
