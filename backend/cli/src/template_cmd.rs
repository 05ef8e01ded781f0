//! CLI Template Command
//!
//! Save, list, show and delete named field templates.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Subcommand;
use serde::Deserialize;
use serde_json::json;
use visionex_core::{DataField, Template, VisionError};

use crate::context::AppContext;
use crate::terminal_output::{note_info, note_success, render_table, Column};

#[derive(Subcommand)]
pub enum TemplateAction {
    /// Save a named set of fields, replacing any template with that name
    Save {
        name: String,
        /// A field as NAME=PROMPT; repeat for more
        #[arg(long = "field", value_name = "NAME=PROMPT")]
        fields: Vec<String>,
        /// YAML or JSON list of `{name, prompt}` entries
        #[arg(long, value_name = "FILE")]
        from: Option<PathBuf>,
    },
    /// List saved templates
    List,
    /// Print one template's fields
    Show {
        name: String,
        /// Print the template as JSON (`TemplateName` plus `Fields` with `Id`, `Name`, `Prompt`)
        #[arg(long)]
        json: bool,
    },
    /// Delete a template (no-op if it does not exist)
    Delete { name: String },
}

#[derive(Debug, Deserialize)]
struct FieldEntry {
    name: String,
    prompt: String,
}

pub async fn run(action: TemplateAction, ctx: &AppContext) -> Result<()> {
    match action {
        TemplateAction::Save { name, fields, from } => {
            let mut parsed = match from {
                Some(path) => read_field_file(&path).await?,
                None => Vec::new(),
            };
            parsed.extend(parse_field_args(&fields)?);
            if parsed.is_empty() {
                bail!("A template needs at least one field; pass --field NAME=PROMPT or --from FILE");
            }
            let message = ctx.templates.save(&name, &parsed)?;
            note_success(&message);
        }
        TemplateAction::List => {
            let templates = ctx.templates.list();
            if templates.is_empty() {
                note_info("No templates saved yet.");
                return Ok(());
            }
            let columns = vec![
                Column::left("Name"),
                Column::right("Fields"),
                Column::left("Field names").max_width(60),
            ];
            let rows: Vec<Vec<String>> = templates
                .iter()
                .map(|t| {
                    let names: Vec<&str> = t.fields.iter().map(|f| f.name.as_str()).collect();
                    vec![t.name.clone(), t.fields.len().to_string(), names.join(", ")]
                })
                .collect();
            println!();
            print!("{}", render_table(&columns, &rows));
            println!();
        }
        TemplateAction::Show { name, json } => {
            let template = ctx
                .templates
                .get(&name)
                .ok_or_else(|| VisionError::TemplateNotFound(name.clone()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&template_json(&template))?);
            } else {
                let columns = vec![Column::left("Field"), Column::left("Prompt").max_width(80)];
                let rows: Vec<Vec<String>> = template
                    .fields
                    .iter()
                    .map(|f| vec![f.name.clone(), f.prompt.clone()])
                    .collect();
                println!();
                print!("{}", render_table(&columns, &rows));
                println!();
            }
        }
        TemplateAction::Delete { name } => {
            let message = ctx.templates.delete(&name)?;
            note_success(&message);
        }
    }
    Ok(())
}

/// The JSON shape printed by `template show --json`; fields use the same
/// PascalCase keys as extraction results.
fn template_json(template: &Template) -> serde_json::Value {
    json!({ "TemplateName": template.name, "Fields": template.fields })
}

/// Parse repeated `--field NAME=PROMPT` arguments.
pub fn parse_field_args(pairs: &[String]) -> Result<Vec<DataField>> {
    pairs
        .iter()
        .map(|pair| {
            DataField::parse_pair(pair)
                .ok_or_else(|| anyhow!("Invalid field \"{pair}\"; expected NAME=PROMPT"))
        })
        .collect()
}

async fn read_field_file(path: &Path) -> Result<Vec<DataField>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_field_list(&raw).with_context(|| format!("Invalid field list in {}", path.display()))
}

fn parse_field_list(raw: &str) -> Result<Vec<DataField>> {
    let entries: Vec<FieldEntry> = serde_yaml::from_str(raw)?;
    Ok(entries
        .into_iter()
        .map(|entry| DataField::new(entry.name, entry.prompt))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_field_arguments() {
        let fields = parse_field_args(&[
            "Vendor=Who issued the invoice?".to_string(),
            "Total=What is the total amount?".to_string(),
        ])
        .unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].name, "Total");

        let err = parse_field_args(&["Total".to_string()]).unwrap_err();
        assert!(err.to_string().contains("NAME=PROMPT"));
    }

    #[test]
    fn reads_yaml_and_json_field_lists() {
        let yaml = "- name: Vendor\n  prompt: Who issued the invoice?\n- name: Date\n  prompt: When?\n";
        let fields = parse_field_list(yaml).unwrap();
        assert_eq!(fields[0].prompt, "Who issued the invoice?");
        assert_eq!(fields[1].name, "Date");

        let json = r#"[{"name": "Total", "prompt": "What is the total?"}]"#;
        assert_eq!(parse_field_list(json).unwrap()[0].name, "Total");

        assert!(parse_field_list("- name: NoPrompt\n").is_err());
    }

    #[test]
    fn json_view_uses_result_field_keys() {
        let field = DataField::new("Total", "What is the total?");
        let value = template_json(&Template::new("Invoice", vec![field.clone()]));
        assert_eq!(value["TemplateName"], "Invoice");
        assert_eq!(value["Fields"][0]["Name"], "Total");
        assert_eq!(value["Fields"][0]["Prompt"], "What is the total?");
        assert_eq!(value["Fields"][0]["Id"], field.id.to_string());
    }
}
