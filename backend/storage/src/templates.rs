//! Named field templates persisted under a single key.
//!
//! The persisted value is a JSON array of `{TemplateName, Fields}` records.
//! The array is treated as a map keyed by template name: saving an existing
//! name replaces that record in place, so list order is the order in which
//! names were first created.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;
use visionex_core::{DataField, KeyValueStore, StorageError, Template};

/// Storage key holding every template.
pub const TEMPLATES_KEY: &str = "visionExtractor_fieldTemplates";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Uuid>,
    name: String,
    prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StoredTemplate {
    template_name: String,
    fields: Vec<StoredField>,
}

impl From<&DataField> for StoredField {
    fn from(field: &DataField) -> Self {
        Self {
            id: Some(field.id),
            name: field.name.clone(),
            prompt: field.prompt.clone(),
        }
    }
}

impl From<StoredField> for DataField {
    fn from(field: StoredField) -> Self {
        Self {
            id: field.id.unwrap_or_else(Uuid::new_v4),
            name: field.name,
            prompt: field.prompt,
        }
    }
}

impl From<StoredTemplate> for Template {
    fn from(stored: StoredTemplate) -> Self {
        Template {
            name: stored.template_name,
            fields: stored.fields.into_iter().map(DataField::from).collect(),
        }
    }
}

/// Durable CRUD over named field templates.
#[derive(Clone)]
pub struct TemplateStore {
    kv: Arc<dyn KeyValueStore>,
}

impl TemplateStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Insert or overwrite the template called `name`.
    pub fn save(&self, name: &str, fields: &[DataField]) -> Result<String, StorageError> {
        let record = StoredTemplate {
            template_name: name.to_string(),
            fields: fields.iter().map(StoredField::from).collect(),
        };
        self.modify(|templates| {
            match templates.iter_mut().find(|t| t.template_name == name) {
                Some(existing) => *existing = record.clone(),
                None => templates.push(record.clone()),
            }
        })?;
        debug!(template = name, fields = fields.len(), "Template saved");
        Ok(format!("Template \"{name}\" saved."))
    }

    /// All templates in creation order. Empty when storage cannot be read.
    pub fn list(&self) -> Vec<Template> {
        match self.read_all() {
            Ok(templates) => templates.into_iter().map(Template::from).collect(),
            Err(e) => {
                warn!(error = %e, "Failed to read templates; returning none");
                Vec::new()
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Template> {
        match self.read_all() {
            Ok(templates) => templates
                .into_iter()
                .find(|t| t.template_name == name)
                .map(Template::from),
            Err(e) => {
                warn!(error = %e, template = name, "Failed to read template");
                None
            }
        }
    }

    /// Remove `name`. Deleting an absent template succeeds.
    pub fn delete(&self, name: &str) -> Result<String, StorageError> {
        let mut removed = 0;
        self.modify(|templates| {
            let before = templates.len();
            templates.retain(|t| t.template_name != name);
            removed = before - templates.len();
        })?;
        debug!(template = name, removed, "Template deleted");
        Ok(format!("Template \"{name}\" deleted."))
    }

    fn read_all(&self) -> Result<Vec<StoredTemplate>, StorageError> {
        parse_all(self.kv.get(TEMPLATES_KEY)?)
    }

    /// Read, edit and write back the whole list as one atomic store update.
    fn modify(&self, mut edit: impl FnMut(&mut Vec<StoredTemplate>)) -> Result<(), StorageError> {
        self.kv.update(TEMPLATES_KEY, &mut |current| {
            let mut templates = parse_all(current)?;
            edit(&mut templates);
            Ok(serde_json::to_string(&templates)?)
        })
    }
}

fn parse_all(raw: Option<String>) -> Result<Vec<StoredTemplate>, StorageError> {
    match raw {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(Vec::new()),
    }
}
