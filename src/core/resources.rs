use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::core::registry::{DefinitionKind, Registry};
use crate::error::{PosterError, Result};

pub const URI_SCHEME: &str = "markdown-poster";
pub const ALL_ID: &str = "_all";
pub const MIME_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    pub mime_type: &'static str,
    pub text: String,
    #[serde(skip)]
    pub is_error: bool,
}

fn collection(kind: DefinitionKind) -> &'static str {
    match kind {
        DefinitionKind::Theme => "themes",
        DefinitionKind::Template => "templates",
    }
}

fn title(kind: DefinitionKind) -> &'static str {
    match kind {
        DefinitionKind::Theme => "Theme",
        DefinitionKind::Template => "Template",
    }
}

pub fn resource_uri(kind: DefinitionKind, id: &str) -> String {
    format!("{URI_SCHEME}://{}/{id}", collection(kind))
}

/// One `_all` entry followed by one entry per definition, themes first.
pub fn list_resources(registry: &Registry) -> Vec<ResourceDescriptor> {
    let mut resources = Vec::new();
    for kind in [DefinitionKind::Theme, DefinitionKind::Template] {
        resources.push(ResourceDescriptor {
            uri: resource_uri(kind, ALL_ID),
            name: format!("All {}s", title(kind)),
            description: format!("Complete list of all available {}", collection(kind)),
            mime_type: MIME_TYPE,
        });

        match kind {
            DefinitionKind::Theme => {
                resources.extend(registry.themes().iter().map(|theme| ResourceDescriptor {
                    uri: resource_uri(kind, &theme.id),
                    name: format!("Theme: {}", theme.name),
                    description: theme.description.clone(),
                    mime_type: MIME_TYPE,
                }))
            }
            DefinitionKind::Template => {
                resources.extend(registry.templates().iter().map(|template| {
                    ResourceDescriptor {
                        uri: resource_uri(kind, &template.id),
                        name: format!("Template: {}", template.name),
                        description: template.description.clone(),
                        mime_type: MIME_TYPE,
                    }
                }))
            }
        }
    }
    resources
}

fn parse_uri(uri: &str) -> Option<(DefinitionKind, &str)> {
    let path = uri.strip_prefix(URI_SCHEME)?.strip_prefix("://")?;
    let (collection, id) = path.split_once('/')?;
    let kind = match collection {
        "themes" => DefinitionKind::Theme,
        "templates" => DefinitionKind::Template,
        _ => return None,
    };
    Some((kind, id))
}

fn lookup(registry: &Registry, kind: DefinitionKind, id: &str) -> Result<Value> {
    if id == ALL_ID {
        let definitions = registry.list(kind);
        let mut all = Map::new();
        all.insert("count".to_string(), json!(definitions.len()));
        all.insert(collection(kind).to_string(), serde_json::to_value(definitions)?);
        return Ok(Value::Object(all));
    }

    let definition = registry.get(kind, id).ok_or_else(|| PosterError::NotFound {
        kind: title(kind),
        id: id.to_string(),
    })?;
    Ok(serde_json::to_value(definition)?)
}

/// Unknown URIs are an `Err`; a missing definition comes back as
/// error-flagged contents.
pub fn read_resource(registry: &Registry, uri: &str) -> Result<ResourceContents> {
    let (kind, id) =
        parse_uri(uri).ok_or_else(|| PosterError::UnknownResource(uri.to_string()))?;

    let (value, is_error) = match lookup(registry, kind, id) {
        Ok(value) => (value, false),
        Err(e) => {
            tracing::warn!("Failed to read resource {}: {}", uri, e);
            (
                json!({ "error": format!("Failed to read resource {uri}: {e}") }),
                true,
            )
        }
    };

    Ok(ResourceContents {
        uri: uri.to_string(),
        mime_type: MIME_TYPE,
        text: serde_json::to_string_pretty(&value)?,
        is_error,
    })
}
