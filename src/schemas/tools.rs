use poem_openapi::{ApiResponse, Object, payload::Json};
use serde_json::Value as JsonValue;

use super::common::{InternalServerErrorResponse, NotFoundResponse};
use crate::core::resources::{ResourceContents, ResourceDescriptor};
use crate::core::tools::{ToolDefinition, ToolOutput};

#[derive(Object, Debug, Clone)]
#[oai(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema of the tool's `arguments` object
    pub input_schema: JsonValue,
}

impl From<ToolDefinition> for ToolDescriptor {
    fn from(definition: ToolDefinition) -> Self {
        Self {
            name: definition.name.to_string(),
            description: definition.description.to_string(),
            input_schema: definition.input_schema,
        }
    }
}

#[derive(Object, Debug, Clone)]
pub struct ToolCallRequest {
    /// Tool name, e.g. "generateMarkdownPoster"
    pub name: String,

    /// Tool arguments with camelCase keys
    #[oai(default)]
    pub arguments: JsonValue,
}

#[derive(Object, Debug, Clone)]
pub struct TextContent {
    /// Always "text"
    #[oai(rename = "type")]
    pub kind: String,
    pub text: String,
}

#[derive(Object, Debug, Clone)]
#[oai(rename_all = "camelCase")]
pub struct ToolCallResult {
    pub content: Vec<TextContent>,
    pub is_error: bool,
}

impl From<ToolOutput> for ToolCallResult {
    fn from(output: ToolOutput) -> Self {
        Self {
            content: vec![TextContent {
                kind: "text".to_string(),
                text: output.text,
            }],
            is_error: output.is_error,
        }
    }
}

#[derive(Object, Debug, Clone)]
#[oai(rename_all = "camelCase")]
pub struct ResourceEntry {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
}

impl From<ResourceDescriptor> for ResourceEntry {
    fn from(resource: ResourceDescriptor) -> Self {
        Self {
            uri: resource.uri,
            name: resource.name,
            description: resource.description,
            mime_type: resource.mime_type.to_string(),
        }
    }
}

#[derive(Object, Debug, Clone)]
#[oai(rename_all = "camelCase")]
pub struct ResourceContent {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
}

#[derive(Object, Debug, Clone)]
#[oai(rename_all = "camelCase")]
pub struct ResourceReadResult {
    pub contents: Vec<ResourceContent>,
    pub is_error: bool,
}

impl From<ResourceContents> for ResourceReadResult {
    fn from(contents: ResourceContents) -> Self {
        Self {
            is_error: contents.is_error,
            contents: vec![ResourceContent {
                uri: contents.uri,
                mime_type: contents.mime_type.to_string(),
                text: contents.text,
            }],
        }
    }
}

#[derive(Object, Debug, Clone)]
#[oai(rename_all = "camelCase")]
pub struct RasterizerHealth {
    /// "uninitialized" or "ready"
    pub state: String,
    pub active_surfaces: u64,
}

#[derive(Object, Debug, Clone)]
pub struct HealthResponse {
    pub status: String,
    pub rasterizer: RasterizerHealth,
}

#[derive(ApiResponse)]
pub enum ListToolsResponse {
    #[oai(status = 200, content_type = "application/json")]
    Ok(Json<Vec<ToolDescriptor>>),
}

#[derive(ApiResponse)]
pub enum CallToolResponse {
    #[oai(status = 200, content_type = "application/json")]
    Ok(Json<ToolCallResult>),

    #[oai(status = 404)]
    NotFound(Json<NotFoundResponse>),

    #[oai(status = 500)]
    InternalServerError(Json<InternalServerErrorResponse>),
}

#[derive(ApiResponse)]
pub enum ListResourcesResponse {
    #[oai(status = 200, content_type = "application/json")]
    Ok(Json<Vec<ResourceEntry>>),
}

#[derive(ApiResponse)]
pub enum ReadResourceResponse {
    #[oai(status = 200, content_type = "application/json")]
    Ok(Json<ResourceReadResult>),

    #[oai(status = 404)]
    NotFound(Json<NotFoundResponse>),

    #[oai(status = 500)]
    InternalServerError(Json<InternalServerErrorResponse>),
}
