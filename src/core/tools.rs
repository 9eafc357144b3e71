use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::core::generator::{
    ConversionResult, ConvertArgs, GenerationResult, PosterGenerator, PreviewArgs,
};
use crate::core::registry::{
    AspectRatio, ClosedSet, DefinitionKind, ImageFormat, PosterSize, Registry,
};
use crate::core::validator::{
    DEFAULT_ASPECT_RATIO, DEFAULT_FORMAT, DEFAULT_HEIGHT, DEFAULT_QUALITY, DEFAULT_SIZE,
    DEFAULT_TEMPLATE, DEFAULT_THEME, DEFAULT_WIDTH, DIMENSION_RANGE, GenerateArgs,
    MAX_MARKDOWN_CHARS, QUALITY_RANGE,
};
use crate::error::{PosterError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    GenerateMarkdownPoster,
    ListThemes,
    ListTemplates,
    PreviewMarkdown,
    ConvertBase64ToImage,
}

impl ClosedSet for ToolName {
    const ALL: &'static [Self] = &[
        Self::GenerateMarkdownPoster,
        Self::ListThemes,
        Self::ListTemplates,
        Self::PreviewMarkdown,
        Self::ConvertBase64ToImage,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateMarkdownPoster => "generateMarkdownPoster",
            Self::ListThemes => "listThemes",
            Self::ListTemplates => "listTemplates",
            Self::PreviewMarkdown => "previewMarkdown",
            Self::ConvertBase64ToImage => "convertBase64ToImage",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// Descriptors for every tool. Enumerations and bounds come from the registry
/// and the validator constants.
pub fn tool_definitions(registry: &Registry) -> Vec<ToolDefinition> {
    ToolName::ALL
        .iter()
        .map(|&tool| ToolDefinition {
            name: tool.as_str(),
            description: description(tool),
            input_schema: input_schema(tool, registry),
        })
        .collect()
}

fn description(tool: ToolName) -> &'static str {
    match tool {
        ToolName::GenerateMarkdownPoster => {
            "Generate a visual poster image from Markdown content with customizable themes and templates"
        }
        ToolName::ListThemes => "Get a list of all available themes for markdown posters",
        ToolName::ListTemplates => "Get a list of all available templates for markdown posters",
        ToolName::PreviewMarkdown => {
            "Preview markdown content as HTML before generating the poster image"
        }
        ToolName::ConvertBase64ToImage => {
            "Convert Base64 encoded image data to PNG or JPG format"
        }
    }
}

fn input_schema(tool: ToolName, registry: &Registry) -> Value {
    let themes = registry.ids(DefinitionKind::Theme);
    let templates = registry.ids(DefinitionKind::Template);

    match tool {
        ToolName::GenerateMarkdownPoster => json!({
            "type": "object",
            "properties": {
                "markdown": {
                    "type": "string",
                    "description": "The Markdown content to render as a poster",
                    "maxLength": MAX_MARKDOWN_CHARS,
                },
                "theme": {
                    "type": "string",
                    "description": "The theme to apply to the poster",
                    "enum": themes,
                    "default": DEFAULT_THEME,
                },
                "template": {
                    "type": "string",
                    "description": "The template layout to use",
                    "enum": templates,
                    "default": DEFAULT_TEMPLATE,
                },
                "aspectRatio": {
                    "type": "string",
                    "description": "The aspect ratio of the generated image",
                    "enum": AspectRatio::names(),
                    "default": DEFAULT_ASPECT_RATIO.as_str(),
                },
                "size": {
                    "type": "string",
                    "description": "The size preset for the poster",
                    "enum": PosterSize::names(),
                    "default": DEFAULT_SIZE.as_str(),
                },
                "format": {
                    "type": "string",
                    "description": "The output image format",
                    "enum": ImageFormat::names(),
                    "default": DEFAULT_FORMAT.as_str(),
                },
                "quality": {
                    "type": "integer",
                    "description": "Image quality (1-100, only applies to JPEG format)",
                    "minimum": QUALITY_RANGE.start(),
                    "maximum": QUALITY_RANGE.end(),
                    "default": DEFAULT_QUALITY,
                },
                "width": {
                    "type": "integer",
                    "description": "Custom width in pixels",
                    "minimum": DIMENSION_RANGE.start(),
                    "maximum": DIMENSION_RANGE.end(),
                    "default": DEFAULT_WIDTH,
                },
                "height": {
                    "type": "integer",
                    "description": "Custom height in pixels",
                    "minimum": DIMENSION_RANGE.start(),
                    "maximum": DIMENSION_RANGE.end(),
                    "default": DEFAULT_HEIGHT,
                },
                "outputPath": {
                    "type": "string",
                    "description": "Write the image to this path instead of returning it inline. An empty string writes to a generated file in the temp directory",
                },
            },
            "required": ["markdown"],
        }),
        ToolName::ListThemes | ToolName::ListTemplates => json!({
            "type": "object",
            "properties": {},
        }),
        ToolName::PreviewMarkdown => json!({
            "type": "object",
            "properties": {
                "markdown": {
                    "type": "string",
                    "description": "The Markdown content to preview",
                },
                "theme": {
                    "type": "string",
                    "description": "The theme to apply to the preview",
                    "enum": themes,
                    "default": DEFAULT_THEME,
                },
                "template": {
                    "type": "string",
                    "description": "The template layout to use for preview",
                    "enum": templates,
                    "default": DEFAULT_TEMPLATE,
                },
            },
            "required": ["markdown"],
        }),
        ToolName::ConvertBase64ToImage => json!({
            "type": "object",
            "properties": {
                "base64Data": {
                    "type": "string",
                    "description": "Base64 encoded image data",
                },
                "format": {
                    "type": "string",
                    "description": "Output image format",
                    "enum": ImageFormat::names(),
                    "default": DEFAULT_FORMAT.as_str(),
                },
                "quality": {
                    "type": "integer",
                    "description": "Image quality for JPEG format (1-100)",
                    "minimum": QUALITY_RANGE.start(),
                    "maximum": QUALITY_RANGE.end(),
                    "default": DEFAULT_QUALITY,
                },
            },
            "required": ["base64Data"],
        }),
    }
}

/// A single text content entry plus the in-band error flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutput {
    fn json(value: &impl Serialize, is_error: bool) -> Self {
        match serde_json::to_string_pretty(value) {
            Ok(text) => Self { text, is_error },
            Err(e) => Self::error(format!("failed to serialize tool result: {e}")),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            text: json!({ "error": message.into() }).to_string(),
            is_error: true,
        }
    }
}

pub struct ToolDispatcher {
    generator: Arc<PosterGenerator>,
}

impl ToolDispatcher {
    pub fn new(generator: Arc<PosterGenerator>) -> Self {
        Self { generator }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        tool_definitions(self.generator.registry())
    }

    /// Only an unknown tool name is an `Err`; every other failure is returned
    /// in-band with `is_error` set.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<ToolOutput> {
        let tool =
            ToolName::parse(name).ok_or_else(|| PosterError::UnknownTool(name.to_string()))?;
        tracing::info!("Calling tool {}", tool.as_str());

        let arguments = match arguments {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let registry = self.generator.registry();

        let output = match tool {
            ToolName::GenerateMarkdownPoster => {
                let result = match serde_json::from_value::<GenerateArgs>(arguments) {
                    Ok(args) => self.generator.generate(args.into()).await,
                    Err(e) => GenerationResult::Failure {
                        error: PosterError::from(e).to_string(),
                    },
                };
                ToolOutput::json(&result, !result.is_success())
            }
            ToolName::ListThemes => ToolOutput::json(&registry.themes(), false),
            ToolName::ListTemplates => ToolOutput::json(&registry.templates(), false),
            ToolName::PreviewMarkdown => {
                let html = serde_json::from_value::<PreviewArgs>(arguments)
                    .map_err(PosterError::from)
                    .and_then(|args| self.generator.preview(args));
                match html {
                    Ok(html) => ToolOutput::json(&json!({ "html": html }), false),
                    Err(e) => {
                        tracing::error!("Markdown preview failed: {}", e);
                        ToolOutput::error(e.to_string())
                    }
                }
            }
            ToolName::ConvertBase64ToImage => {
                let result = match serde_json::from_value::<ConvertArgs>(arguments) {
                    Ok(args) => self.generator.convert_base64(args).await,
                    Err(e) => ConversionResult::Failure {
                        error: PosterError::from(e).to_string(),
                    },
                };
                let is_error = matches!(result, ConversionResult::Failure { .. });
                ToolOutput::json(&result, is_error)
            }
        };
        Ok(output)
    }
}
