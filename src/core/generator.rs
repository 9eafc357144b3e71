use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize, Serializer};
use std::sync::Arc;

use crate::core::composer::{Composer, ComposerConfig};
use crate::core::output::{Destination, OutputEncoder, PosterOutput};
use crate::core::postprocess::{Conversion, decode_base64_image, process};
use crate::core::rasterizer::{CaptureRequest, Rasterizer};
use crate::core::registry::{ClosedSet, ImageFormat, Registry};
use crate::core::validator::{
    DEFAULT_FORMAT, DEFAULT_QUALITY, GenerationRequest, QUALITY_RANGE, validate,
};
use crate::error::{Result, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub size: usize,
}

impl ImageMetadata {
    fn unknown() -> Self {
        Self {
            width: 0,
            height: 0,
            format: "unknown".to_string(),
            size: 0,
        }
    }
}

/// Outcome of `generateMarkdownPoster`. Serializes to the flat
/// `{success, imageData|imagePath, metadata, error}` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    Success {
        output: PosterOutput,
        metadata: ImageMetadata,
    },
    Failure {
        error: String,
    },
}

impl GenerationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Serialize)]
struct GenerationEnvelope<'a> {
    success: bool,
    #[serde(flatten)]
    output: Option<&'a PosterOutput>,
    metadata: ImageMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl Serialize for GenerationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let envelope = match self {
            Self::Success { output, metadata } => GenerationEnvelope {
                success: true,
                output: Some(output),
                metadata: metadata.clone(),
                error: None,
            },
            Self::Failure { error } => GenerationEnvelope {
                success: false,
                output: None,
                metadata: ImageMetadata::unknown(),
                error: Some(error),
            },
        };
        envelope.serialize(serializer)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewArgs {
    #[serde(default)]
    pub markdown: String,
    pub theme: Option<String>,
    pub template: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertArgs {
    #[serde(default)]
    pub base64_data: String,
    pub format: Option<String>,
    pub quality: Option<i64>,
}

/// Outcome of `convertBase64ToImage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionResult {
    Success {
        image_data: String,
        format: ImageFormat,
        size: usize,
    },
    Failure {
        error: String,
    },
}

#[derive(Serialize)]
struct ConversionMetadata<'a> {
    format: &'a str,
    size: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConversionEnvelope<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_data: Option<&'a str>,
    metadata: ConversionMetadata<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl Serialize for ConversionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let envelope = match self {
            Self::Success {
                image_data,
                format,
                size,
            } => ConversionEnvelope {
                success: true,
                image_data: Some(image_data),
                metadata: ConversionMetadata {
                    format: format.as_str(),
                    size: *size,
                },
                error: None,
            },
            Self::Failure { error } => ConversionEnvelope {
                success: false,
                image_data: None,
                metadata: ConversionMetadata { format: "", size: 0 },
                error: Some(error),
            },
        };
        envelope.serialize(serializer)
    }
}

/// Runs the validate, compose, rasterize, post-process, encode pipeline.
pub struct PosterGenerator {
    registry: &'static Registry,
    composer: Composer<'static>,
    rasterizer: Arc<Rasterizer>,
    output: OutputEncoder,
}

impl PosterGenerator {
    pub fn new(
        registry: &'static Registry,
        composer_config: ComposerConfig,
        rasterizer: Arc<Rasterizer>,
        output: OutputEncoder,
    ) -> Self {
        Self {
            registry,
            composer: Composer::new(registry, composer_config),
            rasterizer,
            output,
        }
    }

    pub fn registry(&self) -> &'static Registry {
        self.registry
    }

    pub fn rasterizer(&self) -> &Arc<Rasterizer> {
        &self.rasterizer
    }

    pub async fn generate(&self, request: GenerationRequest) -> GenerationResult {
        match self.try_generate(request).await {
            Ok((output, metadata)) => GenerationResult::Success { output, metadata },
            Err(e) => {
                tracing::error!("Poster generation failed: {}", e);
                GenerationResult::Failure {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn try_generate(
        &self,
        request: GenerationRequest,
    ) -> Result<(PosterOutput, ImageMetadata)> {
        let validated = validate(&request, self.registry)?;
        tracing::info!(
            "Generating poster: theme={}, template={}, {}x{} {}",
            validated.theme,
            validated.template,
            validated.width,
            validated.height,
            validated.format
        );

        self.rasterizer.initialize().await?;

        let html = self.composer.compose(&validated.render_options())?.to_html();
        let bitmap = self
            .rasterizer
            .rasterize(
                html,
                CaptureRequest {
                    width: validated.width,
                    height: validated.height,
                    format: validated.format,
                    quality: validated.quality,
                },
            )
            .await?;

        // The capture already carries the requested quality.
        let conversion = Conversion {
            format: validated.format,
            quality: None,
        };
        let processed =
            tokio::task::spawn_blocking(move || process(&bitmap, conversion)).await??;

        let destination = Destination::from_output_path(validated.output_path.clone());
        let output = self
            .output
            .encode(&processed.bytes, processed.format, &destination)
            .await?;

        let metadata = ImageMetadata {
            width: validated.width,
            height: validated.height,
            format: validated.format.as_str().to_string(),
            size: processed.bytes.len(),
        };
        Ok((output, metadata))
    }

    /// Composes the HTML document without rasterizing it.
    pub fn preview(&self, args: PreviewArgs) -> Result<String> {
        let mut request = GenerationRequest::with_markdown(args.markdown);
        if let Some(theme) = args.theme {
            request.theme = theme;
        }
        if let Some(template) = args.template {
            request.template = template;
        }

        let validated = validate(&request, self.registry)?;
        Ok(self.composer.compose(&validated.render_options())?.to_html())
    }

    pub async fn convert_base64(&self, args: ConvertArgs) -> ConversionResult {
        match convert(args).await {
            Ok((bytes, format)) => ConversionResult::Success {
                size: bytes.len(),
                image_data: general_purpose::STANDARD.encode(&bytes),
                format,
            },
            Err(e) => {
                tracing::error!("Base64 conversion failed: {}", e);
                ConversionResult::Failure {
                    error: e.to_string(),
                }
            }
        }
    }
}

async fn convert(args: ConvertArgs) -> Result<(Vec<u8>, ImageFormat)> {
    let format = match args.format.as_deref() {
        None => DEFAULT_FORMAT,
        Some(value) => ImageFormat::parse(value).ok_or_else(|| {
            ValidationError::new(
                "format",
                format!(
                    "Invalid format '{value}'. Valid formats: {}",
                    ImageFormat::names().join(", ")
                ),
            )
        })?,
    };

    let quality = args.quality.unwrap_or(DEFAULT_QUALITY);
    let quality = if format.is_lossy() {
        if !QUALITY_RANGE.contains(&quality) {
            return Err(ValidationError::new(
                "quality",
                format!(
                    "Quality must be between {} and {} for {} format, got {}",
                    QUALITY_RANGE.start(),
                    QUALITY_RANGE.end(),
                    format,
                    quality
                ),
            )
            .into());
        }
        Some(quality as u8)
    } else {
        None
    };

    let data = args.base64_data;
    let processed = tokio::task::spawn_blocking(move || -> Result<_> {
        let bytes = decode_base64_image(&data)?;
        process(&bytes, Conversion { format, quality })
    })
    .await??;

    Ok((processed.bytes, processed.format))
}
