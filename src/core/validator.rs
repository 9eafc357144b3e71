use std::ops::RangeInclusive;
use std::path::PathBuf;

use serde::Deserialize;

use crate::core::composer::RenderOptions;
use crate::core::registry::{
    AspectRatio, ClosedSet, DefinitionKind, ImageFormat, PosterSize, Registry,
};
use crate::error::ValidationError;

pub const MAX_MARKDOWN_CHARS: usize = 50_000;
pub const DIMENSION_RANGE: RangeInclusive<i64> = 100..=4000;
pub const QUALITY_RANGE: RangeInclusive<i64> = 1..=100;

pub const DEFAULT_THEME: &str = "blue";
pub const DEFAULT_TEMPLATE: &str = "QuoteCard";
pub const DEFAULT_ASPECT_RATIO: AspectRatio = AspectRatio::Auto;
pub const DEFAULT_SIZE: PosterSize = PosterSize::Mobile;
pub const DEFAULT_FORMAT: ImageFormat = ImageFormat::Png;
pub const DEFAULT_QUALITY: i64 = 90;
pub const DEFAULT_WIDTH: i64 = 800;
pub const DEFAULT_HEIGHT: i64 = 600;

/// Raw `generateMarkdownPoster` arguments. Absent fields take the documented
/// defaults in [`GenerationRequest::from`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateArgs {
    #[serde(default)]
    pub markdown: String,
    pub theme: Option<String>,
    pub template: Option<String>,
    pub aspect_ratio: Option<String>,
    pub size: Option<String>,
    pub format: Option<String>,
    pub quality: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub output_path: Option<PathBuf>,
}

/// A generation request with defaults applied but nothing checked yet.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub markdown: String,
    pub theme: String,
    pub template: String,
    pub aspect_ratio: String,
    pub size: String,
    pub format: String,
    pub quality: i64,
    pub width: i64,
    pub height: i64,
    pub output_path: Option<PathBuf>,
}

impl From<GenerateArgs> for GenerationRequest {
    fn from(args: GenerateArgs) -> Self {
        Self {
            markdown: args.markdown,
            theme: args.theme.unwrap_or_else(|| DEFAULT_THEME.to_string()),
            template: args.template.unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
            aspect_ratio: args
                .aspect_ratio
                .unwrap_or_else(|| DEFAULT_ASPECT_RATIO.as_str().to_string()),
            size: args.size.unwrap_or_else(|| DEFAULT_SIZE.as_str().to_string()),
            format: args.format.unwrap_or_else(|| DEFAULT_FORMAT.as_str().to_string()),
            quality: args.quality.unwrap_or(DEFAULT_QUALITY),
            width: args.width.unwrap_or(DEFAULT_WIDTH),
            height: args.height.unwrap_or(DEFAULT_HEIGHT),
            output_path: args.output_path,
        }
    }
}

impl GenerationRequest {
    pub fn with_markdown(markdown: impl Into<String>) -> Self {
        GenerateArgs {
            markdown: markdown.into(),
            ..Default::default()
        }
        .into()
    }
}

/// A request that passed every check, with closed-set values resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub markdown: String,
    pub theme: String,
    pub template: String,
    pub aspect_ratio: AspectRatio,
    pub size: PosterSize,
    pub format: ImageFormat,
    /// Present only for lossy formats.
    pub quality: Option<u8>,
    pub width: u32,
    pub height: u32,
    pub output_path: Option<PathBuf>,
}

impl ValidatedRequest {
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            markdown: self.markdown.clone(),
            theme: self.theme.clone(),
            template: self.template.clone(),
            aspect_ratio: self.aspect_ratio,
            size: self.size,
        }
    }
}

/// Returns the first violated check.
pub fn validate(
    request: &GenerationRequest,
    registry: &Registry,
) -> Result<ValidatedRequest, ValidationError> {
    let mut errors = Vec::new();
    let validated = check(request, registry, &mut errors);
    match (validated, errors.into_iter().next()) {
        (Some(validated), None) => Ok(validated),
        (_, Some(first)) => Err(first),
        // check() only yields None after recording an error
        (None, None) => Err(ValidationError::new("request", "Invalid request")),
    }
}

/// Every violated check, in evaluation order.
pub fn validate_all(request: &GenerationRequest, registry: &Registry) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    check(request, registry, &mut errors);
    errors
}

fn check(
    request: &GenerationRequest,
    registry: &Registry,
    errors: &mut Vec<ValidationError>,
) -> Option<ValidatedRequest> {
    if request.markdown.is_empty() {
        errors.push(ValidationError::new(
            "markdown",
            "Markdown content is required and must be a non-empty string",
        ));
    } else if request.markdown.chars().count() > MAX_MARKDOWN_CHARS {
        errors.push(ValidationError::new(
            "markdown",
            format!("Markdown content is too large (max {MAX_MARKDOWN_CHARS} characters)"),
        ));
    }

    let format = closed_set::<ImageFormat>("format", "formats", &request.format, errors);

    let quality = match format {
        Some(format) if format.is_lossy() => {
            if QUALITY_RANGE.contains(&request.quality) {
                Some(request.quality as u8)
            } else {
                errors.push(ValidationError::new(
                    "quality",
                    format!(
                        "Quality must be between {} and {} for {} format, got {}",
                        QUALITY_RANGE.start(),
                        QUALITY_RANGE.end(),
                        format,
                        request.quality
                    ),
                ));
                None
            }
        }
        _ => None,
    };

    let width = dimension("width", "Width", request.width, errors);
    let height = dimension("height", "Height", request.height, errors);

    let theme_ok = member(registry, DefinitionKind::Theme, &request.theme, errors);
    let template_ok = member(registry, DefinitionKind::Template, &request.template, errors);

    let aspect_ratio = closed_set::<AspectRatio>(
        "aspectRatio",
        "aspect ratios",
        &request.aspect_ratio,
        errors,
    );
    let size = closed_set::<PosterSize>("size", "sizes", &request.size, errors);

    if !errors.is_empty() || !theme_ok || !template_ok {
        return None;
    }

    Some(ValidatedRequest {
        markdown: request.markdown.clone(),
        theme: request.theme.clone(),
        template: request.template.clone(),
        aspect_ratio: aspect_ratio?,
        size: size?,
        format: format?,
        quality,
        width: width?,
        height: height?,
        output_path: request.output_path.clone(),
    })
}

fn dimension(
    field: &'static str,
    label: &str,
    value: i64,
    errors: &mut Vec<ValidationError>,
) -> Option<u32> {
    if DIMENSION_RANGE.contains(&value) {
        Some(value as u32)
    } else {
        errors.push(ValidationError::new(
            field,
            format!(
                "{label} must be between {} and {} pixels, got {value}",
                DIMENSION_RANGE.start(),
                DIMENSION_RANGE.end()
            ),
        ));
        None
    }
}

fn member(
    registry: &Registry,
    kind: DefinitionKind,
    value: &str,
    errors: &mut Vec<ValidationError>,
) -> bool {
    if registry.is_valid(kind, value) {
        return true;
    }
    errors.push(unknown_member(registry, kind, value));
    false
}

/// Names the field after the definition kind and lists every registered id.
pub(crate) fn unknown_member(registry: &Registry, kind: DefinitionKind, value: &str) -> ValidationError {
    ValidationError::new(
        kind.label(),
        format!(
            "Invalid {} '{}'. Valid {}s: {}",
            kind.label(),
            value,
            kind.label(),
            registry.ids(kind).join(", ")
        ),
    )
}

fn closed_set<T: ClosedSet>(
    field: &'static str,
    plural: &str,
    value: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<T> {
    let parsed = T::parse(value);
    if parsed.is_none() {
        errors.push(ValidationError::new(
            field,
            format!(
                "Invalid {field} '{value}'. Valid {plural}: {}",
                T::names().join(", ")
            ),
        ));
    }
    parsed
}
