use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::error::{PosterError, Result};

/// A closed set of wire values. Validation messages and tool schemas are both
/// derived from `ALL`, so adding a variant needs no other change.
pub trait ClosedSet: Sized + Copy + 'static {
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;

    fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.as_str() == value)
    }

    fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|v| v.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AspectRatio {
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "16/9")]
    Widescreen,
    #[serde(rename = "1/1")]
    Square,
    #[serde(rename = "4/3")]
    Standard,
}

impl ClosedSet for AspectRatio {
    const ALL: &'static [Self] = &[Self::Auto, Self::Widescreen, Self::Square, Self::Standard];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Widescreen => "16/9",
            Self::Square => "1/1",
            Self::Standard => "4/3",
        }
    }

    // "16:9" is accepted as a spelling of "16/9"
    fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().replace(':', "/");
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == normalized)
    }
}

impl AspectRatio {
    pub fn class_name(self) -> &'static str {
        match self {
            Self::Auto => "aspect-auto",
            Self::Widescreen => "aspect-video",
            Self::Square => "aspect-square",
            Self::Standard => "aspect-[4/3]",
        }
    }
}

/// Poster width preset: `Mobile` is the compact layout, `Desktop` the expanded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PosterSize {
    Mobile,
    Desktop,
}

impl ClosedSet for PosterSize {
    const ALL: &'static [Self] = &[Self::Mobile, Self::Desktop];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Desktop => "desktop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ClosedSet for ImageFormat {
    const ALL: &'static [Self] = &[Self::Png, Self::Jpeg];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "png" => Some(Self::Png),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            _ => None,
        }
    }
}

impl ImageFormat {
    pub fn is_lossy(self) -> bool {
        matches!(self, Self::Jpeg)
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorScheme {
    pub primary: String,
    pub secondary: String,
    pub background: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub color_scheme: ColorScheme,
    /// Utility classes applied to the poster root.
    pub class_name: String,
    /// Rules backing a class that the utility framework does not provide.
    #[serde(skip)]
    pub stylesheet: Option<String>,
}

/// Per-template layout classes for the three poster regions. Header and
/// footer classes own alignment and padding; the composer only adds color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateLayout {
    pub header_class: String,
    pub footer_class: String,
    pub mobile_class: String,
    pub desktop_class: String,
    pub stylesheet: Option<String>,
}

impl TemplateLayout {
    pub fn size_class(&self, size: PosterSize) -> &str {
        match size {
            PosterSize::Mobile => &self.mobile_class,
            PosterSize::Desktop => &self.desktop_class,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub supported_aspect_ratios: Vec<AspectRatio>,
    #[serde(skip)]
    pub layout: TemplateLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
    Theme,
    Template,
}

impl DefinitionKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Theme => "theme",
            Self::Template => "template",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(untagged)]
pub enum Definition<'a> {
    Theme(&'a ThemeDefinition),
    Template(&'a TemplateDefinition),
}

impl Definition<'_> {
    pub fn id(&self) -> &str {
        match self {
            Self::Theme(theme) => &theme.id,
            Self::Template(template) => &template.id,
        }
    }
}

/// Insertion-ordered entries with an id index.
#[derive(Debug)]
struct Catalog<T> {
    entries: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Catalog<T> {
    fn build(entries: Vec<T>, kind: DefinitionKind, id_of: impl Fn(&T) -> &str) -> Result<Self> {
        let mut index = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            let id = id_of(entry);
            if index.insert(id.to_string(), position).is_some() {
                return Err(PosterError::Catalog(format!(
                    "duplicate {} id '{}'",
                    kind.label(),
                    id
                )));
            }
        }
        Ok(Self { entries, index })
    }

    fn get(&self, id: &str) -> Option<&T> {
        self.index.get(id).map(|&position| &self.entries[position])
    }
}

#[derive(Debug)]
pub struct Registry {
    themes: Catalog<ThemeDefinition>,
    templates: Catalog<TemplateDefinition>,
}

impl Registry {
    pub fn new(themes: Vec<ThemeDefinition>, templates: Vec<TemplateDefinition>) -> Result<Self> {
        if let Some(template) = templates.iter().find(|t| t.supported_aspect_ratios.is_empty()) {
            return Err(PosterError::Catalog(format!(
                "template '{}' supports no aspect ratio",
                template.id
            )));
        }

        Ok(Self {
            themes: Catalog::build(themes, DefinitionKind::Theme, |t| t.id.as_str())?,
            templates: Catalog::build(templates, DefinitionKind::Template, |t| t.id.as_str())?,
        })
    }

    pub fn builtin() -> Result<Self> {
        Self::new(builtin_themes(), builtin_templates())
    }

    pub fn theme(&self, id: &str) -> Option<&ThemeDefinition> {
        self.themes.get(id)
    }

    pub fn template(&self, id: &str) -> Option<&TemplateDefinition> {
        self.templates.get(id)
    }

    pub fn themes(&self) -> &[ThemeDefinition] {
        &self.themes.entries
    }

    pub fn templates(&self) -> &[TemplateDefinition] {
        &self.templates.entries
    }

    pub fn get(&self, kind: DefinitionKind, id: &str) -> Option<Definition<'_>> {
        match kind {
            DefinitionKind::Theme => self.theme(id).map(Definition::Theme),
            DefinitionKind::Template => self.template(id).map(Definition::Template),
        }
    }

    pub fn list(&self, kind: DefinitionKind) -> Vec<Definition<'_>> {
        match kind {
            DefinitionKind::Theme => self.themes().iter().map(Definition::Theme).collect(),
            DefinitionKind::Template => self.templates().iter().map(Definition::Template).collect(),
        }
    }

    pub fn is_valid(&self, kind: DefinitionKind, id: &str) -> bool {
        match kind {
            DefinitionKind::Theme => self.themes.index.contains_key(id),
            DefinitionKind::Template => self.templates.index.contains_key(id),
        }
    }

    pub fn ids(&self, kind: DefinitionKind) -> Vec<&str> {
        match kind {
            DefinitionKind::Theme => self.themes().iter().map(|t| t.id.as_str()).collect(),
            DefinitionKind::Template => self.templates().iter().map(|t| t.id.as_str()).collect(),
        }
    }
}

/// The process-wide catalog. Every surface reads this instance.
pub static REGISTRY: Lazy<Registry> =
    Lazy::new(|| Registry::builtin().expect("built-in catalog must be consistent"));

fn theme(
    id: &str,
    name: &str,
    description: &str,
    (primary, secondary, background): (&str, &str, &str),
    class_name: &str,
) -> ThemeDefinition {
    ThemeDefinition {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        color_scheme: ColorScheme {
            primary: primary.to_string(),
            secondary: secondary.to_string(),
            background: background.to_string(),
        },
        class_name: class_name.to_string(),
        stylesheet: None,
    }
}

pub fn builtin_themes() -> Vec<ThemeDefinition> {
    let mut spring = theme(
        "SpringGradientWave",
        "Spring Gradient Wave",
        "A dynamic spring-themed gradient with wave patterns",
        ("#667eea", "#764ba2", "linear-gradient(135deg, #667eea 0%, #764ba2 100%)"),
        "bg-spring-gradient-wave bg-cover",
    );
    spring.stylesheet = Some(
        ".bg-spring-gradient-wave { background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); }"
            .to_string(),
    );

    vec![
        theme(
            "blue",
            "Ocean Blue",
            "A calm blue gradient theme with ocean vibes",
            ("#3B82F6", "#06B6D4", "linear-gradient(to bottom right, #3B82F6, #06B6D4, #3B82F6)"),
            "bg-gradient-to-br from-blue-500 via-cyan-500 to-blue-500",
        ),
        theme(
            "pink",
            "Sunset Pink",
            "A warm pink gradient with sunset colors",
            ("#EC4899", "#F87171", "linear-gradient(to bottom right, #EC4899, #F87171, #EC4899)"),
            "bg-gradient-to-br from-pink-600/80 via-red-400/80 to-pink-600/60",
        ),
        theme(
            "purple",
            "Royal Purple",
            "An elegant purple theme with royal feel",
            ("#9333EA", "#A855F7", "linear-gradient(to right, #9333EA, #A855F7)"),
            "bg-gradient-to-r from-purple-600 to-purple-700",
        ),
        theme(
            "green",
            "Forest Green",
            "A natural green theme inspired by forests",
            ("#059669", "#047857", "linear-gradient(to bottom right, #059669, #047857)"),
            "bg-gradient-to-br from-green-600/80 to-green-800/80",
        ),
        theme(
            "yellow",
            "Golden Sun",
            "A bright yellow theme with sun-like warmth",
            ("#EAB308", "#FB923C", "linear-gradient(to bottom right, #EAB308, #FB923C, #EAB308)"),
            "bg-gradient-to-br from-yellow-500 via-orange-300 to-yellow-500",
        ),
        theme(
            "gray",
            "Elegant Gray",
            "A sophisticated monochrome theme",
            ("#374151", "#000000", "linear-gradient(to bottom right, #000000, #374151, #000000)"),
            "bg-gradient-to-br from-black/90 via-gray-700 to-black/90",
        ),
        theme(
            "red",
            "Fire Red",
            "A bold red theme with fiery energy",
            ("#EF4444", "#F97316", "linear-gradient(to right, #EF4444, #F97316)"),
            "bg-gradient-to-r from-red-500 to-orange-500",
        ),
        theme(
            "indigo",
            "Deep Indigo",
            "A deep indigo theme with mystical vibes",
            ("#4F46E5", "#2563EB", "linear-gradient(to bottom right, #4F46E5, #2563EB, #4F46E5)"),
            "bg-gradient-to-br from-indigo-700 via-blue-600/80 to-indigo-700",
        ),
        spring,
    ]
}

pub fn builtin_templates() -> Vec<TemplateDefinition> {
    vec![
        TemplateDefinition {
            id: "QuoteCard".to_string(),
            name: "Quote Card".to_string(),
            description: "A clean template suitable for quotes and short content".to_string(),
            supported_aspect_ratios: AspectRatio::ALL.to_vec(),
            layout: TemplateLayout {
                header_class: "py-4 text-center flex justify-center items-center px-4 font-medium text-lg"
                    .to_string(),
                footer_class: "py-4 text-center".to_string(),
                mobile_class: "max-w-lg p-6".to_string(),
                desktop_class: "max-w-4xl p-16".to_string(),
                stylesheet: None,
            },
        },
        TemplateDefinition {
            id: "NewsDigest".to_string(),
            name: "News Digest".to_string(),
            description: "A template designed for news articles and longer content".to_string(),
            supported_aspect_ratios: vec![
                AspectRatio::Auto,
                AspectRatio::Widescreen,
                AspectRatio::Standard,
            ],
            layout: TemplateLayout {
                header_class:
                    "news-digest-header py-2 text-left flex justify-start items-center px-4 font-medium text-lg"
                        .to_string(),
                footer_class: "news-digest-footer py-2 text-left text-sm".to_string(),
                mobile_class: "max-w-lg p-4".to_string(),
                desktop_class: "max-w-4xl p-8".to_string(),
                stylesheet: Some(
                    ".news-digest-header { text-align: left; padding: 0.5rem 0; }\n\
                     .news-digest-footer { text-align: left; font-size: 0.875rem; padding: 0.5rem 0; }"
                        .to_string(),
                ),
            },
        },
    ]
}
