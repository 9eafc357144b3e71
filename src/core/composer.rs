use chrono::{NaiveDate, Utc};
use comrak::{Arena, Options, format_html, parse_document};
use lol_html::{RewriteStrSettings, element, rewrite_str};
use url::Url;

use crate::core::registry::{
    AspectRatio, DefinitionKind, PosterSize, Registry, TemplateDefinition, ThemeDefinition,
};
use crate::core::validator::unknown_member;
use crate::error::{PosterError, Result, ValidationError};

pub const DEFAULT_IMAGE_PROXY: &str = "https://api.allorigins.win/raw";
pub const DEFAULT_FOOTER_TEXT: &str = "Powered by Markdown Poster";
const TAILWIND_CDN: &str = "https://cdn.tailwindcss.com";

const CONTENT_CLASS: &str =
    "flex flex-col bg-white px-4 sm:px-8 py-8 rounded-2xl border shadow-2xl shadow-gray-950/50";
const ARTICLE_CLASS: &str = "prose prose-gray prose-img:rounded-lg prose-img:border prose-img:opacity-100";
const HEADER_BASE_CLASS: &str = "text-white";
const FOOTER_BASE_CLASS: &str = "text-gray-50";

/// The parameters the composer needs from a generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub markdown: String,
    pub theme: String,
    pub template: String,
    pub aspect_ratio: AspectRatio,
    pub size: PosterSize,
}

#[derive(Debug, Clone)]
pub struct ComposerConfig {
    /// Endpoint every markdown image URL is routed through; `None` leaves URLs untouched.
    pub image_proxy: Option<Url>,
    pub footer_text: String,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            image_proxy: Url::parse(DEFAULT_IMAGE_PROXY).ok(),
            footer_text: DEFAULT_FOOTER_TEXT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub class: String,
    pub html: String,
}

/// A composed poster: three regions inside a themed root, plus the
/// stylesheet additions its theme and template contribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosterDocument {
    pub root_class: String,
    pub header: Region,
    pub content: Region,
    pub footer: Region,
    pub extra_styles: Vec<String>,
}

pub struct Composer<'r> {
    registry: &'r Registry,
    config: ComposerConfig,
    markdown_options: Options<'static>,
}

impl<'r> Composer<'r> {
    pub fn new(registry: &'r Registry, config: ComposerConfig) -> Self {
        Self {
            registry,
            config,
            markdown_options: markdown_options(),
        }
    }

    pub fn compose(&self, options: &RenderOptions) -> Result<PosterDocument> {
        self.compose_on(options, Utc::now().date_naive())
    }

    /// Composes with a fixed header date.
    pub fn compose_on(&self, options: &RenderOptions, date: NaiveDate) -> Result<PosterDocument> {
        let theme = self.theme(&options.theme)?;
        let template = self.template(&options.template)?;
        let layout = &template.layout;

        let root_class = join_classes(&[
            "w-full relative",
            &theme.class_name,
            options.aspect_ratio.class_name(),
            layout.size_class(options.size),
        ]);

        let header = Region {
            class: join_classes(&[HEADER_BASE_CLASS, &layout.header_class]),
            html: format!("<span>{}</span>", date.format("%Y-%m-%d")),
        };

        let content = Region {
            class: CONTENT_CLASS.to_string(),
            html: format!(
                r#"<article class="{}">{}</article>"#,
                ARTICLE_CLASS,
                self.render_markdown(&options.markdown)?
            ),
        };

        let footer = Region {
            class: join_classes(&[FOOTER_BASE_CLASS, &layout.footer_class]),
            html: escape_html(&self.config.footer_text),
        };

        let extra_styles = theme
            .stylesheet
            .iter()
            .chain(layout.stylesheet.iter())
            .cloned()
            .collect();

        Ok(PosterDocument {
            root_class,
            header,
            content,
            footer,
            extra_styles,
        })
    }

    fn theme(&self, id: &str) -> Result<&'r ThemeDefinition> {
        self.registry
            .theme(id)
            .ok_or_else(|| unknown_member(self.registry, DefinitionKind::Theme, id).into())
    }

    fn template(&self, id: &str) -> Result<&'r TemplateDefinition> {
        self.registry
            .template(id)
            .ok_or_else(|| unknown_member(self.registry, DefinitionKind::Template, id).into())
    }

    fn render_markdown(&self, markdown: &str) -> Result<String> {
        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &self.markdown_options);

        let mut html = String::new();
        format_html(root, &self.markdown_options, &mut html).map_err(|err| {
            markdown_error(format!("Markdown rendering failed: {err}"))
        })?;

        match &self.config.image_proxy {
            Some(proxy) => proxy_images(&html, proxy),
            None => Ok(html),
        }
    }
}

/// Routes every `<img src>` in the rendered fragment through the proxy,
/// including images written as raw HTML inside the markdown.
fn proxy_images(html: &str, proxy: &Url) -> Result<String> {
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("img[src]", |el| {
                if let Some(src) = el.get_attribute("src") {
                    let src = decode_attribute(src.trim());
                    if !src.is_empty() {
                        el.set_attribute("src", &proxied_image_url(proxy, &src))?;
                    }
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| markdown_error(format!("Image rewriting failed: {err}")))
}

fn markdown_error(message: String) -> PosterError {
    PosterError::Validation(ValidationError::new("markdown", message))
}

// Attribute values come back as written; undo the escapes the HTML renderer emits.
fn decode_attribute(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

impl PosterDocument {
    /// Serializes to a self-contained page. The only external references are
    /// the utility-CSS script and proxied images.
    pub fn to_html(&self) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Markdown Poster</title>
    <script src="{}"></script>
    <style>
{}
{}
    </style>
</head>
<body>
    <div id="root">
        <div class="markdown-to-image-root">
            <div class="{}">
                <div class="{}">{}</div>
                <div class="{}">{}</div>
                <div class="{}">{}</div>
            </div>
        </div>
    </div>
</body>
</html>"#,
            TAILWIND_CDN,
            BASE_STYLES,
            self.extra_styles.join("\n"),
            self.root_class,
            self.header.class,
            self.header.html,
            self.content.class,
            self.content.html,
            self.footer.class,
            self.footer.html,
        )
    }
}

const BASE_STYLES: &str = r#"
        body { margin: 0; padding: 2rem; background-color: #f3f4f6; font-family: system-ui, -apple-system, sans-serif; }
        .markdown-to-image-root { display: flex; justify-content: center; align-items: center; min-height: calc(100vh - 4rem); }
        .prose { max-width: none; }
        .prose h1 { font-size: 2rem; font-weight: bold; margin-bottom: 1rem; color: #1f2937; }
        .prose h2 { font-size: 1.5rem; font-weight: bold; margin-bottom: 0.75rem; color: #374151; }
        .prose h3 { font-size: 1.25rem; font-weight: bold; margin-bottom: 0.5rem; color: #4b5563; }
        .prose p { margin-bottom: 1rem; line-height: 1.6; color: #6b7280; }
        .prose ul, .prose ol { margin-bottom: 1rem; padding-left: 1.5rem; }
        .prose li { margin-bottom: 0.5rem; color: #6b7280; }
        .prose img { max-width: 100%; height: auto; border-radius: 0.5rem; margin: 1rem 0; }
        .prose code { background-color: rgba(0,0,0,0.1); padding: 0.2rem 0.4rem; border-radius: 0.25rem; font-family: monospace; }
        .prose pre { background-color: rgba(0,0,0,0.1); padding: 1rem; border-radius: 0.5rem; overflow-x: auto; margin: 1rem 0; }
        .prose a { color: #3b82f6; text-decoration: underline; }
        .prose strong { font-weight: bold; }
        .prose em { font-style: italic; }
        @media (max-width: 640px) { body { padding: 1rem; } }"#;

fn markdown_options() -> Options<'static> {
    let mut options = Options::default();
    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.tagfilter = false;

    let render = &mut options.render;
    render.github_pre_lang = true;
    render.r#unsafe = true;
    options
}

/// `<proxy>?url=<percent-encoded src>`, keeping any query the proxy already carries.
pub fn proxied_image_url(proxy: &Url, src: &str) -> String {
    let mut url = proxy.clone();
    url.query_pairs_mut().append_pair("url", src);
    url.to_string()
}

fn join_classes(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::REGISTRY;

    fn options(markdown: &str) -> RenderOptions {
        RenderOptions {
            markdown: markdown.to_string(),
            theme: "blue".to_string(),
            template: "QuoteCard".to_string(),
            aspect_ratio: AspectRatio::Auto,
            size: PosterSize::Mobile,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn composes_three_regions_with_theme_and_size_classes() {
        let composer = Composer::new(&REGISTRY, ComposerConfig::default());
        let doc = composer.compose_on(&options("# Title\n\nBody"), date()).unwrap();

        assert!(doc.root_class.contains("from-blue-500"));
        assert!(doc.root_class.contains("aspect-auto"));
        assert!(doc.root_class.contains("max-w-lg p-6"));
        assert_eq!(doc.header.html, "<span>2024-03-09</span>");
        assert!(doc.content.html.contains("<h1>Title</h1>"));
        assert!(doc.content.html.contains("<p>Body</p>"));
        assert_eq!(doc.footer.class, "text-gray-50 py-4 text-center");
        assert_eq!(doc.footer.html, DEFAULT_FOOTER_TEXT);
    }

    #[test]
    fn template_selects_layout_preset() {
        let composer = Composer::new(&REGISTRY, ComposerConfig::default());
        let mut opts = options("text");
        opts.template = "NewsDigest".to_string();
        opts.size = PosterSize::Desktop;
        opts.aspect_ratio = AspectRatio::Widescreen;
        let doc = composer.compose_on(&opts, date()).unwrap();

        assert!(doc.root_class.contains("max-w-4xl p-8"));
        assert!(doc.root_class.contains("aspect-video"));
        for class in [&doc.header.class, &doc.footer.class] {
            let tokens: Vec<_> = class.split_whitespace().collect();
            assert!(tokens.contains(&"text-left") && tokens.contains(&"py-2"), "{class}");
            assert!(!tokens.contains(&"text-center") && !tokens.contains(&"py-4"), "{class}");
        }
        assert!(doc.header.class.contains("news-digest-header"));
        assert!(doc.footer.class.contains("news-digest-footer"));
        assert!(doc.extra_styles.iter().any(|s| s.contains(".news-digest-footer")));
    }

    #[test]
    fn theme_stylesheet_is_carried_into_document() {
        let composer = Composer::new(&REGISTRY, ComposerConfig::default());
        let mut opts = options("text");
        opts.theme = "SpringGradientWave".to_string();
        let html = composer.compose_on(&opts, date()).unwrap().to_html();
        assert!(html.contains(".bg-spring-gradient-wave {"));
        assert!(html.contains(r#"class="w-full relative bg-spring-gradient-wave bg-cover"#));
    }

    #[test]
    fn image_urls_are_routed_through_proxy() {
        let composer = Composer::new(&REGISTRY, ComposerConfig::default());
        let doc = composer
            .compose_on(&options("![cat](https://example.com/cat.png?x=1&y=2)"), date())
            .unwrap();
        assert!(doc.content.html.contains(
            "https://api.allorigins.win/raw?url=https%3A%2F%2Fexample.com%2Fcat.png%3Fx%3D1%26y%3D2"
        ));
        assert!(doc.content.html.contains(r#"alt="cat""#));
    }

    #[test]
    fn raw_html_images_are_routed_through_proxy() {
        let composer = Composer::new(&REGISTRY, ComposerConfig::default());
        let md = "Inline <img src=\"https://example.com/raw.png\" alt=\"raw\"> image\n\n<div><img src='https://example.com/block.png?a=1&amp;b=2'></div>";
        let html = composer.compose_on(&options(md), date()).unwrap().content.html;

        assert!(html.contains("https://api.allorigins.win/raw?url=https%3A%2F%2Fexample.com%2Fraw.png"), "{html}");
        assert!(html.contains(
            "https://api.allorigins.win/raw?url=https%3A%2F%2Fexample.com%2Fblock.png%3Fa%3D1%26b%3D2"
        ), "{html}");
        assert!(!html.contains(r#"src="https://example.com/"#), "{html}");
        assert!(!html.contains("src='https://example.com/"), "{html}");
        assert!(html.contains(r#"alt="raw""#));
    }

    #[test]
    fn proxy_can_be_disabled() {
        let config = ComposerConfig {
            image_proxy: None,
            ..ComposerConfig::default()
        };
        let composer = Composer::new(&REGISTRY, config);
        let doc = composer
            .compose_on(&options("![cat](https://example.com/cat.png)"), date())
            .unwrap();
        assert!(doc.content.html.contains(r#"src="https://example.com/cat.png""#));
    }

    #[test]
    fn markdown_constructs_are_rendered() {
        let composer = Composer::new(&REGISTRY, ComposerConfig::default());
        let md = "## Sub\n\n*em* **strong** `code`\n\n- one\n- two\n\n1. first\n\n[link](https://x.dev)\n\n```rust\nfn main() {}\n```\n\n~~gone~~";
        let html = composer.compose_on(&options(md), date()).unwrap().content.html;
        for needle in [
            "<h2>Sub</h2>",
            "<em>em</em>",
            "<strong>strong</strong>",
            "<code>code</code>",
            "<ul>",
            "<ol>",
            r#"<a href="https://x.dev">link</a>"#,
            r#"<pre lang="rust">"#,
            "<del>gone</del>",
        ] {
            assert!(html.contains(needle), "missing {needle} in {html}");
        }
    }

    #[test]
    fn unknown_theme_is_a_validation_error() {
        let composer = Composer::new(&REGISTRY, ComposerConfig::default());
        let mut opts = options("x");
        opts.theme = "neon".to_string();
        let err = composer.compose_on(&opts, date()).unwrap_err();
        assert!(matches!(err, PosterError::Validation(ref v) if v.field == "theme"));
    }

    #[test]
    fn footer_text_is_escaped() {
        let config = ComposerConfig {
            footer_text: "<b>me</b> & co".to_string(),
            ..ComposerConfig::default()
        };
        let composer = Composer::new(&REGISTRY, config);
        let doc = composer.compose_on(&options("x"), date()).unwrap();
        assert_eq!(doc.footer.html, "&lt;b&gt;me&lt;/b&gt; &amp; co");
    }

    #[test]
    fn full_document_is_self_contained() {
        let composer = Composer::new(&REGISTRY, ComposerConfig::default());
        let html = composer.compose_on(&options("# T"), date()).unwrap().to_html();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains(TAILWIND_CDN));
        assert!(html.contains(".prose h1"));
        assert!(html.contains("<h1>T</h1>"));
        assert!(html.trim_end().ends_with("</html>"));
    }
}
