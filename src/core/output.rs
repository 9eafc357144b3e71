use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::core::registry::ImageFormat;
use crate::error::{PosterError, Result};

pub const OUTPUT_SUBDIRECTORY: &str = "markdown-poster";

/// Where a generated image ended up. Exactly one of the two is ever produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PosterOutput {
    Inline {
        #[serde(rename = "imageData")]
        image_data: String,
    },
    File {
        #[serde(rename = "imagePath")]
        path: PathBuf,
    },
}

/// How the caller wants the image delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Inline,
    /// A generated unique file under the encoder's temp directory.
    TempFile,
    Path(PathBuf),
}

impl Destination {
    /// `outputPath` absent means inline, empty means a generated temp file.
    pub fn from_output_path(path: Option<PathBuf>) -> Self {
        match path {
            None => Self::Inline,
            Some(path) if path.as_os_str().is_empty() => Self::TempFile,
            Some(path) => Self::Path(path),
        }
    }
}

pub struct OutputEncoder {
    temp_dir: PathBuf,
}

impl Default for OutputEncoder {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join(OUTPUT_SUBDIRECTORY))
    }
}

impl OutputEncoder {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub async fn encode(
        &self,
        bytes: &[u8],
        format: ImageFormat,
        destination: &Destination,
    ) -> Result<PosterOutput> {
        let path = match destination {
            Destination::Inline => {
                return Ok(PosterOutput::Inline {
                    image_data: general_purpose::STANDARD.encode(bytes),
                });
            }
            Destination::TempFile => self.generated_path(format).await?,
            Destination::Path(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| PosterError::io(parent, e))?;
                }
                path.clone()
            }
        };

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PosterError::io(&path, e))?;
        tracing::info!("Wrote {} bytes to {}", bytes.len(), path.display());

        Ok(PosterOutput::File { path })
    }

    async fn generated_path(&self, format: ImageFormat) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(|e| PosterError::io(&self.temp_dir, e))?;

        let random = Uuid::new_v4().simple().to_string();
        let name = format!(
            "poster-{}-{}.{}",
            Utc::now().timestamp_millis(),
            &random[..8],
            format.extension()
        );
        Ok(self.temp_dir.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inline_mode_returns_base64() {
        let encoder = OutputEncoder::default();
        let out = encoder
            .encode(b"\x89PNG", ImageFormat::Png, &Destination::Inline)
            .await
            .unwrap();
        assert_eq!(
            out,
            PosterOutput::Inline {
                image_data: "iVBORw==".to_string()
            }
        );
    }

    #[tokio::test]
    async fn file_mode_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/deeper/poster.png");
        let encoder = OutputEncoder::new(dir.path().join("unused"));

        let out = encoder
            .encode(b"bytes", ImageFormat::Png, &Destination::Path(target.clone()))
            .await
            .unwrap();

        assert_eq!(out, PosterOutput::File { path: target.clone() });
        assert_eq!(std::fs::read(&target).unwrap(), b"bytes");
        assert!(!dir.path().join("unused").exists());
    }

    #[tokio::test]
    async fn temp_destination_generates_unique_files() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = OutputEncoder::new(dir.path().join(OUTPUT_SUBDIRECTORY));

        let mut paths = Vec::new();
        for _ in 0..3 {
            match encoder
                .encode(b"jpeg", ImageFormat::Jpeg, &Destination::TempFile)
                .await
                .unwrap()
            {
                PosterOutput::File { path } => paths.push(path),
                other => panic!("expected file output, got {other:?}"),
            }
        }

        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 3);
        for path in &paths {
            assert_eq!(path.parent(), Some(encoder.temp_dir()));
            let name = path.file_name().unwrap().to_str().unwrap();
            assert!(name.starts_with("poster-") && name.ends_with(".jpg"), "{name}");
        }
    }

    #[test]
    fn destination_follows_output_path() {
        assert_eq!(Destination::from_output_path(None), Destination::Inline);
        assert_eq!(
            Destination::from_output_path(Some(PathBuf::new())),
            Destination::TempFile
        );
        assert_eq!(
            Destination::from_output_path(Some(PathBuf::from("a/b.png"))),
            Destination::Path(PathBuf::from("a/b.png"))
        );
    }

    #[test]
    fn output_variants_serialize_with_kind_tag() {
        let inline = serde_json::to_value(PosterOutput::Inline {
            image_data: "AAAA".to_string(),
        })
        .unwrap();
        assert_eq!(inline, serde_json::json!({"kind": "inline", "imageData": "AAAA"}));

        let file = serde_json::to_value(PosterOutput::File {
            path: PathBuf::from("/tmp/p.png"),
        })
        .unwrap();
        assert_eq!(file, serde_json::json!({"kind": "file", "imagePath": "/tmp/p.png"}));
    }
}
