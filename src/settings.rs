use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::core::composer::{ComposerConfig, DEFAULT_FOOTER_TEXT, DEFAULT_IMAGE_PROXY};
use crate::core::output::{OUTPUT_SUBDIRECTORY, OutputEncoder};
use crate::core::rasterizer::{DEFAULT_SETTLE_TIMEOUT, RasterizerConfig};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    #[serde(default = "default_env")]
    pub env: String, // file / server
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub prefix: Option<String>,
    /// `none` turns the proxy off.
    #[serde(default = "default_image_proxy")]
    pub image_proxy: String,
    pub output_dir: Option<PathBuf>,
    #[serde(default = "default_settle_timeout_ms")]
    pub settle_timeout_ms: u64,
    pub chrome_path: Option<PathBuf>,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_footer_text")]
    pub footer_text: String,
}

fn default_env() -> String {
    "file".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_image_proxy() -> String {
    DEFAULT_IMAGE_PROXY.to_string()
}

fn default_settle_timeout_ms() -> u64 {
    DEFAULT_SETTLE_TIMEOUT.as_millis() as u64
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_footer_text() -> String {
    DEFAULT_FOOTER_TEXT.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env: default_env(),
            host: default_host(),
            port: default_port(),
            prefix: None,
            image_proxy: default_image_proxy(),
            output_dir: None,
            settle_timeout_ms: default_settle_timeout_ms(),
            chrome_path: None,
            log_dir: default_log_dir(),
            footer_text: default_footer_text(),
        }
    }
}

impl Config {
    pub fn composer_config(&self) -> Result<ComposerConfig> {
        let image_proxy = match self.image_proxy.trim() {
            "" | "none" => None,
            proxy => Some(
                Url::parse(proxy).with_context(|| format!("invalid IMAGE_PROXY '{proxy}'"))?,
            ),
        };
        Ok(ComposerConfig {
            image_proxy,
            footer_text: self.footer_text.clone(),
        })
    }

    pub fn rasterizer_config(&self) -> RasterizerConfig {
        RasterizerConfig {
            settle_timeout: Duration::from_millis(self.settle_timeout_ms),
            ..Default::default()
        }
    }

    pub fn output_encoder(&self) -> OutputEncoder {
        match &self.output_dir {
            Some(dir) => OutputEncoder::new(dir.join(OUTPUT_SUBDIRECTORY)),
            None => OutputEncoder::default(),
        }
    }
}

pub fn get_config() -> Result<Config> {
    let env_var = env::var("env").unwrap_or("file".to_string());
    if env_var == "file" {
        info!("using .env file as environtment variable");
        let _ = dotenvy::dotenv();
    } else {
        info!("using server environtment as environtment variable");
    }
    envy::from_env::<Config>().context("failed to read configuration from environment")
}
