#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, Rgb, RgbImage};
use markdown_poster::core::composer::ComposerConfig;
use markdown_poster::core::generator::PosterGenerator;
use markdown_poster::core::output::OutputEncoder;
use markdown_poster::core::rasterizer::{
    EngineLauncher, Rasterizer, RasterizerConfig, RenderEngine, RenderSurface, Viewport,
};
use markdown_poster::core::registry::{ImageFormat, REGISTRY};
use markdown_poster::settings::Config;
use markdown_poster::{AppState, init_openapi_route};
use poem::middleware::{AddDataEndpoint, CorsEndpoint};
use poem::test::{TestClient, TestResponse};
use poem::Route;
use serde_json::Value;
use tempfile::TempDir;

/// Counters shared by the fake engine and every surface it opens.
#[derive(Default)]
pub struct EngineStats {
    pub launches: AtomicUsize,
    pub opened: AtomicUsize,
    pub released: AtomicUsize,
}

impl EngineStats {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// Renders a solid bitmap of the viewport size instead of driving a browser.
pub struct FakeLauncher {
    pub stats: Arc<EngineStats>,
    pub settles: bool,
    pub launch_delay: Duration,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(EngineStats::default()),
            settles: true,
            launch_delay: Duration::ZERO,
        }
    }

    pub fn never_settles() -> Self {
        Self {
            settles: false,
            ..Self::new()
        }
    }
}

impl EngineLauncher for FakeLauncher {
    fn launch(&self) -> Result<Arc<dyn RenderEngine>> {
        std::thread::sleep(self.launch_delay);
        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeEngine {
            stats: self.stats.clone(),
            settles: self.settles,
        }))
    }
}

struct FakeEngine {
    stats: Arc<EngineStats>,
    settles: bool,
}

impl RenderEngine for FakeEngine {
    fn open_surface(&self, viewport: Viewport) -> Result<Box<dyn RenderSurface>> {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSurface {
            stats: self.stats.clone(),
            settles: self.settles,
            viewport,
        }))
    }
}

struct FakeSurface {
    stats: Arc<EngineStats>,
    settles: bool,
    viewport: Viewport,
}

impl RenderSurface for FakeSurface {
    fn load(&self, html: &str) -> Result<()> {
        anyhow::ensure!(html.starts_with("<!DOCTYPE html>"), "not a document");
        Ok(())
    }

    fn is_settled(&self) -> Result<bool> {
        Ok(self.settles)
    }

    fn capture(&self, format: ImageFormat, quality: Option<u8>) -> Result<Vec<u8>> {
        let width = (self.viewport.width as f64 * self.viewport.scale_factor) as u32;
        let height = (self.viewport.height as f64 * self.viewport.scale_factor) as u32;
        Ok(solid_image(width, height, format, quality))
    }

    fn release(&self) -> Result<()> {
        self.stats.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn solid_image(width: u32, height: u32, format: ImageFormat, quality: Option<u8>) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([59, 130, 246]));
    let mut bytes = Vec::new();
    match format {
        ImageFormat::Png => DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap(),
        ImageFormat::Jpeg => JpegEncoder::new_with_quality(&mut bytes, quality.unwrap_or(90))
            .encode(image.as_raw(), width, height, ExtendedColorType::Rgb8)
            .unwrap(),
    }
    bytes
}

pub fn fast_config() -> RasterizerConfig {
    RasterizerConfig {
        settle_timeout: Duration::from_millis(100),
        poll_interval: Duration::from_millis(5),
        render_delay: Duration::ZERO,
        ..RasterizerConfig::default()
    }
}

pub type App = CorsEndpoint<AddDataEndpoint<Route, Arc<AppState>>>;

pub struct TestApp {
    pub client: TestClient<App>,
    pub state: Arc<AppState>,
    pub stats: Arc<EngineStats>,
    pub output_dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_launcher(FakeLauncher::new())
    }

    pub fn with_launcher(launcher: FakeLauncher) -> Self {
        let stats = launcher.stats.clone();
        let output_dir = tempfile::tempdir().unwrap();
        let rasterizer = Arc::new(Rasterizer::new(Arc::new(launcher), fast_config()));
        let generator = Arc::new(PosterGenerator::new(
            &REGISTRY,
            ComposerConfig {
                image_proxy: None,
                ..ComposerConfig::default()
            },
            rasterizer,
            OutputEncoder::new(output_dir.path().join("generated")),
        ));
        let state = Arc::new(AppState::new(generator));
        let client = TestClient::new(init_openapi_route(state.clone(), &Config::default()));

        Self {
            client,
            state,
            stats,
            output_dir,
        }
    }

    /// Calls a tool and returns `(isError, parsed text content)`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> (bool, Value) {
        let resp = self
            .client
            .post("/tools/call")
            .body_json(&serde_json::json!({ "name": name, "arguments": arguments }))
            .send()
            .await;
        resp.assert_status_is_ok();

        let body = body_json(resp).await;
        let text = body["content"][0]["text"].as_str().unwrap();
        assert_eq!(body["content"][0]["type"], "text");
        (
            body["isError"].as_bool().unwrap(),
            serde_json::from_str(text).unwrap(),
        )
    }

    pub async fn read_resource(&self, uri: &str) -> (bool, Value) {
        let resp = self
            .client
            .get("/resources/read")
            .query("uri", &uri)
            .send()
            .await;
        resp.assert_status_is_ok();

        let body = body_json(resp).await;
        let text = body["contents"][0]["text"].as_str().unwrap();
        (
            body["isError"].as_bool().unwrap(),
            serde_json::from_str(text).unwrap(),
        )
    }
}

pub async fn body_json(resp: TestResponse) -> Value {
    let body = resp.0.into_body().into_string().await.unwrap();
    serde_json::from_str(&body).unwrap()
}
