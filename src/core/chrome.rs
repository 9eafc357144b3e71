use anyhow::{Result, anyhow};
use base64::{Engine as _, engine::general_purpose};
use headless_chrome::protocol::cdp::{Emulation, Page};
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::core::rasterizer::{EngineLauncher, RenderEngine, RenderSurface, Viewport};
use crate::core::registry::ImageFormat;

// Without this the browser connection drops after headless_chrome's default 30s idle window.
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

const SETTLED_SCRIPT: &str = r#"
    document.readyState === 'complete'
        && Array.from(document.images).every(img => img.complete)
        && (!document.fonts || document.fonts.status === 'loaded')
"#;

/// Launches a headless Chromium per [`initialize`](crate::core::rasterizer::Rasterizer::initialize).
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    pub chrome_path: Option<PathBuf>,
}

impl ChromeLauncher {
    pub fn new(chrome_path: Option<PathBuf>) -> Self {
        Self { chrome_path }
    }

    fn launch_options(&self) -> Result<LaunchOptions<'static>> {
        LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .path(self.chrome_path.clone())
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .args(vec![
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-setuid-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--disable-sync"),
                OsStr::new("--metrics-recording-only"),
                OsStr::new("--mute-audio"),
                OsStr::new("--no-first-run"),
                OsStr::new("--disable-default-apps"),
            ])
            .build()
            .map_err(|_| anyhow!("Could not find Chrome/Chromium binary"))
    }
}

impl EngineLauncher for ChromeLauncher {
    fn launch(&self) -> Result<Arc<dyn RenderEngine>> {
        let browser = Browser::new(self.launch_options()?)?;
        tracing::info!("Chromium launched");
        Ok(Arc::new(ChromeEngine { browser }))
    }
}

pub struct ChromeEngine {
    browser: Browser,
}

impl RenderEngine for ChromeEngine {
    fn open_surface(&self, viewport: Viewport) -> Result<Box<dyn RenderSurface>> {
        let tab = self.browser.new_tab()?;
        let surface = ChromeSurface { tab };

        // The caller's guard only owns the tab once it is returned.
        if let Err(e) = surface.apply_viewport(viewport) {
            let _ = surface.tab.close(true);
            return Err(e);
        }
        Ok(Box::new(surface))
    }

    fn shutdown(&self) -> Result<()> {
        // The browser process itself exits when the last handle is dropped.
        let tabs = self
            .browser
            .get_tabs()
            .lock()
            .map_err(|_| anyhow!("tab list lock poisoned"))?
            .clone();
        for tab in tabs {
            if let Err(e) = tab.close(true) {
                tracing::debug!("Ignoring tab close failure on shutdown: {}", e);
            }
        }
        Ok(())
    }
}

struct ChromeSurface {
    tab: Arc<Tab>,
}

impl ChromeSurface {
    fn apply_viewport(&self, viewport: Viewport) -> Result<()> {
        self.tab.set_bounds(headless_chrome::types::Bounds::Normal {
            left: Some(0),
            top: Some(0),
            width: Some(viewport.width as f64),
            height: Some(viewport.height as f64),
        })?;

        self.tab
            .call_method(Emulation::SetDeviceMetricsOverride {
                width: viewport.width,
                height: viewport.height,
                device_scale_factor: viewport.scale_factor,
                mobile: false,
                scale: None,
                screen_width: Some(viewport.width),
                screen_height: Some(viewport.height),
                position_x: Some(0),
                position_y: Some(0),
                dont_set_visible_size: None,
                screen_orientation: None,
                viewport: None,
                display_feature: None,
                device_posture: None,
            })?;
        Ok(())
    }
}

impl RenderSurface for ChromeSurface {
    fn load(&self, html: &str) -> Result<()> {
        let data_url = format!(
            "data:text/html;base64,{}",
            general_purpose::STANDARD.encode(html)
        );
        self.tab.navigate_to(&data_url)?;
        Ok(())
    }

    fn is_settled(&self) -> Result<bool> {
        let settled = self
            .tab
            .evaluate(SETTLED_SCRIPT, false)?
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        Ok(settled)
    }

    fn capture(&self, format: ImageFormat, quality: Option<u8>) -> Result<Vec<u8>> {
        let (format, quality) = match format {
            ImageFormat::Png => (Page::CaptureScreenshotFormatOption::Png, None),
            ImageFormat::Jpeg => (
                Page::CaptureScreenshotFormatOption::Jpeg,
                quality.map(u32::from),
            ),
        };
        self.tab.capture_screenshot(format, quality, None, true)
    }

    fn release(&self) -> Result<()> {
        self.tab.close(true)?;
        Ok(())
    }
}
