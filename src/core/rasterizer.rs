use anyhow::Result as AnyResult;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::sleep;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::core::registry::ImageFormat;
use crate::error::{PosterError, Result};

pub const DEVICE_SCALE_FACTOR: f64 = 2.0;
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL_MS: u64 = 100;
const RENDER_DELAY_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub scale_factor: f64,
}

/// One isolated page inside the engine. Implementations must tolerate
/// `release` being called after a failed `load` or `capture`.
pub trait RenderSurface: Send {
    fn load(&self, html: &str) -> AnyResult<()>;

    /// True once the document and its resources have finished loading.
    fn is_settled(&self) -> AnyResult<bool>;

    fn capture(&self, format: ImageFormat, quality: Option<u8>) -> AnyResult<Vec<u8>>;

    fn release(&self) -> AnyResult<()>;
}

pub trait RenderEngine: Send + Sync {
    fn open_surface(&self, viewport: Viewport) -> AnyResult<Box<dyn RenderSurface>>;

    fn shutdown(&self) -> AnyResult<()> {
        Ok(())
    }
}

pub trait EngineLauncher: Send + Sync {
    fn launch(&self) -> AnyResult<Arc<dyn RenderEngine>>;
}

#[derive(Debug, Clone)]
pub struct RasterizerConfig {
    pub settle_timeout: Duration,
    pub poll_interval: Duration,
    pub render_delay: Duration,
    pub scale_factor: f64,
}

impl Default for RasterizerConfig {
    fn default() -> Self {
        Self {
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
            render_delay: Duration::from_millis(RENDER_DELAY_MS),
            scale_factor: DEVICE_SCALE_FACTOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    /// Ignored for lossless formats.
    pub quality: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Uninitialized,
    Ready,
}

impl EngineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
        }
    }
}

enum EngineState {
    Uninitialized,
    Ready(Arc<dyn RenderEngine>),
}

/// Closes its surface on every exit path.
struct SurfaceGuard {
    surface: Box<dyn RenderSurface>,
    active: Arc<AtomicUsize>,
}

impl SurfaceGuard {
    fn new(surface: Box<dyn RenderSurface>, active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self { surface, active }
    }

    fn as_ref(&self) -> &dyn RenderSurface {
        self.surface.as_ref()
    }
}

impl Drop for SurfaceGuard {
    fn drop(&mut self) {
        if let Err(e) = self.surface.release() {
            tracing::warn!("Failed to release surface during cleanup: {}", e);
        } else {
            tracing::debug!("Surface released");
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shared handle to the headless engine.
///
/// The engine moves `Uninitialized -> Ready -> Uninitialized` through
/// [`initialize`](Self::initialize) and [`shutdown`](Self::shutdown), both of
/// which serialize on one gate so concurrent initializers wait for the first
/// launch instead of starting their own. [`rasterize`](Self::rasterize) never
/// initializes implicitly.
pub struct Rasterizer {
    launcher: Arc<dyn EngineLauncher>,
    config: RasterizerConfig,
    state: RwLock<EngineState>,
    lifecycle: Mutex<()>,
    active_surfaces: Arc<AtomicUsize>,
}

impl Rasterizer {
    pub fn new(launcher: Arc<dyn EngineLauncher>, config: RasterizerConfig) -> Self {
        Self {
            launcher,
            config,
            state: RwLock::new(EngineState::Uninitialized),
            lifecycle: Mutex::new(()),
            active_surfaces: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn status(&self) -> EngineStatus {
        match *self.state.read() {
            EngineState::Uninitialized => EngineStatus::Uninitialized,
            EngineState::Ready(_) => EngineStatus::Ready,
        }
    }

    /// Surfaces currently open across all in-flight rasterizations.
    pub fn active_surfaces(&self) -> usize {
        self.active_surfaces.load(Ordering::SeqCst)
    }

    pub async fn initialize(&self) -> Result<()> {
        let _gate = self.lifecycle.lock().await;
        if self.status() == EngineStatus::Ready {
            tracing::debug!("Rendering engine already initialized");
            return Ok(());
        }

        tracing::info!("Launching rendering engine...");
        let launcher = self.launcher.clone();
        let engine = tokio::task::spawn_blocking(move || launcher.launch())
            .await?
            .map_err(|e| {
                tracing::error!("Failed to launch rendering engine: {:#}", e);
                PosterError::EngineLaunch(e)
            })?;

        *self.state.write() = EngineState::Ready(engine);
        tracing::info!("Rendering engine initialized successfully");
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        let _gate = self.lifecycle.lock().await;
        let previous = std::mem::replace(&mut *self.state.write(), EngineState::Uninitialized);

        if let EngineState::Ready(engine) = previous {
            tokio::task::spawn_blocking(move || engine.shutdown())
                .await?
                .map_err(PosterError::Engine)?;
            tracing::info!("Rendering engine shut down");
        }
        Ok(())
    }

    pub async fn rasterize(&self, html: String, request: CaptureRequest) -> Result<Vec<u8>> {
        let engine = match &*self.state.read() {
            EngineState::Ready(engine) => engine.clone(),
            EngineState::Uninitialized => return Err(PosterError::EngineNotReady),
        };
        let config = self.config.clone();
        let active = self.active_surfaces.clone();

        tokio::task::spawn_blocking(move || {
            render_sync(engine.as_ref(), &html, &request, &config, active)
        })
        .await?
    }
}

fn render_sync(
    engine: &dyn RenderEngine,
    html: &str,
    request: &CaptureRequest,
    config: &RasterizerConfig,
    active: Arc<AtomicUsize>,
) -> Result<Vec<u8>> {
    let surface = engine
        .open_surface(Viewport {
            width: request.width,
            height: request.height,
            scale_factor: config.scale_factor,
        })
        .map_err(PosterError::Engine)?;
    let surface_guard = SurfaceGuard::new(surface, active);
    let surface = surface_guard.as_ref();

    surface.load(html).map_err(PosterError::Engine)?;

    wait_for_settled(surface, config)?;

    let quality = if request.format.is_lossy() {
        request.quality
    } else {
        None
    };
    let bitmap = surface
        .capture(request.format, quality)
        .map_err(PosterError::Engine)?;

    tracing::debug!(
        "Captured {}x{} {} ({} bytes)",
        request.width,
        request.height,
        request.format,
        bitmap.len()
    );
    Ok(bitmap)
}

fn wait_for_settled(surface: &dyn RenderSurface, config: &RasterizerConfig) -> Result<()> {
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        match surface.is_settled() {
            Ok(true) => {
                tracing::debug!("Document settled after {} attempts", attempts);
                break;
            }
            Ok(false) => {}
            // Navigation can tear down the page context mid-check.
            Err(e) => tracing::debug!("Readiness check failed, retrying: {}", e),
        }

        if started.elapsed() >= config.settle_timeout {
            tracing::warn!(
                "Timeout waiting for document to settle after {} attempts",
                attempts
            );
            return Err(PosterError::Timeout(config.settle_timeout));
        }

        sleep(config.poll_interval);
        attempts += 1;
    }

    sleep(config.render_delay);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;

    #[derive(Default)]
    struct Journal {
        launches: AtomicUsize,
        events: SyncMutex<Vec<String>>,
        // Readiness checks that error before the surface answers normally.
        failing_checks: AtomicUsize,
    }

    struct StubLauncher {
        journal: Arc<Journal>,
        settles: bool,
        fail_capture: bool,
    }

    struct StubEngine {
        journal: Arc<Journal>,
        settles: bool,
        fail_capture: bool,
    }

    struct StubSurface {
        journal: Arc<Journal>,
        settles: bool,
        fail_capture: bool,
    }

    impl EngineLauncher for StubLauncher {
        fn launch(&self) -> AnyResult<Arc<dyn RenderEngine>> {
            self.journal.launches.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(StubEngine {
                journal: self.journal.clone(),
                settles: self.settles,
                fail_capture: self.fail_capture,
            }))
        }
    }

    impl RenderEngine for StubEngine {
        fn open_surface(&self, viewport: Viewport) -> AnyResult<Box<dyn RenderSurface>> {
            self.journal
                .events
                .lock()
                .push(format!("open {}x{}@{}", viewport.width, viewport.height, viewport.scale_factor));
            Ok(Box::new(StubSurface {
                journal: self.journal.clone(),
                settles: self.settles,
                fail_capture: self.fail_capture,
            }))
        }
    }

    impl RenderSurface for StubSurface {
        fn load(&self, _html: &str) -> AnyResult<()> {
            self.journal.events.lock().push("load".to_string());
            Ok(())
        }

        fn is_settled(&self) -> AnyResult<bool> {
            let remaining = self.journal.failing_checks.load(Ordering::SeqCst);
            if remaining > 0 {
                if remaining != usize::MAX {
                    self.journal.failing_checks.store(remaining - 1, Ordering::SeqCst);
                }
                anyhow::bail!("execution context was destroyed");
            }
            Ok(self.settles)
        }

        fn capture(&self, format: ImageFormat, quality: Option<u8>) -> AnyResult<Vec<u8>> {
            if self.fail_capture {
                anyhow::bail!("target crashed");
            }
            self.journal
                .events
                .lock()
                .push(format!("capture {} {:?}", format, quality));
            Ok(vec![1, 2, 3])
        }

        fn release(&self) -> AnyResult<()> {
            self.journal.events.lock().push("release".to_string());
            Ok(())
        }
    }

    fn rasterizer(settles: bool, fail_capture: bool) -> (Rasterizer, Arc<Journal>) {
        let journal = Arc::new(Journal::default());
        let launcher = Arc::new(StubLauncher {
            journal: journal.clone(),
            settles,
            fail_capture,
        });
        let config = RasterizerConfig {
            settle_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
            render_delay: Duration::ZERO,
            ..RasterizerConfig::default()
        };
        (Rasterizer::new(launcher, config), journal)
    }

    fn png_request() -> CaptureRequest {
        CaptureRequest {
            width: 800,
            height: 600,
            format: ImageFormat::Png,
            quality: Some(90),
        }
    }

    #[tokio::test]
    async fn rasterize_before_initialize_fails() {
        let (rasterizer, journal) = rasterizer(true, false);
        let err = rasterizer
            .rasterize("<p/>".to_string(), png_request())
            .await
            .unwrap_err();
        assert!(matches!(err, PosterError::EngineNotReady));
        assert_eq!(journal.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn surface_lifecycle_is_open_load_capture_release() {
        let (rasterizer, journal) = rasterizer(true, false);
        rasterizer.initialize().await.unwrap();
        let bytes = rasterizer
            .rasterize("<p/>".to_string(), png_request())
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(
            *journal.events.lock(),
            vec!["open 800x600@2", "load", "capture png None", "release"]
        );
        assert_eq!(rasterizer.active_surfaces(), 0);
    }

    #[tokio::test]
    async fn quality_is_forwarded_only_for_lossy_format() {
        let (rasterizer, journal) = rasterizer(true, false);
        rasterizer.initialize().await.unwrap();
        let request = CaptureRequest {
            format: ImageFormat::Jpeg,
            quality: Some(70),
            ..png_request()
        };
        rasterizer.rasterize("<p/>".to_string(), request).await.unwrap();
        assert!(journal.events.lock().contains(&"capture jpeg Some(70)".to_string()));
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let (rasterizer, journal) = rasterizer(true, false);
        rasterizer.initialize().await.unwrap();
        rasterizer.initialize().await.unwrap();
        assert_eq!(journal.launches.load(Ordering::SeqCst), 1);
        assert_eq!(rasterizer.status(), EngineStatus::Ready);
    }

    #[tokio::test]
    async fn shutdown_returns_to_uninitialized() {
        let (rasterizer, journal) = rasterizer(true, false);
        rasterizer.initialize().await.unwrap();
        rasterizer.shutdown().await.unwrap();
        assert_eq!(rasterizer.status(), EngineStatus::Uninitialized);
        assert!(matches!(
            rasterizer.rasterize("<p/>".to_string(), png_request()).await,
            Err(PosterError::EngineNotReady)
        ));

        rasterizer.initialize().await.unwrap();
        assert_eq!(journal.launches.load(Ordering::SeqCst), 2);
        assert!(rasterizer.rasterize("<p/>".to_string(), png_request()).await.is_ok());
    }

    #[tokio::test]
    async fn failed_capture_still_releases_surface() {
        let (rasterizer, journal) = rasterizer(true, true);
        rasterizer.initialize().await.unwrap();
        let err = rasterizer
            .rasterize("<p/>".to_string(), png_request())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("target crashed"));
        assert_eq!(journal.events.lock().last().map(String::as_str), Some("release"));
        assert_eq!(rasterizer.active_surfaces(), 0);
    }

    #[tokio::test]
    async fn unsettled_document_times_out_and_releases() {
        let (rasterizer, journal) = rasterizer(false, false);
        rasterizer.initialize().await.unwrap();
        let err = rasterizer
            .rasterize("<p/>".to_string(), png_request())
            .await
            .unwrap_err();
        assert!(matches!(err, PosterError::Timeout(_)));
        let events = journal.events.lock();
        assert_eq!(events.iter().filter(|e| e.starts_with("open")).count(), 1);
        assert_eq!(events.iter().filter(|e| *e == "release").count(), 1);
    }

    #[tokio::test]
    async fn readiness_check_errors_are_retried() {
        let (rasterizer, journal) = rasterizer(true, false);
        journal.failing_checks.store(3, Ordering::SeqCst);
        rasterizer.initialize().await.unwrap();
        let bytes = rasterizer
            .rasterize("<p/>".to_string(), png_request())
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(journal.failing_checks.load(Ordering::SeqCst), 0);
        assert_eq!(rasterizer.active_surfaces(), 0);
    }

    #[tokio::test]
    async fn persistent_readiness_errors_time_out_and_release() {
        let (rasterizer, journal) = rasterizer(true, false);
        journal.failing_checks.store(usize::MAX, Ordering::SeqCst);
        rasterizer.initialize().await.unwrap();
        let err = rasterizer
            .rasterize("<p/>".to_string(), png_request())
            .await
            .unwrap_err();
        assert!(matches!(err, PosterError::Timeout(_)), "{err}");
        assert_eq!(journal.events.lock().last().map(String::as_str), Some("release"));
        assert_eq!(rasterizer.active_surfaces(), 0);
    }
}
