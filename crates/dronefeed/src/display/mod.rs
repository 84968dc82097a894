pub mod headless;
#[cfg(feature = "window")]
pub mod window;

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};

use crate::error::DisplayError;
use crate::frame::slot::FrameView;
use crate::frame::{Frame, PixelFormat};
use crate::settings::StageSettings;
use crate::shutdown::{ExitHook, ShutdownSignal, arm_forced_shutdown};

/// Builds a backend on the render thread (window handles are usually `!Send`).
pub type BackendFactory =
    Arc<dyn Fn() -> Result<Box<dyn RenderBackend>, DisplayError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SurfaceState {
    Uninitialized = 0,
    Running = 1,
    Stopped = 2,
}

impl SurfaceState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SurfaceState::Uninitialized,
            1 => SurfaceState::Running,
            _ => SurfaceState::Stopped,
        }
    }
}

/// What the window system reported since the last pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceInput {
    Idle,
    CloseRequested,
}

/// One paint request: raw pixels straight out of the frame snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Blit<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
}

/// The windowing capability the surface drives: create, pump, resize, blit,
/// destroy. All calls happen on the render thread.
pub trait RenderBackend {
    fn create_surface(&mut self, title: &str) -> Result<(), DisplayError>;

    /// Process pending window-system events without blocking longer than
    /// `timeout`.
    fn pump(&mut self, timeout: Duration) -> SurfaceInput;

    /// Current surface size in pixels.
    fn size(&self) -> (u32, u32);

    fn resize(&mut self, width: u32, height: u32);

    fn blit(&mut self, blit: &Blit<'_>) -> Result<(), DisplayError>;

    fn destroy(&mut self);
}

#[derive(Debug, Clone)]
pub struct SurfaceOptions {
    pub title: String,
    pub poll_interval: Duration,
    pub grace_period: Duration,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self::from(&StageSettings::default())
    }
}

impl From<&StageSettings> for SurfaceOptions {
    fn from(settings: &StageSettings) -> Self {
        Self {
            title: settings.window_title.clone(),
            poll_interval: settings.poll_interval(),
            grace_period: settings.grace_period(),
        }
    }
}

struct Shared {
    state: AtomicU8,
    presented: AtomicU64,
    pending: Mutex<bool>,
    idle: Condvar,
}

impl Shared {
    fn set_state(&self, state: SurfaceState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn state(&self) -> SurfaceState {
        SurfaceState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn clear_pending(&self) {
        *self.pending.lock() = false;
        self.idle.notify_all();
    }

    fn finish(&self) {
        self.set_state(SurfaceState::Stopped);
        self.clear_pending();
    }
}

/// Handle to a render loop running on its own thread.
///
/// Redraw requests are coalesced: while one is pending, further requests are
/// absorbed and the renderer picks up whatever frame is latest when it paints.
pub struct DisplaySurface {
    shared: Arc<Shared>,
    redraw_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DisplaySurface {
    pub fn spawn(
        factory: BackendFactory,
        view: FrameView,
        shutdown: ShutdownSignal,
        options: SurfaceOptions,
        exit_hook: ExitHook,
    ) -> Result<Self, DisplayError> {
        let (redraw_tx, redraw_rx) = crossbeam_channel::bounded(1);
        let shared = Arc::new(Shared {
            state: AtomicU8::new(SurfaceState::Uninitialized as u8),
            presented: AtomicU64::new(0),
            pending: Mutex::new(false),
            idle: Condvar::new(),
        });

        let thread_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name("display-surface".into())
            .spawn(move || {
                let ctx = RenderContext {
                    view,
                    shared: thread_shared,
                    redraw_rx,
                    shutdown,
                    options,
                    exit_hook,
                };
                render_thread(&factory, &ctx);
            })?;

        Ok(Self {
            shared,
            redraw_tx: Some(redraw_tx),
            thread: Some(handle),
        })
    }

    pub fn state(&self) -> SurfaceState {
        self.shared.state()
    }

    /// Number of frames actually painted.
    pub fn presented(&self) -> u64 {
        self.shared.presented.load(Ordering::Relaxed)
    }

    /// Ask the renderer to repaint. Returns false if the surface has stopped.
    pub fn request_redraw(&self) -> bool {
        let Some(tx) = self.redraw_tx.as_ref() else {
            return false;
        };
        if self.state() == SurfaceState::Stopped {
            return false;
        }
        *self.shared.pending.lock() = true;
        match tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Disconnected(())) => {
                self.shared.clear_pending();
                false
            }
        }
    }

    /// Wait at most `timeout` for a pending redraw to be handled. Returns
    /// whether the renderer is idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let mut pending = self.shared.pending.lock();
        if *pending && !timeout.is_zero() {
            self.shared
                .idle
                .wait_while_for(&mut pending, |p| *p, timeout);
        }
        !*pending
    }

    /// Stop the render loop and join it. Not treated as a user close.
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the render loop's receiver.
        self.redraw_tx = None;
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("Display surface thread panicked");
            }
            log::info!("Display surface stopped");
        }
        self.shared.finish();
    }
}

impl Drop for DisplaySurface {
    fn drop(&mut self) {
        self.stop();
    }
}

struct RenderContext {
    view: FrameView,
    shared: Arc<Shared>,
    redraw_rx: Receiver<()>,
    shutdown: ShutdownSignal,
    options: SurfaceOptions,
    exit_hook: ExitHook,
}

fn render_thread(factory: &BackendFactory, ctx: &RenderContext) {
    let mut backend = match factory() {
        Ok(backend) => backend,
        Err(e) => {
            log::error!("Display backend unavailable: {e}");
            ctx.shared.finish();
            return;
        }
    };
    if let Err(e) = backend.create_surface(&ctx.options.title) {
        log::error!("Failed to create display surface: {e}");
        ctx.shared.finish();
        return;
    }

    ctx.shared.set_state(SurfaceState::Running);
    log::info!("Display surface running");

    let closed_by_user = render_loop(&mut *backend, ctx);

    backend.destroy();
    ctx.shared.finish();

    if closed_by_user {
        log::info!("Display surface closed by user");
        arm_forced_shutdown(
            &ctx.shutdown,
            ctx.options.grace_period,
            ctx.exit_hook.clone(),
        );
    }
}

/// Runs until the owner disconnects (false) or the user closes the surface
/// (true).
fn render_loop(backend: &mut dyn RenderBackend, ctx: &RenderContext) -> bool {
    loop {
        match ctx.redraw_rx.recv_timeout(ctx.options.poll_interval) {
            Ok(()) => {
                if paint(backend, &ctx.view) {
                    ctx.shared.presented.fetch_add(1, Ordering::Relaxed);
                }
                ctx.shared.clear_pending();
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return false,
        }

        if backend.pump(Duration::ZERO) == SurfaceInput::CloseRequested {
            return true;
        }
    }
}

/// Paint the latest frame. Frames that cannot be shown are skipped silently.
pub(crate) fn paint(backend: &mut dyn RenderBackend, view: &FrameView) -> bool {
    let Some(frame) = view.latest() else {
        return false;
    };
    if !frame.format.is_displayable() {
        log::debug!("Skipping redraw: {:?} is not displayable", frame.format);
        return false;
    }
    let stride = frame.stride();
    if stride == 0 {
        return false;
    }

    fit_to_frame(backend, &frame);

    let blit = Blit {
        data: &frame.data,
        width: frame.width,
        height: frame.height,
        stride,
        format: frame.format,
    };
    match backend.blit(&blit) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Redraw failed: {e}");
            false
        }
    }
}

fn fit_to_frame(backend: &mut dyn RenderBackend, frame: &Frame) {
    let target = (frame.display_width, frame.display_height);
    if target.0 == 0 || target.1 == 0 {
        return;
    }
    if backend.size() != target {
        log::debug!("Resizing display surface to {}x{}", target.0, target.1);
        backend.resize(target.0, target.1);
    }
}
