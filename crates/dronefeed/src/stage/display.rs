use std::sync::Arc;
use std::time::Duration;

use super::{Stage, StageIo, StageStatus};
use crate::display::{BackendFactory, DisplaySurface, SurfaceOptions, SurfaceState};
use crate::frame::slot::{FrameSlot, FrameView};
use crate::frame::{Frame, PixelFormat};
use crate::settings::{StageSettings, TrackingSettings};
use crate::shutdown::{ExitHook, ShutdownSignal, process_exit_hook};
use crate::tracking::{FaceDetector, MotionCommander, TrackingWorker};

/// Everything the display stage needs to know up front.
#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub bytes_per_pixel: u32,
    pub surface: SurfaceOptions,
    /// Upper bound on how long `transform` waits for the renderer.
    pub redraw_wait: Duration,
    pub tracking: TrackingSettings,
}

impl DisplayConfig {
    pub fn from_settings(settings: &StageSettings) -> Self {
        Self {
            bytes_per_pixel: settings.bytes_per_pixel,
            surface: SurfaceOptions::from(settings),
            redraw_wait: settings.redraw_wait(),
            tracking: settings.tracking.clone(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self::from_settings(&StageSettings::default())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StageStats {
    pub frames_in: u64,
    /// Frames with no buffer or a size the lookup does not know.
    pub frames_skipped: u64,
    pub redraws_requested: u64,
    /// Snapshots dropped by the stage, on replacement or at close.
    pub frames_released: u64,
}

/// Relays frames untouched while showing each one on a display surface.
pub struct DisplayStage {
    config: DisplayConfig,
    factory: BackendFactory,
    shutdown: ShutdownSignal,
    exit_hook: ExitHook,
    slot: Arc<FrameSlot>,
    /// Pixelated tracking view, painted in place of the feed when set.
    overlay: Option<Arc<FrameSlot>>,
    format: PixelFormat,
    params_ok: bool,
    surface: Option<DisplaySurface>,
    tracking: Option<TrackingWorker>,
    stats: StageStats,
}

impl DisplayStage {
    pub fn new(config: DisplayConfig, factory: BackendFactory, shutdown: ShutdownSignal) -> Self {
        Self {
            config,
            factory,
            shutdown,
            exit_hook: process_exit_hook(),
            slot: Arc::new(FrameSlot::new()),
            overlay: None,
            format: PixelFormat::DISPLAY,
            params_ok: false,
            surface: None,
            tracking: None,
            stats: StageStats::default(),
        }
    }

    /// Replace what runs when the host outlives the post-close grace period.
    #[must_use]
    pub fn with_exit_hook(mut self, hook: ExitHook) -> Self {
        self.exit_hook = hook;
        self
    }

    /// Attach a face-tracking worker fed with every displayed frame. With
    /// `show_annotated` set, the surface shows its pixelated output.
    pub fn with_tracking(
        mut self,
        detector: Box<dyn FaceDetector>,
        commander: Box<dyn MotionCommander>,
    ) -> std::io::Result<Self> {
        let overlay = self
            .config
            .tracking
            .show_annotated
            .then(|| Arc::new(FrameSlot::new()));
        let worker = TrackingWorker::spawn(
            detector,
            commander,
            self.config.tracking.clone(),
            overlay.clone(),
        )?;
        self.overlay = overlay;
        self.tracking = Some(worker);
        Ok(self)
    }

    /// False when the configured format cannot be shown; the stage is inert.
    pub fn params_ok(&self) -> bool {
        self.params_ok
    }

    pub fn stats(&self) -> StageStats {
        self.stats
    }

    pub fn slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    pub fn overlay(&self) -> Option<&Arc<FrameSlot>> {
        self.overlay.as_ref()
    }

    pub fn surface_state(&self) -> Option<SurfaceState> {
        self.surface.as_ref().map(DisplaySurface::state)
    }

    pub fn tracking(&self) -> Option<&TrackingWorker> {
        self.tracking.as_ref()
    }

    fn release(&mut self, frame: Option<Arc<Frame>>) {
        if frame.is_some() {
            self.stats.frames_released += 1;
        }
    }

    fn tracking_done(&self) -> bool {
        self.tracking
            .as_ref()
            .is_some_and(TrackingWorker::stop_requested)
    }
}

impl Stage for DisplayStage {
    fn name(&self) -> &str {
        "display"
    }

    fn open(&mut self) -> StageStatus {
        let format = PixelFormat::from_bytes_per_pixel(self.config.bytes_per_pixel);
        match format {
            Some(format) if format.is_displayable() => self.format = format,
            _ => {
                log::warn!(
                    "Display stage disabled: {} bytes per pixel is not displayable (only {:?})",
                    self.config.bytes_per_pixel,
                    PixelFormat::DISPLAY
                );
                self.params_ok = false;
                return StageStatus::Continue;
            }
        }
        self.params_ok = true;

        // First frame arrives with the first transform.
        let stale = self.slot.take();
        self.release(stale);

        if self.surface.is_some() {
            return StageStatus::Continue;
        }
        match DisplaySurface::spawn(
            self.factory.clone(),
            FrameView::new(self.slot.clone()).with_overlay(self.overlay.clone()),
            self.shutdown.clone(),
            self.config.surface.clone(),
            self.exit_hook.clone(),
        ) {
            Ok(surface) => {
                self.surface = Some(surface);
                log::info!("Display stage opened ({:?})", self.format);
                StageStatus::Continue
            }
            Err(e) => {
                log::error!("Failed to start display surface: {e}");
                StageStatus::Stop
            }
        }
    }

    fn transform(&mut self, input: &StageIo, output: &mut StageIo) -> StageStatus {
        if !self.params_ok {
            return StageStatus::Continue;
        }
        if self.shutdown.is_raised() {
            return StageStatus::Stop;
        }
        if self.tracking_done() {
            log::info!("Tracking finished, stopping pipeline");
            return StageStatus::Stop;
        }

        self.stats.frames_in += 1;
        let Some(buffer) = input.buffer.clone() else {
            self.stats.frames_skipped += 1;
            return StageStatus::Continue;
        };

        let frame = Arc::new(Frame::new(buffer, self.format, input.decoded_size));
        let previous = self.slot.publish(frame.clone());
        self.release(previous);

        if frame.is_renderable() {
            if let Some(surface) = self.surface.as_ref() {
                if surface.request_redraw() {
                    self.stats.redraws_requested += 1;
                    surface.wait_idle(self.config.redraw_wait);
                }
            }
            if let Some(tracking) = self.tracking.as_ref() {
                tracking.offer(frame);
            }
        } else {
            log::debug!("Not rendering frame of {} bytes: unknown resolution", frame.size());
            self.stats.frames_skipped += 1;
        }

        *output = input.clone();
        StageStatus::Continue
    }

    fn close(&mut self) {
        let held = self.slot.take();
        self.release(held);
        if let Some(mut surface) = self.surface.take() {
            surface.stop();
        }
        if let Some(mut tracking) = self.tracking.take() {
            tracking.stop();
        }
        if let Some(overlay) = self.overlay.as_ref() {
            overlay.take();
        }
    }
}

impl Drop for DisplayStage {
    fn drop(&mut self) {
        self.close();
    }
}
