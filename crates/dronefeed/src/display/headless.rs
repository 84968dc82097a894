use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{BackendFactory, Blit, RenderBackend, SurfaceInput};
use crate::error::DisplayError;
use crate::frame::PixelFormat;

/// Parameters of one blit, without the pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlitRecord {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
    pub len: usize,
}

#[derive(Debug, Default)]
struct HeadlessLog {
    title: Option<String>,
    /// Keep every blit and resize instead of only the latest.
    recording: bool,
    blit_count: usize,
    last_blit: Option<BlitRecord>,
    blits: Vec<BlitRecord>,
    resizes: Vec<(u32, u32)>,
    destroyed: bool,
}

impl HeadlessLog {
    fn push_blit(&mut self, record: BlitRecord) {
        self.blit_count += 1;
        if self.recording {
            self.blits.push(record.clone());
        }
        self.last_blit = Some(record);
    }

    fn push_resize(&mut self, size: (u32, u32)) {
        if self.recording {
            self.resizes.push(size);
        } else {
            self.resizes.clear();
            self.resizes.push(size);
        }
    }
}

/// Observer side of a headless surface: inspects what was painted and can
/// play the user closing the window.
///
/// By default only counters and the latest blit are kept, so a long-running
/// headless session stays in constant memory. `recording()` keeps the full
/// history.
#[derive(Clone, Default)]
pub struct HeadlessHandle {
    log: Arc<(Mutex<HeadlessLog>, Condvar)>,
    close: Arc<AtomicBool>,
}

impl HeadlessHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recording() -> Self {
        let handle = Self::default();
        handle.log.0.lock().recording = true;
        handle
    }

    pub fn backend(&self) -> HeadlessBackend {
        HeadlessBackend {
            handle: self.clone(),
            size: (0, 0),
        }
    }

    pub fn factory(&self) -> BackendFactory {
        let handle = self.clone();
        Arc::new(move || -> Result<Box<dyn RenderBackend>, DisplayError> {
            Ok(Box::new(handle.backend()))
        })
    }

    /// Simulate the user closing the surface.
    pub fn request_close(&self) {
        self.close.store(true, Ordering::Release);
    }

    pub fn title(&self) -> Option<String> {
        self.log.0.lock().title.clone()
    }

    /// Every blit so far when recording; otherwise empty.
    pub fn blits(&self) -> Vec<BlitRecord> {
        self.log.0.lock().blits.clone()
    }

    pub fn last_blit(&self) -> Option<BlitRecord> {
        self.log.0.lock().last_blit.clone()
    }

    pub fn blit_count(&self) -> usize {
        self.log.0.lock().blit_count
    }

    /// Every resize when recording; otherwise just the latest.
    pub fn resizes(&self) -> Vec<(u32, u32)> {
        self.log.0.lock().resizes.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.log.0.lock().destroyed
    }

    pub fn wait_for_blits(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |log| log.blit_count >= count)
    }

    pub fn wait_created(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, |log| log.title.is_some())
    }

    fn wait_until(&self, timeout: Duration, mut done: impl FnMut(&HeadlessLog) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, cvar) = &*self.log;
        let mut log = lock.lock();
        while !done(&log) {
            if cvar.wait_until(&mut log, deadline).timed_out() {
                return done(&log);
            }
        }
        true
    }

    fn record(&self, f: impl FnOnce(&mut HeadlessLog)) {
        let (lock, cvar) = &*self.log;
        f(&mut lock.lock());
        cvar.notify_all();
    }
}

/// Render backend that paints nowhere and records every call.
pub struct HeadlessBackend {
    handle: HeadlessHandle,
    size: (u32, u32),
}

impl RenderBackend for HeadlessBackend {
    fn create_surface(&mut self, title: &str) -> Result<(), DisplayError> {
        self.handle.record(|log| log.title = Some(title.to_string()));
        log::info!("Headless surface created: {title}");
        Ok(())
    }

    fn pump(&mut self, _timeout: Duration) -> SurfaceInput {
        if self.handle.close.load(Ordering::Acquire) {
            SurfaceInput::CloseRequested
        } else {
            SurfaceInput::Idle
        }
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.handle.record(|log| log.push_resize((width, height)));
    }

    fn blit(&mut self, blit: &Blit<'_>) -> Result<(), DisplayError> {
        let record = BlitRecord {
            width: blit.width,
            height: blit.height,
            stride: blit.stride,
            format: blit.format,
            len: blit.data.len(),
        };
        self.handle.record(|log| log.push_blit(record));
        Ok(())
    }

    fn destroy(&mut self) {
        self.handle.record(|log| log.destroyed = true);
    }
}
