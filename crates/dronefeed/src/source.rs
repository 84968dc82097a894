use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::frame::KNOWN_RESOLUTIONS;
use crate::frame::convert::rgb888_to_rgb565;
use crate::pipeline::FrameSource;
use crate::stage::StageIo;

/// Horizontal scroll per frame, in pixels.
const SCROLL_STEP: usize = 4;

const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

/// Picture size for a decoder resolution name (`qcif`, `qvga`, `360p`,
/// `720p`) or an explicit `WxH`.
pub fn parse_resolution(name: &str) -> Option<(u32, u32)> {
    let lower = name.trim().to_ascii_lowercase();
    let named = match lower.as_str() {
        "qcif" => Some((176, 144)),
        "qvga" => Some((320, 240)),
        "360p" => Some((640, 360)),
        "720p" => Some((1280, 720)),
        _ => None,
    };
    if named.is_some() {
        return named;
    }
    let (w, h) = lower.split_once('x')?;
    let size = (w.parse().ok()?, h.parse().ok()?);
    KNOWN_RESOLUTIONS
        .iter()
        .any(|&(_, kw, kh)| (kw, kh) == size)
        .then_some(size)
}

/// Scrolling RGB565 colour bars standing in for the drone decoder.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    limit: Option<u64>,
    interval: Option<Duration>,
    next_due: Option<Instant>,
    produced: u64,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            limit: None,
            interval: None,
            next_due: None,
            produced: 0,
        }
    }

    /// Stop after `frames` frames.
    #[must_use]
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    /// Pace delivery to `fps` frames per second. Zero means as fast as
    /// possible.
    #[must_use]
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.interval = (fps > 0).then(|| Duration::from_secs(1) / fps);
        self
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    fn render(&self) -> Arc<[u8]> {
        let (w, h) = (self.width as usize, self.height as usize);
        let bar_width = (w / BARS.len()).max(1);
        let shift = self.produced as usize * SCROLL_STEP;
        let mut row = Vec::with_capacity(w * 2);
        for x in 0..w {
            let [r, g, b] = BARS[((x + shift) / bar_width) % BARS.len()];
            row.extend_from_slice(&rgb888_to_rgb565(r, g, b));
        }
        let mut data = Vec::with_capacity(w * h * 2);
        for _ in 0..h {
            data.extend_from_slice(&row);
        }
        data.into()
    }

    fn pace(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };
        let now = Instant::now();
        match self.next_due {
            Some(due) if due > now => {
                std::thread::sleep(due - now);
                self.next_due = Some(due + interval);
            }
            // Running late: restart the schedule rather than bursting.
            _ => self.next_due = Some(now + interval),
        }
    }
}

impl FrameSource for TestPatternSource {
    fn next_frame(&mut self) -> Option<StageIo> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return None;
        }
        self.pace();
        let io = StageIo {
            buffer: Some(self.render()),
            decoded_size: Some((self.width, self.height)),
        };
        self.produced += 1;
        Some(io)
    }
}
