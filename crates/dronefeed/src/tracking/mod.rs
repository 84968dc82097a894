pub mod blob;
pub mod heuristic;
pub mod mosaic;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use image::RgbImage;

use self::heuristic::{TrackerState, Verdict};
use crate::frame::convert::{image_to_rgb565, rgb565_to_image};
use crate::frame::slot::FrameSlot;
use crate::frame::{Frame, PixelFormat};
use crate::settings::TrackingSettings;

/// Axis-aligned detection box in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Face (or object) detector consumed by the tracking worker.
pub trait FaceDetector: Send {
    fn detect(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Rect>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Roll,
    Pitch,
    Gaz,
    Yaw,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionCommand {
    Move { axis: Axis, magnitude: f32 },
    Land,
}

/// Sink for flight commands (the drone's control link).
pub trait MotionCommander: Send {
    fn send(&mut self, command: MotionCommand);
}

/// Commander with no drone attached: logs every command.
#[derive(Debug, Default)]
pub struct LogCommander {
    sent: u64,
}

impl LogCommander {
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl MotionCommander for LogCommander {
    fn send(&mut self, command: MotionCommand) {
        self.sent += 1;
        match command {
            MotionCommand::Move { axis, magnitude } => {
                log::info!("Drone command: move {axis:?} by {magnitude}");
            }
            MotionCommand::Land => log::info!("Drone command: land"),
        }
    }
}

/// Runs detection and the movement heuristic on its own thread so the
/// pipeline never waits on a detector.
///
/// When given an overlay slot, every processed frame is published there as
/// RGB565 with its detections pixelated.
pub struct TrackingWorker {
    frame_tx: Option<Sender<Arc<Frame>>>,
    stop_requested: Arc<AtomicBool>,
    processed: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl TrackingWorker {
    pub fn spawn(
        detector: Box<dyn FaceDetector>,
        commander: Box<dyn MotionCommander>,
        settings: TrackingSettings,
        overlay: Option<Arc<FrameSlot>>,
    ) -> std::io::Result<Self> {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(1);
        let stop_requested = Arc::new(AtomicBool::new(false));
        let processed = Arc::new(AtomicU64::new(0));

        let ctx = WorkerContext {
            detector,
            commander,
            settings,
            state: TrackerState::default(),
            stop_requested: stop_requested.clone(),
            processed: processed.clone(),
            overlay,
        };
        let handle = std::thread::Builder::new()
            .name("tracking-worker".into())
            .spawn(move || worker_loop(ctx, &frame_rx))?;

        Ok(Self {
            frame_tx: Some(frame_tx),
            stop_requested,
            processed,
            thread: Some(handle),
        })
    }

    /// Hand a frame to the worker. Dropped if the worker is still busy with
    /// the previous one.
    pub fn offer(&self, frame: Arc<Frame>) -> bool {
        self.frame_tx
            .as_ref()
            .is_some_and(|tx| tx.try_send(frame).is_ok())
    }

    /// The heuristic decided the flight is over.
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    pub fn frames_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) {
        self.frame_tx = None;
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("Tracking worker panicked");
            }
        }
    }
}

impl Drop for TrackingWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WorkerContext {
    detector: Box<dyn FaceDetector>,
    commander: Box<dyn MotionCommander>,
    settings: TrackingSettings,
    state: TrackerState,
    stop_requested: Arc<AtomicBool>,
    processed: Arc<AtomicU64>,
    overlay: Option<Arc<FrameSlot>>,
}

fn worker_loop(mut ctx: WorkerContext, frame_rx: &Receiver<Arc<Frame>>) {
    log::info!("Tracking worker started");
    while let Ok(frame) = frame_rx.recv() {
        if ctx.stop_requested.load(Ordering::Acquire) {
            continue;
        }
        process_frame(&mut ctx, &frame);
        ctx.processed.fetch_add(1, Ordering::Relaxed);
    }
    log::info!("Tracking worker exiting");
}

fn process_frame(ctx: &mut WorkerContext, frame: &Frame) {
    let Some(mut image) = rgb565_to_image(&frame.data, frame.width, frame.height) else {
        return;
    };

    let faces = match ctx.detector.detect(&image) {
        Ok(faces) => faces,
        Err(e) => {
            log::warn!("Face detection failed: {e}");
            // Show the live feed again.
            if let Some(overlay) = ctx.overlay.as_ref() {
                overlay.take();
            }
            return;
        }
    };

    if let Some(overlay) = ctx.overlay.as_ref() {
        for face in &faces {
            mosaic::mosaic(&mut image, *face, ctx.settings.mosaic_block);
        }
        let annotated = Frame::new(
            image_to_rgb565(&image).into(),
            PixelFormat::Rgb565,
            Some((frame.display_width, frame.display_height)),
        );
        overlay.publish(Arc::new(annotated));
    }

    let step = heuristic::step(&mut ctx.state, &faces, &ctx.settings);
    for command in step.commands {
        log::debug!("Motion command: {command:?}");
        ctx.commander.send(command);
    }
    if step.verdict == Verdict::Stop {
        log::info!(
            "Detection limit reached after {} detections, landing",
            ctx.state.detections
        );
        ctx.stop_requested.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::convert::rgb888_to_rgb565;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    /// Reports one face that walks right by 10 px per frame.
    struct WalkingFace {
        x: i32,
    }

    impl FaceDetector for WalkingFace {
        fn detect(&mut self, _image: &RgbImage) -> anyhow::Result<Vec<Rect>> {
            self.x += 10;
            Ok(vec![Rect {
                x: self.x,
                y: 20,
                width: 20,
                height: 20,
            }])
        }
    }

    struct Failing;

    impl FaceDetector for Failing {
        fn detect(&mut self, _image: &RgbImage) -> anyhow::Result<Vec<Rect>> {
            anyhow::bail!("model not loaded")
        }
    }

    struct Recorder(Arc<Mutex<Vec<MotionCommand>>>);

    impl MotionCommander for Recorder {
        fn send(&mut self, command: MotionCommand) {
            self.0.lock().push(command);
        }
    }

    fn qcif_frame() -> Arc<Frame> {
        Arc::new(Frame::new(
            vec![0xffu8; 50688].into(),
            PixelFormat::Rgb565,
            None,
        ))
    }

    /// QCIF frame of alternating white and black columns.
    fn striped_qcif_frame() -> Arc<Frame> {
        let white = rgb888_to_rgb565(255, 255, 255);
        let black = rgb888_to_rgb565(0, 0, 0);
        let mut data = Vec::with_capacity(50688);
        for _ in 0..144 {
            for x in 0..176 {
                data.extend_from_slice(if x % 2 == 0 { &white } else { &black });
            }
        }
        Arc::new(Frame::new(data.into(), PixelFormat::Rgb565, None))
    }

    fn feed_with(worker: &TrackingWorker, frames: u64, make: fn() -> Arc<Frame>) {
        for n in 1..=frames {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !worker.offer(make()) {
                assert!(Instant::now() < deadline, "worker stopped accepting frames");
                std::thread::sleep(Duration::from_millis(1));
            }
            while worker.frames_processed() < n {
                assert!(Instant::now() < deadline, "worker did not process frame {n}");
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    fn feed(worker: &TrackingWorker, frames: u64) {
        feed_with(worker, frames, qcif_frame);
    }

    #[test]
    fn follows_face_and_lands() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let settings = TrackingSettings {
            detection_limit: 5,
            ..TrackingSettings::default()
        };
        let mut worker = TrackingWorker::spawn(
            Box::new(WalkingFace { x: 0 }),
            Box::new(Recorder(sent.clone())),
            settings,
            None,
        )
        .unwrap();

        feed(&worker, 6);
        assert!(worker.stop_requested());
        worker.stop();

        let sent = sent.lock();
        let rolls = sent
            .iter()
            .filter(|c| {
                **c == MotionCommand::Move {
                    axis: Axis::Roll,
                    magnitude: 1.0,
                }
            })
            .count();
        // Frames 3 through 6 each see the face 10 px further right.
        assert_eq!(rolls, 4);
        assert_eq!(sent.last(), Some(&MotionCommand::Land));
    }

    #[test]
    fn overlay_receives_pixelated_frame() {
        let overlay = Arc::new(FrameSlot::new());
        let worker = TrackingWorker::spawn(
            Box::new(WalkingFace { x: 0 }),
            Box::new(LogCommander::default()),
            TrackingSettings::default(),
            Some(overlay.clone()),
        )
        .unwrap();
        assert!(overlay.is_empty());
        feed_with(&worker, 1, striped_qcif_frame);

        let shown = overlay.latest().unwrap();
        assert_eq!((shown.width, shown.height), (176, 144));
        assert_eq!(shown.format, PixelFormat::Rgb565);

        let at = |x: usize, y: usize| {
            let i = (y * 176 + x) * 2;
            [shown.data[i], shown.data[i + 1]]
        };
        // Face at (10, 20) 20x20: its cells average the stripes to grey.
        assert_eq!(at(15, 25), rgb888_to_rgb565(128, 128, 128));
        assert_eq!(at(29, 39), rgb888_to_rgb565(128, 128, 128));
        // Outside the face the stripes survive.
        assert_eq!(at(0, 0), rgb888_to_rgb565(255, 255, 255));
        assert_eq!(at(1, 0), rgb888_to_rgb565(0, 0, 0));
    }

    #[test]
    fn detector_errors_are_absorbed() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let overlay = Arc::new(FrameSlot::new());
        overlay.publish(qcif_frame());
        let worker = TrackingWorker::spawn(
            Box::new(Failing),
            Box::new(Recorder(sent.clone())),
            TrackingSettings::default(),
            Some(overlay.clone()),
        )
        .unwrap();
        feed(&worker, 3);
        assert!(!worker.stop_requested());
        assert!(overlay.is_empty());
        assert!(sent.lock().is_empty());
    }

    #[test]
    fn unknown_sized_frames_are_ignored() {
        let overlay = Arc::new(FrameSlot::new());
        let worker = TrackingWorker::spawn(
            Box::new(WalkingFace { x: 0 }),
            Box::new(LogCommander::default()),
            TrackingSettings::default(),
            Some(overlay.clone()),
        )
        .unwrap();
        let frame = Arc::new(Frame::new(vec![0u8; 99].into(), PixelFormat::Rgb565, None));
        assert!(worker.offer(frame));
        let deadline = Instant::now() + Duration::from_secs(5);
        while worker.frames_processed() < 1 {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(overlay.is_empty());
    }

    #[test]
    fn log_commander_counts_commands() {
        let mut commander = LogCommander::default();
        commander.send(MotionCommand::Move {
            axis: Axis::Roll,
            magnitude: -1.0,
        });
        commander.send(MotionCommand::Land);
        assert_eq!(commander.sent(), 2);
    }
}
