use std::sync::Arc;

use parking_lot::RwLock;

use super::Frame;

/// Latest-frame handoff between the pipeline thread and the renderer.
///
/// The writer swaps a whole `Arc<Frame>` under the lock and the reader clones
/// it out, so a redraw always sees one complete snapshot (old or new).
#[derive(Default)]
pub struct FrameSlot {
    current: RwLock<Option<Arc<Frame>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `frame` as the latest snapshot and return the one it replaced.
    pub fn publish(&self, frame: Arc<Frame>) -> Option<Arc<Frame>> {
        self.current.write().replace(frame)
    }

    /// Clone out the latest snapshot.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.current.read().clone()
    }

    /// Empty the slot, returning what it held.
    pub fn take(&self) -> Option<Arc<Frame>> {
        self.current.write().take()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_none()
    }
}

/// What a renderer paints: the live feed, unless an overlay slot is set and
/// holds a frame.
#[derive(Clone, Default)]
pub struct FrameView {
    pub feed: Arc<FrameSlot>,
    pub overlay: Option<Arc<FrameSlot>>,
}

impl FrameView {
    pub fn new(feed: Arc<FrameSlot>) -> Self {
        Self {
            feed,
            overlay: None,
        }
    }

    #[must_use]
    pub fn with_overlay(mut self, overlay: Option<Arc<FrameSlot>>) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.overlay
            .as_ref()
            .and_then(|overlay| overlay.latest())
            .or_else(|| self.feed.latest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{KNOWN_RESOLUTIONS, PixelFormat};

    fn frame(size: usize) -> Arc<Frame> {
        Arc::new(Frame::new(vec![0u8; size].into(), PixelFormat::Rgb565, None))
    }

    #[test]
    fn publish_returns_previous() {
        let slot = FrameSlot::new();
        assert!(slot.is_empty());
        assert!(slot.publish(frame(50688)).is_none());
        let prev = slot.publish(frame(153600)).unwrap();
        assert_eq!(prev.size(), 50688);
        assert_eq!(slot.latest().unwrap().size(), 153600);
    }

    #[test]
    fn take_empties() {
        let slot = FrameSlot::new();
        slot.publish(frame(50688));
        assert!(slot.take().is_some());
        assert!(slot.take().is_none());
        assert!(slot.is_empty());
    }

    #[test]
    fn replaced_buffer_is_released() {
        let slot = FrameSlot::new();
        let data: Arc<[u8]> = vec![0u8; 50688].into();
        let weak = Arc::downgrade(&data);
        slot.publish(Arc::new(Frame::new(data, PixelFormat::Rgb565, None)));
        assert!(weak.upgrade().is_some());
        drop(slot.publish(frame(153600)));
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn overlay_wins_when_filled() {
        let view = FrameView::default().with_overlay(Some(Arc::new(FrameSlot::new())));
        assert!(view.latest().is_none());

        view.feed.publish(frame(153600));
        assert_eq!(view.latest().unwrap().size(), 153600);

        let overlay = view.overlay.clone().unwrap();
        overlay.publish(frame(50688));
        assert_eq!(view.latest().unwrap().size(), 50688);

        overlay.take();
        assert_eq!(view.latest().unwrap().size(), 153600);
    }

    #[test]
    fn reader_never_sees_torn_snapshot() {
        let slot = Arc::new(FrameSlot::new());
        let writer_slot = slot.clone();
        let writer = std::thread::spawn(move || {
            for i in 0..2000 {
                let (bytes, _, _) = KNOWN_RESOLUTIONS[i % KNOWN_RESOLUTIONS.len()];
                let format = if i % 3 == 0 {
                    PixelFormat::Rgba32
                } else {
                    PixelFormat::Rgb565
                };
                writer_slot.publish(Arc::new(Frame::new(vec![0u8; bytes].into(), format, None)));
            }
        });

        let mut observed = 0;
        while !writer.is_finished() || observed == 0 {
            if let Some(f) = slot.latest() {
                let (w, h) = crate::frame::resolution_for_buffer_size(f.data.len());
                assert_eq!((f.width, f.height), (w, h));
                assert_eq!(f.size(), f.data.len());
                observed += 1;
            }
        }
        writer.join().unwrap();
        assert!(observed > 0);
    }
}
