pub mod display;

use std::sync::Arc;

/// Outcome of a lifecycle call. There is no error channel: a stage either
/// lets the pipeline keep going or asks it to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Continue,
    Stop,
}

/// Frame record passed between the host and a stage.
#[derive(Debug, Clone, Default)]
pub struct StageIo {
    pub buffer: Option<Arc<[u8]>>,
    /// Visible picture size reported by the decoder, if known.
    pub decoded_size: Option<(u32, u32)>,
}

impl StageIo {
    pub fn from_buffer(buffer: impl Into<Arc<[u8]>>) -> Self {
        Self {
            buffer: Some(buffer.into()),
            decoded_size: None,
        }
    }

    #[must_use]
    pub fn with_decoded_size(mut self, width: u32, height: u32) -> Self {
        self.decoded_size = Some((width, height));
        self
    }

    pub fn size(&self) -> usize {
        self.buffer.as_ref().map_or(0, |b| b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

/// A pipeline stage driven by the host: `open` once, `transform` per frame,
/// `close` once (extra calls are harmless).
pub trait Stage: Send {
    fn name(&self) -> &str;

    fn open(&mut self) -> StageStatus;

    fn transform(&mut self, input: &StageIo, output: &mut StageIo) -> StageStatus;

    fn close(&mut self);
}
