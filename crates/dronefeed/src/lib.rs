//! Pipeline stage that relays RGB565 video frames while painting each one on
//! a display surface, with an optional face-tracking worker alongside.

pub mod display;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod settings;
pub mod shutdown;
pub mod source;
pub mod stage;
pub mod tracking;

pub use display::{BackendFactory, DisplaySurface, RenderBackend, SurfaceState};
pub use error::DisplayError;
pub use frame::{Frame, PixelFormat, resolution_for_buffer_size};
pub use pipeline::{ExitReason, FrameSource, Pipeline, PipelineReport};
pub use settings::{StageSettings, TrackingSettings};
pub use shutdown::ShutdownSignal;
pub use stage::display::{DisplayConfig, DisplayStage};
pub use stage::{Stage, StageIo, StageStatus};
