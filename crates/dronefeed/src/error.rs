use thiserror::Error;

/// Failures raised by a render backend. None of these reach the host
/// pipeline; the render thread logs them and skips or stops.
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("failed to create event loop: {0}")]
    EventLoop(String),
    #[error("failed to create window: {0}")]
    Window(String),
    #[error("GPU initialization failed: {0}")]
    Gpu(String),
    #[error("surface does not support {0}")]
    Unsupported(&'static str),
    #[error("surface lost or outdated")]
    SurfaceLost,
    #[error("render thread could not be spawned: {0}")]
    Spawn(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let e = DisplayError::Window("no display".into());
        assert_eq!(e.to_string(), "failed to create window: no display");
        let e = DisplayError::Unsupported("COPY_DST");
        assert_eq!(e.to_string(), "surface does not support COPY_DST");
    }
}
