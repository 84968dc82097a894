pub mod convert;
pub mod slot;

use std::sync::Arc;

/// Pixel layouts a decoder can hand us. Only `Rgb565` is displayable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb565,
    Rgb24,
    Rgba32,
}

impl PixelFormat {
    /// The one format the display path paints.
    pub const DISPLAY: PixelFormat = PixelFormat::Rgb565;

    /// Map a configured bytes-per-pixel value to a known fixed-size format.
    pub fn from_bytes_per_pixel(bpp: u32) -> Option<Self> {
        match bpp {
            2 => Some(PixelFormat::Rgb565),
            3 => Some(PixelFormat::Rgb24),
            4 => Some(PixelFormat::Rgba32),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Rgb565 => 2,
            PixelFormat::Rgb24 => 3,
            PixelFormat::Rgba32 => 4,
        }
    }

    pub fn is_displayable(self) -> bool {
        self == Self::DISPLAY
    }
}

/// Resolutions the decoder emits, keyed by RGB565 buffer size.
pub const KNOWN_RESOLUTIONS: &[(usize, u32, u32)] = &[
    (50_688, 176, 144),     // QCIF
    (153_600, 320, 240),    // QVGA
    (460_800, 640, 360),    // 360p
    (1_843_200, 1280, 720), // 720p
];

/// Picture size for an RGB565 buffer of `size` bytes, or `(0, 0)` when the
/// size is not one the decoder produces.
pub fn resolution_for_buffer_size(size: usize) -> (u32, u32) {
    KNOWN_RESOLUTIONS
        .iter()
        .find(|(bytes, _, _)| *bytes == size)
        .map_or((0, 0), |&(_, w, h)| (w, h))
}

/// Immutable snapshot of one frame as handed to the renderer.
///
/// `data` shares the caller's buffer; building a `Frame` never copies pixels.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Arc<[u8]>,
    pub format: PixelFormat,
    /// Dimensions derived from the buffer size (zero when unknown).
    pub width: u32,
    pub height: u32,
    /// Visible size reported by the decoder, without padding.
    pub display_width: u32,
    pub display_height: u32,
}

impl Frame {
    pub fn new(data: Arc<[u8]>, format: PixelFormat, decoded: Option<(u32, u32)>) -> Self {
        let (width, height) = resolution_for_buffer_size(data.len());
        let (display_width, display_height) = decoded.unwrap_or((width, height));
        Self {
            data,
            format,
            width,
            height,
            display_width,
            display_height,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Bytes per row; zero when the size lookup failed.
    pub fn stride(&self) -> u32 {
        self.width * self.format.bytes_per_pixel()
    }

    pub fn is_renderable(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_sizes_resolve() {
        assert_eq!(resolution_for_buffer_size(50688), (176, 144));
        assert_eq!(resolution_for_buffer_size(153600), (320, 240));
        assert_eq!(resolution_for_buffer_size(460800), (640, 360));
        assert_eq!(resolution_for_buffer_size(1843200), (1280, 720));
    }

    #[test]
    fn unknown_sizes_are_zero() {
        for size in [0, 1, 2, 50687, 153601, 230400, 921600, 1843199, usize::MAX] {
            assert_eq!(resolution_for_buffer_size(size), (0, 0), "size {size}");
        }
    }

    #[test]
    fn table_matches_two_bytes_per_pixel() {
        for &(bytes, w, h) in KNOWN_RESOLUTIONS {
            assert_eq!(bytes, (w * h * 2) as usize);
        }
    }

    #[test]
    fn format_from_bpp() {
        assert_eq!(PixelFormat::from_bytes_per_pixel(2), Some(PixelFormat::Rgb565));
        assert_eq!(PixelFormat::from_bytes_per_pixel(3), Some(PixelFormat::Rgb24));
        assert_eq!(PixelFormat::from_bytes_per_pixel(4), Some(PixelFormat::Rgba32));
        assert_eq!(PixelFormat::from_bytes_per_pixel(0), None);
        assert_eq!(PixelFormat::from_bytes_per_pixel(7), None);
        assert!(PixelFormat::Rgb565.is_displayable());
        assert!(!PixelFormat::Rgb24.is_displayable());
    }

    #[test]
    fn frame_stride_from_lookup() {
        let data: Arc<[u8]> = vec![0u8; 153600].into();
        let frame = Frame::new(data, PixelFormat::Rgb565, None);
        assert_eq!((frame.width, frame.height), (320, 240));
        assert_eq!((frame.display_width, frame.display_height), (320, 240));
        assert_eq!(frame.stride(), 640);
        assert!(frame.is_renderable());
    }

    #[test]
    fn frame_keeps_decoder_size() {
        let data: Arc<[u8]> = vec![0u8; 460800].into();
        let frame = Frame::new(data, PixelFormat::Rgb565, Some((640, 352)));
        assert_eq!((frame.width, frame.height), (640, 360));
        assert_eq!((frame.display_width, frame.display_height), (640, 352));
    }

    #[test]
    fn unknown_frame_has_zero_stride() {
        let data: Arc<[u8]> = vec![0u8; 1000].into();
        let frame = Frame::new(data, PixelFormat::Rgb565, None);
        assert_eq!(frame.stride(), 0);
        assert!(!frame.is_renderable());
    }
}
