use image::RgbImage;

/// Channel order of an 8-bit, 4-byte destination surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Bgra,
    Rgba,
}

/// Expand one little-endian RGB565 pixel to 8-bit channels.
#[inline]
pub fn rgb565_to_rgb888(lo: u8, hi: u8) -> [u8; 3] {
    let v = u16::from_le_bytes([lo, hi]);
    let r = ((v >> 11) & 0x1f) as u8;
    let g = ((v >> 5) & 0x3f) as u8;
    let b = (v & 0x1f) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

/// Pack an 8-bit RGB colour into little-endian RGB565.
#[inline]
pub fn rgb888_to_rgb565(r: u8, g: u8, b: u8) -> [u8; 2] {
    let v = (u16::from(r >> 3) << 11) | (u16::from(g >> 2) << 5) | u16::from(b >> 3);
    v.to_le_bytes()
}

/// Convert the top-left `width`×`height` region of an RGB565 buffer with row
/// pitch `stride` into tightly packed 4-byte pixels, writing into `out`.
pub fn rgb565_to_rgbx(
    src: &[u8],
    stride: usize,
    width: usize,
    height: usize,
    order: ChannelOrder,
    out: &mut Vec<u8>,
) {
    out.clear();
    out.reserve(width * height * 4);
    for row in src.chunks_exact(stride).take(height) {
        for px in row[..width * 2].chunks_exact(2) {
            let [r, g, b] = rgb565_to_rgb888(px[0], px[1]);
            match order {
                ChannelOrder::Bgra => out.extend_from_slice(&[b, g, r, 0xff]),
                ChannelOrder::Rgba => out.extend_from_slice(&[r, g, b, 0xff]),
            }
        }
    }
}

/// Decode a whole RGB565 frame into an `RgbImage` for the vision path.
pub fn rgb565_to_image(src: &[u8], width: u32, height: u32) -> Option<RgbImage> {
    let pixels = (width as usize) * (height as usize);
    if width == 0 || height == 0 || src.len() < pixels * 2 {
        return None;
    }
    let mut raw = Vec::with_capacity(pixels * 3);
    for px in src[..pixels * 2].chunks_exact(2) {
        raw.extend_from_slice(&rgb565_to_rgb888(px[0], px[1]));
    }
    RgbImage::from_raw(width, height, raw)
}

/// Pack an `RgbImage` back into a tightly packed RGB565 buffer.
pub fn image_to_rgb565(image: &RgbImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(image.as_raw().len() / 3 * 2);
    for px in image.pixels() {
        let [r, g, b] = px.0;
        out.extend_from_slice(&rgb888_to_rgb565(r, g, b));
    }
    out
}
