use image::RgbImage;

use super::Rect;

/// Pixelate `rect` in place: every `block`×`block` cell of a grid aligned to
/// the image origin is filled with its average colour. Cells are clipped to
/// the image.
pub fn mosaic(image: &mut RgbImage, rect: Rect, block: u32) {
    if block == 0 || rect.width == 0 || rect.height == 0 {
        return;
    }
    let (img_w, img_h) = image.dimensions();
    let b = i64::from(block);

    let x0 = i64::from(rect.x).div_euclid(b) * b;
    let y0 = i64::from(rect.y).div_euclid(b) * b;
    let x1 = (i64::from(rect.x) + i64::from(rect.width) + b - 1).div_euclid(b) * b;
    let y1 = (i64::from(rect.y) + i64::from(rect.height) + b - 1).div_euclid(b) * b;

    let x0 = x0.clamp(0, i64::from(img_w)) as u32;
    let y0 = y0.clamp(0, i64::from(img_h)) as u32;
    let x1 = x1.clamp(0, i64::from(img_w)) as u32;
    let y1 = y1.clamp(0, i64::from(img_h)) as u32;

    for cy in (y0..y1).step_by(block as usize) {
        for cx in (x0..x1).step_by(block as usize) {
            let cw = block.min(img_w - cx);
            let ch = block.min(img_h - cy);
            fill_average(image, cx, cy, cw, ch);
        }
    }
}

fn fill_average(image: &mut RgbImage, x: u32, y: u32, w: u32, h: u32) {
    let mut sum = [0u64; 3];
    for py in y..y + h {
        for px in x..x + w {
            let p = image.get_pixel(px, py).0;
            for c in 0..3 {
                sum[c] += u64::from(p[c]);
            }
        }
    }
    let n = u64::from(w * h);
    let avg = sum.map(|s| ((s + n / 2) / n) as u8);
    for py in y..y + h {
        for px in x..x + w {
            image.get_pixel_mut(px, py).0 = avg;
        }
    }
}
