use image::RgbImage;

use super::{FaceDetector, Rect};

/// Reports the bounding box of every pixel close to a target colour as a
/// single detection. Stands in for a face detector on synthetic feeds.
pub struct ColorBlobDetector {
    target: [u8; 3],
    tolerance: u8,
    min_pixels: u32,
}

impl ColorBlobDetector {
    pub fn new(target: [u8; 3]) -> Self {
        Self {
            target,
            tolerance: 40,
            min_pixels: 16,
        }
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: u8) -> Self {
        self.tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn with_min_pixels(mut self, min_pixels: u32) -> Self {
        self.min_pixels = min_pixels;
        self
    }

    fn matches(&self, px: [u8; 3]) -> bool {
        px.iter()
            .zip(self.target)
            .all(|(&c, t)| c.abs_diff(t) <= self.tolerance)
    }
}

impl FaceDetector for ColorBlobDetector {
    fn detect(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Rect>> {
        let mut count = 0u32;
        let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
        let (mut max_x, mut max_y) = (0u32, 0u32);

        for (x, y, px) in image.enumerate_pixels() {
            if self.matches(px.0) {
                count += 1;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }

        if count == 0 || count < self.min_pixels {
            return Ok(Vec::new());
        }
        Ok(vec![Rect {
            x: min_x as i32,
            y: min_y as i32,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn square_at(x0: u32, y0: u32, edge: u32) -> RgbImage {
        RgbImage::from_fn(64, 48, |x, y| {
            if (x0..x0 + edge).contains(&x) && (y0..y0 + edge).contains(&y) {
                Rgb([250, 10, 5])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    #[test]
    fn finds_blob_bounds() {
        let mut detector = ColorBlobDetector::new([255, 0, 0]);
        let found = detector.detect(&square_at(10, 20, 8)).unwrap();
        assert_eq!(
            found,
            vec![Rect {
                x: 10,
                y: 20,
                width: 8,
                height: 8,
            }]
        );
    }

    #[test]
    fn ignores_other_colours() {
        let mut detector = ColorBlobDetector::new([0, 0, 255]);
        assert!(detector.detect(&square_at(10, 20, 8)).unwrap().is_empty());
    }

    #[test]
    fn small_blobs_are_noise() {
        let mut detector = ColorBlobDetector::new([255, 0, 0]).with_min_pixels(100);
        assert!(detector.detect(&square_at(0, 0, 8)).unwrap().is_empty());
        let mut strict = ColorBlobDetector::new([255, 0, 0]).with_tolerance(2);
        assert!(strict.detect(&square_at(0, 0, 8)).unwrap().is_empty());
    }
}
