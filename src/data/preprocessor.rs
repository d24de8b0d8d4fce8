// ============================================================
// Layer 4 - Image Preprocessor
// ============================================================
// Turns one encoded image file into the flat pixel buffer the
// batcher expects.
//
// Steps (applied in order):
//   1. Decode the file (format picked from the content)
//   2. Convert to RGB, or to single-channel luma for 1-channel input
//   3. Resize to the target size with nearest-neighbour sampling
//   4. Multiply every value by the rescale factor (1/255 by default)
//   5. Lay the values out channel-first: all of R, then G, then B
//
// Aspect ratio is not preserved; every image is stretched to the
// target size.

use anyhow::{bail, Context, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView, Pixel};
use std::path::Path;

use crate::domain::input_shape::InputShape;

/// Default rescale factor mapping 8-bit pixels to [0, 1].
pub const RESCALE: f32 = 1.0 / 255.0;

#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    target: InputShape,
    rescale: f32,
}

impl ImagePreprocessor {
    pub fn new(target: InputShape, rescale: f32) -> Result<Self> {
        if target.channels != 1 && target.channels != 3 {
            bail!(
                "Unsupported channel count {} (expected 1 or 3)",
                target.channels
            );
        }
        if target.height == 0 || target.width == 0 {
            bail!("Target size must be non-zero, got {}", target);
        }
        Ok(Self { target, rescale })
    }

    pub fn target(&self) -> InputShape {
        self.target
    }

    /// Decode and preprocess the image stored at `path`.
    pub fn load(&self, path: &Path) -> Result<Vec<f32>> {
        let img = image::open(path)
            .with_context(|| format!("Cannot decode image '{}'", path.display()))?;
        Ok(self.process(&img))
    }

    /// Preprocess an already decoded image.
    /// Output length is `channels * height * width`.
    pub fn process(&self, img: &DynamicImage) -> Vec<f32> {
        let (w, h) = (self.target.width as u32, self.target.height as u32);

        let resized = if img.dimensions() == (w, h) {
            img.clone()
        } else {
            img.resize_exact(w, h, FilterType::Nearest)
        };

        match self.target.channels {
            1 => channel_first(&resized.to_luma8(), self.rescale),
            _ => channel_first(&resized.to_rgb8(), self.rescale),
        }
    }
}

fn channel_first<P>(img: &image::ImageBuffer<P, Vec<u8>>, rescale: f32) -> Vec<f32>
where
    P: Pixel<Subpixel = u8>,
{
    let channels = P::CHANNEL_COUNT as usize;
    let (w, h) = img.dimensions();
    let plane = (w * h) as usize;
    let mut out = vec![0.0f32; channels * plane];

    for (i, pixel) in img.pixels().enumerate() {
        for (c, value) in pixel.channels().iter().enumerate() {
            out[c * plane + i] = f32::from(*value) * rescale;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-6, "{a} != {b}");
    }

    #[test]
    fn test_resize_and_channel_first_layout() {
        let p = ImagePreprocessor::new(InputShape::new(3, 3, 3), RESCALE).unwrap();
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 2, Rgb([255, 0, 51])));

        let out = p.process(&img);

        assert_eq!(out.len(), 27);
        out[0..9].iter().for_each(|v| assert_close(*v, 1.0));
        out[9..18].iter().for_each(|v| assert_close(*v, 0.0));
        out[18..27].iter().for_each(|v| assert_close(*v, 0.2));
    }

    #[test]
    fn test_values_stay_in_unit_range() {
        let p = ImagePreprocessor::new(InputShape::new(8, 8, 3), RESCALE).unwrap();
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(5, 7, |x, y| {
            Rgb([(x * 50) as u8, (y * 30) as u8, 255])
        }));

        let out = p.process(&img);
        assert_eq!(out.len(), 3 * 8 * 8);
        assert!(out.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_grayscale_is_expanded_to_rgb() {
        let p = ImagePreprocessor::new(InputShape::new(2, 2, 3), RESCALE).unwrap();
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([255])));

        let out = p.process(&img);
        assert_eq!(out.len(), 12);
        out.iter().for_each(|v| assert_close(*v, 1.0));
    }

    #[test]
    fn test_single_channel_target() {
        let p = ImagePreprocessor::new(InputShape::new(2, 2, 1), RESCALE).unwrap();
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([255, 255, 255])));
        assert_eq!(p.process(&img).len(), 4);
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        RgbImage::from_pixel(10, 10, Rgb([255, 0, 0])).save(&path).unwrap();

        let p = ImagePreprocessor::new(InputShape::default(), RESCALE).unwrap();
        let out = p.load(&path).unwrap();
        assert_eq!(out.len(), 150 * 150 * 3);
        assert_close(out[0], 1.0);
        assert_close(out[150 * 150], 0.0);
    }

    #[test]
    fn test_undecodable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();

        let p = ImagePreprocessor::new(InputShape::default(), RESCALE).unwrap();
        let err = p.load(&path).unwrap_err();
        assert!(err.to_string().contains("Cannot decode image"));
    }

    #[test]
    fn test_rejects_unsupported_channels() {
        assert!(ImagePreprocessor::new(InputShape::new(4, 4, 2), RESCALE).is_err());
        assert!(ImagePreprocessor::new(InputShape::new(0, 4, 3), RESCALE).is_err());
    }
}
