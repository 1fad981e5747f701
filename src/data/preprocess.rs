// ============================================================
// Layer 4 - Image Preprocessing
// ============================================================
// Turns an image file into the flat CHW float layout the
// batcher stacks into tensors:
//
//   decode → RGB → resize shorter side to size*256/224
//          → center crop size×size → CHW in [0, 1]
//
// Mean/std normalisation happens later, in the batcher.

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, ImageReader};
use std::path::Path;

/// Decode an image file, guessing the format from its content.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)
        .with_context(|| format!("Cannot open image '{}'", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("Cannot read image '{}'", path.display()))?
        .decode()
        .with_context(|| format!("Cannot decode image '{}'", path.display()))
}

/// Resize so the shorter side is `size * 256 / 224`, then center crop to `size`.
pub fn resize_and_crop(img: &DynamicImage, size: usize) -> DynamicImage {
    let size  = size as u32;
    let short = ((size as f64) * 256.0 / 224.0).round() as u32;

    let (w, h) = (img.width().max(1), img.height().max(1));
    let (new_w, new_h) = if w <= h {
        (short, ((h as f64) * short as f64 / w as f64).round().max(short as f64) as u32)
    } else {
        (((w as f64) * short as f64 / h as f64).round().max(short as f64) as u32, short)
    };

    let resized = img.resize_exact(new_w, new_h, FilterType::Triangle);
    let x = (new_w - size) / 2;
    let y = (new_h - size) / 2;
    resized.crop_imm(x, y, size, size)
}

/// Flatten an image into CHW order with channel values scaled to [0, 1].
pub fn to_chw(img: &DynamicImage) -> Vec<f32> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let plane = (width * height) as usize;

    let mut out = vec![0.0f32; 3 * plane];
    for (i, pixel) in rgb.pixels().enumerate() {
        out[i]             = pixel[0] as f32 / 255.0;
        out[plane + i]     = pixel[1] as f32 / 255.0;
        out[2 * plane + i] = pixel[2] as f32 / 255.0;
    }
    out
}

/// Full pipeline for one file
pub fn preprocess_file(path: &Path, size: usize) -> Result<Vec<f32>> {
    let img = load_image(path)?;
    Ok(to_chw(&resize_and_crop(&img, size)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn crop_is_square_at_requested_size() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(64, 32));
        let out = resize_and_crop(&img, 16);
        assert_eq!((out.width(), out.height()), (16, 16));

        let tall = DynamicImage::ImageRgb8(RgbImage::new(10, 90));
        let out = resize_and_crop(&tall, 24);
        assert_eq!((out.width(), out.height()), (24, 24));
    }

    #[test]
    fn chw_layout_separates_channels() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([255, 0, 51])));
        let chw = to_chw(&img);
        assert_eq!(chw.len(), 12);
        assert!(chw[..4].iter().all(|v| *v == 1.0));
        assert!(chw[4..8].iter().all(|v| *v == 0.0));
        assert!(chw[8..].iter().all(|v| (*v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn preprocess_reads_file_from_disk() {
        let dir  = TempDir::new().unwrap();
        let path = dir.path().join("red.png");
        RgbImage::from_pixel(30, 20, Rgb([255, 0, 0])).save(&path).unwrap();

        let chw = preprocess_file(&path, 8).unwrap();
        assert_eq!(chw.len(), 3 * 8 * 8);
        assert!(chw.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!((chw[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let dir  = TempDir::new().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(preprocess_file(&path, 8).is_err());
    }
}
