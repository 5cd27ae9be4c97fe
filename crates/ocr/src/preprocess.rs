use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Luma};
use snap_core::AppConfig;
use std::path::Path;
use thiserror::Error;

use crate::types::PreparedImage;

/// Nominal resolution of a phone or desktop screenshot.
const SCREEN_DPI: u32 = 96;
/// Upper bound on the long side after DPI scaling.
const MAX_LONG_SIDE: u32 = 4000;
/// Anything smaller cannot hold a readable transaction.
const MIN_SIDE: u32 = 50;

#[derive(Debug, Error)]
pub enum InvalidImage {
    #[error("cannot read image: {0}")]
    Unreadable(#[from] std::io::Error),
    #[error("image is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
    #[error("unrecognized image data")]
    UnknownFormat,
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image too small: {width}x{height} (minimum 50x50)")]
    TooSmall { width: u32, height: u32 },
}

#[derive(Debug, Clone)]
pub struct PrepareOptions {
    pub target_dpi: u32,
    pub max_bytes: u64,
    pub preprocess: bool,
    pub binarize: bool,
    pub formats: Vec<ImageFormat>,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl PrepareOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        let formats = config
            .supported_formats
            .iter()
            .filter_map(|ext| ImageFormat::from_extension(ext.trim_start_matches('.')))
            .fold(Vec::new(), |mut acc, f| {
                if !acc.contains(&f) {
                    acc.push(f);
                }
                acc
            });
        Self {
            target_dpi: config.ocr.dpi,
            max_bytes: config.max_image_size,
            preprocess: config.ocr.preprocess,
            binarize: config.ocr.binarize,
            formats,
        }
    }
}

/// Validates raw image data and normalizes it for OCR.
///
/// All checks that are cheap (size, sniffed format) run before decoding.
/// Output is a pure function of the input bytes and the options.
#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    options: PrepareOptions,
}

impl ImagePreprocessor {
    pub fn new(options: PrepareOptions) -> Self {
        Self { options }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(PrepareOptions::from_config(config))
    }

    pub fn options(&self) -> &PrepareOptions {
        &self.options
    }

    /// Size-check the file on disk before reading it, then [`Self::prepare`].
    pub fn prepare_file(&self, path: &Path) -> Result<PreparedImage, InvalidImage> {
        let size = std::fs::metadata(path)?.len();
        self.check_size(size)?;
        let data = std::fs::read(path)?;
        self.prepare(&data)
    }

    pub fn prepare(&self, data: &[u8]) -> Result<PreparedImage, InvalidImage> {
        self.check_size(data.len() as u64)?;

        let format = image::guess_format(data).map_err(|_| InvalidImage::UnknownFormat)?;
        if !self.options.formats.contains(&format) {
            return Err(InvalidImage::UnsupportedFormat(format!("{format:?}")));
        }

        let img = image::load_from_memory_with_format(data, format)?;
        if img.width() < MIN_SIDE || img.height() < MIN_SIDE {
            return Err(InvalidImage::TooSmall {
                width: img.width(),
                height: img.height(),
            });
        }

        let image = if self.options.preprocess {
            normalize(img, self.options.target_dpi, self.options.binarize)
        } else {
            img
        };

        tracing::debug!(
            "Prepared {:?} image: {}x{}",
            format,
            image.width(),
            image.height()
        );

        Ok(PreparedImage {
            image,
            source_format: format,
            dpi: self.options.target_dpi,
        })
    }

    fn check_size(&self, size: u64) -> Result<(), InvalidImage> {
        if size > self.options.max_bytes {
            return Err(InvalidImage::TooLarge {
                size,
                limit: self.options.max_bytes,
            });
        }
        Ok(())
    }
}

/// DPI scale → grayscale → contrast stretch → median denoise → optional Otsu.
fn normalize(img: DynamicImage, dpi: u32, binarize: bool) -> DynamicImage {
    let img = rescale_for_dpi(img, dpi);
    let gray = median_3x3(&stretch_contrast(img.to_luma8()));
    let gray = if binarize { otsu_binarize(gray) } else { gray };
    DynamicImage::ImageLuma8(gray)
}

fn rescale_for_dpi(img: DynamicImage, dpi: u32) -> DynamicImage {
    let long_side = img.width().max(img.height());
    let scaled = (u64::from(long_side) * u64::from(dpi) / u64::from(SCREEN_DPI)) as u32;
    let target = scaled.clamp(1, MAX_LONG_SIDE);
    if target == long_side {
        return img;
    }
    img.resize(target, target, FilterType::Lanczos3)
}

fn stretch_contrast(gray: GrayImage) -> GrayImage {
    let (min_px, max_px) = gray
        .pixels()
        .fold((255u8, 0u8), |(mn, mx), p| (mn.min(p[0]), mx.max(p[0])));

    if max_px == min_px {
        return gray;
    }

    let range = (max_px - min_px) as u32;
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let p = gray.get_pixel(x, y)[0];
        Luma([((p - min_px) as u32 * 255 / range) as u8])
    })
}

/// Removes isolated speckle left by screenshot compression.
fn median_3x3(gray: &GrayImage) -> GrayImage {
    let (w, h) = gray.dimensions();
    ImageBuffer::from_fn(w, h, |x, y| {
        let mut window = [0u8; 9];
        let mut i = 0;
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let nx = (x as i64 + dx).clamp(0, w as i64 - 1) as u32;
                let ny = (y as i64 + dy).clamp(0, h as i64 - 1) as u32;
                window[i] = gray.get_pixel(nx, ny)[0];
                i += 1;
            }
        }
        window.sort_unstable();
        Luma([window[4]])
    })
}

fn otsu_threshold(gray: &GrayImage) -> Option<u8> {
    let mut histogram = [0u64; 256];
    for p in gray.pixels() {
        histogram[p[0] as usize] += 1;
    }
    if histogram.iter().filter(|&&n| n > 0).count() < 2 {
        return None;
    }

    let total = f64::from(gray.width()) * f64::from(gray.height());
    let weighted_sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(v, &n)| v as f64 * n as f64)
        .sum();

    let mut background = 0.0;
    let mut background_sum = 0.0;
    let mut best = (0u8, -1.0f64);
    for (t, &count) in histogram.iter().enumerate() {
        background += count as f64;
        if background == 0.0 {
            continue;
        }
        let foreground = total - background;
        if foreground == 0.0 {
            break;
        }
        background_sum += t as f64 * count as f64;
        let mean_b = background_sum / background;
        let mean_f = (weighted_sum - background_sum) / foreground;
        let between = background * foreground * (mean_b - mean_f).powi(2);
        if between > best.1 {
            best = (t as u8, between);
        }
    }
    Some(best.0)
}

fn otsu_binarize(gray: GrayImage) -> GrayImage {
    let Some(threshold) = otsu_threshold(&gray) else {
        return gray;
    };
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let v = if gray.get_pixel(x, y)[0] > threshold { 255 } else { 0 };
        Luma([v])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn solid_gray(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(ImageBuffer::from_fn(width, height, |_, _| Luma([value])))
    }

    fn gradient_gray(width: u32, height: u32) -> GrayImage {
        ImageBuffer::from_fn(width, height, |x, _| Luma([(x * 255 / width) as u8]))
    }

    /// Dark "text" stripes on a light background, in colour.
    fn screenshot_like(width: u32, height: u32) -> DynamicImage {
        let img: RgbImage = ImageBuffer::from_fn(width, height, |_, y| {
            if (y / 4) % 3 == 0 {
                Rgb([30, 30, 40])
            } else {
                Rgb([235, 240, 250])
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    fn options(preprocess: bool) -> PrepareOptions {
        PrepareOptions {
            target_dpi: 96,
            preprocess,
            ..PrepareOptions::default()
        }
    }

    #[test]
    fn default_formats_cover_png_jpeg_tiff_bmp() {
        let opts = PrepareOptions::default();
        for f in [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Tiff, ImageFormat::Bmp] {
            assert!(opts.formats.contains(&f), "{f:?} missing");
        }
        assert_eq!(opts.formats.len(), 4);
        assert_eq!(opts.max_bytes, 10_000_000);
    }

    #[test]
    fn preprocessor_follows_config() {
        let mut config = AppConfig::default();
        config.max_image_size = 2048;
        config.ocr.dpi = 150;
        config.ocr.preprocess = false;
        config.supported_formats = vec![".png".into(), "PNG".into()];
        let pre = ImagePreprocessor::from_config(&config);
        assert_eq!(pre.options().max_bytes, 2048);
        assert_eq!(pre.options().target_dpi, 150);
        assert!(!pre.options().preprocess);
        assert_eq!(pre.options().formats, vec![ImageFormat::Png]);
    }

    #[test]
    fn oversized_data_rejected_before_decoding() {
        let pre = ImagePreprocessor::new(PrepareOptions {
            max_bytes: 16,
            ..PrepareOptions::default()
        });
        // Not an image at all: the size check must fire first.
        let err = pre.prepare(&[0u8; 64]).unwrap_err();
        assert!(matches!(err, InvalidImage::TooLarge { size: 64, limit: 16 }));
    }

    #[test]
    fn oversized_file_rejected_from_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        std::fs::write(&path, encode(&screenshot_like(60, 60), ImageFormat::Png)).unwrap();
        let pre = ImagePreprocessor::new(PrepareOptions {
            max_bytes: 10,
            ..PrepareOptions::default()
        });
        assert!(matches!(
            pre.prepare_file(&path),
            Err(InvalidImage::TooLarge { .. })
        ));
    }

    #[test]
    fn missing_file_is_unreadable() {
        let pre = ImagePreprocessor::default();
        assert!(matches!(
            pre.prepare_file(Path::new("/no/such/image.png")),
            Err(InvalidImage::Unreadable(_))
        ));
    }

    #[test]
    fn garbage_is_unknown_format() {
        let pre = ImagePreprocessor::default();
        assert!(matches!(
            pre.prepare(b"definitely not an image"),
            Err(InvalidImage::UnknownFormat)
        ));
    }

    #[test]
    fn gif_is_unsupported() {
        let pre = ImagePreprocessor::default();
        let err = pre.prepare(b"GIF89a\x01\x00\x01\x00\x00\x00\x00;").unwrap_err();
        assert!(matches!(err, InvalidImage::UnsupportedFormat(_)));
    }

    #[test]
    fn truncated_png_fails_to_decode() {
        let mut bytes = encode(&screenshot_like(60, 60), ImageFormat::Png);
        bytes.truncate(40);
        let err = ImagePreprocessor::default().prepare(&bytes).unwrap_err();
        assert!(matches!(err, InvalidImage::Decode(_)));
    }

    #[test]
    fn tiny_image_is_rejected() {
        let bytes = encode(&solid_gray(10, 10, 200), ImageFormat::Png);
        let err = ImagePreprocessor::default().prepare(&bytes).unwrap_err();
        assert!(matches!(err, InvalidImage::TooSmall { width: 10, height: 10 }));
    }

    #[test]
    fn disabled_preprocessing_passes_image_through() {
        let original = screenshot_like(64, 64);
        let bytes = encode(&original, ImageFormat::Png);
        let prepared = ImagePreprocessor::new(options(false)).prepare(&bytes).unwrap();
        assert_eq!(prepared.source_format, ImageFormat::Png);
        assert_eq!(prepared.image.to_rgb8(), original.to_rgb8());
    }

    #[test]
    fn enabled_preprocessing_yields_binary_grayscale() {
        let bytes = encode(&screenshot_like(64, 64), ImageFormat::Png);
        let prepared = ImagePreprocessor::new(options(true)).prepare(&bytes).unwrap();
        let gray = prepared.image.as_luma8().expect("grayscale output");
        assert!(gray.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert!(gray.pixels().any(|p| p[0] == 0));
        assert!(gray.pixels().any(|p| p[0] == 255));
    }

    #[test]
    fn prepare_is_deterministic() {
        let bytes = encode(&screenshot_like(80, 120), ImageFormat::Bmp);
        let pre = ImagePreprocessor::default();
        let a = pre.prepare(&bytes).unwrap();
        let b = pre.prepare(&bytes).unwrap();
        assert_eq!(a.image.as_bytes(), b.image.as_bytes());
    }

    #[test]
    fn dpi_scaling_upsamples_screenshots() {
        let img = rescale_for_dpi(solid_gray(100, 60, 200), 192);
        assert_eq!((img.width(), img.height()), (200, 120));
    }

    #[test]
    fn dpi_scaling_caps_long_side() {
        let img = rescale_for_dpi(solid_gray(5000, 100, 200), 96);
        assert!(img.width() <= MAX_LONG_SIDE && img.height() <= MAX_LONG_SIDE);
    }

    #[test]
    fn stretch_uniform_image_returns_same() {
        let gray = solid_gray(10, 10, 128).to_luma8();
        assert_eq!(stretch_contrast(gray.clone()), gray);
    }

    #[test]
    fn stretch_gradient_to_full_range() {
        let stretched = stretch_contrast(gradient_gray(256, 1));
        let min = stretched.pixels().map(|p| p[0]).min().unwrap();
        let max = stretched.pixels().map(|p| p[0]).max().unwrap();
        assert_eq!((min, max), (0, 255));
    }

    #[test]
    fn median_removes_single_speckle() {
        let mut gray = solid_gray(5, 5, 255).to_luma8();
        gray.put_pixel(2, 2, Luma([0]));
        let cleaned = median_3x3(&gray);
        assert_eq!(cleaned.get_pixel(2, 2)[0], 255);
    }

    #[test]
    fn otsu_splits_two_levels() {
        let gray: GrayImage =
            ImageBuffer::from_fn(10, 10, |x, _| Luma([if x < 5 { 40 } else { 210 }]));
        let t = otsu_threshold(&gray).unwrap();
        assert!((40..210).contains(&t));
        let bin = otsu_binarize(gray);
        assert_eq!(bin.get_pixel(0, 0)[0], 0);
        assert_eq!(bin.get_pixel(9, 0)[0], 255);
    }

    #[test]
    fn otsu_skips_uniform_image() {
        assert_eq!(otsu_threshold(&solid_gray(4, 4, 90).to_luma8()), None);
    }
}
