//! Client-side image preparation: early validation, the oversized-image
//! re-encode pass, and data-URI previews.

use std::io::Cursor;
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ImageEncoder, Rgba, RgbaImage};
use tracing::debug;
use crate::config::SlotConfig;
use crate::core::{ImagePayload, ImageSource, Result, UploadError};

/// Files at or below this size upload as-is, whatever their format.
pub const OPTIMIZE_THRESHOLD: u64 = 1024 * 1024;

/// Neither output dimension exceeds this after optimization.
pub const MAX_DIMENSION: u32 = 800;

/// JPEG re-encode quality (the 0.8 of the original pipeline).
pub const JPEG_QUALITY: u8 = 80;

/// Reject a selection before any decoding or I/O happens.
pub fn validate(source: &ImageSource, config: &SlotConfig) -> Result<()> {
    let mime = source.mime.trim().to_ascii_lowercase();
    let accepted = config
        .accepted_types
        .iter()
        .any(|t| t.trim().eq_ignore_ascii_case(&mime));
    if !accepted {
        return Err(UploadError::validation(format!(
            "Invalid file type. Accepted formats: {}.",
            config.accepted_types.join(", ")
        )));
    }

    if source.size() > config.max_size {
        return Err(UploadError::validation(format!(
            "File size exceeds the limit of {}MB.",
            config.max_size / (1024 * 1024)
        )));
    }

    Ok(())
}

/// Scale so that neither edge exceeds [`MAX_DIMENSION`], preserving aspect
/// ratio. Width wins the tie when the image is at least as wide as it is
/// tall; images already inside the cap keep their dimensions.
pub fn target_dimensions(width: u32, height: u32) -> (u32, u32) {
    if width >= height && width > MAX_DIMENSION {
        let scaled = (height as f64 * MAX_DIMENSION as f64 / width as f64).round() as u32;
        (MAX_DIMENSION, scaled.max(1))
    } else if height > MAX_DIMENSION {
        let scaled = (width as f64 * MAX_DIMENSION as f64 / height as f64).round() as u32;
        (scaled.max(1), MAX_DIMENSION)
    } else {
        (width, height)
    }
}

/// Decode, resize under the dimension cap, flatten transparency onto white
/// and re-encode as JPEG. Always re-encodes, even when the dimensions
/// already fit.
pub fn optimize(source: &ImageSource) -> Result<ImagePayload> {
    let decoded = image::load_from_memory(&source.bytes)?;

    let (width, height) = (decoded.width(), decoded.height());
    let (target_w, target_h) = target_dimensions(width, height);
    let decoded = if (target_w, target_h) != (width, height) {
        decoded.resize_exact(target_w, target_h, FilterType::Triangle)
    } else {
        decoded
    };

    // White backdrop beneath the image, like a canvas fill before drawImage.
    let rgba = decoded.to_rgba8();
    let mut flattened = RgbaImage::from_pixel(target_w, target_h, Rgba([255, 255, 255, 255]));
    image::imageops::overlay(&mut flattened, &rgba, 0, 0);
    let rgb = image::DynamicImage::ImageRgba8(flattened).to_rgb8();

    let mut buffer = Vec::new();
    let mut cursor = Cursor::new(&mut buffer);
    let encoder = JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
    encoder.write_image(
        rgb.as_raw(),
        target_w,
        target_h,
        image::ExtendedColorType::Rgb8,
    )?;

    debug!(
        filename = %source.filename,
        original_bytes = source.size(),
        optimized_bytes = buffer.len(),
        width = target_w,
        height = target_h,
        "optimized image"
    );

    Ok(ImagePayload {
        filename: source.filename.clone(),
        mime: "image/jpeg".to_string(),
        bytes: buffer.into(),
        optimized: true,
        last_modified: Utc::now(),
    })
}

/// Produce the payload that will actually be transmitted: re-encoded JPEG
/// for sources above [`OPTIMIZE_THRESHOLD`], the untouched original bytes
/// otherwise. The threshold branch is load-bearing: small PNG/GIF files
/// must pass through bit-for-bit.
pub fn prepare(source: &ImageSource) -> Result<ImagePayload> {
    if source.size() > OPTIMIZE_THRESHOLD {
        optimize(source)
    } else {
        Ok(ImagePayload::passthrough(source))
    }
}

/// Base64 data URI for the optimistic local preview.
pub fn data_uri(payload: &ImagePayload) -> String {
    format!(
        "data:{};base64,{}",
        payload.mime,
        BASE64_STANDARD.encode(&payload.bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    fn encode(img: &RgbImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img.clone())
            .write_to(&mut buffer, format)
            .unwrap();
        buffer.into_inner()
    }

    // BMP stores pixels uncompressed, so dimensions alone pin the byte
    // size above or below the threshold.
    fn noise_bmp(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x ^ y) % 256) as u8])
        });
        encode(&img, ImageFormat::Bmp)
    }

    #[test]
    fn dimensions_landscape_scaled_by_width() {
        assert_eq!(target_dimensions(1600, 1200), (800, 600));
    }

    #[test]
    fn dimensions_portrait_scaled_by_height() {
        assert_eq!(target_dimensions(600, 1000), (480, 800));
    }

    #[test]
    fn dimensions_square_and_small_unchanged() {
        assert_eq!(target_dimensions(2000, 2000), (800, 800));
        assert_eq!(target_dimensions(640, 480), (640, 480));
        assert_eq!(target_dimensions(800, 800), (800, 800));
    }

    #[test]
    fn small_files_pass_through_bit_for_bit() {
        let img = RgbImage::from_pixel(64, 64, Rgb([10, 20, 30]));
        let png = encode(&img, ImageFormat::Png);
        assert!((png.len() as u64) <= OPTIMIZE_THRESHOLD);

        let source = ImageSource::new("avatar.png", "image/png", png.clone());
        let payload = prepare(&source).unwrap();

        assert!(!payload.optimized);
        assert_eq!(payload.mime, "image/png");
        assert_eq!(payload.bytes.as_ref(), png.as_slice());
        assert_eq!(payload.filename, "avatar.png");
    }

    #[test]
    fn large_files_become_capped_jpeg() {
        let bmp = noise_bmp(1200, 900);
        assert!((bmp.len() as u64) > OPTIMIZE_THRESHOLD);

        let source = ImageSource::new("holiday.bmp", "image/bmp", bmp);
        let payload = prepare(&source).unwrap();

        assert!(payload.optimized);
        assert_eq!(payload.mime, "image/jpeg");
        assert_eq!(payload.filename, "holiday.bmp");
        assert_eq!(
            image::guess_format(&payload.bytes).unwrap(),
            ImageFormat::Jpeg
        );

        let decoded = image::load_from_memory(&payload.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (800, 600));
    }

    #[test]
    fn large_file_within_dimension_cap_still_reencoded() {
        // 700x600 RGB is ~1.26 MB raw, over the threshold without needing a resize.
        let bmp = noise_bmp(700, 600);
        assert!((bmp.len() as u64) > OPTIMIZE_THRESHOLD);

        let source = ImageSource::new("scan.bmp", "image/bmp", bmp);
        let payload = prepare(&source).unwrap();

        assert!(payload.optimized);
        let decoded = image::load_from_memory(&payload.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (700, 600));
        assert_eq!(
            image::guess_format(&payload.bytes).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn transparency_is_flattened_onto_white() {
        let mut buffer = Cursor::new(Vec::new());
        let transparent = RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 0]));
        image::DynamicImage::ImageRgba8(transparent)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();

        let source = ImageSource::new("ghost.png", "image/png", buffer.into_inner());
        let payload = optimize(&source).unwrap();

        let decoded = image::load_from_memory(&payload.bytes).unwrap().to_rgb8();
        // JPEG may nudge values a little, but fully transparent pixels must
        // land on the white backdrop, not on black.
        for pixel in decoded.pixels() {
            assert!(pixel.0.iter().all(|&c| c > 250), "pixel {:?}", pixel);
        }
    }

    #[test]
    fn rejects_unaccepted_mime() {
        let config = SlotConfig::default();
        let source = ImageSource::new("clip.mp4", "video/mp4", vec![0u8; 16]);
        let err = validate(&source, &config).unwrap_err();
        assert!(
            err.to_string().starts_with("Invalid file type."),
            "{err}"
        );
    }

    #[test]
    fn rejects_oversized_file_with_exact_message() {
        let config = SlotConfig::default(); // 5 MB cap
        let source = ImageSource::new("big.png", "image/png", vec![0u8; 6 * 1024 * 1024]);
        let err = validate(&source, &config).unwrap_err();
        assert_eq!(err.to_string(), "File size exceeds the limit of 5MB.");
    }

    #[test]
    fn mime_comparison_is_case_insensitive() {
        let config = SlotConfig::default();
        let source = ImageSource::new("a.jpg", "IMAGE/JPEG", vec![0u8; 16]);
        assert!(validate(&source, &config).is_ok());
    }

    #[test]
    fn data_uri_carries_payload_mime() {
        let payload = ImagePayload {
            filename: "a.png".into(),
            mime: "image/png".into(),
            bytes: bytes::Bytes::from_static(b"abc"),
            optimized: false,
            last_modified: Utc::now(),
        };
        assert_eq!(data_uri(&payload), "data:image/png;base64,YWJj");
    }
}
