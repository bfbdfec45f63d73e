//! Best-effort image compression
//!
//! Images larger than the policy envelope are downscaled and re-encoded in their
//! own format. Anything that goes wrong falls back to the original bytes with a
//! warning; compression never fails an upload.

use bytes::Bytes;
use vitrine_core::{CompressionPolicy, PreparedAsset, QualityPreset, UploadRequest};

use crate::mime::is_image;

#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Unsupported image format: {0}")]
    Unsupported(String),
}

/// Formats that are re-encoded; everything else passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Jpeg,
    Png,
    WebP,
}

impl OutputFormat {
    fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            "image/jpeg" => Some(OutputFormat::Jpeg),
            "image/png" => Some(OutputFormat::Png),
            "image/webp" => Some(OutputFormat::WebP),
            _ => None,
        }
    }
}

/// Compress an upload request's payload off the async runtime.
pub async fn compress(request: &UploadRequest, content_type: &str) -> PreparedAsset {
    let data = request.data.clone();
    let file_name = request.file_name.clone();
    let content_type = content_type.to_string();
    let policy = request.compression.clone();

    let fallback = PreparedAsset {
        data: data.clone(),
        content_type: content_type.clone(),
        original_file_name: file_name.clone(),
        original_size: data.len(),
        compressed: false,
        warnings: Vec::new(),
    };

    run_off_runtime(fallback, move || {
        compress_blocking(data, &file_name, &content_type, &policy)
    })
    .await
}

/// Run CPU-bound work on the blocking pool. A panicking task yields `fallback`
/// with a warning instead of taking the caller down.
async fn run_off_runtime<F>(fallback: PreparedAsset, work: F) -> PreparedAsset
where
    F: FnOnce() -> PreparedAsset + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(asset) => asset,
        Err(e) => {
            tracing::warn!(
                error = %e,
                file_name = %fallback.original_file_name,
                "Compression task failed, uploading original"
            );
            PreparedAsset {
                warnings: vec![format!("compression skipped: {}", e)],
                ..fallback
            }
        }
    }
}

/// Synchronous compression. CPU-bound; call from `spawn_blocking`.
pub fn compress_blocking(
    data: Bytes,
    file_name: &str,
    content_type: &str,
    policy: &CompressionPolicy,
) -> PreparedAsset {
    let original_size = data.len();
    let mut asset = PreparedAsset {
        data,
        content_type: content_type.to_string(),
        original_file_name: file_name.to_string(),
        original_size,
        compressed: false,
        warnings: Vec::new(),
    };

    if !is_image(content_type) {
        return asset;
    }

    let format = OutputFormat::from_content_type(content_type);
    if policy.enabled {
        if let Some(format) = format {
            match reencode(&asset.data, format, policy) {
                Ok(Some(encoded)) if encoded.len() < asset.data.len() => {
                    tracing::debug!(
                        file_name = %file_name,
                        original_size = original_size,
                        compressed_size = encoded.len(),
                        "Image compressed"
                    );
                    asset.data = encoded;
                    asset.compressed = true;
                    // Re-encoded output carries no metadata
                    return asset;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        file_name = %file_name,
                        content_type = %content_type,
                        "Compression failed, uploading original"
                    );
                    asset.warnings.push(format!("compression failed: {}", e));
                }
            }
        }
    }

    if policy.strip_metadata {
        if let Some(stripped) = strip_metadata(&asset.data) {
            if stripped.len() < asset.data.len() {
                asset.data = stripped;
            }
        }
    }

    asset
}

/// Re-encode when the image is outside the envelope. `Ok(None)` means it already fits.
#[cfg(feature = "image")]
fn reencode(
    data: &[u8],
    format: OutputFormat,
    policy: &CompressionPolicy,
) -> Result<Option<Bytes>, CompressionError> {
    use image::{GenericImageView, ImageReader};
    use std::io::Cursor;

    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| CompressionError::Decode(e.to_string()))?
        .decode()
        .map_err(|e| CompressionError::Decode(e.to_string()))?;

    let (width, height) = img.dimensions();
    let oversized = width.max(height) > policy.max_dimension;
    if !oversized && data.len() <= policy.max_size_bytes {
        return Ok(None);
    }

    let img = if oversized {
        img.resize(
            policy.max_dimension,
            policy.max_dimension,
            image::imageops::FilterType::Lanczos3,
        )
    } else {
        img
    };

    let mut encoded = encode(&img, format, policy.quality)?;

    // Lossy formats get one more pass at the lowest preset when still over budget
    if encoded.len() > policy.max_size_bytes
        && format != OutputFormat::Png
        && policy.quality != QualityPreset::Lightest
    {
        let lighter = encode(&img, format, QualityPreset::Lightest)?;
        if lighter.len() < encoded.len() {
            encoded = lighter;
        }
    }

    Ok(Some(encoded))
}

#[cfg(not(feature = "image"))]
fn reencode(
    _data: &[u8],
    format: OutputFormat,
    _policy: &CompressionPolicy,
) -> Result<Option<Bytes>, CompressionError> {
    Err(CompressionError::Unsupported(format!("{:?}", format)))
}

#[cfg(feature = "image")]
fn encode(
    img: &image::DynamicImage,
    format: OutputFormat,
    quality: QualityPreset,
) -> Result<Bytes, CompressionError> {
    match format {
        OutputFormat::Jpeg => compress_jpeg(img, quality),
        OutputFormat::Png => compress_png(img),
        OutputFormat::WebP => compress_webp(img, quality),
    }
}

/// Compress to JPEG using mozjpeg
#[cfg(feature = "image")]
fn compress_jpeg(img: &image::DynamicImage, quality: QualityPreset) -> Result<Bytes, CompressionError> {
    let rgb_img = img.to_rgb8();
    let (width, height) = rgb_img.dimensions();

    // libjpeg errors surface as panics
    let encoded = std::panic::catch_unwind(std::panic::AssertUnwindSafe(
        || -> std::io::Result<Vec<u8>> {
            let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
            comp.set_size(width as usize, height as usize);
            comp.set_quality(quality.jpeg_quality() as f32);
            comp.set_progressive_mode();
            comp.set_optimize_coding(true);

            let mut comp = comp.start_compress(Vec::new())?;
            comp.write_scanlines(&rgb_img)?;
            comp.finish()
        },
    ))
    .map_err(|_| CompressionError::Encode("JPEG encoder panicked".to_string()))?
    .map_err(|e| CompressionError::Encode(e.to_string()))?;

    Ok(Bytes::from(encoded))
}

/// Compress to PNG (lossless, best compression)
#[cfg(feature = "image")]
fn compress_png(img: &image::DynamicImage) -> Result<Bytes, CompressionError> {
    use image::codecs::png::{CompressionType, FilterType, PngEncoder};

    let mut buffer = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, FilterType::Adaptive);
    img.write_with_encoder(encoder)
        .map_err(|e| CompressionError::Encode(e.to_string()))?;

    Ok(Bytes::from(buffer))
}

/// Compress to WebP
#[cfg(feature = "image")]
fn compress_webp(img: &image::DynamicImage, quality: QualityPreset) -> Result<Bytes, CompressionError> {
    let rgba_img = img.to_rgba8();
    let (width, height) = rgba_img.dimensions();

    let encoder = webp::Encoder::from_rgba(&rgba_img, width, height);
    let webp_data = encoder.encode(quality.webp_quality());

    Ok(Bytes::copy_from_slice(&webp_data))
}

/// Drop EXIF from JPEG, PNG and WebP payloads. `None` when the format is not handled.
#[cfg(feature = "image")]
fn strip_metadata(data: &Bytes) -> Option<Bytes> {
    use img_parts::{jpeg::Jpeg, png::Png, webp::WebP, ImageEXIF};

    if let Ok(mut jpeg) = Jpeg::from_bytes(data.clone()) {
        jpeg.set_exif(None);
        return Some(jpeg.encoder().bytes());
    }

    if let Ok(mut png) = Png::from_bytes(data.clone()) {
        png.set_exif(None);
        return Some(png.encoder().bytes());
    }

    if let Ok(mut webp) = WebP::from_bytes(data.clone()) {
        webp.set_exif(None);
        return Some(webp.encoder().bytes());
    }

    None
}

#[cfg(not(feature = "image"))]
fn strip_metadata(_data: &Bytes) -> Option<Bytes> {
    None
}

#[cfg(all(test, feature = "image"))]
mod tests {
    use super::*;
    use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn pattern(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
        }))
    }

    fn jpeg_fixture(width: u32, height: u32) -> Bytes {
        let mut buffer = Vec::new();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, 100);
        pattern(width, height).write_with_encoder(encoder).unwrap();
        Bytes::from(buffer)
    }

    fn png_fixture(width: u32, height: u32) -> Bytes {
        let mut buffer = Vec::new();
        pattern(width, height)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        Bytes::from(buffer)
    }

    fn policy(max_dimension: u32) -> CompressionPolicy {
        CompressionPolicy {
            max_dimension,
            max_size_bytes: 1024 * 1024,
            ..CompressionPolicy::default()
        }
    }

    #[tokio::test]
    async fn test_panicking_task_falls_back_to_original() {
        let original = png_fixture(4, 4);
        let fallback = PreparedAsset {
            data: original.clone(),
            content_type: "image/png".to_string(),
            original_file_name: "a.png".to_string(),
            original_size: original.len(),
            compressed: false,
            warnings: Vec::new(),
        };

        let asset = run_off_runtime(fallback, || panic!("encoder blew up")).await;

        assert_eq!(asset.data, original);
        assert!(!asset.compressed);
        assert_eq!(asset.warnings.len(), 1);
        assert!(asset.warnings[0].starts_with("compression skipped"));
    }

    #[test]
    fn test_oversized_jpeg_is_downscaled() {
        let original = jpeg_fixture(400, 200);
        let asset = compress_blocking(original.clone(), "a.jpg", "image/jpeg", &policy(100));

        assert!(asset.compressed);
        assert!(asset.size() < original.len());
        assert_eq!(asset.content_type, "image/jpeg");
        assert_eq!(asset.original_size, original.len());
        assert!(asset.warnings.is_empty());

        let decoded = image::load_from_memory(&asset.data).unwrap();
        assert_eq!(decoded.dimensions(), (100, 50));
    }

    #[test]
    fn test_compression_is_idempotent_in_size() {
        let original = png_fixture(300, 300);
        let first = compress_blocking(original, "a.png", "image/png", &policy(120));
        let second = compress_blocking(first.data.clone(), "a.png", "image/png", &policy(120));

        assert!(second.size() <= first.size());
    }

    #[test]
    fn test_image_within_envelope_is_not_reencoded() {
        let original = png_fixture(32, 32);
        let asset = compress_blocking(original.clone(), "a.png", "image/png", &policy(1920));

        assert!(!asset.compressed);
        assert!(asset.size() <= original.len());
    }

    #[test]
    fn test_broken_image_falls_back_to_original() {
        let mut broken = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        broken.extend_from_slice(&[0xAB; 64]);
        let mut policy = policy(1920);
        policy.max_size_bytes = 10;

        let original = Bytes::from(broken);
        let asset = compress_blocking(original.clone(), "a.png", "image/png", &policy);

        assert!(!asset.compressed);
        assert_eq!(asset.data, original);
        assert_eq!(asset.warnings.len(), 1);
        assert!(asset.warnings[0].starts_with("compression failed"));
    }

    #[test]
    fn test_non_image_passes_through() {
        let original = Bytes::from_static(b"%PDF-1.7 body");
        let asset = compress_blocking(original.clone(), "a.pdf", "application/pdf", &policy(10));

        assert_eq!(asset.data, original);
        assert!(!asset.compressed);
        assert!(asset.warnings.is_empty());
    }

    #[test]
    fn test_disabled_policy_keeps_size() {
        let original = jpeg_fixture(400, 200);
        let asset = compress_blocking(
            original.clone(),
            "a.jpg",
            "image/jpeg",
            &CompressionPolicy::disabled(),
        );
        assert!(!asset.compressed);
        assert!(asset.size() <= original.len());
    }

    #[tokio::test]
    async fn test_async_compress_uses_request_policy() {
        let request = UploadRequest::new(
            "a.jpg",
            jpeg_fixture(400, 200),
            vitrine_core::Destination::default(),
        )
        .with_compression(policy(100));

        let asset = compress(&request, "image/jpeg").await;
        assert!(asset.compressed);
        assert_eq!(asset.original_file_name, "a.jpg");
    }
}
