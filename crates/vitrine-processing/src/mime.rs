//! Content-type detection
//!
//! The content type sent to storage is derived from the payload's magic bytes
//! first, the filename extension second, and only then the caller's claim.

use vitrine_core::constants::FALLBACK_CONTENT_TYPE;

/// Detect a content type from leading magic bytes.
pub fn sniff_content_type(data: &[u8]) -> Option<&'static str> {
    if data.len() < 4 {
        return None;
    }

    // JPEG: FF D8 FF
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }

    // PNG: 89 50 4E 47 0D 0A 1A 0A
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return Some("image/png");
    }

    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some("image/gif");
    }

    // RIFF container: WEBP or WAVE
    if data.len() >= 12 && data.starts_with(b"RIFF") {
        match &data[8..12] {
            b"WEBP" => return Some("image/webp"),
            b"WAVE" => return Some("audio/wav"),
            _ => {}
        }
    }

    // ISO base media: size(4) "ftyp" brand(4)
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return match &data[8..12] {
            b"avif" | b"avis" => Some("image/avif"),
            b"heic" | b"heix" | b"mif1" | b"msf1" => Some("image/heic"),
            b"qt  " => Some("video/quicktime"),
            b"M4A " => Some("audio/mp4"),
            _ => Some("video/mp4"),
        };
    }

    // EBML header (WebM / Matroska)
    if data.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some("video/webm");
    }

    if data.starts_with(b"%PDF") {
        return Some("application/pdf");
    }

    if data.starts_with(&[0x50, 0x4B, 0x03, 0x04]) {
        return Some("application/zip");
    }

    if data.starts_with(b"OggS") {
        return Some("audio/ogg");
    }

    if data.starts_with(b"ID3") || (data[0] == 0xFF && (data[1] & 0xE0) == 0xE0) {
        return Some("audio/mpeg");
    }

    if data.starts_with(b"BM") && data.len() >= 14 {
        return Some("image/bmp");
    }

    sniff_svg(data)
}

fn sniff_svg(data: &[u8]) -> Option<&'static str> {
    let head = &data[..data.len().min(512)];
    let text = std::str::from_utf8(head).ok()?;
    let text = text.trim_start_matches('\u{feff}').trim_start();
    if text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg")) {
        Some("image/svg+xml")
    } else {
        None
    }
}

/// Every content type accepted for an extension. Empty for unknown extensions.
pub fn content_types_for_extension(extension: &str) -> &'static [&'static str] {
    match extension.to_lowercase().as_str() {
        // Images
        "jpg" | "jpeg" => &["image/jpeg"],
        "png" => &["image/png"],
        "gif" => &["image/gif"],
        "webp" => &["image/webp"],
        "avif" => &["image/avif"],
        "heic" | "heif" => &["image/heic", "image/heif"],
        "svg" => &["image/svg+xml"],
        "bmp" => &["image/bmp"],
        "ico" => &["image/x-icon", "image/vnd.microsoft.icon"],
        // Videos
        "mp4" | "m4v" => &["video/mp4", "video/x-m4v"],
        "webm" => &["video/webm"],
        "mov" => &["video/quicktime"],
        // Audio
        "mp3" => &["audio/mpeg", "audio/mp3"],
        "wav" => &["audio/wav", "audio/wave", "audio/x-wav"],
        "ogg" => &["audio/ogg", "application/ogg"],
        "m4a" => &["audio/mp4", "audio/x-m4a"],
        // Documents
        "pdf" => &["application/pdf"],
        "zip" => &["application/zip"],
        "txt" => &["text/plain"],
        "csv" => &["text/csv"],
        "json" => &["application/json"],
        _ => &[],
    }
}

/// Whether files with this extension always start with a signature
/// [`sniff_content_type`] recognizes.
pub fn has_signature(extension: &str) -> bool {
    matches!(
        extension.to_lowercase().as_str(),
        "jpg" | "jpeg"
            | "png"
            | "gif"
            | "webp"
            | "avif"
            | "heic"
            | "heif"
            | "bmp"
            | "mp4"
            | "m4v"
            | "mov"
            | "webm"
            | "mp3"
            | "wav"
            | "ogg"
            | "m4a"
            | "pdf"
            | "zip"
    )
}

/// Canonical content type for an extension.
pub fn content_type_for_extension(extension: &str) -> Option<&'static str> {
    content_types_for_extension(extension).first().copied()
}

pub fn is_image(content_type: &str) -> bool {
    content_type.to_lowercase().starts_with("image/")
}

fn extension_of(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Content type to send: sniffed, else from the extension, else declared, else octet-stream.
pub fn corrected_content_type(filename: &str, declared: Option<&str>, data: &[u8]) -> String {
    if let Some(sniffed) = sniff_content_type(data) {
        return sniffed.to_string();
    }
    if let Some(from_ext) = extension_of(filename).and_then(|e| content_type_for_extension(&e)) {
        return from_ext.to_string();
    }
    declared
        .map(|d| d.split(';').next().unwrap_or_default().trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string())
}
