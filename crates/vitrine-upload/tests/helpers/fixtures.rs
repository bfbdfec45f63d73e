//! Request and payload fixtures.

use std::io::Cursor;
use std::time::Duration;

use image::{ImageBuffer, ImageFormat, Rgb};
use vitrine_core::{Destination, UploadConstraints, UploadRequest};

pub const BUCKET: &str = "assets";
pub const PREFIX: &str = "uploads";

/// Small gradient PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("encode PNG fixture");
    out.into_inner()
}

pub fn destination() -> Destination {
    Destination::new(BUCKET, PREFIX)
}

/// PNG upload request with instant retries.
pub fn png_request(file_name: &str) -> UploadRequest {
    request(file_name, png_bytes(8, 8))
}

pub fn request(file_name: &str, data: Vec<u8>) -> UploadRequest {
    UploadRequest::new(file_name, data, destination()).with_retry(3, Duration::ZERO)
}

/// Request whose payload exceeds its own size limit.
pub fn oversized_request(file_name: &str) -> UploadRequest {
    let constraints = UploadConstraints {
        max_size_bytes: 64,
        ..UploadConstraints::default()
    };
    request(file_name, png_bytes(32, 32)).with_constraints(constraints)
}
