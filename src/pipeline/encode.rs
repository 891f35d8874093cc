//! Image encoding: downloaded bytes → base64 `ImageData`.
//!
//! The bytes are not decoded; the format is sniffed from the magic number so
//! the request carries the right MIME type, and anything a vision model
//! cannot read is rejected before a token is spent. `detail: "high"` asks
//! GPT-4-class models for the full tile budget so small print on dense
//! bills stays legible.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::ImageFormat;
use tracing::debug;

/// Formats vision providers accept as inline images.
const SUPPORTED: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::WebP,
    ImageFormat::Gif,
];

/// Sniff the image format of `bytes`.
///
/// Returns the MIME type, or a description of why the bytes are unusable.
pub fn sniff_mime(bytes: &[u8]) -> Result<&'static str, String> {
    if bytes.is_empty() {
        return Err("empty body".into());
    }
    let format = image::guess_format(bytes).map_err(|_| {
        let n = bytes.len().min(4);
        format!("unrecognised leading bytes {:?}", &bytes[..n])
    })?;
    if SUPPORTED.contains(&format) {
        Ok(format.to_mime_type())
    } else {
        Err(format!("{format:?} images are not supported"))
    }
}

/// Encode image bytes as a base64 `ImageData` ready for the vision API.
pub fn encode_image(bytes: &[u8]) -> Result<ImageData, String> {
    let mime = sniff_mime(bytes)?;
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded {} image → {} bytes base64", mime, b64.len());
    Ok(ImageData::new(b64, mime).with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("png encode");
        buf
    }

    #[test]
    fn encode_small_png() {
        let data = encode_image(&png_bytes()).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(decoded, png_bytes());
    }

    #[test]
    fn sniff_jpeg_magic() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
        assert_eq!(sniff_mime(&jpeg), Ok("image/jpeg"));
    }

    #[test]
    fn rejects_html() {
        let err = sniff_mime(b"<!DOCTYPE html><html></html>").unwrap_err();
        assert!(err.contains("unrecognised"), "got: {err}");
    }

    #[test]
    fn rejects_pdf() {
        assert!(sniff_mime(b"%PDF-1.7\n").is_err());
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(sniff_mime(b""), Err("empty body".to_string()));
    }
}
