//! Image encoding: `DynamicImage` → base64 PNG or JPEG wrapped in `ImageData`.
//!
//! Vision APIs accept images as base64 payloads embedded in the JSON request
//! body. PNG is the default because it is lossless and text crispness matters
//! for reading equations and tables; JPEG is available for image-heavy papers
//! where request size becomes the bottleneck. `detail: "high"` asks
//! GPT-4-class models for the full tile budget so small print is not lost.

use crate::config::ImageFormat;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page for the LLM.
///
/// JPEG has no alpha channel, so the page is flattened to RGB first.
pub fn encode_page(img: &DynamicImage, format: ImageFormat) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    let mime = match format {
        ImageFormat::Png => {
            img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
            "image/png"
        }
        ImageFormat::Jpeg => {
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)?;
            "image/jpeg"
        }
    };

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page as {} → {} bytes base64", mime, b64.len());

    Ok(ImageData::new(b64, mime).with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red_square() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn encode_png() {
        let data = encode_page(&red_square(), ImageFormat::Png).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[test]
    fn encode_jpeg_drops_alpha() {
        let data = encode_page(&red_square(), ImageFormat::Jpeg).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/jpeg");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[..2], &[0xFF, 0xD8]);
    }
}
