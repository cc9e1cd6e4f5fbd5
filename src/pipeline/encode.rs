//! Image encoding: `DynamicImage` → base64 payload wrapped in [`PageImage`].
//!
//! Vision APIs take images as base64 inside the JSON request body. JPEG is
//! the default because table pages are mostly flat text on white and upload
//! at a third of the PNG size; PNG stays available for tiny print.

use crate::config::PageImageFormat;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// JPEG quality for page uploads. Below ~80 thin table rules start to blur.
const JPEG_QUALITY: u8 = 85;

/// One rasterised page, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-indexed page number in the source document.
    pub page_num: usize,
    pub mime_type: &'static str,
    /// Base64-encoded image bytes.
    pub data: String,
}

impl PageImage {
    pub fn new(page_num: usize, mime_type: &'static str, data: impl Into<String>) -> Self {
        Self {
            page_num,
            mime_type,
            data: data.into(),
        }
    }
}

/// Encode a rasterised page for the vision API.
pub fn encode_page(
    page_num: usize,
    img: &DynamicImage,
    format: PageImageFormat,
) -> Result<PageImage, image::ImageError> {
    let mut buf = Vec::new();
    match format {
        PageImageFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(&rgb)?;
        }
        PageImageFormat::Png => {
            img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
        }
    }

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page {} → {} bytes base64", page_num, b64.len());

    Ok(PageImage::new(page_num, format.mime_type(), b64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red_square() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn encode_jpeg() {
        let page = encode_page(3, &red_square(), PageImageFormat::Jpeg).expect("encode");
        assert_eq!(page.page_num, 3);
        assert_eq!(page.mime_type, "image/jpeg");
        let decoded = STANDARD.decode(&page.data).expect("valid base64");
        assert_eq!(&decoded[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn encode_png() {
        let page = encode_page(1, &red_square(), PageImageFormat::Png).expect("encode");
        assert_eq!(page.mime_type, "image/png");
        let decoded = STANDARD.decode(&page.data).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }
}
