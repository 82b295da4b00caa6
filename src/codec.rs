use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbaImage, imageops::FilterType};

use crate::error::{StampError, StampResult};

/// A decoded image held as straight (non-premultiplied) RGBA8, plus the
/// container format it was decoded from.
#[derive(Clone, Debug)]
pub struct DecodedImage {
    pub format: ImageFormat,
    pub pixels: RgbaImage,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

pub fn decode(bytes: &[u8]) -> StampResult<DecodedImage> {
    let format = image::guess_format(bytes)
        .map_err(|e| StampError::asset(format!("unrecognized image format: {e}")))?;
    let dyn_img = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| StampError::asset(format!("decode {format:?}: {e}")))?;
    Ok(DecodedImage {
        format,
        pixels: dyn_img.to_rgba8(),
    })
}

pub fn resize(img: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if img.dimensions() == (width, height) {
        return img.clone();
    }
    image::imageops::resize(img, width, height, FilterType::Lanczos3)
}

/// Encode `pixels` in `format`. Formats without an alpha channel get the
/// pixels flattened to RGB8 first.
pub fn encode(pixels: RgbaImage, format: ImageFormat) -> StampResult<Vec<u8>> {
    let img = if supports_alpha(format) {
        DynamicImage::ImageRgba8(pixels)
    } else {
        DynamicImage::ImageRgba8(pixels).into_rgb8().into()
    };

    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format)
        .map_err(|e| StampError::encode_or_write(format!("encode {format:?}: {e}")))?;
    Ok(buf)
}

fn supports_alpha(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Png | ImageFormat::WebP | ImageFormat::Tiff | ImageFormat::Tga
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(img: RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn decode_png_keeps_format_and_straight_alpha() {
        let src = RgbaImage::from_raw(1, 1, vec![100, 50, 200, 128]).unwrap();
        let decoded = decode(&png_bytes(src)).unwrap();
        assert_eq!(decoded.format, ImageFormat::Png);
        assert_eq!((decoded.width(), decoded.height()), (1, 1));
        assert_eq!(decoded.pixels.as_raw().as_slice(), &[100, 50, 200, 128]);
    }

    #[test]
    fn decode_garbage_is_asset_error() {
        let err = decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, StampError::Asset(_)));
    }

    #[test]
    fn resize_hits_target_dimensions() {
        let src = RgbaImage::from_pixel(10, 4, image::Rgba([1, 2, 3, 255]));
        let out = resize(&src, 5, 2);
        assert_eq!(out.dimensions(), (5, 2));
    }

    #[test]
    fn encode_jpeg_drops_alpha_and_decodes_back() {
        let src = RgbaImage::from_pixel(8, 8, image::Rgba([200, 10, 10, 255]));
        let bytes = encode(src, ImageFormat::Jpeg).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
        let back = decode(&bytes).unwrap();
        assert_eq!(back.format, ImageFormat::Jpeg);
        assert_eq!((back.width(), back.height()), (8, 8));
    }
}
