//! JPEG and hex encoding for the diagnostic images embedded in the verdict.

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

const JPEG_QUALITY: u8 = 90;

/// Encode an RGB buffer as JPEG bytes.
pub fn jpeg_bytes(image: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    image.write_with_encoder(encoder)?;
    Ok(buf)
}

/// Encode an RGB buffer as a hex string of its JPEG bytes, the wire form the
/// verdict carries.
pub fn jpeg_hex(image: &RgbImage) -> Result<String, image::ImageError> {
    Ok(hex::encode(jpeg_bytes(image)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_jpeg_bytes_are_jpeg() {
        let image = RgbImage::from_pixel(16, 16, Rgb([120, 90, 60]));
        let bytes = jpeg_bytes(&image).unwrap();
        // SOI marker at the start, EOI at the end.
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_hex_roundtrip_is_byte_exact() {
        let image = RgbImage::from_fn(24, 24, |x, y| Rgb([x as u8 * 10, y as u8 * 10, 128]));
        let bytes = jpeg_bytes(&image).unwrap();
        let encoded = hex::encode(&bytes);
        assert_eq!(hex::decode(&encoded).unwrap(), bytes);
    }

    #[test]
    fn test_jpeg_hex_decodes_to_original_dimensions() {
        let image = RgbImage::from_pixel(20, 30, Rgb([5, 10, 15]));
        let encoded = jpeg_hex(&image).unwrap();
        let decoded =
            image::load_from_memory(&hex::decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded.width(), 20);
        assert_eq!(decoded.height(), 30);
    }
}
